//! 3D transform state for the cube
//!
//! Rotation (roll/pitch/yaw in degrees), translation (pixels) and scale
//! (unitless multiplier), plus the CSS transform string the view applies.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("Unknown transform field: {0}")]
    UnknownField(String),
}

/// One of the nine editable transform fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransformField {
    #[serde(rename = "roll")]
    Roll,
    #[serde(rename = "pitch")]
    Pitch,
    #[serde(rename = "yaw")]
    Yaw,
    #[serde(rename = "translateX")]
    TranslateX,
    #[serde(rename = "translateY")]
    TranslateY,
    #[serde(rename = "translateZ")]
    TranslateZ,
    #[serde(rename = "scaleX")]
    ScaleX,
    #[serde(rename = "scaleY")]
    ScaleY,
    #[serde(rename = "scaleZ")]
    ScaleZ,
}

impl TransformField {
    pub const ALL: [TransformField; 9] = [
        Self::Roll,
        Self::Pitch,
        Self::Yaw,
        Self::TranslateX,
        Self::TranslateY,
        Self::TranslateZ,
        Self::ScaleX,
        Self::ScaleY,
        Self::ScaleZ,
    ];

    /// Field id as used by the page inputs and the JSON snapshot
    pub fn id(&self) -> &'static str {
        match self {
            Self::Roll => "roll",
            Self::Pitch => "pitch",
            Self::Yaw => "yaw",
            Self::TranslateX => "translateX",
            Self::TranslateY => "translateY",
            Self::TranslateZ => "translateZ",
            Self::ScaleX => "scaleX",
            Self::ScaleY => "scaleY",
            Self::ScaleZ => "scaleZ",
        }
    }

    /// Semantic default: 1 for scale, 0 for everything else
    pub fn default_value(&self) -> f64 {
        match self {
            Self::ScaleX | Self::ScaleY | Self::ScaleZ => 1.0,
            _ => 0.0,
        }
    }
}

impl fmt::Display for TransformField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for TransformField {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|field| field.id() == s)
            .ok_or_else(|| FieldError::UnknownField(s.to_string()))
    }
}

/// Rotation, translation and scale of the cube
///
/// All fields are kept finite; every constructor and setter in this module
/// maps non-finite input back to a finite value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transform {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    pub translate_x: f64,
    pub translate_y: f64,
    pub translate_z: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    pub scale_z: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            roll: 0.0,
            pitch: 0.0,
            yaw: 0.0,
            translate_x: 0.0,
            translate_y: 0.0,
            translate_z: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            scale_z: 1.0,
        }
    }
}

impl Transform {
    pub fn get(&self, field: TransformField) -> f64 {
        match field {
            TransformField::Roll => self.roll,
            TransformField::Pitch => self.pitch,
            TransformField::Yaw => self.yaw,
            TransformField::TranslateX => self.translate_x,
            TransformField::TranslateY => self.translate_y,
            TransformField::TranslateZ => self.translate_z,
            TransformField::ScaleX => self.scale_x,
            TransformField::ScaleY => self.scale_y,
            TransformField::ScaleZ => self.scale_z,
        }
    }

    /// Set a single field. Non-finite values are stored as 0.
    pub fn set(&mut self, field: TransformField, value: f64) {
        let value = if value.is_finite() { value } else { 0.0 };
        let slot = match field {
            TransformField::Roll => &mut self.roll,
            TransformField::Pitch => &mut self.pitch,
            TransformField::Yaw => &mut self.yaw,
            TransformField::TranslateX => &mut self.translate_x,
            TransformField::TranslateY => &mut self.translate_y,
            TransformField::TranslateZ => &mut self.translate_z,
            TransformField::ScaleX => &mut self.scale_x,
            TransformField::ScaleY => &mut self.scale_y,
            TransformField::ScaleZ => &mut self.scale_z,
        };
        *slot = value;
    }

    /// Apply raw text typed into a field input.
    ///
    /// Uses leading-number parsing; anything unparseable becomes 0, for the
    /// scale fields too.
    pub fn apply_input(&mut self, field: TransformField, text: &str) {
        self.set(field, parse_input(text));
    }

    /// One animation step.
    ///
    /// Rotation and translation advance by one; scale is derived from the
    /// rotation values *before* this step, so scale trails rotation by a tick.
    pub fn tick(&self) -> Self {
        Self {
            roll: self.roll + 1.0,
            pitch: self.pitch + 1.0,
            yaw: self.yaw + 1.0,
            translate_x: self.translate_x + 1.0,
            translate_y: self.translate_y + 1.0,
            translate_z: self.translate_z + 1.0,
            scale_x: 1.0 + (self.roll / 100.0).sin(),
            scale_y: 1.0 + (self.pitch / 100.0).cos(),
            scale_z: 1.0 + (self.yaw / 100.0).sin(),
        }
    }

    pub fn is_finite(&self) -> bool {
        TransformField::ALL.iter().all(|f| self.get(*f).is_finite())
    }

    /// CSS transform string: rotateX(pitch) rotateY(yaw) rotateZ(roll),
    /// then translate3d, then scale3d. The order is part of the contract.
    pub fn to_css(&self) -> String {
        format!(
            "rotateX({}deg) rotateY({}deg) rotateZ({}deg) translate3d({}px, {}px, {}px) scale3d({}, {}, {})",
            Num(self.pitch),
            Num(self.yaw),
            Num(self.roll),
            Num(self.translate_x),
            Num(self.translate_y),
            Num(self.translate_z),
            Num(self.scale_x),
            Num(self.scale_y),
            Num(self.scale_z),
        )
    }
}

/// Shortest round-trip number formatting, with negative zero shown as 0
struct Num(f64);

impl fmt::Display for Num {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0.0 {
            f.write_str("0")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Parse the numeric prefix of `text`, returning 0 when there is none.
///
/// Leading whitespace is skipped and the longest prefix that reads as a
/// decimal number is used, so `"12.5px"` gives 12.5 and `"abc"` gives 0.
pub fn parse_input(text: &str) -> f64 {
    let s = text.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end += 1;
    }
    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        if digits > 0 || frac_end > frac_start {
            digits += frac_end - frac_start;
            end = frac_end;
        }
    }
    if digits == 0 {
        return 0.0;
    }
    // Exponent only counts when it has digits
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+') | Some(b'-')) {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    match s[..end].parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let t = Transform::default();
        for field in TransformField::ALL {
            assert_eq!(t.get(field), field.default_value());
        }
    }

    #[test]
    fn test_field_ids_round_trip() {
        for field in TransformField::ALL {
            assert_eq!(field.id().parse::<TransformField>().unwrap(), field);
        }
        assert_eq!(
            "scalex".parse::<TransformField>(),
            Err(FieldError::UnknownField("scalex".to_string()))
        );
    }

    #[test]
    fn test_parse_input() {
        assert_eq!(parse_input("42"), 42.0);
        assert_eq!(parse_input("  -3.5"), -3.5);
        assert_eq!(parse_input("12px"), 12.0);
        assert_eq!(parse_input(".5"), 0.5);
        assert_eq!(parse_input("5."), 5.0);
        assert_eq!(parse_input("1e3"), 1000.0);
        assert_eq!(parse_input("2e"), 2.0);
        assert_eq!(parse_input("abc"), 0.0);
        assert_eq!(parse_input(""), 0.0);
        assert_eq!(parse_input("-"), 0.0);
        assert_eq!(parse_input("."), 0.0);
        assert_eq!(parse_input("1e999"), 0.0);
    }

    #[test]
    fn test_bad_scale_input_becomes_zero() {
        let mut t = Transform::default();
        t.apply_input(TransformField::ScaleX, "abc");
        assert_eq!(t.scale_x, 0.0);
        assert_eq!(t.scale_y, 1.0);
    }

    #[test]
    fn test_input_touches_one_field() {
        let mut t = Transform::default();
        t.apply_input(TransformField::TranslateY, "7");
        let mut expected = Transform::default();
        expected.translate_y = 7.0;
        assert_eq!(t, expected);
    }

    #[test]
    fn test_set_rejects_non_finite() {
        let mut t = Transform::default();
        t.set(TransformField::Yaw, f64::NAN);
        t.set(TransformField::ScaleZ, f64::INFINITY);
        assert!(t.is_finite());
        assert_eq!(t.yaw, 0.0);
        assert_eq!(t.scale_z, 0.0);
    }

    #[test]
    fn test_tick_scale_lags_rotation() {
        let mut t = Transform::default();
        for _ in 0..3 {
            t = t.tick();
        }
        assert_eq!(t.roll, 3.0);
        assert_eq!(t.pitch, 3.0);
        assert_eq!(t.translate_z, 3.0);
        // Third tick saw roll/pitch/yaw == 2 before incrementing
        assert_eq!(t.scale_x, 1.0 + (2.0f64 / 100.0).sin());
        assert_eq!(t.scale_y, 1.0 + (2.0f64 / 100.0).cos());
        assert_eq!(t.scale_z, 1.0 + (2.0f64 / 100.0).sin());
    }

    #[test]
    fn test_first_tick_from_defaults() {
        let t = Transform::default().tick();
        assert_eq!(t.roll, 1.0);
        assert_eq!(t.scale_x, 1.0);
        assert_eq!(t.scale_y, 2.0);
        assert_eq!(t.scale_z, 1.0);
    }

    #[test]
    fn test_css_default() {
        assert_eq!(
            Transform::default().to_css(),
            "rotateX(0deg) rotateY(0deg) rotateZ(0deg) translate3d(0px, 0px, 0px) scale3d(1, 1, 1)"
        );
    }

    #[test]
    fn test_css_order() {
        let t = Transform {
            roll: 30.0,
            pitch: 10.0,
            yaw: 20.0,
            translate_x: -5.0,
            translate_y: 2.5,
            translate_z: -0.0,
            scale_x: 0.5,
            scale_y: 2.0,
            scale_z: 1.25,
        };
        assert_eq!(
            t.to_css(),
            "rotateX(10deg) rotateY(20deg) rotateZ(30deg) translate3d(-5px, 2.5px, 0px) scale3d(0.5, 2, 1.25)"
        );
    }

    #[test]
    fn test_serde_uses_field_ids() {
        let json = serde_json::to_value(Transform::default()).unwrap();
        for field in TransformField::ALL {
            assert!(json.get(field.id()).is_some(), "missing {}", field);
        }
    }
}
