//! Pose messages received on the subscribed broker topic
//!
//! ```json
//! { "rotation":    { "roll": 0, "pitch": 0, "yaw": 0 },
//!   "translation": { "x": 0, "y": 0, "z": 0 },
//!   "scale":       { "x": 1, "y": 1, "z": 1 } }
//! ```
//!
//! Every group and every leaf is optional. A leaf counts as present when it
//! holds a number (`null` is the same as absent), so an explicit `0` is kept,
//! zero scale included.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transform::Transform;

#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("Payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("Failed to parse payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Payload must be a JSON object, got {0}")]
    NotAnObject(&'static str),
    #[error("Payload field `{0}` must be an object")]
    InvalidGroup(&'static str),
}

const GROUPS: [&str; 3] = ["rotation", "translation", "scale"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rotation {
    pub roll: Option<f64>,
    pub pitch: Option<f64>,
    pub yaw: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
}

/// Decoded pose message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PosePayload {
    pub rotation: Option<Rotation>,
    pub translation: Option<Vector3>,
    pub scale: Option<Vector3>,
}

impl PosePayload {
    /// Decode raw message bytes.
    ///
    /// Rejects anything that is not a JSON object, and objects whose groups
    /// or leaves have the wrong type. Unknown keys are ignored.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, PayloadError> {
        let text = std::str::from_utf8(bytes)?;
        let value: serde_json::Value = serde_json::from_str(text)?;
        let kind = match &value {
            serde_json::Value::Object(_) => None,
            serde_json::Value::Null => Some("null"),
            serde_json::Value::Bool(_) => Some("a boolean"),
            serde_json::Value::Number(_) => Some("a number"),
            serde_json::Value::String(_) => Some("a string"),
            serde_json::Value::Array(_) => Some("an array"),
        };
        if let Some(kind) = kind {
            return Err(PayloadError::NotAnObject(kind));
        }
        // serde would happily read a struct out of an array
        for group in GROUPS {
            match value.get(group) {
                None | Some(serde_json::Value::Null) | Some(serde_json::Value::Object(_)) => {}
                Some(_) => return Err(PayloadError::InvalidGroup(group)),
            }
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Build the full transform this message describes.
    ///
    /// Fields the message leaves out take their defaults; nothing carries
    /// over from the previous transform.
    pub fn to_transform(&self) -> Transform {
        let defaults = Transform::default();
        let rotation = self.rotation.clone().unwrap_or_default();
        let translation = self.translation.clone().unwrap_or_default();
        let scale = self.scale.clone().unwrap_or_default();

        Transform {
            roll: leaf(rotation.roll, defaults.roll),
            pitch: leaf(rotation.pitch, defaults.pitch),
            yaw: leaf(rotation.yaw, defaults.yaw),
            translate_x: leaf(translation.x, defaults.translate_x),
            translate_y: leaf(translation.y, defaults.translate_y),
            translate_z: leaf(translation.z, defaults.translate_z),
            scale_x: leaf(scale.x, defaults.scale_x),
            scale_y: leaf(scale.y, defaults.scale_y),
            scale_z: leaf(scale.z, defaults.scale_z),
        }
    }
}

fn leaf(value: Option<f64>, default: f64) -> f64 {
    match value {
        Some(v) if v.is_finite() => v,
        _ => default,
    }
}

/// Decode a message straight into the transform it describes
pub fn decode_transform(bytes: &[u8]) -> Result<Transform, PayloadError> {
    PosePayload::from_slice(bytes).map(|payload| payload.to_transform())
}
