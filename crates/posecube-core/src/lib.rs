//! posecube core - transform state and the broker interface state machine
//!
//! This crate provides the pieces of posecube that do no I/O:
//! - The nine-field cube transform, its input parsing and animation step
//! - Decoding of pose messages received from the broker
//! - The component state machine that turns events into state changes and effects

pub mod payload;
pub mod state;
pub mod transform;

pub use payload::{decode_transform, PayloadError, PosePayload};
pub use state::{Animation, ConnectionStatus, Effect, Snapshot, Tab, UiEvent, ViewState};
pub use transform::{parse_input, FieldError, Transform, TransformField};
