//! Wire frame payloads.
//!
//! A frame is one length-prefixed unit on the stream. Its payload is one of
//! three JSON shapes:
//!
//! ```text
//! {"init": true, "vehicles": [EntitySnapshot, ...]}   Init
//! [EntitySnapshot, ...]                               Delta
//! {"cmd": "shutdown"}                                 Control
//! ```
//!
//! The shapes are disjoint (object-with-`init`, bare array,
//! object-with-`cmd`), so the enum deserializes untagged.

use crate::snapshot::EntitySnapshot;
use serde::{Deserialize, Serialize};

/// The initial full roster, sent exactly once per connection, always first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InitFrame {
    /// Marker distinguishing this object on the wire. Always `true`.
    pub init: bool,
    /// The complete roster of entities at connection time.
    pub vehicles: Vec<EntitySnapshot>,
}

impl InitFrame {
    /// Builds an init frame from a roster.
    #[must_use]
    pub fn new(vehicles: Vec<EntitySnapshot>) -> Self {
        Self { init: true, vehicles }
    }
}

/// A control command delivered in-band.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Tear the whole pipeline down.
    #[serde(rename = "shutdown")]
    Shutdown,
}

/// Control frame: `{"cmd": "shutdown"}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFrame {
    /// The command to execute.
    pub cmd: Command,
}

/// One decoded frame payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Frame {
    /// Full initial roster. Observed exactly once per connection lifetime.
    Init(InitFrame),
    /// In-band control command.
    Control(ControlFrame),
    /// Ordered entity snapshots for one tick.
    Delta(Vec<EntitySnapshot>),
}

impl Frame {
    /// Shorthand for the shutdown control frame.
    #[must_use]
    pub const fn shutdown() -> Self {
        Self::Control(ControlFrame { cmd: Command::Shutdown })
    }

    /// True when this frame is the init roster.
    #[must_use]
    pub const fn is_init(&self) -> bool {
        matches!(self, Self::Init(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_frame_shape() {
        let frame = Frame::Init(InitFrame::new(Vec::new()));
        let json = serde_json::to_value(&frame).unwrap();

        assert_eq!(json["init"], true);
        assert!(json["vehicles"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_control_frame_shape() {
        let json = serde_json::to_string(&Frame::shutdown()).unwrap();
        assert_eq!(json, r#"{"cmd":"shutdown"}"#);
    }

    #[test]
    fn test_untagged_dispatch() {
        let init: Frame = serde_json::from_str(r#"{"init":true,"vehicles":[]}"#).unwrap();
        assert!(init.is_init());

        let control: Frame = serde_json::from_str(r#"{"cmd":"shutdown"}"#).unwrap();
        assert_eq!(control, Frame::shutdown());

        let delta: Frame = serde_json::from_str("[]").unwrap();
        assert_eq!(delta, Frame::Delta(Vec::new()));
    }

    #[test]
    fn test_unknown_shape_rejected() {
        let result: Result<Frame, _> = serde_json::from_str(r#"{"surprise":1}"#);
        assert!(result.is_err());
    }
}
