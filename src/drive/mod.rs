//! Motor-controller bridge.
//!
//! One bridge instance manages one physical dual-axis controller over a
//! shared, non-reentrant channel (USB/serial). The instance owns the
//! connection lifecycle, a three-state safety machine, a liveness watchdog,
//! and the velocity command store; it runs a control loop and a telemetry
//! loop concurrently and fails safe on any channel loss or controller fault.

pub mod bridge;
pub mod command;
pub mod device;
pub mod link;
pub mod sim;
pub mod state;
pub mod watchdog;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the two independently driven outputs of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AxisSide {
    Left,
    Right,
}

impl AxisSide {
    pub const BOTH: [AxisSide; 2] = [AxisSide::Left, AxisSide::Right];

    pub fn label(self) -> &'static str {
        match self {
            AxisSide::Left => "left",
            AxisSide::Right => "right",
        }
    }
}

impl fmt::Display for AxisSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The physical wheel pair assigned to one controller instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WheelPair {
    Front,
    Middle,
    Back,
}

impl WheelPair {
    pub const ALL: [WheelPair; 3] = [WheelPair::Front, WheelPair::Middle, WheelPair::Back];

    pub fn label(self) -> &'static str {
        match self {
            WheelPair::Front => "front",
            WheelPair::Middle => "middle",
            WheelPair::Back => "back",
        }
    }

    /// Wheel label for one axis of this pair, e.g. `front_left`.
    pub fn wheel_label(self, side: AxisSide) -> String {
        format!("{}_{}", self.label(), side.label())
    }
}

impl fmt::Display for WheelPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for WheelPair {
    type Err = UnknownPair;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "front" => Ok(WheelPair::Front),
            "middle" => Ok(WheelPair::Middle),
            "back" => Ok(WheelPair::Back),
            _ => Err(UnknownPair),
        }
    }
}

/// Error for an unrecognized wheel-pair name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("wheel pair must be one of: front, middle, back")]
pub struct UnknownPair;

/// A per-side pair of values, indexable by [`AxisSide`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SidePair {
    pub left: f32,
    pub right: f32,
}

impl SidePair {
    pub fn get(&self, side: AxisSide) -> f32 {
        match side {
            AxisSide::Left => self.left,
            AxisSide::Right => self.right,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wheel_labels() {
        assert_eq!(WheelPair::Front.wheel_label(AxisSide::Left), "front_left");
        assert_eq!(WheelPair::Middle.wheel_label(AxisSide::Right), "middle_right");
        assert_eq!(WheelPair::Back.wheel_label(AxisSide::Left), "back_left");
    }

    #[test]
    fn test_pair_parsing() {
        assert_eq!("front".parse::<WheelPair>(), Ok(WheelPair::Front));
        assert_eq!("middle".parse::<WheelPair>(), Ok(WheelPair::Middle));
        assert_eq!("back".parse::<WheelPair>(), Ok(WheelPair::Back));
        assert!("left".parse::<WheelPair>().is_err());
    }

    #[test]
    fn test_side_pair_indexing() {
        let p = SidePair { left: 1.5, right: -2.0 };
        assert_eq!(p.get(AxisSide::Left), 1.5);
        assert_eq!(p.get(AxisSide::Right), -2.0);
    }
}
