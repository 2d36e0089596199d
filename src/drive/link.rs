//! Controller transport seam.
//!
//! The byte-level wire protocol and device enumeration are supplied by the
//! transport layer and stay behind these traits. Every operation speaks raw
//! hardware units (turns per second, amperes, fault flag words); unit
//! conversion and channel locking live in [`super::device::ActuatorDevice`].
//!
//! A link is not reentrant: callers must serialize access. The device wrapper
//! enforces this with one exclusive channel lock.

use super::AxisSide;

/// Requested axis run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisState {
    Idle,
    ClosedLoop,
}

/// Controller-side control mode for an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    Velocity,
    Position,
}

/// Transport failure taxonomy. A link either works or the channel is gone;
/// partial failures surface as `Broken` and force a reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    #[error("controller channel broken")]
    Broken,
}

/// One open channel to a physical dual-axis controller.
///
/// Calls block for the duration of the hardware round trip. Any call may
/// fail with [`LinkError::Broken`] when the channel drops mid-operation.
pub trait ControllerLink: Send {
    fn set_axis_state(&mut self, side: AxisSide, state: AxisState) -> Result<(), LinkError>;
    fn set_control_mode(&mut self, side: AxisSide, mode: ControlMode) -> Result<(), LinkError>;

    /// Commanded axis velocity in hardware units (turns per second).
    fn set_input_velocity(&mut self, side: AxisSide, turns_per_s: f32) -> Result<(), LinkError>;

    /// Measured motor current in amperes.
    fn measured_current(&mut self, side: AxisSide) -> Result<f32, LinkError>;

    /// Encoder velocity estimate in hardware units (turns per second).
    fn velocity_estimate(&mut self, side: AxisSide) -> Result<f32, LinkError>;

    /// Raw fault flag word for one axis; zero means no faults.
    fn fault_flags(&mut self, side: AxisSide) -> Result<u32, LinkError>;

    fn clear_faults(&mut self) -> Result<(), LinkError>;

    fn set_current_limit(&mut self, amps: f32) -> Result<(), LinkError>;

    fn set_watchdog_timeout(&mut self, timeout_s: f32) -> Result<(), LinkError>;
    fn enable_watchdog(&mut self, enabled: bool) -> Result<(), LinkError>;

    /// Keep-alive pulse for the device-side watchdog timer.
    fn feed_watchdog(&mut self) -> Result<(), LinkError>;
}

/// Device discovery, supplied by the transport layer.
///
/// `probe` is a single non-blocking attempt; the device wrapper turns it
/// into the blocking retry-until-present connect the bridge expects.
pub trait LinkDiscovery: Send + Sync {
    fn probe(&self, controller_id: &str) -> Option<Box<dyn ControllerLink>>;
}
