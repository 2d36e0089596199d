//! Actuator device abstraction.
//!
//! Owns the open controller link and translates between normalized commands
//! / physical units and the hardware units the link speaks. A single shared
//! physical connection is not safely reentrant, so every operation takes one
//! exclusive channel lock; the control loop and the telemetry loop contend on
//! that lock and nothing else device-side.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::link::{AxisState, ControlMode, ControllerLink, LinkDiscovery, LinkError};
use super::{AxisSide, SidePair};

/// Delay between discovery probes while waiting for the device to appear.
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Static per-controller configuration, loaded at startup and immutable for
/// the process lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Opaque controller identifier handed to discovery (e.g. a serial).
    pub controller_id: String,
    pub current_limit_amps: f32,
    /// Converts a normalized command in [-1, 1] to hardware turns/s.
    pub vel_cmd_multiplier: SidePair,
    /// Converts hardware turns/s to meters/s.
    pub vel_est_multiplier: SidePair,
    /// Device-side watchdog timeout, seconds.
    pub watchdog_timeout_s: f32,
}

/// One telemetry reading for one axis, in physical units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySample {
    pub axis: AxisSide,
    pub current_amps: f32,
    pub velocity_m_s: f32,
}

/// Device operation failures.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum DeviceError {
    /// The channel to the controller dropped mid-operation. Recovered by the
    /// bridge through a full reconnect; never fatal.
    #[error("controller channel broken")]
    CommBroken,
    /// Precondition violation: a velocity outside [-1.0, 1.0] reached the
    /// device API. Rejected before any hardware interaction.
    #[error("velocity command {0} outside [-1.0, 1.0]")]
    InvalidCommand(f32),
}

impl From<LinkError> for DeviceError {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::Broken => DeviceError::CommBroken,
        }
    }
}

/// One connected dual-axis controller.
///
/// Exists only while the device is reachable: created by [`connect`], held
/// by the bridge, and dropped on any channel failure or fault transition.
///
/// [`connect`]: ActuatorDevice::connect
pub struct ActuatorDevice {
    channel: Mutex<Box<dyn ControllerLink>>,
    vel_cmd_multiplier: SidePair,
    vel_est_multiplier: SidePair,
    watchdog_timeout_s: f32,
}

impl ActuatorDevice {
    /// Blocking discovery: probes until the controller appears, then applies
    /// the configured current limit. There is no timeout and no failure path
    /// for an absent device; the calling loop simply blocks. A broken channel
    /// during the post-discovery configuration does fail the connect.
    pub async fn connect(
        discovery: &dyn LinkDiscovery,
        config: &DeviceConfig,
    ) -> Result<Self, DeviceError> {
        info!(controller = %config.controller_id, "looking for controller");
        let link = loop {
            if let Some(link) = discovery.probe(&config.controller_id) {
                break link;
            }
            tokio::time::sleep(CONNECT_RETRY_DELAY).await;
        };
        info!(controller = %config.controller_id, "controller found");

        let device = Self {
            channel: Mutex::new(link),
            vel_cmd_multiplier: config.vel_cmd_multiplier,
            vel_est_multiplier: config.vel_est_multiplier,
            watchdog_timeout_s: config.watchdog_timeout_s,
        };
        device.channel.lock().await.set_current_limit(config.current_limit_amps)?;
        Ok(device)
    }

    /// Arms the controller: closed-loop control, then velocity control mode.
    pub async fn arm(&self) -> Result<(), DeviceError> {
        let mut link = self.channel.lock().await;
        for side in AxisSide::BOTH {
            link.set_axis_state(side, AxisState::ClosedLoop)?;
        }
        for side in AxisSide::BOTH {
            link.set_control_mode(side, ControlMode::Velocity)?;
        }
        Ok(())
    }

    /// Disarms the controller: zero both axis velocities, then idle.
    pub async fn disarm(&self) -> Result<(), DeviceError> {
        let mut link = self.channel.lock().await;
        for side in AxisSide::BOTH {
            link.set_input_velocity(side, 0.0)?;
        }
        for side in AxisSide::BOTH {
            link.set_axis_state(side, AxisState::Idle)?;
        }
        Ok(())
    }

    /// Commands one axis at a normalized velocity in [-1.0, 1.0].
    ///
    /// An out-of-range value is a contract violation and is rejected before
    /// the channel lock is acquired or any hardware call is made.
    pub async fn set_velocity(&self, side: AxisSide, normalized: f32) -> Result<(), DeviceError> {
        if !(-1.0..=1.0).contains(&normalized) {
            return Err(DeviceError::InvalidCommand(normalized));
        }
        let turns_per_s = normalized * self.vel_cmd_multiplier.get(side);
        self.channel.lock().await.set_input_velocity(side, turns_per_s)?;
        Ok(())
    }

    /// Measured axis current in amperes.
    pub async fn current(&self, side: AxisSide) -> Result<f32, DeviceError> {
        Ok(self.channel.lock().await.measured_current(side)?)
    }

    /// Estimated axis velocity in meters per second.
    pub async fn velocity(&self, side: AxisSide) -> Result<f32, DeviceError> {
        let turns_per_s = self.channel.lock().await.velocity_estimate(side)?;
        Ok(turns_per_s * self.vel_est_multiplier.get(side))
    }

    /// Reads one axis's current and velocity as a telemetry sample.
    pub async fn sample(&self, side: AxisSide) -> Result<TelemetrySample, DeviceError> {
        Ok(TelemetrySample {
            axis: side,
            current_amps: self.current(side).await?,
            velocity_m_s: self.velocity(side).await?,
        })
    }

    /// True if either axis reports fault flags.
    pub async fn has_faults(&self) -> Result<bool, DeviceError> {
        let mut link = self.channel.lock().await;
        let flags = link.fault_flags(AxisSide::Left)? | link.fault_flags(AxisSide::Right)?;
        Ok(flags != 0)
    }

    /// Resets the device-side watchdog: disable, clear fault flags, then
    /// re-enable with the configured timeout. Called on every rearm after an
    /// error or disconnect.
    pub async fn reset_watchdog(&self) -> Result<(), DeviceError> {
        info!("resetting controller watchdog");
        let mut link = self.channel.lock().await;
        link.set_watchdog_timeout(0.0)?;
        link.enable_watchdog(false)?;
        link.clear_faults()?;
        link.set_watchdog_timeout(self.watchdog_timeout_s)?;
        link.feed_watchdog()?;
        link.enable_watchdog(true)?;
        Ok(())
    }

    /// Keep-alive pulse for the device-side watchdog timer.
    pub async fn feed_watchdog(&self) -> Result<(), DeviceError> {
        self.channel.lock().await.feed_watchdog()?;
        Ok(())
    }

    /// Best-effort diagnostic dump of per-axis fault flags. Logs what it can
    /// read; a broken channel aborts the dump without propagating.
    pub async fn fault_dump(&self) {
        let mut link = self.channel.lock().await;
        for side in AxisSide::BOTH {
            match link.fault_flags(side) {
                Ok(flags) => warn!(%side, flags, "axis fault flags"),
                Err(LinkError::Broken) => {
                    warn!(%side, "fault dump aborted: channel broken");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::sim::{SimDiscovery, SimOp};

    fn test_config() -> DeviceConfig {
        DeviceConfig {
            controller_id: "sim-0".into(),
            current_limit_amps: 50.0,
            vel_cmd_multiplier: SidePair { left: 40.0, right: -40.0 },
            vel_est_multiplier: SidePair { left: 0.3, right: -0.3 },
            watchdog_timeout_s: 0.5,
        }
    }

    #[tokio::test]
    async fn test_connect_applies_current_limit() {
        let (discovery, handle) = SimDiscovery::new("sim-0");
        let _device = ActuatorDevice::connect(&discovery, &test_config()).await.unwrap();

        assert_eq!(handle.current_limit(), 50.0);
    }

    #[tokio::test]
    async fn test_set_velocity_converts_per_side() {
        let (discovery, handle) = SimDiscovery::new("sim-0");
        let device = ActuatorDevice::connect(&discovery, &test_config()).await.unwrap();

        device.set_velocity(AxisSide::Left, 0.5).await.unwrap();
        device.set_velocity(AxisSide::Right, 0.5).await.unwrap();

        // Opposite-facing sides carry opposite-signed multipliers
        assert_eq!(handle.input_velocity(AxisSide::Left), 20.0);
        assert_eq!(handle.input_velocity(AxisSide::Right), -20.0);
    }

    #[tokio::test]
    async fn test_out_of_range_velocity_rejected_before_hardware() {
        let (discovery, handle) = SimDiscovery::new("sim-0");
        let device = ActuatorDevice::connect(&discovery, &test_config()).await.unwrap();
        handle.clear_ops();

        let err = device.set_velocity(AxisSide::Left, 1.5).await.unwrap_err();
        assert_eq!(err, DeviceError::InvalidCommand(1.5));
        assert!(matches!(
            device.set_velocity(AxisSide::Right, f32::NAN).await,
            Err(DeviceError::InvalidCommand(_))
        ));

        // No channel traffic happened
        assert!(handle.ops().is_empty());
    }

    #[tokio::test]
    async fn test_velocity_estimate_converted_to_m_s() {
        let (discovery, _handle) = SimDiscovery::new("sim-0");
        let device = ActuatorDevice::connect(&discovery, &test_config()).await.unwrap();

        device.set_velocity(AxisSide::Left, 1.0).await.unwrap();
        // 40 turns/s * 0.3 m per turn
        assert!((device.velocity(AxisSide::Left).await.unwrap() - 12.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_sample_combines_current_and_velocity() {
        let (discovery, _handle) = SimDiscovery::new("sim-0");
        let device = ActuatorDevice::connect(&discovery, &test_config()).await.unwrap();
        device.set_velocity(AxisSide::Left, -1.0).await.unwrap();

        let sample = device.sample(AxisSide::Left).await.unwrap();
        assert_eq!(sample.axis, AxisSide::Left);
        // -40 turns/s * 0.3 m per turn
        assert!((sample.velocity_m_s + 12.0).abs() < 1e-5);
        assert!(sample.current_amps > 0.0);
    }

    #[tokio::test]
    async fn test_has_faults_aggregates_both_axes() {
        let (discovery, handle) = SimDiscovery::new("sim-0");
        let device = ActuatorDevice::connect(&discovery, &test_config()).await.unwrap();

        assert!(!device.has_faults().await.unwrap());
        handle.inject_fault(AxisSide::Right, 0x2);
        assert!(device.has_faults().await.unwrap());
    }

    #[tokio::test]
    async fn test_reset_watchdog_sequence() {
        let (discovery, handle) = SimDiscovery::new("sim-0");
        let device = ActuatorDevice::connect(&discovery, &test_config()).await.unwrap();
        handle.clear_ops();

        device.reset_watchdog().await.unwrap();

        assert_eq!(
            handle.ops(),
            vec![
                SimOp::SetWatchdogTimeout(0.0),
                SimOp::EnableWatchdog(false),
                SimOp::ClearFaults,
                SimOp::SetWatchdogTimeout(0.5),
                SimOp::FeedWatchdog,
                SimOp::EnableWatchdog(true),
            ]
        );
        assert!(handle.watchdog_enabled());
        assert_eq!(handle.watchdog_timeout_s(), 0.5);
    }

    #[tokio::test]
    async fn test_broken_channel_surfaces_comm_broken() {
        let (discovery, handle) = SimDiscovery::new("sim-0");
        let device = ActuatorDevice::connect(&discovery, &test_config()).await.unwrap();

        handle.unplug();
        assert_eq!(device.feed_watchdog().await.unwrap_err(), DeviceError::CommBroken);
        assert_eq!(device.arm().await.unwrap_err(), DeviceError::CommBroken);
        assert_eq!(device.current(AxisSide::Left).await.unwrap_err(), DeviceError::CommBroken);
    }
}
