//! Deterministic simulated controller.
//!
//! Stands in for the externally supplied transport so the stack runs
//! end-to-end without hardware. The [`SimHandle`] side of the pair injects
//! channel failures and axis faults while a bridge owns the link, and keeps
//! a bounded operation log so tests can assert exact hardware call order.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use heapless::Vec;

use super::link::{AxisState, ControlMode, ControllerLink, LinkDiscovery, LinkError};
use super::AxisSide;

const MAX_OP_LOG: usize = 256;

// Current model: idle draw plus a per-turn term, amperes.
const IDLE_CURRENT_A: f32 = 0.1;
const CURRENT_PER_TURN_S_A: f32 = 0.35;

/// One recorded hardware operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimOp {
    SetAxisState(AxisSide, AxisState),
    SetControlMode(AxisSide, ControlMode),
    SetInputVelocity(AxisSide, f32),
    ReadCurrent(AxisSide),
    ReadVelocity(AxisSide),
    ReadFaults(AxisSide),
    ClearFaults,
    SetCurrentLimit(f32),
    SetWatchdogTimeout(f32),
    EnableWatchdog(bool),
    FeedWatchdog,
}

#[derive(Debug)]
struct SimShared {
    plugged: bool,
    unplug_after: Option<u32>,
    fault_flags: [u32; 2],
    axis_state: [AxisState; 2],
    control_mode: [ControlMode; 2],
    input_velocity: [f32; 2],
    current_limit: f32,
    watchdog_timeout_s: f32,
    watchdog_enabled: bool,
    op_delay: Duration,
    ops: Vec<SimOp, MAX_OP_LOG>,
}

impl SimShared {
    fn new() -> Self {
        Self {
            plugged: true,
            unplug_after: None,
            fault_flags: [0; 2],
            axis_state: [AxisState::Idle; 2],
            control_mode: [ControlMode::Velocity; 2],
            input_velocity: [0.0; 2],
            current_limit: 0.0,
            watchdog_timeout_s: 0.0,
            watchdog_enabled: false,
            op_delay: Duration::ZERO,
            ops: Vec::new(),
        }
    }

    fn record(&mut self, op: SimOp) {
        // Bounded history: drop the oldest entry once full
        if self.ops.is_full() {
            self.ops.remove(0);
        }
        let _ = self.ops.push(op);
    }
}

fn axis_index(side: AxisSide) -> usize {
    match side {
        AxisSide::Left => 0,
        AxisSide::Right => 1,
    }
}

/// Simulated channel to a dual-axis controller.
///
/// Every operation blocks for the configured channel delay, then fails with
/// [`LinkError::Broken`] while the handle has the device unplugged.
pub struct SimController {
    shared: Arc<Mutex<SimShared>>,
}

impl SimController {
    fn op<T>(
        &mut self,
        op: SimOp,
        apply: impl FnOnce(&mut SimShared) -> T,
    ) -> Result<T, LinkError> {
        let delay = self.shared.lock().unwrap().op_delay;
        if !delay.is_zero() {
            // Models the hardware round trip; pacing of the bridge loops is
            // implicit in this latency.
            std::thread::sleep(delay);
        }

        let mut shared = self.shared.lock().unwrap();
        if let Some(remaining) = shared.unplug_after {
            if remaining == 0 {
                shared.plugged = false;
                shared.unplug_after = None;
            } else {
                shared.unplug_after = Some(remaining - 1);
            }
        }
        if !shared.plugged {
            return Err(LinkError::Broken);
        }
        shared.record(op);
        Ok(apply(&mut shared))
    }
}

impl ControllerLink for SimController {
    fn set_axis_state(&mut self, side: AxisSide, state: AxisState) -> Result<(), LinkError> {
        self.op(SimOp::SetAxisState(side, state), |s| {
            s.axis_state[axis_index(side)] = state;
        })
    }

    fn set_control_mode(&mut self, side: AxisSide, mode: ControlMode) -> Result<(), LinkError> {
        self.op(SimOp::SetControlMode(side, mode), |s| {
            s.control_mode[axis_index(side)] = mode;
        })
    }

    fn set_input_velocity(&mut self, side: AxisSide, turns_per_s: f32) -> Result<(), LinkError> {
        self.op(SimOp::SetInputVelocity(side, turns_per_s), |s| {
            s.input_velocity[axis_index(side)] = turns_per_s;
        })
    }

    fn measured_current(&mut self, side: AxisSide) -> Result<f32, LinkError> {
        self.op(SimOp::ReadCurrent(side), |s| {
            // Ideal response: current tracks the commanded velocity
            IDLE_CURRENT_A + s.input_velocity[axis_index(side)].abs() * CURRENT_PER_TURN_S_A
        })
    }

    fn velocity_estimate(&mut self, side: AxisSide) -> Result<f32, LinkError> {
        self.op(SimOp::ReadVelocity(side), |s| {
            // Ideal response: the axis runs at exactly the commanded velocity
            s.input_velocity[axis_index(side)]
        })
    }

    fn fault_flags(&mut self, side: AxisSide) -> Result<u32, LinkError> {
        self.op(SimOp::ReadFaults(side), |s| s.fault_flags[axis_index(side)])
    }

    fn clear_faults(&mut self) -> Result<(), LinkError> {
        self.op(SimOp::ClearFaults, |s| {
            s.fault_flags = [0; 2];
        })
    }

    fn set_current_limit(&mut self, amps: f32) -> Result<(), LinkError> {
        self.op(SimOp::SetCurrentLimit(amps), |s| {
            s.current_limit = amps;
        })
    }

    fn set_watchdog_timeout(&mut self, timeout_s: f32) -> Result<(), LinkError> {
        self.op(SimOp::SetWatchdogTimeout(timeout_s), |s| {
            s.watchdog_timeout_s = timeout_s;
        })
    }

    fn enable_watchdog(&mut self, enabled: bool) -> Result<(), LinkError> {
        self.op(SimOp::EnableWatchdog(enabled), |s| {
            s.watchdog_enabled = enabled;
        })
    }

    fn feed_watchdog(&mut self) -> Result<(), LinkError> {
        self.op(SimOp::FeedWatchdog, |_| {})
    }
}

/// Discovery over the simulated transport: probes succeed while the device
/// is plugged in and the requested controller id matches.
pub struct SimDiscovery {
    controller_id: String,
    shared: Arc<Mutex<SimShared>>,
}

impl SimDiscovery {
    pub fn new(controller_id: &str) -> (Self, SimHandle) {
        let shared = Arc::new(Mutex::new(SimShared::new()));
        (
            Self {
                controller_id: controller_id.to_owned(),
                shared: Arc::clone(&shared),
            },
            SimHandle { shared },
        )
    }
}

impl LinkDiscovery for SimDiscovery {
    fn probe(&self, controller_id: &str) -> Option<Box<dyn ControllerLink>> {
        let shared = self.shared.lock().unwrap();
        if shared.plugged && controller_id == self.controller_id {
            drop(shared);
            Some(Box::new(SimController {
                shared: Arc::clone(&self.shared),
            }))
        } else {
            None
        }
    }
}

/// Injection and inspection handle for the simulated controller.
#[derive(Clone)]
pub struct SimHandle {
    shared: Arc<Mutex<SimShared>>,
}

impl SimHandle {
    /// Breaks the channel: in-flight and subsequent operations fail and
    /// discovery probes return nothing until [`SimHandle::replug`].
    pub fn unplug(&self) {
        self.shared.lock().unwrap().plugged = false;
    }

    pub fn replug(&self) {
        self.shared.lock().unwrap().plugged = true;
    }

    /// Breaks the channel after `count` more successful operations; used to
    /// script failures in the middle of a multi-step sequence.
    pub fn unplug_after_ops(&self, count: u32) {
        self.shared.lock().unwrap().unplug_after = Some(count);
    }

    /// Raises fault flags on one axis, as controller firmware would.
    pub fn inject_fault(&self, side: AxisSide, flags: u32) {
        self.shared.lock().unwrap().fault_flags[axis_index(side)] = flags;
    }

    /// Per-operation channel latency.
    pub fn set_op_delay(&self, delay: Duration) {
        self.shared.lock().unwrap().op_delay = delay;
    }

    pub fn ops(&self) -> std::vec::Vec<SimOp> {
        self.shared.lock().unwrap().ops.iter().copied().collect()
    }

    pub fn clear_ops(&self) {
        self.shared.lock().unwrap().ops.clear();
    }

    pub fn input_velocity(&self, side: AxisSide) -> f32 {
        self.shared.lock().unwrap().input_velocity[axis_index(side)]
    }

    pub fn axis_state(&self, side: AxisSide) -> AxisState {
        self.shared.lock().unwrap().axis_state[axis_index(side)]
    }

    pub fn control_mode(&self, side: AxisSide) -> ControlMode {
        self.shared.lock().unwrap().control_mode[axis_index(side)]
    }

    pub fn current_limit(&self) -> f32 {
        self.shared.lock().unwrap().current_limit
    }

    pub fn watchdog_enabled(&self) -> bool {
        self.shared.lock().unwrap().watchdog_enabled
    }

    pub fn watchdog_timeout_s(&self) -> f32 {
        self.shared.lock().unwrap().watchdog_timeout_s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_matches_controller_id() {
        let (discovery, _handle) = SimDiscovery::new("207E39775453");

        assert!(discovery.probe("207E39775453").is_some());
        assert!(discovery.probe("other-controller").is_none());
    }

    #[test]
    fn test_unplug_breaks_link_and_probe() {
        let (discovery, handle) = SimDiscovery::new("sim-0");
        let mut link = discovery.probe("sim-0").expect("plugged-in probe");

        handle.unplug();
        assert_eq!(
            link.set_input_velocity(AxisSide::Left, 1.0),
            Err(LinkError::Broken)
        );
        assert!(discovery.probe("sim-0").is_none());

        handle.replug();
        assert!(link.feed_watchdog().is_ok());
        assert!(discovery.probe("sim-0").is_some());
    }

    #[test]
    fn test_op_log_records_order() {
        let (discovery, handle) = SimDiscovery::new("sim-0");
        let mut link = discovery.probe("sim-0").unwrap();

        link.set_input_velocity(AxisSide::Left, 2.5).unwrap();
        link.feed_watchdog().unwrap();

        assert_eq!(
            handle.ops(),
            vec![
                SimOp::SetInputVelocity(AxisSide::Left, 2.5),
                SimOp::FeedWatchdog,
            ]
        );
    }

    #[test]
    fn test_velocity_estimate_tracks_command() {
        let (discovery, _handle) = SimDiscovery::new("sim-0");
        let mut link = discovery.probe("sim-0").unwrap();

        link.set_input_velocity(AxisSide::Right, 10.0).unwrap();
        assert_eq!(link.velocity_estimate(AxisSide::Right).unwrap(), 10.0);
        assert!(link.measured_current(AxisSide::Right).unwrap() > IDLE_CURRENT_A);
    }

    #[test]
    fn test_fault_injection_visible_until_cleared() {
        let (discovery, handle) = SimDiscovery::new("sim-0");
        let mut link = discovery.probe("sim-0").unwrap();

        handle.inject_fault(AxisSide::Left, 0x40);
        assert_eq!(link.fault_flags(AxisSide::Left).unwrap(), 0x40);
        assert_eq!(link.fault_flags(AxisSide::Right).unwrap(), 0);

        link.clear_faults().unwrap();
        assert_eq!(link.fault_flags(AxisSide::Left).unwrap(), 0);
    }
}
