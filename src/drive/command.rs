//! Velocity command store and ingress.
//!
//! The store is a latest-value cell behind its own lock, independent of the
//! device channel lock, so inbound commands never wait on hardware I/O. The
//! ingress gate clamps every inbound command and only lets it through while
//! the bridge is armed; commands received in any other state are accepted
//! and discarded.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::state::BridgeState;

/// Normalized velocity demand for both axes, each in `[-1.0, 1.0]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VelocityCommand {
    pub left: f32,
    pub right: f32,
}

impl VelocityCommand {
    pub const ZERO: VelocityCommand = VelocityCommand { left: 0.0, right: 0.0 };

    /// Builds a command with both sides clamped into range.
    pub fn new(left: f32, right: f32) -> Self {
        Self {
            left: clamp(left),
            right: clamp(right),
        }
    }
}

/// Clamps a normalized velocity into `[-1.0, 1.0]`. Total over all inputs:
/// NaN folds to 0.0 (stop), so a malformed command can never reach the
/// controller.
pub fn clamp(v: f32) -> f32 {
    if v.is_nan() {
        return 0.0;
    }
    v.clamp(-1.0, 1.0)
}

/// Thread-safe latest-value holder for the desired wheel velocities.
#[derive(Debug, Default)]
pub struct VelocityCommandStore {
    inner: Mutex<VelocityCommand>,
}

impl VelocityCommandStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, cmd: VelocityCommand) {
        *self.inner.lock().unwrap() = cmd;
    }

    pub fn get(&self) -> VelocityCommand {
        *self.inner.lock().unwrap()
    }
}

/// Inbound command gate for one bridge instance.
///
/// Cheap to clone into the connection handler tasks; observes the bridge
/// state through a watch channel fed by the control loop.
#[derive(Debug, Clone)]
pub struct CommandIngress {
    store: Arc<VelocityCommandStore>,
    state_rx: watch::Receiver<BridgeState>,
}

impl CommandIngress {
    pub fn new(store: Arc<VelocityCommandStore>, state_rx: watch::Receiver<BridgeState>) -> Self {
        Self { store, state_rx }
    }

    /// Delivers one inbound command. Both sides are clamped; the store is
    /// only written while the bridge is armed.
    pub fn deliver(&self, left: f32, right: f32) {
        let cmd = VelocityCommand::new(left, right);
        if *self.state_rx.borrow() == BridgeState::Armed {
            self.store.set(cmd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_is_total() {
        assert_eq!(clamp(0.5), 0.5);
        assert_eq!(clamp(-1.0), -1.0);
        assert_eq!(clamp(1.0), 1.0);
        assert_eq!(clamp(3.7), 1.0);
        assert_eq!(clamp(-250.0), -1.0);
        assert_eq!(clamp(f32::INFINITY), 1.0);
        assert_eq!(clamp(f32::NEG_INFINITY), -1.0);
        assert_eq!(clamp(f32::NAN), 0.0);
    }

    #[test]
    fn test_clamp_is_idempotent() {
        for v in [-5.0, -1.0, -0.3, 0.0, 0.99, 1.0, 42.0, f32::NAN] {
            assert_eq!(clamp(clamp(v)), clamp(v));
        }
    }

    #[test]
    fn test_command_constructor_clamps_both_sides() {
        let cmd = VelocityCommand::new(2.0, -1.5);
        assert_eq!(cmd, VelocityCommand { left: 1.0, right: -1.0 });
    }

    #[test]
    fn test_store_holds_latest_value() {
        let store = VelocityCommandStore::new();
        assert_eq!(store.get(), VelocityCommand::ZERO);

        store.set(VelocityCommand::new(0.25, -0.5));
        store.set(VelocityCommand::new(0.75, 0.5));
        assert_eq!(store.get(), VelocityCommand { left: 0.75, right: 0.5 });
    }

    #[test]
    fn test_ingress_discards_commands_unless_armed() {
        let store = Arc::new(VelocityCommandStore::new());
        let (state_tx, state_rx) = watch::channel(BridgeState::Disconnected);
        let ingress = CommandIngress::new(Arc::clone(&store), state_rx);

        // Disconnected: accepted but discarded
        ingress.deliver(0.5, 0.5);
        assert_eq!(store.get(), VelocityCommand::ZERO);

        // Error: still discarded
        state_tx.send(BridgeState::Error).unwrap();
        ingress.deliver(0.5, 0.5);
        assert_eq!(store.get(), VelocityCommand::ZERO);

        // Armed: written through, clamped
        state_tx.send(BridgeState::Armed).unwrap();
        ingress.deliver(1.5, -0.25);
        assert_eq!(store.get(), VelocityCommand { left: 1.0, right: -0.25 });

        // Back out of Armed: the store keeps its last armed value
        state_tx.send(BridgeState::Disconnected).unwrap();
        ingress.deliver(0.0, 0.0);
        assert_eq!(store.get(), VelocityCommand { left: 1.0, right: -0.25 });
    }
}
