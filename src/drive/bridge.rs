//! Drive bridge orchestrator.
//!
//! Owns the device handle, the state machine, the command store, and the
//! liveness watchdog for one controller, and runs the two loops:
//!
//! - the control loop connects, arms, feeds the device-side watchdog, and
//!   applies the stored velocity command while armed;
//! - the telemetry loop advances the liveness heartbeat and publishes
//!   per-axis samples.
//!
//! Neither loop has a fixed tick rate; both run as fast as the blocking
//! device I/O allows. State transitions happen only inside the control loop,
//! so the state needs no lock; other tasks observe it through a watch
//! channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch, RwLock};
use tracing::{info, warn};

use crate::protocol::{BusMessage, DriveStateData, DriveVelData};

use super::command::{CommandIngress, VelocityCommand, VelocityCommandStore};
use super::device::{ActuatorDevice, DeviceConfig, DeviceError};
use super::link::LinkDiscovery;
use super::state::{transition, BridgeEvent, BridgeState, SideEffect};
use super::watchdog::LivenessWatchdog;
use super::{AxisSide, WheelPair};

/// Telemetry-loop yield while no device handle exists; there is no device
/// I/O to pace the loop otherwise.
const IDLE_POLL_DELAY: Duration = Duration::from_millis(10);

type DeviceSlot = Arc<RwLock<Option<Arc<ActuatorDevice>>>>;

/// One bridge instance, bound to one physical controller.
pub struct DriveBridge {
    pair: WheelPair,
    config: DeviceConfig,
    discovery: Arc<dyn LinkDiscovery>,
    slot: DeviceSlot,
    store: Arc<VelocityCommandStore>,
    watchdog: Arc<LivenessWatchdog>,
    state: BridgeState,
    state_tx: watch::Sender<BridgeState>,
    bus_tx: broadcast::Sender<BusMessage>,
    shutdown_rx: watch::Receiver<bool>,
    liveness_lost: bool,
}

impl DriveBridge {
    pub fn new(
        pair: WheelPair,
        config: DeviceConfig,
        discovery: Arc<dyn LinkDiscovery>,
        watchdog: LivenessWatchdog,
        bus_tx: broadcast::Sender<BusMessage>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let (state_tx, _) = watch::channel(BridgeState::Disconnected);
        Self {
            pair,
            config,
            discovery,
            slot: Arc::new(RwLock::new(None)),
            store: Arc::new(VelocityCommandStore::new()),
            watchdog: Arc::new(watchdog),
            state: BridgeState::Disconnected,
            state_tx,
            bus_tx,
            shutdown_rx,
            liveness_lost: false,
        }
    }

    pub fn pair(&self) -> WheelPair {
        self.pair
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    /// Ingress gate for the connection handlers; cheap to clone per client.
    pub fn ingress(&self) -> CommandIngress {
        CommandIngress::new(Arc::clone(&self.store), self.state_tx.subscribe())
    }

    pub fn command_store(&self) -> Arc<VelocityCommandStore> {
        Arc::clone(&self.store)
    }

    /// Telemetry worker sharing this bridge's device slot and watchdog.
    pub fn telemetry_worker(&self) -> TelemetryWorker {
        TelemetryWorker {
            pair: self.pair,
            slot: Arc::clone(&self.slot),
            watchdog: Arc::clone(&self.watchdog),
            bus_tx: self.bus_tx.clone(),
            shutdown_rx: self.shutdown_rx.clone(),
        }
    }

    pub async fn has_device(&self) -> bool {
        self.slot.read().await.is_some()
    }

    /// Control loop: runs until the shutdown flag is raised, checked once
    /// per iteration.
    pub async fn run(mut self) {
        info!(pair = %self.pair, controller = %self.config.controller_id, "drive bridge starting");
        while !*self.shutdown_rx.borrow() {
            self.control_tick().await;
        }
        info!(pair = %self.pair, "drive bridge stopping");
    }

    /// One control-loop iteration.
    pub async fn control_tick(&mut self) {
        // Fail-safe override: a stale telemetry heartbeat forces the stored
        // command to zero before the state is evaluated.
        if self.watchdog.stale() {
            if !self.liveness_lost {
                self.liveness_lost = true;
                warn!(pair = %self.pair, "loss of liveness; forcing zero velocity");
            }
            self.store.set(VelocityCommand::ZERO);
        } else if self.liveness_lost {
            self.liveness_lost = false;
            info!(pair = %self.pair, "regained liveness");
        }

        match self.state {
            BridgeState::Disconnected => self.tick_disconnected().await,
            BridgeState::Armed => self.tick_armed().await,
            // Error is transient: always re-raise the fault so the next
            // tick lands back in Disconnected and reconnects
            BridgeState::Error => self.dispatch(BridgeEvent::FaultDetected).await,
        }
    }

    async fn tick_disconnected(&mut self) {
        match ActuatorDevice::connect(self.discovery.as_ref(), &self.config).await {
            Ok(device) => {
                *self.slot.write().await = Some(Arc::new(device));
                self.dispatch(BridgeEvent::ArmRequested).await;
            }
            Err(_) => {
                // Channel broke during post-discovery configuration; retry
                // the connect on the next tick
                self.dispatch(BridgeEvent::ConnectionLost).await;
            }
        }
    }

    async fn tick_armed(&mut self) {
        let Some(device) = self.device().await else {
            self.dispatch(BridgeEvent::ConnectionLost).await;
            return;
        };

        let faults = match device.has_faults().await {
            Ok(faults) => faults,
            Err(_) => {
                self.dispatch(BridgeEvent::ConnectionLost).await;
                return;
            }
        };
        if device.feed_watchdog().await.is_err() {
            self.dispatch(BridgeEvent::ConnectionLost).await;
            return;
        }
        if faults {
            self.dispatch(BridgeEvent::FaultDetected).await;
            return;
        }

        let cmd = self.store.get();
        for (side, value) in [(AxisSide::Left, cmd.left), (AxisSide::Right, cmd.right)] {
            match device.set_velocity(side, value).await {
                Ok(()) => {}
                Err(DeviceError::CommBroken) => {
                    self.dispatch(BridgeEvent::ConnectionLost).await;
                    return;
                }
                Err(err @ DeviceError::InvalidCommand(_)) => {
                    // Store contents are clamped at ingress; this is a
                    // contract bug upstream, not a device condition
                    warn!(pair = %self.pair, %side, %err, "rejected stored velocity");
                    return;
                }
            }
        }
    }

    async fn device(&self) -> Option<Arc<ActuatorDevice>> {
        self.slot.read().await.clone()
    }

    /// Runs the transition for `event`: effects first, in order, then the
    /// state assignment. A broken channel in a device-mutating effect aborts
    /// the dispatch and leaves the state unchanged.
    async fn dispatch(&mut self, event: BridgeEvent) {
        let t = transition(self.state, event);
        for effect in t.effects {
            if let Err(err) = self.apply_effect(*effect).await {
                warn!(pair = %self.pair, ?event, %err, "state transition aborted");
                return;
            }
        }
        if t.next != self.state {
            info!(pair = %self.pair, from = %self.state, to = %t.next, "bridge state change");
            self.state = t.next;
            // send_replace: the new state must be stored even while no
            // ingress receiver exists yet
            self.state_tx.send_replace(t.next);
            let _ = self.bus_tx.send(BusMessage::DriveStateData(DriveStateData {
                pair: self.pair.label().to_owned(),
                state: t.next,
            }));
        }
    }

    async fn apply_effect(&mut self, effect: SideEffect) -> Result<(), DeviceError> {
        match effect {
            SideEffect::Disarm => self.required_device().await?.disarm().await,
            SideEffect::ResetWatchdog => self.required_device().await?.reset_watchdog().await,
            SideEffect::Arm => self.required_device().await?.arm().await,
            SideEffect::ReleaseHandle => {
                *self.slot.write().await = None;
                Ok(())
            }
            SideEffect::DumpDiagnostics => {
                if let Some(device) = self.device().await {
                    device.fault_dump().await;
                }
                Ok(())
            }
        }
    }

    async fn required_device(&self) -> Result<Arc<ActuatorDevice>, DeviceError> {
        self.device().await.ok_or(DeviceError::CommBroken)
    }
}

/// Telemetry loop for one bridge instance.
///
/// Advances the liveness heartbeat once per iteration, then samples current
/// and velocity for both axes and publishes one message per axis. A broken
/// channel abandons the iteration; it is retried on the next cycle.
pub struct TelemetryWorker {
    pair: WheelPair,
    slot: DeviceSlot,
    watchdog: Arc<LivenessWatchdog>,
    bus_tx: broadcast::Sender<BusMessage>,
    shutdown_rx: watch::Receiver<bool>,
}

impl TelemetryWorker {
    pub async fn run(self) {
        info!(pair = %self.pair, "telemetry loop starting");
        while !*self.shutdown_rx.borrow() {
            self.iterate().await;
        }
        info!(pair = %self.pair, "telemetry loop stopping");
    }

    /// One telemetry iteration: heartbeat, then sample and publish.
    pub async fn iterate(&self) {
        self.watchdog.beat();

        let Some(device) = self.slot.read().await.clone() else {
            tokio::time::sleep(IDLE_POLL_DELAY).await;
            return;
        };

        for side in AxisSide::BOTH {
            let Ok(sample) = device.sample(side).await else { return };
            let _ = self.bus_tx.send(BusMessage::DriveVelData(DriveVelData {
                wheel: self.pair.wheel_label(sample.axis),
                current_amps: sample.current_amps,
                velocity_m_s: sample.velocity_m_s,
            }));
        }
    }
}
