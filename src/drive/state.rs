//! Bridge control state machine.
//!
//! A pure transition table over {Disconnected, Armed, Error} and the events
//! {ConnectionLost, ArmRequested, FaultDetected}. The table is total; every
//! transition carries an ordered side-effect list that the control loop
//! executes before committing the new state. If a device-mutating effect
//! fails with a broken channel the dispatch aborts and the state is left
//! unchanged.
//!
//! Error is a transient state: the control loop re-raises `FaultDetected`
//! on every Error tick, so the machine always progresses to Disconnected and
//! a fresh reconnect/rearm attempt on the following tick.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Connection/arming state of one bridge instance. Owned exclusively by the
/// control loop; other tasks observe it through a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BridgeState {
    Disconnected,
    Armed,
    Error,
}

impl BridgeState {
    pub fn label(self) -> &'static str {
        match self {
            BridgeState::Disconnected => "Disconnected",
            BridgeState::Armed => "Armed",
            BridgeState::Error => "Error",
        }
    }
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Events fed to the state machine by the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeEvent {
    ConnectionLost,
    ArmRequested,
    FaultDetected,
}

/// Side effects attached to transitions, executed in order by the control
/// loop. Only the device-mutating effects (`Disarm`, `ResetWatchdog`, `Arm`)
/// can fail and abort a dispatch; `DumpDiagnostics` and `ReleaseHandle` are
/// infallible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    Disarm,
    ResetWatchdog,
    Arm,
    ReleaseHandle,
    DumpDiagnostics,
}

/// Result of one transition: the next state and the effects to run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: BridgeState,
    pub effects: &'static [SideEffect],
}

const NO_EFFECTS: &[SideEffect] = &[];
const ARM_SEQUENCE: &[SideEffect] = &[SideEffect::Disarm, SideEffect::ResetWatchdog, SideEffect::Arm];
const RELEASE: &[SideEffect] = &[SideEffect::ReleaseHandle];
const DUMP: &[SideEffect] = &[SideEffect::DumpDiagnostics];
const DUMP_AND_RELEASE: &[SideEffect] = &[SideEffect::DumpDiagnostics, SideEffect::ReleaseHandle];

/// The transition function, total over the 3x3 (state, event) domain.
///
/// `Error` + `ConnectionLost` is deliberately a no-op: only `FaultDetected`
/// advances out of Error. Asymmetric with the other states, preserved from
/// the source behavior.
pub fn transition(state: BridgeState, event: BridgeEvent) -> Transition {
    use BridgeEvent::*;
    use BridgeState::*;

    match (state, event) {
        (Disconnected, ArmRequested) => Transition { next: Armed, effects: ARM_SEQUENCE },
        (Disconnected, ConnectionLost) => Transition { next: Disconnected, effects: NO_EFFECTS },
        (Disconnected, FaultDetected) => Transition { next: Disconnected, effects: NO_EFFECTS },

        (Armed, ConnectionLost) => Transition { next: Disconnected, effects: RELEASE },
        (Armed, FaultDetected) => Transition { next: Error, effects: DUMP },
        (Armed, ArmRequested) => Transition { next: Armed, effects: NO_EFFECTS },

        (Error, FaultDetected) => Transition { next: Disconnected, effects: DUMP_AND_RELEASE },
        (Error, ConnectionLost) => Transition { next: Error, effects: NO_EFFECTS },
        (Error, ArmRequested) => Transition { next: Error, effects: NO_EFFECTS },
    }
}
