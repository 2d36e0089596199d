use roverbus::drive::state::{transition, BridgeEvent, BridgeState, SideEffect};

use BridgeEvent::*;
use BridgeState::*;

#[test]
fn test_transition_table_is_total() {
    // Every (state, event) pair has a defined next state
    for state in [Disconnected, Armed, Error] {
        for event in [ConnectionLost, ArmRequested, FaultDetected] {
            let t = transition(state, event);
            assert!(
                matches!(t.next, Disconnected | Armed | Error),
                "undefined transition for {state:?} + {event:?}"
            );
        }
    }
}

#[test]
fn test_disconnected_transitions() {
    let t = transition(Disconnected, ArmRequested);
    assert_eq!(t.next, Armed);
    assert_eq!(
        t.effects,
        &[SideEffect::Disarm, SideEffect::ResetWatchdog, SideEffect::Arm]
    );

    // Connection loss and faults are no-ops while already disconnected
    let t = transition(Disconnected, ConnectionLost);
    assert_eq!(t.next, Disconnected);
    assert!(t.effects.is_empty());

    let t = transition(Disconnected, FaultDetected);
    assert_eq!(t.next, Disconnected);
    assert!(t.effects.is_empty());
}

#[test]
fn test_armed_transitions() {
    let t = transition(Armed, ConnectionLost);
    assert_eq!(t.next, Disconnected);
    assert_eq!(t.effects, &[SideEffect::ReleaseHandle]);

    let t = transition(Armed, FaultDetected);
    assert_eq!(t.next, Error);
    assert_eq!(t.effects, &[SideEffect::DumpDiagnostics]);

    // Re-arming while armed is idempotent
    let t = transition(Armed, ArmRequested);
    assert_eq!(t.next, Armed);
    assert!(t.effects.is_empty());
}

#[test]
fn test_error_transitions() {
    // Only a fault event advances out of Error, dropping the handle
    let t = transition(Error, FaultDetected);
    assert_eq!(t.next, Disconnected);
    assert_eq!(
        t.effects,
        &[SideEffect::DumpDiagnostics, SideEffect::ReleaseHandle]
    );

    let t = transition(Error, ArmRequested);
    assert_eq!(t.next, Error);
    assert!(t.effects.is_empty());
}

#[test]
fn test_error_plus_connection_lost_is_a_no_op() {
    // Asymmetric with every other state's ConnectionLost handling,
    // preserved deliberately from the source behavior
    let t = transition(Error, ConnectionLost);
    assert_eq!(t.next, Error);
    assert!(t.effects.is_empty());
}

#[test]
fn test_error_is_transient_via_repeated_faults() {
    // Armed -> Error -> Disconnected in two fault dispatches
    let t = transition(Armed, FaultDetected);
    assert_eq!(t.next, Error);
    let t = transition(t.next, FaultDetected);
    assert_eq!(t.next, Disconnected);
}

#[test]
fn test_state_labels() {
    assert_eq!(Disconnected.label(), "Disconnected");
    assert_eq!(Armed.label(), "Armed");
    assert_eq!(Error.label(), "Error");
    assert_eq!(Armed.to_string(), "Armed");
}

#[test]
fn test_state_serializes_as_bare_label() {
    assert_eq!(serde_json::to_string(&Armed).unwrap(), "\"Armed\"");
    assert_eq!(
        serde_json::from_str::<BridgeState>("\"Disconnected\"").unwrap(),
        Disconnected
    );
}
