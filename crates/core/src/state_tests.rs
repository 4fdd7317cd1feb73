// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn state(name: &str) -> LockState {
    match name {
        "new" => LockState::New,
        "registering" => LockState::Registering,
        "registered" => LockState::Registered,
        "lost" => LockState::Lost,
        "releasing" => LockState::Releasing,
        "released" => LockState::Released,
        _ => panic!("Unknown state: {}", name),
    }
}

fn event(name: &str) -> LockEvent {
    match name {
        "register" => LockEvent::RegisterStarted,
        "registered" => LockEvent::RegisterSucceeded,
        "failed_to_new" => LockEvent::RegisterFailed {
            resume: LockState::New,
        },
        "failed_to_lost" => LockEvent::RegisterFailed {
            resume: LockState::Lost,
        },
        "failed_to_registered" => LockEvent::RegisterFailed {
            resume: LockState::Registered,
        },
        "renew_failed" => LockEvent::RenewFailed,
        "release" => LockEvent::ReleaseStarted,
        "release_done" => LockEvent::ReleaseFinished,
        _ => panic!("Unknown event: {}", name),
    }
}

#[parameterized(
    new_registers = { "new", "register", "registering" },
    lost_registers = { "lost", "register", "registering" },
    watch_delete_reregisters = { "registered", "register", "registering" },
    register_success = { "registering", "registered", "registered" },
    register_failure_keeps_new = { "registering", "failed_to_new", "new" },
    register_failure_keeps_lost = { "registering", "failed_to_lost", "lost" },
    register_failure_keeps_registered = { "registering", "failed_to_registered", "registered" },
    renew_failure_loses = { "registered", "renew_failed", "lost" },
    release_from_new = { "new", "release", "releasing" },
    release_from_registering = { "registering", "release", "releasing" },
    release_from_registered = { "registered", "release", "releasing" },
    release_from_lost = { "lost", "release", "releasing" },
    late_register_success_while_releasing = { "releasing", "registered", "releasing" },
    late_register_failure_while_releasing = { "releasing", "failed_to_new", "releasing" },
    release_completes = { "releasing", "release_done", "released" },
)]
fn valid_transitions(initial: &str, input: &str, expected: &str) {
    let next = state(initial).transition(event(input));
    assert_eq!(
        next,
        Ok(state(expected)),
        "{} --{}--> expected {}",
        initial,
        input,
        expected
    );
}

#[parameterized(
    renew_from_new = { "new", "renew_failed" },
    renew_from_lost = { "lost", "renew_failed" },
    renew_while_releasing = { "releasing", "renew_failed" },
    success_without_attempt = { "new", "registered" },
    success_after_release = { "released", "registered" },
    finish_without_start = { "registered", "release_done" },
    finish_twice = { "released", "release_done" },
)]
fn invalid_transitions(initial: &str, input: &str) {
    let result = state(initial).transition(event(input));
    assert!(
        matches!(result, Err(TransitionError::Invalid { .. })),
        "{} --{}--> should be invalid, got {:?}",
        initial,
        input,
        result
    );
}

#[test]
fn concurrent_register_fails_fast() {
    assert_eq!(
        LockState::Registering.transition(LockEvent::RegisterStarted),
        Err(TransitionError::AlreadyRegistering)
    );
}

#[test]
fn releasing_blocks_registration_and_second_release() {
    for s in [LockState::Releasing, LockState::Released] {
        assert_eq!(
            s.transition(LockEvent::RegisterStarted),
            Err(TransitionError::Releasing(s))
        );
        assert_eq!(
            s.transition(LockEvent::ReleaseStarted),
            Err(TransitionError::Releasing(s))
        );
    }
}

#[test]
fn register_failure_cannot_resume_into_transient_state() {
    let result = LockState::Registering.transition(LockEvent::RegisterFailed {
        resume: LockState::Registering,
    });
    assert!(matches!(result, Err(TransitionError::Invalid { .. })));
}

#[test]
fn releasing_predicate_covers_both_release_states() {
    assert!(LockState::Releasing.is_releasing());
    assert!(LockState::Released.is_releasing());
    assert!(!LockState::Registered.is_releasing());
    assert!(!LockState::Lost.is_releasing());
    assert!(LockState::Released.is_terminal());
    assert!(!LockState::Releasing.is_terminal());
}

#[test]
fn only_new_and_lost_need_registration() {
    assert!(LockState::New.needs_registration());
    assert!(LockState::Lost.needs_registration());
    assert!(!LockState::Registered.needs_registration());
    assert!(!LockState::Registering.needs_registration());
    assert!(!LockState::Released.needs_registration());
}

#[test]
fn display_and_serde_use_lowercase_names() {
    assert_eq!(LockState::Registered.to_string(), "registered");
    assert_eq!(
        serde_json::to_string(&LockState::Releasing).unwrap(),
        "\"releasing\""
    );
}
