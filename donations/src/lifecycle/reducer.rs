//! Request state machine.
//!
//! ```text
//! Pending ──accept──▶ Accepted ──schedule──▶ Scheduled ──complete──▶ Completed
//!    │                   │                       │
//!    └─deactivate─▶ Ignored  └────cancel────▶ Cancelled ◀──cancel──┘
//!                                                │
//!                              Pending ◀─reopen──┘
//! ```
//!
//! The reducer validates first and mutates last, so a rejected action leaves
//! the request exactly as it was. A replay of an action that already took
//! effect (the winner re-accepting, a second cancel, a second complete, a
//! schedule naming the appointment already recorded) returns no events; the service treats an empty event list as "nothing to
//! write".

use chrono::{DateTime, Utc};
use hemolink_core::environment::Clock;
use hemolink_core::reducer::Reducer;
use hemolink_core::{
    AppointmentId, DomainError, Donor, LifecycleEvent, Operation, Request, RequestStatus, SmallVec, smallvec,
};
use std::sync::Arc;

/// Commands against a single request.
#[derive(Clone, Debug, PartialEq)]
pub enum RequestAction {
    /// A donor claims the request; carries the donor as loaded
    Accept {
        /// The donor record at the time of the call
        donor: Donor,
    },
    /// The hospital withdraws a pending request
    Deactivate,
    /// An appointment was booked for the assigned donor
    Schedule {
        /// Booked slot
        scheduled_at: DateTime<Utc>,
        /// The booking, recorded on the request by the same write
        appointment: AppointmentId,
    },
    /// The hospital calls the request off
    Cancel,
    /// The donation happened
    Complete,
    /// The hospital puts a cancelled request back on the board
    Reopen,
}

impl RequestAction {
    /// Operation label for errors and logs.
    #[must_use]
    pub const fn operation(&self) -> Operation {
        match self {
            Self::Accept { .. } => Operation::Accept,
            Self::Deactivate => Operation::Deactivate,
            Self::Schedule { .. } => Operation::Schedule,
            Self::Cancel => Operation::Cancel,
            Self::Complete => Operation::Complete,
            Self::Reopen => Operation::Reopen,
        }
    }
}

/// Environment for [`RequestReducer`].
#[derive(Clone)]
pub struct RequestEnvironment {
    /// Timestamps for `updated_at` and events
    pub clock: Arc<dyn Clock>,
}

impl RequestEnvironment {
    /// Creates a new environment.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

/// Transition rules for [`Request`].
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestReducer;

impl RequestReducer {
    /// Creates a new reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn invalid(state: &Request, action: &RequestAction) -> DomainError {
    DomainError::InvalidTransition {
        current: state.status.as_str(),
        attempted: action.operation(),
    }
}

impl Reducer for RequestReducer {
    type State = Request;
    type Action = RequestAction;
    type Environment = RequestEnvironment;
    type Event = LifecycleEvent;

    fn reduce(
        &self,
        state: &mut Request,
        action: RequestAction,
        env: &RequestEnvironment,
    ) -> Result<SmallVec<[LifecycleEvent; 4]>, DomainError> {
        let now = env.clock.now();

        match (&action, state.status) {
            // ═══════════════════════════════════════════════════════════
            // Accept: the only exclusive transition
            // ═══════════════════════════════════════════════════════════
            (RequestAction::Accept { donor }, RequestStatus::Pending) => {
                if !donor.available {
                    return Err(DomainError::invalid(format!(
                        "donor {} is not available",
                        donor.id
                    )));
                }
                if !donor.blood_group.can_donate_to(state.blood_group) {
                    return Err(DomainError::invalid(format!(
                        "donor group {} cannot donate to {}",
                        donor.blood_group, state.blood_group
                    )));
                }

                state.status = RequestStatus::Accepted;
                state.assigned_donor = Some(donor.id);
                state.updated_at = now;

                Ok(smallvec![LifecycleEvent::RequestAccepted {
                    request_id: state.id,
                    hospital_id: state.hospital_id,
                    donor_id: donor.id,
                    at: now,
                }])
            }
            (
                RequestAction::Accept { donor },
                RequestStatus::Accepted | RequestStatus::Scheduled | RequestStatus::Completed,
            ) => {
                if state.assigned_donor == Some(donor.id) {
                    Ok(SmallVec::new())
                } else {
                    Err(DomainError::AlreadyResolved {
                        request: state.id.to_string(),
                    })
                }
            }

            // ═══════════════════════════════════════════════════════════
            // Hospital-driven edges
            // ═══════════════════════════════════════════════════════════
            (RequestAction::Deactivate, RequestStatus::Pending) => {
                state.status = RequestStatus::Ignored;
                state.updated_at = now;

                Ok(smallvec![LifecycleEvent::RequestDeactivated {
                    request_id: state.id,
                    hospital_id: state.hospital_id,
                    at: now,
                }])
            }
            (RequestAction::Deactivate, RequestStatus::Ignored)
            | (RequestAction::Cancel, RequestStatus::Cancelled)
            | (RequestAction::Complete, RequestStatus::Completed) => Ok(SmallVec::new()),

            (RequestAction::Schedule { appointment, .. }, RequestStatus::Scheduled)
                if state.appointment_id == Some(*appointment) =>
            {
                Ok(SmallVec::new())
            }

            (RequestAction::Schedule { scheduled_at, appointment }, RequestStatus::Accepted) => {
                let Some(donor_id) = state.assigned_donor else {
                    return Err(invalid(state, &action));
                };
                state.status = RequestStatus::Scheduled;
                state.appointment_id = Some(*appointment);
                state.updated_at = now;

                Ok(smallvec![LifecycleEvent::RequestScheduled {
                    request_id: state.id,
                    hospital_id: state.hospital_id,
                    donor_id,
                    scheduled_at: *scheduled_at,
                    at: now,
                }])
            }

            (RequestAction::Cancel, RequestStatus::Accepted | RequestStatus::Scheduled) => {
                let released_donor = state.assigned_donor.take();
                state.status = RequestStatus::Cancelled;
                state.updated_at = now;

                Ok(smallvec![LifecycleEvent::RequestCancelled {
                    request_id: state.id,
                    hospital_id: state.hospital_id,
                    released_donor,
                    at: now,
                }])
            }

            (RequestAction::Complete, RequestStatus::Scheduled) => {
                let Some(donor_id) = state.assigned_donor else {
                    return Err(invalid(state, &action));
                };
                state.status = RequestStatus::Completed;
                state.updated_at = now;

                Ok(smallvec![LifecycleEvent::RequestCompleted {
                    request_id: state.id,
                    hospital_id: state.hospital_id,
                    donor_id,
                    at: now,
                }])
            }

            (RequestAction::Reopen, RequestStatus::Cancelled) => {
                state.status = RequestStatus::Pending;
                state.appointment_id = None;
                state.updated_at = now;

                Ok(smallvec![LifecycleEvent::RequestReopened {
                    request_id: state.id,
                    hospital_id: state.hospital_id,
                    at: now,
                }])
            }

            _ => Err(invalid(state, &action)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use hemolink_core::{BloodGroup, DonorId, HospitalId};
    use hemolink_testing::{ReducerTest, fixtures, properties, test_clock};
    use proptest::prelude::*;

    fn env() -> RequestEnvironment {
        RequestEnvironment::new(Arc::new(test_clock()))
    }

    fn request_in(status: RequestStatus, donor: Option<DonorId>) -> Request {
        let mut request = fixtures::pending_request(HospitalId::new(), BloodGroup::APos);
        request.status = status;
        request.assigned_donor = donor;
        request
    }

    #[test]
    fn accept_assigns_the_donor() {
        let donor = fixtures::donor(BloodGroup::ONeg);
        let donor_id = donor.id;

        ReducerTest::new(RequestReducer::new())
            .with_env(env())
            .given_state(request_in(RequestStatus::Pending, None))
            .when_action(RequestAction::Accept { donor })
            .then_state(move |r| {
                assert_eq!(r.status, RequestStatus::Accepted);
                assert_eq!(r.assigned_donor, Some(donor_id));
                assert!(r.donor_invariant_holds());
            })
            .then_events(|events| {
                assert_eq!(events.len(), 1);
                assert!(matches!(events[0], LifecycleEvent::RequestAccepted { .. }));
            })
            .run();
    }

    #[test]
    fn second_donor_gets_already_resolved() {
        let winner = DonorId::new();

        ReducerTest::new(RequestReducer::new())
            .with_env(env())
            .given_state(request_in(RequestStatus::Accepted, Some(winner)))
            .when_action(RequestAction::Accept {
                donor: fixtures::donor(BloodGroup::APos),
            })
            .then_error(|e| assert!(matches!(e, DomainError::AlreadyResolved { .. })))
            .run();
    }

    #[test]
    fn winner_replaying_accept_is_a_no_op() {
        let donor = fixtures::donor(BloodGroup::APos);
        let state = request_in(RequestStatus::Scheduled, Some(donor.id));

        ReducerTest::new(RequestReducer::new())
            .with_env(env())
            .given_state(state.clone())
            .when_action(RequestAction::Accept { donor })
            .then_state(move |r| assert_eq!(r, &state))
            .then_events(|events| assert!(events.is_empty()))
            .run();
    }

    #[test]
    fn accept_on_deactivated_request_is_invalid() {
        ReducerTest::new(RequestReducer::new())
            .with_env(env())
            .given_state(request_in(RequestStatus::Ignored, None))
            .when_action(RequestAction::Accept {
                donor: fixtures::donor(BloodGroup::APos),
            })
            .then_error(|e| {
                assert_eq!(
                    e,
                    &DomainError::InvalidTransition {
                        current: "ignored",
                        attempted: Operation::Accept
                    }
                );
            })
            .run();
    }

    #[test]
    fn incompatible_donor_is_rejected() {
        ReducerTest::new(RequestReducer::new())
            .with_env(env())
            .given_state(request_in(RequestStatus::Pending, None))
            .when_action(RequestAction::Accept {
                donor: fixtures::donor(BloodGroup::BPos),
            })
            .then_error(|e| assert!(matches!(e, DomainError::ValidationFailed(_))))
            .run();
    }

    #[test]
    fn unavailable_donor_is_rejected() {
        let mut donor = fixtures::donor(BloodGroup::APos);
        donor.available = false;

        ReducerTest::new(RequestReducer::new())
            .with_env(env())
            .given_state(request_in(RequestStatus::Pending, None))
            .when_action(RequestAction::Accept { donor })
            .then_error(|e| assert!(matches!(e, DomainError::ValidationFailed(_))))
            .run();
    }

    #[test]
    fn schedule_records_the_booking_and_replays_quietly() {
        let donor = DonorId::new();
        let appointment = AppointmentId::new();
        let action = RequestAction::Schedule {
            scheduled_at: test_clock().now(),
            appointment,
        };

        ReducerTest::new(RequestReducer::new())
            .with_env(env())
            .given_state(request_in(RequestStatus::Accepted, Some(donor)))
            .when_action(action.clone())
            .then_state(move |r| {
                assert_eq!(r.status, RequestStatus::Scheduled);
                assert_eq!(r.appointment_id, Some(appointment));
            })
            .then_events(|events| {
                assert!(matches!(events[0], LifecycleEvent::RequestScheduled { .. }));
            })
            .run();

        let mut scheduled = request_in(RequestStatus::Scheduled, Some(donor));
        scheduled.appointment_id = Some(appointment);
        ReducerTest::new(RequestReducer::new())
            .with_env(env())
            .given_state(scheduled.clone())
            .when_action(action)
            .then_events(|events| assert!(events.is_empty()))
            .run();

        // A different booking against the same request lost the race.
        ReducerTest::new(RequestReducer::new())
            .with_env(env())
            .given_state(scheduled)
            .when_action(RequestAction::Schedule {
                scheduled_at: test_clock().now(),
                appointment: AppointmentId::new(),
            })
            .then_error(|e| assert!(matches!(e, DomainError::InvalidTransition { .. })))
            .run();
    }

    #[test]
    fn cancel_releases_the_donor() {
        let donor = DonorId::new();

        ReducerTest::new(RequestReducer::new())
            .with_env(env())
            .given_state(request_in(RequestStatus::Scheduled, Some(donor)))
            .when_action(RequestAction::Cancel)
            .then_state(|r| {
                assert_eq!(r.status, RequestStatus::Cancelled);
                assert_eq!(r.assigned_donor, None);
            })
            .then_events(move |events| {
                assert!(matches!(
                    events[0],
                    LifecycleEvent::RequestCancelled { released_donor: Some(d), .. } if d == donor
                ));
            })
            .run();
    }

    #[test]
    fn cancel_and_complete_replays_emit_nothing() {
        for (status, action) in [
            (RequestStatus::Cancelled, RequestAction::Cancel),
            (RequestStatus::Ignored, RequestAction::Deactivate),
        ] {
            ReducerTest::new(RequestReducer::new())
                .with_env(env())
                .given_state(request_in(status, None))
                .when_action(action)
                .then_events(|events| assert!(events.is_empty()))
                .run();
        }

        ReducerTest::new(RequestReducer::new())
            .with_env(env())
            .given_state(request_in(RequestStatus::Completed, Some(DonorId::new())))
            .when_action(RequestAction::Complete)
            .then_events(|events| assert!(events.is_empty()))
            .run();
    }

    #[test]
    fn complete_from_accepted_is_invalid() {
        ReducerTest::new(RequestReducer::new())
            .with_env(env())
            .given_state(request_in(RequestStatus::Accepted, Some(DonorId::new())))
            .when_action(RequestAction::Complete)
            .then_error(|e| {
                assert_eq!(
                    e,
                    &DomainError::InvalidTransition {
                        current: "accepted",
                        attempted: Operation::Complete
                    }
                );
            })
            .run();
    }

    #[test]
    fn reopen_puts_a_cancelled_request_back_to_pending() {
        ReducerTest::new(RequestReducer::new())
            .with_env(env())
            .given_state(request_in(RequestStatus::Cancelled, None))
            .when_action(RequestAction::Reopen)
            .then_state(|r| assert_eq!(r.status, RequestStatus::Pending))
            .run();
    }

    fn any_action() -> impl Strategy<Value = RequestAction> {
        (properties::blood_group(), any::<bool>(), 0u8..6).prop_map(|(group, available, pick)| {
            match pick {
                0 => {
                    let mut donor = fixtures::donor(group);
                    donor.available = available;
                    RequestAction::Accept { donor }
                }
                1 => RequestAction::Deactivate,
                2 => RequestAction::Schedule {
                    scheduled_at: test_clock().now(),
                    appointment: AppointmentId::new(),
                },
                3 => RequestAction::Cancel,
                4 => RequestAction::Complete,
                _ => RequestAction::Reopen,
            }
        })
    }

    proptest! {
        #[test]
        fn every_applied_transition_is_a_legal_edge(
            actions in proptest::collection::vec(any_action(), 1..32)
        ) {
            let reducer = RequestReducer::new();
            let env = env();
            let mut request = request_in(RequestStatus::Pending, None);

            for action in actions {
                let before = request.clone();
                match reducer.reduce(&mut request, action, &env) {
                    Ok(events) if events.is_empty() => prop_assert_eq!(&request, &before),
                    Ok(_) => prop_assert!(before.status.can_transition_to(request.status)),
                    Err(_) => prop_assert_eq!(&request, &before),
                }
                prop_assert!(request.donor_invariant_holds());
            }
        }
    }
}
