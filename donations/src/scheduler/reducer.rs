//! Appointment state machine.
//!
//! `scheduled → confirmed`, then one terminal transition out of either:
//! `completed`, `no_show` or `cancelled`. Replaying the terminal transition
//! that already happened emits nothing; any other move out of a terminal
//! state is an invalid transition.

use hemolink_core::environment::Clock;
use hemolink_core::reducer::Reducer;
use hemolink_core::{
    Appointment, AppointmentStatus, DomainError, LifecycleEvent, Operation, SmallVec, smallvec,
};
use std::sync::Arc;

/// Commands against a single appointment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppointmentAction {
    /// The donor confirms attendance
    Confirm,
    /// The donation was taken
    MarkCompleted,
    /// The donor did not come
    MarkNoShow,
    /// Called off
    Cancel,
}

impl AppointmentAction {
    /// Operation label for errors and logs.
    #[must_use]
    pub const fn operation(self) -> Operation {
        match self {
            Self::Confirm => Operation::Confirm,
            Self::MarkCompleted => Operation::MarkCompleted,
            Self::MarkNoShow => Operation::MarkNoShow,
            Self::Cancel => Operation::CancelAppointment,
        }
    }

    const fn target(self) -> AppointmentStatus {
        match self {
            Self::Confirm => AppointmentStatus::Confirmed,
            Self::MarkCompleted => AppointmentStatus::Completed,
            Self::MarkNoShow => AppointmentStatus::NoShow,
            Self::Cancel => AppointmentStatus::Cancelled,
        }
    }
}

/// Environment for [`AppointmentReducer`].
#[derive(Clone)]
pub struct AppointmentEnvironment {
    /// Timestamps for `updated_at` and events
    pub clock: Arc<dyn Clock>,
}

impl AppointmentEnvironment {
    /// Creates a new environment.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

/// Transition rules for [`Appointment`].
#[derive(Clone, Copy, Debug, Default)]
pub struct AppointmentReducer;

impl AppointmentReducer {
    /// Creates a new reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Reducer for AppointmentReducer {
    type State = Appointment;
    type Action = AppointmentAction;
    type Environment = AppointmentEnvironment;
    type Event = LifecycleEvent;

    fn reduce(
        &self,
        state: &mut Appointment,
        action: AppointmentAction,
        env: &AppointmentEnvironment,
    ) -> Result<SmallVec<[LifecycleEvent; 4]>, DomainError> {
        use AppointmentStatus::{Confirmed, Scheduled};

        let target = action.target();
        let legal = match action {
            AppointmentAction::Confirm => state.status == Scheduled,
            _ => matches!(state.status, Scheduled | Confirmed),
        };

        if !legal {
            return if state.status == target {
                Ok(SmallVec::new())
            } else {
                Err(DomainError::InvalidTransition {
                    current: state.status.as_str(),
                    attempted: action.operation(),
                })
            };
        }

        let now = env.clock.now();
        state.status = target;
        state.updated_at = now;

        let event = match action {
            AppointmentAction::Confirm => LifecycleEvent::AppointmentConfirmed {
                appointment_id: state.id,
                donor_id: state.donor_id,
                hospital_id: state.hospital_id,
                scheduled_at: state.scheduled_at,
            },
            AppointmentAction::MarkCompleted => LifecycleEvent::AppointmentCompleted {
                appointment_id: state.id,
                request_id: state.request_id,
                donor_id: state.donor_id,
                hospital_id: state.hospital_id,
                blood_group: state.blood_group,
                units: state.units,
                at: now,
            },
            AppointmentAction::MarkNoShow => LifecycleEvent::AppointmentNoShow {
                appointment_id: state.id,
                donor_id: state.donor_id,
                hospital_id: state.hospital_id,
                at: now,
            },
            AppointmentAction::Cancel => LifecycleEvent::AppointmentCancelled {
                appointment_id: state.id,
                request_id: state.request_id,
                donor_id: state.donor_id,
                hospital_id: state.hospital_id,
                at: now,
            },
        };

        Ok(smallvec![event])
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use hemolink_core::{DonorId, HospitalId};
    use hemolink_testing::{ReducerTest, fixtures, test_clock};

    fn env() -> AppointmentEnvironment {
        AppointmentEnvironment::new(Arc::new(test_clock()))
    }

    fn appointment_in(status: AppointmentStatus) -> Appointment {
        let mut appointment =
            fixtures::appointment(DonorId::new(), HospitalId::new(), test_clock().now());
        appointment.status = status;
        appointment
    }

    #[test]
    fn confirmed_appointment_can_complete() {
        ReducerTest::new(AppointmentReducer::new())
            .with_env(env())
            .given_state(appointment_in(AppointmentStatus::Confirmed))
            .when_action(AppointmentAction::MarkCompleted)
            .then_state(|a| assert_eq!(a.status, AppointmentStatus::Completed))
            .then_events(|events| {
                assert!(matches!(
                    events,
                    [LifecycleEvent::AppointmentCompleted { units: 1, .. }]
                ));
            })
            .run();
    }

    #[test]
    fn replaying_the_same_terminal_transition_emits_nothing() {
        for (status, action) in [
            (AppointmentStatus::Completed, AppointmentAction::MarkCompleted),
            (AppointmentStatus::Cancelled, AppointmentAction::Cancel),
            (AppointmentStatus::NoShow, AppointmentAction::MarkNoShow),
            (AppointmentStatus::Confirmed, AppointmentAction::Confirm),
        ] {
            ReducerTest::new(AppointmentReducer::new())
                .with_env(env())
                .given_state(appointment_in(status))
                .when_action(action)
                .then_events(|events| assert!(events.is_empty()))
                .run();
        }
    }

    #[test]
    fn a_different_terminal_transition_is_invalid() {
        ReducerTest::new(AppointmentReducer::new())
            .with_env(env())
            .given_state(appointment_in(AppointmentStatus::Cancelled))
            .when_action(AppointmentAction::MarkCompleted)
            .then_error(|e| {
                assert_eq!(
                    e,
                    &DomainError::InvalidTransition {
                        current: "cancelled",
                        attempted: Operation::MarkCompleted
                    }
                );
            })
            .run();
    }

    #[test]
    fn completed_appointment_cannot_be_confirmed() {
        ReducerTest::new(AppointmentReducer::new())
            .with_env(env())
            .given_state(appointment_in(AppointmentStatus::Completed))
            .when_action(AppointmentAction::Confirm)
            .then_error(|e| assert!(matches!(e, DomainError::InvalidTransition { .. })))
            .run();
    }
}
