//! Error taxonomy for the donation core.
//!
//! Two layers:
//!
//! - [`StoreError`] is what storage backends return. It describes storage
//!   outcomes (missing row, failed condition, transport failure).
//! - [`DomainError`] is what callers of the core see. Domain-rule errors are
//!   terminal and surfaced verbatim; only [`DomainError::Unavailable`] is
//!   retryable.

use thiserror::Error;

/// Operations that can be attempted against a request or appointment.
///
/// Used to report which operation hit an invalid transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Donor accepts a request
    Accept,
    /// Donor hides a request
    Ignore,
    /// Hospital withdraws a pending request
    Deactivate,
    /// Hospital books the accepted donor
    Schedule,
    /// Hospital cancels a request
    Cancel,
    /// Hospital completes a request
    Complete,
    /// Hospital reopens a cancelled request
    Reopen,
    /// Donor confirms an appointment
    Confirm,
    /// Appointment marked completed
    MarkCompleted,
    /// Appointment marked as a no-show
    MarkNoShow,
    /// Appointment cancelled
    CancelAppointment,
}

impl Operation {
    /// Short label for logs and messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Ignore => "ignore",
            Self::Deactivate => "deactivate",
            Self::Schedule => "schedule",
            Self::Cancel => "cancel",
            Self::Complete => "complete",
            Self::Reopen => "reopen",
            Self::Confirm => "confirm",
            Self::MarkCompleted => "mark_completed",
            Self::MarkNoShow => "mark_no_show",
            Self::CancelAppointment => "cancel_appointment",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by the donation core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The operation is not an edge out of the record's current state.
    #[error("cannot {attempted} from state {current}")]
    InvalidTransition {
        /// Status label at the time of the attempt
        current: &'static str,
        /// What was attempted
        attempted: Operation,
    },

    /// Lost the exclusive accept race: another donor already won.
    #[error("request {request} was already resolved")]
    AlreadyResolved {
        /// Request id
        request: String,
    },

    /// The donor already has an appointment too close to the requested slot.
    #[error("donor {donor} already has appointment {existing} in this slot")]
    SlotConflict {
        /// Donor id
        donor: String,
        /// Conflicting appointment id
        existing: String,
    },

    /// A decrement would take a stock counter below zero.
    #[error("insufficient units: requested {requested}, available {available}")]
    InsufficientUnits {
        /// Units on hand
        available: u32,
        /// Units asked for
        requested: u32,
    },

    /// Record does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Record kind
        entity: &'static str,
        /// Record id
        id: String,
    },

    /// Transient store failure or deadline elapsed; safe to retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Malformed input.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// The actor may not perform this operation on this record.
    #[error("forbidden: {0}")]
    Forbidden(String),
}

impl DomainError {
    /// Only transient failures are worth retrying; domain outcomes never change on retry.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Shorthand for [`DomainError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for [`DomainError::ValidationFailed`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::ValidationFailed(message.into())
    }
}

/// Errors returned by storage backends.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No row with this id.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Record kind
        entity: &'static str,
        /// Record id
        id: String,
    },

    /// A conditional update found a different status than expected.
    #[error("conditional update failed: expected {expected}, found {actual}")]
    ConditionFailed {
        /// Status the caller expected
        expected: &'static str,
        /// Status actually stored
        actual: &'static str,
    },

    /// An atomic decrement would go below zero.
    #[error("counter underflow: requested {requested}, available {available}")]
    Underflow {
        /// Units on hand
        available: u32,
        /// Units asked for
        requested: u32,
    },

    /// Insert collided with an existing id.
    #[error("{entity} {id} already exists")]
    Conflict {
        /// Record kind
        entity: &'static str,
        /// Record id
        id: String,
    },

    /// Backend temporarily unreachable.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Backend reported an error.
    #[error("database error: {0}")]
    Database(String),

    /// Stored data could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<StoreError> for DomainError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            StoreError::Underflow {
                available,
                requested,
            } => Self::InsufficientUnits {
                available,
                requested,
            },
            StoreError::Conflict { entity, id } => {
                Self::ValidationFailed(format!("{entity} {id} already exists"))
            }
            // A lost conditional update outside the exclusive accept path means
            // the record moved underneath us; reloading and retrying is safe.
            StoreError::ConditionFailed { expected, actual } => Self::Unavailable(format!(
                "concurrent update: expected {expected}, found {actual}"
            )),
            StoreError::Unavailable(message)
            | StoreError::Database(message)
            | StoreError::Serialization(message) => Self::Unavailable(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_is_retryable() {
        assert!(DomainError::Unavailable("timeout".into()).is_retryable());
        assert!(!DomainError::AlreadyResolved { request: "r1".into() }.is_retryable());
        assert!(!DomainError::invalid("bad date").is_retryable());
        assert!(
            !DomainError::InsufficientUnits {
                available: 0,
                requested: 1
            }
            .is_retryable()
        );
    }

    #[test]
    fn invalid_transition_display() {
        let error = DomainError::InvalidTransition {
            current: "pending",
            attempted: Operation::Complete,
        };
        assert_eq!(error.to_string(), "cannot complete from state pending");
    }

    #[test]
    fn store_underflow_maps_to_insufficient_units() {
        let error: DomainError = StoreError::Underflow {
            available: 2,
            requested: 5,
        }
        .into();
        assert_eq!(
            error,
            DomainError::InsufficientUnits {
                available: 2,
                requested: 5
            }
        );
    }

    #[test]
    fn store_transport_errors_are_retryable() {
        let error: DomainError = StoreError::Database("connection reset".into()).into();
        assert!(error.is_retryable());
    }
}
