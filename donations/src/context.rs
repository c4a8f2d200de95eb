//! Per-call context: who is calling and how long they are willing to wait.

use hemolink_core::{Actor, DomainError, DonorId, HospitalId};
use std::time::Duration;

/// Deadline used when the caller does not pick one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// The authenticated actor plus the deadline applied to each store call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallContext {
    /// Caller, as vouched for by the identity provider
    pub actor: Actor,
    /// Deadline for every individual store call made on this caller's behalf
    pub timeout: Duration,
}

impl CallContext {
    /// Context with an explicit deadline.
    #[must_use]
    pub const fn new(actor: Actor, timeout: Duration) -> Self {
        Self { actor, timeout }
    }

    /// A donor acting as themselves, with the default deadline.
    #[must_use]
    pub fn donor(id: DonorId) -> Self {
        Self::new(Actor::donor(id), DEFAULT_TIMEOUT)
    }

    /// A hospital acting on its own records, with the default deadline.
    #[must_use]
    pub fn hospital(id: HospitalId) -> Self {
        Self::new(Actor::hospital(id), DEFAULT_TIMEOUT)
    }

    /// Same actor, different deadline.
    #[must_use]
    pub const fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    /// Fails with `Forbidden` unless the caller is `donor`.
    ///
    /// # Errors
    ///
    /// [`DomainError::Forbidden`].
    pub fn require_donor(&self, donor: DonorId) -> Result<(), DomainError> {
        if self.actor.is_donor(donor) {
            Ok(())
        } else {
            Err(DomainError::Forbidden(format!(
                "{} may not act as donor {donor}",
                self.actor.user_id
            )))
        }
    }

    /// Fails with `Forbidden` unless the caller is `hospital`.
    ///
    /// # Errors
    ///
    /// [`DomainError::Forbidden`].
    pub fn require_hospital(&self, hospital: HospitalId) -> Result<(), DomainError> {
        if self.actor.is_hospital(hospital) {
            Ok(())
        } else {
            Err(DomainError::Forbidden(format!(
                "{} may not act for hospital {hospital}",
                self.actor.user_id
            )))
        }
    }

    /// The hospital this caller acts for, if it is one.
    #[must_use]
    pub fn hospital_id(&self) -> Option<HospitalId> {
        (self.actor.role == hemolink_core::Role::Hospital)
            .then(|| HospitalId::from_uuid(*self.actor.user_id.as_uuid()))
    }
}
