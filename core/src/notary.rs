//! Notarization contract for completed donations.
//!
//! A notarizer registers a completed donation with an external append-only
//! ledger and hands back an opaque reference. Calls are fire-and-forget from
//! the lifecycle's point of view: nothing in the core waits on them.

use crate::blood::BloodGroup;
use crate::types::{AppointmentId, DonationKind, DonorId, HospitalId, RequestId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// The facts that get notarized.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonationRecord {
    /// Appointment that completed
    pub appointment_id: AppointmentId,
    /// Originating request
    pub request_id: Option<RequestId>,
    /// Donor
    pub donor_id: DonorId,
    /// Receiving hospital
    pub hospital_id: HospitalId,
    /// Blood or plasma
    pub kind: DonationKind,
    /// Donated group
    pub blood_group: BloodGroup,
    /// Units collected
    pub units: u32,
    /// Completion time
    pub completed_at: DateTime<Utc>,
}

/// Notarization failures. None of them affect the donation itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotaryError {
    /// Notarization is switched off.
    #[error("notarization disabled")]
    Disabled,

    /// The ledger could not be reached.
    #[error("notary unreachable: {0}")]
    Transport(String),

    /// The ledger answered with an error.
    #[error("notary rejected record: {0}")]
    Rejected(String),

    /// The call did not finish in time.
    #[error("notary timed out")]
    Timeout,
}

/// External ledger client.
pub trait Notarizer: Send + Sync {
    /// Register a record and return the ledger reference.
    ///
    /// # Errors
    ///
    /// See [`NotaryError`].
    fn notarize(
        &self,
        record: DonationRecord,
    ) -> Pin<Box<dyn Future<Output = Result<String, NotaryError>> + Send + '_>>;
}
