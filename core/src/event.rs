//! Lifecycle events emitted by successful transitions.
//!
//! Events are facts: they are produced only after the corresponding store
//! write succeeded. Consumers (notification fan-out, inventory, external
//! subscribers on the event bus) must tolerate seeing the same event twice.

use crate::blood::BloodGroup;
use crate::types::{AppointmentId, DonorId, HospitalId, RequestId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Something that happened to a request, appointment or stock counter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// A hospital opened a request
    RequestCreated {
        /// Request
        request_id: RequestId,
        /// Owner
        hospital_id: HospitalId,
        /// Recipient group
        blood_group: BloodGroup,
        /// When
        at: DateTime<Utc>,
    },

    /// A donor won the request
    RequestAccepted {
        /// Request
        request_id: RequestId,
        /// Owner
        hospital_id: HospitalId,
        /// Winner
        donor_id: DonorId,
        /// When
        at: DateTime<Utc>,
    },

    /// A donor hid the request from their own view
    RequestIgnored {
        /// Request
        request_id: RequestId,
        /// Donor who hid it
        donor_id: DonorId,
        /// When
        at: DateTime<Utc>,
    },

    /// The hospital withdrew a pending request
    RequestDeactivated {
        /// Request
        request_id: RequestId,
        /// Owner
        hospital_id: HospitalId,
        /// When
        at: DateTime<Utc>,
    },

    /// The request moved to `Scheduled`
    RequestScheduled {
        /// Request
        request_id: RequestId,
        /// Owner
        hospital_id: HospitalId,
        /// Assigned donor
        donor_id: DonorId,
        /// Booked slot
        scheduled_at: DateTime<Utc>,
        /// When
        at: DateTime<Utc>,
    },

    /// The request was cancelled and its donor released
    RequestCancelled {
        /// Request
        request_id: RequestId,
        /// Owner
        hospital_id: HospitalId,
        /// Donor that was assigned, if any
        released_donor: Option<DonorId>,
        /// When
        at: DateTime<Utc>,
    },

    /// The request was fulfilled
    RequestCompleted {
        /// Request
        request_id: RequestId,
        /// Owner
        hospital_id: HospitalId,
        /// Donor
        donor_id: DonorId,
        /// When
        at: DateTime<Utc>,
    },

    /// A cancelled request went back to `Pending`
    RequestReopened {
        /// Request
        request_id: RequestId,
        /// Owner
        hospital_id: HospitalId,
        /// When
        at: DateTime<Utc>,
    },

    /// An appointment was booked
    AppointmentScheduled {
        /// Appointment
        appointment_id: AppointmentId,
        /// Originating request
        request_id: Option<RequestId>,
        /// Donor
        donor_id: DonorId,
        /// Hospital
        hospital_id: HospitalId,
        /// Slot
        scheduled_at: DateTime<Utc>,
    },

    /// The donor confirmed attendance
    AppointmentConfirmed {
        /// Appointment
        appointment_id: AppointmentId,
        /// Donor
        donor_id: DonorId,
        /// Hospital
        hospital_id: HospitalId,
        /// Slot
        scheduled_at: DateTime<Utc>,
    },

    /// The donation was taken
    AppointmentCompleted {
        /// Appointment
        appointment_id: AppointmentId,
        /// Originating request
        request_id: Option<RequestId>,
        /// Donor
        donor_id: DonorId,
        /// Hospital credited
        hospital_id: HospitalId,
        /// Group credited
        blood_group: BloodGroup,
        /// Units credited
        units: u32,
        /// When
        at: DateTime<Utc>,
    },

    /// The appointment was called off
    AppointmentCancelled {
        /// Appointment
        appointment_id: AppointmentId,
        /// Originating request
        request_id: Option<RequestId>,
        /// Donor
        donor_id: DonorId,
        /// Hospital
        hospital_id: HospitalId,
        /// When
        at: DateTime<Utc>,
    },

    /// The donor did not show up
    AppointmentNoShow {
        /// Appointment
        appointment_id: AppointmentId,
        /// Donor
        donor_id: DonorId,
        /// Hospital
        hospital_id: HospitalId,
        /// When
        at: DateTime<Utc>,
    },

    /// A stock counter moved
    InventoryAdjusted {
        /// Hospital
        hospital_id: HospitalId,
        /// Group
        blood_group: BloodGroup,
        /// Signed change
        delta: i64,
        /// Value after the change
        units: u32,
    },
}

impl LifecycleEvent {
    /// Event name, as used in logs and metrics labels.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RequestCreated { .. } => "request_created",
            Self::RequestAccepted { .. } => "request_accepted",
            Self::RequestIgnored { .. } => "request_ignored",
            Self::RequestDeactivated { .. } => "request_deactivated",
            Self::RequestScheduled { .. } => "request_scheduled",
            Self::RequestCancelled { .. } => "request_cancelled",
            Self::RequestCompleted { .. } => "request_completed",
            Self::RequestReopened { .. } => "request_reopened",
            Self::AppointmentScheduled { .. } => "appointment_scheduled",
            Self::AppointmentConfirmed { .. } => "appointment_confirmed",
            Self::AppointmentCompleted { .. } => "appointment_completed",
            Self::AppointmentCancelled { .. } => "appointment_cancelled",
            Self::AppointmentNoShow { .. } => "appointment_no_show",
            Self::InventoryAdjusted { .. } => "inventory_adjusted",
        }
    }

    /// The request this event concerns, if any.
    #[must_use]
    pub const fn request_id(&self) -> Option<RequestId> {
        match self {
            Self::RequestCreated { request_id, .. }
            | Self::RequestAccepted { request_id, .. }
            | Self::RequestIgnored { request_id, .. }
            | Self::RequestDeactivated { request_id, .. }
            | Self::RequestScheduled { request_id, .. }
            | Self::RequestCancelled { request_id, .. }
            | Self::RequestCompleted { request_id, .. }
            | Self::RequestReopened { request_id, .. } => Some(*request_id),
            Self::AppointmentScheduled { request_id, .. }
            | Self::AppointmentCompleted { request_id, .. }
            | Self::AppointmentCancelled { request_id, .. } => *request_id,
            Self::AppointmentConfirmed { .. }
            | Self::AppointmentNoShow { .. }
            | Self::InventoryAdjusted { .. } => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = LifecycleEvent::RequestIgnored {
            request_id: RequestId::new(),
            donor_id: DonorId::new(),
            at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "request_ignored");
        let back: LifecycleEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn standalone_appointment_has_no_request() {
        let event = LifecycleEvent::AppointmentConfirmed {
            appointment_id: AppointmentId::new(),
            donor_id: DonorId::new(),
            hospital_id: HospitalId::new(),
            scheduled_at: Utc::now(),
        };
        assert_eq!(event.request_id(), None);
        assert_eq!(event.name(), "appointment_confirmed");
    }
}
