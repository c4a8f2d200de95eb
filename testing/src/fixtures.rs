//! Builders for domain records used across test suites.
//!
//! Timestamps default to [`crate::test_clock`] so records compare equal across runs.

use crate::mocks::test_clock;
use hemolink_core::environment::Clock;
use hemolink_core::{
    Appointment, AppointmentId, AppointmentStatus, BloodGroup, DateTime, DonationKind, Donor,
    DonorId, GeoPoint, HospitalId, Location, NewRequest, Notification, NotificationId,
    NotificationKind, Patient, Request, RequestId, Role, Urgency, UserId, Utc,
};

/// A valid request body for `group`.
#[must_use]
pub fn new_request(group: BloodGroup) -> NewRequest {
    NewRequest {
        kind: DonationKind::Blood,
        blood_group: group,
        units_needed: 2,
        urgency: Urgency::High,
        patient: Patient::named("Jane Roe"),
        notes: String::new(),
        location: Location::default(),
    }
}

/// A stored `Pending` request owned by `hospital`.
#[must_use]
pub fn pending_request(hospital: HospitalId, group: BloodGroup) -> Request {
    Request::open(RequestId::new(), hospital, new_request(group), test_clock().now())
}

/// An available donor with no position and no donation history.
#[must_use]
pub fn donor(group: BloodGroup) -> Donor {
    Donor {
        id: DonorId::new(),
        name: format!("donor {group}"),
        blood_group: group,
        available: true,
        last_donation: None,
        position: None,
    }
}

/// An available donor at a position.
#[must_use]
pub fn donor_at(group: BloodGroup, latitude: f64, longitude: f64) -> Donor {
    Donor {
        position: GeoPoint::new(latitude, longitude),
        ..donor(group)
    }
}

/// A `scheduled` standalone appointment at `at`.
#[must_use]
pub fn appointment(donor: DonorId, hospital: HospitalId, at: DateTime<Utc>) -> Appointment {
    let now = test_clock().now();
    Appointment {
        id: AppointmentId::new(),
        request_id: None,
        donor_id: donor,
        hospital_id: hospital,
        scheduled_at: at,
        kind: DonationKind::Blood,
        blood_group: BloodGroup::OPos,
        units: 1,
        status: AppointmentStatus::Scheduled,
        notes: String::new(),
        reminder_sent: false,
        notarization_ref: None,
        stock_credited: false,
        created_at: now,
        updated_at: now,
    }
}

/// An unread general notification for a donor user.
#[must_use]
pub fn notification(user: UserId) -> Notification {
    Notification {
        id: NotificationId::new(),
        user_id: user,
        role: Role::Donor,
        kind: NotificationKind::General,
        message: "hello".into(),
        read: false,
        created_at: test_clock().now(),
    }
}
