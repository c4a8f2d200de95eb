//! Domain records for requests, donors, appointments, notifications and stock.
//!
//! These are plain owned values. Status enums carry the transition tables;
//! the reducers in the `donations` crate decide *when* a transition happens.

use crate::blood::BloodGroup;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a blood/plasma request
    RequestId
);
uuid_id!(
    /// Unique identifier for a donor
    DonorId
);
uuid_id!(
    /// Unique identifier for a hospital
    HospitalId
);
uuid_id!(
    /// Unique identifier for an appointment
    AppointmentId
);
uuid_id!(
    /// Unique identifier for a notification
    NotificationId
);
uuid_id!(
    /// Identity-provider user id; donors and hospitals are both users
    UserId
);

impl From<DonorId> for UserId {
    fn from(id: DonorId) -> Self {
        Self(id.0)
    }
}

impl From<HospitalId> for UserId {
    fn from(id: HospitalId) -> Self {
        Self(id.0)
    }
}

// ============================================================================
// Actors
// ============================================================================

/// Role of an authenticated user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A blood/plasma donor
    Donor,
    /// A hospital account
    Hospital,
}

impl Role {
    /// Storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Donor => "donor",
            Self::Hospital => "hospital",
        }
    }

    /// Parse a storage label.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "donor" => Some(Self::Donor),
            "hospital" => Some(Self::Hospital),
            _ => None,
        }
    }
}

/// The authenticated caller, as supplied by the identity provider.
///
/// The core treats this as pre-validated input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// User id
    pub user_id: UserId,
    /// Role the user acts in
    pub role: Role,
}

impl Actor {
    /// A donor acting as themselves.
    #[must_use]
    pub fn donor(id: DonorId) -> Self {
        Self {
            user_id: id.into(),
            role: Role::Donor,
        }
    }

    /// A hospital acting on its own records.
    #[must_use]
    pub fn hospital(id: HospitalId) -> Self {
        Self {
            user_id: id.into(),
            role: Role::Hospital,
        }
    }

    /// True if this actor is the given donor.
    #[must_use]
    pub fn is_donor(&self, id: DonorId) -> bool {
        self.role == Role::Donor && self.user_id == id.into()
    }

    /// True if this actor is the given hospital.
    #[must_use]
    pub fn is_hospital(&self, id: HospitalId) -> bool {
        self.role == Role::Hospital && self.user_id == id.into()
    }
}

// ============================================================================
// Value objects
// ============================================================================

/// What is being donated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DonationKind {
    /// Whole blood
    Blood,
    /// Plasma
    Plasma,
}

impl DonationKind {
    /// Storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Blood => "blood",
            Self::Plasma => "plasma",
        }
    }

    /// Parse a storage label.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "blood" => Some(Self::Blood),
            "plasma" => Some(Self::Plasma),
            _ => None,
        }
    }
}

/// Request urgency, ordered by severity (`Low < Emergency`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Urgency {
    /// Can wait
    Low,
    /// Normal
    Medium,
    /// Needed soon
    High,
    /// Needed now
    Emergency,
}

impl Urgency {
    /// Storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Emergency => "Emergency",
        }
    }

    /// Parse a storage label.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Low" => Some(Self::Low),
            "Medium" => Some(Self::Medium),
            "High" => Some(Self::High),
            "Emergency" => Some(Self::Emergency),
            _ => None,
        }
    }
}

/// A WGS84 coordinate.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees, `[-90, 90]`
    pub latitude: f64,
    /// Longitude in degrees, `[-180, 180]`
    pub longitude: f64,
}

impl GeoPoint {
    /// Creates a point, or `None` if either coordinate is out of range.
    #[must_use]
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        ((-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude))
            .then_some(Self {
                latitude,
                longitude,
            })
    }

    /// Great-circle distance in kilometres (haversine).
    #[must_use]
    pub fn distance_km(&self, other: &Self) -> f64 {
        const EARTH_RADIUS_KM: f64 = 6371.0;

        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = lat2 - lat1;
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

/// Where the donation is needed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Coordinates, when geocoded
    pub point: Option<GeoPoint>,
    /// Free-text address
    pub address: Option<String>,
}

/// Who the blood is for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    /// Patient name
    pub name: String,
    /// Age in years
    pub age: Option<u8>,
    /// Gender, as entered
    pub gender: Option<String>,
    /// Medical condition, as entered
    pub condition: Option<String>,
}

impl Patient {
    /// A patient with only a name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            age: None,
            gender: None,
            condition: None,
        }
    }
}

// ============================================================================
// Request
// ============================================================================

/// Status of a blood/plasma request.
///
/// ```text
/// Pending ──accept──▶ Accepted ──schedule──▶ Scheduled ──complete──▶ Completed
///    │                   │                       │
///    └─deactivate─▶ Ignored  └────cancel────▶ Cancelled ◀──cancel──┘
///                                                │
///                              Pending ◀─reopen──┘
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
    /// Waiting for a donor
    Pending,
    /// A donor won the request
    Accepted,
    /// Deactivated by the hospital before anyone accepted
    Ignored,
    /// An appointment exists
    Scheduled,
    /// Donation done
    Completed,
    /// Withdrawn after acceptance
    Cancelled,
}

impl RequestStatus {
    /// Storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Ignored => "ignored",
            Self::Scheduled => "scheduled",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse a storage label.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "ignored" => Some(Self::Ignored),
            "scheduled" => Some(Self::Scheduled),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Statuses in which a donor is bound to the request.
    #[must_use]
    pub const fn holds_donor(self) -> bool {
        matches!(self, Self::Accepted | Self::Scheduled | Self::Completed)
    }

    /// Whether `self → next` is an edge of the request state machine.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Accepted | Self::Ignored)
                | (Self::Accepted, Self::Scheduled | Self::Cancelled)
                | (Self::Scheduled, Self::Completed | Self::Cancelled)
                | (Self::Cancelled, Self::Pending)
        )
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input for creating a request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewRequest {
    /// Blood or plasma
    pub kind: DonationKind,
    /// Recipient blood group
    pub blood_group: BloodGroup,
    /// Units needed, must be positive
    pub units_needed: u32,
    /// How urgent
    pub urgency: Urgency,
    /// Who it is for
    pub patient: Patient,
    /// Free text
    pub notes: String,
    /// Where
    pub location: Location,
}

/// A hospital's ask for blood/plasma units.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Request id
    pub id: RequestId,
    /// Owning hospital
    pub hospital_id: HospitalId,
    /// Blood or plasma
    pub kind: DonationKind,
    /// Recipient blood group
    pub blood_group: BloodGroup,
    /// Units needed
    pub units_needed: u32,
    /// How urgent
    pub urgency: Urgency,
    /// Who it is for
    pub patient: Patient,
    /// Free text
    pub notes: String,
    /// Where
    pub location: Location,
    /// Lifecycle status
    pub status: RequestStatus,
    /// Winning donor; `Some` iff the status holds a donor
    pub assigned_donor: Option<DonorId>,
    /// Appointment that scheduled the request, set by the same write that
    /// moved it to `Scheduled`
    pub appointment_id: Option<AppointmentId>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl Request {
    /// Builds a `Pending` request from validated input.
    #[must_use]
    pub fn open(id: RequestId, hospital_id: HospitalId, new: NewRequest, now: DateTime<Utc>) -> Self {
        Self {
            id,
            hospital_id,
            kind: new.kind,
            blood_group: new.blood_group,
            units_needed: new.units_needed,
            urgency: new.urgency,
            patient: new.patient,
            notes: new.notes,
            location: new.location,
            status: RequestStatus::Pending,
            assigned_donor: None,
            appointment_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Checks the assigned-donor invariant.
    #[must_use]
    pub const fn donor_invariant_holds(&self) -> bool {
        self.status.holds_donor() == self.assigned_donor.is_some()
    }
}

// ============================================================================
// Donor
// ============================================================================

/// A donor profile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Donor {
    /// Donor id
    pub id: DonorId,
    /// Display name
    pub name: String,
    /// Donor blood group
    pub blood_group: BloodGroup,
    /// Willing to donate right now
    pub available: bool,
    /// Last donation, if any
    pub last_donation: Option<DateTime<Utc>>,
    /// Current position, if shared
    pub position: Option<GeoPoint>,
}

// ============================================================================
// Appointment
// ============================================================================

/// Status of an appointment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    /// Booked
    Scheduled,
    /// Donor confirmed attendance
    Confirmed,
    /// Donation taken
    Completed,
    /// Called off
    Cancelled,
    /// Donor did not show up
    NoShow,
}

impl AppointmentStatus {
    /// Storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Confirmed => "confirmed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::NoShow => "no_show",
        }
    }

    /// Parse a storage label.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(Self::Scheduled),
            "confirmed" => Some(Self::Confirmed),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            "no_show" => Some(Self::NoShow),
            _ => None,
        }
    }

    /// Still upcoming.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Scheduled | Self::Confirmed)
    }

    /// Occupies the donor's calendar for overlap checks.
    #[must_use]
    pub const fn blocks_slot(self) -> bool {
        !matches!(self, Self::Cancelled | Self::NoShow)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scheduled donation event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    /// Appointment id
    pub id: AppointmentId,
    /// Originating request, if any
    pub request_id: Option<RequestId>,
    /// Donor
    pub donor_id: DonorId,
    /// Hospital (write owner)
    pub hospital_id: HospitalId,
    /// When, in UTC
    pub scheduled_at: DateTime<Utc>,
    /// Blood or plasma
    pub kind: DonationKind,
    /// Group credited to stock on completion
    pub blood_group: BloodGroup,
    /// Units credited to stock on completion
    pub units: u32,
    /// Lifecycle status
    pub status: AppointmentStatus,
    /// Free text
    pub notes: String,
    /// A reminder has gone out
    pub reminder_sent: bool,
    /// External notarization reference, once registered
    pub notarization_ref: Option<String>,
    /// Units have been credited to the hospital's stock
    pub stock_credited: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Notification
// ============================================================================

/// Category of a notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// An appointment was booked or confirmed
    AppointmentConfirmation,
    /// An appointment is coming up
    AppointmentReminder,
    /// A request changed state
    RequestUpdate,
    /// Anything else
    General,
}

impl NotificationKind {
    /// Storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AppointmentConfirmation => "appointment_confirmation",
            Self::AppointmentReminder => "appointment_reminder",
            Self::RequestUpdate => "request_update",
            Self::General => "general",
        }
    }

    /// Parse a storage label.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "appointment_confirmation" => Some(Self::AppointmentConfirmation),
            "appointment_reminder" => Some(Self::AppointmentReminder),
            "request_update" => Some(Self::RequestUpdate),
            "general" => Some(Self::General),
            _ => None,
        }
    }
}

/// An append-only message to one user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Notification id
    pub id: NotificationId,
    /// Recipient
    pub user_id: UserId,
    /// Recipient role
    pub role: Role,
    /// Category
    pub kind: NotificationKind,
    /// Text
    pub message: String,
    /// Read flag, the only mutable field
    pub read: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Inventory
// ============================================================================

/// Per-hospital, per-group running stock count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BloodUnitCounter {
    /// Hospital
    pub hospital_id: HospitalId,
    /// Group
    pub blood_group: BloodGroup,
    /// Units on hand, never negative
    pub units: u32,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn urgency_is_ordered_by_severity() {
        assert!(Urgency::Low < Urgency::Medium);
        assert!(Urgency::High < Urgency::Emergency);
    }

    #[test]
    fn request_edges_match_state_machine() {
        use RequestStatus::*;
        let allowed = [
            (Pending, Accepted),
            (Pending, Ignored),
            (Accepted, Scheduled),
            (Accepted, Cancelled),
            (Scheduled, Completed),
            (Scheduled, Cancelled),
            (Cancelled, Pending),
        ];
        let all = [Pending, Accepted, Ignored, Scheduled, Completed, Cancelled];
        for from in all {
            for to in all {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn status_labels_round_trip() {
        for status in [
            RequestStatus::Pending,
            RequestStatus::Accepted,
            RequestStatus::Ignored,
            RequestStatus::Scheduled,
            RequestStatus::Completed,
            RequestStatus::Cancelled,
        ] {
            assert_eq!(RequestStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(AppointmentStatus::parse("no_show"), Some(AppointmentStatus::NoShow));
        assert_eq!(NotificationKind::parse("general"), Some(NotificationKind::General));
    }

    #[test]
    fn geo_point_rejects_out_of_range() {
        assert!(GeoPoint::new(91.0, 0.0).is_none());
        assert!(GeoPoint::new(0.0, -181.0).is_none());
    }

    #[test]
    fn haversine_distance_is_reasonable() {
        // Paris to London is roughly 344 km.
        let paris = GeoPoint::new(48.8566, 2.3522).unwrap();
        let london = GeoPoint::new(51.5074, -0.1278).unwrap();
        let d = paris.distance_km(&london);
        assert!((340.0..350.0).contains(&d), "distance was {d}");
        assert!(paris.distance_km(&paris).abs() < f64::EPSILON);
    }

    #[test]
    fn actor_identity_checks() {
        let donor = DonorId::new();
        let hospital = HospitalId::new();
        assert!(Actor::donor(donor).is_donor(donor));
        assert!(!Actor::donor(donor).is_hospital(HospitalId::from_uuid(*donor.as_uuid())));
        assert!(Actor::hospital(hospital).is_hospital(hospital));
    }
}
