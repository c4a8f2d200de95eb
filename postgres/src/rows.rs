//! Row decoding and column encoding helpers.
//!
//! Enum columns are stored as their storage labels; patient and location are
//! JSONB. Unsigned counts are stored as `BIGINT` because Postgres has no
//! unsigned integers.

use hemolink_core::{
    Appointment, AppointmentId, AppointmentStatus, BloodGroup, DonationKind, Donor, DonorId,
    GeoPoint, HospitalId, Location, Notification, NotificationId, NotificationKind, Patient,
    Request, RequestId, RequestStatus, Role, StoreError, Urgency, UserId,
};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::Row;
use uuid::Uuid;

pub(crate) const REQUEST_COLUMNS: &str = "id, hospital_id, kind, blood_group, units_needed, \
     urgency, patient, notes, location, status, assigned_donor, appointment_id, created_at, \
     updated_at";

pub(crate) const APPOINTMENT_COLUMNS: &str = "id, request_id, donor_id, hospital_id, \
     scheduled_at, kind, blood_group, units, status, notes, reminder_sent, notarization_ref, \
     stock_credited, created_at, updated_at";

pub(crate) const NOTIFICATION_COLUMNS: &str =
    "id, user_id, role, kind, message, read, created_at";

pub(crate) const DONOR_COLUMNS: &str =
    "id, name, blood_group, available, last_donation, latitude, longitude";

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Serialization(format!("column {name}: {e}")))
}

fn label<T>(row: &PgRow, name: &str, parse: impl FnOnce(&str) -> Option<T>) -> Result<T, StoreError> {
    let raw: String = column(row, name)?;
    parse(&raw).ok_or_else(|| StoreError::Serialization(format!("invalid {name}: {raw}")))
}

fn count(row: &PgRow, name: &str) -> Result<u32, StoreError> {
    let raw: i64 = column(row, name)?;
    u32::try_from(raw).map_err(|_| StoreError::Serialization(format!("{name} out of range: {raw}")))
}

pub(crate) fn request_status(row: &PgRow) -> Result<RequestStatus, StoreError> {
    label(row, "status", RequestStatus::parse)
}

pub(crate) fn appointment_status(row: &PgRow) -> Result<AppointmentStatus, StoreError> {
    label(row, "status", AppointmentStatus::parse)
}

pub(crate) fn blood_group(row: &PgRow, name: &str) -> Result<BloodGroup, StoreError> {
    label(row, name, |s| s.parse().ok())
}

pub(crate) fn units(row: &PgRow) -> Result<u32, StoreError> {
    count(row, "units")
}

pub(crate) fn request(row: &PgRow) -> Result<Request, StoreError> {
    let Json(patient): Json<Patient> = column(row, "patient")?;
    let Json(location): Json<Location> = column(row, "location")?;
    let assigned: Option<Uuid> = column(row, "assigned_donor")?;
    let appointment: Option<Uuid> = column(row, "appointment_id")?;

    Ok(Request {
        id: RequestId::from_uuid(column(row, "id")?),
        hospital_id: HospitalId::from_uuid(column(row, "hospital_id")?),
        kind: label(row, "kind", DonationKind::parse)?,
        blood_group: blood_group(row, "blood_group")?,
        units_needed: count(row, "units_needed")?,
        urgency: label(row, "urgency", Urgency::parse)?,
        patient,
        notes: column(row, "notes")?,
        location,
        status: request_status(row)?,
        assigned_donor: assigned.map(DonorId::from_uuid),
        appointment_id: appointment.map(AppointmentId::from_uuid),
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

pub(crate) fn donor(row: &PgRow) -> Result<Donor, StoreError> {
    let latitude: Option<f64> = column(row, "latitude")?;
    let longitude: Option<f64> = column(row, "longitude")?;

    Ok(Donor {
        id: DonorId::from_uuid(column(row, "id")?),
        name: column(row, "name")?,
        blood_group: blood_group(row, "blood_group")?,
        available: column(row, "available")?,
        last_donation: column(row, "last_donation")?,
        position: latitude
            .zip(longitude)
            .and_then(|(lat, lon)| GeoPoint::new(lat, lon)),
    })
}

pub(crate) fn appointment(row: &PgRow) -> Result<Appointment, StoreError> {
    let request_id: Option<Uuid> = column(row, "request_id")?;

    Ok(Appointment {
        id: AppointmentId::from_uuid(column(row, "id")?),
        request_id: request_id.map(RequestId::from_uuid),
        donor_id: DonorId::from_uuid(column(row, "donor_id")?),
        hospital_id: HospitalId::from_uuid(column(row, "hospital_id")?),
        scheduled_at: column(row, "scheduled_at")?,
        kind: label(row, "kind", DonationKind::parse)?,
        blood_group: blood_group(row, "blood_group")?,
        units: units(row)?,
        status: appointment_status(row)?,
        notes: column(row, "notes")?,
        reminder_sent: column(row, "reminder_sent")?,
        notarization_ref: column(row, "notarization_ref")?,
        stock_credited: column(row, "stock_credited")?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

pub(crate) fn notification(row: &PgRow) -> Result<Notification, StoreError> {
    Ok(Notification {
        id: NotificationId::from_uuid(column(row, "id")?),
        user_id: UserId::from_uuid(column(row, "user_id")?),
        role: label(row, "role", Role::parse)?,
        kind: label(row, "kind", NotificationKind::parse)?,
        message: column(row, "message")?,
        read: column(row, "read")?,
        created_at: column(row, "created_at")?,
    })
}
