//! Storage traits for donation records.
//!
//! The core never reads-modifies-writes a contended record in application
//! memory without a guard. Every mutation the lifecycle needs is expressed as
//! one of these primitives, each of which a backend must apply atomically to a
//! single record:
//!
//! - **Conditional replace** ([`RequestStore::compare_and_swap_request`],
//!   [`AppointmentStore::compare_and_swap_appointment`]): write the new record
//!   only if the stored status still equals `expected`. This is the
//!   `UPDATE … WHERE status = $expected` primitive behind exclusive accept.
//! - **Atomic adjust** ([`InventoryStore::adjust_units`]): add a signed delta
//!   to a counter, refusing results below zero.
//! - **Insert-if-absent / flip-if-unset** ([`RequestStore::record_ignore`],
//!   [`AppointmentStore::mark_reminder_sent`]): report whether this call was
//!   the one that changed anything.
//! - **Credit once** ([`InventoryStore::credit_appointment`]): flip an
//!   appointment's `stock_credited` flag and add its units to the counter in
//!   one atomic step, so a retried credit can never count twice.
//!
//! # Implementations
//!
//! - `InMemoryStore` (in `hemolink-testing`): fast, deterministic tests
//! - `PostgresStore` (in `hemolink-postgres`): production
//!
//! # Dyn Compatibility
//!
//! Methods return boxed futures instead of `async fn` so the stores can be
//! shared as `Arc<dyn DonationStore>`.

use crate::blood::BloodGroup;
use crate::error::StoreError;
use crate::types::{
    Appointment, AppointmentId, AppointmentStatus, BloodUnitCounter, Donor, DonorId, HospitalId,
    Notification, NotificationId, Request, RequestId, RequestStatus, UserId,
};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by every store method.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Persistence for requests and per-donor ignore marks.
pub trait RequestStore: Send + Sync {
    /// Insert a new request.
    ///
    /// # Errors
    ///
    /// `Conflict` if the id exists; transport errors otherwise.
    fn insert_request(&self, request: Request) -> StoreFuture<'_, ()>;

    /// Load a request by id.
    ///
    /// # Errors
    ///
    /// `NotFound` if absent.
    fn load_request(&self, id: RequestId) -> StoreFuture<'_, Request>;

    /// Replace the stored request with `next` iff its status equals `expected`.
    ///
    /// Returns the record as stored after the write.
    ///
    /// # Errors
    ///
    /// - `NotFound` if absent
    /// - `ConditionFailed` if the stored status differs from `expected`
    fn compare_and_swap_request(
        &self,
        expected: RequestStatus,
        next: Request,
    ) -> StoreFuture<'_, Request>;

    /// All requests of a hospital, newest first by creation time.
    ///
    /// # Errors
    ///
    /// Transport errors.
    fn list_requests_for_hospital(&self, hospital: HospitalId) -> StoreFuture<'_, Vec<Request>>;

    /// All `Pending` requests, newest first.
    ///
    /// # Errors
    ///
    /// Transport errors.
    fn list_pending_requests(&self) -> StoreFuture<'_, Vec<Request>>;

    /// Record that `donor` hid `request`. Returns `true` if newly recorded.
    ///
    /// # Errors
    ///
    /// Transport errors.
    fn record_ignore(&self, request: RequestId, donor: DonorId) -> StoreFuture<'_, bool>;

    /// Requests the donor has hidden.
    ///
    /// # Errors
    ///
    /// Transport errors.
    fn ignored_requests(&self, donor: DonorId) -> StoreFuture<'_, Vec<RequestId>>;
}

/// Persistence for donor profiles.
pub trait DonorStore: Send + Sync {
    /// Insert or replace a donor profile.
    ///
    /// # Errors
    ///
    /// Transport errors.
    fn upsert_donor(&self, donor: Donor) -> StoreFuture<'_, ()>;

    /// Load a donor by id.
    ///
    /// # Errors
    ///
    /// `NotFound` if absent.
    fn load_donor(&self, id: DonorId) -> StoreFuture<'_, Donor>;

    /// Available donors whose group is in `groups`. Order is unspecified.
    ///
    /// # Errors
    ///
    /// Transport errors.
    fn list_available_donors(&self, groups: &[BloodGroup]) -> StoreFuture<'_, Vec<Donor>>;
}

/// Persistence for appointments.
pub trait AppointmentStore: Send + Sync {
    /// Insert a new appointment.
    ///
    /// # Errors
    ///
    /// `Conflict` if the id exists.
    fn insert_appointment(&self, appointment: Appointment) -> StoreFuture<'_, ()>;

    /// Load an appointment by id.
    ///
    /// # Errors
    ///
    /// `NotFound` if absent.
    fn load_appointment(&self, id: AppointmentId) -> StoreFuture<'_, Appointment>;

    /// Replace the stored appointment with `next` iff its status equals `expected`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if absent
    /// - `ConditionFailed` if the stored status differs from `expected`
    fn compare_and_swap_appointment(
        &self,
        expected: AppointmentStatus,
        next: Appointment,
    ) -> StoreFuture<'_, Appointment>;

    /// All appointments of a donor, soonest first.
    ///
    /// # Errors
    ///
    /// Transport errors.
    fn list_appointments_for_donor(&self, donor: DonorId) -> StoreFuture<'_, Vec<Appointment>>;

    /// All appointments of a hospital, soonest first.
    ///
    /// # Errors
    ///
    /// Transport errors.
    fn list_appointments_for_hospital(
        &self,
        hospital: HospitalId,
    ) -> StoreFuture<'_, Vec<Appointment>>;

    /// The most recent non-cancelled appointment booked for a request.
    ///
    /// # Errors
    ///
    /// Transport errors.
    fn appointment_for_request(
        &self,
        request: RequestId,
    ) -> StoreFuture<'_, Option<Appointment>>;

    /// Active appointments starting in `[from, to)` with no reminder sent yet.
    ///
    /// # Errors
    ///
    /// Transport errors.
    fn appointments_due(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<Appointment>>;

    /// Set the reminder flag. Returns `true` only for the call that flipped it.
    ///
    /// # Errors
    ///
    /// `NotFound` if absent.
    fn mark_reminder_sent(&self, id: AppointmentId) -> StoreFuture<'_, bool>;

    /// Attach an external notarization reference.
    ///
    /// # Errors
    ///
    /// `NotFound` if absent.
    fn set_notarization_ref(&self, id: AppointmentId, reference: String) -> StoreFuture<'_, ()>;
}

/// Persistence for notifications.
pub trait NotificationStore: Send + Sync {
    /// Append a notification.
    ///
    /// # Errors
    ///
    /// Transport errors.
    fn insert_notification(&self, notification: Notification) -> StoreFuture<'_, ()>;

    /// Load a notification; `None` if it never existed or was deleted.
    ///
    /// # Errors
    ///
    /// Transport errors.
    fn find_notification(&self, id: NotificationId) -> StoreFuture<'_, Option<Notification>>;

    /// Set the read flag on `user`'s notification `id`. Returns `true` if the
    /// flag changed; missing ids and other users' ids return `false`.
    ///
    /// # Errors
    ///
    /// Transport errors.
    fn mark_notification_read(&self, id: NotificationId, user: UserId) -> StoreFuture<'_, bool>;

    /// Set the read flag on every notification of a user. Returns how many changed.
    ///
    /// # Errors
    ///
    /// Transport errors.
    fn mark_all_notifications_read(&self, user: UserId) -> StoreFuture<'_, u64>;

    /// Delete `user`'s notification `id`. Returns `true` if a row was removed.
    ///
    /// # Errors
    ///
    /// Transport errors.
    fn delete_notification(&self, id: NotificationId, user: UserId) -> StoreFuture<'_, bool>;

    /// Notifications of a user, newest first by creation time.
    ///
    /// # Errors
    ///
    /// Transport errors.
    fn list_notifications(&self, user: UserId) -> StoreFuture<'_, Vec<Notification>>;
}

/// Persistence for blood unit counters.
pub trait InventoryStore: Send + Sync {
    /// Atomically add `delta` to the (hospital, group) counter, creating it at
    /// zero first if needed. Returns the new value.
    ///
    /// # Errors
    ///
    /// `Underflow` if the result would be negative; the counter is unchanged.
    fn adjust_units(
        &self,
        hospital: HospitalId,
        group: BloodGroup,
        delta: i64,
    ) -> StoreFuture<'_, u32>;

    /// Credit a completed appointment's units to its hospital's counter,
    /// at most once per appointment.
    ///
    /// Returns the new count, or `None` if the appointment was already
    /// credited.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the appointment is absent
    /// - `ConditionFailed` if it is not `completed`
    fn credit_appointment(&self, id: AppointmentId) -> StoreFuture<'_, Option<u32>>;

    /// Units on hand; zero for a counter that was never touched.
    ///
    /// # Errors
    ///
    /// Transport errors.
    fn load_units(&self, hospital: HospitalId, group: BloodGroup) -> StoreFuture<'_, u32>;

    /// Every counter the hospital has.
    ///
    /// # Errors
    ///
    /// Transport errors.
    fn list_counters(&self, hospital: HospitalId) -> StoreFuture<'_, Vec<BloodUnitCounter>>;
}

/// Everything the donation core needs from a backend.
pub trait DonationStore:
    RequestStore + DonorStore + AppointmentStore + NotificationStore + InventoryStore
{
}

impl<T> DonationStore for T where
    T: RequestStore + DonorStore + AppointmentStore + NotificationStore + InventoryStore
{
}
