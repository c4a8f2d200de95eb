//! In-memory implementation of every donation store trait.
//!
//! All tables live behind one mutex, so each trait method is atomic with
//! respect to every other, which is exactly the guarantee the conditional
//! primitives need. The lock is never held across an `.await`.
//!
//! Fault injection lets tests drive the transient-failure paths:
//!
//! - [`InMemoryStore::set_unavailable`]: every call fails with `Unavailable`
//! - [`InMemoryStore::fail_next_notification_inserts`]: the next `n`
//!   notification inserts fail
//! - [`InMemoryStore::fail_next_appointment_inserts`]: the next `n`
//!   appointment inserts fail
//! - [`InMemoryStore::lose_next_swap_acks`]: the next `n` conditional updates
//!   are applied but report `Unavailable`, like a connection dropped after
//!   commit
//! - [`InMemoryStore::fail_next_adjustments`]: the next `n` counter changes
//!   (`adjust_units` and `credit_appointment`) fail
//! - [`InMemoryStore::set_latency`]: every call sleeps first, for deadline tests

#![allow(clippy::unwrap_used)] // Test infrastructure: a poisoned lock means a test already panicked
#![allow(clippy::missing_panics_doc)]

use hemolink_core::{
    Appointment, AppointmentId, AppointmentStatus, AppointmentStore, BloodGroup, BloodUnitCounter,
    DateTime, Donor, DonorId, DonorStore, HospitalId, InventoryStore, Notification,
    NotificationId, NotificationStore, Request, RequestId, RequestStatus, RequestStore, StoreError,
    StoreFuture, UserId, Utc,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Tables {
    /// Value carries an insertion sequence for stable newest-first ordering.
    requests: HashMap<RequestId, (u64, Request)>,
    ignores: HashSet<(RequestId, DonorId)>,
    donors: HashMap<DonorId, Donor>,
    appointments: HashMap<AppointmentId, (u64, Appointment)>,
    /// Insertion order.
    notifications: Vec<Notification>,
    counters: BTreeMap<(HospitalId, BloodGroup), u32>,
    sequence: u64,
}

impl Tables {
    fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    fn adjust(
        &mut self,
        hospital: HospitalId,
        group: BloodGroup,
        delta: i64,
    ) -> Result<u32, StoreError> {
        let current = self.counters.get(&(hospital, group)).copied().unwrap_or(0);
        let next = i64::from(current) + delta;
        if next < 0 {
            return Err(StoreError::Underflow {
                available: current,
                requested: u32::try_from(delta.unsigned_abs()).unwrap_or(u32::MAX),
            });
        }
        let next = u32::try_from(next)
            .map_err(|_| StoreError::Database(format!("counter overflow: {next}")))?;
        self.counters.insert((hospital, group), next);
        Ok(next)
    }
}

#[derive(Default)]
struct Faults {
    unavailable: bool,
    failing_notification_inserts: u32,
    failing_appointment_inserts: u32,
    failing_adjustments: u32,
    lost_swap_acks: u32,
    latency: Option<Duration>,
}

/// In-memory donation store for fast, deterministic tests.
///
/// # Example
///
/// ```
/// use hemolink_testing::InMemoryStore;
/// use hemolink_core::{BloodGroup, HospitalId, InventoryStore};
///
/// # async fn example() -> Result<(), hemolink_core::StoreError> {
/// let store = InMemoryStore::new();
/// let hospital = HospitalId::new();
///
/// store.adjust_units(hospital, BloodGroup::ONeg, 2).await?;
/// assert_eq!(store.load_units(hospital, BloodGroup::ONeg).await?, 2);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
    faults: Arc<Mutex<Faults>>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = self.tables.lock().unwrap();
        f.debug_struct("InMemoryStore")
            .field("requests", &tables.requests.len())
            .field("appointments", &tables.appointments.len())
            .field("notifications", &tables.notifications.len())
            .finish_non_exhaustive()
    }
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with `Unavailable` until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.lock().unwrap().unavailable = unavailable;
    }

    /// Fail the next `count` notification inserts with `Unavailable`.
    pub fn fail_next_notification_inserts(&self, count: u32) {
        self.faults.lock().unwrap().failing_notification_inserts = count;
    }

    /// Fail the next `count` appointment inserts with `Database`.
    pub fn fail_next_appointment_inserts(&self, count: u32) {
        self.faults.lock().unwrap().failing_appointment_inserts = count;
    }

    /// Fail the next `count` counter changes with `Unavailable`; nothing is applied.
    pub fn fail_next_adjustments(&self, count: u32) {
        self.faults.lock().unwrap().failing_adjustments = count;
    }

    /// Apply the next `count` conditional updates, then report `Unavailable`.
    pub fn lose_next_swap_acks(&self, count: u32) {
        self.faults.lock().unwrap().lost_swap_acks = count;
    }

    /// Sleep this long at the start of every call.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.faults.lock().unwrap().latency = latency;
    }

    /// Every notification stored, oldest first.
    #[must_use]
    pub fn all_notifications(&self) -> Vec<Notification> {
        self.tables.lock().unwrap().notifications.clone()
    }

    /// Every appointment stored, in insertion order.
    #[must_use]
    pub fn all_appointments(&self) -> Vec<Appointment> {
        let tables = self.tables.lock().unwrap();
        let mut rows: Vec<_> = tables.appointments.values().cloned().collect();
        rows.sort_by_key(|(seq, _)| *seq);
        rows.into_iter().map(|(_, a)| a).collect()
    }

    async fn enter(&self) -> Result<(), StoreError> {
        let latency = {
            let faults = self.faults.lock().unwrap();
            if faults.unavailable {
                return Err(StoreError::Unavailable("in-memory store offline".into()));
            }
            faults.latency
        };
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    fn acknowledge<T>(&self, applied: T) -> Result<T, StoreError> {
        if self.take_fault(|f| &mut f.lost_swap_acks) {
            return Err(StoreError::Unavailable("acknowledgement lost".into()));
        }
        Ok(applied)
    }

    fn adjustment_fault(&self) -> Result<(), StoreError> {
        if self.take_fault(|f| &mut f.failing_adjustments) {
            return Err(StoreError::Unavailable("injected counter failure".into()));
        }
        Ok(())
    }

    fn take_fault(&self, pick: impl FnOnce(&mut Faults) -> &mut u32) -> bool {
        let mut faults = self.faults.lock().unwrap();
        let remaining = pick(&mut faults);
        if *remaining > 0 {
            *remaining -= 1;
            true
        } else {
            false
        }
    }
}

fn request_not_found(id: RequestId) -> StoreError {
    StoreError::NotFound {
        entity: "request",
        id: id.to_string(),
    }
}

fn appointment_not_found(id: AppointmentId) -> StoreError {
    StoreError::NotFound {
        entity: "appointment",
        id: id.to_string(),
    }
}

fn newest_first<T>(mut rows: Vec<(u64, T)>, created: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    rows.sort_by(|(sa, a), (sb, b)| created(b).cmp(&created(a)).then(sb.cmp(sa)));
    rows.into_iter().map(|(_, row)| row).collect()
}

fn soonest_first(mut rows: Vec<(u64, Appointment)>) -> Vec<Appointment> {
    rows.sort_by(|(sa, a), (sb, b)| a.scheduled_at.cmp(&b.scheduled_at).then(sa.cmp(sb)));
    rows.into_iter().map(|(_, row)| row).collect()
}

impl RequestStore for InMemoryStore {
    fn insert_request(&self, request: Request) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.enter().await?;
            let mut tables = self.tables.lock().unwrap();
            if tables.requests.contains_key(&request.id) {
                return Err(StoreError::Conflict {
                    entity: "request",
                    id: request.id.to_string(),
                });
            }
            let seq = tables.next_sequence();
            tables.requests.insert(request.id, (seq, request));
            Ok(())
        })
    }

    fn load_request(&self, id: RequestId) -> StoreFuture<'_, Request> {
        Box::pin(async move {
            self.enter().await?;
            let tables = self.tables.lock().unwrap();
            tables
                .requests
                .get(&id)
                .map(|(_, r)| r.clone())
                .ok_or_else(|| request_not_found(id))
        })
    }

    fn compare_and_swap_request(
        &self,
        expected: RequestStatus,
        next: Request,
    ) -> StoreFuture<'_, Request> {
        Box::pin(async move {
            self.enter().await?;
            let applied = {
                let mut tables = self.tables.lock().unwrap();
                let (_, stored) = tables
                    .requests
                    .get_mut(&next.id)
                    .ok_or_else(|| request_not_found(next.id))?;
                if stored.status != expected {
                    return Err(StoreError::ConditionFailed {
                        expected: expected.as_str(),
                        actual: stored.status.as_str(),
                    });
                }
                *stored = next;
                stored.clone()
            };
            self.acknowledge(applied)
        })
    }

    fn list_requests_for_hospital(&self, hospital: HospitalId) -> StoreFuture<'_, Vec<Request>> {
        Box::pin(async move {
            self.enter().await?;
            let tables = self.tables.lock().unwrap();
            let rows = tables
                .requests
                .values()
                .filter(|(_, r)| r.hospital_id == hospital)
                .cloned()
                .collect();
            Ok(newest_first(rows, |r| r.created_at))
        })
    }

    fn list_pending_requests(&self) -> StoreFuture<'_, Vec<Request>> {
        Box::pin(async move {
            self.enter().await?;
            let tables = self.tables.lock().unwrap();
            let rows = tables
                .requests
                .values()
                .filter(|(_, r)| r.status == RequestStatus::Pending)
                .cloned()
                .collect();
            Ok(newest_first(rows, |r| r.created_at))
        })
    }

    fn record_ignore(&self, request: RequestId, donor: DonorId) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            self.enter().await?;
            Ok(self.tables.lock().unwrap().ignores.insert((request, donor)))
        })
    }

    fn ignored_requests(&self, donor: DonorId) -> StoreFuture<'_, Vec<RequestId>> {
        Box::pin(async move {
            self.enter().await?;
            let tables = self.tables.lock().unwrap();
            Ok(tables
                .ignores
                .iter()
                .filter(|(_, d)| *d == donor)
                .map(|(r, _)| *r)
                .collect())
        })
    }
}

impl DonorStore for InMemoryStore {
    fn upsert_donor(&self, donor: Donor) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.enter().await?;
            self.tables.lock().unwrap().donors.insert(donor.id, donor);
            Ok(())
        })
    }

    fn load_donor(&self, id: DonorId) -> StoreFuture<'_, Donor> {
        Box::pin(async move {
            self.enter().await?;
            self.tables
                .lock()
                .unwrap()
                .donors
                .get(&id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound {
                    entity: "donor",
                    id: id.to_string(),
                })
        })
    }

    fn list_available_donors(&self, groups: &[BloodGroup]) -> StoreFuture<'_, Vec<Donor>> {
        let groups = groups.to_vec();
        Box::pin(async move {
            self.enter().await?;
            let tables = self.tables.lock().unwrap();
            Ok(tables
                .donors
                .values()
                .filter(|d| d.available && groups.contains(&d.blood_group))
                .cloned()
                .collect())
        })
    }
}

impl AppointmentStore for InMemoryStore {
    fn insert_appointment(&self, appointment: Appointment) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.enter().await?;
            if self.take_fault(|f| &mut f.failing_appointment_inserts) {
                return Err(StoreError::Database("injected appointment insert failure".into()));
            }
            let mut tables = self.tables.lock().unwrap();
            if tables.appointments.contains_key(&appointment.id) {
                return Err(StoreError::Conflict {
                    entity: "appointment",
                    id: appointment.id.to_string(),
                });
            }
            let seq = tables.next_sequence();
            tables.appointments.insert(appointment.id, (seq, appointment));
            Ok(())
        })
    }

    fn load_appointment(&self, id: AppointmentId) -> StoreFuture<'_, Appointment> {
        Box::pin(async move {
            self.enter().await?;
            let tables = self.tables.lock().unwrap();
            tables
                .appointments
                .get(&id)
                .map(|(_, a)| a.clone())
                .ok_or_else(|| appointment_not_found(id))
        })
    }

    fn compare_and_swap_appointment(
        &self,
        expected: AppointmentStatus,
        next: Appointment,
    ) -> StoreFuture<'_, Appointment> {
        Box::pin(async move {
            self.enter().await?;
            let applied = {
                let mut tables = self.tables.lock().unwrap();
                let (_, stored) = tables
                    .appointments
                    .get_mut(&next.id)
                    .ok_or_else(|| appointment_not_found(next.id))?;
                if stored.status != expected {
                    return Err(StoreError::ConditionFailed {
                        expected: expected.as_str(),
                        actual: stored.status.as_str(),
                    });
                }
                // Only `credit_appointment` sets the credit flag.
                let credited = stored.stock_credited;
                *stored = next;
                stored.stock_credited = credited;
                stored.clone()
            };
            self.acknowledge(applied)
        })
    }

    fn list_appointments_for_donor(&self, donor: DonorId) -> StoreFuture<'_, Vec<Appointment>> {
        Box::pin(async move {
            self.enter().await?;
            let tables = self.tables.lock().unwrap();
            let rows = tables
                .appointments
                .values()
                .filter(|(_, a)| a.donor_id == donor)
                .cloned()
                .collect();
            Ok(soonest_first(rows))
        })
    }

    fn list_appointments_for_hospital(
        &self,
        hospital: HospitalId,
    ) -> StoreFuture<'_, Vec<Appointment>> {
        Box::pin(async move {
            self.enter().await?;
            let tables = self.tables.lock().unwrap();
            let rows = tables
                .appointments
                .values()
                .filter(|(_, a)| a.hospital_id == hospital)
                .cloned()
                .collect();
            Ok(soonest_first(rows))
        })
    }

    fn appointment_for_request(
        &self,
        request: RequestId,
    ) -> StoreFuture<'_, Option<Appointment>> {
        Box::pin(async move {
            self.enter().await?;
            let tables = self.tables.lock().unwrap();
            Ok(tables
                .appointments
                .values()
                .filter(|(_, a)| {
                    a.request_id == Some(request) && a.status != AppointmentStatus::Cancelled
                })
                .max_by_key(|(seq, _)| *seq)
                .map(|(_, a)| a.clone()))
        })
    }

    fn appointments_due(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<Appointment>> {
        Box::pin(async move {
            self.enter().await?;
            let tables = self.tables.lock().unwrap();
            let rows = tables
                .appointments
                .values()
                .filter(|(_, a)| {
                    a.status.is_active()
                        && !a.reminder_sent
                        && a.scheduled_at >= from
                        && a.scheduled_at < to
                })
                .cloned()
                .collect();
            Ok(soonest_first(rows))
        })
    }

    fn mark_reminder_sent(&self, id: AppointmentId) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            self.enter().await?;
            let mut tables = self.tables.lock().unwrap();
            let (_, stored) = tables
                .appointments
                .get_mut(&id)
                .ok_or_else(|| appointment_not_found(id))?;
            if stored.reminder_sent {
                return Ok(false);
            }
            stored.reminder_sent = true;
            Ok(true)
        })
    }

    fn set_notarization_ref(&self, id: AppointmentId, reference: String) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.enter().await?;
            let mut tables = self.tables.lock().unwrap();
            let (_, stored) = tables
                .appointments
                .get_mut(&id)
                .ok_or_else(|| appointment_not_found(id))?;
            stored.notarization_ref = Some(reference);
            Ok(())
        })
    }
}

impl NotificationStore for InMemoryStore {
    fn insert_notification(&self, notification: Notification) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.enter().await?;
            if self.take_fault(|f| &mut f.failing_notification_inserts) {
                return Err(StoreError::Unavailable(
                    "injected notification insert failure".into(),
                ));
            }
            self.tables.lock().unwrap().notifications.push(notification);
            Ok(())
        })
    }

    fn find_notification(&self, id: NotificationId) -> StoreFuture<'_, Option<Notification>> {
        Box::pin(async move {
            self.enter().await?;
            let tables = self.tables.lock().unwrap();
            Ok(tables.notifications.iter().find(|n| n.id == id).cloned())
        })
    }

    fn mark_notification_read(&self, id: NotificationId, user: UserId) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            self.enter().await?;
            let mut tables = self.tables.lock().unwrap();
            match tables
                .notifications
                .iter_mut()
                .find(|n| n.id == id && n.user_id == user)
            {
                Some(n) if !n.read => {
                    n.read = true;
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
    }

    fn mark_all_notifications_read(&self, user: UserId) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            self.enter().await?;
            let mut tables = self.tables.lock().unwrap();
            let mut changed = 0;
            for n in tables
                .notifications
                .iter_mut()
                .filter(|n| n.user_id == user && !n.read)
            {
                n.read = true;
                changed += 1;
            }
            Ok(changed)
        })
    }

    fn delete_notification(&self, id: NotificationId, user: UserId) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            self.enter().await?;
            let mut tables = self.tables.lock().unwrap();
            let before = tables.notifications.len();
            tables
                .notifications
                .retain(|n| !(n.id == id && n.user_id == user));
            Ok(tables.notifications.len() != before)
        })
    }

    fn list_notifications(&self, user: UserId) -> StoreFuture<'_, Vec<Notification>> {
        Box::pin(async move {
            self.enter().await?;
            let tables = self.tables.lock().unwrap();
            let rows = tables
                .notifications
                .iter()
                .enumerate()
                .filter(|(_, n)| n.user_id == user)
                .map(|(i, n)| (u64::try_from(i).unwrap_or(u64::MAX), n.clone()))
                .collect();
            Ok(newest_first(rows, |n| n.created_at))
        })
    }
}

impl InventoryStore for InMemoryStore {
    fn adjust_units(
        &self,
        hospital: HospitalId,
        group: BloodGroup,
        delta: i64,
    ) -> StoreFuture<'_, u32> {
        Box::pin(async move {
            self.enter().await?;
            self.adjustment_fault()?;
            let mut tables = self.tables.lock().unwrap();
            tables.adjust(hospital, group, delta)
        })
    }

    fn credit_appointment(&self, id: AppointmentId) -> StoreFuture<'_, Option<u32>> {
        Box::pin(async move {
            self.enter().await?;
            self.adjustment_fault()?;
            let mut tables = self.tables.lock().unwrap();
            let (_, stored) = tables
                .appointments
                .get(&id)
                .ok_or_else(|| appointment_not_found(id))?;
            if stored.status != AppointmentStatus::Completed {
                return Err(StoreError::ConditionFailed {
                    expected: AppointmentStatus::Completed.as_str(),
                    actual: stored.status.as_str(),
                });
            }
            if stored.stock_credited {
                return Ok(None);
            }
            let (hospital, group, units) = (stored.hospital_id, stored.blood_group, stored.units);

            let next = tables.adjust(hospital, group, i64::from(units))?;
            if let Some((_, stored)) = tables.appointments.get_mut(&id) {
                stored.stock_credited = true;
            }
            Ok(Some(next))
        })
    }

    fn load_units(&self, hospital: HospitalId, group: BloodGroup) -> StoreFuture<'_, u32> {
        Box::pin(async move {
            self.enter().await?;
            let tables = self.tables.lock().unwrap();
            Ok(tables.counters.get(&(hospital, group)).copied().unwrap_or(0))
        })
    }

    fn list_counters(&self, hospital: HospitalId) -> StoreFuture<'_, Vec<BloodUnitCounter>> {
        Box::pin(async move {
            self.enter().await?;
            let tables = self.tables.lock().unwrap();
            Ok(tables
                .counters
                .iter()
                .filter(|((h, _), _)| *h == hospital)
                .map(|((hospital_id, blood_group), units)| BloodUnitCounter {
                    hospital_id: *hospital_id,
                    blood_group: *blood_group,
                    units: *units,
                })
                .collect())
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[tokio::test]
    async fn compare_and_swap_rejects_stale_status() {
        let store = InMemoryStore::new();
        let request = fixtures::pending_request(HospitalId::new(), BloodGroup::APos);
        store.insert_request(request.clone()).await.unwrap();

        let mut accepted = request.clone();
        accepted.status = RequestStatus::Accepted;
        accepted.assigned_donor = Some(DonorId::new());
        store
            .compare_and_swap_request(RequestStatus::Pending, accepted.clone())
            .await
            .unwrap();

        let err = store
            .compare_and_swap_request(RequestStatus::Pending, accepted)
            .await
            .expect_err("second swap must fail");
        assert_eq!(
            err,
            StoreError::ConditionFailed {
                expected: "pending",
                actual: "accepted"
            }
        );
    }

    #[tokio::test]
    async fn adjust_refuses_to_go_negative() {
        let store = InMemoryStore::new();
        let hospital = HospitalId::new();
        assert_eq!(store.adjust_units(hospital, BloodGroup::BNeg, 2).await, Ok(2));
        assert_eq!(
            store.adjust_units(hospital, BloodGroup::BNeg, -3).await,
            Err(StoreError::Underflow {
                available: 2,
                requested: 3
            })
        );
        assert_eq!(store.load_units(hospital, BloodGroup::BNeg).await, Ok(2));
    }

    #[tokio::test]
    async fn reminder_flag_flips_once() {
        let store = InMemoryStore::new();
        let appointment = fixtures::appointment(DonorId::new(), HospitalId::new(), Utc::now());
        store.insert_appointment(appointment.clone()).await.unwrap();

        assert_eq!(store.mark_reminder_sent(appointment.id).await, Ok(true));
        assert_eq!(store.mark_reminder_sent(appointment.id).await, Ok(false));
    }

    #[tokio::test]
    async fn completed_appointment_is_credited_once() {
        let store = InMemoryStore::new();
        let mut appointment = fixtures::appointment(DonorId::new(), HospitalId::new(), Utc::now());
        appointment.units = 2;
        store.insert_appointment(appointment.clone()).await.unwrap();

        assert!(matches!(
            store.credit_appointment(appointment.id).await,
            Err(StoreError::ConditionFailed { actual: "scheduled", .. })
        ));

        let mut completed = appointment.clone();
        completed.status = AppointmentStatus::Completed;
        store
            .compare_and_swap_appointment(AppointmentStatus::Scheduled, completed)
            .await
            .unwrap();

        store.fail_next_adjustments(1);
        assert!(matches!(
            store.credit_appointment(appointment.id).await,
            Err(StoreError::Unavailable(_))
        ));
        assert_eq!(store.credit_appointment(appointment.id).await, Ok(Some(2)));
        assert_eq!(store.credit_appointment(appointment.id).await, Ok(None));
        assert_eq!(
            store
                .load_units(appointment.hospital_id, appointment.blood_group)
                .await,
            Ok(2)
        );
        assert!(store.load_appointment(appointment.id).await.unwrap().stock_credited);
    }

    #[tokio::test]
    async fn notification_writes_are_scoped_to_the_owner() {
        let store = InMemoryStore::new();
        let owner = UserId::new();
        let note = fixtures::notification(owner);
        store.insert_notification(note.clone()).await.unwrap();

        assert_eq!(store.mark_notification_read(note.id, UserId::new()).await, Ok(false));
        assert_eq!(store.delete_notification(note.id, UserId::new()).await, Ok(false));
        assert_eq!(store.mark_notification_read(note.id, owner).await, Ok(true));
        assert_eq!(store.delete_notification(note.id, owner).await, Ok(true));
        assert_eq!(store.find_notification(note.id).await, Ok(None));
    }

    #[tokio::test]
    async fn lost_acknowledgement_still_applies_the_swap() {
        let store = InMemoryStore::new();
        let request = fixtures::pending_request(HospitalId::new(), BloodGroup::APos);
        store.insert_request(request.clone()).await.unwrap();
        store.lose_next_swap_acks(1);

        let mut accepted = request.clone();
        accepted.status = RequestStatus::Accepted;
        accepted.assigned_donor = Some(DonorId::new());
        assert!(matches!(
            store
                .compare_and_swap_request(RequestStatus::Pending, accepted.clone())
                .await,
            Err(StoreError::Unavailable(_))
        ));
        assert_eq!(store.load_request(request.id).await, Ok(accepted));
    }

    #[tokio::test]
    async fn injected_faults_are_consumed() {
        let store = InMemoryStore::new();
        store.fail_next_notification_inserts(1);
        let note = fixtures::notification(UserId::new());

        assert!(matches!(
            store.insert_notification(note.clone()).await,
            Err(StoreError::Unavailable(_))
        ));
        assert_eq!(store.insert_notification(note).await, Ok(()));
    }

    #[tokio::test]
    async fn offline_store_fails_every_call() {
        let store = InMemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.load_units(HospitalId::new(), BloodGroup::OPos).await,
            Err(StoreError::Unavailable(_))
        ));
        store.set_unavailable(false);
        assert_eq!(store.load_units(HospitalId::new(), BloodGroup::OPos).await, Ok(0));
    }

    #[tokio::test]
    async fn notifications_list_newest_first() {
        let store = InMemoryStore::new();
        let user = UserId::new();
        let first = fixtures::notification(user);
        let second = fixtures::notification(user);
        store.insert_notification(first.clone()).await.unwrap();
        store.insert_notification(second.clone()).await.unwrap();

        let listed = store.list_notifications(user).await.unwrap();
        assert_eq!(listed, vec![second, first]);
    }
}
