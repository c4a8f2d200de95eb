//! Appointment scheduler service.

use super::reducer::{AppointmentAction, AppointmentEnvironment, AppointmentReducer};
use crate::config::SchedulingConfig;
use crate::context::CallContext;
use crate::fanout::EventFanout;
use crate::gateway::{StoreGateway, Swap};
use crate::inventory::InventoryAdjuster;
use crate::metrics;
use crate::notifications::Outgoing;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use hemolink_core::environment::Clock;
use hemolink_core::reducer::Reducer;
use hemolink_core::{
    Appointment, AppointmentId, AppointmentStatus, AppointmentStore, DomainError, DonationKind,
    DonationRecord, DonorId, DonorStore, HospitalId, LifecycleEvent, NotaryError, Notarizer,
    Request, RequestId, SmallVec,
};
use std::sync::Arc;

/// Conditional-update attempts before giving up on a contended appointment.
const MAX_ATTEMPTS: usize = 3;

/// What the hospital asks for when booking.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Booking {
    /// Donor to book
    pub donor: DonorId,
    /// Hospital that will take the donation
    pub hospital: HospitalId,
    /// Originating request, if any
    pub request: Option<RequestId>,
    /// Day, UTC
    pub date: NaiveDate,
    /// Time of day, UTC
    pub time: NaiveTime,
    /// Blood or plasma
    pub kind: DonationKind,
    /// Free text
    pub notes: String,
}

impl Booking {
    /// The booked instant.
    #[must_use]
    pub fn scheduled_at(&self) -> DateTime<Utc> {
        self.date.and_time(self.time).and_utc()
    }
}

/// Result of driving one appointment transition.
#[derive(Clone, Debug)]
pub(crate) struct AppointmentTransition {
    pub(crate) appointment: Appointment,
    pub(crate) events: SmallVec<[LifecycleEvent; 4]>,
}

/// Books appointments and drives them to a terminal state.
pub struct AppointmentScheduler {
    gateway: StoreGateway,
    clock: Arc<dyn Clock>,
    reducer: AppointmentReducer,
    env: AppointmentEnvironment,
    rules: SchedulingConfig,
    inventory: InventoryAdjuster,
    fanout: Arc<EventFanout>,
    notary: Arc<dyn Notarizer>,
    notary_timeout: std::time::Duration,
}

impl std::fmt::Debug for AppointmentScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppointmentScheduler")
            .field("rules", &self.rules)
            .field("notary_timeout", &self.notary_timeout)
            .finish_non_exhaustive()
    }
}

impl AppointmentScheduler {
    /// Creates a scheduler.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gateway: StoreGateway,
        clock: Arc<dyn Clock>,
        rules: SchedulingConfig,
        inventory: InventoryAdjuster,
        fanout: Arc<EventFanout>,
        notary: Arc<dyn Notarizer>,
        notary_timeout: std::time::Duration,
    ) -> Self {
        Self {
            gateway,
            env: AppointmentEnvironment::new(Arc::clone(&clock)),
            clock,
            reducer: AppointmentReducer::new(),
            rules,
            inventory,
            fanout,
            notary,
            notary_timeout,
        }
    }

    // ════════════════════════════════════════════════════════════════════
    // Booking
    // ════════════════════════════════════════════════════════════════════

    /// Book a standalone appointment.
    ///
    /// Appointments for a request are booked through
    /// `RequestLifecycleManager::schedule`, which also moves the request.
    ///
    /// # Errors
    ///
    /// - `Forbidden` unless the caller is the booking hospital
    /// - `ValidationFailed` for a request-linked booking, a slot in the past or
    ///   beyond the booking window
    /// - `NotFound` if the donor does not exist
    /// - `SlotConflict` if the donor is already booked nearby
    /// - `Unavailable` on store failure
    pub async fn schedule(
        &self,
        ctx: &CallContext,
        booking: Booking,
    ) -> Result<Appointment, DomainError> {
        ctx.require_hospital(booking.hospital)?;
        if booking.request.is_some() {
            return Err(DomainError::invalid(
                "request-linked appointments are booked through the request",
            ));
        }

        let appointment = self
            .book(ctx, AppointmentId::new(), booking, None)
            .await?;
        self.fanout
            .emit(ctx, &[Self::booked_event(&appointment)])
            .await;
        Ok(appointment)
    }

    /// Validate and insert appointment `id` without emitting anything.
    ///
    /// `request` must be the loaded request when the booking is linked.
    pub(crate) async fn book(
        &self,
        ctx: &CallContext,
        id: AppointmentId,
        booking: Booking,
        request: Option<&Request>,
    ) -> Result<Appointment, DomainError> {
        let now = self.clock.now();
        let scheduled_at = booking.scheduled_at();
        self.check_window(now, scheduled_at)?;

        let donor_id = booking.donor;
        let donor = self
            .gateway
            .call(ctx, "load_donor", |store| store.load_donor(donor_id))
            .await?;

        let (blood_group, units, kind) = match request {
            Some(request) => {
                if request.assigned_donor != Some(donor.id) {
                    return Err(DomainError::invalid(format!(
                        "donor {} is not assigned to request {}",
                        donor.id, request.id
                    )));
                }
                (request.blood_group, request.units_needed, request.kind)
            }
            None => (donor.blood_group, 1, booking.kind),
        };

        self.check_overlap(ctx, donor_id, scheduled_at, request.map(|r| r.id))
            .await?;

        let appointment = Appointment {
            id,
            request_id: request.map(|r| r.id),
            donor_id,
            hospital_id: booking.hospital,
            scheduled_at,
            kind,
            blood_group,
            units,
            status: AppointmentStatus::Scheduled,
            notes: booking.notes,
            reminder_sent: false,
            notarization_ref: None,
            stock_credited: false,
            created_at: now,
            updated_at: now,
        };

        self.gateway
            .call_once(ctx, "insert_appointment", |store| {
                store.insert_appointment(appointment.clone())
            })
            .await?;

        metrics::record_appointment(AppointmentStatus::Scheduled);
        tracing::info!(
            appointment_id = %appointment.id,
            donor_id = %donor_id,
            hospital_id = %appointment.hospital_id,
            request_id = ?appointment.request_id,
            scheduled_at = %scheduled_at,
            "Appointment booked"
        );
        Ok(appointment)
    }

    fn check_window(
        &self,
        now: DateTime<Utc>,
        scheduled_at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if scheduled_at < now {
            return Err(DomainError::invalid(format!(
                "appointment time {scheduled_at} is in the past"
            )));
        }

        let last_day = now.date_naive() + Duration::days(self.rules.max_days_ahead);
        if scheduled_at.date_naive() > last_day {
            return Err(DomainError::invalid(format!(
                "appointments can be booked at most {} days ahead",
                self.rules.max_days_ahead
            )));
        }
        Ok(())
    }

    /// Earlier bookings for the same request are not conflicts: whichever
    /// attempt wins the request update withdraws the others.
    async fn check_overlap(
        &self,
        ctx: &CallContext,
        donor: DonorId,
        scheduled_at: DateTime<Utc>,
        request: Option<RequestId>,
    ) -> Result<(), DomainError> {
        let buffer = Duration::hours(self.rules.slot_buffer_hours);
        let existing = self
            .gateway
            .call(ctx, "list_appointments_for_donor", |store| {
                store.list_appointments_for_donor(donor)
            })
            .await?;

        match existing
            .iter()
            .filter(|a| a.status.blocks_slot())
            .filter(|a| request.is_none() || a.request_id != request)
            .find(|a| (a.scheduled_at - scheduled_at).abs() < buffer)
        {
            Some(clash) => Err(DomainError::SlotConflict {
                donor: donor.to_string(),
                existing: clash.id.to_string(),
            }),
            None => Ok(()),
        }
    }

    pub(crate) fn booked_event(appointment: &Appointment) -> LifecycleEvent {
        LifecycleEvent::AppointmentScheduled {
            appointment_id: appointment.id,
            request_id: appointment.request_id,
            donor_id: appointment.donor_id,
            hospital_id: appointment.hospital_id,
            scheduled_at: appointment.scheduled_at,
        }
    }

    /// Cancel a freshly booked appointment whose request update lost.
    ///
    /// Silent: nobody was told about the booking yet.
    pub(crate) async fn withdraw(&self, ctx: &CallContext, appointment: &Appointment) {
        let outcome = self
            .drive(ctx, appointment.id, AppointmentAction::Cancel)
            .await;
        match outcome {
            Ok(_) => tracing::info!(appointment_id = %appointment.id, "Booking withdrawn"),
            Err(error) => tracing::warn!(
                appointment_id = %appointment.id,
                error = %error,
                "Could not withdraw booking"
            ),
        }
    }

    /// Withdraw every other active booking of `keep`'s request.
    pub(crate) async fn withdraw_others(&self, ctx: &CallContext, keep: &Appointment) {
        let donor = keep.donor_id;
        let booked = match self
            .gateway
            .call(ctx, "list_appointments_for_donor", |store| {
                store.list_appointments_for_donor(donor)
            })
            .await
        {
            Ok(booked) => booked,
            Err(error) => {
                tracing::warn!(
                    appointment_id = %keep.id,
                    error = %error,
                    "Could not look for superseded bookings"
                );
                return;
            }
        };

        for stale in booked
            .iter()
            .filter(|a| a.request_id == keep.request_id && a.id != keep.id && a.status.is_active())
        {
            self.withdraw(ctx, stale).await;
        }
    }

    // ════════════════════════════════════════════════════════════════════
    // Transitions
    // ════════════════════════════════════════════════════════════════════

    /// The donor (or the hospital) confirms attendance.
    ///
    /// # Errors
    ///
    /// - `Forbidden` unless the caller is the appointment's donor or hospital
    /// - `InvalidTransition` unless the appointment is `scheduled`
    /// - `NotFound`, `Unavailable`
    pub async fn confirm(
        &self,
        ctx: &CallContext,
        id: AppointmentId,
    ) -> Result<Appointment, DomainError> {
        let current = self.load(ctx, id).await?;
        if !ctx.actor.is_donor(current.donor_id) {
            ctx.require_hospital(current.hospital_id)?;
        }
        self.apply(ctx, id, AppointmentAction::Confirm).await
    }

    /// The donation was taken: credits stock and starts notarization.
    ///
    /// Stock is credited once per appointment. Repeating the call after a
    /// failed credit retries the credit.
    ///
    /// # Errors
    ///
    /// - `Forbidden` unless the caller is the appointment's hospital
    /// - `InvalidTransition` from `cancelled` or `no_show`
    /// - `Unavailable` if the store fails, including a credit that failed
    ///   after the appointment was completed
    /// - `NotFound`
    pub async fn mark_completed(
        &self,
        ctx: &CallContext,
        id: AppointmentId,
    ) -> Result<Appointment, DomainError> {
        self.authorize_hospital(ctx, id).await?;
        self.apply(ctx, id, AppointmentAction::MarkCompleted).await
    }

    /// The donor did not come.
    ///
    /// # Errors
    ///
    /// Same as [`Self::mark_completed`].
    pub async fn mark_no_show(
        &self,
        ctx: &CallContext,
        id: AppointmentId,
    ) -> Result<Appointment, DomainError> {
        self.authorize_hospital(ctx, id).await?;
        self.apply(ctx, id, AppointmentAction::MarkNoShow).await
    }

    /// Call the appointment off.
    ///
    /// # Errors
    ///
    /// Same as [`Self::mark_completed`].
    pub async fn cancel(
        &self,
        ctx: &CallContext,
        id: AppointmentId,
    ) -> Result<Appointment, DomainError> {
        self.authorize_hospital(ctx, id).await?;
        self.apply(ctx, id, AppointmentAction::Cancel).await
    }

    /// Cancel the active appointment of a cancelled request, if any.
    pub(crate) async fn cancel_for_request(
        &self,
        ctx: &CallContext,
        request: &Request,
    ) -> Result<Option<Appointment>, DomainError> {
        match self.booking_of(ctx, request).await? {
            Some(appointment) if appointment.status.is_active() => self
                .apply(ctx, appointment.id, AppointmentAction::Cancel)
                .await
                .map(Some),
            other => Ok(other),
        }
    }

    /// Complete the appointment of a completed request.
    ///
    /// An appointment that is already completed goes through the same path,
    /// which re-drives a stock credit that failed earlier and is a no-op
    /// otherwise.
    pub(crate) async fn complete_for_request(
        &self,
        ctx: &CallContext,
        request: &Request,
    ) -> Result<Option<Appointment>, DomainError> {
        match self.booking_of(ctx, request).await? {
            Some(appointment)
                if appointment.status.is_active()
                    || appointment.status == AppointmentStatus::Completed =>
            {
                self.apply(ctx, appointment.id, AppointmentAction::MarkCompleted)
                    .await
                    .map(Some)
            }
            Some(appointment) => {
                tracing::warn!(
                    request_id = %request.id,
                    appointment_id = %appointment.id,
                    status = %appointment.status,
                    "Completed request has an appointment that cannot complete"
                );
                Ok(Some(appointment))
            }
            None => {
                tracing::warn!(request_id = %request.id, "Completed request has no appointment");
                Ok(None)
            }
        }
    }

    /// The appointment recorded on the request, or the latest linked one
    /// for requests scheduled before the link was recorded.
    async fn booking_of(
        &self,
        ctx: &CallContext,
        request: &Request,
    ) -> Result<Option<Appointment>, DomainError> {
        match request.appointment_id {
            Some(id) => self.load(ctx, id).await.map(Some),
            None => self.linked(ctx, request.id).await,
        }
    }

    pub(crate) async fn linked(
        &self,
        ctx: &CallContext,
        request: RequestId,
    ) -> Result<Option<Appointment>, DomainError> {
        self.gateway
            .call(ctx, "appointment_for_request", |store| {
                store.appointment_for_request(request)
            })
            .await
    }

    async fn authorize_hospital(
        &self,
        ctx: &CallContext,
        id: AppointmentId,
    ) -> Result<(), DomainError> {
        let current = self.load(ctx, id).await?;
        ctx.require_hospital(current.hospital_id)
    }

    /// Drive a transition, then run its side effects.
    async fn apply(
        &self,
        ctx: &CallContext,
        id: AppointmentId,
        action: AppointmentAction,
    ) -> Result<Appointment, DomainError> {
        let AppointmentTransition {
            appointment,
            events,
        } = self.drive(ctx, id, action).await?;

        let completing = action == AppointmentAction::MarkCompleted
            && appointment.status == AppointmentStatus::Completed;

        if events.is_empty() {
            tracing::debug!(appointment_id = %id, action = %action.operation(), "Replay, nothing to do");
            if completing && !appointment.stock_credited {
                tracing::info!(appointment_id = %id, "Re-driving stock credit");
                return self.credit_stock(ctx, appointment).await;
            }
            return Ok(appointment);
        }

        if completing {
            self.spawn_notarization(ctx, &appointment);
        }
        self.fanout.emit(ctx, &events).await;
        if completing {
            return self.credit_stock(ctx, appointment).await;
        }
        Ok(appointment)
    }

    /// Load, decide, conditionally write; reload and re-decide on a lost write.
    async fn drive(
        &self,
        ctx: &CallContext,
        id: AppointmentId,
        action: AppointmentAction,
    ) -> Result<AppointmentTransition, DomainError> {
        let mut unacknowledged: Option<AppointmentTransition> = None;

        for attempt in 1..=MAX_ATTEMPTS {
            let current = self.load(ctx, id).await?;

            // A swap can land and still come back lost when its retry finds
            // the write already there.
            if let Some(sent) = unacknowledged.take() {
                if current.status == sent.appointment.status {
                    tracing::debug!(appointment_id = %id, "Lost write had landed");
                    return Ok(AppointmentTransition {
                        appointment: current,
                        events: sent.events,
                    });
                }
            }

            let mut next = current.clone();
            let events = self.reducer.reduce(&mut next, action, &self.env)?;
            if events.is_empty() {
                return Ok(AppointmentTransition {
                    appointment: current,
                    events,
                });
            }

            match self.gateway.swap_appointment(ctx, current.status, &next).await? {
                Swap::Applied(stored) => {
                    metrics::record_appointment(stored.status);
                    tracing::info!(
                        appointment_id = %id,
                        from = %current.status,
                        to = %stored.status,
                        "Appointment transitioned"
                    );
                    return Ok(AppointmentTransition {
                        appointment: stored,
                        events,
                    });
                }
                Swap::Lost { actual } => {
                    tracing::debug!(appointment_id = %id, attempt, actual, "Appointment moved, reloading");
                    unacknowledged = Some(AppointmentTransition {
                        appointment: next,
                        events,
                    });
                }
            }
        }

        Err(DomainError::Unavailable(format!(
            "appointment {id} kept changing after {MAX_ATTEMPTS} attempts"
        )))
    }

    /// Credit a completed appointment. A failure is returned so the caller
    /// retries; the retry finds the appointment completed and credits again.
    async fn credit_stock(
        &self,
        ctx: &CallContext,
        mut appointment: Appointment,
    ) -> Result<Appointment, DomainError> {
        match self.inventory.credit_completed(ctx, &appointment).await {
            Ok(_) => {
                appointment.stock_credited = true;
                Ok(appointment)
            }
            Err(error) => {
                tracing::error!(
                    appointment_id = %appointment.id,
                    hospital_id = %appointment.hospital_id,
                    blood_group = %appointment.blood_group,
                    units = appointment.units,
                    error = %error,
                    "Completed donation was not credited to stock"
                );
                Err(error)
            }
        }
    }

    fn spawn_notarization(&self, ctx: &CallContext, appointment: &Appointment) {
        let record = DonationRecord {
            appointment_id: appointment.id,
            request_id: appointment.request_id,
            donor_id: appointment.donor_id,
            hospital_id: appointment.hospital_id,
            kind: appointment.kind,
            blood_group: appointment.blood_group,
            units: appointment.units,
            completed_at: appointment.updated_at,
        };
        let notary = Arc::clone(&self.notary);
        let gateway = self.gateway.clone();
        let timeout = self.notary_timeout;
        let ctx = *ctx;
        let id = appointment.id;

        tokio::spawn(async move {
            let reference = match tokio::time::timeout(timeout, notary.notarize(record)).await {
                Ok(Ok(reference)) => reference,
                Ok(Err(NotaryError::Disabled)) => {
                    metrics::record_notarization("disabled");
                    return;
                }
                Ok(Err(error)) => {
                    metrics::record_notarization("failed");
                    tracing::warn!(appointment_id = %id, error = %error, "Notarization failed");
                    return;
                }
                Err(_) => {
                    metrics::record_notarization("timeout");
                    tracing::warn!(appointment_id = %id, "Notarization timed out");
                    return;
                }
            };

            let stored = gateway
                .call(&ctx, "set_notarization_ref", |store| {
                    store.set_notarization_ref(id, reference.clone())
                })
                .await;
            match stored {
                Ok(()) => {
                    metrics::record_notarization("recorded");
                    tracing::info!(appointment_id = %id, reference = %reference, "Donation notarized");
                }
                Err(error) => {
                    metrics::record_notarization("failed");
                    tracing::warn!(
                        appointment_id = %id,
                        error = %error,
                        "Notarization reference not stored"
                    );
                }
            }
        });
    }

    // ════════════════════════════════════════════════════════════════════
    // Reminders and reads
    // ════════════════════════════════════════════════════════════════════

    /// Send one reminder for each active appointment starting within `lead`.
    ///
    /// The reminder flag is flipped before sending, so concurrent runs never
    /// remind twice. Returns how many reminders were stored.
    ///
    /// # Errors
    ///
    /// `Unavailable` on store failure.
    pub async fn dispatch_due_reminders(
        &self,
        ctx: &CallContext,
        lead: Duration,
    ) -> Result<usize, DomainError> {
        let now = self.clock.now();
        let due = self
            .gateway
            .call(ctx, "appointments_due", |store| {
                store.appointments_due(now, now + lead)
            })
            .await?;

        let mut sent = 0;
        for appointment in due {
            let id = appointment.id;
            let flipped = self
                .gateway
                .call(ctx, "mark_reminder_sent", |store| store.mark_reminder_sent(id))
                .await?;
            if !flipped {
                continue;
            }
            if self
                .fanout
                .dispatcher()
                .deliver(ctx, Outgoing::reminder(&appointment))
                .await
                .is_some()
            {
                sent += 1;
            }
        }

        tracing::info!(sent, "Reminders dispatched");
        Ok(sent)
    }

    /// One appointment.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Unavailable`.
    pub async fn load(
        &self,
        ctx: &CallContext,
        id: AppointmentId,
    ) -> Result<Appointment, DomainError> {
        self.gateway
            .call(ctx, "load_appointment", |store| store.load_appointment(id))
            .await
    }

    /// A donor's appointments, soonest first.
    ///
    /// # Errors
    ///
    /// - `Forbidden` unless the caller is `donor`
    /// - `Unavailable`
    pub async fn list_for_donor(
        &self,
        ctx: &CallContext,
        donor: DonorId,
    ) -> Result<Vec<Appointment>, DomainError> {
        ctx.require_donor(donor)?;
        self.gateway
            .call(ctx, "list_appointments_for_donor", |store| {
                store.list_appointments_for_donor(donor)
            })
            .await
    }

    /// A hospital's appointments, soonest first.
    ///
    /// # Errors
    ///
    /// - `Forbidden` unless the caller is `hospital`
    /// - `Unavailable`
    pub async fn list_for_hospital(
        &self,
        ctx: &CallContext,
        hospital: HospitalId,
    ) -> Result<Vec<Appointment>, DomainError> {
        ctx.require_hospital(hospital)?;
        self.gateway
            .call(ctx, "list_appointments_for_hospital", |store| {
                store.list_appointments_for_hospital(hospital)
            })
            .await
    }
}
