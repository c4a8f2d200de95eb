//! Request lifecycle manager.
//!
//! Every transition is one conditional update of the request record:
//!
//! ```text
//! load ─▶ authorize ─▶ reduce on a copy ─▶ compare-and-swap(expected status)
//!   ▲                                             │
//!   └───────────── lost: reload, re-decide ◀──────┘
//! ```
//!
//! Acceptance is exclusive because two donors racing for the same `pending`
//! request both expect `pending`; the store lets exactly one swap through and
//! the other, on reload, sees the request already resolved.

use super::reducer::{RequestAction, RequestEnvironment, RequestReducer};
use crate::compatibility::{Candidate, CompatibilityResolver, compatible_donor_groups};
use crate::context::CallContext;
use crate::fanout::EventFanout;
use crate::gateway::{StoreGateway, Swap};
use crate::metrics;
use crate::scheduler::{AppointmentScheduler, Booking};
use chrono::{NaiveDate, NaiveTime};
use hemolink_core::environment::Clock;
use hemolink_core::reducer::Reducer;
use hemolink_core::{
    Appointment, AppointmentId, DomainError, DonorId, DonorStore, HospitalId, LifecycleEvent, NewRequest,
    Request, RequestId, RequestStatus, RequestStore, SmallVec,
};
use std::collections::HashSet;
use std::sync::Arc;

/// Conditional-update attempts before giving up on a contended request.
const MAX_ATTEMPTS: usize = 3;

/// Oldest plausible patient age.
const MAX_PATIENT_AGE: u8 = 150;

/// Slot requested when scheduling an accepted request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduleDetails {
    /// Day, UTC
    pub date: NaiveDate,
    /// Time of day, UTC
    pub time: NaiveTime,
    /// Free text for the appointment
    pub notes: String,
}

struct Transition {
    request: Request,
    events: SmallVec<[LifecycleEvent; 4]>,
}

/// Creates requests and drives them through their lifecycle.
pub struct RequestLifecycleManager {
    gateway: StoreGateway,
    clock: Arc<dyn Clock>,
    reducer: RequestReducer,
    env: RequestEnvironment,
    resolver: CompatibilityResolver,
    fanout: Arc<EventFanout>,
    scheduler: Arc<AppointmentScheduler>,
}

impl std::fmt::Debug for RequestLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestLifecycleManager")
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

impl RequestLifecycleManager {
    /// Creates a manager.
    #[must_use]
    pub fn new(
        gateway: StoreGateway,
        clock: Arc<dyn Clock>,
        resolver: CompatibilityResolver,
        fanout: Arc<EventFanout>,
        scheduler: Arc<AppointmentScheduler>,
    ) -> Self {
        Self {
            gateway,
            env: RequestEnvironment::new(Arc::clone(&clock)),
            clock,
            reducer: RequestReducer::new(),
            resolver,
            fanout,
            scheduler,
        }
    }

    // ════════════════════════════════════════════════════════════════════
    // Hospital operations
    // ════════════════════════════════════════════════════════════════════

    /// Open a new `pending` request and alert the best candidates.
    ///
    /// # Errors
    ///
    /// - `Forbidden` unless the caller is `hospital`
    /// - `ValidationFailed` for zero units, a blank patient name or an
    ///   implausible age
    /// - `Unavailable` on store failure
    pub async fn create(
        &self,
        ctx: &CallContext,
        hospital: HospitalId,
        new: NewRequest,
    ) -> Result<Request, DomainError> {
        ctx.require_hospital(hospital)?;
        validate(&new)?;

        let request = Request::open(RequestId::new(), hospital, new, self.clock.now());
        self.gateway
            .call_once(ctx, "insert_request", |store| {
                store.insert_request(request.clone())
            })
            .await?;

        metrics::record_request(RequestStatus::Pending);
        tracing::info!(
            request_id = %request.id,
            hospital_id = %hospital,
            blood_group = %request.blood_group,
            units = request.units_needed,
            urgency = request.urgency.as_str(),
            "Request opened"
        );

        self.fanout
            .emit(
                ctx,
                &[LifecycleEvent::RequestCreated {
                    request_id: request.id,
                    hospital_id: hospital,
                    blood_group: request.blood_group,
                    at: request.created_at,
                }],
            )
            .await;
        Ok(request)
    }

    /// Withdraw a `pending` request. Repeating it is a no-op.
    ///
    /// # Errors
    ///
    /// - `Forbidden` unless the caller owns the request
    /// - `InvalidTransition` unless the request is `pending` (or already `ignored`)
    /// - `NotFound`, `Unavailable`
    pub async fn deactivate(&self, ctx: &CallContext, id: RequestId) -> Result<Request, DomainError> {
        self.run(ctx, id, RequestAction::Deactivate).await
    }

    /// Book the assigned donor and move the request to `scheduled`.
    ///
    /// The appointment is written first, and the request update records its
    /// id. If the request then turns out to have moved (cancelled meanwhile,
    /// or scheduled by a concurrent call) the booking is withdrawn and the
    /// outcome against the current request is returned; the request is never
    /// left pointing at a missing appointment.
    ///
    /// # Errors
    ///
    /// - `Forbidden` unless the caller owns the request
    /// - `InvalidTransition` unless the request is `accepted`
    /// - `ValidationFailed`, `SlotConflict` from booking
    /// - `NotFound`, `Unavailable`
    pub async fn schedule(
        &self,
        ctx: &CallContext,
        id: RequestId,
        details: ScheduleDetails,
    ) -> Result<(Request, Appointment), DomainError> {
        let request = self.load(ctx, id).await?;
        ctx.require_hospital(request.hospital_id)?;

        let scheduled_at = details.date.and_time(details.time).and_utc();
        let appointment_id = AppointmentId::new();
        let action = RequestAction::Schedule {
            scheduled_at,
            appointment: appointment_id,
        };
        let mut next = request.clone();
        let events = self.reducer.reduce(&mut next, action.clone(), &self.env)?;
        let Some(donor) = request.assigned_donor else {
            return Err(DomainError::invalid(format!("request {id} has no donor")));
        };

        let booking = Booking {
            donor,
            hospital: request.hospital_id,
            request: Some(id),
            date: details.date,
            time: details.time,
            kind: request.kind,
            notes: details.notes,
        };
        let appointment = self
            .scheduler
            .book(ctx, appointment_id, booking, Some(&request))
            .await?;
        let mut emitted = events;
        emitted.push(AppointmentScheduler::booked_event(&appointment));

        match self
            .gateway
            .swap_request(ctx, RequestStatus::Accepted, &next)
            .await?
        {
            Swap::Applied(stored) => {
                metrics::record_request(stored.status);
                tracing::info!(
                    request_id = %id,
                    appointment_id = %appointment.id,
                    scheduled_at = %scheduled_at,
                    "Request scheduled"
                );
                self.scheduler.withdraw_others(ctx, &appointment).await;
                self.fanout.emit(ctx, &emitted).await;
                Ok((stored, appointment))
            }
            Swap::Lost { actual } => {
                tracing::debug!(request_id = %id, actual, "Request moved while booking");
                let latest = self.load(ctx, id).await?;

                // A retried swap may have landed before its acknowledgement was lost.
                if latest.appointment_id == Some(appointment.id) {
                    tracing::info!(
                        request_id = %id,
                        appointment_id = %appointment.id,
                        "Request scheduled"
                    );
                    self.fanout.emit(ctx, &emitted).await;
                    return Ok((latest, appointment));
                }

                self.scheduler.withdraw(ctx, &appointment).await;
                let mut replayed = latest;
                self.reducer.reduce(&mut replayed, action, &self.env)?;
                Err(DomainError::Unavailable(format!(
                    "request {id} changed while booking, retry"
                )))
            }
        }
    }

    /// Call the request off, releasing the donor and cancelling its appointment.
    ///
    /// Repeating it re-runs the appointment cleanup and is otherwise a no-op.
    ///
    /// # Errors
    ///
    /// - `Forbidden` unless the caller owns the request
    /// - `InvalidTransition` unless the request is `accepted` or `scheduled`
    /// - `NotFound`, `Unavailable`
    pub async fn cancel(&self, ctx: &CallContext, id: RequestId) -> Result<Request, DomainError> {
        let request = self.run(ctx, id, RequestAction::Cancel).await?;
        self.scheduler.cancel_for_request(ctx, &request).await?;
        Ok(request)
    }

    /// Record that the donation happened.
    ///
    /// Completes the linked appointment too, which credits the hospital's
    /// stock once. If that credit fails the call errors; repeating it
    /// finds the request completed and retries the credit.
    ///
    /// # Errors
    ///
    /// - `Forbidden` unless the caller owns the request
    /// - `InvalidTransition` unless the request is `scheduled`
    /// - `NotFound`, `Unavailable`
    pub async fn complete(&self, ctx: &CallContext, id: RequestId) -> Result<Request, DomainError> {
        let request = self.run(ctx, id, RequestAction::Complete).await?;
        self.scheduler.complete_for_request(ctx, &request).await?;
        Ok(request)
    }

    /// Put a cancelled request back on the board.
    ///
    /// # Errors
    ///
    /// - `Forbidden` unless the caller owns the request
    /// - `InvalidTransition` unless the request is `cancelled`
    /// - `NotFound`, `Unavailable`
    pub async fn reopen(&self, ctx: &CallContext, id: RequestId) -> Result<Request, DomainError> {
        self.run(ctx, id, RequestAction::Reopen).await
    }

    /// The hospital's requests, newest first.
    ///
    /// # Errors
    ///
    /// - `Forbidden` unless the caller is `hospital`
    /// - `Unavailable`
    pub async fn list_for_hospital(
        &self,
        ctx: &CallContext,
        hospital: HospitalId,
    ) -> Result<Vec<Request>, DomainError> {
        ctx.require_hospital(hospital)?;
        self.gateway
            .call(ctx, "list_requests_for_hospital", |store| {
                store.list_requests_for_hospital(hospital)
            })
            .await
    }

    /// Ranked donors who could serve the request right now.
    ///
    /// # Errors
    ///
    /// - `Forbidden` unless the caller owns the request
    /// - `NotFound`, `Unavailable`
    pub async fn candidates(
        &self,
        ctx: &CallContext,
        id: RequestId,
    ) -> Result<Vec<Candidate>, DomainError> {
        let request = self.load(ctx, id).await?;
        ctx.require_hospital(request.hospital_id)?;

        let groups = compatible_donor_groups(request.blood_group);
        let donors = self
            .gateway
            .call(ctx, "list_available_donors", |store| {
                store.list_available_donors(&groups)
            })
            .await?;
        Ok(self
            .resolver
            .find_candidates(&request, &donors, self.clock.now()))
    }

    // ════════════════════════════════════════════════════════════════════
    // Donor operations
    // ════════════════════════════════════════════════════════════════════

    /// Claim a `pending` request. Exactly one donor wins a race.
    ///
    /// The winner repeating the call gets the request back unchanged.
    ///
    /// # Errors
    ///
    /// - `Forbidden` unless the caller is `donor`
    /// - `AlreadyResolved` if another donor holds the request
    /// - `ValidationFailed` if the donor is unavailable or incompatible
    /// - `InvalidTransition` from `ignored` or `cancelled`
    /// - `NotFound`, `Unavailable`
    pub async fn accept(
        &self,
        ctx: &CallContext,
        id: RequestId,
        donor: DonorId,
    ) -> Result<Request, DomainError> {
        ctx.require_donor(donor)?;
        let donor = self
            .gateway
            .call(ctx, "load_donor", |store| store.load_donor(donor))
            .await?;

        self.run(ctx, id, RequestAction::Accept { donor })
            .await
            .inspect_err(|error| {
                if matches!(error, DomainError::AlreadyResolved { .. }) {
                    metrics::record_accept_race_lost();
                    tracing::warn!(request_id = %id, donor_id = %ctx.actor.user_id, "Accept lost to another donor");
                }
            })
    }

    /// Hide a request from this donor's feed.
    ///
    /// Only `pending` requests can be hidden; for any other status the call
    /// succeeds without effect. The request itself does not change.
    ///
    /// # Errors
    ///
    /// - `Forbidden` unless the caller is `donor`
    /// - `NotFound`, `Unavailable`
    pub async fn ignore(
        &self,
        ctx: &CallContext,
        id: RequestId,
        donor: DonorId,
    ) -> Result<Request, DomainError> {
        ctx.require_donor(donor)?;
        let request = self.load(ctx, id).await?;
        if request.status != RequestStatus::Pending {
            return Ok(request);
        }

        let newly = self
            .gateway
            .call(ctx, "record_ignore", |store| store.record_ignore(id, donor))
            .await?;
        if newly {
            tracing::info!(request_id = %id, donor_id = %donor, "Request hidden by donor");
            self.fanout
                .emit(
                    ctx,
                    &[LifecycleEvent::RequestIgnored {
                        request_id: id,
                        donor_id: donor,
                        at: self.clock.now(),
                    }],
                )
                .await;
        }
        Ok(request)
    }

    /// Pending requests this donor can serve and has not hidden.
    ///
    /// Most urgent first, newest first within an urgency.
    ///
    /// # Errors
    ///
    /// - `Forbidden` unless the caller is `donor`
    /// - `NotFound`, `Unavailable`
    pub async fn open_requests_for_donor(
        &self,
        ctx: &CallContext,
        donor: DonorId,
    ) -> Result<Vec<Request>, DomainError> {
        ctx.require_donor(donor)?;
        let profile = self
            .gateway
            .call(ctx, "load_donor", |store| store.load_donor(donor))
            .await?;
        let pending = self
            .gateway
            .call(ctx, "list_pending_requests", |store| {
                store.list_pending_requests()
            })
            .await?;
        let hidden: HashSet<RequestId> = self
            .gateway
            .call(ctx, "ignored_requests", |store| store.ignored_requests(donor))
            .await?
            .into_iter()
            .collect();

        let mut open: Vec<Request> = pending
            .into_iter()
            .filter(|r| profile.blood_group.can_donate_to(r.blood_group))
            .filter(|r| !hidden.contains(&r.id))
            .collect();
        open.sort_by(|a, b| {
            b.urgency
                .cmp(&a.urgency)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(open)
    }

    // ════════════════════════════════════════════════════════════════════
    // Shared
    // ════════════════════════════════════════════════════════════════════

    /// One request. Visible to the owning hospital and to donors.
    ///
    /// # Errors
    ///
    /// - `Forbidden` for a hospital that does not own it
    /// - `NotFound`, `Unavailable`
    pub async fn get(&self, ctx: &CallContext, id: RequestId) -> Result<Request, DomainError> {
        let request = self.load(ctx, id).await?;
        if ctx.hospital_id().is_some() {
            ctx.require_hospital(request.hospital_id)?;
        }
        Ok(request)
    }

    async fn load(&self, ctx: &CallContext, id: RequestId) -> Result<Request, DomainError> {
        self.gateway
            .call(ctx, "load_request", |store| store.load_request(id))
            .await
    }

    /// Transition, then fan out what it emitted.
    async fn run(
        &self,
        ctx: &CallContext,
        id: RequestId,
        action: RequestAction,
    ) -> Result<Request, DomainError> {
        let Transition { request, events } = self.transition(ctx, id, action).await?;
        if !events.is_empty() {
            self.fanout.emit(ctx, &events).await;
        }
        Ok(request)
    }

    async fn transition(
        &self,
        ctx: &CallContext,
        id: RequestId,
        action: RequestAction,
    ) -> Result<Transition, DomainError> {
        let operation = action.operation();
        let mut unacknowledged: Option<Transition> = None;

        for attempt in 1..=MAX_ATTEMPTS {
            let current = self.load(ctx, id).await?;
            if !matches!(action, RequestAction::Accept { .. }) {
                ctx.require_hospital(current.hospital_id)?;
            }

            // A swap can land and still come back lost when its retry finds
            // the write already there; the events are still ours to emit.
            if let Some(sent) = unacknowledged.take() {
                if same_outcome(&current, &sent.request) {
                    tracing::debug!(request_id = %id, %operation, "Lost write had landed");
                    return Ok(Transition {
                        request: current,
                        events: sent.events,
                    });
                }
            }

            let mut next = current.clone();
            let events = self.reducer.reduce(&mut next, action.clone(), &self.env)?;
            if events.is_empty() {
                tracing::debug!(request_id = %id, %operation, "Already applied");
                return Ok(Transition {
                    request: current,
                    events,
                });
            }

            match self.gateway.swap_request(ctx, current.status, &next).await? {
                Swap::Applied(stored) => {
                    metrics::record_request(stored.status);
                    tracing::info!(
                        request_id = %id,
                        %operation,
                        from = %current.status,
                        to = %stored.status,
                        "Request transitioned"
                    );
                    return Ok(Transition {
                        request: stored,
                        events,
                    });
                }
                Swap::Lost { actual } => {
                    tracing::debug!(request_id = %id, %operation, attempt, actual, "Request moved, reloading");
                    unacknowledged = Some(Transition {
                        request: next,
                        events,
                    });
                }
            }
        }

        Err(DomainError::Unavailable(format!(
            "request {id} kept changing after {MAX_ATTEMPTS} attempts"
        )))
    }
}

fn same_outcome(stored: &Request, sent: &Request) -> bool {
    stored.status == sent.status
        && stored.assigned_donor == sent.assigned_donor
        && stored.appointment_id == sent.appointment_id
}

fn validate(new: &NewRequest) -> Result<(), DomainError> {
    if new.units_needed == 0 {
        return Err(DomainError::invalid("units needed must be positive"));
    }
    if new.patient.name.trim().is_empty() {
        return Err(DomainError::invalid("patient name is required"));
    }
    if new.patient.age.is_some_and(|age| age > MAX_PATIENT_AGE) {
        return Err(DomainError::invalid("patient age is out of range"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hemolink_core::BloodGroup;
    use hemolink_testing::fixtures;

    #[test]
    fn request_body_validation() {
        assert!(validate(&fixtures::new_request(BloodGroup::APos)).is_ok());

        let mut zero = fixtures::new_request(BloodGroup::APos);
        zero.units_needed = 0;
        assert!(matches!(validate(&zero), Err(DomainError::ValidationFailed(_))));

        let mut blank = fixtures::new_request(BloodGroup::APos);
        blank.patient.name = "  ".into();
        assert!(matches!(validate(&blank), Err(DomainError::ValidationFailed(_))));

        let mut ancient = fixtures::new_request(BloodGroup::APos);
        ancient.patient.age = Some(200);
        assert!(matches!(validate(&ancient), Err(DomainError::ValidationFailed(_))));
    }
}
