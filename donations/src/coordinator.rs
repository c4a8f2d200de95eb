//! Donation coordinator - wires the services together and routes
//! operations that span requests and appointments.

use crate::compatibility::CompatibilityResolver;
use crate::config::Config;
use crate::context::CallContext;
use crate::error::AppError;
use crate::fanout::EventFanout;
use crate::gateway::StoreGateway;
use crate::inventory::InventoryAdjuster;
use crate::lifecycle::{RequestLifecycleManager, ScheduleDetails};
use crate::notary;
use crate::notifications::NotificationDispatcher;
use crate::scheduler::{AppointmentScheduler, Booking};
use hemolink_core::environment::{Clock, SystemClock};
use hemolink_core::event_bus::EventBus;
use hemolink_core::{
    Actor, Appointment, AppointmentId, DomainError, Donor, DonationStore, DonorStore, Notarizer,
};
use hemolink_postgres::PostgresStore;
use std::sync::Arc;
use std::time::Duration;

/// Entry point for the donation core.
///
/// Owns one instance of each service, all sharing the same store, clock and
/// event fan-out:
/// - [`RequestLifecycleManager`] for requests
/// - [`AppointmentScheduler`] for appointments
/// - [`InventoryAdjuster`] for stock
/// - [`NotificationDispatcher`] for per-user notifications
pub struct DonationCoordinator {
    /// Request lifecycle
    pub lifecycle: Arc<RequestLifecycleManager>,
    /// Appointment booking and transitions
    pub scheduler: Arc<AppointmentScheduler>,
    /// Stock counters
    pub inventory: InventoryAdjuster,
    fanout: Arc<EventFanout>,
    gateway: StoreGateway,
    config: Config,
}

impl std::fmt::Debug for DonationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DonationCoordinator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DonationCoordinator {
    /// Build every service on top of `store`.
    #[must_use]
    pub fn new(
        store: Arc<dyn DonationStore>,
        clock: Arc<dyn Clock>,
        notary: Arc<dyn Notarizer>,
        bus: Option<Arc<dyn EventBus>>,
        config: Config,
    ) -> Self {
        let gateway = StoreGateway::new(store, config.retry_policy());
        let resolver = CompatibilityResolver::new().with_max_distance_km(config.matching.max_distance_km);
        let dispatcher = NotificationDispatcher::new(gateway.clone(), Arc::clone(&clock));

        let mut fanout = EventFanout::new(
            dispatcher,
            gateway.clone(),
            Arc::clone(&clock),
            resolver,
            config.matching.max_candidate_alerts,
        );
        if let Some(bus) = bus {
            fanout = fanout.with_bus(bus);
        }
        let fanout = Arc::new(fanout);

        let inventory = InventoryAdjuster::new(gateway.clone(), Arc::clone(&fanout));
        let scheduler = Arc::new(AppointmentScheduler::new(
            gateway.clone(),
            Arc::clone(&clock),
            config.scheduling.clone(),
            inventory.clone(),
            Arc::clone(&fanout),
            notary,
            config.notary_timeout(),
        ));
        let lifecycle = Arc::new(RequestLifecycleManager::new(
            gateway.clone(),
            clock,
            resolver,
            Arc::clone(&fanout),
            Arc::clone(&scheduler),
        ));

        tracing::info!(
            max_days_ahead = config.scheduling.max_days_ahead,
            slot_buffer_hours = config.scheduling.slot_buffer_hours,
            max_candidate_alerts = config.matching.max_candidate_alerts,
            "Donation coordinator ready"
        );

        Self {
            lifecycle,
            scheduler,
            inventory,
            fanout,
            gateway,
            config,
        }
    }

    /// Connect to `PostgreSQL`, run migrations and build the services.
    ///
    /// # Errors
    ///
    /// - `AppError::Config` if `DATABASE_URL` is unset
    /// - `AppError::Store` if the connection or a migration fails
    /// - `AppError::Notary` if the ledger client cannot be built
    pub async fn connect(config: Config, bus: Option<Arc<dyn EventBus>>) -> Result<Self, AppError> {
        let url = config
            .postgres
            .url
            .clone()
            .ok_or_else(|| AppError::Config("DATABASE_URL is not set".to_string()))?;

        tracing::info!("Connecting to PostgreSQL...");
        let store = PostgresStore::connect_with_timeout(
            &url,
            config.postgres.max_connections,
            Duration::from_secs(config.postgres.connect_timeout),
        )
        .await?;

        tracing::info!("Running database migrations...");
        store.migrate().await?;
        tracing::info!("PostgreSQL ready");

        let notary = notary::from_config(&config.notary)?;
        Ok(Self::new(
            Arc::new(store),
            Arc::new(SystemClock),
            notary,
            bus,
            config,
        ))
    }

    /// A context for `actor` with the configured store deadline.
    #[must_use]
    pub fn context(&self, actor: Actor) -> CallContext {
        CallContext::new(actor, self.config.store_timeout())
    }

    /// The notification dispatcher.
    #[must_use]
    pub fn notifications(&self) -> &NotificationDispatcher {
        self.fanout.dispatcher()
    }

    /// The configuration the services were built with.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Create or update a donor's own profile.
    ///
    /// # Errors
    ///
    /// - `Forbidden` unless the caller is that donor
    /// - `Unavailable`
    pub async fn register_donor(&self, ctx: &CallContext, donor: Donor) -> Result<Donor, DomainError> {
        ctx.require_donor(donor.id)?;
        self.gateway
            .call(ctx, "upsert_donor", |store| store.upsert_donor(donor.clone()))
            .await?;
        tracing::info!(donor_id = %donor.id, blood_group = %donor.blood_group, "Donor registered");
        Ok(donor)
    }

    /// Book an appointment.
    ///
    /// A booking that names a request schedules that request, so both records
    /// move together; anything else is a standalone booking.
    ///
    /// # Errors
    ///
    /// See [`RequestLifecycleManager::schedule`] and
    /// [`AppointmentScheduler::schedule`].
    pub async fn schedule_appointment(
        &self,
        ctx: &CallContext,
        booking: Booking,
    ) -> Result<Appointment, DomainError> {
        let Some(request) = booking.request else {
            return self.scheduler.schedule(ctx, booking).await;
        };

        let current = self.lifecycle.get(ctx, request).await?;
        if current.assigned_donor.is_some() && current.assigned_donor != Some(booking.donor) {
            return Err(DomainError::invalid(format!(
                "donor {} is not assigned to request {request}",
                booking.donor
            )));
        }

        let (_, appointment) = self
            .lifecycle
            .schedule(
                ctx,
                request,
                ScheduleDetails {
                    date: booking.date,
                    time: booking.time,
                    notes: booking.notes,
                },
            )
            .await?;
        Ok(appointment)
    }

    /// Mark an appointment completed; completes its request too.
    ///
    /// # Errors
    ///
    /// See [`AppointmentScheduler::mark_completed`]. A request that cannot
    /// complete is logged, not returned.
    pub async fn mark_appointment_completed(
        &self,
        ctx: &CallContext,
        id: AppointmentId,
    ) -> Result<Appointment, DomainError> {
        let appointment = self.scheduler.mark_completed(ctx, id).await?;

        if let Some(request) = appointment.request_id {
            match self.lifecycle.complete(ctx, request).await {
                Ok(_) => {}
                Err(error @ DomainError::InvalidTransition { .. }) => {
                    tracing::warn!(
                        request_id = %request,
                        appointment_id = %id,
                        error = %error,
                        "Appointment completed but its request did not"
                    );
                }
                Err(error) => return Err(error),
            }
        }
        Ok(appointment)
    }

    /// Cancel an appointment. An active request-linked appointment cancels
    /// its request, which releases the donor.
    ///
    /// # Errors
    ///
    /// See [`AppointmentScheduler::cancel`] and
    /// [`RequestLifecycleManager::cancel`].
    pub async fn cancel_appointment(
        &self,
        ctx: &CallContext,
        id: AppointmentId,
    ) -> Result<Appointment, DomainError> {
        let appointment = self.scheduler.load(ctx, id).await?;
        match appointment.request_id {
            Some(request) if appointment.status.is_active() => {
                ctx.require_hospital(appointment.hospital_id)?;
                self.lifecycle.cancel(ctx, request).await?;
                self.scheduler.load(ctx, id).await
            }
            _ => self.scheduler.cancel(ctx, id).await,
        }
    }

    /// Send reminders for appointments starting within the configured lead.
    ///
    /// # Errors
    ///
    /// `Unavailable` on store failure.
    pub async fn dispatch_due_reminders(&self, ctx: &CallContext) -> Result<usize, DomainError> {
        self.scheduler
            .dispatch_due_reminders(ctx, self.config.reminder_lead())
            .await
    }
}
