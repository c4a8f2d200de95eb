//! Post-commit side effects of lifecycle events.
//!
//! Runs after the store write that produced the events has succeeded:
//! notifications through the dispatcher, candidate alerts for new requests,
//! then best-effort publication on the event bus. Nothing here can fail the
//! operation that emitted the events.

use crate::compatibility::{CompatibilityResolver, compatible_donor_groups};
use crate::context::CallContext;
use crate::gateway::StoreGateway;
use crate::notifications::{NotificationDispatcher, Outgoing};
use hemolink_core::environment::Clock;
use hemolink_core::event_bus::{EventBus, EventBusError};
use hemolink_core::{
    DomainError, DonorStore, LifecycleEvent, NotificationKind, RequestId, RequestStore,
};
use std::sync::Arc;

/// Delivers the consequences of committed transitions.
pub struct EventFanout {
    dispatcher: NotificationDispatcher,
    gateway: StoreGateway,
    clock: Arc<dyn Clock>,
    resolver: CompatibilityResolver,
    max_candidate_alerts: usize,
    bus: Option<Arc<dyn EventBus>>,
}

impl std::fmt::Debug for EventFanout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventFanout")
            .field("max_candidate_alerts", &self.max_candidate_alerts)
            .field("bus", &self.bus.is_some())
            .finish_non_exhaustive()
    }
}

impl EventFanout {
    /// Creates a fan-out with no event bus attached.
    #[must_use]
    pub fn new(
        dispatcher: NotificationDispatcher,
        gateway: StoreGateway,
        clock: Arc<dyn Clock>,
        resolver: CompatibilityResolver,
        max_candidate_alerts: usize,
    ) -> Self {
        Self {
            dispatcher,
            gateway,
            clock,
            resolver,
            max_candidate_alerts,
            bus: None,
        }
    }

    /// Also publish every event on `bus`.
    #[must_use]
    pub fn with_bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// The dispatcher used for notifications.
    #[must_use]
    pub const fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    /// Deliver notifications for, then publish, each event in order.
    pub async fn emit(&self, ctx: &CallContext, events: &[LifecycleEvent]) {
        for event in events {
            tracing::info!(
                event = event.name(),
                request_id = ?event.request_id(),
                "Lifecycle event"
            );

            if let LifecycleEvent::RequestCreated { request_id, .. } = event {
                match self.alert_candidates(ctx, *request_id).await {
                    Ok(alerted) => tracing::debug!(%request_id, alerted, "Candidates alerted"),
                    Err(error) => tracing::warn!(
                        %request_id,
                        error = %error,
                        "Could not alert candidates"
                    ),
                }
            }

            self.dispatcher.on_event(ctx, event).await;
            self.publish(event.clone()).await;
        }
    }

    /// Send a `request_update` to the top candidates of a new request.
    async fn alert_candidates(
        &self,
        ctx: &CallContext,
        request_id: RequestId,
    ) -> Result<usize, DomainError> {
        if self.max_candidate_alerts == 0 {
            return Ok(0);
        }

        let request = self
            .gateway
            .call(ctx, "load_request", |store| store.load_request(request_id))
            .await?;
        let groups = compatible_donor_groups(request.blood_group);
        let donors = self
            .gateway
            .call(ctx, "list_available_donors", |store| {
                store.list_available_donors(&groups)
            })
            .await?;

        let candidates = self
            .resolver
            .find_candidates(&request, &donors, self.clock.now());

        let mut alerted = 0;
        for candidate in candidates.into_iter().take(self.max_candidate_alerts) {
            let message = format!(
                "A hospital needs {} unit(s) of {} {} ({:?} urgency)",
                request.units_needed,
                request.blood_group,
                request.kind.as_str(),
                request.urgency
            );
            let outgoing =
                Outgoing::to_donor(candidate.donor.id, NotificationKind::RequestUpdate, message);
            if self.dispatcher.deliver(ctx, outgoing).await.is_some() {
                alerted += 1;
            }
        }
        Ok(alerted)
    }

    async fn publish(&self, event: LifecycleEvent) {
        let Some(bus) = &self.bus else {
            return;
        };
        let name = event.name();
        match bus.publish(event).await {
            Ok(receivers) => tracing::trace!(event = name, receivers, "Event published"),
            Err(EventBusError::NoSubscribers(_)) => {
                tracing::trace!(event = name, "No event subscribers");
            }
            Err(error) => tracing::warn!(event = name, error = %error, "Event publish failed"),
        }
    }
}
