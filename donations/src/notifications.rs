//! Notification dispatcher.
//!
//! Writes are at-least-once: a failed insert of class `Unavailable` is retried
//! with the configured backoff, and a duplicate after a lost acknowledgement
//! is acceptable. Read-flag updates and deletes are idempotent.
//!
//! [`NotificationDispatcher::plan`] is the single place that decides who hears
//! about which lifecycle event.

use crate::context::CallContext;
use crate::gateway::StoreGateway;
use crate::metrics;
use hemolink_core::environment::Clock;
use hemolink_core::{
    Appointment, DomainError, DonorId, HospitalId, LifecycleEvent, Notification, NotificationId,
    NotificationKind, NotificationStore, Role, SmallVec, UserId, smallvec,
};
use std::sync::Arc;

/// A notification that has not been stored yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outgoing {
    /// Recipient
    pub user_id: UserId,
    /// Recipient role
    pub role: Role,
    /// Category
    pub kind: NotificationKind,
    /// Text
    pub message: String,
}

impl Outgoing {
    /// A message for a donor.
    #[must_use]
    pub fn to_donor(
        donor: DonorId,
        kind: NotificationKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id: donor.into(),
            role: Role::Donor,
            kind,
            message: message.into(),
        }
    }

    /// A message for a hospital.
    #[must_use]
    pub fn to_hospital(
        hospital: HospitalId,
        kind: NotificationKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id: hospital.into(),
            role: Role::Hospital,
            kind,
            message: message.into(),
        }
    }

    /// The reminder sent ahead of an appointment.
    #[must_use]
    pub fn reminder(appointment: &Appointment) -> Self {
        Self::to_donor(
            appointment.donor_id,
            NotificationKind::AppointmentReminder,
            format!(
                "Reminder: your donation appointment is at {}",
                appointment.scheduled_at.format("%Y-%m-%d %H:%M UTC")
            ),
        )
    }
}

/// Stores and manages per-user notifications.
#[derive(Clone)]
pub struct NotificationDispatcher {
    gateway: StoreGateway,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher").finish_non_exhaustive()
    }
}

impl NotificationDispatcher {
    /// Creates a dispatcher.
    #[must_use]
    pub fn new(gateway: StoreGateway, clock: Arc<dyn Clock>) -> Self {
        Self { gateway, clock }
    }

    /// Store one notification, retrying transient failures.
    ///
    /// # Errors
    ///
    /// `Unavailable` once retries are exhausted.
    pub async fn notify(
        &self,
        ctx: &CallContext,
        outgoing: Outgoing,
    ) -> Result<Notification, DomainError> {
        let notification = Notification {
            id: NotificationId::new(),
            user_id: outgoing.user_id,
            role: outgoing.role,
            kind: outgoing.kind,
            message: outgoing.message,
            read: false,
            created_at: self.clock.now(),
        };

        self.gateway
            .call(ctx, "insert_notification", |store| {
                store.insert_notification(notification.clone())
            })
            .await?;

        metrics::record_notification(true);
        tracing::debug!(
            notification_id = %notification.id,
            user_id = %notification.user_id,
            kind = notification.kind.as_str(),
            "Notification stored"
        );
        Ok(notification)
    }

    /// Like [`Self::notify`], but a failure is logged and swallowed.
    ///
    /// Used on lifecycle paths, where a lost notification must not fail the
    /// transition that triggered it.
    pub async fn deliver(&self, ctx: &CallContext, outgoing: Outgoing) -> Option<Notification> {
        let user_id = outgoing.user_id;
        let kind = outgoing.kind;

        match self.notify(ctx, outgoing).await {
            Ok(notification) => Some(notification),
            Err(error) => {
                metrics::record_notification(false);
                tracing::warn!(
                    user_id = %user_id,
                    kind = kind.as_str(),
                    error = %error,
                    "Notification dropped after retries"
                );
                None
            }
        }
    }

    /// Deliver everything [`Self::plan`] derives from `event`.
    ///
    /// Returns how many notifications were stored.
    pub async fn on_event(&self, ctx: &CallContext, event: &LifecycleEvent) -> usize {
        let mut stored = 0;
        for outgoing in Self::plan(event) {
            if self.deliver(ctx, outgoing).await.is_some() {
                stored += 1;
            }
        }
        stored
    }

    /// Who hears about `event`, and what they are told.
    ///
    /// `RequestCreated` alerts depend on the candidate list and are sent by
    /// the event fan-out, not planned here.
    #[must_use]
    pub fn plan(event: &LifecycleEvent) -> SmallVec<[Outgoing; 2]> {
        use NotificationKind::{AppointmentConfirmation, General, RequestUpdate};

        match event {
            LifecycleEvent::RequestAccepted {
                request_id,
                hospital_id,
                donor_id,
                ..
            } => smallvec![
                Outgoing::to_hospital(
                    *hospital_id,
                    RequestUpdate,
                    format!("A donor accepted request {request_id}"),
                ),
                Outgoing::to_donor(
                    *donor_id,
                    RequestUpdate,
                    format!("You accepted request {request_id}; the hospital will schedule you"),
                ),
            ],
            LifecycleEvent::RequestScheduled {
                request_id,
                hospital_id,
                scheduled_at,
                ..
            } => smallvec![Outgoing::to_hospital(
                *hospital_id,
                RequestUpdate,
                format!(
                    "Request {request_id} is scheduled for {}",
                    scheduled_at.format("%Y-%m-%d %H:%M UTC")
                ),
            )],
            LifecycleEvent::RequestCancelled {
                request_id,
                released_donor: Some(donor_id),
                ..
            } => smallvec![Outgoing::to_donor(
                *donor_id,
                RequestUpdate,
                format!("Request {request_id} was cancelled by the hospital"),
            )],
            LifecycleEvent::RequestCompleted {
                request_id,
                hospital_id,
                ..
            } => smallvec![Outgoing::to_hospital(
                *hospital_id,
                RequestUpdate,
                format!("Request {request_id} is complete"),
            )],
            LifecycleEvent::AppointmentScheduled {
                donor_id,
                scheduled_at,
                ..
            } => smallvec![Outgoing::to_donor(
                *donor_id,
                AppointmentConfirmation,
                format!(
                    "Your donation appointment is booked for {}",
                    scheduled_at.format("%Y-%m-%d %H:%M UTC")
                ),
            )],
            LifecycleEvent::AppointmentConfirmed {
                appointment_id,
                hospital_id,
                ..
            } => smallvec![Outgoing::to_hospital(
                *hospital_id,
                AppointmentConfirmation,
                format!("The donor confirmed appointment {appointment_id}"),
            )],
            LifecycleEvent::AppointmentCompleted { donor_id, .. } => {
                smallvec![Outgoing::to_donor(
                    *donor_id,
                    General,
                    "Thank you for your donation!",
                )]
            }
            LifecycleEvent::AppointmentCancelled {
                request_id: None,
                donor_id,
                ..
            } => smallvec![Outgoing::to_donor(
                *donor_id,
                RequestUpdate,
                "Your donation appointment was cancelled",
            )],
            LifecycleEvent::AppointmentNoShow {
                appointment_id,
                hospital_id,
                ..
            } => smallvec![Outgoing::to_hospital(
                *hospital_id,
                General,
                format!("The donor did not attend appointment {appointment_id}"),
            )],
            LifecycleEvent::RequestCreated { .. }
            | LifecycleEvent::RequestIgnored { .. }
            | LifecycleEvent::RequestDeactivated { .. }
            | LifecycleEvent::RequestCancelled {
                released_donor: None,
                ..
            }
            | LifecycleEvent::RequestReopened { .. }
            | LifecycleEvent::AppointmentCancelled {
                request_id: Some(_),
                ..
            }
            | LifecycleEvent::InventoryAdjusted { .. } => SmallVec::new(),
        }
    }

    /// Mark one of the caller's notifications read. Unknown ids succeed.
    ///
    /// # Errors
    ///
    /// - `Forbidden` if the notification belongs to someone else
    /// - `Unavailable` once retries are exhausted
    pub async fn mark_read(&self, ctx: &CallContext, id: NotificationId) -> Result<(), DomainError> {
        if !self.owned_by_caller(ctx, id).await? {
            return Ok(());
        }
        let user = ctx.actor.user_id;
        let flipped = self
            .gateway
            .call(ctx, "mark_notification_read", |store| {
                store.mark_notification_read(id, user)
            })
            .await?;
        tracing::debug!(notification_id = %id, flipped, "Notification marked read");
        Ok(())
    }

    /// Mark every notification of `user` read; returns how many flipped.
    ///
    /// # Errors
    ///
    /// - `Forbidden` unless the caller is `user`
    /// - `Unavailable` once retries are exhausted
    pub async fn mark_all_read(&self, ctx: &CallContext, user: UserId) -> Result<u64, DomainError> {
        require_user(ctx, user)?;
        self.gateway
            .call(ctx, "mark_all_notifications_read", |store| {
                store.mark_all_notifications_read(user)
            })
            .await
    }

    /// Delete one of the caller's notifications. Deleting twice succeeds.
    ///
    /// # Errors
    ///
    /// - `Forbidden` if the notification belongs to someone else
    /// - `Unavailable` once retries are exhausted
    pub async fn delete(&self, ctx: &CallContext, id: NotificationId) -> Result<(), DomainError> {
        if !self.owned_by_caller(ctx, id).await? {
            return Ok(());
        }
        let user = ctx.actor.user_id;
        let removed = self
            .gateway
            .call(ctx, "delete_notification", |store| {
                store.delete_notification(id, user)
            })
            .await?;
        tracing::debug!(notification_id = %id, removed, "Notification deleted");
        Ok(())
    }

    /// `false` for an unknown id, `Forbidden` for someone else's.
    async fn owned_by_caller(
        &self,
        ctx: &CallContext,
        id: NotificationId,
    ) -> Result<bool, DomainError> {
        let found = self
            .gateway
            .call(ctx, "find_notification", |store| store.find_notification(id))
            .await?;
        match found {
            Some(notification) => require_user(ctx, notification.user_id).map(|()| true),
            None => Ok(false),
        }
    }

    /// Notifications of `user`, newest first.
    ///
    /// # Errors
    ///
    /// - `Forbidden` unless the caller is `user`
    /// - `Unavailable` once retries are exhausted
    pub async fn list_for_user(
        &self,
        ctx: &CallContext,
        user: UserId,
    ) -> Result<Vec<Notification>, DomainError> {
        require_user(ctx, user)?;
        self.gateway
            .call(ctx, "list_notifications", |store| store.list_notifications(user))
            .await
    }

    /// Number of unread notifications of `user`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::list_for_user`].
    pub async fn unread_count(&self, ctx: &CallContext, user: UserId) -> Result<usize, DomainError> {
        let all = self.list_for_user(ctx, user).await?;
        Ok(all.iter().filter(|n| !n.read).count())
    }
}

fn require_user(ctx: &CallContext, user: UserId) -> Result<(), DomainError> {
    if ctx.actor.user_id == user {
        Ok(())
    } else {
        Err(DomainError::Forbidden(format!(
            "{} may not access notifications of {user}",
            ctx.actor.user_id
        )))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hemolink_core::{AppointmentId, RequestId};
    use hemolink_runtime::RetryPolicy;
    use hemolink_testing::{InMemoryStore, test_clock};
    use std::time::Duration;

    fn dispatcher(store: &InMemoryStore, retries: usize) -> NotificationDispatcher {
        let policy = RetryPolicy::builder()
            .max_retries(retries)
            .initial_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(2))
            .build();
        NotificationDispatcher::new(
            StoreGateway::new(Arc::new(store.clone()), policy),
            Arc::new(test_clock()),
        )
    }

    #[test]
    fn accept_notifies_hospital_and_donor() {
        let hospital = HospitalId::new();
        let donor = DonorId::new();
        let planned = NotificationDispatcher::plan(&LifecycleEvent::RequestAccepted {
            request_id: RequestId::new(),
            hospital_id: hospital,
            donor_id: donor,
            at: Utc::now(),
        });

        let recipients: Vec<_> = planned.iter().map(|o| (o.user_id, o.role)).collect();
        assert_eq!(
            recipients,
            vec![(hospital.into(), Role::Hospital), (donor.into(), Role::Donor)]
        );
    }

    #[test]
    fn linked_appointment_cancel_is_covered_by_the_request_update() {
        let linked = LifecycleEvent::AppointmentCancelled {
            appointment_id: AppointmentId::new(),
            request_id: Some(RequestId::new()),
            donor_id: DonorId::new(),
            hospital_id: HospitalId::new(),
            at: Utc::now(),
        };
        assert!(NotificationDispatcher::plan(&linked).is_empty());

        let deactivated = LifecycleEvent::RequestDeactivated {
            request_id: RequestId::new(),
            hospital_id: HospitalId::new(),
            at: Utc::now(),
        };
        assert!(NotificationDispatcher::plan(&deactivated).is_empty());
    }

    #[tokio::test]
    async fn transient_insert_failures_are_retried() {
        let store = InMemoryStore::new();
        store.fail_next_notification_inserts(2);
        let donor = DonorId::new();
        let ctx = CallContext::donor(donor);

        let stored = dispatcher(&store, 3)
            .notify(&ctx, Outgoing::to_donor(donor, NotificationKind::General, "hi"))
            .await
            .unwrap();

        assert_eq!(store.all_notifications(), vec![stored]);
    }

    #[tokio::test]
    async fn exhausted_retries_are_suppressed_by_deliver() {
        let store = InMemoryStore::new();
        store.fail_next_notification_inserts(10);
        let donor = DonorId::new();
        let ctx = CallContext::donor(donor);

        let delivered = dispatcher(&store, 1)
            .deliver(&ctx, Outgoing::to_donor(donor, NotificationKind::General, "hi"))
            .await;

        assert!(delivered.is_none());
        assert!(store.all_notifications().is_empty());
    }

    #[tokio::test]
    async fn read_and_delete_are_idempotent() {
        let store = InMemoryStore::new();
        let donor = DonorId::new();
        let ctx = CallContext::donor(donor);
        let dispatcher = dispatcher(&store, 0);

        let note = dispatcher
            .notify(&ctx, Outgoing::to_donor(donor, NotificationKind::General, "hi"))
            .await
            .unwrap();
        assert_eq!(dispatcher.unread_count(&ctx, donor.into()).await, Ok(1));

        dispatcher.mark_read(&ctx, note.id).await.unwrap();
        dispatcher.mark_read(&ctx, note.id).await.unwrap();
        dispatcher.mark_read(&ctx, NotificationId::new()).await.unwrap();
        assert_eq!(dispatcher.unread_count(&ctx, donor.into()).await, Ok(0));

        dispatcher.delete(&ctx, note.id).await.unwrap();
        dispatcher.delete(&ctx, note.id).await.unwrap();
        assert!(dispatcher.list_for_user(&ctx, donor.into()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn other_users_notifications_are_forbidden() {
        let store = InMemoryStore::new();
        let ctx = CallContext::donor(DonorId::new());

        let err = dispatcher(&store, 0)
            .list_for_user(&ctx, UserId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));
    }
}
