//! In-process [`EventBus`] over a tokio broadcast channel.
//!
//! Subscribers only see events published after they subscribed. A subscriber
//! that falls more than `capacity` events behind receives a single
//! [`EventBusError::Lagged`] item and then continues with the newest events.

use futures::StreamExt;
use hemolink_core::LifecycleEvent;
use hemolink_core::event_bus::{EventBus, EventBusError, EventStream};
use std::future::Future;
use std::pin::Pin;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

/// Default number of buffered events per subscriber.
pub const DEFAULT_CAPACITY: usize = 256;

/// Fan-out bus for lifecycle events within one process.
#[derive(Clone, Debug)]
pub struct BroadcastEventBus {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl BroadcastEventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    ///
    /// A zero capacity is bumped to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus for BroadcastEventBus {
    fn publish(
        &self,
        event: LifecycleEvent,
    ) -> Pin<Box<dyn Future<Output = Result<usize, EventBusError>> + Send + '_>> {
        Box::pin(async move {
            let name = event.name();
            self.sender.send(event).map_err(|_| {
                tracing::trace!(event = name, "No subscribers, event dropped");
                EventBusError::NoSubscribers(name)
            })
        })
    }

    fn subscribe(&self) -> EventStream {
        let stream = BroadcastStream::new(self.sender.subscribe()).map(|item| {
            item.map_err(|BroadcastStreamRecvError::Lagged(skipped)| {
                tracing::warn!(skipped, "Event bus subscriber lagged");
                EventBusError::Lagged(skipped)
            })
        });
        Box::pin(stream)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hemolink_core::{DonorId, RequestId};

    fn ignored() -> LifecycleEvent {
        LifecycleEvent::RequestIgnored {
            request_id: RequestId::new(),
            donor_id: DonorId::new(),
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_reports_it() {
        let bus = BroadcastEventBus::default();
        let result = bus.publish(ignored()).await;
        assert_eq!(result, Err(EventBusError::NoSubscribers("request_ignored")));
    }

    #[tokio::test]
    async fn every_subscriber_receives_the_event() {
        let bus = BroadcastEventBus::new(8);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let event = ignored();
        assert_eq!(bus.publish(event.clone()).await, Ok(2));

        assert_eq!(first.next().await.unwrap(), Ok(event.clone()));
        assert_eq!(second.next().await.unwrap(), Ok(event));
    }

    #[tokio::test]
    async fn slow_subscriber_sees_lag_then_recovers() {
        let bus = BroadcastEventBus::new(2);
        let mut stream = bus.subscribe();

        for _ in 0..4 {
            bus.publish(ignored()).await.unwrap();
        }

        assert_eq!(stream.next().await.unwrap(), Err(EventBusError::Lagged(2)));
        assert!(stream.next().await.unwrap().is_ok());
    }
}
