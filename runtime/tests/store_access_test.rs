//! Integration tests for the store-access building blocks used together:
//! a deadline-bounded call wrapped in transient retry, and bus fan-out to
//! several subscribers.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use chrono::Utc;
use futures::StreamExt;
use hemolink_core::event_bus::EventBus;
use hemolink_core::{DomainError, DonorId, LifecycleEvent, RequestId, StoreError};
use hemolink_runtime::bus::BroadcastEventBus;
use hemolink_runtime::deadline::with_deadline;
use hemolink_runtime::retry::{RetryPolicy, retry_transient};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn fast_policy(max_retries: usize) -> RetryPolicy {
    RetryPolicy::builder()
        .max_retries(max_retries)
        .initial_delay(Duration::from_millis(1))
        .max_delay(Duration::from_millis(5))
        .build()
}

#[tokio::test]
async fn elapsed_deadline_is_retried_until_a_call_fits() {
    let calls = Arc::new(AtomicUsize::new(0));

    let result = retry_transient(&fast_policy(3), "get_request", || {
        let calls = Arc::clone(&calls);
        async move {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            with_deadline(Duration::from_millis(20), "get_request", async move {
                // The first call stalls past its deadline.
                if attempt == 0 {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
                Ok::<_, StoreError>(attempt)
            })
            .await
        }
    })
    .await;

    assert_eq!(result.unwrap(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn database_errors_are_retried_but_not_found_is_not() {
    let calls = Arc::new(AtomicUsize::new(0));
    let result: Result<(), DomainError> = retry_transient(&fast_policy(2), "get_donor", || {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            with_deadline(Duration::from_secs(1), "get_donor", async {
                Err::<(), _>(StoreError::Database("connection reset".to_string()))
            })
            .await
        }
    })
    .await;
    assert!(matches!(result, Err(DomainError::Unavailable(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let calls = Arc::new(AtomicUsize::new(0));
    let result: Result<(), DomainError> = retry_transient(&fast_policy(2), "get_donor", || {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            with_deadline(Duration::from_secs(1), "get_donor", async {
                Err::<(), _>(StoreError::NotFound {
                    entity: "donor",
                    id: "d-1".to_string(),
                })
            })
            .await
        }
    })
    .await;
    assert!(matches!(result, Err(DomainError::NotFound { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn every_subscriber_sees_published_events_in_order() {
    let bus = BroadcastEventBus::new(16);
    let mut first = bus.subscribe();
    let mut second = bus.subscribe();
    assert_eq!(bus.subscriber_count(), 2);

    let request_id = RequestId::new();
    let donors = [DonorId::new(), DonorId::new()];
    for donor_id in donors {
        let delivered = bus
            .publish(LifecycleEvent::RequestIgnored {
                request_id,
                donor_id,
                at: Utc::now(),
            })
            .await
            .unwrap();
        assert_eq!(delivered, 2);
    }

    for stream in [&mut first, &mut second] {
        for expected in donors {
            match stream.next().await.unwrap().unwrap() {
                LifecycleEvent::RequestIgnored { donor_id, .. } => assert_eq!(donor_id, expected),
                other => panic!("unexpected event {}", other.name()),
            }
        }
    }
}

#[tokio::test]
async fn dropped_subscriber_stops_counting() {
    let bus = BroadcastEventBus::default();
    let stream = bus.subscribe();
    assert_eq!(bus.subscriber_count(), 1);
    drop(stream);
    assert_eq!(bus.subscriber_count(), 0);
}
