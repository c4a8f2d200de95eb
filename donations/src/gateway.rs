//! Deadline- and retry-aware access to the donation store.
//!
//! Every service goes through [`StoreGateway`] instead of calling the store
//! directly, so each call is bounded by the caller's deadline and transient
//! failures are retried with the configured backoff.

use crate::context::CallContext;
use hemolink_core::{
    Appointment, AppointmentStatus, DomainError, DonationStore, Request, RequestStatus,
    StoreError, StoreFuture,
};
use hemolink_runtime::{RetryPolicy, retry_transient, with_deadline};
use std::sync::Arc;

/// Outcome of a conditional update.
#[derive(Debug, Clone, PartialEq)]
pub enum Swap<T> {
    /// The stored record had the expected status and was replaced
    Applied(T),
    /// The stored record had moved on; `actual` is its status label
    Lost {
        /// Status found in the store
        actual: &'static str,
    },
}

/// Shared handle on the store plus the retry policy.
#[derive(Clone)]
pub struct StoreGateway {
    store: Arc<dyn DonationStore>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for StoreGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreGateway")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl StoreGateway {
    /// Wrap a store.
    #[must_use]
    pub fn new(store: Arc<dyn DonationStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn DonationStore> {
        &self.store
    }

    /// Run a store call under the caller's deadline, retrying `Unavailable`.
    ///
    /// Only for calls that are safe to repeat: reads, conditional updates and
    /// flip-if-unset primitives.
    ///
    /// # Errors
    ///
    /// The translated store error, or `Unavailable` once retries run out.
    pub async fn call<T, F>(
        &self,
        ctx: &CallContext,
        operation: &'static str,
        call: F,
    ) -> Result<T, DomainError>
    where
        F: for<'a> Fn(&'a dyn DonationStore) -> StoreFuture<'a, T>,
    {
        retry_transient(&self.retry, operation, || {
            with_deadline(ctx.timeout, operation, call(self.store.as_ref()))
        })
        .await
    }

    /// Run a store call under the caller's deadline exactly once.
    ///
    /// For writes whose replay would not be a no-op.
    ///
    /// # Errors
    ///
    /// The translated store error.
    pub async fn call_once<T, F>(
        &self,
        ctx: &CallContext,
        operation: &'static str,
        call: F,
    ) -> Result<T, DomainError>
    where
        F: for<'a> FnOnce(&'a dyn DonationStore) -> StoreFuture<'a, T>,
    {
        with_deadline(ctx.timeout, operation, call(self.store.as_ref())).await
    }

    /// Conditional request update; a failed condition is an outcome, not an error.
    ///
    /// # Errors
    ///
    /// `NotFound`, or `Unavailable` once retries run out.
    pub async fn swap_request(
        &self,
        ctx: &CallContext,
        expected: RequestStatus,
        next: &Request,
    ) -> Result<Swap<Request>, DomainError> {
        self.call(ctx, "compare_and_swap_request", |store| {
            swap_request(store, expected, next.clone())
        })
        .await
    }

    /// Conditional appointment update; a failed condition is an outcome, not an error.
    ///
    /// # Errors
    ///
    /// `NotFound`, or `Unavailable` once retries run out.
    pub async fn swap_appointment(
        &self,
        ctx: &CallContext,
        expected: AppointmentStatus,
        next: &Appointment,
    ) -> Result<Swap<Appointment>, DomainError> {
        self.call(ctx, "compare_and_swap_appointment", |store| {
            swap_appointment(store, expected, next.clone())
        })
        .await
    }
}

fn lost_is_outcome<T>(result: Result<T, StoreError>) -> Result<Swap<T>, StoreError> {
    match result {
        Ok(stored) => Ok(Swap::Applied(stored)),
        Err(StoreError::ConditionFailed { actual, .. }) => Ok(Swap::Lost { actual }),
        Err(e) => Err(e),
    }
}

fn swap_request(
    store: &dyn DonationStore,
    expected: RequestStatus,
    next: Request,
) -> StoreFuture<'_, Swap<Request>> {
    Box::pin(async move { lost_is_outcome(store.compare_and_swap_request(expected, next).await) })
}

fn swap_appointment(
    store: &dyn DonationStore,
    expected: AppointmentStatus,
    next: Appointment,
) -> StoreFuture<'_, Swap<Appointment>> {
    Box::pin(async move {
        lost_is_outcome(store.compare_and_swap_appointment(expected, next).await)
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use hemolink_core::{BloodGroup, HospitalId, RequestStore};
    use hemolink_testing::{InMemoryStore, fixtures};
    use std::time::Duration;

    fn gateway(store: &InMemoryStore) -> StoreGateway {
        let policy = RetryPolicy::builder()
            .max_retries(2)
            .initial_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(2))
            .build();
        StoreGateway::new(Arc::new(store.clone()), policy)
    }

    #[tokio::test]
    async fn lost_condition_is_reported_not_raised() {
        let store = InMemoryStore::new();
        let hospital = HospitalId::new();
        let request = fixtures::pending_request(hospital, BloodGroup::APos);
        store.insert_request(request.clone()).await.unwrap();

        let ctx = CallContext::hospital(hospital);
        let outcome = gateway(&store)
            .swap_request(&ctx, RequestStatus::Accepted, &request)
            .await
            .unwrap();
        assert_eq!(outcome, Swap::Lost { actual: "pending" });
    }

    #[tokio::test]
    async fn slow_store_hits_the_deadline() {
        let store = InMemoryStore::new();
        store.set_latency(Some(Duration::from_millis(200)));
        let hospital = HospitalId::new();
        let ctx = CallContext::hospital(hospital).with_timeout(Duration::from_millis(10));

        let err = gateway(&store)
            .call(&ctx, "list_requests_for_hospital", |s| {
                s.list_requests_for_hospital(hospital)
            })
            .await
            .unwrap_err();
        assert!(err.is_retryable(), "{err}");
    }
}
