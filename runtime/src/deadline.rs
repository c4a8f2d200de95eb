//! Per-call deadlines for store access.
//!
//! Every store call made on behalf of a caller is bounded by that caller's
//! timeout. An elapsed deadline is reported as [`DomainError::Unavailable`],
//! the same class as a transport failure, so callers retry it the same way.

use hemolink_core::DomainError;
use std::future::Future;
use std::time::Duration;

/// Await `future`, mapping its error into [`DomainError`] and bounding it by `timeout`.
///
/// `operation` names the call in the `Unavailable` message and in logs.
///
/// # Errors
///
/// - `Unavailable` if the deadline elapsed first
/// - the future's own error, converted
pub async fn with_deadline<T, E, F>(
    timeout: Duration,
    operation: &'static str,
    future: F,
) -> Result<T, DomainError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<DomainError>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => {
            tracing::warn!(
                operation,
                timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                "Store call exceeded deadline"
            );
            Err(DomainError::Unavailable(format!(
                "{operation} timed out after {}ms",
                timeout.as_millis()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hemolink_core::StoreError;

    #[tokio::test]
    async fn fast_call_passes_through() {
        let result = with_deadline(Duration::from_secs(1), "load_request", async {
            Ok::<_, StoreError>(5)
        })
        .await;
        assert_eq!(result, Ok(5));
    }

    #[tokio::test]
    async fn store_errors_are_translated() {
        let result: Result<(), _> = with_deadline(Duration::from_secs(1), "load_request", async {
            Err(StoreError::NotFound {
                entity: "request",
                id: "r1".into(),
            })
        })
        .await;
        assert_eq!(result, Err(DomainError::not_found("request", "r1")));
    }

    #[tokio::test]
    async fn elapsed_deadline_is_unavailable() {
        let result: Result<(), DomainError> =
            with_deadline(Duration::from_millis(10), "load_request", async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, StoreError>(())
            })
            .await;
        assert!(matches!(result, Err(DomainError::Unavailable(msg)) if msg.contains("load_request")));
    }
}
