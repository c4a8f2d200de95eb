//! Notarizer implementations: an HTTP ledger client and a disabled stand-in.

use crate::config::NotaryConfig;
use crate::error::AppError;
use hemolink_core::{DonationRecord, NotaryError, Notarizer};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Ledger answer to a registration.
#[derive(Debug, Deserialize)]
struct Registered {
    reference: String,
}

/// Registers donation records with an HTTP ledger.
///
/// `POST {url}` with the record as JSON; a 2xx answer carries
/// `{"reference": "..."}`.
#[derive(Clone, Debug)]
pub struct HttpNotarizer {
    client: Client,
    url: String,
}

impl HttpNotarizer {
    /// Create a client with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Notary` if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Notary(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn register(&self, record: DonationRecord) -> Result<String, NotaryError> {
        let response = self
            .client
            .post(&self.url)
            .json(&record)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NotaryError::Timeout
                } else {
                    NotaryError::Transport(e.to_string())
                }
            })?;

        match response.status() {
            status if status.is_success() => response
                .json::<Registered>()
                .await
                .map(|registered| registered.reference)
                .map_err(|e| NotaryError::Rejected(format!("unreadable answer: {e}"))),
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => Err(NotaryError::Timeout),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(NotaryError::Rejected(format!(
                    "status {}: {body}",
                    status.as_u16()
                )))
            }
        }
    }
}

impl Notarizer for HttpNotarizer {
    fn notarize(
        &self,
        record: DonationRecord,
    ) -> Pin<Box<dyn Future<Output = Result<String, NotaryError>> + Send + '_>> {
        Box::pin(self.register(record))
    }
}

/// Used when no ledger is configured; every call reports `Disabled`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledNotarizer;

impl Notarizer for DisabledNotarizer {
    fn notarize(
        &self,
        _record: DonationRecord,
    ) -> Pin<Box<dyn Future<Output = Result<String, NotaryError>> + Send + '_>> {
        Box::pin(async { Err(NotaryError::Disabled) })
    }
}

/// The notarizer `config` asks for.
///
/// # Errors
///
/// Returns `AppError::Notary` if the HTTP client cannot be built.
pub fn from_config(config: &NotaryConfig) -> Result<Arc<dyn Notarizer>, AppError> {
    match &config.url {
        Some(url) => {
            tracing::info!(url = %url, "Notarization enabled");
            Ok(Arc::new(HttpNotarizer::new(
                url.clone(),
                Duration::from_millis(config.timeout_ms),
            )?))
        }
        None => {
            tracing::info!("Notarization disabled");
            Ok(Arc::new(DisabledNotarizer))
        }
    }
}
