//! Configuration management for the donation services.
//!
//! Loads configuration from environment variables with sensible defaults.

use hemolink_runtime::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// `PostgreSQL` configuration
    pub postgres: PostgresConfig,
    /// Appointment booking rules
    pub scheduling: SchedulingConfig,
    /// Store call deadlines
    pub store: StoreConfig,
    /// Backoff for transient store failures
    pub retry: RetryConfig,
    /// Candidate matching
    pub matching: MatchingConfig,
    /// External donation ledger
    pub notary: NotaryConfig,
}

/// `PostgreSQL` configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// `PostgreSQL` connection URL; unset means the in-memory store
    pub url: Option<String>,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Connection timeout in seconds
    pub connect_timeout: u64,
}

/// Appointment booking rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulingConfig {
    /// Furthest bookable day, counted from today (UTC)
    pub max_days_ahead: i64,
    /// Minimum gap between two appointments of the same donor, in hours
    pub slot_buffer_hours: i64,
    /// How far ahead reminders go out, in hours
    pub reminder_lead_hours: i64,
}

/// Store call deadlines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Default per-call deadline in milliseconds
    pub timeout_ms: u64,
}

/// Backoff for transient store failures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: usize,
    /// First backoff delay in milliseconds
    pub initial_delay_ms: u64,
    /// Backoff cap in milliseconds
    pub max_delay_ms: u64,
}

/// Candidate matching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// How many top candidates are alerted when a request opens
    pub max_candidate_alerts: usize,
    /// Drop donors further than this; `None` means unlimited
    pub max_distance_km: Option<f64>,
}

/// External donation ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotaryConfig {
    /// Ledger endpoint; unset disables notarization
    pub url: Option<String>,
    /// Per-call timeout in milliseconds
    pub timeout_ms: u64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unparseable values fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            postgres: PostgresConfig {
                url: env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.postgres.max_connections),
                connect_timeout: env::var("DATABASE_CONNECT_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.postgres.connect_timeout),
            },
            scheduling: SchedulingConfig {
                max_days_ahead: env::var("SCHEDULING_MAX_DAYS_AHEAD")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.scheduling.max_days_ahead),
                slot_buffer_hours: env::var("SCHEDULING_SLOT_BUFFER_HOURS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.scheduling.slot_buffer_hours),
                reminder_lead_hours: env::var("REMINDER_LEAD_HOURS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.scheduling.reminder_lead_hours),
            },
            store: StoreConfig {
                timeout_ms: env::var("STORE_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.store.timeout_ms),
            },
            retry: RetryConfig {
                max_retries: env::var("RETRY_MAX_RETRIES")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.retry.max_retries),
                initial_delay_ms: env::var("RETRY_INITIAL_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.retry.initial_delay_ms),
                max_delay_ms: env::var("RETRY_MAX_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.retry.max_delay_ms),
            },
            matching: MatchingConfig {
                max_candidate_alerts: env::var("MATCHING_MAX_CANDIDATE_ALERTS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.matching.max_candidate_alerts),
                max_distance_km: env::var("MATCHING_MAX_DISTANCE_KM")
                    .ok()
                    .and_then(|s| s.parse::<f64>().ok())
                    .filter(|km| km.is_finite() && *km >= 0.0),
            },
            notary: NotaryConfig {
                url: env::var("NOTARY_URL").ok().filter(|s| !s.is_empty()),
                timeout_ms: env::var("NOTARY_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.notary.timeout_ms),
            },
        }
    }

    /// Backoff policy for transient store failures.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(self.retry.max_retries)
            .initial_delay(Duration::from_millis(self.retry.initial_delay_ms))
            .max_delay(Duration::from_millis(self.retry.max_delay_ms))
            .build()
    }

    /// Default deadline applied to every store call.
    #[must_use]
    pub const fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store.timeout_ms)
    }

    /// Deadline for a single notarization call.
    #[must_use]
    pub const fn notary_timeout(&self) -> Duration {
        Duration::from_millis(self.notary.timeout_ms)
    }

    /// Lead time for appointment reminders.
    #[must_use]
    pub fn reminder_lead(&self) -> chrono::Duration {
        chrono::Duration::hours(self.scheduling.reminder_lead_hours)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            postgres: PostgresConfig {
                url: None,
                max_connections: 10,
                connect_timeout: 30,
            },
            scheduling: SchedulingConfig {
                max_days_ahead: 30,
                slot_buffer_hours: 24,
                reminder_lead_hours: 24,
            },
            store: StoreConfig { timeout_ms: 5000 },
            retry: RetryConfig {
                max_retries: 3,
                initial_delay_ms: 50,
                max_delay_ms: 2000,
            },
            matching: MatchingConfig {
                max_candidate_alerts: 10,
                max_distance_km: None,
            },
            notary: NotaryConfig {
                url: None,
                timeout_ms: 3000,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.scheduling.max_days_ahead, 30);
        assert_eq!(config.scheduling.slot_buffer_hours, 24);
        assert_eq!(config.store_timeout(), Duration::from_secs(5));
        assert_eq!(config.matching.max_candidate_alerts, 10);
        assert!(config.notary.url.is_none());
    }

    #[test]
    fn retry_policy_follows_config() {
        let mut config = Config::default();
        config.retry.max_retries = 7;
        config.retry.initial_delay_ms = 10;

        let policy = config.retry_policy();
        assert_eq!(policy.max_retries, 7);
        assert_eq!(policy.initial_delay, Duration::from_millis(10));
        assert_eq!(policy.max_delay, Duration::from_secs(2));
    }
}
