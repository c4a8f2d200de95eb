//! # HemoLink Testing
//!
//! Testing utilities for the donation core.
//!
//! This crate provides:
//! - Mock implementations of environment traits (clock, notarizer)
//! - [`InMemoryStore`], a fault-injectable implementation of every store trait
//! - [`ReducerTest`], a Given-When-Then harness for reducers
//! - Fixtures for requests, donors, appointments and notifications
//! - proptest strategies for domain values
//!
//! ## Example
//!
//! ```ignore
//! use hemolink_testing::{InMemoryStore, RecordingNotarizer, fixtures, test_clock};
//!
//! #[tokio::test]
//! async fn accept_flow() {
//!     let app = DonationCoordinator::new(
//!         Arc::new(InMemoryStore::new()),
//!         Arc::new(test_clock()),
//!         Arc::new(RecordingNotarizer::new()),
//!         None,
//!         Config::default(),
//!     );
//!
//!     let request = app.lifecycle.create(&hospital, hospital_id, fixtures::new_request(BloodGroup::APos)).await?;
//!     app.lifecycle.accept(&donor_ctx, request.id, donor.id).await?;
//! }
//! ```

use chrono::{DateTime, Utc};
use hemolink_core::environment::Clock;

/// Builders for domain records
pub mod fixtures;

/// In-memory store with fault injection
pub mod in_memory;

/// Given-When-Then reducer harness
pub mod reducer_test;

/// Property-based testing strategies for domain values
pub mod properties {
    use hemolink_core::{BloodGroup, RequestStatus, Urgency};
    use proptest::prelude::*;

    /// Any of the eight groups.
    pub fn blood_group() -> impl Strategy<Value = BloodGroup> {
        proptest::sample::select(BloodGroup::ALL.to_vec())
    }

    /// Any request status.
    pub fn request_status() -> impl Strategy<Value = RequestStatus> {
        proptest::sample::select(vec![
            RequestStatus::Pending,
            RequestStatus::Accepted,
            RequestStatus::Ignored,
            RequestStatus::Scheduled,
            RequestStatus::Completed,
            RequestStatus::Cancelled,
        ])
    }

    /// Any urgency.
    pub fn urgency() -> impl Strategy<Value = Urgency> {
        proptest::sample::select(vec![
            Urgency::Low,
            Urgency::Medium,
            Urgency::High,
            Urgency::Emergency,
        ])
    }
}

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use hemolink_core::notary::{DonationRecord, NotaryError, Notarizer};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use hemolink_testing::mocks::FixedClock;
    /// use hemolink_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 09:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T09:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Notarizer that records every call and answers `notary-<n>`.
    ///
    /// Switch it to failing with [`RecordingNotarizer::failing`].
    #[derive(Debug, Clone, Default)]
    pub struct RecordingNotarizer {
        records: Arc<Mutex<Vec<DonationRecord>>>,
        fail: bool,
    }

    impl RecordingNotarizer {
        /// A notarizer that succeeds.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// A notarizer that rejects every record (still recording it).
        #[must_use]
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        /// Records received so far.
        ///
        /// # Panics
        ///
        /// If a recording thread panicked while holding the lock.
        #[must_use]
        #[allow(clippy::unwrap_used)]
        pub fn records(&self) -> Vec<DonationRecord> {
            self.records.lock().unwrap().clone()
        }
    }

    impl Notarizer for RecordingNotarizer {
        #[allow(clippy::unwrap_used)]
        fn notarize(
            &self,
            record: DonationRecord,
        ) -> Pin<Box<dyn Future<Output = Result<String, NotaryError>> + Send + '_>> {
            Box::pin(async move {
                let mut records = self.records.lock().unwrap();
                records.push(record);
                if self.fail {
                    Err(NotaryError::Rejected("recording notarizer set to fail".into()))
                } else {
                    Ok(format!("notary-{}", records.len()))
                }
            })
        }
    }
}

// Re-export commonly used items
pub use in_memory::InMemoryStore;
pub use mocks::{FixedClock, RecordingNotarizer, test_clock};
pub use reducer_test::ReducerTest;
