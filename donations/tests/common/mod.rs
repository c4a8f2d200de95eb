//! Shared wiring for the donation integration suites.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use chrono::{Duration, NaiveTime};
use donations::config::{Config, RetryConfig};
use donations::{CallContext, DonationCoordinator, ScheduleDetails};
use hemolink_core::environment::Clock;
use hemolink_core::{Actor, Appointment, BloodGroup, Donor, DonorId, HospitalId, Request};
use hemolink_testing::{InMemoryStore, RecordingNotarizer, fixtures, test_clock};
use std::sync::Arc;

/// One hospital, an in-memory store and a recording notarizer.
pub struct Harness {
    pub store: InMemoryStore,
    pub notary: RecordingNotarizer,
    pub app: DonationCoordinator,
    pub hospital_id: HospitalId,
    pub hospital: CallContext,
}

pub fn config() -> Config {
    Config {
        retry: RetryConfig {
            max_retries: 3,
            initial_delay_ms: 1,
            max_delay_ms: 5,
        },
        ..Config::default()
    }
}

pub fn harness() -> Harness {
    harness_with(RecordingNotarizer::new())
}

pub fn harness_with(notary: RecordingNotarizer) -> Harness {
    let store = InMemoryStore::new();
    let app = DonationCoordinator::new(
        Arc::new(store.clone()),
        Arc::new(test_clock()),
        Arc::new(notary.clone()),
        None,
        config(),
    );
    let hospital_id = HospitalId::new();
    let hospital = app.context(Actor::hospital(hospital_id));
    Harness {
        store,
        notary,
        app,
        hospital_id,
        hospital,
    }
}

/// `days` after the fixed test clock, at `hour`:00 UTC.
pub fn slot(days: i64, hour: u32) -> ScheduleDetails {
    ScheduleDetails {
        date: (test_clock().now() + Duration::days(days)).date_naive(),
        time: NaiveTime::from_hms_opt(hour, 0, 0).expect("valid hour"),
        notes: String::new(),
    }
}

impl Harness {
    pub async fn register(&self, donor: Donor) -> (DonorId, CallContext) {
        let ctx = self.app.context(Actor::donor(donor.id));
        let donor = self.app.register_donor(&ctx, donor).await.unwrap();
        (donor.id, ctx)
    }

    pub async fn donor(&self, group: BloodGroup) -> (DonorId, CallContext) {
        self.register(fixtures::donor(group)).await
    }

    pub async fn open_request(&self, group: BloodGroup) -> Request {
        self.app
            .lifecycle
            .create(&self.hospital, self.hospital_id, fixtures::new_request(group))
            .await
            .unwrap()
    }

    /// An `accepted` A+ request and its donor.
    pub async fn accepted(&self) -> (Request, DonorId, CallContext) {
        let request = self.open_request(BloodGroup::APos).await;
        let (donor, ctx) = self.donor(BloodGroup::ONeg).await;
        let request = self
            .app
            .lifecycle
            .accept(&ctx, request.id, donor)
            .await
            .unwrap();
        (request, donor, ctx)
    }

    /// A `scheduled` request booked for tomorrow at 10:00.
    pub async fn scheduled(&self) -> (Request, Appointment, DonorId, CallContext) {
        let (request, donor, ctx) = self.accepted().await;
        let (request, appointment) = self
            .app
            .lifecycle
            .schedule(&self.hospital, request.id, slot(1, 10))
            .await
            .unwrap();
        (request, appointment, donor, ctx)
    }
}
