//! HemoLink demo
//!
//! Walks through the donation lifecycle end to end:
//! - Two donors race to accept the same request; exactly one wins
//! - The winner is booked, confirms, and the donation completes
//! - The hospital's stock is credited once and can be consumed, never below zero
//! - Reminders and notifications are listed per user
//!
//! # Usage
//!
//! ```bash
//! # In-memory store
//! cargo run --bin hemolink-demo
//!
//! # PostgreSQL
//! DATABASE_URL=postgres://localhost/hemolink cargo run --bin hemolink-demo
//! ```

use anyhow::Context as _;
use chrono::{Duration, Utc};
use donations::{Booking, Config, DonationCoordinator, ScheduleDetails};
use futures::StreamExt;
use hemolink_core::environment::SystemClock;
use hemolink_core::event_bus::EventBus;
use hemolink_core::{
    Actor, BloodGroup, DomainError, DonationKind, Donor, DonorId, HospitalId, Location, NewRequest,
    Patient, Urgency,
};
use hemolink_runtime::BroadcastEventBus;
use hemolink_testing::InMemoryStore;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,donations=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    donations::metrics::register_donation_metrics();

    println!("\n🩸 ============================================");
    println!("   HemoLink - Live Demo");
    println!("============================================\n");

    let config = Config::from_env();
    let bus: Arc<dyn EventBus> = Arc::new(BroadcastEventBus::default());

    let mut events = bus.subscribe();
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => tracing::debug!(event = event.name(), "Bus received"),
                Err(error) => tracing::warn!(error = %error, "Bus lagged"),
            }
        }
    });

    let app = if config.postgres.url.is_some() {
        println!("⚙️  Using PostgreSQL store");
        DonationCoordinator::connect(config, Some(bus))
            .await
            .context("connecting to PostgreSQL")?
    } else {
        println!("⚙️  Using in-memory store (set DATABASE_URL for PostgreSQL)");
        let notary = donations::notary::from_config(&config.notary)?;
        DonationCoordinator::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(SystemClock),
            notary,
            Some(bus),
            config,
        )
    };

    // ========== Actors ==========

    let hospital_id = HospitalId::new();
    let hospital = app.context(Actor::hospital(hospital_id));

    let alice = register(&app, "Alice", BloodGroup::ONeg).await?;
    let bob = register(&app, "Bob", BloodGroup::APos).await?;
    println!("✓ Donors registered: Alice (O-), Bob (A+)\n");

    // ========== Scenario 1: accept race ==========

    println!("📋 Scenario 1: two donors accept the same request");
    let request = app
        .lifecycle
        .create(
            &hospital,
            hospital_id,
            NewRequest {
                kind: DonationKind::Blood,
                blood_group: BloodGroup::APos,
                units_needed: 2,
                urgency: Urgency::Emergency,
                patient: Patient::named("John Doe"),
                notes: "Trauma ward".into(),
                location: Location::default(),
            },
        )
        .await?;
    println!("   Request {} opened (A+, 2 units)", request.id);

    let alice_ctx = app.context(Actor::donor(alice));
    let bob_ctx = app.context(Actor::donor(bob));
    let (by_alice, by_bob) = tokio::join!(
        app.lifecycle.accept(&alice_ctx, request.id, alice),
        app.lifecycle.accept(&bob_ctx, request.id, bob),
    );

    let winner = match (&by_alice, &by_bob) {
        (Ok(_), Err(DomainError::AlreadyResolved { .. })) => alice,
        (Err(DomainError::AlreadyResolved { .. }), Ok(_)) => bob,
        other => anyhow::bail!("unexpected accept outcome: {other:?}"),
    };
    let winner_name = if winner == alice { "Alice" } else { "Bob" };
    println!("   ✓ {winner_name} won, the other donor got AlreadyResolved\n");

    // ========== Scenario 2: schedule, confirm, complete ==========

    println!("📋 Scenario 2: book, confirm and complete the donation");
    let tomorrow = (Utc::now() + Duration::days(1)).date_naive();
    let (_, appointment) = app
        .lifecycle
        .schedule(
            &hospital,
            request.id,
            ScheduleDetails {
                date: tomorrow,
                time: chrono::NaiveTime::from_hms_opt(10, 0, 0).context("valid time")?,
                notes: "Bring ID".into(),
            },
        )
        .await?;
    println!("   ✓ Appointment {} at {}", appointment.id, appointment.scheduled_at);

    let winner_ctx = app.context(Actor::donor(winner));
    app.scheduler.confirm(&winner_ctx, appointment.id).await?;
    println!("   ✓ Donor confirmed");

    let completed = app.mark_appointment_completed(&hospital, appointment.id).await?;
    let request = app.lifecycle.get(&hospital, request.id).await?;
    println!(
        "   ✓ Appointment {}, request {}",
        completed.status, request.status
    );

    let units = app
        .inventory
        .units(&hospital, hospital_id, completed.blood_group)
        .await?;
    println!("   ✓ Stock of {}: {units} unit(s)\n", completed.blood_group);

    // ========== Scenario 3: stock never goes negative ==========

    println!("📋 Scenario 3: consume stock");
    let left = app
        .inventory
        .on_units_consumed(&hospital, hospital_id, completed.blood_group, 1)
        .await?;
    println!("   ✓ Consumed 1, {left} left");
    match app
        .inventory
        .on_units_consumed(&hospital, hospital_id, completed.blood_group, 10)
        .await
    {
        Err(error @ DomainError::InsufficientUnits { .. }) => println!("   ✓ Rejected: {error}\n"),
        other => anyhow::bail!("expected InsufficientUnits, got {other:?}"),
    }

    // ========== Scenario 4: reminders and notifications ==========

    println!("📋 Scenario 4: reminders and notifications");
    let soon = Utc::now() + Duration::hours(3);
    let other = if winner == alice { bob } else { alice };
    app.schedule_appointment(
        &hospital,
        Booking {
            donor: other,
            hospital: hospital_id,
            request: None,
            date: soon.date_naive(),
            time: soon.time(),
            kind: DonationKind::Plasma,
            notes: String::new(),
        },
    )
    .await?;
    let sent = app.dispatch_due_reminders(&hospital).await?;
    println!("   ✓ {sent} reminder(s) sent");

    for (name, id) in [("Alice", alice), ("Bob", bob)] {
        let ctx = app.context(Actor::donor(id));
        let notifications = app.notifications().list_for_user(&ctx, id.into()).await?;
        println!("   {name}: {} notification(s)", notifications.len());
        for notification in notifications {
            println!("     - [{}] {}", notification.kind.as_str(), notification.message);
        }
    }

    // Let the spawned notarization finish before exiting.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    println!("\n✅ Demo complete\n");
    Ok(())
}

async fn register(
    app: &DonationCoordinator,
    name: &str,
    blood_group: BloodGroup,
) -> anyhow::Result<DonorId> {
    let donor = Donor {
        id: DonorId::new(),
        name: name.to_string(),
        blood_group,
        available: true,
        last_donation: None,
        position: None,
    };
    let ctx = app.context(Actor::donor(donor.id));
    Ok(app.register_donor(&ctx, donor).await?.id)
}
