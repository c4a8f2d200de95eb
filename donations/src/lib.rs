//! HemoLink donations - matching blood and plasma requests with donors
//!
//! Services on top of `hemolink-core`:
//!
//! - **Compatibility**: which donors can serve a request, ranked by distance and rest
//! - **Lifecycle**: request creation and transitions; accept is exclusive
//! - **Scheduler**: appointment booking, confirmation, completion and reminders
//! - **Notifications**: per-user records derived from lifecycle events
//! - **Inventory**: per-hospital stock counters that never go negative
//!
//! # Architecture
//!
//! ```text
//!  caller (CallContext: actor + deadline)
//!        │
//!        ▼
//! ┌─────────────────────┐     ┌──────────────────────┐
//! │ RequestLifecycle    │────▶│ AppointmentScheduler │──▶ Notarizer (spawned)
//! │ Manager             │     └──────────────────────┘
//! └─────────────────────┘                │
//!        │  reduce → compare-and-swap    │ mark_completed
//!        ▼                               ▼
//! ┌─────────────────────┐     ┌──────────────────────┐
//! │ StoreGateway        │◀────│ InventoryAdjuster    │
//! │ (deadline + retry)  │     └──────────────────────┘
//! └─────────────────────┘
//!        │ committed events
//!        ▼
//! ┌─────────────────────┐
//! │ EventFanout         │──▶ NotificationDispatcher, EventBus
//! └─────────────────────┘
//! ```
//!
//! Side effects run only after the write that produced them succeeded, and a
//! failed notification never fails the operation that triggered it.
//!
//! # Example
//!
//! ```ignore
//! let coordinator = DonationCoordinator::new(store, clock, notary, None, Config::default());
//! let hospital = coordinator.context(Actor::hospital(hospital_id));
//! let request = coordinator
//!     .lifecycle
//!     .create(&hospital, hospital_id, new_request)
//!     .await?;
//!
//! let donor = coordinator.context(Actor::donor(donor_id));
//! coordinator.lifecycle.accept(&donor, request.id, donor_id).await?;
//! ```

pub mod compatibility;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod fanout;
pub mod gateway;
pub mod inventory;
pub mod lifecycle;
pub mod metrics;
pub mod notary;
pub mod notifications;
pub mod scheduler;

pub use compatibility::{Candidate, CompatibilityResolver};
pub use config::Config;
pub use context::CallContext;
pub use coordinator::DonationCoordinator;
pub use error::AppError;
pub use inventory::InventoryAdjuster;
pub use lifecycle::{RequestLifecycleManager, ScheduleDetails};
pub use notary::{DisabledNotarizer, HttpNotarizer};
pub use notifications::{NotificationDispatcher, Outgoing};
pub use scheduler::{AppointmentScheduler, Booking};
