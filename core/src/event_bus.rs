//! Event bus abstraction for lifecycle event distribution.
//!
//! ```text
//! ┌─────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │  Operation  │────▶│ Conditional     │────▶│ Publish to       │
//! │  (accept,…) │     │ store update    │     │ event bus        │
//! └─────────────┘     │ (source of      │     │ (best effort)    │
//!                     │  truth)         │     └────────┬─────────┘
//!                     └─────────────────┘              │
//!                                              ┌───────┴───────┐
//!                                              ▼               ▼
//!                                         dashboards     delivery
//!                                                        surfaces
//! ```
//!
//! # Key Principles
//!
//! - **Store first**: events are published only after the write succeeded
//! - **Best effort**: a publish failure never undoes the transition
//! - **Idempotent consumers**: subscribers must handle duplicates
//!
//! # Implementations
//!
//! - `BroadcastEventBus` (in `hemolink-runtime`): in-process fan-out over a
//!   tokio broadcast channel

use crate::event::LifecycleEvent;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    /// Nobody is listening; the event was dropped.
    #[error("no subscribers for {0}")]
    NoSubscribers(&'static str),

    /// A slow subscriber missed events.
    #[error("subscriber lagged behind by {0} events")]
    Lagged(u64),

    /// The bus was shut down.
    #[error("event bus closed")]
    Closed,
}

/// Stream of events from a subscription.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<LifecycleEvent, EventBusError>> + Send>>;

/// Publish/subscribe channel for [`LifecycleEvent`]s.
pub trait EventBus: Send + Sync {
    /// Publish an event to all current subscribers.
    ///
    /// Returns how many subscribers received it.
    ///
    /// # Errors
    ///
    /// `NoSubscribers` when nobody is listening.
    fn publish(
        &self,
        event: LifecycleEvent,
    ) -> Pin<Box<dyn Future<Output = Result<usize, EventBusError>> + Send + '_>>;

    /// Subscribe to every event published from now on.
    fn subscribe(&self) -> EventStream;
}
