//! # HemoLink Core
//!
//! Domain types and contracts for matching blood/plasma requests with donors.
//!
//! This crate holds everything the lifecycle logic and its storage backends
//! must agree on:
//!
//! - **Types**: requests, donors, appointments, notifications, stock counters
//! - **Blood**: the fixed donor-to-recipient compatibility table
//! - **Errors**: the [`DomainError`] taxonomy and backend [`StoreError`]s
//! - **Store**: object-safe persistence traits with conditional-update primitives
//! - **Reducer**: pure state transitions `(State, Action, Environment) → Events`
//! - **Events**: [`LifecycleEvent`] facts and the [`event_bus::EventBus`] contract
//! - **Environment**: injected dependencies such as the [`environment::Clock`]
//! - **Notary**: the [`notary::Notarizer`] contract for the external donation ledger
//!
//! ## Architecture Principles
//!
//! - Functional core, imperative shell: reducers decide, services persist
//! - One conditional record update per transition, never a multi-step write
//! - Dependency injection via traits
//!
//! ## Example
//!
//! ```ignore
//! use hemolink_core::reducer::Reducer;
//!
//! impl Reducer for RequestReducer {
//!     type State = Request;
//!     type Action = RequestAction;
//!     type Environment = LifecycleEnvironment;
//!     type Event = LifecycleEvent;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut Request,
//!         action: RequestAction,
//!         env: &LifecycleEnvironment,
//!     ) -> Result<SmallVec<[LifecycleEvent; 4]>, DomainError> {
//!         // validate, then apply
//!     }
//! }
//! ```

pub mod blood;
pub mod error;
pub mod event;
pub mod event_bus;
pub mod notary;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use blood::BloodGroup;
pub use chrono::{DateTime, Utc};
pub use error::{DomainError, Operation, StoreError};
pub use event::LifecycleEvent;
pub use notary::{DonationRecord, NotaryError, Notarizer};
pub use smallvec::{SmallVec, smallvec};
pub use store::{
    AppointmentStore, DonationStore, DonorStore, InventoryStore, NotificationStore, RequestStore,
    StoreFuture,
};
pub use types::*;

/// Reducer module - the core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → Events`.
/// They contain the transition rules and are deterministic and testable
/// without any storage.
pub mod reducer {
    use crate::error::DomainError;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for lifecycle rules
    ///
    /// # Contract
    ///
    /// On `Err`, `state` must be left exactly as it was. Implementations
    /// validate first and mutate only once the action is known to be legal.
    ///
    /// # Type Parameters
    ///
    /// - `State`: The record this reducer transitions
    /// - `Action`: The commands it accepts
    /// - `Environment`: Injected dependencies (clock, policy)
    /// - `Event`: The facts it emits on success
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// The event type emitted on success
        type Event;

        /// Apply an action to the state.
        ///
        /// # Errors
        ///
        /// Returns the domain error that makes the action illegal; the state is
        /// untouched in that case.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> Result<SmallVec<[Self::Event; 4]>, DomainError>;
    }
}

/// Environment module - dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// via the Environment parameter.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use hemolink_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let _now = clock.now();
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
