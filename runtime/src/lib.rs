//! # HemoLink Runtime
//!
//! Execution helpers shared by the donation services.
//!
//! ## Core Components
//!
//! - **Retry**: bounded exponential backoff that only retries transient failures
//! - **Deadline**: per-call timeouts that surface as `Unavailable`
//! - **Bus**: in-process broadcast implementation of the event bus
//!
//! ## Example
//!
//! ```ignore
//! use hemolink_runtime::{deadline::with_deadline, retry::{RetryPolicy, retry_transient}};
//!
//! let request = retry_transient(&policy, "load_request", || {
//!     with_deadline(ctx.timeout, "load_request", store.load_request(id))
//! })
//! .await?;
//! ```

/// In-process event bus
pub mod bus;

/// Deadlines for store calls
pub mod deadline;

/// Retry logic with exponential backoff
pub mod retry;

pub use bus::BroadcastEventBus;
pub use deadline::with_deadline;
pub use retry::{RetryPolicy, retry_transient, retry_with_predicate};
