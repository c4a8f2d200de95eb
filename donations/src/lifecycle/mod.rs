//! Request lifecycle: the reducer that decides and the manager that persists.

pub mod reducer;
pub mod service;

pub use reducer::{RequestAction, RequestEnvironment, RequestReducer};
pub use service::{RequestLifecycleManager, ScheduleDetails};
