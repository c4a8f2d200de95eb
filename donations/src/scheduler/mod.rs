//! Appointment booking and the appointment state machine.

pub mod reducer;
pub mod service;

pub use reducer::{AppointmentAction, AppointmentEnvironment, AppointmentReducer};
pub use service::{AppointmentScheduler, Booking};
