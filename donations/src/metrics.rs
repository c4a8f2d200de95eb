//! Business metrics for the donation services.
//!
//! Recorded through the `metrics` facade; whichever recorder the host
//! process installs receives them.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `hemolink_requests_total{status}` - Request transitions by resulting status
//! - `hemolink_accept_races_lost_total` - Accepts rejected because another donor won
//! - `hemolink_appointments_total{status}` - Appointment transitions by resulting status
//! - `hemolink_notifications_total{outcome}` - Notifications stored or suppressed
//! - `hemolink_inventory_units_total{direction}` - Units credited or consumed
//! - `hemolink_notarizations_total{outcome}` - Ledger registrations by outcome
//!
//! ## Gauges
//! - `hemolink_stock_units{blood_group}` - Units on hand after the last adjustment

use hemolink_core::{AppointmentStatus, BloodGroup, RequestStatus};
use metrics::{counter, describe_counter, describe_gauge, gauge};

/// Initialize and register all business metrics descriptions.
///
/// This should be called once at application startup, before any metrics are recorded.
pub fn register_donation_metrics() {
    describe_counter!(
        "hemolink_requests_total",
        "Total number of request transitions by resulting status"
    );
    describe_counter!(
        "hemolink_accept_races_lost_total",
        "Accept attempts that lost the race to another donor"
    );
    describe_counter!(
        "hemolink_appointments_total",
        "Total number of appointment transitions by resulting status"
    );
    describe_counter!(
        "hemolink_notifications_total",
        "Notifications by outcome (stored, suppressed)"
    );
    describe_counter!(
        "hemolink_inventory_units_total",
        "Blood units moved by direction (credited, consumed)"
    );
    describe_counter!(
        "hemolink_notarizations_total",
        "Donation ledger registrations by outcome (recorded, failed, timeout)"
    );
    describe_gauge!(
        "hemolink_stock_units",
        "Units on hand for the last adjusted counter, by blood group"
    );

    tracing::info!("Donation metrics registered");
}

/// A request reached `status`.
pub fn record_request(status: RequestStatus) {
    counter!("hemolink_requests_total", "status" => status.as_str()).increment(1);
}

/// An accept lost the race.
pub fn record_accept_race_lost() {
    counter!("hemolink_accept_races_lost_total").increment(1);
}

/// An appointment reached `status`.
pub fn record_appointment(status: AppointmentStatus) {
    counter!("hemolink_appointments_total", "status" => status.as_str()).increment(1);
}

/// A notification was stored (`true`) or dropped after retries (`false`).
pub fn record_notification(stored: bool) {
    let outcome = if stored { "stored" } else { "suppressed" };
    counter!("hemolink_notifications_total", "outcome" => outcome).increment(1);
}

/// Units moved in or out of stock.
pub fn record_inventory(group: BloodGroup, delta: i64, units_after: u32) {
    let direction = if delta >= 0 { "credited" } else { "consumed" };
    counter!("hemolink_inventory_units_total", "direction" => direction)
        .increment(delta.unsigned_abs());
    gauge!("hemolink_stock_units", "blood_group" => group.as_str()).set(f64::from(units_after));
}

/// A notarization attempt finished with `outcome`.
pub fn record_notarization(outcome: &'static str) {
    counter!("hemolink_notarizations_total", "outcome" => outcome).increment(1);
}
