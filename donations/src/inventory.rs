//! Per-hospital, per-group stock counters.
//!
//! Manual changes go through the store's atomic `adjust_units`, which rejects
//! a decrement that would go below zero. Those adjustments are issued exactly
//! once and never retried: a timed-out increment may still have been applied,
//! and replaying it would count the same units twice.
//!
//! Completed appointments are credited through `credit_appointment` instead.
//! The store flips the appointment's `stock_credited` flag in the same step as
//! the increment, so that credit can be retried and re-driven freely.

use crate::context::CallContext;
use crate::fanout::EventFanout;
use crate::gateway::StoreGateway;
use crate::metrics;
use hemolink_core::{
    Appointment, BloodGroup, BloodUnitCounter, DomainError, HospitalId, InventoryStore,
    LifecycleEvent,
};
use std::sync::Arc;

/// Adjusts and reads blood unit counters.
#[derive(Clone, Debug)]
pub struct InventoryAdjuster {
    gateway: StoreGateway,
    fanout: Arc<EventFanout>,
}

impl InventoryAdjuster {
    /// Creates an adjuster.
    #[must_use]
    pub fn new(gateway: StoreGateway, fanout: Arc<EventFanout>) -> Self {
        Self { gateway, fanout }
    }

    /// Credit `units` of `group` to `hospital` after a completed donation.
    ///
    /// Returns the new count.
    ///
    /// # Errors
    ///
    /// - `Forbidden` unless the caller is `hospital`
    /// - `ValidationFailed` if `units` is zero
    /// - `Unavailable` on store failure
    pub async fn on_donation_completed(
        &self,
        ctx: &CallContext,
        hospital: HospitalId,
        group: BloodGroup,
        units: u32,
    ) -> Result<u32, DomainError> {
        ctx.require_hospital(hospital)?;
        self.adjust(ctx, hospital, group, i64::from(units)).await
    }

    /// Take `units` of `group` out of `hospital`'s stock.
    ///
    /// Returns the new count.
    ///
    /// # Errors
    ///
    /// - `Forbidden` unless the caller is `hospital`
    /// - `ValidationFailed` if `units` is zero
    /// - `InsufficientUnits` if fewer than `units` are on hand; nothing changes
    /// - `Unavailable` on store failure
    pub async fn on_units_consumed(
        &self,
        ctx: &CallContext,
        hospital: HospitalId,
        group: BloodGroup,
        units: u32,
    ) -> Result<u32, DomainError> {
        ctx.require_hospital(hospital)?;
        self.adjust(ctx, hospital, group, -i64::from(units)).await
    }

    /// Units of `group` on hand at `hospital`.
    ///
    /// # Errors
    ///
    /// - `Forbidden` unless the caller is `hospital`
    /// - `Unavailable` on store failure
    pub async fn units(
        &self,
        ctx: &CallContext,
        hospital: HospitalId,
        group: BloodGroup,
    ) -> Result<u32, DomainError> {
        ctx.require_hospital(hospital)?;
        self.gateway
            .call(ctx, "load_units", |store| store.load_units(hospital, group))
            .await
    }

    /// All eight counters of `hospital`, in table order, zero-filled.
    ///
    /// # Errors
    ///
    /// - `Forbidden` unless the caller is `hospital`
    /// - `Unavailable` on store failure
    pub async fn stock(
        &self,
        ctx: &CallContext,
        hospital: HospitalId,
    ) -> Result<Vec<BloodUnitCounter>, DomainError> {
        ctx.require_hospital(hospital)?;
        let stored = self
            .gateway
            .call(ctx, "list_counters", |store| store.list_counters(hospital))
            .await?;

        Ok(BloodGroup::ALL
            .iter()
            .map(|&blood_group| BloodUnitCounter {
                hospital_id: hospital,
                blood_group,
                units: stored
                    .iter()
                    .find(|c| c.blood_group == blood_group)
                    .map_or(0, |c| c.units),
            })
            .collect())
    }

    /// The unchecked adjustment shared by both directions.
    async fn adjust(
        &self,
        ctx: &CallContext,
        hospital: HospitalId,
        group: BloodGroup,
        delta: i64,
    ) -> Result<u32, DomainError> {
        if delta == 0 {
            return Err(DomainError::invalid("units must be positive"));
        }

        let units = self
            .gateway
            .call_once(ctx, "adjust_units", |store| {
                store.adjust_units(hospital, group, delta)
            })
            .await
            .inspect_err(|error| {
                tracing::warn!(
                    hospital_id = %hospital,
                    blood_group = %group,
                    delta,
                    error = %error,
                    "Stock adjustment rejected"
                );
            })?;

        self.adjusted(ctx, hospital, group, delta, units).await;
        Ok(units)
    }

    /// Credit a completed appointment's units unless that already happened.
    ///
    /// Returns the new count, or `None` if the appointment was credited
    /// before.
    pub(crate) async fn credit_completed(
        &self,
        ctx: &CallContext,
        appointment: &Appointment,
    ) -> Result<Option<u32>, DomainError> {
        let id = appointment.id;
        let credited = self
            .gateway
            .call(ctx, "credit_appointment", |store| store.credit_appointment(id))
            .await?;

        match credited {
            Some(units) => {
                self.adjusted(
                    ctx,
                    appointment.hospital_id,
                    appointment.blood_group,
                    i64::from(appointment.units),
                    units,
                )
                .await;
            }
            None => tracing::debug!(appointment_id = %id, "Stock already credited"),
        }
        Ok(credited)
    }

    async fn adjusted(
        &self,
        ctx: &CallContext,
        hospital: HospitalId,
        group: BloodGroup,
        delta: i64,
        units: u32,
    ) {
        metrics::record_inventory(group, delta, units);
        tracing::info!(
            hospital_id = %hospital,
            blood_group = %group,
            delta,
            units,
            "Stock adjusted"
        );

        self.fanout
            .emit(
                ctx,
                &[LifecycleEvent::InventoryAdjusted {
                    hospital_id: hospital,
                    blood_group: group,
                    delta,
                    units,
                }],
            )
            .await;
    }
}
