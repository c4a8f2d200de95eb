//! `PostgreSQL` storage for HemoLink.
//!
//! [`PostgresStore`] implements every store trait from `hemolink-core` on a
//! single connection pool. The conditional primitives map onto single SQL
//! statements, so atomicity comes from the database rather than from the
//! caller:
//!
//! - compare-and-swap: `UPDATE … WHERE id = $1 AND status = $2 RETURNING …`
//! - counter adjust: an upsert for increments, a guarded `UPDATE` for
//!   decrements (`WHERE units + $delta >= 0`)
//! - ignore marks: `INSERT … ON CONFLICT DO NOTHING`
//! - reminder flag: `UPDATE … WHERE NOT reminder_sent`
//! - completion credit: one transaction that flips `stock_credited` and
//!   upserts the counter
//!
//! # Example
//!
//! ```ignore
//! use hemolink_postgres::PostgresStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresStore::connect("postgres://localhost/hemolink", 10).await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod rows;

use hemolink_core::{
    Appointment, AppointmentId, AppointmentStatus, AppointmentStore, BloodGroup, BloodUnitCounter,
    DateTime, Donor, DonorId, DonorStore, HospitalId, InventoryStore, Notification,
    NotificationId, NotificationStore, Request, RequestId, RequestStatus, RequestStore, StoreError,
    StoreFuture, UserId, Utc,
};
use rows::{APPOINTMENT_COLUMNS, DONOR_COLUMNS, NOTIFICATION_COLUMNS, REQUEST_COLUMNS};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::time::Duration;

/// Translate a driver error into a store error.
///
/// Connection-level failures are `Unavailable`; everything else is `Database`.
fn db_error(error: sqlx::Error) -> StoreError {
    match error {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::WorkerCrashed => StoreError::Unavailable(error.to_string()),
        other => StoreError::Database(other.to_string()),
    }
}

fn insert_error(entity: &'static str, id: String, error: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &error {
        if db.is_unique_violation() {
            return StoreError::Conflict { entity, id };
        }
    }
    db_error(error)
}

fn count(value: u32) -> i64 {
    i64::from(value)
}

/// `PostgreSQL`-backed implementation of every donation store trait.
#[derive(Clone, Debug)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a new pool.
    ///
    /// # Errors
    ///
    /// `Unavailable` if the database cannot be reached.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        Self::connect_with_timeout(database_url, max_connections, Duration::from_secs(30)).await
    }

    /// Connect a new pool with an explicit acquire timeout.
    ///
    /// # Errors
    ///
    /// `Unavailable` if the database cannot be reached.
    pub async fn connect_with_timeout(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Unavailable(format!("connect failed: {e}")))?;
        Ok(Self { pool })
    }

    /// Run the embedded migrations.
    ///
    /// # Errors
    ///
    /// `Database` if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn condition_failure(
        &self,
        table: &'static str,
        entity: &'static str,
        id: uuid::Uuid,
        expected: &'static str,
        parse: fn(&str) -> Option<&'static str>,
    ) -> StoreError {
        let sql = format!("SELECT status FROM {table} WHERE id = $1");
        let row = match sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
        {
            Ok(row) => row,
            Err(e) => return db_error(e),
        };

        let Some(row) = row else {
            return StoreError::NotFound {
                entity,
                id: id.to_string(),
            };
        };

        let actual = row
            .try_get::<String, _>("status")
            .ok()
            .and_then(|s| parse(&s))
            .unwrap_or("unknown");

        metrics::counter!("hemolink_store_condition_failures_total", "table" => table)
            .increment(1);
        tracing::debug!(table, %id, expected, actual, "Conditional update lost");

        StoreError::ConditionFailed { expected, actual }
    }
}

impl RequestStore for PostgresStore {
    fn insert_request(&self, request: Request) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let sql = format!(
                "INSERT INTO requests ({REQUEST_COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
            );
            sqlx::query(&sql)
                .bind(request.id.as_uuid())
                .bind(request.hospital_id.as_uuid())
                .bind(request.kind.as_str())
                .bind(request.blood_group.as_str())
                .bind(count(request.units_needed))
                .bind(request.urgency.as_str())
                .bind(Json(&request.patient))
                .bind(&request.notes)
                .bind(Json(&request.location))
                .bind(request.status.as_str())
                .bind(request.assigned_donor.map(|d| *d.as_uuid()))
                .bind(request.appointment_id.map(|a| *a.as_uuid()))
                .bind(request.created_at)
                .bind(request.updated_at)
                .execute(&self.pool)
                .await
                .map_err(|e| insert_error("request", request.id.to_string(), e))?;
            Ok(())
        })
    }

    fn load_request(&self, id: RequestId) -> StoreFuture<'_, Request> {
        Box::pin(async move {
            let sql = format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE id = $1");
            let row = sqlx::query(&sql)
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?
                .ok_or_else(|| StoreError::NotFound {
                    entity: "request",
                    id: id.to_string(),
                })?;
            rows::request(&row)
        })
    }

    fn compare_and_swap_request(
        &self,
        expected: RequestStatus,
        next: Request,
    ) -> StoreFuture<'_, Request> {
        Box::pin(async move {
            let sql = format!(
                "UPDATE requests SET kind = $3, blood_group = $4, units_needed = $5, \
                 urgency = $6, patient = $7, notes = $8, location = $9, status = $10, \
                 assigned_donor = $11, appointment_id = $12, updated_at = $13 \
                 WHERE id = $1 AND status = $2 \
                 RETURNING {REQUEST_COLUMNS}"
            );
            let row = sqlx::query(&sql)
                .bind(next.id.as_uuid())
                .bind(expected.as_str())
                .bind(next.kind.as_str())
                .bind(next.blood_group.as_str())
                .bind(count(next.units_needed))
                .bind(next.urgency.as_str())
                .bind(Json(&next.patient))
                .bind(&next.notes)
                .bind(Json(&next.location))
                .bind(next.status.as_str())
                .bind(next.assigned_donor.map(|d| *d.as_uuid()))
                .bind(next.appointment_id.map(|a| *a.as_uuid()))
                .bind(next.updated_at)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;

            match row {
                Some(row) => rows::request(&row),
                None => Err(self
                    .condition_failure("requests", "request", *next.id.as_uuid(), expected.as_str(), |s| {
                        RequestStatus::parse(s).map(RequestStatus::as_str)
                    })
                    .await),
            }
        })
    }

    fn list_requests_for_hospital(&self, hospital: HospitalId) -> StoreFuture<'_, Vec<Request>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {REQUEST_COLUMNS} FROM requests WHERE hospital_id = $1 \
                 ORDER BY created_at DESC, seq DESC"
            );
            let found = sqlx::query(&sql)
                .bind(hospital.as_uuid())
                .fetch_all(&self.pool)
                .await
                .map_err(db_error)?;
            found.iter().map(rows::request).collect()
        })
    }

    fn list_pending_requests(&self) -> StoreFuture<'_, Vec<Request>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {REQUEST_COLUMNS} FROM requests WHERE status = 'pending' \
                 ORDER BY created_at DESC, seq DESC"
            );
            let found = sqlx::query(&sql)
                .fetch_all(&self.pool)
                .await
                .map_err(db_error)?;
            found.iter().map(rows::request).collect()
        })
    }

    fn record_ignore(&self, request: RequestId, donor: DonorId) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let result = sqlx::query(
                "INSERT INTO request_ignores (request_id, donor_id) VALUES ($1, $2) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(request.as_uuid())
            .bind(donor.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
            Ok(result.rows_affected() == 1)
        })
    }

    fn ignored_requests(&self, donor: DonorId) -> StoreFuture<'_, Vec<RequestId>> {
        Box::pin(async move {
            let ids: Vec<(uuid::Uuid,)> =
                sqlx::query_as("SELECT request_id FROM request_ignores WHERE donor_id = $1")
                    .bind(donor.as_uuid())
                    .fetch_all(&self.pool)
                    .await
                    .map_err(db_error)?;
            Ok(ids.into_iter().map(|(id,)| RequestId::from_uuid(id)).collect())
        })
    }
}

impl DonorStore for PostgresStore {
    fn upsert_donor(&self, donor: Donor) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let sql = format!(
                "INSERT INTO donors ({DONOR_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, \
                 blood_group = EXCLUDED.blood_group, available = EXCLUDED.available, \
                 last_donation = EXCLUDED.last_donation, latitude = EXCLUDED.latitude, \
                 longitude = EXCLUDED.longitude"
            );
            sqlx::query(&sql)
                .bind(donor.id.as_uuid())
                .bind(&donor.name)
                .bind(donor.blood_group.as_str())
                .bind(donor.available)
                .bind(donor.last_donation)
                .bind(donor.position.map(|p| p.latitude))
                .bind(donor.position.map(|p| p.longitude))
                .execute(&self.pool)
                .await
                .map_err(db_error)?;
            Ok(())
        })
    }

    fn load_donor(&self, id: DonorId) -> StoreFuture<'_, Donor> {
        Box::pin(async move {
            let sql = format!("SELECT {DONOR_COLUMNS} FROM donors WHERE id = $1");
            let row = sqlx::query(&sql)
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?
                .ok_or_else(|| StoreError::NotFound {
                    entity: "donor",
                    id: id.to_string(),
                })?;
            rows::donor(&row)
        })
    }

    fn list_available_donors(&self, groups: &[BloodGroup]) -> StoreFuture<'_, Vec<Donor>> {
        let labels: Vec<String> = groups.iter().map(|g| g.as_str().to_string()).collect();
        Box::pin(async move {
            let sql = format!(
                "SELECT {DONOR_COLUMNS} FROM donors WHERE available AND blood_group = ANY($1)"
            );
            let found = sqlx::query(&sql)
                .bind(&labels)
                .fetch_all(&self.pool)
                .await
                .map_err(db_error)?;
            found.iter().map(rows::donor).collect()
        })
    }
}

impl AppointmentStore for PostgresStore {
    fn insert_appointment(&self, appointment: Appointment) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let sql = format!(
                "INSERT INTO appointments ({APPOINTMENT_COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"
            );
            sqlx::query(&sql)
                .bind(appointment.id.as_uuid())
                .bind(appointment.request_id.map(|r| *r.as_uuid()))
                .bind(appointment.donor_id.as_uuid())
                .bind(appointment.hospital_id.as_uuid())
                .bind(appointment.scheduled_at)
                .bind(appointment.kind.as_str())
                .bind(appointment.blood_group.as_str())
                .bind(count(appointment.units))
                .bind(appointment.status.as_str())
                .bind(&appointment.notes)
                .bind(appointment.reminder_sent)
                .bind(&appointment.notarization_ref)
                .bind(appointment.stock_credited)
                .bind(appointment.created_at)
                .bind(appointment.updated_at)
                .execute(&self.pool)
                .await
                .map_err(|e| insert_error("appointment", appointment.id.to_string(), e))?;
            Ok(())
        })
    }

    fn load_appointment(&self, id: AppointmentId) -> StoreFuture<'_, Appointment> {
        Box::pin(async move {
            let sql = format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = $1");
            let row = sqlx::query(&sql)
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?
                .ok_or_else(|| StoreError::NotFound {
                    entity: "appointment",
                    id: id.to_string(),
                })?;
            rows::appointment(&row)
        })
    }

    fn compare_and_swap_appointment(
        &self,
        expected: AppointmentStatus,
        next: Appointment,
    ) -> StoreFuture<'_, Appointment> {
        Box::pin(async move {
            let sql = format!(
                "UPDATE appointments SET scheduled_at = $3, status = $4, notes = $5, \
                 reminder_sent = $6, notarization_ref = $7, updated_at = $8 \
                 WHERE id = $1 AND status = $2 \
                 RETURNING {APPOINTMENT_COLUMNS}"
            );
            let row = sqlx::query(&sql)
                .bind(next.id.as_uuid())
                .bind(expected.as_str())
                .bind(next.scheduled_at)
                .bind(next.status.as_str())
                .bind(&next.notes)
                .bind(next.reminder_sent)
                .bind(&next.notarization_ref)
                .bind(next.updated_at)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;

            match row {
                Some(row) => rows::appointment(&row),
                None => Err(self
                    .condition_failure(
                        "appointments",
                        "appointment",
                        *next.id.as_uuid(),
                        expected.as_str(),
                        |s| AppointmentStatus::parse(s).map(AppointmentStatus::as_str),
                    )
                    .await),
            }
        })
    }

    fn list_appointments_for_donor(&self, donor: DonorId) -> StoreFuture<'_, Vec<Appointment>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE donor_id = $1 \
                 ORDER BY scheduled_at, seq"
            );
            let found = sqlx::query(&sql)
                .bind(donor.as_uuid())
                .fetch_all(&self.pool)
                .await
                .map_err(db_error)?;
            found.iter().map(rows::appointment).collect()
        })
    }

    fn list_appointments_for_hospital(
        &self,
        hospital: HospitalId,
    ) -> StoreFuture<'_, Vec<Appointment>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE hospital_id = $1 \
                 ORDER BY scheduled_at, seq"
            );
            let found = sqlx::query(&sql)
                .bind(hospital.as_uuid())
                .fetch_all(&self.pool)
                .await
                .map_err(db_error)?;
            found.iter().map(rows::appointment).collect()
        })
    }

    fn appointment_for_request(
        &self,
        request: RequestId,
    ) -> StoreFuture<'_, Option<Appointment>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {APPOINTMENT_COLUMNS} FROM appointments \
                 WHERE request_id = $1 AND status <> 'cancelled' \
                 ORDER BY seq DESC LIMIT 1"
            );
            let row = sqlx::query(&sql)
                .bind(request.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;
            row.as_ref().map(rows::appointment).transpose()
        })
    }

    fn appointments_due(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<Appointment>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {APPOINTMENT_COLUMNS} FROM appointments \
                 WHERE status IN ('scheduled', 'confirmed') AND NOT reminder_sent \
                 AND scheduled_at >= $1 AND scheduled_at < $2 \
                 ORDER BY scheduled_at, seq"
            );
            let found = sqlx::query(&sql)
                .bind(from)
                .bind(to)
                .fetch_all(&self.pool)
                .await
                .map_err(db_error)?;
            found.iter().map(rows::appointment).collect()
        })
    }

    fn mark_reminder_sent(&self, id: AppointmentId) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let result = sqlx::query(
                "UPDATE appointments SET reminder_sent = TRUE WHERE id = $1 AND NOT reminder_sent",
            )
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

            if result.rows_affected() == 1 {
                return Ok(true);
            }
            // Distinguish "already sent" from "no such appointment".
            self.load_appointment(id).await.map(|_| false)
        })
    }

    fn set_notarization_ref(&self, id: AppointmentId, reference: String) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let result =
                sqlx::query("UPDATE appointments SET notarization_ref = $2 WHERE id = $1")
                    .bind(id.as_uuid())
                    .bind(&reference)
                    .execute(&self.pool)
                    .await
                    .map_err(db_error)?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound {
                    entity: "appointment",
                    id: id.to_string(),
                });
            }
            Ok(())
        })
    }
}

impl NotificationStore for PostgresStore {
    fn insert_notification(&self, notification: Notification) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let sql = format!(
                "INSERT INTO notifications ({NOTIFICATION_COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)"
            );
            sqlx::query(&sql)
                .bind(notification.id.as_uuid())
                .bind(notification.user_id.as_uuid())
                .bind(notification.role.as_str())
                .bind(notification.kind.as_str())
                .bind(&notification.message)
                .bind(notification.read)
                .bind(notification.created_at)
                .execute(&self.pool)
                .await
                .map_err(|e| insert_error("notification", notification.id.to_string(), e))?;
            Ok(())
        })
    }

    fn find_notification(&self, id: NotificationId) -> StoreFuture<'_, Option<Notification>> {
        Box::pin(async move {
            let sql = format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = $1");
            let row = sqlx::query(&sql)
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;
            row.as_ref().map(rows::notification).transpose()
        })
    }

    fn mark_notification_read(&self, id: NotificationId, user: UserId) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let result = sqlx::query(
                "UPDATE notifications SET read = TRUE WHERE id = $1 AND user_id = $2 AND NOT read",
            )
            .bind(id.as_uuid())
            .bind(user.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
            Ok(result.rows_affected() == 1)
        })
    }

    fn mark_all_notifications_read(&self, user: UserId) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let result =
                sqlx::query("UPDATE notifications SET read = TRUE WHERE user_id = $1 AND NOT read")
                    .bind(user.as_uuid())
                    .execute(&self.pool)
                    .await
                    .map_err(db_error)?;
            Ok(result.rows_affected())
        })
    }

    fn delete_notification(&self, id: NotificationId, user: UserId) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
                .bind(id.as_uuid())
                .bind(user.as_uuid())
                .execute(&self.pool)
                .await
                .map_err(db_error)?;
            Ok(result.rows_affected() == 1)
        })
    }

    fn list_notifications(&self, user: UserId) -> StoreFuture<'_, Vec<Notification>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE user_id = $1 \
                 ORDER BY created_at DESC, seq DESC"
            );
            let found = sqlx::query(&sql)
                .bind(user.as_uuid())
                .fetch_all(&self.pool)
                .await
                .map_err(db_error)?;
            found.iter().map(rows::notification).collect()
        })
    }
}

impl InventoryStore for PostgresStore {
    fn adjust_units(
        &self,
        hospital: HospitalId,
        group: BloodGroup,
        delta: i64,
    ) -> StoreFuture<'_, u32> {
        Box::pin(async move {
            let result = if delta >= 0 {
                sqlx::query(
                    "INSERT INTO blood_unit_counters (hospital_id, blood_group, units) \
                     VALUES ($1, $2, $3) \
                     ON CONFLICT (hospital_id, blood_group) \
                     DO UPDATE SET units = blood_unit_counters.units + EXCLUDED.units \
                     RETURNING units",
                )
                .bind(hospital.as_uuid())
                .bind(group.as_str())
                .bind(delta)
                .fetch_optional(&self.pool)
                .await
            } else {
                sqlx::query(
                    "UPDATE blood_unit_counters SET units = units + $3 \
                     WHERE hospital_id = $1 AND blood_group = $2 AND units + $3 >= 0 \
                     RETURNING units",
                )
                .bind(hospital.as_uuid())
                .bind(group.as_str())
                .bind(delta)
                .fetch_optional(&self.pool)
                .await
            };
            let row = result.map_err(db_error)?;

            match row {
                Some(row) => rows::units(&row),
                None => {
                    let available = self.load_units(hospital, group).await?;
                    Err(StoreError::Underflow {
                        available,
                        requested: u32::try_from(delta.unsigned_abs()).unwrap_or(u32::MAX),
                    })
                }
            }
        })
    }

    fn credit_appointment(&self, id: AppointmentId) -> StoreFuture<'_, Option<u32>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(db_error)?;

            let claimed = sqlx::query(
                "UPDATE appointments SET stock_credited = TRUE \
                 WHERE id = $1 AND status = 'completed' AND NOT stock_credited \
                 RETURNING hospital_id, blood_group, units",
            )
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error)?;

            let Some(claimed) = claimed else {
                tx.rollback().await.map_err(db_error)?;
                let stored = self.load_appointment(id).await?;
                if stored.status != AppointmentStatus::Completed {
                    return Err(StoreError::ConditionFailed {
                        expected: AppointmentStatus::Completed.as_str(),
                        actual: stored.status.as_str(),
                    });
                }
                return Ok(None);
            };

            let hospital: uuid::Uuid = claimed.try_get("hospital_id").map_err(db_error)?;
            let group = rows::blood_group(&claimed, "blood_group")?;
            let units = rows::units(&claimed)?;

            let row = sqlx::query(
                "INSERT INTO blood_unit_counters (hospital_id, blood_group, units) \
                 VALUES ($1, $2, $3) \
                 ON CONFLICT (hospital_id, blood_group) \
                 DO UPDATE SET units = blood_unit_counters.units + EXCLUDED.units \
                 RETURNING units",
            )
            .bind(hospital)
            .bind(group.as_str())
            .bind(count(units))
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error)?;
            let next = rows::units(&row)?;

            tx.commit().await.map_err(db_error)?;
            Ok(Some(next))
        })
    }

    fn load_units(&self, hospital: HospitalId, group: BloodGroup) -> StoreFuture<'_, u32> {
        Box::pin(async move {
            let row = sqlx::query(
                "SELECT units FROM blood_unit_counters WHERE hospital_id = $1 AND blood_group = $2",
            )
            .bind(hospital.as_uuid())
            .bind(group.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
            row.as_ref().map_or(Ok(0), rows::units)
        })
    }

    fn list_counters(&self, hospital: HospitalId) -> StoreFuture<'_, Vec<BloodUnitCounter>> {
        Box::pin(async move {
            let found = sqlx::query(
                "SELECT blood_group, units FROM blood_unit_counters WHERE hospital_id = $1",
            )
            .bind(hospital.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

            let mut counters = found
                .iter()
                .map(|row| {
                    Ok(BloodUnitCounter {
                        hospital_id: hospital,
                        blood_group: rows::blood_group(row, "blood_group")?,
                        units: rows::units(row)?,
                    })
                })
                .collect::<Result<Vec<_>, StoreError>>()?;
            counters.sort_by_key(|c| c.blood_group);
            Ok(counters)
        })
    }
}
