//! # Delivery Slots
//!
//! Two-hour delivery windows with a per-store capacity. The booked count of
//! a slot is the number of live (not cancelled) orders holding it.

use std::collections::HashMap;

use chrono::{Local, NaiveDate, NaiveDateTime};
use kirana_core::slots::{generate_slots, DeliverySlot};
use kirana_core::CheckoutPolicy;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;

/// Repository for delivery slot availability.
#[derive(Debug, Clone)]
pub struct DeliverySlotRepository {
    pool: SqlitePool,
    policy: CheckoutPolicy,
}

impl DeliverySlotRepository {
    pub fn new(pool: SqlitePool, policy: CheckoutPolicy) -> Self {
        DeliverySlotRepository { pool, policy }
    }

    /// Slots offered by a store on `date` (default: today), as of now.
    pub async fn slots(&self, store_id: &str, date: Option<NaiveDate>) -> DbResult<Vec<DeliverySlot>> {
        let now = Local::now().naive_local();
        self.slots_at(store_id, date.unwrap_or_else(|| now.date()), now).await
    }

    /// Slots offered by a store on `date`, as seen at `now` (local time).
    pub async fn slots_at(
        &self,
        store_id: &str,
        date: NaiveDate,
        now: NaiveDateTime,
    ) -> DbResult<Vec<DeliverySlot>> {
        debug!(store_id = %store_id, date = %date, "Listing delivery slots");

        let rows: Vec<(u32, i64)> = sqlx::query_as(
            r#"
            SELECT slot_start_hour, COUNT(*)
            FROM orders
            WHERE store_id = ?1
              AND slot_date = ?2
              AND slot_start_hour IS NOT NULL
              AND status <> 'cancelled'
            GROUP BY slot_start_hour
            "#,
        )
        .bind(store_id)
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        let booked: HashMap<u32, i64> = rows.into_iter().collect();

        Ok(generate_slots(
            date,
            now,
            self.policy.slot_capacity,
            self.policy.peak_slot_surcharge(),
            |start| booked.get(&start).copied().unwrap_or(0),
        ))
    }
}

/// Live orders holding one slot, on the caller's connection.
pub(crate) async fn booked_count_in(
    conn: &mut SqliteConnection,
    store_id: &str,
    date: NaiveDate,
    start_hour: u32,
) -> DbResult<i64> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM orders
        WHERE store_id = ?1
          AND slot_date = ?2
          AND slot_start_hour = ?3
          AND status <> 'cancelled'
        "#,
    )
    .bind(store_id)
    .bind(date)
    .bind(start_hour)
    .fetch_one(&mut *conn)
    .await?;

    Ok(count)
}

// =============================================================================
// Unit Tests
// =============================================================================
