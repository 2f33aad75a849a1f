//! Slots repository for database operations

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, Utc};
use sqlx::{types::Json, Pool, Postgres};

use super::{overlap_conflict, SlotSettingsWrite, SlotStore, SlotWrite};
use crate::{
    error::AppResult,
    models::slot::{NewSlot, Slot},
};

#[derive(Clone)]
pub struct SlotsRepository {
    pool: Pool<Postgres>,
}

impl SlotsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SlotStore for SlotsRepository {
    async fn get(&self, id: i32) -> AppResult<Option<Slot>> {
        let slot = sqlx::query_as::<_, Slot>("SELECT * FROM slots WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(slot)
    }

    async fn list(&self, temple_id: i32, from: NaiveDate, to: NaiveDate) -> AppResult<Vec<Slot>> {
        let slots = sqlx::query_as::<_, Slot>(
            r#"
            SELECT * FROM slots
            WHERE temple_id = $1 AND slot_date BETWEEN $2 AND $3 AND is_active = TRUE
            ORDER BY slot_date, start_time
            "#,
        )
        .bind(temple_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(slots)
    }

    async fn find_overlapping(
        &self,
        temple_id: i32,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    ) -> AppResult<Option<Slot>> {
        let slot = sqlx::query_as::<_, Slot>(
            r#"
            SELECT * FROM slots
            WHERE temple_id = $1 AND slot_date = $2 AND is_active = TRUE
              AND start_time < $4 AND end_time > $3
            ORDER BY start_time
            LIMIT 1
            "#,
        )
        .bind(temple_id)
        .bind(date)
        .bind(start)
        .bind(end)
        .fetch_optional(&self.pool)
        .await?;
        Ok(slot)
    }

    async fn insert(&self, slots: &[NewSlot]) -> AppResult<Vec<Slot>> {
        let mut tx = self.pool.begin().await?;
        let mut created = Vec::with_capacity(slots.len());
        let now = Utc::now();

        // Serialize slot creation per temple so the overlap check below holds at commit
        let mut temple_ids: Vec<i32> = slots.iter().map(|s| s.temple_id).collect();
        temple_ids.sort_unstable();
        temple_ids.dedup();
        for temple_id in temple_ids {
            sqlx::query("SELECT id FROM temples WHERE id = $1 FOR UPDATE")
                .bind(temple_id)
                .execute(&mut *tx)
                .await?;
        }

        for new in slots {
            let clash: Option<i32> = sqlx::query_scalar(
                r#"
                SELECT id FROM slots
                WHERE temple_id = $1 AND slot_date = $2 AND is_active = TRUE
                  AND start_time < $4 AND end_time > $3
                LIMIT 1
                "#,
            )
            .bind(new.temple_id)
            .bind(new.slot_date)
            .bind(new.start_time)
            .bind(new.end_time)
            .fetch_optional(&mut *tx)
            .await?;
            if clash.is_some() {
                return Err(overlap_conflict(new));
            }

            let slot = sqlx::query_as::<_, Slot>(
                r#"
                INSERT INTO slots (temple_id, slot_date, start_time, end_time, capacity,
                                   booked_count, price, status, special_event, crea_date, modif_date)
                VALUES ($1, $2, $3, $4, $5, 0, $6, 'available', $7, $8, $8)
                RETURNING *
                "#,
            )
            .bind(new.temple_id)
            .bind(new.slot_date)
            .bind(new.start_time)
            .bind(new.end_time)
            .bind(new.capacity)
            .bind(new.price)
            .bind(new.special_event.clone().map(Json))
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;
            created.push(slot);
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn update_settings(&self, write: &SlotSettingsWrite) -> AppResult<Option<Slot>> {
        let slot = sqlx::query_as::<_, Slot>(
            r#"
            UPDATE slots
            SET capacity = $3, price = $4, status = $5, special_event = $6,
                version = version + 1, modif_date = $7
            WHERE id = $1 AND version = $2
            RETURNING *
            "#,
        )
        .bind(write.slot_id)
        .bind(write.expected_version)
        .bind(write.capacity)
        .bind(write.price)
        .bind(write.status)
        .bind(write.special_event.clone().map(Json))
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;
        Ok(slot)
    }

    async fn deactivate(&self, id: i32) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE slots SET is_active = FALSE, version = version + 1, modif_date = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn write_counter(&self, write: &SlotWrite) -> AppResult<Option<Slot>> {
        let slot = sqlx::query_as::<_, Slot>(
            r#"
            UPDATE slots
            SET booked_count = $3, status = $4, version = version + 1, modif_date = $5
            WHERE id = $1 AND version = $2
            RETURNING *
            "#,
        )
        .bind(write.slot_id)
        .bind(write.expected_version)
        .bind(write.booked_count)
        .bind(write.status)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;
        Ok(slot)
    }
}
