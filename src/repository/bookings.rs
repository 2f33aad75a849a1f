//! Bookings repository for database operations

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{types::Json, Pool, Postgres};

use super::{BookingStore, CancelOutcome, SlotWrite};
use crate::{
    error::AppResult,
    models::{
        booking::{Booking, BookingStatus, CheckIn, CheckOut, NewBooking},
        slot::Slot,
    },
};

#[derive(Clone)]
pub struct BookingsRepository {
    pool: Pool<Postgres>,
}

impl BookingsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookingStore for BookingsRepository {
    async fn insert(&self, booking: &NewBooking) -> AppResult<Booking> {
        let now = Utc::now();
        let created = sqlx::query_as::<_, Booking>(
            r#"
            INSERT INTO bookings (booking_ref, user_id, temple_id, slot_id, visitors_count,
                                  visitors, contact_email, contact_phone, total_amount,
                                  payment_status, status, qr_code, special_requests,
                                  crea_date, modif_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'confirmed', $11, $12, $13, $13)
            RETURNING *
            "#,
        )
        .bind(&booking.booking_ref)
        .bind(booking.user_id)
        .bind(booking.temple_id)
        .bind(booking.slot_id)
        .bind(booking.visitors_count)
        .bind(Json(&booking.visitors))
        .bind(&booking.contact_email)
        .bind(&booking.contact_phone)
        .bind(booking.total_amount)
        .bind(booking.payment_status)
        .bind(&booking.qr_code)
        .bind(Json(&booking.special_requests))
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn get(&self, id: i32) -> AppResult<Option<Booking>> {
        let booking = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(booking)
    }

    async fn get_by_ref(&self, booking_ref: &str) -> AppResult<Option<Booking>> {
        let booking = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE booking_ref = $1")
            .bind(booking_ref)
            .fetch_optional(&self.pool)
            .await?;
        Ok(booking)
    }

    async fn list_for_user(
        &self,
        user_id: i32,
        status: Option<BookingStatus>,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<Booking>, i64)> {
        let status = status.map(|s| s.as_str());

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM bookings WHERE user_id = $1 AND ($2::text IS NULL OR status = $2)",
        )
        .bind(user_id)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        let bookings = sqlx::query_as::<_, Booking>(
            r#"
            SELECT * FROM bookings
            WHERE user_id = $1 AND ($2::text IS NULL OR status = $2)
            ORDER BY crea_date DESC, id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(user_id)
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((bookings, total))
    }

    async fn cancel(&self, booking_id: i32, release: &SlotWrite) -> AppResult<CancelOutcome> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1 FOR UPDATE")
            .bind(booking_id)
            .fetch_optional(&mut *tx)
            .await?;
        let current = match current {
            Some(b) => b,
            None => return Ok(CancelOutcome::NotFound),
        };
        if current.status != BookingStatus::Confirmed {
            return Ok(CancelOutcome::NotConfirmed(current.status));
        }

        let now = Utc::now();
        let slot = sqlx::query_as::<_, Slot>(
            r#"
            UPDATE slots
            SET booked_count = $3, status = $4, version = version + 1, modif_date = $5
            WHERE id = $1 AND version = $2
            RETURNING *
            "#,
        )
        .bind(release.slot_id)
        .bind(release.expected_version)
        .bind(release.booked_count)
        .bind(release.status)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;
        let slot = match slot {
            Some(s) => s,
            // Dropping the transaction rolls it back
            None => return Ok(CancelOutcome::SlotChanged),
        };

        let booking = sqlx::query_as::<_, Booking>(
            "UPDATE bookings SET status = 'cancelled', modif_date = $2 WHERE id = $1 RETURNING *",
        )
        .bind(booking_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(CancelOutcome::Cancelled { booking, slot })
    }

    async fn record_check_in(&self, id: i32, check_in: &CheckIn) -> AppResult<Option<Booking>> {
        let booking = sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings SET check_in = $2, modif_date = $3
            WHERE id = $1 AND status = 'confirmed' AND check_in IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(Json(check_in))
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;
        Ok(booking)
    }

    async fn record_check_out(&self, id: i32, check_out: &CheckOut) -> AppResult<Option<Booking>> {
        let booking = sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings SET check_out = $2, status = 'completed', modif_date = $3
            WHERE id = $1 AND status = 'confirmed' AND check_in IS NOT NULL AND check_out IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(Json(check_out))
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;
        Ok(booking)
    }
}
