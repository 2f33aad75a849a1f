//! Booking workflow: creation, cancellation and gate operations

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use validator::Validate;

use crate::{
    config::BookingConfig,
    error::{AppError, AppResult},
    models::{
        booking::{
            Booking, BookingPage, BookingQr, BookingQuery, BookingStatus, CheckIn,
            CheckInRequest, CheckOut, CheckOutRequest, CreateBooking, Feedback, GeoPoint,
            NewBooking, PaymentStatus, QrPayload,
        },
        slot::Slot,
        user::UserClaims,
    },
    repository::{CancelOutcome, Repository},
};

use super::{
    broadcast::{SlotEvent, TempleBroadcaster, TempleEvent},
    clock::Clock,
    ledger::{CapacityLedger, LedgerError},
    lifecycle::{can_cancel, is_bookable},
    qr::QrEncoder,
};

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

/// Booking identifier: prefix, base-36 millisecond timestamp, 5 random base-36 chars
pub fn generate_booking_ref(prefix: &str, timestamp_millis: i64) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..5)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!(
        "{}{}{}",
        prefix,
        to_base36(timestamp_millis.max(0) as u64),
        suffix
    )
    .to_uppercase()
}

/// Price of `seats` visitors, special-event surcharge included
pub fn total_amount(slot: &Slot, seats: i32) -> Decimal {
    (slot.price + slot.surcharge()) * Decimal::from(seats)
}

#[derive(Clone)]
pub struct BookingWorkflow {
    repository: Repository,
    ledger: CapacityLedger,
    qr: Arc<dyn QrEncoder>,
    clock: Arc<dyn Clock>,
    broadcaster: TempleBroadcaster,
    config: BookingConfig,
}

impl BookingWorkflow {
    pub fn new(
        repository: Repository,
        qr: Arc<dyn QrEncoder>,
        clock: Arc<dyn Clock>,
        broadcaster: TempleBroadcaster,
        config: BookingConfig,
    ) -> Self {
        let ledger = CapacityLedger::new(
            repository.slots.clone(),
            repository.bookings.clone(),
            config.max_ledger_attempts,
        );
        Self {
            repository,
            ledger,
            qr,
            clock,
            broadcaster,
            config,
        }
    }

    /// Create a booking, reserving its seats
    ///
    /// The reservation and the insert run on a detached task, so a dropped request
    /// cannot leave seats reserved without a booking. Any failure after the
    /// reservation releases the seats before returning.
    pub async fn create(&self, caller: &UserClaims, request: CreateBooking) -> AppResult<Booking> {
        let slot = self
            .repository
            .slots
            .get(request.slot_id)
            .await?
            .filter(|s| s.is_active)
            .ok_or_else(|| AppError::NotFound("Slot not found".to_string()))?;

        request.validate()?;
        let seats = request.visitors_count;

        if request.visitors.len() != seats as usize {
            return Err(AppError::Validation(
                "Visitors count does not match visitors data".to_string(),
            ));
        }

        if !is_bookable(&slot, seats, self.clock.local_now()) {
            return Err(AppError::SlotUnavailable(
                "Slot is not available for the requested number of visitors".to_string(),
            ));
        }

        let temple = self
            .repository
            .temples
            .get(slot.temple_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Temple not found".to_string()))?;

        let payload = QrPayload {
            booking_id: String::new(),
            temple: temple.name,
            date: slot.slot_date,
            time: QrPayload::time_window(slot.start_time, slot.end_time),
            visitors: seats,
            user: caller.name.clone(),
        };

        let new_booking = NewBooking {
            booking_ref: String::new(),
            user_id: caller.user_id,
            temple_id: slot.temple_id,
            slot_id: slot.id,
            visitors_count: seats,
            visitors: request.visitors,
            contact_email: caller.email.clone(),
            contact_phone: caller.phone.clone(),
            total_amount: total_amount(&slot, seats),
            payment_status: PaymentStatus::Completed,
            qr_code: String::new(),
            special_requests: request.special_requests,
        };

        let workflow = self.clone();
        tokio::spawn(async move { workflow.reserve_and_persist(new_booking, payload).await })
            .await
            .map_err(|e| AppError::Internal(format!("Booking task failed: {}", e)))?
    }

    /// Reserve the seats, then insert; releases the seats if the insert fails
    async fn reserve_and_persist(&self, booking: NewBooking, payload: QrPayload) -> AppResult<Booking> {
        let (slot_id, seats) = (booking.slot_id, booking.visitors_count);

        let reserved = self.ledger.reserve(slot_id, seats).await.map_err(|e| match e {
            LedgerError::CapacityExceeded { .. } | LedgerError::Closed(_) => {
                AppError::SlotUnavailable(
                    "Slot is not available for the requested number of visitors".to_string(),
                )
            }
            LedgerError::NotFound(_) => AppError::NotFound("Slot not found".to_string()),
            LedgerError::Store(e) => e,
        })?;

        match self.persist(booking, payload).await {
            Ok(booking) => {
                tracing::info!(
                    booking_id = booking.id,
                    booking_ref = %booking.booking_ref,
                    slot_id,
                    seats,
                    "Booking created"
                );
                self.notify_slot(&reserved).await;
                Ok(booking)
            }
            Err(e) => {
                self.compensate(slot_id, seats).await;
                Err(e)
            }
        }
    }

    /// Encode the QR payload and insert, drawing a fresh identifier on collision
    async fn persist(&self, mut booking: NewBooking, mut payload: QrPayload) -> AppResult<Booking> {
        for attempt in 1..=self.config.max_identifier_attempts.max(1) {
            booking.booking_ref =
                generate_booking_ref(&self.config.id_prefix, Utc::now().timestamp_millis());
            payload.booking_id = booking.booking_ref.clone();
            booking.qr_code = self.qr.encode(&payload)?;

            match self.repository.bookings.insert(&booking).await {
                Err(AppError::Conflict(_)) => {
                    tracing::debug!(attempt, booking_ref = %booking.booking_ref, "Booking identifier collision");
                }
                result => return result,
            }
        }
        Err(AppError::Transient(
            "Could not allocate a unique booking identifier".to_string(),
        ))
    }

    async fn compensate(&self, slot_id: i32, seats: i32) {
        tracing::warn!(slot_id, seats, "Booking failed after reservation, releasing seats");
        match self.ledger.release(slot_id, seats).await {
            Ok(slot) => self.notify_slot(&slot).await,
            Err(e) => {
                tracing::error!(slot_id, seats, error = %e, "Failed to release seats of a failed booking")
            }
        }
    }

    async fn notify_slot(&self, slot: &Slot) {
        self.broadcaster
            .publish(slot.temple_id, TempleEvent::Slot(SlotEvent::from(slot)))
            .await;
    }

    /// Booking visible to the caller: its owner, or any booking for an admin
    async fn visible(&self, id: i32, caller: &UserClaims) -> AppResult<Booking> {
        self.repository
            .bookings
            .get(id)
            .await?
            .filter(|b| caller.is_admin() || b.user_id == caller.user_id)
            .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))
    }

    /// Cancel a booking, releasing its seats in the same commit
    pub async fn cancel(&self, id: i32, caller: &UserClaims) -> AppResult<Booking> {
        let booking = self.visible(id, caller).await?;
        let slot = self
            .repository
            .slots
            .get(booking.slot_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Slot not found".to_string()))?;

        if !can_cancel(&booking, &slot, self.clock.local_now()) {
            return Err(AppError::NotCancellable(
                "Booking cannot be cancelled. Cancellation is allowed up to 2 hours before the slot time."
                    .to_string(),
            ));
        }

        let outcome = self
            .ledger
            .release_for_cancellation(&booking)
            .await
            .map_err(|e| match e {
                LedgerError::NotFound(_) => AppError::NotFound("Slot not found".to_string()),
                LedgerError::Store(e) => e,
                other => AppError::Internal(other.to_string()),
            })?;

        match outcome {
            CancelOutcome::Cancelled { booking, slot } => {
                tracing::info!(
                    booking_id = booking.id,
                    slot_id = slot.id,
                    released = booking.visitors_count,
                    "Booking cancelled"
                );
                self.notify_slot(&slot).await;
                Ok(booking)
            }
            CancelOutcome::NotConfirmed(status) => Err(AppError::NotCancellable(format!(
                "Booking is {} and cannot be cancelled",
                status
            ))),
            CancelOutcome::NotFound => Err(AppError::NotFound("Booking not found".to_string())),
            CancelOutcome::SlotChanged => Err(AppError::Transient(format!(
                "Slot {} changed during cancellation",
                slot.id
            ))),
        }
    }

    pub async fn get(&self, id: i32, caller: &UserClaims) -> AppResult<Booking> {
        self.visible(id, caller).await
    }

    /// Caller's bookings, newest first
    pub async fn list(&self, caller: &UserClaims, query: &BookingQuery) -> AppResult<BookingPage> {
        let page = query.page.unwrap_or(1).max(1);
        let limit = query.limit.unwrap_or(10).clamp(1, 100);

        let (bookings, total) = self
            .repository
            .bookings
            .list_for_user(caller.user_id, query.status, limit, (page - 1) * limit)
            .await?;

        Ok(BookingPage {
            count: bookings.len(),
            bookings,
            total,
            page,
            pages: (total + limit - 1) / limit,
        })
    }

    pub async fn get_qr(&self, booking_ref: &str, caller: &UserClaims) -> AppResult<BookingQr> {
        let booking = self
            .repository
            .bookings
            .get_by_ref(booking_ref)
            .await?
            .filter(|b| caller.is_admin() || b.user_id == caller.user_id)
            .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;

        Ok(BookingQr {
            booking_id: booking.booking_ref,
            qr_code: booking.qr_code,
        })
    }

    /// Record entry at the gate (admin)
    pub async fn check_in(&self, id: i32, request: CheckInRequest, admin: &UserClaims) -> AppResult<Booking> {
        admin.require_admin()?;
        let booking = self.visible(id, admin).await?;

        if booking.status != BookingStatus::Confirmed {
            return Err(AppError::BusinessRule(
                "Only confirmed bookings can be checked in".to_string(),
            ));
        }
        if booking.check_in.is_some() {
            return Err(AppError::BusinessRule("Booking is already checked in".to_string()));
        }

        let location = match (request.latitude, request.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPoint { latitude, longitude }),
            _ => None,
        };
        let check_in = CheckIn {
            time: self.clock.now(),
            location,
            verified_by: request.verified_by.unwrap_or_else(|| admin.name.clone()),
        };

        let updated = self
            .repository
            .bookings
            .record_check_in(id, &check_in)
            .await?
            .ok_or_else(|| AppError::BusinessRule("Booking is already checked in".to_string()))?;
        tracing::info!(booking_id = id, verified_by = %check_in.verified_by, "Booking checked in");
        Ok(updated)
    }

    /// Record exit with optional feedback (admin); completes the booking
    pub async fn check_out(&self, id: i32, request: CheckOutRequest, admin: &UserClaims) -> AppResult<Booking> {
        admin.require_admin()?;
        request.validate()?;
        let booking = self.visible(id, admin).await?;

        if booking.check_in.is_none() {
            return Err(AppError::BusinessRule(
                "Booking must be checked in before checkout".to_string(),
            ));
        }
        if booking.check_out.is_some() {
            return Err(AppError::BusinessRule("Booking is already checked out".to_string()));
        }

        let feedback = if request.rating.is_some() || request.comment.is_some() {
            Some(Feedback {
                rating: request.rating,
                comment: request.comment,
            })
        } else {
            None
        };
        let check_out = CheckOut {
            time: self.clock.now(),
            feedback,
        };

        let updated = self
            .repository
            .bookings
            .record_check_out(id, &check_out)
            .await?
            .ok_or_else(|| {
                AppError::BusinessRule("Only confirmed, checked-in bookings can be checked out".to_string())
            })?;
        tracing::info!(booking_id = id, "Booking checked out");
        Ok(updated)
    }
}
