//! Capacity ledger: the only writer of a slot's booked count
//!
//! Every change is planned from a snapshot by a pure function and committed with
//! a version-checked write. A lost race re-reads the slot and plans again, so the
//! capacity check is evaluated against the counter that is actually committed.

use std::sync::Arc;

use thiserror::Error;

use crate::{
    error::AppError,
    models::{booking::Booking, slot::Slot},
    repository::{BookingStore, CancelOutcome, SlotStore, SlotWrite},
};

use super::lifecycle::recompute_status;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Requested {requested} seats but only {available} available")]
    CapacityExceeded { requested: i32, available: i32 },

    /// Slot is inactive or held in a manual status
    #[error("Slot {0} is closed for booking")]
    Closed(i32),

    #[error("Slot {0} not found")]
    NotFound(i32),

    #[error(transparent)]
    Store(#[from] AppError),
}

/// Plan a reservation of `seats` against a slot snapshot
pub fn plan_reserve(slot: &Slot, seats: i32) -> Result<SlotWrite, LedgerError> {
    if !slot.is_active || slot.status.is_manual() {
        return Err(LedgerError::Closed(slot.id));
    }
    let available = slot.available_spots();
    if seats <= 0 || seats > available {
        return Err(LedgerError::CapacityExceeded {
            requested: seats,
            available,
        });
    }
    let booked_count = slot.booked_count + seats;
    Ok(SlotWrite {
        slot_id: slot.id,
        expected_version: slot.version,
        booked_count,
        status: recompute_status(slot.status, booked_count, slot.capacity),
    })
}

/// Plan a release of `seats`, floored at zero
pub fn plan_release(slot: &Slot, seats: i32) -> SlotWrite {
    let booked_count = (slot.booked_count - seats.max(0)).max(0);
    SlotWrite {
        slot_id: slot.id,
        expected_version: slot.version,
        booked_count,
        status: recompute_status(slot.status, booked_count, slot.capacity),
    }
}

#[derive(Clone)]
pub struct CapacityLedger {
    slots: Arc<dyn SlotStore>,
    bookings: Arc<dyn BookingStore>,
    max_attempts: u32,
}

impl CapacityLedger {
    pub fn new(slots: Arc<dyn SlotStore>, bookings: Arc<dyn BookingStore>, max_attempts: u32) -> Self {
        Self {
            slots,
            bookings,
            max_attempts: max_attempts.max(1),
        }
    }

    async fn load(&self, slot_id: i32) -> Result<Slot, LedgerError> {
        self.slots
            .get(slot_id)
            .await?
            .ok_or(LedgerError::NotFound(slot_id))
    }

    fn contention(&self, slot_id: i32) -> LedgerError {
        tracing::warn!(slot_id, attempts = self.max_attempts, "Slot counter contention exhausted retries");
        LedgerError::Store(AppError::Transient(format!(
            "Slot {} is under heavy contention",
            slot_id
        )))
    }

    /// Reserve `seats` on a slot, returning the committed slot
    pub async fn reserve(&self, slot_id: i32, seats: i32) -> Result<Slot, LedgerError> {
        for attempt in 1..=self.max_attempts {
            let slot = self.load(slot_id).await?;
            let write = plan_reserve(&slot, seats)?;
            if let Some(updated) = self.slots.write_counter(&write).await? {
                tracing::debug!(slot_id, seats, booked = updated.booked_count, "Seats reserved");
                return Ok(updated);
            }
            tracing::debug!(slot_id, attempt, "Lost slot counter race on reserve");
            tokio::task::yield_now().await;
        }
        Err(self.contention(slot_id))
    }

    /// Release `seats` on a slot, returning the committed slot
    pub async fn release(&self, slot_id: i32, seats: i32) -> Result<Slot, LedgerError> {
        for attempt in 1..=self.max_attempts {
            let slot = self.load(slot_id).await?;
            let write = plan_release(&slot, seats);
            if let Some(updated) = self.slots.write_counter(&write).await? {
                tracing::debug!(slot_id, seats, booked = updated.booked_count, "Seats released");
                return Ok(updated);
            }
            tracing::debug!(slot_id, attempt, "Lost slot counter race on release");
            tokio::task::yield_now().await;
        }
        Err(self.contention(slot_id))
    }

    /// Cancel a booking and release its seats in one commit
    pub async fn release_for_cancellation(&self, booking: &Booking) -> Result<CancelOutcome, LedgerError> {
        for attempt in 1..=self.max_attempts {
            let slot = self.load(booking.slot_id).await?;
            let write = plan_release(&slot, booking.visitors_count);
            match self.bookings.cancel(booking.id, &write).await? {
                CancelOutcome::SlotChanged => {
                    tracing::debug!(slot_id = slot.id, attempt, "Lost slot counter race on cancel");
                    tokio::task::yield_now().await;
                }
                outcome => return Ok(outcome),
            }
        }
        Err(self.contention(booking.slot_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::slot::{sample_slot, NewSlot, SlotStatus};
    use crate::repository::MemoryStore;
    use chrono::{NaiveDate, NaiveTime};
    use rust_decimal::Decimal;

    async fn ledger_with_slot(capacity: i32, booked: i32) -> (CapacityLedger, Arc<MemoryStore>, i32) {
        let store = Arc::new(MemoryStore::new());
        let slot = SlotStore::insert(
            store.as_ref(),
            &[NewSlot {
                temple_id: 1,
                slot_date: NaiveDate::from_ymd_opt(2030, 1, 15).unwrap(),
                start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
                capacity,
                price: Decimal::new(20, 0),
                special_event: None,
            }],
        )
        .await
        .unwrap()
        .remove(0);
        let ledger = CapacityLedger::new(store.clone(), store.clone(), 1_000);
        if booked > 0 {
            ledger.reserve(slot.id, booked).await.unwrap();
        }
        (ledger, store, slot.id)
    }

    #[test]
    fn test_plan_reserve_sets_full_at_capacity() {
        let slot = sample_slot(1, 10, 8);
        let write = plan_reserve(&slot, 2).unwrap();
        assert_eq!(write.booked_count, 10);
        assert_eq!(write.status, SlotStatus::FULL);
        assert_eq!(write.expected_version, slot.version);

        assert!(matches!(
            plan_reserve(&slot, 3),
            Err(LedgerError::CapacityExceeded { requested: 3, available: 2 })
        ));
    }

    #[test]
    fn test_plan_reserve_rejects_manual_status() {
        let mut slot = sample_slot(1, 10, 0);
        slot.status = SlotStatus::MAINTENANCE;
        assert!(matches!(plan_reserve(&slot, 1), Err(LedgerError::Closed(1))));
    }

    #[test]
    fn test_plan_release_floors_at_zero_and_keeps_manual() {
        let slot = sample_slot(1, 10, 10);
        let write = plan_release(&slot, 1);
        assert_eq!(write.booked_count, 9);
        assert_eq!(write.status, SlotStatus::AVAILABLE);

        let mut cancelled = sample_slot(2, 10, 2);
        cancelled.status = SlotStatus::CANCELLED;
        let write = plan_release(&cancelled, 5);
        assert_eq!(write.booked_count, 0);
        assert_eq!(write.status, SlotStatus::CANCELLED);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reserves_never_exceed_capacity() {
        let (ledger, store, slot_id) = ledger_with_slot(10, 0).await;

        let mut handles = Vec::new();
        for _ in 0..25 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move { ledger.reserve(slot_id, 1).await }));
        }

        let mut reserved = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(slot) => {
                    assert!(slot.booked_count <= slot.capacity);
                    reserved += 1;
                }
                Err(LedgerError::CapacityExceeded { .. }) => {}
                Err(other) => panic!("unexpected ledger error: {}", other),
            }
        }
        assert_eq!(reserved, 10);

        let slot = SlotStore::get(store.as_ref(), slot_id).await.unwrap().unwrap();
        assert_eq!(slot.booked_count, 10);
        assert_eq!(slot.status, SlotStatus::FULL);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_reserve_then_release_restores_count() {
        let (ledger, store, slot_id) = ledger_with_slot(50, 5).await;
        let seats = [1, 3, 2, 4, 6];

        let mut handles = Vec::new();
        for n in seats {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.reserve(slot_id, n).await.unwrap();
                ledger.release(slot_id, n).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let slot = SlotStore::get(store.as_ref(), slot_id).await.unwrap().unwrap();
        assert_eq!(slot.booked_count, 5);
        assert_eq!(slot.status, SlotStatus::AVAILABLE);
    }

    #[tokio::test]
    async fn test_missing_slot_is_not_found() {
        let (ledger, _store, _) = ledger_with_slot(10, 0).await;
        assert!(matches!(ledger.reserve(999, 1).await, Err(LedgerError::NotFound(999))));
    }
}
