//! Repository layer: persistence traits with Postgres and in-memory backends
//!
//! Every mutation of a slot's booked count goes through [`SlotStore::write_counter`]
//! or [`BookingStore::cancel`], both of which are compare-and-swap writes keyed on
//! the slot's `version`. Only the capacity ledger builds the [`SlotWrite`] they take.

pub mod bookings;
pub mod memory;
pub mod simulations;
pub mod slots;
pub mod temples;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::{
        booking::{Booking, BookingStatus, CheckIn, CheckOut, NewBooking},
        crowd::{Alert, CrowdSimulation, NewAlert, NewCrowdSimulation},
        slot::{NewSlot, Slot, SlotStatus, SpecialEvent},
        temple::Temple,
    },
};

pub use memory::MemoryStore;

/// Counter write produced by the capacity ledger.
///
/// Applied only if the stored slot still carries `expected_version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotWrite {
    pub slot_id: i32,
    pub expected_version: i64,
    pub booked_count: i32,
    pub status: SlotStatus,
}

/// Administrative settings write, guarded by version like [`SlotWrite`]
#[derive(Debug, Clone)]
pub struct SlotSettingsWrite {
    pub slot_id: i32,
    pub expected_version: i64,
    pub capacity: i32,
    pub price: Decimal,
    pub status: SlotStatus,
    pub special_event: Option<SpecialEvent>,
}

/// Outcome of an atomic booking cancellation
#[derive(Debug, Clone)]
pub enum CancelOutcome {
    Cancelled { booking: Booking, slot: Slot },
    /// The slot changed since the release was planned; nothing was written
    SlotChanged,
    /// The booking is no longer confirmed; nothing was written
    NotConfirmed(BookingStatus),
    NotFound,
}

/// Error for a new slot whose window intersects an active slot of the same day
pub(crate) fn overlap_conflict(slot: &NewSlot) -> AppError {
    AppError::Conflict(format!(
        "Slot {} {}-{} overlaps with existing slot",
        slot.slot_date,
        slot.start_time.format("%H:%M"),
        slot.end_time.format("%H:%M")
    ))
}

#[async_trait]
pub trait TempleStore: Send + Sync {
    async fn get(&self, id: i32) -> AppResult<Option<Temple>>;

    async fn set_current_occupancy(
        &self,
        id: i32,
        occupancy: i32,
        at: DateTime<Utc>,
    ) -> AppResult<Option<Temple>>;
}

#[async_trait]
pub trait SlotStore: Send + Sync {
    async fn get(&self, id: i32) -> AppResult<Option<Slot>>;

    /// Active slots of a temple between two days (inclusive), by date then start time
    async fn list(&self, temple_id: i32, from: NaiveDate, to: NaiveDate) -> AppResult<Vec<Slot>>;

    /// An active slot on the same temple-day whose window intersects `[start, end)`
    async fn find_overlapping(
        &self,
        temple_id: i32,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    ) -> AppResult<Option<Slot>>;

    /// All or nothing; `Conflict` if a slot overlaps an active slot or another one in the batch
    async fn insert(&self, slots: &[NewSlot]) -> AppResult<Vec<Slot>>;

    /// `None` when the version no longer matches
    async fn update_settings(&self, write: &SlotSettingsWrite) -> AppResult<Option<Slot>>;

    /// Soft delete; false when the slot does not exist
    async fn deactivate(&self, id: i32) -> AppResult<bool>;

    /// `None` when the version no longer matches
    async fn write_counter(&self, write: &SlotWrite) -> AppResult<Option<Slot>>;
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Fails with `Conflict` when the booking reference is already taken
    async fn insert(&self, booking: &NewBooking) -> AppResult<Booking>;

    async fn get(&self, id: i32) -> AppResult<Option<Booking>>;

    async fn get_by_ref(&self, booking_ref: &str) -> AppResult<Option<Booking>>;

    /// Newest first, with the total matching count
    async fn list_for_user(
        &self,
        user_id: i32,
        status: Option<BookingStatus>,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<Booking>, i64)>;

    /// Marks the booking cancelled and applies the seat release in one commit
    async fn cancel(&self, booking_id: i32, release: &SlotWrite) -> AppResult<CancelOutcome>;

    /// Only for confirmed bookings without a check-in; `None` otherwise
    async fn record_check_in(&self, id: i32, check_in: &CheckIn) -> AppResult<Option<Booking>>;

    /// Only for checked-in bookings without a check-out; sets status completed
    async fn record_check_out(&self, id: i32, check_out: &CheckOut) -> AppResult<Option<Booking>>;
}

#[async_trait]
pub trait SimulationStore: Send + Sync {
    async fn find_day(&self, temple_id: i32, date: NaiveDate) -> AppResult<Option<CrowdSimulation>>;

    /// Inserts the day, or returns the existing one if another writer got there first
    async fn insert_day(&self, day: &NewCrowdSimulation) -> AppResult<CrowdSimulation>;

    /// Writes hourly data and weather, appends `new_alerts` and bumps the version,
    /// iff the stored version equals `day.version`. `None` on a lost race.
    async fn commit_day(
        &self,
        day: &CrowdSimulation,
        new_alerts: &[NewAlert],
        at: DateTime<Utc>,
    ) -> AppResult<Option<(CrowdSimulation, Vec<Alert>)>>;

    /// Alert of any simulation day belonging to the temple
    async fn get_alert(&self, temple_id: i32, alert_id: i32) -> AppResult<Option<Alert>>;

    /// Deactivates an active alert; `None` if it was not active
    async fn resolve_alert(&self, alert_id: i32, at: DateTime<Utc>) -> AppResult<Option<Alert>>;
}

/// Main repository struct holding the store backends
#[derive(Clone)]
pub struct Repository {
    pub temples: Arc<dyn TempleStore>,
    pub slots: Arc<dyn SlotStore>,
    pub bookings: Arc<dyn BookingStore>,
    pub simulations: Arc<dyn SimulationStore>,
}

impl Repository {
    /// Create a repository backed by the given Postgres pool
    pub fn postgres(pool: Pool<Postgres>) -> Self {
        Self {
            temples: Arc::new(temples::TemplesRepository::new(pool.clone())),
            slots: Arc::new(slots::SlotsRepository::new(pool.clone())),
            bookings: Arc::new(bookings::BookingsRepository::new(pool.clone())),
            simulations: Arc::new(simulations::SimulationsRepository::new(pool)),
        }
    }

    /// Create a repository backed by a shared in-memory store
    pub fn in_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            temples: store.clone(),
            slots: store.clone(),
            bookings: store.clone(),
            simulations: store,
        }
    }
}
