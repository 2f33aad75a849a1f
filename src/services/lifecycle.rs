//! Slot lifecycle rules
//!
//! Pure decisions only; nothing here touches the store.

use chrono::{Duration, NaiveDateTime};

use crate::models::{
    booking::{Booking, BookingStatus},
    slot::{AutoStatus, Slot, SlotStatus},
};

/// Minimum lead time before the slot start for a cancellation
pub const CANCELLATION_CUTOFF_HOURS: i64 = 2;

/// Whether `slot` accepts a new booking of `seats` visitors at local time `now`
pub fn is_bookable(slot: &Slot, seats: i32, now: NaiveDateTime) -> bool {
    slot.status == SlotStatus::AVAILABLE
        && slot.is_active
        && slot.available_spots() >= seats
        && now < slot.start_instant()
}

/// Whether `booking` may still be cancelled at local time `now`
///
/// Exactly the cutoff before start is too late.
pub fn can_cancel(booking: &Booking, slot: &Slot, now: NaiveDateTime) -> bool {
    booking.status == BookingStatus::Confirmed
        && slot.start_instant() - now > Duration::hours(CANCELLATION_CUTOFF_HOURS)
}

/// Status implied by a booked count. Manual statuses are returned unchanged.
pub fn recompute_status(status: SlotStatus, booked_count: i32, capacity: i32) -> SlotStatus {
    match status {
        SlotStatus::Manual(_) => status,
        SlotStatus::Automatic(_) if booked_count >= capacity => {
            SlotStatus::Automatic(AutoStatus::Full)
        }
        SlotStatus::Automatic(_) => SlotStatus::Automatic(AutoStatus::Available),
    }
}
