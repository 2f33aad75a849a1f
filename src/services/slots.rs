//! Slot administration and browsing

use std::{collections::BTreeMap, sync::Arc};

use chrono::{Duration, NaiveDate, NaiveTime};
use rust_decimal::Decimal;

use crate::{
    error::{AppError, AppResult},
    models::{
        slot::{
            BulkCreateSlots, CreateSlot, NewSlot, Slot, SlotAvailability, SlotListing, SlotQuery,
            SlotStatus, SlotView, UpdateSlot,
        },
        temple::Temple,
    },
    repository::{Repository, SlotSettingsWrite},
};

use super::{
    clock::Clock,
    lifecycle::{is_bookable, recompute_status},
};

/// Longest range accepted by bulk generation, in days
const MAX_BULK_DAYS: i64 = 366;
/// Default listing window after today, in days
const DEFAULT_LISTING_DAYS: i64 = 7;

pub(crate) fn parse_date(value: &str, field: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::Validation(format!("{} must be a date (YYYY-MM-DD)", field)))
}

fn parse_time(value: &str, field: &str) -> AppResult<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| AppError::Validation(format!("{} must be a time (HH:MM)", field)))
}

fn parse_window(start: &str, end: &str) -> AppResult<(NaiveTime, NaiveTime)> {
    let start = parse_time(start, "Start time")?;
    let end = parse_time(end, "End time")?;
    if end <= start {
        return Err(AppError::Validation(
            "End time must be after start time".to_string(),
        ));
    }
    Ok((start, end))
}

fn check_capacity_and_price(capacity: i32, price: Decimal) -> AppResult<()> {
    if capacity < 1 {
        return Err(AppError::Validation("Capacity must be at least 1".to_string()));
    }
    if price < Decimal::ZERO {
        return Err(AppError::Validation("Price cannot be negative".to_string()));
    }
    Ok(())
}

/// A slot that lost an overlap race at insert time is reported like a checked overlap
fn overlap_rejected(error: AppError) -> AppError {
    match error {
        AppError::Conflict(message) => AppError::Validation(message),
        other => other,
    }
}

#[derive(Clone)]
pub struct SlotService {
    repository: Repository,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
}

impl SlotService {
    pub fn new(repository: Repository, clock: Arc<dyn Clock>, max_attempts: u32) -> Self {
        Self {
            repository,
            clock,
            max_attempts: max_attempts.max(1),
        }
    }

    async fn temple(&self, id: i32) -> AppResult<Temple> {
        self.repository
            .temples
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Temple not found".to_string()))
    }

    /// Active slot by id
    pub async fn get(&self, id: i32) -> AppResult<Slot> {
        self.repository
            .slots
            .get(id)
            .await?
            .filter(|s| s.is_active)
            .ok_or_else(|| AppError::NotFound("Slot not found".to_string()))
    }

    /// Active slots of a temple grouped by day
    ///
    /// Filters by a single `date`, else by `start_date..=end_date`, else the next
    /// seven days from today.
    pub async fn list(&self, query: &SlotQuery) -> AppResult<SlotListing> {
        let temple_id = query
            .temple
            .ok_or_else(|| AppError::Validation("Temple ID is required".to_string()))?;

        let (from, to) = match (&query.date, &query.start_date, &query.end_date) {
            (Some(date), _, _) => {
                let day = parse_date(date, "Date")?;
                (day, day)
            }
            (None, Some(start), Some(end)) => {
                (parse_date(start, "Start date")?, parse_date(end, "End date")?)
            }
            _ => {
                let today = self.clock.local_now().date();
                (today, today + Duration::days(DEFAULT_LISTING_DAYS))
            }
        };

        let now = self.clock.local_now();
        let slots = self.repository.slots.list(temple_id, from, to).await?;

        let mut grouped: BTreeMap<NaiveDate, Vec<SlotView>> = BTreeMap::new();
        for slot in &slots {
            grouped
                .entry(slot.slot_date)
                .or_default()
                .push(SlotView::new(slot, is_bookable(slot, 1, now)));
        }

        Ok(SlotListing {
            count: slots.len(),
            slots: grouped,
        })
    }

    /// Whether `visitors` seats can currently be booked on the slot
    pub async fn availability(&self, id: i32, visitors: Option<i32>) -> AppResult<SlotAvailability> {
        let slot = self.get(id).await?;
        let requested = visitors.unwrap_or(1);
        if requested < 1 {
            return Err(AppError::Validation("Visitors must be at least 1".to_string()));
        }

        Ok(SlotAvailability {
            available: is_bookable(&slot, requested, self.clock.local_now()),
            available_spots: slot.available_spots(),
            requested_spots: requested,
            capacity: slot.capacity,
            booked_count: slot.booked_count,
            status: slot.status,
        })
    }

    /// Create one slot, rejecting overlaps with active slots of the same day
    pub async fn create(&self, request: CreateSlot) -> AppResult<Slot> {
        let temple = self.temple(request.temple_id).await?;
        let date = parse_date(&request.date, "Date")?;
        let (start, end) = parse_window(&request.start_time, &request.end_time)?;
        let capacity = request.capacity.unwrap_or(temple.max_visitors_per_slot);
        let price = request.price.unwrap_or(Decimal::ZERO);
        check_capacity_and_price(capacity, price)?;

        if self
            .repository
            .slots
            .find_overlapping(temple.id, date, start, end)
            .await?
            .is_some()
        {
            return Err(AppError::Validation(
                "Slot time overlaps with existing slot".to_string(),
            ));
        }

        let new_slot = NewSlot {
            temple_id: temple.id,
            slot_date: date,
            start_time: start,
            end_time: end,
            capacity,
            price,
            special_event: request.special_event,
        };
        let slot = self
            .repository
            .slots
            .insert(std::slice::from_ref(&new_slot))
            .await
            .map_err(overlap_rejected)?
            .pop()
            .ok_or_else(|| AppError::Internal("Slot insert returned no row".to_string()))?;

        tracing::info!(slot_id = slot.id, temple_id = temple.id, date = %date, "Slot created");
        Ok(slot)
    }

    /// One slot per day per time window over an inclusive date range
    pub async fn bulk_create(&self, request: BulkCreateSlots) -> AppResult<Vec<Slot>> {
        let temple = self.temple(request.temple_id).await?;
        let start_date = parse_date(&request.start_date, "Start date")?;
        let end_date = parse_date(&request.end_date, "End date")?;
        if end_date < start_date {
            return Err(AppError::Validation(
                "End date must not be before start date".to_string(),
            ));
        }
        if (end_date - start_date).num_days() >= MAX_BULK_DAYS {
            return Err(AppError::Validation(format!(
                "Date range cannot exceed {} days",
                MAX_BULK_DAYS
            )));
        }
        if request.time_slots.is_empty() {
            return Err(AppError::Validation("At least one time slot is required".to_string()));
        }

        let capacity = request.capacity.unwrap_or(temple.max_visitors_per_slot);
        let price = request.price.unwrap_or(Decimal::ZERO);
        check_capacity_and_price(capacity, price)?;

        let mut windows = request
            .time_slots
            .iter()
            .map(|w| parse_window(&w.start_time, &w.end_time))
            .collect::<AppResult<Vec<_>>>()?;
        windows.sort();
        if windows.windows(2).any(|pair| pair[1].0 < pair[0].1) {
            return Err(AppError::Validation("Time slots overlap each other".to_string()));
        }

        let mut new_slots = Vec::new();
        for date in start_date.iter_days().take_while(|d| *d <= end_date) {
            for (start, end) in &windows {
                if self
                    .repository
                    .slots
                    .find_overlapping(temple.id, date, *start, *end)
                    .await?
                    .is_some()
                {
                    return Err(AppError::Validation(format!(
                        "Slot {} {}-{} overlaps with existing slot",
                        date,
                        start.format("%H:%M"),
                        end.format("%H:%M")
                    )));
                }
                new_slots.push(NewSlot {
                    temple_id: temple.id,
                    slot_date: date,
                    start_time: *start,
                    end_time: *end,
                    capacity,
                    price,
                    special_event: None,
                });
            }
        }

        let created = self
            .repository
            .slots
            .insert(&new_slots)
            .await
            .map_err(overlap_rejected)?;
        tracing::info!(temple_id = temple.id, count = created.len(), "Slots created in bulk");
        Ok(created)
    }

    /// Administrative update of capacity, price, status or special event
    ///
    /// `cancelled` and `maintenance` stick until `available` is set again, at which
    /// point the status follows the booked count.
    pub async fn update(&self, id: i32, request: UpdateSlot) -> AppResult<Slot> {
        if request.status == Some(SlotStatus::FULL) {
            return Err(AppError::Validation(
                "Status full is derived from bookings and cannot be set".to_string(),
            ));
        }

        for attempt in 1..=self.max_attempts {
            let slot = self.get(id).await?;
            let capacity = request.capacity.unwrap_or(slot.capacity);
            let price = request.price.unwrap_or(slot.price);
            check_capacity_and_price(capacity, price)?;
            if capacity < slot.booked_count {
                return Err(AppError::Validation(format!(
                    "Capacity cannot be lower than the {} visitors already booked",
                    slot.booked_count
                )));
            }

            let base = match request.status {
                Some(status) => status,
                None => slot.status,
            };
            let write = SlotSettingsWrite {
                slot_id: slot.id,
                expected_version: slot.version,
                capacity,
                price,
                status: recompute_status(base, slot.booked_count, capacity),
                special_event: request
                    .special_event
                    .clone()
                    .or_else(|| slot.special_event.as_ref().map(|e| e.0.clone())),
            };

            if let Some(updated) = self.repository.slots.update_settings(&write).await? {
                tracing::info!(slot_id = id, status = %updated.status, capacity, "Slot updated");
                return Ok(updated);
            }
            tracing::debug!(slot_id = id, attempt, "Slot changed during update, retrying");
        }
        Err(AppError::Transient(format!("Slot {} is under heavy contention", id)))
    }

    /// Soft delete; the slot stays referenced by its bookings
    pub async fn delete(&self, id: i32) -> AppResult<()> {
        if !self.repository.slots.deactivate(id).await? {
            return Err(AppError::NotFound("Slot not found".to_string()));
        }
        tracing::info!(slot_id = id, "Slot deactivated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{slot::TimeWindow, temple::sample_temple},
        repository::{MemoryStore, SlotStore},
        services::{clock::FixedClock, ledger::CapacityLedger},
    };

    async fn service() -> (SlotService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store.add_temple(sample_temple(1, 50)).await;
        let clock = FixedClock::new(
            NaiveDate::from_ymd_opt(2030, 1, 14)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
        );
        (
            SlotService::new(Repository::in_memory(store.clone()), Arc::new(clock), 4),
            store,
        )
    }

    fn create(date: &str, start: &str, end: &str) -> CreateSlot {
        CreateSlot {
            temple_id: 1,
            date: date.into(),
            start_time: start.into(),
            end_time: end.into(),
            capacity: None,
            price: Some(Decimal::new(25, 0)),
            special_event: None,
        }
    }

    #[tokio::test]
    async fn test_create_defaults_capacity_and_rejects_overlap() {
        let (svc, _) = service().await;
        let slot = svc.create(create("2030-01-15", "09:00", "09:30")).await.unwrap();
        assert_eq!(slot.capacity, 50);
        assert_eq!(slot.status, SlotStatus::AVAILABLE);

        let overlap = svc.create(create("2030-01-15", "09:15", "09:45")).await;
        assert!(matches!(overlap, Err(AppError::Validation(_))));

        // Touching windows do not overlap
        assert!(svc.create(create("2030-01-15", "09:30", "10:00")).await.is_ok());
        assert!(matches!(
            svc.create(create("2030-01-15", "10:00", "09:00")).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            svc.create(CreateSlot { temple_id: 9, ..create("2030-01-15", "11:00", "11:30") }).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_of_one_window_keep_one() {
        let (svc, store) = service().await;
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let svc = svc.clone();
                tokio::spawn(async move { svc.create(create("2030-01-15", "09:00", "09:30")).await })
            })
            .collect();

        let mut created = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => created += 1,
                Err(e) => assert!(matches!(e, AppError::Validation(_))),
            }
        }
        assert_eq!(created, 1);

        let day = NaiveDate::from_ymd_opt(2030, 1, 15).unwrap();
        assert_eq!(SlotStore::list(store.as_ref(), 1, day, day).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bulk_create_and_grouped_listing() {
        let (svc, _) = service().await;
        let created = svc
            .bulk_create(BulkCreateSlots {
                temple_id: 1,
                start_date: "2030-01-15".into(),
                end_date: "2030-01-17".into(),
                time_slots: vec![
                    TimeWindow { start_time: "06:00".into(), end_time: "06:30".into() },
                    TimeWindow { start_time: "06:30".into(), end_time: "07:00".into() },
                ],
                capacity: Some(20),
                price: None,
            })
            .await
            .unwrap();
        assert_eq!(created.len(), 6);

        let listing = svc
            .list(&SlotQuery {
                temple: Some(1),
                date: None,
                start_date: None,
                end_date: None,
            })
            .await
            .unwrap();
        assert_eq!(listing.count, 6);
        assert_eq!(listing.slots.len(), 3);
        let first_day = &listing.slots[&NaiveDate::from_ymd_opt(2030, 1, 15).unwrap()];
        assert_eq!(first_day[0].start_time, NaiveTime::from_hms_opt(6, 0, 0).unwrap());
        assert!(first_day[0].is_bookable);

        let single = svc
            .list(&SlotQuery {
                temple: Some(1),
                date: Some("2030-01-16".into()),
                start_date: None,
                end_date: None,
            })
            .await
            .unwrap();
        assert_eq!(single.count, 2);
    }

    #[tokio::test]
    async fn test_update_manual_status_is_sticky() {
        let (svc, store) = service().await;
        let slot = svc.create(create("2030-01-15", "09:00", "09:30")).await.unwrap();
        CapacityLedger::new(store.clone(), store.clone(), 4)
            .reserve(slot.id, 10)
            .await
            .unwrap();

        let held = svc
            .update(slot.id, UpdateSlot { status: Some(SlotStatus::MAINTENANCE), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(held.status, SlotStatus::MAINTENANCE);
        assert!(!svc.availability(slot.id, None).await.unwrap().available);

        // Shrinking to the booked count keeps the manual status
        let shrunk = svc
            .update(slot.id, UpdateSlot { capacity: Some(10), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(shrunk.status, SlotStatus::MAINTENANCE);

        let reopened = svc
            .update(slot.id, UpdateSlot { status: Some(SlotStatus::AVAILABLE), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(reopened.status, SlotStatus::FULL);

        assert!(matches!(
            svc.update(slot.id, UpdateSlot { capacity: Some(5), ..Default::default() }).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            svc.update(slot.id, UpdateSlot { status: Some(SlotStatus::FULL), ..Default::default() }).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_hides_slot() {
        let (svc, _) = service().await;
        let slot = svc.create(create("2030-01-15", "09:00", "09:30")).await.unwrap();
        svc.delete(slot.id).await.unwrap();
        assert!(matches!(svc.get(slot.id).await, Err(AppError::NotFound(_))));
        assert!(matches!(svc.delete(999).await, Err(AppError::NotFound(_))));
    }
}
