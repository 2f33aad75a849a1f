//! In-memory store backend
//!
//! Used for the `memory` storage backend and by the service tests. Each slot sits
//! behind its own mutex so counter writes on different slots never contend.
//! Cancellation takes the slot lock before the bookings lock.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::types::Json;
use tokio::sync::{Mutex, RwLock};

use super::{
    overlap_conflict, BookingStore, CancelOutcome, SimulationStore, SlotSettingsWrite, SlotStore,
    SlotWrite, TempleStore,
};
use crate::{
    error::{AppError, AppResult},
    models::{
        booking::{Booking, BookingStatus, CheckIn, CheckOut, NewBooking},
        crowd::{Alert, CrowdSimulation, NewAlert, NewCrowdSimulation},
        slot::{NewSlot, Slot, SlotStatus},
        temple::Temple,
    },
};

#[derive(Default)]
struct BookingTable {
    by_id: BTreeMap<i32, Booking>,
    refs: HashMap<String, i32>,
}

#[derive(Default)]
struct SimulationTable {
    days: HashMap<(i32, NaiveDate), CrowdSimulation>,
    /// alert id -> owning day
    alert_days: HashMap<i32, (i32, NaiveDate)>,
}

pub struct MemoryStore {
    temples: RwLock<HashMap<i32, Temple>>,
    slots: RwLock<HashMap<i32, Arc<Mutex<Slot>>>>,
    bookings: Mutex<BookingTable>,
    simulations: Mutex<SimulationTable>,
    next_temple_id: AtomicI32,
    next_slot_id: AtomicI32,
    next_booking_id: AtomicI32,
    next_simulation_id: AtomicI32,
    next_alert_id: AtomicI32,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            temples: RwLock::new(HashMap::new()),
            slots: RwLock::new(HashMap::new()),
            bookings: Mutex::new(BookingTable::default()),
            simulations: Mutex::new(SimulationTable::default()),
            next_temple_id: AtomicI32::new(1),
            next_slot_id: AtomicI32::new(1),
            next_booking_id: AtomicI32::new(1),
            next_simulation_id: AtomicI32::new(1),
            next_alert_id: AtomicI32::new(1),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a temple. A zero id is replaced by the next free one.
    pub async fn add_temple(&self, mut temple: Temple) -> Temple {
        if temple.id == 0 {
            temple.id = self.next_temple_id.fetch_add(1, Ordering::SeqCst);
        } else {
            self.next_temple_id.fetch_max(temple.id + 1, Ordering::SeqCst);
        }
        self.temples.write().await.insert(temple.id, temple.clone());
        temple
    }

    /// Store seeded with one open demo temple (id 1)
    pub async fn with_demo_temple() -> Self {
        let store = Self::new();
        store
            .add_temple(Temple {
                id: 1,
                name: "Sri Kashi Vishwanath".to_string(),
                latitude: 25.3109,
                longitude: 83.0107,
                max_visitors_per_slot: 100,
                total_daily_capacity: 3200,
                slot_duration_minutes: 30,
                is_open: true,
                current_occupancy: 0,
                status_updated_at: None,
                is_active: true,
            })
            .await;
        store
    }

    async fn slot_cell(&self, id: i32) -> Option<Arc<Mutex<Slot>>> {
        self.slots.read().await.get(&id).cloned()
    }

    async fn snapshot_slots(&self) -> Vec<Slot> {
        let cells: Vec<Arc<Mutex<Slot>>> = self.slots.read().await.values().cloned().collect();
        let mut slots = Vec::with_capacity(cells.len());
        for cell in cells {
            slots.push(cell.lock().await.clone());
        }
        slots
    }
}

fn apply_counter(slot: &mut Slot, write: &SlotWrite) -> AppResult<()> {
    if write.booked_count < 0 || write.booked_count > slot.capacity {
        return Err(AppError::Internal(format!(
            "Booked count {} out of range for slot {}",
            write.booked_count, slot.id
        )));
    }
    slot.booked_count = write.booked_count;
    slot.status = write.status;
    slot.version += 1;
    slot.modif_date = Some(Utc::now());
    Ok(())
}

#[async_trait]
impl TempleStore for MemoryStore {
    async fn get(&self, id: i32) -> AppResult<Option<Temple>> {
        Ok(self.temples.read().await.get(&id).cloned())
    }

    async fn set_current_occupancy(
        &self,
        id: i32,
        occupancy: i32,
        at: DateTime<Utc>,
    ) -> AppResult<Option<Temple>> {
        let mut temples = self.temples.write().await;
        Ok(temples.get_mut(&id).map(|t| {
            t.current_occupancy = occupancy;
            t.status_updated_at = Some(at);
            t.clone()
        }))
    }
}

#[async_trait]
impl SlotStore for MemoryStore {
    async fn get(&self, id: i32) -> AppResult<Option<Slot>> {
        match self.slot_cell(id).await {
            Some(cell) => Ok(Some(cell.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn list(&self, temple_id: i32, from: NaiveDate, to: NaiveDate) -> AppResult<Vec<Slot>> {
        let mut slots: Vec<Slot> = self
            .snapshot_slots()
            .await
            .into_iter()
            .filter(|s| {
                s.temple_id == temple_id && s.is_active && s.slot_date >= from && s.slot_date <= to
            })
            .collect();
        slots.sort_by_key(|s| (s.slot_date, s.start_time, s.id));
        Ok(slots)
    }

    async fn find_overlapping(
        &self,
        temple_id: i32,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    ) -> AppResult<Option<Slot>> {
        let mut overlapping: Vec<Slot> = self
            .snapshot_slots()
            .await
            .into_iter()
            .filter(|s| {
                s.temple_id == temple_id
                    && s.is_active
                    && s.slot_date == date
                    && s.start_time < end
                    && s.end_time > start
            })
            .collect();
        overlapping.sort_by_key(|s| s.start_time);
        Ok(overlapping.into_iter().next())
    }

    async fn insert(&self, slots: &[NewSlot]) -> AppResult<Vec<Slot>> {
        let now = Utc::now();
        let mut table = self.slots.write().await;

        // Windows of active slots, checked and extended under the table lock
        let mut taken = Vec::with_capacity(table.len() + slots.len());
        for cell in table.values() {
            let slot = cell.lock().await;
            if slot.is_active {
                taken.push((slot.temple_id, slot.slot_date, slot.start_time, slot.end_time));
            }
        }
        for new in slots {
            let clash = taken.iter().any(|(temple_id, date, start, end)| {
                *temple_id == new.temple_id
                    && *date == new.slot_date
                    && *start < new.end_time
                    && *end > new.start_time
            });
            if clash {
                return Err(overlap_conflict(new));
            }
            taken.push((new.temple_id, new.slot_date, new.start_time, new.end_time));
        }

        let mut created = Vec::with_capacity(slots.len());
        for new in slots {
            let slot = Slot {
                id: self.next_slot_id.fetch_add(1, Ordering::SeqCst),
                temple_id: new.temple_id,
                slot_date: new.slot_date,
                start_time: new.start_time,
                end_time: new.end_time,
                capacity: new.capacity,
                booked_count: 0,
                price: new.price,
                status: SlotStatus::AVAILABLE,
                special_event: new.special_event.clone().map(Json),
                is_active: true,
                version: 0,
                crea_date: Some(now),
                modif_date: Some(now),
            };
            table.insert(slot.id, Arc::new(Mutex::new(slot.clone())));
            created.push(slot);
        }
        Ok(created)
    }

    async fn update_settings(&self, write: &SlotSettingsWrite) -> AppResult<Option<Slot>> {
        let cell = match self.slot_cell(write.slot_id).await {
            Some(cell) => cell,
            None => return Ok(None),
        };
        let mut slot = cell.lock().await;
        if slot.version != write.expected_version {
            return Ok(None);
        }
        slot.capacity = write.capacity;
        slot.price = write.price;
        slot.status = write.status;
        slot.special_event = write.special_event.clone().map(Json);
        slot.version += 1;
        slot.modif_date = Some(Utc::now());
        Ok(Some(slot.clone()))
    }

    async fn deactivate(&self, id: i32) -> AppResult<bool> {
        let cell = match self.slot_cell(id).await {
            Some(cell) => cell,
            None => return Ok(false),
        };
        let mut slot = cell.lock().await;
        slot.is_active = false;
        slot.version += 1;
        slot.modif_date = Some(Utc::now());
        Ok(true)
    }

    async fn write_counter(&self, write: &SlotWrite) -> AppResult<Option<Slot>> {
        let cell = match self.slot_cell(write.slot_id).await {
            Some(cell) => cell,
            None => return Ok(None),
        };
        let mut slot = cell.lock().await;
        if slot.version != write.expected_version {
            return Ok(None);
        }
        apply_counter(&mut slot, write)?;
        Ok(Some(slot.clone()))
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn insert(&self, booking: &NewBooking) -> AppResult<Booking> {
        let mut table = self.bookings.lock().await;
        if table.refs.contains_key(&booking.booking_ref) {
            return Err(AppError::Conflict(format!(
                "Booking reference {} already exists",
                booking.booking_ref
            )));
        }

        let now = Utc::now();
        let created = Booking {
            id: self.next_booking_id.fetch_add(1, Ordering::SeqCst),
            booking_ref: booking.booking_ref.clone(),
            user_id: booking.user_id,
            temple_id: booking.temple_id,
            slot_id: booking.slot_id,
            visitors_count: booking.visitors_count,
            visitors: Json(booking.visitors.clone()),
            contact_email: booking.contact_email.clone(),
            contact_phone: booking.contact_phone.clone(),
            total_amount: booking.total_amount,
            payment_status: booking.payment_status,
            status: BookingStatus::Confirmed,
            qr_code: booking.qr_code.clone(),
            check_in: None,
            check_out: None,
            special_requests: Json(booking.special_requests.clone()),
            crea_date: Some(now),
            modif_date: Some(now),
        };
        table.refs.insert(created.booking_ref.clone(), created.id);
        table.by_id.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get(&self, id: i32) -> AppResult<Option<Booking>> {
        Ok(self.bookings.lock().await.by_id.get(&id).cloned())
    }

    async fn get_by_ref(&self, booking_ref: &str) -> AppResult<Option<Booking>> {
        let table = self.bookings.lock().await;
        Ok(table
            .refs
            .get(booking_ref)
            .and_then(|id| table.by_id.get(id))
            .cloned())
    }

    async fn list_for_user(
        &self,
        user_id: i32,
        status: Option<BookingStatus>,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<Booking>, i64)> {
        let table = self.bookings.lock().await;
        let mut matching: Vec<&Booking> = table
            .by_id
            .values()
            .filter(|b| b.user_id == user_id && status.map_or(true, |s| b.status == s))
            .collect();
        matching.sort_by(|a, b| b.crea_date.cmp(&a.crea_date).then(b.id.cmp(&a.id)));

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn cancel(&self, booking_id: i32, release: &SlotWrite) -> AppResult<CancelOutcome> {
        let cell = match self.slot_cell(release.slot_id).await {
            Some(cell) => cell,
            None => return Ok(CancelOutcome::SlotChanged),
        };
        let mut slot = cell.lock().await;
        let mut table = self.bookings.lock().await;

        let booking = match table.by_id.get_mut(&booking_id) {
            Some(b) => b,
            None => return Ok(CancelOutcome::NotFound),
        };
        if booking.status != BookingStatus::Confirmed {
            return Ok(CancelOutcome::NotConfirmed(booking.status));
        }
        if slot.version != release.expected_version {
            return Ok(CancelOutcome::SlotChanged);
        }

        apply_counter(&mut slot, release)?;
        booking.status = BookingStatus::Cancelled;
        booking.modif_date = Some(Utc::now());

        Ok(CancelOutcome::Cancelled {
            booking: booking.clone(),
            slot: slot.clone(),
        })
    }

    async fn record_check_in(&self, id: i32, check_in: &CheckIn) -> AppResult<Option<Booking>> {
        let mut table = self.bookings.lock().await;
        Ok(table.by_id.get_mut(&id).and_then(|b| {
            if b.status != BookingStatus::Confirmed || b.check_in.is_some() {
                return None;
            }
            b.check_in = Some(Json(check_in.clone()));
            b.modif_date = Some(Utc::now());
            Some(b.clone())
        }))
    }

    async fn record_check_out(&self, id: i32, check_out: &CheckOut) -> AppResult<Option<Booking>> {
        let mut table = self.bookings.lock().await;
        Ok(table.by_id.get_mut(&id).and_then(|b| {
            if b.status != BookingStatus::Confirmed
                || b.check_in.is_none()
                || b.check_out.is_some()
            {
                return None;
            }
            b.check_out = Some(Json(check_out.clone()));
            b.status = BookingStatus::Completed;
            b.modif_date = Some(Utc::now());
            Some(b.clone())
        }))
    }
}

#[async_trait]
impl SimulationStore for MemoryStore {
    async fn find_day(&self, temple_id: i32, date: NaiveDate) -> AppResult<Option<CrowdSimulation>> {
        let table = self.simulations.lock().await;
        Ok(table.days.get(&(temple_id, date)).cloned())
    }

    async fn insert_day(&self, day: &NewCrowdSimulation) -> AppResult<CrowdSimulation> {
        let mut table = self.simulations.lock().await;
        let key = (day.temple_id, day.sim_date);
        if let Some(existing) = table.days.get(&key) {
            return Ok(existing.clone());
        }

        let sim = CrowdSimulation {
            id: self.next_simulation_id.fetch_add(1, Ordering::SeqCst),
            temple_id: day.temple_id,
            sim_date: day.sim_date,
            hourly: day.hourly.iter().map(|r| (r.hour, r.clone())).collect(),
            peak_hours: day.peak_hours.clone(),
            weather_impact: day.weather_impact.clone(),
            alerts: BTreeMap::new(),
            version: 0,
        };
        table.days.insert(key, sim.clone());
        Ok(sim)
    }

    async fn commit_day(
        &self,
        day: &CrowdSimulation,
        new_alerts: &[NewAlert],
        at: DateTime<Utc>,
    ) -> AppResult<Option<(CrowdSimulation, Vec<Alert>)>> {
        let mut table = self.simulations.lock().await;
        let key = (day.temple_id, day.sim_date);
        let stored = match table.days.get_mut(&key) {
            Some(s) if s.version == day.version => s,
            _ => return Ok(None),
        };

        stored.hourly = day.hourly.clone();
        stored.weather_impact = day.weather_impact.clone();
        stored.version += 1;

        let mut created = Vec::with_capacity(new_alerts.len());
        for alert in new_alerts {
            let alert = Alert {
                id: self.next_alert_id.fetch_add(1, Ordering::SeqCst),
                simulation_id: stored.id,
                alert_type: alert.alert_type,
                severity: alert.severity,
                message: alert.message.clone(),
                affected_areas: alert.affected_areas.clone(),
                is_active: true,
                created_at: at,
                resolved_at: None,
            };
            stored.alerts.insert(alert.id, alert.clone());
            created.push(alert);
        }
        let committed = stored.clone();

        for alert in &created {
            table.alert_days.insert(alert.id, key);
        }
        Ok(Some((committed, created)))
    }

    async fn get_alert(&self, temple_id: i32, alert_id: i32) -> AppResult<Option<Alert>> {
        let table = self.simulations.lock().await;
        Ok(table
            .alert_days
            .get(&alert_id)
            .filter(|(t, _)| *t == temple_id)
            .and_then(|key| table.days.get(key))
            .and_then(|day| day.alerts.get(&alert_id))
            .cloned())
    }

    async fn resolve_alert(&self, alert_id: i32, at: DateTime<Utc>) -> AppResult<Option<Alert>> {
        let mut table = self.simulations.lock().await;
        let key = match table.alert_days.get(&alert_id) {
            Some(key) => *key,
            None => return Ok(None),
        };
        let day = match table.days.get_mut(&key) {
            Some(day) => day,
            None => return Ok(None),
        };
        let resolved = day.alerts.get_mut(&alert_id).and_then(|alert| {
            if !alert.is_active {
                return None;
            }
            alert.is_active = false;
            alert.resolved_at = Some(at);
            Some(alert.clone())
        });
        if resolved.is_some() {
            day.version += 1;
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::booking::PaymentStatus;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn new_slot() -> NewSlot {
        NewSlot {
            temple_id: 1,
            slot_date: NaiveDate::from_ymd_opt(2030, 1, 15).unwrap(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            capacity: 10,
            price: Decimal::new(20, 0),
            special_event: None,
        }
    }

    fn new_booking(booking_ref: &str, slot_id: i32) -> NewBooking {
        NewBooking {
            booking_ref: booking_ref.to_string(),
            user_id: 7,
            temple_id: 1,
            slot_id,
            visitors_count: 2,
            visitors: Vec::new(),
            contact_email: "asha@example.org".into(),
            contact_phone: String::new(),
            total_amount: Decimal::new(40, 0),
            payment_status: PaymentStatus::Completed,
            qr_code: "qr".into(),
            special_requests: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_counter_write_rejects_stale_version() {
        let store = MemoryStore::new();
        let slot = SlotStore::insert(&store, &[new_slot()]).await.unwrap().remove(0);

        let write = SlotWrite {
            slot_id: slot.id,
            expected_version: slot.version,
            booked_count: 3,
            status: SlotStatus::AVAILABLE,
        };
        let updated = store.write_counter(&write).await.unwrap().unwrap();
        assert_eq!(updated.booked_count, 3);
        assert_eq!(updated.version, slot.version + 1);

        // Same expected version again: lost race
        assert!(store.write_counter(&write).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overlapping_insert_writes_nothing() {
        let store = MemoryStore::new();
        SlotStore::insert(&store, &[new_slot()]).await.unwrap();

        let later = NewSlot {
            start_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
            ..new_slot()
        };
        let clashing = NewSlot {
            start_time: NaiveTime::from_hms_opt(9, 15, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(9, 45, 0).unwrap(),
            ..new_slot()
        };
        let err = SlotStore::insert(&store, &[later.clone(), clashing]).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let day = NaiveDate::from_ymd_opt(2030, 1, 15).unwrap();
        assert_eq!(store.list(1, day, day).await.unwrap().len(), 1);

        // Same window inside one batch
        let err = SlotStore::insert(&store, &[later.clone(), later]).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_duplicate_booking_ref_conflicts() {
        let store = MemoryStore::new();
        BookingStore::insert(&store, &new_booking("TCMABC", 1)).await.unwrap();
        let err = BookingStore::insert(&store, &new_booking("TCMABC", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_cancel_applies_booking_and_slot_together() {
        let store = MemoryStore::new();
        let slot = SlotStore::insert(&store, &[new_slot()]).await.unwrap().remove(0);
        let slot = store
            .write_counter(&SlotWrite {
                slot_id: slot.id,
                expected_version: 0,
                booked_count: 2,
                status: SlotStatus::AVAILABLE,
            })
            .await
            .unwrap()
            .unwrap();
        let booking = BookingStore::insert(&store, &new_booking("TCMX1", slot.id))
            .await
            .unwrap();

        let stale = SlotWrite {
            slot_id: slot.id,
            expected_version: 0,
            booked_count: 0,
            status: SlotStatus::AVAILABLE,
        };
        assert!(matches!(
            store.cancel(booking.id, &stale).await.unwrap(),
            CancelOutcome::SlotChanged
        ));
        let unchanged = BookingStore::get(&store, booking.id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, BookingStatus::Confirmed);

        let release = SlotWrite {
            expected_version: slot.version,
            ..stale
        };
        match store.cancel(booking.id, &release).await.unwrap() {
            CancelOutcome::Cancelled { booking, slot } => {
                assert_eq!(booking.status, BookingStatus::Cancelled);
                assert_eq!(slot.booked_count, 0);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        assert!(matches!(
            store.cancel(booking.id, &release).await.unwrap(),
            CancelOutcome::NotConfirmed(BookingStatus::Cancelled)
        ));
    }
}
