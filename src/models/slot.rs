//! Slot model: a bookable time window at a temple

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::{types::Json, FromRow};
use utoipa::{IntoParams, ToSchema};

// ---------------------------------------------------------------------------
// SlotStatus
// ---------------------------------------------------------------------------

/// Status derived from the booked count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoStatus {
    Available,
    Full,
}

/// Status set by an administrator; never overridden by count changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualStatus {
    Cancelled,
    Maintenance,
}

/// Slot status. Serialized as a flat string (`available`, `full`, `cancelled`, `maintenance`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    Automatic(AutoStatus),
    Manual(ManualStatus),
}

impl SlotStatus {
    pub const AVAILABLE: SlotStatus = SlotStatus::Automatic(AutoStatus::Available);
    pub const FULL: SlotStatus = SlotStatus::Automatic(AutoStatus::Full);
    pub const CANCELLED: SlotStatus = SlotStatus::Manual(ManualStatus::Cancelled);
    pub const MAINTENANCE: SlotStatus = SlotStatus::Manual(ManualStatus::Maintenance);

    pub fn as_str(&self) -> &'static str {
        match self {
            SlotStatus::Automatic(AutoStatus::Available) => "available",
            SlotStatus::Automatic(AutoStatus::Full) => "full",
            SlotStatus::Manual(ManualStatus::Cancelled) => "cancelled",
            SlotStatus::Manual(ManualStatus::Maintenance) => "maintenance",
        }
    }

    pub fn is_manual(&self) -> bool {
        matches!(self, SlotStatus::Manual(_))
    }
}

impl std::str::FromStr for SlotStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(SlotStatus::AVAILABLE),
            "full" => Ok(SlotStatus::FULL),
            "cancelled" => Ok(SlotStatus::CANCELLED),
            "maintenance" => Ok(SlotStatus::MAINTENANCE),
            other => Err(format!("Unknown slot status: {}", other)),
        }
    }
}

text_column!(SlotStatus);

impl Serialize for SlotStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SlotStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Slot
// ---------------------------------------------------------------------------

/// Optional special event attached to a slot, adding a per-visitor surcharge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SpecialEvent {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub additional_price: Decimal,
}

/// Slot record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Slot {
    pub id: i32,
    pub temple_id: i32,
    /// Calendar day of the slot
    pub slot_date: NaiveDate,
    /// Local wall-clock start time
    pub start_time: NaiveTime,
    /// Local wall-clock end time (same day)
    pub end_time: NaiveTime,
    pub capacity: i32,
    pub booked_count: i32,
    pub price: Decimal,
    #[schema(value_type = String, example = "available")]
    pub status: SlotStatus,
    #[schema(value_type = Option<SpecialEvent>)]
    pub special_event: Option<Json<SpecialEvent>>,
    pub is_active: bool,
    /// Optimistic concurrency token, bumped on every write
    pub version: i64,
    pub crea_date: Option<DateTime<Utc>>,
    pub modif_date: Option<DateTime<Utc>>,
}

impl Slot {
    pub fn available_spots(&self) -> i32 {
        (self.capacity - self.booked_count).max(0)
    }

    pub fn occupancy_percentage(&self) -> i32 {
        if self.capacity <= 0 {
            return 0;
        }
        (f64::from(self.booked_count) / f64::from(self.capacity) * 100.0).round() as i32
    }

    /// Slot date and start time combined, read as local wall-clock time
    pub fn start_instant(&self) -> NaiveDateTime {
        self.slot_date.and_time(self.start_time)
    }

    /// Per-visitor surcharge of the attached special event, zero when none
    pub fn surcharge(&self) -> Decimal {
        self.special_event
            .as_ref()
            .map(|e| e.additional_price)
            .unwrap_or(Decimal::ZERO)
    }
}

/// Values for a slot insert
#[derive(Debug, Clone)]
pub struct NewSlot {
    pub temple_id: i32,
    pub slot_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub capacity: i32,
    pub price: Decimal,
    pub special_event: Option<SpecialEvent>,
}

/// Slot as listed to pilgrims
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SlotView {
    pub id: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub capacity: i32,
    pub booked_count: i32,
    pub available_spots: i32,
    pub occupancy_percentage: i32,
    pub price: Decimal,
    #[schema(value_type = String)]
    pub status: SlotStatus,
    pub special_event: Option<SpecialEvent>,
    pub is_bookable: bool,
}

impl SlotView {
    pub fn new(slot: &Slot, is_bookable: bool) -> Self {
        Self {
            id: slot.id,
            start_time: slot.start_time,
            end_time: slot.end_time,
            capacity: slot.capacity,
            booked_count: slot.booked_count,
            available_spots: slot.available_spots(),
            occupancy_percentage: slot.occupancy_percentage(),
            price: slot.price,
            status: slot.status,
            special_event: slot.special_event.as_ref().map(|e| e.0.clone()),
            is_bookable,
        }
    }
}

/// Slots of a temple grouped by day
#[derive(Debug, Serialize, ToSchema)]
pub struct SlotListing {
    pub count: usize,
    /// Day (YYYY-MM-DD) to the slots of that day
    #[schema(value_type = Object)]
    pub slots: BTreeMap<NaiveDate, Vec<SlotView>>,
}

/// Create slot request
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSlot {
    pub temple_id: i32,
    /// Date (YYYY-MM-DD)
    pub date: String,
    /// Start time (HH:MM)
    pub start_time: String,
    /// End time (HH:MM)
    pub end_time: String,
    /// Defaults to the temple's visitors per slot
    pub capacity: Option<i32>,
    pub price: Option<Decimal>,
    pub special_event: Option<SpecialEvent>,
}

/// Time window used by bulk generation
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    /// Start time (HH:MM)
    pub start_time: String,
    /// End time (HH:MM)
    pub end_time: String,
}

/// Bulk slot generation request: one slot per day per window
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BulkCreateSlots {
    pub temple_id: i32,
    /// First day (YYYY-MM-DD)
    pub start_date: String,
    /// Last day, inclusive (YYYY-MM-DD)
    pub end_date: String,
    pub time_slots: Vec<TimeWindow>,
    pub capacity: Option<i32>,
    pub price: Option<Decimal>,
}

/// Update slot request (admin)
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSlot {
    pub capacity: Option<i32>,
    pub price: Option<Decimal>,
    /// Only `available`, `cancelled` or `maintenance` may be set explicitly
    #[schema(value_type = Option<String>)]
    pub status: Option<SlotStatus>,
    pub special_event: Option<SpecialEvent>,
}

/// Query parameters for slot listing
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct SlotQuery {
    /// Temple ID (required)
    pub temple: Option<i32>,
    /// Single day (YYYY-MM-DD)
    pub date: Option<String>,
    /// Range start (YYYY-MM-DD)
    #[serde(alias = "start_date")]
    pub start_date: Option<String>,
    /// Range end (YYYY-MM-DD)
    #[serde(alias = "end_date")]
    pub end_date: Option<String>,
}

/// Query parameters for availability checks
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct AvailabilityQuery {
    /// Requested visitors (default 1)
    pub visitors: Option<i32>,
}

/// Availability answer for a slot
#[derive(Debug, Serialize, ToSchema)]
pub struct SlotAvailability {
    pub available: bool,
    pub available_spots: i32,
    pub requested_spots: i32,
    pub capacity: i32,
    pub booked_count: i32,
    #[schema(value_type = String)]
    pub status: SlotStatus,
}

#[cfg(test)]
pub(crate) fn sample_slot(id: i32, capacity: i32, booked_count: i32) -> Slot {
    Slot {
        id,
        temple_id: 1,
        slot_date: NaiveDate::from_ymd_opt(2030, 1, 15).unwrap(),
        start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        end_time: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
        capacity,
        booked_count,
        price: Decimal::new(20, 0),
        status: if booked_count >= capacity {
            SlotStatus::FULL
        } else {
            SlotStatus::AVAILABLE
        },
        special_event: None,
        is_active: true,
        version: 0,
        crea_date: None,
        modif_date: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_string_roundtrip() {
        for s in ["available", "full", "cancelled", "maintenance"] {
            let status: SlotStatus = s.parse().unwrap();
            assert_eq!(status.as_str(), s);
        }
        assert!("closed".parse::<SlotStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_flat() {
        let json = serde_json::to_string(&SlotStatus::MAINTENANCE).unwrap();
        assert_eq!(json, "\"maintenance\"");
        let back: SlotStatus = serde_json::from_str("\"full\"").unwrap();
        assert_eq!(back, SlotStatus::FULL);
    }

    #[test]
    fn test_derived_counts() {
        let slot = sample_slot(1, 10, 8);
        assert_eq!(slot.available_spots(), 2);
        assert_eq!(slot.occupancy_percentage(), 80);

        let over = sample_slot(2, 3, 5);
        assert_eq!(over.available_spots(), 0);
    }

    #[test]
    fn test_surcharge_defaults_to_zero() {
        let mut slot = sample_slot(1, 10, 0);
        assert_eq!(slot.surcharge(), Decimal::ZERO);
        slot.special_event = Some(Json(SpecialEvent {
            name: "Maha Shivaratri".into(),
            description: None,
            additional_price: Decimal::new(15, 0),
        }));
        assert_eq!(slot.surcharge(), Decimal::new(15, 0));
    }
}
