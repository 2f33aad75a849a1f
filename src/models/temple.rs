//! Temple model (the subset the booking and crowd core reads)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Temple record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Temple {
    pub id: i32,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Visitors admitted per slot; also the reference capacity for crowd ratios
    pub max_visitors_per_slot: i32,
    pub total_daily_capacity: i32,
    /// Slot length in minutes
    pub slot_duration_minutes: i32,
    pub is_open: bool,
    pub current_occupancy: i32,
    pub status_updated_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// Coarse three-level crowd indicator shown on temple status cards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CrowdLevel {
    Low,
    Medium,
    High,
}

impl Temple {
    /// Current occupancy as a rounded percentage of per-slot capacity
    pub fn occupancy_percentage(&self) -> i32 {
        if self.max_visitors_per_slot <= 0 {
            return 0;
        }
        (f64::from(self.current_occupancy) / f64::from(self.max_visitors_per_slot) * 100.0).round()
            as i32
    }

    pub fn crowd_level(&self) -> CrowdLevel {
        match self.occupancy_percentage() {
            p if p < 30 => CrowdLevel::Low,
            p if p < 70 => CrowdLevel::Medium,
            _ => CrowdLevel::High,
        }
    }
}

/// Live status snapshot of a temple
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TempleStatus {
    pub temple_id: i32,
    pub is_open: bool,
    pub current_occupancy: i32,
    pub occupancy_percentage: i32,
    pub crowd_level: CrowdLevel,
    pub capacity: i32,
    pub last_updated: Option<DateTime<Utc>>,
}

impl From<&Temple> for TempleStatus {
    fn from(t: &Temple) -> Self {
        Self {
            temple_id: t.id,
            is_open: t.is_open,
            current_occupancy: t.current_occupancy,
            occupancy_percentage: t.occupancy_percentage(),
            crowd_level: t.crowd_level(),
            capacity: t.max_visitors_per_slot,
            last_updated: t.status_updated_at,
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_temple(id: i32, capacity: i32) -> Temple {
    Temple {
        id,
        name: format!("Temple {}", id),
        latitude: 25.3176,
        longitude: 82.9739,
        max_visitors_per_slot: capacity,
        total_daily_capacity: capacity * 20,
        slot_duration_minutes: 30,
        is_open: true,
        current_occupancy: 0,
        status_updated_at: None,
        is_active: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crowd_level_thresholds() {
        let mut t = sample_temple(1, 100);
        t.current_occupancy = 29;
        assert_eq!(t.crowd_level(), CrowdLevel::Low);
        t.current_occupancy = 30;
        assert_eq!(t.crowd_level(), CrowdLevel::Medium);
        t.current_occupancy = 70;
        assert_eq!(t.crowd_level(), CrowdLevel::High);
    }
}
