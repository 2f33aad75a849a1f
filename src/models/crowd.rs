//! Crowd simulation models (hourly records, areas, alerts)

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

// ---------------------------------------------------------------------------
// Density / Severity
// ---------------------------------------------------------------------------

/// Four-level crowd classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Density {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for Density {
    fn default() -> Self {
        Density::Low
    }
}

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("Unknown severity: {}", other)),
        }
    }
}

text_column!(Severity);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Overcrowding,
    Emergency,
    Maintenance,
    Weather,
    SpecialEvent,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Overcrowding => "overcrowding",
            AlertType::Emergency => "emergency",
            AlertType::Maintenance => "maintenance",
            AlertType::Weather => "weather",
            AlertType::SpecialEvent => "special_event",
        }
    }
}

impl std::str::FromStr for AlertType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "overcrowding" => Ok(AlertType::Overcrowding),
            "emergency" => Ok(AlertType::Emergency),
            "maintenance" => Ok(AlertType::Maintenance),
            "weather" => Ok(AlertType::Weather),
            "special_event" => Ok(AlertType::SpecialEvent),
            other => Err(format!("Unknown alert type: {}", other)),
        }
    }
}

text_column!(AlertType);

// ---------------------------------------------------------------------------
// Hourly records
// ---------------------------------------------------------------------------

/// Occupancy of a named sub-area of the temple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AreaOccupancy {
    pub name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub capacity: i32,
    pub current_occupancy: i32,
    pub density_level: Density,
}

/// One hour of one temple-day. Density and wait time are always estimator output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HourlyCrowdRecord {
    pub hour: u8,
    pub expected_visitors: i32,
    pub actual_visitors: i32,
    pub crowd_density: Density,
    /// Minutes
    pub wait_time: i32,
    pub areas: Vec<AreaOccupancy>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PeakHour {
    pub start_hour: u8,
    pub end_hour: u8,
    pub expected_crowd: i32,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum WeatherCondition {
    Sunny,
    Rainy,
    Cloudy,
    Stormy,
    Foggy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ImpactLevel {
    None,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WeatherImpact {
    pub condition: WeatherCondition,
    pub temperature: f64,
    pub impact_level: ImpactLevel,
    /// Expected crowd reduction, percent
    pub expected_reduction: f64,
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

/// Crowd alert. `resolved_at` is written once, when the alert leaves the active state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Alert {
    pub id: i32,
    pub simulation_id: i32,
    #[schema(value_type = String)]
    pub alert_type: AlertType,
    #[schema(value_type = String)]
    pub severity: Severity,
    pub message: String,
    pub affected_areas: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Alert to be appended to a simulation day
#[derive(Debug, Clone, PartialEq, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewAlert {
    pub alert_type: AlertType,
    pub severity: Severity,
    #[validate(length(min = 1, message = "Alert message is required"))]
    pub message: String,
    #[serde(default)]
    pub affected_areas: Vec<String>,
}

// ---------------------------------------------------------------------------
// CrowdSimulation
// ---------------------------------------------------------------------------

/// Per temple-day simulation: hourly records plus the alert collection
#[derive(Debug, Clone, PartialEq)]
pub struct CrowdSimulation {
    pub id: i32,
    pub temple_id: i32,
    pub sim_date: NaiveDate,
    pub hourly: BTreeMap<u8, HourlyCrowdRecord>,
    pub peak_hours: Vec<PeakHour>,
    pub weather_impact: Option<WeatherImpact>,
    pub alerts: BTreeMap<i32, Alert>,
    /// Optimistic concurrency token
    pub version: i64,
}

impl CrowdSimulation {
    pub fn active_alerts(&self) -> impl Iterator<Item = &Alert> {
        self.alerts
            .values()
            .filter(|a| a.is_active && a.resolved_at.is_none())
    }

    pub fn has_active_alert(&self, alert_type: AlertType, severity: Option<Severity>) -> bool {
        self.active_alerts().any(|a| {
            a.alert_type == alert_type && severity.map_or(true, |s| a.severity == s)
        })
    }
}

/// Values for a simulation-day insert
#[derive(Debug, Clone)]
pub struct NewCrowdSimulation {
    pub temple_id: i32,
    pub sim_date: NaiveDate,
    pub hourly: Vec<HourlyCrowdRecord>,
    pub peak_hours: Vec<PeakHour>,
    pub weather_impact: Option<WeatherImpact>,
}

// ---------------------------------------------------------------------------
// Requests / responses
// ---------------------------------------------------------------------------

/// Area reading supplied with an ingestion update
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AreaReading {
    pub name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub capacity: i32,
    #[serde(default)]
    pub current_occupancy: i32,
}

/// Hourly occupancy ingestion (admin update or synthetic feed)
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SimulationUpdate {
    #[validate(range(min = 0, max = 23, message = "Hour must be between 0 and 23"))]
    pub hour: u8,
    #[validate(range(min = 0, message = "Expected visitors cannot be negative"))]
    pub expected_visitors: i32,
    #[validate(range(min = 0, message = "Actual visitors cannot be negative"))]
    pub actual_visitors: i32,
    pub areas: Option<Vec<AreaReading>>,
    pub weather_impact: Option<WeatherImpact>,
}

/// Current-hour snapshot
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CurrentCrowdStatus {
    pub hour: u8,
    pub crowd_density: Density,
    pub expected_visitors: i32,
    pub actual_visitors: i32,
    pub wait_time: i32,
}

/// Full simulation-day view
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SimulationView {
    pub temple_id: i32,
    pub temple_name: String,
    pub capacity: i32,
    pub date: NaiveDate,
    pub current_status: CurrentCrowdStatus,
    pub hourly_data: Vec<HourlyCrowdRecord>,
    pub peak_hours: Vec<PeakHour>,
    pub alerts: Vec<Alert>,
    pub weather_impact: Option<WeatherImpact>,
    pub areas: Vec<AreaOccupancy>,
}

/// Result of an ingestion update
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SimulationUpdateResult {
    pub current_status: CurrentCrowdStatus,
    pub created_alerts: Vec<Alert>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HeatmapArea {
    pub name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub density: Density,
    pub occupancy: i32,
    pub capacity: i32,
    pub occupancy_percentage: i32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Heatmap {
    pub temple_id: i32,
    pub temple_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub hour: u8,
    pub areas: Vec<HeatmapArea>,
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct SimulationQuery {
    /// Day (YYYY-MM-DD), defaults to today
    pub date: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct HeatmapQuery {
    /// Hour 0-23, defaults to the current hour
    pub hour: Option<u8>,
}

/// Queue-based wait estimate input
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WaitEstimateRequest {
    pub current_visitors: Option<f64>,
    pub capacity_per_slot: Option<f64>,
    pub slot_duration_minutes: Option<f64>,
    pub lanes: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum QueueLevel {
    Unknown,
    Low,
    Medium,
    High,
}

/// Queue-based wait estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct QueueWaitEstimate {
    /// Minutes, absent when no service rate can be derived
    pub minutes: Option<i64>,
    pub level: QueueLevel,
}
