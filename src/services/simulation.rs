//! Crowd simulation: per temple-day hourly records, ingestion and live status

use std::sync::Arc;

use chrono::{NaiveDate, Timelike};
use tokio::sync::broadcast;
use validator::Validate;

use crate::{
    config::SimulationConfig,
    error::{AppError, AppResult},
    models::{
        crowd::{
            Alert, AreaOccupancy, CrowdSimulation, CurrentCrowdStatus, Density, Heatmap,
            HeatmapArea, HourlyCrowdRecord, ImpactLevel, NewAlert, NewCrowdSimulation, PeakHour,
            SimulationUpdate, SimulationUpdateResult, SimulationView, WeatherCondition,
            WeatherImpact,
        },
        temple::{Temple, TempleStatus},
    },
    repository::Repository,
};

use super::{
    alerts::AlertEngine,
    broadcast::{StatusEvent, TempleBroadcaster, TempleEvent},
    clock::Clock,
    crowd::{classify_area_density, classify_density, estimate_wait_minutes, overall_density},
    slots::parse_date,
};

const MAIN_AREA: &str = "Main Temple";
const QUEUE_AREA: &str = "Queue Area";

fn is_peak(hour: u8) -> bool {
    (8..=10).contains(&hour) || (18..=20).contains(&hour)
}

/// Generated day used until real readings arrive
pub fn baseline_day(temple: &Temple, date: NaiveDate, open_hour: u8, close_hour: u8) -> NewCrowdSimulation {
    let capacity = temple.max_visitors_per_slot;
    let base = (f64::from(capacity) * 0.3).floor() as i32;
    let queue_capacity = (f64::from(capacity) * 0.5).floor() as i32;

    let hourly = (open_hour..=close_hour.min(23))
        .map(|hour| HourlyCrowdRecord {
            hour,
            expected_visitors: if is_peak(hour) { base * 2 } else { base },
            actual_visitors: 0,
            crowd_density: Density::Low,
            wait_time: 0,
            areas: vec![
                AreaOccupancy {
                    name: MAIN_AREA.to_string(),
                    latitude: Some(temple.latitude),
                    longitude: Some(temple.longitude),
                    capacity,
                    current_occupancy: 0,
                    density_level: Density::Low,
                },
                AreaOccupancy {
                    name: QUEUE_AREA.to_string(),
                    latitude: Some(temple.latitude + 0.001),
                    longitude: Some(temple.longitude + 0.001),
                    capacity: queue_capacity,
                    current_occupancy: 0,
                    density_level: Density::Low,
                },
            ],
        })
        .collect();

    NewCrowdSimulation {
        temple_id: temple.id,
        sim_date: date,
        hourly,
        peak_hours: vec![
            PeakHour {
                start_hour: 8,
                end_hour: 10,
                expected_crowd: capacity * 2,
                reason: "Morning prayers".to_string(),
            },
            PeakHour {
                start_hour: 18,
                end_hour: 20,
                expected_crowd: capacity * 2,
                reason: "Evening aarti".to_string(),
            },
        ],
        weather_impact: Some(WeatherImpact {
            condition: WeatherCondition::Sunny,
            temperature: 25.0,
            impact_level: ImpactLevel::None,
            expected_reduction: 0.0,
        }),
    }
}

/// Write an ingestion update into the day's hourly record, creating the hour if absent
pub fn apply_update(day: &mut CrowdSimulation, update: &SimulationUpdate, capacity: i32) {
    let record = day
        .hourly
        .entry(update.hour)
        .or_insert_with(|| HourlyCrowdRecord {
            hour: update.hour,
            expected_visitors: 0,
            actual_visitors: 0,
            crowd_density: Density::Low,
            wait_time: 0,
            areas: Vec::new(),
        });

    record.expected_visitors = update.expected_visitors;
    record.actual_visitors = update.actual_visitors;
    record.crowd_density = classify_density(update.actual_visitors, update.expected_visitors);
    record.wait_time = estimate_wait_minutes(update.actual_visitors, capacity);

    if let Some(areas) = &update.areas {
        record.areas = areas
            .iter()
            .map(|a| AreaOccupancy {
                name: a.name.clone(),
                latitude: a.latitude,
                longitude: a.longitude,
                capacity: a.capacity,
                current_occupancy: a.current_occupancy,
                density_level: classify_area_density(a.current_occupancy, a.capacity),
            })
            .collect();
    }
    if let Some(weather) = &update.weather_impact {
        day.weather_impact = Some(weather.clone());
    }
}

fn current_status(day: &CrowdSimulation, hour: u8) -> CurrentCrowdStatus {
    let record = day.hourly.get(&hour);
    CurrentCrowdStatus {
        hour,
        crowd_density: overall_density(record.map(|r| (r.actual_visitors, r.expected_visitors))),
        expected_visitors: record.map_or(0, |r| r.expected_visitors),
        actual_visitors: record.map_or(0, |r| r.actual_visitors),
        wait_time: record.map_or(0, |r| r.wait_time),
    }
}

fn percentage(occupancy: i32, capacity: i32) -> i32 {
    if capacity <= 0 {
        return 0;
    }
    (f64::from(occupancy) / f64::from(capacity) * 100.0).round() as i32
}

#[derive(Clone)]
pub struct SimulationService {
    repository: Repository,
    alerts: AlertEngine,
    broadcaster: TempleBroadcaster,
    clock: Arc<dyn Clock>,
    config: SimulationConfig,
}

impl SimulationService {
    pub fn new(
        repository: Repository,
        broadcaster: TempleBroadcaster,
        clock: Arc<dyn Clock>,
        config: SimulationConfig,
    ) -> Self {
        let alerts = AlertEngine::new(
            repository.simulations.clone(),
            clock.clone(),
            config.max_commit_attempts,
        );
        Self {
            repository,
            alerts,
            broadcaster,
            clock,
            config,
        }
    }

    fn current_hour(&self) -> u8 {
        self.clock.local_now().hour() as u8
    }

    async fn temple(&self, id: i32) -> AppResult<Temple> {
        self.repository
            .temples
            .get(id)
            .await?
            .filter(|t| t.is_active)
            .ok_or_else(|| AppError::NotFound("Temple not found".to_string()))
    }

    /// The temple-day, generating the baseline on first access
    async fn ensure_day(&self, temple: &Temple, date: NaiveDate) -> AppResult<CrowdSimulation> {
        if let Some(day) = self.repository.simulations.find_day(temple.id, date).await? {
            return Ok(day);
        }
        let baseline = baseline_day(temple, date, self.config.open_hour, self.config.close_hour);
        let day = self.repository.simulations.insert_day(&baseline).await?;
        tracing::debug!(temple_id = temple.id, date = %date, "Baseline simulation generated");
        Ok(day)
    }

    /// Simulation view for a day (today when `date` is absent)
    pub async fn get_day(&self, temple_id: i32, date: Option<&str>) -> AppResult<SimulationView> {
        let temple = self.temple(temple_id).await?;
        let date = match date {
            Some(d) => parse_date(d, "Date")?,
            None => self.clock.local_now().date(),
        };
        let day = self.ensure_day(&temple, date).await?;
        let hour = self.current_hour();

        Ok(SimulationView {
            temple_id: temple.id,
            temple_name: temple.name.clone(),
            capacity: temple.max_visitors_per_slot,
            date,
            current_status: current_status(&day, hour),
            hourly_data: day.hourly.values().cloned().collect(),
            peak_hours: day.peak_hours.clone(),
            alerts: day.active_alerts().cloned().collect(),
            weather_impact: day.weather_impact.clone(),
            areas: day
                .hourly
                .get(&hour)
                .map(|r| r.areas.clone())
                .unwrap_or_default(),
        })
    }

    /// Ingest an hourly reading for today
    ///
    /// Alerts are evaluated against the current hour's record, which is not
    /// necessarily the hour being written.
    pub async fn update(&self, temple_id: i32, update: SimulationUpdate) -> AppResult<SimulationUpdateResult> {
        update.validate()?;
        let temple = self.temple(temple_id).await?;
        let capacity = temple.max_visitors_per_slot;
        let today = self.clock.local_now().date();
        let hour = self.current_hour();

        let mut committed = None;
        for attempt in 1..=self.config.max_commit_attempts.max(1) {
            let mut day = self.ensure_day(&temple, today).await?;
            apply_update(&mut day, &update, capacity);

            let raised = day
                .hourly
                .get(&hour)
                .map(|record| AlertEngine::evaluate(&day, record, capacity))
                .unwrap_or_default();

            if let Some(result) = self
                .repository
                .simulations
                .commit_day(&day, &raised, self.clock.now())
                .await?
            {
                committed = Some(result);
                break;
            }
            tracing::debug!(temple_id, attempt, "Simulation day changed during update, retrying");
        }
        let (day, created) = committed.ok_or_else(|| {
            AppError::Transient(format!(
                "Simulation day for temple {} is under heavy contention",
                temple_id
            ))
        })?;

        let now = self.clock.now();
        let temple = self
            .repository
            .temples
            .set_current_occupancy(temple.id, update.actual_visitors, now)
            .await?
            .ok_or_else(|| AppError::NotFound("Temple not found".to_string()))?;

        let status = current_status(&day, hour);
        self.broadcaster
            .publish(
                temple.id,
                TempleEvent::Status(StatusEvent {
                    is_open: temple.is_open,
                    current_occupancy: temple.current_occupancy,
                    occupancy_percentage: temple.occupancy_percentage(),
                    crowd_level: status.crowd_density,
                    last_updated: now,
                    capacity,
                }),
            )
            .await;
        for alert in &created {
            self.broadcaster
                .publish(temple.id, TempleEvent::Alert(alert.clone()))
                .await;
        }

        tracing::info!(
            temple_id,
            hour = update.hour,
            actual = update.actual_visitors,
            alerts = created.len(),
            "Crowd data updated"
        );
        Ok(SimulationUpdateResult {
            current_status: status,
            created_alerts: created,
        })
    }

    /// Per-area occupancy for an hour of today (current hour by default)
    pub async fn heatmap(&self, temple_id: i32, hour: Option<u8>) -> AppResult<Heatmap> {
        let hour = hour.unwrap_or_else(|| self.current_hour());
        if hour > 23 {
            return Err(AppError::Validation("Hour must be between 0 and 23".to_string()));
        }
        let temple = self.temple(temple_id).await?;
        let today = self.clock.local_now().date();

        let areas = self
            .repository
            .simulations
            .find_day(temple.id, today)
            .await?
            .and_then(|day| day.hourly.get(&hour).map(|r| r.areas.clone()))
            .unwrap_or_default()
            .into_iter()
            .map(|a| HeatmapArea {
                occupancy_percentage: percentage(a.current_occupancy, a.capacity),
                name: a.name,
                latitude: a.latitude,
                longitude: a.longitude,
                density: a.density_level,
                occupancy: a.current_occupancy,
                capacity: a.capacity,
            })
            .collect();

        Ok(Heatmap {
            temple_id: temple.id,
            temple_name: temple.name,
            latitude: temple.latitude,
            longitude: temple.longitude,
            hour,
            areas,
        })
    }

    pub async fn temple_status(&self, temple_id: i32) -> AppResult<TempleStatus> {
        let temple = self.temple(temple_id).await?;
        Ok(TempleStatus::from(&temple))
    }

    /// Add a manual alert to today's simulation and push it to subscribers
    pub async fn add_alert(&self, temple_id: i32, alert: NewAlert) -> AppResult<Alert> {
        alert.validate()?;
        let temple = self.temple(temple_id).await?;
        let today = self.clock.local_now().date();
        self.ensure_day(&temple, today).await?;

        let created = self.alerts.add(temple.id, today, alert).await?;
        self.broadcaster
            .publish(temple.id, TempleEvent::Alert(created.clone()))
            .await;
        Ok(created)
    }

    pub async fn resolve_alert(&self, temple_id: i32, alert_id: i32) -> AppResult<Alert> {
        self.alerts.resolve(temple_id, alert_id).await
    }

    /// Live event feed of a temple
    pub async fn subscribe(&self, temple_id: i32) -> AppResult<broadcast::Receiver<TempleEvent>> {
        let temple = self.temple(temple_id).await?;
        Ok(self.broadcaster.subscribe(temple.id).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{
            crowd::{AlertType, AreaReading, Severity},
            temple::sample_temple,
        },
        repository::MemoryStore,
        services::clock::FixedClock,
    };

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 1, 15).unwrap()
    }

    async fn service() -> SimulationService {
        let store = Arc::new(MemoryStore::new());
        store.add_temple(sample_temple(1, 100)).await;
        let clock = FixedClock::new(today().and_hms_opt(10, 30, 0).unwrap());
        SimulationService::new(
            Repository::in_memory(store),
            TempleBroadcaster::new(16),
            Arc::new(clock),
            SimulationConfig::default(),
        )
    }

    fn reading(hour: u8, expected: i32, actual: i32) -> SimulationUpdate {
        SimulationUpdate {
            hour,
            expected_visitors: expected,
            actual_visitors: actual,
            areas: None,
            weather_impact: None,
        }
    }

    #[test]
    fn test_baseline_day_shape() {
        let temple = sample_temple(1, 100);
        let day = baseline_day(&temple, today(), 6, 22);
        assert_eq!(day.hourly.len(), 17);
        assert_eq!(day.hourly[0].hour, 6);
        assert_eq!(day.hourly[0].expected_visitors, 30);
        let nine = day.hourly.iter().find(|r| r.hour == 9).unwrap();
        assert_eq!(nine.expected_visitors, 60);
        assert_eq!(nine.areas[1].name, "Queue Area");
        assert_eq!(nine.areas[1].capacity, 50);
        assert_eq!(day.peak_hours[1].reason, "Evening aarti");
        assert_eq!(day.peak_hours[1].expected_crowd, 200);
    }

    #[tokio::test]
    async fn test_get_day_generates_baseline_once() {
        let svc = service().await;
        let first = svc.get_day(1, None).await.unwrap();
        assert_eq!(first.date, today());
        assert_eq!(first.current_status.hour, 10);
        assert_eq!(first.current_status.expected_visitors, 60);
        assert_eq!(first.current_status.crowd_density, Density::Low);
        assert_eq!(first.areas.len(), 2);

        svc.update(1, reading(10, 60, 40)).await.unwrap();
        let again = svc.get_day(1, Some("2030-01-15")).await.unwrap();
        assert_eq!(again.current_status.actual_visitors, 40);
        assert_eq!(again.hourly_data.len(), first.hourly_data.len());

        assert!(matches!(svc.get_day(1, Some("15/01/2030")).await, Err(AppError::Validation(_))));
        assert!(matches!(svc.get_day(9, None).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_raises_alerts_and_broadcasts() {
        let svc = service().await;
        let mut events = svc.subscribe(1).await.unwrap();

        let result = svc.update(1, reading(10, 60, 95)).await.unwrap();
        assert_eq!(result.current_status.crowd_density, Density::Critical);
        assert_eq!(result.current_status.wait_time, 30);
        assert_eq!(result.created_alerts.len(), 1);
        assert_eq!(result.created_alerts[0].severity, Severity::High);

        match events.recv().await.unwrap() {
            TempleEvent::Status(status) => {
                assert_eq!(status.current_occupancy, 95);
                assert_eq!(status.occupancy_percentage, 95);
                assert_eq!(status.crowd_level, Density::Critical);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(matches!(events.recv().await.unwrap(), TempleEvent::Alert(_)));

        // Same reading again: the high alert is already active
        let repeat = svc.update(1, reading(10, 60, 95)).await.unwrap();
        assert!(repeat.created_alerts.is_empty());

        assert_eq!(svc.temple_status(1).await.unwrap().current_occupancy, 95);
    }

    #[tokio::test]
    async fn test_other_hour_update_evaluates_current_hour() {
        let svc = service().await;
        // Hour 14 is over capacity but the current hour (10) is empty
        let result = svc.update(1, reading(14, 30, 150)).await.unwrap();
        assert!(result.created_alerts.is_empty());
        assert_eq!(result.current_status.hour, 10);
    }

    #[tokio::test]
    async fn test_heatmap_reports_area_percentages() {
        let svc = service().await;
        assert!(svc.heatmap(1, Some(10)).await.unwrap().areas.is_empty());

        let mut update = reading(10, 60, 70);
        update.areas = Some(vec![AreaReading {
            name: "Main Temple".into(),
            latitude: None,
            longitude: None,
            capacity: 80,
            current_occupancy: 60,
        }]);
        svc.update(1, update).await.unwrap();

        let heatmap = svc.heatmap(1, None).await.unwrap();
        assert_eq!(heatmap.hour, 10);
        assert_eq!(heatmap.areas.len(), 1);
        assert_eq!(heatmap.areas[0].occupancy_percentage, 75);
        assert_eq!(heatmap.areas[0].density, Density::High);
        assert!(matches!(svc.heatmap(1, Some(24)).await, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_manual_alert_lifecycle() {
        let svc = service().await;
        let alert = svc
            .add_alert(
                1,
                NewAlert {
                    alert_type: AlertType::Weather,
                    severity: Severity::Medium,
                    message: "Heavy rain expected after 16:00".into(),
                    affected_areas: vec!["Queue Area".into()],
                },
            )
            .await
            .unwrap();
        assert_eq!(svc.get_day(1, None).await.unwrap().alerts.len(), 1);

        let resolved = svc.resolve_alert(1, alert.id).await.unwrap();
        assert!(!resolved.is_active);
        assert!(svc.get_day(1, None).await.unwrap().alerts.is_empty());
        assert!(matches!(svc.resolve_alert(1, 999).await, Err(AppError::NotFound(_))));
    }
}
