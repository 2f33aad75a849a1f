//! Alert engine: overcrowding detection and the alert lifecycle

use std::sync::Arc;

use chrono::NaiveDate;

use crate::{
    error::{AppError, AppResult},
    models::crowd::{Alert, AlertType, CrowdSimulation, HourlyCrowdRecord, NewAlert, Severity},
    repository::SimulationStore,
};

use super::clock::Clock;

/// Occupancy ratio above which a high overcrowding alert is raised
pub const HIGH_OCCUPANCY_RATIO: f64 = 0.9;
/// Occupancy ratio above which a critical overcrowding alert is raised
pub const CRITICAL_OCCUPANCY_RATIO: f64 = 1.1;

#[derive(Clone)]
pub struct AlertEngine {
    simulations: Arc<dyn SimulationStore>,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
}

impl AlertEngine {
    pub fn new(simulations: Arc<dyn SimulationStore>, clock: Arc<dyn Clock>, max_attempts: u32) -> Self {
        Self {
            simulations,
            clock,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Alerts to raise for `record` given the day's current alerts
    ///
    /// A high alert is raised when no overcrowding alert is active; a critical one
    /// when no critical overcrowding alert is active. Both may be active together.
    /// Nothing is ever resolved here.
    pub fn evaluate(day: &CrowdSimulation, record: &HourlyCrowdRecord, capacity: i32) -> Vec<NewAlert> {
        if capacity <= 0 {
            return Vec::new();
        }
        let ratio = f64::from(record.actual_visitors) / f64::from(capacity);
        let percent = (ratio * 100.0).round() as i64;
        let mut raised = Vec::new();

        if ratio > HIGH_OCCUPANCY_RATIO && !day.has_active_alert(AlertType::Overcrowding, None) {
            raised.push(NewAlert {
                alert_type: AlertType::Overcrowding,
                severity: Severity::High,
                message: format!(
                    "Temple is at {}% capacity. Consider crowd control measures.",
                    percent
                ),
                affected_areas: vec!["Main Temple".to_string()],
            });
        }

        if ratio > CRITICAL_OCCUPANCY_RATIO
            && !day.has_active_alert(AlertType::Overcrowding, Some(Severity::Critical))
        {
            raised.push(NewAlert {
                alert_type: AlertType::Overcrowding,
                severity: Severity::Critical,
                message: format!(
                    "CRITICAL: Temple is over capacity at {}%. Immediate action required.",
                    percent
                ),
                affected_areas: vec!["Main Temple".to_string(), "Queue Area".to_string()],
            });
        }

        raised
    }

    /// Append a manual alert to a simulation day. Manual alerts are never deduplicated.
    pub async fn add(&self, temple_id: i32, date: NaiveDate, alert: NewAlert) -> AppResult<Alert> {
        for attempt in 1..=self.max_attempts {
            let day = self
                .simulations
                .find_day(temple_id, date)
                .await?
                .ok_or_else(|| AppError::NotFound("Simulation not found".to_string()))?;

            let committed = self
                .simulations
                .commit_day(&day, std::slice::from_ref(&alert), self.clock.now())
                .await?;
            if let Some((_, mut created)) = committed {
                let created = created.pop().ok_or_else(|| {
                    AppError::Internal("Alert insert returned no row".to_string())
                })?;
                tracing::info!(
                    temple_id,
                    alert_id = created.id,
                    severity = %created.severity,
                    "Alert created"
                );
                return Ok(created);
            }
            tracing::debug!(temple_id, attempt, "Simulation day changed while adding alert");
        }
        Err(AppError::Transient(format!(
            "Simulation day for temple {} is under heavy contention",
            temple_id
        )))
    }

    /// Resolve an alert of the temple
    ///
    /// Resolving an already resolved alert succeeds and leaves `resolved_at` as it was.
    pub async fn resolve(&self, temple_id: i32, alert_id: i32) -> AppResult<Alert> {
        let alert = self
            .simulations
            .get_alert(temple_id, alert_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Alert with id {} not found", alert_id)))?;

        if !alert.is_active {
            return Ok(alert);
        }

        match self.simulations.resolve_alert(alert_id, self.clock.now()).await? {
            Some(resolved) => {
                tracing::info!(temple_id, alert_id, "Alert resolved");
                Ok(resolved)
            }
            // Resolved concurrently; report the stored state
            None => self
                .simulations
                .get_alert(temple_id, alert_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Alert with id {} not found", alert_id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::crowd::{Density, NewCrowdSimulation};
    use crate::repository::MemoryStore;
    use crate::services::clock::FixedClock;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn day() -> CrowdSimulation {
        CrowdSimulation {
            id: 1,
            temple_id: 1,
            sim_date: NaiveDate::from_ymd_opt(2030, 1, 15).unwrap(),
            hourly: BTreeMap::new(),
            peak_hours: Vec::new(),
            weather_impact: None,
            alerts: BTreeMap::new(),
            version: 0,
        }
    }

    fn record(actual: i32) -> HourlyCrowdRecord {
        HourlyCrowdRecord {
            hour: 10,
            expected_visitors: 100,
            actual_visitors: actual,
            crowd_density: Density::High,
            wait_time: 30,
            areas: Vec::new(),
        }
    }

    fn activate(day: &mut CrowdSimulation, raised: Vec<NewAlert>) {
        for alert in raised {
            let id = day.alerts.len() as i32 + 1;
            day.alerts.insert(
                id,
                Alert {
                    id,
                    simulation_id: day.id,
                    alert_type: alert.alert_type,
                    severity: alert.severity,
                    message: alert.message,
                    affected_areas: alert.affected_areas,
                    is_active: true,
                    created_at: chrono::Utc::now(),
                    resolved_at: None,
                },
            );
        }
    }

    #[test]
    fn test_high_alert_is_deduplicated() {
        let mut day = day();
        let raised = AlertEngine::evaluate(&day, &record(95), 100);
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].severity, Severity::High);
        assert_eq!(
            raised[0].message,
            "Temple is at 95% capacity. Consider crowd control measures."
        );
        activate(&mut day, raised);

        assert!(AlertEngine::evaluate(&day, &record(95), 100).is_empty());
    }

    #[test]
    fn test_critical_alert_coexists_with_high() {
        let mut day = day();
        let raised = AlertEngine::evaluate(&day, &record(115), 100);
        let severities: Vec<Severity> = raised.iter().map(|a| a.severity).collect();
        assert_eq!(severities, vec![Severity::High, Severity::Critical]);
        activate(&mut day, raised);

        assert_eq!(day.active_alerts().count(), 2);
        assert!(AlertEngine::evaluate(&day, &record(115), 100).is_empty());
    }

    #[test]
    fn test_below_threshold_raises_nothing() {
        let day = day();
        assert!(AlertEngine::evaluate(&day, &record(90), 100).is_empty());
        assert!(AlertEngine::evaluate(&day, &record(10), 0).is_empty());
    }

    #[tokio::test]
    async fn test_resolve_twice_keeps_first_timestamp() {
        let store = Arc::new(MemoryStore::new());
        let date = NaiveDate::from_ymd_opt(2030, 1, 15).unwrap();
        store
            .insert_day(&NewCrowdSimulation {
                temple_id: 1,
                sim_date: date,
                hourly: Vec::new(),
                peak_hours: Vec::new(),
                weather_impact: None,
            })
            .await
            .unwrap();

        let first_clock = Arc::new(FixedClock::new(date.and_hms_opt(10, 0, 0).unwrap()));
        let engine = AlertEngine::new(store.clone(), first_clock, 4);
        let alert = engine
            .add(
                1,
                date,
                NewAlert {
                    alert_type: AlertType::Emergency,
                    severity: Severity::Medium,
                    message: "Medical team requested at gate 2".into(),
                    affected_areas: vec![],
                },
            )
            .await
            .unwrap();
        assert!(alert.is_active);

        let resolved = engine.resolve(1, alert.id).await.unwrap();
        assert!(!resolved.is_active);
        let first_resolved_at = resolved.resolved_at;
        assert!(first_resolved_at.is_some());

        let later_clock = Arc::new(FixedClock::new(date.and_hms_opt(12, 0, 0).unwrap()));
        let later = AlertEngine::new(store.clone(), later_clock, 4);
        let again = later.resolve(1, alert.id).await.unwrap();
        assert_eq!(again.resolved_at, first_resolved_at);

        // Other temples cannot see the alert
        assert!(matches!(later.resolve(2, alert.id).await, Err(AppError::NotFound(_))));
    }
}
