//! Crowd simulation repository (simulation days and their alerts)

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{types::Json, FromRow, Pool, Postgres, Transaction};

use super::SimulationStore;
use crate::{
    error::{AppError, AppResult},
    models::crowd::{
        Alert, CrowdSimulation, HourlyCrowdRecord, NewAlert, NewCrowdSimulation, PeakHour,
        WeatherImpact,
    },
};

#[derive(FromRow)]
struct SimulationRow {
    id: i32,
    temple_id: i32,
    sim_date: NaiveDate,
    hourly_data: Json<Vec<HourlyCrowdRecord>>,
    peak_hours: Json<Vec<PeakHour>>,
    weather_impact: Option<Json<WeatherImpact>>,
    version: i64,
}

impl SimulationRow {
    fn into_simulation(self, alerts: Vec<Alert>) -> CrowdSimulation {
        CrowdSimulation {
            id: self.id,
            temple_id: self.temple_id,
            sim_date: self.sim_date,
            hourly: self
                .hourly_data
                .0
                .into_iter()
                .map(|r| (r.hour, r))
                .collect(),
            peak_hours: self.peak_hours.0,
            weather_impact: self.weather_impact.map(|w| w.0),
            alerts: alerts.into_iter().map(|a| (a.id, a)).collect::<BTreeMap<_, _>>(),
            version: self.version,
        }
    }
}

const SIMULATION_COLUMNS: &str =
    "id, temple_id, sim_date, hourly_data, peak_hours, weather_impact, version";

#[derive(Clone)]
pub struct SimulationsRepository {
    pool: Pool<Postgres>,
}

impl SimulationsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn alerts_for(&self, simulation_id: i32) -> AppResult<Vec<Alert>> {
        let alerts = sqlx::query_as::<_, Alert>(
            "SELECT * FROM crowd_alerts WHERE simulation_id = $1 ORDER BY id",
        )
        .bind(simulation_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(alerts)
    }

    async fn insert_alerts(
        tx: &mut Transaction<'_, Postgres>,
        simulation_id: i32,
        alerts: &[NewAlert],
        at: DateTime<Utc>,
    ) -> AppResult<Vec<Alert>> {
        let mut created = Vec::with_capacity(alerts.len());
        for alert in alerts {
            let row = sqlx::query_as::<_, Alert>(
                r#"
                INSERT INTO crowd_alerts (simulation_id, alert_type, severity, message,
                                          affected_areas, is_active, created_at)
                VALUES ($1, $2, $3, $4, $5, TRUE, $6)
                RETURNING *
                "#,
            )
            .bind(simulation_id)
            .bind(alert.alert_type)
            .bind(alert.severity)
            .bind(&alert.message)
            .bind(&alert.affected_areas)
            .bind(at)
            .fetch_one(&mut **tx)
            .await?;
            created.push(row);
        }
        Ok(created)
    }
}

#[async_trait]
impl SimulationStore for SimulationsRepository {
    async fn find_day(&self, temple_id: i32, date: NaiveDate) -> AppResult<Option<CrowdSimulation>> {
        let row = sqlx::query_as::<_, SimulationRow>(&format!(
            "SELECT {} FROM crowd_simulations WHERE temple_id = $1 AND sim_date = $2 AND is_active = TRUE",
            SIMULATION_COLUMNS
        ))
        .bind(temple_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let alerts = self.alerts_for(row.id).await?;
                Ok(Some(row.into_simulation(alerts)))
            }
            None => Ok(None),
        }
    }

    async fn insert_day(&self, day: &NewCrowdSimulation) -> AppResult<CrowdSimulation> {
        let row = sqlx::query_as::<_, SimulationRow>(&format!(
            r#"
            INSERT INTO crowd_simulations (temple_id, sim_date, hourly_data, peak_hours,
                                           weather_impact, crea_date, modif_date)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            ON CONFLICT (temple_id, sim_date) DO NOTHING
            RETURNING {}
            "#,
            SIMULATION_COLUMNS
        ))
        .bind(day.temple_id)
        .bind(day.sim_date)
        .bind(Json(&day.hourly))
        .bind(Json(&day.peak_hours))
        .bind(day.weather_impact.as_ref().map(Json))
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(row.into_simulation(Vec::new())),
            None => self.find_day(day.temple_id, day.sim_date).await?.ok_or_else(|| {
                AppError::Transient(format!(
                    "Simulation day {} for temple {} vanished after insert conflict",
                    day.sim_date, day.temple_id
                ))
            }),
        }
    }

    async fn commit_day(
        &self,
        day: &CrowdSimulation,
        new_alerts: &[NewAlert],
        at: DateTime<Utc>,
    ) -> AppResult<Option<(CrowdSimulation, Vec<Alert>)>> {
        let mut tx = self.pool.begin().await?;
        let hourly: Vec<&HourlyCrowdRecord> = day.hourly.values().collect();

        let row = sqlx::query_as::<_, SimulationRow>(&format!(
            r#"
            UPDATE crowd_simulations
            SET hourly_data = $3, weather_impact = $4, version = version + 1, modif_date = $5
            WHERE id = $1 AND version = $2
            RETURNING {}
            "#,
            SIMULATION_COLUMNS
        ))
        .bind(day.id)
        .bind(day.version)
        .bind(Json(&hourly))
        .bind(day.weather_impact.as_ref().map(Json))
        .bind(at)
        .fetch_optional(&mut *tx)
        .await?;

        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        let created = Self::insert_alerts(&mut tx, row.id, new_alerts, at).await?;
        tx.commit().await?;

        let alerts = self.alerts_for(row.id).await?;
        Ok(Some((row.into_simulation(alerts), created)))
    }

    async fn get_alert(&self, temple_id: i32, alert_id: i32) -> AppResult<Option<Alert>> {
        let alert = sqlx::query_as::<_, Alert>(
            r#"
            SELECT a.* FROM crowd_alerts a
            JOIN crowd_simulations s ON s.id = a.simulation_id
            WHERE a.id = $1 AND s.temple_id = $2
            "#,
        )
        .bind(alert_id)
        .bind(temple_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(alert)
    }

    async fn resolve_alert(&self, alert_id: i32, at: DateTime<Utc>) -> AppResult<Option<Alert>> {
        let alert = sqlx::query_as::<_, Alert>(
            r#"
            WITH resolved AS (
                UPDATE crowd_alerts SET is_active = FALSE, resolved_at = $2
                WHERE id = $1 AND is_active = TRUE
                RETURNING *
            ), bumped AS (
                UPDATE crowd_simulations SET version = version + 1, modif_date = $2
                WHERE id IN (SELECT simulation_id FROM resolved)
            )
            SELECT * FROM resolved
            "#,
        )
        .bind(alert_id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(alert)
    }
}
