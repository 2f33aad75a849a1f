//! Temples repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use super::TempleStore;
use crate::{error::AppResult, models::temple::Temple};

#[derive(Clone)]
pub struct TemplesRepository {
    pool: Pool<Postgres>,
}

impl TemplesRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TempleStore for TemplesRepository {
    async fn get(&self, id: i32) -> AppResult<Option<Temple>> {
        let temple = sqlx::query_as::<_, Temple>("SELECT * FROM temples WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(temple)
    }

    async fn set_current_occupancy(
        &self,
        id: i32,
        occupancy: i32,
        at: DateTime<Utc>,
    ) -> AppResult<Option<Temple>> {
        let temple = sqlx::query_as::<_, Temple>(
            r#"
            UPDATE temples
            SET current_occupancy = $2, status_updated_at = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(occupancy)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(temple)
    }
}
