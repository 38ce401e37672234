//! PostgreSQL order source and recommendation sink.
//!
//! Expected schema (table names come from [`DatabaseConfig`]):
//!
//! ```sql
//! -- order_table
//! order_id     TEXT, item_id TEXT, observed_at TIMESTAMPTZ
//! -- item_master_table
//! item_id      TEXT, item_name TEXT
//! -- recommendations_table (created on demand)
//! parent_item_id TEXT, child_item_id TEXT, proximity_score DOUBLE PRECISION,
//! PRIMARY KEY (parent_item_id, child_item_id)
//! ```

use super::{OrderSource, RecommendationSink, ScoredPair, StorageError, StoredRecommendation};
use crate::config::DatabaseConfig;
use crate::mining::OrderLine;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::{debug, info};

/// Table names validated for interpolation into SQL
#[derive(Debug, Clone)]
struct Tables {
    orders: String,
    item_master: String,
    recommendations: String,
}

impl Tables {
    fn from_config(config: &DatabaseConfig) -> Result<Self, StorageError> {
        Ok(Self {
            orders: validate_identifier(&config.order_table)?,
            item_master: validate_identifier(&config.item_master_table)?,
            recommendations: validate_identifier(&config.recommendations_table)?,
        })
    }
}

/// Table names cannot be bound as parameters, so only plain (optionally
/// schema-qualified) identifiers are accepted.
fn validate_identifier(name: &str) -> Result<String, StorageError> {
    let valid = !name.is_empty()
        && name.split('.').all(|part| {
            part.chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        });

    if valid {
        Ok(name.to_string())
    } else {
        Err(StorageError::InvalidIdentifier(name.to_string()))
    }
}

/// `sqlx` backed storage for order lines and recommendations
#[derive(Debug, Clone)]
pub struct PgStorage {
    pool: PgPool,
    tables: Tables,
}

impl PgStorage {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StorageError> {
        let tables = Tables::from_config(config)?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url())
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            recommendations_table = %tables.recommendations,
            "🗄️ Connected recommendation storage"
        );
        Ok(Self { pool, tables })
    }

    pub fn from_pool(pool: PgPool, config: &DatabaseConfig) -> Result<Self, StorageError> {
        Ok(Self {
            pool,
            tables: Tables::from_config(config)?,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<bool, StorageError> {
        let row = sqlx::query("SELECT 1 as health")
            .fetch_one(&self.pool)
            .await?;

        let health: i32 = row.get("health");
        Ok(health == 1)
    }

    pub async fn ensure_recommendations_table(&self) -> Result<(), StorageError> {
        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                parent_item_id TEXT NOT NULL,
                child_item_id TEXT NOT NULL,
                proximity_score DOUBLE PRECISION,
                PRIMARY KEY (parent_item_id, child_item_id)
            )
            "#,
            self.tables.recommendations
        );
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::query("ensure_recommendations_table", e))?;
        Ok(())
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl OrderSource for PgStorage {
    async fn fetch_order_lines(
        &self,
        days_back: Option<u32>,
    ) -> Result<Vec<OrderLine>, StorageError> {
        let mut sql = format!(
            r#"
            SELECT
                CAST(o.order_id AS TEXT) AS order_id,
                CAST(o.item_id AS TEXT) AS item_id,
                m.item_name,
                o.observed_at
            FROM {} o
            JOIN {} m ON o.item_id = m.item_id
            WHERE m.item_name IS NOT NULL
            "#,
            self.tables.orders, self.tables.item_master
        );
        if days_back.is_some() {
            sql.push_str(" AND o.observed_at >= CURRENT_DATE - make_interval(days => $1)");
        }
        sql.push_str(" ORDER BY o.observed_at DESC");

        let mut query = sqlx::query(&sql);
        if let Some(days) = days_back {
            query = query.bind(i32::try_from(days).unwrap_or(i32::MAX));
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::query("fetch_order_lines", e))?;

        let lines = rows
            .into_iter()
            .map(|row| {
                Ok(OrderLine {
                    order_id: row.try_get("order_id")?,
                    item_id: row.try_get("item_id")?,
                    item_name: row.try_get("item_name")?,
                    observed_at: row.try_get::<DateTime<Utc>, _>("observed_at")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| StorageError::query("fetch_order_lines", e))?;

        info!(rows = lines.len(), days_back = days_back, "Fetched order lines");
        Ok(lines)
    }
}

#[async_trait]
impl RecommendationSink for PgStorage {
    async fn replace_all(&self, pairs: &[ScoredPair]) -> Result<u64, StorageError> {
        self.ensure_recommendations_table().await?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!("DELETE FROM {}", self.tables.recommendations))
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::query("replace_all", e))?;
        debug!(table = %self.tables.recommendations, "Cleared existing recommendations");

        let insert = format!(
            "INSERT INTO {} (parent_item_id, child_item_id, proximity_score) VALUES ($1, $2, $3) \
             ON CONFLICT (parent_item_id, child_item_id) DO NOTHING",
            self.tables.recommendations
        );

        let mut inserted = 0u64;
        for pair in pairs {
            let result = sqlx::query(&insert)
                .bind(&pair.main_item_id)
                .bind(&pair.recommended_item_id)
                .bind(pair.score)
                .execute(&mut *tx)
                .await
                .map_err(|e| StorageError::query("replace_all", e))?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;

        info!(
            attempted = pairs.len(),
            inserted = inserted,
            table = %self.tables.recommendations,
            "💾 Saved recommendations"
        );
        Ok(inserted)
    }

    async fn recommendations_for(
        &self,
        main_item_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredRecommendation>, StorageError> {
        let sql = format!(
            "SELECT child_item_id, proximity_score FROM {} \
             WHERE parent_item_id = $1 ORDER BY proximity_score DESC LIMIT $2",
            self.tables.recommendations
        );

        let rows = sqlx::query(&sql)
            .bind(main_item_id)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::query("recommendations_for", e))?;

        rows.into_iter()
            .enumerate()
            .map(|(i, row)| {
                Ok(StoredRecommendation {
                    recommended_item_id: row.try_get("child_item_id")?,
                    score: row.try_get::<Option<f64>, _>("proximity_score")?.unwrap_or(0.0),
                    rank: i as u32 + 1,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| StorageError::query("recommendations_for", e))
    }
}
