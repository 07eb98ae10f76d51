//! Structured store sink: the `location_data` table in Postgres.
//!
//! The pool is built once at startup and handed to the persister. Each
//! record is inserted in its own transaction, so one rejected record never
//! affects its siblings.

use crate::config::StoreConfig;
use crate::record::ReceivedRecord;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connect: {0}")]
    Connect(#[source] sqlx::Error),
    #[error("migrate: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    /// The row violated a table constraint.
    #[error("rejected: {0}")]
    Constraint(String),
    #[error("insert: {0}")]
    Insert(#[from] sqlx::Error),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Destination for decoded records, one call per record.
pub trait LocationStore: Send + Sync + 'static {
    fn insert(
        &self,
        record: &ReceivedRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

pub struct PgLocationStore {
    pool: PgPool,
}

impl PgLocationStore {
    /// Connect to the store and, if configured, apply migrations.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout)
            .connect(&config.database_url)
            .await
            .map_err(StoreError::Connect)?;
        let store = PgLocationStore { pool };
        if config.run_migrations {
            store.run_migrations().await?;
        }
        Ok(store)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        PgLocationStore { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Number of stored rows.
    pub async fn count(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM location_data")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

impl LocationStore for PgLocationStore {
    async fn insert(&self, received: &ReceivedRecord) -> Result<(), StoreError> {
        let r = &received.record;
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO location_data
                 (timestamp, latitude, longitude, altitude, accuracy, speed,
                  network_type, signal_level, received_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(r.timestamp)
        .bind(r.latitude)
        .bind(r.longitude)
        .bind(r.altitude)
        .bind(r.accuracy)
        .bind(r.speed)
        .bind(&r.network_type)
        .bind(&r.signal_level)
        .bind(received.received_at)
        .execute(&mut *tx)
        .await
        .map_err(classify_insert_error)?;
        tx.commit().await?;
        Ok(())
    }
}

fn classify_insert_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.constraint().is_some() => {
            StoreError::Constraint(db.message().to_owned())
        }
        _ => StoreError::Insert(err),
    }
}
