use async_trait::async_trait;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::{debug, error, info};

use crate::{
    clients::store::NotificationStore,
    config::Config,
    error::StoreError,
    models::notification::{NewNotification, NotificationRecord},
};

// Arbitrary, but fixed: every process serializes schema setup on this key.
const SCHEMA_LOCK_KEY: i64 = 0x6e6f_7469_6679;

const CREATE_NOTIFICATIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS notifications (
        id BIGSERIAL PRIMARY KEY,
        message TEXT NOT NULL,
        event_type VARCHAR(50) NOT NULL,
        task_id BIGINT NOT NULL,
        timestamp TIMESTAMPTZ NOT NULL DEFAULT now()
    )
"#;

const CREATE_RECENCY_INDEX: &str = r#"
    CREATE INDEX IF NOT EXISTS notifications_recency_idx
        ON notifications (timestamp DESC, id DESC)
"#;

/// PostgreSQL notification store. The pool is an explicit handle owned by
/// this value; call [`DatabaseClient::close`] on shutdown.
#[derive(Clone)]
pub struct DatabaseClient {
    pool: PgPool,
}

impl DatabaseClient {
    pub async fn connect(config: &Config) -> Result<Self, StoreError> {
        info!(
            host = %config.db_host,
            port = config.db_port,
            database = %config.db_name,
            "Connecting to PostgreSQL database"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(config.connection_timeout())
            .connect_with(config.database_options())
            .await
            .map_err(StoreError::Connect)?;

        info!("PostgreSQL connection established");

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("PostgreSQL pool closed");
    }
}

#[async_trait]
impl NotificationStore for DatabaseClient {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        // CREATE ... IF NOT EXISTS alone can still fail with a unique
        // violation on the catalog when two sessions race.
        let mut tx = self.pool.begin().await.map_err(StoreError::Schema)?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(SCHEMA_LOCK_KEY)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::Schema)?;

        sqlx::query(CREATE_NOTIFICATIONS_TABLE)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::Schema)?;

        sqlx::query(CREATE_RECENCY_INDEX)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::Schema)?;

        tx.commit().await.map_err(StoreError::Schema)?;

        info!("Notification schema ready");

        Ok(())
    }

    async fn insert(
        &self,
        notification: NewNotification,
    ) -> Result<NotificationRecord, StoreError> {
        let record = sqlx::query_as::<_, NotificationRecord>(
            r#"
            INSERT INTO notifications (message, event_type, task_id)
            VALUES ($1, $2, $3)
            RETURNING id, message, event_type, task_id, timestamp
            "#,
        )
        .bind(&notification.message)
        .bind(&notification.event_type)
        .bind(notification.task_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!(
                error = %e,
                event_type = %notification.event_type,
                task_id = notification.task_id,
                "Failed to write notification to database"
            );
            StoreError::Write(e.to_string())
        })?;

        debug!(
            id = record.id,
            task_id = record.task_id,
            "Notification written to database"
        );

        Ok(record)
    }

    async fn list_all(&self) -> Result<Vec<NotificationRecord>, StoreError> {
        sqlx::query_as::<_, NotificationRecord>(
            r#"
            SELECT id, message, event_type, task_id, timestamp
            FROM notifications
            ORDER BY timestamp DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to fetch notifications from database");
            StoreError::Read(e.to_string())
        })
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Read(format!("health check failed: {}", e)))?;

        Ok(())
    }
}
