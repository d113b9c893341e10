use async_trait::async_trait;

use crate::{
    error::StoreError,
    models::notification::{NewNotification, NotificationRecord},
};

/// Append-only notification persistence.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Creates the backing structure if it is absent. Safe to call on every
    /// start and from several processes at once.
    async fn ensure_schema(&self) -> Result<(), StoreError>;

    /// Appends a record. The store assigns `id` and `timestamp`; a record is
    /// either fully visible to [`NotificationStore::list_all`] or not at all.
    async fn insert(&self, notification: NewNotification)
    -> Result<NotificationRecord, StoreError>;

    /// Every record, newest first. Equal timestamps fall back to `id`
    /// descending.
    async fn list_all(&self) -> Result<Vec<NotificationRecord>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}
