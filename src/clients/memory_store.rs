use std::sync::{
    Arc, RwLock,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use chrono::Utc;

use crate::{
    clients::store::NotificationStore,
    error::StoreError,
    models::notification::{NewNotification, NotificationRecord},
};

/// Notification store held in process memory.
///
/// Writes and reads can be switched to fail independently, which lets tests
/// exercise the store-outage paths of the consumer and the read API.
#[derive(Clone, Default)]
pub struct InMemoryNotificationStore {
    records: Arc<RwLock<Vec<NotificationRecord>>>,
    fail_writes: Arc<AtomicBool>,
    fail_reads: Arc<AtomicBool>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Records in insertion order.
    pub fn snapshot(&self) -> Vec<NotificationRecord> {
        self.records
            .read()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn insert(
        &self,
        notification: NewNotification,
    ) -> Result<NotificationRecord, StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Write("store is rejecting writes".to_string()));
        }

        let mut records = self
            .records
            .write()
            .map_err(|e| StoreError::Write(e.to_string()))?;

        let now = Utc::now();
        // Keep timestamps non-decreasing in id order even if the clock steps back.
        let timestamp = records
            .last()
            .map(|last| last.timestamp.max(now))
            .unwrap_or(now);

        let record = NotificationRecord {
            id: records.len() as i64 + 1,
            message: notification.message,
            event_type: notification.event_type,
            task_id: notification.task_id,
            timestamp,
        };

        records.push(record.clone());

        Ok(record)
    }

    async fn list_all(&self) -> Result<Vec<NotificationRecord>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Read("store is rejecting reads".to_string()));
        }

        let mut records = self
            .records
            .read()
            .map_err(|e| StoreError::Read(e.to_string()))?
            .clone();

        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));

        Ok(records)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Read("store is unavailable".to_string()));
        }
        Ok(())
    }
}
