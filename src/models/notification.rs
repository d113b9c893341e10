use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted notification. Rows are append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationRecord {
    pub id: i64,
    pub message: String,
    pub event_type: String,
    pub task_id: i64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewNotification {
    pub message: String,
    pub event_type: String,
    pub task_id: i64,
}

impl NewNotification {
    pub fn new(message: String, event_type: String, task_id: i64) -> Self {
        Self {
            message,
            event_type,
            task_id,
        }
    }
}
