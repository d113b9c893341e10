use std::{
    borrow::Cow,
    fmt::{Display, Formatter, Result as FmtResult},
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::MalformedEventError;

/// Category of a task mutation, carried as the broker message key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    Created,
    Updated,
    Deleted,
    /// Any key this build does not know about, kept verbatim.
    Unknown(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::Created => "task_created",
            EventType::Updated => "task_updated",
            EventType::Deleted => "task_deleted",
            EventType::Unknown(key) => key,
        }
    }

    pub fn from_key(key: &str) -> Self {
        match key {
            "task_created" => EventType::Created,
            "task_updated" => EventType::Updated,
            "task_deleted" => EventType::Deleted,
            other => EventType::Unknown(other.to_string()),
        }
    }
}

impl Display for EventType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl From<&str> for EventType {
    fn from(key: &str) -> Self {
        Self::from_key(key)
    }
}

/// Semi-structured task record. Only `id` is required; every other field
/// is preserved as-is so newer producers can add fields freely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPayload {
    pub id: i64,

    #[serde(flatten)]
    pub fields: Map<String, JsonValue>,
}

impl TaskPayload {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: impl Into<JsonValue>) -> Self {
        self.set_field(name, value);
        self
    }

    pub fn set_field(&mut self, name: &str, value: impl Into<JsonValue>) {
        if name != "id" {
            self.fields.insert(name.to_string(), value.into());
        }
    }

    /// Overlays `fields` onto this task. An `id` in the overlay is ignored.
    pub fn merge(&mut self, fields: Map<String, JsonValue>) {
        for (name, value) in fields {
            self.set_field(&name, value);
        }
    }

    pub fn field(&self, name: &str) -> Option<&JsonValue> {
        self.fields.get(name)
    }

    /// The task title, or an empty string when absent or null.
    pub fn title(&self) -> Cow<'_, str> {
        match self.fields.get("title") {
            None | Some(JsonValue::Null) => Cow::Borrowed(""),
            Some(JsonValue::String(title)) => Cow::Borrowed(title.as_str()),
            Some(other) => Cow::Owned(other.to_string()),
        }
    }
}

/// Broker-level message: a short text key and a byte body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub key: String,
    pub body: Vec<u8>,
}

impl RawMessage {
    pub fn new(key: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskEvent {
    pub event_type: EventType,
    pub task: TaskPayload,
}

impl TaskEvent {
    pub fn new(event_type: EventType, task: TaskPayload) -> Self {
        Self { event_type, task }
    }

    pub fn encode(&self) -> RawMessage {
        // A map of JSON values with an integer id always serializes.
        let body = serde_json::to_vec(&self.task).unwrap_or_default();

        RawMessage {
            key: self.event_type.as_str().to_string(),
            body,
        }
    }

    pub fn decode(message: &RawMessage) -> Result<Self, MalformedEventError> {
        let task = serde_json::from_slice::<TaskPayload>(&message.body).map_err(|e| {
            MalformedEventError {
                key: message.key.clone(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            event_type: EventType::from_key(&message.key),
            task,
        })
    }
}
