use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    clients::broker::{Ack, BrokerClient},
    error::EventPublishFailedError,
    models::event::{EventType, TaskEvent, TaskPayload},
};

/// Publishes task mutations to the event topic.
#[derive(Clone)]
pub struct EventPublisher {
    broker: Arc<dyn BrokerClient>,
    topic: String,
}

impl EventPublisher {
    pub fn new(broker: Arc<dyn BrokerClient>, topic: impl Into<String>) -> Self {
        Self {
            broker,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Returns once the broker has accepted the event. On failure the
    /// mutation that produced `task` stays applied; the caller decides how
    /// to report the degraded outcome.
    pub async fn publish_task_event(
        &self,
        event_type: EventType,
        task: &TaskPayload,
    ) -> Result<Ack, EventPublishFailedError> {
        let event = TaskEvent::new(event_type, task.clone());
        let message = event.encode();

        match self
            .broker
            .publish(&self.topic, &message.key, &message.body)
            .await
        {
            Ok(ack) => {
                info!(
                    topic = %self.topic,
                    event_type = %event.event_type,
                    task_id = task.id,
                    "Task event published"
                );
                Ok(ack)
            }
            Err(e) => {
                warn!(
                    topic = %self.topic,
                    event_type = %event.event_type,
                    task_id = task.id,
                    error = %e,
                    "Task event publish failed"
                );
                Err(EventPublishFailedError {
                    event_type: event.event_type.to_string(),
                    task_id: task.id,
                    source: e,
                })
            }
        }
    }
}
