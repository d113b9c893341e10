//! Long-running consumer that turns task events into stored notifications.
//!
//! ```text
//! Idle -> Connecting -> Subscribed -> Processing -> Subscribed -> ...
//!            ^   |
//!            |   v
//!            Failed
//! ```
//!
//! Every delivery is committed once it has been handled, whether or not the
//! notification reached the store. A store outage therefore loses
//! notifications instead of stalling the topic; redelivery only happens for
//! deliveries that were never committed (crash or connection loss).

use std::{future::Future, sync::Arc};

use futures_util::StreamExt;
use tokio::{sync::watch, time::sleep};
use tracing::{debug, error, info, warn};

use crate::{
    clients::{
        broker::{BrokerClient, Delivery, Subscription},
        store::NotificationStore,
    },
    config::Config,
    error::{BrokerError, MalformedEventError, StoreError},
    models::{
        event::{RawMessage, TaskEvent},
        notification::{NewNotification, NotificationRecord},
        retry::RetryConfig,
    },
    synthesizer::synthesize,
    utils::{backoff_delay, retry_with_backoff},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    Connecting,
    Subscribed,
    Processing,
    Failed,
}

#[derive(Debug)]
pub enum ProcessOutcome {
    Stored(NotificationRecord),
    Skipped(MalformedEventError),
    StoreFailed(StoreError),
}

/// Decode, synthesize and persist one message. Never fails: every error is
/// folded into the outcome so the caller can log it and move on.
pub async fn process_message(message: &RawMessage, store: &dyn NotificationStore) -> ProcessOutcome {
    let event = match TaskEvent::decode(message) {
        Ok(event) => event,
        Err(e) => return ProcessOutcome::Skipped(e),
    };

    let notification = NewNotification::new(
        synthesize(&event),
        event.event_type.to_string(),
        event.task.id,
    );

    match store.insert(notification).await {
        Ok(record) => ProcessOutcome::Stored(record),
        Err(e) => ProcessOutcome::StoreFailed(e),
    }
}

pub struct NotificationConsumer {
    broker: Arc<dyn BrokerClient>,
    store: Arc<dyn NotificationStore>,
    topic: String,
    consumer_group: String,
    retry_config: RetryConfig,
    state: watch::Sender<ConsumerState>,
}

impl NotificationConsumer {
    pub fn new(
        broker: Arc<dyn BrokerClient>,
        store: Arc<dyn NotificationStore>,
        topic: impl Into<String>,
        consumer_group: impl Into<String>,
        retry_config: RetryConfig,
    ) -> Self {
        let (state, _) = watch::channel(ConsumerState::Idle);

        Self {
            broker,
            store,
            topic: topic.into(),
            consumer_group: consumer_group.into(),
            retry_config,
            state,
        }
    }

    pub fn from_config(
        config: &Config,
        broker: Arc<dyn BrokerClient>,
        store: Arc<dyn NotificationStore>,
    ) -> Self {
        Self::new(
            broker,
            store,
            config.topic.clone(),
            config.consumer_group.clone(),
            config.retry_config(),
        )
    }

    pub fn state(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    /// Consumes until the process exits.
    pub async fn run(&self) {
        self.run_until(std::future::pending::<()>()).await;
    }

    /// Consumes until `shutdown` resolves. Anything in flight at that point
    /// is left uncommitted and will be redelivered.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!(
            topic = %self.topic,
            consumer_group = %self.consumer_group,
            "Notification consumer starting"
        );

        tokio::select! {
            _ = shutdown => {
                info!("Notification consumer shutting down");
            }
            _ = self.consume_forever() => {}
        }

        self.transition(ConsumerState::Idle);
    }

    async fn consume_forever(&self) {
        let mut failed_rounds: u32 = 0;

        loop {
            self.transition(ConsumerState::Connecting);

            let subscribed = retry_with_backoff(&self.retry_config, || {
                self.broker.subscribe(&self.topic, &self.consumer_group)
            })
            .await;

            let mut subscription = match subscribed {
                Ok(subscription) => subscription,
                Err(e) => {
                    self.transition(ConsumerState::Failed);
                    failed_rounds = failed_rounds.saturating_add(1);
                    let delay = backoff_delay(&self.retry_config, failed_rounds);
                    error!(
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Could not subscribe to task events"
                    );
                    sleep(delay).await;
                    continue;
                }
            };

            failed_rounds = 0;
            self.transition(ConsumerState::Subscribed);
            info!(topic = %self.topic, "Waiting for task events");

            let reason = self.drain(&mut subscription).await;

            self.transition(ConsumerState::Failed);
            let delay = backoff_delay(&self.retry_config, 1);
            warn!(
                error = %reason,
                retry_in_ms = delay.as_millis() as u64,
                "Subscription lost, reconnecting"
            );
            sleep(delay).await;
        }
    }

    /// Handles deliveries in arrival order until the subscription breaks.
    async fn drain(&self, subscription: &mut Subscription) -> BrokerError {
        while let Some(next) = subscription.next().await {
            let delivery = match next {
                Ok(delivery) => delivery,
                Err(e) => return e,
            };

            self.transition(ConsumerState::Processing);
            self.handle(&delivery).await;

            if let Err(e) = delivery.commit().await {
                return e;
            }

            self.transition(ConsumerState::Subscribed);
        }

        BrokerError::Unavailable("subscription closed by broker".to_string())
    }

    async fn handle(&self, delivery: &Delivery) {
        let key = delivery.message.key.as_str();

        if delivery.redelivered {
            debug!(key, "Handling redelivered message");
        }

        match process_message(&delivery.message, self.store.as_ref()).await {
            ProcessOutcome::Stored(record) => {
                info!(
                    id = record.id,
                    event_type = %record.event_type,
                    task_id = record.task_id,
                    message = %record.message,
                    "Notification saved"
                );
            }
            ProcessOutcome::Skipped(e) => {
                warn!(key, error = %e, "Skipping malformed task event");
            }
            ProcessOutcome::StoreFailed(e) => {
                error!(key, error = %e, "Notification lost, store write failed");
            }
        }
    }

    fn transition(&self, next: ConsumerState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = ?previous, to = ?next, "Consumer state changed");
        }
    }
}
