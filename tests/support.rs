use std::{future::Future, sync::Arc, time::Duration};

use task_notifications::{
    clients::{memory_broker::InMemoryBroker, memory_store::InMemoryNotificationStore},
    consumer::{ConsumerState, NotificationConsumer},
    models::retry::RetryConfig,
    publisher::EventPublisher,
};
use tokio::{
    sync::{oneshot, watch},
    task::JoinHandle,
    time::{Instant, sleep},
};

pub const TOPIC: &str = "task-events";
pub const GROUP: &str = "notification-group";

pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_delay_ms: 10,
        max_delay_ms: 50,
        backoff_multiplier: 2,
    }
}

/// Polls `check` until it holds or two seconds pass.
pub async fn eventually<F>(check: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(2);

    while Instant::now() < deadline {
        if check() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }

    check()
}

pub async fn wait_for_state(state: &mut watch::Receiver<ConsumerState>, wanted: ConsumerState) {
    let waited = tokio::time::timeout(
        Duration::from_secs(2),
        state.wait_for(|current| *current == wanted),
    )
    .await;
    assert!(
        matches!(waited, Ok(Ok(_))),
        "consumer never reached {:?}",
        wanted
    );
}

/// Broker, store and a running consumer wired together in memory.
pub struct Pipeline {
    pub broker: InMemoryBroker,
    pub store: InMemoryNotificationStore,
    pub publisher: EventPublisher,
    pub state: watch::Receiver<ConsumerState>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Pipeline {
    pub fn start() -> Self {
        Self::start_with(InMemoryBroker::new(), InMemoryNotificationStore::new())
    }

    pub fn start_with(broker: InMemoryBroker, store: InMemoryNotificationStore) -> Self {
        let consumer = NotificationConsumer::new(
            Arc::new(broker.clone()),
            Arc::new(store.clone()),
            TOPIC,
            GROUP,
            fast_retry(),
        );
        let state = consumer.state();
        let (shutdown, stop) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            consumer.run_until(ignore_result(stop)).await;
        });

        Self {
            publisher: EventPublisher::new(Arc::new(broker.clone()), TOPIC),
            broker,
            store,
            state,
            shutdown: Some(shutdown),
            handle: Some(handle),
        }
    }

    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

async fn ignore_result<F, T>(future: F)
where
    F: Future<Output = T>,
{
    let _ = future.await;
}
