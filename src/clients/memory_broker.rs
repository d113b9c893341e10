use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use tokio::sync::Notify;
use tracing::debug;

use crate::{
    clients::broker::{Ack, BrokerClient, Commit, Delivery, Subscription},
    error::BrokerError,
    models::event::RawMessage,
};

/// Process-local broker with a single ordered log per topic.
///
/// Each consumer group tracks a committed offset and a delivery cursor.
/// Members of the same group share the cursor and compete for messages.
/// When the first member of an empty group subscribes, the cursor rewinds
/// to the committed offset, so anything delivered but not committed is
/// handed out again. Joining a group that still has a live member does not
/// rewind.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<BrokerState>,
    published: Notify,
    unavailable: AtomicBool,
}

#[derive(Default)]
struct BrokerState {
    topics: HashMap<String, Vec<RawMessage>>,
    groups: HashMap<(String, String), GroupProgress>,
}

#[derive(Default, Clone, Copy)]
struct GroupProgress {
    committed: usize,
    cursor: usize,
    delivered: usize,
    members: usize,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates losing (or regaining) the broker. While unavailable every
    /// call fails and open subscriptions end.
    pub fn set_available(&self, available: bool) {
        self.inner.unavailable.store(!available, Ordering::SeqCst);
        self.inner.published.notify_waiters();
    }

    pub fn is_available(&self) -> bool {
        !self.inner.unavailable.load(Ordering::SeqCst)
    }

    pub fn messages(&self, topic: &str) -> Vec<RawMessage> {
        self.inner
            .lock()
            .topics
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    pub fn committed_offset(&self, topic: &str, consumer_group: &str) -> usize {
        self.inner
            .lock()
            .groups
            .get(&(topic.to_string(), consumer_group.to_string()))
            .map(|progress| progress.committed)
            .unwrap_or(0)
    }

    fn ensure_available(&self) -> Result<(), BrokerError> {
        if self.is_available() {
            Ok(())
        } else {
            Err(BrokerError::Unavailable(
                "in-memory broker is offline".to_string(),
            ))
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        // Poisoning only means another holder panicked mid-update of plain
        // counters; the data is still usable.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_delivery(
        &self,
        topic: &str,
        consumer_group: &str,
    ) -> Option<(usize, RawMessage, bool)> {
        let mut state = self.lock();
        let key = (topic.to_string(), consumer_group.to_string());
        let cursor = state.groups.entry(key.clone()).or_default().cursor;
        let message = state.topics.get(topic)?.get(cursor)?.clone();

        let progress = state.groups.entry(key).or_default();
        let redelivered = cursor < progress.delivered;
        progress.cursor = cursor + 1;
        progress.delivered = progress.delivered.max(cursor + 1);

        Some((cursor, message, redelivered))
    }
}

#[async_trait]
impl BrokerClient for InMemoryBroker {
    async fn publish(&self, topic: &str, key: &str, body: &[u8]) -> Result<Ack, BrokerError> {
        self.ensure_available()?;

        let offset = {
            let mut state = self.inner.lock();
            let log = state.topics.entry(topic.to_string()).or_default();
            log.push(RawMessage::new(key, body));
            log.len() - 1
        };

        self.inner.published.notify_waiters();
        debug!(topic, key, offset, "Message appended to in-memory topic");

        Ok(Ack {
            topic: topic.to_string(),
            key: key.to_string(),
            offset: Some(offset as u64),
        })
    }

    async fn subscribe(
        &self,
        topic: &str,
        consumer_group: &str,
    ) -> Result<Subscription, BrokerError> {
        self.ensure_available()?;

        {
            let mut state = self.inner.lock();
            let progress = state
                .groups
                .entry((topic.to_string(), consumer_group.to_string()))
                .or_default();
            if progress.members == 0 {
                progress.cursor = progress.committed;
            }
            progress.members += 1;
        }

        let broker = self.clone();
        let topic = topic.to_string();
        let consumer_group = consumer_group.to_string();
        let membership = Membership {
            broker: broker.clone(),
            group: (topic.clone(), consumer_group.clone()),
        };

        let subscription = stream::unfold(
            (broker, topic, consumer_group, membership),
            |(broker, topic, consumer_group, membership)| async move {
                let inner = Arc::clone(&broker.inner);
                loop {
                    // Register interest before checking so a publish between
                    // the check and the await is not missed.
                    let published = inner.published.notified();

                    if !broker.is_available() {
                        return None;
                    }

                    if let Some((offset, message, redelivered)) =
                        inner.next_delivery(&topic, &consumer_group)
                    {
                        let committer = MemoryCommit {
                            broker: broker.clone(),
                            topic: topic.clone(),
                            consumer_group: consumer_group.clone(),
                            offset,
                        };
                        let delivery = Delivery::new(message, redelivered, Box::new(committer));
                        return Some((
                            Ok(delivery),
                            (broker, topic, consumer_group, membership),
                        ));
                    }

                    published.await;
                }
            },
        )
        .boxed();

        Ok(subscription)
    }

    async fn health_check(&self) -> Result<(), BrokerError> {
        self.ensure_available()
    }
}

/// Counts a live subscription against its group until the stream is dropped.
struct Membership {
    broker: InMemoryBroker,
    group: (String, String),
}

impl Drop for Membership {
    fn drop(&mut self) {
        let mut state = self.broker.inner.lock();
        if let Some(progress) = state.groups.get_mut(&self.group) {
            progress.members = progress.members.saturating_sub(1);
        }
    }
}

struct MemoryCommit {
    broker: InMemoryBroker,
    topic: String,
    consumer_group: String,
    offset: usize,
}

#[async_trait]
impl Commit for MemoryCommit {
    async fn commit(&self) -> Result<(), BrokerError> {
        self.broker.ensure_available()?;

        let mut state = self.broker.inner.lock();
        let progress = state
            .groups
            .entry((self.topic.clone(), self.consumer_group.clone()))
            .or_default();
        progress.committed = progress.committed.max(self.offset + 1);

        Ok(())
    }
}
