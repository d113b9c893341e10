//! Broker-agnostic publish/subscribe contract.
//!
//! Messages published under the same key reach a subscription in publish
//! order. Nothing is promised across keys. Delivery is at-least-once: a
//! delivery that was never committed is handed out again to the next
//! subscription of the same consumer group.

use std::fmt::{Debug, Formatter, Result as FmtResult};

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::{error::BrokerError, models::event::RawMessage};

/// Confirmation that the broker accepted a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub topic: String,
    pub key: String,
    /// Position in the topic log, when the broker exposes one.
    pub offset: Option<u64>,
}

/// Infinite stream of deliveries for one consumer group member.
pub type Subscription = BoxStream<'static, Result<Delivery, BrokerError>>;

#[async_trait]
pub trait BrokerClient: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, body: &[u8]) -> Result<Ack, BrokerError>;

    async fn subscribe(
        &self,
        topic: &str,
        consumer_group: &str,
    ) -> Result<Subscription, BrokerError>;

    async fn health_check(&self) -> Result<(), BrokerError>;
}

/// Moves a consumer group's durable progress past one delivery.
#[async_trait]
pub trait Commit: Send + Sync {
    async fn commit(&self) -> Result<(), BrokerError>;
}

pub struct Delivery {
    pub message: RawMessage,
    pub redelivered: bool,
    committer: Box<dyn Commit>,
}

impl Delivery {
    pub fn new(message: RawMessage, redelivered: bool, committer: Box<dyn Commit>) -> Self {
        Self {
            message,
            redelivered,
            committer,
        }
    }

    pub async fn commit(&self) -> Result<(), BrokerError> {
        self.committer.commit().await
    }
}

impl Debug for Delivery {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Delivery")
            .field("message", &self.message)
            .field("redelivered", &self.redelivered)
            .finish_non_exhaustive()
    }
}
