use std::{collections::HashSet, future::Future, time::Duration};

use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer, ExchangeKind,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
        ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    types::FieldTable,
};
use tokio::{sync::Mutex, time::timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    clients::broker::{Ack, BrokerClient, Commit, Delivery, Subscription},
    config::Config,
    error::BrokerError,
    models::event::RawMessage,
};

/// RabbitMQ-backed broker client.
///
/// A topic is a durable topic exchange, the message key is the routing key
/// and a consumer group is a durable queue named after the group, bound to
/// the exchange with `#`. Committing a delivery acks it.
pub struct RabbitMqClient {
    broker_url: String,
    client_id: String,
    prefetch_count: u16,
    connection_timeout: Duration,
    request_timeout: Duration,
    publisher: Mutex<Option<PublisherChannel>>,
}

struct PublisherChannel {
    connection: Connection,
    channel: Channel,
    declared_topics: HashSet<String>,
}

impl RabbitMqClient {
    /// Builds a client without touching the network. Connections are opened
    /// on first use and reopened after a failure.
    pub fn new(config: &Config, client_id: &str) -> Self {
        Self {
            broker_url: config.broker_url.clone(),
            client_id: client_id.to_string(),
            prefetch_count: config.prefetch_count,
            connection_timeout: config.connection_timeout(),
            request_timeout: config.request_timeout(),
            publisher: Mutex::new(None),
        }
    }

    async fn open_channel(&self) -> Result<(Connection, Channel), BrokerError> {
        info!(client_id = %self.client_id, "Connecting to RabbitMQ");

        let connection = timeout(
            self.connection_timeout,
            Connection::connect(&self.broker_url, ConnectionProperties::default()),
        )
        .await
        .map_err(|_| {
            BrokerError::Unavailable(format!(
                "connection timed out after {}ms",
                self.connection_timeout.as_millis()
            ))
        })?
        .map_err(|e| BrokerError::Unavailable(format!("failed to connect to RabbitMQ: {}", e)))?;

        let channel = self
            .bounded("channel creation", async {
                connection.create_channel().await.map_err(|e| {
                    BrokerError::Unavailable(format!("channel creation failed: {}", e))
                })
            })
            .await?;

        info!(client_id = %self.client_id, "RabbitMQ channel established");

        Ok((connection, channel))
    }

    async fn open_publisher(&self) -> Result<PublisherChannel, BrokerError> {
        let (connection, channel) = self.open_channel().await?;

        self.bounded("publisher confirms", async {
            channel
                .confirm_select(ConfirmSelectOptions::default())
                .await
                .map_err(|e| {
                    BrokerError::Unavailable(format!("failed to enable publisher confirms: {}", e))
                })
        })
        .await?;

        Ok(PublisherChannel {
            connection,
            channel,
            declared_topics: HashSet::new(),
        })
    }

    async fn bounded<T, F>(&self, operation: &str, future: F) -> Result<T, BrokerError>
    where
        F: Future<Output = Result<T, BrokerError>>,
    {
        timeout(self.request_timeout, future).await.map_err(|_| {
            BrokerError::Unavailable(format!(
                "{} timed out after {}ms",
                operation,
                self.request_timeout.as_millis()
            ))
        })?
    }

    async fn publish_on(
        &self,
        publisher: &mut PublisherChannel,
        topic: &str,
        key: &str,
        body: &[u8],
    ) -> Result<Ack, BrokerError> {
        if !publisher.declared_topics.contains(topic) {
            self.bounded("topic declaration", declare_topic(&publisher.channel, topic))
                .await?;
            publisher.declared_topics.insert(topic.to_string());
        }

        let channel = &publisher.channel;
        let confirmation = self
            .bounded("publish", async {
                let confirm = channel
                    .basic_publish(
                        topic,
                        key,
                        BasicPublishOptions::default(),
                        body,
                        BasicProperties::default().with_delivery_mode(2),
                    )
                    .await
                    .map_err(|e| BrokerError::Unavailable(format!("publish failed: {}", e)))?;

                confirm
                    .await
                    .map_err(|e| BrokerError::Unavailable(format!("publish confirm failed: {}", e)))
            })
            .await?;

        if confirmation.is_nack() {
            return Err(BrokerError::Rejected(format!(
                "broker nacked message with key '{}' on topic '{}'",
                key, topic
            )));
        }

        Ok(Ack {
            topic: topic.to_string(),
            key: key.to_string(),
            offset: None,
        })
    }
}

async fn declare_topic(channel: &Channel, topic: &str) -> Result<(), BrokerError> {
    channel
        .exchange_declare(
            topic,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| BrokerError::Unavailable(format!("failed to declare topic '{}': {}", topic, e)))
}

#[async_trait]
impl BrokerClient for RabbitMqClient {
    async fn publish(&self, topic: &str, key: &str, body: &[u8]) -> Result<Ack, BrokerError> {
        let mut cached = self.publisher.lock().await;

        let mut publisher = match cached.take() {
            Some(publisher) => publisher,
            None => self.open_publisher().await?,
        };

        let result = self.publish_on(&mut publisher, topic, key, body).await;

        match &result {
            Ok(_) => {
                debug!(topic, key, "Message confirmed by broker");
                *cached = Some(publisher);
            }
            Err(e) => {
                // The channel may be half-closed; reconnect on the next call.
                warn!(topic, key, error = %e, "Publish failed, dropping broker connection");
            }
        }

        result
    }

    async fn subscribe(
        &self,
        topic: &str,
        consumer_group: &str,
    ) -> Result<Subscription, BrokerError> {
        let (connection, channel) = self.open_channel().await?;
        let consumer_tag = format!("{}-{}", self.client_id, Uuid::new_v4());

        let consumer = self
            .bounded("subscribe", async {
                declare_topic(&channel, topic).await?;

                channel
                    .basic_qos(self.prefetch_count, BasicQosOptions::default())
                    .await
                    .map_err(|e| BrokerError::Unavailable(format!("failed to set QoS: {}", e)))?;

                channel
                    .queue_declare(
                        consumer_group,
                        QueueDeclareOptions {
                            durable: true,
                            ..Default::default()
                        },
                        FieldTable::default(),
                    )
                    .await
                    .map_err(|e| {
                        BrokerError::Unavailable(format!(
                            "failed to declare consumer group queue: {}",
                            e
                        ))
                    })?;

                channel
                    .queue_bind(
                        consumer_group,
                        topic,
                        "#",
                        QueueBindOptions::default(),
                        FieldTable::default(),
                    )
                    .await
                    .map_err(|e| {
                        BrokerError::Unavailable(format!("failed to bind consumer group: {}", e))
                    })?;

                channel
                    .basic_consume(
                        consumer_group,
                        &consumer_tag,
                        BasicConsumeOptions::default(),
                        FieldTable::default(),
                    )
                    .await
                    .map_err(|e| {
                        BrokerError::Unavailable(format!("failed to create consumer: {}", e))
                    })
            })
            .await?;

        info!(
            topic,
            consumer_group,
            consumer_tag = %consumer_tag,
            "Subscribed to topic"
        );

        Ok(deliveries(connection, channel, consumer, self.request_timeout))
    }

    async fn health_check(&self) -> Result<(), BrokerError> {
        let mut cached = self.publisher.lock().await;

        let publisher = match cached.take() {
            Some(publisher) if publisher.connection.status().connected() => publisher,
            _ => self.open_publisher().await?,
        };

        *cached = Some(publisher);
        Ok(())
    }
}

/// The connection is carried inside the stream state so it lives exactly as
/// long as the subscription.
fn deliveries(
    connection: Connection,
    channel: Channel,
    consumer: Consumer,
    ack_timeout: Duration,
) -> Subscription {
    stream::unfold(
        (connection, channel, consumer),
        move |(connection, channel, mut consumer)| async move {
            let next = consumer.next().await?;

            let item = next
                .map(|delivery| {
                    let committer = AmqpCommit {
                        channel: channel.clone(),
                        delivery_tag: delivery.delivery_tag,
                        ack_timeout,
                    };

                    Delivery::new(
                        RawMessage::new(delivery.routing_key.as_str(), delivery.data),
                        delivery.redelivered,
                        Box::new(committer),
                    )
                })
                .map_err(|e| BrokerError::Unavailable(format!("consumer stream failed: {}", e)));

            Some((item, (connection, channel, consumer)))
        },
    )
    .boxed()
}

struct AmqpCommit {
    channel: Channel,
    delivery_tag: u64,
    ack_timeout: Duration,
}

#[async_trait]
impl Commit for AmqpCommit {
    async fn commit(&self) -> Result<(), BrokerError> {
        timeout(
            self.ack_timeout,
            self.channel
                .basic_ack(self.delivery_tag, BasicAckOptions::default()),
        )
        .await
        .map_err(|_| {
            BrokerError::Unavailable(format!(
                "acknowledgement timed out after {}ms",
                self.ack_timeout.as_millis()
            ))
        })?
        .map_err(|e| BrokerError::Unavailable(format!("failed to acknowledge message: {}", e)))
    }
}
