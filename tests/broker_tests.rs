use anyhow::{Result, anyhow};
use futures_util::StreamExt;
use task_notifications::{
    clients::{
        broker::{BrokerClient, Subscription},
        memory_broker::InMemoryBroker,
        rbmq::RabbitMqClient,
    },
    config::Config,
};
use tokio::time::{Duration, Instant, timeout};

use crate::support::{GROUP, TOPIC};

async fn next_key(subscription: &mut Subscription) -> Result<String> {
    let delivery = timeout(Duration::from_secs(1), subscription.next())
        .await?
        .ok_or_else(|| anyhow!("subscription ended"))??;

    delivery.commit().await?;
    Ok(delivery.message.key)
}

/// Test: Each consumer group sees every message independently
#[tokio::test]
async fn test_consumer_groups_track_progress_separately() -> Result<()> {
    let broker = InMemoryBroker::new();

    broker.publish(TOPIC, "task_created", b"{}").await?;
    broker.publish(TOPIC, "task_updated", b"{}").await?;

    let mut notifications = broker.subscribe(TOPIC, GROUP).await?;
    let mut auditors = broker.subscribe(TOPIC, "audit-group").await?;

    assert_eq!(next_key(&mut notifications).await?, "task_created");
    assert_eq!(next_key(&mut notifications).await?, "task_updated");
    assert_eq!(next_key(&mut auditors).await?, "task_created");

    assert_eq!(broker.committed_offset(TOPIC, GROUP), 2);
    assert_eq!(broker.committed_offset(TOPIC, "audit-group"), 1);

    Ok(())
}

/// Test: Subscriptions wait for messages published later
#[tokio::test]
async fn test_subscription_receives_later_publishes() -> Result<()> {
    let broker = InMemoryBroker::new();
    let mut subscription = broker.subscribe(TOPIC, GROUP).await?;

    let publisher = broker.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let _ = publisher.publish(TOPIC, "task_deleted", b"{}").await;
    });

    assert_eq!(next_key(&mut subscription).await?, "task_deleted");

    Ok(())
}

/// Test: Topics are isolated from each other
#[tokio::test]
async fn test_topics_are_isolated() -> Result<()> {
    let broker = InMemoryBroker::new();

    broker.publish("other-topic", "task_created", b"{}").await?;
    broker.publish(TOPIC, "task_updated", b"{}").await?;

    let mut subscription = broker.subscribe(TOPIC, GROUP).await?;
    assert_eq!(next_key(&mut subscription).await?, "task_updated");
    assert_eq!(broker.messages("other-topic").len(), 1);

    Ok(())
}

/// Test: Going offline ends open subscriptions and fails new calls
#[tokio::test]
async fn test_outage_ends_subscription() -> Result<()> {
    let broker = InMemoryBroker::new();
    let mut subscription = broker.subscribe(TOPIC, GROUP).await?;

    broker.set_available(false);

    let ended = timeout(Duration::from_secs(1), subscription.next()).await?;
    assert!(ended.is_none());

    let err = broker
        .subscribe(TOPIC, GROUP)
        .await
        .err()
        .ok_or_else(|| anyhow!("subscribe should fail while offline"))?;
    assert!(err.is_unavailable());
    assert!(broker.health_check().await.is_err());

    Ok(())
}

/// Test: A member joining a live group does not replay in-flight messages
#[tokio::test]
async fn test_joining_live_group_does_not_rewind() -> Result<()> {
    let broker = InMemoryBroker::new();

    broker.publish(TOPIC, "task_created", b"{}").await?;
    broker.publish(TOPIC, "task_updated", b"{}").await?;

    let mut first = broker.subscribe(TOPIC, GROUP).await?;
    let in_flight = timeout(Duration::from_secs(1), first.next())
        .await?
        .ok_or_else(|| anyhow!("subscription ended"))??;
    assert_eq!(in_flight.message.key, "task_created");

    let mut second = broker.subscribe(TOPIC, GROUP).await?;
    let next = timeout(Duration::from_secs(1), second.next())
        .await?
        .ok_or_else(|| anyhow!("subscription ended"))??;
    assert_eq!(next.message.key, "task_updated");
    assert!(!next.redelivered);
    next.commit().await?;

    drop(in_flight);
    drop(first);
    drop(second);

    // Group is empty again: the uncommitted first message comes back.
    let mut third = broker.subscribe(TOPIC, GROUP).await?;
    let replayed = timeout(Duration::from_secs(1), third.next())
        .await?
        .ok_or_else(|| anyhow!("subscription ended"))??;
    assert_eq!(replayed.message.key, "task_created");
    assert!(replayed.redelivered);

    Ok(())
}

/// Test: A broker that accepts connections but never answers surfaces as unavailable
#[tokio::test]
async fn test_stalled_rabbitmq_reports_unavailable() -> Result<()> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let silent = tokio::spawn(async move {
        let mut held = vec![];
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let config = Config {
        broker_url: format!("amqp://guest:guest@{}/%2f", addr),
        broker_connection_timeout_ms: 200,
        broker_request_timeout_ms: 200,
        ..Config::default()
    };
    let client = RabbitMqClient::new(&config, "stalled-test");

    let started = Instant::now();
    let err = client
        .publish(TOPIC, "task_created", b"{}")
        .await
        .err()
        .ok_or_else(|| anyhow!("publish should fail against a silent broker"))?;

    assert!(err.is_unavailable());
    assert!(started.elapsed() < Duration::from_secs(5));

    silent.abort();
    Ok(())
}
