use std::sync::Arc;

use anyhow::{Context, Error, Result, anyhow};
use task_notifications::{
    api::{
        notifications::{self, NotificationApiState},
        run_api_server, shutdown_signal,
    },
    clients::{
        broker::BrokerClient, database::DatabaseClient, health::HealthChecker,
        rbmq::RabbitMqClient, store::NotificationStore,
    },
    config::Config,
    consumer::NotificationConsumer,
    telemetry::init_tracing,
    utils::retry_with_backoff,
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();

    let config = Config::load()?;
    let retry_config = config.retry_config();

    // Without a schema there is nowhere to put notifications: fail loudly.
    let database = retry_with_backoff(&retry_config, || DatabaseClient::connect(&config))
        .await
        .context("Notification store unreachable at startup")?;

    retry_with_backoff(&retry_config, || database.ensure_schema())
        .await
        .context("Could not prepare notification schema")?;

    let store: Arc<dyn NotificationStore> = Arc::new(database.clone());
    let broker: Arc<dyn BrokerClient> = Arc::new(RabbitMqClient::new(
        &config,
        &config.client_id_notification,
    ));

    let consumer = NotificationConsumer::from_config(&config, broker.clone(), store.clone());
    let consumer_task = tokio::spawn(async move { consumer.run_until(shutdown_signal()).await });

    let state = Arc::new(NotificationApiState {
        store: store.clone(),
        health_checker: HealthChecker::new(config.client_id_notification.clone(), broker)
            .with_store(store),
    });

    let served = run_api_server(
        notifications::router(state),
        config.notification_server_port,
        shutdown_signal(),
    )
    .await
    .map_err(|e| anyhow!("Notification API failed: {}", e));

    if let Err(e) = consumer_task.await {
        error!(error = %e, "Consumer task ended abnormally");
    }

    database.close().await;
    info!("Notification service stopped");

    served
}
