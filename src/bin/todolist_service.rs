use std::sync::Arc;

use anyhow::{Error, Result, anyhow};
use task_notifications::{
    api::{
        run_api_server, shutdown_signal,
        tasks::{self, TaskApiState},
    },
    clients::{broker::BrokerClient, health::HealthChecker, rbmq::RabbitMqClient},
    config::Config,
    publisher::EventPublisher,
    repository::InMemoryTaskRepository,
    telemetry::init_tracing,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();

    let config = Config::load()?;

    let broker: Arc<dyn BrokerClient> =
        Arc::new(RabbitMqClient::new(&config, &config.client_id_todolist));

    let state = Arc::new(TaskApiState::new(
        Arc::new(InMemoryTaskRepository::new()),
        EventPublisher::new(broker.clone(), config.topic.clone()),
        HealthChecker::new(config.client_id_todolist.clone(), broker),
    ));

    run_api_server(
        tasks::router(state),
        config.todolist_server_port,
        shutdown_signal(),
    )
    .await
    .map_err(|e| anyhow!("Task API failed: {}", e))?;

    info!("Todolist service stopped");

    Ok(())
}
