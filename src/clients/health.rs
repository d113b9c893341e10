use std::{collections::HashMap, sync::Arc, time::Instant};

use chrono::Utc;
use tracing::{debug, warn};

use crate::{
    clients::{broker::BrokerClient, store::NotificationStore},
    models::health::{DependencyHealth, HealthCheckResponse, HealthStatus},
};

#[derive(Clone)]
pub struct HealthChecker {
    service: String,
    broker: Arc<dyn BrokerClient>,
    store: Option<Arc<dyn NotificationStore>>,
}

impl HealthChecker {
    pub fn new(service: impl Into<String>, broker: Arc<dyn BrokerClient>) -> Self {
        Self {
            service: service.into(),
            broker,
            store: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn NotificationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub async fn check_all(&self) -> HealthCheckResponse {
        let mut checks = HashMap::new();

        if let Some(store) = &self.store {
            checks.insert("database".to_string(), Self::check_store(store.as_ref()).await);
        }

        checks.insert("message_broker".to_string(), self.check_broker().await);

        let status = if checks
            .values()
            .any(|health| health.status == HealthStatus::Unhealthy)
        {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Healthy
        };

        HealthCheckResponse {
            service: self.service.clone(),
            status,
            timestamp: Utc::now(),
            checks,
        }
    }

    async fn check_store(store: &dyn NotificationStore) -> DependencyHealth {
        let start = Instant::now();

        match store.health_check().await {
            Ok(_) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(response_time_ms = elapsed, "Database health check passed");
                DependencyHealth::healthy(elapsed)
            }
            Err(e) => {
                warn!(error = %e, "Database health check failed");
                DependencyHealth::unhealthy(e.to_string())
            }
        }
    }

    async fn check_broker(&self) -> DependencyHealth {
        let start = Instant::now();

        match self.broker.health_check().await {
            Ok(_) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(response_time_ms = elapsed, "Broker health check passed");
                DependencyHealth::healthy(elapsed)
            }
            Err(e) => {
                warn!(error = %e, "Broker health check failed");
                DependencyHealth::unhealthy(e.to_string())
            }
        }
    }
}
