use crate::monitoring::{CheckStatus, HealthStatus, Monitor};
use crate::services::{Service, ServiceHealth};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Ages out monitoring samples and reports client health
pub struct MonitoringPruneService {
    monitor: Arc<Monitor>,
}

impl MonitoringPruneService {
    pub fn new(monitor: Arc<Monitor>) -> Self {
        Self { monitor }
    }
}

#[async_trait]
impl Service for MonitoringPruneService {
    fn name(&self) -> &'static str {
        "monitoring_prune"
    }

    fn priority(&self) -> i32 {
        30
    }

    async fn start(&mut self, shutdown: CancellationToken) -> Result<Vec<JoinHandle<()>>, String> {
        Ok(vec![self.monitor.spawn_pruner(shutdown)])
    }

    async fn health(&self) -> ServiceHealth {
        let health = self.monitor.check_health();
        let failing: Vec<&str> = health
            .checks
            .iter()
            .filter(|check| check.status != CheckStatus::Pass)
            .map(|check| check.name)
            .collect();
        match health.status {
            HealthStatus::Healthy => ServiceHealth::Healthy,
            HealthStatus::Degraded => ServiceHealth::Degraded(failing.join(", ")),
            HealthStatus::Unhealthy => ServiceHealth::Unhealthy(failing.join(", ")),
        }
    }
}
