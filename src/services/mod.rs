mod health;
pub mod implementations;

pub use health::ServiceHealth;

use crate::config::Config;
use crate::logger::{self, LogTag};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long `stop_all` waits for each task to wind down
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Background task owned by the service manager
#[async_trait]
pub trait Service: Send + Sync {
    /// Unique service identifier
    fn name(&self) -> &'static str;

    /// Service priority (lower = starts earlier, stops later)
    fn priority(&self) -> i32 {
        100
    }

    /// Services this service depends on
    fn dependencies(&self) -> Vec<&'static str> {
        vec![]
    }

    fn is_enabled(&self, _config: &Config) -> bool {
        true
    }

    async fn initialize(&mut self) -> Result<(), String> {
        Ok(())
    }

    /// Spawn the service's tasks; they must exit once `shutdown` is cancelled
    async fn start(&mut self, shutdown: CancellationToken) -> Result<Vec<JoinHandle<()>>, String>;

    async fn stop(&mut self) -> Result<(), String> {
        Ok(())
    }

    async fn health(&self) -> ServiceHealth {
        ServiceHealth::Healthy
    }
}

pub struct ServiceManager {
    services: HashMap<&'static str, Box<dyn Service>>,
    handles: HashMap<&'static str, Vec<JoinHandle<()>>>,
    shutdown: CancellationToken,
    config: Config,
}

impl ServiceManager {
    pub fn new(config: Config, shutdown: CancellationToken) -> Self {
        Self {
            services: HashMap::new(),
            handles: HashMap::new(),
            shutdown,
            config,
        }
    }

    pub fn register(&mut self, service: Box<dyn Service>) {
        let name = service.name();
        self.services.insert(name, service);
    }

    /// Start all enabled services in dependency and priority order
    pub async fn start_all(&mut self) -> Result<(), String> {
        logger::info(LogTag::Service, "Starting all services...");

        let enabled_services: Vec<&'static str> = self
            .services
            .iter()
            .filter(|(_, service)| service.is_enabled(&self.config))
            .map(|(name, _)| *name)
            .collect();

        let ordered = self.resolve_startup_order(&enabled_services)?;
        logger::debug(
            LogTag::Service,
            &format!("Service startup order: {:?}", ordered),
        );

        for service_name in ordered {
            if let Some(service) = self.services.get_mut(service_name) {
                service.initialize().await?;
                let handles = service.start(self.shutdown.child_token()).await?;
                self.handles.insert(service_name, handles);
                logger::info(
                    LogTag::Service,
                    &format!("Service started: {}", service_name),
                );
            }
        }

        logger::info(LogTag::Service, "All services started");
        Ok(())
    }

    /// Stop all services in reverse startup order
    pub async fn stop_all(&mut self) -> Result<(), String> {
        logger::info(LogTag::Service, "Stopping all services...");

        self.shutdown.cancel();

        let running_services: Vec<&'static str> = self.handles.keys().copied().collect();
        let mut ordered = self.resolve_startup_order(&running_services)?;
        ordered.reverse();

        for service_name in ordered {
            if let Some(service) = self.services.get_mut(service_name) {
                if let Err(e) = service.stop().await {
                    logger::warning(
                        LogTag::Service,
                        &format!("Service stop error for {}: {}", service_name, e),
                    );
                }

                if let Some(handles) = self.handles.remove(service_name) {
                    for handle in handles {
                        if tokio::time::timeout(STOP_TIMEOUT, handle).await.is_err() {
                            logger::warning(
                                LogTag::Service,
                                &format!("Service {} did not stop in time", service_name),
                            );
                        }
                    }
                }

                logger::debug(
                    LogTag::Service,
                    &format!("Service stopped: {}", service_name),
                );
            }
        }

        logger::info(LogTag::Service, "All services stopped");
        Ok(())
    }

    pub fn running_services(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.handles.keys().copied().collect();
        names.sort_unstable();
        names
    }

    fn resolve_startup_order(
        &self,
        services: &[&'static str],
    ) -> Result<Vec<&'static str>, String> {
        use std::collections::HashSet;

        let mut ordered = Vec::new();
        let mut visited = HashSet::new();
        let mut visiting = HashSet::new();

        fn visit(
            name: &'static str,
            services: &HashMap<&'static str, Box<dyn Service>>,
            ordered: &mut Vec<&'static str>,
            visited: &mut HashSet<&'static str>,
            visiting: &mut HashSet<&'static str>,
        ) -> Result<(), String> {
            if visited.contains(name) {
                return Ok(());
            }
            if visiting.contains(name) {
                return Err(format!("Circular dependency detected for service: {}", name));
            }

            visiting.insert(name);
            if let Some(service) = services.get(name) {
                for dep in service.dependencies() {
                    visit(dep, services, ordered, visited, visiting)?;
                }
            }
            visiting.remove(name);
            visited.insert(name);
            ordered.push(name);

            Ok(())
        }

        let mut names = services.to_vec();
        names.sort_unstable();
        for service_name in names {
            visit(
                service_name,
                &self.services,
                &mut ordered,
                &mut visited,
                &mut visiting,
            )?;
        }

        ordered.retain(|name| services.contains(name));
        ordered.sort_by_key(|name| {
            self.services
                .get(name)
                .map(|s| s.priority())
                .unwrap_or(100)
        });

        Ok(ordered)
    }

    pub async fn get_health(&self) -> HashMap<&'static str, ServiceHealth> {
        let mut health = HashMap::new();
        for (name, service) in &self.services {
            health.insert(*name, service.health().await);
        }
        health
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct Recorder {
        name: &'static str,
        priority: i32,
        deps: Vec<&'static str>,
        events: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Service for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn dependencies(&self) -> Vec<&'static str> {
            self.deps.clone()
        }

        async fn start(
            &mut self,
            shutdown: CancellationToken,
        ) -> Result<Vec<JoinHandle<()>>, String> {
            self.events.lock().push(format!("start {}", self.name));
            let events = self.events.clone();
            let name = self.name;
            Ok(vec![tokio::spawn(async move {
                shutdown.cancelled().await;
                events.lock().push(format!("exit {}", name));
            })])
        }

        async fn stop(&mut self) -> Result<(), String> {
            self.events.lock().push(format!("stop {}", self.name));
            Ok(())
        }
    }

    fn recorder(
        name: &'static str,
        priority: i32,
        deps: Vec<&'static str>,
        events: &Arc<Mutex<Vec<String>>>,
    ) -> Box<dyn Service> {
        Box::new(Recorder {
            name,
            priority,
            deps,
            events: events.clone(),
        })
    }

    #[tokio::test]
    async fn test_start_in_priority_order_and_stop_in_reverse() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut manager = ServiceManager::new(Config::default(), CancellationToken::new());
        manager.register(recorder("late", 50, vec![], &events));
        manager.register(recorder("early", 10, vec![], &events));

        manager.start_all().await.unwrap();
        assert_eq!(manager.running_services(), vec!["early", "late"]);
        assert_eq!(*events.lock(), vec!["start early", "start late"]);

        manager.stop_all().await.unwrap();
        let log = events.lock().clone();
        assert_eq!(log[2], "stop late");
        assert!(log.contains(&"exit early".to_string()));
        assert!(manager.running_services().is_empty());
    }

    #[tokio::test]
    async fn test_circular_dependencies_are_rejected() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut manager = ServiceManager::new(Config::default(), CancellationToken::new());
        manager.register(recorder("a", 10, vec!["b"], &events));
        manager.register(recorder("b", 10, vec!["a"], &events));

        let err = manager.start_all().await.unwrap_err();
        assert!(err.contains("Circular dependency"));
    }
}
