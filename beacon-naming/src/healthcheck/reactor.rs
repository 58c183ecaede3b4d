//! Periodic scheduling of health check tasks
//!
//! Each pass drops expired ephemeral clients, then hands one
//! [`HealthCheckTask`] per remaining client to the task engine, keyed so that
//! all work for a client stays on one worker.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use beacon_core::model::now_millis;
use beacon_core::{SharedHealthCheckConfig, TaskExecuteEngine};

use super::task::{HealthCheckContext, HealthCheckTask};
use crate::client_manager::ClientManager;

pub struct HealthCheckReactor {
    clients: Arc<ClientManager>,
    engine: Arc<TaskExecuteEngine>,
    context: Arc<HealthCheckContext>,
    config: SharedHealthCheckConfig,
    cancel_token: CancellationToken,
}

impl HealthCheckReactor {
    #[must_use]
    pub fn new(
        clients: Arc<ClientManager>,
        engine: Arc<TaskExecuteEngine>,
        context: Arc<HealthCheckContext>,
        config: SharedHealthCheckConfig,
    ) -> Self {
        Self {
            clients,
            engine,
            context,
            config,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Start the scheduling loop.
    ///
    /// Returns the `JoinHandle` so the caller can detect panics or task completion.
    /// Use `shutdown()` to stop the loop.
    pub fn start(&self) -> tokio::task::JoinHandle<()> {
        let clients = self.clients.clone();
        let engine = self.engine.clone();
        let context = self.context.clone();
        let config = self.config.clone();
        let cancel_token = self.cancel_token.clone();

        let snapshot = config.load();
        let initial_delay = Duration::from_millis(snapshot.initial_delay_ms);
        let period = Duration::from_millis(snapshot.check_interval_ms.max(1));

        tokio::spawn(async move {
            info!(
                initial_delay_ms = snapshot.initial_delay_ms,
                interval_ms = snapshot.check_interval_ms,
                "Health check reactor started"
            );

            tokio::select! {
                () = cancel_token.cancelled() => {
                    info!("Health check reactor shutting down");
                    return;
                }
                () = sleep(initial_delay) => {}
            }

            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel_token.cancelled() => {
                        info!("Health check reactor shutting down");
                        return;
                    }
                    _ = timer.tick() => {
                        Self::schedule(&clients, &engine, &context, &config);
                    }
                }
            }
        })
    }

    /// Run a single scheduling pass. Returns the number of tasks submitted.
    pub fn run_once(&self) -> usize {
        Self::schedule(&self.clients, &self.engine, &self.context, &self.config)
    }

    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    fn schedule(
        clients: &ClientManager,
        engine: &TaskExecuteEngine,
        context: &Arc<HealthCheckContext>,
        config: &SharedHealthCheckConfig,
    ) -> usize {
        let expired = clients.remove_expired_clients(now_millis(), config.load().client_expired_time_ms);
        if !expired.is_empty() {
            debug!(count = expired.len(), "Removed expired clients");
        }

        let mut submitted = 0;
        for client in clients.all_clients() {
            let task = HealthCheckTask::new(client, context.clone());
            let key = task.task_key();
            match engine.add_task(&key, Box::new(task)) {
                Ok(()) => submitted += 1,
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to submit health check task");
                }
            }
        }
        debug!(submitted, pending = engine.size(), "Health check pass scheduled");
        submitted
    }
}

impl Drop for HealthCheckReactor {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::healthcheck::interceptors::AlwaysResponsible;
    use crate::healthcheck::test_support::{context_with, stale_instance, RecordingSink};
    use beacon_core::model::Service;
    use beacon_core::{HealthCheckConfig, NamingEvent};

    struct Fixture {
        reactor: HealthCheckReactor,
        clients: Arc<ClientManager>,
        engine: Arc<TaskExecuteEngine>,
        sink: Arc<RecordingSink>,
    }

    fn fixture(config: HealthCheckConfig) -> Fixture {
        let sink = Arc::new(RecordingSink::default());
        let config = SharedHealthCheckConfig::new(config);
        let clients = Arc::new(ClientManager::new(sink.clone()));
        let engine = Arc::new(TaskExecuteEngine::with_worker_count("reactor-test", 2));
        let context = context_with(&sink, config.clone(), Arc::new(AlwaysResponsible));
        let reactor = HealthCheckReactor::new(clients.clone(), engine.clone(), context, config);
        Fixture {
            reactor,
            clients,
            engine,
            sink,
        }
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !done() {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_once_checks_every_client() {
        let f = fixture(HealthCheckConfig::default());
        let service = Service::with_name("orders");
        for id in ["a", "b", "c"] {
            f.clients.client_connected(id, true);
            f.clients
                .register_instance(id, service.clone(), stale_instance(20_000, &[]))
                .unwrap();
        }
        f.sink.clear();

        assert_eq!(f.reactor.run_once(), 3);
        wait_until(|| f.sink.events().len() == 6).await;

        for id in ["a", "b", "c"] {
            let client = f.clients.get_client(id).unwrap();
            assert!(!client.instance_publish_info(&service).unwrap().is_healthy());
        }
        f.engine.shutdown().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_expired_clients_removed_before_scheduling() {
        let f = fixture(HealthCheckConfig {
            client_expired_time_ms: 0,
            ..HealthCheckConfig::default()
        });
        f.clients.client_connected("idle", true);
        f.clients.client_connected("persistent", false);
        sleep(Duration::from_millis(5)).await;

        assert_eq!(f.reactor.run_once(), 1);
        assert!(f.clients.get_client("idle").is_none());
        assert!(f.sink.events().contains(&NamingEvent::ClientDisconnect {
            client_id: "idle".to_string(),
        }));
        f.engine.shutdown().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_loop_runs_until_shutdown() {
        let f = fixture(HealthCheckConfig {
            initial_delay_ms: 0,
            check_interval_ms: 10,
            ..HealthCheckConfig::default()
        });
        f.clients.client_connected("c1", true);
        f.clients
            .register_instance("c1", Service::with_name("orders"), stale_instance(60_000, &[]))
            .unwrap();

        let handle = f.reactor.start();
        // First pass marks unhealthy, a later one evicts
        wait_until(|| {
            f.clients
                .get_client("c1")
                .is_some_and(|client| client.publication_count() == 0)
        })
        .await;

        f.reactor.shutdown();
        assert!(f.reactor.is_shutdown());
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        f.engine.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_during_initial_delay() {
        let f = fixture(HealthCheckConfig {
            initial_delay_ms: 60_000,
            ..HealthCheckConfig::default()
        });
        let handle = f.reactor.start();
        f.reactor.shutdown();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(f.engine.size(), 0);
    }
}
