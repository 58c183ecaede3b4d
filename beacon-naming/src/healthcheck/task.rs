use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, trace};

use beacon_core::metadata::MetadataStore;
use beacon_core::model::Client;
use beacon_core::task::ExecuteTask;
use beacon_core::{EventSink, Interceptable, Interceptor, InterceptorChain, SharedHealthCheckConfig};

use super::beat_check_task::InstanceBeatCheckTask;
use super::checker::{default_instance_chain, InstanceBeatCheckerChain};
use super::interceptors::{HealthCheckEnabledInterceptor, Responsibility, ResponsibleInterceptor};

/// Chains shared by every health check task of one node
pub struct HealthCheckContext {
    task_chain: InterceptorChain<HealthCheckTask>,
    instance_chain: InstanceBeatCheckerChain,
}

impl HealthCheckContext {
    #[must_use]
    pub const fn new(
        task_chain: InterceptorChain<HealthCheckTask>,
        instance_chain: InstanceBeatCheckerChain,
    ) -> Self {
        Self {
            task_chain,
            instance_chain,
        }
    }

    /// Gate interceptors on the task chain and both beat checkers on the
    /// instance chain
    #[must_use]
    pub fn with_defaults(
        metadata: Arc<dyn MetadataStore>,
        sink: Arc<dyn EventSink>,
        config: SharedHealthCheckConfig,
        responsibility: Arc<dyn Responsibility>,
    ) -> Self {
        let gates: [Arc<dyn Interceptor<HealthCheckTask>>; 2] = [
            Arc::new(HealthCheckEnabledInterceptor::new(config.clone())),
            Arc::new(ResponsibleInterceptor::new(responsibility)),
        ];
        Self::new(
            InterceptorChain::with_interceptors(gates),
            default_instance_chain(metadata, sink, config),
        )
    }

    #[must_use]
    pub const fn task_chain(&self) -> &InterceptorChain<HealthCheckTask> {
        &self.task_chain
    }

    #[must_use]
    pub const fn instance_chain(&self) -> &InstanceBeatCheckerChain {
        &self.instance_chain
    }
}

/// Heartbeat check of every instance one client has published
pub struct HealthCheckTask {
    client: Arc<Client>,
    context: Arc<HealthCheckContext>,
}

impl HealthCheckTask {
    #[must_use]
    pub fn new(client: Arc<Client>, context: Arc<HealthCheckContext>) -> Self {
        Self { client, context }
    }

    /// Routing key in the task engine
    #[must_use]
    pub fn task_key(&self) -> String {
        self.client.routing_key()
    }

    #[must_use]
    pub fn client(&self) -> &Arc<Client> {
        &self.client
    }

    #[must_use]
    pub fn context(&self) -> &Arc<HealthCheckContext> {
        &self.context
    }

    /// Push every published instance through the instance chain. A panic
    /// in a checker is logged and ends this run; the next pass retries.
    pub fn do_health_check(&self) {
        let result = catch_unwind(AssertUnwindSafe(|| self.check_instances()));
        if let Err(panic) = result {
            let reason = panic
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(
                client_id = %self.client.client_id(),
                reason = %reason,
                "Exception while processing client beat time out"
            );
        }
    }

    fn check_instances(&self) {
        for service in self.client.all_published_services() {
            // Removed concurrently since the listing
            let Some(instance) = self.client.instance_publish_info(&service) else {
                continue;
            };
            let subject = InstanceBeatCheckTask::new(self.client.clone(), service, instance);
            self.context.instance_chain.do_interceptor(&subject);
        }
    }
}

impl Interceptable for HealthCheckTask {
    fn pass_intercept(&self) {
        self.do_health_check();
    }

    fn after_intercept(&self) {
        trace!(client_id = %self.client.client_id(), "Health check task intercepted");
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl ExecuteTask for HealthCheckTask {
    fn run(&self) -> anyhow::Result<()> {
        self.context.task_chain.do_interceptor(self);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("health-check({})", self.client.client_id())
    }
}
