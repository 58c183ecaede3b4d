//! Gates on the per-client health check task

use std::any::TypeId;
use std::sync::Arc;
use tracing::trace;

use beacon_core::{Interceptor, SharedHealthCheckConfig};

use super::task::HealthCheckTask;

/// Decides which node runs the health checks of a client
#[cfg_attr(test, mockall::automock)]
pub trait Responsibility: Send + Sync {
    fn is_responsible(&self, client_id: &str) -> bool;
}

/// Single-node deployments own every client
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysResponsible;

impl Responsibility for AlwaysResponsible {
    fn is_responsible(&self, _client_id: &str) -> bool {
        true
    }
}

/// Stops every health check task while health checks are switched off
pub struct HealthCheckEnabledInterceptor {
    config: SharedHealthCheckConfig,
}

impl HealthCheckEnabledInterceptor {
    #[must_use]
    pub const fn new(config: SharedHealthCheckConfig) -> Self {
        Self { config }
    }
}

impl Interceptor<HealthCheckTask> for HealthCheckEnabledInterceptor {
    fn order(&self) -> i32 {
        i32::MIN
    }

    fn is_intercept_type(&self, subject_type: TypeId) -> bool {
        subject_type == TypeId::of::<HealthCheckTask>()
    }

    fn intercept(&self, task: &HealthCheckTask) -> bool {
        let disabled = !self.config.is_health_check_enabled();
        if disabled {
            trace!(client_id = %task.client().client_id(), "Health check disabled");
        }
        disabled
    }

    fn name(&self) -> &'static str {
        "health-check-enabled"
    }
}

/// Stops tasks for clients owned by another node
pub struct ResponsibleInterceptor {
    responsibility: Arc<dyn Responsibility>,
}

impl ResponsibleInterceptor {
    #[must_use]
    pub fn new(responsibility: Arc<dyn Responsibility>) -> Self {
        Self { responsibility }
    }
}

impl Interceptor<HealthCheckTask> for ResponsibleInterceptor {
    fn order(&self) -> i32 {
        i32::MIN + 1
    }

    fn is_intercept_type(&self, subject_type: TypeId) -> bool {
        subject_type == TypeId::of::<HealthCheckTask>()
    }

    fn intercept(&self, task: &HealthCheckTask) -> bool {
        !self.responsibility.is_responsible(task.client().client_id())
    }

    fn name(&self) -> &'static str {
        "responsible"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::healthcheck::test_support::{beat_task, context_with, RecordingSink};
    use beacon_core::HealthCheckConfig;

    #[test]
    fn test_disabled_health_check_stops_task() {
        let sink = Arc::new(RecordingSink::default());
        let config = SharedHealthCheckConfig::new(HealthCheckConfig {
            enabled: false,
            ..HealthCheckConfig::default()
        });
        let context = context_with(&sink, config.clone(), Arc::new(AlwaysResponsible));
        let beat = beat_task(20_000, &[]);
        let task = HealthCheckTask::new(beat.client().clone(), context);

        assert!(HealthCheckEnabledInterceptor::new(config.clone()).intercept(&task));
        assert!(task.context().task_chain().do_interceptor(&task));
        assert!(beat.instance().is_healthy());
        assert!(sink.events().is_empty());

        config.store(HealthCheckConfig::default());
        assert!(!task.context().task_chain().do_interceptor(&task));
        assert!(!beat.instance().is_healthy());
    }

    #[test]
    fn test_foreign_client_is_skipped() {
        let sink = Arc::new(RecordingSink::default());
        let beat = beat_task(20_000, &[]);
        let client_id = beat.client().client_id().to_string();

        let mut responsibility = MockResponsibility::new();
        responsibility
            .expect_is_responsible()
            .withf(move |id| id.to_string() == client_id)
            .times(1)
            .return_const(false);

        let context = context_with(
            &sink,
            SharedHealthCheckConfig::default(),
            Arc::new(responsibility),
        );
        let task = HealthCheckTask::new(beat.client().clone(), context);

        assert!(task.context().task_chain().do_interceptor(&task));
        assert!(beat.instance().is_healthy());
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_gates_run_before_anything_else() {
        let config = SharedHealthCheckConfig::default();
        let enabled = HealthCheckEnabledInterceptor::new(config);
        let responsible = ResponsibleInterceptor::new(Arc::new(AlwaysResponsible));
        assert!(enabled.order() < responsible.order());
    }
}
