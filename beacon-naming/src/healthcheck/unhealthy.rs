use std::any::TypeId;
use std::sync::Arc;
use tracing::{debug, info};

use beacon_core::metadata::MetadataStore;
use beacon_core::model::{now_millis, HEART_BEAT_TIMEOUT};
use beacon_core::{EventSink, Interceptor, NamingEvent, SharedHealthCheckConfig};

use super::beat_check_task::InstanceBeatCheckTask;
use super::checker::resolve_timeout;

/// Marks healthy instances unhealthy once their heartbeat is older than the
/// heart beat timeout
pub struct UnhealthyInstanceChecker {
    order: i32,
    metadata: Arc<dyn MetadataStore>,
    sink: Arc<dyn EventSink>,
    config: SharedHealthCheckConfig,
}

impl UnhealthyInstanceChecker {
    #[must_use]
    pub fn new(
        order: i32,
        metadata: Arc<dyn MetadataStore>,
        sink: Arc<dyn EventSink>,
        config: SharedHealthCheckConfig,
    ) -> Self {
        Self {
            order,
            metadata,
            sink,
            config,
        }
    }

    fn timeout(&self, task: &InstanceBeatCheckTask) -> i64 {
        resolve_timeout(
            self.metadata.as_ref(),
            task.service(),
            task.instance(),
            HEART_BEAT_TIMEOUT,
            self.config.load().default_heart_beat_timeout_ms,
        )
    }
}

impl Interceptor<InstanceBeatCheckTask> for UnhealthyInstanceChecker {
    fn order(&self) -> i32 {
        self.order
    }

    fn is_intercept_type(&self, subject_type: TypeId) -> bool {
        subject_type == TypeId::of::<InstanceBeatCheckTask>()
    }

    fn intercept(&self, task: &InstanceBeatCheckTask) -> bool {
        let instance = task.instance();
        if !instance.is_healthy() {
            return false;
        }

        let elapsed = instance.elapsed_since_beat(now_millis());
        if elapsed <= self.timeout(task) {
            return false;
        }

        if !task.is_current() {
            debug!(client_id = %task.client().client_id(), service = %task.service(), "Instance replaced or withdrawn, skipping");
            return false;
        }

        // Another pass may have won the race since the check above
        if !instance.mark_unhealthy() {
            debug!(client_id = %task.client().client_id(), "Instance already marked unhealthy");
            return false;
        }

        info!(
            client_id = %task.client().client_id(),
            service = %task.service(),
            ip = %instance.ip(),
            port = instance.port(),
            cluster = %instance.cluster(),
            last_beat = instance.last_heart_beat_time(),
            elapsed_ms = elapsed,
            "Instance marked unhealthy: heartbeat timed out"
        );

        self.sink.publish(NamingEvent::ServiceChanged {
            service: task.service().clone(),
        });
        self.sink.publish(NamingEvent::ClientChanged {
            client_id: task.client().client_id().to_string(),
        });
        true
    }

    fn name(&self) -> &'static str {
        "unhealthy-instance-checker"
    }
}
