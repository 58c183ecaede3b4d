use std::any::TypeId;
use std::sync::Arc;
use tracing::{debug, info};

use beacon_core::metadata::MetadataStore;
use beacon_core::model::{now_millis, IP_DELETE_TIMEOUT};
use beacon_core::{EventSink, Interceptor, NamingEvent, SharedHealthCheckConfig};

use super::beat_check_task::InstanceBeatCheckTask;
use super::checker::resolve_timeout;

/// Evicts instances whose heartbeat is older than the ip delete timeout.
///
/// Disabled while `health_check.expire_instance` is off.
pub struct ExpiredInstanceChecker {
    order: i32,
    metadata: Arc<dyn MetadataStore>,
    sink: Arc<dyn EventSink>,
    config: SharedHealthCheckConfig,
}

impl ExpiredInstanceChecker {
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
            IP_DELETE_TIMEOUT,
            self.config.load().default_ip_delete_timeout_ms,
        )
    }
}

impl Interceptor<InstanceBeatCheckTask> for ExpiredInstanceChecker {
    fn order(&self) -> i32 {
        self.order
    }

    fn is_intercept_type(&self, subject_type: TypeId) -> bool {
        subject_type == TypeId::of::<InstanceBeatCheckTask>()
    }

    fn intercept(&self, task: &InstanceBeatCheckTask) -> bool {
        if !self.config.is_expire_instance() {
            return false;
        }

        let instance = task.instance();
        let elapsed = instance.elapsed_since_beat(now_millis());
        if elapsed <= self.timeout(task) {
            return false;
        }

        let client = task.client();
        let service = task.service();
        if !client.remove_service_instance_if_same(service, instance) {
            debug!(
                client_id = %client.client_id(),
                service = %service,
                "Publication changed before eviction, skipping"
            );
            return false;
        }

        info!(
            client_id = %client.client_id(),
            service = %service,
            elapsed_ms = elapsed,
            instance = %instance.to_json(),
            "Instance evicted: no heartbeat within ip delete timeout"
        );

        self.sink.publish(NamingEvent::ClientDeregisterService {
            service: service.clone(),
            client_id: client.client_id().to_string(),
        });
        self.sink.publish(NamingEvent::InstanceMetadata {
            service: service.clone(),
            metadata_id: instance.metadata_id(),
            expired: true,
        });
        true
    }

    fn name(&self) -> &'static str {
        "expired-instance-checker"
    }
}
