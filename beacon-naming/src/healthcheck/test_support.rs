use parking_lot::Mutex;
use std::sync::Arc;

use beacon_core::model::{now_millis, Client, InstancePublishInfo, Service};
use beacon_core::{EventSink, InMemoryMetadataStore, NamingEvent, SharedHealthCheckConfig};

use super::beat_check_task::InstanceBeatCheckTask;
use super::interceptors::Responsibility;
use super::task::HealthCheckContext;

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<NamingEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<NamingEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: NamingEvent) {
        self.events.lock().push(event);
    }
}

/// Instance at 10.0.0.1:8080 whose last beat was `age_ms` ago
pub fn stale_instance(age_ms: i64, extend: &[(&str, &str)]) -> InstancePublishInfo {
    extend
        .iter()
        .fold(
            InstancePublishInfo::builder("10.0.0.1", 8080).last_heart_beat_time(now_millis() - age_ms),
            |builder, (key, value)| builder.extend(*key, *value),
        )
        .build()
        .unwrap()
}

/// Beat check subject for a fresh ephemeral client publishing "orders"
pub fn beat_task(age_ms: i64, extend: &[(&str, &str)]) -> InstanceBeatCheckTask {
    let client = Arc::new(Client::ephemeral_ip_port("10.0.0.1", 8080));
    let service = Service::with_name("orders");
    client.add_service_instance(service.clone(), stale_instance(age_ms, extend));
    let instance = client.instance_publish_info(&service).unwrap();
    InstanceBeatCheckTask::new(client, service, instance)
}

pub fn context_with(
    sink: &Arc<RecordingSink>,
    config: SharedHealthCheckConfig,
    responsibility: Arc<dyn Responsibility>,
) -> Arc<HealthCheckContext> {
    Arc::new(HealthCheckContext::with_defaults(
        Arc::new(InMemoryMetadataStore::new()),
        sink.clone(),
        config,
        responsibility,
    ))
}
