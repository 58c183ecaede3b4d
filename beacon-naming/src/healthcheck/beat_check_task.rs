use std::any::Any;
use std::sync::Arc;
use tracing::trace;

use beacon_core::model::{Client, InstancePublishInfo, Service};
use beacon_core::Interceptable;

/// One (client, service, instance) triple under evaluation by the beat checkers
pub struct InstanceBeatCheckTask {
    client: Arc<Client>,
    service: Service,
    instance: Arc<InstancePublishInfo>,
}

impl InstanceBeatCheckTask {
    #[must_use]
    pub fn new(client: Arc<Client>, service: Service, instance: Arc<InstancePublishInfo>) -> Self {
        Self {
            client,
            service,
            instance,
        }
    }

    #[must_use]
    pub fn client(&self) -> &Arc<Client> {
        &self.client
    }

    #[must_use]
    pub const fn service(&self) -> &Service {
        &self.service
    }

    #[must_use]
    pub fn instance(&self) -> &Arc<InstancePublishInfo> {
        &self.instance
    }

    /// Whether the record under evaluation is still the one the client
    /// publishes for this service
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.client
            .instance_publish_info(&self.service)
            .is_some_and(|published| Arc::ptr_eq(&published, &self.instance))
    }
}

impl Interceptable for InstanceBeatCheckTask {
    fn pass_intercept(&self) {
        trace!(
            client_id = %self.client.client_id(),
            service = %self.service,
            ip = %self.instance.ip(),
            port = self.instance.port(),
            "Instance beat check passed"
        );
    }

    fn after_intercept(&self) {}

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use crate::healthcheck::test_support::{beat_task, stale_instance};
    use beacon_core::model::Service;

    #[test]
    fn test_is_current_tracks_published_record() {
        let task = beat_task(0, &[]);
        assert!(task.is_current());

        task.client().add_service_instance(Service::with_name("orders"), stale_instance(0, &[]));
        assert!(!task.is_current());

        task.client().remove_service_instance(&Service::with_name("orders"));
        assert!(!task.is_current());
    }
}
