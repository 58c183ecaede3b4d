use std::sync::Arc;
use tracing::{debug, info};

use beacon_core::model::{now_millis, Client, Service};
use beacon_core::{EventSink, NamingEvent};

/// Applies client heartbeats to published instances
pub struct BeatProcessor {
    sink: Arc<dyn EventSink>,
}

impl BeatProcessor {
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    /// Refresh the heartbeat of `client`'s instance for `service`, bringing
    /// it back to healthy if a checker had marked it down.
    ///
    /// Returns `false` when the client publishes nothing for `service`.
    pub fn process(&self, client: &Client, service: &Service) -> bool {
        let Some(instance) = client.instance_publish_info(service) else {
            debug!(client_id = %client.client_id(), service = %service, "Beat for unknown publication");
            return false;
        };

        instance.set_last_heart_beat_time(now_millis());
        if instance.mark_healthy() {
            info!(
                client_id = %client.client_id(),
                service = %service,
                ip = %instance.ip(),
                port = instance.port(),
                cluster = %instance.cluster(),
                "Instance healthy again: client beat ok"
            );
            self.sink.publish(NamingEvent::ServiceChanged {
                service: service.clone(),
            });
            self.sink.publish(NamingEvent::ClientChanged {
                client_id: client.client_id().to_string(),
            });
        }
        true
    }
}
