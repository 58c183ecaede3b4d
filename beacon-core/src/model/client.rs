use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use super::instance::{now_millis, InstancePublishInfo};
use super::service::Service;

/// A registry client and the instances it has published.
///
/// Publications are keyed by service, so a client holds at most one instance
/// per service. The map is shared between API-driven registration and the
/// health-check worker that owns this client's routing key.
#[derive(Debug)]
pub struct Client {
    client_id: String,
    ephemeral: bool,
    publishers: DashMap<Service, Arc<InstancePublishInfo>>,
    last_updated_time: AtomicI64,
}

impl Client {
    #[must_use]
    pub fn new(client_id: impl Into<String>, ephemeral: bool) -> Self {
        Self {
            client_id: client_id.into(),
            ephemeral,
            publishers: DashMap::new(),
            last_updated_time: AtomicI64::new(now_millis()),
        }
    }

    /// Ephemeral client identified by its `ip:port`; the ephemeral flag
    /// is carried by the routing key, not the id
    #[must_use]
    pub fn ephemeral_ip_port(ip: &str, port: u16) -> Self {
        Self::new(format!("{ip}:{port}"), true)
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub const fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }

    /// Key used to pin this client's tasks to one worker
    #[must_use]
    pub fn routing_key(&self) -> String {
        format!("{}#{}", self.client_id, self.ephemeral)
    }

    /// Publish `instance` for `service`, replacing any previous record.
    /// Returns `true` if the service was not published before.
    pub fn add_service_instance(&self, service: Service, instance: InstancePublishInfo) -> bool {
        let replaced = self.publishers.insert(service, Arc::new(instance));
        self.touch();
        replaced.is_none()
    }

    pub fn remove_service_instance(&self, service: &Service) -> Option<Arc<InstancePublishInfo>> {
        let removed = self.publishers.remove(service).map(|(_, instance)| instance);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    /// Remove the publication for `service` only if it is still `expected`.
    ///
    /// Guards eviction against a concurrent re-registration that replaced the
    /// record after it was read.
    pub fn remove_service_instance_if_same(
        &self,
        service: &Service,
        expected: &Arc<InstancePublishInfo>,
    ) -> bool {
        let removed = self
            .publishers
            .remove_if(service, |_, current| Arc::ptr_eq(current, expected))
            .is_some();
        if removed {
            self.touch();
        }
        removed
    }

    #[must_use]
    pub fn instance_publish_info(&self, service: &Service) -> Option<Arc<InstancePublishInfo>> {
        self.publishers.get(service).map(|entry| Arc::clone(entry.value()))
    }

    #[must_use]
    pub fn all_published_services(&self) -> Vec<Service> {
        self.publishers.iter().map(|entry| entry.key().clone()).collect()
    }

    #[must_use]
    pub fn publication_count(&self) -> usize {
        self.publishers.len()
    }

    #[must_use]
    pub fn last_updated_time(&self) -> i64 {
        self.last_updated_time.load(Ordering::Acquire)
    }

    pub fn touch(&self) {
        self.last_updated_time.store(now_millis(), Ordering::Release);
    }

    /// An ephemeral client with nothing published and no activity for longer
    /// than `expired_time_ms` can be discarded.
    #[must_use]
    pub fn is_expired(&self, now: i64, expired_time_ms: i64) -> bool {
        self.ephemeral
            && self.publishers.is_empty()
            && now - self.last_updated_time() > expired_time_ms
    }
}
