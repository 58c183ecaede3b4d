//! Registry of connected clients and their publications

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

use beacon_core::model::{Client, InstancePublishInfo, Service};
use beacon_core::{Error, EventSink, NamingEvent, Result};

pub struct ClientManager {
    clients: DashMap<String, Arc<Client>>,
    sink: Arc<dyn EventSink>,
}

impl ClientManager {
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            clients: DashMap::new(),
            sink,
        }
    }

    /// Register a client, or return the one already known under `client_id`
    pub fn client_connected(&self, client_id: &str, ephemeral: bool) -> Arc<Client> {
        self.clients
            .entry(client_id.to_string())
            .or_insert_with(|| {
                info!(client_id, ephemeral, "Client connected");
                Arc::new(Client::new(client_id, ephemeral))
            })
            .clone()
    }

    /// Drop a client together with everything it published
    pub fn client_disconnected(&self, client_id: &str) -> Option<Arc<Client>> {
        let (_, client) = self.clients.remove(client_id)?;
        info!(
            client_id,
            publications = client.publication_count(),
            "Client disconnected"
        );
        self.sink.publish(NamingEvent::ClientDisconnect {
            client_id: client_id.to_string(),
        });
        Some(client)
    }

    #[must_use]
    pub fn get_client(&self, client_id: &str) -> Option<Arc<Client>> {
        self.clients.get(client_id).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn all_client_ids(&self) -> Vec<String> {
        self.clients.iter().map(|entry| entry.key().clone()).collect()
    }

    #[must_use]
    pub fn all_clients(&self) -> Vec<Arc<Client>> {
        self.clients.iter().map(|entry| entry.value().clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Publish `instance` for `service` on behalf of a connected client
    pub fn register_instance(
        &self,
        client_id: &str,
        service: Service,
        instance: InstancePublishInfo,
    ) -> Result<()> {
        // The entry guard keeps expiry from removing the client until the
        // publication is in place
        let client = self
            .clients
            .get(client_id)
            .ok_or_else(|| not_connected(client_id))?;
        debug!(client_id, service = %service, ip = %instance.ip(), port = instance.port(), "Registering instance");
        client.add_service_instance(service.clone(), instance);
        drop(client);

        self.sink.publish(NamingEvent::ClientRegisterService {
            service,
            client_id: client_id.to_string(),
        });
        self.sink.publish(NamingEvent::ClientChanged {
            client_id: client_id.to_string(),
        });
        Ok(())
    }

    /// Withdraw the client's instance for `service`. Returns the removed
    /// record, or `None` if nothing was published.
    pub fn deregister_instance(
        &self,
        client_id: &str,
        service: &Service,
    ) -> Result<Option<Arc<InstancePublishInfo>>> {
        let client = self.require(client_id)?;
        let Some(removed) = client.remove_service_instance(service) else {
            return Ok(None);
        };

        debug!(client_id, service = %service, "Deregistered instance");
        self.sink.publish(NamingEvent::ClientDeregisterService {
            service: service.clone(),
            client_id: client_id.to_string(),
        });
        self.sink.publish(NamingEvent::ClientChanged {
            client_id: client_id.to_string(),
        });
        Ok(Some(removed))
    }

    /// Remove ephemeral clients with no publications that have been idle for
    /// longer than `expired_time_ms`. Returns the removed ids.
    pub fn remove_expired_clients(&self, now: i64, expired_time_ms: i64) -> Vec<String> {
        let candidates: Vec<String> = self
            .clients
            .iter()
            .filter(|entry| entry.value().is_expired(now, expired_time_ms))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = Vec::with_capacity(candidates.len());
        for client_id in candidates {
            // Re-checked under the shard lock: a registration may have landed
            if self
                .clients
                .remove_if(&client_id, |_, client| client.is_expired(now, expired_time_ms))
                .is_none()
            {
                continue;
            }
            info!(client_id = %client_id, "Client expired, removing");
            self.sink.publish(NamingEvent::ClientDisconnect {
                client_id: client_id.clone(),
            });
            removed.push(client_id);
        }
        removed
    }

    fn require(&self, client_id: &str) -> Result<Arc<Client>> {
        self.get_client(client_id).ok_or_else(|| not_connected(client_id))
    }
}

fn not_connected(client_id: &str) -> Error {
    Error::NotFound(format!("client {client_id} is not connected"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::healthcheck::test_support::RecordingSink;
    use beacon_core::model::now_millis;
    use std::sync::Barrier;

    fn manager() -> (ClientManager, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (ClientManager::new(sink.clone()), sink)
    }

    #[test]
    fn test_connect_is_idempotent() {
        let (manager, _) = manager();
        let first = manager.client_connected("c1", true);
        let second = manager.client_connected("c1", false);

        assert!(Arc::ptr_eq(&first, &second));
        assert!(second.is_ephemeral());
        assert_eq!(manager.all_client_ids(), vec!["c1".to_string()]);
    }

    #[test]
    fn test_register_and_deregister_publish_events() {
        let (manager, sink) = manager();
        manager.client_connected("c1", true);
        let service = Service::with_name("orders");

        manager
            .register_instance("c1", service.clone(), InstancePublishInfo::new("10.0.0.1", 8080))
            .unwrap();
        assert_eq!(
            sink.events(),
            vec![
                NamingEvent::ClientRegisterService {
                    service: service.clone(),
                    client_id: "c1".to_string(),
                },
                NamingEvent::ClientChanged {
                    client_id: "c1".to_string(),
                },
            ]
        );

        sink.clear();
        let removed = manager.deregister_instance("c1", &service).unwrap();
        assert_eq!(removed.map(|instance| instance.port()), Some(8080));
        assert_eq!(sink.events()[0].event_type(), "client_deregister_service");

        sink.clear();
        assert!(manager.deregister_instance("c1", &service).unwrap().is_none());
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_unknown_client_is_not_found() {
        let (manager, sink) = manager();
        let err = manager
            .register_instance("ghost", Service::with_name("orders"), InstancePublishInfo::new("10.0.0.1", 80))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_disconnect_publishes_event() {
        let (manager, sink) = manager();
        manager.client_connected("c1", true);

        assert!(manager.client_disconnected("c1").is_some());
        assert!(manager.client_disconnected("c1").is_none());
        assert_eq!(
            sink.events(),
            vec![NamingEvent::ClientDisconnect {
                client_id: "c1".to_string(),
            }]
        );
        assert!(manager.is_empty());
    }

    #[test]
    fn test_only_idle_empty_ephemeral_clients_expire() {
        let (manager, sink) = manager();
        manager.client_connected("idle", true);
        manager.client_connected("persistent", false);
        manager.client_connected("busy", true);
        manager
            .register_instance("busy", Service::with_name("orders"), InstancePublishInfo::new("10.0.0.2", 80))
            .unwrap();
        sink.clear();

        let later = now_millis() + 60_000;
        assert_eq!(manager.remove_expired_clients(later, 30_000), vec!["idle".to_string()]);
        assert_eq!(manager.len(), 2);
        assert_eq!(
            sink.events(),
            vec![NamingEvent::ClientDisconnect {
                client_id: "idle".to_string(),
            }]
        );

        assert!(manager.remove_expired_clients(now_millis(), 30_000).is_empty());
    }

    #[test]
    fn test_registration_racing_expiry_is_never_orphaned() {
        let service = Service::with_name("orders");
        for _ in 0..500 {
            let (manager, _) = manager();
            manager.client_connected("c1", true);
            let later = now_millis() + 60_000;
            let barrier = Barrier::new(2);

            let registered = std::thread::scope(|scope| {
                let register = scope.spawn(|| {
                    barrier.wait();
                    manager.register_instance("c1", service.clone(), InstancePublishInfo::new("10.0.0.1", 80))
                });
                scope.spawn(|| {
                    barrier.wait();
                    manager.remove_expired_clients(later, 30_000)
                });
                register.join().unwrap()
            });

            // Either the registration lost cleanly or the client survived with it
            match registered {
                Ok(()) => {
                    let client = manager.get_client("c1").expect("registered client was expired");
                    assert_eq!(client.publication_count(), 1);
                }
                Err(err) => {
                    assert!(matches!(err, Error::NotFound(_)));
                    assert!(manager.is_empty());
                }
            }
        }
    }
}
