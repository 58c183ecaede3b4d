//! Registry change events
//!
//! Producers hand events to an [`EventSink`]; cluster sync and push
//! notification consume them on the other side of the channel.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::model::Service;

/// Events emitted when registry membership or health changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NamingEvent {
    /// Instances of a service changed; subscribers should be pushed
    ServiceChanged { service: Service },

    /// A client's publications changed; peers should resync it
    ClientChanged { client_id: String },

    /// A client published an instance for a service
    ClientRegisterService { service: Service, client_id: String },

    /// A client's instance for a service was removed
    ClientDeregisterService { service: Service, client_id: String },

    /// A client went away together with everything it published
    ClientDisconnect { client_id: String },

    /// The metadata record of an instance should be refreshed or, when
    /// `expired`, purged
    InstanceMetadata {
        service: Service,
        metadata_id: String,
        expired: bool,
    },
}

impl NamingEvent {
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::ServiceChanged { .. } => "service_changed",
            Self::ClientChanged { .. } => "client_changed",
            Self::ClientRegisterService { .. } => "client_register_service",
            Self::ClientDeregisterService { .. } => "client_deregister_service",
            Self::ClientDisconnect { .. } => "client_disconnect",
            Self::InstanceMetadata { .. } => "instance_metadata",
        }
    }
}

/// Fire-and-forget event destination
pub trait EventSink: Send + Sync {
    fn publish(&self, event: NamingEvent);
}

/// Broadcast-channel backed sink
///
/// Publishing never blocks; slow subscribers observe `Lagged` on their end.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    tx: broadcast::Sender<NamingEvent>,
}

impl EventPublisher {
    pub const DEFAULT_CAPACITY: usize = 16384;

    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<NamingEvent> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl EventSink for EventPublisher {
    fn publish(&self, event: NamingEvent) {
        let event_type = event.event_type();
        match self.tx.send(event) {
            Ok(receivers) => {
                trace!(event_type, receivers, "Event published");
            }
            Err(_) => {
                debug!(event_type, "No subscribers, event dropped");
            }
        }
    }
}
