//! Read side of the instance metadata store
//!
//! Metadata records are owned elsewhere; the health checkers only look up
//! timeout overrides in them.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::model::Service;

/// Operator-provided metadata attached to one instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceMetadata {
    #[serde(default)]
    pub extend_data: HashMap<String, Value>,
}

impl InstanceMetadata {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extend_data.get(key)
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extend_data.insert(key.into(), value.into());
        self
    }
}

/// Lookup of per-instance metadata by service and metadata id
pub trait MetadataStore: Send + Sync {
    fn instance_metadata(&self, service: &Service, metadata_id: &str) -> Option<InstanceMetadata>;
}

/// In-process metadata store
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    records: DashMap<(Service, String), InstanceMetadata>,
}

impl InMemoryMetadataStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, service: Service, metadata_id: impl Into<String>, metadata: InstanceMetadata) {
        self.records.insert((service, metadata_id.into()), metadata);
    }

    pub fn remove(&self, service: &Service, metadata_id: &str) -> Option<InstanceMetadata> {
        self.records
            .remove(&(service.clone(), metadata_id.to_string()))
            .map(|(_, metadata)| metadata)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl MetadataStore for InMemoryMetadataStore {
    fn instance_metadata(&self, service: &Service, metadata_id: &str) -> Option<InstanceMetadata> {
        self.records
            .get(&(service.clone(), metadata_id.to_string()))
            .map(|entry| entry.value().clone())
    }
}
