//! Instance publication records
//!
//! The health flag and heartbeat timestamp are mutated concurrently by beat
//! handling and the health-check workers, so both are atomics; everything
//! else is fixed at registration time.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use crate::error::{Error, Result};

/// Metadata key overriding the unhealthy-marking timeout (millis)
pub const HEART_BEAT_TIMEOUT: &str = "heart_beat_timeout";
/// Metadata key overriding the eviction timeout (millis)
pub const IP_DELETE_TIMEOUT: &str = "ip_delete_timeout";

pub const DEFAULT_CLUSTER_NAME: &str = "DEFAULT";
pub const MIN_WEIGHT_VALUE: f64 = 0.0;
pub const MAX_WEIGHT_VALUE: f64 = 10000.0;

/// Current wall-clock time in epoch millis
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Health-check flavour of a published instance
#[derive(Debug)]
pub struct InstancePublishInfo {
    ip: String,
    port: u16,
    cluster: String,
    weight: f64,
    extend_datum: HashMap<String, Value>,
    healthy: AtomicBool,
    last_heart_beat_time: AtomicI64,
}

impl InstancePublishInfo {
    /// Healthy instance in the default cluster, last beat now
    #[must_use]
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
            cluster: DEFAULT_CLUSTER_NAME.to_string(),
            weight: 1.0,
            extend_datum: HashMap::new(),
            healthy: AtomicBool::new(true),
            last_heart_beat_time: AtomicI64::new(now_millis()),
        }
    }

    #[must_use]
    pub fn builder(ip: impl Into<String>, port: u16) -> InstanceBuilder {
        InstanceBuilder::new(ip, port)
    }

    #[must_use]
    pub fn ip(&self) -> &str {
        &self.ip
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    #[must_use]
    pub const fn weight(&self) -> f64 {
        self.weight
    }

    #[must_use]
    pub const fn extend_datum(&self) -> &HashMap<String, Value> {
        &self.extend_datum
    }

    /// Key of this instance's record in the metadata store
    #[must_use]
    pub fn metadata_id(&self) -> String {
        format!("{}:{}:{}", self.ip, self.port, self.cluster)
    }

    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// Flip healthy -> unhealthy. Returns `true` only for the caller that
    /// performed the transition.
    pub fn mark_unhealthy(&self) -> bool {
        self.healthy
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Flip unhealthy -> healthy. Returns `true` only for the caller that
    /// performed the transition.
    pub fn mark_healthy(&self) -> bool {
        self.healthy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[must_use]
    pub fn last_heart_beat_time(&self) -> i64 {
        self.last_heart_beat_time.load(Ordering::Acquire)
    }

    pub fn set_last_heart_beat_time(&self, millis: i64) {
        self.last_heart_beat_time.store(millis, Ordering::Release);
    }

    /// Millis since the last heartbeat, measured against `now`
    #[must_use]
    pub fn elapsed_since_beat(&self, now: i64) -> i64 {
        now - self.last_heart_beat_time()
    }

    /// Compact JSON form used in eviction logs
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::json!({
            "ip": self.ip,
            "port": self.port,
            "cluster": self.cluster,
            "weight": self.weight,
            "healthy": self.is_healthy(),
            "lastHeartBeatTime": self.last_heart_beat_time(),
            "extendDatum": self.extend_datum,
        })
        .to_string()
    }
}

/// Validating builder for [`InstancePublishInfo`]
#[derive(Debug, Clone)]
pub struct InstanceBuilder {
    ip: String,
    port: u16,
    cluster: Option<String>,
    weight: f64,
    healthy: bool,
    last_heart_beat_time: Option<i64>,
    extend_datum: HashMap<String, Value>,
}

impl InstanceBuilder {
    fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
            cluster: None,
            weight: 1.0,
            healthy: true,
            last_heart_beat_time: None,
            extend_datum: HashMap::new(),
        }
    }

    /// Blank names fall back to [`DEFAULT_CLUSTER_NAME`]
    #[must_use]
    pub fn cluster(mut self, cluster: impl Into<String>) -> Self {
        let cluster = cluster.into();
        self.cluster = (!cluster.trim().is_empty()).then_some(cluster);
        self
    }

    #[must_use]
    pub const fn weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    #[must_use]
    pub const fn healthy(mut self, healthy: bool) -> Self {
        self.healthy = healthy;
        self
    }

    #[must_use]
    pub const fn last_heart_beat_time(mut self, millis: i64) -> Self {
        self.last_heart_beat_time = Some(millis);
        self
    }

    #[must_use]
    pub fn extend(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extend_datum.insert(key.into(), value.into());
        self
    }

    /// Merge metadata given either as a JSON object or as `k=v,k=v`
    pub fn metadata(mut self, raw: &str) -> Result<Self> {
        self.extend_datum.extend(parse_metadata(raw)?);
        Ok(self)
    }

    pub fn build(self) -> Result<InstancePublishInfo> {
        if self.ip.trim().is_empty() {
            return Err(Error::InvalidInput("instance ip must not be empty".to_string()));
        }
        if !(MIN_WEIGHT_VALUE..=MAX_WEIGHT_VALUE).contains(&self.weight) {
            return Err(Error::InvalidInput(format!(
                "instance format invalid: The weights range from {MIN_WEIGHT_VALUE} to {MAX_WEIGHT_VALUE}"
            )));
        }

        Ok(InstancePublishInfo {
            ip: self.ip,
            port: self.port,
            cluster: self
                .cluster
                .unwrap_or_else(|| DEFAULT_CLUSTER_NAME.to_string()),
            weight: self.weight,
            extend_datum: self.extend_datum,
            healthy: AtomicBool::new(self.healthy),
            last_heart_beat_time: AtomicI64::new(self.last_heart_beat_time.unwrap_or_else(now_millis)),
        })
    }
}

fn parse_metadata(raw: &str) -> Result<HashMap<String, Value>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(HashMap::new());
    }

    if let Ok(map) = serde_json::from_str::<HashMap<String, Value>>(raw) {
        return Ok(map);
    }

    raw.split(',')
        .filter(|entry| !entry.trim().is_empty())
        .map(|entry| {
            entry
                .split_once('=')
                .map(|(k, v)| (k.trim().to_string(), Value::String(v.trim().to_string())))
                .ok_or_else(|| Error::InvalidInput(format!("metadata format incorrect: {raw}")))
        })
        .collect()
}
