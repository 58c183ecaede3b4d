//! Shared pieces of the instance beat checkers

use serde_json::Value;
use std::sync::Arc;

use beacon_core::metadata::MetadataStore;
use beacon_core::model::{InstancePublishInfo, Service};
use beacon_core::{EventSink, Interceptor, InterceptorChain, SharedHealthCheckConfig};

use super::beat_check_task::InstanceBeatCheckTask;
use super::expired::ExpiredInstanceChecker;
use super::unhealthy::UnhealthyInstanceChecker;

/// Chain evaluating one instance per pass
pub type InstanceBeatCheckerChain = InterceptorChain<InstanceBeatCheckTask>;

/// Resolve a timeout for `instance`: metadata store first, then the
/// instance's own extend datum, then `default_ms`.
///
/// Values that do not convert to a whole number of millis count as the
/// default.
pub fn resolve_timeout(
    metadata: &dyn MetadataStore,
    service: &Service,
    instance: &InstancePublishInfo,
    key: &str,
    default_ms: i64,
) -> i64 {
    metadata
        .instance_metadata(service, &instance.metadata_id())
        .and_then(|record| record.get(key).cloned())
        .or_else(|| instance.extend_datum().get(key).cloned())
        .map_or(default_ms, |value| to_millis(&value).unwrap_or(default_ms))
}

fn to_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Build the instance chain with both beat checkers, placed at the orders
/// configured in `config`.
#[must_use]
pub fn default_instance_chain(
    metadata: Arc<dyn MetadataStore>,
    sink: Arc<dyn EventSink>,
    config: SharedHealthCheckConfig,
) -> InstanceBeatCheckerChain {
    let snapshot = config.load();
    let checkers: [Arc<dyn Interceptor<InstanceBeatCheckTask>>; 2] = [
        Arc::new(UnhealthyInstanceChecker::new(
            snapshot.unhealthy_checker_order,
            metadata.clone(),
            sink.clone(),
            config.clone(),
        )),
        Arc::new(ExpiredInstanceChecker::new(
            snapshot.expired_checker_order,
            metadata,
            sink,
            config,
        )),
    ];
    InterceptorChain::with_interceptors(checkers)
}
