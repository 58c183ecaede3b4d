//! Heartbeat-driven health checking
//!
//! The reactor submits one [`HealthCheckTask`] per client to the task engine.
//! Each task first passes the task chain (global switch, node
//! responsibility), then pushes every published instance through the
//! instance chain, where the beat checkers decide whether to mark it
//! unhealthy or evict it. At most one checker acts on an instance per pass.

pub mod beat;
pub mod beat_check_task;
pub mod checker;
pub mod expired;
pub mod interceptors;
pub mod reactor;
pub mod task;
pub mod unhealthy;

#[cfg(test)]
pub(crate) mod test_support;

pub use beat::BeatProcessor;
pub use beat_check_task::InstanceBeatCheckTask;
pub use checker::{default_instance_chain, resolve_timeout, InstanceBeatCheckerChain};
pub use expired::ExpiredInstanceChecker;
pub use interceptors::{AlwaysResponsible, HealthCheckEnabledInterceptor, Responsibility, ResponsibleInterceptor};
pub use reactor::HealthCheckReactor;
pub use task::{HealthCheckContext, HealthCheckTask};
pub use unhealthy::UnhealthyInstanceChecker;
