pub mod client_manager;
pub mod healthcheck;

pub use client_manager::ClientManager;
pub use healthcheck::{
    AlwaysResponsible, BeatProcessor, HealthCheckContext, HealthCheckReactor, HealthCheckTask,
    Responsibility,
};
