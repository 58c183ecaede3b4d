pub mod client;
pub mod instance;
pub mod service;

pub use client::Client;
pub use instance::{
    now_millis, InstanceBuilder, InstancePublishInfo, DEFAULT_CLUSTER_NAME, HEART_BEAT_TIMEOUT,
    IP_DELETE_TIMEOUT,
};
pub use service::{Service, DEFAULT_GROUP, DEFAULT_NAMESPACE};
