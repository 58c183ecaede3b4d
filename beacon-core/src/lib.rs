pub mod config;
pub mod error;
pub mod event;
pub mod interceptor;
pub mod logging;
pub mod metadata;
pub mod model;
pub mod task;

pub use config::{Config, HealthCheckConfig, SharedHealthCheckConfig};
pub use error::{EngineError, Error, Result};
pub use event::{EventPublisher, EventSink, NamingEvent};
pub use interceptor::{Interceptable, Interceptor, InterceptorChain};
pub use metadata::{InMemoryMetadataStore, InstanceMetadata, MetadataStore};
pub use model::{Client, InstancePublishInfo, Service};
pub use task::{ExecuteTask, TaskExecuteEngine, TaskProcessor};
