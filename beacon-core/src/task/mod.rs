//! Keyed task execution
//!
//! Tasks are routed to a fixed set of single-consumer workers by the hash of
//! their key, which serializes all work for one key while unrelated keys run
//! in parallel.

pub mod engine;
pub mod worker;

pub use engine::{suitable_thread_count, TaskExecuteEngine};
pub use worker::TaskExecuteWorker;

/// A unit of work executed by a [`TaskExecuteWorker`].
///
/// Tasks run on a blocking-capable thread and must not wait on other tasks:
/// a worker executes one task at a time.
pub trait ExecuteTask: Send + 'static {
    fn run(&self) -> anyhow::Result<()>;

    /// Short label used in worker logs
    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

/// Handles tasks for one key in place of the worker pool
pub trait TaskProcessor: Send + Sync {
    fn process(&self, task: Box<dyn ExecuteTask>) -> anyhow::Result<()>;
}
