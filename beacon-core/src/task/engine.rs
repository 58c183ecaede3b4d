use dashmap::DashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, error, info};

use super::worker::TaskExecuteWorker;
use super::{ExecuteTask, TaskProcessor};
use crate::config::EngineConfig;
use crate::error::EngineError;

/// Smallest power of two that is at least `available cores * multiple`
#[must_use]
pub fn suitable_thread_count(multiple: usize) -> usize {
    let cores = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
    (cores * multiple.max(1)).next_power_of_two()
}

/// Fixed pool of workers with stable key -> worker routing.
///
/// All tasks added under one key land on the same worker and run in the
/// order they were added. The pool size never changes after construction.
pub struct TaskExecuteEngine {
    name: String,
    workers: Vec<TaskExecuteWorker>,
    processors: DashMap<String, Arc<dyn TaskProcessor>>,
}

impl TaskExecuteEngine {
    /// Engine with [`suitable_thread_count`] workers
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self::with_worker_count(name, suitable_thread_count(1))
    }

    #[must_use]
    pub fn with_worker_count(name: &str, worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let workers = (0..worker_count)
            .map(|index| TaskExecuteWorker::new(name, index, worker_count))
            .collect();

        info!(engine = %name, worker_count, "Task execute engine started");

        Self {
            name: name.to_string(),
            workers,
            processors: DashMap::new(),
        }
    }

    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        match config.worker_count {
            Some(count) => Self::with_worker_count(&config.name, count),
            None => Self::new(&config.name),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Route `task` to its key's processor if one is registered, otherwise
    /// to the worker owning `key`.
    pub fn add_task(&self, key: &str, task: Box<dyn ExecuteTask>) -> Result<(), EngineError> {
        let processor = self.processors.get(key).map(|entry| Arc::clone(entry.value()));
        if let Some(processor) = processor {
            return processor.process(task).map_err(|e| {
                debug!(engine = %self.name, key, error = %e, "Task processor failed");
                EngineError::Processor {
                    key: key.to_string(),
                    reason: e.to_string(),
                }
            });
        }

        self.workers[self.worker_index(key)].process(task)
    }

    /// Index of the worker that owns `key`
    #[must_use]
    pub fn worker_index(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        // u64 hash is never negative; the modulus fits in usize
        (hasher.finish() % self.workers.len() as u64) as usize
    }

    #[must_use]
    pub fn workers_count(&self) -> usize {
        self.workers.len()
    }

    /// Tasks waiting across all workers; approximate while tasks are flowing
    #[must_use]
    pub fn size(&self) -> usize {
        self.workers
            .iter()
            .map(TaskExecuteWorker::pending_task_count)
            .sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// One status line per worker
    #[must_use]
    pub fn workers_status(&self) -> String {
        self.workers.iter().fold(String::new(), |mut acc, worker| {
            acc.push_str(&worker.status());
            acc.push('\n');
            acc
        })
    }

    /// Handle tasks for `key` with `processor` instead of queuing them
    pub fn add_processor(&self, key: impl Into<String>, processor: Arc<dyn TaskProcessor>) {
        self.processors.insert(key.into(), processor);
    }

    pub fn remove_processor(&self, key: &str) -> Option<Arc<dyn TaskProcessor>> {
        self.processors.remove(key).map(|(_, processor)| processor)
    }

    /// Not supported: queued tasks cannot be withdrawn from a worker
    pub fn remove_task(&self, key: &str) -> Result<Box<dyn ExecuteTask>, EngineError> {
        error!(engine = %self.name, key, "remove_task called on execute engine");
        Err(EngineError::Unsupported(
            "execute task engine does not support remove task",
        ))
    }

    /// Not supported: workers do not index queued tasks by key
    pub fn all_task_keys(&self) -> Result<Vec<String>, EngineError> {
        error!(engine = %self.name, "all_task_keys called on execute engine");
        Err(EngineError::Unsupported(
            "execute task engine does not support get all task keys",
        ))
    }

    /// Stop every worker, continuing past individual failures
    pub fn shutdown(&self) -> Result<(), EngineError> {
        let failures: Vec<String> = self
            .workers
            .iter()
            .filter_map(|worker| worker.shutdown().err())
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            error!(engine = %self.name, failures = ?failures, "Some task workers failed to stop cleanly");
            Err(EngineError::ShutdownFailed(failures))
        }
    }

    /// Wait until every worker loop has exited
    pub async fn join(&self) {
        for worker in &self.workers {
            worker.join().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    struct FnTask<F>(F);

    impl<F> ExecuteTask for FnTask<F>
    where
        F: Fn() -> anyhow::Result<()> + Send + 'static,
    {
        fn run(&self) -> anyhow::Result<()> {
            (self.0)()
        }
    }

    fn task<F>(f: F) -> Box<dyn ExecuteTask>
    where
        F: Fn() -> anyhow::Result<()> + Send + 'static,
    {
        Box::new(FnTask(f))
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !done() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[test]
    fn test_suitable_thread_count_is_power_of_two() {
        let count = suitable_thread_count(1);
        assert!(count >= 1);
        assert!(count.is_power_of_two());
        assert!(suitable_thread_count(2) >= count);
    }

    #[tokio::test]
    async fn test_routing_is_stable() {
        let engine = TaskExecuteEngine::with_worker_count("test", 8);
        for key in ["a", "client-1#true", "10.0.0.1:8080#true", ""] {
            let first = engine.worker_index(key);
            assert!(first < 8);
            for _ in 0..100 {
                assert_eq!(engine.worker_index(key), first);
            }
        }
    }

    #[tokio::test]
    async fn test_zero_workers_is_clamped() {
        let engine = TaskExecuteEngine::with_worker_count("test", 0);
        assert_eq!(engine.workers_count(), 1);
        assert_eq!(engine.worker_index("anything"), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_key_runs_in_order_without_overlap() {
        let engine = TaskExecuteEngine::with_worker_count("test", 4);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let running = Arc::new(AtomicBool::new(false));
        let overlapped = Arc::new(AtomicBool::new(false));

        for i in 0..50usize {
            let seen = seen.clone();
            let running = running.clone();
            let overlapped = overlapped.clone();
            engine
                .add_task(
                    "client-1#true",
                    task(move || {
                        if running.swap(true, Ordering::SeqCst) {
                            overlapped.store(true, Ordering::SeqCst);
                        }
                        std::thread::sleep(Duration::from_millis(1));
                        seen.lock().push(i);
                        running.store(false, Ordering::SeqCst);
                        Ok(())
                    }),
                )
                .unwrap();
        }

        wait_until(|| seen.lock().len() == 50).await;
        assert_eq!(*seen.lock(), (0..50).collect::<Vec<_>>());
        assert!(!overlapped.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_different_workers_run_in_parallel() {
        let engine = TaskExecuteEngine::with_worker_count("test", 4);

        // Two keys owned by different workers
        let key_a = "key-a".to_string();
        let key_b = (0..1000)
            .map(|i| format!("key-{i}"))
            .find(|k| engine.worker_index(k) != engine.worker_index(&key_a))
            .unwrap();

        let arrived = Arc::new(AtomicUsize::new(0));
        let saw_other = Arc::new(AtomicUsize::new(0));

        for key in [&key_a, &key_b] {
            let arrived = arrived.clone();
            let saw_other = saw_other.clone();
            engine
                .add_task(
                    key,
                    task(move || {
                        arrived.fetch_add(1, Ordering::SeqCst);
                        let deadline = Instant::now() + Duration::from_secs(2);
                        while Instant::now() < deadline {
                            if arrived.load(Ordering::SeqCst) == 2 {
                                saw_other.fetch_add(1, Ordering::SeqCst);
                                break;
                            }
                            std::thread::sleep(Duration::from_millis(1));
                        }
                        Ok(())
                    }),
                )
                .unwrap();
        }

        wait_until(|| saw_other.load(Ordering::SeqCst) == 2).await;
    }

    #[tokio::test]
    async fn test_failing_task_does_not_block_queue() {
        let engine = TaskExecuteEngine::with_worker_count("test", 2);
        let done = Arc::new(AtomicBool::new(false));

        engine.add_task("k", task(|| anyhow::bail!("broken"))).unwrap();
        let flag = done.clone();
        engine
            .add_task(
                "k",
                task(move || {
                    flag.store(true, Ordering::SeqCst);
                    Ok(())
                }),
            )
            .unwrap();

        wait_until(|| done.load(Ordering::SeqCst)).await;
        wait_until(|| engine.is_empty()).await;
    }

    #[tokio::test]
    async fn test_unsupported_operations_fail_loudly() {
        let engine = TaskExecuteEngine::with_worker_count("test", 1);
        assert!(matches!(
            engine.remove_task("k"),
            Err(EngineError::Unsupported(_))
        ));
        assert!(matches!(
            engine.all_task_keys(),
            Err(EngineError::Unsupported(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_drops_queued_tasks() {
        let engine = TaskExecuteEngine::with_worker_count("test", 1);
        let started = Arc::new(AtomicBool::new(false));
        let release = Arc::new(AtomicBool::new(false));
        let ran_after = Arc::new(AtomicUsize::new(0));

        let (s, r) = (started.clone(), release.clone());
        engine
            .add_task(
                "k",
                task(move || {
                    s.store(true, Ordering::SeqCst);
                    while !r.load(Ordering::SeqCst) {
                        std::thread::sleep(Duration::from_millis(1));
                    }
                    Ok(())
                }),
            )
            .unwrap();
        for _ in 0..10 {
            let ran_after = ran_after.clone();
            engine
                .add_task(
                    "k",
                    task(move || {
                        ran_after.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }),
                )
                .unwrap();
        }

        wait_until(|| started.load(Ordering::SeqCst)).await;
        assert_eq!(engine.size(), 10);

        engine.shutdown().unwrap();
        engine.shutdown().unwrap();
        release.store(true, Ordering::SeqCst);
        engine.join().await;

        assert_eq!(ran_after.load(Ordering::SeqCst), 0);
        assert!(engine.is_empty());
        assert!(matches!(
            engine.add_task("k", task(|| Ok(()))),
            Err(EngineError::Shutdown(_))
        ));
    }

    #[tokio::test]
    async fn test_keyed_processor_bypasses_workers() {
        struct Inline(Arc<AtomicUsize>);

        impl TaskProcessor for Inline {
            fn process(&self, task: Box<dyn ExecuteTask>) -> anyhow::Result<()> {
                self.0.fetch_add(1, Ordering::SeqCst);
                task.run()
            }
        }

        let engine = TaskExecuteEngine::with_worker_count("test", 2);
        let handled = Arc::new(AtomicUsize::new(0));
        engine.add_processor("special", Arc::new(Inline(handled.clone())));

        engine.add_task("special", task(|| Ok(()))).unwrap();
        assert_eq!(handled.load(Ordering::SeqCst), 1);

        let err = engine
            .add_task("special", task(|| anyhow::bail!("nope")))
            .unwrap_err();
        assert!(matches!(err, EngineError::Processor { .. }));

        assert!(engine.remove_processor("special").is_some());
        assert!(engine.remove_processor("special").is_none());
    }

    #[tokio::test]
    async fn test_workers_status_lists_every_worker() {
        let engine = TaskExecuteEngine::with_worker_count("health", 3);
        let status = engine.workers_status();
        assert_eq!(status.lines().count(), 3);
        assert!(status.contains("health_0%3, pending tasks: 0"));
        assert!(status.contains("health_2%3, pending tasks: 0"));
    }

    #[test]
    fn test_shutdown_collects_every_dead_worker() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let engine = runtime.block_on(async { TaskExecuteEngine::with_worker_count("dead", 3) });
        // Worker loops die with their runtime
        drop(runtime);

        match engine.shutdown() {
            Err(EngineError::ShutdownFailed(failures)) => {
                assert_eq!(failures.len(), 3);
                for index in 0..3 {
                    let prefix = format!("dead_{index}%3 ");
                    assert!(failures.iter().any(|f| f.starts_with(&prefix)), "{failures:?}");
                }
            }
            other => panic!("expected ShutdownFailed, got {other:?}"),
        }

        assert!(engine.shutdown().is_ok());
    }
}
