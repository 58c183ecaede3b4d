use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::ExecuteTask;
use crate::error::EngineError;

type BoxedTask = Box<dyn ExecuteTask>;

/// One FIFO queue and the loop that drains it, one task at a time.
///
/// Must be created inside a tokio runtime.
pub struct TaskExecuteWorker {
    name: String,
    queue_tx: mpsc::UnboundedSender<BoxedTask>,
    pending: Arc<AtomicUsize>,
    cancel_token: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TaskExecuteWorker {
    #[must_use]
    pub fn new(name: &str, index: usize, worker_count: usize) -> Self {
        let name = format!("{name}_{index}%{worker_count}");
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let cancel_token = CancellationToken::new();

        let handle = tokio::spawn(Self::run_loop(
            name.clone(),
            queue_rx,
            pending.clone(),
            cancel_token.clone(),
        ));

        Self {
            name,
            queue_tx,
            pending,
            cancel_token,
            handle: Mutex::new(Some(handle)),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueue a task behind everything already queued on this worker
    pub fn process(&self, task: BoxedTask) -> Result<(), EngineError> {
        if self.cancel_token.is_cancelled() {
            return Err(EngineError::Shutdown(self.name.clone()));
        }

        self.pending.fetch_add(1, Ordering::AcqRel);
        if self.queue_tx.send(task).is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            return Err(EngineError::Shutdown(self.name.clone()));
        }
        Ok(())
    }

    /// Tasks queued but not yet started
    #[must_use]
    pub fn pending_task_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn status(&self) -> String {
        format!("{}, pending tasks: {}", self.name, self.pending_task_count())
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Stop consuming. The running task finishes; queued tasks are dropped.
    ///
    /// Calling this again is a no-op. Fails if the loop had already died.
    pub fn shutdown(&self) -> Result<(), String> {
        if self.cancel_token.is_cancelled() {
            return Ok(());
        }

        let died = self
            .handle
            .lock()
            .as_ref()
            .is_some_and(|handle| handle.is_finished());
        self.cancel_token.cancel();
        if died {
            return Err(format!("{} loop exited before shutdown", self.name));
        }

        info!(worker = %self.name, "Task worker shutting down");
        Ok(())
    }

    /// Wait for the loop to exit after [`shutdown`](Self::shutdown)
    pub async fn join(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(worker = %self.name, error = %e, "Task worker loop aborted");
            }
        }
    }

    async fn run_loop(
        name: String,
        mut queue_rx: mpsc::UnboundedReceiver<BoxedTask>,
        pending: Arc<AtomicUsize>,
        cancel_token: CancellationToken,
    ) {
        loop {
            let task = tokio::select! {
                biased;
                () = cancel_token.cancelled() => break,
                task = queue_rx.recv() => match task {
                    Some(task) => task,
                    None => break,
                },
            };
            pending.fetch_sub(1, Ordering::AcqRel);

            Self::execute(&name, task).await;
        }

        queue_rx.close();
        let mut dropped = 0usize;
        while queue_rx.try_recv().is_ok() {
            pending.fetch_sub(1, Ordering::AcqRel);
            dropped += 1;
        }
        if dropped > 0 {
            warn!(worker = %name, dropped, "Dropped queued tasks on shutdown");
        }
        debug!(worker = %name, "Task worker stopped");
    }

    /// Run one task to completion; failures and panics stay inside the worker
    async fn execute(name: &str, task: BoxedTask) {
        let description = task.describe();
        match tokio::task::spawn_blocking(move || task.run()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(worker = %name, task = %description, error = %e, "Task execution failed");
            }
            Err(e) if e.is_panic() => {
                error!(worker = %name, task = %description, "Task panicked during execution");
            }
            Err(e) => {
                error!(worker = %name, task = %description, error = %e, "Task execution aborted");
            }
        }
    }
}

impl Drop for TaskExecuteWorker {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
