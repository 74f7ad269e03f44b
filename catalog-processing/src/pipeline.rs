//! The worker pool and its lifecycle.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::plugin::Plugin;
use crate::policy::{LogAndDrop, WriteFailurePolicy};
use crate::stats::{Counters, PipelineStats};
use crate::worker::{worker_loop, WorkerContext};
use catalog_store::{StoreGateway, Subject};
use catalog_types::ProcessBatch;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Instant;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Lifecycle: `Stopped → Running → Draining → Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Stopped,
    Running,
    Draining,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Running => write!(f, "running"),
            Self::Draining => write!(f, "draining"),
        }
    }
}

/// What happened to a submitted batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Waiting for a worker.
    Queued,
    /// Dropped because there are no plugins to run.
    Skipped,
}

/// How a shutdown finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every queued and in-flight batch finished within the graceful timeout.
    Graceful,
    /// Workers were aborted and unwound within the force timeout.
    Forced,
    /// Aborted workers did not unwind within the force timeout either.
    Overrun,
}

/// Channel and tasks of one `start()..shutdown()` run.
struct Workers {
    sender: mpsc::Sender<ProcessBatch>,
    tasks: JoinSet<()>,
}

/// Who performs a `shutdown`: the first caller drains, later callers wait.
enum DrainStart {
    Stopped,
    Pending(watch::Receiver<Option<ShutdownOutcome>>),
    Owner(Option<Workers>, watch::Sender<Option<ShutdownOutcome>>),
}

/// Asynchronous plugin pipeline backed by a fixed pool of workers.
pub struct Pipeline {
    config: PipelineConfig,
    gateway: Arc<dyn StoreGateway>,
    failure_policy: Arc<dyn WriteFailurePolicy>,
    plugins: RwLock<Arc<[Arc<dyn Plugin>]>>,
    state: Mutex<PipelineState>,
    workers: Mutex<Option<Workers>>,
    /// Outcome of the drain in progress, for concurrent `shutdown` callers.
    drain: Mutex<Option<watch::Receiver<Option<ShutdownOutcome>>>>,
    counters: Arc<Counters>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Pipeline {
    /// Creates a stopped pipeline that writes through `gateway`.
    pub fn new(
        config: PipelineConfig,
        plugins: Vec<Arc<dyn Plugin>>,
        gateway: Arc<dyn StoreGateway>,
    ) -> Self {
        Self {
            config,
            gateway,
            failure_policy: Arc::new(LogAndDrop),
            plugins: RwLock::new(plugins.into()),
            state: Mutex::new(PipelineState::Stopped),
            workers: Mutex::new(None),
            drain: Mutex::new(None),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Replaces the write-failure policy (default: [`LogAndDrop`]).
    pub fn with_failure_policy(mut self, policy: Arc<dyn WriteFailurePolicy>) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn state(&self) -> PipelineState {
        *lock(&self.state)
    }

    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    /// Names of the configured plugins, in chain order.
    pub fn plugin_names(&self) -> Vec<String> {
        self.plugins().iter().map(|p| p.name().to_string()).collect()
    }

    fn plugins(&self) -> Arc<[Arc<dyn Plugin>]> {
        match self.plugins.read() {
            Ok(plugins) => Arc::clone(&plugins),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    fn begin_drain(&self) -> DrainStart {
        let mut state = lock(&self.state);
        match *state {
            PipelineState::Stopped => return DrainStart::Stopped,
            PipelineState::Draining => {
                return match lock(&self.drain).clone() {
                    Some(rx) => DrainStart::Pending(rx),
                    None => DrainStart::Stopped,
                };
            }
            PipelineState::Running => {}
        }
        *state = PipelineState::Draining;
        let (done, rx) = watch::channel(None);
        *lock(&self.drain) = Some(rx);
        DrainStart::Owner(lock(&self.workers).take(), done)
    }

    /// Marks the pipeline stopped and wakes concurrent `shutdown` callers.
    fn finish_drain(&self, done: &watch::Sender<Option<ShutdownOutcome>>, outcome: ShutdownOutcome) {
        let mut state = lock(&self.state);
        *lock(&self.drain) = None;
        *state = PipelineState::Stopped;
        done.send_replace(Some(outcome));
    }

    /// Spawns the worker pool on the current tokio runtime.
    pub fn start(&self) -> PipelineResult<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| PipelineError::NoRuntime)?;

        let mut state = lock(&self.state);
        if *state != PipelineState::Stopped {
            return Err(PipelineError::AlreadyRunning);
        }

        let plugins = self.plugins();
        let ctx = Arc::new(WorkerContext {
            plugins: Arc::clone(&plugins),
            gateway: Arc::clone(&self.gateway),
            failure_policy: Arc::clone(&self.failure_policy),
            subject: Subject::service(self.config.service_subject.clone()),
            counters: Arc::clone(&self.counters),
        });

        let (sender, receiver) = mpsc::channel(self.config.capacity());
        let queue = Arc::new(tokio::sync::Mutex::new(receiver));
        let mut tasks = JoinSet::new();
        for worker in 0..self.config.workers() {
            tasks.spawn_on(worker_loop(worker, Arc::clone(&ctx), Arc::clone(&queue)), &runtime);
        }

        *lock(&self.workers) = Some(Workers { sender, tasks });
        *state = PipelineState::Running;
        info!(
            workers = self.config.workers(),
            queue_capacity = self.config.capacity(),
            plugins = plugins.len(),
            "Processing pipeline started"
        );
        Ok(())
    }

    /// Queues a batch for processing without waiting.
    ///
    /// The operation kind travels on the batch. With no plugins configured the
    /// batch is dropped and [`Submission::Skipped`] returned.
    pub fn submit(&self, batch: ProcessBatch) -> PipelineResult<Submission> {
        if self.plugins().is_empty() {
            Counters::bump(&self.counters.skipped);
            debug!(operation = %batch.kind(), items = batch.len(), "No plugins configured, skipping batch");
            return Ok(Submission::Skipped);
        }

        if self.state() != PipelineState::Running {
            return Err(PipelineError::NotRunning);
        }
        let sender = lock(&self.workers)
            .as_ref()
            .map(|w| w.sender.clone())
            .ok_or(PipelineError::NotRunning)?;

        match sender.try_send(batch) {
            Ok(()) => {
                Counters::bump(&self.counters.submitted);
                Ok(Submission::Queued)
            }
            Err(TrySendError::Full(batch)) => {
                Counters::bump(&self.counters.rejected);
                warn!(
                    operation = %batch.kind(),
                    items = batch.len(),
                    capacity = self.config.capacity(),
                    "Processing queue full, rejecting batch"
                );
                Err(PipelineError::QueueFull {
                    capacity: self.config.capacity(),
                })
            }
            Err(TrySendError::Closed(_)) => Err(PipelineError::NotRunning),
        }
    }

    /// Stops accepting batches and drains the pool.
    ///
    /// Queued and in-flight batches get `graceful_timeout` to finish. After
    /// that the workers are aborted and given `force_timeout` to unwind. The
    /// call never takes longer than the two combined. A call that arrives
    /// while another shutdown is draining waits for that drain and returns its
    /// outcome.
    pub async fn shutdown(&self) -> ShutdownOutcome {
        let (workers, done) = match self.begin_drain() {
            DrainStart::Stopped => {
                debug!("Shutdown requested while stopped");
                return ShutdownOutcome::Graceful;
            }
            DrainStart::Pending(rx) => return wait_for_drain(rx).await,
            DrainStart::Owner(workers, done) => (workers, done),
        };
        let Some(Workers { sender, mut tasks }) = workers else {
            self.finish_drain(&done, ShutdownOutcome::Graceful);
            return ShutdownOutcome::Graceful;
        };

        // Closing the channel lets workers exit once the queue is empty.
        drop(sender);
        let started = Instant::now();
        info!(in_flight = tasks.len(), "Draining processing pipeline");

        let outcome = if timeout(self.config.graceful_timeout(), join_all(&mut tasks))
            .await
            .is_ok()
        {
            ShutdownOutcome::Graceful
        } else {
            warn!(
                remaining = tasks.len(),
                timeout_ms = self.config.graceful_timeout_ms,
                "Graceful drain timed out, aborting workers"
            );
            tasks.abort_all();
            if timeout(self.config.force_timeout(), join_all(&mut tasks))
                .await
                .is_ok()
            {
                ShutdownOutcome::Forced
            } else {
                error!(
                    remaining = tasks.len(),
                    timeout_ms = self.config.force_timeout_ms,
                    "Workers did not stop after abort, abandoning them"
                );
                tasks.detach_all();
                ShutdownOutcome::Overrun
            }
        };

        self.finish_drain(&done, outcome);
        info!(
            ?outcome,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Processing pipeline stopped"
        );
        outcome
    }

    /// Swaps the plugin chain.
    ///
    /// A running pipeline is shut down first and restarted with the new
    /// chain, so no worker ever sees a mix of old and new plugins.
    pub async fn reconfigure(&self, plugins: Vec<Arc<dyn Plugin>>) -> PipelineResult<ShutdownOutcome> {
        let was_running = self.state() == PipelineState::Running;
        let outcome = self.shutdown().await;

        let chain: Arc<[Arc<dyn Plugin>]> = plugins.into();
        match self.plugins.write() {
            Ok(mut current) => *current = chain,
            Err(poisoned) => *poisoned.into_inner() = chain,
        }
        info!(plugins = ?self.plugin_names(), "Plugin chain replaced");

        if was_running {
            self.start()?;
        }
        Ok(outcome)
    }
}

async fn wait_for_drain(mut rx: watch::Receiver<Option<ShutdownOutcome>>) -> ShutdownOutcome {
    match rx.wait_for(Option::is_some).await {
        Ok(outcome) => (*outcome).unwrap_or(ShutdownOutcome::Graceful),
        Err(_) => {
            warn!("Shutdown in progress was cancelled before the drain finished");
            ShutdownOutcome::Overrun
        }
    }
}

async fn join_all(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            if e.is_panic() {
                error!(error = %e, "Pipeline worker panicked");
            }
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Some(workers) = lock(&self.workers).take() {
            warn!("Processing pipeline dropped while running, aborting workers");
            let mut tasks = workers.tasks;
            tasks.abort_all();
        }
    }
}
