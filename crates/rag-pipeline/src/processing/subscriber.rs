//! Long-lived pull subscription worker
//!
//! The worker owns one subscription connection and one tokio task. Each
//! received message is decoded and run through the ingestion pipeline; a
//! successful run is acknowledged, anything else is negatively acknowledged so
//! the broker can redeliver it.
//!
//! Lifecycle: `Stopped -> Starting -> Running -> Stopping -> Stopped`. `start`
//! and `stop` are idempotent and may be called from an admin route, a shutdown
//! hook or a signal handler. If the task ends on its own (receive retries
//! exhausted, or a panic) the state drops back to `Stopped` and the reason is
//! kept for the status surface.

use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::pipeline::IngestionPipeline;
use crate::providers::{ReceivedMessage, Subscription, SubscriptionSource};
use crate::retry::{with_retry, RetryPolicy};
use crate::types::message::decode_payload;

tokio::task_local! {
    /// Generation of the worker task currently executing, if any
    static WORKER_GENERATION: u64;
}

/// Worker lifecycle state
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Worker tuning
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    /// Upper bound on waiting for the task during `stop`
    pub join_timeout: Duration,
    /// Pause after an empty pull
    pub idle_poll: Duration,
    /// Policy for receive, ack and nack calls
    pub retry: RetryPolicy,
}

impl WorkerSettings {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            join_timeout: Duration::from_millis(config.subscription.join_timeout_ms),
            idle_poll: Duration::from_millis(config.subscription.idle_poll_ms),
            retry: RetryPolicy::from_config(&config.retry),
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

/// Message counters for one worker instance
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct WorkerStats {
    pub received: u64,
    pub acknowledged: u64,
    pub negative_acknowledged: u64,
    pub decode_failures: u64,
    pub settle_failures: u64,
    pub tasks_spawned: u64,
}

/// Snapshot reported by the status route
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub state: WorkerState,
    /// Why the last task ended on its own, if it did
    pub last_crash: Option<String>,
    pub stats: WorkerStats,
    pub source: String,
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    acknowledged: AtomicU64,
    negative_acknowledged: AtomicU64,
    decode_failures: AtomicU64,
    settle_failures: AtomicU64,
    tasks_spawned: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> WorkerStats {
        WorkerStats {
            received: self.received.load(Ordering::Relaxed),
            acknowledged: self.acknowledged.load(Ordering::Relaxed),
            negative_acknowledged: self.negative_acknowledged.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            settle_failures: self.settle_failures.load(Ordering::Relaxed),
            tasks_spawned: self.tasks_spawned.load(Ordering::Relaxed),
        }
    }
}

struct WorkerTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    subscription: Arc<dyn Subscription>,
    generation: u64,
}

struct WorkerShared {
    source: Arc<dyn SubscriptionSource>,
    pipeline: Arc<IngestionPipeline>,
    settings: WorkerSettings,
    state: Mutex<WorkerState>,
    task: Mutex<Option<WorkerTask>>,
    last_crash: RwLock<Option<String>>,
    generation: AtomicU64,
    counters: Counters,
}

/// Pull subscription worker; clones share one worker
#[derive(Clone)]
pub struct SubscriptionWorker {
    shared: Arc<WorkerShared>,
}

impl SubscriptionWorker {
    pub fn new(
        source: Arc<dyn SubscriptionSource>,
        pipeline: Arc<IngestionPipeline>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            shared: Arc::new(WorkerShared {
                source,
                pipeline,
                settings,
                state: Mutex::new(WorkerState::Stopped),
                task: Mutex::new(None),
                last_crash: RwLock::new(None),
                generation: AtomicU64::new(0),
                counters: Counters::default(),
            }),
        }
    }

    pub fn state(&self) -> WorkerState {
        *self.shared.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == WorkerState::Running
    }

    pub fn last_crash(&self) -> Option<String> {
        self.shared.last_crash.read().clone()
    }

    pub fn stats(&self) -> WorkerStats {
        self.shared.counters.snapshot()
    }

    pub fn status(&self) -> WorkerStatus {
        WorkerStatus {
            state: self.state(),
            last_crash: self.last_crash(),
            stats: self.stats(),
            source: self.shared.source.name().to_string(),
        }
    }

    /// Connect and launch the worker task
    ///
    /// Does nothing unless the worker is `Stopped`. A failed connect leaves
    /// the worker `Stopped` and returns the error.
    pub async fn start(&self) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            if *state != WorkerState::Stopped {
                tracing::debug!("Subscription worker already {:?}", *state);
                return Ok(());
            }
            *state = WorkerState::Starting;
        }

        // A task that ended on its own may still be parked here
        if let Some(stale) = self.shared.task.lock().take() {
            stale.handle.abort();
        }

        let subscription: Arc<dyn Subscription> = match self.shared.source.connect().await {
            Ok(subscription) => Arc::from(subscription),
            Err(e) => {
                tracing::error!("Subscription worker could not connect: {}", e);
                *self.shared.last_crash.write() = Some(format!("connect failed: {}", e));
                *self.shared.state.lock() = WorkerState::Stopped;
                return Err(e);
            }
        };

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        *self.shared.last_crash.write() = None;

        let handle = tokio::spawn(WORKER_GENERATION.scope(
            generation,
            supervise(
                Arc::clone(&self.shared),
                Arc::clone(&subscription),
                cancel.clone(),
                generation,
            ),
        ));
        *self.shared.task.lock() = Some(WorkerTask {
            cancel,
            handle,
            subscription,
            generation,
        });
        self.shared
            .counters
            .tasks_spawned
            .fetch_add(1, Ordering::Relaxed);

        let mut state = self.shared.state.lock();
        if *state == WorkerState::Starting {
            *state = WorkerState::Running;
            tracing::info!("Subscription worker started (generation {})", generation);
        }
        Ok(())
    }

    /// Cancel the task, release the subscription and wait for the task
    ///
    /// Does nothing unless the worker is `Running`. The wait is bounded by
    /// the join timeout, after which the task is aborted and the subscription
    /// closed here. Called from the worker's own task it only signals
    /// cancellation: the state stays `Stopping` until that task has released
    /// the subscription, so no second task can start alongside it.
    pub async fn stop(&self) {
        let task = {
            let mut state = self.shared.state.lock();
            if *state != WorkerState::Running {
                tracing::debug!("Subscription worker not running ({:?})", *state);
                return;
            }
            *state = WorkerState::Stopping;
            self.shared.task.lock().take()
        };

        if let Some(task) = task {
            task.cancel.cancel();

            let own_task = WORKER_GENERATION
                .try_with(|g| *g == task.generation)
                .unwrap_or(false);
            if own_task {
                tracing::info!("Subscription worker stop requested from its own task");
                *self.shared.task.lock() = Some(task);
                return;
            }

            let join_timeout = self.shared.settings.join_timeout;
            let mut handle = task.handle;
            match timeout(join_timeout, &mut handle).await {
                Ok(Ok(())) => tracing::info!("Subscription worker task joined"),
                Ok(Err(e)) => tracing::warn!("Subscription worker task ended abnormally: {}", e),
                Err(_) => {
                    tracing::warn!(
                        "Subscription worker did not stop within {:?}, aborting",
                        join_timeout
                    );
                    handle.abort();
                    task.subscription.close().await;
                }
            }
        }

        self.finish_stop();
    }

    /// Request cancellation without waiting; safe from synchronous contexts
    pub fn signal_stop(&self) {
        if let Some(task) = self.shared.task.lock().as_ref() {
            task.cancel.cancel();
        }
    }

    fn finish_stop(&self) {
        let mut state = self.shared.state.lock();
        if *state == WorkerState::Stopping {
            *state = WorkerState::Stopped;
            tracing::info!("Subscription worker stopped");
        }
    }
}

/// Run the consume loop, then release the subscription and record how the
/// task ended
async fn supervise(
    shared: Arc<WorkerShared>,
    subscription: Arc<dyn Subscription>,
    cancel: CancellationToken,
    generation: u64,
) {
    let result = AssertUnwindSafe(consume(&shared, subscription.as_ref(), &cancel))
        .catch_unwind()
        .await;
    subscription.close().await;

    let crash = match result {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(format!("receive failed: {}", e)),
        Err(panic) => Some(format!("worker task panicked: {}", panic_message(panic.as_ref()))),
    };

    if let Some(reason) = &crash {
        tracing::error!("Subscription worker crashed: {}", reason);
        *shared.last_crash.write() = Some(reason.clone());
    }

    // A newer task owns the state from here
    if shared.generation.load(Ordering::SeqCst) == generation {
        let mut state = shared.state.lock();
        if *state != WorkerState::Stopped {
            *state = WorkerState::Stopped;
            tracing::info!("Subscription worker task {} finished", generation);
        }
    }
}

async fn consume(
    shared: &WorkerShared,
    subscription: &dyn Subscription,
    cancel: &CancellationToken,
) -> Result<()> {
    let settings = shared.settings;
    let receive = with_retry(settings.retry, "receive", || subscription.receive());

    loop {
        let received = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            received = receive.call() => received?,
        };

        match received {
            Some(message) => handle_message(shared, subscription, message).await,
            None => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Ok(()),
                    _ = sleep(settings.idle_poll) => {}
                }
            }
        }
    }
}

async fn handle_message(
    shared: &WorkerShared,
    subscription: &dyn Subscription,
    message: ReceivedMessage,
) {
    shared.counters.received.fetch_add(1, Ordering::Relaxed);

    let input = match decode_payload(message.data.as_deref()) {
        Ok(input) => input,
        Err(e) => {
            shared.counters.decode_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("[{}] Undecodable message, nacking: {}", message.message_id, e);
            settle(shared, subscription, &message, false).await;
            return;
        }
    };

    tracing::info!("[{}] Processing {}", message.message_id, input.describe());
    let outcome = shared.pipeline.run(&input).await;
    settle(shared, subscription, &message, outcome.is_success()).await;
}

async fn settle(
    shared: &WorkerShared,
    subscription: &dyn Subscription,
    message: &ReceivedMessage,
    success: bool,
) {
    let retry = shared.settings.retry;
    let ack_id = message.ack_id.as_str();
    let (result, counter) = if success {
        (
            retry.run("ack", || subscription.ack(ack_id)).await,
            &shared.counters.acknowledged,
        )
    } else {
        (
            retry.run("nack", || subscription.nack(ack_id)).await,
            &shared.counters.negative_acknowledged,
        )
    };

    match result {
        Ok(()) => {
            counter.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            shared.counters.settle_failures.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                "[{}] Failed to {} message: {}",
                message.message_id,
                if success { "ack" } else { "nack" },
                e
            );
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
