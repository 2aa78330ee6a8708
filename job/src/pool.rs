use futures::FutureExt;
use parking_lot::Mutex;
use quire_core::{
    Bus, JobError, JobId, JobOutput, JobPoll, JobRunner, RuleRegistry, Task, WorkerConfig,
};
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkerError {
    #[error("worker pool must be created inside a tokio runtime")]
    NoRuntime,

    #[error("worker concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("worker max_attempts must be at least 1")]
    ZeroAttempts,
}

#[derive(Debug)]
enum Slot {
    Running,
    Finished(JobOutput, Instant),
    Failed(String, Instant),
}

impl Slot {
    fn finished_at(&self) -> Option<Instant> {
        match self {
            Slot::Running => None,
            Slot::Finished(_, at) | Slot::Failed(_, at) => Some(*at),
        }
    }
}

struct Inner {
    config: WorkerConfig,
    rules: Arc<RuleRegistry>,
    bus: Arc<Bus>,
    slots: Mutex<HashMap<JobId, Slot>>,
    permits: Semaphore,
    cancel: CancellationToken,
    tracker: TaskTracker,
    handle: Handle,
}

/// Runs deferred tasks on a tokio runtime.
///
/// Results stay in the pool until the owning participant polls them and
/// resets the job, or until they outlive `result_ttl_secs` unpolled.
/// Cloning the pool shares the same workers.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<Inner>,
}

impl WorkerPool {
    /// Create a pool on the current tokio runtime.
    pub fn new(
        config: WorkerConfig,
        rules: Arc<RuleRegistry>,
        bus: Arc<Bus>,
    ) -> Result<Self, WorkerError> {
        let handle = Handle::try_current().map_err(|_| WorkerError::NoRuntime)?;
        Self::with_handle(config, rules, bus, handle)
    }

    pub fn with_handle(
        config: WorkerConfig,
        rules: Arc<RuleRegistry>,
        bus: Arc<Bus>,
        handle: Handle,
    ) -> Result<Self, WorkerError> {
        if config.concurrency == 0 {
            return Err(WorkerError::ZeroConcurrency);
        }
        if config.max_attempts == 0 {
            return Err(WorkerError::ZeroAttempts);
        }
        tracing::info!(
            concurrency = config.concurrency,
            max_attempts = config.max_attempts,
            result_ttl_secs = config.result_ttl_secs,
            "worker pool started"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                permits: Semaphore::new(config.concurrency),
                config,
                rules,
                bus,
                slots: Mutex::new(HashMap::new()),
                cancel: CancellationToken::new(),
                tracker: TaskTracker::new(),
                handle,
            }),
        })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.inner.config
    }

    /// Jobs started and not yet finished.
    pub fn running(&self) -> usize {
        self.inner
            .slots
            .lock()
            .values()
            .filter(|s| matches!(s, Slot::Running))
            .count()
    }

    /// Drop finished or failed results older than the configured TTL. Jobs
    /// still running are kept. Returns how many results were dropped.
    pub fn evict_expired(&self) -> usize {
        let ttl = self.inner.config.result_ttl();
        let mut slots = self.inner.slots.lock();
        let before = slots.len();
        slots.retain(|_, slot| slot.finished_at().is_none_or(|at| at.elapsed() < ttl));
        let evicted = before - slots.len();
        if evicted > 0 {
            tracing::debug!(evicted, "evicted unclaimed job results");
        }
        evicted
    }

    /// Stop accepting jobs, fail the ones still waiting for a permit and wait
    /// for running ones to finish.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        tracing::info!("worker pool stopped");
    }
}

impl Inner {
    async fn run(self: Arc<Self>, id: JobId, task: Task) {
        let key = task.key();
        let _permit = tokio::select! {
            permit = self.permits.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    return self.finish(id, Slot::Failed("worker pool closed".into(), Instant::now()));
                }
            },
            _ = self.cancel.cancelled() => {
                return self.finish(id, Slot::Failed("worker pool shut down".into(), Instant::now()));
            }
        };

        let started = Instant::now();
        let mut last_error = String::new();
        for attempt in 1..=self.config.max_attempts {
            let run = AssertUnwindSafe(task.clone().execute(&self.rules, &self.bus)).catch_unwind();
            match run.await {
                Ok(Ok(output)) => {
                    tracing::debug!(
                        job = %id,
                        %key,
                        attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "job finished"
                    );
                    return self.finish(id, Slot::Finished(output, Instant::now()));
                }
                Ok(Err(err)) => last_error = err.to_string(),
                Err(panic) => last_error = format!("rule panicked: {}", panic_message(&*panic)),
            }
            if attempt < self.config.max_attempts {
                tracing::warn!(job = %id, %key, attempt, error = %last_error, "job attempt failed, retrying");
            }
        }
        tracing::error!(job = %id, %key, error = %last_error, "job failed");
        self.finish(id, Slot::Failed(last_error, Instant::now()));
    }

    /// Store a result unless the job was reset while it ran.
    fn finish(&self, id: JobId, slot: Slot) {
        if let Some(entry) = self.slots.lock().get_mut(&id) {
            *entry = slot;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}

impl JobRunner for WorkerPool {
    fn start(&self, task: Task) -> Result<JobId, JobError> {
        let key = task.key();
        if self.inner.cancel.is_cancelled() {
            return Err(JobError::Rejected {
                key,
                reason: "worker pool is shutting down".into(),
            });
        }
        self.evict_expired();
        let id = JobId::new();
        self.inner.slots.lock().insert(id, Slot::Running);
        let inner = self.inner.clone();
        self.inner
            .tracker
            .spawn_on(inner.run(id, task), &self.inner.handle);
        tracing::debug!(job = %id, %key, "job queued");
        Ok(id)
    }

    fn poll(&self, id: JobId) -> JobPoll {
        match self.inner.slots.lock().get(&id) {
            Some(Slot::Running) => JobPoll::Pending,
            Some(Slot::Finished(output, _)) => JobPoll::Done(output.clone()),
            Some(Slot::Failed(message, _)) => JobPoll::Failed(message.clone()),
            None => JobPoll::Unknown,
        }
    }

    fn reset(&self, id: JobId) {
        self.inner.slots.lock().remove(&id);
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.inner.config)
            .field("jobs", &self.inner.slots.lock().len())
            .finish()
    }
}
