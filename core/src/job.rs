//! Deferred jobs: the two-phase start/poll/reset contract between the
//! navigation core and whatever executes long-running rules.
//!
//! A job is bound to exactly one `(owner, method)` pair. The [`JobBook`]
//! kept per participant guarantees at most one live ticket per pair.

use crate::branch::BranchId;
use crate::page::PageId;
use crate::rules::RuleError;
use crate::task::{JobOutput, Task};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Entity a job works on behalf of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Owner {
    Page(PageId),
    Branch(BranchId),
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::Page(id) => id.fmt(f),
            Owner::Branch(id) => id.fmt(f),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Compile,
    Validate,
    Submit,
    Grow,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Compile => "compile",
            Method::Validate => "validate",
            Method::Submit => "submit",
            Method::Grow => "grow",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobKey {
    pub owner: Owner,
    pub method: Method,
}

impl JobKey {
    pub fn new(owner: Owner, method: Method) -> Self {
        Self { owner, method }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.method)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Handle to a started job, persisted with the participant between requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobTicket {
    pub id: JobId,
    pub key: JobKey,
    pub started_at: DateTime<Utc>,
}

impl JobTicket {
    pub fn new(id: JobId, key: JobKey) -> Self {
        Self {
            id,
            key,
            started_at: Utc::now(),
        }
    }
}

/// What a runner knows about a job.
#[derive(Debug)]
pub enum JobPoll {
    Pending,
    Done(JobOutput),
    Failed(String),
    /// The runner has no record of the job (reset, or the runner restarted).
    Unknown,
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("job runner refused {key}: {reason}")]
    Rejected { key: JobKey, reason: String },

    #[error("job {key} failed: {message}")]
    Failed { key: JobKey, message: String },

    #[error("job {key} finished with output for a different method")]
    UnexpectedOutput { key: JobKey },

    #[error(transparent)]
    Rule(#[from] RuleError),
}

/// Executes deferred tasks. Implementations must be safe to share across
/// requests for many participants.
pub trait JobRunner: Send + Sync {
    fn start(&self, task: Task) -> Result<JobId, JobError>;
    fn poll(&self, id: JobId) -> JobPoll;
    /// Forget a job. Resetting an unknown id is a no-op.
    fn reset(&self, id: JobId);
}

/// Sizing and retention for a worker-backed [`JobRunner`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Jobs allowed to run at the same time.
    pub concurrency: usize,
    /// Executions of a failing task before the job is reported failed.
    pub max_attempts: u32,
    /// How long a finished result waits to be polled before it is evicted.
    pub result_ttl_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_attempts: 1,
            result_ttl_secs: 3600,
        }
    }
}

impl WorkerConfig {
    pub fn result_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.result_ttl_secs)
    }
}

/// Live tickets of one participant, at most one per [`JobKey`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobBook {
    tickets: Vec<JobTicket>,
}

impl JobBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &JobKey) -> Option<&JobTicket> {
        self.tickets.iter().find(|t| t.key == *key)
    }

    /// Store a ticket, replacing any ticket already held for the same key.
    pub fn insert(&mut self, ticket: JobTicket) -> Option<JobTicket> {
        let old = self.remove(&ticket.key);
        self.tickets.push(ticket);
        old
    }

    pub fn remove(&mut self, key: &JobKey) -> Option<JobTicket> {
        let idx = self.tickets.iter().position(|t| t.key == *key)?;
        Some(self.tickets.remove(idx))
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &JobTicket> {
        self.tickets.iter()
    }
}
