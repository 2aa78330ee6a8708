//! # quire-job
//!
//! A tokio-backed [`JobRunner`](quire_core::JobRunner) for quire. Deferred
//! compile, validate, submit and grow tasks run on the pool while the
//! request path keeps polling.

pub mod pool;

pub use pool::{WorkerError, WorkerPool};
pub use quire_core::WorkerConfig;
