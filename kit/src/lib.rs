//! quire facade crate.
//!
//! Re-exports the navigation core, the request runtime and (behind the
//! default `workers` feature) the tokio worker pool under one name.

pub use quire_core as core;
#[cfg(feature = "workers")]
pub use quire_job as job;
pub use quire_runtime as runtime;

pub use quire_core::{BranchSpec, Bus, Page, Participant, RuleRegistry, Submission, WorkerConfig};
#[cfg(feature = "workers")]
pub use quire_job::WorkerPool;
pub use quire_runtime::{Artifact, Request, Router, Settings};

pub mod prelude {
    pub use quire_core::prelude::*;
    pub use quire_core::WorkerConfig;
    #[cfg(feature = "workers")]
    pub use quire_job::WorkerPool;
    pub use quire_runtime::{Artifact, Renderer, Request, Router, RouterError, Settings};
}
