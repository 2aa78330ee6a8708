//! # quire-runtime
//!
//! Everything between a transport and the navigation core: the request
//! [`Router`], [`Settings`], session persistence and rendering hooks.

pub mod config;
pub mod render;
pub mod router;
pub mod store;
pub mod telemetry;

pub use config::{ConfigError, Settings};
pub use render::{Artifact, PageView, PlainRenderer, Renderer};
pub use router::{Request, Router, RouterError};
pub use store::{FileSessionStore, MemorySessionStore, SessionStore, StoreError};
pub use telemetry::init_stdout_tracing;
