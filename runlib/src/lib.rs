//! Job execution engine for untrusted code submissions.
//!
//! A worker dequeues jobs from a durable queue, runs each one inside an
//! isolated, resource-bounded sandbox, bridges live stdin/stdout/stderr
//! over a pub/sub event bus, and persists the terminal status record in
//! a TTL-bounded key-value store.

pub mod bus;
pub mod engine;
pub mod error;
pub mod events;
pub mod language;
pub mod queue;
pub mod sandbox;
pub mod status;
pub mod store;
pub mod types;

pub use engine::{Engine, EngineConfig};
pub use error::{Error, Result};
pub use types::{JobId, JobRequest};
