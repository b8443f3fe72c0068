//! FDE Engine - configuration and assembly of a diagnostic team
//!
//! Reads an [`EngineConfig`], binds a telemetry server per worker and
//! drives the team through a [`fde_agents::TeamCoordinator`]. The
//! `fde-engine` binary wraps this with a command line.

pub mod config;
pub mod engine;
pub mod error;

pub use config::{ConfigError, EngineConfig, WorkerSpec};
pub use engine::{plan_offline, Engine, WorkerEndpoint};
pub use error::EngineError;
