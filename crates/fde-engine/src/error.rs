//! Engine error types

use crate::config::ConfigError;
use fde_agents::AgentError;
use fde_graph::{DeployError, GraphError};
use fde_telemetry::TelemetryError;

/// Errors raised while assembling or running the engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("worker {worker}: {source}")]
    Graph {
        worker: String,
        #[source]
        source: GraphError,
    },

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error("worker {worker}: {source}")]
    Telemetry {
        worker: String,
        #[source]
        source: TelemetryError,
    },

    #[error(transparent)]
    Agent(#[from] AgentError),

    /// Instrumentation left requests unspliced
    #[error("harness incomplete: {failed} of {requested} tap requests failed")]
    Incomplete { failed: usize, requested: usize },

    #[error("no workers configured")]
    NoWorkers,
}
