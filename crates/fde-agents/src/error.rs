//! Error types for agent workers

use crate::worker::WorkerState;

/// Worker and coordinator errors
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Goal assigned while the worker is not idle
    #[error("worker {worker} is {state:?}, cannot take a goal")]
    Busy { worker: String, state: WorkerState },

    /// Worker thread has been stopped
    #[error("worker {0} is stopped")]
    Stopped(String),

    /// Worker thread could not be started
    #[error("failed to spawn worker {worker}: {source}")]
    Spawn {
        worker: String,
        #[source]
        source: std::io::Error,
    },
}
