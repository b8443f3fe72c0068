//! FDE Agents - goal-directed diagnostic workers
//!
//! Each [`AgentWorker`] runs on its own thread and moves through the
//! configure, watch, diagnose and report goals. A [`TeamCoordinator`]
//! hands out the next goal whenever a worker is idle.

pub mod belief;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod goal;
pub mod script;
pub mod worker;

pub use belief::{Belief, BeliefKind, Beliefs, Veracity, MAX_DESCRIPTIONS};
pub use context::{WorkerConfig, WorkerContext};
pub use coordinator::{CoordinatorConfig, TeamCoordinator};
pub use error::AgentError;
pub use goal::{next_goal, run_goal, GoalKind, GoalOutcome, GoalResult};
pub use script::{DiagnosticScript, PassiveMonitor};
pub use worker::{AgentWorker, WorkerId, WorkerState, HISTORY_LIMIT};
