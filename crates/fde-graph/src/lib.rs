//! FDE Graph - application graph model and diagnostic tap rewriting
//!
//! Holds the signal/data-flow graph of a distributed control application,
//! splices diagnostic taps into it and turns the instrumented graph into an
//! ordered deployment plan.

pub mod config;
pub mod deploy;
pub mod error;
pub mod model;
pub mod rewrite;
pub mod source;

pub use config::TapConfig;
pub use deploy::{DeployCommand, Deployer, DeploymentPlan, JsonPlanWriter, LoggingDeployer};
pub use error::{DeployError, GraphError, RewireCode, RewireError};
pub use model::{
    Connection, ControlSignal, DataKind, Endpoint, GraphModel, Node, Parameter, Port,
    PortDirection, SignalDirection, START_COLD, START_NODE, START_WARM,
};
pub use rewrite::{
    DiagnosticTap, InstrumentationResult, RewireResult, RewritingEngine, TapFailure, TapRequest,
};
pub use source::{load_requests, GraphSource, JsonGraphSource, StaticGraphSource};
