//! Deployment command plan
//!
//! The runtime bootstrap descriptor is produced by an external collaborator.
//! This module fixes only the order in which it must receive commands.

use crate::error::DeployError;
use crate::model::{Endpoint, GraphModel, START_NODE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// One bootstrap command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum DeployCommand {
    CreateNode {
        name: String,
        node_type: String,
    },
    WriteParameter {
        node: String,
        name: String,
        value: String,
    },
    CreateConnection {
        source: Endpoint,
        destination: Endpoint,
    },
    Start,
}

/// Ordered commands that bring up one application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentPlan {
    pub application: String,
    pub commands: Vec<DeployCommand>,
}

impl DeploymentPlan {
    /// Build the plan for `graph`.
    ///
    /// Per node in declaration order (the start node excluded) a create
    /// command followed by its parameter writes, then every enabled
    /// connection, then a single start command.
    #[must_use]
    pub fn from_graph(graph: &GraphModel) -> Self {
        let mut commands = Vec::new();

        for node in graph.nodes().iter().filter(|n| n.name != START_NODE) {
            commands.push(DeployCommand::CreateNode {
                name: node.name.clone(),
                node_type: node.node_type.clone(),
            });
            commands.extend(node.parameters.iter().map(|p| DeployCommand::WriteParameter {
                node: node.name.clone(),
                name: p.name.clone(),
                value: p.value.clone(),
            }));
        }

        commands.extend(
            graph
                .enabled_connections()
                .map(|c| DeployCommand::CreateConnection {
                    source: c.source.clone(),
                    destination: c.destination.clone(),
                }),
        );
        commands.push(DeployCommand::Start);

        Self {
            application: graph.name.clone(),
            commands,
        }
    }

    /// Validate `graph` and build its plan.
    ///
    /// # Errors
    /// `DeployError::InvalidGraph` if [`GraphModel::validate`] fails.
    pub fn checked(graph: &GraphModel) -> Result<Self, DeployError> {
        graph.validate()?;
        Ok(Self::from_graph(graph))
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Number of create-connection commands.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, DeployCommand::CreateConnection { .. }))
            .count()
    }

    /// Pretty JSON rendering of the plan.
    ///
    /// # Errors
    /// Serialization failure.
    pub fn to_json(&self) -> Result<String, DeployError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Consumer of deployment plans
pub trait Deployer: Send + Sync {
    /// Hand the plan to the target runtime.
    ///
    /// # Errors
    /// Implementation-defined; the plan is not partially retried.
    fn deploy(&self, plan: &DeploymentPlan) -> Result<(), DeployError>;
}

/// Writes the plan as JSON to a file
#[derive(Debug, Clone)]
pub struct JsonPlanWriter {
    path: PathBuf,
}

impl JsonPlanWriter {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Deployer for JsonPlanWriter {
    fn deploy(&self, plan: &DeploymentPlan) -> Result<(), DeployError> {
        std::fs::write(&self.path, plan.to_json()?)?;
        info!(
            application = %plan.application,
            commands = plan.len(),
            path = %self.path.display(),
            "deployment plan written"
        );
        Ok(())
    }
}

/// Logs the plan and hands it nowhere
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingDeployer;

impl Deployer for LoggingDeployer {
    fn deploy(&self, plan: &DeploymentPlan) -> Result<(), DeployError> {
        info!(
            application = %plan.application,
            commands = plan.len(),
            connections = plan.connection_count(),
            "deployment plan ready"
        );
        Ok(())
    }
}
