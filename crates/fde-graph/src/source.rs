//! Graph sources
//!
//! Parsing application definition files is left to external tooling. A
//! [`GraphSource`] hands the already-structured graph to the engine.

use crate::error::GraphError;
use crate::model::GraphModel;
use crate::rewrite::TapRequest;
use std::path::{Path, PathBuf};

/// Supplier of an application graph
pub trait GraphSource: Send + Sync {
    /// Load a fresh copy of the graph.
    ///
    /// # Errors
    /// Read or decode failure, or a duplicate node name.
    fn load(&self) -> Result<GraphModel, GraphError>;
}

/// Graph held in memory
#[derive(Debug, Clone)]
pub struct StaticGraphSource {
    graph: GraphModel,
}

impl StaticGraphSource {
    #[must_use]
    pub fn new(graph: GraphModel) -> Self {
        Self { graph }
    }
}

impl GraphSource for StaticGraphSource {
    fn load(&self) -> Result<GraphModel, GraphError> {
        Ok(self.graph.clone())
    }
}

/// Graph stored as JSON in the shape of [`GraphModel`]
#[derive(Debug, Clone)]
pub struct JsonGraphSource {
    path: PathBuf,
}

impl JsonGraphSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Decode a graph from JSON text.
    ///
    /// Nodes and connections are re-added one by one so duplicate
    /// parameters and connections are dropped, and a `START` node is
    /// synthesized when connections reference it.
    ///
    /// # Errors
    /// `GraphError::Decode` on malformed JSON, `GraphError::DuplicateNode` on
    /// a repeated node name.
    pub fn parse(text: &str) -> Result<GraphModel, GraphError> {
        let raw: GraphModel =
            serde_json::from_str(text).map_err(|e| GraphError::Decode(e.to_string()))?;
        let (name, nodes, connections) = raw.into_parts();

        let mut graph = GraphModel::new(name);
        for mut node in nodes {
            let params = std::mem::take(&mut node.parameters);
            for p in params {
                node.add_parameter(p.name, p.value);
            }
            graph.add_node(node)?;
        }
        for conn in connections {
            graph.add_connection(conn);
        }
        graph.ensure_start_node(false);
        Ok(graph)
    }
}

impl GraphSource for JsonGraphSource {
    fn load(&self) -> Result<GraphModel, GraphError> {
        Self::parse(&read(&self.path)?)
    }
}

/// Load an instrumentation request list from a JSON array.
///
/// # Errors
/// Read or decode failure.
pub fn load_requests(path: &Path) -> Result<Vec<TapRequest>, GraphError> {
    serde_json::from_str(&read(path)?).map_err(|e| GraphError::Decode(e.to_string()))
}

fn read(path: &Path) -> Result<String, GraphError> {
    std::fs::read_to_string(path).map_err(|e| GraphError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}
