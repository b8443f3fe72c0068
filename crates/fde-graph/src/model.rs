//! In-memory graph model
//!
//! A [`GraphModel`] holds the processing nodes of a control application and
//! the directed connections between their endpoints. Connections are never
//! deleted: rewiring disables them so the history can be audited.

use crate::error::GraphError;
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Name of the distinguished node that emits the cold/warm start signals.
pub const START_NODE: &str = "START";

/// Start node signal fired on a cold start.
pub const START_COLD: &str = "COLD";

/// Start node signal fired on a warm start.
pub const START_WARM: &str = "WARM";

/// Direction of a control signal relative to its node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalDirection {
    Inbound,
    Outbound,
}

/// Direction of a data port relative to its node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PortDirection {
    Input,
    Output,
}

impl PortDirection {
    /// Signal direction that may carry data for a port of this direction.
    #[inline]
    #[must_use]
    pub fn signal_direction(self) -> SignalDirection {
        match self {
            Self::Input => SignalDirection::Inbound,
            Self::Output => SignalDirection::Outbound,
        }
    }
}

/// Scalar data kind carried by a port
///
/// The numeric codes are baked into deployed tap nodes through their
/// `DATA_TYPE` parameter and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataKind {
    /// No data, the tap only carries the signal itself
    Event,
    Int,
    Lint,
    Real,
    Lreal,
    String,
    WString,
    Bool,
}

impl DataKind {
    /// All kinds, in code order.
    pub const ALL: [DataKind; 8] = [
        DataKind::Event,
        DataKind::Int,
        DataKind::Lint,
        DataKind::Real,
        DataKind::Lreal,
        DataKind::String,
        DataKind::WString,
        DataKind::Bool,
    ];

    /// Wire/parameter code for this kind.
    #[must_use]
    pub const fn code(self) -> i8 {
        match self {
            Self::Event => -1,
            Self::Int => 0,
            Self::Lint => 1,
            Self::Real => 2,
            Self::Lreal => 3,
            Self::String => 4,
            Self::WString => 5,
            Self::Bool => 6,
        }
    }

    /// Parse a kind from its wire/parameter code.
    #[must_use]
    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|k| i64::from(k.code()) == code)
    }

    /// Type name as used in node type definitions (`INT`, `LREAL`, ...).
    #[must_use]
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::Event => "EVENT",
            Self::Int => "INT",
            Self::Lint => "LINT",
            Self::Real => "REAL",
            Self::Lreal => "LREAL",
            Self::String => "STRING",
            Self::WString => "WSTRING",
            Self::Bool => "BOOL",
        }
    }

    /// Parse a kind from its type name.
    #[must_use]
    pub fn from_type_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.type_name() == name)
    }

    /// Whether values of this kind are numeric.
    #[inline]
    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Int | Self::Lint | Self::Real | Self::Lreal)
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Name/value configuration pair on a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: String,
}

impl Parameter {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Discrete trigger declared on a node
///
/// `with` lists the ports whose values travel alongside the signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlSignal {
    pub name: String,
    pub direction: SignalDirection,
    #[serde(default)]
    pub with: Vec<String>,
}

impl ControlSignal {
    #[must_use]
    pub fn new(name: impl Into<String>, direction: SignalDirection) -> Self {
        Self {
            name: name.into(),
            direction,
            with: Vec::new(),
        }
    }

    /// Bind a port to this signal.
    #[must_use]
    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.with.push(port.into());
        self
    }

    /// Whether the named port travels with this signal.
    #[inline]
    #[must_use]
    pub fn carries(&self, port: &str) -> bool {
        self.with.iter().any(|p| p == port)
    }
}

/// Typed data input or output on a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub name: String,
    pub direction: PortDirection,
    pub kind: DataKind,
    #[serde(default)]
    pub comment: String,
    /// Initial value, inputs only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_value: Option<String>,
}

impl Port {
    #[must_use]
    pub fn input(name: impl Into<String>, kind: DataKind) -> Self {
        Self {
            name: name.into(),
            direction: PortDirection::Input,
            kind,
            comment: String::new(),
            initial_value: None,
        }
    }

    #[must_use]
    pub fn output(name: impl Into<String>, kind: DataKind) -> Self {
        Self {
            name: name.into(),
            direction: PortDirection::Output,
            kind,
            comment: String::new(),
            initial_value: None,
        }
    }

    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Set the initial value. Ignored for outputs, which only have a value at runtime.
    #[must_use]
    pub fn with_initial_value(mut self, value: impl Into<String>) -> Self {
        if self.direction == PortDirection::Input {
            self.initial_value = Some(value.into());
        }
        self
    }
}

/// A processing unit of the control application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub node_type: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub signals: Vec<ControlSignal>,
    #[serde(default)]
    pub ports: Vec<Port>,
}

impl Node {
    #[must_use]
    pub fn new(name: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            node_type: node_type.into(),
            comment: String::new(),
            parameters: Vec::new(),
            signals: Vec::new(),
            ports: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_parameter(name, value);
        self
    }

    #[must_use]
    pub fn with_signal(mut self, signal: ControlSignal) -> Self {
        self.signals.push(signal);
        self
    }

    #[must_use]
    pub fn with_port(mut self, port: Port) -> Self {
        self.ports.push(port);
        self
    }

    /// Append a parameter. A name that is already present keeps its first value.
    pub fn add_parameter(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if self.parameter(&name).is_none() {
            self.parameters.push(Parameter::new(name, value));
        }
    }

    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }

    #[must_use]
    pub fn signal(&self, name: &str) -> Option<&ControlSignal> {
        self.signals.iter().find(|s| s.name == name)
    }

    #[must_use]
    pub fn port(&self, name: &str) -> Option<&Port> {
        self.ports.iter().find(|p| p.name == name)
    }

    /// First signal in `direction` whose bindings include `port`.
    #[must_use]
    pub fn signal_carrying(&self, port: &str, direction: SignalDirection) -> Option<&ControlSignal> {
        self.signals
            .iter()
            .find(|s| s.direction == direction && s.carries(port))
    }
}

/// One side of a connection: a signal or port name on a node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Endpoint {
    pub node: String,
    pub name: String,
}

impl Endpoint {
    #[must_use]
    pub fn new(node: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            name: name.into(),
        }
    }

    /// Parse the dotted `NODE.NAME` form used by definition files.
    #[must_use]
    pub fn parse(dotted: &str) -> Option<Self> {
        let (node, name) = dotted.split_once('.')?;
        if node.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self::new(node, name))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.name)
    }
}

/// Directed edge between two endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub source: Endpoint,
    pub destination: Endpoint,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub comment: String,
}

fn enabled_by_default() -> bool {
    true
}

impl Connection {
    #[must_use]
    pub fn new(source: Endpoint, destination: Endpoint) -> Self {
        Self {
            source,
            destination,
            enabled: true,
            comment: String::new(),
        }
    }

    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Whether both ends match, ignoring the enabled flag.
    #[inline]
    #[must_use]
    pub fn same_route(&self, other: &Connection) -> bool {
        self.source == other.source && self.destination == other.destination
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.enabled { "enabled" } else { "disabled" };
        write!(f, "{} ---> {} [{state}]", self.source, self.destination)
    }
}

/// The signal/data-flow graph of one application
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphModel {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    nodes: Vec<Node>,
    #[serde(default)]
    connections: Vec<Connection>,
}

impl GraphModel {
    /// Create an empty graph
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            connections: Vec::new(),
        }
    }

    /// Decompose into name, nodes and connections.
    #[must_use]
    pub fn into_parts(self) -> (String, Vec<Node>, Vec<Connection>) {
        (self.name, self.nodes, self.connections)
    }

    /// Append a node.
    ///
    /// # Errors
    /// `GraphError::DuplicateNode` if a node with the same name exists.
    pub fn add_node(&mut self, node: Node) -> Result<(), GraphError> {
        if self.contains_node(&node.name) {
            return Err(GraphError::DuplicateNode(node.name));
        }
        self.nodes.push(node);
        Ok(())
    }

    #[must_use]
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    #[inline]
    #[must_use]
    pub fn contains_node(&self, name: &str) -> bool {
        self.node(name).is_some()
    }

    /// Nodes in declaration order.
    #[inline]
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// All connections, enabled and disabled, in insertion order.
    #[inline]
    #[must_use]
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    #[inline]
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Append a connection. Returns `false` if an identical route already exists.
    pub fn add_connection(&mut self, connection: Connection) -> bool {
        if self.connections.iter().any(|c| c.same_route(&connection)) {
            return false;
        }
        self.connections.push(connection);
        true
    }

    /// Shorthand for adding an enabled connection between two endpoints.
    pub fn connect(&mut self, source: Endpoint, destination: Endpoint) -> bool {
        self.add_connection(Connection::new(source, destination))
    }

    pub fn enabled_connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.iter().filter(|c| c.enabled)
    }

    pub fn disabled_connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.iter().filter(|c| !c.enabled)
    }

    /// Enabled connections feeding `destination`.
    pub fn inbound<'a>(&'a self, destination: &'a Endpoint) -> impl Iterator<Item = &'a Connection> {
        self.enabled_connections()
            .filter(move |c| &c.destination == destination)
    }

    /// Enabled connections leaving `source`.
    pub fn outbound<'a>(&'a self, source: &'a Endpoint) -> impl Iterator<Item = &'a Connection> {
        self.enabled_connections().filter(move |c| &c.source == source)
    }

    /// Disable every enabled connection matching `pred` and return copies of them
    /// as they were before disabling.
    pub(crate) fn disable_where<F>(&mut self, mut pred: F) -> Vec<Connection>
    where
        F: FnMut(&Connection) -> bool,
    {
        let mut disabled = Vec::new();
        for conn in self.connections.iter_mut().filter(|c| c.enabled) {
            if pred(conn) {
                disabled.push(conn.clone());
                conn.enabled = false;
            }
        }
        disabled
    }

    /// Add the `START` node if connections reference it but it is not declared,
    /// or if `force` is set. Returns `true` if the node was created.
    pub fn ensure_start_node(&mut self, force: bool) -> bool {
        if self.contains_node(START_NODE) {
            return false;
        }
        let referenced = self
            .connections
            .iter()
            .any(|c| c.source.node == START_NODE);
        if !(referenced || force) {
            return false;
        }
        self.nodes.push(
            Node::new(START_NODE, START_NODE)
                .with_signal(ControlSignal::new(START_COLD, SignalDirection::Outbound))
                .with_signal(ControlSignal::new(START_WARM, SignalDirection::Outbound)),
        );
        true
    }

    /// Check structural consistency of the enabled wiring.
    ///
    /// Every enabled connection must reference declared nodes, and a data
    /// port may be fed by at most one enabled connection. Signal
    /// destinations may fan in.
    ///
    /// # Errors
    /// The first violation found, in connection order.
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut fed_ports: HashMap<&Endpoint, usize> = HashMap::new();

        for conn in self.enabled_connections() {
            if !self.contains_node(&conn.source.node) {
                return Err(GraphError::DanglingEndpoint(conn.source.clone()));
            }
            let Some(dest) = self.node(&conn.destination.node) else {
                return Err(GraphError::DanglingEndpoint(conn.destination.clone()));
            };
            if dest.port(&conn.destination.name).is_some() {
                let count = fed_ports.entry(&conn.destination).or_insert(0);
                *count += 1;
                if *count > 1 {
                    return Err(GraphError::MultipleDrivers(conn.destination.clone()));
                }
            }
        }
        Ok(())
    }

    /// Node-level view of the enabled wiring.
    ///
    /// Node indices follow declaration order; an edge exists when at least one
    /// enabled connection links the two nodes.
    #[must_use]
    pub fn topology(&self) -> DiGraphMap<usize, ()> {
        let index: HashMap<&str, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.name.as_str(), i))
            .collect();

        let mut g = DiGraphMap::new();
        for i in 0..self.nodes.len() {
            g.add_node(i);
        }
        for conn in self.enabled_connections() {
            if let (Some(&from), Some(&to)) = (
                index.get(conn.source.node.as_str()),
                index.get(conn.destination.node.as_str()),
            ) {
                g.add_edge(from, to, ());
            }
        }
        g
    }

    /// Names of nodes directly fed by `node` over enabled connections.
    #[must_use]
    pub fn downstream_of(&self, node: &str) -> Vec<&str> {
        let Some(start) = self.nodes.iter().position(|n| n.name == node) else {
            return Vec::new();
        };
        let g = self.topology();
        g.neighbors_directed(start, petgraph::Direction::Outgoing)
            .map(|i| self.nodes[i].name.as_str())
            .collect()
    }

    /// Human-readable listing of nodes and connections.
    #[must_use]
    pub fn describe(&self) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        let _ = writeln!(out, "application {} ({} nodes)", self.name, self.nodes.len());
        for node in &self.nodes {
            let _ = writeln!(out, "  {} : {}", node.name, node.node_type);
            for p in &node.parameters {
                let _ = writeln!(out, "    {} = {}", p.name, p.value);
            }
        }
        let _ = writeln!(out, "connections ({})", self.connections.len());
        for conn in &self.connections {
            let _ = writeln!(out, "  {conn}");
        }
        out
    }
}
