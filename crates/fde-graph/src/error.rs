//! Error types for the graph model and rewriting engine
//!
//! Rewiring failures are structural: the caller can correct the request and
//! retry, so each one carries a [`RewireCode`] alongside its message.

use crate::model::Endpoint;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result code of a single tap insertion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RewireCode {
    #[default]
    Ok,
    InvalidName,
    InvalidPortName,
    FbNotFound,
    EventUndefined,
    InvalidEventName,
    TapLimitExceeded,
}

impl RewireCode {
    /// Whether the code signals a configuration problem that must be fixed
    /// before deployment rather than a per-request mistake.
    #[inline]
    #[must_use]
    pub fn is_resource_exhaustion(self) -> bool {
        matches!(self, Self::TapLimitExceeded)
    }
}

impl fmt::Display for RewireCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ok => "OK",
            Self::InvalidName => "INVALID_NAME",
            Self::InvalidPortName => "INVALID_PORT_NAME",
            Self::FbNotFound => "FB_NOT_FOUND",
            Self::EventUndefined => "EVENT_UNDEFINED",
            Self::InvalidEventName => "INVALID_EVENT_NAME",
            Self::TapLimitExceeded => "TAP_LIMIT_EXCEEDED",
        };
        f.write_str(s)
    }
}

/// Failure to splice a diagnostic tap
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RewireError {
    /// Blank or unusable node name
    #[error("invalid node name: {0:?}")]
    InvalidName(String),

    /// Blank signal or port name
    #[error("invalid port name {port:?} on node {node}")]
    InvalidPortName { node: String, port: String },

    /// Target node is not part of the graph
    #[error("node not found: {0}")]
    FbNotFound(String),

    /// No control signal is bound to the port, or the name does not resolve
    #[error("no control signal carries {0}")]
    EventUndefined(Endpoint),

    /// Instrumentation request names a signal the node does not declare
    #[error("node {node} declares no signal named {signal}")]
    InvalidEventName { node: String, signal: String },

    /// More taps requested than the transport can address
    #[error("tap limit of {max} exceeded")]
    TapLimitExceeded { max: u32 },
}

impl RewireError {
    /// Result code for this failure
    #[must_use]
    pub fn code(&self) -> RewireCode {
        match self {
            Self::InvalidName(_) => RewireCode::InvalidName,
            Self::InvalidPortName { .. } => RewireCode::InvalidPortName,
            Self::FbNotFound(_) => RewireCode::FbNotFound,
            Self::EventUndefined(_) => RewireCode::EventUndefined,
            Self::InvalidEventName { .. } => RewireCode::InvalidEventName,
            Self::TapLimitExceeded { .. } => RewireCode::TapLimitExceeded,
        }
    }
}

/// Graph model and graph source errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// Node name already declared
    #[error("duplicate node: {0}")]
    DuplicateNode(String),

    /// Enabled connection references an undeclared node
    #[error("connection endpoint {0} references an undeclared node")]
    DanglingEndpoint(Endpoint),

    /// Data port fed by more than one enabled connection
    #[error("data port {0} has more than one enabled driver")]
    MultipleDrivers(Endpoint),

    /// Graph source could not be read
    #[error("failed to read graph source {path}: {reason}")]
    Io { path: String, reason: String },

    /// Graph source content could not be decoded
    #[error("failed to decode graph: {0}")]
    Decode(String),
}

/// Deployment boundary errors
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Plan refused because the graph is inconsistent
    #[error("graph is not deployable: {0}")]
    InvalidGraph(#[from] GraphError),

    /// Writing the plan failed
    #[error("deployment output failed: {0}")]
    Io(#[from] std::io::Error),

    /// Plan serialization failed
    #[error("deployment plan encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// The target rejected a command
    #[error("target rejected command {index}: {reason}")]
    Rejected { index: usize, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_variants() {
        let cases = [
            (RewireError::InvalidName(String::new()), RewireCode::InvalidName),
            (
                RewireError::InvalidPortName {
                    node: "N".into(),
                    port: String::new(),
                },
                RewireCode::InvalidPortName,
            ),
            (RewireError::FbNotFound("N".into()), RewireCode::FbNotFound),
            (
                RewireError::EventUndefined(Endpoint::new("N", "P")),
                RewireCode::EventUndefined,
            ),
            (
                RewireError::InvalidEventName {
                    node: "N".into(),
                    signal: "E".into(),
                },
                RewireCode::InvalidEventName,
            ),
            (
                RewireError::TapLimitExceeded { max: 25 },
                RewireCode::TapLimitExceeded,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(err.code(), code);
        }
    }

    #[test]
    fn only_tap_limit_is_resource_exhaustion() {
        assert!(RewireCode::TapLimitExceeded.is_resource_exhaustion());
        assert!(!RewireCode::EventUndefined.is_resource_exhaustion());
    }

    #[test]
    fn messages_name_the_target() {
        let err = RewireError::EventUndefined(Endpoint::new("CONV", "OUT"));
        assert_eq!(err.to_string(), "no control signal carries CONV.OUT");
    }
}
