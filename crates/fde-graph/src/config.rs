//! Tap configuration

use serde::{Deserialize, Serialize};

/// Settings baked into every tap node the rewriting engine creates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TapConfig {
    /// Address of the telemetry server the taps connect to
    pub server_address: String,
    /// Port of the telemetry server
    pub server_port: u16,
    /// Node type name of the tap
    pub node_type: String,
    /// Poll interval used by `instrument_all`
    pub default_poll_ms: u32,
    /// Maximum number of taps (instance ids) in one graph
    pub max_taps: u32,
}

impl Default for TapConfig {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1".to_string(),
            server_port: 61499,
            node_type: "DIAG_TAP".to_string(),
            default_poll_ms: 100,
            max_taps: 25,
        }
    }
}

impl TapConfig {
    #[must_use]
    pub fn with_server(mut self, address: impl Into<String>, port: u16) -> Self {
        self.server_address = address.into();
        self.server_port = port;
        self
    }

    #[must_use]
    pub fn with_node_type(mut self, node_type: impl Into<String>) -> Self {
        self.node_type = node_type.into();
        self
    }

    #[must_use]
    pub fn with_default_poll_ms(mut self, poll_ms: u32) -> Self {
        self.default_poll_ms = poll_ms;
        self
    }

    #[must_use]
    pub fn with_max_taps(mut self, max: u32) -> Self {
        self.max_taps = max;
        self
    }
}
