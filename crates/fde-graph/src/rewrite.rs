//! Diagnostic tap splicing
//!
//! The [`RewritingEngine`] inserts single-purpose tap nodes into a
//! [`GraphModel`] without changing what the application computes: every
//! connection it displaces is disabled and routed through the tap instead.
//!
//! An input splice intercepts traffic flowing into the target:
//!
//! ```text
//!   before:  SRC.OUT ---> N.IN
//!   after:   SRC.OUT -x-> N.IN            (kept, disabled)
//!            SRC.OUT ---> TAP.DATA_IN
//!            TAP.DATA_OUT ---> N.IN
//! ```
//!
//! An output splice mirrors this on the source side. Both also wire
//! `START.COLD` and `START.WARM` into the tap's `INIT` so it initializes
//! with the rest of the application.

use crate::config::TapConfig;
use crate::error::{RewireCode, RewireError};
use crate::model::{
    Connection, ControlSignal, DataKind, Endpoint, GraphModel, Node, Port, PortDirection,
    SignalDirection, START_COLD, START_NODE, START_WARM,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Prefix of generated tap node names, followed by the instance id.
pub const TAP_NAME_PREFIX: &str = "DIAG_TAP_";

/// Tap initialization input.
pub const TAP_INIT: &str = "INIT";
/// Tap request input, carries `DATA_IN`.
pub const TAP_REQ: &str = "REQ";
/// Tap initialization confirmation.
pub const TAP_INITO: &str = "INITO";
/// Tap confirmation output, carries `DATA_OUT`.
pub const TAP_CNF: &str = "CNF";
/// Tap data input.
pub const TAP_DATA_IN: &str = "DATA_IN";
/// Tap data output.
pub const TAP_DATA_OUT: &str = "DATA_OUT";

/// Tap parameter: telemetry server address.
pub const PARAM_ADDRESS: &str = "ADDRESS";
/// Tap parameter: telemetry server port.
pub const PARAM_PORT: &str = "PORT";
/// Tap parameter: poll interval in milliseconds.
pub const PARAM_POLL_MS: &str = "POLL_MS";
/// Tap parameter: data kind code.
pub const PARAM_DATA_TYPE: &str = "DATA_TYPE";
/// Tap parameter: transport instance id.
pub const PARAM_INST_ID: &str = "INST_ID";

/// Bookkeeping record for one inserted tap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticTap {
    /// Transport queue key, unique within the graph
    pub instance_id: u32,
    /// Name of the inserted tap node
    pub tap_node: String,
    /// Instrumented node
    pub target_node: String,
    /// Control signal the tap intercepts
    pub signal: String,
    /// Data port the tap intercepts, `None` for event-only taps
    pub port: Option<String>,
    /// Which side of the target the tap sits on
    pub direction: PortDirection,
    pub kind: DataKind,
    pub poll_ms: u32,
}

impl DiagnosticTap {
    /// Endpoint the tap instruments: the port if any, otherwise the signal.
    #[must_use]
    pub fn target(&self) -> Endpoint {
        Endpoint::new(
            &self.target_node,
            self.port.as_deref().unwrap_or(&self.signal),
        )
    }

    #[inline]
    #[must_use]
    pub fn is_event_only(&self) -> bool {
        self.port.is_none()
    }
}

/// Connections touched by one splice
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RewireResult {
    pub code: RewireCode,
    /// Prior connections, as they were before being disabled
    pub disabled: Vec<Connection>,
    /// Connections added for the tap, activation included
    pub added: Vec<Connection>,
    /// Human-readable account of the splice
    pub description: Vec<String>,
}

/// One entry of an instrumentation request list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapRequest {
    pub node: String,
    pub signal: String,
    #[serde(default)]
    pub port: Option<String>,
    /// Overrides the configured default poll interval
    #[serde(default)]
    pub poll_ms: Option<u32>,
}

impl TapRequest {
    #[must_use]
    pub fn new(node: impl Into<String>, signal: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            signal: signal.into(),
            port: None,
            poll_ms: None,
        }
    }

    #[must_use]
    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    #[must_use]
    pub fn with_poll_ms(mut self, poll_ms: u32) -> Self {
        self.poll_ms = Some(poll_ms);
        self
    }
}

/// A request that could not be spliced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapFailure {
    pub request: TapRequest,
    pub error: RewireError,
}

/// Outcome of [`RewritingEngine::instrument_all`]
#[derive(Debug, Clone, Default)]
pub struct InstrumentationResult {
    /// Successful taps, in request order
    pub taps: Vec<DiagnosticTap>,
    pub failures: Vec<TapFailure>,
}

impl InstrumentationResult {
    /// Whether every request was spliced. An incomplete harness must not be deployed.
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Whether any failure is a configuration problem rather than a bad request.
    #[must_use]
    pub fn has_resource_exhaustion(&self) -> bool {
        self.failures
            .iter()
            .any(|f| f.error.code().is_resource_exhaustion())
    }
}

/// Resolved splice target
#[derive(Debug, Clone)]
struct TapSite {
    node: String,
    signal: String,
    port: Option<String>,
    direction: PortDirection,
    kind: DataKind,
}

/// Inserts diagnostic taps and assigns their instance ids
#[derive(Debug)]
pub struct RewritingEngine {
    config: TapConfig,
    next_instance_id: u32,
}

impl RewritingEngine {
    /// Create an engine whose first tap gets instance id 1
    #[must_use]
    pub fn new(config: TapConfig) -> Self {
        Self {
            config,
            next_instance_id: 1,
        }
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &TapConfig {
        &self.config
    }

    /// Number of taps inserted so far.
    #[inline]
    #[must_use]
    pub fn issued(&self) -> u32 {
        self.next_instance_id - 1
    }

    /// Splice a tap on `endpoint` of `node`.
    ///
    /// `endpoint` may name a port, in which case the signal carrying it is
    /// intercepted too, or a bare control signal for an event-only tap.
    ///
    /// # Errors
    /// See [`RewireError`]. The graph is untouched on error and no instance
    /// id is consumed.
    pub fn insert_tap(
        &mut self,
        graph: &mut GraphModel,
        node: &str,
        endpoint: &str,
        poll_ms: u32,
    ) -> Result<(DiagnosticTap, RewireResult), RewireError> {
        let site = resolve_endpoint(graph, node, endpoint)?;
        self.splice(graph, site, poll_ms)
    }

    /// Apply every request in order. Failures are collected, not fatal.
    pub fn instrument_all(
        &mut self,
        graph: &mut GraphModel,
        requests: &[TapRequest],
    ) -> InstrumentationResult {
        let mut result = InstrumentationResult::default();

        for request in requests {
            let poll_ms = request.poll_ms.unwrap_or(self.config.default_poll_ms);
            let outcome = resolve_request(graph, request)
                .and_then(|site| self.splice(graph, site, poll_ms));

            match outcome {
                Ok((tap, _)) => result.taps.push(tap),
                Err(error) => {
                    warn!(
                        node = %request.node,
                        signal = %request.signal,
                        port = ?request.port,
                        code = %error.code(),
                        %error,
                        "tap request failed"
                    );
                    result.failures.push(TapFailure {
                        request: request.clone(),
                        error,
                    });
                }
            }
        }

        info!(
            taps = result.taps.len(),
            failures = result.failures.len(),
            "instrumentation finished"
        );
        result
    }

    fn splice(
        &mut self,
        graph: &mut GraphModel,
        site: TapSite,
        poll_ms: u32,
    ) -> Result<(DiagnosticTap, RewireResult), RewireError> {
        if self.next_instance_id > self.config.max_taps {
            return Err(RewireError::TapLimitExceeded {
                max: self.config.max_taps,
            });
        }
        let instance_id = self.next_instance_id;
        let tap_name = format!("{TAP_NAME_PREFIX}{instance_id}");
        if graph.contains_node(&tap_name) {
            return Err(RewireError::InvalidName(tap_name));
        }

        graph.ensure_start_node(true);
        graph
            .add_node(self.tap_node(&tap_name, &site, poll_ms, instance_id))
            .map_err(|_| RewireError::InvalidName(tap_name.clone()))?;
        self.next_instance_id += 1;

        let signal_ep = Endpoint::new(&site.node, &site.signal);
        let port_ep = site.port.as_ref().map(|p| Endpoint::new(&site.node, p));
        let tap = |name: &str| Endpoint::new(&tap_name, name);

        let mut wanted = Vec::new();
        let disabled = match site.direction {
            PortDirection::Input => {
                let disabled = graph.disable_where(|c| {
                    c.destination == signal_ep || Some(&c.destination) == port_ep.as_ref()
                });
                wanted.push(Connection::new(tap(TAP_CNF), signal_ep.clone()));
                if let Some(port_ep) = &port_ep {
                    wanted.push(Connection::new(tap(TAP_DATA_OUT), port_ep.clone()));
                }
                for prior in &disabled {
                    let into = if prior.destination == signal_ep {
                        TAP_REQ
                    } else {
                        TAP_DATA_IN
                    };
                    wanted.push(Connection::new(prior.source.clone(), tap(into)));
                }
                disabled
            }
            PortDirection::Output => {
                let disabled = graph.disable_where(|c| {
                    c.source == signal_ep || Some(&c.source) == port_ep.as_ref()
                });
                wanted.push(Connection::new(signal_ep.clone(), tap(TAP_REQ)));
                if let Some(port_ep) = &port_ep {
                    wanted.push(Connection::new(port_ep.clone(), tap(TAP_DATA_IN)));
                }
                for prior in &disabled {
                    let from = if prior.source == signal_ep {
                        TAP_CNF
                    } else {
                        TAP_DATA_OUT
                    };
                    wanted.push(Connection::new(tap(from), prior.destination.clone()));
                }
                disabled
            }
        };
        wanted.push(Connection::new(Endpoint::new(START_NODE, START_COLD), tap(TAP_INIT)));
        wanted.push(Connection::new(Endpoint::new(START_NODE, START_WARM), tap(TAP_INIT)));

        let mut result = RewireResult {
            code: RewireCode::Ok,
            ..RewireResult::default()
        };
        for prior in &disabled {
            result.description.push(format!("disabled {} ---> {}", prior.source, prior.destination));
        }
        for conn in wanted {
            let conn = conn.with_comment(format!("diagnostic tap {instance_id}"));
            if graph.add_connection(conn.clone()) {
                result.description.push(format!("added {} ---> {}", conn.source, conn.destination));
                result.added.push(conn);
            }
        }
        result.disabled = disabled;

        let record = DiagnosticTap {
            instance_id,
            tap_node: tap_name,
            target_node: site.node,
            signal: site.signal,
            port: site.port,
            direction: site.direction,
            kind: site.kind,
            poll_ms,
        };
        info!(
            tap = %record.tap_node,
            target = %record.target(),
            instance_id,
            kind = %record.kind,
            disabled = result.disabled.len(),
            added = result.added.len(),
            "spliced diagnostic tap"
        );
        for line in &result.description {
            debug!(tap = %record.tap_node, "{line}");
        }
        Ok((record, result))
    }

    fn tap_node(&self, name: &str, site: &TapSite, poll_ms: u32, instance_id: u32) -> Node {
        let carries_data = site.kind != DataKind::Event;

        let mut req = ControlSignal::new(TAP_REQ, SignalDirection::Inbound);
        let mut cnf = ControlSignal::new(TAP_CNF, SignalDirection::Outbound);
        if carries_data {
            req = req.with_port(TAP_DATA_IN);
            cnf = cnf.with_port(TAP_DATA_OUT);
        }

        let target = Endpoint::new(&site.node, site.port.as_deref().unwrap_or(&site.signal));
        let mut node = Node::new(name, &self.config.node_type)
            .with_comment(format!("diagnostic tap on {target}"))
            .with_signal(ControlSignal::new(TAP_INIT, SignalDirection::Inbound))
            .with_signal(req)
            .with_signal(ControlSignal::new(TAP_INITO, SignalDirection::Outbound))
            .with_signal(cnf);
        if carries_data {
            node = node
                .with_port(Port::input(TAP_DATA_IN, site.kind))
                .with_port(Port::output(TAP_DATA_OUT, site.kind));
        }

        node.with_parameter(PARAM_ADDRESS, &self.config.server_address)
            .with_parameter(PARAM_PORT, self.config.server_port.to_string())
            .with_parameter(PARAM_POLL_MS, poll_ms.to_string())
            .with_parameter(PARAM_DATA_TYPE, site.kind.code().to_string())
            .with_parameter(PARAM_INST_ID, instance_id.to_string())
    }
}

fn check_names(node: &str, endpoint: &str) -> Result<(), RewireError> {
    if node.trim().is_empty() {
        return Err(RewireError::InvalidName(node.to_string()));
    }
    if endpoint.trim().is_empty() {
        return Err(RewireError::InvalidPortName {
            node: node.to_string(),
            port: endpoint.to_string(),
        });
    }
    Ok(())
}

fn resolve_endpoint(graph: &GraphModel, node: &str, endpoint: &str) -> Result<TapSite, RewireError> {
    check_names(node, endpoint)?;
    let target = graph
        .node(node)
        .ok_or_else(|| RewireError::FbNotFound(node.to_string()))?;

    if let Some(port) = target.port(endpoint) {
        let signal = target
            .signal_carrying(&port.name, port.direction.signal_direction())
            .ok_or_else(|| RewireError::EventUndefined(Endpoint::new(node, endpoint)))?;
        return Ok(TapSite {
            node: node.to_string(),
            signal: signal.name.clone(),
            port: Some(port.name.clone()),
            direction: port.direction,
            kind: port.kind,
        });
    }

    if let Some(signal) = target.signal(endpoint) {
        return Ok(bare_signal_site(node, signal));
    }

    Err(RewireError::EventUndefined(Endpoint::new(node, endpoint)))
}

fn resolve_request(graph: &GraphModel, request: &TapRequest) -> Result<TapSite, RewireError> {
    check_names(&request.node, &request.signal)?;
    let target = graph
        .node(&request.node)
        .ok_or_else(|| RewireError::FbNotFound(request.node.clone()))?;
    let signal = target
        .signal(&request.signal)
        .ok_or_else(|| RewireError::InvalidEventName {
            node: request.node.clone(),
            signal: request.signal.clone(),
        })?;

    let Some(port_name) = request.port.as_deref() else {
        return Ok(bare_signal_site(&request.node, signal));
    };

    let Some(port) = target.port(port_name) else {
        return Err(RewireError::EventUndefined(Endpoint::new(&request.node, port_name)));
    };
    // The request names the signal explicitly; another signal carrying the
    // port does not stand in for it.
    if !signal.carries(port_name) || signal.direction != port.direction.signal_direction() {
        return Err(RewireError::InvalidEventName {
            node: request.node.clone(),
            signal: request.signal.clone(),
        });
    }
    Ok(TapSite {
        node: request.node.clone(),
        signal: signal.name.clone(),
        port: Some(port.name.clone()),
        direction: port.direction,
        kind: port.kind,
    })
}

fn bare_signal_site(node: &str, signal: &ControlSignal) -> TapSite {
    let direction = match signal.direction {
        SignalDirection::Inbound => PortDirection::Input,
        SignalDirection::Outbound => PortDirection::Output,
    };
    TapSite {
        node: node.to_string(),
        signal: signal.name.clone(),
        port: None,
        direction,
        kind: DataKind::Event,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> GraphModel {
        let mut g = GraphModel::new("app");
        g.add_node(
            Node::new("SENSOR", "TEMP_SENSOR")
                .with_signal(ControlSignal::new("CNF", SignalDirection::Outbound).with_port("TEMP"))
                .with_port(Port::output("TEMP", DataKind::Real)),
        )
        .unwrap();
        g.add_node(
            Node::new("CONV", "F_TO_C")
                .with_signal(ControlSignal::new("REQ", SignalDirection::Inbound).with_port("F"))
                .with_signal(ControlSignal::new("CNF", SignalDirection::Outbound))
                .with_port(Port::input("F", DataKind::Real))
                .with_port(Port::output("C", DataKind::Real)),
        )
        .unwrap();
        g.connect(Endpoint::new("SENSOR", "CNF"), Endpoint::new("CONV", "REQ"));
        g.connect(Endpoint::new("SENSOR", "TEMP"), Endpoint::new("CONV", "F"));
        g
    }

    #[test]
    fn input_splice_routes_signal_and_data_through_tap() {
        let mut g = graph();
        let mut engine = RewritingEngine::new(TapConfig::default());
        let (tap, result) = engine.insert_tap(&mut g, "CONV", "F", 50).unwrap();

        assert_eq!(tap.instance_id, 1);
        assert_eq!(tap.signal, "REQ");
        assert_eq!(tap.direction, PortDirection::Input);
        assert_eq!(result.disabled.len(), 2);

        let tap_ep = |n: &str| Endpoint::new("DIAG_TAP_1", n);
        let enabled: Vec<_> = g.enabled_connections().cloned().collect();
        let has = |s: Endpoint, d: Endpoint| enabled.iter().any(|c| c.source == s && c.destination == d);
        assert!(has(Endpoint::new("SENSOR", "TEMP"), tap_ep(TAP_DATA_IN)));
        assert!(has(Endpoint::new("SENSOR", "CNF"), tap_ep(TAP_REQ)));
        assert!(has(tap_ep(TAP_DATA_OUT), Endpoint::new("CONV", "F")));
        assert!(has(tap_ep(TAP_CNF), Endpoint::new("CONV", "REQ")));
        assert!(has(Endpoint::new(START_NODE, START_COLD), tap_ep(TAP_INIT)));
        assert!(has(Endpoint::new(START_NODE, START_WARM), tap_ep(TAP_INIT)));
        assert!(g.validate().is_ok());
    }

    #[test]
    fn output_splice_mirrors_on_source_side() {
        let mut g = graph();
        let mut engine = RewritingEngine::new(TapConfig::default());
        let (tap, result) = engine.insert_tap(&mut g, "SENSOR", "TEMP", 100).unwrap();

        assert_eq!(tap.direction, PortDirection::Output);
        assert_eq!(result.disabled.len(), 2);
        let downstream = g.downstream_of("DIAG_TAP_1");
        assert_eq!(downstream, vec!["CONV"]);
        assert_eq!(g.downstream_of("SENSOR"), vec!["DIAG_TAP_1"]);
    }

    #[test]
    fn event_only_tap_without_prior_wiring_is_legal() {
        let mut g = graph();
        let mut engine = RewritingEngine::new(TapConfig::default());
        let (tap, result) = engine.insert_tap(&mut g, "CONV", "CNF", 100).unwrap();
        assert!(tap.is_event_only());
        assert_eq!(tap.kind, DataKind::Event);
        assert!(result.disabled.is_empty());

        let node = g.node(&tap.tap_node).unwrap();
        assert!(node.port(TAP_DATA_IN).is_none());
        assert_eq!(node.parameter(PARAM_DATA_TYPE), Some("-1"));
    }

    #[test]
    fn tap_parameters_carry_transport_settings() {
        let mut g = graph();
        let config = TapConfig::default().with_server("10.0.0.5", 7000);
        let mut engine = RewritingEngine::new(config);
        let (tap, _) = engine.insert_tap(&mut g, "CONV", "F", 250).unwrap();
        let node = g.node(&tap.tap_node).unwrap();

        assert_eq!(node.node_type, "DIAG_TAP");
        assert_eq!(node.parameter(PARAM_ADDRESS), Some("10.0.0.5"));
        assert_eq!(node.parameter(PARAM_PORT), Some("7000"));
        assert_eq!(node.parameter(PARAM_POLL_MS), Some("250"));
        assert_eq!(node.parameter(PARAM_DATA_TYPE), Some("2"));
        assert_eq!(node.parameter(PARAM_INST_ID), Some("1"));
    }

    #[test]
    fn test_rejects_blank_names() {
        let mut g = graph();
        let mut engine = RewritingEngine::new(TapConfig::default());
        let err = engine.insert_tap(&mut g, " ", "F", 100).unwrap_err();
        assert_eq!(err.code(), RewireCode::InvalidName);
        let err = engine.insert_tap(&mut g, "CONV", "", 100).unwrap_err();
        assert_eq!(err.code(), RewireCode::InvalidPortName);
    }

    #[test]
    fn test_rejects_unknown_node_and_endpoint() {
        let mut g = graph();
        let mut engine = RewritingEngine::new(TapConfig::default());
        let err = engine.insert_tap(&mut g, "NOPE", "F", 100).unwrap_err();
        assert_eq!(err.code(), RewireCode::FbNotFound);
        let err = engine.insert_tap(&mut g, "CONV", "MISSING", 100).unwrap_err();
        assert_eq!(err.code(), RewireCode::EventUndefined);
        assert_eq!(engine.issued(), 0);
    }

    #[test]
    fn request_with_undeclared_signal_is_invalid_event_name() {
        let mut g = graph();
        let mut engine = RewritingEngine::new(TapConfig::default());
        let result = engine.instrument_all(
            &mut g,
            &[
                TapRequest::new("CONV", "STALE").with_port("F"),
                TapRequest::new("CONV", "REQ").with_port("F"),
            ],
        );
        assert!(!result.is_complete());
        assert_eq!(result.failures[0].error.code(), RewireCode::InvalidEventName);
        assert_eq!(result.taps.len(), 1);
        assert_eq!(result.taps[0].instance_id, 1);
    }

    #[test]
    fn request_with_signal_not_carrying_port_is_not_retargeted() {
        let mut g = graph();
        let connections = g.connection_count();
        let mut engine = RewritingEngine::new(TapConfig::default());
        let result = engine.instrument_all(
            &mut g,
            &[
                TapRequest::new("CONV", "CNF").with_port("F"),
                TapRequest::new("CONV", "REQ").with_port("C"),
                TapRequest::new("CONV", "REQ").with_port("Z"),
            ],
        );
        assert!(result.taps.is_empty());
        let codes: Vec<_> = result.failures.iter().map(|f| f.error.code()).collect();
        assert_eq!(
            codes,
            vec![
                RewireCode::InvalidEventName,
                RewireCode::InvalidEventName,
                RewireCode::EventUndefined
            ]
        );
        assert_eq!(g.connection_count(), connections);
        assert_eq!(engine.issued(), 0);
    }

    #[test]
    fn tap_limit_is_resource_exhaustion() {
        let mut g = graph();
        let mut engine = RewritingEngine::new(TapConfig::default().with_max_taps(1));
        let result = engine.instrument_all(
            &mut g,
            &[
                TapRequest::new("CONV", "REQ").with_port("F"),
                TapRequest::new("SENSOR", "CNF").with_port("TEMP"),
            ],
        );
        assert_eq!(result.taps.len(), 1);
        assert!(result.has_resource_exhaustion());
        assert_eq!(
            result.failures[0].error,
            RewireError::TapLimitExceeded { max: 1 }
        );
    }
}
