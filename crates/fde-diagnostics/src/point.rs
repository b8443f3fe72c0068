//! Client-side handle for one diagnostic tap
//!
//! None of the operations here fail loudly. Missing data reads as the zero
//! value and an unacknowledged trigger returns `false`; retry policy
//! belongs to the caller.

use crate::value::TapValue;
use fde_graph::{DataKind, DiagnosticTap, GraphModel, Parameter};
use fde_telemetry::{now_millis, Command, TelemetryFrame, TelemetryHub};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// How long a trigger waits for the tap's `TIMESTAMP` acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerPolicy {
    pub max_retries: u32,
    pub delay_ms: u64,
}

impl Default for TriggerPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            delay_ms: 100,
        }
    }
}

impl TriggerPolicy {
    #[must_use]
    pub fn new(max_retries: u32, delay_ms: u64) -> Self {
        Self {
            max_retries,
            delay_ms,
        }
    }

    #[inline]
    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug)]
struct Observed {
    value: TapValue,
    timestamp: i64,
}

/// Typed read/trigger/gate access to one tap
#[derive(Debug)]
pub struct DiagnosticPoint {
    tap: DiagnosticTap,
    hub: Arc<TelemetryHub>,
    target_params: Vec<Parameter>,
    policy: TriggerPolicy,
    observed: Mutex<Observed>,
}

impl DiagnosticPoint {
    /// Bind `tap` to the hub's queues for its instance id
    #[must_use]
    pub fn new(tap: DiagnosticTap, hub: Arc<TelemetryHub>, target_params: Vec<Parameter>) -> Self {
        let value = TapValue::zero(tap.kind);
        Self {
            tap,
            hub,
            target_params,
            policy: TriggerPolicy::default(),
            observed: Mutex::new(Observed {
                value,
                timestamp: 0,
            }),
        }
    }

    /// Bind `tap`, taking the instrumented node's parameters from `graph`
    #[must_use]
    pub fn from_graph(tap: DiagnosticTap, hub: Arc<TelemetryHub>, graph: &GraphModel) -> Self {
        let params = graph
            .node(&tap.target_node)
            .map(|n| n.parameters.clone())
            .unwrap_or_default();
        Self::new(tap, hub, params)
    }

    #[must_use]
    pub fn with_policy(mut self, policy: TriggerPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[inline]
    #[must_use]
    pub fn tap(&self) -> &DiagnosticTap {
        &self.tap
    }

    #[inline]
    #[must_use]
    pub fn instance_id(&self) -> u32 {
        self.tap.instance_id
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> DataKind {
        self.tap.kind
    }

    #[inline]
    #[must_use]
    pub fn policy(&self) -> TriggerPolicy {
        self.policy
    }

    /// Whether a frame is waiting in the inbound queue.
    #[must_use]
    pub fn has_data(&self) -> bool {
        self.hub.in_queue_size(self.tap.instance_id) > 0
    }

    /// Pop one frame. A `SAMPLED_DATA` frame is parsed as the tap's kind and
    /// recorded; anything else reads as the zero value.
    pub fn read_typed(&self) -> TapValue {
        let frame = self.hub.get_packet(self.tap.instance_id);
        if frame.command != Command::SampledData {
            return TapValue::zero(self.tap.kind);
        }
        let value = TapValue::parse(self.tap.kind, &frame.data_value);
        let mut observed = self.observed.lock();
        observed.value = value.clone();
        observed.timestamp = frame.timestamp.unwrap_or_else(now_millis);
        value
    }

    /// Drain queued frames until one stamped at or after `since` appears.
    ///
    /// Data taps also capture the frame's value. Only what is already queued
    /// is examined.
    pub fn read_event(&self, since: i64) -> bool {
        while self.has_data() {
            let frame = self.hub.get_packet(self.tap.instance_id);
            if frame.is_undefined() {
                break;
            }
            let stamp = frame.timestamp.unwrap_or(0);
            let mut observed = self.observed.lock();
            observed.timestamp = stamp;
            if frame.command == Command::SampledData && !self.tap.is_event_only() {
                observed.value = TapValue::parse(self.tap.kind, &frame.data_value);
            }
            if stamp >= since {
                return true;
            }
        }
        false
    }

    /// Inject `value` and wait for the acknowledgement.
    pub fn trigger_value(&self, value: &TapValue) -> bool {
        if self.tap.is_event_only() {
            return self.trigger();
        }
        let frame =
            TelemetryFrame::new(Command::TriggerDataValue, self.tap.instance_id, value.to_string());
        self.send_and_await(frame)
    }

    /// Inject a bare event and wait for the acknowledgement.
    pub fn trigger(&self) -> bool {
        self.send_and_await(TelemetryFrame::control(
            Command::TriggerEvent,
            self.tap.instance_id,
        ))
    }

    fn send_and_await(&self, frame: TelemetryFrame) -> bool {
        let sent_at = now_millis();
        let command = frame.command;
        if let Err(e) = self.hub.send_packet(self.tap.instance_id, frame) {
            warn!(tap = %self.tap.tap_node, error = %e, "trigger not queued");
            return false;
        }

        let id = self.tap.instance_id;
        for attempt in 0..=self.policy.max_retries {
            let ack = self.hub.take_inbound_where(id, |f| {
                f.command == Command::Timestamp && f.timestamp.is_some_and(|t| t >= sent_at)
            });
            if let Some(ack) = ack {
                self.observed.lock().timestamp = ack.timestamp.unwrap_or(sent_at);
                debug!(tap = %self.tap.tap_node, %command, attempt, "trigger acknowledged");
                return true;
            }
            if attempt < self.policy.max_retries {
                std::thread::sleep(self.policy.delay());
            }
        }
        warn!(
            tap = %self.tap.tap_node,
            %command,
            retries = self.policy.max_retries,
            "trigger not acknowledged"
        );
        false
    }

    /// Poll for a sample within `threshold` of `expected`.
    pub fn read_wait(&self, expected: f64, threshold: f64, max_retries: u32, delay: Duration) -> bool {
        for attempt in 0..max_retries.max(1) {
            while self.has_data() {
                if let Some(v) = self.read_typed().as_f64() {
                    if (v - expected).abs() < threshold {
                        return true;
                    }
                }
            }
            if attempt + 1 < max_retries {
                std::thread::sleep(delay);
            }
        }
        false
    }

    /// Whether the last recorded value is within `threshold` of `expected`.
    #[must_use]
    pub fn compare(&self, expected: f64, threshold: f64) -> bool {
        self.observed
            .lock()
            .value
            .as_f64()
            .is_some_and(|v| (v - expected).abs() < threshold)
    }

    /// Hold natural traffic so injected values do not race with it.
    /// Pending inbound samples are discarded.
    pub fn gate_close(&self) -> bool {
        let sent = self.send_mode(Command::TriggerEnabled);
        let dropped = self.hub.flush(self.tap.instance_id);
        debug!(tap = %self.tap.tap_node, dropped, "gate closed");
        sent
    }

    /// Return the tap to free passthrough.
    pub fn gate_open(&self) -> bool {
        self.send_mode(Command::PassthroughEnabled)
    }

    fn send_mode(&self, command: Command) -> bool {
        let frame = TelemetryFrame::control(command, self.tap.instance_id);
        match self.hub.send_packet(self.tap.instance_id, frame) {
            Ok(()) => true,
            Err(e) => {
                warn!(tap = %self.tap.tap_node, %command, error = %e, "mode change not queued");
                false
            }
        }
    }

    /// Last recorded value.
    #[must_use]
    pub fn value(&self) -> TapValue {
        self.observed.lock().value.clone()
    }

    /// Timestamp of the last recorded frame, 0 if none.
    #[must_use]
    pub fn timestamp(&self) -> i64 {
        self.observed.lock().timestamp
    }

    /// Parameter of the instrumented node.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.target_params
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }

    /// Parameter as a float, 0.0 if absent or malformed.
    #[must_use]
    pub fn param_f64(&self, name: &str) -> f64 {
        self.param(name)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0.0)
    }

    /// Parameter as an integer, 0 if absent or malformed.
    #[must_use]
    pub fn param_i64(&self, name: &str) -> i64 {
        self.param(name)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }
}
