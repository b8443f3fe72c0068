//! Name-addressable collection of diagnostic points

use crate::point::{DiagnosticPoint, TriggerPolicy};
use dashmap::DashMap;
use fde_graph::{DiagnosticTap, GraphModel};
use fde_telemetry::TelemetryHub;
use std::sync::Arc;
use tracing::debug;

/// Diagnostic points in tap order, plus friendly aliases
#[derive(Debug, Default)]
pub struct DiagnosticPointRegistry {
    points: Vec<Arc<DiagnosticPoint>>,
    aliases: DashMap<String, usize>,
}

impl DiagnosticPointRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one point per tap, taking target parameters from `graph`.
    #[must_use]
    pub fn from_taps(
        taps: &[DiagnosticTap],
        hub: &Arc<TelemetryHub>,
        graph: &GraphModel,
        policy: TriggerPolicy,
    ) -> Self {
        let mut registry = Self::new();
        for tap in taps {
            registry.add(
                DiagnosticPoint::from_graph(tap.clone(), Arc::clone(hub), graph).with_policy(policy),
            );
        }
        registry
    }

    pub fn add(&mut self, point: DiagnosticPoint) -> Arc<DiagnosticPoint> {
        let point = Arc::new(point);
        self.points.push(Arc::clone(&point));
        point
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<Arc<DiagnosticPoint>> {
        self.points.get(index).cloned()
    }

    #[inline]
    #[must_use]
    pub fn count(&self) -> usize {
        self.points.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<DiagnosticPoint>> {
        self.points.iter()
    }

    /// Point instrumenting `endpoint` (a port or signal name) of `node`.
    #[must_use]
    pub fn map(&self, node: &str, endpoint: &str) -> Option<Arc<DiagnosticPoint>> {
        self.position(node, endpoint).and_then(|i| self.get(i))
    }

    fn position(&self, node: &str, endpoint: &str) -> Option<usize> {
        let by_port = self.points.iter().position(|p| {
            let tap = p.tap();
            tap.target_node == node && tap.port.as_deref() == Some(endpoint)
        });
        by_port.or_else(|| {
            self.points.iter().position(|p| {
                let tap = p.tap();
                tap.target_node == node && tap.signal == endpoint
            })
        })
    }

    #[must_use]
    pub fn by_instance(&self, instance_id: u32) -> Option<Arc<DiagnosticPoint>> {
        self.points
            .iter()
            .find(|p| p.instance_id() == instance_id)
            .cloned()
    }

    /// Name the point on `node.endpoint`. Returns `false` if no such point exists.
    pub fn bind_alias(&self, alias: impl Into<String>, node: &str, endpoint: &str) -> bool {
        let Some(index) = self.position(node, endpoint) else {
            return false;
        };
        let alias = alias.into();
        debug!(%alias, node, endpoint, "alias bound");
        self.aliases.insert(alias, index);
        true
    }

    #[must_use]
    pub fn alias(&self, alias: &str) -> Option<Arc<DiagnosticPoint>> {
        let index = *self.aliases.get(alias)?;
        self.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fde_graph::{DataKind, PortDirection};

    fn tap(id: u32, node: &str, signal: &str, port: Option<&str>) -> DiagnosticTap {
        DiagnosticTap {
            instance_id: id,
            tap_node: format!("DIAG_TAP_{id}"),
            target_node: node.into(),
            signal: signal.into(),
            port: port.map(str::to_string),
            direction: PortDirection::Input,
            kind: if port.is_some() { DataKind::Real } else { DataKind::Event },
            poll_ms: 100,
        }
    }

    fn registry() -> DiagnosticPointRegistry {
        let hub = Arc::new(TelemetryHub::new(4));
        let taps = [
            tap(1, "CONV", "REQ", Some("F")),
            tap(2, "CONV", "CNF", Some("C")),
            tap(3, "DISPLAY", "ALARM", None),
        ];
        DiagnosticPointRegistry::from_taps(&taps, &hub, &GraphModel::new("g"), TriggerPolicy::default())
    }

    #[test]
    fn lookups() {
        let r = registry();
        assert_eq!(r.count(), 3);
        assert_eq!(r.get(1).unwrap().instance_id(), 2);
        assert!(r.get(3).is_none());
        assert_eq!(r.map("CONV", "C").unwrap().instance_id(), 2);
        assert_eq!(r.map("CONV", "REQ").unwrap().instance_id(), 1);
        assert_eq!(r.map("DISPLAY", "ALARM").unwrap().instance_id(), 3);
        assert!(r.map("DISPLAY", "VALUE").is_none());
        assert_eq!(r.by_instance(3).unwrap().tap().signal, "ALARM");
    }

    #[test]
    fn aliases_resolve_to_points() {
        let r = registry();
        assert!(r.bind_alias("celsius", "CONV", "C"));
        assert!(!r.bind_alias("ghost", "NOPE", "X"));
        assert_eq!(r.alias("celsius").unwrap().instance_id(), 2);
        assert!(r.alias("ghost").is_none());
    }
}
