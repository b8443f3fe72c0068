//! Diagnostic script boundary
//!
//! Scripts hold the domain knowledge of one worker: what a healthy
//! application looks like on its taps and how to localize a fault.

use crate::belief::{Belief, BeliefKind, Beliefs, Veracity};
use crate::goal::GoalResult;
use fde_diagnostics::DiagnosticPointRegistry;
use tracing::info;

/// Worker-specific monitor and root-cause logic
pub trait DiagnosticScript: Send {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Observe the application once.
    ///
    /// The returned belief is `TRUE` when the application behaves as
    /// expected, `FALSE` when a fault was seen and `UNDETERMINED` when
    /// there was not enough evidence either way.
    fn monitor(&mut self, points: &DiagnosticPointRegistry, beliefs: &mut Beliefs) -> Belief;

    /// Localize the fault reported by the last failed watch.
    fn diagnose(&mut self, points: &DiagnosticPointRegistry, beliefs: &mut Beliefs) -> GoalResult;
}

/// Drains every tap and logs what it saw, never reporting a fault
#[derive(Debug, Default)]
pub struct PassiveMonitor {
    samples: u64,
}

impl PassiveMonitor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Samples read so far.
    #[inline]
    #[must_use]
    pub fn samples(&self) -> u64 {
        self.samples
    }
}

impl DiagnosticScript for PassiveMonitor {
    fn name(&self) -> &str {
        "passive-monitor"
    }

    fn monitor(&mut self, points: &DiagnosticPointRegistry, _beliefs: &mut Beliefs) -> Belief {
        let mut seen = 0u64;
        for point in points.iter() {
            while point.has_data() {
                let value = point.read_typed();
                seen += 1;
                info!(
                    tap = %point.tap().tap_node,
                    target = %point.tap().target(),
                    %value,
                    timestamp = point.timestamp(),
                    "sample"
                );
            }
        }
        self.samples += seen;

        let veracity = if seen > 0 {
            Veracity::True
        } else {
            Veracity::Undetermined
        };
        Belief::new("ApplicationActive", BeliefKind::Dynamic, veracity)
            .with_description(format!("{seen} samples"))
    }

    fn diagnose(&mut self, _points: &DiagnosticPointRegistry, beliefs: &mut Beliefs) -> GoalResult {
        beliefs.create(
            "RootCause",
            BeliefKind::Dynamic,
            Veracity::Undetermined,
            "passive monitoring cannot localize faults",
        );
        GoalResult::Passed
    }
}
