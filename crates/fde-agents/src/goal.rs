//! Goal kinds and their bodies
//!
//! Goals are plain data. [`run_goal`] dispatches on the kind and runs the
//! matching body against a [`WorkerContext`]; [`next_goal`] decides what a
//! worker does after a goal completes.

use crate::belief::{BeliefKind, Veracity};
use crate::context::WorkerContext;
use fde_diagnostics::DiagnosticPointRegistry;
use fde_graph::{DeploymentPlan, RewritingEngine};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Named unit of work in the diagnosis lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GoalKind {
    ConfigureDiagnostics,
    WatchForFaults,
    DiagnoseFaults,
    ReportFaults,
}

impl fmt::Display for GoalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ConfigureDiagnostics => "CONFIGURE_DIAGNOSTICS",
            Self::WatchForFaults => "WATCH_FOR_FAULTS",
            Self::DiagnoseFaults => "DIAGNOSE_FAULTS",
            Self::ReportFaults => "REPORT_FAULTS",
        })
    }
}

/// How a goal ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GoalResult {
    Passed,
    Failed,
    Stopped,
}

impl fmt::Display for GoalResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
            Self::Stopped => "STOPPED",
        })
    }
}

/// A completed goal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalOutcome {
    pub goal: GoalKind,
    pub result: GoalResult,
}

impl GoalOutcome {
    #[must_use]
    pub fn new(goal: GoalKind, result: GoalResult) -> Self {
        Self { goal, result }
    }
}

/// Goal to assign to an idle worker given its last outcome and whether
/// it holds a deployed harness.
///
/// A failed watch leads to diagnosis. A failed configure or diagnose, and
/// a passed diagnose, lead to the report. A worker without a harness then
/// configures again; everything else watches.
#[must_use]
pub fn next_goal(last: Option<GoalOutcome>, harnessed: bool) -> GoalKind {
    let Some(last) = last else {
        return GoalKind::ConfigureDiagnostics;
    };
    match (last.goal, last.result) {
        (GoalKind::ConfigureDiagnostics | GoalKind::DiagnoseFaults, GoalResult::Failed)
        | (GoalKind::DiagnoseFaults, GoalResult::Passed) => GoalKind::ReportFaults,
        (_, GoalResult::Failed) => GoalKind::DiagnoseFaults,
        _ if !harnessed => GoalKind::ConfigureDiagnostics,
        _ => GoalKind::WatchForFaults,
    }
}

/// Run the body of `goal` to completion.
pub fn run_goal(goal: GoalKind, ctx: &mut WorkerContext) -> GoalResult {
    if ctx.is_stopping() {
        return GoalResult::Stopped;
    }
    match goal {
        GoalKind::ConfigureDiagnostics => configure_diagnostics(ctx),
        GoalKind::WatchForFaults => watch_for_faults(ctx),
        GoalKind::DiagnoseFaults => diagnose_faults(ctx),
        GoalKind::ReportFaults => report_faults(ctx),
    }
}

fn configure_diagnostics(ctx: &mut WorkerContext) -> GoalResult {
    if ctx.configure_failures > 0 {
        let backoff = ctx.config.configure_backoff(ctx.configure_failures);
        info!(
            worker = %ctx.name,
            failures = ctx.configure_failures,
            backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
            "retrying configure"
        );
        if !ctx.pause(backoff) {
            return GoalResult::Stopped;
        }
    }

    let result = configure_once(ctx);
    match result {
        GoalResult::Passed => ctx.configure_failures = 0,
        GoalResult::Failed => {
            ctx.configure_failures = ctx.configure_failures.saturating_add(1);
            ctx.graph = None;
            ctx.registry = DiagnosticPointRegistry::new();
        }
        GoalResult::Stopped => {}
    }
    result
}

fn configure_once(ctx: &mut WorkerContext) -> GoalResult {
    const SUD: BeliefKind = BeliefKind::SystemUnderDiagnosis;

    let mut graph = match ctx.source.load() {
        Ok(graph) => graph,
        Err(e) => {
            warn!(worker = %ctx.name, error = %e, "application load failed");
            ctx.beliefs.create("LoadStatus", SUD, Veracity::False, e.to_string());
            return GoalResult::Failed;
        }
    };
    ctx.beliefs.create("AppName", SUD, Veracity::True, graph.name.clone());
    ctx.beliefs.create("LoadStatus", SUD, Veracity::True, "application loaded");
    graph.ensure_start_node(false);

    let mut engine = RewritingEngine::new(ctx.tap_config.clone());
    let harness = engine.instrument_all(&mut graph, &ctx.requests);
    if !harness.is_complete() {
        for failure in &harness.failures {
            ctx.beliefs.create(
                "HarnessStatus",
                SUD,
                Veracity::False,
                format!("{}: {}", failure.error.code(), failure.error),
            );
        }
        warn!(worker = %ctx.name, failures = harness.failures.len(), "diagnostic harness incomplete");
        return GoalResult::Failed;
    }
    ctx.beliefs.create(
        "HarnessStatus",
        SUD,
        Veracity::True,
        format!("{} taps", harness.taps.len()),
    );

    let deployed = DeploymentPlan::checked(&graph).and_then(|plan| ctx.deployer.deploy(&plan));
    if let Err(e) = deployed {
        warn!(worker = %ctx.name, error = %e, "deployment failed");
        ctx.beliefs.create("DeployedStatus", SUD, Veracity::False, e.to_string());
        return GoalResult::Failed;
    }
    ctx.beliefs.create("DeployedStatus", SUD, Veracity::True, "application deployed");

    ctx.registry =
        DiagnosticPointRegistry::from_taps(&harness.taps, &ctx.hub, &graph, ctx.policy);
    ctx.graph = Some(graph);
    info!(worker = %ctx.name, taps = ctx.registry.count(), "diagnostic harness ready");

    if !ctx.config.await_connection {
        return GoalResult::Passed;
    }
    let deadline = Instant::now() + Duration::from_millis(ctx.config.connect_timeout_ms);
    let poll = Duration::from_millis(ctx.config.connect_poll_ms.max(1));
    while ctx.hub.connection_count() == 0 {
        if ctx.is_stopping() {
            return GoalResult::Stopped;
        }
        if Instant::now() >= deadline {
            ctx.beliefs.create("ConnectionStatus", SUD, Veracity::False, "no tap connected");
            warn!(worker = %ctx.name, timeout_ms = ctx.config.connect_timeout_ms, "application never connected");
            return GoalResult::Failed;
        }
        std::thread::sleep(poll);
    }
    ctx.beliefs.create("ConnectionStatus", SUD, Veracity::True, "application connected");
    GoalResult::Passed
}

fn watch_for_faults(ctx: &mut WorkerContext) -> GoalResult {
    if ctx.graph.is_none() {
        return GoalResult::Stopped;
    }
    let belief = ctx.script.monitor(&ctx.registry, &mut ctx.beliefs);
    let result = match belief.veracity {
        Veracity::False => GoalResult::Failed,
        Veracity::True => GoalResult::Passed,
        Veracity::Undetermined => GoalResult::Stopped,
    };
    if result == GoalResult::Failed {
        warn!(worker = %ctx.name, script = ctx.script.name(), %belief, "fault observed");
    }
    ctx.beliefs.insert(belief);
    result
}

fn diagnose_faults(ctx: &mut WorkerContext) -> GoalResult {
    if ctx.graph.is_none() {
        return GoalResult::Failed;
    }
    let result = ctx.script.diagnose(&ctx.registry, &mut ctx.beliefs);
    info!(worker = %ctx.name, script = ctx.script.name(), %result, "diagnosis finished");
    result
}

fn report_faults(ctx: &mut WorkerContext) -> GoalResult {
    info!(worker = %ctx.name, beliefs = ctx.beliefs.count(), "fault report");
    for belief in ctx.beliefs.iter() {
        info!(worker = %ctx.name, kind = ?belief.kind, "{belief}");
    }
    GoalResult::Passed
}
