//! Team lifecycle with scripted monitors

use fde_agents::{
    Belief, BeliefKind, Beliefs, CoordinatorConfig, DiagnosticScript, GoalKind, GoalOutcome,
    GoalResult, TeamCoordinator, Veracity, WorkerConfig, WorkerContext,
};
use fde_diagnostics::DiagnosticPointRegistry;
use fde_graph::StaticGraphSource;
use fde_telemetry::TelemetryHub;
use fde_test_utils::{temperature_app, temperature_requests, RecordingDeployer, RejectingDeployer};
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(10);

/// Monitor that always reports the same verdict
struct Verdict(Veracity);

impl DiagnosticScript for Verdict {
    fn name(&self) -> &str {
        "verdict"
    }

    fn monitor(&mut self, _points: &DiagnosticPointRegistry, _beliefs: &mut Beliefs) -> Belief {
        Belief::new("Healthy", BeliefKind::Dynamic, self.0)
    }

    fn diagnose(&mut self, _points: &DiagnosticPointRegistry, beliefs: &mut Beliefs) -> GoalResult {
        beliefs.create("RootCause", BeliefKind::Dynamic, Veracity::True, "sensor stuck");
        GoalResult::Passed
    }
}

fn context(name: &str, verdict: Veracity) -> WorkerContext {
    WorkerContext::new(
        name,
        Arc::new(TelemetryHub::new(4)),
        Arc::new(StaticGraphSource::new(temperature_app())),
        Arc::new(RecordingDeployer::new()),
    )
    .with_requests(temperature_requests())
    .with_script(Box::new(Verdict(verdict)))
    .with_config(WorkerConfig::default().with_await_connection(false))
}

fn goals(history: &[GoalOutcome]) -> Vec<GoalKind> {
    history.iter().map(|o| o.goal).collect()
}

#[test]
fn failed_watch_is_routed_to_diagnosis_only_for_that_worker() {
    let mut team = TeamCoordinator::new(CoordinatorConfig::default().with_poll_interval_ms(2));
    team.spawn_worker(context("faulty", Veracity::False)).unwrap();
    team.spawn_worker(context("healthy", Veracity::True)).unwrap();

    let done = team.run_until(WAIT, |t| {
        t.worker("faulty").unwrap().history().len() >= 3
            && t.worker("healthy").unwrap().history().len() >= 3
    });
    assert!(done, "team did not progress");
    team.shutdown();

    let faulty = team.worker("faulty").unwrap().history();
    assert_eq!(
        &faulty[..3],
        &[
            GoalOutcome::new(GoalKind::ConfigureDiagnostics, GoalResult::Passed),
            GoalOutcome::new(GoalKind::WatchForFaults, GoalResult::Failed),
            GoalOutcome::new(GoalKind::DiagnoseFaults, GoalResult::Passed),
        ]
    );
    if faulty.len() > 3 {
        assert_eq!(faulty[3].goal, GoalKind::ReportFaults);
    }

    let healthy = team.worker("healthy").unwrap().history();
    assert_eq!(
        goals(&healthy[..3]),
        vec![
            GoalKind::ConfigureDiagnostics,
            GoalKind::WatchForFaults,
            GoalKind::WatchForFaults
        ]
    );
    assert!(healthy[1..].iter().all(|o| o.result == GoalResult::Passed));
}

#[test]
fn failed_configure_is_retried_instead_of_watching() {
    let ctx = WorkerContext::new(
        "undeployable",
        Arc::new(TelemetryHub::new(4)),
        Arc::new(StaticGraphSource::new(temperature_app())),
        Arc::new(RejectingDeployer),
    )
    .with_requests(temperature_requests())
    .with_config(
        WorkerConfig::default()
            .with_await_connection(false)
            .with_configure_backoff_ms(40, 40),
    );
    let mut team = TeamCoordinator::new(CoordinatorConfig::default().with_poll_interval_ms(2));
    team.spawn_worker(ctx).unwrap();

    let retried = team.run_until(WAIT, |t| t.worker("undeployable").unwrap().history().len() >= 4);
    assert!(retried);
    team.shutdown();

    let history = team.worker("undeployable").unwrap().history();
    assert_eq!(
        &history[..4],
        &[
            GoalOutcome::new(GoalKind::ConfigureDiagnostics, GoalResult::Failed),
            GoalOutcome::new(GoalKind::ReportFaults, GoalResult::Passed),
            GoalOutcome::new(GoalKind::ConfigureDiagnostics, GoalResult::Failed),
            GoalOutcome::new(GoalKind::ReportFaults, GoalResult::Passed),
        ]
    );
    assert!(history.iter().all(|o| o.goal != GoalKind::WatchForFaults));
    assert!(!team.worker("undeployable").unwrap().has_harness());
}

#[test]
fn shutdown_stops_all_workers() {
    let mut team = TeamCoordinator::new(CoordinatorConfig::default());
    team.spawn_worker(context("a", Veracity::Undetermined)).unwrap();
    team.spawn_worker(context("b", Veracity::Undetermined)).unwrap();
    team.run_for(Duration::from_millis(100));
    team.shutdown();

    for worker in team.workers() {
        assert!(worker.assign(GoalKind::WatchForFaults).is_err());
    }
    assert_eq!(team.poll_once(), 0);
}
