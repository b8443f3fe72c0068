//! Team assembly
//!
//! One telemetry server per worker: tap instance ids are numbered per
//! graph, so two applications cannot share a queue set.

use crate::config::{EngineConfig, WorkerSpec};
use crate::error::EngineError;
use fde_agents::{TeamCoordinator, WorkerContext};
use fde_graph::{
    load_requests, Deployer, DeploymentPlan, GraphSource, InstrumentationResult, JsonGraphSource,
    JsonPlanWriter, LoggingDeployer, RewritingEngine, TapConfig, TapRequest,
};
use fde_telemetry::TelemetryServer;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// A worker's telemetry endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerEndpoint {
    pub worker: String,
    pub local_addr: SocketAddr,
}

/// Running diagnostic team and the servers its taps report to
#[derive(Debug)]
pub struct Engine {
    coordinator: TeamCoordinator,
    servers: Vec<(String, TelemetryServer)>,
}

impl Engine {
    /// Start a telemetry server and spawn a worker for every configured spec.
    ///
    /// Servers already started are shut down again if a later worker fails.
    ///
    /// # Errors
    /// `NoWorkers`, an unreadable request list, or a bind/spawn failure.
    pub fn start(config: &EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        if config.workers.is_empty() {
            return Err(EngineError::NoWorkers);
        }

        let mut engine = Self {
            coordinator: TeamCoordinator::new(config.coordinator.clone()),
            servers: Vec::with_capacity(config.workers.len()),
        };
        for (index, spec) in config.workers.iter().enumerate() {
            engine.add_worker(config, spec, config.worker_port(index))?;
        }
        info!(workers = engine.servers.len(), "engine started");
        Ok(engine)
    }

    fn add_worker(
        &mut self,
        config: &EngineConfig,
        spec: &WorkerSpec,
        port: u16,
    ) -> Result<(), EngineError> {
        let requests = match &spec.requests {
            Some(path) => load_requests(path).map_err(|source| EngineError::Graph {
                worker: spec.name.clone(),
                source,
            })?,
            None => Vec::new(),
        };

        let mut server = TelemetryServer::new(config.server.clone());
        let local_addr = server
            .start(&config.server.bind_address, port)
            .map_err(|source| EngineError::Telemetry {
                worker: spec.name.clone(),
                source,
            })?;
        let tap = config
            .tap
            .clone()
            .with_server(config.tap.server_address.clone(), local_addr.port());

        let deployer: Arc<dyn Deployer> = match &spec.plan_output {
            Some(path) => Arc::new(JsonPlanWriter::new(path)),
            None => Arc::new(LoggingDeployer),
        };
        let ctx = WorkerContext::new(
            spec.name.clone(),
            server.hub(),
            Arc::new(JsonGraphSource::new(&spec.graph)),
            deployer,
        )
        .with_requests(requests)
        .with_tap_config(tap)
        .with_policy(config.trigger)
        .with_config(config.worker.clone());

        self.coordinator.spawn_worker(ctx)?;
        info!(worker = %spec.name, %local_addr, "worker telemetry bound");
        self.servers.push((spec.name.clone(), server));
        Ok(())
    }

    #[must_use]
    pub fn coordinator(&self) -> &TeamCoordinator {
        &self.coordinator
    }

    /// Telemetry endpoint of every worker, in config order.
    #[must_use]
    pub fn endpoints(&self) -> Vec<WorkerEndpoint> {
        self.servers
            .iter()
            .filter_map(|(worker, server)| {
                server.local_addr().map(|local_addr| WorkerEndpoint {
                    worker: worker.clone(),
                    local_addr,
                })
            })
            .collect()
    }

    /// Flag that ends [`Engine::run`] when set.
    #[must_use]
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.coordinator.stop_handle()
    }

    /// Drive the team until the stop handle is set or `limit` elapses.
    pub fn run(&self, limit: Option<Duration>) {
        match limit {
            Some(duration) => self.coordinator.run_for(duration),
            None => self.coordinator.run(),
        }
    }

    /// Stop the workers first, then their servers.
    pub fn shutdown(&mut self) {
        self.coordinator.stop_handle().store(true, Ordering::Release);
        self.coordinator.shutdown();
        for (worker, server) in &mut self.servers {
            if server.is_running() {
                info!(%worker, connections = server.hub().connection_count(), "closing telemetry");
            }
            server.shutdown();
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Instrument the graph at `graph` offline and build its deployment plan.
///
/// Returns the plan together with the instrumentation outcome so callers
/// can report failed requests.
///
/// # Errors
/// Unreadable inputs, or a plan that fails validation.
pub fn plan_offline(
    graph: &Path,
    requests: Option<&Path>,
    tap: TapConfig,
) -> Result<(DeploymentPlan, InstrumentationResult), EngineError> {
    let offline = |source| EngineError::Graph {
        worker: "offline".to_string(),
        source,
    };
    let mut model = JsonGraphSource::new(graph).load().map_err(offline)?;
    let requests: Vec<TapRequest> = match requests {
        Some(path) => load_requests(path).map_err(offline)?,
        None => Vec::new(),
    };

    let mut rewriter = RewritingEngine::new(tap);
    let result = rewriter.instrument_all(&mut model, &requests);
    for failure in &result.failures {
        warn!(
            node = %failure.request.node,
            signal = %failure.request.signal,
            code = %failure.error.code(),
            "tap request rejected"
        );
    }
    let plan = DeploymentPlan::checked(&model)?;
    Ok((plan, result))
}
