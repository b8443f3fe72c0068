//! Everything a worker's goal bodies operate on

use crate::belief::Beliefs;
use crate::script::{DiagnosticScript, PassiveMonitor};
use fde_diagnostics::{DiagnosticPointRegistry, TriggerPolicy};
use fde_graph::{Deployer, GraphModel, GraphSource, TapConfig, TapRequest};
use fde_telemetry::TelemetryHub;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-worker settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Whether configure waits for the deployed application to connect
    pub await_connection: bool,
    pub connect_timeout_ms: u64,
    pub connect_poll_ms: u64,
    /// Wakeup interval while idle
    pub idle_poll_ms: u64,
    /// Delay before the first configure retry, doubled on each further failure
    pub configure_backoff_ms: u64,
    pub max_configure_backoff_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            await_connection: true,
            connect_timeout_ms: 30_000,
            connect_poll_ms: 100,
            idle_poll_ms: 50,
            configure_backoff_ms: 1_000,
            max_configure_backoff_ms: 30_000,
        }
    }
}

impl WorkerConfig {
    #[must_use]
    pub fn with_await_connection(mut self, wait: bool) -> Self {
        self.await_connection = wait;
        self
    }

    #[must_use]
    pub fn with_connect_timeout_ms(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = ms;
        self
    }

    #[must_use]
    pub fn with_configure_backoff_ms(mut self, initial: u64, max: u64) -> Self {
        self.configure_backoff_ms = initial;
        self.max_configure_backoff_ms = max;
        self
    }

    #[inline]
    #[must_use]
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms.max(1))
    }

    /// Wait before configure attempt number `failures + 1`.
    #[must_use]
    pub fn configure_backoff(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let shift = (failures - 1).min(16);
        let ms = self
            .configure_backoff_ms
            .saturating_mul(1 << shift)
            .min(self.max_configure_backoff_ms);
        Duration::from_millis(ms)
    }
}

/// Worker-owned state plus the shared transport
pub struct WorkerContext {
    pub(crate) name: String,
    pub(crate) hub: Arc<TelemetryHub>,
    pub(crate) source: Arc<dyn GraphSource>,
    pub(crate) deployer: Arc<dyn Deployer>,
    pub(crate) script: Box<dyn DiagnosticScript>,
    pub(crate) tap_config: TapConfig,
    pub(crate) requests: Vec<TapRequest>,
    pub(crate) policy: TriggerPolicy,
    pub(crate) config: WorkerConfig,
    pub(crate) graph: Option<GraphModel>,
    pub(crate) registry: DiagnosticPointRegistry,
    pub(crate) beliefs: Beliefs,
    /// Consecutive failed configure attempts
    pub(crate) configure_failures: u32,
    stop: Arc<AtomicBool>,
}

impl WorkerContext {
    /// Context with a passive monitor, no tap requests and default settings
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        hub: Arc<TelemetryHub>,
        source: Arc<dyn GraphSource>,
        deployer: Arc<dyn Deployer>,
    ) -> Self {
        Self {
            name: name.into(),
            hub,
            source,
            deployer,
            script: Box::new(PassiveMonitor::new()),
            tap_config: TapConfig::default(),
            requests: Vec::new(),
            policy: TriggerPolicy::default(),
            config: WorkerConfig::default(),
            graph: None,
            registry: DiagnosticPointRegistry::new(),
            beliefs: Beliefs::new(),
            configure_failures: 0,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn with_script(mut self, script: Box<dyn DiagnosticScript>) -> Self {
        self.script = script;
        self
    }

    #[must_use]
    pub fn with_requests(mut self, requests: Vec<TapRequest>) -> Self {
        self.requests = requests;
        self
    }

    #[must_use]
    pub fn with_tap_config(mut self, config: TapConfig) -> Self {
        self.tap_config = config;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: TriggerPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn beliefs(&self) -> &Beliefs {
        &self.beliefs
    }

    #[inline]
    #[must_use]
    pub fn registry(&self) -> &DiagnosticPointRegistry {
        &self.registry
    }

    /// Instrumented graph, once configured.
    #[inline]
    #[must_use]
    pub fn graph(&self) -> Option<&GraphModel> {
        self.graph.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn is_stopping(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Sleep for `duration` in short steps. Returns `false` if asked to
    /// stop in the meantime.
    pub(crate) fn pause(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let step = Duration::from_millis(self.config.connect_poll_ms.max(1));
        loop {
            if self.is_stopping() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(step.min(deadline - now));
        }
    }

    pub(crate) fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }
}

impl std::fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerContext")
            .field("name", &self.name)
            .field("script", &self.script.name())
            .field("requests", &self.requests.len())
            .field("points", &self.registry.count())
            .field("beliefs", &self.beliefs.count())
            .finish_non_exhaustive()
    }
}
