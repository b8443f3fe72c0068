//! Team coordinator
//!
//! Cooperative round-robin over the team: executing workers are left
//! alone, idle or failed workers get their next goal from
//! [`next_goal`]. The coordinator never interrupts a running goal.

use crate::context::WorkerContext;
use crate::error::AgentError;
use crate::goal::next_goal;
use crate::worker::{AgentWorker, WorkerId, WorkerState};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Coordinator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Pause between passes over the team
    pub poll_interval_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 20,
        }
    }
}

impl CoordinatorConfig {
    #[must_use]
    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    #[inline]
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Manager that keeps every worker busy with its next goal
#[derive(Debug)]
pub struct TeamCoordinator {
    config: CoordinatorConfig,
    workers: Vec<AgentWorker>,
    stop: Arc<AtomicBool>,
}

impl TeamCoordinator {
    #[must_use]
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            config,
            workers: Vec::new(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn add_worker(&mut self, worker: AgentWorker) -> WorkerId {
        let id = worker.id();
        info!(worker = %worker.name(), %id, "worker joined team");
        self.workers.push(worker);
        id
    }

    /// Spawn a worker for `ctx` and add it to the team.
    ///
    /// # Errors
    /// Thread spawn failure.
    pub fn spawn_worker(&mut self, ctx: WorkerContext) -> Result<WorkerId, AgentError> {
        let worker = AgentWorker::spawn(ctx)?;
        Ok(self.add_worker(worker))
    }

    #[must_use]
    pub fn workers(&self) -> &[AgentWorker] {
        &self.workers
    }

    #[must_use]
    pub fn worker(&self, name: &str) -> Option<&AgentWorker> {
        self.workers.iter().find(|w| w.name() == name)
    }

    /// Flag that ends [`TeamCoordinator::run`] when set.
    #[must_use]
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// One pass over the team. Returns the number of goals assigned.
    pub fn poll_once(&self) -> usize {
        let mut assigned = 0;
        for worker in &self.workers {
            let state = worker.state();
            if !state.accepts_goal() {
                continue;
            }
            let goal = next_goal(worker.last_outcome(), worker.has_harness());
            if state == WorkerState::Failed {
                debug!(worker = %worker.name(), "reassigning failed worker");
            }
            match worker.assign(goal) {
                Ok(()) => assigned += 1,
                Err(AgentError::Busy { .. }) => {}
                Err(e) => warn!(worker = %worker.name(), error = %e, "assignment failed"),
            }
        }
        assigned
    }

    /// Poll until `duration` elapses or the stop handle is set.
    pub fn run_for(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while Instant::now() < deadline && !self.stop.load(Ordering::Acquire) {
            self.poll_once();
            std::thread::sleep(self.config.poll_interval());
        }
    }

    /// Poll until `until` returns true, the stop handle is set or
    /// `timeout` elapses. Returns whether `until` was satisfied.
    pub fn run_until<F>(&self, timeout: Duration, mut until: F) -> bool
    where
        F: FnMut(&Self) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            if until(self) {
                return true;
            }
            if Instant::now() >= deadline || self.stop.load(Ordering::Acquire) {
                return false;
            }
            self.poll_once();
            std::thread::sleep(self.config.poll_interval());
        }
    }

    /// Poll until the stop handle is set.
    pub fn run(&self) {
        info!(workers = self.workers.len(), "team coordinator running");
        while !self.stop.load(Ordering::Acquire) {
            self.poll_once();
            std::thread::sleep(self.config.poll_interval());
        }
    }

    /// Stop every worker and join their threads.
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        for worker in &self.workers {
            worker.stop();
        }
        for worker in &mut self.workers {
            worker.join();
        }
        info!(workers = self.workers.len(), "team stopped");
    }
}

impl Drop for TeamCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
