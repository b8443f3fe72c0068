//! Agent worker
//!
//! Each worker owns one OS thread and one [`WorkerContext`]. It sleeps
//! while idle, runs an assigned goal to completion and records the
//! outcome. Goals are never interrupted; `stop` only takes effect between
//! goals or inside bounded waits that check the stop flag.

use crate::context::WorkerContext;
use crate::error::AgentError;
use crate::goal::{run_goal, GoalKind, GoalOutcome, GoalResult};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info};
use ulid::Ulid;

/// Completed goals kept per worker, oldest dropped first
pub const HISTORY_LIMIT: usize = 64;

/// Unique worker identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub Ulid);

impl WorkerId {
    /// Generate new worker ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerState {
    /// Thread not yet running
    Undefined,
    Idle,
    Executing,
    /// Last goal ended abnormally; the worker can take another goal
    Failed,
}

impl WorkerState {
    /// Whether a goal can be assigned.
    #[inline]
    #[must_use]
    pub fn accepts_goal(self) -> bool {
        matches!(self, Self::Idle | Self::Failed)
    }
}

#[derive(Debug)]
struct Slot {
    state: WorkerState,
    assigned: Option<GoalKind>,
    history: VecDeque<GoalOutcome>,
    completed: u64,
    harnessed: bool,
    stopped: bool,
}

#[derive(Debug)]
struct Shared {
    slot: Mutex<Slot>,
    changed: Condvar,
}

/// Handle to a running worker thread
#[derive(Debug)]
pub struct AgentWorker {
    id: WorkerId,
    name: String,
    shared: Arc<Shared>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl AgentWorker {
    /// Start the worker thread. The worker reports `Idle` once it is ready.
    ///
    /// # Errors
    /// `AgentError::Spawn` if the thread cannot be created.
    pub fn spawn(ctx: WorkerContext) -> Result<Self, AgentError> {
        let name = ctx.name().to_string();
        let stop = ctx.stop_flag();
        let idle_poll = ctx.config().idle_poll();
        let shared = Arc::new(Shared {
            slot: Mutex::new(Slot {
                state: WorkerState::Undefined,
                assigned: None,
                history: VecDeque::with_capacity(HISTORY_LIMIT),
                completed: 0,
                harnessed: false,
                stopped: false,
            }),
            changed: Condvar::new(),
        });

        let thread = std::thread::Builder::new()
            .name(format!("agent-{name}"))
            .spawn({
                let shared = Arc::clone(&shared);
                let stop = Arc::clone(&stop);
                move || worker_loop(ctx, &shared, &stop, idle_poll)
            })
            .map_err(|source| AgentError::Spawn {
                worker: name.clone(),
                source,
            })?;

        Ok(Self {
            id: WorkerId::new(),
            name,
            shared,
            stop,
            thread: Some(thread),
        })
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> WorkerId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn state(&self) -> WorkerState {
        self.shared.slot.lock().state
    }

    /// Outcome of the most recent goal, if any.
    #[must_use]
    pub fn last_outcome(&self) -> Option<GoalOutcome> {
        self.shared.slot.lock().history.back().copied()
    }

    /// The last [`HISTORY_LIMIT`] completed goals, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<GoalOutcome> {
        self.shared.slot.lock().history.iter().copied().collect()
    }

    /// Goals completed since the worker started.
    #[must_use]
    pub fn goals_completed(&self) -> u64 {
        self.shared.slot.lock().completed
    }

    /// Whether the last goal left a deployed harness in place.
    #[must_use]
    pub fn has_harness(&self) -> bool {
        self.shared.slot.lock().harnessed
    }

    /// Hand `goal` to an idle worker.
    ///
    /// # Errors
    /// `Busy` if the worker is not idle, `Stopped` after [`AgentWorker::stop`].
    pub fn assign(&self, goal: GoalKind) -> Result<(), AgentError> {
        let mut slot = self.shared.slot.lock();
        if slot.stopped {
            return Err(AgentError::Stopped(self.name.clone()));
        }
        if !slot.state.accepts_goal() {
            return Err(AgentError::Busy {
                worker: self.name.clone(),
                state: slot.state,
            });
        }
        slot.assigned = Some(goal);
        slot.state = WorkerState::Executing;
        drop(slot);
        self.shared.changed.notify_all();
        info!(worker = %self.name, %goal, "goal assigned");
        Ok(())
    }

    /// Block until the worker is no longer executing or `timeout` elapses.
    /// Returns the state observed last.
    pub fn wait_idle(&self, timeout: Duration) -> WorkerState {
        let mut slot = self.shared.slot.lock();
        if slot.state == WorkerState::Executing {
            let _ = self
                .shared
                .changed
                .wait_while_for(&mut slot, |s| s.state == WorkerState::Executing, timeout);
        }
        slot.state
    }

    /// Ask the worker to exit after its current goal.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
        self.shared.slot.lock().stopped = true;
        self.shared.changed.notify_all();
    }

    /// Stop and wait for the thread to exit.
    pub fn join(&mut self) {
        self.stop();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!(worker = %self.name, "worker thread panicked");
            }
        }
    }
}

impl Drop for AgentWorker {
    fn drop(&mut self) {
        self.join();
    }
}

fn worker_loop(mut ctx: WorkerContext, shared: &Shared, stop: &AtomicBool, idle_poll: Duration) {
    {
        let mut slot = shared.slot.lock();
        slot.state = WorkerState::Idle;
    }
    shared.changed.notify_all();
    info!(worker = %ctx.name(), "worker ready");

    loop {
        let goal = {
            let mut slot = shared.slot.lock();
            while slot.assigned.is_none() && !slot.stopped {
                let _ = shared.changed.wait_for(&mut slot, idle_poll);
            }
            if slot.stopped && slot.assigned.is_none() {
                break;
            }
            slot.assigned.take()
        };
        let Some(goal) = goal else { break };

        let outcome = catch_unwind(AssertUnwindSafe(|| run_goal(goal, &mut ctx)));
        let (state, result) = match outcome {
            Ok(result) => (WorkerState::Idle, result),
            Err(_) => {
                error!(worker = %ctx.name(), %goal, "goal body panicked");
                (WorkerState::Failed, GoalResult::Failed)
            }
        };
        info!(worker = %ctx.name(), %goal, %result, "goal finished");

        {
            let mut slot = shared.slot.lock();
            slot.state = state;
            slot.harnessed = ctx.graph().is_some();
            if slot.history.len() == HISTORY_LIMIT {
                slot.history.pop_front();
            }
            slot.history.push_back(GoalOutcome::new(goal, result));
            slot.completed += 1;
        }
        shared.changed.notify_all();

        if stop.load(Ordering::Acquire) {
            break;
        }
    }
    info!(worker = %ctx.name(), "worker exiting");
}
