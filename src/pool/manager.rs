//! Thread pool orchestration.
//!
//! `ThreadPool` owns the pool's thread slots and wires the pieces living in sibling
//! modules:
//! - `reservation` checks the registered minimums against the thread budget.
//! - `lifecycle` validates every activate/drain/deactivate transition.
//! - `script_thread` runs the engine side of each active thread.
//! - `scope` holds the run token, fatal error capture, and the metrics reporter.
//!
//! Each active thread is a pair of tasks: a pipe loop feeding the worker's dispatch channel
//! and a script thread consuming it. Each task has its own token derived from the run token.
//! Retiring a thread stops the pipe loop first and the script thread second, so a request
//! taken from the worker is always handed to the engine; only cancelling the run abandons
//! work in flight.

use super::lifecycle::{ThreadSlot, ThreadState};
use super::reservation::plan_reservations;
use super::scope::{RunScope, RunScopeParams};
use super::script_thread::ScriptThread;
use crate::pipe::completion::{spawn_completion_dispatcher, CompletionSender};
use crate::pipe::pipe_loop::{PipeLoop, PipeLoopParams};
use crate::pipe::dispatch::backlog;
use crate::pipe::{dispatch_channel, DispatchReceiver, DispatchSender};
use crate::runtime::config::PoolConfig;
use crate::runtime::engine::ScriptRuntime;
use crate::runtime::fatal::{panic_message, FatalErrorHandler};
use crate::runtime::telemetry::Telemetry;
use crate::worker::{Registry, SharedWorker};
use anyhow::{anyhow, Context, Result};
use futures::FutureExt;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    AlreadyRunning,
    NotRunning,
    UnknownWorker { identity: String },
    NoSpareThreads { identity: String },
    UnknownThread { thread: usize },
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::AlreadyRunning => write!(f, "thread pool already running"),
            PoolError::NotRunning => write!(f, "thread pool is not running"),
            PoolError::UnknownWorker { identity } => {
                write!(f, "worker {identity} was not registered when the pool started")
            }
            PoolError::NoSpareThreads { identity } => {
                write!(f, "no spare thread left to activate for worker {identity}")
            }
            PoolError::UnknownThread { thread } => write!(f, "thread {thread} does not exist"),
        }
    }
}

impl std::error::Error for PoolError {}

/// Per-worker dispatch channel, alive for one pool run.
struct Lane<P, R> {
    handle: SharedWorker<P, R>,
    dispatch_tx: DispatchSender<P, R>,
    dispatch_rx: DispatchReceiver<P, R>,
}

const BACKLOG_POLL: Duration = Duration::from_millis(5);

struct ThreadTasks {
    worker: Arc<str>,
    /// Stops the pipe loop from taking new work.
    drain: CancellationToken,
    /// Stops the script thread once its pipe loop is gone.
    stop: CancellationToken,
    pipe: JoinHandle<()>,
    script: JoinHandle<()>,
}

pub struct ThreadPool<P = Value, R = Value> {
    config: PoolConfig,
    registry: Arc<Registry<P, R>>,
    runtime: Arc<dyn ScriptRuntime<P, R>>,
    telemetry: Arc<Telemetry>,
    shutdown_root: CancellationToken,
    slots: Vec<ThreadSlot>,
    threads: Vec<Option<ThreadTasks>>,
    lanes: BTreeMap<String, Lane<P, R>>,
    completions: Option<CompletionSender<R>>,
    dispatcher: Option<JoinHandle<()>>,
    scope: Option<RunScope>,
    running: bool,
}

impl<P, R> ThreadPool<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    /// Creates a pool with its own root cancellation token.
    ///
    /// Use [`Self::with_cancellation_token`] to tie the pool into an existing shutdown path.
    pub fn new(
        config: PoolConfig,
        registry: Arc<Registry<P, R>>,
        runtime: impl ScriptRuntime<P, R>,
    ) -> Self {
        Self::with_cancellation_token(config, registry, runtime, CancellationToken::new())
    }

    /// The root token outlives individual runs; every run derives a child token from it.
    pub fn with_cancellation_token(
        config: PoolConfig,
        registry: Arc<Registry<P, R>>,
        runtime: impl ScriptRuntime<P, R>,
        shutdown_token: CancellationToken,
    ) -> Self {
        let thread_count = config.thread_count();
        Self {
            slots: (0..thread_count).map(ThreadSlot::new).collect(),
            threads: (0..thread_count).map(|_| None).collect(),
            config,
            registry,
            runtime: Arc::new(runtime),
            telemetry: Arc::new(Telemetry::default()),
            shutdown_root: shutdown_token,
            lanes: BTreeMap::new(),
            completions: None,
            dispatcher: None,
            scope: None,
            running: false,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown_root.clone()
    }

    /// Replaces the root token. Only valid between runs.
    pub fn replace_shutdown_root(&mut self, shutdown: CancellationToken) {
        debug_assert!(
            !self.running,
            "shutdown token should not change while the pool is running"
        );
        self.shutdown_root = shutdown;
    }

    pub fn thread_state(&self, thread: usize) -> Option<ThreadState> {
        self.slots.get(thread).map(ThreadSlot::state)
    }

    /// Indices of the threads currently serving `identity`, in ascending order.
    pub fn threads_for(&self, identity: &str) -> Vec<usize> {
        self.threads
            .iter()
            .enumerate()
            .filter_map(|(index, tasks)| match tasks {
                Some(tasks) if &*tasks.worker == identity => Some(index),
                _ => None,
            })
            .collect()
    }

    pub fn active_threads(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.state() != ThreadState::Inactive)
            .count()
    }

    pub fn spare_threads(&self) -> usize {
        self.slots.len() - self.active_threads()
    }

    /// Snapshots the registry, reserves every worker's minimum threads, and starts them.
    ///
    /// Fails with a [`crate::ReservationError`] when the reservations exceed
    /// `thread_count`; nothing is started in that case.
    pub async fn start(&mut self) -> Result<()> {
        if self.running {
            return Err(PoolError::AlreadyRunning.into());
        }

        debug_assert!(
            self.config.validate().is_ok(),
            "PoolConfig should have been validated at construction time"
        );

        let table = self.registry.snapshot();
        let plan = match plan_reservations(&table, self.config.thread_count()) {
            Ok(plan) => plan,
            Err(err) => {
                tracing::error!(
                    requested = err.requested,
                    available = err.available,
                    "not enough threads to satisfy worker reservations"
                );
                return Err(err.into());
            }
        };

        tracing::info!(
            workers = table.len(),
            threads = self.config.thread_count(),
            reserved = plan.reserved(),
            spare = plan.spare,
            "starting thread pool"
        );

        let scope = RunScope::spawn(RunScopeParams {
            shutdown_root: &self.shutdown_root,
            telemetry: self.telemetry.clone(),
            metrics_interval: self.config.metrics_interval(),
        });
        let (completions, dispatcher) =
            spawn_completion_dispatcher(self.telemetry.clone(), scope.run_token.clone());

        self.lanes = table
            .iter()
            .map(|(identity, handle)| {
                let (dispatch_tx, dispatch_rx) = dispatch_channel(self.config.dispatch_capacity());
                let lane = Lane {
                    handle: handle.clone(),
                    dispatch_tx,
                    dispatch_rx,
                };
                (identity.to_owned(), lane)
            })
            .collect();
        self.completions = Some(completions);
        self.dispatcher = Some(dispatcher);
        self.scope = Some(scope);
        self.running = true;

        for (identity, min_threads) in &plan.assignments {
            for _ in 0..*min_threads {
                if let Err(err) = self.activate_thread(identity) {
                    tracing::error!(
                        worker = %identity,
                        error = %err,
                        "failed to activate reserved thread; shutting down partial pool"
                    );
                    if let Err(shutdown_err) = self.shutdown().await {
                        tracing::warn!(
                            error = %shutdown_err,
                            "partial pool shutdown reported an error"
                        );
                    }
                    return Err(err);
                }
            }
        }

        Ok(())
    }

    /// Assigns an inactive thread to `identity` and starts its pipe loop and script thread.
    pub fn activate_thread(&mut self, identity: &str) -> Result<usize> {
        if !self.running {
            return Err(PoolError::NotRunning.into());
        }
        let lane = self
            .lanes
            .get(identity)
            .ok_or_else(|| PoolError::UnknownWorker {
                identity: identity.to_owned(),
            })?;
        let (completions, scope) = match (&self.completions, &self.scope) {
            (Some(completions), Some(scope)) => (completions.clone(), scope),
            _ => return Err(PoolError::NotRunning.into()),
        };
        let index = self
            .slots
            .iter()
            .position(|slot| slot.state() == ThreadState::Inactive)
            .ok_or_else(|| PoolError::NoSpareThreads {
                identity: identity.to_owned(),
            })?;

        self.slots[index]
            .activate()
            .with_context(|| format!("failed to activate thread {index}"))?;
        lane.handle.notify_thread_activated(index);

        let worker: Arc<str> = Arc::from(identity);
        let drain = scope.run_token.child_token();
        let stop = scope.run_token.child_token();
        let fatal = scope.fatal_handler();

        let pipe = PipeLoop::new(PipeLoopParams {
            thread: index,
            handle: lane.handle.clone(),
            dispatch: lane.dispatch_tx.clone(),
            completions,
            telemetry: self.telemetry.clone(),
            drain: drain.clone(),
            shutdown: scope.run_token.clone(),
        });
        let script = ScriptThread {
            thread: index,
            worker: worker.clone(),
            dispatch: lane.dispatch_rx.clone(),
            runtime: self.runtime.clone(),
            telemetry: self.telemetry.clone(),
            shutdown: stop.clone(),
        };

        let pipe = supervise(fatal.clone(), format!("pipe loop {index} ({identity})"), async move {
            pipe.run().await;
        });
        let script = supervise(fatal, format!("script thread {index} ({identity})"), script.run());

        self.threads[index] = Some(ThreadTasks {
            worker,
            drain,
            stop,
            pipe,
            script,
        });
        self.telemetry.record_active_threads(self.active_threads());
        tracing::info!(worker = %identity, thread = index, "thread activated");
        Ok(index)
    }

    /// Drains `thread`, waits for its tasks, and returns the slot to the pool.
    ///
    /// The pipe loop stops taking work but still hands off a request it already took.
    /// When this is the worker's last thread, the script thread also works through the
    /// dispatch backlog before stopping. Each wait is bounded by `shutdown_timeout`, after
    /// which the task is aborted.
    pub async fn retire_thread(&mut self, thread: usize) -> Result<()> {
        let slot = self
            .slots
            .get(thread)
            .ok_or(PoolError::UnknownThread { thread })?;
        slot.drain()
            .with_context(|| format!("failed to drain thread {thread}"))?;

        let Some(tasks) = self.threads[thread].take() else {
            // Unreachable while slot transitions and task bookkeeping stay in step.
            slot.deactivate()
                .with_context(|| format!("failed to deactivate thread {thread}"))?;
            return Ok(());
        };
        let ThreadTasks {
            worker,
            drain,
            stop,
            pipe,
            script,
        } = tasks;
        let lane = self.lanes.get(&*worker);
        let handle = lane.map(|lane| lane.handle.clone());
        let dispatch = lane.map(|lane| lane.dispatch_tx.clone());

        tracing::info!(worker = %worker, thread, "draining thread");
        if let Some(handle) = &handle {
            handle.notify_thread_draining(thread);
        }
        drain.cancel();

        let timeout = self.config.shutdown_timeout();
        join_bounded(pipe, timeout, &worker, thread, "pipe loop").await;

        let last_thread = self.threads_for(&worker).is_empty();
        let run_cancelled = self
            .scope
            .as_ref()
            .map_or(true, |scope| scope.run_token.is_cancelled());
        match &dispatch {
            Some(dispatch) if last_thread && !run_cancelled => {
                if !drain_backlog(dispatch, timeout).await {
                    tracing::warn!(
                        worker = %worker,
                        thread,
                        backlog = backlog(dispatch),
                        "dispatch backlog did not drain in time"
                    );
                }
            }
            _ => {}
        }
        stop.cancel();
        join_bounded(script, timeout, &worker, thread, "script thread").await;

        slot.deactivate()
            .with_context(|| format!("failed to deactivate thread {thread}"))?;
        if let Some(handle) = &handle {
            handle.notify_thread_deactivated(thread);
        }
        self.telemetry.record_active_threads(self.active_threads());
        tracing::info!(worker = %worker, thread, "thread deactivated");
        Ok(())
    }

    /// Retires every thread and stops the run.
    ///
    /// Returns the fatal error captured during the run, if any.
    pub async fn shutdown(&mut self) -> Result<()> {
        if !self.running {
            return Ok(());
        }

        tracing::info!("stopping thread pool");

        let active: Vec<usize> = self
            .threads
            .iter()
            .enumerate()
            .filter_map(|(index, tasks)| tasks.as_ref().map(|_| index))
            .collect();
        for thread in active {
            if let Err(err) = self.retire_thread(thread).await {
                tracing::warn!(thread, error = %err, "failed to retire thread during shutdown");
            }
        }
        tracing::debug!("thread pool stop: threads retired");

        self.lanes.clear();
        self.completions = None;
        if let Some(mut dispatcher) = self.dispatcher.take() {
            let limit = self.config.shutdown_timeout();
            match tokio::time::timeout(limit, &mut dispatcher).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::warn!(error = %err, "completion dispatcher task panicked");
                }
                Err(_) => {
                    tracing::warn!("completion dispatcher did not drain in time; aborting");
                    dispatcher.abort();
                }
            }
        }
        tracing::debug!("thread pool stop: completion dispatcher joined");

        let fatal_error = match self.scope.take() {
            Some(scope) => {
                let error = scope.error();
                scope.shutdown().await;
                error
            }
            None => None,
        };
        self.running = false;

        if let Some(err) = fatal_error {
            return Err(err).context("worker pool aborted");
        }

        Ok(())
    }
}

impl<P, R> Drop for ThreadPool<P, R> {
    fn drop(&mut self) {
        if let Some(scope) = &self.scope {
            scope.run_token.cancel();
        }
    }
}

/// Spawns `task`, routing a panic to the fatal error handler.
fn supervise<F>(fatal: FatalErrorHandler, label: String, task: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(panic_payload) = AssertUnwindSafe(task).catch_unwind().await {
            let panic_msg = panic_message(panic_payload.as_ref());
            tracing::error!(task = %label, panic = %panic_msg, "pool task panicked");
            fatal.trigger(&label, anyhow!("{label} panicked: {panic_msg}"));
        }
    })
}

/// Waits until every dispatched context has been taken by a script thread.
async fn drain_backlog<P, R>(dispatch: &DispatchSender<P, R>, limit: Duration) -> bool {
    tokio::time::timeout(limit, async {
        while backlog(dispatch) > 0 {
            tokio::time::sleep(BACKLOG_POLL).await;
        }
    })
    .await
    .is_ok()
}

async fn join_bounded(
    mut handle: JoinHandle<()>,
    limit: Duration,
    worker: &str,
    thread: usize,
    task: &'static str,
) {
    match tokio::time::timeout(limit, &mut handle).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            tracing::warn!(worker, thread, task, error = %err, "pool task terminated unexpectedly");
        }
        Err(_) => {
            tracing::warn!(
                worker,
                thread,
                task,
                timeout_ms = limit.as_millis() as u64,
                "pool task did not stop in time; aborting"
            );
            handle.abort();
            let _ = handle.await;
        }
    }
}
