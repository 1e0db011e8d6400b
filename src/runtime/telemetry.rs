use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(5);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Rolling counters describing what the pool has done so far.
#[derive(Default, Debug)]
pub struct Telemetry {
    piped_requests: AtomicU64,
    empty_invocations: AtomicU64,
    dropped_requests: AtomicU64,
    completions_delivered: AtomicU64,
    runtime_errors: AtomicU64,
    active_threads: AtomicUsize,
    thread_transitions: AtomicU64,
}

impl Telemetry {
    pub fn record_piped_request(&self) {
        self.piped_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_empty_invocation(&self) {
        self.empty_invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_request(&self) {
        self.dropped_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completion_delivered(&self) {
        self.completions_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_runtime_error(&self) {
        self.runtime_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_active_threads(&self, threads: usize) {
        self.active_threads.store(threads, Ordering::Relaxed);
        self.thread_transitions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            piped_requests: self.piped_requests.load(Ordering::Relaxed),
            empty_invocations: self.empty_invocations.load(Ordering::Relaxed),
            dropped_requests: self.dropped_requests.load(Ordering::Relaxed),
            completions_delivered: self.completions_delivered.load(Ordering::Relaxed),
            runtime_errors: self.runtime_errors.load(Ordering::Relaxed),
        }
    }

    pub fn piped_requests(&self) -> u64 {
        self.piped_requests.load(Ordering::Relaxed)
    }

    pub fn dropped_requests(&self) -> u64 {
        self.dropped_requests.load(Ordering::Relaxed)
    }

    pub fn completions_delivered(&self) -> u64 {
        self.completions_delivered.load(Ordering::Relaxed)
    }

    pub fn active_threads(&self) -> usize {
        self.active_threads.load(Ordering::Relaxed)
    }

    pub fn thread_transitions(&self) -> u64 {
        self.thread_transitions.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub piped_requests: u64,
    pub empty_invocations: u64,
    pub dropped_requests: u64,
    pub completions_delivered: u64,
    pub runtime_errors: u64,
}

/// Spawns a background task that periodically logs throughput, active threads, and drops.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_snapshot = telemetry.snapshot();
        let mut last_tick = Instant::now();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "workpipe::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current_snapshot = telemetry.snapshot();
                    let piped_delta = current_snapshot
                        .piped_requests
                        .saturating_sub(last_snapshot.piped_requests);
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let throughput = if elapsed <= f64::EPSILON {
                        0.0
                    } else {
                        piped_delta as f64 / elapsed
                    };

                    tracing::info!(
                        target: "workpipe::metrics",
                        throughput = format!("{throughput:.2}"),
                        piped = current_snapshot.piped_requests,
                        empty = current_snapshot.empty_invocations,
                        dropped = current_snapshot.dropped_requests,
                        completed = current_snapshot.completions_delivered,
                        runtime_errors = current_snapshot.runtime_errors,
                        active_threads = telemetry.active_threads(),
                        "pool metrics snapshot"
                    );

                    last_snapshot = current_snapshot;
                    last_tick = Instant::now();
                }
            }
        }
    })
}
