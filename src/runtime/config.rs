use crate::runtime::telemetry;
use anyhow::{bail, Context, Result};
use std::time::Duration;

const DEFAULT_DISPATCH_CAPACITY: usize = 1;
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

/// Runtime configuration for the thread pool.
///
/// All instances must be constructed via [`PoolConfig::builder`] or [`PoolConfig::new`]
/// so invariants are validated before any consumer observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    thread_count: usize,
    dispatch_capacity: usize,
    metrics_interval: Duration,
    shutdown_timeout: Duration,
}

pub struct PoolConfigParams {
    pub thread_count: usize,
    pub dispatch_capacity: usize,
    pub metrics_interval: Duration,
    pub shutdown_timeout: Duration,
}

impl PoolConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    pub fn new(params: PoolConfigParams) -> Result<Self> {
        let PoolConfigParams {
            thread_count,
            dispatch_capacity,
            metrics_interval,
            shutdown_timeout,
        } = params;

        let config = Self {
            thread_count,
            dispatch_capacity,
            metrics_interval,
            shutdown_timeout,
        };

        config.validate()?;
        Ok(config)
    }

    /// Total thread budget shared by every registered worker.
    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Capacity of each worker's dispatch channel between pipe loops and script threads.
    pub fn dispatch_capacity(&self) -> usize {
        self.dispatch_capacity
    }

    /// Interval used by the telemetry reporter.
    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    /// Upper bound on waiting for a retiring thread's tasks to exit.
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        if self.thread_count == 0 {
            bail!("thread_count must be greater than 0");
        }

        if self.dispatch_capacity == 0 {
            bail!("dispatch_capacity must be greater than 0");
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        if self.shutdown_timeout.is_zero() {
            bail!("shutdown_timeout must be greater than 0");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct PoolConfigBuilder {
    thread_count: Option<usize>,
    dispatch_capacity: Option<usize>,
    metrics_interval: Option<Duration>,
    shutdown_timeout: Option<Duration>,
}

impl PoolConfigBuilder {
    pub fn thread_count(mut self, count: usize) -> Self {
        self.thread_count = Some(count);
        self
    }

    pub fn dispatch_capacity(mut self, capacity: usize) -> Self {
        self.dispatch_capacity = Some(capacity);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<PoolConfig> {
        let params = PoolConfigParams {
            thread_count: self.thread_count.context("thread_count is required")?,
            dispatch_capacity: self.dispatch_capacity.unwrap_or(DEFAULT_DISPATCH_CAPACITY),
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
            shutdown_timeout: self
                .shutdown_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS)),
        };

        PoolConfig::new(params)
    }
}
