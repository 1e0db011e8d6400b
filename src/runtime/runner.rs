use crate::pool::ThreadPool;
use crate::runtime::config::PoolConfig;
use crate::runtime::engine::ScriptRuntime;
use crate::worker::Registry;
use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Coordinates the thread pool lifecycle and handles OS signals for graceful shutdowns.
pub struct Runner<P = Value, R = Value> {
    pool: ThreadPool<P, R>,
    shutdown: CancellationToken,
    started: bool,
}

impl<P, R> Runner<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    /// Creates a runner whose root [`CancellationToken`] propagates through the pool, its
    /// pipe loops, script threads, and the completion dispatcher.
    pub fn new(
        config: PoolConfig,
        registry: Arc<Registry<P, R>>,
        runtime: impl ScriptRuntime<P, R>,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let pool = ThreadPool::with_cancellation_token(config, registry, runtime, shutdown.clone());
        Self {
            pool,
            shutdown,
            started: false,
        }
    }

    /// Root shutdown token, for callers wiring their own signal handling.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn pool(&self) -> &ThreadPool<P, R> {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut ThreadPool<P, R> {
        &mut self.pool
    }

    pub async fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }

        self.pool.start().await?;
        self.started = true;
        Ok(())
    }

    /// Cancels the root token and waits for the pool to wind down.
    pub async fn stop(&mut self) -> Result<()> {
        if !self.started {
            return Ok(());
        }

        self.shutdown.cancel();
        let result = self.pool.shutdown().await;
        self.started = false;
        self.reinitialize_shutdown_token();
        result
    }

    /// Runs until a Ctrl-C (SIGINT) is received or the shutdown token is cancelled elsewhere.
    pub async fn run_until_ctrl_c(&mut self) -> Result<()> {
        self.start().await?;
        tracing::info!("runner started; waiting for Ctrl-C (SIGINT) to initiate shutdown");

        tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("Ctrl-C received; shutting down runner");
            }
            _ = self.shutdown.cancelled() => {
                tracing::info!("runner shutdown token cancelled");
            }
        }

        self.stop().await
    }

    fn reinitialize_shutdown_token(&mut self) {
        self.shutdown = CancellationToken::new();
        self.pool.replace_shutdown_root(self.shutdown.clone());
    }
}
