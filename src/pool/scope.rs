//! Run-scoped handles shared by every task of one pool run.

use crate::runtime::fatal::FatalErrorHandler;
use crate::runtime::telemetry::{self, Telemetry};
use anyhow::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub(crate) struct RunScope {
    pub run_token: CancellationToken,
    fatal_handler: FatalErrorHandler,
    metrics_handle: Option<JoinHandle<()>>,
}

pub(crate) struct RunScopeParams<'a> {
    pub shutdown_root: &'a CancellationToken,
    pub telemetry: Arc<Telemetry>,
    pub metrics_interval: Duration,
}

impl RunScope {
    pub(crate) fn spawn(params: RunScopeParams<'_>) -> Self {
        let RunScopeParams {
            shutdown_root,
            telemetry,
            metrics_interval,
        } = params;

        let run_token = shutdown_root.child_token();
        let fatal_handler = FatalErrorHandler::new(shutdown_root.clone(), run_token.clone());
        let metrics_handle =
            telemetry::spawn_metrics_reporter(telemetry, run_token.clone(), metrics_interval);

        Self {
            run_token,
            fatal_handler,
            metrics_handle: Some(metrics_handle),
        }
    }

    pub(crate) fn fatal_handler(&self) -> FatalErrorHandler {
        self.fatal_handler.clone()
    }

    pub(crate) fn error(&self) -> Option<Error> {
        self.fatal_handler.error()
    }

    /// Cancels the run and waits for the metrics reporter.
    pub(crate) async fn shutdown(mut self) {
        self.run_token.cancel();
        if let Some(handle) = self.metrics_handle.take() {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "metrics reporter task panicked");
            }
        }
    }
}
