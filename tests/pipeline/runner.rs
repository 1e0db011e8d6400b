use std::time::Duration;

use crate::support::helpers::{
    init_tracing, pool_config, registry_with, worker, EchoRuntime, PanickingRuntime,
};
use anyhow::{Context, Result};
use tokio::time::timeout;
use workpipe::{Runner, WorkRequest};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn runner_exits_on_runtime_panic() -> Result<()> {
    init_tracing();
    let echo = worker("echo", 1);
    let mut runner = Runner::new(
        pool_config(2)?,
        registry_with(&[echo.clone()])?,
        PanickingRuntime,
    );
    echo.inject_work(WorkRequest::empty()).await;

    let outcome = timeout(Duration::from_secs(5), runner.run_until_ctrl_c())
        .await
        .context("runner should stop after a script thread panic")?;

    let err = outcome.expect_err("the panic should abort the runner");
    let message = format!("{err:#}");
    assert!(
        message.contains("worker pool aborted"),
        "runner did not propagate the panic, got {message}"
    );
    assert!(message.contains("script engine crashed"), "got {message}");
    assert_eq!(echo.active_threads(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn runner_stops_when_token_is_cancelled() -> Result<()> {
    init_tracing();
    let echo = worker("echo", 1);
    let mut runner = Runner::new(
        pool_config(1)?,
        registry_with(&[echo.clone()])?,
        EchoRuntime::default(),
    );
    let token = runner.cancellation_token();

    let cancel = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
    });

    timeout(Duration::from_secs(5), runner.run_until_ctrl_c())
        .await
        .context("runner should stop after cancellation")??;
    cancel.await?;

    assert!(!runner.pool().is_running());
    assert!(!runner.cancellation_token().is_cancelled());
    assert_eq!(echo.active_threads(), 0);
    assert_eq!(echo.draining_threads(), 0);
    Ok(())
}
