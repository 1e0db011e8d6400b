use std::sync::Arc;
use std::time::Duration;

use crate::support::helpers::{
    get, init_tracing, next_result, pool_config, registry_with, tracked, worker, EchoRuntime,
    FailingRuntime,
};
use anyhow::Result;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use serde_json::json;
use tokio::sync::mpsc;
use workpipe::{ResponseRecorder, ThreadPool, WorkRequest};

const CALLBACK_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn get_request_fills_sink_and_fires_callback() -> Result<()> {
    init_tracing();
    let echo = worker("echo", 1);
    let mut pool = ThreadPool::new(
        pool_config(2)?,
        registry_with(&[echo.clone()])?,
        EchoRuntime::default(),
    );
    pool.start().await?;

    let (results_tx, mut results) = mpsc::unbounded_channel();
    let recorder = Arc::new(ResponseRecorder::new());
    let request = WorkRequest::new(get("/hello?name=pool"))
        .with_output(recorder.clone())
        .with_parameters(json!({ "request_id": 17 }));
    echo.inject_work(tracked(request, &results_tx)).await;

    let value = next_result(&mut results, CALLBACK_TIMEOUT).await?;
    assert_eq!(
        value,
        Some(json!({ "echo": "GET /hello", "params": { "request_id": 17 }, "thread": 0 }))
    );
    assert_eq!(recorder.body(), "GET /hello");
    assert_eq!(
        recorder.headers().get(CONTENT_TYPE),
        Some(&HeaderValue::from_static("text/plain"))
    );
    assert_eq!(pool.telemetry().piped_requests(), 1);

    pool.shutdown().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn empty_payload_is_followed_by_a_normal_request() -> Result<()> {
    init_tracing();
    let echo = worker("echo", 1);
    let mut pool = ThreadPool::new(
        pool_config(1)?,
        registry_with(&[echo.clone()])?,
        EchoRuntime::default(),
    );
    pool.start().await?;

    let (results_tx, mut results) = mpsc::unbounded_channel();
    echo.inject_work(tracked(WorkRequest::empty(), &results_tx)).await;
    echo.inject_work(tracked(WorkRequest::new(get("/after")), &results_tx)).await;

    let first = next_result(&mut results, CALLBACK_TIMEOUT).await?;
    let second = next_result(&mut results, CALLBACK_TIMEOUT).await?;
    let mut values = vec![first, second];
    values.sort_by_key(|value| value.as_ref().map(|v| v.get("empty").is_none()));
    assert_eq!(values[0], Some(json!({ "empty": true, "thread": 0 })));
    assert_eq!(
        values[1].as_ref().and_then(|v| v.get("echo")).cloned(),
        Some(json!("GET /after"))
    );
    assert_eq!(pool.telemetry().snapshot().empty_invocations, 1);

    pool.shutdown().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_thread_preserves_fifo_order() -> Result<()> {
    init_tracing();
    let echo = worker("echo", 1);
    let runtime = EchoRuntime::default();
    let mut pool = ThreadPool::new(
        pool_config(1)?,
        registry_with(&[echo.clone()])?,
        runtime.clone(),
    );
    pool.start().await?;

    let (results_tx, mut results) = mpsc::unbounded_channel();
    let paths: Vec<String> = (0..5).map(|i| format!("/item/{i}")).collect();
    for path in &paths {
        echo.inject_work(tracked(WorkRequest::new(get(path)), &results_tx)).await;
    }
    for _ in &paths {
        next_result(&mut results, CALLBACK_TIMEOUT).await?;
    }

    assert_eq!(runtime.seen(), paths);
    assert_eq!(pool.telemetry().completions_delivered(), 5);

    pool.shutdown().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn runtime_errors_still_fire_callbacks() -> Result<()> {
    init_tracing();
    let echo = worker("echo", 1);
    let mut pool = ThreadPool::new(
        pool_config(1)?,
        registry_with(&[echo.clone()])?,
        FailingRuntime,
    );
    pool.start().await?;

    let (results_tx, mut results) = mpsc::unbounded_channel();
    echo.inject_work(tracked(WorkRequest::new(get("/")), &results_tx)).await;

    let value = next_result(&mut results, CALLBACK_TIMEOUT).await?;
    assert_eq!(value, Some(json!("partial")));
    assert_eq!(pool.telemetry().snapshot().runtime_errors, 1);

    pool.shutdown().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn malformed_request_is_dropped_without_callback() -> Result<()> {
    init_tracing();
    let echo = worker("echo", 1);
    let mut pool = ThreadPool::new(
        pool_config(1)?,
        registry_with(&[echo.clone()])?,
        EchoRuntime::default(),
    );
    pool.start().await?;

    let (results_tx, mut results) = mpsc::unbounded_channel();
    let mut bad = get("/bad");
    bad.headers_mut()
        .insert("x-binary", HeaderValue::from_bytes(b"\xfe\xff")?);
    echo.inject_work(tracked(WorkRequest::new(bad), &results_tx)).await;
    echo.inject_work(tracked(WorkRequest::new(get("/good")), &results_tx)).await;

    let value = next_result(&mut results, CALLBACK_TIMEOUT).await?;
    assert_eq!(
        value.as_ref().and_then(|v| v.get("echo")).cloned(),
        Some(json!("GET /good"))
    );
    assert_eq!(pool.telemetry().dropped_requests(), 1);

    pool.shutdown().await?;
    drop(results_tx);
    assert!(
        results.recv().await.is_none(),
        "the dropped request must never report a completion"
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn requests_are_routed_to_their_worker() -> Result<()> {
    init_tracing();
    let alpha = worker("alpha", 1);
    let beta = worker("beta", 1);
    let mut pool = ThreadPool::new(
        pool_config(2)?,
        registry_with(&[alpha.clone(), beta.clone()])?,
        EchoRuntime::default(),
    );
    pool.start().await?;

    let (results_tx, mut results) = mpsc::unbounded_channel();
    beta.inject_work(tracked(WorkRequest::new(get("/b")), &results_tx)).await;
    let value = next_result(&mut results, CALLBACK_TIMEOUT).await?;
    let beta_thread = pool.threads_for("beta")[0];
    assert_eq!(
        value.as_ref().and_then(|v| v.get("thread")).cloned(),
        Some(json!(beta_thread))
    );

    pool.shutdown().await?;
    Ok(())
}
