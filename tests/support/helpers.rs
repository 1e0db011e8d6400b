use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Result};
use bytes::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Request, StatusCode};
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Semaphore};
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;
use workpipe::{
    DefaultWorker, PoolConfig, Registry, RequestContext, RuntimeError, RuntimeFuture,
    ScriptRuntime, Telemetry, WorkRequest, WorkerEnv,
};

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

/// Writes `METHOD PATH_INFO` to the output sink and returns it with the parameters.
///
/// Clones share the record of executed paths.
#[derive(Clone, Default)]
pub struct EchoRuntime {
    seen: Arc<Mutex<Vec<String>>>,
}

impl EchoRuntime {
    /// Paths in execution order.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl ScriptRuntime<Value, Value> for EchoRuntime {
    fn execute<'a>(&'a self, context: &'a mut RequestContext<Value, Value>) -> RuntimeFuture<'a> {
        Box::pin(async move {
            let thread = context.thread();
            if context.is_empty() {
                context.set_handler_return(json!({ "empty": true, "thread": thread }));
                return Ok(());
            }
            let Some(request) = context.request() else {
                return Ok(());
            };

            let path = request.variable("PATH_INFO").unwrap_or_default().to_owned();
            let line = format!(
                "{} {}",
                request.variable("REQUEST_METHOD").unwrap_or_default(),
                path
            );
            self.seen.lock().unwrap().push(path);

            if let Some(output) = context.output() {
                output.set_status(StatusCode::OK);
                output.append_header(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
                output.write(line.as_bytes())?;
            }

            let params = context.take_parameters().unwrap_or(Value::Null);
            context.set_handler_return(json!({ "echo": line, "params": params, "thread": thread }));
            Ok(())
        })
    }
}

/// [`EchoRuntime`] that holds every execution until [`GatedRuntime::open`] lets it through.
#[derive(Clone)]
pub struct GatedRuntime {
    echo: EchoRuntime,
    gate: Arc<Semaphore>,
}

impl GatedRuntime {
    pub fn closed() -> Self {
        Self {
            echo: EchoRuntime::default(),
            gate: Arc::new(Semaphore::new(0)),
        }
    }

    /// Lets `executions` more requests run.
    pub fn open(&self, executions: usize) {
        self.gate.add_permits(executions);
    }
}

impl ScriptRuntime<Value, Value> for GatedRuntime {
    fn execute<'a>(&'a self, context: &'a mut RequestContext<Value, Value>) -> RuntimeFuture<'a> {
        Box::pin(async move {
            self.gate
                .acquire()
                .await
                .map_err(|err| RuntimeError::new(anyhow!(err)))?
                .forget();
            self.echo.execute(context).await
        })
    }
}

/// Stores a return value and then reports a failure.
pub struct FailingRuntime;

impl ScriptRuntime<Value, Value> for FailingRuntime {
    fn execute<'a>(&'a self, context: &'a mut RequestContext<Value, Value>) -> RuntimeFuture<'a> {
        Box::pin(async move {
            context.set_handler_return(json!("partial"));
            Err(RuntimeError::new(anyhow!("script exited with status 255")))
        })
    }
}

pub struct PanickingRuntime;

impl ScriptRuntime<Value, Value> for PanickingRuntime {
    fn execute<'a>(&'a self, context: &'a mut RequestContext<Value, Value>) -> RuntimeFuture<'a> {
        Box::pin(async move {
            if context.is_empty() {
                panic!("script engine crashed");
            }
            Ok(())
        })
    }
}

pub fn get(path: &str) -> Request<Bytes> {
    Request::get(path).body(Bytes::new()).unwrap()
}

pub fn worker(identity: &str, min_threads: usize) -> Arc<DefaultWorker> {
    Arc::new(DefaultWorker::new(
        identity,
        format!("/srv/app/{identity}.php"),
        min_threads,
        WorkerEnv::new(),
    ))
}

pub fn registry_with(workers: &[Arc<DefaultWorker>]) -> Result<Arc<Registry>> {
    let registry: Arc<Registry> = Arc::new(Registry::new());
    for worker in workers {
        registry.register(worker.clone())?;
    }
    Ok(registry)
}

pub fn pool_config(threads: usize) -> Result<PoolConfig> {
    PoolConfig::builder()
        .thread_count(threads)
        .metrics_interval(Duration::from_millis(100))
        .shutdown_timeout(Duration::from_secs(2))
        .build()
}

/// Attaches a callback that forwards the handler return value to `results`.
pub fn tracked(
    request: WorkRequest<Value, Value>,
    results: &mpsc::UnboundedSender<Option<Value>>,
) -> WorkRequest<Value, Value> {
    let results = results.clone();
    request.on_complete(move |value| {
        let _ = results.send(value);
    })
}

pub async fn next_result(
    results: &mut mpsc::UnboundedReceiver<Option<Value>>,
    timeout: Duration,
) -> Result<Option<Value>> {
    match tokio::time::timeout(timeout, results.recv()).await {
        Ok(Some(value)) => Ok(value),
        Ok(None) => bail!("result channel closed"),
        Err(_) => bail!("no completion callback within {:?}", timeout),
    }
}

pub async fn wait_for_active_threads(
    telemetry: &Arc<Telemetry>,
    expected: usize,
    timeout: Duration,
) -> Result<()> {
    let start = Instant::now();
    loop {
        let current = telemetry.active_threads();
        if current == expected {
            return Ok(());
        }

        if start.elapsed() > timeout {
            bail!(
                "pool did not reach {expected} active threads within {:?} \
                 (active: {current}, transitions: {})",
                timeout,
                telemetry.thread_transitions()
            );
        }

        sleep(Duration::from_millis(20)).await;
    }
}
