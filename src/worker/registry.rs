use super::handle::WorkerHandle;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub type SharedWorker<P, R> = Arc<dyn WorkerHandle<P, R>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The pool already took its startup snapshot.
    Frozen { identity: String },
    EmptyIdentity,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::Frozen { identity } => write!(
                f,
                "cannot register worker {identity}: the pool already started"
            ),
            RegistryError::EmptyIdentity => write!(f, "worker identity cannot be empty"),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Process-scoped table of worker handles, keyed by identity.
///
/// Registration is only accepted until [`Registry::snapshot`] freezes the table; the pool
/// then works from the immutable [`WorkerTable`] without taking this lock again.
pub struct Registry<P = Value, R = Value> {
    inner: Mutex<RegistryInner<P, R>>,
}

struct RegistryInner<P, R> {
    workers: HashMap<String, SharedWorker<P, R>>,
    frozen: bool,
}

impl<P: 'static, R: 'static> Registry<P, R> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                workers: HashMap::new(),
                frozen: false,
            }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, RegistryInner<P, R>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `worker`, replacing any handle registered under the same identity.
    pub fn register(&self, worker: SharedWorker<P, R>) -> Result<(), RegistryError> {
        let identity = worker.identity().to_owned();
        if identity.is_empty() {
            return Err(RegistryError::EmptyIdentity);
        }

        let mut inner = self.inner();
        if inner.frozen {
            return Err(RegistryError::Frozen { identity });
        }
        if inner.workers.insert(identity.clone(), worker).is_some() {
            tracing::warn!(
                worker = %identity,
                "worker registered twice; replacing previous handle"
            );
        }
        Ok(())
    }

    pub fn lookup(&self, identity: &str) -> Option<SharedWorker<P, R>> {
        self.inner().workers.get(identity).cloned()
    }

    /// Removes a worker from the table. Removing after the snapshot does not affect a
    /// running pool.
    pub fn remove(&self, identity: &str) -> Option<SharedWorker<P, R>> {
        self.inner().workers.remove(identity)
    }

    pub fn len(&self) -> usize {
        self.inner().workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner().workers.is_empty()
    }

    pub fn is_frozen(&self) -> bool {
        self.inner().frozen
    }

    /// Freezes the registry and returns the table the pool starts from.
    pub fn snapshot(&self) -> WorkerTable<P, R> {
        let mut inner = self.inner();
        inner.frozen = true;
        WorkerTable {
            workers: inner
                .workers
                .iter()
                .map(|(identity, worker)| (identity.clone(), worker.clone()))
                .collect(),
        }
    }
}

impl<P: 'static, R: 'static> Default for Registry<P, R> {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable startup snapshot of the registry, ordered by identity.
pub struct WorkerTable<P, R> {
    workers: BTreeMap<String, SharedWorker<P, R>>,
}

impl<P, R> Clone for WorkerTable<P, R> {
    fn clone(&self) -> Self {
        Self {
            workers: self.workers.clone(),
        }
    }
}

impl<P: 'static, R: 'static> WorkerTable<P, R> {
    pub fn get(&self, identity: &str) -> Option<&SharedWorker<P, R>> {
        self.workers.get(identity)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SharedWorker<P, R>)> {
        self.workers
            .iter()
            .map(|(identity, worker)| (identity.as_str(), worker))
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Sum of every worker's minimum thread reservation.
    pub fn total_min_threads(&self) -> usize {
        self.workers
            .values()
            .fold(0usize, |acc, worker| acc.saturating_add(worker.min_threads()))
    }
}
