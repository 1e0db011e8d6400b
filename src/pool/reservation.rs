use crate::worker::WorkerTable;
use std::fmt;

/// The registered workers ask for more threads than the pool owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationError {
    pub requested: usize,
    pub available: usize,
    /// Every worker's `(identity, min_threads)`, ordered by identity.
    pub workers: Vec<(String, usize)>,
}

impl fmt::Display for ReservationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "workers reserve {} threads but the pool only has {}; increase thread_count",
            self.requested, self.available
        )?;
        for (identity, min_threads) in &self.workers {
            write!(f, "\n  {identity}: {min_threads}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ReservationError {}

/// Minimum thread assignment per worker, computed once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationPlan {
    pub assignments: Vec<(String, usize)>,
    /// Threads left for [`crate::ThreadPool::activate_thread`].
    pub spare: usize,
}

impl ReservationPlan {
    pub fn reserved(&self) -> usize {
        self.assignments.iter().map(|(_, threads)| threads).sum()
    }
}

pub fn plan_reservations<P: 'static, R: 'static>(
    table: &WorkerTable<P, R>,
    budget: usize,
) -> Result<ReservationPlan, ReservationError> {
    let assignments: Vec<(String, usize)> = table
        .iter()
        .map(|(identity, worker)| (identity.to_owned(), worker.min_threads()))
        .collect();
    let requested = table.total_min_threads();

    if requested > budget {
        return Err(ReservationError {
            requested,
            available: budget,
            workers: assignments,
        });
    }

    Ok(ReservationPlan {
        assignments,
        spare: budget - requested,
    })
}
