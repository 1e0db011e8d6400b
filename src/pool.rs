//! Pool manager: thread budget, lifecycle, and the engine side of each thread.

pub mod lifecycle;
pub mod manager;
pub mod reservation;
pub(crate) mod scope;
pub(crate) mod script_thread;

pub use lifecycle::{LifecycleError, ThreadSlot, ThreadState};
pub use manager::{PoolError, ThreadPool};
pub use reservation::{plan_reservations, ReservationError, ReservationPlan};
