use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle phase of one pool thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadState {
    Inactive = 0,
    Active = 1,
    Draining = 2,
}

impl ThreadState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => ThreadState::Active,
            2 => ThreadState::Draining,
            _ => ThreadState::Inactive,
        }
    }
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ThreadState::Inactive => "inactive",
            ThreadState::Active => "active",
            ThreadState::Draining => "draining",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleError {
    pub thread: usize,
    pub from: ThreadState,
    pub to: ThreadState,
}

impl fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "thread {} cannot move from {} to {}",
            self.thread, self.from, self.to
        )
    }
}

impl std::error::Error for LifecycleError {}

/// Atomic `Inactive -> Active -> Draining -> Inactive` state machine for one slot.
///
/// Deactivation is also accepted straight from `Active`.
#[derive(Debug)]
pub struct ThreadSlot {
    index: usize,
    state: AtomicU8,
}

impl ThreadSlot {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            state: AtomicU8::new(ThreadState::Inactive as u8),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> ThreadState {
        ThreadState::from_raw(self.state.load(Ordering::SeqCst))
    }

    pub fn activate(&self) -> Result<(), LifecycleError> {
        self.transition(ThreadState::Inactive, ThreadState::Active)
    }

    pub fn drain(&self) -> Result<(), LifecycleError> {
        self.transition(ThreadState::Active, ThreadState::Draining)
    }

    /// Returns the state the slot left.
    pub fn deactivate(&self) -> Result<ThreadState, LifecycleError> {
        match self.transition(ThreadState::Draining, ThreadState::Inactive) {
            Ok(()) => Ok(ThreadState::Draining),
            Err(_) => self
                .transition(ThreadState::Active, ThreadState::Inactive)
                .map(|()| ThreadState::Active),
        }
    }

    fn transition(&self, from: ThreadState, to: ThreadState) -> Result<(), LifecycleError> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|current| LifecycleError {
                thread: self.index,
                from: ThreadState::from_raw(current),
                to,
            })
    }
}
