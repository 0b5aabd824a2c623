//! Per-session concurrency control.
//!
//! Only one turn (or history load) runs per chat session at a time. A
//! second submission while one is in flight is rejected with
//! [`SessionBusy`] rather than queued: the front end blocks input while
//! the session is processing.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Run lock for one chat session, backed by a `Semaphore(1)`.
#[derive(Debug, Clone)]
pub struct TurnLock {
    sem: Arc<Semaphore>,
}

impl Default for TurnLock {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnLock {
    pub fn new() -> Self {
        Self {
            sem: Arc::new(Semaphore::new(1)),
        }
    }

    /// Take the lock without waiting. Hold the permit for the duration of
    /// the turn; it releases on drop.
    pub fn try_acquire(&self) -> Result<OwnedSemaphorePermit, SessionBusy> {
        self.sem.clone().try_acquire_owned().map_err(|_| SessionBusy)
    }

    pub fn is_held(&self) -> bool {
        self.sem.available_permits() == 0
    }
}

/// Error returned when a turn or history load is already in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionBusy;

impl std::fmt::Display for SessionBusy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session is busy: a turn is already in progress")
    }
}

impl std::error::Error for SessionBusy {}
