//! Presence status model
//!
//! `Status` is the pair of facts pushed to the server. `SharedStatus` owns the
//! last-known value behind a single lock and only exposes whole-snapshot reads
//! and an atomic compare-and-set, so no caller ever sees a half-updated value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Last-known presence of the local user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Status {
    /// Screen is unlocked and the user is at the machine
    pub working: bool,
    /// A meeting application is running
    pub meeting: bool,
}

impl Status {
    pub fn new(working: bool, meeting: bool) -> Self {
        Self { working, meeting }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "working: {}, meeting: {}", self.working, self.meeting)
    }
}

/// Mutually exclusive holder of the current `Status`
#[derive(Debug, Default)]
pub struct SharedStatus {
    inner: Mutex<Status>,
}

impl SharedStatus {
    /// Create a holder seeded with `initial`
    pub fn new(initial: Status) -> Self {
        Self {
            inner: Mutex::new(initial),
        }
    }

    /// Consistent snapshot of both fields
    pub fn read(&self) -> Status {
        *self.lock()
    }

    /// Store the new values and report whether anything differed
    ///
    /// Only fields that actually changed are written. Calling this twice with
    /// the same values returns `true` at most once.
    pub fn compare_and_set(&self, working: bool, meeting: bool) -> bool {
        let mut status = self.lock();
        let mut changed = false;

        if status.meeting != meeting {
            status.meeting = meeting;
            changed = true;
        }
        if status.working != working {
            status.working = working;
            changed = true;
        }

        changed
    }

    fn lock(&self) -> MutexGuard<'_, Status> {
        // Writes are plain field stores, a poisoned guard still holds a whole Status
        self.inner.lock().unwrap_or_else(|e| {
            tracing::warn!("Shared status lock poisoned, recovering");
            PoisonError::into_inner(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_idle() {
        let shared = SharedStatus::default();
        assert_eq!(shared.read(), Status::new(false, false));
    }

    #[test]
    fn test_compare_and_set_reports_change() {
        let shared = SharedStatus::new(Status::new(true, false));
        assert!(shared.compare_and_set(false, false));
        assert_eq!(shared.read(), Status::new(false, false));
    }

    #[test]
    fn test_compare_and_set_same_values_is_noop() {
        let shared = SharedStatus::new(Status::new(true, true));
        assert!(!shared.compare_and_set(true, true));
        assert_eq!(shared.read(), Status::new(true, true));
    }

    #[test]
    fn test_compare_and_set_single_field() {
        let shared = SharedStatus::default();
        assert!(shared.compare_and_set(false, true));
        assert_eq!(shared.read(), Status::new(false, true));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Status::new(true, false).to_string(),
            "working: true, meeting: false"
        );
    }
}
