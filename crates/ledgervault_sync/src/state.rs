//! Sync status state machine and single-flight guard.

use crate::error::{SyncError, SyncResult};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::debug;

/// Observable status of the sync engine.
///
/// Push runs `Idle → Uploading → Idle`; pull runs
/// `Idle → Downloading → Staging → Swapping → Idle`. Any error leaves the
/// machine in `Failed`, from which a new operation may start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    /// Nothing running.
    Idle,
    /// Uploading a snapshot.
    Uploading,
    /// Downloading a snapshot.
    Downloading,
    /// Taking the rollback copy and extracting.
    Staging,
    /// Replacing live collections. Cannot be cancelled.
    Swapping,
    /// The last operation failed.
    Failed {
        /// Human-readable failure.
        reason: String,
    },
}

impl SyncStatus {
    /// Returns true while an operation is in flight.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncStatus::Uploading
                | SyncStatus::Downloading
                | SyncStatus::Staging
                | SyncStatus::Swapping
        )
    }

    /// Returns true if a new operation may start.
    #[must_use]
    pub fn can_start(&self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Idle => f.write_str("idle"),
            SyncStatus::Uploading => f.write_str("uploading"),
            SyncStatus::Downloading => f.write_str("downloading"),
            SyncStatus::Staging => f.write_str("staging"),
            SyncStatus::Swapping => f.write_str("swapping"),
            SyncStatus::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Owner of the current status and the cancellation flag.
#[derive(Debug)]
pub struct StatusCell {
    tx: watch::Sender<SyncStatus>,
    cancelled: AtomicBool,
}

impl StatusCell {
    /// Creates a cell in the `Idle` state.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SyncStatus::Idle);
        Self {
            tx,
            cancelled: AtomicBool::new(false),
        }
    }

    /// Returns the current status.
    #[must_use]
    pub fn current(&self) -> SyncStatus {
        self.tx.borrow().clone()
    }

    /// Returns a receiver notified on every transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.tx.subscribe()
    }

    /// Starts an operation in `first`, or fails with `SyncInProgress`.
    ///
    /// The check and the transition happen under one lock.
    pub fn begin(&self, first: SyncStatus) -> SyncResult<OperationGuard<'_>> {
        let mut started = false;
        self.tx.send_if_modified(|status| {
            if status.can_start() {
                *status = first.clone();
                started = true;
            }
            started
        });

        if !started {
            return Err(SyncError::SyncInProgress);
        }
        self.cancelled.store(false, Ordering::SeqCst);
        debug!(status = %first, "sync operation started");
        Ok(OperationGuard {
            cell: self,
            finished: false,
        })
    }

    /// Requests cancellation of the running operation.
    ///
    /// Honoured only before swapping starts.
    pub fn cancel(&self) {
        if self.current().is_active() {
            self.cancelled.store(true, Ordering::SeqCst);
        }
    }

    fn set(&self, status: SyncStatus) {
        self.tx.send_replace(status);
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive handle on the running operation.
///
/// Dropping an unfinished guard marks the operation as failed.
#[derive(Debug)]
pub struct OperationGuard<'a> {
    cell: &'a StatusCell,
    finished: bool,
}

impl OperationGuard<'_> {
    /// Moves to the next state of the running operation.
    pub fn advance(&self, status: SyncStatus) {
        debug!(status = %status, "sync state");
        self.cell.set(status);
    }

    /// Fails with `Cancelled` if cancellation was requested.
    pub fn check_cancelled(&self) -> SyncResult<()> {
        if self.cell.cancelled.load(Ordering::SeqCst) {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Ends the operation, recording its outcome, and passes the result on.
    pub fn finish<T>(mut self, result: SyncResult<T>) -> SyncResult<T> {
        self.finished = true;
        match &result {
            Ok(_) => self.cell.set(SyncStatus::Idle),
            Err(err) => self.cell.set(SyncStatus::Failed {
                reason: err.to_string(),
            }),
        }
        self.cell.cancelled.store(false, Ordering::SeqCst);
        result
    }
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.cell.set(SyncStatus::Failed {
                reason: "operation aborted".to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_flight() {
        let cell = StatusCell::new();
        let guard = cell.begin(SyncStatus::Uploading).unwrap();
        assert_eq!(
            cell.begin(SyncStatus::Downloading).unwrap_err(),
            SyncError::SyncInProgress
        );
        guard.finish(Ok(())).unwrap();
        assert_eq!(cell.current(), SyncStatus::Idle);
    }

    #[test]
    fn failure_is_recorded_and_restartable() {
        let cell = StatusCell::new();
        let guard = cell.begin(SyncStatus::Downloading).unwrap();
        let result: SyncResult<()> = guard.finish(Err(SyncError::NoRemoteData));
        assert!(result.is_err());
        assert!(matches!(cell.current(), SyncStatus::Failed { .. }));
        assert!(cell.begin(SyncStatus::Uploading).is_ok());
    }

    #[test]
    fn dropped_guard_fails() {
        let cell = StatusCell::new();
        drop(cell.begin(SyncStatus::Staging).unwrap());
        assert_eq!(
            cell.current(),
            SyncStatus::Failed {
                reason: "operation aborted".into()
            }
        );
    }

    #[test]
    fn cancellation_is_per_operation() {
        let cell = StatusCell::new();
        cell.cancel();
        let guard = cell.begin(SyncStatus::Downloading).unwrap();
        assert!(guard.check_cancelled().is_ok());

        cell.cancel();
        assert_eq!(guard.check_cancelled(), Err(SyncError::Cancelled));
        let _ = guard.finish::<()>(Err(SyncError::Cancelled));

        let guard = cell.begin(SyncStatus::Downloading).unwrap();
        assert!(guard.check_cancelled().is_ok());
        guard.finish(Ok(())).unwrap();
    }

    #[test]
    fn subscribers_see_transitions() {
        let cell = StatusCell::new();
        let mut rx = cell.subscribe();
        let guard = cell.begin(SyncStatus::Downloading).unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), SyncStatus::Downloading);
        guard.advance(SyncStatus::Swapping);
        assert_eq!(*rx.borrow_and_update(), SyncStatus::Swapping);
        guard.finish(Ok(())).unwrap();
        assert_eq!(*rx.borrow(), SyncStatus::Idle);
    }
}
