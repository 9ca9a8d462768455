//! Status reporting and cooperative cancellation for long-running operations.
//!
//! A fairing run is observed from another thread through two shared handles:
//!
//! - [`FairingStatus`]: the current phase label plus optional `(current, total)`
//!   sub-progress, last writer wins. Observers may also subscribe to every
//!   update with a callback instead of polling.
//! - [`CancelToken`]: a flag that can be raised from anywhere and is polled by
//!   the computation at phase boundaries. Once raised it stays raised.
//!
//! # Example
//!
//! ```
//! use fairmesh::algo::status::{CancelToken, FairingStatus};
//!
//! let status = FairingStatus::new().with_observer(|snapshot| {
//!     eprintln!("{}", snapshot);
//! });
//! status.set_phase("Solving the linear system");
//! status.set_progress(1, 3);
//! assert_eq!(status.text(), "Solving the linear system (1/3)");
//!
//! let cancel = CancelToken::new();
//! let remote = cancel.clone();
//! remote.cancel();
//! assert!(cancel.is_cancelled());
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    #[inline]
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Whether cancellation has been requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// A point-in-time copy of a [`FairingStatus`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// Human-readable label of the current phase.
    pub phase: String,
    /// Optional `(current, total)` progress within the phase.
    pub progress: Option<(usize, usize)>,
}

impl fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.progress {
            Some((current, total)) => write!(f, "{} ({}/{})", self.phase, current, total),
            None => f.write_str(&self.phase),
        }
    }
}

type Observer = dyn Fn(&StatusSnapshot) + Send + Sync;

#[derive(Default)]
struct StatusState {
    snapshot: StatusSnapshot,
    /// Status of a sub-computation whose text is appended to the phase label.
    detail: Option<FairingStatus>,
}

/// Shared, cloneable progress record.
///
/// Clones refer to the same record. All methods take `&self`.
#[derive(Clone, Default)]
pub struct FairingStatus {
    state: Arc<Mutex<StatusState>>,
    observer: Option<Arc<Observer>>,
}

impl FairingStatus {
    /// Create an empty status.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a callback invoked after every update with the new snapshot.
    ///
    /// The callback runs on the thread that made the update.
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&StatusSnapshot) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    fn update(&self, f: impl FnOnce(&mut StatusState)) {
        let snapshot = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut state);
            state.snapshot.clone()
        };
        if let Some(observer) = &self.observer {
            observer(&snapshot);
        }
    }

    /// Enter a new phase, clearing sub-progress and any detail status.
    pub fn set_phase(&self, phase: impl Into<String>) {
        let phase = phase.into();
        self.update(|state| {
            state.snapshot = StatusSnapshot {
                phase,
                progress: None,
            };
            state.detail = None;
        });
    }

    /// Enter a new phase whose text is followed by the live text of `detail`.
    ///
    /// Used to nest the solver's status under a pass label, e.g.
    /// `"[Fairing] Solving the linear system (2/3)"`.
    pub fn set_phase_with_detail(&self, phase: impl Into<String>, detail: &FairingStatus) {
        let phase = phase.into();
        let detail = detail.clone();
        self.update(|state| {
            state.snapshot = StatusSnapshot {
                phase,
                progress: None,
            };
            state.detail = Some(detail);
        });
    }

    /// Report progress within the current phase.
    pub fn set_progress(&self, current: usize, total: usize) {
        self.update(|state| state.snapshot.progress = Some((current, total)));
    }

    /// Copy of the current phase and progress, without nested detail.
    pub fn snapshot(&self) -> StatusSnapshot {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot
            .clone()
    }

    /// Full status text, including the text of a nested detail status.
    pub fn text(&self) -> String {
        let (own, detail) = {
            let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            (state.snapshot.to_string(), state.detail.clone())
        };
        match detail {
            Some(detail) => {
                let inner = detail.text();
                if inner.is_empty() {
                    own
                } else {
                    format!("{} {}", own, inner)
                }
            }
            None => own,
        }
    }
}

impl fmt::Debug for FairingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FairingStatus")
            .field("text", &self.text())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_cancel_is_shared_and_sticky() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());

        clone.cancel();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_phase_clears_progress() {
        let status = FairingStatus::new();
        status.set_phase("Assembling the linear system");
        status.set_progress(2, 3);
        assert_eq!(status.snapshot().progress, Some((2, 3)));

        status.set_phase("Solving the linear system");
        assert_eq!(status.snapshot().progress, None);
        assert_eq!(status.text(), "Solving the linear system");
    }

    #[test]
    fn test_nested_detail_text() {
        let outer = FairingStatus::new();
        let inner = FairingStatus::new();

        outer.set_phase_with_detail("[Pre-Fairing]", &inner);
        assert_eq!(outer.text(), "[Pre-Fairing]");

        inner.set_phase("Looking up weights");
        assert_eq!(outer.text(), "[Pre-Fairing] Looking up weights");

        outer.set_phase("Updating the mesh");
        inner.set_phase("ignored");
        assert_eq!(outer.text(), "Updating the mesh");
    }

    #[test]
    fn test_observer_sees_every_update() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let status = FairingStatus::new().with_observer(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        });

        status.set_phase("a");
        status.set_progress(0, 1);
        status.clone().set_progress(1, 1);
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_status_is_readable_across_threads() {
        let status = FairingStatus::new();
        let writer = status.clone();
        std::thread::spawn(move || writer.set_phase("from worker"))
            .join()
            .unwrap();
        assert_eq!(status.text(), "from worker");
    }
}
