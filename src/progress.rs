//! Progress tracking shared between a request, its handle and the session manager

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use arc_swap::ArcSwapOption;

/// Progress callback function type, receiving `(completed, total)`
pub type ProgressCallback = dyn Fn(u64, Option<u64>) + Send + Sync;

struct Observer(Arc<ProgressCallback>);

/// Signalling state of a progress handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressState {
    /// Units are advancing (or may advance)
    Running,
    /// Paused by a suspend
    Paused,
    /// Cancelled; no further updates are reported
    Cancelled,
    /// The owning request finished successfully
    Finished,
}

impl ProgressState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ProgressState::Paused,
            2 => ProgressState::Cancelled,
            3 => ProgressState::Finished,
            _ => ProgressState::Running,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ProgressState::Running => 0,
            ProgressState::Paused => 1,
            ProgressState::Cancelled => 2,
            ProgressState::Finished => 3,
        }
    }
}

struct ProgressInner {
    completed: AtomicU64,
    /// Zero means unknown
    total: AtomicU64,
    state: AtomicU8,
    observer: ArcSwapOption<Observer>,
}

/// Completed/total unit counts for one request.
///
/// Cloning yields another view of the same counters. Pause, resume and
/// cancel signalling here is independent of the transport task; the session
/// manager keeps both in step.
#[derive(Clone)]
pub struct Progress {
    inner: Arc<ProgressInner>,
}

impl Progress {
    /// Create a progress handle with unknown total
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ProgressInner {
                completed: AtomicU64::new(0),
                total: AtomicU64::new(0),
                state: AtomicU8::new(ProgressState::Running.as_u8()),
                observer: ArcSwapOption::new(None),
            }),
        }
    }

    /// Create a progress handle that reports every update to `callback`
    pub fn with_callback<F>(callback: F) -> Self
    where
        F: Fn(u64, Option<u64>) + Send + Sync + 'static,
    {
        let progress = Self::new();
        progress.observe(callback);
        progress
    }

    /// Replace the observer notified on each update
    pub fn observe<F>(&self, callback: F)
    where
        F: Fn(u64, Option<u64>) + Send + Sync + 'static,
    {
        self.inner
            .observer
            .store(Some(Arc::new(Observer(Arc::new(callback)))));
    }

    /// Units completed so far
    pub fn completed(&self) -> u64 {
        self.inner.completed.load(Ordering::Acquire)
    }

    /// Total units, if known
    pub fn total(&self) -> Option<u64> {
        match self.inner.total.load(Ordering::Acquire) {
            0 => None,
            total => Some(total),
        }
    }

    /// Fraction in `0.0..=1.0`, if the total is known
    pub fn fraction_completed(&self) -> Option<f64> {
        self.total()
            .map(|total| (self.completed() as f64 / total as f64).min(1.0))
    }

    /// Current signalling state
    pub fn state(&self) -> ProgressState {
        ProgressState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// Whether the progress was paused
    pub fn is_paused(&self) -> bool {
        self.state() == ProgressState::Paused
    }

    /// Whether the progress was cancelled
    pub fn is_cancelled(&self) -> bool {
        self.state() == ProgressState::Cancelled
    }

    /// Record absolute counts and notify the observer
    pub(crate) fn update(&self, completed: u64, total: Option<u64>) {
        if matches!(
            self.state(),
            ProgressState::Cancelled | ProgressState::Finished
        ) {
            return;
        }
        if let Some(total) = total {
            self.inner.total.store(total, Ordering::Release);
        }
        self.inner.completed.store(completed, Ordering::Release);
        self.notify();
    }

    /// Advance the completed count by `additional` units
    pub(crate) fn advance(&self, additional: u64) {
        if matches!(
            self.state(),
            ProgressState::Cancelled | ProgressState::Finished
        ) {
            return;
        }
        self.inner.completed.fetch_add(additional, Ordering::AcqRel);
        self.notify();
    }

    /// Set the total without touching the completed count
    pub(crate) fn set_total(&self, total: u64) {
        self.inner.total.store(total, Ordering::Release);
    }

    pub(crate) fn pause(&self) {
        self.transition(ProgressState::Running, ProgressState::Paused);
    }

    pub(crate) fn resume(&self) {
        self.transition(ProgressState::Paused, ProgressState::Running);
    }

    pub(crate) fn cancel(&self) {
        let current = self.state();
        if current != ProgressState::Finished {
            self.inner
                .state
                .store(ProgressState::Cancelled.as_u8(), Ordering::Release);
        }
    }

    /// Mark finished; a known total is reported as fully completed
    pub(crate) fn finish(&self) {
        if self.state() == ProgressState::Cancelled {
            return;
        }
        if let Some(total) = self.total() {
            self.inner.completed.store(total, Ordering::Release);
        }
        self.inner
            .state
            .store(ProgressState::Finished.as_u8(), Ordering::Release);
        self.notify();
    }

    fn transition(&self, from: ProgressState, to: ProgressState) {
        let _ = self.inner.state.compare_exchange(
            from.as_u8(),
            to.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    fn notify(&self) {
        if let Some(observer) = self.inner.observer.load_full() {
            (observer.0)(self.completed(), self.total());
        }
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("completed", &self.completed())
            .field("total", &self.total())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_update_and_fraction() {
        let progress = Progress::new();
        assert_eq!(progress.total(), None);
        assert_eq!(progress.fraction_completed(), None);

        progress.update(25, Some(100));
        assert_eq!(progress.completed(), 25);
        assert_eq!(progress.total(), Some(100));
        assert_eq!(progress.fraction_completed(), Some(0.25));
    }

    #[test]
    fn test_observer_receives_updates() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let progress = Progress::with_callback(move |done, total| {
            sink.lock().unwrap().push((done, total));
        });

        progress.set_total(10);
        progress.advance(4);
        progress.advance(6);

        assert_eq!(*seen.lock().unwrap(), vec![(4, Some(10)), (10, Some(10))]);
    }

    #[test]
    fn test_pause_resume_cancel_signalling() {
        let progress = Progress::new();
        progress.resume();
        assert_eq!(progress.state(), ProgressState::Running);

        progress.pause();
        assert!(progress.is_paused());
        progress.pause();
        assert!(progress.is_paused());

        progress.resume();
        assert_eq!(progress.state(), ProgressState::Running);

        progress.cancel();
        assert!(progress.is_cancelled());
        progress.resume();
        assert!(progress.is_cancelled());

        progress.update(5, Some(5));
        assert_eq!(progress.completed(), 0);
    }

    #[test]
    fn test_finish_completes_known_total() {
        let progress = Progress::new();
        progress.update(3, Some(8));
        progress.finish();
        assert_eq!(progress.state(), ProgressState::Finished);
        assert_eq!(progress.completed(), 8);

        progress.cancel();
        assert_eq!(progress.state(), ProgressState::Finished);
    }
}
