use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Pending {
    /// Parses of this parser currently running.
    running: usize,
    reason: Option<String>,
}

#[derive(Debug, Default)]
pub(crate) struct InterruptState {
    requested: AtomicBool,
    pending: Mutex<Pending>,
}

impl InterruptState {
    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a request for the running parses; ignored when none runs.
    fn request(&self, reason: &str) {
        let mut pending = self.lock();
        if pending.running == 0 {
            log::debug!("interrupt '{reason}' ignored: no parse running");
            return;
        }
        pending.reason = Some(reason.to_string());
        self.requested.store(true, Ordering::Release);
    }

    /// Marks a parse as running until the returned guard drops. A request
    /// left over when the last running parse ends is discarded.
    pub(crate) fn begin(&self) -> RunningParse<'_> {
        self.lock().running += 1;
        RunningParse { state: self }
    }

    fn finish(&self) {
        let mut pending = self.lock();
        pending.running = pending.running.saturating_sub(1);
        if pending.running == 0 {
            pending.reason = None;
            self.requested.store(false, Ordering::Release);
        }
    }

    /// Takes a pending request, leaving none behind.
    pub(crate) fn consume(&self) -> Option<String> {
        if !self.requested.swap(false, Ordering::AcqRel) {
            return None;
        }
        Some(self.lock().reason.take().unwrap_or_default())
    }

    /// Whether a request is pending, without taking it.
    pub(crate) fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

/// A parse counted as running by its [`InterruptState`].
#[derive(Debug)]
pub(crate) struct RunningParse<'a> {
    state: &'a InterruptState,
}

impl Drop for RunningParse<'_> {
    fn drop(&mut self) {
        self.state.finish();
    }
}

/// Requests that a running parse stop at its next level.
///
/// Handles are cheap to clone and can be sent to other threads. The parse
/// that observes a request ends with
/// [`ParseStatus::Interrupted`](super::ParseStatus::Interrupted) and consumes
/// it. Requests made while no parse runs, or not observed before the running
/// parses end, are dropped; they never stop a later parse.
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    state: Arc<InterruptState>,
}

impl InterruptHandle {
    pub(crate) const fn new(state: Arc<InterruptState>) -> Self {
        Self { state }
    }

    pub fn interrupt(&self, reason: &str) {
        self.state.request(reason);
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state.is_requested()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_is_consumed_once() {
        let state = Arc::new(InterruptState::default());
        let handle = InterruptHandle::new(Arc::clone(&state));
        let _running = state.begin();
        assert!(state.consume().is_none());
        handle.interrupt("timeout");
        assert!(handle.is_pending());
        assert_eq!(state.consume().as_deref(), Some("timeout"));
        assert!(state.consume().is_none());
        assert!(!handle.is_pending());
    }

    #[test]
    fn request_without_running_parse_is_dropped() {
        let state = Arc::new(InterruptState::default());
        let handle = InterruptHandle::new(Arc::clone(&state));
        handle.interrupt("too early");
        assert!(!handle.is_pending());
        let _running = state.begin();
        assert!(state.consume().is_none());
    }

    #[test]
    fn unobserved_request_ends_with_last_parse() {
        let state = Arc::new(InterruptState::default());
        let handle = InterruptHandle::new(Arc::clone(&state));
        let first = state.begin();
        let second = state.begin();
        handle.interrupt("late");
        drop(first);
        assert!(handle.is_pending());
        drop(second);
        assert!(!handle.is_pending());
        let _next = state.begin();
        assert!(state.consume().is_none());
    }
}
