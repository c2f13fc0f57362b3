//! Startup readiness gate.
//!
//! The gate starts pending, and is resolved exactly once: ready when startup
//! recovery succeeds, aborted when it fails or the store shuts down first.
//! Waiters block on a condition variable in bounded intervals, so a waiter
//! wakes at least once per poll cap even without a notification.

use crate::error::{CoreError, CoreResult};
use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Point in time after which a wait gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// A deadline `timeout` from now.
    #[must_use]
    pub fn within(timeout: Duration) -> Self {
        let now = Instant::now();
        Self {
            at: now.checked_add(timeout).unwrap_or(now + Duration::from_secs(86_400 * 365)),
        }
    }

    /// A deadline at `instant`.
    #[must_use]
    pub const fn at(instant: Instant) -> Self {
        Self { at: instant }
    }

    /// A deadline that has already passed.
    #[must_use]
    pub fn expired() -> Self {
        Self { at: Instant::now() }
    }

    /// Time left, zero once passed.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// Whether the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Interval to sleep before checking again: the time left, capped.
    #[must_use]
    pub fn sleep_interval(&self, cap: Duration) -> Duration {
        self.remaining().min(cap)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum GateState {
    Pending,
    Ready,
    Aborted(String),
}

/// One-shot readiness signal with deadline-bounded waits.
#[derive(Debug)]
pub struct ReadinessGate {
    state: Mutex<GateState>,
    changed: Condvar,
    poll_cap: Duration,
}

impl ReadinessGate {
    /// Creates a pending gate whose waits sleep at most `poll_cap` at a time.
    #[must_use]
    pub fn new(poll_cap: Duration) -> Self {
        Self {
            state: Mutex::new(GateState::Pending),
            changed: Condvar::new(),
            poll_cap,
        }
    }

    /// Whether the gate has opened.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self.state.lock() == GateState::Ready
    }

    /// Opens the gate. Returns false if it was already resolved.
    pub fn mark_ready(&self) -> bool {
        self.resolve(GateState::Ready)
    }

    /// Aborts the gate; current and future waiters fail with `Interrupted`.
    /// Returns false if it was already resolved.
    pub fn abort(&self, reason: impl Into<String>) -> bool {
        self.resolve(GateState::Aborted(reason.into()))
    }

    fn resolve(&self, to: GateState) -> bool {
        let mut state = self.state.lock();
        if *state != GateState::Pending {
            return false;
        }
        match &to {
            GateState::Ready => debug!("readiness gate opened"),
            GateState::Aborted(reason) => error!(%reason, "readiness gate aborted"),
            GateState::Pending => {}
        }
        *state = to;
        drop(state);
        self.changed.notify_all();
        true
    }

    /// Returns a guard that aborts the gate with `reason` when dropped.
    ///
    /// Resolving the gate first turns the abort into a no-op, so the guard
    /// only fires when the resolving code unwinds or returns early.
    #[must_use]
    pub fn abort_guard(&self, reason: impl Into<String>) -> AbortGuard<'_> {
        AbortGuard {
            gate: self,
            reason: reason.into(),
        }
    }

    /// Fails unless the gate is open.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotReady`] while pending, or
    /// [`CoreError::Interrupted`] once aborted.
    pub fn check(&self) -> CoreResult<()> {
        match &*self.state.lock() {
            GateState::Ready => Ok(()),
            GateState::Pending => Err(CoreError::NotReady),
            GateState::Aborted(reason) => Err(CoreError::interrupted(reason.clone())),
        }
    }

    /// Blocks until the gate opens or `deadline` passes.
    ///
    /// Each sleep lasts at most the smaller of the poll cap and the time
    /// left, so the call returns no later than one poll interval past the
    /// deadline.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Timeout`] when the deadline passes first, or
    /// [`CoreError::Interrupted`] if the gate is aborted. Neither is retried.
    pub fn wait_ready(&self, deadline: Deadline) -> CoreResult<()> {
        let start = Instant::now();
        let mut state = self.state.lock();
        loop {
            match &*state {
                GateState::Ready => return Ok(()),
                GateState::Aborted(reason) => return Err(CoreError::interrupted(reason.clone())),
                GateState::Pending => {}
            }
            if deadline.is_expired() {
                return Err(CoreError::Timeout {
                    waited: start.elapsed(),
                });
            }
            let interval = deadline.sleep_interval(self.poll_cap);
            self.changed.wait_for(&mut state, interval);
        }
    }
}

/// Aborts a [`ReadinessGate`] on drop unless it was resolved already.
#[derive(Debug)]
pub struct AbortGuard<'a> {
    gate: &'a ReadinessGate,
    reason: String,
}

impl Drop for AbortGuard<'_> {
    fn drop(&mut self) {
        self.gate.abort(std::mem::take(&mut self.reason));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn ready_before_deadline() {
        let gate = Arc::new(ReadinessGate::new(Duration::from_secs(5)));
        assert!(!gate.is_ready());
        assert!(matches!(gate.check(), Err(CoreError::NotReady)));

        let opener = Arc::clone(&gate);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            opener.mark_ready()
        });

        let started = Instant::now();
        gate.wait_ready(Deadline::within(Duration::from_secs(10))).unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(handle.join().unwrap());
        assert!(gate.is_ready());
        gate.check().unwrap();
    }

    #[test]
    fn timeout_is_bounded() {
        let gate = ReadinessGate::new(Duration::from_millis(20));
        let started = Instant::now();
        let err = gate
            .wait_ready(Deadline::within(Duration::from_millis(100)))
            .unwrap_err();
        let elapsed = started.elapsed();
        assert!(err.is_timeout());
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(100) + Duration::from_secs(2));
    }

    #[test]
    fn expired_deadline_fails_immediately() {
        let gate = ReadinessGate::new(Duration::from_secs(5));
        assert!(gate.wait_ready(Deadline::expired()).unwrap_err().is_timeout());
    }

    #[test]
    fn abort_interrupts_waiters() {
        let gate = Arc::new(ReadinessGate::new(Duration::from_secs(5)));
        let aborter = Arc::clone(&gate);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            aborter.abort("recovery failed")
        });

        let err = gate
            .wait_ready(Deadline::within(Duration::from_secs(10)))
            .unwrap_err();
        assert!(matches!(err, CoreError::Interrupted { .. }));
        assert!(handle.join().unwrap());
        assert!(!gate.mark_ready(), "gate resolves only once");
        assert!(matches!(gate.check(), Err(CoreError::Interrupted { .. })));
    }

    #[test]
    fn sleep_interval_is_capped() {
        let deadline = Deadline::within(Duration::from_secs(60));
        assert_eq!(deadline.sleep_interval(Duration::from_millis(5)), Duration::from_millis(5));
        assert!(deadline.sleep_interval(Duration::from_secs(600)) <= Duration::from_secs(60));
    }

    #[test]
    fn guard_aborts_when_the_resolver_panics() {
        let gate = Arc::new(ReadinessGate::new(Duration::from_millis(20)));
        let resolver = Arc::clone(&gate);
        let outcome = thread::spawn(move || {
            let _guard = resolver.abort_guard("resolver died");
            panic!("boom");
        })
        .join();
        assert!(outcome.is_err());

        let err = gate
            .wait_ready(Deadline::within(Duration::from_secs(5)))
            .unwrap_err();
        assert!(matches!(err, CoreError::Interrupted { .. }));
        assert!(!gate.mark_ready());
    }

    #[test]
    fn guard_leaves_a_resolved_gate_alone() {
        let gate = ReadinessGate::new(Duration::from_millis(20));
        {
            let _guard = gate.abort_guard("unused");
            assert!(gate.mark_ready());
        }
        assert!(gate.is_ready());
        gate.check().unwrap();
    }
}
