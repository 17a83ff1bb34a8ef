// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::{
    sync::{
        atomic::{
            AtomicBool,
            Ordering::{Acquire, Release},
        },
        Condvar, Mutex,
    },
    time::Duration,
};

// Ceiling on a single wait, in case a wake signal is missed.
const MAX_WAIT: Duration = Duration::from_secs(1);

#[derive(Default)]
struct GateState {
    stalled: bool,
    waiting: usize,
}

/// Admission gate that pauses new writes while flushing falls behind.
///
/// A pure signal primitive: the *policy* deciding when the system counts as
/// stalled (actively-flushing lanes vs. active lanes) lives with the caller,
/// which drives [`StallGate::update_stalled`].
///
/// Callers of [`StallGate::wait_if_stalled`] re-check overall system state
/// after every wake and call again if still stalled; there is no internal
/// retry loop.
pub struct StallGate {
    state: Mutex<GateState>,
    condvar: Condvar,

    /// Mirror of `GateState::stalled` for the lock-free fast path.
    stalled: AtomicBool,

    /// Sticky diagnostic: whether the gate has ever stalled.
    was_stalled: AtomicBool,
}

impl Default for StallGate {
    fn default() -> Self {
        Self::new()
    }
}

impl StallGate {
    /// Creates a healthy gate.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState::default()),
            condvar: Condvar::new(),
            stalled: AtomicBool::new(false),
            was_stalled: AtomicBool::new(false),
        }
    }

    /// Flips the gate between healthy and stalled.
    ///
    /// A redundant update (same value) changes nothing and wakes nobody.
    /// Both real transitions wake every thread blocked in
    /// [`Self::wait_if_stalled`].
    pub fn update_stalled(&self, stalled: bool) {
        let mut state = self.state.lock().expect("lock is poisoned");

        if state.stalled != stalled {
            state.stalled = stalled;
            self.stalled.store(stalled, Release);

            if stalled {
                self.was_stalled.store(true, Release);
                log::debug!("write admission stalled");
            } else {
                log::debug!("write admission resumed");
            }

            self.condvar.notify_all();
        }
    }

    /// Blocks the calling thread while the gate is stalled, for at most one
    /// bounded interval. Returns immediately when healthy.
    pub fn wait_if_stalled(&self) {
        // Fast path without taking the lock.
        if !self.stalled.load(Acquire) {
            return;
        }

        let mut state = self.state.lock().expect("lock is poisoned");

        if state.stalled {
            state.waiting += 1;

            let (mut state, _timeout) = self
                .condvar
                .wait_timeout(state, MAX_WAIT)
                .expect("lock is poisoned");

            state.waiting -= 1;
        }
    }

    /// Whether the gate is currently stalled.
    #[must_use]
    pub fn is_stalled(&self) -> bool {
        self.stalled.load(Acquire)
    }

    /// Whether the gate is currently healthy.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        !self.is_stalled()
    }

    /// Whether any threads are currently blocked in
    /// [`Self::wait_if_stalled`].
    #[must_use]
    pub fn any_stalled_threads(&self) -> bool {
        self.state.lock().expect("lock is poisoned").waiting > 0
    }

    /// Whether the gate has ever stalled. Diagnostic only.
    #[must_use]
    pub fn was_stalled(&self) -> bool {
        self.was_stalled.load(Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_gate_does_not_block() {
        let gate = StallGate::new();
        gate.wait_if_stalled();
        assert!(gate.is_healthy());
        assert!(!gate.was_stalled());
    }

    #[test]
    fn redundant_update_is_noop() {
        let gate = StallGate::new();

        gate.update_stalled(false);
        assert!(!gate.was_stalled());

        gate.update_stalled(true);
        gate.update_stalled(true);
        assert!(gate.is_stalled());

        gate.update_stalled(false);
        assert!(gate.is_healthy());
        assert!(gate.was_stalled());
    }
}
