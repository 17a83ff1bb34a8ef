// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::sync::Mutex;

struct State<S> {
    segment: Option<S>,
    failed: bool,
    published: bool,
}

/// One unit of pending flush work.
///
/// Either carries a future segment result, or represents a pure
/// "apply deletes" marker that never gets one. Tickets resolve out of order
/// but publish strictly in enqueue order via the
/// [`FlushQueue`](super::FlushQueue).
pub struct FlushTicket<S> {
    expects_segment: bool,
    state: Mutex<State<S>>,
}

impl<S> std::fmt::Debug for FlushTicket<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().expect("lock is poisoned");

        write!(
            f,
            "FlushTicket(expects_segment={}, resolved={}, failed={}, published={})",
            self.expects_segment,
            state.segment.is_some(),
            state.failed,
            state.published,
        )
    }
}

impl<S> FlushTicket<S> {
    /// Creates a ticket that will carry a flushed segment once the flush
    /// completes.
    #[must_use]
    pub fn segment() -> Self {
        Self {
            expects_segment: true,
            state: Mutex::new(State {
                segment: None,
                failed: false,
                published: false,
            }),
        }
    }

    /// Creates a deletes-only marker ticket; it is publishable immediately.
    #[must_use]
    pub fn deletes_only() -> Self {
        Self {
            expects_segment: false,
            state: Mutex::new(State {
                segment: None,
                failed: false,
                published: false,
            }),
        }
    }

    /// Whether this ticket is supposed to carry a segment.
    #[must_use]
    pub fn expects_segment(&self) -> bool {
        self.expects_segment
    }

    /// Attaches the flushed segment.
    ///
    /// # Panics
    ///
    /// Panics if the ticket is deletes-only, or was already resolved.
    pub fn set_segment(&self, segment: S) {
        assert!(self.expects_segment, "deletes-only ticket cannot carry a segment");

        let mut state = self.state.lock().expect("lock is poisoned");
        assert!(
            state.segment.is_none() && !state.failed,
            "ticket is already resolved",
        );

        state.segment = Some(segment);
    }

    /// Marks the flush as failed; the ticket stays publishable so the queue
    /// keeps draining.
    ///
    /// # Panics
    ///
    /// Panics if the ticket was already resolved.
    pub fn mark_failed(&self) {
        let mut state = self.state.lock().expect("lock is poisoned");
        assert!(
            state.segment.is_none() && !state.failed,
            "ticket is already resolved",
        );

        state.failed = true;
    }

    /// Whether the flush behind this ticket failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.state.lock().expect("lock is poisoned").failed
    }

    /// Whether this ticket has been published.
    #[must_use]
    pub fn is_published(&self) -> bool {
        self.state.lock().expect("lock is poisoned").published
    }

    /// Takes the segment result out of the ticket, if any. Meant for the
    /// publish consumer.
    pub fn take_segment(&self) -> Option<S> {
        self.state.lock().expect("lock is poisoned").segment.take()
    }

    /// Publishable iff no segment is expected, or one was set, or the flush
    /// failed.
    pub(super) fn can_publish(&self) -> bool {
        let state = self.state.lock().expect("lock is poisoned");
        !self.expects_segment || state.segment.is_some() || state.failed
    }

    pub(super) fn mark_published(&self) {
        let mut state = self.state.lock().expect("lock is poisoned");
        assert!(!state.published, "ticket was already published");
        state.published = true;
    }
}
