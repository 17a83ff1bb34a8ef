// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::FlushTicket;
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering::Acquire, Ordering::SeqCst},
        Arc, Mutex, TryLockError,
    },
};

/// A FIFO queue of flush tickets.
///
/// Many lanes finish their flush work out of order internally; tickets are
/// registered here *before* the asynchronous work begins, and publication
/// drains strictly from the head, so the outside world observes completions
/// in arrival order. A slow head ticket blocks everything enqueued after it;
/// that is the ordering contract, not a defect.
pub struct FlushQueue<S> {
    queue: Mutex<VecDeque<Arc<FlushTicket<S>>>>,

    /// Incremented before a ticket is enqueued and decremented only after it
    /// is dequeued, so "any tickets outstanding?" never races against ticket
    /// construction.
    ticket_count: AtomicUsize,

    /// Serializes purge runs. Distinct from `queue` so the publish consumer
    /// never runs under the queue lock.
    purge_lock: Mutex<()>,
}

impl<S> Default for FlushQueue<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> FlushQueue<S> {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            ticket_count: AtomicUsize::new(0),
            purge_lock: Mutex::new(()),
        }
    }

    /// Runs `supplier` and enqueues the ticket it produces, if any.
    ///
    /// The outstanding count is incremented before the supplier runs and
    /// rolled back if it produces nothing or fails, so a concurrent
    /// [`Self::has_tickets`] can never miss a ticket that is being
    /// constructed.
    ///
    /// # Errors
    ///
    /// Forwards the supplier's error.
    pub fn add_ticket(
        &self,
        supplier: impl FnOnce() -> crate::Result<Option<Arc<FlushTicket<S>>>>,
    ) -> crate::Result<Option<Arc<FlushTicket<S>>>> {
        self.ticket_count.fetch_add(1, SeqCst);

        let result = supplier();

        if let Ok(Some(ticket)) = &result {
            self.queue
                .lock()
                .expect("lock is poisoned")
                .push_back(ticket.clone());
        } else {
            self.ticket_count.fetch_sub(1, SeqCst);
        }

        result
    }

    /// Attaches a flushed segment to a ticket.
    ///
    /// # Panics
    ///
    /// Panics if the ticket is already resolved.
    pub fn add_segment(&self, ticket: &FlushTicket<S>, segment: S) {
        ticket.set_segment(segment);
    }

    /// Marks a ticket's flush as failed so the queue can keep draining.
    ///
    /// # Panics
    ///
    /// Panics if the ticket is already resolved.
    pub fn mark_ticket_failed(&self, ticket: &FlushTicket<S>) {
        ticket.mark_failed();
    }

    /// Whether any tickets are outstanding, without touching the queue body.
    #[must_use]
    pub fn has_tickets(&self) -> bool {
        self.ticket_count.load(Acquire) > 0
    }

    /// Number of outstanding tickets.
    #[must_use]
    pub fn ticket_count(&self) -> usize {
        self.ticket_count.load(Acquire)
    }

    /// Publishes every currently publishable head ticket, blocking other
    /// purges until done. Returns the number of tickets published.
    ///
    /// # Errors
    ///
    /// Forwards the first consumer error; bookkeeping for the failed ticket
    /// is completed before the error propagates.
    pub fn force_purge(
        &self,
        consumer: impl FnMut(&FlushTicket<S>) -> crate::Result<()>,
    ) -> crate::Result<usize> {
        let _purge = self.purge_lock.lock().expect("lock is poisoned");
        self.inner_purge(consumer)
    }

    /// Like [`Self::force_purge`], but gives up immediately if another purge
    /// is already running.
    ///
    /// # Errors
    ///
    /// Forwards the first consumer error.
    pub fn try_purge(
        &self,
        consumer: impl FnMut(&FlushTicket<S>) -> crate::Result<()>,
    ) -> crate::Result<usize> {
        match self.purge_lock.try_lock() {
            Ok(_purge) => self.inner_purge(consumer),
            Err(TryLockError::WouldBlock) => Ok(0),
            Err(TryLockError::Poisoned(_)) => panic!("lock is poisoned"),
        }
    }

    fn inner_purge(
        &self,
        mut consumer: impl FnMut(&FlushTicket<S>) -> crate::Result<()>,
    ) -> crate::Result<usize> {
        let mut published = 0;

        loop {
            let head = self
                .queue
                .lock()
                .expect("lock is poisoned")
                .front()
                .cloned();

            let Some(ticket) = head else { break };

            if !ticket.can_publish() {
                break;
            }

            ticket.mark_published();

            // The consumer runs without the queue lock held, but before the
            // ticket is dequeued, so it may still rely on queue order.
            let result = consumer(&ticket);

            {
                let mut queue = self.queue.lock().expect("lock is poisoned");
                let popped = queue.pop_front();
                debug_assert!(
                    popped.is_some_and(|t| Arc::ptr_eq(&t, &ticket)),
                    "purge removed a non-head ticket",
                );
            }

            self.ticket_count.fetch_sub(1, SeqCst);

            result?;
            published += 1;
        }

        if published > 0 {
            log::trace!("published {published} flush tickets");
        }

        Ok(published)
    }
}
