// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{Error, Result};
use std::{
    sync::{
        atomic::{
            AtomicBool, AtomicU64,
            Ordering::{Acquire, Relaxed, Release},
        },
        Condvar, Mutex,
    },
    time::{Duration, Instant},
};

// Pauses shorter than this are not worth a context switch.
const MIN_PAUSE: Duration = Duration::from_millis(2);

// Ceiling on a single sleep; the rate may change while asleep.
const MAX_PAUSE: Duration = Duration::from_millis(250);

// Target spacing between pause checks at the current rate.
const PAUSE_CHECK_SECS: f64 = 0.025;

// Ceiling on the pause-check granularity.
const MAX_PAUSE_CHECK_BYTES: u64 = 1_024 * 1_024;

const BYTES_PER_MIB: f64 = 1_024.0 * 1_024.0;

// Backstop for pathological rates, so a single owed pause stays finite.
const MAX_OWED_SECS: f64 = 86_400.0;

enum PauseKind {
    /// Throttled: rate > 0.
    Paused,

    /// Fully stopped: rate == 0.
    Stopped,
}

/// Adaptive throttle on a background merge thread's write path.
///
/// The merge thread reports written byte counts through
/// [`MergeRateLimiter::pause`], which sleeps just long enough to keep the
/// thread at the configured rate. Changing the rate wakes any sleeping
/// merge immediately, and aborting the merge turns the wait into a
/// [`Error::MergeAborted`] instead of letting it run out.
///
/// ```
/// use skriva::MergeRateLimiter;
///
/// let limiter = MergeRateLimiter::new();
///
/// // Unlimited by default: no pause.
/// let paused = limiter.pause(1_024 * 1_024)?;
/// assert!(paused.is_zero());
/// assert_eq!(limiter.total_bytes_written(), 1_024 * 1_024);
/// # Ok::<_, skriva::Error>(())
/// ```
pub struct MergeRateLimiter {
    /// Rate cap in MiB/sec, stored as `f64` bits. Infinity = unthrottled.
    mb_per_sec: AtomicU64,

    /// Bytes a merge may write between pause checks at the current rate.
    min_pause_check_bytes: AtomicU64,

    total_bytes_written: AtomicU64,
    total_paused_ns: AtomicU64,
    total_stopped_ns: AtomicU64,

    aborted: AtomicBool,

    /// Last schedule point; only ever snapped to a historical `now`, so it
    /// never runs ahead of the clock.
    sched: Mutex<Instant>,

    /// Pauses wait here; rate changes and aborts notify it.
    pause_mutex: Mutex<()>,
    pause_condvar: Condvar,
}

impl Default for MergeRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl MergeRateLimiter {
    /// Creates an unthrottled limiter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            mb_per_sec: AtomicU64::new(f64::INFINITY.to_bits()),
            min_pause_check_bytes: AtomicU64::new(MAX_PAUSE_CHECK_BYTES),
            total_bytes_written: AtomicU64::new(0),
            total_paused_ns: AtomicU64::new(0),
            total_stopped_ns: AtomicU64::new(0),
            aborted: AtomicBool::new(false),
            sched: Mutex::new(Instant::now()),
            pause_mutex: Mutex::new(()),
            pause_condvar: Condvar::new(),
        }
    }

    /// Sets the rate cap in MiB/sec. `0` stops merge I/O entirely;
    /// `f64::INFINITY` removes the throttle.
    ///
    /// Any merge currently sleeping is woken so the new rate takes effect
    /// without waiting out a stale sleep.
    ///
    /// # Panics
    ///
    /// Panics if `rate` is negative or NaN.
    pub fn set_mb_per_sec(&self, rate: f64) {
        assert!(rate >= 0.0, "merge rate must be non-negative");

        self.mb_per_sec.store(rate.to_bits(), Release);

        let check_bytes = PAUSE_CHECK_SECS * rate * BYTES_PER_MIB;
        let check_bytes = if check_bytes.is_finite() {
            (check_bytes as u64).min(MAX_PAUSE_CHECK_BYTES)
        } else {
            MAX_PAUSE_CHECK_BYTES
        };
        self.min_pause_check_bytes.store(check_bytes, Release);

        log::trace!("merge rate limit set to {rate} MiB/s");

        let _guard = self.pause_mutex.lock().expect("lock is poisoned");
        self.pause_condvar.notify_all();
    }

    /// Current rate cap in MiB/sec.
    #[must_use]
    pub fn mb_per_sec(&self) -> f64 {
        f64::from_bits(self.mb_per_sec.load(Acquire))
    }

    /// Bytes a merge should accumulate between [`Self::pause`] calls.
    #[must_use]
    pub fn min_pause_check_bytes(&self) -> u64 {
        self.min_pause_check_bytes.load(Acquire)
    }

    /// Cumulative bytes reported through [`Self::pause`].
    #[must_use]
    pub fn total_bytes_written(&self) -> u64 {
        self.total_bytes_written.load(Acquire)
    }

    /// Cumulative time spent throttled (rate > 0).
    #[must_use]
    pub fn total_paused(&self) -> Duration {
        Duration::from_nanos(self.total_paused_ns.load(Acquire))
    }

    /// Cumulative time spent fully stopped (rate == 0).
    #[must_use]
    pub fn total_stopped(&self) -> Duration {
        Duration::from_nanos(self.total_stopped_ns.load(Acquire))
    }

    /// Aborts the merge this limiter paces: any in-flight pause fails with
    /// [`Error::MergeAborted`] immediately, as does every later pause.
    pub fn abort(&self) {
        log::debug!("aborting throttled merge");
        self.aborted.store(true, Release);

        let _guard = self.pause_mutex.lock().expect("lock is poisoned");
        self.pause_condvar.notify_all();
    }

    /// Whether the merge was aborted.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Acquire)
    }

    /// Accounts `bytes` just written and sleeps long enough to keep the
    /// merge at the configured rate. Returns the total time slept.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MergeAborted`] if the merge is aborted before or
    /// during the pause.
    pub fn pause(&self, bytes: u64) -> Result<Duration> {
        self.total_bytes_written.fetch_add(bytes, Relaxed);

        let mut paused = Duration::ZERO;

        // The schedule point stays fixed while we sleep, so the advancing
        // clock converges on it; each round re-reads the rate.
        while let Some(slept) = self.maybe_pause(bytes)? {
            paused += slept;
        }

        Ok(paused)
    }

    fn check_abort(&self) -> Result<()> {
        if self.is_aborted() {
            return Err(Error::MergeAborted);
        }

        Ok(())
    }

    /// One pause step. `Ok(None)` means the merge is on schedule.
    fn maybe_pause(&self, bytes: u64) -> Result<Option<Duration>> {
        self.check_abort()?;

        let rate_bits = self.mb_per_sec.load(Acquire);
        let rate = f64::from_bits(rate_bits);

        let kind = if rate == 0.0 {
            PauseKind::Stopped
        } else {
            PauseKind::Paused
        };

        let owed = if rate == 0.0 {
            Duration::from_secs_f64(MAX_OWED_SECS)
        } else {
            let secs = (bytes as f64 / BYTES_PER_MIB) / rate;
            Duration::from_secs_f64(secs.min(MAX_OWED_SECS))
        };

        let now = Instant::now();

        let pause = {
            let mut sched = self.sched.lock().expect("lock is poisoned");
            let elapsed = now.saturating_duration_since(*sched);
            let pause = owed.saturating_sub(elapsed);

            if pause <= MIN_PAUSE {
                // Snap to now, not the target, so the configured rate acts
                // instantaneously instead of averaged over all history.
                *sched = now;
                return Ok(None);
            }

            pause.min(MAX_PAUSE)
        };

        let slept = self.cooperative_pause(pause, rate_bits)?;

        match kind {
            PauseKind::Paused => {
                self.total_paused_ns
                    .fetch_add(slept.as_nanos() as u64, Relaxed);
            }
            PauseKind::Stopped => {
                self.total_stopped_ns
                    .fetch_add(slept.as_nanos() as u64, Relaxed);
            }
        }

        Ok(Some(slept))
    }

    /// Waits out `pause`, ending early if the merge is aborted or the rate
    /// is no longer the one the pause was computed from.
    fn cooperative_pause(&self, pause: Duration, rate_bits: u64) -> Result<Duration> {
        let start = Instant::now();
        let deadline = start + pause;

        let mut guard = self.pause_mutex.lock().expect("lock is poisoned");

        loop {
            self.check_abort()?;

            if self.mb_per_sec.load(Acquire) != rate_bits {
                // The sleep was computed against a stale rate; it counts as
                // satisfied and the caller re-evaluates.
                break;
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }

            let (next, _timeout) = self
                .pause_condvar
                .wait_timeout(guard, deadline - now)
                .expect("lock is poisoned");

            guard = next;
        }

        Ok(start.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_check_granularity_follows_rate() {
        let limiter = MergeRateLimiter::new();
        assert_eq!(limiter.min_pause_check_bytes(), MAX_PAUSE_CHECK_BYTES);

        limiter.set_mb_per_sec(1.0);
        assert_eq!(limiter.min_pause_check_bytes(), 26_214);

        limiter.set_mb_per_sec(1_000.0);
        assert_eq!(limiter.min_pause_check_bytes(), MAX_PAUSE_CHECK_BYTES);
    }

    #[test]
    fn unlimited_rate_never_sleeps() {
        let limiter = MergeRateLimiter::new();

        for _ in 0..10 {
            let paused = limiter.pause(10 * 1_024 * 1_024).expect("merge is live");
            assert!(paused < MIN_PAUSE);
        }

        assert_eq!(limiter.total_bytes_written(), 100 * 1_024 * 1_024);
    }

    #[test]
    fn abort_fails_pause() {
        let limiter = MergeRateLimiter::new();
        limiter.abort();

        assert!(matches!(limiter.pause(1), Err(Error::MergeAborted)));
    }
}
