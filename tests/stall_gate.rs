use skriva::StallGate;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::{Duration, Instant};
use test_log::test;

#[test]
fn healthy_gate_returns_immediately() {
    let gate = StallGate::new();

    let start = Instant::now();
    gate.wait_if_stalled();

    assert!(start.elapsed() < Duration::from_millis(100));
    assert!(gate.is_healthy());
    assert!(!gate.any_stalled_threads());
}

#[test]
fn blocked_admitters_wake_on_resume() {
    const ADMITTERS: usize = 4;

    let gate = Arc::new(StallGate::new());
    let released = Arc::new(AtomicUsize::new(0));

    gate.update_stalled(true);

    let handles = (0..ADMITTERS)
        .map(|_| {
            let gate = gate.clone();
            let released = released.clone();

            std::thread::spawn(move || {
                // Re-check and wait again, as the indexing engine does
                while gate.is_stalled() {
                    gate.wait_if_stalled();
                }

                released.fetch_add(1, Ordering::Relaxed);
            })
        })
        .collect::<Vec<_>>();

    // Give the admitters a moment to actually block
    std::thread::sleep(Duration::from_millis(100));
    assert!(gate.any_stalled_threads());
    assert_eq!(released.load(Ordering::Relaxed), 0);

    gate.update_stalled(false);

    for handle in handles {
        handle.join().expect("admitter must not panic");
    }

    assert_eq!(released.load(Ordering::Relaxed), ADMITTERS);
    assert!(!gate.any_stalled_threads());
    assert!(gate.was_stalled());
}

#[test]
fn wait_is_bounded_even_without_a_wake() {
    let gate = StallGate::new();
    gate.update_stalled(true);

    let start = Instant::now();
    gate.wait_if_stalled();
    let elapsed = start.elapsed();

    // The defensive ceiling kicks in after about a second
    assert!(elapsed >= Duration::from_millis(500));
    assert!(elapsed < Duration::from_secs(5));
    assert!(gate.is_stalled());
}

#[test]
fn resume_releases_a_waiter_before_its_ceiling() {
    let gate = Arc::new(StallGate::new());
    gate.update_stalled(true);

    let waiter = {
        let gate = gate.clone();

        std::thread::spawn(move || {
            let start = Instant::now();
            gate.wait_if_stalled();
            start.elapsed()
        })
    };

    std::thread::sleep(Duration::from_millis(100));

    // Healthy transition releases the waiter well before its 1s ceiling
    gate.update_stalled(false);

    let waited = waiter.join().expect("waiter must not panic");
    assert!(waited < Duration::from_millis(900));
}
