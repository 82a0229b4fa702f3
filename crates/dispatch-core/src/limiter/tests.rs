//! Tests for RateLimiter under contention and live reconfiguration.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::*;

const SEC: Duration = Duration::from_secs(1);

/// Hammer `take()` from `threads` threads, `per_thread` calls each; returns admitted count.
fn contend<C: Clock + 'static>(limiter: &Arc<RateLimiter<C>>, threads: usize, per_thread: usize) -> u64 {
    let admitted = Arc::new(AtomicU64::new(0));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let limiter = Arc::clone(limiter);
            let admitted = Arc::clone(&admitted);
            std::thread::spawn(move || {
                for _ in 0..per_thread {
                    if limiter.take().is_ok() {
                        admitted.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    admitted.load(Ordering::Relaxed)
}

#[test]
fn zero_interval_is_rejected() {
    assert_eq!(RateLimiter::new(Duration::ZERO, 1).unwrap_err(), LimiterError::ZeroInterval);
    let l = RateLimiter::new(SEC, 1).unwrap();
    assert_eq!(l.set_limit(Duration::ZERO, 5), Err(LimiterError::ZeroInterval));
    assert_eq!(l.config(), (SEC, 1));
}

#[test]
fn one_per_second_window() {
    let clock = ManualClock::new();
    let l = RateLimiter::with_clock(SEC, 1, clock.clone()).unwrap();
    assert!(l.take().is_ok());
    let denied = l.take().unwrap_err();
    assert_eq!(denied.retry_after, SEC);
    clock.advance(Duration::from_millis(999));
    assert_eq!(l.take().unwrap_err().retry_after, Duration::from_millis(1));
    clock.advance(Duration::from_millis(1));
    assert!(l.take().is_ok());
    assert!(l.take().is_err());
}

#[test]
fn refill_aligned_windows_admit_limit() {
    let clock = ManualClock::new();
    let l = Arc::new(RateLimiter::with_clock(SEC, 1, clock.clone()).unwrap());

    assert_eq!(contend(&l, 16, 500), 1);
    clock.advance(Duration::from_millis(500));
    assert_eq!(contend(&l, 16, 500), 0);
    clock.advance(Duration::from_millis(500));
    assert_eq!(contend(&l, 16, 500), 1);

    l.set_limit(SEC, 2).unwrap();
    assert_eq!(l.config(), (SEC, 2));
    assert_eq!(contend(&l, 16, 500), 0, "reconfiguration must not grant tokens");

    for _ in 0..5 {
        clock.advance(SEC);
        assert_eq!(contend(&l, 16, 500), 2);
    }
    clock.advance(Duration::from_millis(500));
    assert_eq!(contend(&l, 16, 500), 1);
}

#[test]
fn sliding_window_admits_burst_plus_accrual() {
    let clock = ManualClock::new();
    let l = RateLimiter::with_clock(SEC, 2, clock.clone()).unwrap();
    assert!(l.take().is_ok());
    assert!(l.take().is_ok());
    clock.advance(Duration::from_millis(500));
    // 2 + floor(0.5s * 2 / 1s) = 3 inside [0, 500ms].
    assert!(l.take().is_ok());
    assert!(l.take().is_err());
    clock.advance(Duration::from_millis(499));
    assert!(l.take().is_err());
}

#[test]
fn lowering_limit_caps_available() {
    let clock = ManualClock::new();
    let l = RateLimiter::with_clock(SEC, 10, clock.clone()).unwrap();
    assert_eq!(l.available(), 10);
    l.set_limit(SEC, 3).unwrap();
    assert_eq!(l.available(), 3);
    clock.advance(Duration::from_secs(30));
    assert_eq!(l.available(), 3);
}

#[test]
fn raising_limit_keeps_current_tokens() {
    let clock = ManualClock::new();
    let l = RateLimiter::with_clock(SEC, 2, clock.clone()).unwrap();
    l.take().unwrap();
    l.set_limit(SEC, 5).unwrap();
    assert_eq!(l.available(), 1);
    clock.advance(Duration::from_millis(400));
    assert_eq!(l.available(), 3);
}

#[test]
fn reconfiguration_races_with_take_stay_within_bounds() {
    let clock = ManualClock::new();
    let l = Arc::new(RateLimiter::with_clock(SEC, 4, clock.clone()).unwrap());
    let admitted = Arc::new(AtomicU64::new(0));
    let takers: Vec<_> = (0..8)
        .map(|_| {
            let l = Arc::clone(&l);
            let admitted = Arc::clone(&admitted);
            std::thread::spawn(move || {
                for _ in 0..2000 {
                    if l.take().is_ok() {
                        admitted.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();
    let tuner = {
        let l = Arc::clone(&l);
        std::thread::spawn(move || {
            for i in 0..200u64 {
                l.set_limit(SEC, 1 + i % 4).unwrap();
                let (interval, limit) = l.config();
                assert_eq!(interval, SEC);
                assert!((1..=4).contains(&limit));
            }
        })
    };
    for h in takers {
        h.join().unwrap();
    }
    tuner.join().unwrap();
    // Clock never moved: only the initial 4 tokens could ever be granted.
    assert!(admitted.load(Ordering::Relaxed) <= 4);
    assert!(l.available() <= l.config().1);
}

#[test]
fn real_clock_tight_loop_respects_rate() {
    let interval = Duration::from_millis(200);
    let started = Instant::now();
    let l = Arc::new(RateLimiter::new(interval, 1).unwrap());
    let deadline = started + Duration::from_millis(700);
    let admitted = Arc::new(AtomicU64::new(0));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let l = Arc::clone(&l);
            let admitted = Arc::clone(&admitted);
            std::thread::spawn(move || {
                while Instant::now() < deadline {
                    if l.take().is_ok() {
                        admitted.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    let elapsed = started.elapsed();
    let ceiling = 1 + (elapsed.as_nanos() / interval.as_nanos()) as u64;
    let got = admitted.load(Ordering::Relaxed);
    assert!(got >= 1);
    assert!(got <= ceiling, "admitted {} in {:?}, ceiling {}", got, elapsed, ceiling);
}
