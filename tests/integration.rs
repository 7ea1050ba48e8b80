mod common;

use common::RecordingSink;
use outbound_breaker::{
    ConfigError, HalfOpenMode, HookRegistry, LocalBreaker, State, Transition, TripPolicy,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

fn breaker(policy: TripPolicy, threshold: u32, reset_timeout: Duration, quota: u32) -> LocalBreaker {
    LocalBreaker::builder()
        .name("test")
        .policy(policy)
        .failure_threshold(threshold)
        .reset_timeout(reset_timeout)
        .half_open_probe_quota(quota)
        .build()
        .unwrap()
}

fn trip(breaker: &LocalBreaker, failures: u32) {
    for _ in 0..failures {
        breaker.record(false);
    }
}

#[test]
fn test_starts_closed_and_admits() {
    let breaker = breaker(TripPolicy::TotalFailures, 3, Duration::from_secs(10), 2);

    assert_eq!(breaker.state(), State::Closed);
    assert!(breaker.allow());

    breaker.record(true);
    let snapshot = breaker.snapshot();
    assert_eq!(snapshot.state, State::Closed);
    assert_eq!(snapshot.success_count, 1);
    assert_eq!(snapshot.failure_count, 0);
    // A breaker that never fails never stamps a failure time.
    assert!(snapshot.last_failure_at.is_none());
}

#[test]
fn test_trips_at_threshold_and_refuses() {
    let breaker = breaker(TripPolicy::TotalFailures, 3, Duration::from_secs(10), 1);

    breaker.record(false);
    breaker.record(false);
    assert_eq!(breaker.state(), State::Closed);
    assert!(breaker.snapshot().last_failure_at.is_some());

    breaker.record(false);
    assert_eq!(breaker.state(), State::Open);
    assert!(!breaker.allow());
    assert_eq!(breaker.state(), State::Open);
}

#[test]
fn test_scenario_threshold_three_quota_one() {
    let breaker = breaker(TripPolicy::TotalFailures, 3, Duration::from_millis(100), 1);

    trip(&breaker, 3);
    assert_eq!(breaker.state(), State::Open);

    thread::sleep(Duration::from_millis(150));

    assert!(breaker.allow());
    assert_eq!(breaker.state(), State::HalfOpen);

    breaker.record(true);
    let snapshot = breaker.snapshot();
    assert_eq!(snapshot.state, State::Closed);
    assert_eq!(snapshot.success_count, 0);
    assert_eq!(snapshot.failure_count, 0);
}

#[test]
fn test_half_open_needs_full_quota_to_close() {
    let breaker = breaker(TripPolicy::TotalFailures, 3, Duration::from_millis(100), 2);

    trip(&breaker, 3);
    thread::sleep(Duration::from_millis(150));

    assert!(breaker.allow());
    breaker.record(true);
    assert_eq!(breaker.state(), State::HalfOpen);
    assert_eq!(breaker.snapshot().success_count, 1);

    assert!(breaker.allow());
    breaker.record(true);
    let snapshot = breaker.snapshot();
    assert_eq!(snapshot.state, State::Closed);
    assert_eq!(snapshot.success_count, 0);
    assert_eq!(snapshot.failure_count, 0);
}

#[test]
fn test_allow_before_reset_timeout_stays_open() {
    let breaker = breaker(TripPolicy::TotalFailures, 1, Duration::from_secs(10), 1);

    breaker.record(false);
    for _ in 0..5 {
        assert!(!breaker.allow());
    }
    assert_eq!(breaker.state(), State::Open);
}

#[test]
fn test_allow_that_grants_first_probe_resets_counters() {
    let breaker = breaker(TripPolicy::TotalFailures, 2, Duration::from_millis(50), 3);

    breaker.record(true);
    trip(&breaker, 2);
    let open = breaker.snapshot();
    assert_eq!(open.state, State::Open);
    assert_eq!(open.failure_count, 2);
    assert_eq!(open.success_count, 1);

    thread::sleep(Duration::from_millis(100));
    assert!(breaker.allow());

    let half_open = breaker.snapshot();
    assert_eq!(half_open.state, State::HalfOpen);
    assert_eq!(half_open.failure_count, 0);
    assert_eq!(half_open.success_count, 0);
}

#[test]
fn test_failed_probe_reopens_without_partial_credit() {
    let breaker = breaker(TripPolicy::TotalFailures, 5, Duration::from_millis(50), 3);

    trip(&breaker, 5);
    thread::sleep(Duration::from_millis(100));
    assert!(breaker.allow());

    breaker.record(true);
    breaker.record(true);
    assert_eq!(breaker.snapshot().success_count, 2);

    breaker.record(false);
    assert_eq!(breaker.state(), State::Open);
    // The re-opened window starts from the failed probe.
    assert!(!breaker.allow());
}

#[test]
fn test_consecutive_policy_success_breaks_the_run() {
    let breaker = breaker(TripPolicy::ConsecutiveFailures, 3, Duration::from_secs(10), 1);

    trip(&breaker, 2);
    breaker.record(true);
    assert_eq!(breaker.snapshot().failure_count, 0);
    trip(&breaker, 2);
    assert_eq!(breaker.state(), State::Closed);

    breaker.record(false);
    assert_eq!(breaker.state(), State::Open);
}

#[test]
fn test_total_policy_keeps_counting_across_successes() {
    let breaker = breaker(TripPolicy::TotalFailures, 3, Duration::from_secs(10), 1);

    trip(&breaker, 2);
    breaker.record(true);
    assert_eq!(breaker.snapshot().failure_count, 2);
    breaker.record(false);
    assert_eq!(breaker.state(), State::Open);
}

#[test]
fn test_late_results_while_open_do_not_change_state() {
    let breaker = breaker(TripPolicy::TotalFailures, 1, Duration::from_secs(10), 1);

    breaker.record(false);
    let frozen = breaker.snapshot().failure_count;

    breaker.record(true);
    breaker.record(false);
    let snapshot = breaker.snapshot();
    assert_eq!(snapshot.state, State::Open);
    assert_eq!(snapshot.failure_count, frozen);
}

#[test]
fn test_scheduled_mode_half_opens_without_polling() {
    let breaker = LocalBreaker::builder()
        .failure_threshold(1)
        .reset_timeout(Duration::from_millis(50))
        .half_open_mode(HalfOpenMode::Scheduled)
        .build()
        .unwrap();

    breaker.record(false);
    assert_eq!(breaker.state(), State::Open);

    thread::sleep(Duration::from_millis(250));
    assert_eq!(breaker.state(), State::HalfOpen);
    assert!(breaker.allow());
}

#[test]
fn test_scheduled_mode_rearms_after_failed_probe() {
    let breaker = LocalBreaker::builder()
        .failure_threshold(1)
        .reset_timeout(Duration::from_millis(50))
        .half_open_mode(HalfOpenMode::Scheduled)
        .build()
        .unwrap();

    breaker.record(false);
    thread::sleep(Duration::from_millis(250));
    assert_eq!(breaker.state(), State::HalfOpen);

    breaker.record(false);
    assert_eq!(breaker.state(), State::Open);

    thread::sleep(Duration::from_millis(250));
    assert_eq!(breaker.state(), State::HalfOpen);
}

#[test]
fn test_scheduled_mode_does_not_fire_early() {
    let breaker = LocalBreaker::builder()
        .failure_threshold(1)
        .reset_timeout(Duration::from_secs(10))
        .half_open_mode(HalfOpenMode::Scheduled)
        .build()
        .unwrap();

    breaker.record(false);
    thread::sleep(Duration::from_millis(100));
    assert_eq!(breaker.state(), State::Open);
    assert!(!breaker.allow());
}

#[test]
fn test_scheduled_mode_fires_once_per_open_window() {
    let sink = Arc::new(RecordingSink::default());
    let breaker = LocalBreaker::builder()
        .name("single-slot")
        .failure_threshold(1)
        .reset_timeout(Duration::from_millis(200))
        .half_open_mode(HalfOpenMode::Scheduled)
        .shared_metric_sink(sink.clone())
        .build()
        .unwrap();

    // Late failures while OPEN push the deadline out without re-arming.
    breaker.record(false);
    thread::sleep(Duration::from_millis(80));
    breaker.record(false);
    thread::sleep(Duration::from_millis(80));
    breaker.record(false);

    thread::sleep(Duration::from_millis(100));
    assert_eq!(breaker.state(), State::Open);

    thread::sleep(Duration::from_millis(300));
    assert_eq!(breaker.state(), State::HalfOpen);

    // Failed probe: a second window, promoted exactly once more.
    breaker.record(false);
    thread::sleep(Duration::from_millis(400));
    assert_eq!(breaker.state(), State::HalfOpen);
    thread::sleep(Duration::from_millis(300));

    let half_opened = sink
        .transitions()
        .iter()
        .filter(|(_, from, to)| *from == State::Open && *to == State::HalfOpen)
        .count();
    assert_eq!(half_opened, 2);
    assert_eq!(
        sink.transitions(),
        vec![
            ("single-slot".to_string(), State::Closed, State::Open),
            ("single-slot".to_string(), State::Open, State::HalfOpen),
            ("single-slot".to_string(), State::HalfOpen, State::Open),
            ("single-slot".to_string(), State::Open, State::HalfOpen),
        ]
    );
}

#[cfg(target_os = "linux")]
fn thread_running(comm: &str) -> bool {
    std::fs::read_dir("/proc/self/task")
        .map(|tasks| {
            tasks.filter_map(Result::ok).any(|task| {
                std::fs::read_to_string(task.path().join("comm"))
                    .map(|name| name.trim() == comm)
                    .unwrap_or(false)
            })
        })
        .unwrap_or(false)
}

#[cfg(target_os = "linux")]
#[test]
fn test_scheduled_mode_survives_unbounded_reset_timeout() {
    let breaker = LocalBreaker::builder()
        .name("maxwait")
        .failure_threshold(1)
        .reset_timeout(Duration::MAX)
        .half_open_mode(HalfOpenMode::Scheduled)
        .build()
        .unwrap();
    // Thread names are cut to 15 bytes by the kernel.
    let watcher = "maxwait-half-op";

    breaker.record(false);
    thread::sleep(Duration::from_millis(100));
    assert!(thread_running(watcher));
    assert_eq!(breaker.state(), State::Open);
    assert!(!breaker.allow());

    drop(breaker);
    thread::sleep(Duration::from_millis(1500));
    assert!(!thread_running(watcher));
}

#[test]
fn test_hooks_and_sink_see_every_transition() {
    let hooks = HookRegistry::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let opened = Arc::new(AtomicUsize::new(0));
    let refused = Arc::new(AtomicUsize::new(0));

    let seen_hook = Arc::clone(&seen);
    hooks.set_on_transition(move |transition| seen_hook.lock().unwrap().push(transition));
    let opened_hook = Arc::clone(&opened);
    hooks.set_on_open(move || {
        opened_hook.fetch_add(1, Ordering::SeqCst);
    });
    let refused_hook = Arc::clone(&refused);
    hooks.set_on_refused(move || {
        refused_hook.fetch_add(1, Ordering::SeqCst);
    });

    let sink = Arc::new(RecordingSink::default());
    let breaker = LocalBreaker::builder()
        .name("payments")
        .failure_threshold(1)
        .reset_timeout(Duration::from_millis(50))
        .hooks(hooks)
        .shared_metric_sink(sink.clone())
        .build()
        .unwrap();

    breaker.record(false);
    assert!(!breaker.allow());
    thread::sleep(Duration::from_millis(100));
    assert!(breaker.allow());
    breaker.record(true);

    assert_eq!(opened.load(Ordering::SeqCst), 1);
    assert_eq!(refused.load(Ordering::SeqCst), 1);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            Transition { from: State::Closed, to: State::Open },
            Transition { from: State::Open, to: State::HalfOpen },
            Transition { from: State::HalfOpen, to: State::Closed },
        ]
    );
    assert_eq!(
        sink.transitions(),
        vec![
            ("payments".to_string(), State::Closed, State::Open),
            ("payments".to_string(), State::Open, State::HalfOpen),
            ("payments".to_string(), State::HalfOpen, State::Closed),
        ]
    );
}

#[test]
fn test_hooks_may_read_the_breaker() {
    let hooks = HookRegistry::new();
    let slot: Arc<Mutex<Option<LocalBreaker>>> = Arc::new(Mutex::new(None));
    let observed = Arc::new(Mutex::new(None));

    let hook_slot = Arc::clone(&slot);
    let hook_observed = Arc::clone(&observed);
    hooks.set_on_open(move || {
        if let Some(breaker) = hook_slot.lock().unwrap().as_ref() {
            *hook_observed.lock().unwrap() = Some(breaker.state());
        }
    });

    let breaker = LocalBreaker::builder()
        .failure_threshold(1)
        .hooks(hooks)
        .build()
        .unwrap();
    *slot.lock().unwrap() = Some(breaker.clone());

    breaker.record(false);
    assert_eq!(*observed.lock().unwrap(), Some(State::Open));
}

#[test]
fn test_concurrent_records_are_not_torn() {
    let breaker = breaker(TripPolicy::TotalFailures, 10_000, Duration::from_secs(10), 1);
    let mut handles = Vec::new();

    for _ in 0..8 {
        let breaker = breaker.clone();
        handles.push(thread::spawn(move || {
            for i in 0..250 {
                assert!(breaker.allow());
                breaker.record(i % 2 == 0);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let snapshot = breaker.snapshot();
    assert_eq!(snapshot.state, State::Closed);
    assert_eq!(snapshot.failure_count, 8 * 125);
    assert_eq!(snapshot.success_count, 8 * 125);
}

#[test]
fn test_concurrent_failures_trip_exactly_once() {
    let sink = Arc::new(RecordingSink::default());
    let breaker = LocalBreaker::builder()
        .failure_threshold(50)
        .reset_timeout(Duration::from_secs(10))
        .shared_metric_sink(sink.clone())
        .build()
        .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let breaker = breaker.clone();
            thread::spawn(move || {
                for _ in 0..100 {
                    breaker.record(false);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(breaker.state(), State::Open);
    assert_eq!(breaker.snapshot().failure_count, 50);
    assert_eq!(sink.transitions().len(), 1);
}

#[test]
fn test_builder_rejects_zero_values() {
    assert!(matches!(
        LocalBreaker::builder().failure_threshold(0).build(),
        Err(ConfigError::ZeroFailureThreshold)
    ));
    assert!(matches!(
        LocalBreaker::builder().half_open_probe_quota(0).build(),
        Err(ConfigError::ZeroProbeQuota)
    ));
}

#[test]
fn test_builder_defaults() {
    let breaker = LocalBreaker::builder().build().unwrap();

    assert_eq!(breaker.name(), "default");
    assert_eq!(breaker.policy(), TripPolicy::TotalFailures);
    trip(&breaker, 4);
    assert_eq!(breaker.state(), State::Closed);
    breaker.record(false);
    assert_eq!(breaker.state(), State::Open);
}
