//! Condition variable tests: notify semantics, timed waits, and
//! wake-up of a parked waiter from another thread.

use std::thread;

use crate::condvar::CondVar;
use crate::test_lock;
use crate::test_support;

#[test]
fn notify_without_waiters_is_a_noop() {
    let _g = test_lock::guard();
    test_support::install();

    let cv = CondVar::new();
    assert!(!cv.notify_one());
    assert_eq!(cv.notify_all(), 0);
    assert_eq!(test_support::pop_unblock(), None);
}

#[test]
fn wait_for_times_out() {
    let _g = test_lock::guard();
    test_support::install();
    test_support::set_time_step(1);

    let cv = CondVar::new();
    assert!(!cv.wait_for(50));
    // The timed-out waiter must have removed itself from the queue.
    assert_eq!(cv.waiter_count(), 0);
    assert!(test_support::block_count() > 0);
}

#[test]
fn wait_is_released_by_notify_one() {
    let _g = test_lock::guard();
    test_support::install();
    test_support::set_current_pid(21);

    let cv = CondVar::new();
    thread::scope(|s| {
        let waiter = s.spawn(|| cv.wait());
        while !cv.has_waiters() {
            thread::yield_now();
        }
        cv.notify_one();
        waiter.join().unwrap();
    });

    assert_eq!(test_support::pop_unblock(), Some(21));
    assert_eq!(cv.waiter_count(), 0);
}

#[test]
fn wait_for_is_released_by_notify_one() {
    let _g = test_lock::guard();
    test_support::install();
    test_support::set_current_pid(22);
    // Frozen clock: the deadline can never pass, so a true return proves
    // the notification (not the timeout) released the waiter.
    test_support::set_time_step(0);

    let cv = CondVar::new();
    thread::scope(|s| {
        let waiter = s.spawn(|| cv.wait_for(10_000));
        while !cv.has_waiters() {
            thread::yield_now();
        }
        cv.notify_one();
        assert!(waiter.join().unwrap());
    });
}

#[test]
fn notify_all_wakes_every_waiter() {
    let _g = test_lock::guard();
    test_support::install();

    let cv = CondVar::new();
    thread::scope(|s| {
        test_support::set_current_pid(31);
        let a = s.spawn(|| cv.wait());
        while cv.waiter_count() < 1 {
            thread::yield_now();
        }
        test_support::set_current_pid(32);
        let b = s.spawn(|| cv.wait());
        while cv.waiter_count() < 2 {
            thread::yield_now();
        }

        assert_eq!(cv.notify_all(), 2);
        a.join().unwrap();
        b.join().unwrap();
    });

    assert_eq!(test_support::pop_unblock(), Some(31));
    assert_eq!(test_support::pop_unblock(), Some(32));
}
