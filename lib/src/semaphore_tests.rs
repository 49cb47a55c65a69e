//! Semaphore tests: counting, direct permit hand-off, FIFO wake order,
//! and the IRQ release variants.

use crate::semaphore::Semaphore;
use crate::test_lock;
use crate::test_support;

#[test]
fn counting_without_contention() {
    let _g = test_lock::guard();
    test_support::install();

    let sem = Semaphore::new(2);
    sem.lock();
    sem.lock();
    assert_eq!(sem.value(), 0);

    sem.unlock();
    sem.unlock();
    assert_eq!(sem.value(), 2);
    assert_eq!(sem.waiter_count(), 0);
}

#[test]
fn try_lock_takes_and_refuses() {
    let _g = test_lock::guard();
    test_support::install();

    let sem = Semaphore::new(1);
    assert!(sem.try_lock());
    assert!(!sem.try_lock());
    sem.unlock();
    assert!(sem.try_lock());
}

#[test]
fn lock_on_empty_semaphore_parks_the_caller() {
    let _g = test_lock::guard();
    test_support::install();

    let sem = Semaphore::new(0);
    test_support::set_current_pid(42);
    sem.lock();

    assert_eq!(sem.waiter_count(), 1);
    assert_eq!(test_support::block_count(), 1);
    assert_eq!(sem.value(), 0);
}

#[test]
fn unlock_hands_permit_directly_to_waiter() {
    let _g = test_lock::guard();
    test_support::install();

    let sem = Semaphore::new(0);
    test_support::set_current_pid(9);
    sem.lock();

    sem.unlock();
    assert_eq!(test_support::pop_unblock(), Some(9));
    // Direct hand-off: the woken task owns the permit, the counter must
    // not have been incremented.
    assert_eq!(sem.value(), 0);
    assert_eq!(sem.waiter_count(), 0);

    // With nobody waiting, unlock credits the counter instead.
    sem.unlock();
    assert_eq!(sem.value(), 1);
}

#[test]
fn waiters_wake_in_fifo_order() {
    let _g = test_lock::guard();
    test_support::install();

    let sem = Semaphore::new(0);
    for pid in [1, 2, 3] {
        test_support::set_current_pid(pid);
        sem.lock();
    }
    assert_eq!(sem.waiter_count(), 3);

    sem.unlock();
    sem.unlock();
    sem.unlock();

    assert_eq!(test_support::pop_unblock(), Some(1));
    assert_eq!(test_support::pop_unblock(), Some(2));
    assert_eq!(test_support::pop_unblock(), Some(3));
    assert_eq!(test_support::pop_unblock(), None);
}

#[test]
fn release_wakes_waiters_and_credits_surplus() {
    let _g = test_lock::guard();
    test_support::install();

    let sem = Semaphore::new(0);
    for pid in [5, 6] {
        test_support::set_current_pid(pid);
        sem.lock();
    }

    sem.release(5);

    assert_eq!(test_support::pop_unblock(), Some(5));
    assert_eq!(test_support::pop_unblock(), Some(6));
    assert_eq!(sem.value(), 3);
    assert_eq!(sem.waiter_count(), 0);
}

#[test]
fn irq_variants_use_the_deferred_wake_hint() {
    let _g = test_lock::guard();
    test_support::install();

    let sem = Semaphore::new(0);
    test_support::set_current_pid(11);
    sem.lock();
    test_support::set_current_pid(12);
    sem.lock();

    sem.irq_unlock();
    assert_eq!(test_support::pop_unblock_hint(), Some(11));
    assert_eq!(test_support::pop_unblock(), None);

    sem.irq_release(3);
    assert_eq!(test_support::pop_unblock_hint(), Some(12));
    assert_eq!(sem.value(), 2);
}
