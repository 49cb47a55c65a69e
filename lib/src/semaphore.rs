//! Counting semaphore over the scheduler's block/unblock primitives.
//!
//! The counter and the waiter queue are only ever touched under the value
//! spinlock.  `unlock` hands the permit **directly** to the eldest waiter
//! instead of incrementing the counter: the woken task does not decrement on
//! resume, so a racing `try_lock` cannot steal the permit out from under it.
//!
//! The `irq_*` variants must be used when releasing from an interrupt
//! handler; they wake waiters through the scheduler's deferred-wake hint,
//! which is safe to call with interrupts disabled.

use crate::kernel_services::scheduler;
use crate::spinlock::Spinlock;
use crate::waiters::WaiterQueue;

/// Maximum number of tasks that can sleep on a single semaphore.
const WAITER_CAPACITY: usize = 16;

struct SemaphoreInner {
    value: usize,
    queue: WaiterQueue<WAITER_CAPACITY>,
}

/// A counting semaphore.  The critical section can be open to several
/// processes at once, up to the current counter value.
pub struct Semaphore {
    inner: Spinlock<SemaphoreInner>,
}

impl Semaphore {
    /// Create a semaphore with the given initial counter value.
    pub const fn new(value: usize) -> Self {
        Self {
            inner: Spinlock::new(SemaphoreInner {
                value,
                queue: WaiterQueue::new(),
            }),
        }
    }

    /// Acquire a permit, sleeping until one is available.
    pub fn lock(&self) {
        {
            let mut inner = self.inner.lock();

            if inner.value > 0 {
                inner.value -= 1;
                return;
            }

            // The scheduler is not wired yet; nothing can park.
            if !scheduler::is_initialized() {
                return;
            }

            let pid = scheduler::get_pid();
            if !inner.queue.push(pid) {
                panic!("semaphore: waiter queue overflow");
            }

            scheduler::block_process_light(pid);
        }
        // The value lock is released; the wake may already have happened,
        // in which case reschedule() returns immediately.
        scheduler::reschedule();
    }

    /// Try to acquire a permit without blocking.
    ///
    /// Returns true if a permit was taken.
    pub fn try_lock(&self) -> bool {
        let mut inner = self.inner.lock();

        if inner.value > 0 {
            inner.value -= 1;
            true
        } else {
            false
        }
    }

    /// Release one permit.
    ///
    /// If a task is waiting it is granted the permit directly and the
    /// counter is left untouched.
    pub fn unlock(&self) {
        let mut inner = self.inner.lock();

        match inner.queue.pop() {
            Some(pid) => scheduler::unblock_process(pid),
            None => inner.value += 1,
        }
    }

    /// Release one permit from an IRQ handler.
    ///
    /// TODO: deadlocks if the interrupted context already holds the value
    /// lock on this CPU; callers must ensure that cannot arise.
    pub fn irq_unlock(&self) {
        let mut inner = self.inner.lock();

        match inner.queue.pop() {
            Some(pid) => scheduler::unblock_process_hint(pid),
            None => inner.value += 1,
        }
    }

    /// Release `n` permits, waking up to `n` waiters; any surplus goes to
    /// the counter.
    pub fn release(&self, n: usize) {
        let mut inner = self.inner.lock();

        let mut remaining = n;
        while remaining > 0 {
            match inner.queue.pop() {
                Some(pid) => {
                    scheduler::unblock_process(pid);
                    remaining -= 1;
                }
                None => break,
            }
        }
        inner.value += remaining;
    }

    /// Release `n` permits from an IRQ handler.
    ///
    /// Same caller constraint as [`irq_unlock`](Self::irq_unlock).
    pub fn irq_release(&self, n: usize) {
        let mut inner = self.inner.lock();

        let mut remaining = n;
        while remaining > 0 {
            match inner.queue.pop() {
                Some(pid) => {
                    scheduler::unblock_process_hint(pid);
                    remaining -= 1;
                }
                None => break,
            }
        }
        inner.value += remaining;
    }

    /// Current counter value.
    pub fn value(&self) -> usize {
        self.inner.lock().value
    }

    /// Number of tasks currently parked on the semaphore.
    pub fn waiter_count(&self) -> usize {
        self.inner.lock().queue.len()
    }
}
