//! Condition variable over the scheduler's block/unblock primitives.
//!
//! Waiters park their pid in a bounded FIFO; `notify_one` dequeues the
//! eldest and wakes it.  A waiter that resumes checks whether it is still
//! queued; if it is, the wake was spurious and it goes back to sleep.
//!
//! Timed waits poll the platform clock after every resume.  The scheduler's
//! pending-wakeup flag closes the window between enqueue and park, so a
//! notify that lands in between is not lost.

use crate::clock;
use crate::kernel_services::scheduler::{self, Pid};
use crate::spinlock::IrqMutex;
use crate::waiters::WaiterQueue;

/// Maximum number of tasks that can wait on a single condition variable.
const WAITER_CAPACITY: usize = 16;

pub struct CondVar {
    waiters: IrqMutex<WaiterQueue<WAITER_CAPACITY>>,
}

impl CondVar {
    pub const fn new() -> Self {
        Self {
            waiters: IrqMutex::new(WaiterQueue::new()),
        }
    }

    /// Block the calling task until another task calls
    /// [`notify_one`](Self::notify_one) or [`notify_all`](Self::notify_all).
    pub fn wait(&self) {
        if !scheduler::is_initialized() {
            return;
        }

        let pid = scheduler::get_pid();
        {
            let mut waiters = self.waiters.lock();
            if !waiters.push(pid) {
                panic!("condvar: waiter queue overflow");
            }
        }

        loop {
            scheduler::block_process_light(pid);
            scheduler::reschedule();

            // A notifier removes us from the queue before waking us; still
            // being queued means the wake was spurious.
            if !self.waiters.lock().contains(pid) {
                return;
            }
        }
    }

    /// Block until notified or until `ms` milliseconds have elapsed.
    ///
    /// Returns true if the task was notified, false on timeout.
    pub fn wait_for(&self, ms: u64) -> bool {
        if !scheduler::is_initialized() {
            return false;
        }

        let pid = scheduler::get_pid();
        let deadline = clock::milliseconds().saturating_add(ms);

        {
            let mut waiters = self.waiters.lock();
            if !waiters.push(pid) {
                panic!("condvar: waiter queue overflow");
            }
        }

        loop {
            scheduler::block_process_light(pid);
            scheduler::reschedule();

            let mut waiters = self.waiters.lock();
            if !waiters.contains(pid) {
                return true;
            }
            if clock::milliseconds() >= deadline {
                waiters.remove(pid);
                return false;
            }
        }
    }

    /// Wake the eldest waiter.  No-op when nobody is waiting.
    ///
    /// Returns true if a task was woken.
    pub fn notify_one(&self) -> bool {
        let pid = self.waiters.lock().pop();
        match pid {
            Some(pid) => {
                scheduler::unblock_process(pid);
                true
            }
            None => false,
        }
    }

    /// Wake every waiter.  Returns the number of tasks woken.
    pub fn notify_all(&self) -> usize {
        // Collect under the lock, wake outside it, so the scheduler never
        // runs with the waiter queue held.
        let mut pids = [0 as Pid; WAITER_CAPACITY];
        let mut count = 0usize;
        {
            let mut waiters = self.waiters.lock();
            while let Some(pid) = waiters.pop() {
                pids[count] = pid;
                count += 1;
            }
        }
        for &pid in &pids[..count] {
            scheduler::unblock_process(pid);
        }
        count
    }

    /// Number of tasks currently waiting.
    pub fn waiter_count(&self) -> usize {
        self.waiters.lock().len()
    }

    pub fn has_waiters(&self) -> bool {
        self.waiter_count() > 0
    }
}

impl Default for CondVar {
    fn default() -> Self {
        Self::new()
    }
}
