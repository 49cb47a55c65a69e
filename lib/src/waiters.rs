//! Queue of parked tasks.
//!
//! The semaphore and the condition variable both park callers in arrival
//! order and wake the eldest first.  A primitive only ever holds a handful
//! of waiters, so the queue is a plain array kept compact by shifting:
//! that keeps removal by pid (a timed-out waiter pulling itself out) as
//! cheap as the FIFO operations.

use crate::kernel_services::scheduler::Pid;

/// Fixed-capacity FIFO of parked task ids.
pub struct WaiterQueue<const N: usize> {
    pids: [Pid; N],
    len: usize,
}

impl<const N: usize> WaiterQueue<N> {
    pub const fn new() -> Self {
        Self {
            pids: [0; N],
            len: 0,
        }
    }

    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub const fn is_full(&self) -> bool {
        self.len == N
    }

    /// Park `pid` at the back.  Fails when the queue is full.
    #[must_use]
    pub fn push(&mut self, pid: Pid) -> bool {
        if self.len == N {
            return false;
        }
        self.pids[self.len] = pid;
        self.len += 1;
        true
    }

    /// Take the eldest waiter.
    pub fn pop(&mut self) -> Option<Pid> {
        if self.len == 0 {
            return None;
        }
        let pid = self.pids[0];
        self.pids.copy_within(1..self.len, 0);
        self.len -= 1;
        Some(pid)
    }

    /// `true` if `pid` is still parked.
    pub fn contains(&self, pid: Pid) -> bool {
        self.pids[..self.len].contains(&pid)
    }

    /// Pull `pid` out of the queue, wherever it sits.  Everyone behind it
    /// keeps their relative order.
    pub fn remove(&mut self, pid: Pid) -> bool {
        match self.pids[..self.len].iter().position(|&p| p == pid) {
            Some(at) => {
                self.pids.copy_within(at + 1..self.len, at);
                self.len -= 1;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}

impl<const N: usize> Default for WaiterQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}
