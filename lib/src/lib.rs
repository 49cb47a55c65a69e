#![no_std]

//! DriftOS kernel support library.
//!
//! Freestanding building blocks shared by every kernel crate: spinlocks,
//! the kernel log, the monotonic clock, fixed-capacity queues, the counting
//! semaphore and condition variable, and the late-bound collaborator
//! service tables (scheduler, platform timer).

#[cfg(test)]
extern crate std;

pub mod clock;
pub mod condvar;
pub mod cpu;
pub mod kernel_services;
pub mod klog;
pub mod ports;
pub mod preempt;
pub mod queue;
pub mod semaphore;
pub mod spinlock;
pub mod waiters;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use condvar::CondVar;
pub use preempt::{is_preemption_disabled, preempt_count, PreemptGuard};
pub use queue::BoundedQueue;
pub use semaphore::Semaphore;
pub use spinlock::{IrqMutex, IrqMutexGuard, Spinlock, SpinlockGuard};
pub use waiters::WaiterQueue;

#[cfg(test)]
mod test_lock;

#[cfg(test)]
mod condvar_tests;
#[cfg(test)]
mod semaphore_tests;
