use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

use crate::cpu;
use crate::preempt::PreemptGuard;

/// Plain spinlock.  Does **not** touch the interrupt flag; use it only for
/// state that is never reached from interrupt context (e.g. the semaphore's
/// value lock, whose IRQ entry points document their own constraint).
pub struct Spinlock<T> {
    lock: AtomicBool,
    data: UnsafeCell<T>,
}

// SAFETY: Spinlock provides exclusive access through atomic locking.
unsafe impl<T: Send> Send for Spinlock<T> {}
unsafe impl<T: Send> Sync for Spinlock<T> {}

pub struct SpinlockGuard<'a, T> {
    lock: &'a Spinlock<T>,
}

impl<T> Spinlock<T> {
    #[inline]
    pub const fn new(data: T) -> Self {
        Self {
            lock: AtomicBool::new(false),
            data: UnsafeCell::new(data),
        }
    }

    #[inline]
    pub fn lock(&self) -> SpinlockGuard<'_, T> {
        while self
            .lock
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            cpu::pause();
        }
        SpinlockGuard { lock: self }
    }

    #[inline]
    pub fn try_lock(&self) -> Option<SpinlockGuard<'_, T>> {
        if self
            .lock
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(SpinlockGuard { lock: self })
        } else {
            None
        }
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.lock.load(Ordering::Relaxed)
    }
}

impl<'a, T> Deref for SpinlockGuard<'a, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T> DerefMut for SpinlockGuard<'a, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<'a, T> Drop for SpinlockGuard<'a, T> {
    #[inline]
    fn drop(&mut self) {
        self.lock.lock.store(false, Ordering::Release);
    }
}

/// Saved interrupt and preemption state, restored on drop.
struct IrqOff {
    flags: u64,
    _preempt: PreemptGuard,
}

impl IrqOff {
    #[inline]
    fn enter() -> Self {
        let preempt = PreemptGuard::new();
        Self {
            flags: cpu::save_flags_cli(),
            _preempt: preempt,
        }
    }
}

impl Drop for IrqOff {
    #[inline]
    fn drop(&mut self) {
        cpu::restore_flags(self.flags);
        // Preemption re-enables after interrupts are back on.
    }
}

/// A [`Spinlock`] whose critical sections run with interrupts and
/// preemption disabled.
///
/// Required for any state an interrupt handler can reach: a handler
/// spinning on a lock its own CPU already holds would never make progress.
pub struct IrqMutex<T> {
    inner: Spinlock<T>,
}

pub struct IrqMutexGuard<'a, T> {
    // Field order is load-bearing: the spinlock must release before
    // `_irq` turns interrupts back on.
    inner: SpinlockGuard<'a, T>,
    _irq: IrqOff,
}

impl<T> IrqMutex<T> {
    #[inline]
    pub const fn new(data: T) -> Self {
        Self {
            inner: Spinlock::new(data),
        }
    }

    #[inline]
    pub fn lock(&self) -> IrqMutexGuard<'_, T> {
        let irq = IrqOff::enter();
        IrqMutexGuard {
            inner: self.inner.lock(),
            _irq: irq,
        }
    }

    #[inline]
    pub fn try_lock(&self) -> Option<IrqMutexGuard<'_, T>> {
        let irq = IrqOff::enter();
        // On failure `irq` drops here and the saved state is restored.
        self.inner.try_lock().map(|inner| IrqMutexGuard {
            inner,
            _irq: irq,
        })
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}

impl<'a, T> Deref for IrqMutexGuard<'a, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<'a, T> DerefMut for IrqMutexGuard<'a, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}
