//! Write-once registration slot for a collaborator service table.

use core::sync::atomic::{AtomicPtr, Ordering};

/// Holds a pointer to a `'static` struct of service function pointers.
///
/// `get()` returns `None` until `set()` has been called, letting wrappers
/// pick a safe fallback during early boot.
pub struct ServiceCell<T: 'static> {
    ptr: AtomicPtr<T>,
}

impl<T: 'static> ServiceCell<T> {
    pub const fn new() -> Self {
        Self {
            ptr: AtomicPtr::new(core::ptr::null_mut()),
        }
    }

    pub fn set(&self, services: &'static T) {
        self.ptr
            .store(services as *const T as *mut T, Ordering::Release);
    }

    pub fn get(&self) -> Option<&'static T> {
        let ptr = self.ptr.load(Ordering::Acquire);
        if ptr.is_null() {
            None
        } else {
            // SAFETY: `set` only stores pointers derived from `&'static T`.
            Some(unsafe { &*ptr })
        }
    }

    pub fn is_set(&self) -> bool {
        !self.ptr.load(Ordering::Acquire).is_null()
    }
}

impl<T: 'static> Default for ServiceCell<T> {
    fn default() -> Self {
        Self::new()
    }
}
