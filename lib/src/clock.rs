//! Monotonic millisecond clock.
//!
//! All timeout logic in the stack keys off a single monotonic millisecond
//! counter supplied by the platform timer (HPET main counter in practice).
//!
//! Safe to call from any context (interrupt, kernel thread, syscall
//! handler).  Before the platform services are wired during early boot,
//! every accessor returns `0`.

use crate::kernel_services::platform;

/// Returns the monotonic clock value in milliseconds since boot.
///
/// Returns `0` if platform services are not yet initialized.
#[inline]
pub fn milliseconds() -> u64 {
    platform::milliseconds()
}
