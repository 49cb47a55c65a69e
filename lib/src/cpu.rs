//! Low-level CPU helpers used by the locking primitives.
//!
//! On the freestanding kernel target these wrap the real instructions.  On
//! hosted builds (unit tests) there is no interrupt flag to manipulate, so
//! the irqsave/irqrestore pair degenerates to no-ops and the lock paths can
//! run under the standard test harness.

#[cfg(target_os = "none")]
use core::arch::asm;

#[inline(always)]
pub fn pause() {
    core::hint::spin_loop();
}

/// Save RFLAGS and disable interrupts (irqsave pattern).
/// Returns the saved RFLAGS value.
#[cfg(target_os = "none")]
#[inline(always)]
pub fn save_flags_cli() -> u64 {
    let flags: u64;
    unsafe {
        asm!(
            "pushfq",
            "pop {}",
            "cli",
            out(reg) flags,
            options(nomem)
        );
    }
    flags
}

/// Restore the interrupt flag from saved RFLAGS (irqrestore pattern).
/// Only re-enables interrupts if they were enabled in the saved flags.
#[cfg(target_os = "none")]
#[inline(always)]
pub fn restore_flags(flags: u64) {
    // IF is bit 9.
    if flags & (1 << 9) != 0 {
        unsafe {
            asm!("sti", options(nomem, nostack));
        }
    }
}

#[cfg(not(target_os = "none"))]
#[inline(always)]
pub fn save_flags_cli() -> u64 {
    0
}

#[cfg(not(target_os = "none"))]
#[inline(always)]
pub fn restore_flags(_flags: u64) {}
