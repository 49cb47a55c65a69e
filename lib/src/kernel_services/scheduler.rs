//! Scheduler services consumed by the blocking primitives.
//!
//! The scheduler identifies tasks by an opaque process id.  A blocked waiter
//! is parked with [`block_process_light`] (marked blocked but still runnable
//! until the next [`reschedule`]) and released with [`unblock_process`], or
//! with [`unblock_process_hint`] from interrupt context, which defers the
//! actual wake to the scheduler's next convenient point.

use super::ServiceCell;

/// Opaque process identifier supplied by the scheduler.
pub type Pid = u32;

pub struct SchedulerServices {
    pub current_pid: fn() -> Pid,
    pub block_process_light: fn(Pid),
    pub unblock_process: fn(Pid),
    pub unblock_process_hint: fn(Pid),
    pub reschedule: fn(),
}

static SCHEDULER: ServiceCell<SchedulerServices> = ServiceCell::new();

/// Register the scheduler service table.  Called once during kernel boot.
pub fn register_scheduler_services(services: &'static SchedulerServices) {
    SCHEDULER.set(services);
}

/// `true` once the scheduler has been wired.  Blocking primitives check this
/// before parking so early-boot callers fall through instead of hanging.
#[inline]
pub fn is_initialized() -> bool {
    SCHEDULER.is_set()
}

#[inline]
pub fn get_pid() -> Pid {
    match SCHEDULER.get() {
        Some(s) => (s.current_pid)(),
        None => 0,
    }
}

#[inline]
pub fn block_process_light(pid: Pid) {
    if let Some(s) = SCHEDULER.get() {
        (s.block_process_light)(pid);
    }
}

#[inline]
pub fn unblock_process(pid: Pid) {
    if let Some(s) = SCHEDULER.get() {
        (s.unblock_process)(pid);
    }
}

/// Deferred wake, safe from interrupt context.
#[inline]
pub fn unblock_process_hint(pid: Pid) {
    if let Some(s) = SCHEDULER.get() {
        (s.unblock_process_hint)(pid);
    }
}

#[inline]
pub fn reschedule() {
    if let Some(s) = SCHEDULER.get() {
        (s.reschedule)();
    }
}
