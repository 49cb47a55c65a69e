//! Mock collaborator services for host unit tests.
//!
//! Installs a scheduler whose block/unblock entry points record their call
//! sequence instead of context-switching, and a millisecond clock that tests
//! can set directly or let auto-advance by a fixed step per query (so
//! timeout/retry loops terminate deterministically in a single thread).

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::kernel_services::platform::{register_platform_services, PlatformServices};
use crate::kernel_services::scheduler::{register_scheduler_services, Pid, SchedulerServices};
use crate::spinlock::IrqMutex;
use crate::waiters::WaiterQueue;

const LOG_CAPACITY: usize = 64;

static CURRENT_PID: AtomicU32 = AtomicU32::new(1);
static BLOCK_COUNT: AtomicU32 = AtomicU32::new(0);
static UNBLOCKS: IrqMutex<WaiterQueue<LOG_CAPACITY>> = IrqMutex::new(WaiterQueue::new());
static HINTS: IrqMutex<WaiterQueue<LOG_CAPACITY>> = IrqMutex::new(WaiterQueue::new());

static NOW_MS: AtomicU64 = AtomicU64::new(0);
static STEP_MS: AtomicU64 = AtomicU64::new(0);

fn mock_current_pid() -> Pid {
    CURRENT_PID.load(Ordering::Relaxed)
}

fn mock_block_process_light(_pid: Pid) {
    BLOCK_COUNT.fetch_add(1, Ordering::Relaxed);
}

fn mock_unblock_process(pid: Pid) {
    let _ = UNBLOCKS.lock().push(pid);
}

fn mock_unblock_process_hint(pid: Pid) {
    let _ = HINTS.lock().push(pid);
}

fn mock_reschedule() {}

fn mock_milliseconds() -> u64 {
    NOW_MS.fetch_add(STEP_MS.load(Ordering::Relaxed), Ordering::Relaxed)
}

static MOCK_SCHEDULER: SchedulerServices = SchedulerServices {
    current_pid: mock_current_pid,
    block_process_light: mock_block_process_light,
    unblock_process: mock_unblock_process,
    unblock_process_hint: mock_unblock_process_hint,
    reschedule: mock_reschedule,
};

static MOCK_PLATFORM: PlatformServices = PlatformServices {
    milliseconds: mock_milliseconds,
};

/// Register the mock services and reset their recorded state.
pub fn install() {
    register_scheduler_services(&MOCK_SCHEDULER);
    register_platform_services(&MOCK_PLATFORM);
    reset();
}

/// Reset recorded state without re-registering.
pub fn reset() {
    CURRENT_PID.store(1, Ordering::Relaxed);
    BLOCK_COUNT.store(0, Ordering::Relaxed);
    UNBLOCKS.lock().clear();
    HINTS.lock().clear();
    NOW_MS.store(0, Ordering::Relaxed);
    STEP_MS.store(0, Ordering::Relaxed);
}

/// Set the pid the mock scheduler reports for the current task.
pub fn set_current_pid(pid: Pid) {
    CURRENT_PID.store(pid, Ordering::Relaxed);
}

/// Set the mock clock to an absolute value.
pub fn set_time_ms(ms: u64) {
    NOW_MS.store(ms, Ordering::Relaxed);
}

/// Make every clock query advance time by `step` milliseconds.
/// A step of 0 freezes the clock.
pub fn set_time_step(step: u64) {
    STEP_MS.store(step, Ordering::Relaxed);
}

/// Number of `block_process_light` calls since the last reset.
pub fn block_count() -> u32 {
    BLOCK_COUNT.load(Ordering::Relaxed)
}

/// Pop the oldest recorded `unblock_process` pid.
pub fn pop_unblock() -> Option<Pid> {
    UNBLOCKS.lock().pop()
}

/// Pop the oldest recorded `unblock_process_hint` pid.
pub fn pop_unblock_hint() -> Option<Pid> {
    HINTS.lock().pop()
}
