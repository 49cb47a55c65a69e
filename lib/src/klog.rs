//! Kernel log.
//!
//! Log lines are filtered by a global severity threshold and handed to a
//! single sink.  The sink is late-bound like every other collaborator in
//! this crate: the serial driver registers one once it is ready.  Until
//! then, freestanding builds push the line straight out COM1 so early boot
//! stays visible, and hosted builds (unit tests) drop it.
//!
//! The sink owns line framing.  It must write the formatted text plus a
//! trailing newline under one lock acquisition, so lines from different
//! CPUs cannot interleave.  Callers never put a newline in the format
//! string.

use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};

use crate::kernel_services::ServiceCell;

/// Log severity, most severe first.  A line is emitted when its level is
/// at or above the current threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

static THRESHOLD: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

/// Where finished log lines go.
pub struct LogSink {
    /// Write one formatted line and its newline, atomically.
    pub write_line: fn(fmt::Arguments<'_>),
}

static SINK: ServiceCell<LogSink> = ServiceCell::new();

/// Route log output through `sink`, replacing the early-boot fallback.
/// Typically called once by the serial driver during its initialisation.
pub fn set_sink(sink: &'static LogSink) {
    SINK.set(sink);
}

pub fn set_level(level: LogLevel) {
    THRESHOLD.store(level as u8, Ordering::Relaxed);
}

pub fn level() -> LogLevel {
    match THRESHOLD.load(Ordering::Relaxed) {
        0 => LogLevel::Error,
        1 => LogLevel::Warn,
        2 => LogLevel::Info,
        3 => LogLevel::Debug,
        _ => LogLevel::Trace,
    }
}

#[inline]
pub fn enabled(level: LogLevel) -> bool {
    level as u8 <= THRESHOLD.load(Ordering::Relaxed)
}

#[cfg(target_os = "none")]
fn early_line(args: fmt::Arguments<'_>) {
    use crate::ports::{serial_write_bytes, COM1};

    struct Com1;

    impl fmt::Write for Com1 {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            unsafe { serial_write_bytes(COM1, s.as_bytes()) };
            Ok(())
        }
    }

    let _ = fmt::write(&mut Com1, args);
    unsafe { serial_write_bytes(COM1, b"\n") };
}

#[cfg(not(target_os = "none"))]
fn early_line(_args: fmt::Arguments<'_>) {
    // No console until a sink registers.
}

/// Filter and emit one line.  Prefer the level macros.
pub fn emit(level: LogLevel, args: fmt::Arguments<'_>) {
    if !enabled(level) {
        return;
    }
    match SINK.get() {
        Some(sink) => (sink.write_line)(args),
        None => early_line(args),
    }
}

#[macro_export]
macro_rules! klog {
    ($level:expr, $($arg:tt)*) => {
        $crate::klog::emit($level, ::core::format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! klog_error {
    ($($arg:tt)*) => {
        $crate::klog!($crate::klog::LogLevel::Error, $($arg)*)
    };
}

#[macro_export]
macro_rules! klog_warn {
    ($($arg:tt)*) => {
        $crate::klog!($crate::klog::LogLevel::Warn, $($arg)*)
    };
}

#[macro_export]
macro_rules! klog_info {
    ($($arg:tt)*) => {
        $crate::klog!($crate::klog::LogLevel::Info, $($arg)*)
    };
}

#[macro_export]
macro_rules! klog_debug {
    ($($arg:tt)*) => {
        $crate::klog!($crate::klog::LogLevel::Debug, $($arg)*)
    };
}

#[macro_export]
macro_rules! klog_trace {
    ($($arg:tt)*) => {
        $crate::klog!($crate::klog::LogLevel::Trace, $($arg)*)
    };
}
