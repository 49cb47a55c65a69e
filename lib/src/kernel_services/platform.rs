//! Platform services: the wall-clock millisecond counter.

use super::ServiceCell;

pub struct PlatformServices {
    /// Monotonic milliseconds since boot.
    pub milliseconds: fn() -> u64,
}

static PLATFORM: ServiceCell<PlatformServices> = ServiceCell::new();

/// Register the platform service table.  Called once during kernel boot.
pub fn register_platform_services(services: &'static PlatformServices) {
    PLATFORM.set(services);
}

#[inline]
pub fn is_initialized() -> bool {
    PLATFORM.is_set()
}

/// Monotonic milliseconds since boot; `0` before the platform is wired.
#[inline]
pub fn milliseconds() -> u64 {
    match PLATFORM.get() {
        Some(s) => (s.milliseconds)(),
        None => 0,
    }
}
