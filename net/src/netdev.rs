//! Interface descriptors and the device registry.
//!
//! This module is the boundary between network drivers (which move bytes)
//! and the protocol stack (which understands protocols).  A driver registers
//! one [`Iface`] per device, carrying its link address, IPv4 address, MTU,
//! and a transmit hook; the stack hands every finalised frame to that hook
//! and the driver copies it into its TX ring.

extern crate alloc;

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

use driftos_lib::IrqMutex;

use crate::types::{DevIndex, Ipv4Addr, MacAddr, NetError};

/// Driver transmit entry point.  Receives the complete finalised frame;
/// the bytes are only borrowed for the duration of the call.
pub type TxFn = fn(&Iface, &[u8]) -> Result<(), NetError>;

/// Descriptor of one registered network interface.
pub struct Iface {
    index: DevIndex,
    /// Hardware MAC address.
    pub mac: MacAddr,
    /// IPv4 address assigned to this interface.
    pub ip: Ipv4Addr,
    /// Maximum transmission unit (payload bytes, excluding the link header).
    pub mtu: u16,
    up: AtomicBool,
    tx: TxFn,
}

impl Iface {
    #[inline]
    pub fn index(&self) -> DevIndex {
        self.index
    }

    #[inline]
    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::Acquire)
    }

    pub fn set_up(&self) {
        self.up.store(true, Ordering::Release);
    }

    pub fn set_down(&self) {
        self.up.store(false, Ordering::Release);
    }

    /// Hand a finalised frame to the driver.
    pub fn transmit(&self, frame: &[u8]) -> Result<(), NetError> {
        if !self.is_up() {
            return Err(NetError::InterfaceDown);
        }
        (self.tx)(self, frame)
    }
}

static IFACES: IrqMutex<Vec<Arc<Iface>>> = IrqMutex::new(Vec::new());

/// Register an interface.  The returned handle stays valid for the
/// interface's lifetime; the link starts up.
pub fn register_iface(mac: MacAddr, ip: Ipv4Addr, mtu: u16, tx: TxFn) -> Arc<Iface> {
    let mut ifaces = IFACES.lock();
    let iface = Arc::new(Iface {
        index: DevIndex(ifaces.len()),
        mac,
        ip,
        mtu,
        up: AtomicBool::new(true),
        tx,
    });
    ifaces.push(iface.clone());
    iface
}

/// Pick the interface to reach `target` through.
///
/// A single-homed host has exactly one usable interface, so the first one
/// with its link up wins; `NoRoute` when nothing is up.
pub fn select_iface(target: Ipv4Addr) -> Result<Arc<Iface>, NetError> {
    let ifaces = IFACES.lock();
    if target.is_loopback() {
        if let Some(iface) = ifaces.iter().find(|i| i.ip.is_loopback() && i.is_up()) {
            return Ok(iface.clone());
        }
    }
    ifaces
        .iter()
        .find(|i| i.is_up())
        .cloned()
        .ok_or(NetError::NoRoute)
}

pub fn iface_count() -> usize {
    IFACES.lock().len()
}

#[cfg(test)]
pub(crate) fn reset_for_tests() {
    IFACES.lock().clear();
}
