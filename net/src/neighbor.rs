//! Address-resolution (neighbor) cache.
//!
//! Maps IPv4 addresses to link addresses.  Entries are learned passively
//! from ARP traffic the link layer hands us; the stack never originates ARP
//! requests, so a transmit to an unresolved address fails with `NoRoute`
//! until the peer has been heard from.

extern crate alloc;

use alloc::sync::Arc;
use alloc::vec::Vec;

use driftos_lib::{klog_debug, klog_trace, IrqMutex};

use crate::netdev::Iface;
use crate::packet::Packet;
use crate::types::{Ipv4Addr, MacAddr};

/// ARP payload for Ethernet/IPv4.
pub const ARP_LEN: usize = 28;

const ARP_HTYPE_ETHERNET: u16 = 1;
const ARP_PTYPE_IPV4: u16 = 0x0800;
const ARP_OPER_REQUEST: u16 = 1;
const ARP_OPER_REPLY: u16 = 2;

/// Cache capacity; the oldest entry is evicted when full.
const MAX_ENTRIES: usize = 64;

#[derive(Clone, Copy)]
struct NeighborEntry {
    ip: Ipv4Addr,
    mac: MacAddr,
}

static CACHE: IrqMutex<Vec<NeighborEntry>> = IrqMutex::new(Vec::new());

/// Record (or refresh) the link address for `ip`.
pub fn insert(ip: Ipv4Addr, mac: MacAddr) {
    let mut cache = CACHE.lock();
    if let Some(entry) = cache.iter_mut().find(|e| e.ip == ip) {
        entry.mac = mac;
        return;
    }
    if cache.len() >= MAX_ENTRIES {
        cache.remove(0);
    }
    cache.push(NeighborEntry { ip, mac });
}

/// Resolve `ip` to a link address.
///
/// The broadcast address always resolves to the broadcast MAC.
pub fn lookup(ip: Ipv4Addr) -> Option<MacAddr> {
    if ip.is_broadcast() {
        return Some(MacAddr::BROADCAST);
    }
    CACHE.lock().iter().find(|e| e.ip == ip).map(|e| e.mac)
}

/// Learn sender mappings from a received ARP frame.  Called from the link
/// layer with the cursor at the ARP payload.
pub fn decode(_iface: &Arc<Iface>, pkt: &mut Packet) {
    let b = pkt.payload();
    if b.len() < ARP_LEN {
        klog_debug!("arp: truncated frame");
        return;
    }

    let htype = u16::from_be_bytes([b[0], b[1]]);
    let ptype = u16::from_be_bytes([b[2], b[3]]);
    if htype != ARP_HTYPE_ETHERNET || ptype != ARP_PTYPE_IPV4 || b[4] != 6 || b[5] != 4 {
        klog_debug!("arp: unsupported hardware/protocol combination");
        return;
    }

    let oper = u16::from_be_bytes([b[6], b[7]]);
    if oper != ARP_OPER_REQUEST && oper != ARP_OPER_REPLY {
        return;
    }

    let sender_mac = MacAddr([b[8], b[9], b[10], b[11], b[12], b[13]]);
    let sender_ip = Ipv4Addr([b[14], b[15], b[16], b[17]]);
    if sender_ip.is_unspecified() {
        return;
    }

    klog_trace!("arp: learned {} -> {}", sender_ip, sender_mac);
    insert(sender_ip, sender_mac);
}

#[cfg(test)]
pub(crate) fn reset_for_tests() {
    CACHE.lock().clear();
}
