//! Link layer: Ethernet II framing.
//!
//! Decode filters on destination MAC and dispatches by ethertype; prepare
//! sizes the buffer for every enclosing header in one allocation; finalize
//! resolves the destination link address through the neighbor cache and
//! hands the frame to the driver.

use alloc::sync::Arc;

use driftos_lib::{klog_debug, klog_trace};

use crate::neighbor;
use crate::netdev::Iface;
use crate::packet::{Layer, Packet};
use crate::types::{EtherType, Ipv4Addr, MacAddr, NetError};
use crate::ip;

/// Ethernet header: 6-byte destination, 6-byte source, 2-byte ethertype.
pub const HEADER_LEN: usize = 14;

#[derive(Clone, Copy, Debug)]
pub struct EthHeader {
    pub dst: MacAddr,
    pub src: MacAddr,
    pub ethertype: u16,
}

/// Parse an Ethernet header from the start of `data`.
pub fn parse_header(data: &[u8]) -> Option<EthHeader> {
    if data.len() < HEADER_LEN {
        return None;
    }
    Some(EthHeader {
        dst: MacAddr([data[0], data[1], data[2], data[3], data[4], data[5]]),
        src: MacAddr([data[6], data[7], data[8], data[9], data[10], data[11]]),
        ethertype: u16::from_be_bytes([data[12], data[13]]),
    })
}

/// Decode a received frame.  Called only from the ingress path, with the
/// cursor at offset 0.
pub fn decode(iface: &Arc<Iface>, pkt: &mut Packet) {
    pkt.set_tag(Layer::Link, 0);

    let Some(hdr) = parse_header(pkt.payload()) else {
        klog_debug!("eth: truncated frame");
        return;
    };

    // Accept only frames addressed to us or to everyone.
    if hdr.dst != iface.mac && !hdr.dst.is_broadcast() {
        return;
    }

    pkt.advance(HEADER_LEN);

    match EtherType::from_u16(hdr.ethertype) {
        Some(EtherType::Ipv4) => ip::decode(iface, pkt),
        Some(EtherType::Arp) => neighbor::decode(iface, pkt),
        None => {
            klog_debug!("eth: unhandled ethertype {:#06x}", hdr.ethertype);
        }
    }
}

/// Allocate a frame sized for `inner_size` bytes of enclosed headers and
/// payload, with the link header reserved and the ethertype recorded.
pub fn prepare(inner_size: usize, ethertype: EtherType, user_owned: bool) -> Result<Packet, NetError> {
    let mut pkt = Packet::new(HEADER_LEN + inner_size, user_owned)?;
    pkt.set_tag(Layer::Link, 0);
    pkt.bytes_mut()[12..14].copy_from_slice(&ethertype.as_u16().to_be_bytes());
    pkt.advance(HEADER_LEN);
    Ok(pkt)
}

/// Write the link addresses and hand the frame to the driver.
///
/// The destination MAC comes from the neighbor cache, keyed by the IPv4
/// destination the internet layer recorded in its header.
pub fn finalize(iface: &Iface, pkt: &mut Packet) -> Result<(), NetError> {
    let l2 = pkt.tag(Layer::Link);
    let l3 = pkt.tag(Layer::Net);

    let dst_ip = {
        let b = pkt.bytes();
        Ipv4Addr([
            b[l3 + ip::DST_OFFSET],
            b[l3 + ip::DST_OFFSET + 1],
            b[l3 + ip::DST_OFFSET + 2],
            b[l3 + ip::DST_OFFSET + 3],
        ])
    };

    let dst_mac = match neighbor::lookup(dst_ip) {
        Some(mac) => mac,
        None => {
            klog_trace!("eth: no link address for {}", dst_ip);
            return Err(NetError::NoRoute);
        }
    };

    let src_mac = iface.mac;
    {
        let b = pkt.bytes_mut();
        b[l2..l2 + 6].copy_from_slice(dst_mac.as_bytes());
        b[l2 + 6..l2 + 12].copy_from_slice(src_mac.as_bytes());
    }

    iface.transmit(pkt.bytes())
}
