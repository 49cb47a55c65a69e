//! Internet layer: IPv4.
//!
//! Decode verifies the header checksum, filters on destination address, and
//! routes by protocol number.  Prepare records the protocol and addresses in
//! the header region so the layers below (and finalize) can read them back;
//! finalize fills in the remaining fields, checksums the header, and passes
//! the frame down to the link layer.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicU16, Ordering};

use driftos_lib::klog_debug;

use crate::checksum;
use crate::ethernet;
use crate::netdev::Iface;
use crate::packet::{Layer, Packet};
use crate::types::{EtherType, IpProtocol, Ipv4Addr, NetError};
use crate::{icmp, tcp, udp};

/// IPv4 header length without options.  Prepared packets never carry options.
pub const HEADER_LEN: usize = 20;

/// Byte offset of the source address within the header.
pub const SRC_OFFSET: usize = 12;

/// Byte offset of the destination address within the header.
pub const DST_OFFSET: usize = 16;

/// Default time-to-live for transmitted packets.
const DEFAULT_TTL: u8 = 64;

/// Identification field counter, incremented per transmitted packet.
static IDENTIFICATION: AtomicU16 = AtomicU16::new(0);

/// What a transport layer asks the internet layer to build.
pub struct PacketDescriptor {
    /// Bytes of transport header plus payload.
    pub payload_size: usize,
    /// Destination address.
    pub target: Ipv4Addr,
    /// Enclosed protocol.
    pub protocol: IpProtocol,
}

/// Read the source address out of a decoded packet's internet header.
pub(crate) fn source_addr(pkt: &Packet) -> Ipv4Addr {
    let l3 = pkt.tag(Layer::Net);
    let b = pkt.bytes();
    Ipv4Addr([
        b[l3 + SRC_OFFSET],
        b[l3 + SRC_OFFSET + 1],
        b[l3 + SRC_OFFSET + 2],
        b[l3 + SRC_OFFSET + 3],
    ])
}

/// Decode a received internet packet.  Called from the link layer with the
/// cursor at the internet header.
pub fn decode(iface: &Arc<Iface>, pkt: &mut Packet) {
    let start = pkt.index();
    pkt.set_tag(Layer::Net, start);

    let b = pkt.bytes();
    if b.len() < start + HEADER_LEN {
        klog_debug!("ip: truncated header");
        return;
    }

    let version_ihl = b[start];
    if version_ihl >> 4 != 4 {
        klog_debug!("ip: not ipv4 (version {})", version_ihl >> 4);
        return;
    }
    let ihl = ((version_ihl & 0x0f) as usize) * 4;
    if ihl < HEADER_LEN || start + ihl > b.len() {
        klog_debug!("ip: bad ihl {}", ihl);
        return;
    }

    if checksum::ipv4_header_checksum(&b[start..start + ihl]) != 0 {
        klog_debug!("ip: header checksum mismatch, dropping");
        return;
    }

    let total_len = u16::from_be_bytes([b[start + 2], b[start + 3]]) as usize;
    if total_len < ihl || start + total_len > b.len() {
        klog_debug!("ip: bad total length {}", total_len);
        return;
    }

    let protocol = b[start + 9];
    let dst = Ipv4Addr([
        b[start + DST_OFFSET],
        b[start + DST_OFFSET + 1],
        b[start + DST_OFFSET + 2],
        b[start + DST_OFFSET + 3],
    ]);

    // Not for us and not broadcast: drop quietly.
    if dst != iface.ip && !dst.is_broadcast() {
        return;
    }

    pkt.advance(ihl);

    match IpProtocol::from_u8(protocol) {
        Some(IpProtocol::Icmp) => icmp::decode(iface, pkt),
        Some(IpProtocol::Tcp) => tcp::decode(iface, pkt),
        Some(IpProtocol::Udp) => udp::decode(iface, pkt),
        None => {
            klog_debug!("ip: unhandled protocol {}", protocol);
        }
    }
}

/// Ask the link layer for a buffer sized for this descriptor, with the
/// internet header reserved.  Protocol and destination are recorded in the
/// header region immediately so finalize (and the link layer's address
/// resolution) can read them back.
pub fn prepare(descriptor: &PacketDescriptor, user_owned: bool) -> Result<Packet, NetError> {
    let mut pkt = ethernet::prepare(
        HEADER_LEN + descriptor.payload_size,
        EtherType::Ipv4,
        user_owned,
    )?;

    let start = pkt.index();
    pkt.set_tag(Layer::Net, start);
    {
        let b = pkt.bytes_mut();
        b[start + 9] = descriptor.protocol.as_u8();
        b[start + DST_OFFSET..start + DST_OFFSET + 4].copy_from_slice(descriptor.target.as_bytes());
    }
    pkt.advance(HEADER_LEN);
    Ok(pkt)
}

/// Write the internet header, checksum it, and pass the frame down.
pub fn finalize(iface: &Iface, pkt: &mut Packet) -> Result<(), NetError> {
    let start = pkt.tag(Layer::Net);
    let total_len = (pkt.len() - start) as u16;
    let ident = IDENTIFICATION.fetch_add(1, Ordering::Relaxed);
    let src = iface.ip;

    {
        let b = pkt.bytes_mut();
        b[start] = 0x45; // version 4, ihl 5
        b[start + 1] = 0; // dscp/ecn
        b[start + 2..start + 4].copy_from_slice(&total_len.to_be_bytes());
        b[start + 4..start + 6].copy_from_slice(&ident.to_be_bytes());
        b[start + 6..start + 8].copy_from_slice(&[0, 0]); // flags/fragment
        b[start + 8] = DEFAULT_TTL;
        // b[start + 9] (protocol) was recorded at prepare time
        b[start + 10..start + 12].copy_from_slice(&[0, 0]);
        b[start + SRC_OFFSET..start + SRC_OFFSET + 4].copy_from_slice(src.as_bytes());
        // destination was recorded at prepare time

        let csum = checksum::ipv4_header_checksum(&b[start..start + HEADER_LEN]);
        b[start + 10..start + 12].copy_from_slice(&csum.to_be_bytes());
    }

    ethernet::finalize(iface, pkt)
}
