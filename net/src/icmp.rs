//! ICMP: echo handling.
//!
//! The only active behaviour is answering echo requests aimed at one of our
//! addresses; everything else is logged and dropped.  The reply mirrors the
//! request's identifier, sequence number, and data verbatim.

use alloc::sync::Arc;

use driftos_lib::{klog_debug, klog_error, klog_trace};

use crate::checksum;
use crate::ip;
use crate::netdev::Iface;
use crate::packet::{Layer, Packet};
use crate::types::{IpProtocol, Ipv4Addr, NetError};

/// ICMP header: type, code, checksum, 32-bit rest-of-header.
pub const HEADER_LEN: usize = 8;

/// Offset of the rest-of-header word (identifier/sequence for echo).
const REST_OFFSET: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum IcmpType {
    EchoReply = 0,
    Unreachable = 3,
    EchoRequest = 8,
    TimeExceeded = 11,
}

impl IcmpType {
    pub const fn from_u8(val: u8) -> Option<Self> {
        match val {
            0 => Some(Self::EchoReply),
            3 => Some(Self::Unreachable),
            8 => Some(Self::EchoRequest),
            11 => Some(Self::TimeExceeded),
            _ => None,
        }
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// What a caller asks the ICMP layer to build.
pub struct PacketDescriptor {
    /// Bytes of data beyond the 8-byte header.
    pub payload_size: usize,
    /// Destination address.
    pub target: Ipv4Addr,
    /// Message type.
    pub ty: IcmpType,
    /// Message code.
    pub code: u8,
}

/// Decode a received ICMP message.  Called from the internet layer with the
/// cursor at the ICMP header.
pub fn decode(iface: &Arc<Iface>, pkt: &mut Packet) {
    let start = pkt.index();
    pkt.set_tag(Layer::Transport, start);

    if pkt.len() < start + HEADER_LEN {
        klog_debug!("icmp: truncated message");
        return;
    }

    let ty = pkt.bytes()[start];
    match IcmpType::from_u8(ty) {
        Some(IcmpType::EchoRequest) => handle_echo_request(iface, pkt),
        Some(IcmpType::EchoReply) => {
            klog_trace!("icmp: echo reply");
        }
        Some(IcmpType::Unreachable) => {
            klog_debug!("icmp: destination unreachable (code {})", pkt.bytes()[start + 1]);
        }
        Some(IcmpType::TimeExceeded) => {
            klog_debug!("icmp: time exceeded");
        }
        None => {
            klog_debug!("icmp: unsupported type {}", ty);
        }
    }
}

fn handle_echo_request(iface: &Arc<Iface>, pkt: &mut Packet) {
    let start = pkt.tag(Layer::Transport);
    let l3 = pkt.tag(Layer::Net);

    let (src, dst, icmp_len) = {
        let b = pkt.bytes();
        let src = ip::source_addr(pkt);
        let dst = Ipv4Addr([
            b[l3 + ip::DST_OFFSET],
            b[l3 + ip::DST_OFFSET + 1],
            b[l3 + ip::DST_OFFSET + 2],
            b[l3 + ip::DST_OFFSET + 3],
        ]);
        let ihl = ((b[l3] & 0x0f) as usize) * 4;
        let total_len = u16::from_be_bytes([b[l3 + 2], b[l3 + 3]]) as usize;
        (src, dst, total_len.saturating_sub(ihl))
    };

    // Only answer requests for one of our own addresses.
    if dst != iface.ip {
        return;
    }

    if icmp_len < HEADER_LEN || start + icmp_len > pkt.len() {
        klog_debug!("icmp: bad echo request length {}", icmp_len);
        return;
    }
    let data_len = icmp_len - HEADER_LEN;

    klog_trace!("icmp: echo request for {}, replying", dst);

    let descriptor = PacketDescriptor {
        payload_size: data_len,
        target: src,
        ty: IcmpType::EchoReply,
        code: 0,
    };
    let mut reply = match prepare(&descriptor) {
        Ok(reply) => reply,
        Err(err) => {
            klog_error!("icmp: failed to prepare echo reply: {}", err);
            return;
        }
    };

    // Identifier, sequence number, and data are echoed verbatim.
    let copy_len = REST_OFFSET + data_len;
    let src_off = start + REST_OFFSET;
    let dst_off = reply.index();
    reply.bytes_mut()[dst_off..dst_off + copy_len]
        .copy_from_slice(&pkt.bytes()[src_off..src_off + copy_len]);

    if let Err(err) = finalize(iface, &mut reply) {
        klog_error!("icmp: failed to send echo reply: {}", err);
    }
}

/// Ask the internet layer for a buffer sized for `8 + payload_size`, with
/// type and code written and the cursor at the rest-of-header word.
pub fn prepare(descriptor: &PacketDescriptor) -> Result<Packet, NetError> {
    let mut pkt = ip::prepare(
        &ip::PacketDescriptor {
            payload_size: HEADER_LEN + descriptor.payload_size,
            target: descriptor.target,
            protocol: IpProtocol::Icmp,
        },
        false,
    )?;

    let start = pkt.index();
    pkt.set_tag(Layer::Transport, start);
    {
        let b = pkt.bytes_mut();
        b[start] = descriptor.ty.as_u8();
        b[start + 1] = descriptor.code;
    }
    // The caller fills everything from the rest-of-header word onward.
    pkt.advance(REST_OFFSET);
    Ok(pkt)
}

/// Checksum the message (header plus payload) and pass the frame down.
pub fn finalize(iface: &Iface, pkt: &mut Packet) -> Result<(), NetError> {
    let start = pkt.tag(Layer::Transport);
    pkt.retreat(pkt.index() - start);

    {
        let b = pkt.bytes_mut();
        b[start + 2..start + 4].copy_from_slice(&[0, 0]);
        let csum = checksum::finalize(checksum::add_bytes(&b[start..]));
        b[start + 2..start + 4].copy_from_slice(&csum.to_be_bytes());
    }

    ip::finalize(iface, pkt)
}
