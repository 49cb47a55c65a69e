//! Hand-off point to the DNS resolver.
//!
//! The resolver lives outside this crate; it registers a decoder once
//! during boot and the datagram transport hands it a copy of every
//! datagram whose source port is 53.

use alloc::sync::Arc;

use spin::Once;

use crate::netdev::Iface;
use crate::packet::Packet;

/// DNS server port.
pub const DNS_PORT: u16 = 53;

/// Decoder entry point.  Receives its own copy of the packet, cursor at
/// the datagram payload.
pub type DnsDecodeFn = fn(&Arc<Iface>, Packet);

static DECODER: Once<DnsDecodeFn> = Once::new();

/// Register the DNS decoder.  Only the first registration takes effect.
pub fn register_decoder(decoder: DnsDecodeFn) {
    DECODER.call_once(|| decoder);
}

pub(crate) fn deliver(iface: &Arc<Iface>, pkt: &Packet) {
    if let Some(decode) = DECODER.get() {
        decode(iface, pkt.clone());
    }
}
