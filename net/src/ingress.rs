//! Ingress: single entry point for received frames.
//!
//! Drivers call [`net_rx`] for every frame they pull off the wire.  The raw
//! bytes are copied into a [`Packet`] (the driver keeps its ring buffer)
//! and handed to the link layer for decoding.

use alloc::sync::Arc;

use driftos_lib::klog_error;

use crate::ethernet;
use crate::netdev::Iface;
use crate::packet::Packet;

/// Process one received frame.
///
/// May run in interrupt context: the decode path below never blocks, it
/// only enqueues and notifies.
pub fn net_rx(iface: &Arc<Iface>, frame: &[u8]) {
    if frame.len() < ethernet::HEADER_LEN {
        return;
    }

    let mut pkt = match Packet::from_frame(frame) {
        Ok(pkt) => pkt,
        Err(err) => {
            klog_error!("ingress: dropping frame: {}", err);
            return;
        }
    };

    ethernet::decode(iface, &mut pkt);
}
