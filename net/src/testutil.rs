//! Shared machinery for the stack's unit tests.
//!
//! Provides a capturing driver (every finalised frame lands in a log), an
//! optional reply hook that feeds crafted peer responses straight back
//! through the decode path (so handshake/retry flows run single-threaded),
//! builders for valid frames of every protocol, and checksum verifiers.
//!
//! All tests share process-global state (interface registry, connection
//! tables, mock clock), so [`setup`] takes a lock that serialises them.

use std::sync::{Mutex, MutexGuard};

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};

use driftos_lib::test_support;
use driftos_lib::IrqMutex;

use crate::checksum;
use crate::ingress;
use crate::neighbor;
use crate::netdev::{self, Iface};
use crate::tcp::{self, TcpFlags};
use crate::types::{EtherType, IpProtocol, Ipv4Addr, MacAddr, NetError};
use crate::udp;

pub const OUR_MAC: MacAddr = MacAddr([0x52, 0x54, 0x00, 0x12, 0x34, 0x56]);
pub const OUR_IP: Ipv4Addr = Ipv4Addr([10, 0, 2, 15]);
pub const PEER_MAC: MacAddr = MacAddr([0x52, 0x54, 0x00, 0x12, 0x34, 0x02]);

static TEST_LOCK: Mutex<()> = Mutex::new(());

static TX_LOG: IrqMutex<Vec<Vec<u8>>> = IrqMutex::new(Vec::new());
static TEST_IFACE: IrqMutex<Option<Arc<Iface>>> = IrqMutex::new(None);

/// Invoked for every transmitted frame with its index in the TX log.
/// Returned frames are injected back through the ingress path.
pub type ReplyFn = fn(frame: &[u8], tx_index: usize) -> Vec<Vec<u8>>;

static REPLY_HOOK: IrqMutex<Option<ReplyFn>> = IrqMutex::new(None);

/// Scratch counter for stateful reply hooks.
pub static HOOK_STATE: AtomicUsize = AtomicUsize::new(0);

fn capture_tx(_iface: &Iface, frame: &[u8]) -> Result<(), NetError> {
    let index = {
        let mut log = TX_LOG.lock();
        log.push(frame.to_vec());
        log.len() - 1
    };

    let hook = *REPLY_HOOK.lock();
    if let Some(hook) = hook {
        let replies = hook(frame, index);
        if !replies.is_empty() {
            let iface = TEST_IFACE.lock().clone().expect("test iface registered");
            for reply in replies {
                ingress::net_rx(&iface, &reply);
            }
        }
    }
    Ok(())
}

pub struct TestEnv {
    pub iface: Arc<Iface>,
    _guard: MutexGuard<'static, ()>,
}

/// Serialise the test, install the mock collaborators, wipe all global
/// stack state, and register a fresh capturing interface.
pub fn setup() -> TestEnv {
    let guard = TEST_LOCK.lock().unwrap_or_else(|p| p.into_inner());

    test_support::install();
    test_support::set_time_step(1);

    netdev::reset_for_tests();
    neighbor::reset_for_tests();
    tcp::reset_for_tests();
    udp::reset_for_tests();
    TX_LOG.lock().clear();
    *REPLY_HOOK.lock() = None;
    HOOK_STATE.store(0, Ordering::Relaxed);

    let iface = netdev::register_iface(OUR_MAC, OUR_IP, 1500, capture_tx);
    *TEST_IFACE.lock() = Some(iface.clone());

    TestEnv {
        iface,
        _guard: guard,
    }
}

pub fn set_reply_hook(hook: ReplyFn) {
    *REPLY_HOOK.lock() = Some(hook);
}

pub fn tx_frames() -> Vec<Vec<u8>> {
    TX_LOG.lock().clone()
}

pub fn tx_count() -> usize {
    TX_LOG.lock().len()
}

pub fn add_neighbor(ip: Ipv4Addr, mac: MacAddr) {
    neighbor::insert(ip, mac);
}

// ---------------------------------------------------------------------------
// Frame builders
// ---------------------------------------------------------------------------

pub fn eth_frame(dst: MacAddr, src: MacAddr, ethertype: EtherType, payload: &[u8]) -> Vec<u8> {
    let mut frame = alloc::vec![0u8; 14 + payload.len()];
    frame[0..6].copy_from_slice(dst.as_bytes());
    frame[6..12].copy_from_slice(src.as_bytes());
    frame[12..14].copy_from_slice(&ethertype.as_u16().to_be_bytes());
    frame[14..].copy_from_slice(payload);
    frame
}

pub fn ipv4_packet(src: Ipv4Addr, dst: Ipv4Addr, protocol: IpProtocol, transport: &[u8]) -> Vec<u8> {
    let total = 20 + transport.len();
    let mut b = alloc::vec![0u8; total];
    b[0] = 0x45;
    b[2..4].copy_from_slice(&(total as u16).to_be_bytes());
    b[8] = 64;
    b[9] = protocol.as_u8();
    b[12..16].copy_from_slice(src.as_bytes());
    b[16..20].copy_from_slice(dst.as_bytes());
    let csum = checksum::ipv4_header_checksum(&b[..20]);
    b[10..12].copy_from_slice(&csum.to_be_bytes());
    b[20..].copy_from_slice(transport);
    b
}

#[allow(clippy::too_many_arguments)]
pub fn tcp_segment(
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    seq: u32,
    ack: u32,
    flags: TcpFlags,
    payload: &[u8],
) -> Vec<u8> {
    let len = tcp::HEADER_LEN + payload.len();
    let mut b = alloc::vec![0u8; len];
    b[0..2].copy_from_slice(&src_port.to_be_bytes());
    b[2..4].copy_from_slice(&dst_port.to_be_bytes());
    b[4..8].copy_from_slice(&seq.to_be_bytes());
    b[8..12].copy_from_slice(&ack.to_be_bytes());
    let raw = (5u16 << 12) | flags.bits();
    b[12..14].copy_from_slice(&raw.to_be_bytes());
    b[14..16].copy_from_slice(&1024u16.to_be_bytes());
    b[20..].copy_from_slice(payload);

    let mut sum = checksum::pseudo_header_sum(src_ip, dst_ip, IpProtocol::Tcp.as_u8(), len);
    sum = sum.wrapping_add(checksum::add_bytes(&b));
    let csum = checksum::finalize_nonzero(sum);
    b[16..18].copy_from_slice(&csum.to_be_bytes());
    b
}

pub fn udp_datagram(
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    payload: &[u8],
) -> Vec<u8> {
    let len = udp::HEADER_LEN + payload.len();
    let mut b = alloc::vec![0u8; len];
    b[0..2].copy_from_slice(&src_port.to_be_bytes());
    b[2..4].copy_from_slice(&dst_port.to_be_bytes());
    b[4..6].copy_from_slice(&(len as u16).to_be_bytes());
    b[8..].copy_from_slice(payload);

    let mut sum = checksum::pseudo_header_sum(src_ip, dst_ip, IpProtocol::Udp.as_u8(), len);
    sum = sum.wrapping_add(checksum::add_bytes(&b));
    let csum = checksum::finalize_nonzero(sum);
    b[6..8].copy_from_slice(&csum.to_be_bytes());
    b
}

pub fn icmp_echo_request(ident: u16, seqno: u16, data: &[u8]) -> Vec<u8> {
    let mut b = alloc::vec![0u8; 8 + data.len()];
    b[0] = 8; // echo request
    b[4..6].copy_from_slice(&ident.to_be_bytes());
    b[6..8].copy_from_slice(&seqno.to_be_bytes());
    b[8..].copy_from_slice(data);
    let csum = checksum::finalize(checksum::add_bytes(&b));
    b[2..4].copy_from_slice(&csum.to_be_bytes());
    b
}

/// Wrap a transport payload in IPv4 + Ethernet (addressed to us) and run it
/// through the ingress path.
pub fn inject_ipv4(iface: &Arc<Iface>, src: Ipv4Addr, protocol: IpProtocol, transport: &[u8]) {
    let packet = ipv4_packet(src, OUR_IP, protocol, transport);
    let frame = eth_frame(OUR_MAC, PEER_MAC, EtherType::Ipv4, &packet);
    ingress::net_rx(iface, &frame);
}

// ---------------------------------------------------------------------------
// Outbound frame inspection
// ---------------------------------------------------------------------------

/// IPv4 header length of the frame's internet header.
fn frame_ihl(frame: &[u8]) -> usize {
    ((frame[14] & 0x0f) as usize) * 4
}

pub fn frame_ip_src(frame: &[u8]) -> Ipv4Addr {
    Ipv4Addr([frame[26], frame[27], frame[28], frame[29]])
}

pub fn frame_ip_dst(frame: &[u8]) -> Ipv4Addr {
    Ipv4Addr([frame[30], frame[31], frame[32], frame[33]])
}

pub fn frame_ip_proto(frame: &[u8]) -> u8 {
    frame[23]
}

/// Transport region of the frame (header plus payload).
pub fn frame_transport(frame: &[u8]) -> &[u8] {
    let total = u16::from_be_bytes([frame[16], frame[17]]) as usize;
    &frame[14 + frame_ihl(frame)..14 + total]
}

pub struct TcpView {
    pub source_port: u16,
    pub target_port: u16,
    pub seq: u32,
    pub ack: u32,
    pub flags: TcpFlags,
    pub payload: Vec<u8>,
}

pub fn tcp_view(frame: &[u8]) -> TcpView {
    let transport = frame_transport(frame);
    let hdr = tcp::parse_header(transport).expect("valid tcp header");
    TcpView {
        source_port: hdr.source_port,
        target_port: hdr.target_port,
        seq: hdr.seq,
        ack: hdr.ack,
        flags: hdr.flags,
        payload: transport[hdr.header_len()..].to_vec(),
    }
}

pub fn verify_ipv4_checksum(frame: &[u8]) -> bool {
    checksum::ipv4_header_checksum(&frame[14..14 + frame_ihl(frame)]) == 0
}

/// Verify the transport checksum (ICMP, TCP, or UDP) of an outbound frame.
/// A stored checksum is valid iff recomputing over the same region folds
/// to zero.
pub fn verify_transport_checksum(frame: &[u8]) -> bool {
    let src = frame_ip_src(frame);
    let dst = frame_ip_dst(frame);
    let transport = frame_transport(frame);

    match IpProtocol::from_u8(frame_ip_proto(frame)) {
        Some(IpProtocol::Icmp) => checksum::finalize(checksum::add_bytes(transport)) == 0,
        Some(protocol) => {
            let mut sum =
                checksum::pseudo_header_sum(src, dst, protocol.as_u8(), transport.len());
            sum = sum.wrapping_add(checksum::add_bytes(transport));
            checksum::finalize(sum) == 0
        }
        None => false,
    }
}
