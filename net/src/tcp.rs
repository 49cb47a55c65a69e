//! Stream transport (TCP, client side).
//!
//! Connections are client-initiated: `connect` performs the three-way
//! handshake, `send` pushes data with PSH|ACK and waits for the matching
//! acknowledgement, `disconnect` runs the four-way teardown.  Every
//! operation that waits for an acknowledgement retries the same frame up to
//! [`MAX_TRIES`] times with a [`TIMEOUT_MS`] window per attempt.
//!
//! The decode path never blocks: it updates the connection's sequence
//! numbers, feeds the ack queue of a listening operation, fans PSH payloads
//! out to the owning socket, and immediately acknowledges PSH segments.

use alloc::sync::{Arc, Weak};
use core::sync::atomic::{AtomicBool, AtomicU16, Ordering};

use bitflags::bitflags;
use driftos_lib::{clock, klog_debug, klog_error, klog_trace, BoundedQueue, CondVar, IrqMutex};

use crate::checksum;
use crate::connection::{ConnectionTable, PortPair};
use crate::ip;
use crate::netdev::{self, Iface};
use crate::packet::{Layer, Packet};
use crate::socket::{ConnData, Socket};
use crate::types::{IpProtocol, Ipv4Addr, NetError, Port};

/// TCP header length without options.  Prepared segments never carry options.
pub const HEADER_LEN: usize = 20;

/// Advertised receive window.
pub const DEFAULT_WINDOW: u16 = 1024;

/// Per-attempt acknowledgement timeout.
pub const TIMEOUT_MS: u64 = 1000;

/// Transmission attempts before an operation fails with `TcpError`.
pub const MAX_TRIES: usize = 5;

/// Capacity of the per-connection acknowledgement queue.
pub const ACK_QUEUE_CAPACITY: usize = 8;

bitflags! {
    /// Flag bits of the TCP flags-and-data-offset word (low 9 bits; the
    /// data offset lives in the upper 4).
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct TcpFlags: u16 {
        const FIN = 1 << 0;
        const SYN = 1 << 1;
        const RST = 1 << 2;
        const PSH = 1 << 3;
        const ACK = 1 << 4;
        const URG = 1 << 5;
        const ECE = 1 << 6;
        const CWR = 1 << 7;
        const NS  = 1 << 8;
    }
}

/// Pack a data offset (in 32-bit words) and flag bits into the wire word.
#[inline]
fn pack_offset_flags(offset_words: u8, flags: TcpFlags) -> u16 {
    ((offset_words as u16) << 12) | flags.bits()
}

/// Connection state, advanced by the caller-driven operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TcpState {
    Closed,
    SynSent,
    Established,
    FinWait1,
    FinWait2,
    Closing,
    TimeWait,
}

impl TcpState {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::SynSent => "SYN_SENT",
            Self::Established => "ESTABLISHED",
            Self::FinWait1 => "FIN_WAIT_1",
            Self::FinWait2 => "FIN_WAIT_2",
            Self::Closing => "CLOSING",
            Self::TimeWait => "TIME_WAIT",
        }
    }
}

/// Parsed TCP header.  Multi-byte fields are host order after parsing.
#[derive(Clone, Copy, Debug)]
pub struct TcpHeader {
    pub source_port: u16,
    pub target_port: u16,
    pub seq: u32,
    pub ack: u32,
    /// Data offset in 32-bit words.
    pub data_offset: u8,
    pub flags: TcpFlags,
    pub window: u16,
    pub checksum: u16,
    pub urgent: u16,
}

impl TcpHeader {
    #[inline]
    pub const fn header_len(&self) -> usize {
        (self.data_offset as usize) * 4
    }
}

/// Parse a TCP header from the start of `data`.
pub fn parse_header(data: &[u8]) -> Option<TcpHeader> {
    if data.len() < HEADER_LEN {
        return None;
    }

    let raw = u16::from_be_bytes([data[12], data[13]]);
    let data_offset = (raw >> 12) as u8;
    if data_offset < 5 {
        return None;
    }

    Some(TcpHeader {
        source_port: u16::from_be_bytes([data[0], data[1]]),
        target_port: u16::from_be_bytes([data[2], data[3]]),
        seq: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
        ack: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
        data_offset,
        flags: TcpFlags::from_bits_truncate(raw & 0x01ff),
        window: u16::from_be_bytes([data[14], data[15]]),
        checksum: u16::from_be_bytes([data[16], data[17]]),
        urgent: u16::from_be_bytes([data[18], data[19]]),
    })
}

struct TcpConnState {
    connected: bool,
    state: TcpState,
    /// Next sequence number.
    seq: u32,
    /// Next acknowledgement number.
    ack: u32,
}

/// Stream connection record.
pub struct TcpConnection {
    local_port: Port,
    remote_port: Port,
    remote_addr: Ipv4Addr,
    /// True while an operation is draining the ack queue.
    listening: AtomicBool,
    state: IrqMutex<TcpConnState>,
    /// Acknowledgements observed by the decode path, drained by the
    /// operation that is `listening`.
    acks: IrqMutex<BoundedQueue<Packet, ACK_QUEUE_CAPACITY>>,
    queue: CondVar,
    socket: Weak<Socket>,
}

impl TcpConnection {
    fn new(local_port: Port, remote_port: Port, remote_addr: Ipv4Addr, socket: Weak<Socket>) -> Self {
        Self {
            local_port,
            remote_port,
            remote_addr,
            listening: AtomicBool::new(false),
            state: IrqMutex::new(TcpConnState {
                connected: false,
                state: TcpState::Closed,
                seq: 0,
                ack: 0,
            }),
            acks: IrqMutex::new(BoundedQueue::new()),
            queue: CondVar::new(),
            socket,
        }
    }

    #[inline]
    pub fn remote_addr(&self) -> Ipv4Addr {
        self.remote_addr
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    pub fn state(&self) -> TcpState {
        self.state.lock().state
    }

    /// Next (sequence, acknowledgement) pair.
    pub fn seq_ack(&self) -> (u32, u32) {
        let state = self.state.lock();
        (state.seq, state.ack)
    }

    fn set_state(&self, new: TcpState) {
        self.state.lock().state = new;
    }
}

impl PortPair for TcpConnection {
    fn local_port(&self) -> Port {
        self.local_port
    }

    fn remote_port(&self) -> Port {
        self.remote_port
    }
}

static CONNECTIONS: ConnectionTable<TcpConnection> = ConnectionTable::new();

/// Ephemeral port counter, incremented before use: the first connect gets 1024.
static LOCAL_PORT: AtomicU16 = AtomicU16::new(1023);

fn alloc_local_port() -> Port {
    Port(LOCAL_PORT.fetch_add(1, Ordering::Relaxed).wrapping_add(1))
}

/// Payload length of a decoded segment:
/// `ip.total_len − ihl×4 − data_offset×4`.
pub fn tcp_payload_len(pkt: &Packet) -> usize {
    let l3 = pkt.tag(Layer::Net);
    let l4 = pkt.tag(Layer::Transport);
    let b = pkt.bytes();

    let ihl = ((b[l3] & 0x0f) as usize) * 4;
    let total_len = u16::from_be_bytes([b[l3 + 2], b[l3 + 3]]) as usize;
    let data_offset = ((b[l4 + 12] >> 4) as usize) * 4;

    total_len.saturating_sub(ihl).saturating_sub(data_offset)
}

/// Decode a received segment.  Called from the internet layer with the
/// cursor at the TCP header.  Never blocks.
pub fn decode(iface: &Arc<Iface>, pkt: &mut Packet) {
    let start = pkt.index();
    pkt.set_tag(Layer::Transport, start);

    let Some(hdr) = parse_header(&pkt.bytes()[start..]) else {
        klog_debug!("tcp: truncated segment");
        return;
    };

    klog_trace!(
        "tcp: segment {} -> {} seq={} ack={}",
        hdr.source_port,
        hdr.target_port,
        hdr.seq,
        hdr.ack
    );

    let next_seq = hdr.ack;
    let next_ack = hdr.seq.wrapping_add(tcp_payload_len(pkt) as u32);

    match CONNECTIONS.get(Port(hdr.target_port), Port(hdr.source_port)) {
        Some(connection) => {
            {
                let mut state = connection.state.lock();
                state.seq = next_seq;
                state.ack = next_ack;
            }

            // Feed the operation draining the ack queue, if any.
            if connection.listening.load(Ordering::Acquire) {
                let full = {
                    let mut acks = connection.acks.lock();
                    acks.try_push(pkt.clone()).is_err()
                };
                if full {
                    klog_debug!("tcp: ack queue full, dropping segment");
                } else {
                    connection.queue.notify_one();
                }
            }

            // Fan data out to the owning socket.
            if hdr.flags.contains(TcpFlags::PSH) {
                if let Some(sock) = connection.socket.upgrade() {
                    if sock.is_listening() {
                        let mut copy = pkt.clone();
                        copy.advance(hdr.header_len());
                        sock.deliver(copy);
                    }
                }
            }
        }
        None => {
            klog_debug!(
                "tcp: no connection for segment {} -> {}",
                hdr.source_port,
                hdr.target_port
            );
        }
    }

    // Data segments are acknowledged immediately, without waiting.
    if hdr.flags.contains(TcpFlags::PSH) {
        let peer = ip::source_addr(pkt);
        match prepare_segment(
            peer,
            Port(hdr.target_port),
            Port(hdr.source_port),
            next_seq,
            next_ack,
            TcpFlags::ACK,
            0,
            false,
        ) {
            Ok(mut ack_pkt) => {
                if let Err(err) = finalize_direct(iface, &mut ack_pkt) {
                    klog_error!("tcp: failed to send ack: {}", err);
                }
            }
            Err(err) => {
                klog_error!("tcp: failed to prepare ack: {}", err);
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn prepare_segment(
    target: Ipv4Addr,
    source_port: Port,
    target_port: Port,
    seq: u32,
    ack: u32,
    flags: TcpFlags,
    payload_size: usize,
    user_owned: bool,
) -> Result<Packet, NetError> {
    let mut pkt = ip::prepare(
        &ip::PacketDescriptor {
            payload_size: HEADER_LEN + payload_size,
            target,
            protocol: IpProtocol::Tcp,
        },
        user_owned,
    )?;

    let start = pkt.index();
    pkt.set_tag(Layer::Transport, start);
    {
        let raw = pack_offset_flags((HEADER_LEN / 4) as u8, flags);
        let b = pkt.bytes_mut();
        b[start..start + 2].copy_from_slice(&source_port.to_network_bytes());
        b[start + 2..start + 4].copy_from_slice(&target_port.to_network_bytes());
        b[start + 4..start + 8].copy_from_slice(&seq.to_be_bytes());
        b[start + 8..start + 12].copy_from_slice(&ack.to_be_bytes());
        b[start + 12..start + 14].copy_from_slice(&raw.to_be_bytes());
        b[start + 14..start + 16].copy_from_slice(&DEFAULT_WINDOW.to_be_bytes());
        b[start + 16..start + 18].copy_from_slice(&[0, 0]);
        b[start + 18..start + 20].copy_from_slice(&[0, 0]);
    }
    pkt.advance(HEADER_LEN);
    Ok(pkt)
}

fn prepare_for(connection: &TcpConnection, flags: TcpFlags, payload_size: usize, user_owned: bool) -> Result<Packet, NetError> {
    let (seq, ack) = connection.seq_ack();
    prepare_segment(
        connection.remote_addr,
        connection.local_port,
        connection.remote_port,
        seq,
        ack,
        flags,
        payload_size,
        user_owned,
    )
}

/// One's-complement checksum over the pseudo-header, TCP header, and payload.
fn compute_checksum(pkt: &mut Packet) {
    let start = pkt.tag(Layer::Transport);
    let src = ip::source_addr(pkt);
    let dst = {
        let l3 = pkt.tag(Layer::Net);
        let b = pkt.bytes();
        Ipv4Addr([
            b[l3 + ip::DST_OFFSET],
            b[l3 + ip::DST_OFFSET + 1],
            b[l3 + ip::DST_OFFSET + 2],
            b[l3 + ip::DST_OFFSET + 3],
        ])
    };

    let tcp_len = pkt.len() - start;
    let b = pkt.bytes_mut();
    b[start + 16..start + 18].copy_from_slice(&[0, 0]);

    let mut sum = checksum::pseudo_header_sum(src, dst, IpProtocol::Tcp.as_u8(), tcp_len);
    sum = sum.wrapping_add(checksum::add_bytes(&b[start..]));
    let csum = checksum::finalize_nonzero(sum);
    b[start + 16..start + 18].copy_from_slice(&csum.to_be_bytes());
}

/// Checksum and transmit without waiting for an acknowledgement.
fn finalize_direct(iface: &Iface, pkt: &mut Packet) -> Result<(), NetError> {
    let start = pkt.tag(Layer::Transport);
    pkt.retreat(pkt.index() - start);
    compute_checksum(pkt);
    ip::finalize(iface, pkt)
}

/// Drain the ack queue until a packet arrives or `deadline` passes.
fn next_ack_packet(connection: &TcpConnection, deadline: u64) -> Option<Packet> {
    loop {
        if let Some(pkt) = connection.acks.lock().pop() {
            return Some(pkt);
        }
        let now = clock::milliseconds();
        if now >= deadline {
            return None;
        }
        if !connection.queue.wait_for(deadline - now) {
            // Timed out; a notify that raced the deadline still delivered.
            return connection.acks.lock().pop();
        }
    }
}

/// Transmit the segment and wait for the matching acknowledgement,
/// retransmitting the same frame on timeout.
///
/// A SYN expects SYN|ACK; anything else expects ACK.  On success the
/// connection's numbers advance to `seq ← ack_received`,
/// `ack ← seq_received + 1`.
fn finalize_with_retry(
    iface: &Iface,
    connection: &TcpConnection,
    pkt: &mut Packet,
) -> Result<(), NetError> {
    let start = pkt.tag(Layer::Transport);
    pkt.retreat(pkt.index() - start);
    compute_checksum(pkt);

    let sent_flags = {
        let b = pkt.bytes();
        TcpFlags::from_bits_truncate(u16::from_be_bytes([b[start + 12], b[start + 13]]) & 0x01ff)
    };
    let expects_syn_ack = sent_flags.contains(TcpFlags::SYN);

    connection.listening.store(true, Ordering::Release);

    let mut received = None;
    'attempts: for _ in 0..MAX_TRIES {
        if let Err(err) = ip::finalize(iface, pkt) {
            connection.listening.store(false, Ordering::Release);
            return Err(err);
        }

        let deadline = clock::milliseconds().saturating_add(TIMEOUT_MS);
        while let Some(reply) = next_ack_packet(connection, deadline) {
            let rstart = reply.index();
            let Some(hdr) = parse_header(&reply.bytes()[rstart..]) else {
                continue;
            };

            let matches = if expects_syn_ack {
                hdr.flags.contains(TcpFlags::SYN) && hdr.flags.contains(TcpFlags::ACK)
            } else {
                hdr.flags.contains(TcpFlags::ACK)
            };

            if matches {
                klog_trace!("tcp: received ack");
                received = Some((hdr.seq, hdr.ack));
                break 'attempts;
            }
            klog_trace!("tcp: unrelated answer while waiting for ack");
        }
        // Window expired; retransmit.
    }

    connection.listening.store(false, Ordering::Release);

    match received {
        Some((seq, ack)) => {
            let mut state = connection.state.lock();
            state.seq = ack;
            state.ack = seq.wrapping_add(1);
            Ok(())
        }
        None => Err(NetError::TcpError),
    }
}

fn teardown(sock: &Arc<Socket>, connection: &Arc<TcpConnection>) {
    CONNECTIONS.remove(connection);
    sock.clear_connection();
}

/// Open a connection to `remote_addr:remote_port`.
///
/// Sends a SYN and waits for the SYN|ACK (with retry), then acknowledges
/// it.  Returns the ephemeral local port on success.
pub fn connect(
    sock: &Arc<Socket>,
    iface: &Arc<Iface>,
    remote_port: Port,
    remote_addr: Ipv4Addr,
) -> Result<Port, NetError> {
    let connection = CONNECTIONS.insert(TcpConnection::new(
        alloc_local_port(),
        remote_port,
        remote_addr,
        Arc::downgrade(sock),
    ));
    sock.set_connection(ConnData::Tcp(connection.clone()));

    connection.set_state(TcpState::SynSent);

    klog_trace!("tcp: send syn");
    let result = prepare_for(&connection, TcpFlags::SYN, 0, false)
        .and_then(|mut pkt| finalize_with_retry(iface, &connection, &mut pkt));
    if let Err(err) = result {
        teardown(sock, &connection);
        return Err(err);
    }

    // The SYN|ACK is in; acknowledge it, fire-and-forget.
    klog_trace!("tcp: send ack");
    let result = prepare_for(&connection, TcpFlags::ACK, 0, false)
        .and_then(|mut pkt| finalize_direct(iface, &mut pkt));
    if let Err(err) = result {
        teardown(sock, &connection);
        return Err(err);
    }

    {
        let mut state = connection.state.lock();
        state.connected = true;
        state.state = TcpState::Established;
    }

    Ok(connection.local_port)
}

/// Send `buf` in one PSH|ACK segment and wait for its acknowledgement.
pub fn send(sock: &Arc<Socket>, buf: &[u8]) -> Result<(), NetError> {
    let connection = sock.tcp_connection()?;
    if !connection.is_connected() {
        return Err(NetError::NotConnected);
    }

    klog_trace!("tcp: send {} bytes", buf.len());

    let iface = netdev::select_iface(connection.remote_addr)?;
    let mut pkt = prepare_for(&connection, TcpFlags::PSH | TcpFlags::ACK, buf.len(), false)?;

    let at = pkt.index();
    pkt.bytes_mut()[at..at + buf.len()].copy_from_slice(buf);

    finalize_with_retry(&iface, &connection, &mut pkt)
}

fn read_payload(pkt: &Packet, buf: &mut [u8]) -> Result<usize, NetError> {
    let payload_len = tcp_payload_len(pkt);
    if payload_len > buf.len() {
        // Current policy: the segment is consumed and lost.
        return Err(NetError::BufferSmall);
    }

    // The decode path advanced the cursor past the transport header.
    let at = pkt.index();
    buf[..payload_len].copy_from_slice(&pkt.bytes()[at..at + payload_len]);
    Ok(payload_len)
}

/// Receive one segment's payload, blocking until data arrives.
pub fn receive(sock: &Arc<Socket>, buf: &mut [u8]) -> Result<usize, NetError> {
    let connection = sock.tcp_connection()?;
    if !connection.is_connected() {
        return Err(NetError::NotConnected);
    }

    let pkt = sock.wait_arrival()?;
    read_payload(&pkt, buf)
}

/// Receive one segment's payload, blocking at most `ms` milliseconds.
pub fn receive_timed(sock: &Arc<Socket>, buf: &mut [u8], ms: u64) -> Result<usize, NetError> {
    let connection = sock.tcp_connection()?;
    if !connection.is_connected() {
        return Err(NetError::NotConnected);
    }

    let pkt = sock.wait_arrival_timeout(ms)?;
    read_payload(&pkt, buf)
}

/// Close the connection: FIN|ACK with retry, handle either teardown
/// ordering the peer chooses, final ACK, and remove the connection.
pub fn disconnect(sock: &Arc<Socket>) -> Result<(), NetError> {
    let connection = sock.tcp_connection()?;
    if !connection.is_connected() {
        return Err(NetError::NotConnected);
    }

    klog_trace!("tcp: disconnect");

    let iface = netdev::select_iface(connection.remote_addr)?;
    let mut pkt = prepare_for(&connection, TcpFlags::FIN | TcpFlags::ACK, 0, false)?;
    let start = pkt.tag(Layer::Transport);
    pkt.retreat(pkt.index() - start);
    compute_checksum(&mut pkt);

    connection.set_state(TcpState::FinWait1);
    connection.listening.store(true, Ordering::Release);

    klog_trace!("tcp: send fin|ack");

    let mut got_fin_ack = false;
    let mut received = None;
    'attempts: for _ in 0..MAX_TRIES {
        if let Err(err) = ip::finalize(&iface, &mut pkt) {
            connection.listening.store(false, Ordering::Release);
            return Err(err);
        }

        let deadline = clock::milliseconds().saturating_add(TIMEOUT_MS);
        while let Some(reply) = next_ack_packet(&connection, deadline) {
            let rstart = reply.index();
            let Some(hdr) = parse_header(&reply.bytes()[rstart..]) else {
                continue;
            };

            if hdr.flags.contains(TcpFlags::FIN) && hdr.flags.contains(TcpFlags::ACK) {
                got_fin_ack = true;
                received = Some((hdr.seq, hdr.ack));
                break 'attempts;
            }
            if hdr.flags.contains(TcpFlags::ACK) {
                received = Some((hdr.seq, hdr.ack));
                break 'attempts;
            }
        }
    }

    let Some((seq, ack)) = received else {
        connection.listening.store(false, Ordering::Release);
        return Err(NetError::TcpError);
    };

    {
        let mut state = connection.state.lock();
        state.seq = ack;
        state.ack = seq.wrapping_add(1);
        state.state = if got_fin_ack {
            // Combined close: the peer acknowledged our FIN and sent its own.
            TcpState::TimeWait
        } else {
            TcpState::FinWait2
        };
    }

    if !got_fin_ack {
        // Sequential close: the peer acknowledged our FIN, its own FIN|ACK
        // follows within one more timeout window.
        klog_trace!("tcp: received ack, waiting for fin|ack");

        let deadline = clock::milliseconds().saturating_add(TIMEOUT_MS);
        let mut fin = None;
        while let Some(reply) = next_ack_packet(&connection, deadline) {
            let rstart = reply.index();
            let Some(hdr) = parse_header(&reply.bytes()[rstart..]) else {
                continue;
            };
            if hdr.flags.contains(TcpFlags::FIN) && hdr.flags.contains(TcpFlags::ACK) {
                fin = Some((hdr.seq, hdr.ack));
                break;
            }
        }

        let Some((seq, ack)) = fin else {
            connection.listening.store(false, Ordering::Release);
            return Err(NetError::TcpError);
        };

        let mut state = connection.state.lock();
        state.seq = ack;
        state.ack = seq.wrapping_add(1);
        state.state = TcpState::TimeWait;
    }

    connection.listening.store(false, Ordering::Release);

    // Acknowledge the peer's FIN.
    klog_trace!("tcp: send ack");
    let mut ack_pkt = prepare_for(&connection, TcpFlags::ACK, 0, false)?;
    finalize_direct(&iface, &mut ack_pkt)?;

    {
        let mut state = connection.state.lock();
        state.connected = false;
        state.state = TcpState::Closed;
    }

    teardown(sock, &connection);
    Ok(())
}

/// Prepare a user-owned PSH|ACK segment of `payload_size` bytes and
/// register it on the socket.  Returns the packet descriptor.
pub fn prepare_packet(sock: &Arc<Socket>, payload_size: usize) -> Result<usize, NetError> {
    let connection = sock.tcp_connection()?;
    if !connection.is_connected() {
        return Err(NetError::NotConnected);
    }

    let pkt = prepare_for(&connection, TcpFlags::PSH | TcpFlags::ACK, payload_size, true)?;
    Ok(sock.register_packet(pkt))
}

/// Finalise a previously prepared segment: transmit, wait for the
/// acknowledgement, retry on timeout.
pub fn finalize_packet(sock: &Arc<Socket>, fd: usize) -> Result<(), NetError> {
    let connection = sock.tcp_connection()?;
    let mut pkt = sock.take_packet(fd).ok_or(NetError::InvalidDescriptor)?;
    let iface = netdev::select_iface(connection.remote_addr)?;
    finalize_with_retry(&iface, &connection, &mut pkt)
}

#[cfg(test)]
pub(crate) fn reset_for_tests() {
    CONNECTIONS.clear();
    LOCAL_PORT.store(1023, Ordering::Relaxed);
}

#[cfg(test)]
pub(crate) fn connection_count() -> usize {
    CONNECTIONS.len()
}

#[cfg(test)]
pub(crate) fn lookup_connection(local: Port, remote: Port) -> Option<Arc<TcpConnection>> {
    CONNECTIONS.get(local, remote)
}
