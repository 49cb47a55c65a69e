//! Kernel socket object.
//!
//! A socket is the meeting point between the syscall layer and a transport
//! connection: it carries the listen queue arrivals are delivered to, the
//! condition variable readers block on, and the table of prepared outgoing
//! packets a user process fills before finalising.
//!
//! The socket's transport type determines the shape of its connection
//! record, so the record is held in a tagged variant rather than an untyped
//! pointer.  The connection table owns the records; the socket's handle and
//! the record's back-pointer form the owner/borrow pair (`Arc` forward,
//! `Weak` back) that breaks the reference cycle.

extern crate alloc;

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use driftos_lib::kernel_services::scheduler;
use driftos_lib::{klog_debug, BoundedQueue, CondVar, IrqMutex};

use crate::packet::Packet;
use crate::tcp::TcpConnection;
use crate::types::NetError;
use crate::udp::UdpConnection;

/// Sentinel id of an invalidated socket.
pub const INVALID_SOCKET_ID: u32 = u32::MAX;

/// Capacity of the listen queue.
pub const LISTEN_QUEUE_CAPACITY: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocketDomain {
    /// IPv4.
    Inet,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocketType {
    /// Connection-oriented, reliable, ordered.
    Stream,
    /// Connectionless datagrams.
    Datagram,
    /// Raw internet packets.
    Raw,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocketProtocol {
    Icmp,
    Tcp,
    Udp,
}

/// Transport-specific connection record, keyed by the socket's type.
pub enum ConnData {
    None,
    Tcp(Arc<TcpConnection>),
    Udp(Arc<UdpConnection>),
}

pub struct Socket {
    id: AtomicU32,
    pub domain: SocketDomain,
    pub ty: SocketType,
    pub protocol: SocketProtocol,
    next_fd: AtomicUsize,
    listening: AtomicBool,
    connection: IrqMutex<ConnData>,
    prepared: IrqMutex<Vec<Packet>>,
    listen_packets: IrqMutex<BoundedQueue<Packet, LISTEN_QUEUE_CAPACITY>>,
    listen_queue: CondVar,
}

impl Socket {
    pub fn new(id: u32, domain: SocketDomain, ty: SocketType, protocol: SocketProtocol) -> Self {
        Self {
            id: AtomicU32::new(id),
            domain,
            ty,
            protocol,
            next_fd: AtomicUsize::new(0),
            listening: AtomicBool::new(false),
            connection: IrqMutex::new(ConnData::None),
            prepared: IrqMutex::new(Vec::new()),
            listen_packets: IrqMutex::new(BoundedQueue::new()),
            listen_queue: CondVar::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id.load(Ordering::Relaxed)
    }

    /// Mark the socket id as the all-ones sentinel.
    pub fn invalidate(&self) {
        self.id.store(INVALID_SOCKET_ID, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.id() != INVALID_SOCKET_ID
    }

    /// Enable or disable delivery of arrivals to the listen queue.
    pub fn set_listening(&self, listening: bool) {
        self.listening.store(listening, Ordering::Release);
    }

    #[inline]
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Acquire)
    }

    // --- Connection binding -------------------------------------------------

    pub fn set_connection(&self, connection: ConnData) {
        *self.connection.lock() = connection;
    }

    pub fn clear_connection(&self) {
        *self.connection.lock() = ConnData::None;
    }

    pub(crate) fn tcp_connection(&self) -> Result<Arc<TcpConnection>, NetError> {
        match &*self.connection.lock() {
            ConnData::Tcp(connection) => Ok(connection.clone()),
            _ => Err(NetError::NotConnected),
        }
    }

    pub(crate) fn udp_connection(&self) -> Result<Arc<UdpConnection>, NetError> {
        match &*self.connection.lock() {
            ConnData::Udp(connection) => Ok(connection.clone()),
            _ => Err(NetError::NotConnected),
        }
    }

    // --- Prepared-packet descriptor table -----------------------------------

    /// Register a prepared packet, assigning it the next descriptor.
    pub fn register_packet(&self, mut packet: Packet) -> usize {
        let fd = self.next_fd.fetch_add(1, Ordering::Relaxed);
        packet.set_fd(fd);
        self.prepared.lock().push(packet);
        fd
    }

    pub fn has_packet(&self, fd: usize) -> bool {
        self.prepared.lock().iter().any(|p| p.fd() == fd)
    }

    /// Run `f` on the prepared packet with descriptor `fd`.
    pub fn with_packet_mut<R>(&self, fd: usize, f: impl FnOnce(&mut Packet) -> R) -> Option<R> {
        let mut prepared = self.prepared.lock();
        prepared.iter_mut().find(|p| p.fd() == fd).map(f)
    }

    /// Remove and return the prepared packet with descriptor `fd`.
    pub fn take_packet(&self, fd: usize) -> Option<Packet> {
        let mut prepared = self.prepared.lock();
        let pos = prepared.iter().position(|p| p.fd() == fd)?;
        Some(prepared.swap_remove(pos))
    }

    /// Discard the prepared packet with descriptor `fd`.
    pub fn erase_packet(&self, fd: usize) {
        self.prepared.lock().retain(|p| p.fd() != fd);
    }

    // --- Listen queue -------------------------------------------------------

    /// Deliver an arrival to the listen queue and wake one blocked reader.
    ///
    /// The queue is bounded; an arrival that does not fit is dropped.
    pub(crate) fn deliver(&self, packet: Packet) {
        {
            let mut queue = self.listen_packets.lock();
            if queue.try_push(packet).is_err() {
                klog_debug!("socket {}: listen queue full, dropping packet", self.id());
                return;
            }
        }
        self.listen_queue.notify_one();
    }

    pub(crate) fn try_take_arrival(&self) -> Option<Packet> {
        self.listen_packets.lock().pop()
    }

    /// Dequeue an arrival, blocking until one is delivered.
    pub(crate) fn wait_arrival(&self) -> Result<Packet, NetError> {
        loop {
            if let Some(packet) = self.try_take_arrival() {
                return Ok(packet);
            }
            if !scheduler::is_initialized() {
                return Err(NetError::SocketTimeout);
            }
            self.listen_queue.wait();
        }
    }

    /// Dequeue an arrival, blocking at most `ms` milliseconds.
    ///
    /// `ms == 0` means non-blocking: fail immediately when nothing is queued.
    pub(crate) fn wait_arrival_timeout(&self, ms: u64) -> Result<Packet, NetError> {
        if let Some(packet) = self.try_take_arrival() {
            return Ok(packet);
        }
        if ms == 0 {
            return Err(NetError::SocketTimeout);
        }
        // Whether the wait was notified or timed out, take whatever is
        // queued now; a notify that raced the deadline still delivered.
        let _ = self.listen_queue.wait_for(ms);
        self.try_take_arrival().ok_or(NetError::SocketTimeout)
    }

    pub fn pending_arrivals(&self) -> u32 {
        self.listen_packets.lock().len()
    }
}
