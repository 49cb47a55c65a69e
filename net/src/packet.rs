//! Tagged packet buffer: the single currency exchanged between the driver
//! layer and the protocol stack.
//!
//! A `Packet` owns one contiguous byte region holding a complete frame and
//! carries the metadata every layer needs to find its header again without
//! reparsing: a write/read cursor (`index`) and one offset tag per enclosed
//! layer (link / internet / transport).
//!
//! # Cursor discipline
//!
//! * TX path: each layer's `prepare` tags its header offset and advances the
//!   cursor past its header, so the buffer comes back with the cursor at the
//!   caller's payload region.  `finalize` walks the cursor back to its own
//!   tag before writing the header and checksum.
//! * RX path: each layer's `decode` tags the current cursor and advances
//!   past its header before dispatching upward.
//!
//! # Ownership
//!
//! A packet is owned by exactly one place at a time: a socket's descriptor
//! table, a queue slot, or the current caller's stack.  Transfer is a move;
//! the decode path clones (deep copy) when two queues need the same arrival.
//! The backing storage is freed on drop.

use alloc::vec::Vec;

use crate::types::NetError;

/// Number of tagged layers (link, internet, transport).
pub const LAYER_COUNT: usize = 3;

/// Descriptor value of a packet not registered with any socket.
pub const INVALID_FD: usize = usize::MAX;

/// Protocol layer index for the offset tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum Layer {
    /// Link layer (Ethernet).
    Link = 0,
    /// Internet layer (IPv4).
    Net = 1,
    /// Transport layer (TCP/UDP/ICMP).
    Transport = 2,
}

pub struct Packet {
    data: Vec<u8>,
    index: usize,
    tags: [Option<u16>; LAYER_COUNT],
    fd: usize,
    user_owned: bool,
}

impl Packet {
    /// Allocate a zeroed packet of exactly `size` bytes.
    ///
    /// `user_owned` marks buffers prepared on behalf of a user process (the
    /// zero-copy send path); they are registered on a socket rather than
    /// consumed immediately.
    pub fn new(size: usize, user_owned: bool) -> Result<Self, NetError> {
        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|_| NetError::OutOfMemory)?;
        data.resize(size, 0);
        Ok(Self {
            data,
            index: 0,
            tags: [None; LAYER_COUNT],
            fd: INVALID_FD,
            user_owned,
        })
    }

    /// Allocate a packet holding a copy of a raw ingress frame, cursor at 0.
    pub fn from_frame(frame: &[u8]) -> Result<Self, NetError> {
        let mut pkt = Self::new(frame.len(), false)?;
        pkt.data.copy_from_slice(frame);
        Ok(pkt)
    }

    /// Total buffer length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current cursor position.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Move the cursor forward by `n` bytes.
    #[inline]
    pub fn advance(&mut self, n: usize) {
        assert!(
            self.index + n <= self.data.len(),
            "packet: cursor advanced past end (index={}, n={}, len={})",
            self.index,
            n,
            self.data.len()
        );
        self.index += n;
    }

    /// Move the cursor backward by `n` bytes.
    #[inline]
    pub fn retreat(&mut self, n: usize) {
        assert!(
            n <= self.index,
            "packet: cursor retreated past start (index={}, n={})",
            self.index,
            n
        );
        self.index -= n;
    }

    /// Record the byte offset of `layer`'s header.  Idempotent per packet.
    #[inline]
    pub fn set_tag(&mut self, layer: Layer, offset: usize) {
        self.tags[layer as usize] = Some(offset as u16);
    }

    /// Byte offset of `layer`'s header.
    ///
    /// Reading a tag that was never set is a programming error.
    #[inline]
    pub fn tag(&self, layer: Layer) -> usize {
        self.tags[layer as usize].expect("packet: layer tag read before it was set") as usize
    }

    #[inline]
    pub fn has_tag(&self, layer: Layer) -> bool {
        self.tags[layer as usize].is_some()
    }

    /// Descriptor assigned when the packet was registered with a socket,
    /// or [`INVALID_FD`].
    #[inline]
    pub fn fd(&self) -> usize {
        self.fd
    }

    #[inline]
    pub(crate) fn set_fd(&mut self, fd: usize) {
        self.fd = fd;
    }

    /// `true` for buffers prepared on behalf of a user process.
    #[inline]
    pub fn is_user_owned(&self) -> bool {
        self.user_owned
    }

    /// The entire backing buffer.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// The region from the cursor to the end of the buffer.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.data[self.index..]
    }

    #[inline]
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.index..]
    }
}

impl Clone for Packet {
    /// Deep copy: the clone has identical byte contents, tags, cursor, and
    /// descriptor, backed by its own allocation.
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            index: self.index,
            tags: self.tags,
            fd: self.fd,
            user_owned: self.user_owned,
        }
    }
}

impl core::fmt::Debug for Packet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "Packet {{ len={}, index={}, tags=[{:?}, {:?}, {:?}], fd={} }}",
            self.data.len(),
            self.index,
            self.tags[0],
            self.tags[1],
            self.tags[2],
            self.fd as isize
        )
    }
}
