//! Call buffers and their 48-byte wire descriptors.

use crate::{AdaError, AdaResult};

/// Serialized length of a buffer descriptor.
pub const BUFFER_DESCRIPTOR_LEN: u16 = 48;

/// Eyecatcher byte of the buffer descriptor.
pub(crate) const BD_EYECATCHER: u8 = b'G';
/// Structure version marker.
pub(crate) const BD_VERSION: u8 = b'2';

/// Buffer location marker: data follows the descriptor inline.
pub(crate) const BD_LOCATION_INLINE: u8 = b'I';

/// The role a buffer plays in a call, encoded as its id byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferKind {
    /// Field selection sent to the server.
    Format,
    /// Record payload, sent on write commands, received on reads.
    Record,
    /// Search criteria.
    Search,
    /// Search values.
    Value,
    /// Multifetch element headers returned by the server.
    Multifetch,
    /// An id this engine does not issue; kept verbatim for server replies.
    Other(u8),
}

impl BufferKind {
    #[must_use]
    pub fn id(self) -> u8 {
        match self {
            Self::Format => b'F',
            Self::Record => b'R',
            Self::Search => b'S',
            Self::Value => b'V',
            Self::Multifetch => b'M',
            Self::Other(id) => id,
        }
    }

    #[must_use]
    pub fn from_id(id: u8) -> Self {
        match id {
            b'F' => Self::Format,
            b'R' => Self::Record,
            b'S' => Self::Search,
            b'V' => Self::Value,
            b'M' => Self::Multifetch,
            other => Self::Other(other),
        }
    }
}

/// A single call buffer: the descriptor bookkeeping plus the payload bytes.
///
/// `size` is the declared buffer size, `send`/`recv` the transfer sizes of
/// the upcoming or completed call. The declared size never exceeds the
/// allocated capacity of `data`.
#[derive(Clone, Debug)]
pub struct Buffer {
    kind: BufferKind,
    size: u64,
    send: u64,
    recv: u64,
    data: Vec<u8>,
}

impl Buffer {
    /// An empty buffer of the given kind.
    #[must_use]
    pub fn new(kind: BufferKind) -> Self {
        Self {
            kind,
            size: 0,
            send: 0,
            recv: 0,
            data: Vec::new(),
        }
    }

    /// A receive buffer with `capacity` bytes declared and allocated.
    #[must_use]
    pub fn with_capacity(kind: BufferKind, capacity: usize) -> Self {
        let mut buffer = Self::new(kind);
        buffer.allocate(capacity);
        buffer
    }

    /// A send buffer preloaded with `bytes`.
    #[must_use]
    pub fn from_bytes(kind: BufferKind, bytes: &[u8]) -> Self {
        let mut buffer = Self::new(kind);
        buffer.write_bytes(bytes);
        buffer
    }

    /// A send buffer preloaded with the bytes of `text`.
    #[must_use]
    pub fn from_text(kind: BufferKind, text: &str) -> Self {
        Self::from_bytes(kind, text.as_bytes())
    }

    #[must_use]
    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    /// Declared buffer size.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Transfer size towards the server.
    #[must_use]
    pub fn send_size(&self) -> u64 {
        self.send
    }

    /// Transfer size from the server.
    #[must_use]
    pub fn recv_size(&self) -> u64 {
        self.recv
    }

    /// Appends payload bytes and grows declared size and send size with
    /// them.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
        self.size = self.data.len() as u64;
        self.send = self.size;
    }

    /// Appends the bytes of `text`, see [`Self::write_bytes`].
    pub fn write_str(&mut self, text: &str) {
        self.write_bytes(text.as_bytes());
    }

    /// Declares and allocates `capacity` bytes for receiving.
    pub fn allocate(&mut self, capacity: usize) {
        self.data.resize(capacity, 0);
        self.size = capacity as u64;
    }

    /// The payload bytes received with the last call.
    #[must_use]
    pub fn received(&self) -> &[u8] {
        let len = (self.recv as usize).min(self.data.len());
        &self.data[..len]
    }

    /// The payload bytes to be sent with the next call.
    #[must_use]
    pub fn to_send(&self) -> &[u8] {
        let len = (self.send as usize).min(self.data.len());
        &self.data[..len]
    }

    /// Fills the buffer as if the server had returned `bytes`.
    ///
    /// This is the server-role counterpart of [`Self::write_bytes`] and the
    /// hook test drivers use to script replies.
    pub fn provide(&mut self, bytes: &[u8]) {
        if self.data.len() < bytes.len() {
            self.data.resize(bytes.len(), 0);
        }
        self.data[..bytes.len()].copy_from_slice(bytes);
        if self.size < bytes.len() as u64 {
            self.size = bytes.len() as u64;
        }
        self.recv = bytes.len() as u64;
    }

    /// Resets the transfer sizes for the next call of a fetch loop.
    ///
    /// Format buffers keep sending their selection and never receive;
    /// record buffers expect a full refill and send nothing.
    pub fn reset_transfer_sizes(&mut self) {
        match self.kind {
            BufferKind::Format | BufferKind::Search | BufferKind::Value => {
                self.recv = 0;
            }
            BufferKind::Record | BufferKind::Multifetch | BufferKind::Other(_) => {
                self.recv = self.size;
                self.send = 0;
            }
        }
    }

    pub(crate) fn set_recv_size(&mut self, recv: u64) {
        self.recv = recv;
    }

    pub(crate) fn set_send_size(&mut self, send: u64) {
        self.send = send;
    }

    pub(crate) fn raw_data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn raw_data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub(crate) fn validate_descriptor(version: [u8; 2]) -> AdaResult<()> {
        if version != [BD_EYECATCHER, BD_VERSION] {
            return Err(AdaError::Corrupt("buffer descriptor version mismatch"));
        }
        Ok(())
    }
}
