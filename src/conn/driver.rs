//! The transport seam: drivers carry a call frame to the database.

use crate::conn::session_id::AdabasId;
use crate::protocol::{Buffer, BufferKind, ControlBlock};
use crate::target::Target;
use crate::{AdaError, AdaResult};

/// One call in flight: the control block plus the buffer set, in the order
/// they go onto the wire.
#[derive(Clone, Debug)]
pub struct CallUnit {
    pub control_block: ControlBlock,
    pub buffers: Vec<Buffer>,
}

impl CallUnit {
    #[must_use]
    pub fn new(dbid: u32) -> Self {
        Self {
            control_block: ControlBlock::new(dbid),
            buffers: Vec::new(),
        }
    }

    /// Replaces the buffer set for the next call.
    pub fn set_buffers(&mut self, buffers: Vec<Buffer>) {
        self.buffers = buffers;
    }

    /// The first buffer of the given kind, if present.
    #[must_use]
    pub fn buffer(&self, kind: BufferKind) -> Option<&Buffer> {
        self.buffers.iter().find(|b| b.kind().id() == kind.id())
    }

    /// Mutable access to the first buffer of the given kind.
    #[must_use]
    pub fn buffer_mut(&mut self, kind: BufferKind) -> Option<&mut Buffer> {
        self.buffers.iter_mut().find(|b| b.kind().id() == kind.id())
    }
}

/// A physical transport to one database.
///
/// Implementations frame the call with the wire codec (or hand it to a
/// local IPC mechanism), send it, and fill the same `CallUnit` with the
/// reply. The engine holds one connected driver per target, shared by all
/// sessions cloned from each other.
pub trait Driver: Send + std::fmt::Debug {
    /// Establishes the physical connection.
    fn connect(&mut self) -> AdaResult<()>;

    /// Tears the physical connection down. Must be idempotent.
    fn disconnect(&mut self) -> AdaResult<()>;

    /// Performs one blocking call round trip, replacing the control
    /// block's reply fields and the buffer contents in place.
    fn send(&mut self, call: &mut CallUnit) -> AdaResult<()>;
}

/// Builds a driver for a target; registered in the [`crate::Registry`]
/// under the driver name used in target descriptors.
pub type DriverFactory =
    Box<dyn Fn(&Target, &AdabasId) -> AdaResult<Box<dyn Driver>> + Send + Sync>;

pub(crate) fn unknown_driver(target: &Target) -> AdaError {
    AdaError::UnknownDriver(
        target
            .driver()
            .unwrap_or("<local>")
            .to_string(),
    )
}
