//! The binary call convention: control block, buffers, wire framing.

pub(crate) mod buffer;
pub(crate) mod command;
pub(crate) mod control_block;
pub mod multifetch;
pub mod wire;

pub use buffer::{BUFFER_DESCRIPTOR_LEN, Buffer, BufferKind};
pub use command::CommandCode;
pub use control_block::{
    CONTROL_BLOCK_LEN, ControlBlock, RESPONSE_COMM_ERROR, RESPONSE_EOF, RESPONSE_HOLD_CONFLICT,
    RESPONSE_INACTIVE, RESPONSE_NORMAL,
};
pub use wire::{Role, WireOrder};
