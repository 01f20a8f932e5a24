//! The 192-byte call control block.

use crate::protocol::command::{COMMAND_ID_NONE, CommandCode, OPT_EMPTY};

/// Serialized length of the control block.
pub const CONTROL_BLOCK_LEN: u16 = 192;

/// Eyecatcher byte of the control block.
pub(crate) const CB_EYECATCHER: u8 = b'F';
/// Structure version marker.
pub(crate) const CB_VERSION: u8 = b'2';

/// Response code of a successful call.
pub const RESPONSE_NORMAL: u16 = 0;
/// Response code signalling end of file on a read sequence; never an error.
pub const RESPONSE_EOF: u16 = 3;
/// Record is held by another user.
pub const RESPONSE_HOLD_CONFLICT: u16 = 145;
/// The database is not active; also the initial value before any call.
pub const RESPONSE_INACTIVE: u16 = 148;
/// Communication with the database failed.
pub const RESPONSE_COMM_ERROR: u16 = 149;

/// The fixed-layout block that travels with every call, carrying the
/// command, its addressing, its options, and (on return) the response.
///
/// All multi-byte fields are serialized by the wire codec; the struct
/// itself keeps them in native representation.
#[derive(Clone, Debug)]
pub struct ControlBlock {
    /// Call type discriminator.
    pub typ: u8,
    /// Eyecatcher and structure version, `b"F2"`.
    pub version: [u8; 2],
    /// Serialized length, always 192.
    pub block_len: u16,
    /// Two-character command code.
    pub command: [u8; 2],
    /// Response code set by the server.
    pub response: u16,
    /// Command id correlating sequential calls.
    pub command_id: [u8; 4],
    /// Database id.
    pub dbid: u32,
    /// File number.
    pub file_nr: u32,
    /// Record ISN.
    pub isn: u64,
    /// ISN lower limit; also caps the element count of a multifetch call.
    pub isn_lower_limit: u64,
    /// ISN quantity, e.g. the hit count of a search.
    pub isn_quantity: u64,
    /// Command options.
    pub options: [u8; 8],
    /// Additions 1, carries descriptor names for logical reads.
    pub additions1: [u8; 8],
    /// Additions 2, carries compressed lengths or error detail.
    pub additions2: [u8; 4],
    /// Additions 3, security credentials.
    pub additions3: [u8; 8],
    /// Additions 4, cipher code / messaging.
    pub additions4: [u8; 8],
    /// Additions 5.
    pub additions5: [u8; 8],
    /// Additions 6.
    pub additions6: [u8; 8],
    /// Error offset within the failing buffer.
    pub error_offset: u64,
    /// Error character set.
    pub error_char: [u8; 2],
    /// Error device.
    pub error_device: u16,
    /// Error sub-response code.
    pub error_sub: u16,
    /// Erroneous buffer id.
    pub error_buffer_id: u8,
    /// Sub-component response code.
    pub sub_response: u16,
    /// Sub-component error code.
    pub sub_error: u16,
    /// Sub-component error detail.
    pub sub_detail: [u8; 4],
    /// Compressed record length of the last call.
    pub compressed_len: u64,
    /// Decompressed record length of the last call.
    pub decompressed_len: u64,
    /// Command execution time reported by the server.
    pub command_time: u64,
    /// User area, not touched by the server.
    pub user_area: [u8; 16],
}

impl ControlBlock {
    /// A fresh control block addressing `dbid`, with the response preset
    /// to "inactive" so that a call that never reaches the server is
    /// reported as such.
    #[must_use]
    pub fn new(dbid: u32) -> Self {
        Self {
            typ: 0x30,
            version: [CB_EYECATCHER, CB_VERSION],
            block_len: CONTROL_BLOCK_LEN,
            command: CommandCode::Empty.code(),
            response: RESPONSE_INACTIVE,
            command_id: COMMAND_ID_NONE,
            dbid,
            file_nr: 0,
            isn: 0,
            isn_lower_limit: 0,
            isn_quantity: 0,
            options: [OPT_EMPTY; 8],
            additions1: [OPT_EMPTY; 8],
            additions2: [OPT_EMPTY; 4],
            additions3: [0; 8],
            additions4: [0; 8],
            additions5: [0; 8],
            additions6: [0; 8],
            error_offset: 0,
            error_char: [0; 2],
            error_device: 0,
            error_sub: 0,
            error_buffer_id: 0,
            sub_response: 0,
            sub_error: 0,
            sub_detail: [0; 4],
            compressed_len: 0,
            decompressed_len: 0,
            command_time: 0,
            user_area: [0; 16],
        }
    }

    /// Installs the command for the next call and resets the reply fields
    /// of the previous one.
    pub fn prepare_command(&mut self, command: CommandCode) {
        self.command = command.code();
        self.response = RESPONSE_INACTIVE;
        self.options = [OPT_EMPTY; 8];
        self.error_offset = 0;
        self.error_sub = 0;
        self.sub_response = 0;
        self.sub_error = 0;
        self.compressed_len = 0;
        self.decompressed_len = 0;
        self.command_time = 0;
    }

    /// The currently installed command, if it is a known one.
    #[must_use]
    pub fn command_code(&self) -> Option<CommandCode> {
        CommandCode::from_code(self.command)
    }

    /// True when the last call completed without a negative response
    /// (end of file counts as success).
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.response <= RESPONSE_EOF
    }
}

#[cfg(test)]
mod tests {
    use super::{ControlBlock, RESPONSE_INACTIVE};
    use crate::protocol::CommandCode;

    #[test]
    fn fresh_block_is_inactive() {
        let cb = ControlBlock::new(24);
        assert_eq!(cb.dbid, 24);
        assert_eq!(cb.response, RESPONSE_INACTIVE);
        assert_eq!(cb.version, *b"F2");
        assert_eq!(cb.block_len, 192);
        assert!(!cb.is_ok());
    }

    #[test]
    fn prepare_clears_reply_fields() {
        let mut cb = ControlBlock::new(1);
        cb.response = 0;
        cb.sub_response = 17;
        cb.command_time = 99;
        cb.prepare_command(CommandCode::L2);
        assert_eq!(cb.command, *b"L2");
        assert_eq!(cb.response, RESPONSE_INACTIVE);
        assert_eq!(cb.sub_response, 0);
        assert_eq!(cb.command_time, 0);
    }
}
