//! Server platform detection from the session-open reply.

use crate::protocol::WireOrder;

const ARCH_MAINFRAME_MASK: u8 = 0xf0;
const ARCH_LOW_ORDER_BIT: u8 = 0x01;

const SPACE_EBCDIC: u8 = 0x40;
const SPACE_ASCII: u8 = 0x20;

/// Architecture properties of the database server, derived from the
/// architecture byte the server reports on session open.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Platform {
    architecture: u8,
}

impl Platform {
    #[must_use]
    pub fn from_architecture(architecture: u8) -> Self {
        Self { architecture }
    }

    /// Extracts the platform from the ISN-lower-limit field of the open
    /// reply; the architecture byte travels in byte 3.
    #[must_use]
    pub fn from_open_reply(isn_lower_limit: u64) -> Self {
        Self::from_architecture(((isn_lower_limit >> 24) & 0xff) as u8)
    }

    /// Mainframe servers report a zero high nibble.
    #[must_use]
    pub fn is_mainframe(self) -> bool {
        self.architecture & ARCH_MAINFRAME_MASK == 0
    }

    /// The space character of the server's character set.
    #[must_use]
    pub fn space_byte(self) -> u8 {
        if self.is_mainframe() {
            SPACE_EBCDIC
        } else {
            SPACE_ASCII
        }
    }

    /// The byte order record payloads arrive in.
    #[must_use]
    pub fn wire_order(self) -> WireOrder {
        if self.is_mainframe() {
            WireOrder::BigEndian
        } else if self.architecture & ARCH_LOW_ORDER_BIT == ARCH_LOW_ORDER_BIT {
            WireOrder::LittleEndian
        } else {
            WireOrder::BigEndian
        }
    }
}

impl Default for Platform {
    fn default() -> Self {
        // open-systems low-order until the open reply says otherwise
        Self::from_architecture(0x21)
    }
}

/// Renders the four byte-shifted decimal components of the version field
/// the server reports on session open.
#[must_use]
pub fn version_from_quantity(isn_quantity: u64) -> String {
    format!(
        "{}.{}.{}.{}",
        (isn_quantity >> 24) & 0xff,
        (isn_quantity >> 16) & 0xff,
        (isn_quantity >> 8) & 0xff,
        isn_quantity & 0xff
    )
}
