//! Command codes and the protocol-fixed option byte table.
//!
//! The two-character command codes and the single option bytes are part of
//! the externally mandated binary contract; they must be emitted verbatim.

/// Option byte values placed into the control block's option array.
///
/// These are fixed by the server side of the protocol, not chosen here.
pub(crate) const OPT_EMPTY: u8 = b' ';
/// Multifetch with fixed-size element headers.
pub(crate) const OPT_MULTIFETCH: u8 = b'M';
/// Read the descriptor values in ascending order.
pub(crate) const OPT_ASCENDING: u8 = b'A';
/// Read the descriptor values in descending order.
pub(crate) const OPT_DESCENDING: u8 = b'D';
/// Keep the ISN list of a search on hold.
pub(crate) const OPT_SEARCH_HOLD: u8 = b'H';
/// Read records following the ISN sequence of the file.
pub(crate) const OPT_ISN_SEQUENCE: u8 = b'I';
/// Read from the ISN list produced by a preceding search.
pub(crate) const OPT_FROM_ISN_LIST: u8 = b'N';
/// Update exchanges the whole record instead of patching fields.
pub(crate) const OPT_EXCHANGE: u8 = b'X';
/// Update acquires the record hold implicitly.
pub(crate) const OPT_HOLD: u8 = b'H';
/// Extended field definition table layout for LF.
pub(crate) const OPT_FDT_EXTENDED: u8 = b'X';
/// Hold conflicts return response 145 instead of waiting.
pub(crate) const OPT_HOLD_RESPONSE: u8 = b'R';
/// Read without acquiring any hold even in a hold command family.
pub(crate) const OPT_ACCESS_ONLY: u8 = b'A';

/// Command-id value signalling a sequential read without continuation
/// context. Zero starts a new server-side correlation instead.
pub(crate) const COMMAND_ID_SEQUENTIAL: [u8; 4] = [0xff, 0xff, 0xff, 0xff];
pub(crate) const COMMAND_ID_NONE: [u8; 4] = [0, 0, 0, 0];

/// The set of commands the engine can issue or receive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandCode {
    /// Placeholder before the first call.
    Empty,
    /// Open a user session.
    Op,
    /// Close the user session.
    Cl,
    /// Backout the current transaction.
    Bt,
    /// End (commit) the current transaction.
    Et,
    /// Read the field definition table of a file.
    Lf,
    /// Read a record by ISN.
    L1,
    /// Read records in physical order.
    L2,
    /// Read records in logical (descriptor) order.
    L3,
    /// Read a record by ISN, with hold.
    L4,
    /// Read records in physical order, with hold.
    L5,
    /// Read records in logical order, with hold.
    L6,
    /// Histogram over a descriptor.
    L9,
    /// Store a record, ISN assigned by the server.
    N1,
    /// Store a record under a caller-provided ISN.
    N2,
    /// Update a record.
    A1,
    /// Search, result as ISN list.
    S1,
    /// Search with sorted result.
    S2,
    /// Search using a stored search.
    S3,
    /// Delete a record.
    E1,
    /// Hold a record.
    U1,
    /// Release all holds of the user.
    U2,
    /// Hold management.
    U3,
    /// Release a command id.
    Rc,
    /// Release the hold on a single ISN.
    Ri,
}

impl CommandCode {
    /// The two ASCII bytes placed into the control block.
    #[must_use]
    pub fn code(self) -> [u8; 2] {
        let s = self.as_str().as_bytes();
        [s[0], s[1]]
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "  ",
            Self::Op => "OP",
            Self::Cl => "CL",
            Self::Bt => "BT",
            Self::Et => "ET",
            Self::Lf => "LF",
            Self::L1 => "L1",
            Self::L2 => "L2",
            Self::L3 => "L3",
            Self::L4 => "L4",
            Self::L5 => "L5",
            Self::L6 => "L6",
            Self::L9 => "L9",
            Self::N1 => "N1",
            Self::N2 => "N2",
            Self::A1 => "A1",
            Self::S1 => "S1",
            Self::S2 => "S2",
            Self::S3 => "S3",
            Self::E1 => "E1",
            Self::U1 => "U1",
            Self::U2 => "U2",
            Self::U3 => "U3",
            Self::Rc => "RC",
            Self::Ri => "RI",
        }
    }

    /// Maps the two wire bytes back to a command, `None` for anything that
    /// is not a valid command of this protocol.
    #[must_use]
    pub fn from_code(code: [u8; 2]) -> Option<Self> {
        Some(match &code {
            b"  " => Self::Empty,
            b"OP" => Self::Op,
            b"CL" => Self::Cl,
            b"BT" => Self::Bt,
            b"ET" => Self::Et,
            b"LF" => Self::Lf,
            b"L1" => Self::L1,
            b"L2" => Self::L2,
            b"L3" => Self::L3,
            b"L4" => Self::L4,
            b"L5" => Self::L5,
            b"L6" => Self::L6,
            b"L9" => Self::L9,
            b"N1" => Self::N1,
            b"N2" => Self::N2,
            b"A1" => Self::A1,
            b"S1" => Self::S1,
            b"S2" => Self::S2,
            b"S3" => Self::S3,
            b"E1" => Self::E1,
            b"U1" => Self::U1,
            b"U2" => Self::U2,
            b"U3" => Self::U3,
            b"RC" => Self::Rc,
            b"RI" => Self::Ri,
            _ => return None,
        })
    }

    /// True for read commands that continue at ISN + 1 between calls.
    /// Physical and logical reads are positioned by the server instead.
    pub(crate) fn advances_isn(self) -> bool {
        matches!(self, Self::L1 | Self::L4)
    }

    /// True when the record's own ISN is meaningful in the result.
    pub(crate) fn keeps_record_isn(self) -> bool {
        !matches!(self, Self::L9)
    }
}

impl std::fmt::Display for CommandCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
