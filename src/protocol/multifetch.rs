//! Parsing of multifetch element headers.
//!
//! When a read call requests several records at once, the server returns a
//! dedicated buffer with one header per record: element count first, then
//! per element its length, its individual response code, its ISN, and a
//! reserved word, all as 32-bit values.

use crate::protocol::wire::WireOrder;
use crate::{AdaError, AdaResult};
use byteorder::{BigEndian, ByteOrder, LittleEndian};

const ELEMENT_LEN: usize = 16;
const MAX_ELEMENTS: u32 = 10_000;

/// Bytes needed in the multifetch buffer for `elements` records.
#[must_use]
pub fn buffer_len(elements: u32) -> usize {
    4 + elements as usize * ELEMENT_LEN
}

/// Header of one record within a multifetch reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MultifetchElement {
    /// Length of the record's slice within the record buffer.
    pub record_len: u32,
    /// Response code for this record alone.
    pub response: u16,
    /// The record's ISN.
    pub isn: u64,
}

/// Parses the element headers out of a multifetch buffer.
///
/// # Errors
/// `AdaError::Corrupt` when the buffer is shorter than its own element
/// count requires, or the count is implausible.
pub fn parse_elements(raw: &[u8], order: WireOrder) -> AdaResult<Vec<MultifetchElement>> {
    match order {
        WireOrder::LittleEndian => parse::<LittleEndian>(raw),
        WireOrder::BigEndian => parse::<BigEndian>(raw),
    }
}

fn parse<B: ByteOrder>(raw: &[u8]) -> AdaResult<Vec<MultifetchElement>> {
    if raw.len() < 4 {
        return Err(AdaError::Corrupt("multifetch buffer too short for count"));
    }
    let count = B::read_u32(&raw[..4]);
    if count > MAX_ELEMENTS {
        return Err(AdaError::Corrupt("implausible multifetch element count"));
    }
    if raw.len() < buffer_len(count) {
        return Err(AdaError::Corrupt("multifetch buffer shorter than count"));
    }
    let mut elements = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        let offset = 4 + i * ELEMENT_LEN;
        elements.push(MultifetchElement {
            record_len: B::read_u32(&raw[offset..]),
            response: B::read_u32(&raw[offset + 4..]) as u16,
            isn: u64::from(B::read_u32(&raw[offset + 8..])),
        });
    }
    Ok(elements)
}
