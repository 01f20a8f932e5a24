//! The seam towards the value layer.
//!
//! The engine does not interpret record payloads. A [`RecordDefinition`]
//! supplies the field selection for the format buffer and consumes the raw
//! record bytes after each call; everything about field types and value
//! conversion lives behind this trait.

use crate::protocol::WireOrder;
use crate::{AdaError, AdaResult};

/// The format selection and the record-buffer length it requires.
#[derive(Clone, Debug)]
pub struct FormatSpec {
    /// Format buffer content, e.g. `b"AA,8,A,AB,4,B."`.
    pub buffer: Vec<u8>,
    /// Record buffer length this selection needs per record.
    pub record_length: u32,
}

impl FormatSpec {
    #[must_use]
    pub fn new(buffer: impl Into<Vec<u8>>, record_length: u32) -> Self {
        Self {
            buffer: buffer.into(),
            record_length,
        }
    }
}

/// Value-layer view of the records a fetch produces.
///
/// The fetch loop calls `create_values` before each primary call,
/// `parse_buffer` for every returned record slice, and, as long as
/// `needs_second_call` says so, issues chained single-record reads with
/// the spec from `second_call_spec`.
pub trait RecordDefinition: std::fmt::Debug {
    /// The selection for the primary call.
    fn format_spec(&self) -> FormatSpec;

    /// The selection for the chained call number `sequence` (starting
    /// at 1). Definitions that never chain keep the default.
    fn second_call_spec(&self, _sequence: u32) -> AdaResult<FormatSpec> {
        Err(AdaError::Usage(
            "record definition does not support chained calls",
        ))
    }

    /// Prepares a fresh value container; with `reset` false the existing
    /// values are kept for a chained call to fill in.
    fn create_values(&mut self, reset: bool);

    /// Consumes one raw record slice; returns the number of values parsed.
    ///
    /// # Errors
    /// Whatever the value layer considers a parse failure.
    fn parse_buffer(&mut self, raw: &[u8], order: WireOrder) -> AdaResult<u32>;

    /// True while the last parsed record needs a chained call for
    /// remaining data (e.g. oversized fields).
    fn needs_second_call(&self) -> bool {
        false
    }
}
