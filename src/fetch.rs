//! Multi-record fetching: the read loop, chained continuation calls,
//! search-driven reads and batch cursors.

use crate::ada_error::usage_err;
use crate::definition::RecordDefinition;
use crate::messages::CallFailure;
use crate::protocol::command::{
    COMMAND_ID_SEQUENTIAL, OPT_ACCESS_ONLY, OPT_ASCENDING, OPT_DESCENDING, OPT_FROM_ISN_LIST,
    OPT_HOLD_RESPONSE, OPT_ISN_SEQUENCE, OPT_MULTIFETCH, OPT_SEARCH_HOLD,
};
use crate::protocol::multifetch::{self, MultifetchElement};
use crate::protocol::{
    Buffer, BufferKind, CommandCode, RESPONSE_EOF, RESPONSE_NORMAL, WireOrder,
};
use crate::session::Session;
use crate::target::Fnr;
use crate::{AdaError, AdaResult};

const MAX_DESCRIPTOR_LEN: usize = 7;

/// How records of a read are held for the transaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HoldMode {
    /// Plain read, no hold.
    #[default]
    None,
    /// Hold each record, waiting when it is held elsewhere.
    Wait,
    /// Hold each record; a conflict returns response 145 instead of
    /// waiting.
    Response,
    /// Use the hold command family but do not acquire holds.
    Access,
}

impl HoldMode {
    fn uses_hold_command(self) -> bool {
        !matches!(self, Self::None)
    }

    fn option_byte(self) -> Option<u8> {
        match self {
            Self::Response => Some(OPT_HOLD_RESPONSE),
            Self::Access => Some(OPT_ACCESS_ONLY),
            Self::None | Self::Wait => None,
        }
    }
}

/// Returned by the record callback to keep fetching or stop early.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchFlow {
    Continue,
    Stop,
}

/// What the engine knows about a fetched record; the parsed values live
/// in the caller's record definition.
#[derive(Clone, Copy, Debug)]
pub struct RecordInfo {
    /// The record's ISN (0 for histogram results).
    pub isn: u64,
    /// ISN quantity of the call that produced the record.
    pub quantity: u64,
    /// Running count of records this fetch has produced.
    pub count: u64,
}

/// Record callback of a fetch.
pub type RecordHandler<'h> = &'h mut dyn FnMut(&RecordInfo) -> AdaResult<FetchFlow>;

/// Search and value buffer contents for a search-driven read.
#[derive(Clone, Debug)]
pub struct SearchSpec {
    pub criteria: Vec<u8>,
    pub values: Vec<u8>,
}

/// Parameters of a fetch, bundled with the record definition the results
/// are parsed into.
#[derive(Debug)]
pub struct FetchRequest<'d> {
    pub definition: &'d mut dyn RecordDefinition,
    pub hold: HoldMode,
    /// Maximum number of records; 0 means unbounded.
    pub limit: u64,
    /// Records requested per call round trip.
    pub multifetch: u32,
    /// Descriptor name for logical reads, histograms and search ordering.
    pub descriptor: Option<String>,
    pub descending: bool,
}

impl<'d> FetchRequest<'d> {
    pub fn new(definition: &'d mut dyn RecordDefinition) -> Self {
        Self {
            definition,
            hold: HoldMode::None,
            limit: 0,
            multifetch: 1,
            descriptor: None,
            descending: false,
        }
    }
}

/// The read families a cursor can drive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadOp {
    Physical,
    IsnSequence,
    Logical,
    Histogram,
}

pub(crate) struct LoopOutcome {
    pub fetched: u64,
    pub eof: bool,
}

impl Session {
    /// Reads the file in physical order.
    ///
    /// # Errors
    /// `AdaError::Db` for a negative response.
    pub fn read_physical(
        &mut self,
        file_nr: Fnr,
        request: &mut FetchRequest,
        handler: RecordHandler,
    ) -> AdaResult<u64> {
        let command = self.setup_read(ReadOp::Physical, file_nr, 0, request)?;
        Ok(self.run_loop(command, request, handler, false)?.fetched)
    }

    /// Reads the single record `isn`.
    ///
    /// # Errors
    /// `AdaError::Db` for a negative response (113 when the ISN does not
    /// exist).
    pub fn read_isn(
        &mut self,
        file_nr: Fnr,
        isn: u64,
        request: &mut FetchRequest,
        handler: RecordHandler,
    ) -> AdaResult<u64> {
        let command = if request.hold.uses_hold_command() {
            CommandCode::L4
        } else {
            CommandCode::L1
        };
        let cb = &mut self.call.control_block;
        cb.prepare_command(command);
        cb.file_nr = file_nr;
        cb.isn = isn;
        cb.command_id = COMMAND_ID_SEQUENTIAL;
        cb.isn_lower_limit = 0;
        if let Some(byte) = request.hold.option_byte() {
            cb.options[3] = byte;
        }
        self.call
            .set_buffers(fetch_buffers(request.definition.format_spec(), 1));

        let (saved_limit, saved_multifetch) = (request.limit, request.multifetch);
        request.limit = 1;
        request.multifetch = 1;
        let result = self.run_loop(command, request, handler, false);
        request.limit = saved_limit;
        request.multifetch = saved_multifetch;
        Ok(result?.fetched)
    }

    /// Reads records following the file's ISN sequence, starting at
    /// `start_isn`.
    ///
    /// # Errors
    /// `AdaError::Db` for a negative response.
    pub fn read_isn_sequence(
        &mut self,
        file_nr: Fnr,
        start_isn: u64,
        request: &mut FetchRequest,
        handler: RecordHandler,
    ) -> AdaResult<u64> {
        let command = self.setup_read(ReadOp::IsnSequence, file_nr, start_isn, request)?;
        Ok(self.run_loop(command, request, handler, false)?.fetched)
    }

    /// Reads records in the value order of the descriptor named in
    /// `request.descriptor`.
    ///
    /// # Errors
    /// `AdaError::Usage` when no descriptor is given, `AdaError::Db` for
    /// a negative response.
    pub fn read_logical(
        &mut self,
        file_nr: Fnr,
        request: &mut FetchRequest,
        handler: RecordHandler,
    ) -> AdaResult<u64> {
        let command = self.setup_read(ReadOp::Logical, file_nr, 0, request)?;
        Ok(self.run_loop(command, request, handler, false)?.fetched)
    }

    /// Reads the value histogram of the descriptor named in
    /// `request.descriptor`; records carry no ISN.
    ///
    /// # Errors
    /// `AdaError::Usage` when no descriptor is given, `AdaError::Db` for
    /// a negative response.
    pub fn histogram(
        &mut self,
        file_nr: Fnr,
        request: &mut FetchRequest,
        handler: RecordHandler,
    ) -> AdaResult<u64> {
        let command = self.setup_read(ReadOp::Histogram, file_nr, 0, request)?;
        Ok(self.run_loop(command, request, handler, false)?.fetched)
    }

    /// Searches with the given criteria, then reads the resulting ISN
    /// list. A search without hits returns 0 without a read phase.
    ///
    /// # Errors
    /// `AdaError::Db` for a negative response in either phase.
    pub fn search(
        &mut self,
        file_nr: Fnr,
        spec: &SearchSpec,
        request: &mut FetchRequest,
        handler: RecordHandler,
    ) -> AdaResult<u64> {
        let format_spec = request.definition.format_spec();
        let cb = &mut self.call.control_block;
        cb.prepare_command(CommandCode::S2);
        cb.file_nr = file_nr;
        cb.isn = 0;
        cb.command_id = COMMAND_ID_SEQUENTIAL;
        cb.options[0] = OPT_SEARCH_HOLD;
        if request.descending {
            cb.options[1] = OPT_DESCENDING;
        }
        set_descriptor(
            &mut cb.additions1,
            request.descriptor.as_deref().unwrap_or("ISN"),
        )?;
        self.call.set_buffers(vec![
            Buffer::from_bytes(BufferKind::Format, &format_spec.buffer),
            Buffer::with_capacity(BufferKind::Record, format_spec.record_length as usize),
            Buffer::from_bytes(BufferKind::Search, &spec.criteria),
            Buffer::from_bytes(BufferKind::Value, &spec.values),
        ]);
        self.dispatch()?;

        let cb = &self.call.control_block;
        let quantity = cb.isn_quantity;
        if cb.response == RESPONSE_EOF || quantity == 0 {
            debug!("search on file {file_nr} found nothing");
            return Ok(0);
        }
        debug!("search on file {file_nr} found {quantity} records");
        let first_isn = cb.isn;

        let command = if request.hold.uses_hold_command() {
            CommandCode::L4
        } else {
            CommandCode::L1
        };
        let cb = &mut self.call.control_block;
        cb.prepare_command(command);
        cb.isn = first_isn;
        cb.command_id = COMMAND_ID_SEQUENTIAL;
        cb.options[1] = OPT_FROM_ISN_LIST;
        if request.multifetch > 1 {
            cb.options[0] = OPT_MULTIFETCH;
        }
        if let Some(byte) = request.hold.option_byte() {
            cb.options[3] = byte;
        }
        self.call
            .set_buffers(fetch_buffers(format_spec, request.multifetch));

        let saved_limit = request.limit;
        request.limit = if saved_limit > 0 {
            saved_limit.min(quantity)
        } else {
            quantity
        };
        let result = self.run_loop(command, request, handler, false);
        request.limit = saved_limit;
        Ok(result?.fetched)
    }

    // ------------------------------------------------------------------
    // loop internals
    // ------------------------------------------------------------------

    pub(crate) fn setup_read(
        &mut self,
        op: ReadOp,
        file_nr: Fnr,
        start_isn: u64,
        request: &FetchRequest,
    ) -> AdaResult<CommandCode> {
        let hold = request.hold.uses_hold_command();
        let command = match op {
            ReadOp::Physical => {
                if hold {
                    CommandCode::L5
                } else {
                    CommandCode::L2
                }
            }
            ReadOp::IsnSequence => {
                if hold {
                    CommandCode::L4
                } else {
                    CommandCode::L1
                }
            }
            ReadOp::Logical => {
                if hold {
                    CommandCode::L6
                } else {
                    CommandCode::L3
                }
            }
            ReadOp::Histogram => CommandCode::L9,
        };
        let cb = &mut self.call.control_block;
        cb.prepare_command(command);
        cb.file_nr = file_nr;
        cb.isn = start_isn;
        cb.isn_lower_limit = 0;
        cb.isn_quantity = 0;
        cb.command_id = COMMAND_ID_SEQUENTIAL;
        if request.multifetch > 1 {
            cb.options[0] = OPT_MULTIFETCH;
        }
        match op {
            ReadOp::Physical => {}
            ReadOp::IsnSequence => cb.options[1] = OPT_ISN_SEQUENCE,
            ReadOp::Logical | ReadOp::Histogram => {
                cb.options[1] = if request.descending {
                    OPT_DESCENDING
                } else {
                    OPT_ASCENDING
                };
                let descriptor = request
                    .descriptor
                    .as_deref()
                    .ok_or(AdaError::Usage("this read requires a descriptor name"))?;
                set_descriptor(&mut cb.additions1, descriptor)?;
            }
        }
        if op != ReadOp::Histogram {
            if let Some(byte) = request.hold.option_byte() {
                cb.options[3] = byte;
            }
        }
        self.call
            .set_buffers(fetch_buffers(request.definition.format_spec(), request.multifetch));
        Ok(command)
    }

    pub(crate) fn run_loop(
        &mut self,
        command: CommandCode,
        request: &mut FetchRequest,
        handler: RecordHandler,
        continuation: bool,
    ) -> AdaResult<LoopOutcome> {
        let mut fetched = 0_u64;
        let mut first = true;
        loop {
            // a continued cursor keeps its value container over the seam
            request.definition.create_values(!(continuation && first));
            first = false;

            for buffer in &mut self.call.buffers {
                buffer.reset_transfer_sizes();
            }
            if request.multifetch > 1 {
                let mut batch = u64::from(request.multifetch);
                if request.limit > 0 {
                    batch = batch.min(request.limit - fetched);
                }
                self.call.control_block.isn_lower_limit = batch;
            }

            self.dispatch()?;
            if self.call.control_block.response == RESPONSE_EOF {
                return Ok(LoopOutcome { fetched, eof: true });
            }

            let order = self.wire_order()?;
            let quantity = self.call.control_block.isn_quantity;
            let call_isn = self.call.control_block.isn;
            let record_data: Vec<u8> = self
                .call
                .buffer(BufferKind::Record)
                .map(|b| b.received().to_vec())
                .unwrap_or_default();
            let elements = match self.call.buffer(BufferKind::Multifetch) {
                Some(buffer) => multifetch::parse_elements(buffer.received(), order)?,
                None => vec![MultifetchElement {
                    record_len: record_data.len() as u32,
                    response: RESPONSE_NORMAL,
                    isn: call_isn,
                }],
            };
            trace!("{command} returned {} record(s)", elements.len());

            let mut offset = 0_usize;
            let mut last_isn = call_isn;
            let mut batch_eof = false;
            for element in &elements {
                if element.response == RESPONSE_EOF {
                    batch_eof = true;
                    break;
                }
                if element.response != RESPONSE_NORMAL {
                    return Err(self.element_failure(element));
                }
                let end = offset + element.record_len as usize;
                if end > record_data.len() {
                    return Err(AdaError::Corrupt("record slice beyond record buffer"));
                }
                request
                    .definition
                    .parse_buffer(&record_data[offset..end], order)?;
                offset = end;
                if request.definition.needs_second_call() {
                    self.second_call(&mut *request.definition, element.isn, order)?;
                }
                if command.keeps_record_isn() {
                    last_isn = element.isn;
                }
                fetched += 1;
                let info = RecordInfo {
                    isn: element.isn,
                    quantity,
                    count: fetched,
                };
                let stopped = matches!(handler(&info)?, FetchFlow::Stop);
                if stopped || (request.limit > 0 && fetched >= request.limit) {
                    if command.advances_isn() {
                        self.call.control_block.isn = last_isn + 1;
                    }
                    return Ok(LoopOutcome { fetched, eof: false });
                }
            }
            if batch_eof {
                return Ok(LoopOutcome { fetched, eof: true });
            }
            if command.advances_isn() {
                self.call.control_block.isn = last_isn + 1;
            }
        }
    }

    /// Issues the chained single-record calls a definition needs to
    /// complete the record just parsed, preserving the surrounding loop's
    /// control block and buffers.
    fn second_call(
        &mut self,
        definition: &mut dyn RecordDefinition,
        isn: u64,
        order: WireOrder,
    ) -> AdaResult<()> {
        let saved_cb = self.call.control_block.clone();
        let saved_buffers = std::mem::take(&mut self.call.buffers);
        let result = self.second_call_chain(definition, saved_cb.file_nr, isn, order);
        self.call.control_block = saved_cb;
        self.call.buffers = saved_buffers;
        result
    }

    fn second_call_chain(
        &mut self,
        definition: &mut dyn RecordDefinition,
        file_nr: Fnr,
        isn: u64,
        order: WireOrder,
    ) -> AdaResult<()> {
        let mut sequence = 1_u32;
        loop {
            let spec = definition.second_call_spec(sequence)?;
            debug!("chained call {sequence} for isn {isn}");
            let cb = &mut self.call.control_block;
            cb.prepare_command(CommandCode::L1);
            cb.file_nr = file_nr;
            cb.isn = isn;
            cb.command_id = COMMAND_ID_SEQUENTIAL;
            cb.isn_lower_limit = 0;
            self.call.set_buffers(fetch_buffers(spec, 1));
            self.dispatch()?;

            definition.create_values(false);
            let raw: Vec<u8> = self
                .call
                .buffer(BufferKind::Record)
                .map(|b| b.received().to_vec())
                .unwrap_or_default();
            definition.parse_buffer(&raw, order)?;
            if !definition.needs_second_call() {
                return Ok(());
            }
            sequence += 1;
        }
    }

    fn element_failure(&self, element: &MultifetchElement) -> AdaError {
        let failure = CallFailure::new(
            element.response,
            0,
            &self.target().to_string(),
            self.call.control_block.file_nr,
            [b' '; 4],
        );
        error!("record isn {} failed: {}", element.isn, failure.message());
        AdaError::Db { source: failure }
    }
}

fn fetch_buffers(spec: crate::definition::FormatSpec, multifetch: u32) -> Vec<Buffer> {
    let records = multifetch.max(1);
    let mut buffers = vec![
        Buffer::from_bytes(BufferKind::Format, &spec.buffer),
        Buffer::with_capacity(
            BufferKind::Record,
            spec.record_length as usize * records as usize,
        ),
    ];
    if multifetch > 1 {
        buffers.push(Buffer::with_capacity(
            BufferKind::Multifetch,
            multifetch::buffer_len(multifetch),
        ));
    }
    buffers
}

fn set_descriptor(additions1: &mut [u8; 8], descriptor: &str) -> AdaResult<()> {
    if descriptor.is_empty()
        || descriptor.len() > MAX_DESCRIPTOR_LEN
        || descriptor.contains(',')
    {
        return Err(usage_err!(
            "exactly one descriptor name of at most {MAX_DESCRIPTOR_LEN} characters expected, \
             got {descriptor:?}"
        ));
    }
    *additions1 = [b' '; 8];
    additions1[..descriptor.len()].copy_from_slice(descriptor.as_bytes());
    Ok(())
}

/// Drives a bounded read in batches, keeping the server-side continuation
/// (command id and ISN position) alive between batches.
#[derive(Debug)]
pub struct Cursor {
    op: ReadOp,
    file_nr: Fnr,
    start_isn: u64,
    batch: u64,
    command: Option<CommandCode>,
    exhausted: bool,
}

impl Cursor {
    /// A cursor over `op` on `file_nr`, fetching `batch` records per
    /// [`Self::next_batch`].
    #[must_use]
    pub fn new(op: ReadOp, file_nr: Fnr, batch: u64) -> Self {
        Self {
            op,
            file_nr,
            start_isn: 0,
            batch: batch.max(1),
            command: None,
            exhausted: false,
        }
    }

    /// Starts the cursor at `isn` (ISN-sequence reads only).
    #[must_use]
    pub fn starting_at(mut self, isn: u64) -> Self {
        self.start_isn = isn;
        self
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Fetches the next batch; returns false once the read sequence hit
    /// end of file.
    ///
    /// # Errors
    /// `AdaError::Db` for a negative response.
    pub fn next_batch(
        &mut self,
        session: &mut Session,
        request: &mut FetchRequest,
        handler: RecordHandler,
    ) -> AdaResult<bool> {
        if self.exhausted {
            return Ok(false);
        }
        let saved_limit = request.limit;
        request.limit = self.batch;
        let outcome = match self.command {
            None => {
                let command = session.setup_read(self.op, self.file_nr, self.start_isn, request);
                match command {
                    Ok(command) => {
                        self.command = Some(command);
                        session.run_loop(command, request, handler, false)
                    }
                    Err(e) => Err(e),
                }
            }
            Some(command) => session.run_loop(command, request, handler, true),
        };
        request.limit = saved_limit;
        let outcome = outcome?;
        if outcome.eof {
            self.exhausted = true;
        }
        Ok(!outcome.eof)
    }
}
