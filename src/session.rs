//! Sessions: the caller-facing handle that owns a call unit and drives
//! the per-command dispatch.

use crate::conn::driver::{CallUnit, unknown_driver};
use crate::conn::session_id::{AdabasId, TargetState};
use crate::messages::CallFailure;
use crate::platform::{Platform, version_from_quantity};
use crate::protocol::command::{
    COMMAND_ID_NONE, OPT_EXCHANGE, OPT_FDT_EXTENDED, OPT_HOLD,
};
use crate::protocol::{
    Buffer, BufferKind, CommandCode, ControlBlock, RESPONSE_COMM_ERROR, RESPONSE_EOF, WireOrder,
};
use crate::registry::{FileDefinition, Registry};
use crate::target::{Fnr, Target};
use crate::{AdaError, AdaResult};
use std::sync::{Arc, Mutex};

const DEFINITION_RECORD_CAPACITY: usize = 8192;

/// A session towards one database target.
///
/// A session owns its control block and buffer set; the open flag, the
/// transaction count and the physical connection live in state shared by
/// all sessions cloned from each other. Every operation opens the session
/// implicitly if needed.
pub struct Session {
    target: Target,
    id: Arc<AdabasId>,
    state: Arc<Mutex<TargetState>>,
    registry: Arc<Registry>,
    pub(crate) call: CallUnit,
}

/// Snapshot of the shared session state.
#[derive(Clone, Debug)]
pub struct SessionStatus {
    pub open: bool,
    pub pending_transactions: u32,
    pub version: Option<String>,
}

/// Payload of a store or update operation.
#[derive(Clone, Debug)]
pub struct StoreRequest {
    /// Zero lets the server assign the ISN on store; updates require it.
    pub isn: u64,
    /// Format buffer content describing the record layout.
    pub format: Vec<u8>,
    /// Record buffer content.
    pub record: Vec<u8>,
    /// Update only: replace the whole record instead of patching fields.
    pub exchange: bool,
}

impl Session {
    /// A session towards the local database `dbid`.
    ///
    /// # Errors
    /// `AdaError::Target` for an id outside the valid range.
    pub fn new(dbid: u32) -> AdaResult<Self> {
        Ok(Self::with_target(Target::local(dbid)?))
    }

    /// A session towards a parsed target descriptor.
    ///
    /// # Errors
    /// `AdaError::Target` for a malformed descriptor.
    pub fn parse_target(descriptor: &str) -> AdaResult<Self> {
        Ok(Self::with_target(Target::parse(descriptor)?))
    }

    #[must_use]
    pub fn with_target(target: Target) -> Self {
        Self::with_identity(target, AdabasId::new())
    }

    /// A session presenting the given identity to the database.
    #[must_use]
    pub fn with_identity(target: Target, id: AdabasId) -> Self {
        let id = Arc::new(id);
        let state = id.target_state(&target.to_string());
        let call = CallUnit::new(target.dbid());
        Self {
            target,
            id,
            state,
            registry: Registry::global(),
            call,
        }
    }

    /// Replaces the process-wide registry with an injected one, e.g. for
    /// isolated driver registration in tests.
    pub fn use_registry(&mut self, registry: Arc<Registry>) {
        self.registry = registry;
    }

    /// A second session sharing this one's identity, shared state and
    /// registry, with its own control block and buffers.
    #[must_use]
    pub fn clone_session(&self) -> Self {
        Self {
            target: self.target.clone(),
            id: Arc::clone(&self.id),
            state: Arc::clone(&self.state),
            registry: Arc::clone(&self.registry),
            call: CallUnit::new(self.target.dbid()),
        }
    }

    #[must_use]
    pub fn target(&self) -> &Target {
        &self.target
    }

    #[must_use]
    pub fn identity(&self) -> &AdabasId {
        &self.id
    }

    /// Mutable identity access, available until the first
    /// [`Self::clone_session`].
    #[must_use]
    pub fn identity_mut(&mut self) -> Option<&mut AdabasId> {
        Arc::get_mut(&mut self.id)
    }

    /// A snapshot of open flag, pending transactions and server version.
    ///
    /// # Errors
    /// `AdaError::Poison` when the shared state lock is poisoned.
    pub fn status(&self) -> AdaResult<SessionStatus> {
        let guard = self.state.lock()?;
        Ok(SessionStatus {
            open: guard.open,
            pending_transactions: guard.open_transactions,
            version: guard.version.clone(),
        })
    }

    /// Opens the session explicitly. A no-op when already open.
    ///
    /// # Errors
    /// `AdaError::Db` for a negative response, `AdaError::UnknownDriver`
    /// when no driver is registered for the target.
    pub fn open(&mut self) -> AdaResult<()> {
        let state = Arc::clone(&self.state);
        let mut guard = state.lock()?;
        self.ensure_open_locked(&mut guard)
    }

    /// Closes the session: backs out pending transactions, issues the
    /// close call, and disconnects. Call errors are logged, never
    /// propagated; a closed session stays usable for a later re-open.
    ///
    /// # Errors
    /// Only `AdaError::Poison`.
    pub fn close(&mut self) -> AdaResult<()> {
        let state = Arc::clone(&self.state);
        let mut guard = state.lock()?;
        if !guard.open {
            return Ok(());
        }
        if guard.open_transactions > 0 {
            debug!(
                "closing {} with {} pending transactions, backing out",
                self.target, guard.open_transactions
            );
            let mut backout = CallUnit::new(self.target.dbid());
            backout.control_block.prepare_command(CommandCode::Bt);
            if let Err(e) = self.send_locked(&mut guard, &mut backout) {
                warn!("backout before close failed: {e}");
            }
        }
        let mut close = CallUnit::new(self.target.dbid());
        close.control_block.prepare_command(CommandCode::Cl);
        if let Err(e) = self.send_locked(&mut guard, &mut close) {
            warn!("close call failed: {e}");
        }
        guard.open = false;
        guard.open_transactions = 0;
        if let Some(mut driver) = guard.connection.take() {
            if let Err(e) = driver.disconnect() {
                warn!("disconnect failed: {e}");
            }
        }
        info!("session to {} closed", self.target);
        Ok(())
    }

    /// Stores a record; the server assigns the ISN when `request.isn` is
    /// zero. Returns the record's ISN and counts the modification towards
    /// the open transaction.
    ///
    /// # Errors
    /// `AdaError::Db` for a negative response.
    pub fn store(&mut self, file_nr: Fnr, request: &StoreRequest) -> AdaResult<u64> {
        let command = if request.isn == 0 {
            CommandCode::N1
        } else {
            CommandCode::N2
        };
        let cb = &mut self.call.control_block;
        cb.prepare_command(command);
        cb.file_nr = file_nr;
        cb.isn = request.isn;
        cb.command_id = COMMAND_ID_NONE;
        self.call.set_buffers(vec![
            Buffer::from_bytes(BufferKind::Format, &request.format),
            Buffer::from_bytes(BufferKind::Record, &request.record),
        ]);
        self.dispatch()?;
        self.note_transaction()?;
        Ok(self.call.control_block.isn)
    }

    /// Updates the record `request.isn`, holding it for the transaction.
    ///
    /// # Errors
    /// `AdaError::Usage` when no ISN is given, `AdaError::Db` for a
    /// negative response (145 when the record is held elsewhere and the
    /// hold does not wait).
    pub fn update(&mut self, file_nr: Fnr, request: &StoreRequest) -> AdaResult<u64> {
        if request.isn == 0 {
            return Err(AdaError::Usage("update requires a record ISN"));
        }
        let cb = &mut self.call.control_block;
        cb.prepare_command(CommandCode::A1);
        cb.file_nr = file_nr;
        cb.isn = request.isn;
        cb.command_id = COMMAND_ID_NONE;
        if request.exchange {
            cb.options[0] = OPT_EXCHANGE;
            cb.options[1] = OPT_HOLD;
        } else {
            cb.options[0] = OPT_HOLD;
        }
        self.call.set_buffers(vec![
            Buffer::from_bytes(BufferKind::Format, &request.format),
            Buffer::from_bytes(BufferKind::Record, &request.record),
        ]);
        self.dispatch()?;
        self.note_transaction()?;
        Ok(self.call.control_block.isn)
    }

    /// Deletes the record `isn`.
    ///
    /// # Errors
    /// `AdaError::Db` for a negative response; the transaction counter is
    /// only incremented on success.
    pub fn delete(&mut self, file_nr: Fnr, isn: u64) -> AdaResult<()> {
        let cb = &mut self.call.control_block;
        cb.prepare_command(CommandCode::E1);
        cb.file_nr = file_nr;
        cb.isn = isn;
        cb.command_id = COMMAND_ID_NONE;
        self.call.set_buffers(Vec::new());
        self.dispatch()?;
        self.note_transaction()
    }

    /// Commits the open transaction. A no-op when the session is not open
    /// or nothing was modified.
    ///
    /// # Errors
    /// `AdaError::Db` for a negative response.
    pub fn end_transaction(&mut self) -> AdaResult<()> {
        self.finish_transaction(CommandCode::Et)
    }

    /// Backs the open transaction out. A no-op when the session is not
    /// open or nothing was modified.
    ///
    /// # Errors
    /// `AdaError::Db` for a negative response.
    pub fn backout_transaction(&mut self) -> AdaResult<()> {
        self.finish_transaction(CommandCode::Bt)
    }

    fn finish_transaction(&mut self, command: CommandCode) -> AdaResult<()> {
        {
            let guard = self.state.lock()?;
            if !guard.open || guard.open_transactions == 0 {
                return Ok(());
            }
        }
        self.call.control_block.prepare_command(command);
        self.call.set_buffers(Vec::new());
        self.dispatch()?;
        self.state.lock()?.open_transactions = 0;
        Ok(())
    }

    /// Releases the current command id, ending its server-side
    /// correlation.
    ///
    /// # Errors
    /// `AdaError::Db` for a negative response.
    pub fn release(&mut self) -> AdaResult<()> {
        let command_id = self.call.control_block.command_id;
        let cb = &mut self.call.control_block;
        cb.prepare_command(CommandCode::Rc);
        cb.command_id = command_id;
        self.call.set_buffers(Vec::new());
        self.dispatch()?;
        self.call.control_block.command_id = COMMAND_ID_NONE;
        Ok(())
    }

    /// Releases the hold on a single record without ending the
    /// transaction.
    ///
    /// # Errors
    /// `AdaError::Db` for a negative response.
    pub fn release_hold(&mut self, file_nr: Fnr, isn: u64) -> AdaResult<()> {
        let cb = &mut self.call.control_block;
        cb.prepare_command(CommandCode::Ri);
        cb.file_nr = file_nr;
        cb.isn = isn;
        cb.command_id = COMMAND_ID_NONE;
        self.call.set_buffers(Vec::new());
        self.dispatch()
    }

    /// Reads the raw field definition table of `file_nr`, serving repeat
    /// requests from the registry cache.
    ///
    /// # Errors
    /// `AdaError::Db` for a negative response.
    pub fn read_file_definition(&mut self, file_nr: Fnr) -> AdaResult<Arc<FileDefinition>> {
        let target_url = self.target.to_string();
        if let Some(hit) = self.registry.cached_definition(&target_url, file_nr) {
            debug!("definition of {target_url}/{file_nr} served from cache");
            return Ok(hit);
        }
        let cb = &mut self.call.control_block;
        cb.prepare_command(CommandCode::Lf);
        cb.file_nr = file_nr;
        cb.isn = 1;
        cb.command_id = COMMAND_ID_NONE;
        cb.options[1] = OPT_FDT_EXTENDED;
        self.call.set_buffers(vec![
            Buffer::from_text(BufferKind::Format, " "),
            Buffer::with_capacity(BufferKind::Record, DEFINITION_RECORD_CAPACITY),
        ]);
        self.dispatch()?;
        let raw = self
            .call
            .buffer(BufferKind::Record)
            .map(|b| b.received().to_vec())
            .unwrap_or_default();
        Ok(self.registry.put_definition(FileDefinition {
            target: target_url,
            file_nr,
            raw,
        }))
    }

    /// Switches the session to another local database, closing the
    /// current one first.
    ///
    /// # Errors
    /// `AdaError::Target` for an id outside the valid range.
    pub fn set_dbid(&mut self, dbid: u32) -> AdaResult<()> {
        self.set_target(Target::local(dbid)?)
    }

    /// Switches the session to another target, closing the current one
    /// first.
    ///
    /// # Errors
    /// Only `AdaError::Poison`.
    pub fn set_target(&mut self, target: Target) -> AdaResult<()> {
        self.close()?;
        self.state = self.id.target_state(&target.to_string());
        self.call = CallUnit::new(target.dbid());
        self.target = target;
        Ok(())
    }

    // ------------------------------------------------------------------
    // dispatch plumbing
    // ------------------------------------------------------------------

    /// Sends the session's own call unit, opening the session first if
    /// needed.
    pub(crate) fn dispatch(&mut self) -> AdaResult<()> {
        let state = Arc::clone(&self.state);
        let mut guard = state.lock()?;
        self.ensure_open_locked(&mut guard)?;
        Self::send_call(
            &self.target,
            &self.registry,
            &self.id,
            &mut guard,
            &mut self.call,
        )
    }

    /// The byte order record payloads of this target arrive in.
    pub(crate) fn wire_order(&self) -> AdaResult<WireOrder> {
        Ok(self.state.lock()?.platform.wire_order())
    }

    pub(crate) fn note_transaction(&self) -> AdaResult<()> {
        self.state.lock()?.open_transactions += 1;
        Ok(())
    }

    fn send_locked(&self, state: &mut TargetState, call: &mut CallUnit) -> AdaResult<()> {
        Self::send_call(&self.target, &self.registry, &self.id, state, call)
    }

    fn ensure_open_locked(&self, state: &mut TargetState) -> AdaResult<()> {
        if state.open {
            return Ok(());
        }
        let mut call = CallUnit::new(self.target.dbid());
        call.control_block.prepare_command(CommandCode::Op);
        if let Some((user, _)) = self.id.credential() {
            let add3 = &mut call.control_block.additions3;
            for (slot, byte) in add3.iter_mut().zip(user.bytes()) {
                *slot = byte;
            }
        }
        call.set_buffers(vec![
            Buffer::from_text(BufferKind::Format, " "),
            Buffer::from_text(BufferKind::Record, "UPD."),
        ]);
        Self::send_call(&self.target, &self.registry, &self.id, state, &mut call)?;
        let cb = &call.control_block;
        state.open = true;
        state.open_transactions = 0;
        state.platform = Platform::from_open_reply(cb.isn_lower_limit);
        let version = version_from_quantity(cb.isn_quantity);
        info!("session to {} open, server version {}", self.target, version);
        state.version = Some(version);
        Ok(())
    }

    fn send_call(
        target: &Target,
        registry: &Registry,
        id: &AdabasId,
        state: &mut TargetState,
        call: &mut CallUnit,
    ) -> AdaResult<()> {
        let command = call
            .control_block
            .command_code()
            .ok_or(AdaError::Usage("no valid command installed"))?;
        if command == CommandCode::Empty {
            return Err(AdaError::Usage("no command installed"));
        }

        if state.connection.is_none() {
            let name = target.driver().unwrap_or("local");
            let mut driver = registry
                .with_driver(name, |factory| factory(target, id))
                .ok_or_else(|| unknown_driver(target))??;
            if let Err(e) = driver.connect() {
                return Err(comm_failure(e, target, &call.control_block));
            }
            debug!("connected to {target} via {name}");
            state.connection = Some(driver);
        }

        let start = std::time::Instant::now();
        let driver = state
            .connection
            .as_mut()
            .ok_or(AdaError::Usage("no connection established"))?;
        debug!("{command} call to {target}");
        if let Err(e) = driver.send(call) {
            let _ = driver.disconnect();
            state.connection = None;
            return Err(comm_failure(e, target, &call.control_block));
        }
        registry.statistics().record(command, start.elapsed());

        if command == CommandCode::Cl {
            if let Some(mut driver) = state.connection.take() {
                if let Err(e) = driver.disconnect() {
                    warn!("disconnect after close failed: {e}");
                }
            }
        }

        let cb = &call.control_block;
        trace!(
            "{command} returned rsp={} isn={} isq={}",
            cb.response, cb.isn, cb.isn_quantity
        );
        if cb.response > RESPONSE_EOF {
            let failure = CallFailure::new(
                cb.response,
                cb.error_sub,
                &target.to_string(),
                cb.file_nr,
                cb.additions2,
            );
            error!("{command} on {target} failed: {}", failure.message());
            return Err(AdaError::Db { source: failure });
        }
        Ok(())
    }
}

fn comm_failure(error: AdaError, target: &Target, cb: &ControlBlock) -> AdaError {
    match error {
        AdaError::Io { source } => {
            warn!("transport failure towards {target}: {source}");
            AdaError::Db {
                source: CallFailure::new(
                    RESPONSE_COMM_ERROR,
                    0,
                    &target.to_string(),
                    cb.file_nr,
                    [b' '; 4],
                ),
            }
        }
        other => other,
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("target", &self.target.to_string())
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
