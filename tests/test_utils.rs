// advisable because not all test modules use all functions of this module:
#![allow(dead_code)]

use adacall::{
    AdaResult, BufferKind, CallUnit, Driver, FormatSpec, RecordDefinition, Registry, Session,
    WireOrder,
};
use byteorder::{ByteOrder, LittleEndian};
use flexi_logger::{Logger, LoggerHandle, opt_format};
use std::sync::{Arc, Mutex};

// Returns a logger that prints out all info, warn and error messages.
pub fn init_logger() -> LoggerHandle {
    Logger::try_with_env_or_str("info")
        .unwrap()
        .format(opt_format)
        .start()
        .unwrap_or_else(|e| panic!("Logger initialization failed with {e}"))
}

type Script = dyn FnMut(&mut CallUnit) -> AdaResult<()> + Send;

/// A driver whose server side is a scripted closure; records every command
/// it sees.
pub struct ScriptedDriver {
    script: Arc<Mutex<Box<Script>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl std::fmt::Debug for ScriptedDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedDriver").finish_non_exhaustive()
    }
}

impl Driver for ScriptedDriver {
    fn connect(&mut self) -> AdaResult<()> {
        Ok(())
    }

    fn disconnect(&mut self) -> AdaResult<()> {
        Ok(())
    }

    fn send(&mut self, call: &mut CallUnit) -> AdaResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(&call.control_block.command).to_string());
        (self.script.lock().unwrap())(call)
    }
}

/// A session wired to a scripted driver via its own registry.
pub struct TestRig {
    pub session: Session,
    pub registry: Arc<Registry>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl TestRig {
    /// The commands the driver has seen so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, command: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == command)
            .count()
    }
}

pub fn rig(
    dbid: u32,
    script: impl FnMut(&mut CallUnit) -> AdaResult<()> + Send + 'static,
) -> TestRig {
    let registry = Arc::new(Registry::new());
    let calls: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let script: Arc<Mutex<Box<Script>>> = Arc::new(Mutex::new(Box::new(script)));
    {
        let script = script.clone();
        let calls = calls.clone();
        registry.register_driver(
            "mock",
            Box::new(move |_target, _id| {
                Ok(Box::new(ScriptedDriver {
                    script: script.clone(),
                    calls: calls.clone(),
                }) as Box<dyn Driver>)
            }),
        );
    }
    let mut session = Session::parse_target(&format!("{dbid}(mock://db:1)")).unwrap();
    session.use_registry(registry.clone());
    TestRig {
        session,
        registry,
        calls,
    }
}

/// Wraps a script with stock replies for session administration commands,
/// so tests only script the data commands they care about.
pub fn admin_then(
    mut script: impl FnMut(&mut CallUnit) -> AdaResult<()> + Send + 'static,
) -> impl FnMut(&mut CallUnit) -> AdaResult<()> + Send + 'static {
    move |call: &mut CallUnit| match &call.control_block.command {
        b"OP" => {
            let cb = &mut call.control_block;
            cb.response = 0;
            // open-systems little-endian server, version 7.1.2.3
            cb.isn_lower_limit = 0x21 << 24;
            cb.isn_quantity = (7 << 24) | (1 << 16) | (2 << 8) | 3;
            Ok(())
        }
        b"CL" | b"ET" | b"BT" | b"RC" | b"RI" => {
            call.control_block.response = 0;
            Ok(())
        }
        _ => script(call),
    }
}

/// The fixed 8-byte record payload the test definition expects, derived
/// from the record's ISN.
pub fn record_payload(isn: u64) -> [u8; 8] {
    let mut payload = [0_u8; 8];
    LittleEndian::write_u64(&mut payload, isn * 10);
    payload
}

/// Encodes a multifetch buffer: count, then per element length, response,
/// ISN and a reserved word.
pub fn encode_multifetch(elements: &[(u32, u16, u64)]) -> Vec<u8> {
    let mut raw = vec![0_u8; 4 + elements.len() * 16];
    LittleEndian::write_u32(&mut raw[..4], elements.len() as u32);
    for (i, (len, response, isn)) in elements.iter().enumerate() {
        let offset = 4 + i * 16;
        LittleEndian::write_u32(&mut raw[offset..], *len);
        LittleEndian::write_u32(&mut raw[offset + 4..], u32::from(*response));
        LittleEndian::write_u32(&mut raw[offset + 8..], *isn as u32);
    }
    raw
}

/// Fills the reply buffers of a read call with the given records.
pub fn provide_records(call: &mut CallUnit, isns: &[u64]) {
    let mut record_data = Vec::new();
    for isn in isns {
        record_data.extend_from_slice(&record_payload(*isn));
    }
    call.buffer_mut(BufferKind::Record)
        .unwrap()
        .provide(&record_data);
    if let Some(buffer) = call.buffer_mut(BufferKind::Multifetch) {
        let elements: Vec<(u32, u16, u64)> = isns.iter().map(|isn| (8, 0, *isn)).collect();
        buffer.provide(&encode_multifetch(&elements));
    }
    let cb = &mut call.control_block;
    cb.response = 0;
    if let Some(last) = isns.last() {
        cb.isn = *last;
    }
}

/// A record definition selecting one 8-byte field; parsed payloads are
/// collected for assertions.
#[derive(Debug, Default)]
pub struct TestDefinition {
    pub values: Vec<u64>,
    pub resets: usize,
}

impl RecordDefinition for TestDefinition {
    fn format_spec(&self) -> FormatSpec {
        FormatSpec::new(b"AA,8,B.".to_vec(), 8)
    }

    fn create_values(&mut self, reset: bool) {
        if reset {
            self.resets += 1;
        }
    }

    fn parse_buffer(&mut self, raw: &[u8], order: WireOrder) -> AdaResult<u32> {
        assert_eq!(raw.len(), 8, "unexpected record slice length");
        let value = match order {
            WireOrder::LittleEndian => LittleEndian::read_u64(raw),
            WireOrder::BigEndian => byteorder::BigEndian::read_u64(raw),
        };
        self.values.push(value);
        Ok(1)
    }
}

/// A definition that needs `segments` chained calls after every primary
/// record.
#[derive(Debug)]
pub struct ChainingDefinition {
    pub segments: u32,
    pub parsed: Vec<Vec<u8>>,
    pending: u32,
    in_chain: bool,
}

impl ChainingDefinition {
    pub fn new(segments: u32) -> Self {
        Self {
            segments,
            parsed: Vec::new(),
            pending: 0,
            in_chain: false,
        }
    }
}

impl RecordDefinition for ChainingDefinition {
    fn format_spec(&self) -> FormatSpec {
        FormatSpec::new(b"AA,8,A.".to_vec(), 8)
    }

    fn second_call_spec(&self, sequence: u32) -> AdaResult<FormatSpec> {
        Ok(FormatSpec::new(format!("X{sequence},4,A.").into_bytes(), 4))
    }

    fn create_values(&mut self, reset: bool) {
        self.in_chain = !reset;
    }

    fn parse_buffer(&mut self, raw: &[u8], _order: WireOrder) -> AdaResult<u32> {
        self.parsed.push(raw.to_vec());
        if self.in_chain {
            self.pending -= 1;
        } else {
            self.pending = self.segments;
        }
        Ok(1)
    }

    fn needs_second_call(&self) -> bool {
        self.pending > 0
    }
}
