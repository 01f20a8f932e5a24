//! Synchronous client engine for a control-block based network database.
//!
//! `adacall` drives the fixed binary call convention of a mainframe-origin
//! database: every interaction is one call, described by a 192-byte control
//! block and a set of typed buffers, answered in place by the server.
//!
//! The crate covers the call machinery: per-command dispatch with implicit
//! session open, the multi-record fetch loop with batching and cursoring,
//! chained continuation calls for oversized records, transaction and hold
//! bookkeeping, bit-exact wire framing, and the translation of numeric
//! responses into structured errors.
//!
//! It deliberately does not interpret record payloads; field types and
//! value conversion live behind the [`RecordDefinition`] trait, and
//! concrete transports behind the [`Driver`] trait.
//!
//! ```no_run
//! use adacall::{FetchFlow, FetchRequest, Session};
//! # use adacall::AdaResult;
//! # fn example(definition: &mut dyn adacall::RecordDefinition) -> AdaResult<()> {
//! let mut session = Session::parse_target("24(adatcp://dbhost:60024)")?;
//! let mut request = FetchRequest::new(definition);
//! request.multifetch = 16;
//! session.read_physical(11, &mut request, &mut |info| {
//!     println!("record isn {}", info.isn);
//!     Ok(FetchFlow::Continue)
//! })?;
//! session.close()?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_debug_implementations)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;

mod ada_error;
mod conn;
mod definition;
mod fetch;
mod messages;
mod platform;
pub mod protocol;
mod registry;
mod session;
mod target;

pub use ada_error::{AdaError, AdaResult};
pub use conn::{AdabasId, CallUnit, Driver, DriverFactory, TargetState};
pub use definition::{FormatSpec, RecordDefinition};
pub use fetch::{
    Cursor, FetchFlow, FetchRequest, HoldMode, ReadOp, RecordHandler, RecordInfo, SearchSpec,
};
pub use messages::{CallFailure, MESSAGE_PREFIX, message_code};
pub use platform::{Platform, version_from_quantity};
pub use protocol::{Buffer, BufferKind, CommandCode, ControlBlock, WireOrder};
pub use registry::{CallCounter, CallStatistics, FileDefinition, Registry};
pub use session::{Session, SessionStatus, StoreRequest};
pub use target::{Dbid, Fnr, MAX_DBID, Target};
