//! Drivers, call units, and session identity.

pub(crate) mod driver;
pub(crate) mod session_id;

pub use driver::{CallUnit, Driver, DriverFactory};
pub use session_id::{AdabasId, TargetState};
