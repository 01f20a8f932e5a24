//! Caller identity and the per-target shared state.

use crate::conn::driver::Driver;
use crate::platform::Platform;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

const ID_LEVEL: u16 = 3;
const ID_SIZE: u16 = 32;

// disambiguates identities created within the same second
static ID_COUNTER: AtomicU32 = AtomicU32::new(0);

fn space_padded(source: &str) -> [u8; 8] {
    let mut field = [b' '; 8];
    for (slot, byte) in field.iter_mut().zip(source.bytes()) {
        *slot = byte;
    }
    field
}

/// The identity a session presents to the database: node and user name,
/// process id and creation timestamp.
///
/// An identity also owns the map of per-target shared state, so sessions
/// cloned from each other (sharing the identity) share open flags,
/// transaction counts and the physical connection per target.
#[derive(Debug)]
pub struct AdabasId {
    level: u16,
    size: u16,
    node: [u8; 8],
    user: [u8; 8],
    pid: u32,
    timestamp: u64,
    credential: Option<(String, String)>,
    targets: Mutex<HashMap<String, Arc<Mutex<TargetState>>>>,
}

impl AdabasId {
    #[must_use]
    pub fn new() -> Self {
        let user = username::get_user_name().unwrap_or_else(|_| "unknown".to_string());
        let node = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let seconds = time::OffsetDateTime::now_utc().unix_timestamp().max(0) as u64;
        Self {
            level: ID_LEVEL,
            size: ID_SIZE,
            node: space_padded(&node),
            user: space_padded(&user),
            pid: std::process::id(),
            timestamp: (seconds << 16) | u64::from(ID_COUNTER.fetch_add(1, Ordering::Relaxed) & 0xffff),
            credential: None,
            targets: Mutex::new(HashMap::new()),
        }
    }

    /// Overrides the user name presented to the database (8 bytes,
    /// space padded, truncated beyond that).
    pub fn set_user(&mut self, user: &str) {
        self.user = space_padded(user);
    }

    /// Overrides the node name presented to the database.
    pub fn set_host(&mut self, node: &str) {
        self.node = space_padded(node);
    }

    /// Attaches a credential used on session open for databases with
    /// security enabled.
    pub fn add_credential(&mut self, user: &str, password: &str) {
        self.credential = Some((user.to_string(), password.to_string()));
    }

    #[must_use]
    pub fn level(&self) -> u16 {
        self.level
    }

    #[must_use]
    pub fn size(&self) -> u16 {
        self.size
    }

    #[must_use]
    pub fn node(&self) -> [u8; 8] {
        self.node
    }

    #[must_use]
    pub fn user(&self) -> [u8; 8] {
        self.user
    }

    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    #[must_use]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    #[must_use]
    pub fn credential(&self) -> Option<(&str, &str)> {
        self.credential
            .as_ref()
            .map(|(u, p)| (u.as_str(), p.as_str()))
    }

    /// The shared state for `target_url`, created on first use.
    pub(crate) fn target_state(&self, target_url: &str) -> Arc<Mutex<TargetState>> {
        let mut targets = match self.targets.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        targets
            .entry(target_url.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(TargetState::default())))
            .clone()
    }
}

impl Default for AdabasId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AdabasId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} [{}] {:x}",
            String::from_utf8_lossy(&self.node).trim_end(),
            String::from_utf8_lossy(&self.user).trim_end(),
            self.pid,
            self.timestamp
        )
    }
}

/// State shared by all sessions of one identity towards one target.
#[derive(Debug, Default)]
pub struct TargetState {
    /// Session-open flag; set by OP, cleared by CL.
    pub open: bool,
    /// Number of data modifications since the last ET/BT.
    pub open_transactions: u32,
    /// Platform derived from the open reply.
    pub platform: Platform,
    /// Database version string from the open reply.
    pub version: Option<String>,
    /// The connected physical driver, if any.
    pub connection: Option<Box<dyn Driver>>,
}
