//! Target descriptors.
//!
//! A target names the database a session talks to, either a plain local id
//! (`"24"`) or a remote descriptor with driver, host and port:
//! `"24(adatcp://dbhost:60024)"`, optionally followed by `?key=value`
//! parameter pairs. Parsing and rendering round-trip exactly.

use crate::{AdaError, AdaResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};

/// Highest database id the descriptor syntax admits.
pub const MAX_DBID: u32 = 65_535;

/// Numeric database id.
pub type Dbid = u32;

/// Numeric file number within a database.
pub type Fnr = u32;

/// A parsed target descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    dbid: Dbid,
    driver: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    options: Vec<(String, String)>,
}

impl Target {
    /// Creates a local target that is resolved by the driver's own means
    /// (environment, local IPC).
    ///
    /// # Errors
    /// `AdaError::Target` if `dbid` is outside `1..=MAX_DBID`.
    pub fn local(dbid: Dbid) -> AdaResult<Self> {
        check_dbid(dbid)?;
        Ok(Self {
            dbid,
            driver: None,
            host: None,
            port: None,
            options: Vec::new(),
        })
    }

    /// Creates a remote target with an explicit network address.
    ///
    /// # Errors
    /// `AdaError::Target` if `dbid` is outside `1..=MAX_DBID`.
    pub fn remote(dbid: Dbid, driver: &str, host: &str, port: u16) -> AdaResult<Self> {
        check_dbid(dbid)?;
        Ok(Self {
            dbid,
            driver: Some(driver.to_lowercase()),
            host: Some(host.to_string()),
            port: Some(port),
            options: Vec::new(),
        })
    }

    /// Parses a descriptor string.
    ///
    /// # Errors
    /// `AdaError::Target` for any syntactic deviation.
    pub fn parse(descriptor: &str) -> AdaResult<Self> {
        let descriptor = descriptor.trim();
        if descriptor.is_empty() {
            return Err(AdaError::Target("empty target descriptor".to_string()));
        }

        let (id_part, rest) = match descriptor.find('(') {
            Some(pos) => (&descriptor[..pos], Some(&descriptor[pos..])),
            None => (descriptor, None),
        };
        let dbid: Dbid = id_part
            .parse()
            .map_err(|_| AdaError::Target(format!("invalid database id in {descriptor:?}")))?;
        check_dbid(dbid)?;

        let Some(rest) = rest else {
            return Self::local(dbid);
        };

        let inner = rest
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .ok_or_else(|| AdaError::Target(format!("unbalanced parentheses in {descriptor:?}")))?;

        let (address, query) = match inner.find('?') {
            Some(pos) => (&inner[..pos], Some(&inner[pos + 1..])),
            None => (inner, None),
        };

        let (driver, location) = address
            .split_once("://")
            .ok_or_else(|| AdaError::Target(format!("missing '://' in {descriptor:?}")))?;
        if driver.is_empty() {
            return Err(AdaError::Target(format!("empty driver name in {descriptor:?}")));
        }
        let (host, port) = location
            .rsplit_once(':')
            .ok_or_else(|| AdaError::Target(format!("missing port in {descriptor:?}")))?;
        if host.is_empty() {
            return Err(AdaError::Target(format!("empty host in {descriptor:?}")));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| AdaError::Target(format!("invalid port in {descriptor:?}")))?;

        let mut target = Self::remote(dbid, driver, host, port)?;
        if let Some(query) = query {
            for pair in query.split('&') {
                let (key, value) = pair.split_once('=').ok_or_else(|| {
                    AdaError::Target(format!("invalid option {pair:?} in {descriptor:?}"))
                })?;
                target.options.push((key.to_string(), value.to_string()));
            }
        }
        Ok(target)
    }

    /// The database id.
    #[must_use]
    pub fn dbid(&self) -> Dbid {
        self.dbid
    }

    /// The driver name, lowercased; `None` for a local target.
    #[must_use]
    pub fn driver(&self) -> Option<&str> {
        self.driver.as_deref()
    }

    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    #[must_use]
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Additional `key=value` options, in descriptor order.
    #[must_use]
    pub fn options(&self) -> &[(String, String)] {
        &self.options
    }

    /// Looks up a single option value.
    #[must_use]
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_option(&mut self, key: &str, value: &str) {
        match self.options.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.options.push((key.to_string(), value.to_string())),
        }
    }

    /// True when no network address is given.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.driver.is_none()
    }
}

fn check_dbid(dbid: Dbid) -> AdaResult<()> {
    if dbid == 0 || dbid > MAX_DBID {
        return Err(AdaError::Target(format!(
            "database id {dbid} outside 1..={MAX_DBID}"
        )));
    }
    Ok(())
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dbid)?;
        if let (Some(driver), Some(host), Some(port)) = (&self.driver, &self.host, self.port) {
            write!(f, "({driver}://{host}:{port}")?;
            for (i, (key, value)) in self.options.iter().enumerate() {
                write!(f, "{}{key}={value}", if i == 0 { '?' } else { '&' })?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Target {
    type Err = AdaError;
    fn from_str(s: &str) -> AdaResult<Self> {
        Self::parse(s)
    }
}

impl Serialize for Target {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Target {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(D::Error::custom)
    }
}
