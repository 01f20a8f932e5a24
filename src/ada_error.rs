use crate::messages::CallFailure;

/// Abbreviation of `Result<T, AdaError>`.
pub type AdaResult<T> = std::result::Result<T, AdaError>;

/// Represents all possible errors that can occur in this crate.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AdaError {
    /// Error occured in the interaction with the database.
    #[error("database response error: {source}")]
    Db {
        /// The negative call response, as reported by the database.
        #[from]
        source: CallFailure,
    },

    /// Error occured while evaluating a target descriptor.
    #[error("invalid target descriptor: {0}")]
    Target(String),

    /// Erroneous usage of the API.
    #[error("wrong usage of the API: {0}")]
    Usage(&'static str),

    /// Erroneous usage of the API, with dynamic detail.
    #[error("wrong usage of the API: {0}")]
    UsageDetailed(String),

    /// Inconsistent data were read from the wire.
    #[error("wire data is corrupt: {0}")]
    Corrupt(&'static str),

    /// No driver factory is registered for the requested driver name.
    #[error("no driver registered for {0:?}")]
    UnknownDriver(String),

    /// Error occured in the communication with the database.
    #[error("IO error: {source}")]
    Io {
        /// The causing io Error.
        #[from]
        source: std::io::Error,
    },

    /// A lock on shared session state was poisoned by a panicking thread.
    #[error("cannot lock shared session state")]
    Poison,
}

impl AdaError {
    /// Returns the contained `CallFailure`, if any.
    ///
    /// Allows branching on the raw response code without string matching.
    #[must_use]
    pub fn call_failure(&self) -> Option<&CallFailure> {
        match self {
            Self::Db { source } => Some(source),
            _ => None,
        }
    }
}

impl<G> From<std::sync::PoisonError<G>> for AdaError {
    fn from(_error: std::sync::PoisonError<G>) -> Self {
        Self::Poison
    }
}

// Shortcut for building a UsageDetailed error.
macro_rules! usage_err {
    ($($arg:tt)*) => {
        $crate::AdaError::UsageDetailed(format!($($arg)*))
    }
}
pub(crate) use usage_err;
