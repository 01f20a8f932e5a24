//! Translation of numeric call responses into message codes and texts.

use std::collections::HashMap;

/// Every message code starts with this prefix.
pub const MESSAGE_PREFIX: &str = "ADAGE";

const UNKNOWN_MESSAGE: &str = "Unknown response and subcode";

lazy_static! {
    // Keyed by the full message code; entries with subcode 000 double as
    // the fallback for unlisted subcodes of the same response.
    static ref MESSAGE_CATALOG: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("ADAGE00000", "Normal successful completion");
        m.insert("ADAGE02000", "Ignored DE field with TR option");
        m.insert("ADAGE03000", "End of file reached");
        m.insert("ADAGE09000", "Session timeout, transaction backed out");
        m.insert("ADAGE10000", "Too many occurrences for a periodic group");
        m.insert("ADAGE11000", "Invalid command id");
        m.insert("ADAGE15000", "Invalid command code");
        m.insert("ADAGE30000", "Invalid command option");
        m.insert("ADAGE28000", "Invalid descriptor in search or sort criteria");
        m.insert("ADAGE31000", "Invalid record buffer length");
        m.insert("ADAGE35001", "Record buffer too short for format selection");
        m.insert("ADAGE3C000", "Invalid value conversion in format selection");
        m.insert("ADAGE3D000", "Invalid file number");
        m.insert("ADAGE41000", "Error in format buffer syntax");
        m.insert("ADAGE71000", "Requested record not found");
        m.insert("ADAGE72000", "User queue overflow");
        m.insert("ADAGE91000", "Requested record is held by another user");
        m.insert("ADAGE94000", "Database is inactive or not reachable");
        m.insert("ADAGE95000", "Communication error with the database");
        m.insert("ADAGEC1000", "Security violation");
        m.insert("ADAGEFF000", "Functionality not yet implemented");
        m
    };
}

/// Builds the message code for a response/sub-response pair:
/// prefix, two hex digits of the response, three hex digits of the
/// sub-response.
#[must_use]
pub fn message_code(response: u16, sub_response: u16) -> String {
    format!("{MESSAGE_PREFIX}{response:02X}{sub_response:03X}")
}

fn message_text(response: u16, sub_response: u16) -> (String, &'static str) {
    let code = message_code(response, sub_response);
    if let Some(text) = MESSAGE_CATALOG.get(code.as_str()).copied() {
        return (code, text);
    }
    // fall back to the generic entry of the response before giving up
    let generic = message_code(response, 0);
    match MESSAGE_CATALOG.get(generic.as_str()).copied() {
        Some(text) => (code, text),
        None => (code, UNKNOWN_MESSAGE),
    }
}

/// A negative response to a database call, with all numeric detail the
/// control block reported.
#[derive(Clone, Debug)]
pub struct CallFailure {
    code: String,
    message: String,
    response: u16,
    sub_response: u16,
    target: String,
    file_nr: u32,
    additions2: [u8; 4],
}

impl CallFailure {
    pub(crate) fn new(
        response: u16,
        sub_response: u16,
        target: &str,
        file_nr: u32,
        additions2: [u8; 4],
    ) -> Self {
        let (code, text) = message_text(response, sub_response);
        let message = format!(
            "{text} (rsp={response},subrsp={sub_response},dbid={target},file={file_nr})"
        );
        Self {
            code,
            message,
            response,
            sub_response,
            target: target.to_string(),
            file_nr,
            additions2,
        }
    }

    /// The message code, e.g. `"ADAGE91000"`.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// The message text including the numeric detail suffix.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The raw response code.
    #[must_use]
    pub fn response(&self) -> u16 {
        self.response
    }

    /// The raw sub-response code.
    #[must_use]
    pub fn sub_response(&self) -> u16 {
        self.sub_response
    }

    /// The target the failing call was sent to.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The file number of the failing call.
    #[must_use]
    pub fn file_nr(&self) -> u32 {
        self.file_nr
    }

    /// The additions-2 bytes of the reply, which some responses use for
    /// further detail.
    #[must_use]
    pub fn additions2(&self) -> [u8; 4] {
        self.additions2
    }
}

impl std::fmt::Display for CallFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CallFailure {}
