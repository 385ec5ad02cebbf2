use std::fmt;

/// Error taxonomy shared by the sheet sync and the mail campaigns.
///
/// Error enums in this crate derive `ErrorKind` so every variant reports one of these,
/// which is how callers tell a failure that ends the run from one that was already
/// absorbed at the record, identifier, or recipient level.
///
/// | Kind | Raised when | Handling |
/// |------|-------------|----------|
/// | `Config` | a required setting is missing or malformed | fatal, before any I/O |
/// | `Fetch` | the source collection cannot be queried | recovered as an empty record set |
/// | `Resolution` | one identity lookup fails | recovered with a sentinel for that identifier |
/// | `Transform` | records violate the primary key policy | fatal, nothing is written |
/// | `Write` | the destination cannot be opened or written | fatal for the run |
/// | `Input` | a recipient list cannot be read | fatal for the campaign |
/// | `Send` | one message cannot be built or delivered | recovered, campaign continues |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Config,
    Fetch,
    Resolution,
    Transform,
    Write,
    Input,
    Send,
}

impl ErrorKind {
    /// Whether an error of this kind ends the current run.
    pub fn is_fatal(self) -> bool {
        match self {
            ErrorKind::Config | ErrorKind::Transform | ErrorKind::Write | ErrorKind::Input => true,
            ErrorKind::Fetch | ErrorKind::Resolution | ErrorKind::Send => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Config => "config",
            ErrorKind::Fetch => "fetch",
            ErrorKind::Resolution => "resolution",
            ErrorKind::Transform => "transform",
            ErrorKind::Write => "write",
            ErrorKind::Input => "input",
            ErrorKind::Send => "send",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
