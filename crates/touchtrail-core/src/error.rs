use std::fmt;

/// Machine-readable error codes shared by every touchtrail error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    ConfigInvalid,
    InvalidIdentity,
    InvalidAccountId,
    StorageQuotaExceeded,
    StorageWriteFailed,
    MalformedState,
    TransportFailed,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::ConfigInvalid => "E1002",
            Self::InvalidIdentity => "E2001",
            Self::InvalidAccountId => "E2002",
            Self::StorageQuotaExceeded => "E3001",
            Self::StorageWriteFailed => "E3002",
            Self::MalformedState => "E3003",
            Self::TransportFailed => "E5001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::ConfigInvalid => "Config value out of range",
            Self::InvalidIdentity => "Invalid visitor identity token",
            Self::InvalidAccountId => "Invalid account identifier",
            Self::StorageQuotaExceeded => "Storage quota exceeded",
            Self::StorageWriteFailed => "Storage write failed",
            Self::MalformedState => "Malformed persisted state",
            Self::TransportFailed => "Backend notification failed",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in .touchtrail/config.toml and retry."),
            Self::ConfigInvalid => {
                Some("max_events, cookie_expire_days and attribution_expiry must be at least 1.")
            }
            Self::InvalidIdentity => {
                Some("Use 1-128 characters from [A-Za-z0-9._-], e.g. a UUID.")
            }
            Self::InvalidAccountId => Some("Pass a non-empty account identifier."),
            Self::StorageQuotaExceeded => Some("Lower max_events or run `tt clear`."),
            Self::StorageWriteFailed => Some("Check disk space and write permissions."),
            Self::MalformedState => Some("Run `tt clear` to reset the stored journey."),
            Self::TransportFailed => None,
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors surfaced to callers of the [`Tracker`](crate::tracker::Tracker).
///
/// Only caller-supplied arguments can fail; every other failure is logged
/// and absorbed inside the tracker.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TrackerError {
    /// An externally supplied visitor token failed validation.
    #[error("{}: rejected visitor identity {token:?}", ErrorCode::InvalidIdentity)]
    InvalidIdentity { token: String },

    /// An account identifier was empty or whitespace.
    #[error("{}: account id must not be empty", ErrorCode::InvalidAccountId)]
    InvalidAccountId,
}

impl TrackerError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidIdentity { .. } => ErrorCode::InvalidIdentity,
            Self::InvalidAccountId => ErrorCode::InvalidAccountId,
        }
    }

    /// Optional remediation hint.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}
