//! Touchpoint event kinds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a touchpoint records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A page visit.
    #[default]
    Pageview,
    /// Account creation; always recorded, ends anonymous visit tracking.
    Signup,
    /// Sign-in of an existing account.
    Login,
}

/// Error returned when parsing an unknown event kind string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventKind {
    pub raw: String,
}

impl fmt::Display for UnknownEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown event kind '{}': expected one of pageview, signup, login",
            self.raw
        )
    }
}

impl std::error::Error for UnknownEventKind {}

impl EventKind {
    pub const ALL: [Self; 3] = [Self::Pageview, Self::Signup, Self::Login];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pageview => "pageview",
            Self::Signup => "signup",
            Self::Login => "login",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pageview" => Ok(Self::Pageview),
            "signup" => Ok(Self::Signup),
            "login" => Ok(Self::Login),
            _ => Err(UnknownEventKind { raw: s.to_string() }),
        }
    }
}
