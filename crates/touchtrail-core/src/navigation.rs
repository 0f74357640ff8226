//! Navigation signals reported by the host integration layer.

use std::fmt;
use std::str::FromStr;

use crate::config::TrackerConfig;

/// How the host arrived at the current page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavigationSignal {
    /// Full page load.
    Load,
    /// `history.pushState`.
    PushState,
    /// `history.replaceState`.
    ReplaceState,
    /// Back/forward navigation.
    PopState,
    /// Fragment change only.
    HashChange,
}

impl NavigationSignal {
    pub const ALL: [Self; 5] = [
        Self::Load,
        Self::PushState,
        Self::ReplaceState,
        Self::PopState,
        Self::HashChange,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::PushState => "push",
            Self::ReplaceState => "replace",
            Self::PopState => "pop",
            Self::HashChange => "hash",
        }
    }

    /// Whether `config` asks for this kind of navigation to be recorded.
    ///
    /// Nothing is recorded automatically when `auto_track` is off.
    #[must_use]
    pub const fn is_tracked(self, config: &TrackerConfig) -> bool {
        if !config.auto_track {
            return false;
        }
        match self {
            Self::Load => true,
            Self::PushState | Self::ReplaceState | Self::PopState => config.track_history_change,
            Self::HashChange => config.track_hash_change,
        }
    }
}

impl fmt::Display for NavigationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown navigation signal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown navigation signal '{raw}': expected one of load, push, replace, pop, hash")]
pub struct UnknownSignal {
    pub raw: String,
}

impl FromStr for NavigationSignal {
    type Err = UnknownSignal;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "load" => Ok(Self::Load),
            "push" | "pushstate" => Ok(Self::PushState),
            "replace" | "replacestate" => Ok(Self::ReplaceState),
            "pop" | "popstate" => Ok(Self::PopState),
            "hash" | "hashchange" => Ok(Self::HashChange),
            _ => Err(UnknownSignal { raw: s.to_string() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_track_loads_and_history_but_not_hashes() {
        let cfg = TrackerConfig::default();
        assert!(NavigationSignal::Load.is_tracked(&cfg));
        assert!(NavigationSignal::PushState.is_tracked(&cfg));
        assert!(NavigationSignal::PopState.is_tracked(&cfg));
        assert!(!NavigationSignal::HashChange.is_tracked(&cfg));
    }

    #[test]
    fn auto_track_off_disables_everything() {
        let cfg = TrackerConfig {
            auto_track: false,
            track_hash_change: true,
            ..TrackerConfig::default()
        };
        assert!(NavigationSignal::ALL.iter().all(|s| !s.is_tracked(&cfg)));
    }

    #[test]
    fn history_and_hash_flags_are_independent() {
        let cfg = TrackerConfig {
            track_history_change: false,
            track_hash_change: true,
            ..TrackerConfig::default()
        };
        assert!(!NavigationSignal::ReplaceState.is_tracked(&cfg));
        assert!(NavigationSignal::HashChange.is_tracked(&cfg));
        assert!(NavigationSignal::Load.is_tracked(&cfg));
    }

    #[test]
    fn parse_accepts_short_and_dom_names() {
        for signal in NavigationSignal::ALL {
            assert_eq!(signal.as_str().parse::<NavigationSignal>(), Ok(signal));
        }
        assert_eq!("pushState".parse(), Ok(NavigationSignal::PushState));
        assert_eq!("hashchange".parse(), Ok(NavigationSignal::HashChange));
        assert!("reload".parse::<NavigationSignal>().is_err());
    }
}
