//! Shared output layer for pretty/text/JSON parity across all CLI commands.
//!
//! # Output mode resolution
//!
//! Precedence (highest wins):
//! 1. `--format` / hidden `--json` flag
//! 2. `FORMAT` env var: `"pretty"` | `"text"` | `"json"`
//! 3. Default: [`OutputMode::Pretty`] if stdout is a TTY; [`OutputMode::Text`] if piped.

use clap::ValueEnum;
use serde::Serialize;
use std::io::{self, IsTerminal, Write};
use touchtrail_core::AttributionSnapshot;
use touchtrail_core::dispatch::Outbound;

/// Shared width for human pretty separators.
pub const PRETTY_RULE_WIDTH: usize = 72;

/// Write a horizontal separator used by pretty human output.
pub fn pretty_rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = PRETTY_RULE_WIDTH)
}

/// Write a section heading followed by a separator.
pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    pretty_rule(w)
}

/// Render a left-aligned key/value line in human output.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<16} {}", format!("{key}:"), value.as_ref())
}

/// The three output modes supported by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Human-optimized output (sections, aligned fields).
    Pretty,
    /// Plain tab-separated text for scripts and pipes.
    Text,
    /// Machine-readable JSON.
    Json,
}

/// Core resolution logic, separated from I/O for testability.
fn resolve_output_mode_inner(
    format_flag: Option<OutputMode>,
    json_flag: bool,
    format_env: Option<&str>,
    is_tty: bool,
) -> OutputMode {
    if let Some(mode) = format_flag {
        return mode;
    }

    if json_flag {
        return OutputMode::Json;
    }

    if let Some(val) = format_env {
        match val.to_lowercase().as_str() {
            "json" => return OutputMode::Json,
            "text" => return OutputMode::Text,
            "pretty" => return OutputMode::Pretty,
            _ => {}
        }
    }

    if is_tty {
        OutputMode::Pretty
    } else {
        OutputMode::Text
    }
}

/// Resolve the output mode from CLI flags, environment, and TTY defaults.
pub fn resolve_output_mode(format_flag: Option<OutputMode>, json_flag: bool) -> OutputMode {
    let env_val = std::env::var("FORMAT").ok();
    let is_tty = io::stdout().is_terminal();
    resolve_output_mode_inner(format_flag, json_flag, env_val.as_deref(), is_tty)
}

/// Render a serializable value with explicit pretty/text renderers.
pub fn render_mode<T: Serialize>(
    mode: OutputMode,
    value: &T,
    text_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
    pretty_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
        OutputMode::Text => text_fn(value, &mut out)?,
        OutputMode::Pretty => pretty_fn(value, &mut out)?,
    }
    Ok(())
}

/// A notification captured by `--dry-run`.
#[derive(Debug, Clone, Serialize)]
pub struct Dispatched {
    pub route: &'static str,
    pub body: serde_json::Value,
}

impl From<&Outbound> for Dispatched {
    fn from(message: &Outbound) -> Self {
        Self {
            route: message.route(),
            body: message.body(),
        }
    }
}

/// Pretty listing of captured notifications; nothing when empty.
pub fn pretty_dispatched(w: &mut dyn Write, dispatched: &[Dispatched]) -> io::Result<()> {
    if dispatched.is_empty() {
        return Ok(());
    }
    writeln!(w)?;
    pretty_section(w, "Notifications (dry run)")?;
    for message in dispatched {
        writeln!(w, "POST /{}  {}", message.route, message.body)?;
    }
    Ok(())
}

/// Text listing of captured notifications, one per line.
pub fn text_dispatched(w: &mut dyn Write, dispatched: &[Dispatched]) -> io::Result<()> {
    for message in dispatched {
        writeln!(w, "dispatch\t{}\t{}", message.route, message.body)?;
    }
    Ok(())
}

/// Pretty key/value listing of every set attribution field.
pub fn pretty_attribution(w: &mut dyn Write, snapshot: &AttributionSnapshot) -> io::Result<()> {
    for (key, value) in snapshot.entries() {
        pretty_kv(w, key, value)?;
    }
    if let Some(ts) = snapshot.attribution_timestamp {
        pretty_kv(w, "captured", format_ms(ts))?;
    }
    Ok(())
}

/// Epoch milliseconds as RFC 3339, falling back to the raw number.
pub fn format_ms(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map_or_else(|| ms.to_string(), |dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_flag_wins() {
        assert_eq!(
            resolve_output_mode_inner(Some(OutputMode::Text), true, Some("json"), true),
            OutputMode::Text
        );
        assert_eq!(
            resolve_output_mode_inner(None, true, Some("pretty"), true),
            OutputMode::Json
        );
    }

    #[test]
    fn env_then_tty_default() {
        assert_eq!(
            resolve_output_mode_inner(None, false, Some("TEXT"), true),
            OutputMode::Text
        );
        assert_eq!(
            resolve_output_mode_inner(None, false, Some("bogus"), false),
            OutputMode::Text
        );
        assert_eq!(
            resolve_output_mode_inner(None, false, None, true),
            OutputMode::Pretty
        );
    }

    #[test]
    fn pretty_kv_aligns_keys() {
        let mut buf = Vec::new();
        pretty_kv(&mut buf, "utm_source", "google").expect("write");
        assert_eq!(String::from_utf8(buf).expect("utf8"), "utm_source:      google\n");
    }

    #[test]
    fn timestamps_render_as_rfc3339() {
        assert_eq!(format_ms(1_704_067_200_000), "2024-01-01T00:00:00.000Z");
    }
}
