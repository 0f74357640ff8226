//! `tt log`: Inspect the stored touchpoint log.

use anyhow::Result;
use clap::Args;
use std::io::Write;
use touchtrail_core::TouchpointEvent;

use crate::output::{OutputMode, format_ms, pretty_kv, pretty_rule, pretty_section, render_mode};
use crate::session::{Context, Session};

#[derive(Args, Debug, Clone)]
pub struct LogArgs {
    /// Show only the newest N touchpoints.
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

/// Execute `tt log`.
///
/// # Errors
///
/// Returns an error if the state directory cannot be read.
pub fn run_log(args: &LogArgs, ctx: &Context, output: OutputMode) -> Result<()> {
    let session = Session::inspect(ctx)?;
    let events = session.tracker.events();
    let skip = args
        .limit
        .map_or(0, |limit| events.len().saturating_sub(limit));
    let rows: Vec<TouchpointEvent> = events[skip..].to_vec();
    session.close()?;

    render_mode(
        output,
        &rows,
        |rows, w| {
            for event in rows {
                writeln!(w, "{event}")?;
            }
            Ok(())
        },
        |rows, w| {
            if rows.is_empty() {
                return writeln!(w, "no touchpoints recorded");
            }
            pretty_section(w, &format!("Touchpoints ({})", rows.len()))?;
            for event in rows {
                pretty_kv(w, "at", format_ms(event.timestamp))?;
                pretty_kv(w, "kind", event.kind.as_str())?;
                pretty_kv(w, "url", &event.url)?;
                let source = event
                    .attribution
                    .utm_source
                    .as_deref()
                    .or(event.attribution.referrer.as_deref())
                    .unwrap_or("direct");
                pretty_kv(w, "source", source)?;
                if let Some(campaign) = &event.attribution.utm_campaign {
                    pretty_kv(w, "campaign", campaign)?;
                }
                pretty_kv(
                    w,
                    "account",
                    match (&event.account_id, event.logged_in) {
                        (Some(id), true) => id.clone(),
                        (_, true) => "logged in".to_string(),
                        (_, false) => "anonymous".to_string(),
                    },
                )?;
                pretty_kv(w, "id", &event.event_id)?;
                pretty_rule(w)?;
            }
            Ok(())
        },
    )
}
