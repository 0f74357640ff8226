//! `tt clear`: Drop recorded state.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::io::Write;

use crate::output::{OutputMode, pretty_kv, render_mode};
use crate::session::{Context, PageLoad, Session, SessionFile};

#[derive(Args, Debug, Clone)]
pub struct ClearArgs {
    /// Also forget the persisted attribution.
    #[arg(long)]
    pub attribution: bool,

    /// Forget the log, the attribution, and the session. The visitor
    /// identity is kept.
    #[arg(long)]
    pub all: bool,
}

#[derive(Debug, Serialize)]
struct ClearReport {
    events_removed: usize,
    attribution_cleared: bool,
    session_cleared: bool,
}

/// Execute `tt clear`.
///
/// # Errors
///
/// Returns an error if the state directory cannot be read or written.
pub fn run_clear(args: &ClearArgs, ctx: &Context, output: OutputMode) -> Result<()> {
    let mut session = Session::open(ctx, None, PageLoad::Continue)?;
    let events_removed = session.tracker.events().len();
    session.tracker.clear_events();
    let attribution_cleared = args.attribution || args.all;
    if attribution_cleared {
        session.tracker.clear_attribution();
    }
    session.close()?;
    if args.all {
        SessionFile::remove(&ctx.state_dir)?;
    }

    let report = ClearReport {
        events_removed,
        attribution_cleared,
        session_cleared: args.all,
    };
    render_mode(
        output,
        &report,
        |r, w| writeln!(w, "cleared\t{}", r.events_removed),
        |r, w| {
            pretty_kv(w, "removed", format!("{} touchpoints", r.events_removed))?;
            if r.attribution_cleared {
                pretty_kv(w, "attribution", "cleared")?;
            }
            if r.session_cleared {
                pretty_kv(w, "session", "cleared")?;
            }
            Ok(())
        },
    )
}
