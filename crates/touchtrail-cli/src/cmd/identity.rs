//! `tt identity`: Show or replace the visitor token.

use anyhow::{Result, bail};
use clap::Args;
use serde::Serialize;
use std::io::Write;

use crate::output::{OutputMode, pretty_kv, render_mode};
use crate::session::{Context, PageLoad, Session};

#[derive(Args, Debug, Clone)]
pub struct IdentityArgs {
    /// Replace the visitor token with this one.
    #[arg(long)]
    pub set: Option<String>,
}

#[derive(Debug, Serialize)]
struct IdentityReport {
    uuid: String,
    replaced: bool,
}

/// Execute `tt identity`.
///
/// # Errors
///
/// Returns an error when `--set` names a malformed token (the current token
/// is kept) or the state directory cannot be read or written.
pub fn run_identity(args: &IdentityArgs, ctx: &Context, output: OutputMode) -> Result<()> {
    let mut session = Session::open(ctx, None, PageLoad::Continue)?;
    if let Some(token) = &args.set {
        if let Err(err) = session.tracker.set_identity(token) {
            session.close()?;
            match err.hint() {
                Some(hint) => bail!("{err}\nhint: {hint}"),
                None => bail!("{err}"),
            }
        }
    }
    let report = IdentityReport {
        uuid: session.tracker.visitor_id(),
        replaced: args.set.is_some(),
    };
    session.close()?;

    render_mode(
        output,
        &report,
        |r, w| writeln!(w, "{}", r.uuid),
        |r, w| {
            pretty_kv(w, "visitor", &r.uuid)?;
            if r.replaced {
                pretty_kv(w, "status", "replaced")?;
            }
            Ok(())
        },
    )
}
