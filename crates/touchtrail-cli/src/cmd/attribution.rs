//! `tt attribution`: Show the persisted attribution snapshot.

use anyhow::Result;
use std::io::Write;

use crate::output::{OutputMode, pretty_attribution, pretty_section, render_mode};
use crate::session::{Context, Session};

/// Execute `tt attribution`.
///
/// Prints `null` in JSON mode when nothing live is persisted.
///
/// # Errors
///
/// Returns an error if the state directory cannot be read.
pub fn run_attribution(ctx: &Context, output: OutputMode) -> Result<()> {
    let mut session = Session::inspect(ctx)?;
    let snapshot = session.tracker.attribution();
    session.close()?;

    render_mode(
        output,
        &snapshot,
        |snapshot, w| match snapshot {
            Some(snapshot) => {
                for (key, value) in snapshot.entries() {
                    writeln!(w, "{key}\t{value}")?;
                }
                if let Some(ts) = snapshot.attribution_timestamp {
                    writeln!(w, "attribution_timestamp\t{ts}")?;
                }
                Ok(())
            }
            None => Ok(()),
        },
        |snapshot, w| match snapshot {
            Some(snapshot) => {
                pretty_section(w, "Attribution")?;
                pretty_attribution(w, snapshot)
            }
            None => writeln!(w, "no attribution persisted"),
        },
    )
}
