//! `tt visit`: Report a navigation to the tracker.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::io::Write;
use touchtrail_core::{AttributionSnapshot, NavigationSignal, VisitOutcome};

use crate::output::{
    Dispatched, OutputMode, pretty_attribution, pretty_dispatched, pretty_kv, pretty_section,
    render_mode, text_dispatched,
};
use crate::session::{Context, PageLoad, Session, parse_page};

#[derive(Args, Debug, Clone)]
pub struct VisitArgs {
    /// Absolute URL of the page.
    pub url: String,

    /// Referring URL.
    #[arg(long)]
    pub referrer: Option<String>,

    /// Page title.
    #[arg(long)]
    pub title: Option<String>,

    /// How the page was reached: load, push, replace, pop, or hash.
    #[arg(long, default_value = "load")]
    pub signal: NavigationSignal,
}

#[derive(Debug, Serialize)]
struct VisitReport {
    url: String,
    signal: &'static str,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    event_id: Option<String>,
    evicted: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    attribution: Option<AttributionSnapshot>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    dispatched: Vec<Dispatched>,
}

/// Execute `tt visit`.
///
/// A `load` signal starts a new page session; history and hash signals
/// continue the previous one.
///
/// # Errors
///
/// Returns an error if the URL does not parse or the state directory cannot
/// be read or written.
pub fn run_visit(args: &VisitArgs, ctx: &Context, output: OutputMode) -> Result<()> {
    let page = parse_page(&args.url, args.referrer.as_deref(), args.title.as_deref())?;
    let load = if args.signal == NavigationSignal::Load {
        PageLoad::Fresh
    } else {
        PageLoad::Continue
    };

    let mut session = Session::open(ctx, Some(page.host()), load)?;
    let outcome = session.tracker.on_navigation(args.signal, &page);
    let attribution = session.tracker.session().attribution.clone();
    let dispatched = session.close()?;

    let (event_id, evicted) = match &outcome {
        VisitOutcome::Recorded { event_id, evicted } => (Some(event_id.clone()), *evicted),
        _ => (None, 0),
    };
    let report = VisitReport {
        url: page.location().to_string(),
        signal: args.signal.as_str(),
        outcome: outcome.label(),
        event_id,
        evicted,
        attribution,
        dispatched,
    };

    render_mode(
        output,
        &report,
        |r, w| {
            writeln!(
                w,
                "{}\t{}\t{}",
                r.outcome,
                r.event_id.as_deref().unwrap_or("-"),
                r.url
            )?;
            text_dispatched(w, &r.dispatched)
        },
        |r, w| {
            pretty_section(w, "Visit")?;
            pretty_kv(w, "url", &r.url)?;
            pretty_kv(w, "signal", r.signal)?;
            pretty_kv(w, "outcome", r.outcome)?;
            if let Some(id) = &r.event_id {
                pretty_kv(w, "event", id)?;
            }
            if r.evicted > 0 {
                pretty_kv(w, "evicted", r.evicted.to_string())?;
            }
            if let Some(attribution) = &r.attribution {
                writeln!(w)?;
                pretty_section(w, "Attribution")?;
                pretty_attribution(w, attribution)?;
            }
            pretty_dispatched(w, &r.dispatched)
        },
    )
}
