//! `tt signup`, `tt login`, `tt logout`, and `tt reconcile`.

use anyhow::{Result, bail};
use clap::Args;
use serde::Serialize;
use std::io::Write;
use touchtrail_core::TouchpointEvent;

use crate::output::{
    Dispatched, OutputMode, format_ms, pretty_attribution, pretty_dispatched, pretty_kv,
    pretty_section, render_mode, text_dispatched,
};
use crate::session::{Context, PageLoad, Session, parse_page};

#[derive(Args, Debug, Clone)]
pub struct AccountArgs {
    /// Account identifier.
    pub account: String,

    /// Page the action happened on. Defaults to the last visited page.
    #[arg(long)]
    pub url: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ReconcileArgs {
    /// Account the visitor turned out to be signed in as.
    #[arg(long, conflicts_with = "logged_out")]
    pub account: Option<String>,

    /// The visitor turned out to be anonymous.
    #[arg(long)]
    pub logged_out: bool,
}

#[derive(Debug, Serialize)]
struct AuthReport {
    action: &'static str,
    logged_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    event: Option<TouchpointEvent>,
    events_stored: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    dispatched: Vec<Dispatched>,
}

#[derive(Clone, Copy)]
enum Authentication {
    Signup,
    Login,
}

fn run_authentication(
    kind: Authentication,
    args: &AccountArgs,
    ctx: &Context,
    output: OutputMode,
) -> Result<()> {
    let explicit = args
        .url
        .as_deref()
        .map(|url| parse_page(url, None, None))
        .transpose()?;
    let mut session = Session::open(ctx, explicit.as_ref().map(|p| p.host()), PageLoad::Continue)?;
    let page = match explicit {
        Some(page) => page,
        None => session.current_page()?,
    };

    let (action, recorded) = match kind {
        Authentication::Signup => ("signup", session.tracker.record_signup(&page, &args.account)),
        Authentication::Login => ("login", session.tracker.record_login(&page, &args.account)),
    };
    let event = match recorded {
        Ok(event) => event,
        Err(err) => {
            if let Some(hint) = err.hint() {
                bail!("{err}\nhint: {hint}");
            }
            bail!("{err}");
        }
    };

    finish(session, action, Some(event), output)
}

/// Execute `tt signup`.
///
/// # Errors
///
/// Returns an error for a blank account id, an unparsable `--url`, or state
/// directory failures.
pub fn run_signup(args: &AccountArgs, ctx: &Context, output: OutputMode) -> Result<()> {
    run_authentication(Authentication::Signup, args, ctx, output)
}

/// Execute `tt login`.
///
/// # Errors
///
/// Returns an error for a blank account id, an unparsable `--url`, or state
/// directory failures.
pub fn run_login(args: &AccountArgs, ctx: &Context, output: OutputMode) -> Result<()> {
    run_authentication(Authentication::Login, args, ctx, output)
}

/// Execute `tt logout`.
///
/// # Errors
///
/// Returns an error if the state directory cannot be read or written.
pub fn run_logout(ctx: &Context, output: OutputMode) -> Result<()> {
    let mut session = Session::open(ctx, None, PageLoad::Continue)?;
    let updated = session.tracker.apply_login_state(false, None)?;
    finish(session, "logout", updated, output)
}

/// Execute `tt reconcile`.
///
/// # Errors
///
/// Returns an error for a blank `--account` or state directory failures.
pub fn run_reconcile(args: &ReconcileArgs, ctx: &Context, output: OutputMode) -> Result<()> {
    let mut session = Session::open(ctx, None, PageLoad::Continue)?;
    let updated = session
        .tracker
        .apply_login_state(!args.logged_out, args.account.as_deref())?;
    finish(session, "reconcile", updated, output)
}

fn finish(
    session: Session,
    action: &'static str,
    event: Option<TouchpointEvent>,
    output: OutputMode,
) -> Result<()> {
    let logged_in = session.tracker.is_logged_in();
    let account_id = session.tracker.account_id();
    let events_stored = session.tracker.events().len();
    let dispatched = session.close()?;

    let report = AuthReport {
        action,
        logged_in,
        account_id,
        event,
        events_stored,
        dispatched,
    };

    render_mode(
        output,
        &report,
        |r, w| {
            writeln!(
                w,
                "{}\t{}\t{}\t{}",
                r.action,
                if r.logged_in { "logged-in" } else { "logged-out" },
                r.account_id.as_deref().unwrap_or("-"),
                r.event.as_ref().map_or("-", |e| e.event_id.as_str())
            )?;
            text_dispatched(w, &r.dispatched)
        },
        |r, w| {
            pretty_section(w, &format!("{} recorded", r.action))?;
            pretty_kv(w, "logged in", if r.logged_in { "yes" } else { "no" })?;
            pretty_kv(w, "account", r.account_id.as_deref().unwrap_or("-"))?;
            pretty_kv(w, "stored events", r.events_stored.to_string())?;
            match &r.event {
                Some(event) => {
                    writeln!(w)?;
                    pretty_section(w, "Touchpoint")?;
                    pretty_kv(w, "id", &event.event_id)?;
                    pretty_kv(w, "kind", event.kind.as_str())?;
                    pretty_kv(w, "url", &event.url)?;
                    pretty_kv(w, "at", format_ms(event.timestamp))?;
                    pretty_attribution(w, &event.attribution)?;
                }
                None => writeln!(w, "no touchpoint to update")?,
            }
            pretty_dispatched(w, &r.dispatched)
        },
    )
}
