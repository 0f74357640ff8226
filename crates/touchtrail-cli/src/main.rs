#![forbid(unsafe_code)]

mod cmd;
mod output;
mod session;

use clap::{Parser, Subcommand};
use output::OutputMode;
use std::env;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "tt: replay and inspect visitor attribution journeys",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Directory holding cookies, the event log, and the session.
    #[arg(long, global = true, default_value = ".touchtrail")]
    state_dir: PathBuf,

    /// Output format.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Shorthand for `--format json`.
    #[arg(long, global = true, hide = true)]
    json: bool,

    /// Record notifications instead of sending them, and print them.
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Journey",
        about = "Record a page visit",
        long_about = "Resolve attribution for a page and record it as a touchpoint unless it is suppressed.",
        after_help = "EXAMPLES:\n    # Land from a paid search ad\n    tt visit 'https://x.com/?utm_source=google&utm_medium=cpc' --referrer https://google.com/\n\n    # Client-side route change\n    tt visit https://x.com/pricing --signal push\n\n    # Preview the notification without sending it\n    tt visit https://x.com/ --dry-run --json"
    )]
    Visit(cmd::visit::VisitArgs),

    #[command(
        next_help_heading = "Journey",
        about = "Record an account creation",
        long_about = "Append a signup touchpoint, mark the session logged in, and stop pageview tracking.",
        after_help = "EXAMPLES:\n    # Sign up on the current page\n    tt signup U42\n\n    # Sign up on a specific page\n    tt signup U42 --url https://x.com/signup"
    )]
    Signup(cmd::auth::AccountArgs),

    #[command(
        next_help_heading = "Journey",
        about = "Record a sign-in",
        long_about = "Append a login touchpoint for an existing account and mark the session logged in.",
        after_help = "EXAMPLES:\n    # Log in\n    tt login U42"
    )]
    Login(cmd::auth::AccountArgs),

    #[command(
        next_help_heading = "Journey",
        about = "Mark the session logged out",
        long_about = "Clear the login flag and account id on the open touchpoint.",
        after_help = "EXAMPLES:\n    # Log out\n    tt logout"
    )]
    Logout,

    #[command(
        next_help_heading = "Journey",
        about = "Attach authentication state to the open touchpoint",
        long_about = "Rewrite the open touchpoint (or the newest one) with a login state learned after it was recorded.",
        after_help = "EXAMPLES:\n    # The auth check came back after the visit was recorded\n    tt reconcile --account U42\n\n    # The visitor turned out to be anonymous\n    tt reconcile --logged-out"
    )]
    Reconcile(cmd::auth::ReconcileArgs),

    #[command(
        next_help_heading = "Read",
        about = "List recorded touchpoints",
        long_about = "List the stored touchpoint log, oldest first.",
        after_help = "EXAMPLES:\n    # Whole log\n    tt log\n\n    # Last five touchpoints as JSON\n    tt log -n 5 --json"
    )]
    Log(cmd::log::LogArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show the persisted attribution",
        long_about = "Show the attribution snapshot currently persisted, if it has not expired.",
        after_help = "EXAMPLES:\n    # Show attribution\n    tt attribution"
    )]
    Attribution,

    #[command(
        next_help_heading = "Identity",
        about = "Show or replace the visitor identity",
        long_about = "Show the visitor token, minting one on first use, or replace it with an external token.",
        after_help = "EXAMPLES:\n    # Show the token\n    tt identity\n\n    # Adopt a token from another system\n    tt identity --set 3b1f0c2e-identity"
    )]
    Identity(cmd::identity::IdentityArgs),

    #[command(
        next_help_heading = "Maintenance",
        about = "Clear recorded state",
        long_about = "Drop the touchpoint log, and optionally the attribution and session.",
        after_help = "EXAMPLES:\n    # Drop the log\n    tt clear\n\n    # Start over completely\n    tt clear --all"
    )]
    Clear(cmd::clear::ClearArgs),
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        output::resolve_output_mode(self.format, self.json)
    }

    fn context(&self) -> session::Context {
        session::Context {
            state_dir: self.state_dir.clone(),
            dry_run: self.dry_run,
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("TOUCHTRAIL_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "touchtrail_core=debug,tt=debug,info"
        } else {
            "touchtrail_core=info,warn"
        })
    });

    let format = env::var("TOUCHTRAIL_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.verbose {
        info!(state_dir = %cli.state_dir.display(), "verbose mode enabled");
    }

    let output = cli.output_mode();
    let ctx = cli.context();

    match cli.command {
        Commands::Visit(ref args) => cmd::visit::run_visit(args, &ctx, output),
        Commands::Signup(ref args) => cmd::auth::run_signup(args, &ctx, output),
        Commands::Login(ref args) => cmd::auth::run_login(args, &ctx, output),
        Commands::Logout => cmd::auth::run_logout(&ctx, output),
        Commands::Reconcile(ref args) => cmd::auth::run_reconcile(args, &ctx, output),
        Commands::Log(ref args) => cmd::log::run_log(args, &ctx, output),
        Commands::Attribution => cmd::attribution::run_attribution(&ctx, output),
        Commands::Identity(ref args) => cmd::identity::run_identity(args, &ctx, output),
        Commands::Clear(ref args) => cmd::clear::run_clear(args, &ctx, output),
    }
}
