//! Opening a tracker against a state directory, one process per page.
//!
//! ```text
//! <state-dir>/
//!   config.toml     # optional TrackerConfig
//!   cookies.json    # identity + attribution cookies
//!   local/          # touchpoint log
//!   session.json    # host and session state carried between invocations
//! ```

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use touchtrail_core::dispatch::{HttpTransport, MemoryTransport, NullTransport};
use touchtrail_core::storage::{
    CookieJar, CookieOptions, FileCookieJar, FileStore, KeyValueStore, StorageError,
};
use touchtrail_core::{PageContext, SessionState, Tracker, load_config};

use crate::output::Dispatched;

const SESSION_FILE: &str = "session.json";
const DEFAULT_PAGE: &str = "http://localhost/";

/// Global options every command needs.
#[derive(Debug, Clone)]
pub struct Context {
    pub state_dir: PathBuf,
    pub dry_run: bool,
}

/// What `session.json` holds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionFile {
    /// Host of the last page visited; scopes cookies for commands that do
    /// not name a page.
    pub host: Option<String>,
    pub session: SessionState,
}

impl SessionFile {
    pub fn load(state_dir: &Path) -> Result<Self> {
        let path = state_dir.join(SESSION_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        match serde_json::from_str(&content) {
            Ok(file) => Ok(file),
            Err(err) => {
                tracing::warn!(path = %path.display(), "ignoring malformed session file: {err}");
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self, state_dir: &Path) -> Result<()> {
        fs::create_dir_all(state_dir)
            .with_context(|| format!("Failed to create {}", state_dir.display()))?;
        let path = state_dir.join(SESSION_FILE);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn remove(state_dir: &Path) -> Result<()> {
        let path = state_dir.join(SESSION_FILE);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }
}

/// A tracker opened for one command, plus what it needs to save on close.
pub struct Session {
    pub tracker: Tracker,
    host: Option<String>,
    recorder: Option<MemoryTransport>,
    state_dir: PathBuf,
    read_only: bool,
}

/// Which page session a command continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLoad {
    /// Same page session as the previous command.
    Continue,
    /// A full page load: page-scoped session state starts over.
    Fresh,
}

impl Session {
    /// Open the tracker. `host` overrides the host remembered from the
    /// previous command.
    pub fn open(ctx: &Context, host: Option<&str>, load: PageLoad) -> Result<Self> {
        Self::open_with(ctx, host, load, false)
    }

    /// Open the tracker for inspection: nothing it does reaches the state
    /// directory, and [`Session::close`] saves nothing.
    pub fn inspect(ctx: &Context) -> Result<Self> {
        Self::open_with(ctx, None, PageLoad::Continue, true)
    }

    fn open_with(
        ctx: &Context,
        host: Option<&str>,
        load: PageLoad,
        read_only: bool,
    ) -> Result<Self> {
        let config = load_config(&ctx.state_dir)?;
        let saved = SessionFile::load(&ctx.state_dir)?;
        let host = host.map(str::to_string).or(saved.host);
        let state = match load {
            PageLoad::Continue => saved.session,
            PageLoad::Fresh => saved.session.for_new_page(),
        };

        let mut builder = Tracker::builder(config.clone()).session(state);
        if read_only {
            builder = builder
                .cookies(ReadOnly(FileCookieJar::new(&ctx.state_dir)))
                .local_storage(ReadOnly(FileStore::new(&ctx.state_dir)));
        } else {
            builder = builder
                .cookies(FileCookieJar::new(&ctx.state_dir))
                .local_storage(FileStore::new(&ctx.state_dir));
        }
        if let Some(host) = &host {
            builder = builder.host(host.clone());
        }

        let recorder = if read_only {
            builder = builder.transport(NullTransport);
            None
        } else if ctx.dry_run {
            let recorder = MemoryTransport::new();
            builder = builder.transport(recorder.clone());
            Some(recorder)
        } else {
            builder = match config.endpoint.as_deref().filter(|e| !e.trim().is_empty()) {
                Some(endpoint) => builder.transport(HttpTransport::new(endpoint).inline()),
                None => builder.transport(NullTransport),
            };
            None
        };

        let tracker = builder
            .build()
            .with_context(|| format!("Invalid settings in {}", ctx.state_dir.join("config.toml").display()))?;
        Ok(Self {
            tracker,
            host,
            recorder,
            state_dir: ctx.state_dir.clone(),
            read_only,
        })
    }

    /// The page a command without a URL argument acts on: the last tracked
    /// location, else the remembered host's root.
    pub fn current_page(&self) -> Result<PageContext> {
        let url = match (&self.tracker.session().last_tracked_url, &self.host) {
            (Some(url), _) => url.clone(),
            (None, Some(host)) => format!("https://{host}/"),
            (None, None) => DEFAULT_PAGE.to_string(),
        };
        PageContext::parse(&url).with_context(|| format!("Invalid page URL {url}"))
    }

    /// Save the session and return the notifications captured in dry-run
    /// mode. An inspection session saves nothing.
    pub fn close(self) -> Result<Vec<Dispatched>> {
        if self.read_only {
            return Ok(Vec::new());
        }
        let dispatched = self
            .recorder
            .map(|recorder| recorder.take().iter().map(Dispatched::from).collect())
            .unwrap_or_default();
        let file = SessionFile {
            host: self.host,
            session: self.tracker.shutdown(),
        };
        file.save(&self.state_dir)?;
        Ok(dispatched)
    }
}

/// Storage wrapper that reads through and drops every write.
struct ReadOnly<T>(T);

impl<T: CookieJar> CookieJar for ReadOnly<T> {
    fn get(&self, name: &str) -> Result<Option<String>, StorageError> {
        self.0.get(name)
    }

    fn set(&mut self, name: &str, _: &str, _: &CookieOptions) -> Result<(), StorageError> {
        tracing::debug!(cookie = name, "read-only session; cookie write skipped");
        Ok(())
    }

    fn remove(&mut self, name: &str, _: Option<&str>) -> Result<(), StorageError> {
        tracing::debug!(cookie = name, "read-only session; cookie removal skipped");
        Ok(())
    }
}

impl<T: KeyValueStore> KeyValueStore for ReadOnly<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.0.get(key)
    }

    fn set(&mut self, key: &str, _: &str) -> Result<(), StorageError> {
        tracing::debug!(key, "read-only session; write skipped");
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        tracing::debug!(key, "read-only session; removal skipped");
        Ok(())
    }
}

/// Parse a page argument with its optional referrer and title.
pub fn parse_page(url: &str, referrer: Option<&str>, title: Option<&str>) -> Result<PageContext> {
    let mut page = PageContext::parse(url).with_context(|| format!("Invalid page URL {url}"))?;
    if let Some(referrer) = referrer {
        page = page.with_referrer(referrer);
    }
    if let Some(title) = title {
        page = page.with_title(title);
    }
    Ok(page)
}
