//! File-backed storage media for running a tracker from a shell.
//!
//! # Directory Layout
//!
//! ```text
//! .touchtrail/
//!   config.toml           # optional tracker configuration
//!   cookies.json          # cookie jar: name -> { value, expires_at_ms, domain }
//!   local/
//!     touchtrail_events   # one file per key/value entry
//!   lock                  # advisory lock held during writes
//! ```
//!
//! Writes go to a sibling temp file which is then renamed over the target,
//! under an exclusive advisory lock, so a concurrent reader sees either the
//! old or the new contents.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use super::{CookieJar, CookieOptions, KeyValueStore, StorageError};
use crate::clock::{Clock, SystemClock};
use crate::error::ErrorCode;

/// Exclusive advisory lock on `<dir>/lock`, released on drop.
struct DirLock {
    file: File,
}

impl DirLock {
    fn acquire(dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(dir.join("lock"))?;
        file.lock_exclusive()?;
        Ok(Self { file })
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}

fn read_optional(path: &Path) -> io::Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

/// Map a storage key onto a safe file name.
fn key_filename(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Key/value store writing one file per key under `<dir>/local/`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    quota_bytes: Option<usize>,
}

impl FileStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            quota_bytes: None,
        }
    }

    /// Limit the size of any single stored value.
    #[must_use]
    pub const fn with_quota(mut self, quota_bytes: usize) -> Self {
        self.quota_bytes = Some(quota_bytes);
        self
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join("local").join(key_filename(key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(read_optional(&self.entry_path(key))?)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        if let Some(limit) = self.quota_bytes {
            let needed = key.len() + value.len();
            if needed > limit {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    limit,
                });
            }
        }
        let _lock = DirLock::acquire(&self.dir)?;
        fs::create_dir_all(self.dir.join("local"))?;
        write_atomic(&self.entry_path(key), value)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        let _lock = DirLock::acquire(&self.dir)?;
        match fs::remove_file(self.entry_path(key)) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileCookie {
    value: String,
    expires_at_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    domain: Option<String>,
}

/// Cookie jar persisted as a single JSON document at `<dir>/cookies.json`.
pub struct FileCookieJar {
    dir: PathBuf,
    clock: Box<dyn Clock>,
}

impl std::fmt::Debug for FileCookieJar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCookieJar")
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

impl FileCookieJar {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_clock(dir, SystemClock)
    }

    #[must_use]
    pub fn with_clock(dir: impl Into<PathBuf>, clock: impl Clock + 'static) -> Self {
        Self {
            dir: dir.into(),
            clock: Box::new(clock),
        }
    }

    fn path(&self) -> PathBuf {
        self.dir.join("cookies.json")
    }

    fn load(&self) -> Result<BTreeMap<String, FileCookie>, StorageError> {
        match read_optional(&self.path())? {
            Some(contents) if !contents.trim().is_empty() => Ok(serde_json::from_str(&contents)?),
            _ => Ok(BTreeMap::new()),
        }
    }

    fn rewrite(
        &self,
        mutate: impl FnOnce(&mut BTreeMap<String, FileCookie>),
    ) -> Result<(), StorageError> {
        let _lock = DirLock::acquire(&self.dir)?;
        let mut cookies = match self.load() {
            Ok(cookies) => cookies,
            Err(StorageError::Corrupt(err)) => {
                tracing::warn!(
                    code = %ErrorCode::MalformedState,
                    path = %self.path().display(),
                    "replacing malformed cookie file: {err}"
                );
                BTreeMap::new()
            }
            Err(err) => return Err(err),
        };
        let now = self.clock.now_ms();
        cookies.retain(|_, cookie| cookie.expires_at_ms > now);
        mutate(&mut cookies);
        let json = serde_json::to_string_pretty(&cookies)?;
        write_atomic(&self.path(), &json)?;
        Ok(())
    }
}

impl CookieJar for FileCookieJar {
    fn get(&self, name: &str) -> Result<Option<String>, StorageError> {
        let now = self.clock.now_ms();
        Ok(self
            .load()?
            .remove(name)
            .filter(|cookie| cookie.expires_at_ms > now)
            .map(|cookie| cookie.value))
    }

    fn set(
        &mut self,
        name: &str,
        value: &str,
        options: &CookieOptions,
    ) -> Result<(), StorageError> {
        let cookie = FileCookie {
            value: value.to_string(),
            expires_at_ms: options.expires_at_ms,
            domain: options.domain.clone(),
        };
        self.rewrite(|cookies| {
            cookies.insert(name.to_string(), cookie);
        })
    }

    fn remove(&mut self, name: &str, _domain: Option<&str>) -> Result<(), StorageError> {
        self.rewrite(|cookies| {
            cookies.remove(name);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::dispatch::NullTransport;
    use crate::{Tracker, TrackerConfig};

    #[test]
    fn file_store_round_trips_and_removes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = FileStore::new(dir.path());
        assert_eq!(store.get("touchtrail_events").expect("get"), None);

        store.set("touchtrail_events", "[1,2]").expect("set");
        assert_eq!(
            store.get("touchtrail_events").expect("get").as_deref(),
            Some("[1,2]")
        );
        assert!(dir.path().join("local/touchtrail_events").exists());

        store.remove("touchtrail_events").expect("remove");
        store.remove("touchtrail_events").expect("second remove is a no-op");
        assert_eq!(store.get("touchtrail_events").expect("get"), None);
    }

    #[test]
    fn file_store_enforces_quota() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = FileStore::new(dir.path()).with_quota(8);
        let err = store.set("key", "too long").expect_err("over quota");
        assert!(err.is_quota());
    }

    #[test]
    fn unsafe_key_characters_are_replaced() {
        assert_eq!(key_filename("../etc/passwd"), ".._etc_passwd");
        assert_eq!(key_filename("a b"), "a_b");
    }

    #[test]
    fn cookie_jar_persists_across_instances_and_expires() {
        let dir = tempfile::tempdir().expect("tempdir");
        let clock = ManualClock::new(1_000);
        let mut jar = FileCookieJar::with_clock(dir.path(), clock.clone());
        jar.set(
            "touchtrail_uuid",
            "abc",
            &CookieOptions::for_days(1_000, 1, Some(".x.com".into())),
        )
        .expect("set");

        let reopened = FileCookieJar::with_clock(dir.path(), clock.clone());
        assert_eq!(
            reopened.get("touchtrail_uuid").expect("get").as_deref(),
            Some("abc")
        );

        clock.advance_minutes(24 * 60);
        assert_eq!(reopened.get("touchtrail_uuid").expect("get"), None);
    }

    #[test]
    fn corrupt_cookie_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("cookies.json"), "{not json").expect("write");
        let jar = FileCookieJar::new(dir.path());
        let err = jar.get("anything").expect_err("corrupt jar");
        assert!(matches!(err, StorageError::Corrupt(_)));
    }

    #[test]
    fn corrupt_cookie_file_is_replaced_on_write() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("cookies.json"), "{oops").expect("write");

        let open = || {
            Tracker::builder(TrackerConfig::default())
                .host("x.com")
                .cookies(FileCookieJar::new(dir.path()))
                .local_storage(FileStore::new(dir.path()))
                .transport(NullTransport)
                .build()
                .expect("valid config")
        };
        let first = open().visitor_id();
        let second = open().visitor_id();
        assert_eq!(first, second);

        let jar = FileCookieJar::new(dir.path());
        assert_eq!(
            jar.get("touchtrail_uuid").expect("jar readable again").as_deref(),
            Some(first.as_str())
        );
    }
}
