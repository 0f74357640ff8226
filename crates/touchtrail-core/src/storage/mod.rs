//! Persistence media the tracker writes through.
//!
//! Two media exist, mirroring what a browser offers a page script:
//!
//! - a [`CookieJar`] holding the visitor identity and attribution snapshot,
//!   scoped to a domain and carrying an expiry, and
//! - a [`KeyValueStore`] holding the serialized event log under one key,
//!   subject to a capacity quota.
//!
//! Either medium may be missing (for example when the tracker runs outside a
//! browser). [`Storage`] bundles the two and turns every operation against a
//! missing medium into a no-op, so the components above never branch on
//! availability themselves.

pub mod file;
pub mod memory;

pub use file::{FileCookieJar, FileStore};
pub use memory::{MemoryCookieJar, MemoryStore};

use std::io;

use crate::error::ErrorCode;

/// Errors raised by a storage medium.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The write would exceed the medium's capacity.
    #[error("{}: storing {needed} bytes under {key:?} exceeds the {limit}-byte quota", ErrorCode::StorageQuotaExceeded)]
    QuotaExceeded {
        key: String,
        needed: usize,
        limit: usize,
    },

    /// Underlying I/O failure.
    #[error("{}: storage I/O error: {0}", ErrorCode::StorageWriteFailed)]
    Io(#[from] io::Error),

    /// The medium's own bookkeeping file could not be decoded.
    #[error("{}: corrupt storage file: {0}", ErrorCode::MalformedState)]
    Corrupt(#[from] serde_json::Error),
}

impl StorageError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::QuotaExceeded { .. } => ErrorCode::StorageQuotaExceeded,
            Self::Io(_) => ErrorCode::StorageWriteFailed,
            Self::Corrupt(_) => ErrorCode::MalformedState,
        }
    }

    /// Returns `true` for capacity failures, which callers may recover from
    /// by writing less.
    #[must_use]
    pub const fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}

/// Attributes applied when writing a cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    /// Absolute expiry in epoch milliseconds.
    pub expires_at_ms: i64,
    /// Domain scope. `None` means host-only.
    pub domain: Option<String>,
    pub path: String,
}

impl CookieOptions {
    /// Options for a cookie living `days` days from `now_ms`.
    #[must_use]
    pub fn for_days(now_ms: i64, days: u32, domain: Option<String>) -> Self {
        Self {
            expires_at_ms: now_ms.saturating_add(i64::from(days) * 86_400_000),
            domain,
            path: "/".to_string(),
        }
    }
}

/// Cookie read/write primitives.
pub trait CookieJar {
    /// Current value of a live (unexpired) cookie.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the jar cannot be read.
    fn get(&self, name: &str) -> Result<Option<String>, StorageError>;

    /// # Errors
    ///
    /// Returns [`StorageError`] if the cookie cannot be written.
    fn set(&mut self, name: &str, value: &str, options: &CookieOptions)
    -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns [`StorageError`] if the jar cannot be rewritten.
    fn remove(&mut self, name: &str, domain: Option<&str>) -> Result<(), StorageError>;
}

/// String key/value storage with a capacity limit.
pub trait KeyValueStore {
    /// # Errors
    ///
    /// Returns [`StorageError`] if the store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// # Errors
    ///
    /// Returns [`StorageError::QuotaExceeded`] when the value does not fit,
    /// or another [`StorageError`] on write failure.
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns [`StorageError`] if the key cannot be removed.
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

/// The media available to a tracker, either of which may be absent.
#[derive(Default)]
pub struct Storage {
    cookies: Option<Box<dyn CookieJar>>,
    local: Option<Box<dyn KeyValueStore>>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("cookies", &self.cookies.is_some())
            .field("local", &self.local.is_some())
            .finish()
    }
}

impl Storage {
    #[must_use]
    pub fn new(cookies: Option<Box<dyn CookieJar>>, local: Option<Box<dyn KeyValueStore>>) -> Self {
        Self { cookies, local }
    }

    /// No persistence medium at all; every write is dropped.
    #[must_use]
    pub fn unavailable() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn has_cookies(&self) -> bool {
        self.cookies.is_some()
    }

    #[must_use]
    pub const fn has_local(&self) -> bool {
        self.local.is_some()
    }

    /// Read a cookie. Read failures are logged and reported as absent.
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<String> {
        let jar = self.cookies.as_ref()?;
        match jar.get(name) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(cookie = name, code = %err.code(), "cookie read failed: {err}");
                None
            }
        }
    }

    /// Write a cookie. Failures are logged and otherwise ignored.
    pub fn set_cookie(&mut self, name: &str, value: &str, options: &CookieOptions) {
        let Some(jar) = self.cookies.as_mut() else {
            return;
        };
        if let Err(err) = jar.set(name, value, options) {
            tracing::warn!(cookie = name, code = %err.code(), "cookie write failed: {err}");
        }
    }

    pub fn remove_cookie(&mut self, name: &str, domain: Option<&str>) {
        let Some(jar) = self.cookies.as_mut() else {
            return;
        };
        if let Err(err) = jar.remove(name, domain) {
            tracing::warn!(cookie = name, code = %err.code(), "cookie removal failed: {err}");
        }
    }

    /// Read a local-storage entry. Read failures are logged and reported as
    /// absent.
    #[must_use]
    pub fn local(&self, key: &str) -> Option<String> {
        let store = self.local.as_ref()?;
        match store.get(key) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(key, code = %err.code(), "local storage read failed: {err}");
                None
            }
        }
    }

    /// Write a local-storage entry. Succeeds trivially when no store exists.
    ///
    /// # Errors
    ///
    /// Propagates the store's [`StorageError`] so callers can react to quota
    /// pressure.
    pub fn set_local(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        match self.local.as_mut() {
            Some(store) => store.set(key, value),
            None => Ok(()),
        }
    }

    pub fn remove_local(&mut self, key: &str) {
        let Some(store) = self.local.as_mut() else {
            return;
        };
        if let Err(err) = store.remove(key) {
            tracing::warn!(key, code = %err.code(), "local storage removal failed: {err}");
        }
    }
}
