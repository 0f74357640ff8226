//! In-memory storage media.
//!
//! Both types are cheap handles over shared state: cloning one and handing
//! the clone to a tracker lets the caller inspect or corrupt what the
//! tracker persisted, and a fresh tracker built from another clone sees the
//! same data, the way a second page load sees the same browser storage.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use super::{CookieJar, CookieOptions, KeyValueStore, StorageError};
use crate::clock::{Clock, SystemClock};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCookie {
    pub value: String,
    pub options: CookieOptions,
}

/// Cookie jar kept in memory, honouring expiry against its own clock.
#[derive(Clone)]
pub struct MemoryCookieJar {
    cookies: Rc<RefCell<BTreeMap<String, StoredCookie>>>,
    clock: Rc<dyn Clock>,
}

impl Default for MemoryCookieJar {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryCookieJar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCookieJar")
            .field("cookies", &self.cookies.borrow())
            .finish_non_exhaustive()
    }
}

impl MemoryCookieJar {
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    #[must_use]
    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self {
            cookies: Rc::new(RefCell::new(BTreeMap::new())),
            clock: Rc::new(clock),
        }
    }

    /// Full stored record, including options, regardless of expiry.
    #[must_use]
    pub fn raw(&self, name: &str) -> Option<StoredCookie> {
        self.cookies.borrow().get(name).cloned()
    }

    /// Plant a value directly, bypassing the tracker.
    pub fn insert_raw(&self, name: &str, value: &str, options: CookieOptions) {
        self.cookies.borrow_mut().insert(
            name.to_string(),
            StoredCookie {
                value: value.to_string(),
                options,
            },
        );
    }
}

impl CookieJar for MemoryCookieJar {
    fn get(&self, name: &str) -> Result<Option<String>, StorageError> {
        let now = self.clock.now_ms();
        Ok(self
            .cookies
            .borrow()
            .get(name)
            .filter(|cookie| cookie.options.expires_at_ms > now)
            .map(|cookie| cookie.value.clone()))
    }

    fn set(
        &mut self,
        name: &str,
        value: &str,
        options: &CookieOptions,
    ) -> Result<(), StorageError> {
        self.insert_raw(name, value, options.clone());
        Ok(())
    }

    fn remove(&mut self, name: &str, _domain: Option<&str>) -> Result<(), StorageError> {
        self.cookies.borrow_mut().remove(name);
        Ok(())
    }
}

/// Key/value store kept in memory with an optional byte quota.
///
/// The quota counts key and value bytes across all entries, which is how
/// browsers account for local storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Rc<RefCell<BTreeMap<String, String>>>,
    quota_bytes: Rc<RefCell<Option<usize>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_quota(quota_bytes: usize) -> Self {
        let store = Self::default();
        store.set_quota(Some(quota_bytes));
        store
    }

    /// Change the quota on every handle sharing this store.
    pub fn set_quota(&self, quota_bytes: Option<usize>) {
        *self.quota_bytes.borrow_mut() = quota_bytes;
    }

    /// Raw stored value, bypassing the tracker.
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    /// Plant a value directly, ignoring the quota.
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
    }

    fn used_bytes_excluding(&self, key: &str) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.raw(key))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        if let Some(limit) = *self.quota_bytes.borrow() {
            let needed = self.used_bytes_excluding(key) + key.len() + value.len();
            if needed > limit {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    limit,
                });
            }
        }
        self.insert_raw(key, value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}
