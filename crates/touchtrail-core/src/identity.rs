//! Visitor identity: one opaque token per browser, kept in a long-lived cookie.

use std::cell::RefCell;
use std::rc::Rc;

use uuid::Uuid;

use crate::error::TrackerError;
use crate::storage::{CookieOptions, Storage};

/// Longest token accepted from an external source.
pub const MAX_TOKEN_LEN: usize = 128;

/// An identity system outside the tracker (for example a first-party auth
/// cookie shared with other apps on the same site).
pub trait IdentitySource {
    /// Visitor token the external system currently holds.
    fn visitor_token(&self) -> Option<String>;

    /// Hand the tracker's token to the external system.
    fn publish_visitor_token(&mut self, token: &str);

    /// Account id of the signed-in user, when the external system knows one.
    fn account_id(&self) -> Option<String>;
}

/// In-memory [`IdentitySource`]; clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryIdentitySource {
    inner: Rc<RefCell<MemoryIdentityState>>,
}

#[derive(Debug, Default)]
struct MemoryIdentityState {
    visitor_token: Option<String>,
    account_id: Option<String>,
}

impl MemoryIdentitySource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_visitor_token(&self, token: Option<&str>) {
        self.inner.borrow_mut().visitor_token = token.map(str::to_string);
    }

    pub fn set_account_id(&self, account_id: Option<&str>) {
        self.inner.borrow_mut().account_id = account_id.map(str::to_string);
    }
}

impl IdentitySource for MemoryIdentitySource {
    fn visitor_token(&self) -> Option<String> {
        self.inner.borrow().visitor_token.clone()
    }

    fn publish_visitor_token(&mut self, token: &str) {
        self.inner.borrow_mut().visitor_token = Some(token.to_string());
    }

    fn account_id(&self) -> Option<String> {
        self.inner.borrow().account_id.clone()
    }
}

/// Check a token supplied from outside the tracker.
///
/// # Errors
///
/// Returns [`TrackerError::InvalidIdentity`] for empty or over-long tokens,
/// or tokens containing characters outside `[A-Za-z0-9._-]`.
pub fn validate_token(token: &str) -> Result<(), TrackerError> {
    let valid = !token.is_empty()
        && token.len() <= MAX_TOKEN_LEN
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(TrackerError::InvalidIdentity {
            token: token.to_string(),
        })
    }
}

/// Mint a fresh 128-bit random token in UUID v4 form.
#[must_use]
pub fn mint_token() -> String {
    Uuid::new_v4().to_string()
}

/// Owns the visitor token and its cookie.
#[derive(Debug, Clone)]
pub struct IdentityProvider {
    cookie_name: String,
    expire_days: u32,
    domain: String,
    current: Option<String>,
}

impl IdentityProvider {
    #[must_use]
    pub fn new(cookie_name: impl Into<String>, expire_days: u32, domain: impl Into<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            expire_days,
            domain: domain.into(),
            current: None,
        }
    }

    /// The in-memory token, if one has been loaded or minted.
    #[must_use]
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Return the persisted token, minting and persisting one on first use.
    ///
    /// A malformed cookie value is replaced rather than served.
    pub fn get_or_create(&mut self, storage: &mut Storage, now_ms: i64) -> String {
        if let Some(token) = &self.current {
            return token.clone();
        }

        if let Some(stored) = storage.cookie(&self.cookie_name) {
            if validate_token(&stored).is_ok() {
                self.current = Some(stored.clone());
                return stored;
            }
            tracing::warn!(cookie = %self.cookie_name, "discarding malformed visitor token");
        }

        let token = mint_token();
        tracing::debug!(token = %token, "minted visitor identity");
        self.persist(storage, &token, now_ms);
        self.current = Some(token.clone());
        token
    }

    /// Replace the visitor token.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::InvalidIdentity`] without touching state when
    /// the token fails [`validate_token`].
    pub fn set_identity(
        &mut self,
        storage: &mut Storage,
        token: &str,
        now_ms: i64,
    ) -> Result<(), TrackerError> {
        if let Err(err) = validate_token(token) {
            tracing::warn!(code = %err.code(), "rejected visitor identity: {err}");
            return Err(err);
        }
        self.persist(storage, token, now_ms);
        self.current = Some(token.to_string());
        Ok(())
    }

    /// Reconcile with an external identity system.
    ///
    /// A different token held externally is adopted; when the external side
    /// holds none, the local token is published to it. An invalid external
    /// token is ignored and the local one kept.
    pub fn sync_identity(
        &mut self,
        storage: &mut Storage,
        source: &mut dyn IdentitySource,
        now_ms: i64,
    ) -> String {
        let local = self.get_or_create(storage, now_ms);
        match source.visitor_token() {
            Some(external) if external != local => {
                if self.set_identity(storage, &external, now_ms).is_ok() {
                    tracing::info!(token = %external, "adopted external visitor identity");
                    return external;
                }
                local
            }
            Some(_) => local,
            None => {
                source.publish_visitor_token(&local);
                local
            }
        }
    }

    fn persist(&self, storage: &mut Storage, token: &str, now_ms: i64) {
        let options = CookieOptions::for_days(now_ms, self.expire_days, Some(self.domain.clone()));
        storage.set_cookie(&self.cookie_name, token, &options);
    }
}
