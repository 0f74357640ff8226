//! The bounded touchpoint log.
//!
//! # Invariants
//!
//! - Insertion order is visit order.
//! - `len() <= max_events` once any mutation returns; overflow drops the
//!   oldest entries from the front.
//! - Every mutation rewrites the whole log under one storage key.
//! - A capacity failure on write shrinks the log to the newest
//!   [`QUOTA_FALLBACK_EVENTS`] entries and retries once; a second failure is
//!   logged and swallowed, leaving the in-memory log authoritative for the
//!   rest of the session.

use crate::attribution::AttributionSnapshot;
use crate::event::{TouchpointEvent, decode_log, encode_log};
use crate::storage::Storage;

/// Entries kept when storage refuses the full log.
pub const QUOTA_FALLBACK_EVENTS: usize = 10;

/// Outcome of persisting the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Written,
    /// Written after shrinking to [`QUOTA_FALLBACK_EVENTS`] entries.
    WrittenAfterTruncation { dropped: usize },
    /// Storage refused the write; the log lives in memory only.
    Failed,
}

/// Append-only, size-bounded log of touchpoint events.
#[derive(Debug, Clone)]
pub struct EventStore {
    key: String,
    max_events: usize,
    events: Vec<TouchpointEvent>,
}

impl EventStore {
    /// An empty store that will persist under `key`.
    #[must_use]
    pub fn new(key: impl Into<String>, max_events: usize) -> Self {
        Self {
            key: key.into(),
            max_events: max_events.max(1),
            events: Vec::new(),
        }
    }

    /// Reload the log from storage, trimming it to `max_events`.
    pub fn load(key: impl Into<String>, max_events: usize, storage: &Storage) -> Self {
        let mut store = Self::new(key, max_events);
        if let Some(raw) = storage.local(&store.key) {
            store.events = decode_log(&raw);
            store.evict_overflow();
        }
        tracing::debug!(events = store.events.len(), "loaded touchpoint log");
        store
    }

    #[must_use]
    pub fn events(&self) -> &[TouchpointEvent] {
        &self.events
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[must_use]
    pub const fn max_events(&self) -> usize {
        self.max_events
    }

    #[must_use]
    pub fn last(&self) -> Option<&TouchpointEvent> {
        self.events.last()
    }

    #[must_use]
    pub fn get(&self, event_id: &str) -> Option<&TouchpointEvent> {
        self.events.iter().find(|e| e.event_id == event_id)
    }

    /// The event with `event_id`, or the newest event when `event_id` is
    /// `None`.
    pub fn target_mut(&mut self, event_id: Option<&str>) -> Option<&mut TouchpointEvent> {
        match event_id {
            Some(id) => self.events.iter_mut().find(|e| e.event_id == id),
            None => self.events.last_mut(),
        }
    }

    /// `true` when `candidate` is materially identical to the attribution of
    /// the newest stored event.
    #[must_use]
    pub fn duplicates_last(&self, candidate: &AttributionSnapshot) -> bool {
        self.events
            .last()
            .is_some_and(|last| last.attribution.same_attribution(candidate))
    }

    /// Append `event`, evict overflow, and persist.
    ///
    /// Returns how many old entries were evicted to respect `max_events`.
    pub fn append(&mut self, event: TouchpointEvent, storage: &mut Storage) -> usize {
        self.events.push(event);
        let evicted = self.evict_overflow();
        if evicted > 0 {
            tracing::debug!(evicted, max = self.max_events, "evicted oldest touchpoints");
        }
        self.persist(storage);
        evicted
    }

    /// Drop every event, in memory and in storage.
    pub fn clear(&mut self, storage: &mut Storage) {
        self.events.clear();
        storage.remove_local(&self.key);
    }

    /// Write the whole log, shrinking it once under quota pressure.
    pub fn persist(&mut self, storage: &mut Storage) -> PersistOutcome {
        let err = match self.write(storage) {
            Ok(()) => return PersistOutcome::Written,
            Err(err) => err,
        };

        if !err.is_quota() || self.events.len() <= QUOTA_FALLBACK_EVENTS {
            tracing::warn!(code = %err.code(), events = self.events.len(), "failed to persist touchpoint log: {err}");
            return PersistOutcome::Failed;
        }

        let dropped = self.events.len() - QUOTA_FALLBACK_EVENTS;
        tracing::warn!(
            dropped,
            kept = QUOTA_FALLBACK_EVENTS,
            "storage quota exceeded; truncating touchpoint log"
        );
        self.events.drain(..dropped);

        match self.write(storage) {
            Ok(()) => PersistOutcome::WrittenAfterTruncation { dropped },
            Err(err) => {
                tracing::warn!(code = %err.code(), "touchpoint log still does not fit; keeping it in memory only: {err}");
                PersistOutcome::Failed
            }
        }
    }

    fn write(&self, storage: &mut Storage) -> Result<(), crate::storage::StorageError> {
        let json = encode_log(&self.events).map_err(crate::storage::StorageError::from)?;
        storage.set_local(&self.key, &json)
    }

    fn evict_overflow(&mut self) -> usize {
        let overflow = self.events.len().saturating_sub(self.max_events);
        if overflow > 0 {
            self.events.drain(..overflow);
        }
        overflow
    }
}
