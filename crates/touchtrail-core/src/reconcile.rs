//! Retroactive login reconciliation.
//!
//! Authentication state often becomes known only after the visit that led
//! to it was recorded. Reconciliation rewrites exactly one stored event (the
//! open event of this session, or the newest event when no open event is
//! tracked) with the login flag and account id now known.

use crate::event::TouchpointEvent;
use crate::storage::Storage;
use crate::store::EventStore;

/// Rewrite the target event's login fields and persist the log.
///
/// Logging out clears the account id. Logging in with `account_id = None`
/// keeps whatever account id the event already carried.
///
/// Returns a copy of the rewritten event, or `None` when no event matched
/// (empty log, or the open event has since been evicted).
pub fn apply_login_state(
    store: &mut EventStore,
    storage: &mut Storage,
    open_event_id: Option<&str>,
    logged_in: bool,
    account_id: Option<&str>,
) -> Option<TouchpointEvent> {
    let Some(target) = store.target_mut(open_event_id) else {
        tracing::debug!(open_event_id, "no touchpoint to reconcile");
        return None;
    };

    target.logged_in = logged_in;
    if !logged_in {
        target.account_id = None;
    } else if let Some(id) = account_id {
        target.account_id = Some(id.to_string());
    }
    let updated = target.clone();

    store.persist(storage);
    tracing::debug!(
        event_id = %updated.event_id,
        logged_in,
        "reconciled login state"
    );
    Some(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribution::AttributionSnapshot;
    use crate::event::EventKind;
    use crate::page::PageContext;
    use crate::storage::MemoryStore;

    fn seeded(n: usize) -> (EventStore, Storage, MemoryStore) {
        let backing = MemoryStore::new();
        let mut storage = Storage::new(None, Some(Box::new(backing.clone())));
        let mut store = EventStore::new("log", 10);
        for i in 0..n {
            let page = PageContext::parse(&format!("https://x.com/{i}")).expect("valid url");
            let mut event = TouchpointEvent::capture(
                EventKind::Pageview,
                &page,
                AttributionSnapshot::default(),
                "visitor",
                false,
                None,
                0,
            );
            event.event_id = format!("evt-{i}");
            store.append(event, &mut storage);
        }
        (store, storage, backing)
    }

    #[test]
    fn open_event_is_the_only_one_rewritten() {
        let (mut store, mut storage, _) = seeded(3);
        let before = store.events().to_vec();

        let updated = apply_login_state(&mut store, &mut storage, Some("evt-1"), true, Some("U1"))
            .expect("target exists");
        assert_eq!(updated.event_id, "evt-1");

        for (old, new) in before.iter().zip(store.events()) {
            if new.event_id == "evt-1" {
                assert!(new.logged_in);
                assert_eq!(new.account_id.as_deref(), Some("U1"));
            } else {
                assert_eq!(old, new);
            }
        }
    }

    #[test]
    fn newest_event_is_the_fallback_target() {
        let (mut store, mut storage, backing) = seeded(3);
        apply_login_state(&mut store, &mut storage, None, true, Some("U1"));

        let reloaded = EventStore::load("log", 10, &Storage::new(None, Some(Box::new(backing))));
        let flags: Vec<bool> = reloaded.events().iter().map(|e| e.logged_in).collect();
        assert_eq!(flags, vec![false, false, true]);
        assert_eq!(reloaded.events()[2].account_id.as_deref(), Some("U1"));
    }

    #[test]
    fn logout_clears_account_id() {
        let (mut store, mut storage, _) = seeded(1);
        apply_login_state(&mut store, &mut storage, None, true, Some("U1"));
        let updated = apply_login_state(&mut store, &mut storage, None, false, Some("U1"))
            .expect("target exists");
        assert!(!updated.logged_in);
        assert_eq!(updated.account_id, None);
    }

    #[test]
    fn login_without_id_keeps_existing_account() {
        let (mut store, mut storage, _) = seeded(1);
        apply_login_state(&mut store, &mut storage, None, true, Some("U1"));
        let updated =
            apply_login_state(&mut store, &mut storage, None, true, None).expect("target exists");
        assert_eq!(updated.account_id.as_deref(), Some("U1"));
    }

    #[test]
    fn evicted_open_event_matches_nothing() {
        let (mut store, mut storage, _) = seeded(2);
        assert!(apply_login_state(&mut store, &mut storage, Some("gone"), true, None).is_none());
        assert!(store.events().iter().all(|e| !e.logged_in));

        let (mut empty, mut storage, _) = seeded(0);
        assert!(apply_login_state(&mut empty, &mut storage, None, true, None).is_none());
    }
}
