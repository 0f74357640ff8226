//! The tracker context: owns every component plus the session state.
//!
//! A [`Tracker`] is built once per page session with [`TrackerBuilder`] and
//! driven by the host integration layer:
//!
//! ```text
//! on_navigation / record_visit  ->  resolve attribution -> dedup -> append -> create
//! record_signup / record_login  ->  append (never deduplicated) -> create + identify
//! apply_login_state             ->  rewrite open event -> update
//! ```
//!
//! Every public operation completes its storage mutation before the
//! notification is handed to the transport. Only caller-supplied arguments
//! can make an operation fail; everything else is logged and absorbed.

use serde::{Deserialize, Serialize};

use crate::attribution::{AttributionResolver, AttributionSnapshot, ClickIdContributor};
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, TrackerConfig};
use crate::dispatch::{Action, Dispatcher, Transport};
use crate::domain::cookie_domain;
use crate::error::TrackerError;
use crate::event::{EventKind, TouchpointEvent};
use crate::identity::{IdentityProvider, IdentitySource};
use crate::navigation::NavigationSignal;
use crate::page::PageContext;
use crate::reconcile;
use crate::storage::{CookieJar, KeyValueStore, Storage};
use crate::store::EventStore;

/// In-memory state of one page session.
///
/// Serializable so a host that outlives a single process (the `tt` CLI)
/// can carry it between invocations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    pub logged_in: bool,
    pub account_id: Option<String>,
    /// Event most recently recorded by this session.
    pub open_event_id: Option<String>,
    pub last_tracked_url: Option<String>,
    /// Set by signup; suppresses every later pageview.
    pub signup_completed: bool,
    /// Attribution resolved for the latest visit.
    pub attribution: Option<AttributionSnapshot>,
}

impl SessionState {
    /// State surviving a full page load: authentication and the signup flag
    /// carry over, page-scoped tracking does not.
    #[must_use]
    pub fn for_new_page(self) -> Self {
        Self {
            open_event_id: None,
            last_tracked_url: None,
            attribution: None,
            ..self
        }
    }
}

/// What [`Tracker::record_visit`] did with a visit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisitOutcome {
    /// Appended and dispatched.
    Recorded { event_id: String, evicted: usize },
    /// Same location as the previous tracked visit.
    SuppressedSameUrl,
    /// Attribution identical to the newest stored event.
    SuppressedDuplicate,
    /// A signup already ended anonymous tracking for this session.
    SuppressedAfterSignup,
    /// The navigation signal is not tracked under the current config.
    Ignored,
}

impl VisitOutcome {
    #[must_use]
    pub const fn is_recorded(&self) -> bool {
        matches!(self, Self::Recorded { .. })
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Recorded { .. } => "recorded",
            Self::SuppressedSameUrl => "suppressed: same url",
            Self::SuppressedDuplicate => "suppressed: duplicate attribution",
            Self::SuppressedAfterSignup => "suppressed: signup completed",
            Self::Ignored => "ignored",
        }
    }
}

/// Assembles a [`Tracker`] from a config and its collaborators.
///
/// Every collaborator is optional: without media the tracker works in
/// memory only, without a transport it picks one from `config.endpoint`.
pub struct TrackerBuilder {
    config: TrackerConfig,
    host: String,
    cookies: Option<Box<dyn CookieJar>>,
    local: Option<Box<dyn KeyValueStore>>,
    transport: Option<Box<dyn Transport>>,
    clock: Box<dyn Clock>,
    identity_source: Option<Box<dyn IdentitySource>>,
    contributors: Vec<Box<dyn ClickIdContributor>>,
    session: SessionState,
}

impl TrackerBuilder {
    #[must_use]
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            host: "localhost".to_string(),
            cookies: None,
            local: None,
            transport: None,
            clock: Box::new(SystemClock),
            identity_source: None,
            contributors: Vec::new(),
            session: SessionState::default(),
        }
    }

    /// Hostname the tracker runs on; drives cookie domain scoping.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    #[must_use]
    pub fn cookies(mut self, jar: impl CookieJar + 'static) -> Self {
        self.cookies = Some(Box::new(jar));
        self
    }

    #[must_use]
    pub fn local_storage(mut self, store: impl KeyValueStore + 'static) -> Self {
        self.local = Some(Box::new(store));
        self
    }

    #[must_use]
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    #[must_use]
    pub fn identity_source(mut self, source: impl IdentitySource + 'static) -> Self {
        self.identity_source = Some(Box::new(source));
        self
    }

    #[must_use]
    pub fn contributor(mut self, contributor: impl ClickIdContributor + 'static) -> Self {
        self.contributors.push(Box::new(contributor));
        self
    }

    /// Resume a session saved by [`Tracker::shutdown`].
    #[must_use]
    pub fn session(mut self, session: SessionState) -> Self {
        self.session = session;
        self
    }

    /// Validate the config, reload persisted state, and establish the
    /// visitor identity.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config fails
    /// [`TrackerConfig::validate`].
    pub fn build(self) -> Result<Tracker, ConfigError> {
        self.config.validate()?;

        let domain = cookie_domain(
            &self.host,
            self.config.cookie_domain.as_deref(),
            &self.config.external_domains,
        );
        let storage = Storage::new(self.cookies, self.local);
        let store = EventStore::load(&self.config.events_key, self.config.max_events, &storage);
        let identity = IdentityProvider::new(
            &self.config.identity_cookie,
            self.config.cookie_expire_days,
            &domain,
        );
        let resolver = AttributionResolver::new(
            &self.config.attribution_cookie,
            self.config.attribution_cookie_days(),
            &domain,
            self.config.attribution_expiry_ms(),
        );
        let dispatcher = match self.transport {
            Some(transport) => Dispatcher::new(transport),
            None => Dispatcher::for_endpoint(self.config.endpoint.as_deref()),
        };

        let mut tracker = Tracker {
            config: self.config,
            clock: self.clock,
            storage,
            identity,
            resolver,
            store,
            dispatcher,
            identity_source: self.identity_source,
            contributors: self.contributors,
            session: self.session,
        };
        let visitor = tracker.sync_identity();
        tracing::debug!(
            domain = %domain,
            visitor = %visitor,
            events = tracker.store.len(),
            "tracker initialized"
        );
        Ok(tracker)
    }
}

/// Explicit tracker context. See the module docs for the control flow.
pub struct Tracker {
    config: TrackerConfig,
    clock: Box<dyn Clock>,
    storage: Storage,
    identity: IdentityProvider,
    resolver: AttributionResolver,
    store: EventStore,
    dispatcher: Dispatcher,
    identity_source: Option<Box<dyn IdentitySource>>,
    contributors: Vec<Box<dyn ClickIdContributor>>,
    session: SessionState,
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("storage", &self.storage)
            .field("events", &self.store.len())
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl Tracker {
    #[must_use]
    pub fn builder(config: TrackerConfig) -> TrackerBuilder {
        TrackerBuilder::new(config)
    }

    #[must_use]
    pub const fn config(&self) -> &TrackerConfig {
        &self.config
    }

    #[must_use]
    pub const fn session(&self) -> &SessionState {
        &self.session
    }

    /// The stored log, oldest first.
    #[must_use]
    pub fn events(&self) -> &[TouchpointEvent] {
        self.store.events()
    }

    #[must_use]
    pub const fn is_logged_in(&self) -> bool {
        self.session.logged_in
    }

    /// Account id events are attributed to: the external identity source's
    /// when it knows one, else the session's.
    #[must_use]
    pub fn account_id(&self) -> Option<String> {
        self.identity_source
            .as_ref()
            .and_then(|source| source.account_id())
            .or_else(|| self.session.account_id.clone())
    }

    #[must_use]
    pub fn open_event_id(&self) -> Option<&str> {
        self.session.open_event_id.as_deref()
    }

    /// The visitor token, minted on first use.
    pub fn visitor_id(&mut self) -> String {
        let now = self.clock.now_ms();
        self.identity.get_or_create(&mut self.storage, now)
    }

    /// Replace the visitor token with one supplied by the host.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::InvalidIdentity`] and keeps the current token
    /// when `token` is malformed.
    pub fn set_identity(&mut self, token: &str) -> Result<(), TrackerError> {
        let now = self.clock.now_ms();
        self.identity.set_identity(&mut self.storage, token, now)
    }

    /// Reconcile the visitor token with the external identity source, if
    /// one was configured. Returns the token in force afterwards.
    pub fn sync_identity(&mut self) -> String {
        let now = self.clock.now_ms();
        match self.identity_source.as_mut() {
            Some(source) => self
                .identity
                .sync_identity(&mut self.storage, source.as_mut(), now),
            None => self.identity.get_or_create(&mut self.storage, now),
        }
    }

    /// Persisted attribution snapshot, if one is live.
    pub fn attribution(&mut self) -> Option<AttributionSnapshot> {
        let now = self.clock.now_ms();
        self.resolver.load_persisted(&mut self.storage, now)
    }

    /// Forget the persisted attribution snapshot.
    pub fn clear_attribution(&mut self) {
        self.resolver.clear(&mut self.storage);
        self.session.attribution = None;
    }

    /// Drop the whole event log.
    pub fn clear_events(&mut self) {
        self.store.clear(&mut self.storage);
        self.session.open_event_id = None;
        tracing::info!("touchpoint log cleared");
    }

    /// Record a navigation the host reported, if the config tracks it.
    pub fn on_navigation(&mut self, signal: NavigationSignal, page: &PageContext) -> VisitOutcome {
        if !signal.is_tracked(&self.config) {
            tracing::debug!(%signal, url = page.location(), "navigation not tracked");
            return VisitOutcome::Ignored;
        }
        self.record_visit(page)
    }

    /// Record a page visit.
    ///
    /// The same-URL check runs before attribution is resolved, so a repeat
    /// of the previous location never touches the attribution cookie.
    pub fn record_visit(&mut self, page: &PageContext) -> VisitOutcome {
        if self.session.signup_completed {
            tracing::debug!(url = page.location(), "signup completed; visit not tracked");
            return VisitOutcome::SuppressedAfterSignup;
        }

        let location = page.location();
        if self.session.last_tracked_url.as_deref() == Some(location) {
            tracing::debug!(url = location, "same location as previous visit; suppressed");
            return VisitOutcome::SuppressedSameUrl;
        }
        self.session.last_tracked_url = Some(location.to_string());

        let now = self.clock.now_ms();
        let resolution = self
            .resolver
            .resolve(&mut self.storage, page, now, &self.contributors);
        self.session.attribution = Some(resolution.snapshot.clone());

        if self.store.duplicates_last(&resolution.snapshot) {
            tracing::debug!(url = location, "attribution unchanged since last touchpoint; suppressed");
            return VisitOutcome::SuppressedDuplicate;
        }

        let account_id = self.account_id();
        let (event, evicted) =
            self.append(EventKind::Pageview, page, resolution.snapshot, account_id, now);
        self.dispatcher.send(&event, Action::Create);
        VisitOutcome::Recorded {
            event_id: event.event_id,
            evicted,
        }
    }

    /// Record an account creation.
    ///
    /// Always appended, never deduplicated. Marks the session logged in and
    /// stops pageview tracking for the rest of the session.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::InvalidAccountId`] before any mutation when
    /// `account_id` is blank.
    pub fn record_signup(
        &mut self,
        page: &PageContext,
        account_id: &str,
    ) -> Result<TouchpointEvent, TrackerError> {
        let event = self.record_authentication(EventKind::Signup, page, account_id)?;
        self.session.signup_completed = true;
        if self.config.reset_on_signup {
            self.clear_events();
        }
        Ok(event)
    }

    /// Record a sign-in of an existing account.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::InvalidAccountId`] before any mutation when
    /// `account_id` is blank.
    pub fn record_login(
        &mut self,
        page: &PageContext,
        account_id: &str,
    ) -> Result<TouchpointEvent, TrackerError> {
        let event = self.record_authentication(EventKind::Login, page, account_id)?;
        if self.config.reset_on_login {
            self.clear_events();
        }
        Ok(event)
    }

    /// Authentication state became known after the open event was
    /// recorded: rewrite that event and, if this session recorded it, ship
    /// an update.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::InvalidAccountId`] before any mutation when
    /// `account_id` is present but blank.
    pub fn apply_login_state(
        &mut self,
        logged_in: bool,
        account_id: Option<&str>,
    ) -> Result<Option<TouchpointEvent>, TrackerError> {
        let account_id = account_id.map(checked_account_id).transpose()?;

        self.session.logged_in = logged_in;
        if !logged_in {
            self.session.account_id = None;
        } else if let Some(id) = account_id {
            self.session.account_id = Some(id.to_string());
        }

        let effective = if logged_in { self.account_id() } else { None };
        let updated = reconcile::apply_login_state(
            &mut self.store,
            &mut self.storage,
            self.session.open_event_id.as_deref(),
            logged_in,
            effective.as_deref(),
        );

        if let Some(event) = &updated {
            if self.session.open_event_id.is_some() {
                self.dispatcher.send(event, Action::Update);
            }
        }
        Ok(updated)
    }

    /// End the session, handing back its state for a host that wants to
    /// resume it later.
    #[must_use]
    pub fn shutdown(self) -> SessionState {
        tracing::debug!(events = self.store.len(), "tracker shut down");
        self.session
    }

    fn record_authentication(
        &mut self,
        kind: EventKind,
        page: &PageContext,
        account_id: &str,
    ) -> Result<TouchpointEvent, TrackerError> {
        let account_id = checked_account_id(account_id)?;
        let now = self.clock.now_ms();

        let attribution = match self.session.attribution.clone() {
            Some(snapshot) => snapshot,
            None => {
                let resolved = self
                    .resolver
                    .resolve(&mut self.storage, page, now, &self.contributors)
                    .snapshot;
                self.session.attribution = Some(resolved.clone());
                resolved
            }
        };

        self.session.logged_in = true;
        self.session.account_id = Some(account_id.to_string());

        let (event, _) = self.append(kind, page, attribution, Some(account_id.to_string()), now);
        self.dispatcher.send(&event, Action::Create);
        self.dispatcher
            .identify(&event.uuid, true, event.account_id.as_deref());
        Ok(event)
    }

    fn append(
        &mut self,
        kind: EventKind,
        page: &PageContext,
        attribution: AttributionSnapshot,
        account_id: Option<String>,
        now_ms: i64,
    ) -> (TouchpointEvent, usize) {
        let visitor = self.identity.get_or_create(&mut self.storage, now_ms);
        let event = TouchpointEvent::capture(
            kind,
            page,
            attribution,
            visitor,
            self.session.logged_in,
            account_id,
            now_ms,
        );
        let evicted = self.store.append(event.clone(), &mut self.storage);
        self.session.open_event_id = Some(event.event_id.clone());
        tracing::info!(
            event_id = %event.event_id,
            kind = %event.kind,
            url = %event.url,
            events = self.store.len(),
            "touchpoint recorded"
        );
        (event, evicted)
    }
}

fn checked_account_id(account_id: &str) -> Result<&str, TrackerError> {
    let trimmed = account_id.trim();
    if trimmed.is_empty() {
        return Err(TrackerError::InvalidAccountId);
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::dispatch::{MemoryTransport, Outbound};
    use crate::identity::MemoryIdentitySource;
    use crate::storage::{MemoryCookieJar, MemoryStore};

    const NOW: i64 = 1_700_000_000_000;

    struct Harness {
        tracker: Tracker,
        transport: MemoryTransport,
        clock: ManualClock,
    }

    fn harness(config: TrackerConfig) -> Harness {
        let clock = ManualClock::new(NOW);
        let transport = MemoryTransport::new();
        let tracker = Tracker::builder(config)
            .host("www.x.com")
            .cookies(MemoryCookieJar::with_clock(clock.clone()))
            .local_storage(MemoryStore::new())
            .transport(transport.clone())
            .clock(clock.clone())
            .build()
            .expect("valid config");
        Harness {
            tracker,
            transport,
            clock,
        }
    }

    fn page(url: &str) -> PageContext {
        PageContext::parse(url).expect("valid url")
    }

    #[test]
    fn build_rejects_invalid_config() {
        let config = TrackerConfig {
            max_events: 0,
            ..TrackerConfig::default()
        };
        let err = Tracker::builder(config).build().expect_err("invalid");
        assert_eq!(err.field, "max_events");
    }

    #[test]
    fn build_without_media_still_tracks_in_memory() {
        let transport = MemoryTransport::new();
        let mut tracker = Tracker::builder(TrackerConfig::default())
            .transport(transport.clone())
            .build()
            .expect("valid config");
        let outcome = tracker.record_visit(&page("https://x.com/?utm_source=google"));
        assert!(outcome.is_recorded());
        assert_eq!(tracker.events().len(), 1);
        assert_eq!(transport.sent().len(), 1);
    }

    #[test]
    fn same_url_is_checked_before_attribution() {
        let mut h = harness(TrackerConfig::default());
        let target = page("https://x.com/?utm_source=google");
        assert!(h.tracker.record_visit(&target).is_recorded());
        h.clock.advance_minutes(1);
        assert_eq!(h.tracker.record_visit(&target), VisitOutcome::SuppressedSameUrl);
        assert_eq!(h.tracker.events().len(), 1);
        assert_eq!(h.transport.sent().len(), 1);
    }

    #[test]
    fn internal_navigation_is_a_duplicate() {
        let mut h = harness(TrackerConfig::default());
        h.tracker
            .record_visit(&page("https://x.com/?utm_source=google").with_referrer("https://google.com/"));
        let outcome = h
            .tracker
            .record_visit(&page("https://x.com/pricing").with_referrer("https://x.com/"));
        assert_eq!(outcome, VisitOutcome::SuppressedDuplicate);
        assert_eq!(
            h.tracker
                .session()
                .attribution
                .as_ref()
                .and_then(|a| a.landing_page.as_deref()),
            Some("https://x.com/pricing")
        );
    }

    #[test]
    fn signup_is_recorded_even_when_attribution_repeats() {
        let mut h = harness(TrackerConfig::default());
        let landing = page("https://x.com/?utm_source=google");
        h.tracker.record_visit(&landing);
        let signup = h
            .tracker
            .record_signup(&page("https://x.com/signup"), "U42")
            .expect("valid account");

        assert_eq!(signup.kind, EventKind::Signup);
        assert!(signup.logged_in);
        assert_eq!(signup.account_id.as_deref(), Some("U42"));
        assert_eq!(signup.attribution.utm_source.as_deref(), Some("google"));
        assert_eq!(h.tracker.events().len(), 2);

        let routes: Vec<&str> = h.transport.sent().iter().map(Outbound::route).collect();
        assert_eq!(routes, vec!["create", "create", "identify"]);

        assert_eq!(
            h.tracker.record_visit(&page("https://x.com/welcome")),
            VisitOutcome::SuppressedAfterSignup
        );
    }

    #[test]
    fn blank_account_id_is_rejected_before_mutation() {
        let mut h = harness(TrackerConfig::default());
        let err = h
            .tracker
            .record_signup(&page("https://x.com/signup"), "  ")
            .expect_err("blank");
        assert_eq!(err, TrackerError::InvalidAccountId);
        assert!(h.tracker.events().is_empty());
        assert!(!h.tracker.is_logged_in());
        assert!(h.transport.sent().is_empty());
        assert!(h.tracker.apply_login_state(true, Some("")).is_err());
    }

    #[test]
    fn reset_on_signup_clears_after_payloads_are_built() {
        let mut h = harness(TrackerConfig {
            reset_on_signup: true,
            ..TrackerConfig::default()
        });
        h.tracker.record_visit(&page("https://x.com/?utm_source=google"));
        h.tracker
            .record_signup(&page("https://x.com/signup"), "U1")
            .expect("valid account");
        assert!(h.tracker.events().is_empty());
        assert_eq!(h.tracker.open_event_id(), None);

        let sent = h.transport.sent();
        let Outbound::Event { payload, .. } = &sent[1] else {
            panic!("expected create for signup");
        };
        assert_eq!(payload.deriv_user_id.as_deref(), Some("U1"));
        assert_eq!(payload.utm_source.as_deref(), Some("google"));
    }

    #[test]
    fn login_appends_login_event_and_honours_reset() {
        let mut h = harness(TrackerConfig {
            reset_on_login: true,
            ..TrackerConfig::default()
        });
        h.tracker.record_visit(&page("https://x.com/?utm_source=google"));
        let login = h
            .tracker
            .record_login(&page("https://x.com/login"), "U7")
            .expect("valid account");
        assert_eq!(login.kind, EventKind::Login);
        assert!(h.tracker.events().is_empty());
        assert!(h.tracker.is_logged_in());
        assert!(
            h.tracker.record_visit(&page("https://x.com/app")).is_recorded(),
            "login does not end pageview tracking"
        );
    }

    #[test]
    fn apply_login_state_updates_open_event_and_dispatches() {
        let mut h = harness(TrackerConfig::default());
        h.tracker.record_visit(&page("https://x.com/?utm_source=google"));
        let open = h.tracker.open_event_id().map(str::to_string);
        h.transport.take();

        let updated = h
            .tracker
            .apply_login_state(true, Some("U9"))
            .expect("valid")
            .expect("open event exists");
        assert_eq!(Some(updated.event_id.clone()), open);
        assert_eq!(updated.account_id.as_deref(), Some("U9"));

        let sent = h.transport.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].route(), "update");
    }

    #[test]
    fn reconciliation_without_open_event_targets_newest_silently() {
        let mut h = harness(TrackerConfig::default());
        h.tracker.record_visit(&page("https://x.com/?utm_source=google"));
        h.tracker.record_visit(&page("https://x.com/?utm_source=bing"));
        let session = h.tracker.session().clone().for_new_page();
        let transport = MemoryTransport::new();

        // A fresh page load sharing the same storage.
        let Harness { tracker, .. } = h;
        let storage_events = tracker.events().to_vec();
        drop(tracker);
        let backing = MemoryStore::new();
        backing.insert_raw(
            "touchtrail_events",
            &crate::event::encode_log(&storage_events).expect("encode"),
        );
        let mut reloaded = Tracker::builder(TrackerConfig::default())
            .local_storage(backing)
            .transport(transport.clone())
            .session(session)
            .build()
            .expect("valid config");

        let updated = reloaded
            .apply_login_state(true, Some("U1"))
            .expect("valid")
            .expect("newest event");
        assert_eq!(updated.event_id, storage_events[1].event_id);
        assert!(!reloaded.events()[0].logged_in);
        assert!(transport.sent().is_empty(), "no open event, no update");
    }

    #[test]
    fn logout_clears_session_account() {
        let mut h = harness(TrackerConfig::default());
        h.tracker.record_visit(&page("https://x.com/?utm_source=google"));
        h.tracker.apply_login_state(true, Some("U1")).expect("valid");
        let updated = h
            .tracker
            .apply_login_state(false, None)
            .expect("valid")
            .expect("open event");
        assert!(!updated.logged_in);
        assert_eq!(updated.account_id, None);
        assert_eq!(h.tracker.account_id(), None);
    }

    #[test]
    fn external_account_id_takes_priority_for_events() {
        let clock = ManualClock::new(NOW);
        let source = MemoryIdentitySource::new();
        source.set_account_id(Some("EXT"));
        let mut tracker = Tracker::builder(TrackerConfig::default())
            .clock(clock)
            .identity_source(source)
            .transport(MemoryTransport::new())
            .build()
            .expect("valid config");
        tracker.record_visit(&page("https://x.com/?utm_source=google"));
        assert_eq!(tracker.events()[0].account_id.as_deref(), Some("EXT"));
    }

    #[test]
    fn identity_source_token_is_adopted_on_build() {
        let source = MemoryIdentitySource::new();
        source.set_visitor_token(Some("external-token"));
        let mut tracker = Tracker::builder(TrackerConfig::default())
            .identity_source(source)
            .transport(MemoryTransport::new())
            .build()
            .expect("valid config");
        assert_eq!(tracker.visitor_id(), "external-token");
    }

    #[test]
    fn navigation_signals_follow_config() {
        let mut h = harness(TrackerConfig::default());
        assert_eq!(
            h.tracker
                .on_navigation(NavigationSignal::HashChange, &page("https://x.com/#top")),
            VisitOutcome::Ignored
        );
        assert!(
            h.tracker
                .on_navigation(NavigationSignal::PushState, &page("https://x.com/?utm_source=a"))
                .is_recorded()
        );
    }

    #[test]
    fn shutdown_returns_session_for_resume() {
        let mut h = harness(TrackerConfig::default());
        h.tracker.record_visit(&page("https://x.com/?utm_source=google"));
        let session = h.tracker.shutdown();
        assert_eq!(
            session.last_tracked_url.as_deref(),
            Some("https://x.com/?utm_source=google")
        );
        let fresh = session.for_new_page();
        assert_eq!(fresh.last_tracked_url, None);
        assert_eq!(fresh.open_event_id, None);
    }
}
