//! Backend notifications.
//!
//! Every notification is fire-and-forget: the [`Dispatcher`] builds an owned
//! payload from the event as it is at call time and hands it to a
//! [`Transport`], which must not block the caller. Failures are reported
//! through `tracing` and never touch local state; nothing is queued or
//! retried.

use std::cell::RefCell;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use serde::Serialize;

use crate::error::ErrorCode;
use crate::event::{EventKind, TouchpointEvent};

/// What a create/update notification does to the backend record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
}

impl Action {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
        }
    }
}

/// Body of a create/update notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventPayload {
    pub uuid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deriv_user_id: Option<String>,
    pub event_type: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_medium: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_campaign: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_term: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_ad_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_ad_group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_campaign_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gclid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fbclid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mkclid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub landing_page_url: Option<String>,
    pub is_logged_in: bool,
}

impl From<&TouchpointEvent> for EventPayload {
    fn from(event: &TouchpointEvent) -> Self {
        let a = &event.attribution;
        Self {
            uuid: event.uuid.clone(),
            deriv_user_id: event.account_id.clone(),
            event_type: event.kind,
            utm_source: a.utm_source.clone(),
            utm_medium: a.utm_medium.clone(),
            utm_campaign: a.utm_campaign.clone(),
            utm_term: a.utm_term.clone(),
            utm_ad_id: a.utm_ad_id.clone(),
            utm_ad_group_id: a.utm_ad_group_id.clone(),
            utm_campaign_id: a.utm_campaign_id.clone(),
            gclid: a.gclid.clone(),
            fbclid: a.fbclid.clone(),
            mkclid: a.mkclid.clone(),
            referrer_url: a.referrer.clone(),
            landing_page_url: a.landing_page.clone(),
            is_logged_in: event.logged_in,
        }
    }
}

/// Body of an identify notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentifyPayload {
    pub uuid: String,
    pub is_logged_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deriv_user_id: Option<String>,
}

/// A notification ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Event {
        action: Action,
        payload: EventPayload,
    },
    Identify(IdentifyPayload),
}

impl Outbound {
    /// Path segment appended to the endpoint.
    #[must_use]
    pub const fn route(&self) -> &'static str {
        match self {
            Self::Event { action, .. } => action.as_str(),
            Self::Identify(_) => "identify",
        }
    }

    /// JSON body.
    #[must_use]
    pub fn body(&self) -> serde_json::Value {
        let encoded = match self {
            Self::Event { payload, .. } => serde_json::to_value(payload),
            Self::Identify(payload) => serde_json::to_value(payload),
        };
        encoded.unwrap_or_else(|err| {
            tracing::warn!(code = %ErrorCode::InternalUnexpected, "failed to encode payload: {err}");
            serde_json::Value::Null
        })
    }
}

/// Delivery mechanism for notifications. Implementations must return
/// without waiting for the delivery to settle.
pub trait Transport {
    fn deliver(&self, message: Outbound);
}

/// Drops every notification. Used when no endpoint is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn deliver(&self, message: Outbound) {
        tracing::debug!(route = message.route(), "no endpoint configured; dropping notification");
    }
}

/// Records notifications in memory; clones share the record.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    sent: Rc<RefCell<Vec<Outbound>>>,
}

impl MemoryTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything delivered so far, oldest first.
    #[must_use]
    pub fn sent(&self) -> Vec<Outbound> {
        self.sent.borrow().clone()
    }

    /// Drain the record.
    pub fn take(&self) -> Vec<Outbound> {
        std::mem::take(&mut *self.sent.borrow_mut())
    }
}

impl Transport for MemoryTransport {
    fn deliver(&self, message: Outbound) {
        self.sent.borrow_mut().push(message);
    }
}

/// POSTs JSON to `{endpoint}/{route}`.
///
/// Delivery runs on a detached thread by default. A short-lived host (one
/// process per page load) can switch to inline delivery so the request is
/// not cut off when the process exits; failures are still only logged.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    endpoint: String,
    agent: ureq::Agent,
    inline: bool,
}

impl HttpTransport {
    pub const TIMEOUT: Duration = Duration::from_secs(10);

    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Self::TIMEOUT)
            .user_agent(concat!("touchtrail/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            agent,
            inline: false,
        }
    }

    /// Deliver on the calling thread instead of a detached one.
    #[must_use]
    pub const fn inline(mut self) -> Self {
        self.inline = true;
        self
    }

    #[must_use]
    pub fn url_for(&self, message: &Outbound) -> String {
        format!("{}/{}", self.endpoint, message.route())
    }
}

fn post(agent: &ureq::Agent, url: &str, body: serde_json::Value) {
    match agent.post(url).send_json(body) {
        Ok(response) => {
            tracing::debug!(%url, status = response.status(), "notification delivered");
        }
        Err(ureq::Error::Status(status, _)) => {
            tracing::warn!(code = %ErrorCode::TransportFailed, %url, status, "backend rejected notification");
        }
        Err(err) => {
            tracing::warn!(code = %ErrorCode::TransportFailed, %url, "notification failed: {err}");
        }
    }
}

impl Transport for HttpTransport {
    fn deliver(&self, message: Outbound) {
        let url = self.url_for(&message);
        let body = message.body();
        if self.inline {
            post(&self.agent, &url, body);
            return;
        }
        let agent = self.agent.clone();
        let spawned = thread::Builder::new()
            .name("touchtrail-dispatch".into())
            .spawn(move || post(&agent, &url, body));
        if let Err(err) = spawned {
            tracing::warn!(code = %ErrorCode::TransportFailed, "could not start dispatch thread: {err}");
        }
    }
}

/// Builds notifications and hands them to the transport.
pub struct Dispatcher {
    transport: Box<dyn Transport>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

impl Dispatcher {
    #[must_use]
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Transport for an optional endpoint: HTTP when set, otherwise null.
    #[must_use]
    pub fn for_endpoint(endpoint: Option<&str>) -> Self {
        match endpoint.filter(|e| !e.trim().is_empty()) {
            Some(endpoint) => Self::new(Box::new(HttpTransport::new(endpoint))),
            None => Self::new(Box::new(NullTransport)),
        }
    }

    /// Ship a create/update notification for `event` as it is now.
    pub fn send(&self, event: &TouchpointEvent, action: Action) {
        tracing::debug!(event_id = %event.event_id, action = action.as_str(), kind = %event.kind, "dispatching");
        self.transport.deliver(Outbound::Event {
            action,
            payload: EventPayload::from(event),
        });
    }

    /// Ship an identify notification.
    pub fn identify(&self, uuid: &str, logged_in: bool, account_id: Option<&str>) {
        self.transport.deliver(Outbound::Identify(IdentifyPayload {
            uuid: uuid.to_string(),
            is_logged_in: logged_in,
            deriv_user_id: account_id.map(str::to_string),
        }));
    }
}
