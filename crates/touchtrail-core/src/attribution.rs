//! Attribution snapshots and the resolver deciding which one is current.
//!
//! A snapshot is the marketing context of a visit: UTM parameters, ad click
//! ids, external referrer, and landing page, stamped with a capture time.
//! One snapshot is persisted in a cookie and carried across internal
//! navigation until a visit brings stronger data or it expires.
//!
//! # Resolution
//!
//! For every visit the resolver builds a snapshot from the URL alone, then:
//!
//! 1. With nothing persisted, a URL snapshot carrying campaign keys or an
//!    external referrer is persisted and returned. A direct visit (landing
//!    page only) is returned without being persisted.
//! 2. If [`should_overwrite`] says the URL snapshot beats the persisted one,
//!    it is persisted and returned.
//! 3. A URL snapshot with campaign keys that does not beat the persisted one
//!    (a same-campaign reload) is returned, leaving storage untouched.
//! 4. Otherwise the persisted snapshot is returned with `landing_page`
//!    replaced by the current location; the stored copy is not modified.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{is_cross_origin, is_external_referrer};
use crate::page::PageContext;
use crate::storage::{CookieOptions, Storage};

/// UTM query parameters recognised as campaign attribution.
pub static UTM_KEYS: [&str; 7] = [
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_ad_id",
    "utm_ad_group_id",
    "utm_campaign_id",
];

/// Ad-platform click ids recognised as campaign attribution.
pub static CLICK_ID_KEYS: [&str; 3] = ["gclid", "fbclid", "mkclid"];

/// Non-campaign string fields.
static CONTEXT_KEYS: [&str; 2] = ["referrer", "landing_page"];

/// Fields excluded when comparing two snapshots for duplication.
const VOLATILE_KEYS: [&str; 2] = ["landing_page", "attribution_timestamp"];

/// Marketing context of a visit.
///
/// Absent and empty values are equivalent; setters never store an empty
/// string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AttributionSnapshot {
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
    /// External referrer; only recorded when its origin differs from the
    /// landing page's.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub landing_page: Option<String>,
    /// Capture time in epoch milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribution_timestamp: Option<i64>,
    /// Identifiers contributed by ad-platform collaborators.
    #[serde(flatten)]
    pub external_ids: BTreeMap<String, String>,
}

impl<'de> Deserialize<'de> for AttributionSnapshot {
    /// Lenient decoding: non-object input yields an empty snapshot, values
    /// of the wrong type are dropped, and unknown string fields are kept as
    /// external ids.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = Value::deserialize(deserializer)?;
        Ok(Self::from_json(&raw))
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl AttributionSnapshot {
    /// Decode a stored snapshot, dropping anything that does not fit.
    #[must_use]
    pub fn from_json(raw: &Value) -> Self {
        let mut snapshot = Self::default();
        let Some(object) = raw.as_object() else {
            return snapshot;
        };
        for (key, value) in object {
            if key == "attribution_timestamp" {
                snapshot.attribution_timestamp = match value {
                    Value::Number(n) => n.as_i64(),
                    Value::String(s) => s.parse().ok(),
                    _ => None,
                };
                continue;
            }
            if let Some(text) = scalar_to_string(value) {
                if !snapshot.set(key, &text) {
                    snapshot.external_ids.insert(key.clone(), text);
                }
            }
        }
        snapshot
    }

    fn slot(&self, key: &str) -> Option<&Option<String>> {
        Some(match key {
            "utm_source" => &self.utm_source,
            "utm_medium" => &self.utm_medium,
            "utm_campaign" => &self.utm_campaign,
            "utm_term" => &self.utm_term,
            "utm_ad_id" => &self.utm_ad_id,
            "utm_ad_group_id" => &self.utm_ad_group_id,
            "utm_campaign_id" => &self.utm_campaign_id,
            "gclid" => &self.gclid,
            "fbclid" => &self.fbclid,
            "mkclid" => &self.mkclid,
            "referrer" => &self.referrer,
            "landing_page" => &self.landing_page,
            _ => return None,
        })
    }

    fn slot_mut(&mut self, key: &str) -> Option<&mut Option<String>> {
        Some(match key {
            "utm_source" => &mut self.utm_source,
            "utm_medium" => &mut self.utm_medium,
            "utm_campaign" => &mut self.utm_campaign,
            "utm_term" => &mut self.utm_term,
            "utm_ad_id" => &mut self.utm_ad_id,
            "utm_ad_group_id" => &mut self.utm_ad_group_id,
            "utm_campaign_id" => &mut self.utm_campaign_id,
            "gclid" => &mut self.gclid,
            "fbclid" => &mut self.fbclid,
            "mkclid" => &mut self.mkclid,
            "referrer" => &mut self.referrer,
            "landing_page" => &mut self.landing_page,
            _ => return None,
        })
    }

    /// Value of a named string field, or of an external id.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        match self.slot(key) {
            Some(slot) => slot.as_deref(),
            None => self.external_ids.get(key).map(String::as_str),
        }
    }

    /// Set a named string field. Returns `false` for keys that are not
    /// snapshot fields. Empty values clear the field.
    pub fn set(&mut self, key: &str, value: &str) -> bool {
        let Some(slot) = self.slot_mut(key) else {
            return false;
        };
        *slot = (!value.is_empty()).then(|| value.to_string());
        true
    }

    /// `true` when at least one UTM or click-id key is set.
    #[must_use]
    pub fn has_campaign_keys(&self) -> bool {
        UTM_KEYS
            .iter()
            .chain(CLICK_ID_KEYS.iter())
            .any(|key| self.get(key).is_some())
    }

    /// `true` when no field at all is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attribution_timestamp.is_none() && self.entries().next().is_none()
    }

    /// Every set string field and external id, in a stable order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        UTM_KEYS
            .iter()
            .chain(CLICK_ID_KEYS.iter())
            .chain(CONTEXT_KEYS.iter())
            .filter_map(|key| self.get(key).map(|value| (*key, value)))
            .chain(
                self.external_ids
                    .iter()
                    .filter(|(_, v)| !v.is_empty())
                    .map(|(k, v)| (k.as_str(), v.as_str())),
            )
    }

    /// Set fields that take part in duplicate detection.
    #[must_use]
    pub fn comparable_entries(&self) -> BTreeMap<&str, &str> {
        self.entries()
            .filter(|(key, _)| !VOLATILE_KEYS.contains(key))
            .collect()
    }

    /// Materially identical attribution: the same set of meaningful keys
    /// with identical values, ignoring capture time and landing page.
    #[must_use]
    pub fn same_attribution(&self, other: &Self) -> bool {
        let ours = self.comparable_entries();
        let theirs = other.comparable_entries();
        ours.len() == theirs.len() && ours.iter().all(|(k, v)| theirs.get(k) == Some(v))
    }

    /// Stale once older than `expiry_ms`. A snapshot without a capture time
    /// breaks the timestamp invariant and counts as expired.
    #[must_use]
    pub fn is_expired(&self, now_ms: i64, expiry_ms: i64) -> bool {
        self.attribution_timestamp
            .is_none_or(|captured| now_ms.saturating_sub(captured) > expiry_ms)
    }

    fn campaign_differs(&self, other: &Self) -> bool {
        UTM_KEYS
            .iter()
            .chain(CLICK_ID_KEYS.iter())
            .any(|key| self.get(key) != other.get(key))
    }
}

/// Persistence-write decision: does `candidate`, built from the current URL,
/// replace the `persisted` snapshot?
///
/// Overwrite when the URL carries campaign keys and any differs from the
/// persisted value, or when the referrer is a different external site
/// (whether or not the URL repeats the persisted campaign). An internal
/// navigation or same-campaign reload never clobbers richer stored data.
#[must_use]
pub fn should_overwrite(
    candidate: &AttributionSnapshot,
    persisted: &AttributionSnapshot,
    page: &PageContext,
) -> bool {
    let external_entry = page
        .referrer
        .as_deref()
        .is_some_and(|referrer| is_external_referrer(referrer, &page.url));

    if candidate.has_campaign_keys() {
        candidate.campaign_differs(persisted) || external_entry
    } else {
        external_entry
    }
}

/// A collaborator contributing ad-platform identifiers (for example ids
/// synthesized from first-party click cookies) to each URL snapshot.
pub trait ClickIdContributor {
    fn contribute(&self, page: &PageContext) -> Vec<(String, String)>;
}

/// Where a resolved snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    /// Built from the URL and persisted.
    Fresh,
    /// Built from the URL; the persisted snapshot was left alone.
    Url,
    /// The persisted snapshot, with the current landing page.
    Carried,
}

/// Result of resolving attribution for a visit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub snapshot: AttributionSnapshot,
    pub source: ResolutionSource,
}

/// Resolves and persists the attribution snapshot.
#[derive(Debug, Clone)]
pub struct AttributionResolver {
    cookie_name: String,
    cookie_days: u32,
    domain: String,
    expiry_ms: i64,
}

impl AttributionResolver {
    #[must_use]
    pub fn new(
        cookie_name: impl Into<String>,
        cookie_days: u32,
        domain: impl Into<String>,
        expiry_ms: i64,
    ) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            cookie_days,
            domain: domain.into(),
            expiry_ms,
        }
    }

    /// Build a snapshot from the page alone.
    #[must_use]
    pub fn url_snapshot(
        &self,
        page: &PageContext,
        now_ms: i64,
        contributors: &[Box<dyn ClickIdContributor>],
    ) -> AttributionSnapshot {
        let mut snapshot = AttributionSnapshot::default();
        for (key, value) in page.url.query_pairs() {
            let key: &str = &key;
            let recognised = UTM_KEYS.contains(&key) || CLICK_ID_KEYS.contains(&key);
            if recognised && snapshot.get(key).is_none() {
                snapshot.set(key, &value);
            }
        }

        if let Some(referrer) = page.referrer.as_deref() {
            if is_cross_origin(referrer, &page.url) {
                snapshot.referrer = Some(referrer.to_string());
            }
        }

        snapshot.landing_page = Some(page.location().to_string());
        snapshot.attribution_timestamp = Some(now_ms);

        for contributor in contributors {
            for (key, value) in contributor.contribute(page) {
                if value.is_empty() || snapshot.get(&key).is_some() {
                    continue;
                }
                if !snapshot.set(&key, &value) {
                    snapshot.external_ids.insert(key, value);
                }
            }
        }
        snapshot
    }

    /// Load the persisted snapshot, discarding (and removing) it when it is
    /// malformed or expired.
    pub fn load_persisted(&self, storage: &mut Storage, now_ms: i64) -> Option<AttributionSnapshot> {
        let raw = storage.cookie(&self.cookie_name)?;
        let snapshot = match serde_json::from_str::<AttributionSnapshot>(&raw) {
            Ok(snapshot) if !snapshot.is_empty() => snapshot,
            Ok(_) => {
                tracing::debug!("persisted attribution is empty");
                self.clear(storage);
                return None;
            }
            Err(err) => {
                tracing::warn!(cookie = %self.cookie_name, "discarding malformed attribution: {err}");
                self.clear(storage);
                return None;
            }
        };

        if snapshot.is_expired(now_ms, self.expiry_ms) {
            tracing::debug!(
                captured = ?snapshot.attribution_timestamp,
                "persisted attribution expired"
            );
            self.clear(storage);
            return None;
        }
        Some(snapshot)
    }

    /// Write `snapshot` to the attribution cookie.
    pub fn persist(&self, storage: &mut Storage, snapshot: &AttributionSnapshot, now_ms: i64) {
        match serde_json::to_string(snapshot) {
            Ok(json) => {
                let options =
                    CookieOptions::for_days(now_ms, self.cookie_days, Some(self.domain.clone()));
                storage.set_cookie(&self.cookie_name, &json, &options);
            }
            Err(err) => tracing::warn!("failed to encode attribution: {err}"),
        }
    }

    pub fn clear(&self, storage: &mut Storage) {
        storage.remove_cookie(&self.cookie_name, Some(&self.domain));
    }

    /// Resolve the attribution for a visit to `page`.
    pub fn resolve(
        &self,
        storage: &mut Storage,
        page: &PageContext,
        now_ms: i64,
        contributors: &[Box<dyn ClickIdContributor>],
    ) -> Resolution {
        let candidate = self.url_snapshot(page, now_ms, contributors);

        let Some(persisted) = self.load_persisted(storage, now_ms) else {
            if candidate.has_campaign_keys() || candidate.referrer.is_some() {
                self.persist(storage, &candidate, now_ms);
                return Resolution {
                    snapshot: candidate,
                    source: ResolutionSource::Fresh,
                };
            }
            return Resolution {
                snapshot: candidate,
                source: ResolutionSource::Url,
            };
        };

        if should_overwrite(&candidate, &persisted, page) {
            self.persist(storage, &candidate, now_ms);
            return Resolution {
                snapshot: candidate,
                source: ResolutionSource::Fresh,
            };
        }

        if candidate.has_campaign_keys() {
            return Resolution {
                snapshot: candidate,
                source: ResolutionSource::Url,
            };
        }

        let mut carried = persisted;
        carried.landing_page = Some(page.location().to_string());
        Resolution {
            snapshot: carried,
            source: ResolutionSource::Carried,
        }
    }
}
