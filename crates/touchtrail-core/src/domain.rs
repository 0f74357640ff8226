//! Host and origin helpers: cookie domain scoping and referrer classification.

use std::net::IpAddr;

use url::Url;

/// Resolve the domain attribute for tracker cookies on `host`.
///
/// - An explicit override always wins.
/// - `localhost`, IP literals, and hosts covered by `external_domains` are
///   scoped to the full hostname, host-only (no leading dot).
/// - Anything else is scoped to `.<eTLD+1>` so every subdomain of the site
///   shares the cookie. A host that is itself a public suffix stays
///   host-only.
#[must_use]
pub fn cookie_domain(host: &str, override_domain: Option<&str>, external_domains: &[String]) -> String {
    if let Some(domain) = override_domain.filter(|d| !d.trim().is_empty()) {
        return domain.trim().to_string();
    }

    let host = host.trim_end_matches('.').to_ascii_lowercase();
    if is_local_or_ip(&host) || is_external(&host, external_domains) {
        return host;
    }

    registrable_domain(&host).map_or(host, |root| format!(".{root}"))
}

/// Registrable domain (eTLD+1) of `host` per the Public Suffix List, or
/// `None` for IPs, single-label hosts, and bare public suffixes.
#[must_use]
pub fn registrable_domain(host: &str) -> Option<String> {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    if is_local_or_ip(&host) || !host.contains('.') {
        return None;
    }
    psl::domain_str(&host).map(str::to_string)
}

fn is_local_or_ip(host: &str) -> bool {
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    host == "localhost" || host.ends_with(".localhost") || bare.parse::<IpAddr>().is_ok()
}

fn is_external(host: &str, external_domains: &[String]) -> bool {
    external_domains.iter().any(|domain| {
        let domain = domain.trim().trim_start_matches('.').to_ascii_lowercase();
        !domain.is_empty() && (host == domain || host.ends_with(&format!(".{domain}")))
    })
}

/// `true` when `referrer` parses and its origin differs from `current`'s.
#[must_use]
pub fn is_cross_origin(referrer: &str, current: &Url) -> bool {
    Url::parse(referrer).is_ok_and(|r| r.origin() != current.origin())
}

/// `true` when `referrer` comes from a different site than `current`,
/// comparing registrable domains rather than full origins.
///
/// Navigation between `www.x.com` and `app.x.com` is internal; a referrer
/// from `google.com` is external.
#[must_use]
pub fn is_external_referrer(referrer: &str, current: &Url) -> bool {
    let Ok(referrer) = Url::parse(referrer) else {
        return false;
    };
    let (Some(ref_host), Some(cur_host)) = (referrer.host_str(), current.host_str()) else {
        return false;
    };
    let ref_site = registrable_domain(ref_host).unwrap_or_else(|| ref_host.to_ascii_lowercase());
    let cur_site = registrable_domain(cur_host).unwrap_or_else(|| cur_host.to_ascii_lowercase());
    ref_site != cur_site
}
