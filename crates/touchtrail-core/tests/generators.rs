use proptest::prelude::*;
use touchtrail_core::PageContext;

/// A page visit as the host would report it.
#[derive(Debug, Clone)]
pub struct Visit {
    pub path: &'static str,
    pub utm_source: Option<&'static str>,
    pub utm_campaign: Option<&'static str>,
    pub referrer: Option<&'static str>,
}

impl Visit {
    pub fn page(&self) -> PageContext {
        let mut url = format!("https://www.x.com{}", self.path);
        let mut sep = '?';
        for (key, value) in [("utm_source", self.utm_source), ("utm_campaign", self.utm_campaign)] {
            if let Some(value) = value {
                url.push(sep);
                url.push_str(&format!("{key}={value}"));
                sep = '&';
            }
        }
        let page = PageContext::parse(&url).expect("generated url parses");
        match self.referrer {
            Some(referrer) => page.with_referrer(referrer),
            None => page,
        }
    }
}

pub fn arb_visit() -> impl Strategy<Value = Visit> + Clone {
    (
        prop_oneof![Just("/"), Just("/pricing"), Just("/blog"), Just("/signup")],
        prop::option::of(prop_oneof![Just("google"), Just("bing"), Just("newsletter")]),
        prop::option::of(prop_oneof![Just("spring"), Just("autumn")]),
        prop::option::of(prop_oneof![
            Just("https://www.x.com/"),
            Just("https://app.x.com/home"),
            Just("https://google.com/search"),
            Just("https://news.example.org/"),
        ]),
    )
        .prop_map(|(path, utm_source, utm_campaign, referrer)| Visit {
            path,
            utm_source,
            utm_campaign,
            referrer,
        })
}

pub fn arb_journey(max_len: usize) -> impl Strategy<Value = Vec<Visit>> + Clone {
    prop::collection::vec(arb_visit(), 1..max_len)
}
