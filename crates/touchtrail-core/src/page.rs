//! The page a navigation landed on, as reported by the host integration.

use url::Url;

/// Location, referrer, and title of the current page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContext {
    pub url: Url,
    pub referrer: Option<String>,
    pub title: Option<String>,
}

impl PageContext {
    #[must_use]
    pub const fn new(url: Url) -> Self {
        Self {
            url,
            referrer: None,
            title: None,
        }
    }

    /// Parse an absolute page URL.
    ///
    /// # Errors
    ///
    /// Returns [`url::ParseError`] if `url` is not an absolute URL.
    pub fn parse(url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::new(Url::parse(url)?))
    }

    /// Set the referrer; blank values mean "no referrer".
    #[must_use]
    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        let referrer = referrer.into();
        self.referrer = (!referrer.trim().is_empty()).then_some(referrer);
        self
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        let title = title.into();
        self.title = (!title.is_empty()).then_some(title);
        self
    }

    #[must_use]
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or("localhost")
    }

    /// The location string events are keyed on.
    #[must_use]
    pub fn location(&self) -> &str {
        self.url.as_str()
    }
}
