//! The hosting page as seen by the agent
//!
//! The browser surface (location, referrer, user agent, title) is reduced
//! to a plain value so the core can run anywhere.

use std::net::IpAddr;

use url::{Host, Url};

use crate::error::ConfigError;

/// Hostnames that always keep their exact cookie scope
const LOCAL_SUFFIX: &str = ".local";

/// Snapshot of the page the agent was loaded into
#[derive(Debug, Clone, PartialEq)]
pub struct PageContext {
    url: Url,
    referrer: Option<String>,
    user_agent: String,
    title: String,
}

impl PageContext {
    /// Create a page context for `url`
    pub fn new(url: Url) -> Self {
        Self {
            url,
            referrer: None,
            user_agent: String::new(),
            title: String::new(),
        }
    }

    /// Parse `url` and create a page context for it
    pub fn parse(url: &str) -> Result<Self, ConfigError> {
        let parsed = Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(parsed))
    }

    #[must_use]
    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        let referrer = referrer.into();
        self.referrer = if referrer.is_empty() {
            None
        } else {
            Some(referrer)
        };
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Full page URL, as reported in `page_url`
    pub fn href(&self) -> &str {
        self.url.as_str()
    }

    pub fn hostname(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    pub fn pathname(&self) -> &str {
        self.url.path()
    }

    /// Referring document URL, empty when there is none
    pub fn referrer(&self) -> &str {
        self.referrer.as_deref().unwrap_or_default()
    }

    pub fn referrer_opt(&self) -> Option<&str> {
        self.referrer.as_deref()
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Whether the page was loaded over an encrypted transport
    pub fn is_secure(&self) -> bool {
        self.url.scheme() == "https"
    }

    /// Whether the query string carries `name`, with or without a value
    pub fn has_param(&self, name: &str) -> bool {
        self.url.query_pairs().any(|(key, _)| key == name)
    }

    /// First value of query parameter `name`
    pub fn param(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    /// Cookie scope for this page, see [`cookie_domain`]
    pub fn cookie_domain(&self) -> String {
        match self.url.host() {
            Some(Host::Domain(domain)) => cookie_domain(domain),
            Some(Host::Ipv4(_) | Host::Ipv6(_)) => self.hostname().to_string(),
            None => String::new(),
        }
    }
}

/// Reduce a hostname to the scope cookies are written under.
///
/// `localhost`, `*.local` and IP address hosts keep their exact name;
/// anything else is cut down to its last two DNS labels
/// (`sub.example.com` -> `example.com`).
pub fn cookie_domain(hostname: &str) -> String {
    if hostname == "localhost" || hostname.ends_with(LOCAL_SUFFIX) || is_ip_literal(hostname) {
        return hostname.to_string();
    }

    let labels: Vec<&str> = hostname.split('.').collect();
    if labels.len() > 2 {
        labels[labels.len() - 2..].join(".")
    } else {
        hostname.to_string()
    }
}

fn is_ip_literal(hostname: &str) -> bool {
    hostname
        .trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .is_ok()
}
