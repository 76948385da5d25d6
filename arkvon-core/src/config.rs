//! Agent configuration
//!
//! [`AgentSettings`] holds the tunables (TOML-loadable, every field
//! defaulted). [`AgentConfig`] is the immutable identity resolved once per
//! page load from the settings, the hosting attributes and the page.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::delivery::RetryPolicy;
use crate::error::ConfigError;
use crate::page::PageContext;
use crate::payment::ObserverPolicy;

/// Collector used when no override is configured
pub const DEFAULT_API_BASE_URL: &str = "https://api.arkvon.com/v1/tracking";

/// Cookie lifetime when the collector does not send one
pub const DEFAULT_COOKIE_DAYS: u32 = 30;

/// Longest cookie lifetime written; browsers cap expiry at 400 days
pub const MAX_COOKIE_DAYS: u32 = 400;

/// Immutable process-wide configuration for one page load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Tenant identifier from the hosting script element
    pub public_id: String,
    /// Cookie scope derived from the page hostname
    pub domain: String,
    /// Collector base URL, without trailing slash
    pub api_base_url: String,
}

impl AgentConfig {
    /// Resolve the configuration for `page`.
    ///
    /// Fails with [`ConfigError::MissingPublicId`] when the host document
    /// did not provide a public id.
    pub fn resolve(
        settings: &AgentSettings,
        attributes: &ScriptAttributes,
        page: &PageContext,
    ) -> Result<Self, ConfigError> {
        let public_id = attributes
            .public_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(ConfigError::MissingPublicId)?;

        Ok(Self {
            public_id: public_id.to_string(),
            domain: page.cookie_domain(),
            api_base_url: settings.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Whether enough identity is present to talk to the collector
    pub fn is_deliverable(&self) -> bool {
        !self.public_id.is_empty() && !self.domain.is_empty()
    }

    /// Full collector URL for an endpoint path segment
    pub fn endpoint_url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base_url, path)
    }
}

/// Attributes the hosting script element carries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptAttributes {
    /// `data-arkvon`
    pub public_id: Option<String>,
    /// `data-payment-type`
    pub payment_type: Option<String>,
    /// `data-payment-domain`
    pub payment_domain: Option<String>,
}

impl ScriptAttributes {
    pub fn with_public_id(public_id: impl Into<String>) -> Self {
        Self {
            public_id: Some(public_id.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_payment(mut self, payment_type: impl Into<String>, domain: Option<String>) -> Self {
        self.payment_type = Some(payment_type.into());
        self.payment_domain = domain;
        self
    }
}

/// Tunables for the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Collector base URL
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Retry budget and backoff for collector calls
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Lifetime for referral cookies when the collector sends none
    #[serde(default = "default_cookie_days")]
    pub default_cookie_days: u32,

    /// Lifetime used when re-persisting tracking data after a signup
    #[serde(default = "default_cookie_days")]
    pub signup_cookie_days: u32,

    /// Polling policy handed to payment collaborators
    #[serde(default)]
    pub observer: ObserverPolicy,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_cookie_days() -> u32 {
    DEFAULT_COOKIE_DAYS
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            retry: RetryPolicy::default(),
            default_cookie_days: default_cookie_days(),
            signup_cookie_days: default_cookie_days(),
            observer: ObserverPolicy::default(),
        }
    }
}

impl AgentSettings {
    /// Parse settings from TOML; missing keys take their defaults
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    #[must_use]
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_retry(mut self, max_attempts: u32, backoff_base: Duration) -> Self {
        self.retry = RetryPolicy::new(max_attempts, backoff_base);
        self
    }

    #[must_use]
    pub fn with_default_cookie_days(mut self, days: u32) -> Self {
        self.default_cookie_days = days;
        self
    }
}
