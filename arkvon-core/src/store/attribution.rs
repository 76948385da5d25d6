//! Cookie-backed attribution persistence

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, warn};

use super::jar::{CookieJar, format_cookie_date};
use super::types::{DATA_COOKIE, REFERRAL_COOKIE, StoredValue, TrackingData};
use crate::config::MAX_COOKIE_DAYS;
use crate::error::StoreError;

/// SameSite policy written on every cookie
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Lax,
    Strict,
    None,
}

impl SameSite {
    fn as_str(self) -> &'static str {
        match self {
            Self::Lax => "lax",
            Self::Strict => "strict",
            Self::None => "none",
        }
    }
}

/// Scope and flags for a cookie write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    pub path: String,
    pub domain: Option<String>,
    pub same_site: SameSite,
    pub secure: bool,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            domain: None,
            same_site: SameSite::Lax,
            secure: false,
        }
    }
}

/// Value accepted by [`AttributionStore::write`]
#[derive(Debug, Clone, Copy)]
pub enum StoreValue<'a> {
    /// Written verbatim (percent-encoded)
    Text(&'a str),
    /// Written as JSON (percent-encoded)
    Json(&'a serde_json::Value),
}

/// Durable key/value persistence for referral identity and metadata
pub struct AttributionStore {
    jar: Arc<dyn CookieJar>,
    options: CookieOptions,
}

impl AttributionStore {
    /// Create a store writing through `jar` with `options` as the default scope
    pub fn new(jar: Arc<dyn CookieJar>, options: CookieOptions) -> Self {
        Self { jar, options }
    }

    /// Default scope for a page: the resolved cookie domain, `secure` on https
    pub fn for_domain(jar: Arc<dyn CookieJar>, domain: Option<String>, secure: bool) -> Self {
        Self::new(
            jar,
            CookieOptions {
                domain,
                secure,
                ..CookieOptions::default()
            },
        )
    }

    /// Scope applied when callers do not pass their own
    pub fn options(&self) -> &CookieOptions {
        &self.options
    }

    /// Read `key`.
    ///
    /// Missing or undecodable cookies read as `None`. Values that are not JSON
    /// come back as [`StoredValue::Raw`].
    pub async fn read(&self, key: &str) -> Option<StoredValue> {
        let header = self.jar.cookie_header().await;
        let raw = header
            .split(';')
            .map(str::trim)
            .filter_map(|pair| pair.split_once('='))
            .find(|(name, _)| *name == key)
            .map(|(_, value)| value)?;

        match urlencoding::decode(raw) {
            Ok(decoded) => Some(StoredValue::from_decoded(decoded.into_owned())),
            Err(e) => {
                warn!(key, error = %e, "Ignoring undecodable cookie");
                None
            }
        }
    }

    /// Write `key` for `ttl_days` with explicit `options`.
    ///
    /// Lifetimes beyond [`MAX_COOKIE_DAYS`] are clamped.
    pub async fn write(
        &self,
        key: &str,
        value: StoreValue<'_>,
        ttl_days: u32,
        options: &CookieOptions,
    ) -> Result<(), StoreError> {
        let encoded = match value {
            StoreValue::Text(text) => urlencoding::encode(text).into_owned(),
            StoreValue::Json(json) => {
                let text = serde_json::to_string(json)?;
                urlencoding::encode(&text).into_owned()
            }
        };

        if ttl_days > MAX_COOKIE_DAYS {
            debug!(key, ttl_days, "Clamping cookie lifetime to {MAX_COOKIE_DAYS} days");
        }
        let ttl_days = ttl_days.min(MAX_COOKIE_DAYS);
        let expires = Utc::now() + Duration::days(i64::from(ttl_days));
        let cookie = render_cookie(key, &encoded, &format_cookie_date(expires), options);
        self.jar.set_cookie(&cookie).await?;

        debug!(key, ttl_days, "Set cookie");
        Ok(())
    }

    /// Expire `key` under the same scope it would have been written with
    pub async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let cookie = render_cookie(key, "", "Thu, 01 Jan 1970 00:00:00 GMT", &self.options);
        self.jar.set_cookie(&cookie).await
    }

    /// Referral code stored under [`REFERRAL_COOKIE`]
    pub async fn referral_code(&self) -> Option<String> {
        self.read(REFERRAL_COOKIE)
            .await
            .and_then(|v| v.as_text())
            .filter(|code| !code.is_empty())
    }

    /// Tracking data stored under [`DATA_COOKIE`]
    pub async fn tracking_data(&self) -> Option<TrackingData> {
        match self.read(DATA_COOKIE).await? {
            StoredValue::Structured(value) => match serde_json::from_value(value) {
                Ok(data) => Some(data),
                Err(e) => {
                    warn!(error = %e, "Stored tracking data has an unexpected shape");
                    None
                }
            },
            StoredValue::Raw(_) => {
                warn!("Stored tracking data is not JSON");
                None
            }
        }
    }

    /// Whether either attribution cookie is present, even if malformed
    pub async fn has_attribution(&self) -> bool {
        self.read(REFERRAL_COOKIE).await.is_some() || self.read(DATA_COOKIE).await.is_some()
    }

    pub async fn write_referral(&self, code: &str, ttl_days: u32) -> Result<(), StoreError> {
        self.write(REFERRAL_COOKIE, StoreValue::Text(code), ttl_days, &self.options)
            .await
    }

    pub async fn write_tracking_data(
        &self,
        data: &TrackingData,
        ttl_days: u32,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_value(data)?;
        self.write(DATA_COOKIE, StoreValue::Json(&json), ttl_days, &self.options)
            .await
    }

    /// Expire both attribution cookies
    pub async fn clear(&self) -> Result<(), StoreError> {
        self.remove(REFERRAL_COOKIE).await?;
        self.remove(DATA_COOKIE).await
    }
}

fn render_cookie(name: &str, value: &str, expires: &str, options: &CookieOptions) -> String {
    let mut cookie = format!("{name}={value};expires={expires};path={}", options.path);
    if let Some(domain) = &options.domain {
        cookie.push_str(";domain=");
        cookie.push_str(domain);
    }
    cookie.push_str(";samesite=");
    cookie.push_str(options.same_site.as_str());
    if options.secure {
        cookie.push_str(";secure");
    }
    cookie
}
