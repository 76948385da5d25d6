//! Attribution records as persisted and as exposed to callers

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::config::DEFAULT_COOKIE_DAYS;

/// Cookie holding the raw referral code
pub const REFERRAL_COOKIE: &str = "arkvon_referral";

/// Cookie holding the structured [`TrackingData`]
pub const DATA_COOKIE: &str = "arkvon_data";

/// A value read back from the store
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    /// Decoded as JSON
    Structured(Value),
    /// Not valid JSON, kept verbatim
    Raw(String),
}

impl StoredValue {
    /// Classify a decoded cookie value
    pub fn from_decoded(decoded: String) -> Self {
        match serde_json::from_str::<Value>(&decoded) {
            Ok(value) => Self::Structured(value),
            Err(_) => Self::Raw(decoded),
        }
    }

    /// Text form of a scalar value.
    ///
    /// A referral code such as `12345` is stored raw but reads back as a JSON
    /// number, so scalars are folded back into their text.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Raw(raw) => Some(raw.clone()),
            Self::Structured(Value::String(s)) => Some(s.clone()),
            Self::Structured(Value::Number(n)) => Some(n.to_string()),
            Self::Structured(Value::Bool(b)) => Some(b.to_string()),
            Self::Structured(_) => None,
        }
    }
}

/// Attribution metadata persisted under [`DATA_COOKIE`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingData {
    #[serde(default, deserialize_with = "opt_id", skip_serializing_if = "Option::is_none")]
    pub click_id: Option<String>,

    #[serde(default, deserialize_with = "opt_id", skip_serializing_if = "Option::is_none")]
    pub referral_id: Option<String>,

    #[serde(default, deserialize_with = "opt_id", skip_serializing_if = "Option::is_none")]
    pub partner_id: Option<String>,

    #[serde(default, deserialize_with = "opt_id", skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,

    /// Lifetime in days the cookies were written with
    #[serde(default = "default_cookie_duration")]
    pub cookie_duration: u32,

    /// Milliseconds since the Unix epoch
    #[serde(default)]
    pub created_at: i64,

    /// Set once a signup was acknowledged by the collector
    #[serde(default, deserialize_with = "opt_id", skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
}

fn default_cookie_duration() -> u32 {
    DEFAULT_COOKIE_DAYS
}

/// Collector ids arrive as strings or numbers; both become strings.
pub(crate) fn opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Resolved attribution for the current visitor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferralIdentity {
    /// Non-empty once attribution is established
    pub referral_code: String,
    pub referral_id: Option<String>,
    pub partner_id: Option<String>,
    pub campaign_id: Option<String>,
    pub click_id: Option<String>,
    pub customer_id: Option<String>,
    pub cookie_duration_days: u32,
    pub created_at: DateTime<Utc>,
}

impl ReferralIdentity {
    /// Combine a referral code with whatever metadata is stored alongside it.
    ///
    /// Returns `None` for an empty code.
    pub fn from_parts(referral_code: &str, tracking: Option<&TrackingData>) -> Option<Self> {
        if referral_code.is_empty() {
            return None;
        }

        let created_at = tracking
            .and_then(|t| Utc.timestamp_millis_opt(t.created_at).single())
            .unwrap_or_else(Utc::now);

        Some(Self {
            referral_code: referral_code.to_string(),
            referral_id: tracking.and_then(|t| t.referral_id.clone()),
            partner_id: tracking.and_then(|t| t.partner_id.clone()),
            campaign_id: tracking.and_then(|t| t.campaign_id.clone()),
            click_id: tracking.and_then(|t| t.click_id.clone()),
            customer_id: tracking.and_then(|t| t.customer_id.clone()),
            cookie_duration_days: tracking.map_or(DEFAULT_COOKIE_DAYS, |t| t.cookie_duration),
            created_at,
        })
    }
}

/// What `getReferralData()` reports
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReferralData {
    pub referral_code: Option<String>,
    pub tracking_data: Option<TrackingData>,
}

impl ReferralData {
    /// Whether a referral is currently active
    pub fn is_active(&self) -> bool {
        self.referral_code.as_deref().is_some_and(|c| !c.is_empty())
    }

    /// The active identity, if any
    pub fn identity(&self) -> Option<ReferralIdentity> {
        let code = self.referral_code.as_deref()?;
        ReferralIdentity::from_parts(code, self.tracking_data.as_ref())
    }
}
