//! Collector responses
//!
//! The collector answers with loosely typed JSON. Fields are read leniently:
//! ids may be strings or numbers, flags follow JavaScript truthiness, and a
//! field of an unexpected type reads as absent instead of failing the call.

use serde::Serialize;
use serde_json::Value;

use crate::command::is_truthy;
use crate::config::MAX_COOKIE_DAYS;

/// Parsed body of a successful collector call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CollectorResponse {
    raw: Value,
}

impl CollectorResponse {
    pub fn new(raw: Value) -> Self {
        Self { raw }
    }

    /// `success`
    pub fn success(&self) -> bool {
        self.raw.get("success").is_some_and(is_truthy)
    }

    /// `cookie_duration` in whole days, when positive, capped at
    /// [`MAX_COOKIE_DAYS`]
    pub fn cookie_duration(&self) -> Option<u32> {
        let days = match self.raw.get("cookie_duration")? {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        (days >= 1.0).then(|| days.min(f64::from(MAX_COOKIE_DAYS)) as u32)
    }

    pub fn referral_id(&self) -> Option<String> {
        self.id("referral_id")
    }

    pub fn click_id(&self) -> Option<String> {
        self.id("click_id")
    }

    pub fn partner_id(&self) -> Option<String> {
        self.id("partner_id")
    }

    pub fn campaign_id(&self) -> Option<String> {
        self.id("campaign_id")
    }

    pub fn customer_id(&self) -> Option<String> {
        self.id("customer_id")
    }

    /// `commission_earned`, when truthy
    pub fn commission_earned(&self) -> Option<&Value> {
        self.raw.get("commission_earned").filter(|v| is_truthy(v))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.raw.get(key)
    }

    pub fn as_value(&self) -> &Value {
        &self.raw
    }

    pub fn into_value(self) -> Value {
        self.raw
    }

    fn id(&self, key: &str) -> Option<String> {
        match self.raw.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_documented_fields() {
        let response = CollectorResponse::new(json!({
            "success": true,
            "cookie_duration": 14,
            "referral_id": "R1",
            "click_id": 77,
            "partner_id": "p",
            "campaign_id": "",
            "customer_id": "cus_1",
            "commission_earned": 12.5
        }));

        assert!(response.success());
        assert_eq!(response.cookie_duration(), Some(14));
        assert_eq!(response.referral_id().as_deref(), Some("R1"));
        assert_eq!(response.click_id().as_deref(), Some("77"));
        assert_eq!(response.partner_id().as_deref(), Some("p"));
        assert_eq!(response.campaign_id(), None);
        assert_eq!(response.customer_id().as_deref(), Some("cus_1"));
        assert_eq!(response.commission_earned(), Some(&json!(12.5)));
    }

    #[test]
    fn missing_or_odd_fields_read_as_absent() {
        let response = CollectorResponse::new(json!({
            "success": "yes",
            "cookie_duration": 0,
            "referral_id": {"nested": true},
            "commission_earned": 0
        }));

        assert!(response.success());
        assert_eq!(response.cookie_duration(), None);
        assert_eq!(response.referral_id(), None);
        assert_eq!(response.commission_earned(), None);
    }

    #[test]
    fn non_object_body_is_unsuccessful() {
        let response = CollectorResponse::new(json!(null));
        assert!(!response.success());
        assert_eq!(response.cookie_duration(), None);
    }

    #[test]
    fn oversized_durations_are_capped() {
        let response = CollectorResponse::new(json!({"cookie_duration": 100_000_000}));
        assert_eq!(response.cookie_duration(), Some(MAX_COOKIE_DAYS));

        let response = CollectorResponse::new(json!({"cookie_duration": "1e300"}));
        assert_eq!(response.cookie_duration(), Some(MAX_COOKIE_DAYS));
    }

    #[test]
    fn string_durations_parse() {
        let response = CollectorResponse::new(json!({"cookie_duration": "60"}));
        assert_eq!(response.cookie_duration(), Some(60));
    }
}
