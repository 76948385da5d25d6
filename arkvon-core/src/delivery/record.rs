//! Canonical event records sent to the collector

use serde::Serialize;
use serde_json::Value;

use crate::command::CommandData;
use crate::config::AgentConfig;
use crate::page::PageContext;

/// Payload for one collector call.
///
/// Command fields come first, then the envelope (`public_id`, `domain`,
/// `timestamp`, `user_agent`, `referrer`, `page_url`) overwrites them, then
/// `referral_code` when attribution is active.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EventRecord {
    fields: CommandData,
}

impl EventRecord {
    pub fn build(
        payload: &CommandData,
        config: &AgentConfig,
        page: &PageContext,
        referral_code: Option<&str>,
        timestamp: i64,
    ) -> Self {
        let mut fields = payload.clone();
        fields.insert("public_id".into(), Value::from(config.public_id.as_str()));
        fields.insert("domain".into(), Value::from(config.domain.as_str()));
        fields.insert("timestamp".into(), Value::from(timestamp));
        fields.insert("user_agent".into(), Value::from(page.user_agent()));
        fields.insert("referrer".into(), Value::from(page.referrer()));
        fields.insert("page_url".into(), Value::from(page.href()));

        if let Some(code) = referral_code.filter(|c| !c.is_empty()) {
            fields.insert("referral_code".into(), Value::from(code));
        }

        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &CommandData {
        &self.fields
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}
