//! Passive click and form-submit tracking for referred visitors

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::agent::PublicAgent;
use crate::command::CommandData;
use crate::delivery::CollectorResponse;

/// Longest element text sent with a click
pub const MAX_TEXT_CHARS: usize = 100;

/// The element a click landed on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickTarget {
    pub tag: String,
    pub id: Option<String>,
    pub class: Option<String>,
    pub text: Option<String>,
    pub href: Option<String>,
    pub input_type: Option<String>,
}

impl ClickTarget {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    /// Buttons, links and submit inputs
    pub fn is_trackable(&self) -> bool {
        self.tag.eq_ignore_ascii_case("button")
            || self.tag.eq_ignore_ascii_case("a")
            || self
                .input_type
                .as_deref()
                .is_some_and(|t| t.eq_ignore_ascii_case("submit"))
    }

    fn to_command_data(&self) -> CommandData {
        let mut data = CommandData::new();
        data.insert("type".into(), json!(self.tag.to_ascii_lowercase()));
        data.insert("element_id".into(), non_empty(self.id.as_deref()));
        data.insert("element_class".into(), non_empty(self.class.as_deref()));
        data.insert("element_text".into(), non_empty(self.trimmed_text().as_deref()));
        data.insert("href".into(), non_empty(self.href.as_deref()));
        data
    }

    fn trimmed_text(&self) -> Option<String> {
        self.text
            .as_deref()
            .map(|t| t.trim().chars().take(MAX_TEXT_CHARS).collect())
    }
}

/// A submitted form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormSubmission {
    pub id: Option<String>,
    pub class: Option<String>,
    pub action: Option<String>,
    pub method: Option<String>,
}

impl FormSubmission {
    fn event_data(&self) -> Value {
        let method = self
            .method
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or("GET");
        json!({
            "form_id": non_empty(self.id.as_deref()),
            "form_class": non_empty(self.class.as_deref()),
            "form_action": non_empty(self.action.as_deref()),
            "form_method": method,
        })
    }
}

fn non_empty(value: Option<&str>) -> Value {
    value
        .filter(|v| !v.is_empty())
        .map_or(Value::Null, Value::from)
}

/// Feeds page interactions into the agent while a referral is active
#[derive(Clone)]
pub struct InteractionTracker {
    agent: PublicAgent,
}

impl InteractionTracker {
    pub fn new(agent: PublicAgent) -> Self {
        Self { agent }
    }

    /// Report a click. Ignored for untracked elements and unreferred visitors.
    pub async fn on_click(&self, target: &ClickTarget) -> Option<CollectorResponse> {
        if !target.is_trackable() {
            return None;
        }
        if !self.agent.context().is_referral_user().await {
            debug!(tag = %target.tag, "Click ignored, no active referral");
            return None;
        }
        self.agent.click(target.to_command_data()).await
    }

    /// Report a form submission as a `form_submit` custom event
    pub async fn on_submit(&self, form: &FormSubmission) -> Option<CollectorResponse> {
        if !self.agent.context().is_referral_user().await {
            debug!("Form submission ignored, no active referral");
            return None;
        }
        self.agent.track("form_submit", form.event_data()).await
    }
}
