//! Maps commands to collector endpoints and canonical payloads

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::command::{Command, CommandData, is_truthy};
use crate::context::AgentContext;
use crate::delivery::{CollectorResponse, DeliveryClient, Transport};
use crate::page::PageContext;

/// Dispatches commands to the [`DeliveryClient`]
pub struct CommandProcessor {
    context: Arc<AgentContext>,
    delivery: DeliveryClient,
}

impl CommandProcessor {
    pub fn new(context: Arc<AgentContext>, transport: Arc<dyn Transport>) -> Self {
        let delivery = DeliveryClient::new(context.clone(), transport);
        Self { context, delivery }
    }

    pub fn delivery(&self) -> &DeliveryClient {
        &self.delivery
    }

    /// Process a command by external name.
    ///
    /// Unknown names are warned about and resolve to `None` without any
    /// network traffic.
    pub async fn process(&self, name: &str, data: CommandData) -> Option<CollectorResponse> {
        match name.parse::<Command>() {
            Ok(command) => self.dispatch(command, data).await,
            Err(e) => {
                warn!(command = name, "{e}");
                None
            }
        }
    }

    /// Process a command known at compile time
    pub async fn dispatch(&self, command: Command, data: CommandData) -> Option<CollectorResponse> {
        debug!(%command, "Processing command");
        let payload = build_payload(command, data, self.context.page());
        self.delivery.send(command.endpoint(), &payload).await
    }
}

/// Fill command defaults, then lay the caller's fields over them.
///
/// Defaults fall back on JavaScript-falsy values (missing, null, empty
/// string, zero, false).
pub fn build_payload(command: Command, data: CommandData, page: &PageContext) -> CommandData {
    let mut payload = CommandData::new();

    match command {
        Command::Click => {
            payload.insert("click_type".into(), or_default(&data, "type", "generic"));
        }
        Command::Signup => {
            payload.insert(
                "signup_source".into(),
                or_default(&data, "source", "website"),
            );
        }
        Command::Conversion => {
            payload.insert(
                "conversion_type".into(),
                or_default(&data, "type", "purchase"),
            );
            payload.insert("currency".into(), or_default(&data, "currency", "USD"));
        }
        Command::PageView => {
            payload.insert("page".into(), or_default(&data, "page", page.pathname()));
            payload.insert("title".into(), or_default(&data, "title", page.title()));
        }
        Command::Custom => {}
    }

    // Caller fields win on collision
    payload.extend(data);
    payload
}

fn or_default(data: &CommandData, key: &str, default: &str) -> Value {
    data.get(key)
        .filter(|v| is_truthy(v))
        .cloned()
        .unwrap_or_else(|| Value::from(default))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::command::data_from;
    use crate::config::{AgentConfig, AgentSettings};
    use crate::delivery::MockTransport;
    use crate::store::MemoryCookieJar;

    fn page() -> PageContext {
        PageContext::parse("https://example.com/pricing")
            .unwrap()
            .with_title("Pricing")
    }

    #[test]
    fn click_defaults_type() {
        let payload = build_payload(Command::Click, CommandData::new(), &page());
        assert_eq!(payload["click_type"], "generic");

        let payload = build_payload(Command::Click, data_from(json!({"type": "button"})), &page());
        assert_eq!(payload["click_type"], "button");
        assert_eq!(payload["type"], "button");
    }

    #[test]
    fn signup_defaults_source() {
        let payload = build_payload(
            Command::Signup,
            data_from(json!({"email": "a@b.c", "source": ""})),
            &page(),
        );
        assert_eq!(payload["signup_source"], "website");
        assert_eq!(payload["email"], "a@b.c");
    }

    #[test]
    fn conversion_defaults_type_and_currency() {
        let payload = build_payload(
            Command::Conversion,
            data_from(json!({"value": 49})),
            &page(),
        );
        assert_eq!(payload["conversion_type"], "purchase");
        assert_eq!(payload["currency"], "USD");
        assert_eq!(payload["value"], 49);
    }

    #[test]
    fn page_view_defaults_from_page() {
        let payload = build_payload(Command::PageView, CommandData::new(), &page());
        assert_eq!(payload["page"], "/pricing");
        assert_eq!(payload["title"], "Pricing");
    }

    #[test]
    fn caller_fields_override_defaults() {
        let payload = build_payload(
            Command::Conversion,
            data_from(json!({"currency": "EUR", "conversion_type": "upgrade"})),
            &page(),
        );
        assert_eq!(payload["currency"], "EUR");
        assert_eq!(payload["conversion_type"], "upgrade");
    }

    #[test]
    fn custom_passes_fields_through() {
        let payload = build_payload(
            Command::Custom,
            data_from(json!({"event_name": "form_submit", "event_data": {"id": "f"}})),
            &page(),
        );
        assert_eq!(payload.len(), 2);
        assert_eq!(payload["event_data"]["id"], "f");
    }

    fn processor(transport: Arc<MockTransport>) -> CommandProcessor {
        let ctx = AgentContext::new(
            AgentSettings::default(),
            page(),
            Arc::new(MemoryCookieJar::new()),
        );
        ctx.install_config(AgentConfig {
            public_id: "pub".into(),
            domain: "example.com".into(),
            api_base_url: "https://collector.test".into(),
        });
        CommandProcessor::new(Arc::new(ctx), transport)
    }

    #[tokio::test]
    async fn unknown_command_makes_no_request() {
        let transport = Arc::new(MockTransport::with_fallback(json!({})));
        let processor = processor(transport.clone());

        assert!(processor.process("refund", CommandData::new()).await.is_none());
        assert_eq!(transport.request_count().await, 0);
    }

    #[tokio::test]
    async fn known_commands_hit_their_endpoints() {
        let transport = Arc::new(MockTransport::with_fallback(json!({"success": true})));
        let processor = processor(transport.clone());

        for name in ["click", "signup", "conversion", "page_view", "custom"] {
            assert!(processor.process(name, CommandData::new()).await.is_some());
        }

        assert_eq!(
            transport.endpoints().await,
            vec!["clicks", "signup", "conversion", "page_view", "custom_event"]
        );
    }
}
