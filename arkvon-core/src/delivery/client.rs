//! Delivery of event records with bounded retry

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::{CollectorResponse, EventRecord, RetryPolicy, Transport};
use crate::command::{CommandData, Endpoint};
use crate::context::AgentContext;
use crate::error::DeliveryError;

/// Sends one record per call, retrying failed attempts with backoff
pub struct DeliveryClient {
    context: Arc<AgentContext>,
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl DeliveryClient {
    /// Create a client using the retry policy from the context settings
    pub fn new(context: Arc<AgentContext>, transport: Arc<dyn Transport>) -> Self {
        let policy = context.settings().retry;
        Self {
            context,
            transport,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Deliver `payload` to `endpoint`.
    ///
    /// Never fails: exhausted retries and disabled delivery resolve to `None`
    /// after logging.
    pub async fn send(&self, endpoint: Endpoint, payload: &CommandData) -> Option<CollectorResponse> {
        match self.try_send(endpoint, payload).await {
            Ok(response) => Some(response),
            Err(DeliveryError::Disabled) => {
                warn!(%endpoint, "Public ID or domain missing. API calls disabled.");
                None
            }
            Err(e) => {
                error!(%endpoint, error = %e, "All API attempts failed");
                None
            }
        }
    }

    /// Deliver `payload`, reporting the last attempt's error
    pub async fn try_send(
        &self,
        endpoint: Endpoint,
        payload: &CommandData,
    ) -> Result<CollectorResponse, DeliveryError> {
        let config = self
            .context
            .config()
            .filter(|c| c.is_deliverable())
            .ok_or(DeliveryError::Disabled)?;
        let url = config.endpoint_url(endpoint.path());

        let mut attempt = 1;
        loop {
            debug!(%endpoint, attempt, "API call");

            // Rebuilt per attempt so timestamp and referral state are current
            let referral_code = self.context.referral_code().await;
            let record = EventRecord::build(
                payload,
                config,
                self.context.page(),
                referral_code.as_deref(),
                AgentContext::now_millis(),
            );

            match self.transport.post(&url, &record).await {
                Ok(body) => {
                    let response = CollectorResponse::new(body);
                    debug!(%endpoint, attempt, "API call successful");
                    self.apply_side_effects(endpoint, &response).await;
                    return Ok(response);
                }
                Err(e) => {
                    warn!(%endpoint, attempt, error = %e, "API call failed");
                    if !e.is_retryable() || !self.policy.should_retry(attempt) {
                        return Err(e);
                    }
                    tokio::time::sleep(self.policy.delay_after(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn apply_side_effects(&self, endpoint: Endpoint, response: &CollectorResponse) {
        match endpoint {
            Endpoint::Signup => {
                if let Some(customer_id) = response.customer_id()
                    && self.context.record_customer(&customer_id).await
                {
                    info!(customer_id, "Customer linked to referral");
                }
            }
            Endpoint::Conversion => {
                if let Some(commission) = response.commission_earned() {
                    info!(%commission, "Commission tracked");
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::command::data_from;
    use crate::config::{AgentConfig, AgentSettings};
    use crate::delivery::MockTransport;
    use crate::page::PageContext;
    use crate::store::{MemoryCookieJar, TrackingData};

    fn context(configured: bool) -> Arc<AgentContext> {
        let page = PageContext::parse("https://app.example.com/").unwrap();
        let ctx = AgentContext::new(
            AgentSettings::default(),
            page,
            Arc::new(MemoryCookieJar::new()),
        );
        if configured {
            ctx.install_config(AgentConfig {
                public_id: "pub_1".into(),
                domain: "example.com".into(),
                api_base_url: "https://collector.test/v1".into(),
            });
        }
        Arc::new(ctx)
    }

    #[tokio::test]
    async fn unconfigured_client_fails_fast() {
        let transport = Arc::new(MockTransport::with_fallback(json!({"success": true})));
        let client = DeliveryClient::new(context(false), transport.clone());

        assert!(client.send(Endpoint::PageView, &CommandData::new()).await.is_none());
        assert_eq!(transport.request_count().await, 0);
    }

    #[tokio::test]
    async fn posts_to_endpoint_url() {
        let transport = Arc::new(MockTransport::new());
        transport.queue_response(json!({"ok": 1})).await;
        let client = DeliveryClient::new(context(true), transport.clone());

        let response = client
            .send(Endpoint::CustomEvent, &data_from(json!({"event_name": "x"})))
            .await
            .unwrap();

        assert_eq!(response.get("ok"), Some(&json!(1)));
        let requests = transport.requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "https://collector.test/v1/custom_event");
        assert_eq!(requests[0].body["event_name"], "x");
        assert_eq!(requests[0].body["public_id"], "pub_1");
    }

    #[tokio::test(start_paused = true)]
    async fn retries_with_exponential_backoff() {
        let transport = Arc::new(MockTransport::new());
        transport.queue_status(500).await;
        transport
            .queue_failure(DeliveryError::NetworkFailure("reset".into()))
            .await;
        transport.queue_response(json!({"success": true})).await;
        let client = DeliveryClient::new(context(true), transport.clone());

        let response = client.send(Endpoint::Clicks, &CommandData::new()).await;
        assert!(response.unwrap().success());

        let requests = transport.requests().await;
        assert_eq!(requests.len(), 3);
        assert!(requests[1].at - requests[0].at >= Duration::from_secs(2));
        assert!(requests[2].at - requests[1].at >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_three_attempts() {
        let transport = Arc::new(MockTransport::new());
        let client = DeliveryClient::new(context(true), transport.clone());

        let result = client.try_send(Endpoint::Signup, &CommandData::new()).await;
        assert!(matches!(result, Err(DeliveryError::NetworkFailure(_))));
        assert_eq!(transport.request_count().await, 3);

        assert!(client.send(Endpoint::Signup, &CommandData::new()).await.is_none());
        assert_eq!(transport.request_count().await, 6);
    }

    #[tokio::test]
    async fn active_referral_is_stamped_on_records() {
        let ctx = context(true);
        ctx.set_referral("R1", 30).await.unwrap();
        let transport = Arc::new(MockTransport::with_fallback(json!({})));
        let client = DeliveryClient::new(ctx, transport.clone());

        client.send(Endpoint::PageView, &CommandData::new()).await;
        assert_eq!(transport.requests().await[0].body["referral_code"], "R1");
    }

    #[tokio::test]
    async fn signup_customer_id_is_persisted() {
        let ctx = context(true);
        ctx.attribute(
            "R1",
            TrackingData {
                click_id: None,
                referral_id: Some("R1".into()),
                partner_id: None,
                campaign_id: None,
                cookie_duration: 30,
                created_at: 0,
                customer_id: None,
            },
        )
        .await;

        let transport = Arc::new(MockTransport::new());
        transport
            .queue_response(json!({"success": true, "customer_id": "cus_9"}))
            .await;
        let client = DeliveryClient::new(ctx.clone(), transport);

        client.send(Endpoint::Signup, &CommandData::new()).await;

        let stored = ctx.store().tracking_data().await.unwrap();
        assert_eq!(stored.customer_id.as_deref(), Some("cus_9"));
    }

    #[tokio::test]
    async fn customer_id_on_other_endpoints_is_ignored() {
        let ctx = context(true);
        let transport = Arc::new(MockTransport::with_fallback(json!({"customer_id": "cus_9"})));
        let client = DeliveryClient::new(ctx.clone(), transport);

        client.send(Endpoint::Conversion, &CommandData::new()).await;
        assert!(ctx.referral_data().await.tracking_data.is_none());
    }
}
