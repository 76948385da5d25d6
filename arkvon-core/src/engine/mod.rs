//! Attribution state machine
//!
//! The engine runs once per page load:
//!
//! ```text
//! UNINITIALIZED ──no public id──▶ HALTED
//!       │
//!       ▼
//!   RESOLVING ──stored or confirmed referral──▶ ATTRIBUTED ──┐
//!       │                                                    ├─▶ READY
//!       └──────────────otherwise───────────────▶ UNATTRIBUTED┘
//! ```
//!
//! On the way to READY it drains the buffered commands in order, switches
//! the [`PublicAgent`] to dispatch mode, hands the identity to the payment
//! annotator and records the page view.

mod referral;
mod state;

pub use referral::{REFERRAL_PARAMS, ReferralParam, detect_referral};
pub use state::AttributionState;

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::agent::PublicAgent;
use crate::command::{Command, CommandData, Endpoint, QueuedCommand};
use crate::config::{AgentConfig, ScriptAttributes};
use crate::context::AgentContext;
use crate::delivery::Transport;
use crate::events::AgentEvent;
use crate::payment::{PaymentAnnotator, PaymentSurface};
use crate::processor::CommandProcessor;
use crate::store::{ReferralData, TrackingData};

/// What resolution found, used for the landing-page flag
#[derive(Debug, Clone, Copy)]
struct Resolution {
    attributed: bool,
    prior_identity: bool,
    param_found: bool,
}

/// Drives one page load from UNINITIALIZED to READY (or HALTED)
pub struct AttributionEngine {
    context: Arc<AgentContext>,
    agent: PublicAgent,
    processor: Arc<CommandProcessor>,
    attributes: ScriptAttributes,
    annotator: Option<Arc<dyn PaymentAnnotator>>,
}

impl AttributionEngine {
    /// Create an engine and the agent handle it will activate
    pub fn new(
        context: Arc<AgentContext>,
        transport: Arc<dyn Transport>,
        attributes: ScriptAttributes,
    ) -> Self {
        let processor = Arc::new(CommandProcessor::new(context.clone(), transport));
        Self {
            agent: PublicAgent::new(context.clone()),
            context,
            processor,
            attributes,
            annotator: None,
        }
    }

    /// Hand the identity to `annotator` once READY
    #[must_use]
    pub fn with_annotator(mut self, annotator: Arc<dyn PaymentAnnotator>) -> Self {
        self.annotator = Some(annotator);
        self
    }

    /// Handle for callers; commands issued before [`run`](Self::run)
    /// finishes are buffered
    pub fn agent(&self) -> PublicAgent {
        self.agent.clone()
    }

    pub fn context(&self) -> &Arc<AgentContext> {
        &self.context
    }

    pub fn state(&self) -> AttributionState {
        self.context.state()
    }

    /// Run initialization to a terminal state and return it.
    ///
    /// Running an engine twice is a no-op that returns the current state.
    pub async fn run(&self) -> AttributionState {
        let current = self.context.state();
        if current != AttributionState::Uninitialized {
            warn!(state = %current, "Attribution engine already ran");
            return current;
        }

        info!("Initializing tracking agent");
        let config = match AgentConfig::resolve(
            self.context.settings(),
            &self.attributes,
            self.context.page(),
        ) {
            Ok(config) => config,
            Err(e) => {
                // The agent keeps buffering; nothing will ever drain it
                warn!(error = %e, "Tracking agent halted");
                self.context.set_state(AttributionState::Halted);
                self.context.emit(AgentEvent::Halted {
                    reason: e.to_string(),
                });
                return AttributionState::Halted;
            }
        };
        info!(
            public_id = %config.public_id,
            domain = %config.domain,
            "Configuration resolved"
        );
        self.context.install_config(config);

        self.context.set_state(AttributionState::Resolving);
        let resolution = self.resolve().await;

        if resolution.attributed {
            self.context.set_state(AttributionState::Attributed);
            if let Some(identity) = self.context.identity().await {
                self.context.emit(AgentEvent::Attributed { identity });
            }
        } else {
            self.context.set_state(AttributionState::Unattributed);
        }

        self.finish(resolution).await
    }

    async fn resolve(&self) -> Resolution {
        let store = self.context.store();
        let page = self.context.page();

        if store.has_attribution().await {
            info!("Loading existing tracking data from cookies");
            let data = ReferralData {
                referral_code: store.referral_code().await,
                tracking_data: store.tracking_data().await,
            };
            if let Some(param) = detect_referral(page) {
                warn!(
                    param = param.name,
                    code = %param.code,
                    "Stored attribution takes precedence, ignoring referral parameter"
                );
            }
            let attributed = data.is_active();
            self.context.adopt(data).await;
            return Resolution {
                attributed,
                prior_identity: true,
                param_found: false,
            };
        }

        let param = detect_referral(page).filter(|p| {
            if p.code.is_empty() {
                debug!(param = p.name, "Referral parameter has no value");
            }
            !p.code.is_empty()
        });
        let Some(param) = param else {
            debug!("No referral parameter on landing URL");
            return Resolution {
                attributed: false,
                prior_identity: false,
                param_found: false,
            };
        };

        info!(param = param.name, code = %param.code, "Found referral parameter");
        Resolution {
            attributed: self.register_click(param).await,
            prior_identity: false,
            param_found: true,
        }
    }

    /// Report the referral click; attribution is only adopted when the
    /// collector confirms it
    async fn register_click(&self, param: ReferralParam) -> bool {
        let page = self.context.page();
        let mut click = CommandData::new();
        click.insert("param_name".into(), Value::from(param.name));
        click.insert("referral_code".into(), Value::from(param.code.as_str()));
        click.insert("landing_page".into(), Value::from(page.href()));
        click.insert(
            "referrer_url".into(),
            page.referrer_opt().map_or(Value::Null, Value::from),
        );
        click.insert("user_agent".into(), Value::from(page.user_agent()));
        click.insert(
            "timestamp".into(),
            Value::from(AgentContext::now_millis()),
        );

        let response = self
            .processor
            .delivery()
            .send(Endpoint::Clicks, &click)
            .await;
        let Some(response) = response.filter(|r| r.success()) else {
            info!(code = %param.code, "Referral click not confirmed, continuing unattributed");
            return false;
        };

        let cookie_duration = response
            .cookie_duration()
            .unwrap_or(self.context.settings().default_cookie_days);
        let referral = response.referral_id().unwrap_or(param.code);
        let tracking = TrackingData {
            click_id: response.click_id(),
            referral_id: Some(referral.clone()),
            partner_id: response.partner_id(),
            campaign_id: response.campaign_id(),
            cookie_duration,
            created_at: AgentContext::now_millis(),
            customer_id: None,
        };

        self.context.attribute(&referral, tracking).await;
        info!(referral = %referral, days = cookie_duration, "Referral click tracked");
        true
    }

    async fn finish(&self, resolution: Resolution) -> AttributionState {
        let drained = self.drain().await;
        debug!(drained, "Buffered commands processed");

        self.annotate_payments().await;

        let landing_page = !resolution.prior_identity && !resolution.param_found;
        let mut page_view = CommandData::new();
        page_view.insert("is_landing_page".into(), Value::Bool(landing_page));
        self.processor.dispatch(Command::PageView, page_view).await;

        self.context.set_state(AttributionState::Ready);
        self.context.emit(AgentEvent::Ready {
            attributed: resolution.attributed,
            landing_page,
        });
        info!("Tracking agent ready");
        AttributionState::Ready
    }

    async fn drain(&self) -> usize {
        let mut drained = 0;
        while let Some(QueuedCommand { command, data }) =
            self.agent.next_or_activate(&self.processor).await
        {
            self.processor.process(&command, data).await;
            drained += 1;
        }
        drained
    }

    async fn annotate_payments(&self) {
        let Some(kind) = self.attributes.payment_type.as_deref() else {
            return;
        };
        let surface = match kind.parse::<PaymentSurface>() {
            Ok(surface) => surface,
            Err(e) => {
                warn!(error = %e, "Skipping payment integration");
                return;
            }
        };
        let Some(identity) = self.context.identity().await else {
            debug!(%surface, "No active referral, payment links left untouched");
            return;
        };
        match &self.annotator {
            Some(annotator) => {
                info!(%surface, "Setting up payment integration");
                let domain = self.attributes.payment_domain.as_deref();
                annotator.on_attributed(surface, &identity, domain);
            }
            None => debug!(%surface, "No payment annotator installed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::config::AgentSettings;
    use crate::delivery::MockTransport;
    use crate::page::PageContext;
    use crate::store::{MemoryCookieJar, ReferralIdentity};

    fn engine(url: &str, transport: Arc<MockTransport>) -> AttributionEngine {
        let page = PageContext::parse(url).unwrap();
        let context = Arc::new(AgentContext::new(
            AgentSettings::default(),
            page,
            Arc::new(MemoryCookieJar::new()),
        ));
        AttributionEngine::new(context, transport, ScriptAttributes::with_public_id("pub"))
    }

    #[tokio::test]
    async fn missing_public_id_halts() {
        let transport = Arc::new(MockTransport::with_fallback(json!({"success": true})));
        let page = PageContext::parse("https://example.com/?ref=X").unwrap();
        let context = Arc::new(AgentContext::new(
            AgentSettings::default(),
            page,
            Arc::new(MemoryCookieJar::new()),
        ));
        let engine = AttributionEngine::new(context, transport.clone(), ScriptAttributes::default());
        let agent = engine.agent();
        let mut events = agent.subscribe();

        assert_eq!(engine.run().await, AttributionState::Halted);
        assert_eq!(engine.state(), AttributionState::Halted);
        assert!(!agent.wait_ready().await);

        agent.click(CommandData::new()).await;
        assert_eq!(agent.pending().await, 1);
        assert_eq!(transport.request_count().await, 0);

        let mut halted = false;
        while let Ok(event) = events.try_recv() {
            halted |= matches!(event, AgentEvent::Halted { .. });
        }
        assert!(halted);
    }

    #[tokio::test]
    async fn second_run_is_a_no_op() {
        let transport = Arc::new(MockTransport::with_fallback(json!({"success": true})));
        let engine = engine("https://example.com/", transport.clone());

        assert_eq!(engine.run().await, AttributionState::Ready);
        let requests = transport.request_count().await;
        assert_eq!(engine.run().await, AttributionState::Ready);
        assert_eq!(transport.request_count().await, requests);
    }

    #[tokio::test]
    async fn empty_parameter_value_is_unattributed() {
        let transport = Arc::new(MockTransport::with_fallback(json!({"success": true})));
        let engine = engine("https://example.com/?ref=", transport.clone());

        engine.run().await;
        assert!(!engine.context().is_referral_user().await);
        assert!(transport.requests_to("clicks").await.is_empty());
        let page_view = &transport.requests_to("page_view").await[0].body;
        assert_eq!(page_view["is_landing_page"], true);
    }

    #[tokio::test]
    async fn unconfirmed_click_stays_unattributed() {
        let transport = Arc::new(MockTransport::new());
        transport.queue_response(json!({"success": false})).await;
        transport.queue_response(json!({"success": true})).await;
        let engine = engine("https://example.com/?via=V", transport.clone());
        let mut states = engine.context().watch_state();

        assert_eq!(engine.run().await, AttributionState::Ready);
        assert!(!engine.context().is_referral_user().await);
        assert!(!engine.context().store().has_attribution().await);
        assert_eq!(*states.borrow_and_update(), AttributionState::Ready);

        let page_view = &transport.requests_to("page_view").await[0].body;
        assert_eq!(page_view["is_landing_page"], false);
    }

    #[derive(Default)]
    struct RecordingAnnotator {
        calls: Mutex<Vec<(PaymentSurface, String, Option<String>)>>,
    }

    impl PaymentAnnotator for RecordingAnnotator {
        fn on_attributed(
            &self,
            surface: PaymentSurface,
            identity: &ReferralIdentity,
            processor_domain: Option<&str>,
        ) {
            self.calls.lock().unwrap().push((
                surface,
                identity.referral_code.clone(),
                processor_domain.map(str::to_string),
            ));
        }
    }

    #[tokio::test]
    async fn annotator_receives_identity() {
        let transport = Arc::new(MockTransport::with_fallback(
            json!({"success": true, "referral_id": "R9"}),
        ));
        let page = PageContext::parse("https://shop.example.com/?ref=abc").unwrap();
        let context = Arc::new(AgentContext::new(
            AgentSettings::default(),
            page,
            Arc::new(MemoryCookieJar::new()),
        ));
        let annotator = Arc::new(RecordingAnnotator::default());
        let attributes = ScriptAttributes::with_public_id("pub")
            .with_payment("stripe_links", Some("pay.example.com".into()));
        let engine = AttributionEngine::new(context, transport, attributes)
            .with_annotator(annotator.clone());

        engine.run().await;

        let calls = annotator.calls.lock().unwrap();
        assert_eq!(
            calls.as_slice(),
            &[(
                PaymentSurface::StripeLinks,
                "R9".to_string(),
                Some("pay.example.com".to_string())
            )]
        );
    }

    #[tokio::test]
    async fn annotator_skipped_without_referral_or_known_type() {
        let transport = Arc::new(MockTransport::with_fallback(json!({"success": true})));
        let annotator = Arc::new(RecordingAnnotator::default());

        for (url, kind) in [
            ("https://example.com/", "stripe_links"),
            ("https://example.com/?ref=abc", "square_terminal"),
        ] {
            let page = PageContext::parse(url).unwrap();
            let context = Arc::new(AgentContext::new(
                AgentSettings::default(),
                page,
                Arc::new(MemoryCookieJar::new()),
            ));
            let attributes = ScriptAttributes::with_public_id("pub").with_payment(kind, None);
            AttributionEngine::new(context, transport.clone(), attributes)
                .with_annotator(annotator.clone())
                .run()
                .await;
        }

        assert!(annotator.calls.lock().unwrap().is_empty());
    }
}
