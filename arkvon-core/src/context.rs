//! Shared state for one page load
//!
//! [`AgentContext`] replaces the page-global variables a script agent would
//! keep. It is created before initialization starts and dropped when the
//! page goes away.
//!
//! # Invariants
//! - [`AgentConfig`] is installed at most once and never changes afterwards.
//! - Only the attribution engine, the signup-success path and the explicit
//!   utility calls write referral state.
//! - Writes to the durable store are serialized: a write to the store and
//!   the matching in-memory update happen under one lock, so the last write
//!   wins and no two writes interleave.

use std::sync::{Arc, OnceLock};

use chrono::Utc;
use tokio::sync::{Mutex, RwLock, broadcast, watch};
use tracing::{debug, info, warn};

use crate::config::{AgentConfig, AgentSettings};
use crate::engine::AttributionState;
use crate::error::StoreError;
use crate::events::{AgentEvent, EVENT_CHANNEL_CAPACITY};
use crate::page::PageContext;
use crate::store::{AttributionStore, CookieJar, ReferralData, ReferralIdentity, TrackingData};

/// Process-wide state shared by the engine, processor and delivery client
pub struct AgentContext {
    settings: AgentSettings,
    page: PageContext,
    store: AttributionStore,
    config: OnceLock<AgentConfig>,
    referral: RwLock<ReferralData>,
    write_lock: Mutex<()>,
    events: broadcast::Sender<AgentEvent>,
    state: watch::Sender<AttributionState>,
}

impl AgentContext {
    /// Create the context for `page`, persisting through `jar`
    pub fn new(settings: AgentSettings, page: PageContext, jar: Arc<dyn CookieJar>) -> Self {
        let store = AttributionStore::for_domain(jar, Some(page.cookie_domain()), page.is_secure());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (state, _) = watch::channel(AttributionState::default());

        Self {
            settings,
            page,
            store,
            config: OnceLock::new(),
            referral: RwLock::new(ReferralData::default()),
            write_lock: Mutex::new(()),
            events,
            state,
        }
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn page(&self) -> &PageContext {
        &self.page
    }

    pub fn store(&self) -> &AttributionStore {
        &self.store
    }

    /// Resolved configuration; `None` until initialization resolves it
    pub fn config(&self) -> Option<&AgentConfig> {
        self.config.get()
    }

    /// Install the resolved configuration. Returns `false` if one was already set.
    pub fn install_config(&self, config: AgentConfig) -> bool {
        self.config.set(config).is_ok()
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.events.subscribe()
    }

    /// Current attribution state
    pub fn state(&self) -> AttributionState {
        *self.state.borrow()
    }

    /// Watch the attribution state
    pub fn watch_state(&self) -> watch::Receiver<AttributionState> {
        self.state.subscribe()
    }

    pub(crate) fn set_state(&self, next: AttributionState) {
        let previous = self.state.send_replace(next);
        if !previous.can_transition_to(next) {
            warn!(%previous, %next, "Unexpected attribution state transition");
        }
        debug!(%previous, %next, "Attribution state changed");
        self.emit(AgentEvent::StateChanged { state: next });
    }

    pub(crate) fn emit(&self, event: AgentEvent) {
        // No listeners is fine
        let _ = self.events.send(event);
    }

    /// Current in-memory referral state
    pub async fn referral_data(&self) -> ReferralData {
        self.referral.read().await.clone()
    }

    /// Active referral code, if any
    pub async fn referral_code(&self) -> Option<String> {
        self.referral
            .read()
            .await
            .referral_code
            .clone()
            .filter(|c| !c.is_empty())
    }

    pub async fn is_referral_user(&self) -> bool {
        self.referral.read().await.is_active()
    }

    pub async fn identity(&self) -> Option<ReferralIdentity> {
        self.referral.read().await.identity()
    }

    /// Adopt state loaded from the store without writing it back
    pub(crate) async fn adopt(&self, data: ReferralData) {
        let _guard = self.write_lock.lock().await;
        *self.referral.write().await = data;
    }

    /// Persist a freshly attributed referral and make it active.
    ///
    /// The in-memory state is updated even if the store write fails, so the
    /// current page load stays attributed.
    pub(crate) async fn attribute(&self, code: &str, tracking: TrackingData) {
        let ttl = tracking.cookie_duration;
        let _guard = self.write_lock.lock().await;

        if let Err(e) = self.store.write_referral(code, ttl).await {
            warn!(error = %e, "Failed to persist referral code");
        }
        if let Err(e) = self.store.write_tracking_data(&tracking, ttl).await {
            warn!(error = %e, "Failed to persist tracking data");
        }

        *self.referral.write().await = ReferralData {
            referral_code: Some(code.to_string()),
            tracking_data: Some(tracking),
        };
    }

    /// Attach a customer id to the tracking data and re-persist it.
    ///
    /// Returns `false` when there is no tracking data to attach it to.
    pub(crate) async fn record_customer(&self, customer_id: &str) -> bool {
        let _guard = self.write_lock.lock().await;
        let mut referral = self.referral.write().await;

        let Some(tracking) = referral.tracking_data.as_mut() else {
            debug!(customer_id, "No tracking data to attach customer to");
            return false;
        };
        tracking.customer_id = Some(customer_id.to_string());

        if let Err(e) = self
            .store
            .write_tracking_data(tracking, self.settings.signup_cookie_days)
            .await
        {
            warn!(error = %e, "Failed to persist customer id");
        }
        true
    }

    /// Manually set the referral code for `days`
    pub async fn set_referral(&self, code: &str, days: u32) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.store.write_referral(code, days).await?;
        self.referral.write().await.referral_code = Some(code.to_string());
        info!(referral = code, days, "Manually set referral");
        Ok(())
    }

    /// Forget all attribution, in memory and in the store
    pub async fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        *self.referral.write().await = ReferralData::default();
        self.store.clear().await?;
        info!("Tracking data cleared");
        Ok(())
    }

    /// Milliseconds since the Unix epoch, as sent in `timestamp`
    pub fn now_millis() -> i64 {
        Utc::now().timestamp_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCookieJar;

    fn context() -> AgentContext {
        let page = PageContext::parse("https://www.example.com/").unwrap();
        AgentContext::new(
            AgentSettings::default(),
            page,
            Arc::new(MemoryCookieJar::new()),
        )
    }

    fn tracking(days: u32) -> TrackingData {
        TrackingData {
            click_id: Some("c1".into()),
            referral_id: Some("R1".into()),
            partner_id: None,
            campaign_id: None,
            cookie_duration: days,
            created_at: AgentContext::now_millis(),
            customer_id: None,
        }
    }

    #[test]
    fn store_is_scoped_to_page_domain() {
        let ctx = context();
        assert_eq!(ctx.store().options().domain.as_deref(), Some("example.com"));
        assert!(ctx.store().options().secure);
    }

    #[test]
    fn state_changes_are_broadcast() {
        let ctx = context();
        let mut rx = ctx.subscribe();
        assert_eq!(ctx.state(), AttributionState::Uninitialized);

        ctx.set_state(AttributionState::Resolving);
        assert_eq!(ctx.state(), AttributionState::Resolving);
        assert_eq!(
            rx.try_recv().unwrap(),
            AgentEvent::StateChanged {
                state: AttributionState::Resolving
            }
        );
    }

    #[test]
    fn config_installs_once() {
        let ctx = context();
        assert!(ctx.config().is_none());

        let config = AgentConfig {
            public_id: "pub".into(),
            domain: "example.com".into(),
            api_base_url: "https://c".into(),
        };
        assert!(ctx.install_config(config.clone()));
        assert!(!ctx.install_config(config));
        assert_eq!(ctx.config().unwrap().public_id, "pub");
    }

    #[tokio::test]
    async fn attribute_persists_and_activates() {
        let ctx = context();
        ctx.attribute("R1", tracking(14)).await;

        assert!(ctx.is_referral_user().await);
        assert_eq!(ctx.store().referral_code().await.as_deref(), Some("R1"));
        assert_eq!(ctx.store().tracking_data().await.unwrap().cookie_duration, 14);
    }

    #[tokio::test]
    async fn record_customer_needs_tracking_data() {
        let ctx = context();
        assert!(!ctx.record_customer("cus_1").await);

        ctx.attribute("R1", tracking(30)).await;
        assert!(ctx.record_customer("cus_1").await);

        let stored = ctx.store().tracking_data().await.unwrap();
        assert_eq!(stored.customer_id.as_deref(), Some("cus_1"));
        let data = ctx.referral_data().await;
        assert_eq!(
            data.tracking_data.unwrap().customer_id.as_deref(),
            Some("cus_1")
        );
    }

    #[tokio::test]
    async fn set_referral_then_clear() {
        let ctx = context();
        ctx.set_referral("MANUAL", 7).await.unwrap();
        assert_eq!(ctx.referral_code().await.as_deref(), Some("MANUAL"));
        assert_eq!(ctx.store().referral_code().await.as_deref(), Some("MANUAL"));

        ctx.clear().await.unwrap();
        assert!(!ctx.is_referral_user().await);
        assert_eq!(ctx.referral_code().await, None);
        assert!(!ctx.store().has_attribution().await);
    }
}
