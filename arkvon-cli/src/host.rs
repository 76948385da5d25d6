//! Headless page host: builds the page, cookie file and agent for a URL

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use arkvon_core::payment::{self, AnnotationKind};
use arkvon_core::{
    AgentContext, AttributionEngine, ElementObserver, FileCookieJar, HttpTransport, ObserverPolicy,
    PageContext, PaymentAnnotator, PaymentSurface, ReferralIdentity, ScriptAttributes,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::PageArgs;
use crate::config::load_settings;

/// Build the page context for `url` from the global flags
pub fn page(url: &str, args: &PageArgs) -> Result<PageContext> {
    let mut page = PageContext::parse(url)?;
    if let Some(referrer) = &args.referrer {
        page = page.with_referrer(referrer.as_str());
    }
    if let Some(user_agent) = &args.user_agent {
        page = page.with_user_agent(user_agent.as_str());
    }
    if let Some(title) = &args.title {
        page = page.with_title(title.as_str());
    }
    Ok(page)
}

/// Agent context for `url`, persisting cookies to the `--cookies` file
pub async fn context(url: &str, args: &PageArgs) -> Result<Arc<AgentContext>> {
    let settings = load_settings(args.config.as_deref())?;
    let page = page(url, args)?;
    let jar = FileCookieJar::load(&args.cookies)
        .await
        .with_context(|| format!("Failed to open cookie file {}", args.cookies.display()))?;
    Ok(Arc::new(AgentContext::new(settings, page, Arc::new(jar))))
}

/// Engine for `url` talking to the configured collector over HTTP, plus the
/// annotator that decorates the page's `--payment-link`s once READY
pub async fn engine(
    url: &str,
    public_id: &str,
    args: &PageArgs,
) -> Result<(AttributionEngine, Arc<LinkAnnotator>)> {
    let context = context(url, args).await?;
    let mut attributes = ScriptAttributes::with_public_id(public_id);
    if let Some(payment_type) = &args.payment_type {
        attributes = attributes.with_payment(payment_type.as_str(), args.payment_domain.clone());
    }

    let annotator = Arc::new(LinkAnnotator::new(
        args.payment_links.clone(),
        context.settings().observer,
    ));
    let engine = AttributionEngine::new(context, Arc::new(HttpTransport::new()), attributes)
        .with_annotator(annotator.clone());
    Ok((engine, annotator))
}

/// Annotates checkout links given on the command line and reports the
/// other surfaces a browser host would decorate
pub struct LinkAnnotator {
    links: Vec<String>,
    observer: ElementObserver,
    annotated: Arc<Mutex<Vec<String>>>,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl LinkAnnotator {
    pub fn new(links: Vec<String>, policy: ObserverPolicy) -> Self {
        Self {
            links,
            observer: ElementObserver::new(policy),
            annotated: Arc::default(),
            pending: Mutex::default(),
        }
    }

    /// Wait for link annotation to settle and return the rewritten links
    pub async fn finish(&self) -> Vec<String> {
        let pending = std::mem::take(&mut *lock(&self.pending));
        for task in pending {
            if let Err(e) = task.await {
                warn!(error = %e, "Payment link annotation task failed");
            }
        }
        lock(&self.annotated).clone()
    }

    fn annotate_links(&self, surface: PaymentSurface, code: &str, processor_domain: Option<&str>) {
        if self.links.is_empty() {
            info!(
                %surface,
                param = surface.tracking_param(),
                code,
                "No payment links given, a browser host would annotate them"
            );
            return;
        }

        let links = self.links.clone();
        let code = code.to_string();
        let domain = processor_domain.map(str::to_string);
        let observer = self.observer.clone();
        let annotated = self.annotated.clone();
        let task = tokio::spawn(async move {
            let found = observer
                .wait_for(|| {
                    links
                        .iter()
                        .filter(|href| surface.matches_link(href, domain.as_deref()))
                        .cloned()
                        .collect()
                })
                .await;
            let Some(found) = found else {
                info!(%surface, "No matching payment links");
                return;
            };
            for href in found {
                match surface.annotate_link(&href, &code) {
                    Some(link) => {
                        info!(%surface, from = %href, to = %link, "Annotated payment link");
                        lock(&annotated).push(link);
                    }
                    None => debug!(%surface, %href, "Payment link already annotated"),
                }
            }
        });
        lock(&self.pending).push(task);
    }
}

impl PaymentAnnotator for LinkAnnotator {
    fn on_attributed(
        &self,
        surface: PaymentSurface,
        identity: &ReferralIdentity,
        processor_domain: Option<&str>,
    ) {
        let code = identity.referral_code.as_str();
        match surface.kind() {
            AnnotationKind::Links => self.annotate_links(surface, code, processor_domain),
            AnnotationKind::Elements => info!(
                %surface,
                attributes = ?payment::ELEMENT_ATTRIBUTES,
                code,
                "Payment elements would carry the referral"
            ),
            AnnotationKind::Forms => info!(
                %surface,
                field = payment::HIDDEN_FIELD,
                code,
                "Payment forms would carry the referral"
            ),
            AnnotationKind::Buttons => info!(
                %surface,
                attribute = payment::BUTTON_ATTRIBUTE,
                code,
                "Payment buttons would carry the referral"
            ),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn args() -> PageArgs {
        PageArgs {
            cookies: PathBuf::from("unused.json"),
            config: None,
            referrer: Some("https://news.example.org/".into()),
            user_agent: Some("arkvon-test".into()),
            title: Some("Home".into()),
            payment_type: None,
            payment_domain: None,
            payment_links: Vec::new(),
        }
    }

    fn identity(code: &str) -> ReferralIdentity {
        ReferralIdentity::from_parts(code, None).unwrap()
    }

    fn quick_policy() -> ObserverPolicy {
        ObserverPolicy {
            interval: std::time::Duration::from_millis(1),
            max_attempts: 2,
        }
    }

    #[test]
    fn page_applies_flags() {
        let page = page("https://shop.example.com/?ref=A", &args()).unwrap();
        assert_eq!(page.referrer(), "https://news.example.org/");
        assert_eq!(page.user_agent(), "arkvon-test");
        assert_eq!(page.title(), "Home");
        assert_eq!(page.cookie_domain(), "example.com");
    }

    #[test]
    fn page_rejects_bad_url() {
        assert!(page("not a url", &args()).is_err());
    }

    #[tokio::test]
    async fn annotates_links_on_the_processor_domain() {
        let annotator = LinkAnnotator::new(
            vec![
                "https://buy.stripe.com/abc".into(),
                "https://pay.example.com/plan?x=1".into(),
                "https://blog.example.com/".into(),
            ],
            quick_policy(),
        );

        annotator.on_attributed(
            PaymentSurface::StripeLinks,
            &identity("R1"),
            Some("pay.example.com"),
        );

        assert_eq!(
            annotator.finish().await,
            vec![
                "https://buy.stripe.com/abc?client_reference_id=R1".to_string(),
                "https://pay.example.com/plan?x=1&client_reference_id=R1".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn custom_domain_is_ignored_without_payment_domain() {
        let annotator =
            LinkAnnotator::new(vec!["https://pay.example.com/plan".into()], quick_policy());
        annotator.on_attributed(PaymentSurface::StripeLinks, &identity("R1"), None);
        assert!(annotator.finish().await.is_empty());
    }

    #[tokio::test]
    async fn non_link_surfaces_spawn_nothing() {
        let annotator =
            LinkAnnotator::new(vec!["https://buy.stripe.com/abc".into()], quick_policy());
        annotator.on_attributed(PaymentSurface::PaymentForms, &identity("R1"), None);
        assert!(lock(&annotator.pending).is_empty());
        assert!(annotator.finish().await.is_empty());
    }
}
