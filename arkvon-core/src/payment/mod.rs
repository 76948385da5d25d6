//! Payment-surface annotation
//!
//! Once a referral is active, checkout links and widgets on the page carry
//! the referral code so the payment processor can report it back. The
//! page-side work belongs to a [`PaymentAnnotator`]; this module defines the
//! surfaces and the exact names each one uses.

mod observer;

pub use observer::{ElementObserver, ObserverPolicy};

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::store::ReferralIdentity;

/// Attributes set on embedded payment elements
pub const ELEMENT_ATTRIBUTES: [&str; 3] = ["client-reference-id", "data-referral", "data-arkvon-ref"];

/// Hidden field added to payment forms
pub const HIDDEN_FIELD: &str = "arkvon_referral";

/// Attribute set on payment buttons
pub const BUTTON_ATTRIBUTE: &str = "data-arkvon-referral";

/// Supported payment integrations (`data-payment-type`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentSurface {
    StripeLinks,
    StripeElements,
    PaypalButtons,
    PaypalLinks,
    PaymentForms,
}

/// How a surface is annotated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationKind {
    /// Append a query parameter to matching links
    Links,
    /// Set [`ELEMENT_ATTRIBUTES`] on embedded elements
    Elements,
    /// Add a [`HIDDEN_FIELD`] input to forms
    Forms,
    /// Set [`BUTTON_ATTRIBUTE`] on buttons
    Buttons,
}

impl PaymentSurface {
    pub const ALL: [PaymentSurface; 5] = [
        Self::StripeLinks,
        Self::StripeElements,
        Self::PaypalButtons,
        Self::PaypalLinks,
        Self::PaymentForms,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::StripeLinks => "stripe_links",
            Self::StripeElements => "stripe_elements",
            Self::PaypalButtons => "paypal_buttons",
            Self::PaypalLinks => "paypal_links",
            Self::PaymentForms => "payment_forms",
        }
    }

    /// Query parameter the processor echoes back to the collector
    pub fn tracking_param(&self) -> &'static str {
        match self {
            Self::StripeLinks => "client_reference_id",
            Self::PaypalLinks => "custom",
            Self::PaymentForms => "ref",
            Self::StripeElements | Self::PaypalButtons => "arkvon_ref",
        }
    }

    /// CSS selector a browser host uses to find this surface's elements.
    ///
    /// `processor_domain` widens the Stripe link match to a custom checkout
    /// domain.
    pub fn selector(&self, processor_domain: Option<&str>) -> String {
        match self {
            Self::StripeLinks => {
                let stock = r#"a[href*="buy.stripe.com"], a[href*="checkout.stripe.com"]"#;
                match processor_domain.filter(|d| !d.is_empty()) {
                    Some(domain) => format!(r#"a[href*="{domain}"], {stock}"#),
                    None => stock.to_string(),
                }
            }
            Self::StripeElements => "stripe-pricing-table, stripe-buy-button".to_string(),
            Self::PaypalButtons => ".paypal-buttons, [data-paypal-button]".to_string(),
            Self::PaypalLinks => r#"a[href*="paypal.com/checkout"], a[href*="paypal.me"]"#.to_string(),
            Self::PaymentForms => {
                "form[action*='checkout'], form[action*='payment'], form[action*='subscribe']"
                    .to_string()
            }
        }
    }

    /// Whether `href` is a checkout link for this surface. Always `false`
    /// for surfaces that are not annotated through links.
    pub fn matches_link(&self, href: &str, processor_domain: Option<&str>) -> bool {
        let patterns: &[&str] = match self {
            Self::StripeLinks => &["buy.stripe.com", "checkout.stripe.com"],
            Self::PaypalLinks => &["paypal.com/checkout", "paypal.me"],
            _ => return false,
        };
        let custom = match self {
            Self::StripeLinks => processor_domain.filter(|d| !d.is_empty()),
            _ => None,
        };
        patterns.iter().any(|p| href.contains(p)) || custom.is_some_and(|d| href.contains(d))
    }

    pub fn kind(&self) -> AnnotationKind {
        match self {
            Self::StripeLinks | Self::PaypalLinks => AnnotationKind::Links,
            Self::StripeElements => AnnotationKind::Elements,
            Self::PaymentForms => AnnotationKind::Forms,
            Self::PaypalButtons => AnnotationKind::Buttons,
        }
    }

    /// Add the tracking parameter to `href`.
    ///
    /// Returns `None` when the link already carries the parameter. The
    /// parameter goes before any fragment.
    pub fn annotate_link(&self, href: &str, code: &str) -> Option<String> {
        let param = self.tracking_param();
        let (base, fragment) = match href.split_once('#') {
            Some((base, fragment)) => (base, Some(fragment)),
            None => (href, None),
        };

        if let Some((_, query)) = base.split_once('?')
            && query
                .split('&')
                .any(|pair| pair.split('=').next() == Some(param))
        {
            return None;
        }

        let separator = if base.contains('?') { '&' } else { '?' };
        let mut annotated = format!("{base}{separator}{param}={}", urlencoding::encode(code));
        if let Some(fragment) = fragment {
            annotated.push('#');
            annotated.push_str(fragment);
        }
        Some(annotated)
    }
}

impl fmt::Display for PaymentSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PaymentSurface {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|surface| surface.name() == s)
            .ok_or_else(|| ConfigError::UnknownPaymentType(s.to_string()))
    }
}

/// Page-side collaborator that decorates payment surfaces.
///
/// Called once at READY when a payment type is configured and a referral is
/// active, with the processor domain from `data-payment-domain`.
/// Implementations that need to wait for late-rendered elements own an
/// [`ElementObserver`] for that.
pub trait PaymentAnnotator: Send + Sync {
    fn on_attributed(
        &self,
        surface: PaymentSurface,
        identity: &ReferralIdentity,
        processor_domain: Option<&str>,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_surfaces() {
        for surface in PaymentSurface::ALL {
            assert_eq!(surface.name().parse::<PaymentSurface>().unwrap(), surface);
        }
        let err = "square".parse::<PaymentSurface>().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPaymentType(ref s) if s == "square"));
    }

    #[test]
    fn tracking_params_per_surface() {
        assert_eq!(PaymentSurface::StripeLinks.tracking_param(), "client_reference_id");
        assert_eq!(PaymentSurface::PaypalLinks.tracking_param(), "custom");
        assert_eq!(PaymentSurface::PaymentForms.tracking_param(), "ref");
        assert_eq!(PaymentSurface::StripeElements.tracking_param(), "arkvon_ref");
        assert_eq!(PaymentSurface::PaypalButtons.tracking_param(), "arkvon_ref");
    }

    #[test]
    fn annotates_links() {
        let stripe = PaymentSurface::StripeLinks;
        assert_eq!(
            stripe.annotate_link("https://buy.stripe.com/abc", "R 1").as_deref(),
            Some("https://buy.stripe.com/abc?client_reference_id=R%201")
        );
        assert_eq!(
            stripe.annotate_link("https://buy.stripe.com/abc?x=1#pay", "R1").as_deref(),
            Some("https://buy.stripe.com/abc?x=1&client_reference_id=R1#pay")
        );
    }

    #[test]
    fn leaves_annotated_links_alone() {
        let paypal = PaymentSurface::PaypalLinks;
        assert_eq!(paypal.annotate_link("https://paypal.me/x?custom=R1", "R2"), None);
        assert!(paypal.annotate_link("https://paypal.me/x?customer=1", "R2").is_some());
    }

    #[test]
    fn link_matching_honours_processor_domain() {
        let stripe = PaymentSurface::StripeLinks;
        assert!(stripe.matches_link("https://buy.stripe.com/abc", None));
        assert!(!stripe.matches_link("https://pay.example.com/abc", None));
        assert!(stripe.matches_link("https://pay.example.com/abc", Some("pay.example.com")));
        assert!(!stripe.matches_link("https://pay.example.com/abc", Some("")));

        let paypal = PaymentSurface::PaypalLinks;
        assert!(paypal.matches_link("https://paypal.me/shop", None));
        assert!(!paypal.matches_link("https://pay.example.com/", Some("pay.example.com")));
        assert!(!PaymentSurface::PaymentForms.matches_link("https://buy.stripe.com/x", None));
    }

    #[test]
    fn stripe_selector_includes_processor_domain() {
        let selector = PaymentSurface::StripeLinks.selector(Some("pay.example.com"));
        assert!(selector.starts_with(r#"a[href*="pay.example.com"], "#));
        assert!(selector.contains("checkout.stripe.com"));
        assert!(!PaymentSurface::StripeLinks.selector(None).contains("example"));
    }

    #[test]
    fn surface_kinds() {
        assert_eq!(PaymentSurface::StripeLinks.kind(), AnnotationKind::Links);
        assert_eq!(PaymentSurface::StripeElements.kind(), AnnotationKind::Elements);
        assert_eq!(PaymentSurface::PaymentForms.kind(), AnnotationKind::Forms);
        assert_eq!(PaymentSurface::PaypalButtons.kind(), AnnotationKind::Buttons);
    }
}
