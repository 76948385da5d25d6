//! Referral parameter detection on the landing URL

use crate::page::PageContext;

/// Query parameters carrying a referral code, highest priority first
pub const REFERRAL_PARAMS: [&str; 14] = [
    "arkvon",
    "ref",
    "referral",
    "aff",
    "affiliate",
    "partner",
    "via",
    "utm_source",
    "source",
    "lmref",
    "fpr",
    "tap_s",
    "afmc",
    "promo",
];

/// The winning referral parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferralParam {
    pub name: &'static str,
    /// Raw value; may be empty
    pub code: String,
}

/// First parameter of [`REFERRAL_PARAMS`] present on the page URL.
///
/// Priority comes from the list, not from the order in the URL.
pub fn detect_referral(page: &PageContext) -> Option<ReferralParam> {
    REFERRAL_PARAMS
        .iter()
        .find(|name| page.has_param(name))
        .map(|name| ReferralParam {
            name,
            code: page.param(name).unwrap_or_default(),
        })
}
