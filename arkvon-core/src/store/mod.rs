//! Durable attribution storage
//!
//! Two logical keys live in cookies: [`REFERRAL_COOKIE`] (raw referral code)
//! and [`DATA_COOKIE`] (JSON tracking metadata), each with its own lifetime.

mod attribution;
mod jar;
mod types;

pub use attribution::{AttributionStore, CookieOptions, SameSite, StoreValue};
pub use jar::{
    COOKIE_DATE_FORMAT, CookieEntry, CookieJar, FileCookieJar, MemoryCookieJar, ParsedCookie,
    format_cookie_date, parse_cookie_date,
};
pub(crate) use types::opt_id;
pub use types::{
    DATA_COOKIE, REFERRAL_COOKIE, ReferralData, ReferralIdentity, StoredValue, TrackingData,
};
