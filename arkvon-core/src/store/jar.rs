//! Cookie jars backing the attribution store
//!
//! A jar mirrors `document.cookie`: reads return the `a=1; b=2` header of
//! live cookies, writes take a Set-Cookie style string. An `expires` in the
//! past (or `max-age<=0`) deletes the cookie.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::StoreError;

/// Format of the `expires` attribute (`Thu, 01 Jan 1970 00:00:00 GMT`)
pub const COOKIE_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Persistence medium for cookies
#[async_trait]
pub trait CookieJar: Send + Sync {
    /// All live cookies as `name=value` pairs joined by `"; "`
    async fn cookie_header(&self) -> String;

    /// Apply a Set-Cookie style string
    async fn set_cookie(&self, set_cookie: &str) -> Result<(), StoreError>;
}

/// A single stored cookie
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CookieEntry {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    /// `None` for session cookies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
}

fn default_path() -> String {
    "/".to_string()
}

impl CookieEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|at| at <= now)
    }
}

/// A Set-Cookie string split into name and entry
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCookie {
    pub name: String,
    pub entry: CookieEntry,
}

impl ParsedCookie {
    /// Parse `name=value;attr=...;flag`. Unknown attributes are ignored.
    pub fn parse(set_cookie: &str) -> Option<Self> {
        let mut parts = set_cookie.split(';');
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut entry = CookieEntry {
            value: value.trim().to_string(),
            domain: None,
            path: default_path(),
            secure: false,
            expires: None,
        };
        let mut max_age = None;

        for attribute in parts {
            let (key, val) = match attribute.split_once('=') {
                Some((k, v)) => (k.trim(), v.trim()),
                None => (attribute.trim(), ""),
            };
            match key.to_ascii_lowercase().as_str() {
                "expires" => entry.expires = parse_cookie_date(val),
                "max-age" => max_age = val.parse::<i64>().ok(),
                "domain" if !val.is_empty() => entry.domain = Some(val.to_string()),
                "path" if !val.is_empty() => entry.path = val.to_string(),
                "secure" => entry.secure = true,
                _ => {}
            }
        }

        // max-age wins over expires
        if let Some(seconds) = max_age {
            entry.expires = Some(Utc::now() + Duration::seconds(seconds));
        }

        Some(Self {
            name: name.to_string(),
            entry,
        })
    }
}

/// Render a timestamp for the `expires` attribute
pub fn format_cookie_date(at: DateTime<Utc>) -> String {
    at.format(COOKIE_DATE_FORMAT).to_string()
}

/// Parse an `expires` attribute; accepts a `GMT` or `UTC` suffix
pub fn parse_cookie_date(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw
        .trim()
        .trim_end_matches("GMT")
        .trim_end_matches("UTC")
        .trim_end();
    NaiveDateTime::parse_from_str(trimmed, "%a, %d %b %Y %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Name-keyed cookie table shared by the jar implementations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
struct CookieTable(BTreeMap<String, CookieEntry>);

impl CookieTable {
    /// Apply a write; returns whether the table changed
    fn apply(&mut self, set_cookie: &str) -> bool {
        let Some(parsed) = ParsedCookie::parse(set_cookie) else {
            debug!(set_cookie, "Ignoring malformed cookie write");
            return false;
        };

        if parsed.entry.is_expired(Utc::now()) {
            self.0.remove(&parsed.name).is_some()
        } else {
            self.0.insert(parsed.name, parsed.entry);
            true
        }
    }

    fn header(&self) -> String {
        let now = Utc::now();
        self.0
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(name, entry)| format!("{}={}", name, entry.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn get(&self, name: &str) -> Option<&CookieEntry> {
        self.0.get(name).filter(|e| !e.is_expired(Utc::now()))
    }
}

/// In-memory jar with browser expiry semantics
#[derive(Debug, Default)]
pub struct MemoryCookieJar {
    cookies: RwLock<CookieTable>,
}

impl MemoryCookieJar {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a live cookie
    pub async fn entry(&self, name: &str) -> Option<CookieEntry> {
        self.cookies.read().await.get(name).cloned()
    }

    /// Number of stored cookies, expired ones included
    pub async fn len(&self) -> usize {
        self.cookies.read().await.0.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CookieJar for MemoryCookieJar {
    async fn cookie_header(&self) -> String {
        self.cookies.read().await.header()
    }

    async fn set_cookie(&self, set_cookie: &str) -> Result<(), StoreError> {
        self.cookies.write().await.apply(set_cookie);
        Ok(())
    }
}

/// File-backed jar so attribution survives across processes
pub struct FileCookieJar {
    cookies: RwLock<CookieTable>,
    file_path: PathBuf,
}

impl FileCookieJar {
    /// Load cookies from `file_path`, or start empty when it does not exist
    pub async fn load(file_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let file_path = file_path.as_ref().to_path_buf();

        let cookies = if fs::try_exists(&file_path).await? {
            let content = fs::read_to_string(&file_path).await?;
            serde_json::from_str(&content).unwrap_or_default()
        } else {
            CookieTable::default()
        };

        Ok(Self {
            cookies: RwLock::new(cookies),
            file_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Look up a live cookie
    pub async fn entry(&self, name: &str) -> Option<CookieEntry> {
        self.cookies.read().await.get(name).cloned()
    }

    async fn persist(&self, table: &CookieTable) -> Result<(), StoreError> {
        if let Some(parent) = self.file_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(table)?;
        fs::write(&self.file_path, content).await?;
        Ok(())
    }
}

#[async_trait]
impl CookieJar for FileCookieJar {
    async fn cookie_header(&self) -> String {
        self.cookies.read().await.header()
    }

    async fn set_cookie(&self, set_cookie: &str) -> Result<(), StoreError> {
        // Hold the write lock across persist so file writes never interleave
        let mut table = self.cookies.write().await;
        if table.apply(set_cookie) {
            self.persist(&table).await?;
        }
        Ok(())
    }
}
