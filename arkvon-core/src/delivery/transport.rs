//! Transport to the remote collector

use async_trait::async_trait;
use serde_json::Value;

use super::EventRecord;
use crate::error::DeliveryError;

/// Header naming the agent protocol version
pub const VERSION_HEADER: &str = "X-Arkvon-Version";

/// Header naming the sending component
pub const SOURCE_HEADER: &str = "X-Arkvon-Source";

pub const CLIENT_VERSION: &str = "1.0";

pub const CLIENT_SOURCE: &str = "tracking-script";

/// A single POST of an event record to the collector.
///
/// One call is one attempt; retries belong to
/// [`DeliveryClient`](super::DeliveryClient).
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `record` as JSON to `url` and return the decoded JSON body
    async fn post(&self, url: &str, record: &EventRecord) -> Result<Value, DeliveryError>;
}

/// HTTP transport on reqwest
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, url: &str, record: &EventRecord) -> Result<Value, DeliveryError> {
        let response = self
            .client
            .post(url)
            .header(VERSION_HEADER, CLIENT_VERSION)
            .header(SOURCE_HEADER, CLIENT_SOURCE)
            .json(record)
            .send()
            .await
            .map_err(|e| DeliveryError::NetworkFailure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::BadResponse {
                status: status.as_u16(),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| DeliveryError::Decode(e.to_string()))
    }
}
