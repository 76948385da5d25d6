//! Scripted transport for tests
//!
//! MockTransport replays queued outcomes in order and records every request
//! with the (possibly paused) tokio clock, so retry schedules can be checked
//! without a network.

use std::collections::VecDeque;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{EventRecord, Transport};
use crate::error::DeliveryError;

/// A request seen by [`MockTransport`]
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: String,
    pub body: Value,
    pub at: Instant,
}

impl RecordedRequest {
    /// Last path segment of the URL (`clicks`, `signup`, ...)
    pub fn endpoint(&self) -> &str {
        self.url.rsplit('/').next().unwrap_or_default()
    }
}

/// Transport replaying scripted outcomes
#[derive(Default)]
pub struct MockTransport {
    outcomes: Mutex<VecDeque<Result<Value, DeliveryError>>>,
    fallback: Option<Value>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockTransport {
    /// A transport that fails every call it has no queued outcome for
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport answering `fallback` once the queue runs dry
    pub fn with_fallback(fallback: Value) -> Self {
        Self {
            fallback: Some(fallback),
            ..Self::default()
        }
    }

    /// Queue a successful response body
    pub async fn queue_response(&self, body: Value) {
        self.outcomes.lock().await.push_back(Ok(body));
    }

    /// Queue a failed attempt
    pub async fn queue_failure(&self, error: DeliveryError) {
        self.outcomes.lock().await.push_back(Err(error));
    }

    /// Queue a non-2xx answer (convenience method)
    pub async fn queue_status(&self, status: u16) {
        self.queue_failure(DeliveryError::BadResponse { status }).await;
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().await.clone()
    }

    /// Requests whose URL ends in `endpoint`
    pub async fn requests_to(&self, endpoint: &str) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .await
            .iter()
            .filter(|r| r.endpoint() == endpoint)
            .cloned()
            .collect()
    }

    pub async fn request_count(&self) -> usize {
        self.requests.lock().await.len()
    }

    /// Endpoints hit so far, in order
    pub async fn endpoints(&self) -> Vec<String> {
        self.requests
            .lock()
            .await
            .iter()
            .map(|r| r.endpoint().to_string())
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn post(&self, url: &str, record: &EventRecord) -> Result<Value, DeliveryError> {
        self.requests.lock().await.push(RecordedRequest {
            url: url.to_string(),
            body: record.clone().into_value(),
            at: Instant::now(),
        });

        match self.outcomes.lock().await.pop_front() {
            Some(outcome) => outcome,
            None => self.fallback.clone().ok_or_else(|| {
                DeliveryError::NetworkFailure("no queued response in MockTransport".to_string())
            }),
        }
    }
}
