//! Bounded polling for late-rendered page elements

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How long an [`ElementObserver`] keeps looking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObserverPolicy {
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_interval() -> Duration {
    Duration::from_millis(250)
}

fn default_max_attempts() -> u32 {
    20
}

impl Default for ObserverPolicy {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Polls a probe until it finds something, runs out of attempts, or is
/// cancelled
#[derive(Debug, Clone)]
pub struct ElementObserver {
    policy: ObserverPolicy,
    cancel: CancellationToken,
}

impl ElementObserver {
    pub fn new(policy: ObserverPolicy) -> Self {
        Self {
            policy,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops the observer when cancelled
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Run `probe` up to `max_attempts` times, `interval` apart.
    ///
    /// Returns the first non-empty result, or `None` when every attempt came
    /// back empty or the observer was cancelled.
    pub async fn wait_for<T, F>(&self, mut probe: F) -> Option<Vec<T>>
    where
        F: FnMut() -> Vec<T>,
    {
        let attempts = self.policy.max_attempts.max(1);
        for attempt in 1..=attempts {
            if self.cancel.is_cancelled() {
                debug!(attempt, "Element observer cancelled");
                return None;
            }

            let found = probe();
            if !found.is_empty() {
                debug!(attempt, count = found.len(), "Elements found");
                return Some(found);
            }
            if attempt == attempts {
                break;
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!(attempt, "Element observer cancelled");
                    return None;
                }
                _ = tokio::time::sleep(self.policy.interval) => {}
            }
        }

        debug!(attempts, "No elements found");
        None
    }
}
