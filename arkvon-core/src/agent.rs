//! The caller-facing agent handle
//!
//! Until initialization finishes the handle only buffers commands. The
//! engine then drains the buffer and switches the handle to dispatch mode
//! under the same lock that saw the buffer empty, so every buffered command
//! is processed before any command issued afterwards.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::command::{Command, CommandData, QueuedCommand};
use crate::context::AgentContext;
use crate::delivery::CollectorResponse;
use crate::engine::AttributionState;
use crate::events::AgentEvent;
use crate::processor::CommandProcessor;
use crate::queue::CommandQueue;
use crate::store::ReferralData;

enum AgentMode {
    Buffering(CommandQueue),
    Dispatching(Arc<CommandProcessor>),
}

/// Cloneable handle callers issue commands through
#[derive(Clone)]
pub struct PublicAgent {
    mode: Arc<Mutex<AgentMode>>,
    context: Arc<AgentContext>,
}

impl PublicAgent {
    /// Create a handle in buffering mode
    pub fn new(context: Arc<AgentContext>) -> Self {
        Self {
            mode: Arc::new(Mutex::new(AgentMode::Buffering(CommandQueue::new()))),
            context,
        }
    }

    pub fn context(&self) -> &Arc<AgentContext> {
        &self.context
    }

    /// Issue `command` with `data`.
    ///
    /// Before initialization completes the command is buffered and `None` is
    /// returned immediately. Afterwards it is processed and the collector's
    /// response (or `None` on failure) is returned.
    pub async fn call(&self, command: &str, data: CommandData) -> Option<CollectorResponse> {
        let processor = {
            let mut mode = self.mode.lock().await;
            match &mut *mode {
                AgentMode::Buffering(queue) => {
                    debug!(command, queued = queue.len() + 1, "Queued command");
                    queue.push(command, data);
                    return None;
                }
                AgentMode::Dispatching(processor) => processor.clone(),
            }
        };
        processor.process(command, data).await
    }

    async fn call_command(&self, command: Command, data: CommandData) -> Option<CollectorResponse> {
        self.call(command.name(), data).await
    }

    /// Record a signup for `email`; `extra` fields win over `email`
    pub async fn signup(&self, email: &str, extra: CommandData) -> Option<CollectorResponse> {
        let mut data = CommandData::new();
        data.insert("email".into(), Value::from(email));
        data.extend(extra);
        self.call_command(Command::Signup, data).await
    }

    /// Record a conversion worth `value`; `kind` defaults to `purchase`
    pub async fn conversion(
        &self,
        value: Value,
        kind: Option<&str>,
        extra: CommandData,
    ) -> Option<CollectorResponse> {
        let mut data = CommandData::new();
        data.insert("value".into(), value);
        data.insert("type".into(), Value::from(kind.unwrap_or("purchase")));
        data.extend(extra);
        self.call_command(Command::Conversion, data).await
    }

    /// Record a custom event
    pub async fn track(&self, event_name: &str, event_data: Value) -> Option<CollectorResponse> {
        let mut data = CommandData::new();
        data.insert("event_name".into(), Value::from(event_name));
        data.insert("event_data".into(), event_data);
        self.call_command(Command::Custom, data).await
    }

    pub async fn click(&self, data: CommandData) -> Option<CollectorResponse> {
        self.call_command(Command::Click, data).await
    }

    pub async fn page_view(&self, data: CommandData) -> Option<CollectorResponse> {
        self.call_command(Command::PageView, data).await
    }

    /// Commands waiting in the buffer
    pub async fn pending(&self) -> usize {
        match &*self.mode.lock().await {
            AgentMode::Buffering(queue) => queue.len(),
            AgentMode::Dispatching(_) => 0,
        }
    }

    pub async fn is_dispatching(&self) -> bool {
        matches!(&*self.mode.lock().await, AgentMode::Dispatching(_))
    }

    /// Take the next buffered command, or switch to dispatch mode when none
    /// is left. Returns `None` once dispatching.
    pub(crate) async fn next_or_activate(
        &self,
        processor: &Arc<CommandProcessor>,
    ) -> Option<QueuedCommand> {
        let mut mode = self.mode.lock().await;
        let next = match &mut *mode {
            AgentMode::Buffering(queue) => queue.pop(),
            AgentMode::Dispatching(_) => return None,
        };
        if next.is_none() {
            *mode = AgentMode::Dispatching(processor.clone());
        }
        next
    }

    /// Wait until initialization settles. Returns `true` when it reached
    /// [`AttributionState::Ready`], `false` when it halted.
    pub async fn wait_ready(&self) -> bool {
        let mut rx = self.context.watch_state();
        match rx.wait_for(|state| state.is_terminal()).await {
            Ok(state) => *state == AttributionState::Ready,
            Err(_) => false,
        }
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<AgentEvent> {
        self.context.subscribe()
    }

    /// Utilities for manual integrations
    pub fn utils(&self) -> AgentUtils {
        AgentUtils {
            context: self.context.clone(),
        }
    }
}

/// Manual referral controls, usable in any state
#[derive(Clone)]
pub struct AgentUtils {
    context: Arc<AgentContext>,
}

impl AgentUtils {
    /// Current referral code and tracking data
    pub async fn get_referral_data(&self) -> ReferralData {
        self.context.referral_data().await
    }

    /// Whether the visitor arrived through a referral
    pub async fn is_referral_user(&self) -> bool {
        self.context.is_referral_user().await
    }

    /// Set the referral code by hand; `days` defaults to the configured lifetime
    pub async fn set_referral(&self, code: &str, days: Option<u32>) -> bool {
        let days = days.unwrap_or(self.context.settings().default_cookie_days);
        match self.context.set_referral(code, days).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to set referral");
                false
            }
        }
    }

    /// Forget all attribution
    pub async fn clear_tracking(&self) -> bool {
        match self.context.clear().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to clear tracking data");
                false
            }
        }
    }
}
