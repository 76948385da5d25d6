//! arkvon-core: Referral attribution and event relay agent
//!
//! This crate provides the agent that runs on a tenant's pages:
//!
//! - **Attribution** - [`AttributionEngine`] resolves the visitor's referral identity once per page load
//! - **Agent handle** - [`PublicAgent`] buffers commands until initialization completes, then dispatches them
//! - **Delivery** - [`DeliveryClient`] posts [`EventRecord`]s to the collector with bounded retry
//! - **Storage** - [`AttributionStore`] keeps the identity in cookies behind a [`CookieJar`]
//! - **Events** - [`AgentEvent`] lifecycle notifications over a broadcast channel
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use arkvon_core::{
//!     AgentContext, AgentSettings, AttributionEngine, HttpTransport, MemoryCookieJar,
//!     PageContext, ScriptAttributes,
//! };
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let page = PageContext::parse("https://shop.example.com/?ref=ABC123")?;
//!     let context = Arc::new(AgentContext::new(
//!         AgentSettings::default(),
//!         page,
//!         Arc::new(MemoryCookieJar::new()),
//!     ));
//!     let engine = AttributionEngine::new(
//!         context,
//!         Arc::new(HttpTransport::new()),
//!         ScriptAttributes::with_public_id("pub_123"),
//!     );
//!
//!     // Commands issued now are buffered until the engine is ready
//!     let agent = engine.agent();
//!     agent.track("opened_pricing", serde_json::json!({})).await;
//!
//!     engine.run().await;
//!     println!("referred: {}", agent.utils().is_referral_user().await);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  buffer   ┌─────────────┐  drain   ┌───────────────────┐
//! │ PublicAgent  │──────────▶│ CommandQueue│─────────▶│ CommandProcessor  │
//! └──────┬───────┘           └─────────────┘          └─────────┬─────────┘
//!        │ after READY                                          │
//!        └─────────────────────────────────────────────────────▶│
//!                                                               ▼
//! ┌───────────────────┐   reads/writes   ┌──────────────┐  ┌────────────────┐
//! │ AttributionEngine │─────────────────▶│ AgentContext │◀─│ DeliveryClient │
//! └───────────────────┘                  └──────────────┘  └────────────────┘
//! ```

pub mod agent;
pub mod command;
pub mod config;
pub mod context;
pub mod delivery;
pub mod engine;
pub mod error;
pub mod events;
pub mod interactions;
pub mod page;
pub mod payment;
pub mod processor;
pub mod queue;
pub mod store;

// Re-export key types for convenience
pub use agent::{AgentUtils, PublicAgent};
pub use command::{Command, CommandData, Endpoint, QueuedCommand};
pub use config::{AgentConfig, AgentSettings, ScriptAttributes};
pub use context::AgentContext;
pub use delivery::{
    CollectorResponse, DeliveryClient, EventRecord, HttpTransport, MockTransport, RetryPolicy,
    Transport,
};
pub use engine::{AttributionEngine, AttributionState};
pub use error::{AgentError, CommandError, ConfigError, DeliveryError, StoreError};
pub use events::AgentEvent;
pub use interactions::{ClickTarget, FormSubmission, InteractionTracker};
pub use page::PageContext;
pub use payment::{ElementObserver, ObserverPolicy, PaymentAnnotator, PaymentSurface};
pub use processor::CommandProcessor;
pub use queue::CommandQueue;
pub use store::{
    AttributionStore, CookieJar, FileCookieJar, MemoryCookieJar, ReferralData, ReferralIdentity,
    TrackingData,
};
