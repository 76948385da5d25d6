//! Delivery of event records to the remote collector
//!
//! [`DeliveryClient`] owns the retry loop; a [`Transport`] performs single
//! attempts. [`HttpTransport`] talks HTTP, [`MockTransport`] replays scripted
//! outcomes for tests.

mod client;
mod mock;
mod record;
mod response;
mod retry;
mod transport;

pub use client::DeliveryClient;
pub use mock::{MockTransport, RecordedRequest};
pub use record::EventRecord;
pub use response::CollectorResponse;
pub use retry::RetryPolicy;
pub use transport::{
    CLIENT_SOURCE, CLIENT_VERSION, HttpTransport, SOURCE_HEADER, Transport, VERSION_HEADER,
};
