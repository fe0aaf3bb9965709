//! Port definitions (interfaces)
//!
//! Ports define the boundaries between the application core and external
//! systems. Each port is a trait that can be implemented by adapters in the
//! infrastructure layer.

mod cancellation;
mod http_transport;
mod script_engine;
mod trust_store;

pub use cancellation::{CancellationReceiver, CancellationToken, cancellation_pair};
pub use http_transport::{HttpTransport, TransportError};
pub use script_engine::ScriptEngine;
pub use trust_store::{TrustStore, TrustStoreError};
