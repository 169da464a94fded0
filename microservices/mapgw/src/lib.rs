//! # MAP short-message gateway
//!
//! Bridges the external SS7/MAP signalling transport to the application
//! servers reachable over the connection protocol:
//!
//! - **Transport boundary** - abstract open/send/close/abort interface
//! - **Dialogs** - MO forward, routing-info lookup, MT forward
//! - **Dialog cache** - expiry sweep with step-wise escalation
//! - **Actions** - inbound application server requests
//!
//! The gateway never touches MAP/TCAP/SCCP encoding; real deployments
//! attach a vendor transport behind [`transport::MapTransport`], the
//! stand-alone mode uses the in-process loopback.

pub mod actions;
pub mod config;
pub mod dialog;
pub mod dialogs;
pub mod errors;
pub mod fields;
pub mod gateway;
pub mod loopback;
pub mod transport;

// Re-exports
pub use config::GatewayConfig;
pub use errors::{GatewayError, Result, TransportError};
pub use gateway::MapGateway;
pub use transport::{DialogId, MapTransport, TransportEvent};
