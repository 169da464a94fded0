//! # Application protocol connection stack
//!
//! Client side of the binary application protocol used between the
//! signalling gateway and its application servers:
//!
//! - **IE/Message codec** - TLV encoding of typed elements and composites
//! - **Channel** - byte-exact framing over a stream socket
//! - **Connection** - read loop, write path, sequence numbering, echo keepalive
//! - **Client** - redundant connection pool with failsafe repair
//! - **Worker pool / scheduler** - message handling and periodic work
//!
//! ## Example
//! ```rust,ignore
//! use sgw_appconn::{ActionRegistry, AppClient, ClientConfig, TypeRegistry, WorkerPool};
//!
//! let types = Arc::new(TypeRegistry::new());
//! let actions = Arc::new(ActionRegistry::new());
//! let workers = WorkerPool::new(8);
//! let client = AppClient::connect(1, config, types, actions, workers).await?;
//! let conn = client.next_online().ok_or("no server available")?;
//! let response = conn.dispatch(request).await;
//! ```

pub mod action;
pub mod channel;
pub mod client;
pub mod config;
pub mod conn;
pub mod errors;
pub mod executor;
pub mod future;
pub mod ie;
pub mod message;
pub mod scheduler;

// Re-exports
pub use action::{ActionRegistry, EchoAction, MessageAction};
pub use client::{AppClient, ConnCache};
pub use config::ClientConfig;
pub use conn::{AppConn, ConnState, DEFAULT_PORT};
pub use errors::{AppConnError, CodecError, Result};
pub use executor::WorkerPool;
pub use future::Future;
pub use ie::{Composite, Ie};
pub use message::{Group, Message, MessageType, TypeRegistry, PROTOCOL_VERSION};
