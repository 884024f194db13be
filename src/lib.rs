//! bosh-core - Client-side BOSH (XEP-0124/XEP-0206) session engine
//!
//! This library implements the connection-manager-facing half of a BOSH
//! client: a session coordinator that gates sends against the negotiated
//! in-flight limit, decorates bodies with the bookkeeping attributes BOSH
//! requires, and runs the receive loop that demultiplexes connection
//! manager responses into acks, reports, pauses, and terminal conditions.
//!
//! # Architecture
//!
//! - `session`: the coordinator - state machine, send gating, receive loop
//! - `body`: the immutable `<body/>` attribute/payload data model
//! - `wire`: body <-> XML encoding, the collaborator `transport` depends on
//! - `transport`: the `HttpSender` contract and its `reqwest`-backed impl
//! - `scheduler`: the empty-request keepalive and I/O timeout timers
//! - `listener`: connection/request-sent/response-received notification fan-out
//! - `ack`: outbound pending-ack list and inbound response-ack bookkeeping
//! - `cm_params`: parsed session-creation response parameters
//! - `terminal`: terminal binding condition classification
//! - `rid`: monotonic request-id sequence generation
//! - `config`: configuration management and validation
//! - `error`: error types and result alias
//!
//! # Example
//!
//! ```no_run
//! use bosh_core::{Config, Session};
//! use bosh_core::transport::{ReqwestHttpSender, SharedHttpSender};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::new("http://cm.example.com/http-bind", "example.com");
//!     config.validate()?;
//!
//!     let sender: SharedHttpSender = Arc::new(ReqwestHttpSender::new(
//!         config.endpoint()?,
//!         Duration::from_secs(config.wait_seconds + 10),
//!     )?);
//!     let session = Session::new(&config, sender)?;
//!     session.close().await;
//!     Ok(())
//! }
//! ```

pub mod ack;
pub mod body;
pub mod cm_params;
pub mod config;
pub mod error;
pub mod listener;
pub mod rid;
pub mod scheduler;
pub mod session;
pub mod terminal;
pub mod transport;
pub mod wire;

// Re-export commonly used types
pub use body::{Body, BodyBuilder};
pub use config::Config;
pub use error::{BoshError, Result};
pub use listener::{ConnectionEvent, ListenerId};
pub use session::Session;
