//! # rntbd-client
//!
//! Binary TCP transport core for a partitioned document database client.
//!
//! Replicas speak RNTBD: length-prefixed binary frames whose metadata is a
//! sequence of typed tokens. This crate owns one layer of the client stack:
//!
//! - **Wire format**: frame header, token codec and the token schemas
//!   ([`protocol`]).
//! - **Connections**: TCP + TLS dialing, context negotiation and strictly
//!   sequential request/response exchange over one channel ([`Connection`]).
//! - **Timeouts**: every network step raced against a pooled timer
//!   ([`TimerPool`]).
//! - **Classification**: backend statuses and transport faults mapped to
//!   typed [`StoreError`]s the retry layer above can act on.
//!
//! Address resolution, retry policy, session consistency and routing live
//! above this crate.
//!
//! ## Example
//!
//! ```ignore
//! use rntbd_client::{
//!     ConnectionConfig, OperationType, PhysicalAddress, ResourceType, RntbdTransport,
//!     StoreRequest, Transport,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = RntbdTransport::new(ConnectionConfig::default())?;
//!     let address: PhysicalAddress = "rntbd://replica-1:14330/apps/a/services/s/partitions/p/replicas/r/".parse()?;
//!
//!     let request = StoreRequest::new(OperationType::Read, ResourceType::Document, "AbC123=")
//!         .with_header("x-ms-consistency-level", "Session");
//!     let response = transport.submit(&address, &request).await?;
//!     println!("{} {:?}", response.status(), response.lsn());
//!     Ok(())
//! }
//! ```

pub mod classify;
pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod request;
pub mod timer;
pub mod transport;

pub use config::{ConnectionConfig, TlsConfig};
pub use connection::{Connection, ConnectionState, Connector};
pub use error::{ErrorKind, GoneKind, Propagation, RntbdError, StoreError, TransportFault};
pub use protocol::{OperationType, ResourceType};
pub use request::{StoreRequest, StoreResponse};
pub use timer::TimerPool;
pub use transport::{PhysicalAddress, RntbdTransport, Transport};
