//! Transport facade.
//!
//! [`Transport`] is the contract every backend transport implements: submit
//! one logical request to one physical replica and get back a response or a
//! classified [`StoreError`]. [`RntbdTransport`] is the binary implementation.
//! An HTTP variant would implement the same trait and share the status table
//! in [`crate::classify`].
//!
//! Retry, address resolution and pooling policy belong to the caller. The
//! binary transport only keeps a few idle, negotiated connections per
//! endpoint so sequential submits do not renegotiate.

pub(crate) mod stream;

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

pub use stream::{AsyncStream, BoxedStream, PhysicalAddress};

use crate::classify::transport_fault_kind;
use crate::config::ConnectionConfig;
use crate::connection::{Connection, Connector};
use crate::error::{Result, StoreError};
use crate::request::{StoreRequest, StoreResponse};

/// Idle connections kept per endpoint.
pub const MAX_IDLE_CONNECTIONS_PER_ENDPOINT: usize = 2;

/// Submit one request to one replica.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn submit(
        &self,
        address: &PhysicalAddress,
        request: &StoreRequest,
    ) -> std::result::Result<StoreResponse, StoreError>;
}

/// Binary (RNTBD) transport.
pub struct RntbdTransport {
    connector: Connector,
    idle: Mutex<HashMap<String, Vec<Connection>>>,
}

impl RntbdTransport {
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        Ok(Self::with_connector(Connector::new(config)?))
    }

    pub fn with_connector(connector: Connector) -> Self {
        Self {
            connector,
            idle: Mutex::new(HashMap::new()),
        }
    }

    pub fn connector(&self) -> &Connector {
        &self.connector
    }

    /// Idle connections currently kept for `address`.
    pub fn idle_connections(&self, address: &PhysicalAddress) -> usize {
        self.idle
            .lock()
            .get(&address.pool_key())
            .map_or(0, Vec::len)
    }

    /// Close and drop every idle connection.
    pub fn close_idle(&self) {
        let drained: Vec<_> = self.idle.lock().drain().collect();
        for (_, connections) in drained {
            for mut connection in connections {
                connection.close();
            }
        }
    }

    fn checkout(&self, address: &PhysicalAddress) -> Option<Connection> {
        let mut idle = self.idle.lock();
        let connections = idle.get_mut(&address.pool_key())?;
        while let Some(mut connection) = connections.pop() {
            if !connection.has_expired() {
                return Some(connection);
            }
            tracing::debug!(pool_key = %connection.pool_key(), "Discarding expired connection");
            connection.close();
        }
        None
    }

    fn checkin(&self, mut connection: Connection) {
        if !connection.is_open() || connection.has_expired() {
            connection.close();
            return;
        }
        let mut idle = self.idle.lock();
        let connections = idle.entry(connection.pool_key().to_string()).or_default();
        if connections.len() < MAX_IDLE_CONNECTIONS_PER_ENDPOINT {
            connections.push(connection);
        } else {
            connection.close();
        }
    }

    async fn open(
        &self,
        address: &PhysicalAddress,
        request: &StoreRequest,
    ) -> std::result::Result<Connection, StoreError> {
        let mut connection = self.connector.connection(address.clone());
        match connection.open().await {
            Ok(()) => Ok(connection),
            // The handshake classifies transport faults as Gone; a write
            // waiting on it must not be re-routed as if it were a read.
            Err(error) => Err(match error.transport_fault() {
                Some(fault) => {
                    error.reclassified(transport_fault_kind(fault, request.is_read_only()))
                }
                None => error,
            }),
        }
    }
}

#[async_trait]
impl Transport for RntbdTransport {
    async fn submit(
        &self,
        address: &PhysicalAddress,
        request: &StoreRequest,
    ) -> std::result::Result<StoreResponse, StoreError> {
        let mut connection = match self.checkout(address) {
            Some(connection) => connection,
            None => self.open(address, request).await?,
        };

        let result = connection.request(request).await;
        self.checkin(connection);
        result
    }
}

impl std::fmt::Debug for RntbdTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RntbdTransport")
            .field("connector", &self.connector)
            .field("endpoints", &self.idle.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> PhysicalAddress {
        PhysicalAddress::new("replica-1.test", 14330, "/replicas/r1/")
    }

    #[tokio::test]
    async fn test_new_transport_has_no_idle_connections() {
        let transport = RntbdTransport::new(ConnectionConfig::default()).unwrap();
        assert_eq!(transport.idle_connections(&address()), 0);
        assert!(transport.checkout(&address()).is_none());
    }

    #[tokio::test]
    async fn test_checkin_drops_unopened_connection() {
        let transport = RntbdTransport::new(ConnectionConfig::default()).unwrap();
        let connection = transport.connector().connection(address());

        transport.checkin(connection);
        assert_eq!(transport.idle_connections(&address()), 0);
    }

    #[tokio::test]
    async fn test_close_idle_on_empty_stash() {
        let transport = RntbdTransport::new(ConnectionConfig::default()).unwrap();
        transport.close_idle();
        assert!(format!("{:?}", transport).contains("endpoints: 0"));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = ConnectionConfig::default().with_max_frame_length(8);
        assert!(RntbdTransport::new(config).is_err());
    }
}
