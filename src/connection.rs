//! One negotiated channel to one replica.
//!
//! # Lifecycle
//!
//! ```text
//! Unopened ─► Connecting ─► TlsHandshaking ─► ContextNegotiating ─► Open
//!     │            │               │                   │              │
//!     └────────────┴───────────────┴───────────────────┴──────────────┴─► Closed
//! ```
//!
//! `open()` runs the handshake once. An `Open` connection then serves
//! `request()` calls strictly one at a time (`&mut self`). Every failure path
//! out of `open()` or `request()` that leaves the stream in an unknown state
//! releases it and moves to `Closed`. A data-plane error status (a decoded
//! 404, 410, 429, ...) is not a transport failure and leaves the connection
//! open.
//!
//! Each network step runs on its own task raced against a pooled timer (see
//! [`TimerPool::race`]). The stream moves into that task and comes back only
//! if the I/O wins; when the timer wins the stream stays with the abandoned
//! task and the connection is closed.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;
use tokio_rustls::TlsConnector;
use uuid::Uuid;

use crate::classify::{
    classify_status, classify_transport_failure, error_message, is_success, sniff_content_type,
    StatusOutcome,
};
use crate::config::ConnectionConfig;
use crate::error::{diagnostics, ErrorKind, GoneKind, Result, RntbdError, StoreError};
use crate::protocol::tokens::{context_request, context_response, response};
use crate::protocol::{
    opcode, read_body, read_header_and_metadata, write_frame, FrameHeader, OperationType,
    OutboundFrame, ResourceType, TokenSchema, TokenValue,
};
use crate::request::{StoreRequest, StoreResponse};
use crate::timer::TimerPool;
use crate::transport::stream::{
    connect_tcp, keepalive_interval, resolve, tls_connector, wrap_client, BoxedStream,
    PhysicalAddress,
};

/// Subtracted from the server's unauthenticated-timeout hint.
pub const UNAUTHENTICATED_TIMEOUT_BUFFER: Duration = Duration::from_secs(30);

/// Floor used when the hint is not longer than the buffer.
pub const MIN_UNAUTHENTICATED_TIMEOUT: Duration = Duration::from_secs(1);

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unopened,
    Connecting,
    TlsHandshaking,
    ContextNegotiating,
    Open,
    /// Terminal.
    Closed,
}

/// Clamp a server-hinted unauthenticated timeout.
pub fn clamp_unauthenticated_timeout(hint: Duration) -> Duration {
    if hint <= UNAUTHENTICATED_TIMEOUT_BUFFER {
        MIN_UNAUTHENTICATED_TIMEOUT
    } else {
        hint - UNAUTHENTICATED_TIMEOUT_BUFFER
    }
}

/// Shared pieces every connection needs: settings, TLS client and timers.
///
/// Cheap to clone; build one per runtime (or per transport) and create
/// connections from it.
#[derive(Clone)]
pub struct Connector {
    config: Arc<ConnectionConfig>,
    tls: TlsConnector,
    timers: Arc<TimerPool>,
}

impl Connector {
    /// Validate `config`, build the TLS client and a timer pool.
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        let timers = Arc::new(TimerPool::new(config.timer_pool_capacity));
        Self::with_timer_pool(config, timers)
    }

    /// Like [`Connector::new`], sharing an existing timer pool. The pool must
    /// belong to the runtime the connections will run on.
    pub fn with_timer_pool(config: ConnectionConfig, timers: Arc<TimerPool>) -> Result<Self> {
        config.validate()?;
        let tls = tls_connector(&config.tls)?;
        Ok(Self {
            config: Arc::new(config),
            tls,
            timers,
        })
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn timers(&self) -> &Arc<TimerPool> {
        &self.timers
    }

    /// A fresh, unopened connection to `address`.
    pub fn connection(&self, address: PhysicalAddress) -> Connection {
        Connection::new(self.clone(), address)
    }
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("config", &self.config)
            .field("timers", &self.timers)
            .finish_non_exhaustive()
    }
}

/// Header, decoded metadata and body of one response frame.
struct RawResponse {
    header: FrameHeader,
    metadata: Result<TokenSchema>,
    body: Option<Bytes>,
}

/// One TCP + TLS channel bound to one replica address.
pub struct Connection {
    connector: Connector,
    address: PhysicalAddress,
    pool_key: String,
    state: ConnectionState,
    stream: Option<BoxedStream>,
    created_at: Instant,
    opened_at: Option<Instant>,
    last_used_at: Instant,
    server_agent: Option<String>,
    server_version: Option<String>,
    idle_timeout: Duration,
    unauthenticated_timeout: Duration,
    has_issued_successful_request: bool,
    next_transport_request_id: u32,
}

impl Connection {
    fn new(connector: Connector, address: PhysicalAddress) -> Self {
        let now = Instant::now();
        let idle_timeout = connector.config.idle_timeout();
        let unauthenticated_timeout = connector.config.unauthenticated_timeout();
        Self {
            pool_key: address.pool_key(),
            connector,
            address,
            state: ConnectionState::Unopened,
            stream: None,
            created_at: now,
            opened_at: None,
            last_used_at: now,
            server_agent: None,
            server_version: None,
            idle_timeout,
            unauthenticated_timeout,
            has_issued_successful_request: false,
            next_transport_request_id: 0,
        }
    }

    /// Resolve, connect, run the TLS handshake and negotiate the context.
    ///
    /// Transport failures are classified as `Gone`: the address is assumed
    /// stale. A handshake rejected by the server raises its decoded error
    /// with server agent/version and required versions attached.
    pub async fn open(&mut self) -> std::result::Result<(), StoreError> {
        let activity_id = Uuid::new_v4();
        self.begin_open(activity_id)?;

        let config = Arc::clone(&self.connector.config);
        let timers = Arc::clone(&self.connector.timers);

        self.state = ConnectionState::Connecting;
        tracing::debug!(pool_key = %self.pool_key, "Connecting");
        let host = self.address.host().to_string();
        let port = self.address.port();
        let keepalive = keepalive_interval(&config);
        let tcp = timers
            .race("connect", config.connect_timeout(), async move {
                let addr = resolve(&host, port).await?;
                connect_tcp(addr, keepalive).await
            })
            .await;
        let tcp = match tcp {
            Ok(tcp) => tcp,
            Err(e) => return Err(self.transport_failure(e, true, activity_id)),
        };

        self.state = ConnectionState::TlsHandshaking;
        let server_name = config
            .tls
            .host_name_override
            .clone()
            .unwrap_or_else(|| self.address.host().to_string());
        let tls = self.connector.tls.clone();
        let stream = timers
            .race("tls handshake", config.connect_timeout(), async move {
                wrap_client(tls, tcp, &server_name).await
            })
            .await;
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => return Err(self.transport_failure(e, true, activity_id)),
        };

        self.negotiate(Box::new(stream), activity_id).await
    }

    /// Negotiate the context over an already-established stream.
    ///
    /// Skips resolve, connect and TLS. Used for proxies and in-memory peers.
    pub async fn open_with_stream(
        &mut self,
        stream: BoxedStream,
    ) -> std::result::Result<(), StoreError> {
        let activity_id = Uuid::new_v4();
        self.begin_open(activity_id)?;
        self.negotiate(stream, activity_id).await
    }

    fn begin_open(&mut self, activity_id: Uuid) -> std::result::Result<(), StoreError> {
        match self.state {
            ConnectionState::Unopened => Ok(()),
            state => Err(StoreError::new(
                ErrorKind::Gone(GoneKind::Generic),
                activity_id,
                format!("cannot open a connection in state {:?}", state),
            )),
        }
    }

    async fn negotiate(
        &mut self,
        mut stream: BoxedStream,
        activity_id: Uuid,
    ) -> std::result::Result<(), StoreError> {
        self.state = ConnectionState::ContextNegotiating;

        let config = Arc::clone(&self.connector.config);
        let frame = match self.context_request_frame(activity_id) {
            Ok(frame) => frame,
            Err(e) => return Err(self.transport_failure(e, true, activity_id)),
        };

        let max_frame_length = config.max_frame_length;
        let exchange = self
            .connector
            .timers
            .race("context negotiation", config.request_timeout(), async move {
                write_frame(&mut stream, &frame).await?;
                let (header, metadata) =
                    read_header_and_metadata(&mut stream, max_frame_length, activity_id).await?;
                let status = u16::try_from(header.status()).unwrap_or(u16::MAX);
                // A rejected handshake carries its error body after the tokens.
                let body = if is_success(status) {
                    None
                } else {
                    Some(read_body(&mut stream, max_frame_length).await?)
                };
                let metadata = TokenSchema::decode(&context_response::SCHEMA, &metadata);
                Ok((stream, RawResponse { header, metadata, body }))
            })
            .await;

        let (stream, raw) = match exchange {
            Ok(exchange) => exchange,
            Err(e) => return Err(self.transport_failure(e, true, activity_id)),
        };

        let status = u16::try_from(raw.header.status()).unwrap_or(u16::MAX);
        if !is_success(status) {
            let error = self.handshake_rejected(status, activity_id, raw);
            self.close();
            return Err(error);
        }

        let context = match raw.metadata {
            Ok(context) => context,
            Err(e) => return Err(self.protocol_failure(e, activity_id)),
        };

        self.server_agent = context
            .str(context_response::SERVER_AGENT)
            .map(str::to_string);
        self.server_version = context
            .str(context_response::SERVER_VERSION)
            .map(str::to_string);

        if let Some(secs) = context
            .u32(context_response::IDLE_TIMEOUT_IN_SECONDS)
            .filter(|s| *s > 0)
        {
            self.idle_timeout = self
                .idle_timeout
                .min(Duration::from_secs(u64::from(secs)));
        }
        if let Some(secs) = context.u32(context_response::UNAUTHENTICATED_TIMEOUT_IN_SECONDS) {
            self.unauthenticated_timeout =
                clamp_unauthenticated_timeout(Duration::from_secs(u64::from(secs)));
        }

        let now = Instant::now();
        self.stream = Some(stream);
        self.opened_at = Some(now);
        self.last_used_at = now;
        self.state = ConnectionState::Open;

        tracing::debug!(
            pool_key = %self.pool_key,
            server_agent = ?self.server_agent,
            server_version = ?self.server_version,
            idle_timeout = ?self.idle_timeout,
            unauthenticated_timeout = ?self.unauthenticated_timeout,
            "Connection open"
        );
        Ok(())
    }

    fn context_request_frame(&self, activity_id: Uuid) -> Result<OutboundFrame> {
        let config = &self.connector.config;
        let mut context = TokenSchema::new(&context_request::SCHEMA);
        context.set(
            context_request::PROTOCOL_VERSION,
            TokenValue::ULong32(config.protocol_version),
        )?;
        context.set(
            context_request::CLIENT_VERSION,
            TokenValue::SmallString(config.client_version.clone()),
        )?;
        context.set(
            context_request::USER_AGENT,
            TokenValue::SmallString(config.user_agent.clone()),
        )?;
        OutboundFrame::build(
            activity_id,
            opcode(ResourceType::Connection, OperationType::Connection),
            &mut context,
            None,
        )
    }

    fn handshake_rejected(&self, status: u16, activity_id: Uuid, raw: RawResponse) -> StoreError {
        let body = raw.body.unwrap_or_default();
        let never = |_: u16, _: Option<u32>| false;
        let kind = match classify_status(status, None, None, sniff_content_type(&body), &never) {
            StatusOutcome::Error(kind) => kind,
            StatusOutcome::Success | StatusOutcome::PassThrough => ErrorKind::InternalServerError,
        };

        let mut error = StoreError::new(kind, activity_id, error_message(&body))
            .with_status(status, None);

        // Rejections may omit the tokens a successful handshake requires.
        if let Ok(context) = raw.metadata {
            if let Some(agent) = context.str(context_response::SERVER_AGENT) {
                error = error.with_diagnostic(diagnostics::SERVER_AGENT, agent);
            }
            if let Some(version) = context.str(context_response::SERVER_VERSION) {
                error = error.with_diagnostic(diagnostics::SERVER_VERSION, version);
            }
            if let Some(version) = context.str(context_response::CLIENT_VERSION) {
                error = error.with_diagnostic(diagnostics::REQUIRED_CLIENT_VERSION, version);
            }
            if let Some(version) = context.u32(context_response::PROTOCOL_VERSION) {
                error =
                    error.with_diagnostic(diagnostics::REQUIRED_PROTOCOL_VERSION, version.to_string());
            }
        }

        tracing::warn!(
            pool_key = %self.pool_key,
            %activity_id,
            status,
            kind = %error.kind(),
            "Context negotiation rejected"
        );
        error
    }

    /// Send one request and read its response.
    ///
    /// Returns the response for success statuses and for error statuses the
    /// request's retry exemption accepts; any other error status becomes a
    /// classified [`StoreError`] and leaves the connection open. Transport
    /// failures close the connection and are classified by the request's
    /// read-only flag.
    pub async fn request(
        &mut self,
        request: &StoreRequest,
    ) -> std::result::Result<StoreResponse, StoreError> {
        let activity_id = request.activity_id();
        let read_only = request.is_read_only();

        if self.state != ConnectionState::Open {
            return Err(self.not_open(read_only, activity_id));
        }

        let transport_request_id = self.next_transport_request_id;
        self.next_transport_request_id = self.next_transport_request_id.wrapping_add(1);

        let frame = request
            .to_metadata(Some(self.address.path()), transport_request_id)
            .and_then(|mut metadata| {
                OutboundFrame::build(
                    activity_id,
                    opcode(request.resource_type(), request.operation()),
                    &mut metadata,
                    request.body().cloned(),
                )
            });
        let frame = match frame {
            Ok(frame) => frame,
            // Nothing was written; the connection is unaffected.
            Err(e) => {
                return Err(StoreError::new(ErrorKind::BadRequest, activity_id, e.to_string()))
            }
        };

        let Some(mut stream) = self.take_stream() else {
            return Err(self.not_open(read_only, activity_id));
        };

        let config = Arc::clone(&self.connector.config);
        let timers = Arc::clone(&self.connector.timers);

        tracing::trace!(
            pool_key = %self.pool_key,
            %activity_id,
            operation = %request.operation(),
            transport_request_id,
            "Writing request"
        );
        let written = timers
            .race("write", config.request_timeout(), async move {
                write_frame(&mut stream, &frame).await?;
                Ok(stream)
            })
            .await;
        let mut stream = match written {
            Ok(stream) => stream,
            Err(e) => return Err(self.transport_failure(e, read_only, activity_id)),
        };

        let max_frame_length = config.max_frame_length;
        let read = timers
            .race("read", config.request_timeout(), async move {
                let (header, metadata) =
                    read_header_and_metadata(&mut stream, max_frame_length, activity_id).await?;
                let metadata = TokenSchema::decode(&response::SCHEMA, &metadata);
                let body = match &metadata {
                    Ok(m) if m.byte(response::PAYLOAD_PRESENT).unwrap_or(0) != 0 => {
                        Some(read_body(&mut stream, max_frame_length).await?)
                    }
                    _ => None,
                };
                Ok((stream, RawResponse { header, metadata, body }))
            })
            .await;
        let (stream, raw) = match read {
            Ok(read) => read,
            Err(e) => return Err(self.transport_failure(e, read_only, activity_id)),
        };

        let metadata = match raw.metadata {
            Ok(metadata) => metadata,
            // Stream position is unknown after a bad frame.
            Err(e) => return Err(self.protocol_failure(e, activity_id)),
        };
        self.restore_stream(stream);

        let status = u16::try_from(raw.header.status()).unwrap_or(u16::MAX);
        let sub_status = metadata.u32(response::SUB_STATUS);

        if is_success(status) {
            self.has_issued_successful_request = true;
            self.last_used_at = Instant::now();
            return Ok(StoreResponse::new(
                status,
                raw.header.activity_id,
                metadata,
                raw.body,
            ));
        }

        let body = raw.body.unwrap_or_default();
        let retry_after_ms = metadata
            .u32(response::RETRY_AFTER_MILLISECONDS)
            .map(u64::from);
        let outcome = classify_status(
            status,
            sub_status,
            retry_after_ms,
            sniff_content_type(&body),
            &|status, sub_status| request.is_exempt_from_retry(status, sub_status),
        );

        match outcome {
            StatusOutcome::Error(kind) => {
                tracing::debug!(
                    pool_key = %self.pool_key,
                    %activity_id,
                    status,
                    ?sub_status,
                    kind = %kind,
                    "Request failed"
                );
                Err(StoreError::new(kind, activity_id, error_message(&body))
                    .with_status(status, sub_status)
                    .with_lsn(metadata.i64(response::LSN))
                    .with_partition_key_range_id(
                        metadata
                            .str(response::PARTITION_KEY_RANGE_ID)
                            .map(str::to_string),
                    ))
            }
            StatusOutcome::PassThrough | StatusOutcome::Success => {
                let body = (!body.is_empty()).then_some(body);
                Ok(StoreResponse::new(
                    status,
                    raw.header.activity_id,
                    metadata,
                    body,
                ))
            }
        }
    }

    /// Release the stream. Idempotent.
    pub fn close(&mut self) {
        if self.state != ConnectionState::Closed {
            tracing::debug!(pool_key = %self.pool_key, state = ?self.state, "Closing connection");
        }
        self.stream = None;
        self.state = ConnectionState::Closed;
    }

    /// Move the stream out for one exchange.
    ///
    /// The connection reads as `Closed` until [`Connection::restore_stream`]
    /// puts the stream back, so a `request()` future dropped mid-flight
    /// leaves it closed and expired.
    fn take_stream(&mut self) -> Option<BoxedStream> {
        let stream = self.stream.take();
        self.state = ConnectionState::Closed;
        stream
    }

    fn restore_stream(&mut self, stream: BoxedStream) {
        self.stream = Some(stream);
        self.state = ConnectionState::Open;
    }

    fn not_open(&mut self, read_only: bool, activity_id: Uuid) -> StoreError {
        // Anything but an unopened connection has lost its stream for good.
        if self.state != ConnectionState::Unopened {
            self.close();
        }
        let error = RntbdError::Protocol(format!("connection is {:?}", self.state));
        let (kind, fault) = classify_transport_failure(&error, read_only);
        StoreError::new(kind, activity_id, error.to_string()).with_transport_fault(fault)
    }

    fn transport_failure(&mut self, error: RntbdError, read_only: bool, activity_id: Uuid) -> StoreError {
        self.close();

        let (kind, fault) = classify_transport_failure(&error, read_only);
        tracing::warn!(
            pool_key = %self.pool_key,
            %activity_id,
            error = %error,
            kind = %kind,
            "Transport failure"
        );
        let error = StoreError::new(kind, activity_id, error.to_string())
            .with_transport_fault(fault)
            .with_diagnostic(diagnostics::TRANSPORT_FAILURE, format!("{:?}", fault));
        // Open paths pass `read_only`; only a request's own bytes can be in doubt.
        if read_only {
            error
        } else {
            error.with_ambiguous_outcome()
        }
    }

    fn protocol_failure(&mut self, error: RntbdError, activity_id: Uuid) -> StoreError {
        self.close();
        tracing::error!(
            pool_key = %self.pool_key,
            %activity_id,
            error = %error,
            "Undecodable frame from backend"
        );
        StoreError::new(ErrorKind::InternalServerError, activity_id, error.to_string())
    }

    /// True once idle past the idle timeout, or never successful within the
    /// unauthenticated timeout after opening. Closed connections, and ones
    /// whose `open()` was abandoned part way, are expired.
    pub fn has_expired(&self) -> bool {
        self.has_expired_at(Instant::now())
    }

    /// [`Connection::has_expired`] against an explicit clock reading.
    pub fn has_expired_at(&self, now: Instant) -> bool {
        match self.state {
            ConnectionState::Closed => return true,
            // An `open()` future dropped mid-flight leaves one of these with
            // no stream.
            ConnectionState::Connecting
            | ConnectionState::TlsHandshaking
            | ConnectionState::ContextNegotiating => return true,
            ConnectionState::Unopened | ConnectionState::Open => {}
        }
        if now.saturating_duration_since(self.last_used_at) > self.idle_timeout {
            return true;
        }
        let opened_at = self.opened_at.unwrap_or(self.created_at);
        !self.has_issued_successful_request
            && now.saturating_duration_since(opened_at) > self.unauthenticated_timeout
    }

    #[inline]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn address(&self) -> &PhysicalAddress {
        &self.address
    }

    pub fn pool_key(&self) -> &str {
        &self.pool_key
    }

    pub fn server_agent(&self) -> Option<&str> {
        self.server_agent.as_deref()
    }

    pub fn server_version(&self) -> Option<&str> {
        self.server_version.as_deref()
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn unauthenticated_timeout(&self) -> Duration {
        self.unauthenticated_timeout
    }

    pub fn has_issued_successful_request(&self) -> bool {
        self.has_issued_successful_request
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn opened_at(&self) -> Option<Instant> {
        self.opened_at
    }

    pub fn last_used_at(&self) -> Instant {
        self.last_used_at
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("pool_key", &self.pool_key)
            .field("state", &self.state)
            .field("server_agent", &self.server_agent)
            .field("has_issued_successful_request", &self.has_issued_successful_request)
            .finish_non_exhaustive()
    }
}
