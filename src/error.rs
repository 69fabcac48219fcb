//! Error types for rntbd-client.
//!
//! Two layers live here:
//!
//! - [`RntbdError`]: raw, pre-classification failures raised while encoding,
//!   decoding, reading or writing frames. These never reach callers directly.
//! - [`StoreError`]: the classified, caller-facing error. Its [`ErrorKind`] is
//!   the closed taxonomy upstream retry and routing logic depends on.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Low-level failure raised inside the codec, frame I/O and socket layers.
#[derive(Debug, Error)]
pub enum RntbdError {
    /// I/O error during socket/stream operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while decoding an error body or a configuration document.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame or token stream violates the wire format.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A token carried a type tag this client does not know.
    #[error("Unknown token type tag 0x{tag:02x} for token 0x{id:04x}")]
    UnknownTokenType { id: u16, tag: u8 },

    /// A token marked required was absent after decode (or before encode).
    #[error("Required token 0x{id:04x} ({name}) is missing from the {schema} schema")]
    MissingRequiredToken {
        schema: &'static str,
        id: u16,
        name: &'static str,
    },

    /// A frame length claim exceeded the configured maximum or undercut the header.
    #[error("Frame length {length} is outside the allowed range {min}..={max}")]
    FrameLength { length: u32, min: u32, max: u32 },

    /// The peer closed the stream before a complete frame was read.
    #[error("Channel closed after {read} of {expected} bytes")]
    ChannelClosed { read: usize, expected: usize },

    /// A timer won the race against an I/O step.
    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        operation: &'static str,
        elapsed: Duration,
    },

    /// TLS setup or handshake failure.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Host name resolution produced no usable address.
    #[error("Failed to resolve {0}")]
    Resolve(String),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A request header could not be converted to its wire token.
    #[error("Invalid value for header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },
}

/// Result type alias using RntbdError.
pub type Result<T> = std::result::Result<T, RntbdError>;

/// Refinement of [`ErrorKind::Gone`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GoneKind {
    /// Substatus 1000: the collection was recreated, cached routing is stale.
    InvalidPartition,
    /// Substatus 1002: the partition key range no longer exists.
    PartitionKeyRangeGone,
    /// Substatus 1007: the partition key range is being split.
    PartitionKeyRangeIsSplitting,
    /// Substatus 1008: the partition is being migrated.
    PartitionIsMigrating,
    /// Replica or connection is gone for an unspecified reason.
    Generic,
}

/// Closed taxonomy of classified failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Unauthorized,
    Forbidden,
    NotFound,
    BadRequest,
    MethodNotAllowed,
    Gone(GoneKind),
    Conflict,
    PreconditionFailed,
    RequestEntityTooLarge,
    Locked,
    TooManyRequests { retry_after_ms: u64 },
    RequestTimeout,
    RetryWith,
    InternalServerError,
    ServiceUnavailable,
}

/// How a classified error should be handled upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// Re-resolve the target and retry against a different replica.
    RetryElsewhere,
    /// Back off and retry the same logical operation.
    RetryHere,
    /// Do not retry without changing the request.
    Fatal,
}

impl ErrorKind {
    /// Canonical HTTP-style status code for this kind.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::BadRequest => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::MethodNotAllowed => 405,
            ErrorKind::RequestTimeout => 408,
            ErrorKind::Conflict => 409,
            ErrorKind::Gone(_) => 410,
            ErrorKind::PreconditionFailed => 412,
            ErrorKind::RequestEntityTooLarge => 413,
            ErrorKind::Locked => 423,
            ErrorKind::TooManyRequests { .. } => 429,
            ErrorKind::RetryWith => 449,
            ErrorKind::InternalServerError => 500,
            ErrorKind::ServiceUnavailable => 503,
        }
    }

    /// Propagation class of this kind alone.
    ///
    /// A `ServiceUnavailable` returned by the replica, or raised before any
    /// request bytes were sent, is safe to send elsewhere. Prefer
    /// [`StoreError::propagation`], which also knows when a failed write may
    /// already have been applied.
    pub fn propagation(&self) -> Propagation {
        match self {
            ErrorKind::Gone(_) | ErrorKind::ServiceUnavailable => Propagation::RetryElsewhere,
            ErrorKind::TooManyRequests { .. } | ErrorKind::RequestTimeout | ErrorKind::RetryWith => {
                Propagation::RetryHere
            }
            _ => Propagation::Fatal,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Gone(kind) => write!(f, "Gone({:?})", kind),
            ErrorKind::TooManyRequests { retry_after_ms } => {
                write!(f, "TooManyRequests(retry after {}ms)", retry_after_ms)
            }
            other => write!(f, "{:?}", other),
        }
    }
}

/// Diagnostic header names attached to errors.
pub mod diagnostics {
    pub const SERVER_AGENT: &str = "x-ms-server-agent";
    pub const SERVER_VERSION: &str = "x-ms-serviceversion";
    pub const REQUIRED_CLIENT_VERSION: &str = "x-ms-required-client-version";
    pub const REQUIRED_PROTOCOL_VERSION: &str = "x-ms-required-protocol-version";
    pub const TRANSPORT_FAILURE: &str = "x-ms-transport-failure";
}

/// What kind of transport fault produced an error, if any.
///
/// Kept on [`StoreError`] so a caller that opened a connection on behalf of a
/// request can re-classify an open failure with that request's read-only flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFault {
    /// The timer won a race against an I/O step.
    Timeout,
    /// The I/O step itself failed (reset, refused, short read, TLS, DNS).
    Io,
}

/// Classified, caller-facing error.
#[derive(Debug, Clone, Error)]
#[error("{kind} (status {status}, substatus {sub_status:?}, activity {activity_id}): {message}")]
pub struct StoreError {
    kind: ErrorKind,
    status: u16,
    sub_status: Option<u32>,
    activity_id: Uuid,
    message: String,
    lsn: Option<i64>,
    partition_key_range_id: Option<String>,
    diagnostics: HashMap<String, String>,
    transport_fault: Option<TransportFault>,
    ambiguous: bool,
}

impl StoreError {
    /// Create an error whose status is the canonical code for `kind`.
    pub fn new(kind: ErrorKind, activity_id: Uuid, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: kind.status_code(),
            sub_status: None,
            activity_id,
            message: message.into(),
            lsn: None,
            partition_key_range_id: None,
            diagnostics: HashMap::new(),
            transport_fault: None,
            ambiguous: false,
        }
    }

    pub(crate) fn with_status(mut self, status: u16, sub_status: Option<u32>) -> Self {
        self.status = status;
        self.sub_status = sub_status;
        self
    }

    pub(crate) fn with_lsn(mut self, lsn: Option<i64>) -> Self {
        self.lsn = lsn;
        self
    }

    pub(crate) fn with_partition_key_range_id(mut self, id: Option<String>) -> Self {
        self.partition_key_range_id = id;
        self
    }

    pub(crate) fn with_diagnostic(mut self, name: &str, value: impl Into<String>) -> Self {
        self.diagnostics.insert(name.to_string(), value.into());
        self
    }

    pub(crate) fn with_transport_fault(mut self, fault: TransportFault) -> Self {
        self.transport_fault = Some(fault);
        self
    }

    pub(crate) fn with_ambiguous_outcome(mut self) -> Self {
        self.ambiguous = true;
        self
    }

    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[inline]
    pub fn status(&self) -> u16 {
        self.status
    }

    #[inline]
    pub fn sub_status(&self) -> Option<u32> {
        self.sub_status
    }

    #[inline]
    pub fn activity_id(&self) -> Uuid {
        self.activity_id
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn lsn(&self) -> Option<i64> {
        self.lsn
    }

    pub fn partition_key_range_id(&self) -> Option<&str> {
        self.partition_key_range_id.as_deref()
    }

    /// Server agent, server version and required-version values, when known.
    pub fn diagnostics(&self) -> &HashMap<String, String> {
        &self.diagnostics
    }

    pub fn diagnostic(&self, name: &str) -> Option<&str> {
        self.diagnostics.get(name).map(String::as_str)
    }

    /// The transport fault behind this error, if it was not a decoded response.
    pub fn transport_fault(&self) -> Option<TransportFault> {
        self.transport_fault
    }

    pub fn is_gone(&self) -> bool {
        matches!(self.kind, ErrorKind::Gone(_))
    }

    pub fn gone_kind(&self) -> Option<GoneKind> {
        match self.kind {
            ErrorKind::Gone(kind) => Some(kind),
            _ => None,
        }
    }

    /// Retry-after hint carried by `TooManyRequests`.
    pub fn retry_after(&self) -> Option<Duration> {
        match self.kind {
            ErrorKind::TooManyRequests { retry_after_ms } => {
                Some(Duration::from_millis(retry_after_ms))
            }
            _ => None,
        }
    }

    /// A non-read-only request failed after its bytes may have reached the
    /// replica; it may or may not have been applied.
    pub fn is_ambiguous(&self) -> bool {
        self.ambiguous
    }

    /// Propagation class, taking the transport outcome into account.
    ///
    /// An ambiguous `ServiceUnavailable` is `Fatal`: re-sending the write
    /// elsewhere could apply it twice.
    pub fn propagation(&self) -> Propagation {
        match self.kind {
            ErrorKind::ServiceUnavailable if self.ambiguous => Propagation::Fatal,
            kind => kind.propagation(),
        }
    }

    /// Copy of this error with a different kind, keeping every other field.
    pub(crate) fn reclassified(&self, kind: ErrorKind) -> Self {
        let mut error = self.clone();
        error.kind = kind;
        error.status = kind.status_code();
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_match_taxonomy() {
        assert_eq!(ErrorKind::Gone(GoneKind::Generic).status_code(), 410);
        assert_eq!(
            ErrorKind::TooManyRequests { retry_after_ms: 5 }.status_code(),
            429
        );
        assert_eq!(ErrorKind::RetryWith.status_code(), 449);
        assert_eq!(ErrorKind::ServiceUnavailable.status_code(), 503);
    }

    #[test]
    fn test_propagation_classes() {
        assert_eq!(
            ErrorKind::Gone(GoneKind::PartitionIsMigrating).propagation(),
            Propagation::RetryElsewhere
        );
        assert_eq!(
            ErrorKind::ServiceUnavailable.propagation(),
            Propagation::RetryElsewhere
        );
        assert_eq!(
            ErrorKind::TooManyRequests { retry_after_ms: 10 }.propagation(),
            Propagation::RetryHere
        );
        assert_eq!(ErrorKind::RequestTimeout.propagation(), Propagation::RetryHere);
        assert_eq!(ErrorKind::RetryWith.propagation(), Propagation::RetryHere);
        assert_eq!(ErrorKind::Conflict.propagation(), Propagation::Fatal);
        assert_eq!(ErrorKind::Locked.propagation(), Propagation::Fatal);
    }

    #[test]
    fn test_store_error_accessors() {
        let id = Uuid::new_v4();
        let err = StoreError::new(
            ErrorKind::TooManyRequests {
                retry_after_ms: 250,
            },
            id,
            "throttled",
        )
        .with_status(429, Some(3200))
        .with_lsn(Some(42))
        .with_partition_key_range_id(Some("7".to_string()));

        assert_eq!(err.activity_id(), id);
        assert_eq!(err.status(), 429);
        assert_eq!(err.sub_status(), Some(3200));
        assert_eq!(err.lsn(), Some(42));
        assert_eq!(err.partition_key_range_id(), Some("7"));
        assert_eq!(err.retry_after(), Some(Duration::from_millis(250)));
        assert!(!err.is_gone());
        assert!(err.to_string().contains("throttled"));
    }

    #[test]
    fn test_ambiguous_write_failure_is_not_retried_elsewhere() {
        let refused = StoreError::new(ErrorKind::ServiceUnavailable, Uuid::nil(), "refused")
            .with_transport_fault(TransportFault::Io);
        assert!(!refused.is_ambiguous());
        assert_eq!(refused.propagation(), Propagation::RetryElsewhere);

        let reset = StoreError::new(ErrorKind::ServiceUnavailable, Uuid::nil(), "reset")
            .with_transport_fault(TransportFault::Io)
            .with_ambiguous_outcome();
        assert!(reset.is_ambiguous());
        assert_eq!(reset.propagation(), Propagation::Fatal);

        let timed_out = StoreError::new(ErrorKind::RequestTimeout, Uuid::nil(), "write")
            .with_transport_fault(TransportFault::Timeout)
            .with_ambiguous_outcome();
        assert_eq!(timed_out.propagation(), Propagation::RetryHere);
    }

    #[test]
    fn test_reclassified_keeps_context() {
        let err = StoreError::new(ErrorKind::Gone(GoneKind::Generic), Uuid::nil(), "refused")
            .with_transport_fault(TransportFault::Io)
            .with_diagnostic(diagnostics::SERVER_AGENT, "agent");

        let reclassified = err.reclassified(ErrorKind::ServiceUnavailable);
        assert_eq!(reclassified.kind(), ErrorKind::ServiceUnavailable);
        assert_eq!(reclassified.status(), 503);
        assert_eq!(reclassified.transport_fault(), Some(TransportFault::Io));
        assert_eq!(
            reclassified.diagnostic(diagnostics::SERVER_AGENT),
            Some("agent")
        );
        assert_eq!(reclassified.message(), "refused");
    }
}
