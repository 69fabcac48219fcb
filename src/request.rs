//! Logical requests and responses.
//!
//! A [`StoreRequest`] is the already-resolved tuple the transport consumes:
//! operation, resource type, resource id, headers, optional body, activity id,
//! read-only flag and retry exemption. Headers are mapped onto request tokens
//! by name; decoded response tokens are rendered back into a header map.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use uuid::Uuid;

use crate::classify::is_success;
use crate::error::{Result, RntbdError};
use crate::protocol::tokens::{request, response};
use crate::protocol::{OperationType, ResourceType, TokenDef, TokenSchema, TokenType, TokenValue};

/// Caller predicate deciding whether a 404/409/412/429 comes back as data.
pub type RetryExemption = Arc<dyn Fn(u16, Option<u32>) -> bool + Send + Sync>;

/// One logical data-plane request against a single replica.
#[derive(Clone)]
pub struct StoreRequest {
    operation: OperationType,
    resource_type: ResourceType,
    resource_id: String,
    headers: HashMap<String, String>,
    body: Option<Bytes>,
    activity_id: Uuid,
    is_read_only: bool,
    retry_exemption: Option<RetryExemption>,
}

impl StoreRequest {
    /// Create a request with a fresh activity id.
    ///
    /// The read-only flag follows [`OperationType::is_read_only`] until
    /// overridden with [`StoreRequest::with_read_only`].
    pub fn new(
        operation: OperationType,
        resource_type: ResourceType,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            resource_type,
            resource_id: resource_id.into(),
            headers: HashMap::new(),
            body: None,
            activity_id: Uuid::new_v4(),
            is_read_only: operation.is_read_only(),
            retry_exemption: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_activity_id(mut self, activity_id: Uuid) -> Self {
        self.activity_id = activity_id;
        self
    }

    pub fn with_read_only(mut self, is_read_only: bool) -> Self {
        self.is_read_only = is_read_only;
        self
    }

    pub fn with_retry_exemption<F>(mut self, predicate: F) -> Self
    where
        F: Fn(u16, Option<u32>) -> bool + Send + Sync + 'static,
    {
        self.retry_exemption = Some(Arc::new(predicate));
        self
    }

    #[inline]
    pub fn operation(&self) -> OperationType {
        self.operation
    }

    #[inline]
    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    #[inline]
    pub fn activity_id(&self) -> Uuid {
        self.activity_id
    }

    #[inline]
    pub fn is_read_only(&self) -> bool {
        self.is_read_only
    }

    /// Whether the caller wants this status as data rather than an error.
    pub fn is_exempt_from_retry(&self, status: u16, sub_status: Option<u32>) -> bool {
        self.retry_exemption
            .as_ref()
            .is_some_and(|predicate| predicate(status, sub_status))
    }

    /// Build the request token metadata.
    ///
    /// Fails before any I/O when a header value cannot be converted to its
    /// token type. Headers without a token are not sent.
    pub(crate) fn to_metadata(
        &self,
        replica_path: Option<&str>,
        transport_request_id: u32,
    ) -> Result<TokenSchema> {
        let mut metadata = TokenSchema::new(&request::SCHEMA);

        if !self.resource_id.is_empty() {
            metadata.set(
                request::RESOURCE_ID,
                TokenValue::Bytes(Bytes::copy_from_slice(self.resource_id.as_bytes())),
            )?;
        }
        if let Some(path) = replica_path.filter(|p| !p.is_empty()) {
            metadata.set(request::REPLICA_PATH, TokenValue::String(path.to_string()))?;
        }
        metadata.set(
            request::TRANSPORT_REQUEST_ID,
            TokenValue::ULong32(transport_request_id),
        )?;

        for (name, value) in &self.headers {
            match request::SCHEMA.by_header(name) {
                Some(def) => metadata.set(def.id, header_token(def, name, value)?)?,
                None => tracing::trace!(header = %name, "Header has no request token; not sent"),
            }
        }

        Ok(metadata)
    }
}

impl fmt::Debug for StoreRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreRequest")
            .field("operation", &self.operation)
            .field("resource_type", &self.resource_type)
            .field("resource_id", &self.resource_id)
            .field("headers", &self.headers.len())
            .field("body", &self.body.as_ref().map(Bytes::len))
            .field("activity_id", &self.activity_id)
            .field("is_read_only", &self.is_read_only)
            .field("retry_exemption", &self.retry_exemption.is_some())
            .finish()
    }
}

fn header_token(def: &TokenDef, name: &str, value: &str) -> Result<TokenValue> {
    let invalid = |reason: String| RntbdError::InvalidHeader {
        name: name.to_string(),
        reason,
    };

    let value = value.trim();
    let token = match def.kind {
        TokenType::Byte => TokenValue::Byte(byte_header(def.id, value).ok_or_else(|| {
            invalid(format!("'{}' is not a recognized value", value))
        })?),
        TokenType::ULong32 => {
            TokenValue::ULong32(value.parse().map_err(|e| invalid(format!("{}", e)))?)
        }
        TokenType::LongLong64 => {
            TokenValue::LongLong64(value.parse().map_err(|e| invalid(format!("{}", e)))?)
        }
        TokenType::Double64 => {
            TokenValue::Double64(value.parse().map_err(|e| invalid(format!("{}", e)))?)
        }
        TokenType::SmallString => {
            if value.len() > u8::MAX as usize {
                return Err(invalid(format!("{} bytes exceeds 255", value.len())));
            }
            TokenValue::SmallString(value.to_string())
        }
        TokenType::String => TokenValue::String(value.to_string()),
        TokenType::Bytes => TokenValue::Bytes(Bytes::copy_from_slice(value.as_bytes())),
    };
    Ok(token)
}

/// Byte-valued headers: flags, plus the few enumerations sent as names.
fn byte_header(id: u16, value: &str) -> Option<u8> {
    const CONSISTENCY: [&str; 5] = ["Strong", "BoundedStaleness", "Session", "Eventual", "ConsistentPrefix"];
    const INDEXING: [&str; 3] = ["Default", "Include", "Exclude"];

    let named = |names: &[&str]| {
        names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(value))
            .and_then(|i| u8::try_from(i).ok())
    };

    match id {
        request::CONSISTENCY_LEVEL => named(&CONSISTENCY),
        request::INDEXING_DIRECTIVE => named(&INDEXING),
        _ if value.eq_ignore_ascii_case("true") => Some(1),
        _ if value.eq_ignore_ascii_case("false") => Some(0),
        _ => value.parse().ok(),
    }
}

/// A decoded response: status, echoed activity id, tokens and optional body.
#[derive(Debug, Clone)]
pub struct StoreResponse {
    status: u16,
    activity_id: Uuid,
    metadata: TokenSchema,
    headers: HashMap<String, String>,
    body: Option<Bytes>,
}

impl StoreResponse {
    pub(crate) fn new(
        status: u16,
        activity_id: Uuid,
        metadata: TokenSchema,
        body: Option<Bytes>,
    ) -> Self {
        let headers = metadata
            .present()
            .filter_map(|token| {
                let header = token.header()?;
                let value = token.value()?;
                Some((header.to_string(), value.to_header_value()))
            })
            .collect();

        Self {
            status,
            activity_id,
            metadata,
            headers,
            body,
        }
    }

    #[inline]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Whether the status is a true success (2xx or 304), as opposed to an
    /// exempted error status returned as data.
    #[inline]
    pub fn is_success(&self) -> bool {
        is_success(self.status)
    }

    #[inline]
    pub fn activity_id(&self) -> Uuid {
        self.activity_id
    }

    /// Response tokens rendered under their header names.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Raw decoded response tokens.
    pub fn metadata(&self) -> &TokenSchema {
        &self.metadata
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub fn into_body(self) -> Option<Bytes> {
        self.body
    }

    pub fn lsn(&self) -> Option<i64> {
        self.metadata.i64(response::LSN)
    }

    pub fn global_committed_lsn(&self) -> Option<i64> {
        self.metadata.i64(response::GLOBAL_COMMITTED_LSN)
    }

    pub fn item_count(&self) -> Option<u32> {
        self.metadata.u32(response::ITEM_COUNT)
    }

    pub fn request_charge(&self) -> Option<f64> {
        self.metadata.f64(response::REQUEST_CHARGE)
    }

    pub fn session_token(&self) -> Option<&str> {
        self.metadata.str(response::SESSION_TOKEN)
    }

    pub fn continuation(&self) -> Option<&str> {
        self.metadata.str(response::CONTINUATION_TOKEN)
    }

    pub fn etag(&self) -> Option<&str> {
        self.metadata.str(response::ETAG)
    }

    pub fn sub_status(&self) -> Option<u32> {
        self.metadata.u32(response::SUB_STATUS)
    }

    pub fn partition_key_range_id(&self) -> Option<&str> {
        self.metadata.str(response::PARTITION_KEY_RANGE_ID)
    }

    pub fn retry_after(&self) -> Option<Duration> {
        self.metadata
            .u32(response::RETRY_AFTER_MILLISECONDS)
            .map(|ms| Duration::from_millis(u64::from(ms)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_only_derived_from_operation() {
        let read = StoreRequest::new(OperationType::Read, ResourceType::Document, "AbC123=");
        assert!(read.is_read_only());

        let create = StoreRequest::new(OperationType::Create, ResourceType::Document, "AbC123=");
        assert!(!create.is_read_only());

        let forced = create.with_read_only(true);
        assert!(forced.is_read_only());
    }

    #[test]
    fn test_retry_exemption() {
        let plain = StoreRequest::new(OperationType::Read, ResourceType::Document, "x");
        assert!(!plain.is_exempt_from_retry(404, None));

        let exempt = plain.with_retry_exemption(|status, _| status == 404);
        assert!(exempt.is_exempt_from_retry(404, None));
        assert!(!exempt.is_exempt_from_retry(409, None));
    }

    #[test]
    fn test_metadata_maps_headers_to_tokens() {
        let request = StoreRequest::new(OperationType::Query, ResourceType::Document, "AbC123=")
            .with_header("x-ms-session-token", "0:1#42")
            .with_header("X-MS-MAX-ITEM-COUNT", "25")
            .with_header("x-ms-consistency-level", "Session")
            .with_header("x-ms-documentdb-query-enable-scan", "true")
            .with_header("x-ms-target-lsn", "-1")
            .with_header("x-unmapped", "ignored");

        let metadata = request.to_metadata(Some("/apps/a/services/b/"), 9).unwrap();

        assert_eq!(
            metadata.bytes(request::RESOURCE_ID).map(|b| &b[..]),
            Some(&b"AbC123="[..])
        );
        assert_eq!(metadata.str(request::REPLICA_PATH), Some("/apps/a/services/b/"));
        assert_eq!(metadata.u32(request::TRANSPORT_REQUEST_ID), Some(9));
        assert_eq!(metadata.str(request::SESSION_TOKEN), Some("0:1#42"));
        assert_eq!(metadata.u32(request::PAGE_SIZE), Some(25));
        assert_eq!(metadata.byte(request::CONSISTENCY_LEVEL), Some(2));
        assert_eq!(metadata.byte(request::ENABLE_SCAN_IN_QUERY), Some(1));
        assert_eq!(metadata.i64(request::TARGET_LSN), Some(-1));
        assert_eq!(metadata.present_count(), 8);
    }

    #[test]
    fn test_unparsable_header_is_rejected() {
        let request = StoreRequest::new(OperationType::ReadFeed, ResourceType::Document, "x")
            .with_header("x-ms-max-item-count", "lots");

        let err = request.to_metadata(None, 1).unwrap_err();
        assert!(matches!(
            err,
            RntbdError::InvalidHeader { ref name, .. } if name == "x-ms-max-item-count"
        ));
    }

    #[test]
    fn test_unknown_consistency_level_is_rejected() {
        let request = StoreRequest::new(OperationType::Read, ResourceType::Document, "x")
            .with_header("x-ms-consistency-level", "Linearizable");
        assert!(request.to_metadata(None, 1).is_err());
    }

    #[test]
    fn test_response_accessors_and_headers() {
        let mut metadata = TokenSchema::new(&response::SCHEMA);
        metadata.set(response::PAYLOAD_PRESENT, TokenValue::Byte(1)).unwrap();
        metadata.set(response::ITEM_COUNT, TokenValue::ULong32(1)).unwrap();
        metadata.set(response::LSN, TokenValue::LongLong64(77)).unwrap();
        metadata
            .set(response::REQUEST_CHARGE, TokenValue::Double64(2.5))
            .unwrap();
        metadata
            .set(response::SESSION_TOKEN, TokenValue::String("0:77".into()))
            .unwrap();
        metadata
            .set(response::RETRY_AFTER_MILLISECONDS, TokenValue::ULong32(120))
            .unwrap();

        let id = Uuid::new_v4();
        let response = StoreResponse::new(200, id, metadata, Some(Bytes::from_static(b"{}")));

        assert!(response.is_success());
        assert_eq!(response.activity_id(), id);
        assert_eq!(response.item_count(), Some(1));
        assert_eq!(response.lsn(), Some(77));
        assert_eq!(response.request_charge(), Some(2.5));
        assert_eq!(response.session_token(), Some("0:77"));
        assert_eq!(response.retry_after(), Some(Duration::from_millis(120)));
        assert_eq!(response.header("x-ms-item-count"), Some("1"));
        assert_eq!(response.header("LSN"), Some("77"));
        assert_eq!(response.header("x-ms-request-charge"), Some("2.5"));
        assert!(response.continuation().is_none());
        // Payload-present has no header name.
        assert_eq!(response.headers().len(), 5);
    }
}
