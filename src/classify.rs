//! Mapping from wire statuses and transport failures to [`ErrorKind`].
//!
//! Both transports share this table. Callers hand in primitive data only,
//! so every row is testable without a stream.
//!
//! | status | substatus | outcome                                   |
//! |--------|-----------|-------------------------------------------|
//! | 2xx, 304 | -       | success                                   |
//! | 400    | -         | BadRequest                                |
//! | 401    | -         | Unauthorized                              |
//! | 403    | -         | Forbidden                                 |
//! | 404    | -         | Gone(Generic) if the body is HTML, else NotFound* |
//! | 405    | -         | MethodNotAllowed                          |
//! | 408    | -         | RequestTimeout                            |
//! | 409    | -         | Conflict*                                 |
//! | 410    | 1000/1002/1007/1008/other | Gone(refined)             |
//! | 412    | -         | PreconditionFailed*                       |
//! | 413    | -         | RequestEntityTooLarge                     |
//! | 423    | -         | Locked                                    |
//! | 429    | -         | TooManyRequests*                          |
//! | 449    | -         | RetryWith                                 |
//! | 500    | -         | InternalServerError                       |
//! | 503    | -         | ServiceUnavailable                        |
//! | other  | -         | InternalServerError, logged at `error!`   |
//!
//! Rows marked `*` pass through as data when the request's retry exemption
//! accepts the status.

use serde::Deserialize;

use crate::error::{ErrorKind, GoneKind, RntbdError, TransportFault};

/// Substatus codes that refine a 410.
pub mod sub_status {
    pub const NAME_CACHE_IS_STALE: u32 = 1000;
    pub const PARTITION_KEY_RANGE_GONE: u32 = 1002;
    pub const COMPLETING_SPLIT: u32 = 1007;
    pub const COMPLETING_PARTITION_MIGRATION: u32 = 1008;
}

/// Result of classifying a decoded response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusOutcome {
    Success,
    /// An error status the request asked to receive as data.
    PassThrough,
    Error(ErrorKind),
}

/// Whether a status is a success: any 2xx, plus 304 Not Modified.
#[inline]
pub fn is_success(status: u16) -> bool {
    (200..300).contains(&status) || status == 304
}

/// Classify a decoded response status.
///
/// `content_type` is the HTTP `Content-Type` for the HTTP variant, or the
/// sniffed type of the error body for the binary transport (see
/// [`sniff_content_type`]). `exempt` is consulted only for 404, 409, 412
/// and 429.
pub fn classify_status(
    status: u16,
    sub_status: Option<u32>,
    retry_after_ms: Option<u64>,
    content_type: Option<&str>,
    exempt: &dyn Fn(u16, Option<u32>) -> bool,
) -> StatusOutcome {
    if is_success(status) {
        return StatusOutcome::Success;
    }

    let kind = match status {
        400 => ErrorKind::BadRequest,
        401 => ErrorKind::Unauthorized,
        403 => ErrorKind::Forbidden,
        // No listener behind the address answers with an HTML page.
        404 if content_type.is_some_and(is_html_content_type) => {
            ErrorKind::Gone(GoneKind::Generic)
        }
        404 => ErrorKind::NotFound,
        405 => ErrorKind::MethodNotAllowed,
        408 => ErrorKind::RequestTimeout,
        409 => ErrorKind::Conflict,
        410 => ErrorKind::Gone(gone_kind(sub_status)),
        412 => ErrorKind::PreconditionFailed,
        413 => ErrorKind::RequestEntityTooLarge,
        423 => ErrorKind::Locked,
        429 => ErrorKind::TooManyRequests {
            retry_after_ms: retry_after_ms.unwrap_or(0),
        },
        449 => ErrorKind::RetryWith,
        500 => ErrorKind::InternalServerError,
        503 => ErrorKind::ServiceUnavailable,
        _ => {
            tracing::error!(status, ?sub_status, "Unexpected status code from backend");
            ErrorKind::InternalServerError
        }
    };

    let exemptible = matches!(
        kind,
        ErrorKind::NotFound
            | ErrorKind::Conflict
            | ErrorKind::PreconditionFailed
            | ErrorKind::TooManyRequests { .. }
    );
    if exemptible && exempt(status, sub_status) {
        return StatusOutcome::PassThrough;
    }

    StatusOutcome::Error(kind)
}

fn gone_kind(sub_status: Option<u32>) -> GoneKind {
    match sub_status {
        Some(sub_status::NAME_CACHE_IS_STALE) => GoneKind::InvalidPartition,
        Some(sub_status::PARTITION_KEY_RANGE_GONE) => GoneKind::PartitionKeyRangeGone,
        Some(sub_status::COMPLETING_SPLIT) => GoneKind::PartitionKeyRangeIsSplitting,
        Some(sub_status::COMPLETING_PARTITION_MIGRATION) => GoneKind::PartitionIsMigrating,
        _ => GoneKind::Generic,
    }
}

/// Classify a transport failure that produced no decoded response.
///
/// Read-only requests (and the handshake, which callers pass as read-only)
/// map to `Gone`; anything else maps to `RequestTimeout` when a timer won
/// the race and `ServiceUnavailable` otherwise, never to `Gone`.
pub fn classify_transport_failure(
    error: &RntbdError,
    is_read_only: bool,
) -> (ErrorKind, TransportFault) {
    let fault = transport_fault(error);
    (transport_fault_kind(fault, is_read_only), fault)
}

/// The error kind a transport fault maps to for a request of the given kind.
pub fn transport_fault_kind(fault: TransportFault, is_read_only: bool) -> ErrorKind {
    match (is_read_only, fault) {
        (true, _) => ErrorKind::Gone(GoneKind::Generic),
        (false, TransportFault::Timeout) => ErrorKind::RequestTimeout,
        (false, TransportFault::Io) => ErrorKind::ServiceUnavailable,
    }
}

fn transport_fault(error: &RntbdError) -> TransportFault {
    match error {
        RntbdError::Timeout { .. } => TransportFault::Timeout,
        _ => TransportFault::Io,
    }
}

pub fn is_html_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("text/html"))
}

/// Content type inferred from an error body: `text/html` or JSON.
pub fn sniff_content_type(body: &[u8]) -> Option<&'static str> {
    let start = body
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(body.len());
    let head = &body[start..];

    let starts_with = |prefix: &[u8]| {
        head.len() >= prefix.len() && head[..prefix.len()].eq_ignore_ascii_case(prefix)
    };

    if starts_with(b"<html") || starts_with(b"<!doctype html") {
        Some("text/html")
    } else if head.first() == Some(&b'{') {
        Some("application/json")
    } else {
        None
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Human-readable message from a non-success body.
///
/// Bodies are `{"code": ..., "message": ...}` JSON; anything else is
/// returned as lossy UTF-8.
pub fn error_message(body: &[u8]) -> String {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(ErrorBody {
            code: Some(code),
            message: Some(message),
        }) => format!("{}: {}", code, message),
        Ok(ErrorBody {
            message: Some(message),
            ..
        }) => message,
        Ok(ErrorBody {
            code: Some(code), ..
        }) => code,
        _ => String::from_utf8_lossy(body).trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn never(_: u16, _: Option<u32>) -> bool {
        false
    }

    fn always(_: u16, _: Option<u32>) -> bool {
        true
    }

    fn kind(status: u16, sub: Option<u32>) -> ErrorKind {
        match classify_status(status, sub, None, None, &never) {
            StatusOutcome::Error(kind) => kind,
            other => panic!("{} classified as {:?}", status, other),
        }
    }

    #[test]
    fn test_status_table() {
        let table = [
            (400, None, ErrorKind::BadRequest),
            (401, None, ErrorKind::Unauthorized),
            (403, None, ErrorKind::Forbidden),
            (404, None, ErrorKind::NotFound),
            (405, None, ErrorKind::MethodNotAllowed),
            (408, None, ErrorKind::RequestTimeout),
            (409, None, ErrorKind::Conflict),
            (410, Some(1000), ErrorKind::Gone(GoneKind::InvalidPartition)),
            (410, Some(1002), ErrorKind::Gone(GoneKind::PartitionKeyRangeGone)),
            (410, Some(1007), ErrorKind::Gone(GoneKind::PartitionKeyRangeIsSplitting)),
            (410, Some(1008), ErrorKind::Gone(GoneKind::PartitionIsMigrating)),
            (410, Some(9999), ErrorKind::Gone(GoneKind::Generic)),
            (410, None, ErrorKind::Gone(GoneKind::Generic)),
            (412, None, ErrorKind::PreconditionFailed),
            (413, None, ErrorKind::RequestEntityTooLarge),
            (423, None, ErrorKind::Locked),
            (429, None, ErrorKind::TooManyRequests { retry_after_ms: 0 }),
            (449, None, ErrorKind::RetryWith),
            (500, None, ErrorKind::InternalServerError),
            (503, None, ErrorKind::ServiceUnavailable),
        ];
        for (status, sub, expected) in table {
            assert_eq!(kind(status, sub), expected, "status {} sub {:?}", status, sub);
        }
    }

    #[test]
    fn test_unknown_status_is_internal_server_error() {
        assert_eq!(kind(418, None), ErrorKind::InternalServerError);
        assert_eq!(kind(302, None), ErrorKind::InternalServerError);
        assert_eq!(kind(599, Some(1)), ErrorKind::InternalServerError);
    }

    #[test]
    fn test_success_set() {
        for status in [200, 201, 204, 299, 304] {
            assert_eq!(
                classify_status(status, None, None, None, &never),
                StatusOutcome::Success
            );
        }
        assert!(!is_success(300));
        assert!(!is_success(199));
    }

    #[test]
    fn test_retry_after_carried_on_throttle() {
        let outcome = classify_status(429, Some(3200), Some(750), None, &never);
        assert_eq!(
            outcome,
            StatusOutcome::Error(ErrorKind::TooManyRequests { retry_after_ms: 750 })
        );
    }

    #[test]
    fn test_html_404_is_gone() {
        let outcome = classify_status(404, None, None, Some("text/html; charset=utf-8"), &never);
        assert_eq!(outcome, StatusOutcome::Error(ErrorKind::Gone(GoneKind::Generic)));

        let outcome = classify_status(404, None, None, Some("application/json"), &never);
        assert_eq!(outcome, StatusOutcome::Error(ErrorKind::NotFound));
    }

    #[test]
    fn test_html_404_ignores_exemption() {
        let outcome = classify_status(404, None, None, Some("text/html"), &always);
        assert_eq!(outcome, StatusOutcome::Error(ErrorKind::Gone(GoneKind::Generic)));
    }

    #[test]
    fn test_exemption_only_for_listed_statuses() {
        for status in [404, 409, 412, 429] {
            assert_eq!(
                classify_status(status, None, None, None, &always),
                StatusOutcome::PassThrough,
                "status {}",
                status
            );
        }
        for status in [400, 401, 403, 410, 413, 449, 500, 503] {
            assert!(
                matches!(
                    classify_status(status, None, None, None, &always),
                    StatusOutcome::Error(_)
                ),
                "status {}",
                status
            );
        }
    }

    #[test]
    fn test_exemption_sees_substatus() {
        let only_1002 = |_: u16, sub: Option<u32>| sub == Some(1002);
        assert_eq!(
            classify_status(404, Some(1002), None, None, &only_1002),
            StatusOutcome::PassThrough
        );
        assert_eq!(
            classify_status(404, None, None, None, &only_1002),
            StatusOutcome::Error(ErrorKind::NotFound)
        );
    }

    #[test]
    fn test_transport_failure_asymmetry() {
        let io = RntbdError::Io(std::io::Error::from(std::io::ErrorKind::ConnectionRefused));
        let timeout = RntbdError::Timeout {
            operation: "write",
            elapsed: Duration::from_secs(1),
        };

        assert_eq!(
            classify_transport_failure(&io, true),
            (ErrorKind::Gone(GoneKind::Generic), TransportFault::Io)
        );
        assert_eq!(
            classify_transport_failure(&timeout, true),
            (ErrorKind::Gone(GoneKind::Generic), TransportFault::Timeout)
        );
        assert_eq!(
            classify_transport_failure(&io, false),
            (ErrorKind::ServiceUnavailable, TransportFault::Io)
        );
        assert_eq!(
            classify_transport_failure(&timeout, false),
            (ErrorKind::RequestTimeout, TransportFault::Timeout)
        );

        let closed = RntbdError::ChannelClosed { read: 0, expected: 24 };
        let (kind, _) = classify_transport_failure(&closed, false);
        assert!(!matches!(kind, ErrorKind::Gone(_)));
    }

    #[test]
    fn test_sniff_content_type() {
        assert_eq!(sniff_content_type(b"  <HTML><body>"), Some("text/html"));
        assert_eq!(sniff_content_type(b"<!DOCTYPE html>"), Some("text/html"));
        assert_eq!(sniff_content_type(b"\n{\"code\":\"x\"}"), Some("application/json"));
        assert_eq!(sniff_content_type(b"plain"), None);
        assert_eq!(sniff_content_type(b""), None);
    }

    #[test]
    fn test_error_message() {
        assert_eq!(
            error_message(br#"{"code":"NotFound","message":"Entity does not exist"}"#),
            "NotFound: Entity does not exist"
        );
        assert_eq!(error_message(br#"{"message":"only message"}"#), "only message");
        assert_eq!(error_message(b"  raw text \n"), "raw text");
    }
}
