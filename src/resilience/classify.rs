use std::time::Duration;

use http::{header, HeaderMap, StatusCode};

use super::{ErrorKind, ErrorRecord};
use crate::transport::{TransportError, TransportErrorKind, TransportResponse};

/// Longest body excerpt kept in a failure message
const MESSAGE_LIMIT: usize = 200;

/// Raw outcome of a failed attempt, before classification
#[derive(Debug, Clone)]
pub enum Failure {
    /// No response was obtained
    Transport(TransportError),
    /// The backend answered with a non-success status
    Status {
        status: StatusCode,
        retry_after: Option<u64>,
        message: String,
    },
    /// The attempt did not finish within the per-attempt timeout
    Timeout(Duration),
}

impl Failure {
    /// Failure for a non-2xx response
    pub fn from_response(response: &TransportResponse) -> Self {
        let body = String::from_utf8_lossy(&response.body);
        let message: String = body.trim().chars().take(MESSAGE_LIMIT).collect();

        Failure::Status {
            status: response.status,
            retry_after: parse_retry_after(&response.headers),
            message: if message.is_empty() {
                response.status.to_string()
            } else {
                message
            },
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Failure::Transport(err) => write!(f, "{err}"),
            Failure::Status {
                status, message, ..
            } => write!(f, "HTTP {}: {message}", status.as_u16()),
            Failure::Timeout(timeout) => {
                write!(f, "attempt timed out after {}ms", timeout.as_millis())
            }
        }
    }
}

impl From<TransportError> for Failure {
    fn from(err: TransportError) -> Self {
        Failure::Transport(err)
    }
}

pub fn kind_for_status(status: StatusCode) -> ErrorKind {
    match status.as_u16() {
        401 => ErrorKind::Authentication,
        403 => ErrorKind::Authorization,
        404 => ErrorKind::NotFound,
        408 => ErrorKind::Timeout,
        429 => ErrorKind::RateLimited,
        500..=599 => ErrorKind::Server,
        _ => ErrorKind::Validation,
    }
}

pub fn kind_for_transport(kind: TransportErrorKind) -> ErrorKind {
    match kind {
        TransportErrorKind::Timeout => ErrorKind::Timeout,
        TransportErrorKind::InvalidRequest => ErrorKind::Validation,
        TransportErrorKind::Connect | TransportErrorKind::Io => ErrorKind::Network,
    }
}

/// `Retry-After` in delta-seconds; HTTP-date values are ignored.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Turn a failed attempt into an immutable error record.
pub fn classify(failure: &Failure, endpoint: Option<&str>) -> ErrorRecord {
    match failure {
        Failure::Transport(err) => ErrorRecord::new(kind_for_transport(err.kind), None, None, endpoint),
        Failure::Status {
            status,
            retry_after,
            ..
        } => {
            let kind = kind_for_status(*status);
            // only rate limiting honors the hint
            let retry_after = retry_after.filter(|_| kind == ErrorKind::RateLimited);
            ErrorRecord::new(kind, Some(status.as_u16()), retry_after, endpoint)
        }
        Failure::Timeout(_) => ErrorRecord::new(ErrorKind::Timeout, None, None, endpoint),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_status_taxonomy() {
        let test_cases = [
            (400, ErrorKind::Validation, false),
            (401, ErrorKind::Authentication, false),
            (403, ErrorKind::Authorization, false),
            (404, ErrorKind::NotFound, false),
            (408, ErrorKind::Timeout, true),
            (409, ErrorKind::Validation, false),
            (429, ErrorKind::RateLimited, true),
            (500, ErrorKind::Server, true),
            (503, ErrorKind::Server, true),
        ];

        for (code, kind, retryable) in test_cases {
            let failure = Failure::Status {
                status: StatusCode::from_u16(code).unwrap(),
                retry_after: None,
                message: String::new(),
            };
            let record = classify(&failure, Some("/rest/api/2/issue"));
            assert_eq!(record.kind, kind, "{code}");
            assert_eq!(record.retryable, retryable, "{code}");
            assert_eq!(record.status_code, Some(code));
            assert_eq!(record.endpoint.as_deref(), Some("/rest/api/2/issue"));
        }
    }

    #[test]
    fn test_transport_and_timeout_are_retryable() {
        let record = classify(&TransportError::connect("refused").into(), None);
        assert_eq!(record.kind, ErrorKind::Network);
        assert!(record.retryable);

        let record = classify(&Failure::Timeout(Duration::from_secs(1)), None);
        assert_eq!(record.kind, ErrorKind::Timeout);
        assert!(record.retryable);
    }

    #[test]
    fn test_retry_after_from_response() {
        let mut response = TransportResponse::new(StatusCode::TOO_MANY_REQUESTS, "slow down");
        response
            .headers
            .insert(header::RETRY_AFTER, HeaderValue::from_static("7"));

        let failure = Failure::from_response(&response);
        let record = classify(&failure, None);
        assert_eq!(record.kind, ErrorKind::RateLimited);
        assert_eq!(record.retry_after_seconds, Some(7));
        assert_eq!(failure.to_string(), "HTTP 429: slow down");
    }

    #[test]
    fn test_retry_after_ignored_for_other_statuses() {
        let mut response = TransportResponse::new(StatusCode::SERVICE_UNAVAILABLE, "");
        response
            .headers
            .insert(header::RETRY_AFTER, HeaderValue::from_static("7"));

        let record = classify(&Failure::from_response(&response), None);
        assert_eq!(record.retry_after_seconds, None);
    }
}
