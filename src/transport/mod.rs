//! Transport plumbing shared by the resolver, the negotiator and the
//! orchestrator.
//!
//! The concrete HTTP client is injected through [`Transport`]; this module
//! only shapes requests (base url, query string, authorization) and carries
//! the raw exchange types.

pub mod credentials;

#[cfg(test)]
pub(crate) mod testing;

use std::{fmt, sync::Arc, time::Duration};

use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue, Method, StatusCode};

use crate::core::{CredentialProvider, Transport};

pub use credentials::{BasicCredentials, BearerToken, NoCredentials};

/// A request ready to be handed to the transport
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// Raw response as returned by the transport
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// JSON response with the matching content type header
    pub fn json(status: StatusCode, value: &serde_json::Value) -> Self {
        let mut response = Self::new(status, value.to_string());
        response.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        response
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connection could not be established or was reset
    Connect,
    /// The transport gave up waiting for the backend
    Timeout,
    /// Reading or writing the exchange failed midway
    Io,
    /// The request could not be built or sent as given
    InvalidRequest,
}

/// Failure to obtain any response from the backend
#[derive(Debug, Clone)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Connect, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for TransportError {}

/// A configured backend target: base url, credentials and the transport
pub struct BackendClient {
    base_url: String,
    timeout: Duration,
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialProvider>,
}

impl BackendClient {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            transport,
            credentials,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Build a request for `endpoint` with JSON defaults and authorization
    pub fn build_request(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(String, String)],
        body: Option<Bytes>,
    ) -> TransportRequest {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        if body.is_some() {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
        }
        if let Some(auth) = self.credentials.authorization() {
            headers.insert(header::AUTHORIZATION, auth);
        }

        TransportRequest {
            method,
            url: build_url(&self.base_url, endpoint, query),
            headers,
            body,
        }
    }

    /// Send with the backend's default timeout
    pub async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        self.send_with_timeout(request, self.timeout).await
    }

    pub async fn send_with_timeout(
        &self,
        request: TransportRequest,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        log::trace!("{} {}", request.method, request.url);
        self.transport.send(request, timeout).await
    }

    /// Convenience GET used by lookups and probes
    pub async fn get(
        &self,
        endpoint: &str,
        query: &[(String, String)],
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        let request = self.build_request(Method::GET, endpoint, query, None);
        self.send_with_timeout(request, timeout).await
    }
}

/// Join base url, endpoint and an encoded query string.
pub fn build_url(base_url: &str, endpoint: &str, query: &[(String, String)]) -> String {
    let mut url = String::with_capacity(base_url.len() + endpoint.len() + 16);
    url.push_str(base_url.trim_end_matches('/'));
    if !endpoint.starts_with('/') {
        url.push('/');
    }
    url.push_str(endpoint);

    if !query.is_empty() {
        let encoded: Vec<String> = query
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect();
        url.push(if endpoint.contains('?') { '&' } else { '?' });
        url.push_str(&encoded.join("&"));
    }

    url
}
