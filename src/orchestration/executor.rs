//! Request execution orchestration
//!
//! This module moves one backend call through its adaptation steps:
//! endpoint validation, content conversion, identifier resolution, the
//! resilient transport call and response decoding.

use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, Method};
use serde::Serialize;
use serde_json::{json, Value};

use super::EndpointRouter;
use crate::{
    convert::{is_document_value, to_markup, ConversionOptions, Node},
    core::{AdaptResult, RequestContext},
    identity::{IdentifierResolver, ResolveOptions},
    resilience::{Failure, ResilienceController},
    revision::{RevisionNegotiator, REVISION_PLACEHOLDER},
    transport::BackendClient,
    utils::response::parse_body,
};

/// Keys looked up, in order, when an identifier field holds an object
const IDENTIFIER_KEYS: [&str; 4] = ["accountId", "id", "name", "emailAddress"];

#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<Value>,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    /// Convert structured documents in the body to markup
    pub convert_content: bool,
    /// Replace user identifiers in `identifier_fields` with canonical keys
    pub resolve_identifiers: bool,
    pub identifier_fields: Vec<String>,
    pub request_id: Option<String>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            body: None,
            query: Vec::new(),
            headers: HeaderMap::new(),
            convert_content: true,
            resolve_identifiers: true,
            identifier_fields: vec!["assignee".to_string(), "reporter".to_string()],
            request_id: None,
        }
    }
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post(body: Value) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            ..Default::default()
        }
    }

    pub fn put(body: Value) -> Self {
        Self {
            method: Method::PUT,
            body: Some(body),
            ..Default::default()
        }
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

/// Outcome of a successful request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResult {
    pub data: Value,
    pub status: u16,
    pub endpoint: String,
    pub conversion_applied: bool,
    pub identifier_resolution_applied: bool,
    pub warnings: Vec<String>,
    pub response_time_ms: u64,
    pub request_id: String,
}

/// Orchestrates one backend call through the adaptation pipeline
pub struct RequestExecutor {
    backend: Arc<BackendClient>,
    controller: Arc<ResilienceController>,
    resolver: Arc<IdentifierResolver>,
    negotiator: Arc<RevisionNegotiator>,
    router: EndpointRouter,
    conversion: ConversionOptions,
}

impl RequestExecutor {
    pub fn new(
        backend: Arc<BackendClient>,
        controller: Arc<ResilienceController>,
        resolver: Arc<IdentifierResolver>,
        negotiator: Arc<RevisionNegotiator>,
        router: EndpointRouter,
        conversion: ConversionOptions,
    ) -> Self {
        Self {
            backend,
            controller,
            resolver,
            negotiator,
            router,
            conversion,
        }
    }

    /// Execute the complete request pipeline
    pub async fn request(&self, endpoint: &str, options: RequestOptions) -> AdaptResult<RequestResult> {
        let mut ctx = RequestContext::new(options.request_id.clone());
        let endpoint = self.resolve_endpoint(endpoint).await?;

        let mut body = options.body;
        if let Some(body) = body.as_mut() {
            if options.convert_content {
                self.convert_documents(body, &mut ctx);
            }
            if options.resolve_identifiers {
                self.resolve_identifiers(body, &options.identifier_fields, &mut ctx)
                    .await;
            }
        }

        let payload = body
            .as_ref()
            .map(serde_json::to_vec)
            .transpose()?
            .map(Bytes::from);
        let mut request = self
            .backend
            .build_request(options.method, &endpoint, &options.query, payload);
        // caller headers replace built-in ones, keeping every caller value
        for name in options.headers.keys() {
            request.headers.remove(name);
        }
        for (name, value) in options.headers.iter() {
            request.headers.append(name.clone(), value.clone());
        }

        let backend = &self.backend;
        let response = self
            .controller
            .execute(
                || {
                    let request = request.clone();
                    async move {
                        match backend.send(request).await {
                            Ok(response) if response.status.is_success() => Ok(response),
                            Ok(response) => Err(Failure::from_response(&response)),
                            Err(err) => Err(Failure::Transport(err)),
                        }
                    }
                },
                Some(endpoint.as_str()),
                Some(ctx.request_id.as_str()),
            )
            .await?;

        let data = parse_body(&response)?;
        log::debug!(
            "Request {} to {} completed with {} in {}ms",
            ctx.request_id,
            endpoint,
            response.status,
            ctx.elapsed_ms()
        );

        Ok(RequestResult {
            data,
            status: response.status.as_u16(),
            endpoint,
            conversion_applied: ctx.conversion_applied,
            identifier_resolution_applied: ctx.identifier_resolution_applied,
            response_time_ms: ctx.elapsed_ms(),
            warnings: ctx.take_warnings(),
            request_id: ctx.request_id,
        })
    }

    /// Validate the endpoint, substituting the negotiated revision if needed.
    ///
    /// Templates are checked with the fallback revision first so a bad
    /// endpoint never triggers probing.
    async fn resolve_endpoint(&self, endpoint: &str) -> AdaptResult<String> {
        if !endpoint.contains(REVISION_PLACEHOLDER) {
            self.router.validate(endpoint)?;
            return Ok(endpoint.to_string());
        }

        self.router.resolve(endpoint, self.negotiator.fallback())?;
        let revision = self.negotiator.negotiate_best_revision().await;
        self.router.resolve(endpoint, &revision)
    }

    fn convert_documents(&self, body: &mut Value, ctx: &mut RequestContext) {
        let Value::Object(map) = body else {
            return;
        };

        for (key, value) in map.iter_mut() {
            if key == "fields" {
                if let Value::Object(fields) = value {
                    for (name, field) in fields.iter_mut() {
                        self.convert_field(&format!("fields.{name}"), field, ctx);
                    }
                    continue;
                }
            }
            self.convert_field(key, value, ctx);
        }
    }

    fn convert_field(&self, path: &str, value: &mut Value, ctx: &mut RequestContext) {
        if !is_document_value(value) {
            return;
        }

        let node: Node = match serde_json::from_value(value.clone()) {
            Ok(node) => node,
            Err(err) => {
                ctx.warn(format!("{path}: malformed document left unchanged ({err})"));
                return;
            }
        };

        let result = to_markup(&node, &self.conversion);
        ctx.warn(format!("{path}: structured document converted to markup"));
        if result.used_fallback {
            ctx.warn(format!("{path}: converted as plain text"));
        }
        for warning in result.warnings {
            ctx.warn(format!("{path}: {warning}"));
        }

        *value = Value::String(result.content);
        ctx.conversion_applied = true;
    }

    async fn resolve_identifiers(&self, body: &mut Value, fields: &[String], ctx: &mut RequestContext) {
        let Value::Object(map) = body else {
            return;
        };

        for name in fields {
            if let Some(value) = map.get_mut(name) {
                self.resolve_field(name, value, ctx).await;
            }
            if let Some(Value::Object(inner)) = map.get_mut("fields") {
                if let Some(value) = inner.get_mut(name) {
                    self.resolve_field(&format!("fields.{name}"), value, ctx)
                        .await;
                }
            }
        }
    }

    async fn resolve_field(&self, path: &str, value: &mut Value, ctx: &mut RequestContext) {
        let identifier = match value {
            Value::String(identifier) => identifier.clone(),
            Value::Object(object) => {
                let found = IDENTIFIER_KEYS
                    .iter()
                    .find_map(|key| object.get(*key).and_then(Value::as_str));
                match found {
                    Some(identifier) => identifier.to_string(),
                    None => return,
                }
            }
            // null unassigns
            _ => return,
        };

        match self
            .resolver
            .resolve(&identifier, &ResolveOptions::default())
            .await
        {
            Ok(outcome) => match outcome.identity {
                Some(identity) => {
                    *value = json!({ "accountId": identity.canonical_key });
                    ctx.identifier_resolution_applied = true;
                }
                None => ctx.warn(format!(
                    "{path}: '{identifier}' left unchanged, {}",
                    outcome.error.unwrap_or_else(|| "no match".to_string())
                )),
            },
            Err(err) => ctx.warn(format!(
                "{path}: '{identifier}' left unchanged, lookup failed: {err}"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use http::{HeaderValue, StatusCode};

    use super::*;
    use crate::{
        config::Revision,
        core::{AdaptError, NoopObserver},
        identity::{IdentityCache, RestUserDirectory},
        resilience::{CircuitBreakerConfig, ErrorKind, RetryPolicy},
        transport::{testing::ScriptedTransport, NoCredentials, TransportResponse},
    };

    fn executor(transport: Arc<ScriptedTransport>) -> RequestExecutor {
        let backend = Arc::new(BackendClient::new(
            "https://x.example",
            Duration::from_secs(5),
            transport,
            Arc::new(NoCredentials),
        ));
        let controller = Arc::new(ResilienceController::new(
            RetryPolicy {
                max_retries: 2,
                base_delay_ms: 10,
                jitter: false,
                ..Default::default()
            },
            CircuitBreakerConfig::default(),
            Duration::from_secs(5),
            Arc::new(NoopObserver),
        ));
        let directory = Arc::new(RestUserDirectory::new(
            backend.clone(),
            "/rest/api/2/user",
            "/rest/api/2/user/search",
        ));
        let resolver = Arc::new(IdentifierResolver::new(
            directory,
            IdentityCache::new(Duration::from_secs(300), 1000),
        ));
        let negotiator = Arc::new(RevisionNegotiator::new(backend.clone(), Revision::default()));
        let router = EndpointRouter::new(&[r"^/rest/api/[0-9]+/".to_string()]).unwrap();

        RequestExecutor::new(
            backend,
            controller,
            resolver,
            negotiator,
            router,
            ConversionOptions::default(),
        )
    }

    fn handler(request: &crate::transport::TransportRequest) -> TransportResponse {
        if request.url.contains("/user?username=alice") {
            return TransportResponse::json(
                StatusCode::OK,
                &json!({"accountId": "acc-1", "name": "alice", "displayName": "Alice"}),
            );
        }
        if request.url.contains("/user") {
            return TransportResponse::new(StatusCode::NOT_FOUND, "");
        }
        if request.url.contains("/serverInfo") {
            return TransportResponse::json(StatusCode::OK, &json!({}));
        }
        TransportResponse::json(StatusCode::CREATED, &json!({"id": "10001", "key": "ABC-1"}))
    }

    #[tokio::test]
    async fn test_create_issue_converts_and_resolves() {
        let transport = Arc::new(ScriptedTransport::new(|request| Ok(handler(request))));
        let executor = executor(transport.clone());

        let body = json!({
            "fields": {
                "summary": "Broken",
                "description": {
                    "type": "doc",
                    "version": 1,
                    "content": [{"type": "paragraph", "content": [{"type": "text", "text": "hello"}]}]
                },
                "assignee": {"name": "alice"},
                "reporter": "ghost"
            }
        });
        let result = executor
            .request(
                "/rest/api/2/issue",
                RequestOptions::post(body).with_request_id("req-42"),
            )
            .await
            .unwrap();

        assert_eq!(result.status, 201);
        assert_eq!(result.data["key"], "ABC-1");
        assert_eq!(result.request_id, "req-42");
        assert!(result.conversion_applied);
        assert!(result.identifier_resolution_applied);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.starts_with("fields.description")));
        assert!(result.warnings.iter().any(|w| w.starts_with("fields.reporter")));

        let sent = transport
            .requests()
            .into_iter()
            .find(|r| r.url.ends_with("/rest/api/2/issue"))
            .unwrap();
        let sent: Value = serde_json::from_slice(sent.body.as_deref().unwrap()).unwrap();
        assert_eq!(sent["fields"]["description"], "hello\n\n");
        assert_eq!(sent["fields"]["assignee"], json!({"accountId": "acc-1"}));
        assert_eq!(sent["fields"]["reporter"], "ghost");
        assert_eq!(sent["fields"]["summary"], "Broken");
    }

    #[tokio::test]
    async fn test_options_disable_adaptation() {
        let transport = Arc::new(ScriptedTransport::new(|request| Ok(handler(request))));
        let executor = executor(transport.clone());
        let document = json!({"type": "doc", "content": []});

        let options = RequestOptions {
            convert_content: false,
            resolve_identifiers: false,
            ..RequestOptions::put(json!({"description": document.clone(), "assignee": "alice"}))
        };
        let result = executor.request("/rest/api/2/issue/ABC-1", options).await.unwrap();

        assert!(!result.conversion_applied);
        assert!(!result.identifier_resolution_applied);
        assert_eq!(transport.calls(), 1);
        let sent: Value =
            serde_json::from_slice(transport.requests()[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(sent["description"], document);
    }

    #[tokio::test]
    async fn test_caller_headers_keep_every_value() {
        let transport = Arc::new(ScriptedTransport::new(|request| Ok(handler(request))));
        let executor = executor(transport.clone());

        let mut options = RequestOptions::get();
        options
            .headers
            .append(http::header::ACCEPT, HeaderValue::from_static("text/plain"));
        options
            .headers
            .append(http::header::ACCEPT, HeaderValue::from_static("application/xml"));
        options
            .headers
            .append("x-tag", HeaderValue::from_static("a"));
        options
            .headers
            .append("x-tag", HeaderValue::from_static("b"));
        executor.request("/rest/api/2/issue/ABC-1", options).await.unwrap();

        let sent = &transport.requests()[0];
        let accept: Vec<_> = sent.headers.get_all(http::header::ACCEPT).iter().collect();
        assert_eq!(accept, ["text/plain", "application/xml"]);
        assert_eq!(sent.headers.get_all("x-tag").iter().count(), 2);
    }

    #[tokio::test]
    async fn test_rejected_endpoint_sends_nothing() {
        let transport = Arc::new(ScriptedTransport::new(|request| Ok(handler(request))));
        let executor = executor(transport.clone());

        for endpoint in ["/admin/users", "/rest/api/{revision}/../x", "/rest/api/{revision}x/"] {
            let err = executor
                .request(endpoint, RequestOptions::get())
                .await
                .unwrap_err();
            assert!(matches!(err, AdaptError::Configuration(_)), "{endpoint}");
        }
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_revision_placeholder_uses_negotiated_revision() {
        let transport = Arc::new(ScriptedTransport::new(|request| Ok(handler(request))));
        let executor = executor(transport.clone());

        let result = executor
            .request("/rest/api/{revision}/myself", RequestOptions::get())
            .await
            .unwrap();
        assert_eq!(result.endpoint, "/rest/api/3/myself");
        assert!(!result.request_id.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_errors_are_retried_and_classified() {
        let transport = Arc::new(ScriptedTransport::always(TransportResponse::new(
            StatusCode::BAD_GATEWAY,
            "upstream down",
        )));
        let executor = executor(transport.clone());

        let err = executor
            .request("/rest/api/2/issue/ABC-1", RequestOptions::get())
            .await
            .unwrap_err();
        let request_error = err.as_request_error().unwrap();
        assert_eq!(request_error.kind(), ErrorKind::Server);
        assert_eq!(request_error.attempts, 3);
        assert_eq!(transport.calls(), 3);
    }
}
