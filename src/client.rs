//! Public entry point of the adaptation layer.
//!
//! One [`AdaptationClient`] wraps one backend target: a single resilience
//! controller, identifier resolver and revision negotiator shared by every
//! request made through it.

use std::sync::Arc;

use crate::{
    config::Config,
    convert::{self, ContentInput, ConversionOptions, ConversionResult, FormatDetection, MarkupValidation},
    core::{AdaptResult, ResilienceObserver, Transport},
    identity::{IdentifierResolver, IdentityCache, ResolutionOutcome, ResolveOptions, RestUserDirectory},
    logging::LogObserver,
    orchestration::{EndpointRouter, RequestExecutor, RequestOptions, RequestResult},
    resilience::{CircuitStatus, MetricsSnapshot, ResilienceController},
    revision::{Capabilities, RevisionNegotiator},
    transport::BackendClient,
};

pub struct AdaptationClient {
    executor: RequestExecutor,
    controller: Arc<ResilienceController>,
    resolver: Arc<IdentifierResolver>,
    negotiator: Arc<RevisionNegotiator>,
    conversion: ConversionOptions,
}

impl AdaptationClient {
    /// Build a client whose resilience events are logged
    pub fn new(config: Config, transport: Arc<dyn Transport>) -> AdaptResult<Self> {
        Self::with_observer(config, transport, Arc::new(LogObserver))
    }

    pub fn with_observer(
        config: Config,
        transport: Arc<dyn Transport>,
        observer: Arc<dyn ResilienceObserver>,
    ) -> AdaptResult<Self> {
        let router = EndpointRouter::new(&config.backend.endpoint_prefixes)?;

        let backend = Arc::new(BackendClient::new(
            &config.backend.base_url,
            config.backend.timeout(),
            transport,
            config.backend.credentials.provider(),
        ));

        let controller = Arc::new(ResilienceController::new(
            config.retry,
            config.circuit_breaker,
            config.backend.timeout(),
            observer,
        ));

        let directory = Arc::new(RestUserDirectory::new(
            backend.clone(),
            &config.identity.user_path,
            &config.identity.search_path,
        ));
        let resolver = Arc::new(IdentifierResolver::new(
            directory,
            IdentityCache::new(config.identity.ttl(), config.identity.capacity),
        ));

        let negotiator = Arc::new(RevisionNegotiator::new(backend.clone(), config.revision));

        let executor = RequestExecutor::new(
            backend,
            controller.clone(),
            resolver.clone(),
            negotiator.clone(),
            router,
            config.conversion.clone(),
        );

        log::info!("Adaptation client ready for {}", config.backend.base_url);

        Ok(Self {
            executor,
            controller,
            resolver,
            negotiator,
            conversion: config.conversion,
        })
    }

    pub async fn request(&self, endpoint: &str, options: RequestOptions) -> AdaptResult<RequestResult> {
        self.executor.request(endpoint, options).await
    }

    pub async fn resolve_identifier(
        &self,
        identifier: &str,
        options: &ResolveOptions,
    ) -> AdaptResult<ResolutionOutcome> {
        self.resolver.resolve(identifier, options).await
    }

    pub fn convert_content(&self, input: impl Into<ContentInput>) -> ConversionResult {
        convert::convert_content(input.into(), &self.conversion)
    }

    pub fn detect_format(&self, input: &str) -> FormatDetection {
        convert::detect_format(input)
    }

    pub fn validate_markup(&self, markup: &str) -> MarkupValidation {
        convert::validate_markup(markup)
    }

    pub fn to_plain_text(&self, markup: &str) -> String {
        convert::to_plain_text(markup)
    }

    pub async fn negotiate_revision(&self) -> String {
        self.negotiator.negotiate_best_revision().await
    }

    /// Capabilities of `revision`, or of the negotiated one when `None`
    pub async fn capabilities(&self, revision: Option<&str>) -> Capabilities {
        match revision {
            Some(revision) => self.negotiator.capabilities(revision),
            None => {
                let revision = self.negotiator.negotiate_best_revision().await;
                self.negotiator.capabilities(&revision)
            }
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.controller.metrics()
    }

    pub fn circuit_status(&self) -> CircuitStatus {
        self.controller.circuit_status()
    }

    pub fn reset_circuit(&self) {
        self.controller.reset_circuit();
    }

    pub fn reset_metrics(&self) {
        self.controller.reset_metrics();
    }

    /// Drop cached identities and the negotiated revision
    pub fn clear_caches(&self) {
        self.resolver.clear_cache();
        self.negotiator.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;
    use serde_json::json;

    use super::*;
    use crate::{
        convert::{Format, Node},
        core::{AdaptError, NoopObserver},
        resilience::{CircuitState, ErrorKind},
        transport::{testing::ScriptedTransport, TransportRequest, TransportResponse},
    };

    const CONF: &str = r#"
backend:
  base_url: https://x.example
  credentials:
    type: bearer
    token: secret
retry:
  max_retries: 1
  base_delay_ms: 10
  max_delay_ms: 100
  jitter: false
circuit_breaker:
  failure_threshold: 2
  recovery_timeout_ms: 1000
"#;

    fn client(transport: Arc<ScriptedTransport>) -> AdaptationClient {
        let config = Config::from_yaml(CONF).unwrap();
        AdaptationClient::with_observer(config, transport, Arc::new(NoopObserver)).unwrap()
    }

    fn handler(request: &TransportRequest) -> TransportResponse {
        if request.url.contains("/rest/api/3/serverInfo") {
            return TransportResponse::new(StatusCode::NOT_FOUND, "");
        }
        if request.url.contains("/serverInfo") {
            return TransportResponse::json(StatusCode::OK, &json!({"version": "9.4"}));
        }
        if request.url.contains("/user?username=bob") {
            return TransportResponse::json(
                StatusCode::OK,
                &json!({"accountId": "acc-7", "name": "bob", "displayName": "Bob"}),
            );
        }
        if request.url.contains("/broken") {
            return TransportResponse::new(StatusCode::BAD_GATEWAY, "down");
        }
        TransportResponse::json(StatusCode::OK, &json!({"ok": true}))
    }

    #[tokio::test]
    async fn test_request_with_negotiated_revision() {
        let transport = Arc::new(ScriptedTransport::new(|request| Ok(handler(request))));
        let client = client(transport.clone());

        let result = client
            .request("/rest/api/{revision}/myself", RequestOptions::get())
            .await
            .unwrap();
        assert_eq!(result.endpoint, "/rest/api/2/myself");
        assert_eq!(result.data, json!({"ok": true}));

        let request = transport.requests().pop().unwrap();
        assert_eq!(
            request.headers.get(http::header::AUTHORIZATION).unwrap(),
            "Bearer secret"
        );

        assert_eq!(client.negotiate_revision().await, "2");
        assert!(client.capabilities(None).await.handle_identity);
        assert!(client.capabilities(Some("3")).await.structured_content);
    }

    #[tokio::test]
    async fn test_rejected_endpoint_makes_no_call() {
        let transport = Arc::new(ScriptedTransport::new(|request| Ok(handler(request))));
        let client = client(transport.clone());

        let err = client
            .request("/admin/secrets", RequestOptions::get())
            .await
            .unwrap_err();
        assert!(matches!(err, AdaptError::Configuration(_)));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_trip_circuit_and_reset() {
        let transport = Arc::new(ScriptedTransport::new(|request| Ok(handler(request))));
        let client = client(transport.clone());

        let err = client
            .request("/rest/api/2/broken", RequestOptions::get())
            .await
            .unwrap_err();
        assert_eq!(err.as_request_error().unwrap().kind(), ErrorKind::Server);
        assert_eq!(transport.calls(), 2);
        assert_eq!(client.circuit_status().state, CircuitState::Open);

        let err = client
            .request("/rest/api/2/broken", RequestOptions::get())
            .await
            .unwrap_err();
        assert_eq!(err.as_request_error().unwrap().kind(), ErrorKind::CircuitOpen);
        assert_eq!(transport.calls(), 2);

        let metrics = client.metrics();
        assert_eq!(metrics.total_requests, 2);
        assert_eq!(metrics.circuit_rejections, 1);

        client.reset_circuit();
        client.reset_metrics();
        assert_eq!(client.circuit_status().state, CircuitState::Closed);
        assert_eq!(client.metrics().total_requests, 0);
    }

    #[tokio::test]
    async fn test_resolve_identifier_and_clear_caches() {
        let transport = Arc::new(ScriptedTransport::new(|request| Ok(handler(request))));
        let client = client(transport.clone());

        let outcome = client
            .resolve_identifier("bob", &ResolveOptions::default())
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.identity.unwrap().canonical_key, "acc-7");

        let outcome = client
            .resolve_identifier("bob", &ResolveOptions::default())
            .await
            .unwrap();
        assert!(outcome.cached);

        client.clear_caches();
        let outcome = client
            .resolve_identifier("bob", &ResolveOptions::default())
            .await
            .unwrap();
        assert!(!outcome.cached);
    }

    #[test]
    fn test_offline_conversion_surface() {
        let transport = Arc::new(ScriptedTransport::new(|request| Ok(handler(request))));
        let client = client(transport);

        let doc = Node::new("doc").with_children(vec![Node::new("heading")
            .with_attr("level", 2)
            .with_children(vec![Node::text("Hi").with_mark(crate::convert::Mark::new("strong"))])]);
        let result = client.convert_content(doc);
        assert_eq!(result.content, "h2. *Hi*\n\n");

        assert!(client.validate_markup(&result.content).valid);
        assert_eq!(client.detect_format(&result.content).format, Format::Markup);
        assert_eq!(client.to_plain_text("h2. *Hi*"), "Hi");
    }
}
