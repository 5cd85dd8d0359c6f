//! API revision negotiation.
//!
//! Every configured candidate is probed concurrently; the most preferred
//! one that answers is used until the cached answer goes stale or is
//! invalidated.

pub mod capabilities;

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use arc_swap::ArcSwapOption;
use futures::future::join_all;
use serde::Serialize;
use tokio::{sync::Mutex, time::Instant};

use crate::{config::Revision, core::Confidence, transport::BackendClient};

pub use capabilities::{for_revision, Capabilities};

pub const REVISION_PLACEHOLDER: &str = "{revision}";

/// Replace every `{revision}` placeholder in `template`
pub fn substitute_revision(template: &str, revision: &str) -> String {
    template.replace(REVISION_PLACEHOLDER, revision)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub revision: String,
    pub success: bool,
    pub status: Option<u16>,
    pub latency_ms: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionDetection {
    pub detected: String,
    /// Other candidates that answered, in preference order
    pub alternatives: Vec<String>,
    pub confidence: Confidence,
    pub per_candidate: Vec<ProbeResult>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiatedRevision {
    pub revision: String,
    pub confidence: Confidence,
    pub probed_at: SystemTime,
    #[serde(skip)]
    negotiated_at: Instant,
}

pub struct RevisionNegotiator {
    backend: Arc<BackendClient>,
    config: Revision,
    cached: ArcSwapOption<NegotiatedRevision>,
    probe_lock: Mutex<()>,
}

impl RevisionNegotiator {
    pub fn new(backend: Arc<BackendClient>, config: Revision) -> Self {
        Self {
            backend,
            config,
            cached: ArcSwapOption::empty(),
            probe_lock: Mutex::new(()),
        }
    }

    pub fn fallback(&self) -> &str {
        &self.config.fallback
    }

    async fn probe(&self, revision: &str) -> ProbeResult {
        let path = substitute_revision(&self.config.probe_path, revision);
        let timeout = Duration::from_millis(self.config.probe_timeout_ms);
        let start = Instant::now();

        let outcome = tokio::time::timeout(timeout, self.backend.get(&path, &[], timeout)).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let (success, status, error) = match outcome {
            Ok(Ok(response)) if response.status.is_success() => {
                (true, Some(response.status.as_u16()), None)
            }
            Ok(Ok(response)) => (
                false,
                Some(response.status.as_u16()),
                Some(format!("unexpected status {}", response.status)),
            ),
            Ok(Err(err)) => (false, None, Some(err.to_string())),
            Err(_) => (
                false,
                None,
                Some(format!("probe timed out after {}ms", timeout.as_millis())),
            ),
        };
        log::debug!("Probe of revision {revision}: success={success} in {latency_ms}ms");

        ProbeResult {
            revision: revision.to_string(),
            success,
            status,
            latency_ms,
            error,
        }
    }

    /// Probe every candidate, without touching the cache.
    pub async fn detect_supported_revision(&self) -> RevisionDetection {
        let per_candidate =
            join_all(self.config.candidates.iter().map(|candidate| self.probe(candidate))).await;

        let mut answered = per_candidate
            .iter()
            .filter(|probe| probe.success)
            .map(|probe| probe.revision.clone());

        match answered.next() {
            Some(detected) => {
                let alternatives: Vec<String> = answered.collect();
                let confidence = if alternatives.is_empty() {
                    Confidence::High
                } else {
                    Confidence::Medium
                };
                RevisionDetection {
                    detected,
                    alternatives,
                    confidence,
                    per_candidate,
                }
            }
            None => {
                log::warn!(
                    "No API revision answered, falling back to {}",
                    self.config.fallback
                );
                RevisionDetection {
                    detected: self.config.fallback.clone(),
                    alternatives: Vec::new(),
                    confidence: Confidence::Low,
                    per_candidate,
                }
            }
        }
    }

    fn fresh(&self) -> Option<Arc<NegotiatedRevision>> {
        let ttl = Duration::from_secs(self.config.cache_ttl_secs);
        self.cached
            .load_full()
            .filter(|negotiated| negotiated.negotiated_at.elapsed() < ttl)
    }

    /// The revision to use, probing only when the cached answer is stale.
    pub async fn negotiate_best_revision(&self) -> String {
        if let Some(negotiated) = self.fresh() {
            return negotiated.revision.clone();
        }

        // one probe round at a time; late arrivals reuse its answer
        let _guard = self.probe_lock.lock().await;
        if let Some(negotiated) = self.fresh() {
            return negotiated.revision.clone();
        }

        let detection = self.detect_supported_revision().await;
        log::info!(
            "Negotiated API revision {} ({} confidence)",
            detection.detected,
            detection.confidence
        );
        self.cached.store(Some(Arc::new(NegotiatedRevision {
            revision: detection.detected.clone(),
            confidence: detection.confidence,
            probed_at: SystemTime::now(),
            negotiated_at: Instant::now(),
        })));
        detection.detected
    }

    pub fn cached(&self) -> Option<NegotiatedRevision> {
        self.cached.load_full().map(|negotiated| (*negotiated).clone())
    }

    pub fn invalidate(&self) {
        self.cached.store(None);
    }

    pub fn capabilities(&self, revision: &str) -> Capabilities {
        for_revision(revision)
    }
}
