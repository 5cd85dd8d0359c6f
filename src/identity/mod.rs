//! User identifier resolution.
//!
//! Callers pass whatever they have (canonical key, handle, email or display
//! name); the resolver picks a lookup strategy from its shape, asks the
//! [`UserDirectory`] and caches the answer under every alias.

pub mod cache;
pub mod directory;
pub mod kind;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{core::AdaptResult, resilience::ErrorKind};

pub use cache::IdentityCache;
pub use directory::{RestUserDirectory, UserDirectory};
pub use kind::{detect_kind, IdentifierKind, Strategy};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedIdentity {
    pub canonical_key: String,
    pub handle: Option<String>,
    pub display_name: String,
    pub email: Option<String>,
    pub active: bool,
    pub locale: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveOptions {
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default = "ResolveOptions::default_use_cache")]
    pub use_cache: bool,
    #[serde(default)]
    pub include_inactive: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            strategy: Strategy::Auto,
            use_cache: Self::default_use_cache(),
            include_inactive: false,
        }
    }
}

impl ResolveOptions {
    fn default_use_cache() -> bool {
        true
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionOutcome {
    pub identity: Option<ResolvedIdentity>,
    pub success: bool,
    /// The concrete strategy that ran
    pub strategy: Strategy,
    pub identifier_kind: IdentifierKind,
    pub cached: bool,
    pub error: Option<String>,
}

impl ResolutionOutcome {
    fn found(identity: ResolvedIdentity, strategy: Strategy, kind: IdentifierKind, cached: bool) -> Self {
        Self {
            identity: Some(identity),
            success: true,
            strategy,
            identifier_kind: kind,
            cached,
            error: None,
        }
    }

    fn not_found(error: String, strategy: Strategy, kind: IdentifierKind) -> Self {
        Self {
            identity: None,
            success: false,
            strategy,
            identifier_kind: kind,
            cached: false,
            error: Some(error),
        }
    }
}

pub struct IdentifierResolver {
    directory: Arc<dyn UserDirectory>,
    cache: IdentityCache,
}

impl IdentifierResolver {
    pub fn new(directory: Arc<dyn UserDirectory>, cache: IdentityCache) -> Self {
        Self { directory, cache }
    }

    /// Resolve `identifier` to a single identity.
    ///
    /// Not finding anyone is a successful call with `success == false`;
    /// only directory failures are errors.
    pub async fn resolve(
        &self,
        identifier: &str,
        options: &ResolveOptions,
    ) -> AdaptResult<ResolutionOutcome> {
        let identifier = identifier.trim();
        let kind = detect_kind(identifier);
        let strategy = options.strategy.for_kind(kind);

        if identifier.is_empty() {
            return Ok(ResolutionOutcome::not_found(
                "empty identifier".to_string(),
                strategy,
                kind,
            ));
        }

        if options.use_cache {
            if let Some(identity) = self.cache.get(identifier) {
                if identity.active || options.include_inactive {
                    log::debug!("Identity cache hit for '{identifier}'");
                    return Ok(ResolutionOutcome::found(identity, strategy, kind, true));
                }
            }
        }

        let include_inactive = options.include_inactive;
        let found = match strategy {
            Strategy::Auto | Strategy::KeyFirst => {
                self.key_or_handle(identifier, false, include_inactive).await?
            }
            Strategy::HandleFirst => self.key_or_handle(identifier, true, include_inactive).await?,
            Strategy::Email => self.by_email(identifier, include_inactive).await?,
            Strategy::DisplayName => self.by_display_name(identifier, include_inactive).await?,
        };

        match found {
            Some(identity) => {
                if options.use_cache {
                    self.cache.insert(identity.clone(), identifier);
                }
                Ok(ResolutionOutcome::found(identity, strategy, kind, false))
            }
            None => Ok(ResolutionOutcome::not_found(
                format!("no user found for {kind} '{identifier}'"),
                strategy,
                kind,
            )),
        }
    }

    async fn key_or_handle(
        &self,
        identifier: &str,
        handle_first: bool,
        include_inactive: bool,
    ) -> AdaptResult<Option<ResolvedIdentity>> {
        let first = if handle_first {
            self.directory.lookup_handle(identifier).await
        } else {
            self.directory.lookup_key(identifier).await
        };
        if let Some(identity) = miss_on_rejection(first)?.filter(|i| include_inactive || i.active) {
            return Ok(Some(identity));
        }

        let second = if handle_first {
            self.directory.lookup_key(identifier).await
        } else {
            self.directory.lookup_handle(identifier).await
        };
        Ok(miss_on_rejection(second)?.filter(|i| include_inactive || i.active))
    }

    async fn by_email(
        &self,
        email: &str,
        include_inactive: bool,
    ) -> AdaptResult<Option<ResolvedIdentity>> {
        let mut candidates: Vec<ResolvedIdentity> = self
            .directory
            .search(email)
            .await?
            .into_iter()
            .filter(|i| include_inactive || i.active)
            .collect();

        let exact = candidates.iter().position(|i| {
            i.email
                .as_deref()
                .is_some_and(|e| e.eq_ignore_ascii_case(email))
        });
        Ok(match exact {
            Some(index) => Some(candidates.swap_remove(index)),
            None if candidates.len() == 1 => candidates.pop(),
            None => None,
        })
    }

    async fn by_display_name(
        &self,
        name: &str,
        include_inactive: bool,
    ) -> AdaptResult<Option<ResolvedIdentity>> {
        let mut candidates: Vec<ResolvedIdentity> = self
            .directory
            .search(name)
            .await?
            .into_iter()
            .filter(|i| include_inactive || i.active)
            .collect();

        let lowered = name.to_lowercase();
        let exact = candidates
            .iter()
            .position(|i| i.display_name.to_lowercase() == lowered);
        Ok(match exact {
            Some(index) => Some(candidates.swap_remove(index)),
            None => candidates.into_iter().next(),
        })
    }

    pub fn cache(&self) -> &IdentityCache {
        &self.cache
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

/// A lookup the backend refused as a bad or unknown query is a miss, so the
/// next strategy step still runs. Transport, server and auth failures stay
/// errors.
fn miss_on_rejection(
    lookup: AdaptResult<Option<ResolvedIdentity>>,
) -> AdaptResult<Option<ResolvedIdentity>> {
    match lookup {
        Err(err)
            if err
                .as_request_error()
                .is_some_and(|e| matches!(e.kind(), ErrorKind::Validation | ErrorKind::NotFound)) =>
        {
            log::debug!("User lookup rejected, trying next step: {err}");
            Ok(None)
        }
        other => other,
    }
}
