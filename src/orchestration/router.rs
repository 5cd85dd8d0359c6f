//! Endpoint validation
//!
//! Only endpoints under a configured prefix may be called. The check runs
//! before any network activity.

use regex::Regex;

use crate::{
    config_error,
    core::{AdaptResult, ErrorContext},
    revision::substitute_revision,
};

/// Validates endpoints against the allowed prefix patterns
pub struct EndpointRouter {
    prefixes: Vec<Regex>,
}

impl EndpointRouter {
    /// Compile the prefix patterns, anchoring them at the start of the path
    pub fn new(patterns: &[String]) -> AdaptResult<Self> {
        let prefixes = patterns
            .iter()
            .map(|pattern| {
                let anchored = if pattern.starts_with('^') {
                    pattern.clone()
                } else {
                    format!("^{pattern}")
                };
                Regex::new(&anchored).config_context("invalid endpoint prefix pattern")
            })
            .collect::<AdaptResult<Vec<_>>>()?;

        Ok(Self { prefixes })
    }

    pub fn validate(&self, endpoint: &str) -> AdaptResult<()> {
        if !endpoint.starts_with('/') {
            return Err(config_error!("endpoint '{}' must start with '/'", endpoint));
        }
        if endpoint.contains("..") || endpoint.contains("://") {
            return Err(config_error!("endpoint '{}' is not a plain path", endpoint));
        }

        let path = endpoint.split('?').next().unwrap_or(endpoint);
        if !self.prefixes.iter().any(|prefix| prefix.is_match(path)) {
            return Err(config_error!(
                "endpoint '{}' does not match any allowed prefix",
                endpoint
            ));
        }
        Ok(())
    }

    /// Substitute `{revision}` into `template` and validate the result
    pub fn resolve(&self, template: &str, revision: &str) -> AdaptResult<String> {
        let endpoint = substitute_revision(template, revision);
        self.validate(&endpoint)?;
        Ok(endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AdaptError;

    fn router() -> EndpointRouter {
        EndpointRouter::new(&[
            r"^/rest/api/[0-9]+/".to_string(),
            r"/rest/agile/1\.0/".to_string(),
        ])
        .unwrap()
    }

    #[test]
    fn test_validate_endpoint() {
        let router = router();
        let test_cases = [
            ("/rest/api/2/issue/ABC-1", true),
            ("/rest/api/3/search?jql=project%20%3D%20X", true),
            ("/rest/agile/1.0/board", true),
            ("/rest/internal/1/secret", false),
            ("rest/api/2/issue", false),
            ("/rest/api/2/../../admin", false),
            ("/rest/api/2/https://evil.example", false),
            ("/other/rest/api/2/issue", false),
        ];

        for (endpoint, valid) in test_cases {
            let result = router.validate(endpoint);
            assert_eq!(result.is_ok(), valid, "{endpoint}");
            if let Err(err) = result {
                assert!(matches!(err, AdaptError::Configuration(_)));
            }
        }
    }

    #[test]
    fn test_resolve_substitutes_revision() {
        let router = router();
        assert_eq!(
            router.resolve("/rest/api/{revision}/issue", "3").unwrap(),
            "/rest/api/3/issue"
        );
        assert!(router.resolve("/rest/api/{revision}/issue", "x").is_err());
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(EndpointRouter::new(&["(".to_string()]).is_err());
    }
}
