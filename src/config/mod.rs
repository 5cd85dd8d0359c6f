use std::{fs, sync::Arc, time::Duration};

use log::{debug, trace};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::{
    convert::ConversionOptions,
    core::{AdaptResult, CredentialProvider, ErrorContext},
    resilience::{CircuitBreakerConfig, RetryPolicy},
    revision::REVISION_PLACEHOLDER,
    transport::{BasicCredentials, BearerToken, NoCredentials},
};

static BASE_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^https?://[^/\s]+(/\S*)?$").unwrap());

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Config {
    #[validate(nested)]
    pub backend: Backend,
    #[validate(nested)]
    #[serde(default)]
    pub retry: RetryPolicy,
    #[validate(nested)]
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[validate(nested)]
    #[serde(default)]
    pub identity: Identity,
    #[validate(nested)]
    #[serde(default)]
    pub revision: Revision,
    #[serde(default)]
    pub conversion: ConversionOptions,
}

// Config file load and validation
impl Config {
    pub fn load_from_yaml<P>(path: P) -> AdaptResult<Self>
    where
        P: AsRef<std::path::Path> + std::fmt::Display,
    {
        let conf_str = fs::read_to_string(&path)
            .config_context(&format!("Unable to read conf file from {path}"))?;
        debug!("Conf file read from {path}");
        Self::from_yaml(&conf_str)
    }

    pub fn from_yaml(conf_str: &str) -> AdaptResult<Self> {
        trace!("Read conf file: {conf_str}");
        let conf: Config =
            serde_yaml::from_str(conf_str).config_context("Unable to parse yaml conf")?;

        trace!("Loaded conf: {conf:?}");

        // use validator to validate conf file
        conf.validate().config_context("Conf file valid failed")?;

        Ok(conf)
    }

    pub fn to_yaml(&self) -> AdaptResult<String> {
        serde_yaml::to_string(self).with_context("Unable to serialize conf")
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct Backend {
    #[validate(custom(function = "Backend::validate_base_url"))]
    pub base_url: String,
    #[serde(default = "Backend::default_timeout_ms")]
    #[validate(range(min = 1))]
    pub timeout_ms: u64,
    #[serde(default = "Backend::default_endpoint_prefixes")]
    #[validate(length(min = 1), custom(function = "Backend::validate_endpoint_prefixes"))]
    pub endpoint_prefixes: Vec<String>,
    #[serde(default)]
    pub credentials: Credentials,
}

impl Backend {
    fn default_timeout_ms() -> u64 {
        30_000
    }

    fn default_endpoint_prefixes() -> Vec<String> {
        vec![
            r"^/rest/api/[0-9]+/".to_string(),
            r"^/rest/agile/1\.0/".to_string(),
            r"^/rest/servicedeskapi/".to_string(),
        ]
    }

    fn validate_base_url(base_url: &str) -> Result<(), ValidationError> {
        if BASE_URL.is_match(base_url) {
            Ok(())
        } else {
            Err(ValidationError::new("invalid_base_url"))
        }
    }

    fn validate_endpoint_prefixes(prefixes: &[String]) -> Result<(), ValidationError> {
        for prefix in prefixes {
            Regex::new(prefix).map_err(|_| ValidationError::new("invalid_endpoint_prefix"))?;
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Credentials {
    #[default]
    None,
    Bearer {
        token: String,
    },
    Basic {
        username: String,
        token: String,
    },
}

impl Credentials {
    pub fn provider(&self) -> Arc<dyn CredentialProvider> {
        match self {
            Credentials::None => Arc::new(NoCredentials),
            Credentials::Bearer { token } => Arc::new(BearerToken::new(token.clone())),
            Credentials::Basic { username, token } => {
                Arc::new(BasicCredentials::new(username.clone(), token.clone()))
            }
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct Identity {
    #[serde(default = "Identity::default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "Identity::default_capacity")]
    #[validate(range(min = 1))]
    pub capacity: usize,
    #[serde(default = "Identity::default_user_path")]
    pub user_path: String,
    #[serde(default = "Identity::default_search_path")]
    pub search_path: String,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            ttl_secs: Self::default_ttl_secs(),
            capacity: Self::default_capacity(),
            user_path: Self::default_user_path(),
            search_path: Self::default_search_path(),
        }
    }
}

impl Identity {
    fn default_ttl_secs() -> u64 {
        300
    }

    fn default_capacity() -> usize {
        1000
    }

    fn default_user_path() -> String {
        "/rest/api/2/user".to_string()
    }

    fn default_search_path() -> String {
        "/rest/api/2/user/search".to_string()
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[validate(schema(function = "Revision::validate_probe_path"))]
pub struct Revision {
    /// Most capable first
    #[serde(default = "Revision::default_candidates")]
    #[validate(length(min = 1))]
    pub candidates: Vec<String>,
    #[serde(default = "Revision::default_fallback")]
    pub fallback: String,
    #[serde(default = "Revision::default_probe_path")]
    pub probe_path: String,
    #[serde(default = "Revision::default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default = "Revision::default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for Revision {
    fn default() -> Self {
        Self {
            candidates: Self::default_candidates(),
            fallback: Self::default_fallback(),
            probe_path: Self::default_probe_path(),
            probe_timeout_ms: Self::default_probe_timeout_ms(),
            cache_ttl_secs: Self::default_cache_ttl_secs(),
        }
    }
}

impl Revision {
    fn default_candidates() -> Vec<String> {
        vec!["3".to_string(), "2".to_string()]
    }

    fn default_fallback() -> String {
        "2".to_string()
    }

    fn default_probe_path() -> String {
        "/rest/api/{revision}/serverInfo".to_string()
    }

    fn default_probe_timeout_ms() -> u64 {
        5000
    }

    fn default_cache_ttl_secs() -> u64 {
        3600
    }

    fn validate_probe_path(&self) -> Result<(), ValidationError> {
        if self.probe_path.contains(REVISION_PLACEHOLDER) {
            Ok(())
        } else {
            Err(ValidationError::new("probe_path_without_revision"))
        }
    }
}
