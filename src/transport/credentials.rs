use base64::{engine::general_purpose::STANDARD, Engine as _};
use http::HeaderValue;

use crate::core::CredentialProvider;

/// `Authorization: Bearer <token>`
pub struct BearerToken {
    token: String,
}

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl CredentialProvider for BearerToken {
    fn authorization(&self) -> Option<HeaderValue> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.token)).ok()?;
        value.set_sensitive(true);
        Some(value)
    }
}

/// `Authorization: Basic base64(user:token)`, the usual api-token scheme
pub struct BasicCredentials {
    username: String,
    token: String,
}

impl BasicCredentials {
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            token: token.into(),
        }
    }
}

impl CredentialProvider for BasicCredentials {
    fn authorization(&self) -> Option<HeaderValue> {
        let encoded = STANDARD.encode(format!("{}:{}", self.username, self.token));
        let mut value = HeaderValue::from_str(&format!("Basic {encoded}")).ok()?;
        value.set_sensitive(true);
        Some(value)
    }
}

/// Anonymous access
pub struct NoCredentials;

impl CredentialProvider for NoCredentials {
    fn authorization(&self) -> Option<HeaderValue> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_credentials() {
        let creds = BasicCredentials::new("alice@example.com", "token");
        assert_eq!(
            creds.authorization().unwrap(),
            "Basic YWxpY2VAZXhhbXBsZS5jb206dG9rZW4="
        );
    }

    #[test]
    fn test_bearer_token_rejects_invalid_header() {
        assert!(BearerToken::new("bad\ntoken").authorization().is_none());
        assert!(NoCredentials.authorization().is_none());
    }
}
