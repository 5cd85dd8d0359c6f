use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use serde::Deserialize;
use serde_json::Value;

use super::ResolvedIdentity;
use crate::{
    core::{AdaptError, AdaptResult},
    resilience::{classify, Failure, RequestError},
    transport::{BackendClient, TransportResponse},
};

/// Source of user records
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn lookup_key(&self, key: &str) -> AdaptResult<Option<ResolvedIdentity>>;

    async fn lookup_handle(&self, handle: &str) -> AdaptResult<Option<ResolvedIdentity>>;

    /// Free-text search over names and email addresses
    async fn search(&self, query: &str) -> AdaptResult<Vec<ResolvedIdentity>>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserPayload {
    account_id: Option<String>,
    key: Option<String>,
    name: Option<String>,
    username: Option<String>,
    display_name: Option<String>,
    email_address: Option<String>,
    #[serde(default = "UserPayload::default_active")]
    active: bool,
    locale: Option<String>,
}

impl UserPayload {
    fn default_active() -> bool {
        true
    }

    fn into_identity(self) -> Option<ResolvedIdentity> {
        let handle = self.name.or(self.username);
        let canonical_key = self.account_id.or(self.key)?;
        let display_name = self
            .display_name
            .or_else(|| handle.clone())
            .unwrap_or_else(|| canonical_key.clone());

        Some(ResolvedIdentity {
            canonical_key,
            handle,
            display_name,
            email: self.email_address,
            active: self.active,
            locale: self.locale,
        })
    }
}

fn parse_user(value: Value) -> Option<ResolvedIdentity> {
    serde_json::from_value::<UserPayload>(value)
        .ok()?
        .into_identity()
}

/// Search endpoints answer either a bare array or a paged object.
fn parse_users(value: Value) -> Vec<ResolvedIdentity> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut object) => match object
            .remove("values")
            .or_else(|| object.remove("users"))
        {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };
    items.into_iter().filter_map(parse_user).collect()
}

/// [`UserDirectory`] over the backend's REST user endpoints
pub struct RestUserDirectory {
    backend: Arc<BackendClient>,
    user_path: String,
    search_path: String,
}

impl RestUserDirectory {
    pub fn new(backend: Arc<BackendClient>, user_path: &str, search_path: &str) -> Self {
        Self {
            backend,
            user_path: user_path.to_string(),
            search_path: search_path.to_string(),
        }
    }

    /// GET `path`; `None` for 404, error for any other non-success status
    async fn fetch(&self, path: &str, param: &str, value: &str) -> AdaptResult<Option<Value>> {
        let query = [(param.to_string(), value.to_string())];
        let response = self
            .backend
            .get(path, &query, self.backend.timeout())
            .await?;

        if response.status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status.is_success() {
            return Err(status_error(&response, path));
        }
        if response.body.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&response.body)?))
    }
}

fn status_error(response: &TransportResponse, path: &str) -> AdaptError {
    let failure = Failure::from_response(response);
    AdaptError::Request(RequestError {
        record: classify(&failure, Some(path)),
        request_id: None,
        attempts: 1,
        message: failure.to_string(),
    })
}

#[async_trait]
impl UserDirectory for RestUserDirectory {
    async fn lookup_key(&self, key: &str) -> AdaptResult<Option<ResolvedIdentity>> {
        Ok(self
            .fetch(&self.user_path, "accountId", key)
            .await?
            .and_then(parse_user))
    }

    async fn lookup_handle(&self, handle: &str) -> AdaptResult<Option<ResolvedIdentity>> {
        Ok(self
            .fetch(&self.user_path, "username", handle)
            .await?
            .and_then(parse_user))
    }

    async fn search(&self, query: &str) -> AdaptResult<Vec<ResolvedIdentity>> {
        Ok(self
            .fetch(&self.search_path, "query", query)
            .await?
            .map(parse_users)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::resilience::ErrorKind;
    use crate::transport::{testing::ScriptedTransport, NoCredentials};

    fn directory(transport: Arc<ScriptedTransport>) -> RestUserDirectory {
        let backend = BackendClient::new(
            "https://x.example",
            Duration::from_secs(5),
            transport,
            Arc::new(NoCredentials),
        );
        RestUserDirectory::new(
            Arc::new(backend),
            "/rest/api/2/user",
            "/rest/api/2/user/search",
        )
    }

    #[tokio::test]
    async fn test_lookup_handle() {
        let transport = Arc::new(ScriptedTransport::always(TransportResponse::json(
            StatusCode::OK,
            &json!({"accountId": "u1", "name": "alice", "displayName": "Alice Smith"}),
        )));
        let directory = directory(transport.clone());

        let identity = directory.lookup_handle("alice").await.unwrap().unwrap();
        assert_eq!(identity.canonical_key, "u1");
        assert_eq!(identity.handle.as_deref(), Some("alice"));
        assert!(identity.active);
        assert_eq!(
            transport.urls(),
            vec!["https://x.example/rest/api/2/user?username=alice"]
        );
    }

    #[tokio::test]
    async fn test_not_found_is_none() {
        let transport = Arc::new(ScriptedTransport::always(TransportResponse::new(
            StatusCode::NOT_FOUND,
            "",
        )));
        let directory = directory(transport);
        assert!(directory.lookup_key("u9").await.unwrap().is_none());
        assert!(directory.search("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_accepts_paged_results() {
        let transport = Arc::new(ScriptedTransport::always(TransportResponse::json(
            StatusCode::OK,
            &json!({"values": [
                {"accountId": "u1", "displayName": "Alice", "active": false},
                {"displayName": "no key"},
                {"accountId": "u2", "displayName": "Alicia"}
            ]}),
        )));
        let directory = directory(transport.clone());

        let found = directory.search("ali").await.unwrap();
        assert_eq!(found.len(), 2);
        assert!(!found[0].active);
        assert!(transport.urls()[0].ends_with("/rest/api/2/user/search?query=ali"));
    }

    #[tokio::test]
    async fn test_server_error_is_classified() {
        let transport = Arc::new(ScriptedTransport::always(TransportResponse::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "boom",
        )));
        let err = directory(transport).lookup_key("u1").await.unwrap_err();
        assert_eq!(err.as_request_error().map(|e| e.kind()), Some(ErrorKind::Server));
    }
}
