// # FitBark API Client
//
// ## Trust Level: Untrusted (Vendor Client)
//
// **Allowed Capabilities**:
// - ✅ Perform HTTPS calls to app.fitbark.com only
// - ✅ Refresh its own OAuth2 token
//
// **Forbidden Capabilities**:
// - ❌ Spawn tasks or threads
// - ❌ Retry failed requests (the next tick retries)
// - ❌ Cache responses (owned by ThrottledFetcher)
//
// ## API Reference
//
// - Dogs of the user: GET `/api/v2/dog_relations`
// - One dog: GET `/api/v2/dog/{slug}`

use async_trait::async_trait;
use homelink_core::{Error, Result};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::oauth::{OAuth2Implementation, OAuth2Session, OAuthToken, TokenSession};

/// FitBark API root
pub const API_BASE: &str = "https://app.fitbark.com/api/v2";

/// Authenticated FitBark API
#[async_trait]
pub trait FitbarkApi: Send + Sync {
    /// Relations between the user and their dogs (`[{"dog": {...}}, ...]`)
    async fn dog_relations(&self) -> Result<Vec<Value>>;

    /// Full record of one dog
    async fn dog(&self, slug: &str) -> Result<Map<String, Value>>;
}

/// Builds the API handle of a config entry
pub trait ApiBuilder: Send + Sync {
    fn build(
        &self,
        implementation: OAuth2Implementation,
        token: OAuthToken,
    ) -> Result<Arc<dyn FitbarkApi>>;
}

/// Builder for the bundled HTTP client
#[derive(Debug, Clone)]
pub struct HttpApiBuilder {
    request_timeout: Duration,
}

impl HttpApiBuilder {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

impl ApiBuilder for HttpApiBuilder {
    fn build(
        &self,
        implementation: OAuth2Implementation,
        token: OAuthToken,
    ) -> Result<Arc<dyn FitbarkApi>> {
        let http = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| Error::connect(format!("Failed to build HTTP client: {}", e)))?;
        let session = Arc::new(OAuth2Session::new(implementation, http.clone(), token));
        Ok(Arc::new(FitbarkClient::new(http, session)))
    }
}

/// FitBark open API client over `reqwest`
pub struct FitbarkClient {
    http: reqwest::Client,
    session: Arc<dyn TokenSession>,
    base_url: String,
}

impl std::fmt::Debug for FitbarkClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FitbarkClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl FitbarkClient {
    pub fn new(http: reqwest::Client, session: Arc<dyn TokenSession>) -> Self {
        Self {
            http,
            session,
            base_url: API_BASE.to_string(),
        }
    }

    /// Point the client at another API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let token = self.session.ensure_token_valid().await?;
        let url = format!("{}/{}", self.base_url, path);
        tracing::debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(|e| Error::transient(format!("FitBark request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(Error::from_status("fitbark", status.as_u16(), &body));
        }

        response
            .json()
            .await
            .map_err(|e| Error::malformed(format!("FitBark answer is not JSON: {}", e)))
    }
}

#[async_trait]
impl FitbarkApi for FitbarkClient {
    async fn dog_relations(&self) -> Result<Vec<Value>> {
        let body = self.get("dog_relations").await?;
        parse_relations(body)
    }

    async fn dog(&self, slug: &str) -> Result<Map<String, Value>> {
        let body = self.get(&format!("dog/{}", slug)).await?;
        parse_dog(body)
    }
}

/// Extract the relation list; a null list means no dogs
pub fn parse_relations(body: Value) -> Result<Vec<Value>> {
    match body.get("dog_relations") {
        Some(Value::Array(relations)) => Ok(relations.clone()),
        Some(Value::Null) => Ok(Vec::new()),
        _ => Err(Error::malformed("FitBark answer has no dog_relations list")),
    }
}

/// Extract the dog record from `{"dog": {...}}`
pub fn parse_dog(body: Value) -> Result<Map<String, Value>> {
    match body {
        Value::Object(mut map) => match map.remove("dog") {
            Some(Value::Object(dog)) => Ok(dog),
            _ => Err(Error::malformed("FitBark answer has no dog object")),
        },
        _ => Err(Error::malformed("FitBark answer is not an object")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn relations_parse_and_tolerate_null() {
        let relations = assert_ok!(parse_relations(json!({
            "dog_relations": [{"dog": {"slug": "rex"}}, {"dog": {"slug": "fido"}}]
        })));
        assert_eq!(relations.len(), 2);

        assert!(parse_relations(json!({"dog_relations": null})).unwrap().is_empty());
        assert_err!(parse_relations(json!({"error": "nope"})));
    }

    #[test]
    fn dog_is_unwrapped() {
        let dog = parse_dog(json!({"dog": {"slug": "rex", "hourly_average": 12}})).unwrap();
        assert_eq!(dog["slug"], json!("rex"));
        assert!(matches!(parse_dog(json!({"dog": []})), Err(Error::MalformedSnapshot(_))));
        assert!(parse_dog(json!("rex")).is_err());
    }

    #[test]
    fn base_url_is_trimmed() {
        struct Fixed;
        #[async_trait]
        impl TokenSession for Fixed {
            async fn ensure_token_valid(&self) -> Result<OAuthToken> {
                Err(Error::auth("unused"))
            }
        }

        let client = FitbarkClient::new(reqwest::Client::new(), Arc::new(Fixed))
            .with_base_url("http://localhost:9000/api/v2/");
        assert_eq!(client.base_url, "http://localhost:9000/api/v2");
    }
}
