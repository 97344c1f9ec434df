//! OAuth2 for the FitBark API
//!
//! The authorization-code exchange happens outside homelink; config entries
//! arrive with a token. This module keeps that token fresh and obtains the
//! client-credentials token used to manage redirect URIs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use homelink_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;

/// FitBark authorization endpoint
pub const AUTHORIZE_URL: &str = "https://app.fitbark.com/oauth/authorize";

/// FitBark token endpoint
pub const TOKEN_URL: &str = "https://app.fitbark.com/oauth/token";

/// A token is refreshed when it expires within this margin
pub const REFRESH_MARGIN: Duration = Duration::from_secs(20);

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Token stored in config entry data
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Expiry as a Unix timestamp in seconds
    #[serde(default)]
    pub expires_at: Option<f64>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

impl OAuthToken {
    /// Whether the token expires within `margin` of `now`
    ///
    /// A token without expiry never needs a refresh.
    pub fn expires_within(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => {
                let now = now.timestamp_millis() as f64 / 1000.0;
                expires_at < now + margin.as_secs_f64()
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthToken")
            .field("access_token", &"<REDACTED>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<REDACTED>"))
            .field("expires_at", &self.expires_at)
            .field("token_type", &self.token_type)
            .finish()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<f64>,
    #[serde(default)]
    token_type: Option<String>,
}

impl TokenResponse {
    fn into_token(self, now: DateTime<Utc>, previous_refresh: Option<String>) -> OAuthToken {
        OAuthToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
            expires_at: self
                .expires_in
                .map(|secs| now.timestamp() as f64 + secs),
            token_type: self.token_type.unwrap_or_else(default_token_type),
        }
    }
}

/// Client registration at the FitBark OAuth2 provider
///
/// Registered under a name (the domain for the legacy section); config
/// entries select it through their `auth_implementation` field.
///
/// # Security
///
/// The Debug implementation does NOT expose the client secret.
#[derive(Clone)]
pub struct OAuth2Implementation {
    name: String,
    client_id: String,
    /// ⚠️ NEVER log this value
    client_secret: String,
    authorize_url: String,
    token_url: String,
}

impl std::fmt::Debug for OAuth2Implementation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2Implementation")
            .field("name", &self.name)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<REDACTED>")
            .field("token_url", &self.token_url)
            .finish()
    }
}

impl OAuth2Implementation {
    /// Local implementation against the FitBark endpoints
    pub fn local(
        name: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            authorize_url: AUTHORIZE_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// URL the user is sent to for consent
    pub fn authorize_url(&self, redirect_uri: &str, state: &str) -> Result<String> {
        let mut url = reqwest::Url::parse(&self.authorize_url)
            .map_err(|e| Error::config(format!("Invalid authorize URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("state", state);
        Ok(url.into())
    }

    /// Exchange a refresh token for a new access token
    ///
    /// # Errors
    ///
    /// - [`Error::Authentication`]: Refresh token revoked or missing
    /// - [`Error::TransientFetch`]: Token endpoint unreachable or failing
    pub async fn refresh(&self, http: &reqwest::Client, token: &OAuthToken) -> Result<OAuthToken> {
        let refresh_token = token
            .refresh_token
            .clone()
            .ok_or_else(|| Error::auth("token expired and no refresh token is stored"))?;

        let response = http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::transient(format!("Token refresh request failed: {}", e)))?;

        let token_response = parse_token_response(response).await?;
        Ok(token_response.into_token(Utc::now(), Some(refresh_token)))
    }

    /// Obtain an application token (client-credentials grant)
    pub async fn client_credentials(&self, http: &reqwest::Client, scope: &str) -> Result<OAuthToken> {
        let response = http
            .post(&self.token_url)
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .json(&serde_json::json!({
                "grant_type": "client_credentials",
                "client_id": self.client_id,
                "client_secret": self.client_secret,
                "scope": scope,
            }))
            .send()
            .await
            .map_err(|e| Error::connect(format!("Token request failed: {}", e)))?;

        let token_response = parse_token_response(response).await?;
        Ok(token_response.into_token(Utc::now(), None))
    }
}

async fn parse_token_response(response: reqwest::Response) -> Result<TokenResponse> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        // Token endpoints answer 400 invalid_grant for revoked refresh tokens
        if status.as_u16() == 400 && body.contains("invalid_grant") {
            return Err(Error::auth("refresh token was revoked"));
        }
        return Err(Error::from_status("fitbark", status.as_u16(), &body));
    }
    response
        .json()
        .await
        .map_err(|e| Error::malformed(format!("Token endpoint answer is invalid: {}", e)))
}

/// Source of a valid access token
#[async_trait]
pub trait TokenSession: Send + Sync {
    /// Current token, refreshed first when it is about to expire
    async fn ensure_token_valid(&self) -> Result<OAuthToken>;
}

/// Token session of one config entry
pub struct OAuth2Session {
    implementation: OAuth2Implementation,
    http: reqwest::Client,
    token: Mutex<OAuthToken>,
}

impl OAuth2Session {
    pub fn new(implementation: OAuth2Implementation, http: reqwest::Client, token: OAuthToken) -> Self {
        Self {
            implementation,
            http,
            token: Mutex::new(token),
        }
    }
}

impl std::fmt::Debug for OAuth2Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2Session")
            .field("implementation", &self.implementation)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenSession for OAuth2Session {
    async fn ensure_token_valid(&self) -> Result<OAuthToken> {
        let mut token = self.token.lock().await;
        if token.expires_within(Utc::now(), REFRESH_MARGIN) {
            tracing::debug!(
                "Refreshing FitBark token for implementation {}",
                self.implementation.name()
            );
            *token = self.implementation.refresh(&self.http, &token).await?;
        }
        Ok(token.clone())
    }
}
