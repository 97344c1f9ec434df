//! Redirect URI registration
//!
//! FitBark only redirects to URIs registered for the client. The legacy
//! section can name the host's external base URL; its OAuth callback is then
//! added to the client's redirect list with an application token.

use homelink_core::{Error, Result};
use serde_json::{Value, json};

use crate::client::API_BASE;
use crate::oauth::OAuth2Implementation;

/// Scope of the application token that may edit redirect URIs
pub const REDIRECT_SCOPE: &str = "fitbark_open_api_2745H78RVS";

/// Path of the OAuth callback below the host's base URL
pub const CALLBACK_PATH: &str = "/auth/external/callback";

/// FitBark keeps redirect URIs in one `\r`-separated string
const SEPARATOR: char = '\r';

/// Callback URL for a host base URL
pub fn callback_url(base_url: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), CALLBACK_PATH)
}

/// Registered list with `callback` appended, or `None` if already present
pub fn with_redirect(registered: &str, callback: &str) -> Option<String> {
    if registered.split(SEPARATOR).any(|uri| uri == callback) {
        return None;
    }
    if registered.is_empty() {
        Some(callback.to_string())
    } else {
        Some(format!("{}{}{}", registered, SEPARATOR, callback))
    }
}

/// Registered list without `callback`, or `None` if it was absent
pub fn without_redirect(registered: &str, callback: &str) -> Option<String> {
    let uris: Vec<&str> = registered.split(SEPARATOR).collect();
    if !uris.contains(&callback) {
        return None;
    }
    Some(
        uris.into_iter()
            .filter(|uri| *uri != callback)
            .collect::<Vec<_>>()
            .join(&SEPARATOR.to_string()),
    )
}

/// Adds and removes the host's callback URL
#[derive(Debug)]
pub struct RedirectUriRegistrar {
    implementation: OAuth2Implementation,
    http: reqwest::Client,
    callback_url: String,
    api_base: String,
}

impl RedirectUriRegistrar {
    pub fn new(implementation: OAuth2Implementation, http: reqwest::Client, base_url: &str) -> Self {
        Self {
            implementation,
            http,
            callback_url: callback_url(base_url),
            api_base: API_BASE.to_string(),
        }
    }

    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    /// Register the callback URL; `Ok(false)` when it was already registered
    pub async fn add_callback_url(&self) -> Result<bool> {
        let access_token = self.app_token().await?;
        let registered = self.registered(&access_token).await?;
        match with_redirect(&registered, &self.callback_url) {
            Some(updated) => {
                self.store(&access_token, &updated).await?;
                tracing::debug!("Added {} redirect url", self.callback_url);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Unregister the callback URL; `Ok(false)` when it was not registered
    pub async fn remove_callback_url(&self) -> Result<bool> {
        let access_token = self.app_token().await?;
        let registered = self.registered(&access_token).await?;
        match without_redirect(&registered, &self.callback_url) {
            Some(updated) => {
                self.store(&access_token, &updated).await?;
                tracing::debug!("Removed {} redirect url", self.callback_url);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn app_token(&self) -> Result<String> {
        let token = self
            .implementation
            .client_credentials(&self.http, REDIRECT_SCOPE)
            .await?;
        Ok(token.access_token)
    }

    async fn registered(&self, access_token: &str) -> Result<String> {
        let response = self
            .http
            .get(format!("{}/redirect_urls", self.api_base))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| Error::connect(format!("Redirect URL request failed: {}", e)))?;
        let body = json_body(response).await?;
        Ok(body
            .get("redirect_uri")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    async fn store(&self, access_token: &str, redirect_uri: &str) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/redirect_urls", self.api_base))
            .bearer_auth(access_token)
            .json(&json!({ "redirect_uri": redirect_uri }))
            .send()
            .await
            .map_err(|e| Error::connect(format!("Redirect URL update failed: {}", e)))?;
        json_body(response).await.map(|_| ())
    }
}

async fn json_body(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::from_status("fitbark", status.as_u16(), &body));
    }
    response
        .json()
        .await
        .map_err(|e| Error::malformed(format!("FitBark answer is not JSON: {}", e)))
}
