use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;

use crate::config::OAuthConfig;
use crate::error::{AppError, AppResult};

/// Result of exchanging an authorization code at the provider's token
/// endpoint. `subject` is the provider's claimed user id from the id token;
/// it is cross-checked against the token-info endpoint before being trusted.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_token: String,
    pub subject: String,
}

/// Verified facts about an access token from the provider's token-info
/// endpoint.
#[derive(Debug, Clone)]
pub struct TokenInfo {
    /// The client id the token was issued to.
    pub audience: String,
    /// The provider-side user the token acts for.
    pub user_id: String,
}

/// Profile fields from the provider's user-info endpoint.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub picture: Option<String>,
}

/// External contract this application consumes from the OAuth provider.
/// Each call is a single synchronous-in-spirit network exchange; no retry
/// policy is applied, a failure surfaces to the caller immediately.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    async fn exchange_code(&self, code: &str) -> AppResult<Credentials>;
    async fn validate_token(&self, access_token: &str) -> AppResult<TokenInfo>;
    async fn fetch_profile(&self, access_token: &str) -> AppResult<Profile>;
    /// True when the provider confirmed the revocation.
    async fn revoke_token(&self, access_token: &str) -> AppResult<bool>;
}

/// Google-shaped provider client. Endpoint URLs come from configuration so
/// tests can point it elsewhere.
pub struct GoogleProvider {
    http: reqwest::Client,
    config: OAuthConfig,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    id_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenInfoWire {
    #[serde(default)]
    error: Option<String>,
    // Google's v1 tokeninfo calls the audience "issued_to"
    #[serde(default, alias = "issued_to")]
    audience: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

fn provider_unreachable(e: reqwest::Error) -> AppError {
    AppError::external("provider_unreachable".to_string(), e.to_string())
}

fn provider_status(status: reqwest::StatusCode) -> AppError {
    AppError::external(
        format!("provider_status_{}", status.as_u16()),
        "oauth provider returned a failure status".to_string(),
    )
}

/// Extract the `sub` claim from an id token payload. The signature is not
/// verified here; the claimed subject is only accepted after the token-info
/// cross-check in the connect flow.
fn id_token_subject(id_token: &str) -> AppResult<String> {
    let malformed = || AppError::auth("invalid_id_token", "credential id token is malformed");
    let payload = id_token.split('.').nth(1).ok_or_else(malformed)?;
    let raw = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| malformed())?;
    let claims: serde_json::Value = serde_json::from_slice(&raw).map_err(|_| malformed())?;
    claims
        .get("sub")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(malformed)
}

impl GoogleProvider {
    pub fn new(config: OAuthConfig) -> Self {
        Self { http: reqwest::Client::new(), config }
    }
}

#[async_trait]
impl OAuthProvider for GoogleProvider {
    async fn exchange_code(&self, code: &str) -> AppResult<Credentials> {
        let params = [
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];
        let resp = self
            .http
            .post(&self.config.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(provider_unreachable)?;
        if !resp.status().is_success() {
            // The provider rejected the code itself, not the transport
            return Err(AppError::auth(
                "code_exchange_failed",
                "failed to upgrade the authorization code",
            ));
        }
        let token: TokenResponse = resp.json().await.map_err(provider_unreachable)?;
        let id_token = token
            .id_token
            .ok_or_else(|| AppError::auth("missing_id_token", "provider returned no id token"))?;
        let subject = id_token_subject(&id_token)?;
        Ok(Credentials { access_token: token.access_token, subject })
    }

    async fn validate_token(&self, access_token: &str) -> AppResult<TokenInfo> {
        let resp = self
            .http
            .get(&self.config.tokeninfo_uri)
            .query(&[("access_token", access_token)])
            .send()
            .await
            .map_err(provider_unreachable)?;
        let status = resp.status();
        let wire: TokenInfoWire = resp.json().await.map_err(provider_unreachable)?;
        if let Some(err) = wire.error {
            return Err(AppError::auth("invalid_token".to_string(), err));
        }
        if !status.is_success() {
            return Err(provider_status(status));
        }
        match (wire.audience, wire.user_id) {
            (Some(audience), Some(user_id)) => Ok(TokenInfo { audience, user_id }),
            _ => Err(AppError::auth("invalid_token", "token info is missing audience or user id")),
        }
    }

    async fn fetch_profile(&self, access_token: &str) -> AppResult<Profile> {
        let resp = self
            .http
            .get(&self.config.userinfo_uri)
            .query(&[("access_token", access_token), ("alt", "json")])
            .send()
            .await
            .map_err(provider_unreachable)?;
        if !resp.status().is_success() {
            return Err(provider_status(resp.status()));
        }
        resp.json().await.map_err(provider_unreachable)
    }

    async fn revoke_token(&self, access_token: &str) -> AppResult<bool> {
        let resp = self
            .http
            .get(&self.config.revoke_uri)
            .query(&[("token", access_token)])
            .send()
            .await
            .map_err(provider_unreachable)?;
        Ok(resp.status().is_success())
    }
}
