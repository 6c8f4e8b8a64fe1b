//! OAuth client configuration.
//! Settings load from a JSON secrets file in the provider's download shape
//! (`{"web": {"client_id": ..., "client_secret": ...}}`); endpoint URLs
//! default to Google's and can be overridden per entry, which is how tests
//! point the provider at a local stub.

use std::{env, fs, path::Path};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const CLIENT_SECRETS_ENV: &str = "CURIO_CLIENT_SECRETS";
const DEFAULT_SECRETS_FILE: &str = "client_secrets.json";

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default = "default_tokeninfo_uri")]
    pub tokeninfo_uri: String,
    #[serde(default = "default_userinfo_uri")]
    pub userinfo_uri: String,
    #[serde(default = "default_revoke_uri")]
    pub revoke_uri: String,
    /// "postmessage" for the one-time-code flow used by the login page.
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}
fn default_tokeninfo_uri() -> String {
    "https://www.googleapis.com/oauth2/v1/tokeninfo".to_string()
}
fn default_userinfo_uri() -> String {
    "https://www.googleapis.com/oauth2/v1/userinfo".to_string()
}
fn default_revoke_uri() -> String {
    "https://accounts.google.com/o/oauth2/revoke".to_string()
}
fn default_redirect_uri() -> String {
    "postmessage".to_string()
}

#[derive(Debug, Deserialize)]
struct SecretsFile {
    web: OAuthConfig,
}

impl OAuthConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref())
            .with_context(|| format!("reading client secrets from {}", path.as_ref().display()))?;
        let file: SecretsFile = serde_json::from_str(&raw).context("parsing client secrets JSON")?;
        Ok(file.web)
    }

    /// Load from the path named by `CURIO_CLIENT_SECRETS`, falling back to
    /// `client_secrets.json` in the working directory.
    pub fn from_env() -> Result<Self> {
        let path = env::var(CLIENT_SECRETS_ENV).unwrap_or_else(|_| DEFAULT_SECRETS_FILE.to_string());
        Self::load(path)
    }
}
