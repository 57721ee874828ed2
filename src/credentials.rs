//! Blogger credential management
//!
//! Owns the OAuth token used to publish. The token is read from disk on
//! first use, refreshed when expired, obtained through the browser consent
//! flow when nothing usable exists, and cached for the rest of the process.

use crate::config::{load_client_secrets, OAuthClient};
use crate::error::AuthError;
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use url::Url;

pub const BLOGGER_SCOPE: &str = "https://www.googleapis.com/auth/blogger";

/// Tokens this close to expiry are treated as expired
const EXPIRY_SKEW_SECS: i64 = 60;

const SUCCESS_PAGE: &str = "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n\
    <html><body style='font-family:sans-serif;text-align:center;padding:50px'>\
    <h1>Authorization Successful!</h1>\
    <p>You can close this window and return to the terminal.</p>\
    </body></html>";

const FAILURE_PAGE: &str = "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n\
    <html><body style='font-family:sans-serif;text-align:center;padding:50px'>\
    <h1>Authorization Failed</h1>\
    <p>Return to the terminal for details.</p>\
    </body></html>";

/// Persisted Blogger token, in Google's authorized-user JSON layout
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CredentialToken {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_uri: String,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl CredentialToken {
    /// A token without a recorded expiry never counts as expired.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry
            .is_some_and(|expiry| expiry - ChronoDuration::seconds(EXPIRY_SKEW_SECS) <= now)
    }

    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.token.is_empty() && !self.is_expired_at(now)
    }

    #[must_use]
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Token endpoint response for both code exchange and refresh
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Merge a refresh grant into an existing token
///
/// The refresh token and scopes carry over unless the provider sends new ones.
#[must_use]
pub fn apply_refresh(
    token: &CredentialToken,
    grant: TokenGrant,
    now: DateTime<Utc>,
) -> CredentialToken {
    CredentialToken {
        token: grant.access_token,
        refresh_token: grant.refresh_token.or_else(|| token.refresh_token.clone()),
        expiry: grant.expires_in.map(|secs| now + ChronoDuration::seconds(secs)),
        ..token.clone()
    }
}

/// Build a fresh token from a code-exchange grant
#[must_use]
pub fn token_from_grant(
    client: &OAuthClient,
    grant: TokenGrant,
    now: DateTime<Utc>,
) -> CredentialToken {
    let scopes = grant
        .scope
        .as_deref()
        .map(|s| s.split_whitespace().map(str::to_string).collect::<Vec<_>>())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| vec![BLOGGER_SCOPE.to_string()]);

    CredentialToken {
        token: grant.access_token,
        refresh_token: grant.refresh_token,
        token_uri: client.token_uri.clone(),
        client_id: client.client_id.clone(),
        client_secret: client.client_secret.clone(),
        scopes,
        expiry: grant.expires_in.map(|secs| now + ChronoDuration::seconds(secs)),
    }
}

/// Durable token file
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored token; `None` when no file exists
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(&self) -> Result<Option<CredentialToken>, AuthError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path).map_err(|e| self.file_error(&e))?;
        let token = serde_json::from_str(&content).map_err(|e| self.file_error(&e))?;
        Ok(Some(token))
    }

    /// Overwrite the token file atomically (temp file then rename)
    ///
    /// # Errors
    /// Returns error if the token cannot be serialized or written
    pub fn save(&self, token: &CredentialToken) -> Result<(), AuthError> {
        let persist_error = |reason: String| AuthError::Persist {
            path: self.path.display().to_string(),
            reason,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| persist_error(e.to_string()))?;
        }

        let content =
            serde_json::to_string_pretty(token).map_err(|e| persist_error(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(|e| persist_error(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| persist_error(e.to_string()))?;

        tracing::debug!(path = %self.path.display(), "token saved");
        Ok(())
    }

    fn file_error(&self, err: &dyn std::fmt::Display) -> AuthError {
        AuthError::TokenFile {
            path: self.path.display().to_string(),
            reason: err.to_string(),
        }
    }
}

/// Exchanges a refresh token for a new access token
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    async fn refresh(&self, token: &CredentialToken) -> Result<TokenGrant, AuthError>;
}

/// Obtains a brand-new token with the operator's involvement
#[async_trait]
pub trait ConsentFlow: Send + Sync {
    async fn authorize(&self) -> Result<CredentialToken, AuthError>;
}

/// Process-wide owner of the Blogger token
pub struct CredentialManager {
    store: TokenStore,
    endpoint: Arc<dyn TokenEndpoint>,
    consent: Arc<dyn ConsentFlow>,
    cached: Mutex<Option<CredentialToken>>,
}

impl CredentialManager {
    #[must_use]
    pub fn new(
        store: TokenStore,
        endpoint: Arc<dyn TokenEndpoint>,
        consent: Arc<dyn ConsentFlow>,
    ) -> Self {
        Self {
            store,
            endpoint,
            consent,
            cached: Mutex::new(None),
        }
    }

    /// Return a valid token, loading, refreshing or authorizing as needed
    ///
    /// # Errors
    /// Returns error if no valid token can be obtained
    pub async fn acquire(&self) -> Result<CredentialToken, AuthError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();

        if let Some(token) = cached.as_ref().filter(|t| t.is_valid_at(now)) {
            return Ok(token.clone());
        }

        let stored = match cached.take() {
            Some(token) => Some(token),
            None => self.store.load()?,
        };

        let token = match stored {
            Some(token) if token.is_valid_at(now) => {
                tracing::debug!("using stored Blogger token");
                token
            }
            Some(token) if token.can_refresh() => {
                println!("Access token expired, refreshing...");
                self.refresh_and_save(&token).await?
            }
            _ => self.authorize_and_save().await?,
        };

        *cached = Some(token.clone());
        Ok(token)
    }

    /// Refresh the given token, persist it and make it the cached token
    ///
    /// # Errors
    /// Returns error if the refresh is rejected or the token cannot be saved
    pub async fn refresh(&self, token: &CredentialToken) -> Result<CredentialToken, AuthError> {
        let mut cached = self.cached.lock().await;
        let refreshed = self.refresh_and_save(token).await?;
        *cached = Some(refreshed.clone());
        Ok(refreshed)
    }

    /// Refresh the token on disk exactly once, never falling back to consent
    ///
    /// # Errors
    /// Returns error if no token with a refresh token is stored, or the
    /// refresh is rejected
    pub async fn refresh_stored(&self) -> Result<CredentialToken, AuthError> {
        let stored = self
            .store
            .load()?
            .ok_or_else(|| AuthError::Refresh("no stored token".to_string()))?;
        self.refresh(&stored).await
    }

    /// Run the consent flow unconditionally, persist and cache the result
    ///
    /// # Errors
    /// Returns error if consent fails or the token cannot be saved
    pub async fn authorize(&self) -> Result<CredentialToken, AuthError> {
        let mut cached = self.cached.lock().await;
        let token = self.authorize_and_save().await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    async fn refresh_and_save(
        &self,
        token: &CredentialToken,
    ) -> Result<CredentialToken, AuthError> {
        if !token.can_refresh() {
            return Err(AuthError::Refresh("no refresh token stored".to_string()));
        }

        let grant = self.endpoint.refresh(token).await?;
        let refreshed = apply_refresh(token, grant, Utc::now());
        self.store.save(&refreshed)?;
        tracing::info!(expiry = ?refreshed.expiry, "Blogger token refreshed");
        Ok(refreshed)
    }

    async fn authorize_and_save(&self) -> Result<CredentialToken, AuthError> {
        tracing::info!("no usable Blogger token, starting consent flow");
        let token = self.consent.authorize().await?;
        self.store.save(&token)?;
        println!("Token saved to {}", self.store.path().display());
        Ok(token)
    }
}

/// Google OAuth 2.0 for installed apps (loopback redirect with PKCE)
pub struct GoogleOAuth {
    http: reqwest::Client,
    client_secrets_path: PathBuf,
    consent_timeout: Duration,
}

impl GoogleOAuth {
    #[must_use]
    pub fn new(client_secrets_path: PathBuf, consent_timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_secrets_path,
            consent_timeout,
        }
    }

    fn load_client(&self) -> Result<OAuthClient, AuthError> {
        load_client_secrets(&self.client_secrets_path).map_err(|e| AuthError::ClientSecrets {
            path: self.client_secrets_path.display().to_string(),
            reason: format!("{e:#}"),
        })
    }

    /// Wait for the browser redirect, giving up after the consent timeout
    async fn receive_code(
        &self,
        listener: &TcpListener,
        expected_state: &str,
    ) -> Result<String, AuthError> {
        tokio::time::timeout(
            self.consent_timeout,
            self.wait_for_callback(listener, expected_state),
        )
        .await
        .map_err(|_| AuthError::Timeout(self.consent_timeout.as_secs()))?
    }

    async fn wait_for_callback(
        &self,
        listener: &TcpListener,
        expected_state: &str,
    ) -> Result<String, AuthError> {
        let (mut stream, _) = listener
            .accept()
            .await
            .map_err(|e| AuthError::Callback(e.to_string()))?;

        let mut request_line = String::new();
        {
            let mut reader = BufReader::new(&mut stream);
            reader
                .read_line(&mut request_line)
                .await
                .map_err(|e| AuthError::Callback(e.to_string()))?;
        }

        let outcome = match parse_callback(&request_line) {
            Some(Callback::Code { code, state }) if state == expected_state => Ok(code),
            Some(Callback::Code { .. }) => Err(AuthError::StateMismatch),
            Some(Callback::Denied(reason)) => Err(AuthError::Denied(reason)),
            None => Err(AuthError::Callback(
                "Failed to extract authorization code".to_string(),
            )),
        };

        let page = if outcome.is_ok() { SUCCESS_PAGE } else { FAILURE_PAGE };
        if let Err(e) = stream.write_all(page.as_bytes()).await {
            tracing::warn!("failed to answer authorization callback: {e}");
        }

        outcome
    }

    async fn exchange_code(
        &self,
        client: &OAuthClient,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<TokenGrant, AuthError> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", client.client_id.as_str()),
            ("code_verifier", code_verifier),
        ];
        if let Some(secret) = client.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }

        let response = self
            .http
            .post(&client.token_uri)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::Exchange(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Exchange(format!("{status} - {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::Exchange(format!("Failed to parse token response: {e}")))
    }
}

#[async_trait]
impl TokenEndpoint for GoogleOAuth {
    async fn refresh(&self, token: &CredentialToken) -> Result<TokenGrant, AuthError> {
        let refresh_token = token.refresh_token.as_deref().unwrap_or_default();
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", token.client_id.as_str()),
        ];
        if let Some(secret) = token.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }

        let response = self
            .http
            .post(&token.token_uri)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::Refresh(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Refresh(format!("{status} - {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::Refresh(format!("Failed to parse token response: {e}")))
    }
}

#[async_trait]
impl ConsentFlow for GoogleOAuth {
    async fn authorize(&self) -> Result<CredentialToken, AuthError> {
        let client = self.load_client()?;

        let code_verifier = generate_code_verifier();
        let code_challenge = generate_code_challenge(&code_verifier);
        let state = generate_state();

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| AuthError::Callback(format!("Failed to bind loopback listener: {e}")))?;
        let port = listener
            .local_addr()
            .map_err(|e| AuthError::Callback(e.to_string()))?
            .port();
        let redirect_uri = format!("http://127.0.0.1:{port}/");

        let auth_url = build_auth_url(&client, &redirect_uri, &code_challenge, &state);

        println!("Opening browser for Blogger authorization...");
        println!("If browser doesn't open, visit:\n{auth_url}\n");

        if let Err(e) = open::that(&auth_url) {
            tracing::warn!("could not open browser: {e}");
        }

        println!("Waiting for authorization callback...");

        let code = self.receive_code(&listener, &state).await?;

        println!("Authorization code received. Exchanging for token...");

        let grant = self
            .exchange_code(&client, &code, &redirect_uri, &code_verifier)
            .await?;

        Ok(token_from_grant(&client, grant, Utc::now()))
    }
}

/// Build the consent URL the operator's browser is sent to
#[must_use]
pub fn build_auth_url(
    client: &OAuthClient,
    redirect_uri: &str,
    code_challenge: &str,
    state: &str,
) -> String {
    format!(
        "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={state}&code_challenge={code_challenge}&code_challenge_method=S256&access_type=offline&prompt=consent",
        client.auth_uri,
        urlencoding::encode(&client.client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(BLOGGER_SCOPE),
    )
}

/// Generate a random code verifier for PKCE (43-128 chars)
fn generate_code_verifier() -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..32).map(|_| rng.random::<u8>()).collect();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&bytes)
}

/// Generate code challenge from verifier (S256 method)
fn generate_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(hash)
}

/// Random state for CSRF protection
fn generate_state() -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..16).map(|_| rng.random::<u8>()).collect();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&bytes)
}

#[derive(Debug, PartialEq, Eq)]
enum Callback {
    Code { code: String, state: String },
    Denied(String),
}

/// Parse the redirect's request line, e.g. `GET /?code=..&state=.. HTTP/1.1`
fn parse_callback(request_line: &str) -> Option<Callback> {
    let path = request_line.split_whitespace().nth(1)?;
    let url = Url::parse(&format!("http://localhost{path}")).ok()?;
    let param = |name: &str| {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.to_string())
    };

    if let Some(error) = param("error") {
        return Some(Callback::Denied(error));
    }

    Some(Callback::Code {
        code: param("code")?,
        state: param("state")?,
    })
}
