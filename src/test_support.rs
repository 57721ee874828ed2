//! In-memory providers shared by the unit tests.

use crate::credentials::{
    ConsentFlow, CredentialManager, CredentialToken, TokenEndpoint, TokenGrant, TokenStore,
    BLOGGER_SCOPE,
};
use crate::error::{AuthError, GenerationError, PublishError};
use crate::generator::{ChatProvider, ChatRequest, ChatResponse};
use crate::posts::{BloggerPost, PublishedPost};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

pub fn token_expiring_in(offset: Duration, refresh: Option<&str>) -> CredentialToken {
    CredentialToken {
        token: "ya29.stored".to_string(),
        refresh_token: refresh.map(str::to_string),
        token_uri: "https://oauth2.googleapis.com/token".to_string(),
        client_id: "cid".to_string(),
        client_secret: Some("secret".to_string()),
        scopes: vec![BLOGGER_SCOPE.to_string()],
        expiry: Some(Utc::now() + offset),
    }
}

pub fn future_token() -> CredentialToken {
    token_expiring_in(Duration::hours(1), Some("1//r"))
}

pub fn expired_token(refresh: Option<&str>) -> CredentialToken {
    token_expiring_in(Duration::hours(-1), refresh)
}

#[derive(Default)]
pub struct CountingEndpoint {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

#[async_trait]
impl TokenEndpoint for CountingEndpoint {
    async fn refresh(&self, _token: &CredentialToken) -> Result<TokenGrant, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(AuthError::Refresh("400 - invalid_grant".to_string()));
        }
        Ok(TokenGrant {
            access_token: "ya29.refreshed".to_string(),
            expires_in: Some(3599),
            refresh_token: None,
            scope: None,
        })
    }
}

#[derive(Default)]
pub struct CountingConsent {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

#[async_trait]
impl ConsentFlow for CountingConsent {
    async fn authorize(&self) -> Result<CredentialToken, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(AuthError::Denied("access_denied".to_string()));
        }
        Ok(CredentialToken {
            token: "ya29.consented".to_string(),
            refresh_token: Some("1//new".to_string()),
            ..future_token()
        })
    }
}

pub struct CredentialHarness {
    _dir: TempDir,
    pub store: TokenStore,
    pub endpoint: Arc<CountingEndpoint>,
    pub consent: Arc<CountingConsent>,
    pub manager: CredentialManager,
}

/// A manager over a temp token file, optionally pre-seeded
pub fn credential_harness(stored: Option<&CredentialToken>) -> CredentialHarness {
    let dir = TempDir::new().unwrap();
    let store = TokenStore::new(dir.path().join("token.json"));
    if let Some(token) = stored {
        store.save(token).unwrap();
    }
    let endpoint = Arc::new(CountingEndpoint::default());
    let consent = Arc::new(CountingConsent::default());
    let manager = CredentialManager::new(store.clone(), endpoint.clone(), consent.clone());
    CredentialHarness {
        _dir: dir,
        store,
        endpoint,
        consent,
        manager,
    }
}

/// Chat backend that answers with a fixed reply and records requests
#[derive(Default)]
pub struct RecordingProvider {
    pub calls: AtomicUsize,
    pub requests: Mutex<Vec<ChatRequest>>,
    pub reply: Option<String>,
    pub fail_status: Option<u16>,
    /// Fail only the first `n` calls; `None` fails every call
    pub fail_limit: Option<usize>,
}

impl RecordingProvider {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Some(text.to_string()),
            ..Self::default()
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            fail_status: Some(status),
            ..Self::default()
        }
    }

    pub fn failing_once_then_replying(status: u16, text: &str) -> Self {
        Self {
            reply: Some(text.to_string()),
            fail_status: Some(status),
            fail_limit: Some(1),
            ..Self::default()
        }
    }
}

#[async_trait]
impl ChatProvider for Arc<RecordingProvider> {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, GenerationError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(request.clone());

        let failing = self.fail_limit.map_or(true, |limit| call <= limit);
        if let (Some(status), true) = (self.fail_status, failing) {
            return Err(GenerationError::Status {
                status,
                body: "provider unavailable".to_string(),
            });
        }

        let body = match &self.reply {
            Some(text) => serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": text}}]
            }),
            None => serde_json::json!({"choices": []}),
        };
        Ok(serde_json::from_value(body).unwrap())
    }
}

/// Blog backend that records `(blog_id, bearer, post)` for each insert
#[derive(Default)]
pub struct RecordingBlog {
    pub posts: Mutex<Vec<(String, String, BloggerPost)>>,
    pub reject: Option<(u16, String)>,
}

impl RecordingBlog {
    pub fn accepting() -> Self {
        Self::default()
    }

    pub fn rejecting(status: u16, body: &str) -> Self {
        Self {
            reject: Some((status, body.to_string())),
            ..Self::default()
        }
    }
}

#[async_trait]
impl crate::publisher::BlogApi for Arc<RecordingBlog> {
    async fn insert_post(
        &self,
        blog_id: &str,
        access_token: &str,
        post: &BloggerPost,
    ) -> Result<PublishedPost, PublishError> {
        if let Some((status, body)) = &self.reject {
            return Err(PublishError::Rejected {
                status: *status,
                body: body.clone(),
            });
        }

        let mut posts = self.posts.lock().unwrap();
        posts.push((blog_id.to_string(), access_token.to_string(), post.clone()));
        let id = format!("post-{}", posts.len());
        Ok(PublishedPost {
            url: Some(format!("https://example.blogspot.com/{id}.html")),
            id,
        })
    }
}

/// Serve a single HTTP request on loopback, answering `status` with `body`
///
/// Returns the base URL to point a client at.
pub async fn respond_once(status: u16, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut reader = BufReader::new(stream);

        let mut content_length = 0;
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await.unwrap() == 0 || line == "\r\n" {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().unwrap_or(0);
                }
            }
        }
        let mut request_body = vec![0; content_length];
        reader.read_exact(&mut request_body).await.unwrap();

        let response = format!(
            "HTTP/1.1 {status} Test\r\nContent-Type: application/json\r\n\
             Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let mut stream = reader.into_inner();
        stream.write_all(response.as_bytes()).await.unwrap();
        let _ = stream.shutdown().await;
    });

    format!("http://{addr}")
}
