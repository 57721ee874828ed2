//! Blogger API integration
//!
//! Creates posts via the Blogger v3 `posts.insert` endpoint using the token
//! held by the credential manager.

use crate::credentials::CredentialManager;
use crate::error::PublishError;
use crate::posts::{BloggerPost, Draft, PublishedPost};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};

/// The blog-hosting side of publishing
#[async_trait]
pub trait BlogApi: Send + Sync {
    async fn insert_post(
        &self,
        blog_id: &str,
        access_token: &str,
        post: &BloggerPost,
    ) -> Result<PublishedPost, PublishError>;
}

pub struct BloggerClient {
    client: Client,
    api_base: String,
}

impl BloggerClient {
    #[must_use]
    pub fn new(api_base: &str) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    fn posts_url(&self, blog_id: &str) -> String {
        format!(
            "{}/blogs/{}/posts/",
            self.api_base,
            urlencoding::encode(blog_id)
        )
    }
}

#[async_trait]
impl BlogApi for BloggerClient {
    async fn insert_post(
        &self,
        blog_id: &str,
        access_token: &str,
        post: &BloggerPost,
    ) -> Result<PublishedPost, PublishError> {
        let response = self
            .client
            .post(self.posts_url(blog_id))
            .bearer_auth(access_token)
            .json(post)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PublishError::Unauthorized {
                    status: status.as_u16(),
                    body,
                },
                _ => PublishError::Rejected {
                    status: status.as_u16(),
                    body,
                },
            });
        }

        response
            .json::<PublishedPost>()
            .await
            .map_err(|e| PublishError::Malformed(e.to_string()))
    }
}

/// Sends reviewed drafts to one blog
///
/// Every call creates a new post; nothing here detects duplicates.
pub struct Publisher<'a> {
    credentials: &'a CredentialManager,
    api: Box<dyn BlogApi>,
    blog_id: String,
}

impl<'a> Publisher<'a> {
    #[must_use]
    pub fn new(
        credentials: &'a CredentialManager,
        api: Box<dyn BlogApi>,
        blog_id: impl Into<String>,
    ) -> Self {
        Self {
            credentials,
            api,
            blog_id: blog_id.into(),
        }
    }

    #[must_use]
    pub fn blog_id(&self) -> &str {
        &self.blog_id
    }

    /// Publish `draft` exactly as reviewed
    ///
    /// # Errors
    /// Returns error if no token can be obtained or Blogger rejects the post
    pub async fn publish(&self, draft: Draft) -> Result<PublishedPost, PublishError> {
        let token = self.credentials.acquire().await?;
        let post = BloggerPost::from(draft);

        tracing::info!(blog_id = %self.blog_id, title = %post.title, "publishing post");
        let published = self
            .api
            .insert_post(&self.blog_id, &token.token, &post)
            .await?;
        tracing::info!(post_id = %published.id, "post created");

        Ok(published)
    }
}
