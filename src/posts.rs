//! Post data: what the operator asked for, what was generated, what gets sent

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};

pub const BLOGGER_POST_KIND: &str = "blogger#post";

/// Operator input for one generation round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRequest {
    title: String,
    topic: String,
    include_images: bool,
}

impl PostRequest {
    /// Validate operator input; blank (whitespace-only) fields are rejected
    ///
    /// Accepted text is kept exactly as typed.
    ///
    /// # Errors
    /// Returns error naming whichever of title and topic is blank
    pub fn new(title: &str, topic: &str, include_images: bool) -> Result<Self, ValidationError> {
        match (title.trim().is_empty(), topic.trim().is_empty()) {
            (true, true) => Err(ValidationError::MissingTitleAndTopic),
            (true, false) => Err(ValidationError::MissingTitle),
            (false, true) => Err(ValidationError::MissingTopic),
            (false, false) => Ok(Self {
                title: title.to_string(),
                topic: topic.to_string(),
                include_images,
            }),
        }
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub fn include_images(&self) -> bool {
        self.include_images
    }
}

/// Generated content paired with the request that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    request: PostRequest,
    content: String,
}

impl Draft {
    #[must_use]
    pub fn new(request: PostRequest, content: String) -> Self {
        Self { request, content }
    }

    #[must_use]
    pub fn request(&self) -> &PostRequest {
        &self.request
    }

    #[must_use]
    pub fn title(&self) -> &str {
        self.request.title()
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Blogger v3 post resource, as submitted
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct BloggerPost {
    pub kind: String,
    pub title: String,
    pub content: String,
}

impl BloggerPost {
    #[must_use]
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: BLOGGER_POST_KIND.to_string(),
            title: title.into(),
            content: content.into(),
        }
    }
}

impl From<Draft> for BloggerPost {
    fn from(draft: Draft) -> Self {
        Self::new(draft.request.title, draft.content)
    }
}

/// What Blogger reports back after creating a post
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct PublishedPost {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
}
