//! Draft generation through the OpenAI Chat Completions API

use crate::error::GenerationError;
use crate::posts::{Draft, PostRequest};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

pub const SYSTEM_INSTRUCTION: &str = "
You are a skilled blog post writer. Follow these guidelines:
1. Use the exact title provided in the title area.
2. Write interesting, relevant content based on the terms in the \"about\" field.
3. Structure the post with appropriate headings and paragraphs.
4. Images can be little smaller in size to fit on the site, and they should be positioned where the relevant information and images match.
";

pub const IMAGE_SUGGESTION_CLAUSE: &str =
    " Include image suggestions as described in the system instructions.";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn new(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content,
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// A chat-completion backend
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, GenerationError>;
}

pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    /// No timeout is set; the provider's own limits apply.
    #[must_use]
    pub fn new(api_key: String, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ChatProvider for OpenAiClient {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, GenerationError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("unknown error"));
            if status == StatusCode::UNAUTHORIZED {
                return Err(GenerationError::Unauthorized(body));
            }
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<ChatResponse>()
            .await
            .map_err(|e| GenerationError::Malformed(e.to_string()))
    }
}

/// The user turn for a request, with the image clause appended when asked for
#[must_use]
pub fn build_user_prompt(request: &PostRequest) -> String {
    let mut prompt = format!(
        "Write a detailed blog post with the title '{}'. Here's what the content should be about: {}",
        request.title(),
        request.topic()
    );
    if request.include_images() {
        prompt.push_str(IMAGE_SUGGESTION_CLAUSE);
    }
    prompt
}

#[must_use]
pub fn build_messages(request: &PostRequest) -> Vec<ChatMessage> {
    vec![
        ChatMessage::new("system", SYSTEM_INSTRUCTION.to_string()),
        ChatMessage::new("user", build_user_prompt(request)),
    ]
}

fn extract_content(response: ChatResponse) -> Result<String, GenerationError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| GenerationError::Malformed("response contained no choices".to_string()))?;

    choice
        .message
        .content
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| GenerationError::Malformed("first choice has no content".to_string()))
}

/// Writes drafts; every call goes to the provider
pub struct DraftGenerator {
    provider: Box<dyn ChatProvider>,
    model: String,
}

impl DraftGenerator {
    #[must_use]
    pub fn new(provider: Box<dyn ChatProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Request a draft for `request`
    ///
    /// # Errors
    /// Returns error on transport failure, rejected key, error status, or an
    /// empty/undecodable response
    pub async fn generate(&self, request: &PostRequest) -> Result<Draft, GenerationError> {
        let chat = ChatRequest {
            model: self.model.clone(),
            messages: build_messages(request),
        };

        tracing::info!(model = %self.model, title = %request.title(), "requesting draft");
        let response = self.provider.complete(&chat).await?;
        let content = extract_content(response)?;
        tracing::debug!(chars = content.len(), "draft received");

        Ok(Draft::new(request.clone(), content))
    }
}
