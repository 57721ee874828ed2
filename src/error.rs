//! Error types for each stage of the write-review-publish flow.

use thiserror::Error;

/// Operator input that cannot start a generation round
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter a title.")]
    MissingTitle,
    #[error("Please enter what the content should be about.")]
    MissingTopic,
    #[error("Please enter both a title and content description.")]
    MissingTitleAndTopic,
}

/// Failure to obtain a usable Blogger token
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("OAuth client file not readable at {path}: {reason}\nDownload it from the Google Cloud console and run 'blog-poster auth'.")]
    ClientSecrets { path: String, reason: String },

    #[error("Token file {path} is unreadable: {reason}\nDelete it and run 'blog-poster auth'.")]
    TokenFile { path: String, reason: String },

    #[error("Failed to save token to {path}: {reason}")]
    Persist { path: String, reason: String },

    #[error("Authorization was denied: {0}")]
    Denied(String),

    #[error("State mismatch in authorization callback - possible CSRF attack")]
    StateMismatch,

    #[error("Timed out after {0}s waiting for the authorization callback")]
    Timeout(u64),

    #[error("Token refresh failed: {0}\n\nRun 'blog-poster auth' to re-authenticate.")]
    Refresh(String),

    #[error("Token exchange failed: {0}")]
    Exchange(String),

    #[error("Authorization callback failed: {0}")]
    Callback(String),
}

/// Failure while requesting a draft from the text-generation provider
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generation request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Text-generation provider rejected the API key: {0}")]
    Unauthorized(String),

    #[error("Text-generation provider error: {status} - {body}")]
    Status { status: u16, body: String },

    #[error("Malformed generation response: {0}")]
    Malformed(String),
}

/// Failure while creating the post on the blog provider
#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Publish request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Blogger refused authorization: {status} - {body}")]
    Unauthorized { status: u16, body: String },

    #[error("Failed to publish: {status} - {body}")]
    Rejected { status: u16, body: String },

    #[error("Malformed publish response: {0}")]
    Malformed(String),
}

/// Everything the interaction controller can surface to the operator
#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("{0} was cancelled")]
    Cancelled(&'static str),

    #[error("Cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },
}

impl FlowError {
    /// Validation problems are warnings; the flow keeps waiting for input.
    #[must_use]
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
