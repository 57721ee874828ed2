//! Interaction controller: the generate, review, publish state machine.
//!
//! The reviewed draft lives inside [`FlowState::AwaitingReview`] and is moved
//! into the publisher on confirmation, so only the draft the operator is
//! looking at can be published, and only once.

use crate::error::{FlowError, GenerationError, PublishError};
use crate::generator::DraftGenerator;
use crate::posts::{Draft, PostRequest, PublishedPost};
use crate::publisher::Publisher;
use std::future::Future;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowState {
    AwaitingInput,
    Generating,
    AwaitingReview(Draft),
    Publishing,
    Done(PublishedPost),
    Error(String),
}

impl FlowState {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::AwaitingInput => "awaiting input",
            Self::Generating => "generating",
            Self::AwaitingReview(_) => "awaiting review",
            Self::Publishing => "publishing",
            Self::Done(_) => "done",
            Self::Error(_) => "in error",
        }
    }
}

/// Race `work` against `cancel`; `None` means cancelled
async fn run_cancellable<T>(
    cancel: &CancellationToken,
    work: impl Future<Output = T>,
) -> Option<T> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        out = work => Some(out),
    }
}

pub struct Controller<'a> {
    generator: DraftGenerator,
    publisher: Publisher<'a>,
    state: FlowState,
}

impl<'a> Controller<'a> {
    #[must_use]
    pub fn new(generator: DraftGenerator, publisher: Publisher<'a>) -> Self {
        Self {
            generator,
            publisher,
            state: FlowState::AwaitingInput,
        }
    }

    #[must_use]
    pub fn state(&self) -> &FlowState {
        &self.state
    }

    /// The draft under review, if any
    #[must_use]
    pub fn draft(&self) -> Option<&Draft> {
        match &self.state {
            FlowState::AwaitingReview(draft) => Some(draft),
            _ => None,
        }
    }

    /// Validate the form and generate a draft for it
    ///
    /// Starts a fresh round from any state; a draft still under review is
    /// dropped.
    ///
    /// # Errors
    /// `Validation` (state stays `AwaitingInput`), `Generation` (state goes to
    /// `Error`) or `Cancelled` (state returns to `AwaitingInput`)
    pub async fn submit(
        &mut self,
        title: &str,
        topic: &str,
        include_images: bool,
        cancel: &CancellationToken,
    ) -> Result<(), FlowError> {
        self.state = FlowState::AwaitingInput;
        let request = PostRequest::new(title, topic, include_images)?;

        self.state = FlowState::Generating;
        match run_cancellable(cancel, self.generator.generate(&request)).await {
            Some(Ok(draft)) => {
                self.state = FlowState::AwaitingReview(draft);
                Ok(())
            }
            Some(Err(err)) => Err(self.fail_generation(err)),
            None => {
                tracing::info!("generation cancelled by operator");
                self.state = FlowState::AwaitingInput;
                Err(FlowError::Cancelled("Generation"))
            }
        }
    }

    /// Publish the draft under review
    ///
    /// # Errors
    /// `InvalidTransition` unless a draft is under review, `Publish` (state
    /// goes to `Error`) or `Cancelled` (state goes to `Error`)
    pub async fn confirm_publish(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<PublishedPost, FlowError> {
        let draft = match std::mem::replace(&mut self.state, FlowState::Publishing) {
            FlowState::AwaitingReview(draft) => draft,
            other => {
                let state = other.name();
                self.state = other;
                return Err(FlowError::InvalidTransition {
                    action: "publish",
                    state,
                });
            }
        };

        match run_cancellable(cancel, self.publisher.publish(draft)).await {
            Some(Ok(post)) => {
                self.state = FlowState::Done(post.clone());
                Ok(post)
            }
            Some(Err(err)) => Err(self.fail_publish(err)),
            None => {
                tracing::warn!("publish cancelled by operator");
                self.state = FlowState::Error(
                    "Publish was cancelled; the post may still have been created on Blogger."
                        .to_string(),
                );
                Err(FlowError::Cancelled("Publish"))
            }
        }
    }

    /// Drop the draft under review and wait for new input
    ///
    /// # Errors
    /// `InvalidTransition` unless a draft is under review
    pub fn discard(&mut self) -> Result<(), FlowError> {
        if !matches!(self.state, FlowState::AwaitingReview(_)) {
            return Err(FlowError::InvalidTransition {
                action: "discard",
                state: self.state.name(),
            });
        }
        self.state = FlowState::AwaitingInput;
        Ok(())
    }

    fn fail_generation(&mut self, err: GenerationError) -> FlowError {
        tracing::warn!("generation failed: {err}");
        self.state = FlowState::Error(err.to_string());
        FlowError::Generation(err)
    }

    fn fail_publish(&mut self, err: PublishError) -> FlowError {
        tracing::warn!("publish failed: {err}");
        self.state = FlowState::Error(err.to_string());
        FlowError::Publish(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{credential_harness, future_token, RecordingBlog, RecordingProvider};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    struct Fakes {
        chat: Arc<RecordingProvider>,
        blog: Arc<RecordingBlog>,
    }

    fn controller<'a>(
        creds: &'a crate::credentials::CredentialManager,
        chat: RecordingProvider,
        blog: RecordingBlog,
    ) -> (Fakes, Controller<'a>) {
        let chat = Arc::new(chat);
        let blog = Arc::new(blog);
        let generator = DraftGenerator::new(Box::new(chat.clone()), "gpt-4o-mini");
        let publisher = Publisher::new(creds, Box::new(blog.clone()), "5995621997920515361");
        (Fakes { chat, blog }, Controller::new(generator, publisher))
    }

    #[tokio::test]
    async fn test_valid_input_reaches_review() {
        let creds = credential_harness(Some(&future_token()));
        let (fakes, mut ctl) = controller(
            &creds.manager,
            RecordingProvider::replying("draft"),
            RecordingBlog::accepting(),
        );

        ctl.submit("Cats", "Why cats purr", false, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(ctl.state().name(), "awaiting review");
        assert_eq!(ctl.draft().unwrap().content(), "draft");
        assert_eq!(fakes.chat.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_blank_input_stays_awaiting_input() {
        let creds = credential_harness(Some(&future_token()));
        let (fakes, mut ctl) = controller(
            &creds.manager,
            RecordingProvider::replying("draft"),
            RecordingBlog::accepting(),
        );

        for (title, topic) in [("", "topic"), ("title", ""), ("  ", "\n")] {
            let err = ctl
                .submit(title, topic, false, &CancellationToken::new())
                .await
                .unwrap_err();
            assert!(err.is_warning());
            assert_eq!(ctl.state(), &FlowState::AwaitingInput);
        }
        assert_eq!(fakes.chat.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_generation_failure_goes_to_error_and_allows_retry() {
        let creds = credential_harness(Some(&future_token()));
        let (fakes, mut ctl) = controller(
            &creds.manager,
            RecordingProvider::failing_once_then_replying(503, "second try"),
            RecordingBlog::accepting(),
        );

        let err = ctl
            .submit("Cats", "Why cats purr", false, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, FlowError::Generation(_)));
        assert!(matches!(ctl.state(), FlowState::Error(msg) if msg.contains("503")));

        ctl.submit("Cats", "Why cats purr", false, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(ctl.state().name(), "awaiting review");
        assert_eq!(ctl.draft().unwrap().content(), "second try");
        assert_eq!(fakes.chat.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_publish_requires_review() {
        let creds = credential_harness(Some(&future_token()));
        let (fakes, mut ctl) = controller(
            &creds.manager,
            RecordingProvider::replying("draft"),
            RecordingBlog::accepting(),
        );

        let err = ctl.confirm_publish(&CancellationToken::new()).await.unwrap_err();

        assert!(matches!(
            err,
            FlowError::InvalidTransition { action: "publish", state: "awaiting input" }
        ));
        assert_eq!(ctl.state(), &FlowState::AwaitingInput);
        assert!(fakes.blog.posts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_draft_published_only_once() {
        let creds = credential_harness(Some(&future_token()));
        let (fakes, mut ctl) = controller(
            &creds.manager,
            RecordingProvider::replying("draft"),
            RecordingBlog::accepting(),
        );
        let cancel = CancellationToken::new();

        ctl.submit("Cats", "Why cats purr", false, &cancel).await.unwrap();
        ctl.confirm_publish(&cancel).await.unwrap();
        let again = ctl.confirm_publish(&cancel).await;

        assert!(matches!(again, Err(FlowError::InvalidTransition { .. })));
        assert_eq!(fakes.blog.posts.lock().unwrap().len(), 1);
        assert!(matches!(ctl.state(), FlowState::Done(_)));
    }

    #[tokio::test]
    async fn test_new_submit_replaces_stale_draft() {
        let creds = credential_harness(Some(&future_token()));
        let (fakes, mut ctl) = controller(
            &creds.manager,
            RecordingProvider::replying("draft"),
            RecordingBlog::accepting(),
        );
        let cancel = CancellationToken::new();

        ctl.submit("First", "one", false, &cancel).await.unwrap();
        ctl.submit("Second", "two", false, &cancel).await.unwrap();
        ctl.confirm_publish(&cancel).await.unwrap();

        let posts = fakes.blog.posts.lock().unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].2.title, "Second");
    }

    #[tokio::test]
    async fn test_invalid_resubmit_drops_stale_draft() {
        let creds = credential_harness(Some(&future_token()));
        let (_fakes, mut ctl) = controller(
            &creds.manager,
            RecordingProvider::replying("draft"),
            RecordingBlog::accepting(),
        );
        let cancel = CancellationToken::new();

        ctl.submit("First", "one", false, &cancel).await.unwrap();
        assert!(ctl.submit("", "two", false, &cancel).await.is_err());

        assert!(ctl.draft().is_none());
        assert!(ctl.confirm_publish(&cancel).await.is_err());
    }

    #[tokio::test]
    async fn test_discard_returns_to_input() {
        let creds = credential_harness(Some(&future_token()));
        let (_fakes, mut ctl) = controller(
            &creds.manager,
            RecordingProvider::replying("draft"),
            RecordingBlog::accepting(),
        );

        ctl.submit("Cats", "purr", false, &CancellationToken::new())
            .await
            .unwrap();
        ctl.discard().unwrap();

        assert_eq!(ctl.state(), &FlowState::AwaitingInput);
        assert!(ctl.discard().is_err());
    }

    #[tokio::test]
    async fn test_publish_failure_goes_to_error() {
        let creds = credential_harness(Some(&future_token()));
        let (_fakes, mut ctl) = controller(
            &creds.manager,
            RecordingProvider::replying("draft"),
            RecordingBlog::rejecting(400, "Invalid content"),
        );
        let cancel = CancellationToken::new();

        ctl.submit("Cats", "purr", false, &cancel).await.unwrap();
        let err = ctl.confirm_publish(&cancel).await.unwrap_err();

        assert!(matches!(err, FlowError::Publish(_)));
        assert!(matches!(ctl.state(), FlowState::Error(msg) if msg.contains("Invalid content")));
    }

    #[tokio::test]
    async fn test_cancelled_generation_returns_to_input() {
        let creds = credential_harness(Some(&future_token()));
        let (_fakes, mut ctl) = controller(
            &creds.manager,
            RecordingProvider::replying("draft"),
            RecordingBlog::accepting(),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = ctl.submit("Cats", "purr", false, &cancel).await.unwrap_err();

        assert!(matches!(err, FlowError::Cancelled("Generation")));
        assert_eq!(ctl.state(), &FlowState::AwaitingInput);
    }

    #[tokio::test]
    async fn test_cancelled_publish_goes_to_error() {
        let creds = credential_harness(Some(&future_token()));
        let (fakes, mut ctl) = controller(
            &creds.manager,
            RecordingProvider::replying("draft"),
            RecordingBlog::accepting(),
        );

        ctl.submit("Cats", "purr", false, &CancellationToken::new())
            .await
            .unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = ctl.confirm_publish(&cancel).await.unwrap_err();

        assert!(matches!(err, FlowError::Cancelled("Publish")));
        assert!(matches!(ctl.state(), FlowState::Error(_)));
        assert!(fakes.blog.posts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_end_to_end_benefits_of_tea() {
        let creds = credential_harness(Some(&future_token()));
        let article = "# Benefits of Tea\n\nGreen tea is rich in antioxidants.";
        let (fakes, mut ctl) = controller(
            &creds.manager,
            RecordingProvider::replying(article),
            RecordingBlog::accepting(),
        );
        let cancel = CancellationToken::new();

        ctl.submit("Benefits of Tea", "health effects of green tea", false, &cancel)
            .await
            .unwrap();
        let shown = ctl.draft().unwrap().content().to_string();
        assert!(!shown.is_empty());

        let published = ctl.confirm_publish(&cancel).await.unwrap();

        assert_eq!(published.id, "post-1");
        let posts = fakes.blog.posts.lock().unwrap();
        assert_eq!(posts[0].2.title, "Benefits of Tea");
        assert_eq!(posts[0].2.content, shown);
        assert_eq!(ctl.state(), &FlowState::Done(published));
    }
}
