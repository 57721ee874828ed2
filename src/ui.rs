//! Terminal form for the write-review-publish loop

use crate::controller::Controller;
use crate::posts::{Draft, PublishedPost};
use anyhow::Result;
use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Raw operator input, validated later by the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormInput {
    pub title: String,
    pub topic: String,
    pub include_images: bool,
}

/// Line-oriented rendition of the form over any reader/writer pair
pub struct Terminal<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Terminal<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// `None` at end of input
    fn prompt_line(&mut self, label: &str) -> Result<Option<String>> {
        write!(self.output, "{label}")?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    /// Reads until an empty line; `None` only if input ended before any text
    fn prompt_multiline(&mut self, label: &str) -> Result<Option<String>> {
        writeln!(self.output, "{label}")?;
        self.output.flush()?;

        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                if lines.is_empty() {
                    return Ok(None);
                }
                break;
            }
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                break;
            }
            lines.push(line.to_string());
        }
        Ok(Some(lines.join("\n")))
    }

    fn prompt_yes_no(&mut self, label: &str) -> Result<Option<bool>> {
        Ok(self.prompt_line(label)?.map(|answer| {
            matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
        }))
    }

    /// Collect title, topic and the image toggle; `None` when the operator quits
    ///
    /// # Errors
    /// Returns error if the terminal cannot be read or written
    pub fn read_form(&mut self) -> Result<Option<FormInput>> {
        writeln!(self.output)?;
        let Some(title) = self.prompt_line("Enter the blog post title: ")? else {
            return Ok(None);
        };
        let Some(topic) =
            self.prompt_multiline("Enter what the content should be about (blank line to finish):")?
        else {
            return Ok(None);
        };
        let Some(include_images) = self.prompt_yes_no("Include image suggestions? [y/N]: ")? else {
            return Ok(None);
        };

        Ok(Some(FormInput {
            title,
            topic,
            include_images,
        }))
    }

    /// `None` at end of input
    ///
    /// # Errors
    /// Returns error if the terminal cannot be read or written
    pub fn confirm_upload(&mut self) -> Result<Option<bool>> {
        self.prompt_yes_no("Upload to Blog? [y/N]: ")
    }

    /// # Errors
    /// Returns error if the terminal cannot be written
    pub fn show_draft(&mut self, draft: &Draft) -> Result<()> {
        writeln!(self.output, "\nGenerated Article:")?;
        writeln!(self.output, "{}", "-".repeat(50))?;
        writeln!(self.output, "{}", draft.title())?;
        writeln!(self.output)?;
        writeln!(self.output, "{}", draft.content())?;
        writeln!(self.output, "{}", "-".repeat(50))?;
        writeln!(self.output, "Character count: {}", draft.content().len())?;
        if draft.request().include_images() {
            writeln!(self.output, "(Image suggestions are text only; no images are uploaded.)")?;
        }
        Ok(())
    }

    /// # Errors
    /// Returns error if the terminal cannot be written
    pub fn busy(&mut self, message: &str) -> Result<()> {
        writeln!(self.output, "{message} (Ctrl-C to cancel)")?;
        self.output.flush()?;
        Ok(())
    }

    /// # Errors
    /// Returns error if the terminal cannot be written
    pub fn notice(&mut self, message: &str) -> Result<()> {
        writeln!(self.output, "{message}")?;
        Ok(())
    }

    /// # Errors
    /// Returns error if the terminal cannot be written
    pub fn warn(&mut self, message: &str) -> Result<()> {
        writeln!(self.output, "Warning: {message}")?;
        Ok(())
    }

    /// # Errors
    /// Returns error if the terminal cannot be written
    pub fn error(&mut self, message: &str) -> Result<()> {
        writeln!(self.output, "Error: {message}")?;
        writeln!(self.output, "You can try again.")?;
        Ok(())
    }

    /// # Errors
    /// Returns error if the terminal cannot be written
    pub fn success(&mut self, post: &PublishedPost) -> Result<()> {
        writeln!(self.output, "Blog post created successfully!")?;
        match &post.url {
            Some(url) => writeln!(self.output, "{url}")?,
            None => writeln!(self.output, "Post ID: {}", post.id)?,
        }
        Ok(())
    }
}

/// Routes Ctrl-C to whichever network step is in flight
#[derive(Clone, Default)]
pub struct Interrupts {
    in_flight: Arc<Mutex<Option<CancellationToken>>>,
}

impl Interrupts {
    /// Token for the step about to start
    #[must_use]
    pub fn begin(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.slot() = Some(token.clone());
        token
    }

    pub fn end(&self) {
        self.slot().take();
    }

    /// Cancel the step in flight; false when nothing was running
    pub fn interrupt(&self) -> bool {
        match self.slot().take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Ctrl-C cancels the current step, or exits when idle at a prompt
    #[must_use]
    pub fn watch_ctrl_c(&self) -> JoinHandle<()> {
        let interrupts = self.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if interrupts.interrupt() {
                    eprintln!("\nCancelling...");
                } else {
                    eprintln!();
                    std::process::exit(130);
                }
            }
        })
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Run the form until the operator quits (end of input)
///
/// Every flow error is shown and the loop continues.
///
/// # Errors
/// Returns error only if the terminal itself fails
pub async fn run_session<R: BufRead, W: Write>(
    controller: &mut Controller<'_>,
    terminal: &mut Terminal<R, W>,
    interrupts: &Interrupts,
) -> Result<()> {
    terminal.notice("Blog Post Generator and Uploader (Ctrl-D to quit)")?;

    while let Some(form) = terminal.read_form()? {
        terminal.busy("Generating article...")?;
        let cancel = interrupts.begin();
        let generated = controller
            .submit(&form.title, &form.topic, form.include_images, &cancel)
            .await;
        interrupts.end();
        tracing::debug!(state = controller.state().name(), "generation step finished");

        match generated {
            Ok(()) => {}
            Err(e) if e.is_warning() => {
                terminal.warn(&e.to_string())?;
                continue;
            }
            Err(e) => {
                terminal.error(&e.to_string())?;
                continue;
            }
        }

        if let Some(draft) = controller.draft() {
            terminal.show_draft(draft)?;
        }

        match terminal.confirm_upload()? {
            Some(true) => {}
            Some(false) => {
                controller.discard()?;
                terminal.notice("Draft discarded.")?;
                continue;
            }
            None => break,
        }

        terminal.busy("Uploading to Blogger...")?;
        let cancel = interrupts.begin();
        let published = controller.confirm_publish(&cancel).await;
        interrupts.end();
        tracing::debug!(state = controller.state().name(), "publish step finished");

        match published {
            Ok(post) => terminal.success(&post)?,
            Err(e) => terminal.error(&e.to_string())?,
        }
    }

    tracing::debug!("input closed, leaving session");
    Ok(())
}
