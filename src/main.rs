//! Blog Poster
//!
//! Writes a blog post draft with an OpenAI model, shows it for review, and
//! publishes it to Blogger once confirmed.

mod config;
mod controller;
mod credentials;
mod error;
mod generator;
mod posts;
mod publisher;
mod ui;

#[cfg(test)]
mod test_support;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use config::Settings;
use controller::Controller;
use credentials::{CredentialManager, GoogleOAuth, TokenStore};
use generator::{DraftGenerator, OpenAiClient};
use publisher::{BloggerClient, Publisher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use ui::{Interrupts, Terminal};

#[derive(Parser)]
#[command(name = "blog-poster")]
#[command(about = "Blog Poster - Generate a blog post with AI and publish it to Blogger")]
#[command(version)]
struct Cli {
    /// Path to config.yaml (overrides ./config.yaml and the config directory)
    #[arg(long, global = true, env = "BLOG_POSTER_CONFIG")]
    config: Option<PathBuf>,

    /// Log more detail to stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write, review and publish posts interactively (default)
    Write,

    /// Authorize Blogger access (opens browser)
    Auth {
        /// Refresh the stored token instead of running the browser flow
        #[arg(long)]
        refresh: bool,
    },

    /// Initialize configuration files
    Init,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,blog_poster={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn build_credentials(settings: &Settings) -> Result<CredentialManager> {
    let oauth = Arc::new(GoogleOAuth::new(
        settings.client_secrets_path()?,
        Duration::from_secs(settings.consent_timeout_secs),
    ));
    let store = TokenStore::new(settings.token_path()?);
    tracing::debug!(path = %store.path().display(), "token store");
    Ok(CredentialManager::new(store, oauth.clone(), oauth))
}

async fn write(settings: &Settings) -> Result<()> {
    let api_key = config::load_openai_key()?;
    let credentials = build_credentials(settings)?;

    let generator = DraftGenerator::new(
        Box::new(OpenAiClient::new(api_key, &settings.openai_base_url)),
        settings.model.clone(),
    );
    let publisher = Publisher::new(
        &credentials,
        Box::new(BloggerClient::new(&settings.blogger_api_base)),
        settings.blog_id.clone(),
    );
    tracing::info!(blog_id = %publisher.blog_id(), model = %settings.model, "session starting");
    let mut controller = Controller::new(generator, publisher);

    let interrupts = Interrupts::default();
    let watcher = interrupts.watch_ctrl_c();

    let mut terminal = Terminal::new(std::io::stdin().lock(), std::io::stdout());
    let result = ui::run_session(&mut controller, &mut terminal, &interrupts).await;

    watcher.abort();
    result
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    config::load_dotenv();

    match cli.command.unwrap_or(Commands::Write) {
        Commands::Init => {
            config::init_config()?;
        }

        Commands::Auth { refresh } => {
            let settings = config::load_settings(cli.config.as_deref())?;
            let credentials = build_credentials(&settings)?;
            if refresh {
                let token = credentials.refresh_stored().await?;
                match token.expiry {
                    Some(expiry) => {
                        println!("Token refreshed, valid until {}", expiry.to_rfc3339());
                    }
                    None => println!("Token refreshed (no expiry reported)"),
                }
            } else {
                credentials.authorize().await?;
                println!("\nAuthentication complete! You can now publish to Blogger.");
            }
        }

        Commands::Write => {
            let settings = config::load_settings(cli.config.as_deref())?;
            write(&settings).await?;
        }
    }

    Ok(())
}
