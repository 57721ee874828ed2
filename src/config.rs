//! Configuration management for blog-poster
//!
//! Settings come from `config.yaml`, the OpenAI key from the environment
//! (optionally via `.env`), and the Google OAuth client from the
//! `credentials.json` downloaded from the Cloud console.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const APP_DIR: &str = "blog-poster";
pub const DEFAULT_BLOG_ID: &str = "5995621997920515361";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_BLOGGER_API_BASE: &str = "https://www.googleapis.com/blogger/v3";
pub const DEFAULT_CONSENT_TIMEOUT_SECS: u64 = 300;
pub const OPENAI_KEY_VAR: &str = "OPENAI_API_KEY";

const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Contents of `config.yaml`; every key is optional
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub blog_id: String,
    pub model: String,
    pub openai_base_url: String,
    pub blogger_api_base: String,
    pub token_path: Option<PathBuf>,
    pub client_secrets_path: Option<PathBuf>,
    pub consent_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            blog_id: DEFAULT_BLOG_ID.to_string(),
            model: DEFAULT_MODEL.to_string(),
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            blogger_api_base: DEFAULT_BLOGGER_API_BASE.to_string(),
            token_path: None,
            client_secrets_path: None,
            consent_timeout_secs: DEFAULT_CONSENT_TIMEOUT_SECS,
        }
    }
}

impl Settings {
    /// Token file location, defaulting into the config directory
    ///
    /// # Errors
    /// Returns error if config directory cannot be determined
    pub fn token_path(&self) -> Result<PathBuf> {
        match &self.token_path {
            Some(path) => Ok(path.clone()),
            None => Ok(config_dir()?.join("token.json")),
        }
    }

    /// OAuth client file location, defaulting into the config directory
    ///
    /// # Errors
    /// Returns error if config directory cannot be determined
    pub fn client_secrets_path(&self) -> Result<PathBuf> {
        match &self.client_secrets_path {
            Some(path) => Ok(path.clone()),
            None => Ok(config_dir()?.join("credentials.json")),
        }
    }
}

/// Google OAuth client registration (installed or web app)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OAuthClient {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<OAuthClient>,
    web: Option<OAuthClient>,
}

/// Extract the OAuth client from a Google client secrets document
///
/// # Errors
/// Returns error if the JSON is malformed or has neither `installed` nor `web`
pub fn parse_client_secrets(content: &str) -> Result<OAuthClient> {
    let file: ClientSecretsFile =
        serde_json::from_str(content).context("Invalid client secrets JSON")?;

    file.installed
        .or(file.web)
        .context("Missing 'installed' or 'web' section in client secrets")
}

/// Load the OAuth client from a specific path
///
/// # Errors
/// Returns error if the file is missing or malformed
pub fn load_client_secrets(path: &Path) -> Result<OAuthClient> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_client_secrets(&content)
}

/// Get the config directory path
///
/// # Errors
/// Returns error if config directory cannot be determined or created
pub fn config_dir() -> Result<PathBuf> {
    let dir = dirs::config_dir()
        .context("Could not determine config directory")?
        .join(APP_DIR);

    if !dir.exists() {
        fs::create_dir_all(&dir)?;
    }

    Ok(dir)
}

/// Get the settings file path
///
/// Priority: custom_path > cwd > config dir
///
/// # Errors
/// Returns error if config directory cannot be determined
pub fn settings_path(custom_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = custom_path {
        return Ok(path.to_path_buf());
    }

    let local = PathBuf::from("config.yaml");
    if local.exists() {
        return Ok(local);
    }

    Ok(config_dir()?.join("config.yaml"))
}

/// Parse settings YAML; an empty document yields defaults
///
/// # Errors
/// Returns error if the YAML is malformed
pub fn parse_settings(content: &str) -> Result<Settings> {
    if content.trim().is_empty() {
        return Ok(Settings::default());
    }
    serde_yaml::from_str(content).context("Failed to parse config.yaml")
}

/// Load settings, falling back to defaults when no file exists
///
/// # Errors
/// Returns error if an explicitly given file is missing, or any file is malformed
pub fn load_settings(custom_path: Option<&Path>) -> Result<Settings> {
    let path = settings_path(custom_path)?;

    if !path.exists() {
        if custom_path.is_some() {
            anyhow::bail!("Config file not found at {}", path.display());
        }
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(Settings::default());
    }

    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let settings = parse_settings(&content)?;
    tracing::debug!(path = %path.display(), blog_id = %settings.blog_id, "loaded config");
    Ok(settings)
}

/// Load `.env` files so `OPENAI_API_KEY` can live outside the shell profile
///
/// Tries the working directory, then the config directory, then home.
pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Some(dir) = dirs::config_dir() {
        let path = dir.join(APP_DIR).join(".env");
        if path.exists() && dotenvy::from_path(&path).is_ok() {
            return;
        }
    }

    if let Some(home) = dirs::home_dir() {
        let path = home.join(".env");
        if path.exists() {
            let _ = dotenvy::from_path(&path);
        }
    }
}

/// Validate a raw API key value
///
/// # Errors
/// Returns error if the key is absent or blank
pub fn extract_api_key(value: Option<String>) -> Result<String> {
    let key = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .with_context(|| {
            format!(
                "{OPENAI_KEY_VAR} not found.\n\n\
                Set it in the environment or in ~/.config/{APP_DIR}/.env:\n  \
                {OPENAI_KEY_VAR}=your_key_here"
            )
        })?;
    Ok(key)
}

/// Read the OpenAI API key from the environment
///
/// # Errors
/// Returns error if the key is not set
pub fn load_openai_key() -> Result<String> {
    extract_api_key(std::env::var(OPENAI_KEY_VAR).ok())
}

/// Initialize the settings file
///
/// # Errors
/// Returns error if config directory or settings file cannot be created
pub fn init_config() -> Result<()> {
    let dir = config_dir()?;
    let settings_path = dir.join("config.yaml");

    if settings_path.exists() {
        println!("Config file already exists: {}", settings_path.display());
    } else {
        let example = include_str!("../config.example.yaml");
        fs::write(&settings_path, example)?;
        println!("Created config file: {}", settings_path.display());
    }

    println!("\nNext steps:");
    println!("1. Put {OPENAI_KEY_VAR}=... in {}", dir.join(".env").display());
    println!(
        "2. Save your Google OAuth client as {}",
        dir.join("credentials.json").display()
    );
    println!("3. Set blog_id in config.yaml");
    println!("4. Run 'blog-poster auth' to authorize Blogger access");
    println!("5. Run 'blog-poster' to write a post");

    Ok(())
}
