//! Credential loading for external services
//!
//! Supports loading Google OAuth client credentials and LLM API credentials
//! from (in order of priority):
//! 1. JSON files in the ScrapIt config directory
//! 2. Environment variables

use anyhow::{Context, Result};
use serde::Deserialize;

/// Credentials filename in the ScrapIt config directory
const GOOGLE_CREDENTIALS_FILE: &str = "google-credentials.json";

/// LLM credentials filename in the ScrapIt config directory
const LLM_CREDENTIALS_FILE: &str = "llm-credentials.json";

/// Default model used for classification when none is configured
const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

/// OAuth client credentials for token refresh against Google
#[derive(Debug, Clone)]
pub struct GoogleCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Google Cloud Console credential file format
#[derive(Deserialize)]
struct GoogleCredentialFile {
    installed: Option<ClientEntry>,
    web: Option<ClientEntry>,
}

#[derive(Deserialize)]
struct ClientEntry {
    client_id: String,
    client_secret: String,
}

impl GoogleCredentials {
    /// Load credentials from the config file, falling back to environment
    /// variables (`GOOGLE_CLIENT_ID` / `GOOGLE_CLIENT_SECRET`).
    pub fn load() -> Result<Self> {
        if config::config_exists(GOOGLE_CREDENTIALS_FILE) {
            let creds: GoogleCredentialFile = config::load_json(GOOGLE_CREDENTIALS_FILE)?;
            return Self::from_credential_file(creds);
        }
        Self::from_env()
    }

    /// Parse credentials from JSON in the Google Cloud Console format
    pub fn from_json(json: &str) -> Result<Self> {
        let creds: GoogleCredentialFile =
            serde_json::from_str(json).context("Failed to parse credentials JSON")?;
        Self::from_credential_file(creds)
    }

    fn from_credential_file(creds: GoogleCredentialFile) -> Result<Self> {
        // Support both "web" (server) and "installed" (desktop) client types
        let entry = creds
            .web
            .or(creds.installed)
            .context("Credentials file missing 'web' or 'installed' section")?;

        Ok(Self {
            client_id: entry.client_id,
            client_secret: entry.client_secret,
        })
    }

    /// Load credentials from environment variables
    pub fn from_env() -> Result<Self> {
        let client_id = std::env::var("GOOGLE_CLIENT_ID")
            .context("GOOGLE_CLIENT_ID environment variable not set")?;
        let client_secret = std::env::var("GOOGLE_CLIENT_SECRET")
            .context("GOOGLE_CLIENT_SECRET environment variable not set")?;

        Ok(Self {
            client_id,
            client_secret,
        })
    }
}

/// Credentials for the classification model API
#[derive(Debug, Clone, Deserialize)]
pub struct LlmCredentials {
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_model() -> String {
    DEFAULT_LLM_MODEL.to_string()
}

impl LlmCredentials {
    /// Load credentials from the config file, falling back to environment
    /// variables (`OPENAI_API_KEY` / `OPENAI_MODEL`).
    pub fn load() -> Result<Self> {
        if config::config_exists(LLM_CREDENTIALS_FILE) {
            return config::load_json(LLM_CREDENTIALS_FILE);
        }

        let api_key = std::env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY environment variable not set")?;
        let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| default_model());

        Ok(Self { api_key, model })
    }
}
