//! Classification model backend
//!
//! The [`CompletionBackend`] trait returns the model's raw JSON payload;
//! validation happens in the caller so a misbehaving model can never inject
//! unchecked values into the store. The OpenAI-compatible implementation
//! forces JSON output at the API level.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;

use crate::config::LlmCredentials;

/// The email fields handed to the model
#[derive(Debug, Clone)]
pub struct ClassifyRequest<'a> {
    pub subject: &'a str,
    pub sender: &'a str,
    pub snippet: &'a str,
}

/// A model that classifies one email and returns a raw JSON object string
pub trait CompletionBackend: Send + Sync {
    fn classify(&self, request: &ClassifyRequest) -> Result<String>;
}

/// OpenAI-compatible chat-completions backend
pub struct OpenAiBackend {
    credentials: LlmCredentials,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl OpenAiBackend {
    const API_URL: &'static str = "https://api.openai.com/v1/chat/completions";

    const SYSTEM_PROMPT: &'static str = "You classify emails. Respond with a JSON object: \
        {\"category\": one of \"work\", \"personal\", \"promotional\", \"spam\", \
        \"newsletter\", \"social\"; \"confidence\": number 0-1; \"is_spam\": boolean}.";

    pub fn new(credentials: LlmCredentials) -> Self {
        Self { credentials }
    }
}

impl CompletionBackend for OpenAiBackend {
    fn classify(&self, request: &ClassifyRequest) -> Result<String> {
        let body = json!({
            "model": self.credentials.model,
            "messages": [
                {"role": "system", "content": Self::SYSTEM_PROMPT},
                {"role": "user", "content": format!(
                    "Subject: {}\nFrom: {}\nContent: {}",
                    request.subject, request.sender, request.snippet
                )},
            ],
            "temperature": 0.1,
            "max_tokens": 50,
            "response_format": {"type": "json_object"},
        });

        let mut response = ureq::post(Self::API_URL)
            .header(
                "Authorization",
                &format!("Bearer {}", self.credentials.api_key),
            )
            .send_json(&body)
            .context("Classification request failed")?;

        let chat: ChatResponse = response
            .body_mut()
            .read_json()
            .context("Failed to parse completion response")?;

        let choice = chat
            .choices
            .into_iter()
            .next()
            .context("Completion response had no choices")?;

        Ok(choice.message.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_response_parse() {
        let json = r#"{
            "choices": [
                {"message": {"role": "assistant", "content": "{\"category\": \"work\"}"}}
            ]
        }"#;
        let parsed: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(
            parsed.choices[0].message.content,
            "{\"category\": \"work\"}"
        );
    }
}
