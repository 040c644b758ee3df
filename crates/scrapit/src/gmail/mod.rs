//! Gmail API integration
//!
//! This module provides:
//! - Per-user OAuth token handling with refresh
//! - A synchronous Gmail API client (list, fetch, batch mutations)
//! - Response normalization into fetched-message records
//!
//! Sync, actions, and tasks consume the provider through the [`MailApi`]
//! trait so tests can substitute a scripted implementation.

mod auth;
mod client;
mod normalize;

pub use auth::{GmailAuth, UserTokens};
pub use client::GmailClient;
pub use normalize::{FetchedMessage, normalize_message, parse_mail_date};

use crate::models::GmailId;

/// Errors from the mail provider boundary
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Credentials rejected and refresh did not help
    #[error("provider rejected credentials")]
    Unauthorized,
    /// HTTP 429 from the provider
    #[error("rate limited by provider")]
    RateLimited,
    /// Any other non-success HTTP status
    #[error("provider returned HTTP {0}")]
    Status(u16),
    /// Connection-level failure
    #[error("transport failure: {0}")]
    Transport(String),
    /// Response body did not parse
    #[error("malformed provider response: {0}")]
    Malformed(String),
}

impl ApiError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::RateLimited => true,
            ApiError::Status(code) => *code >= 500,
            _ => false,
        }
    }
}

/// Operations the sync engine and action executor need from the provider.
///
/// [`GmailClient`] is the production implementation; tests script a fake.
pub trait MailApi: Send + Sync {
    /// Verify credentials against the provider. Must be called before a sync
    /// run; returns false when the token is invalid beyond refresh.
    fn authenticate(&self) -> bool;

    /// List message IDs matching a search query, one page at a time
    fn list_messages(
        &self,
        query: Option<&str>,
        max_results: usize,
        page_token: Option<&str>,
    ) -> Result<api::ListMessagesResponse, ApiError>;

    /// Fetch one full message by ID
    fn get_message(&self, id: &str) -> Result<api::GmailMessage, ApiError>;

    /// Add and remove labels on a set of messages
    fn batch_modify(
        &self,
        ids: &[GmailId],
        add_labels: &[&str],
        remove_labels: &[&str],
    ) -> Result<(), ApiError>;

    /// Permanently delete a set of messages
    fn batch_delete(&self, ids: &[GmailId]) -> Result<(), ApiError>;

    /// Resolve a label name to its ID, creating the label if needed
    fn ensure_label(&self, name: &str) -> Result<String, ApiError>;
}

/// Gmail API response types
pub mod api {
    use serde::{Deserialize, Serialize};

    /// Response from listing messages
    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ListMessagesResponse {
        pub messages: Option<Vec<MessageRef>>,
        pub next_page_token: Option<String>,
        pub result_size_estimate: Option<u32>,
    }

    /// Reference to a message (just ID and thread ID)
    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessageRef {
        pub id: String,
        pub thread_id: String,
    }

    /// Full message from the Gmail API
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct GmailMessage {
        pub id: String,
        pub thread_id: Option<String>,
        pub label_ids: Option<Vec<String>>,
        #[serde(default)]
        pub snippet: String,
        pub payload: Option<MessagePayload>,
    }

    /// Message payload containing headers and body
    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessagePayload {
        pub headers: Option<Vec<Header>>,
        pub body: Option<MessageBody>,
        pub parts: Option<Vec<MessagePart>>,
        pub mime_type: Option<String>,
    }

    /// Email header (name-value pair)
    #[derive(Debug, Deserialize, Serialize)]
    pub struct Header {
        pub name: String,
        pub value: String,
    }

    /// Message body (may be base64 encoded)
    #[derive(Debug, Default, Deserialize)]
    pub struct MessageBody {
        pub size: Option<u32>,
        pub data: Option<String>,
    }

    /// Message part (for multipart messages)
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessagePart {
        pub mime_type: Option<String>,
        pub body: Option<MessageBody>,
        pub parts: Option<Vec<MessagePart>>,
    }

    /// Response from the profile endpoint, used as the auth probe
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ProfileResponse {
        pub email_address: String,
        pub messages_total: Option<u64>,
    }

    /// Response from listing labels
    #[derive(Debug, Deserialize)]
    pub struct ListLabelsResponse {
        pub labels: Option<Vec<Label>>,
    }

    /// A Gmail label
    #[derive(Debug, Clone, Deserialize)]
    pub struct Label {
        pub id: String,
        pub name: String,
    }
}
