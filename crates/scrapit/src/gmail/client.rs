//! Gmail API HTTP client
//!
//! Provides list, fetch, and batch mutation operations against the Gmail
//! API. Uses synchronous HTTP (ureq); rate-limited and 5xx responses are
//! retried with a fixed backoff, an expired access token is refreshed once
//! and the request replayed.

use std::time::Duration;

use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde_json::json;

use super::api::{GmailMessage, ListLabelsResponse, ListMessagesResponse, ProfileResponse};
use super::{ApiError, GmailAuth, MailApi, UserTokens};
use crate::models::GmailId;

/// Gmail API client for one user's mailbox
pub struct GmailClient {
    auth: GmailAuth,
}

/// Build the message-listing URL for a page request
fn list_url(base: &str, query: Option<&str>, max_results: usize, page_token: Option<&str>) -> String {
    let mut url = format!(
        "{}/users/me/messages?maxResults={}",
        base,
        max_results.clamp(1, GmailClient::MAX_PAGE_SIZE)
    );
    if let Some(q) = query {
        url.push_str(&format!("&q={}", urlencoding::encode(q)));
    }
    if let Some(token) = page_token {
        url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
    }
    url
}

/// Map a ureq error onto the provider error taxonomy
fn map_http_error(err: ureq::Error) -> ApiError {
    match err {
        ureq::Error::StatusCode(401) => ApiError::Unauthorized,
        ureq::Error::StatusCode(429) => ApiError::RateLimited,
        ureq::Error::StatusCode(code) => ApiError::Status(code),
        other => ApiError::Transport(other.to_string()),
    }
}

impl GmailClient {
    /// Gmail API base URL
    const BASE_URL: &'static str = "https://gmail.googleapis.com/gmail/v1";

    /// Gmail caps message listing at 500 IDs per page
    pub const MAX_PAGE_SIZE: usize = 500;

    /// Gmail caps batch mutation endpoints at 1000 IDs per call
    const MUTATION_CHUNK: usize = 1000;

    /// Transient failures are retried this many times in total
    const RETRY_ATTEMPTS: u32 = 3;

    /// Fixed wait between retry attempts
    const RETRY_DELAY: Duration = Duration::from_millis(500);

    /// Create a new Gmail client
    pub fn new(auth: GmailAuth) -> Self {
        Self { auth }
    }

    /// Current token pair, for persisting a refreshed token back to storage
    pub fn tokens(&self) -> UserTokens {
        self.auth.current_tokens()
    }

    fn get_json_once<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let mut response = ureq::get(url)
            .header(
                "Authorization",
                &format!("Bearer {}", self.auth.access_token()),
            )
            .call()
            .map_err(map_http_error)?;

        response
            .body_mut()
            .read_json()
            .map_err(|e| ApiError::Malformed(e.to_string()))
    }

    fn post_json_once<T: DeserializeOwned>(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<T, ApiError> {
        let mut response = ureq::post(url)
            .header(
                "Authorization",
                &format!("Bearer {}", self.auth.access_token()),
            )
            .send_json(body)
            .map_err(map_http_error)?;

        response
            .body_mut()
            .read_json()
            .map_err(|e| ApiError::Malformed(e.to_string()))
    }

    fn post_json_no_body(&self, url: &str, body: &serde_json::Value) -> Result<(), ApiError> {
        ureq::post(url)
            .header(
                "Authorization",
                &format!("Bearer {}", self.auth.access_token()),
            )
            .send_json(body)
            .map_err(map_http_error)?;
        Ok(())
    }

    /// Run a request, refreshing the access token once on a 401
    fn with_token_refresh<T>(
        &self,
        op: impl Fn() -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        match op() {
            Err(ApiError::Unauthorized) => {
                debug!("Access token rejected, attempting refresh");
                self.auth.refresh()?;
                op()
            }
            other => other,
        }
    }

    /// Run a request, retrying transient failures with a fixed backoff
    fn with_retry<T>(&self, what: &str, op: impl Fn() -> Result<T, ApiError>) -> Result<T, ApiError> {
        let mut attempt = 1;
        loop {
            match self.with_token_refresh(&op) {
                Err(e) if e.is_transient() && attempt < Self::RETRY_ATTEMPTS => {
                    warn!(
                        "{} failed with transient error ({}), retry {}/{}",
                        what,
                        e,
                        attempt,
                        Self::RETRY_ATTEMPTS - 1
                    );
                    std::thread::sleep(Self::RETRY_DELAY);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

impl MailApi for GmailClient {
    fn authenticate(&self) -> bool {
        let url = format!("{}/users/me/profile", Self::BASE_URL);
        match self.with_token_refresh(|| self.get_json_once::<ProfileResponse>(&url)) {
            Ok(profile) => {
                info!("Authenticated Gmail for {}", profile.email_address);
                true
            }
            Err(e) => {
                warn!("Gmail authentication failed: {}", e);
                false
            }
        }
    }

    fn list_messages(
        &self,
        query: Option<&str>,
        max_results: usize,
        page_token: Option<&str>,
    ) -> Result<ListMessagesResponse, ApiError> {
        let url = list_url(Self::BASE_URL, query, max_results, page_token);
        self.with_retry("list messages", || self.get_json_once(&url))
    }

    fn get_message(&self, id: &str) -> Result<GmailMessage, ApiError> {
        let url = format!("{}/users/me/messages/{}?format=full", Self::BASE_URL, id);
        self.with_retry("get message", || self.get_json_once(&url))
    }

    fn batch_modify(
        &self,
        ids: &[GmailId],
        add_labels: &[&str],
        remove_labels: &[&str],
    ) -> Result<(), ApiError> {
        if ids.is_empty() {
            return Ok(());
        }

        let url = format!("{}/users/me/messages/batchModify", Self::BASE_URL);
        for chunk in ids.chunks(Self::MUTATION_CHUNK) {
            let body = json!({
                "ids": chunk.iter().map(|id| id.as_str()).collect::<Vec<_>>(),
                "addLabelIds": add_labels,
                "removeLabelIds": remove_labels,
            });
            self.with_retry("batch modify", || self.post_json_no_body(&url, &body))?;
        }

        debug!(
            "Modified labels on {} messages (+{:?} -{:?})",
            ids.len(),
            add_labels,
            remove_labels
        );
        Ok(())
    }

    fn batch_delete(&self, ids: &[GmailId]) -> Result<(), ApiError> {
        if ids.is_empty() {
            return Ok(());
        }

        let url = format!("{}/users/me/messages/batchDelete", Self::BASE_URL);
        for chunk in ids.chunks(Self::MUTATION_CHUNK) {
            let body = json!({
                "ids": chunk.iter().map(|id| id.as_str()).collect::<Vec<_>>(),
            });
            self.with_retry("batch delete", || self.post_json_no_body(&url, &body))?;
        }

        info!("Permanently deleted {} messages", ids.len());
        Ok(())
    }

    fn ensure_label(&self, name: &str) -> Result<String, ApiError> {
        let list_url = format!("{}/users/me/labels", Self::BASE_URL);
        let labels: ListLabelsResponse =
            self.with_retry("list labels", || self.get_json_once(&list_url))?;

        if let Some(labels) = labels.labels
            && let Some(existing) = labels.iter().find(|l| l.name.eq_ignore_ascii_case(name))
        {
            return Ok(existing.id.clone());
        }

        let body = json!({ "name": name });
        let created: super::api::Label =
            self.with_retry("create label", || self.post_json_once(&list_url, &body))?;
        info!("Created Gmail label '{}' ({})", name, created.id);
        Ok(created.id)
    }
}
