//! Gmail API response normalization
//!
//! Converts raw Gmail message payloads into flat fetched-message records
//! the reconciler consumes. Missing headers become empty strings; only a
//! message with no payload at all is treated as malformed.

use anyhow::{Context, Result};
use base64::prelude::*;
use chrono::{DateTime, Utc};

use super::api::{GmailMessage, MessagePart, MessagePayload};

/// A normalized message as fetched from the provider
///
/// The date is kept as the raw header string; the reconciler parses it with
/// [`parse_mail_date`] and falls back to the current time.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedMessage {
    pub gmail_id: String,
    pub thread_id: Option<String>,
    pub subject: String,
    pub sender: String,
    pub recipient: String,
    /// Raw Date header value, if present
    pub date: Option<String>,
    pub snippet: String,
    pub labels: Vec<String>,
    /// Plain-text body, or the HTML body when no plain part exists
    pub body: Option<String>,
}

/// Normalize a Gmail API message into a fetched-message record
pub fn normalize_message(msg: &GmailMessage) -> Result<FetchedMessage> {
    let payload = msg.payload.as_ref().context("Message has no payload")?;

    let subject = extract_header(payload, "Subject").unwrap_or_default();
    let sender = extract_header(payload, "From").unwrap_or_default();
    let recipient = extract_header(payload, "To").unwrap_or_default();
    let date = extract_header(payload, "Date");

    let body = extract_plain_text_body(payload).or_else(|| extract_html_body(payload));

    Ok(FetchedMessage {
        gmail_id: msg.id.clone(),
        thread_id: msg.thread_id.clone(),
        subject,
        sender,
        recipient,
        date,
        snippet: decode_html_entities(&msg.snippet),
        labels: msg.label_ids.clone().unwrap_or_default(),
        body,
    })
}

/// Parse an RFC 2822 Date header into a UTC timestamp
pub fn parse_mail_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Extract a header value by name
fn extract_header(payload: &MessagePayload, name: &str) -> Option<String> {
    payload.headers.as_ref()?.iter().find_map(|h| {
        if h.name.eq_ignore_ascii_case(name) {
            Some(h.value.clone())
        } else {
            None
        }
    })
}

/// Extract plain text body from the message payload
fn extract_plain_text_body(payload: &MessagePayload) -> Option<String> {
    if let Some(body) = &payload.body
        && let Some(data) = &body.data
        && payload
            .mime_type
            .as_ref()
            .is_some_and(|m| m.starts_with("text/plain"))
    {
        return decode_base64_body(data);
    }

    if let Some(parts) = &payload.parts
        && let Some(text) = find_part_body(parts, "text/plain")
    {
        return Some(text);
    }

    None
}

/// Extract HTML body from the message payload
fn extract_html_body(payload: &MessagePayload) -> Option<String> {
    if let Some(body) = &payload.body
        && let Some(data) = &body.data
        && payload
            .mime_type
            .as_ref()
            .is_some_and(|m| m.starts_with("text/html"))
    {
        return decode_base64_body(data);
    }

    if let Some(parts) = &payload.parts
        && let Some(html) = find_part_body(parts, "text/html")
    {
        return Some(html);
    }

    None
}

/// Recursively search message parts for the first body of the given MIME type
fn find_part_body(parts: &[MessagePart], mime_prefix: &str) -> Option<String> {
    for part in parts {
        if part
            .mime_type
            .as_ref()
            .is_some_and(|m| m.starts_with(mime_prefix))
            && let Some(body) = &part.body
            && let Some(data) = &body.data
            && let Some(text) = decode_base64_body(data)
        {
            return Some(text);
        }

        if let Some(nested) = &part.parts
            && let Some(text) = find_part_body(nested, mime_prefix)
        {
            return Some(text);
        }
    }

    None
}

/// Decode base64-encoded body data
///
/// Gmail uses URL-safe base64 but padding can vary, so several decoders are
/// tried in turn.
fn decode_base64_body(data: &str) -> Option<String> {
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE};

    let decoders: &[&base64::engine::GeneralPurpose] =
        &[&BASE64_URL_SAFE_NO_PAD, &URL_SAFE, &STANDARD, &STANDARD_NO_PAD];

    for decoder in decoders {
        if let Ok(decoded) = decoder.decode(data)
            && let Ok(s) = String::from_utf8(decoded)
        {
            return Some(s);
        }
    }

    None
}

/// Decode HTML entities in snippet text
fn decode_html_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}
