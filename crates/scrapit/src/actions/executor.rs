//! Action executor for bulk email operations
//!
//! Every action runs in two steps:
//! 1. Call the Gmail API to update server state
//! 2. Mirror the change into local storage
//!
//! The server stays the source of truth for labels; local rows are kept in
//! step so queries don't need a re-sync after every mutation.

use anyhow::Result;
use log::info;
use serde::Serialize;
use std::sync::Arc;

use crate::gmail::MailApi;
use crate::models::{EmailAction, GmailId};
use crate::storage::EmailStore;

/// Label IDs Gmail uses for common states
pub mod labels {
    pub const INBOX: &str = "INBOX";
    pub const UNREAD: &str = "UNREAD";
    pub const STARRED: &str = "STARRED";
    pub const TRASH: &str = "TRASH";
}

/// Result of one executed action
#[derive(Debug, Clone, Default, Serialize)]
pub struct ActionOutcome {
    /// How many messages the action touched (or found, for search)
    pub count: usize,
    /// Label name involved, for label actions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Matching IDs, for search actions
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub message_ids: Vec<GmailId>,
}

impl ActionOutcome {
    fn touched(count: usize) -> Self {
        Self {
            count,
            ..Default::default()
        }
    }
}

/// Executes email actions for one user
pub struct ActionExecutor {
    api: Arc<dyn MailApi>,
    store: Arc<dyn EmailStore>,
    user_id: i64,
}

impl ActionExecutor {
    pub fn new(api: Arc<dyn MailApi>, store: Arc<dyn EmailStore>, user_id: i64) -> Self {
        Self {
            api,
            store,
            user_id,
        }
    }

    /// Execute one action against the provider and the local store.
    ///
    /// The match is exhaustive over the action set; there is no fallthrough
    /// for an unknown action.
    pub fn execute(&self, action: &EmailAction) -> Result<ActionOutcome> {
        match action {
            EmailAction::Delete {
                message_ids,
                permanent,
            } => self.delete(message_ids, *permanent),
            EmailAction::Archive { message_ids } => self.archive(message_ids),
            EmailAction::Label {
                message_ids,
                label_name,
                remove,
            } => self.label(message_ids, label_name, *remove),
            EmailAction::MarkRead { message_ids } => {
                self.modify(message_ids, &[], &[labels::UNREAD])?;
                Ok(ActionOutcome::touched(message_ids.len()))
            }
            EmailAction::MarkUnread { message_ids } => {
                self.modify(message_ids, &[labels::UNREAD], &[])?;
                Ok(ActionOutcome::touched(message_ids.len()))
            }
            EmailAction::Star { message_ids } => {
                self.modify(message_ids, &[labels::STARRED], &[])?;
                Ok(ActionOutcome::touched(message_ids.len()))
            }
            EmailAction::Unstar { message_ids } => {
                self.modify(message_ids, &[], &[labels::STARRED])?;
                Ok(ActionOutcome::touched(message_ids.len()))
            }
            EmailAction::Search {
                query,
                max_results,
            } => self.search(query, *max_results),
        }
    }

    /// Move messages to trash, or delete them permanently
    fn delete(&self, ids: &[GmailId], permanent: bool) -> Result<ActionOutcome> {
        if ids.is_empty() {
            return Ok(ActionOutcome::default());
        }

        if permanent {
            info!("Permanently deleting {} messages", ids.len());
            self.api.batch_delete(ids)?;
            for id in ids {
                self.store.remove_email(self.user_id, id)?;
            }
        } else {
            info!("Trashing {} messages", ids.len());
            self.modify(ids, &[labels::TRASH], &[labels::INBOX])?;
            for id in ids {
                self.store.mark_deleted(self.user_id, id)?;
            }
        }

        Ok(ActionOutcome::touched(ids.len()))
    }

    /// Remove messages from the inbox
    fn archive(&self, ids: &[GmailId]) -> Result<ActionOutcome> {
        if ids.is_empty() {
            return Ok(ActionOutcome::default());
        }

        info!("Archiving {} messages", ids.len());
        self.modify(ids, &[], &[labels::INBOX])?;
        for id in ids {
            self.store.mark_archived(self.user_id, id)?;
        }

        Ok(ActionOutcome::touched(ids.len()))
    }

    /// Apply or remove a named label
    fn label(&self, ids: &[GmailId], label_name: &str, remove: bool) -> Result<ActionOutcome> {
        if ids.is_empty() {
            return Ok(ActionOutcome {
                label: Some(label_name.to_string()),
                ..Default::default()
            });
        }

        let label_id = self.api.ensure_label(label_name)?;
        if remove {
            self.modify(ids, &[], &[&label_id])?;
        } else {
            self.modify(ids, &[&label_id], &[])?;
        }

        info!(
            "{} label '{}' on {} messages",
            if remove { "Removed" } else { "Applied" },
            label_name,
            ids.len()
        );

        Ok(ActionOutcome {
            count: ids.len(),
            label: Some(label_name.to_string()),
            message_ids: Vec::new(),
        })
    }

    /// Find message IDs matching a provider search query
    fn search(&self, query: &str, max_results: usize) -> Result<ActionOutcome> {
        let mut ids: Vec<GmailId> = Vec::new();
        let mut page_token: Option<String> = None;

        while ids.len() < max_results {
            let page = self.api.list_messages(
                Some(query),
                max_results - ids.len(),
                page_token.as_deref(),
            )?;

            ids.extend(
                page.messages
                    .unwrap_or_default()
                    .into_iter()
                    .map(|m| GmailId::new(m.id)),
            );

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        ids.truncate(max_results);

        info!("Search '{}' matched {} messages", query, ids.len());
        Ok(ActionOutcome {
            count: ids.len(),
            label: None,
            message_ids: ids,
        })
    }

    /// Apply a label change on the provider, then mirror it locally
    fn modify(&self, ids: &[GmailId], add: &[&str], remove: &[&str]) -> Result<()> {
        self.api.batch_modify(ids, add, remove)?;

        for id in ids {
            if let Some(email) = self.store.get_email(self.user_id, id)? {
                let mut new_labels = email.labels.clone();
                for label in remove {
                    new_labels.retain(|l| l != label);
                }
                for label in add {
                    if !new_labels.iter().any(|l| l == label) {
                        new_labels.push(label.to_string());
                    }
                }
                if new_labels != email.labels {
                    self.store
                        .update_email_labels(self.user_id, id, &new_labels)?;
                }
            }
        }

        Ok(())
    }
}
