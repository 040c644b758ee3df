//! User model representing a ScrapIt account

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered user
///
/// Created by the OAuth callback handler on first sign-in; this crate only
/// reads users and updates their tokens and sync bookkeeping. Token columns
/// are opaque to the core — any encryption at rest is owned by the token
/// provider that writes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Unique integer identifier (database primary key)
    pub id: i64,
    /// Email address (unique)
    pub email: String,
    /// Google subject ID from the OAuth profile (unique)
    pub google_id: String,
    /// OAuth access token, if one has been issued
    pub access_token: Option<String>,
    /// OAuth refresh token, if one has been issued
    pub refresh_token: Option<String>,
    /// When the user was created
    pub created_at: DateTime<Utc>,
    /// When the last successful sync finished (None = never synced)
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl User {
    /// Create a new user (id will be assigned by the database)
    pub fn new(email: impl Into<String>, google_id: impl Into<String>) -> Self {
        Self {
            id: 0,
            email: email.into(),
            google_id: google_id.into(),
            access_token: None,
            refresh_token: None,
            created_at: Utc::now(),
            last_synced_at: None,
        }
    }

    /// Set the OAuth token pair
    pub fn with_tokens(
        mut self,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
    ) -> Self {
        self.access_token = Some(access_token.into());
        self.refresh_token = refresh_token;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user() {
        let user = User::new("test@example.com", "google-sub-1");
        assert_eq!(user.id, 0);
        assert_eq!(user.email, "test@example.com");
        assert!(user.access_token.is_none());
        assert!(user.last_synced_at.is_none());
    }

    #[test]
    fn test_with_tokens() {
        let user = User::new("test@example.com", "google-sub-1")
            .with_tokens("access", Some("refresh".to_string()));
        assert_eq!(user.access_token.as_deref(), Some("access"));
        assert_eq!(user.refresh_token.as_deref(), Some("refresh"));
    }
}
