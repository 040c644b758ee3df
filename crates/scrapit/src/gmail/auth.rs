//! Per-user OAuth token handling for the Gmail API
//!
//! Tokens are issued by the OAuth callback flow elsewhere and stored on the
//! user row; this module holds a user's token pair for the duration of a
//! client's life and refreshes the access token against Google's token
//! endpoint when it expires. Callers persist refreshed tokens back to the
//! user row via [`GmailAuth::current_tokens`].

use std::sync::Mutex;

use log::{debug, warn};
use serde::Deserialize;

use super::ApiError;
use crate::config::GoogleCredentials;

/// A user's OAuth token pair as stored on the user row
#[derive(Debug, Clone, PartialEq)]
pub struct UserTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// Token response from Google's token endpoint
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
}

/// OAuth token state for one user
pub struct GmailAuth {
    credentials: GoogleCredentials,
    tokens: Mutex<UserTokens>,
}

impl GmailAuth {
    /// Google OAuth2 token endpoint
    const TOKEN_URL: &'static str = "https://oauth2.googleapis.com/token";

    pub fn new(credentials: GoogleCredentials, tokens: UserTokens) -> Self {
        Self {
            credentials,
            tokens: Mutex::new(tokens),
        }
    }

    /// The current access token
    pub fn access_token(&self) -> String {
        self.tokens.lock().unwrap().access_token.clone()
    }

    /// The current token pair, for persisting back to the user row
    pub fn current_tokens(&self) -> UserTokens {
        self.tokens.lock().unwrap().clone()
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// Returns `Unauthorized` when there is no refresh token or the endpoint
    /// rejects it; the caller treats that as a fatal authentication failure.
    pub fn refresh(&self) -> Result<(), ApiError> {
        let refresh_token = {
            let tokens = self.tokens.lock().unwrap();
            match &tokens.refresh_token {
                Some(token) => token.clone(),
                None => {
                    warn!("No refresh token available, cannot refresh access token");
                    return Err(ApiError::Unauthorized);
                }
            }
        };

        let response = ureq::post(Self::TOKEN_URL)
            .send_form([
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("refresh_token", refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .map_err(|e| match e {
                ureq::Error::StatusCode(400) | ureq::Error::StatusCode(401) => {
                    ApiError::Unauthorized
                }
                other => ApiError::Transport(other.to_string()),
            })?;

        let token: TokenResponse = response
            .into_body()
            .read_json()
            .map_err(|e| ApiError::Malformed(e.to_string()))?;

        debug!("Refreshed Gmail access token");

        let mut tokens = self.tokens.lock().unwrap();
        tokens.access_token = token.access_token;
        // Google often omits the refresh token on refresh; keep the old one
        if let Some(new_refresh) = token.refresh_token {
            tokens.refresh_token = Some(new_refresh);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_auth(refresh_token: Option<&str>) -> GmailAuth {
        GmailAuth::new(
            GoogleCredentials {
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
            },
            UserTokens {
                access_token: "access".to_string(),
                refresh_token: refresh_token.map(|s| s.to_string()),
            },
        )
    }

    #[test]
    fn test_access_token() {
        let auth = test_auth(Some("refresh"));
        assert_eq!(auth.access_token(), "access");
    }

    #[test]
    fn test_refresh_without_refresh_token() {
        let auth = test_auth(None);
        match auth.refresh() {
            Err(ApiError::Unauthorized) => {}
            other => panic!("Expected Unauthorized, got {:?}", other),
        }
    }

    #[test]
    fn test_current_tokens() {
        let auth = test_auth(Some("refresh"));
        let tokens = auth.current_tokens();
        assert_eq!(tokens.access_token, "access");
        assert_eq!(tokens.refresh_token.as_deref(), Some("refresh"));
    }
}
