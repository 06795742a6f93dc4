//! Refresh grant against the Microsoft identity platform token endpoint
//!
//! One POST, form-encoded, attempted exactly once. A non-success status means
//! the refresh token is no longer good for anything — the user has to redo
//! consent — so it surfaces as `ReauthNeeded` rather than being retried.

use std::time::Duration;

use serde::Deserialize;

use crate::constants::{DEFAULT_EXPIRES_IN_SECS, REFRESH_SCOPES, REFRESH_TIMEOUT_SECS};
use crate::error::{Error, Result};

/// Response from the token endpoint for a `refresh_token` grant.
///
/// Microsoft always returns a new access token; the refresh token is only
/// present when the provider chose to rotate it, and `expires_in` (a delta in
/// seconds) is occasionally absent.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
}

fn default_expires_in() -> i64 {
    DEFAULT_EXPIRES_IN_SECS
}

/// Exchange a refresh token for a new access token.
///
/// Attempted once per call — no retry. The caller decides what a failure
/// means for the stored credential.
pub async fn refresh_token(
    client: &reqwest::Client,
    token_endpoint: &str,
    client_id: &str,
    client_secret: &str,
    refresh: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(token_endpoint)
        .timeout(Duration::from_secs(REFRESH_TIMEOUT_SECS))
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("scope", REFRESH_SCOPES),
        ])
        .send()
        .await
        .map_err(|e| Error::Transport(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        // Status only — provider error bodies are not worth carrying around
        return Err(Error::ReauthNeeded(format!(
            "token endpoint returned {status}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::Transport(format!("invalid token response: {e}")))
}
