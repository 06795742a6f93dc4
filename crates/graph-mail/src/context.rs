//! Per-request execution context
//!
//! The gateway middleware resolves the caller's token once per request and
//! binds it here; handlers hand the context to `MailClient`, which reads the
//! bearer from it. The token therefore never travels through handler
//! signatures, and a context that was never bound fails closed with
//! `AuthMissing`.

use std::fmt;

use crate::error::{Error, Result};

/// Identity and bearer token for the request being served.
///
/// Cheap to clone; lives in axum request extensions for the duration of one
/// call and is dropped with it.
#[derive(Clone, Default)]
pub struct RequestContext {
    user_id: Option<String>,
    bearer: Option<String>,
}

impl RequestContext {
    /// A context with no caller bound — every mailbox call through it fails
    /// with `AuthMissing`.
    pub fn unbound() -> Self {
        Self::default()
    }

    /// Bind a resolved caller identity and access token.
    pub fn bind(user_id: impl Into<String>, bearer: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            bearer: Some(bearer.into()),
        }
    }

    /// The bearer token for outbound mailbox calls.
    pub fn bearer(&self) -> Result<&str> {
        self.bearer.as_deref().ok_or(Error::AuthMissing)
    }

    /// The caller identity, when bound (for logging only).
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("user_id", &self.user_id)
            .field("bearer", &self.bearer.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}
