//! Error types for mailbox API operations

/// Errors from authenticated mailbox calls.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no bearer token bound to the request context")]
    AuthMissing,

    #[error("mailbox session expired, reconnect required")]
    ReauthNeeded,

    #[error("mailbox API returned {0}")]
    Upstream(u16),

    #[error("transport error reaching mailbox API: {0}")]
    Transport(String),

    #[error("unexpected mailbox API response: {0}")]
    Envelope(String),
}

/// Result alias for mailbox operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_error_carries_status() {
        assert_eq!(Error::Upstream(503).to_string(), "mailbox API returned 503");
    }

    #[test]
    fn auth_missing_names_the_context() {
        assert!(Error::AuthMissing.to_string().contains("request context"));
    }
}
