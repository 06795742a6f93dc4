//! Error types for token lifecycle operations

/// Errors from credential and token operations.
///
/// `DecryptionFailed` deliberately carries no detail: neither ciphertext nor
/// plaintext may appear in an error message or log line.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no active mailbox connection for user")]
    NotConnected,

    #[error("credential decryption failed")]
    DecryptionFailed,

    #[error("credential encryption failed")]
    EncryptionFailed,

    #[error("invalid encryption key: {0}")]
    InvalidKey(String),

    #[error("token refresh rejected, reconnect required: {0}")]
    ReauthNeeded(String),

    #[error("transport error reaching identity provider: {0}")]
    Transport(String),

    #[error("credential store error: {0}")]
    Store(String),
}

/// Result alias for token lifecycle operations.
pub type Result<T> = std::result::Result<T, Error>;
