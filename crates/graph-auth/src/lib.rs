//! Microsoft OAuth token lifecycle for the mailbox gateway
//!
//! Owns per-user access to encrypted OAuth credentials stored in Postgres:
//! decryption, expiry evaluation, proactive refresh against the Microsoft
//! identity platform, and re-persistence of refreshed tokens. All of it runs
//! under a per-user lock so concurrent requests for one user never race a
//! refresh.
//!
//! Token flow:
//! 1. Gateway middleware resolves a caller identity and calls
//!    `TokenManager::get_token(user_id)`
//! 2. The canonical active credential row is read from `ConnectionStore`
//! 3. Stored tokens are decrypted with `TokenCipher` (AES-256-GCM)
//! 4. A token inside the refresh window is refreshed via `refresh_token()`
//!    and the new ciphertexts are written back to the same row
//! 5. The plaintext access token is returned for this request only — it is
//!    never cached or persisted

pub mod constants;
pub mod crypto;
pub mod error;
mod locks;
pub mod manager;
pub mod store;
pub mod token;

pub use constants::*;
pub use crypto::TokenCipher;
pub use error::{Error, Result};
pub use manager::{IssuedToken, ProviderConfig, TokenManager};
pub use store::{ConnectionRow, ConnectionStore, PgConnectionStore};
pub use token::{TokenResponse, refresh_token};
