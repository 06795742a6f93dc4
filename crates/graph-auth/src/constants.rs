//! Microsoft identity platform constants
//!
//! The provider discriminator and token endpoint shape are fixed: this
//! gateway mediates exactly one provider. Client id/secret are deployment
//! configuration, not constants — see `ProviderConfig`.

/// Provider discriminator on credential rows (distinguishes from other
/// integrations sharing the same table)
pub const PROVIDER: &str = "microsoft";

/// Tenant used when none is configured ("common" accepts any directory)
pub const DEFAULT_TENANT: &str = "common";

/// Scopes requested on every refresh grant.
/// `offline_access` keeps the refresh token alive; the rest are the
/// read-only mailbox permissions this service needs.
pub const REFRESH_SCOPES: &str = "offline_access User.Read Mail.Read";

/// Remaining lifetime below which a stored access token is refreshed
/// before use
pub const REFRESH_WINDOW_SECS: i64 = 300;

/// Assumed access token lifetime when the token response omits
/// `expires_in` (Microsoft issues one-hour tokens)
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Per-call timeout for token endpoint requests
pub const REFRESH_TIMEOUT_SECS: u64 = 30;

/// Token endpoint for the given tenant.
pub fn token_endpoint(tenant: &str) -> String {
    format!("https://login.microsoftonline.com/{tenant}/oauth2/v2.0/token")
}
