//! Configuration types and loading
//!
//! Settings come from a TOML file; secrets come only from the environment
//! (`DATABASE_URL`, `TOKEN_ENCRYPTION_KEY`, `MS_CLIENT_SECRET`) so a checked-in
//! config file can never leak them. The config path resolves from the
//! `--config` CLI flag, then `CONFIG_PATH`, then a default filename.

use common::Secret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub mailbox: MailboxConfig,
    /// Postgres connection string, from the DATABASE_URL env var
    #[serde(skip)]
    pub database_url: Option<Secret<String>>,
    /// Base64-encoded 32-byte AES key, from TOKEN_ENCRYPTION_KEY
    #[serde(skip)]
    pub encryption_key: Option<Secret<String>>,
}

/// Listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Microsoft OAuth client registration
#[derive(Debug, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    #[serde(default = "default_tenant")]
    pub tenant_id: String,
    /// From the MS_CLIENT_SECRET env var
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
}

/// Mailbox API settings
#[derive(Debug, Deserialize)]
pub struct MailboxConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// `$select` projection for list/search calls
    #[serde(default = "default_list_fields")]
    pub list_fields: String,
    /// `$select` projection for single-message reads
    #[serde(default = "default_detail_fields")]
    pub detail_fields: String,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            list_fields: default_list_fields(),
            detail_fields: default_detail_fields(),
        }
    }
}

fn default_max_connections() -> usize {
    1000
}

fn default_tenant() -> String {
    graph_auth::DEFAULT_TENANT.to_owned()
}

fn default_base_url() -> String {
    graph_mail::GRAPH_BASE_URL.to_owned()
}

fn default_timeout() -> u64 {
    30
}

fn default_list_fields() -> String {
    "id,subject,from,toRecipients,ccRecipients,receivedDateTime,bodyPreview,hasAttachments,importance,isRead".to_owned()
}

fn default_detail_fields() -> String {
    "id,subject,from,toRecipients,ccRecipients,bccRecipients,receivedDateTime,bodyPreview,body,hasAttachments,importance,isRead".to_owned()
}

impl Config {
    /// Load configuration from a TOML file, then resolve secrets from the
    /// environment. All three secrets are required.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if !config.mailbox.base_url.starts_with("http://")
            && !config.mailbox.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "mailbox.base_url must start with http:// or https://, got: {}",
                config.mailbox.base_url
            )));
        }

        if config.mailbox.timeout_secs == 0 {
            return Err(common::Error::Config(
                "mailbox.timeout_secs must be greater than 0".into(),
            ));
        }

        if config.server.max_connections == 0 {
            return Err(common::Error::Config(
                "server.max_connections must be greater than 0".into(),
            ));
        }

        config.database_url = Some(require_env("DATABASE_URL")?);
        config.encryption_key = Some(require_env("TOKEN_ENCRYPTION_KEY")?);
        config.oauth.client_secret = Some(require_env("MS_CLIENT_SECRET")?);

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("mail-gateway.toml")
    }
}

fn require_env(name: &str) -> common::Result<Secret<String>> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(Secret::new(value)),
        _ => Err(common::Error::Config(format!(
            "{name} environment variable is required"
        ))),
    }
}
