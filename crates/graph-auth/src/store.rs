//! Credential row access over Postgres
//!
//! The gateway shares its `oauth_connections` table with the service that
//! runs the consent flow. That service creates rows and flips the active
//! flag; this store only ever reads the canonical row and updates token
//! fields and timestamps on it. When several active rows exist for one
//! (user, provider) pair, the most recently created wins.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use tracing::info;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Lower bound of the Postgres connection pool
const POOL_MIN_CONNECTIONS: u32 = 1;

/// Upper bound of the Postgres connection pool
const POOL_MAX_CONNECTIONS: u32 = 5;

/// How long a statement may wait for a pooled connection
const POOL_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// The fields of a credential row the token manager works with.
///
/// `access_token` and `refresh_token` are ciphertext envelopes, never
/// plaintext. `provider_metadata` is opaque to this service and passes
/// through untouched.
#[derive(Debug, Clone, FromRow)]
pub struct ConnectionRow {
    pub id: Uuid,
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub provider_metadata: Option<serde_json::Value>,
}

/// Read/update access to credential rows.
///
/// A trait seam so the token manager can be exercised against an in-memory
/// store in tests; production uses `PgConnectionStore`.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Fetch the canonical row for (user, provider): the most recently
    /// created row with the active flag set, or `None`.
    async fn fetch_active(&self, user_id: &str, provider: &str) -> Result<Option<ConnectionRow>>;

    /// Persist refreshed token ciphertexts and the new expiry on an existing
    /// row, stamping `updated_at`.
    async fn update_tokens(
        &self,
        id: Uuid,
        access_ciphertext: &str,
        refresh_ciphertext: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Stamp `last_used_at` on a row.
    async fn touch_last_used(&self, id: Uuid) -> Result<()>;

    /// Drain in-flight work and close underlying connections.
    async fn close(&self);
}

/// Postgres-backed credential store.
#[derive(Clone)]
pub struct PgConnectionStore {
    pool: PgPool,
}

impl PgConnectionStore {
    /// Connect with the fixed pool bounds and acquire timeout.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(POOL_MIN_CONNECTIONS)
            .max_connections(POOL_MAX_CONNECTIONS)
            .acquire_timeout(POOL_ACQUIRE_TIMEOUT)
            .connect(database_url)
            .await
            .map_err(|e| Error::Store(format!("connecting to credential store: {e}")))?;
        info!(
            min = POOL_MIN_CONNECTIONS,
            max = POOL_MAX_CONNECTIONS,
            "credential store pool ready"
        );
        Ok(Self { pool })
    }

    /// Wrap an existing pool (integration tests).
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConnectionStore for PgConnectionStore {
    async fn fetch_active(&self, user_id: &str, provider: &str) -> Result<Option<ConnectionRow>> {
        sqlx::query_as::<_, ConnectionRow>(
            r#"
            SELECT id, user_id, access_token, refresh_token, expires_at,
                   provider_metadata
            FROM oauth_connections
            WHERE user_id = $1
              AND provider = $2
              AND is_active = TRUE
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(provider)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Store(format!("fetching connection row: {e}")))
    }

    async fn update_tokens(
        &self,
        id: Uuid,
        access_ciphertext: &str,
        refresh_ciphertext: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE oauth_connections
            SET access_token = $1, refresh_token = $2, expires_at = $3, updated_at = NOW()
            WHERE id = $4
            "#,
        )
        .bind(access_ciphertext)
        .bind(refresh_ciphertext)
        .bind(expires_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Store(format!("persisting refreshed tokens: {e}")))?;
        Ok(())
    }

    async fn touch_last_used(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE oauth_connections SET last_used_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Store(format!("stamping last_used_at: {e}")))?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
