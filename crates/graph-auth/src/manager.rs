//! Per-user token issuance
//!
//! `TokenManager::get_token` is the single entry point the gateway uses to
//! turn a caller identity into a usable bearer token. The whole call — row
//! fetch, decryption, optional refresh, persistence — runs under that user's
//! lock, so a caller queued behind a refresh re-reads the store and picks up
//! the refreshed row instead of refreshing again. Callers for different
//! users never wait on each other.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::Secret;
use metrics::counter;
use tracing::{error, info};

use crate::constants::{PROVIDER, REFRESH_WINDOW_SECS, token_endpoint};
use crate::crypto::TokenCipher;
use crate::error::{Error, Result};
use crate::locks::UserLocks;
use crate::store::ConnectionStore;
use crate::token;

/// OAuth client registration used for refresh grants.
pub struct ProviderConfig {
    pub token_endpoint: String,
    pub client_id: String,
    pub client_secret: Secret<String>,
}

impl ProviderConfig {
    /// Standard configuration for a directory tenant.
    pub fn for_tenant(tenant: &str, client_id: String, client_secret: Secret<String>) -> Self {
        Self {
            token_endpoint: token_endpoint(tenant),
            client_id,
            client_secret,
        }
    }
}

/// A decrypted access token ready for one request.
///
/// Lives only for the serving request: never persisted, never cached. The
/// Debug impl redacts the token text so request-scoped logging cannot leak
/// it.
#[derive(Clone)]
pub struct IssuedToken {
    pub access_token: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedToken")
            .field("access_token", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Owns the credential lifecycle for every user of this process.
///
/// Constructed once at startup and shared via `Arc`; holds the store, the
/// cipher, the OAuth client registration, and the per-user lock registry.
pub struct TokenManager {
    store: Arc<dyn ConnectionStore>,
    cipher: TokenCipher,
    provider: ProviderConfig,
    http: reqwest::Client,
    locks: UserLocks,
}

impl TokenManager {
    pub fn new(
        store: Arc<dyn ConnectionStore>,
        cipher: TokenCipher,
        provider: ProviderConfig,
        http: reqwest::Client,
    ) -> Self {
        Self {
            store,
            cipher,
            provider,
            http,
            locks: UserLocks::new(),
        }
    }

    /// Resolve a valid access token for `user_id`, refreshing first when the
    /// stored token expires within the refresh window.
    pub async fn get_token(&self, user_id: &str) -> Result<IssuedToken> {
        let _guard = self.locks.acquire(user_id).await;

        // Always read inside the lock: a caller that waited behind a refresh
        // must observe the row that refresh wrote
        let row = self
            .store
            .fetch_active(user_id, PROVIDER)
            .await?
            .ok_or(Error::NotConnected)?;

        let Ok(stored_access) = self.cipher.decrypt(&row.access_token) else {
            error!(user_id, connection_id = %row.id, "access token decryption failed");
            return Err(Error::DecryptionFailed);
        };
        let Ok(stored_refresh) = self.cipher.decrypt(&row.refresh_token) else {
            error!(user_id, connection_id = %row.id, "refresh token decryption failed");
            return Err(Error::DecryptionFailed);
        };

        let now = Utc::now();
        let mut access_token = stored_access;
        let mut expires_at = row.expires_at;

        let remaining = expires_at.signed_duration_since(now).num_seconds();
        if remaining < REFRESH_WINDOW_SECS {
            info!(user_id, remaining_secs = remaining, "refreshing access token");
            let response = token::refresh_token(
                &self.http,
                &self.provider.token_endpoint,
                &self.provider.client_id,
                self.provider.client_secret.expose_str(),
                &stored_refresh,
            )
            .await?;
            counter!("token_refresh_total").increment(1);

            // The provider rotates the refresh token only sometimes; keep
            // the previous one when the response omits it
            let next_refresh = response.refresh_token.unwrap_or(stored_refresh);
            let new_expires = now + chrono::Duration::seconds(response.expires_in);

            let access_ciphertext = self.cipher.encrypt(&response.access_token)?;
            let refresh_ciphertext = self.cipher.encrypt(&next_refresh)?;
            self.store
                .update_tokens(row.id, &access_ciphertext, &refresh_ciphertext, new_expires)
                .await?;

            access_token = response.access_token;
            expires_at = new_expires;
        }

        // Stamped on every call, refreshed or not
        self.store.touch_last_used(row.id).await?;

        Ok(IssuedToken {
            access_token,
            user_id: user_id.to_owned(),
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ConnectionRow;
    use axum::Json;
    use axum::http::StatusCode;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use uuid::Uuid;

    /// In-memory stand-in for the Postgres store, one row per user.
    struct MemoryStore {
        rows: StdMutex<HashMap<String, ConnectionRow>>,
        touches: AtomicU64,
    }

    impl MemoryStore {
        fn new(rows: Vec<ConnectionRow>) -> Arc<Self> {
            Arc::new(Self {
                rows: StdMutex::new(
                    rows.into_iter().map(|r| (r.user_id.clone(), r)).collect(),
                ),
                touches: AtomicU64::new(0),
            })
        }

        fn row_for(&self, user_id: &str) -> ConnectionRow {
            self.rows.lock().unwrap().get(user_id).cloned().unwrap()
        }

        fn touch_count(&self) -> u64 {
            self.touches.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl ConnectionStore for MemoryStore {
        async fn fetch_active(
            &self,
            user_id: &str,
            provider: &str,
        ) -> Result<Option<ConnectionRow>> {
            assert_eq!(provider, PROVIDER);
            Ok(self.rows.lock().unwrap().get(user_id).cloned())
        }

        async fn update_tokens(
            &self,
            id: Uuid,
            access_ciphertext: &str,
            refresh_ciphertext: &str,
            expires_at: DateTime<Utc>,
        ) -> Result<()> {
            let mut rows = self.rows.lock().unwrap();
            let row = rows
                .values_mut()
                .find(|r| r.id == id)
                .expect("update targets an existing row");
            row.access_token = access_ciphertext.to_owned();
            row.refresh_token = refresh_ciphertext.to_owned();
            row.expires_at = expires_at;
            Ok(())
        }

        async fn touch_last_used(&self, _id: Uuid) -> Result<()> {
            self.touches.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn close(&self) {}
    }

    fn test_cipher() -> TokenCipher {
        TokenCipher::from_bytes(&[3u8; 32]).unwrap()
    }

    fn row_expiring_in(cipher: &TokenCipher, user_id: &str, secs: i64) -> ConnectionRow {
        ConnectionRow {
            id: Uuid::new_v4(),
            user_id: user_id.to_owned(),
            access_token: cipher.encrypt("at_stored").unwrap(),
            refresh_token: cipher.encrypt("rt_stored").unwrap(),
            expires_at: Utc::now() + chrono::Duration::seconds(secs),
            provider_metadata: None,
        }
    }

    /// Identity-provider stub: counts hits, answers after `delay`.
    async fn start_token_endpoint(
        status: StatusCode,
        body: serde_json::Value,
        delay: Duration,
    ) -> (String, Arc<AtomicU64>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicU64::new(0));
        let hits_in_handler = hits.clone();

        tokio::spawn(async move {
            let app = axum::Router::new().fallback(move || {
                let hits = hits_in_handler.clone();
                let body = body.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(delay).await;
                    (status, Json(body))
                }
            });
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{addr}"), hits)
    }

    fn refreshed_body() -> serde_json::Value {
        json!({
            "access_token": "at_refreshed",
            "refresh_token": "rt_refreshed",
            "expires_in": 3600,
        })
    }

    fn manager(store: Arc<MemoryStore>, endpoint: String) -> TokenManager {
        TokenManager::new(
            store,
            test_cipher(),
            ProviderConfig {
                token_endpoint: endpoint,
                client_id: "client-id".into(),
                client_secret: Secret::new("client-secret".into()),
            },
            reqwest::Client::new(),
        )
    }

    #[tokio::test]
    async fn fresh_token_is_returned_without_refresh() {
        let cipher = test_cipher();
        let store = MemoryStore::new(vec![row_expiring_in(&cipher, "alice", 7200)]);
        let (endpoint, hits) =
            start_token_endpoint(StatusCode::OK, refreshed_body(), Duration::ZERO).await;
        let manager = manager(store.clone(), endpoint);

        let first = manager.get_token("alice").await.unwrap();
        let second = manager.get_token("alice").await.unwrap();

        assert_eq!(first.access_token, "at_stored");
        assert_eq!(second.access_token, "at_stored");
        assert_eq!(hits.load(Ordering::SeqCst), 0, "no refresh for a fresh token");
        assert_eq!(store.touch_count(), 2, "last_used_at stamped on every call");
    }

    #[tokio::test]
    async fn expiring_token_is_refreshed_and_persisted() {
        let cipher = test_cipher();
        let store = MemoryStore::new(vec![row_expiring_in(&cipher, "alice", 100)]);
        let (endpoint, hits) =
            start_token_endpoint(StatusCode::OK, refreshed_body(), Duration::ZERO).await;
        let manager = manager(store.clone(), endpoint);

        let issued = manager.get_token("alice").await.unwrap();

        assert_eq!(issued.access_token, "at_refreshed");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(
            issued.expires_at > Utc::now() + chrono::Duration::seconds(3000),
            "returned expiry reflects the refreshed token"
        );

        // The row now holds the new tokens, re-encrypted
        let row = store.row_for("alice");
        assert_eq!(cipher.decrypt(&row.access_token).unwrap(), "at_refreshed");
        assert_eq!(cipher.decrypt(&row.refresh_token).unwrap(), "rt_refreshed");
        assert_eq!(store.touch_count(), 1);
    }

    #[tokio::test]
    async fn refresh_window_is_exclusive_at_300_seconds() {
        let cipher = test_cipher();
        let (endpoint, hits) =
            start_token_endpoint(StatusCode::OK, refreshed_body(), Duration::ZERO).await;

        // 299 seconds remaining: inside the window, refreshes
        let store = MemoryStore::new(vec![row_expiring_in(&cipher, "alice", 299)]);
        manager(store, endpoint.clone())
            .get_token("alice")
            .await
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // 301 seconds remaining: outside the window, no refresh
        let store = MemoryStore::new(vec![row_expiring_in(&cipher, "bob", 301)]);
        manager(store, endpoint).get_token("bob").await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_calls_for_one_user_refresh_once() {
        let cipher = test_cipher();
        let store = MemoryStore::new(vec![row_expiring_in(&cipher, "alice", 60)]);
        let (endpoint, hits) =
            start_token_endpoint(StatusCode::OK, refreshed_body(), Duration::from_millis(100))
                .await;
        let manager = Arc::new(manager(store, endpoint));

        let a = {
            let m = manager.clone();
            tokio::spawn(async move { m.get_token("alice").await.unwrap() })
        };
        let b = {
            let m = manager.clone();
            tokio::spawn(async move { m.get_token("alice").await.unwrap() })
        };
        let (a, b) = (a.await.unwrap(), b.await.unwrap());

        assert_eq!(hits.load(Ordering::SeqCst), 1, "exactly one outbound refresh");
        assert_eq!(a.access_token, "at_refreshed");
        assert_eq!(
            b.access_token, "at_refreshed",
            "the queued caller observes the refreshed row"
        );
    }

    #[tokio::test]
    async fn distinct_users_refresh_in_parallel() {
        let cipher = test_cipher();
        let store = MemoryStore::new(vec![
            row_expiring_in(&cipher, "alice", 60),
            row_expiring_in(&cipher, "bob", 60),
        ]);
        let (endpoint, hits) =
            start_token_endpoint(StatusCode::OK, refreshed_body(), Duration::from_millis(300))
                .await;
        let manager = Arc::new(manager(store, endpoint));

        let start = tokio::time::Instant::now();
        let a = {
            let m = manager.clone();
            tokio::spawn(async move { m.get_token("alice").await.unwrap() })
        };
        let b = {
            let m = manager.clone();
            tokio::spawn(async move { m.get_token("bob").await.unwrap() })
        };
        a.await.unwrap();
        b.await.unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(
            start.elapsed() < Duration::from_millis(550),
            "two slow refreshes for distinct users must overlap, took {:?}",
            start.elapsed()
        );
    }

    #[tokio::test]
    async fn missing_row_is_not_connected() {
        let store = MemoryStore::new(vec![]);
        let (endpoint, _) =
            start_token_endpoint(StatusCode::OK, refreshed_body(), Duration::ZERO).await;
        let err = manager(store, endpoint).get_token("ghost").await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }

    #[tokio::test]
    async fn corrupted_ciphertext_yields_opaque_error() {
        let cipher = test_cipher();
        let mut row = row_expiring_in(&cipher, "alice", 7200);
        row.access_token = "bm90LXJlYWwtY2lwaGVydGV4dA==".into();
        let store = MemoryStore::new(vec![row]);
        let (endpoint, _) =
            start_token_endpoint(StatusCode::OK, refreshed_body(), Duration::ZERO).await;

        let err = manager(store, endpoint).get_token("alice").await.unwrap_err();
        assert!(matches!(err, Error::DecryptionFailed));
        let message = err.to_string();
        assert!(
            !message.contains("bm90LXJlYWwt") && !message.contains("at_stored"),
            "error must carry no token material, got: {message}"
        );
    }

    #[tokio::test]
    async fn rejected_refresh_is_reauth_needed() {
        let cipher = test_cipher();
        let store = MemoryStore::new(vec![row_expiring_in(&cipher, "alice", 10)]);
        let (endpoint, _) = start_token_endpoint(
            StatusCode::BAD_REQUEST,
            json!({"error": "invalid_grant"}),
            Duration::ZERO,
        )
        .await;

        let err = manager(store.clone(), endpoint)
            .get_token("alice")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ReauthNeeded(_)));

        // The stored credential is left untouched
        let row = store.row_for("alice");
        assert_eq!(cipher.decrypt(&row.access_token).unwrap(), "at_stored");
    }

    #[tokio::test]
    async fn unreachable_provider_is_a_transport_error() {
        let cipher = test_cipher();
        let store = MemoryStore::new(vec![row_expiring_in(&cipher, "alice", 10)]);
        // Nothing listens on port 1
        let err = manager(store, "http://127.0.0.1:1".into())
            .get_token("alice")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn absent_rotated_refresh_token_is_retained() {
        let cipher = test_cipher();
        let store = MemoryStore::new(vec![row_expiring_in(&cipher, "alice", 10)]);
        let (endpoint, _) = start_token_endpoint(
            StatusCode::OK,
            json!({"access_token": "at_refreshed", "expires_in": 3600}),
            Duration::ZERO,
        )
        .await;

        let issued = manager(store.clone(), endpoint)
            .get_token("alice")
            .await
            .unwrap();
        assert_eq!(issued.access_token, "at_refreshed");

        let row = store.row_for("alice");
        assert_eq!(
            cipher.decrypt(&row.refresh_token).unwrap(),
            "rt_stored",
            "previous refresh token survives when the provider omits a new one"
        );
    }

    #[test]
    fn issued_token_debug_redacts_the_token() {
        let token = IssuedToken {
            access_token: "super-secret-bearer".into(),
            user_id: "alice".into(),
            expires_at: Utc::now(),
        };
        let debug = format!("{token:?}");
        assert!(!debug.contains("super-secret-bearer"));
        assert!(debug.contains("[REDACTED]"));
        assert!(debug.contains("alice"));
    }
}
