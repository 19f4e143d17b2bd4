//! Distributed lock over the shared `locks` table
//!
//! Mutual exclusion over a shared key space with expiry, usable from any
//! number of worker processes sharing the database. Used as the per-upload
//! intake guard and as the per-session processing mutex; the compactor and
//! finalizer take the same session key before touching a session's chunks.
//!
//! A lock auto-expires after its TTL. Holders whose work may outlive the
//! TTL must extend it periodically; a late `release` or `extend` with a
//! stale token never disturbs a newer holder.

use chrono::{Duration as ChronoDuration, Utc};
use sqlx::SqlitePool;
use std::time::Duration;
use uuid::Uuid;
use proctor_common::Result;

/// Lock key for a session's processing mutex
pub fn session_lock_key(session_id: Uuid) -> String {
    format!("lock:session:{}", session_id)
}

/// Lock key for a session's upload intake guard
pub fn upload_lock_key(session_id: Uuid) -> String {
    format!("session:{}:upload", session_id)
}

/// Proof of lock ownership
///
/// `release` and `extend` only take effect while the stored token still
/// matches, so an expired holder cannot clobber its successor.
#[derive(Debug, Clone)]
pub struct LockToken {
    pub key: String,
    token: String,
}

/// Mutual exclusion over the shared `locks` table
#[derive(Clone)]
pub struct LockManager {
    pool: SqlitePool,
}

impl LockManager {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Try to acquire `key` for `ttl`
    ///
    /// Returns `None` when another holder's lock is still live. An expired
    /// key is claimed in place; no background reaper is needed.
    pub async fn acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>> {
        let token = Uuid::new_v4().to_string();
        let now = Utc::now();
        let expires_at = now + ChronoDuration::from_std(ttl).unwrap_or(ChronoDuration::zero());

        let result = sqlx::query(
            r#"
            INSERT INTO locks (key, token, expires_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                token = excluded.token,
                expires_at = excluded.expires_at
            WHERE locks.expires_at <= ?
            "#,
        )
        .bind(key)
        .bind(&token)
        .bind(expires_at.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            Ok(Some(LockToken {
                key: key.to_string(),
                token,
            }))
        } else {
            Ok(None)
        }
    }

    /// Release a held lock
    ///
    /// No-op when the key has expired and been taken over, or was already
    /// released.
    pub async fn release(&self, lock: &LockToken) -> Result<()> {
        sqlx::query("DELETE FROM locks WHERE key = ? AND token = ?")
            .bind(&lock.key)
            .bind(&lock.token)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Push the expiry of a held lock another `ttl` into the future
    ///
    /// Returns false when the token is stale, meaning exclusivity was
    /// already lost.
    pub async fn extend(&self, lock: &LockToken, ttl: Duration) -> Result<bool> {
        let expires_at =
            Utc::now() + ChronoDuration::from_std(ttl).unwrap_or(ChronoDuration::zero());

        let result = sqlx::query("UPDATE locks SET expires_at = ? WHERE key = ? AND token = ?")
            .bind(expires_at.to_rfc3339())
            .bind(&lock.key)
            .bind(&lock.token)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
