//! Refresh-token record persistence
//!
//! Revocation is record absence: a live token pair is exactly one record
//! keyed by its shared `token_id`. Lookups return a tagged [`Lookup`] so
//! callers must handle the not-found (= revoked) case explicitly.

pub mod memory;
pub mod redis;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use memory::MemoryTokenStore;
pub use self::redis::RedisTokenStore;

/// Persisted refresh-token record. Primary key is `token_id` (the `jti`
/// shared with the paired access token).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenRecord {
    pub token_id: String,
    pub user_id: String,
    pub email: String,
    pub token_type: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TokenRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Tagged lookup result. Deliberately not an `Option`: absence means the
/// token was revoked and every caller has to decide what that implies.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(TokenRecord),
    NotFound,
}

/// CRUD over [`TokenRecord`] plus the revoke-all watermark.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Upsert by `token_id`.
    async fn put(&self, record: &TokenRecord) -> Result<()>;

    async fn get(&self, token_id: &str) -> Result<Lookup>;

    /// Idempotent: deleting a missing id is not an error.
    async fn delete(&self, token_id: &str) -> Result<()>;

    /// All live records for one user. May be a scan; callers tolerate O(n)
    /// and eventual completeness.
    async fn list_by_user(&self, user_id: &str) -> Result<Vec<TokenRecord>>;

    /// Record the revoke-all instant for a user. Access tokens issued before
    /// it are invalid regardless of their own record.
    async fn set_revocation_watermark(&self, user_id: &str, at: DateTime<Utc>) -> Result<()>;

    async fn revocation_watermark(&self, user_id: &str) -> Result<Option<DateTime<Utc>>>;

    /// Remove expired records. Advisory for backends with native TTL
    /// expiry; returns the number of records actually removed.
    async fn cleanup_expired(&self) -> Result<u64>;
}
