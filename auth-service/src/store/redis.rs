//! Redis-backed token store
//!
//! Records are JSON values with a per-key TTL matching the token expiry, so
//! the backing store enforces natural expiry itself and `cleanup_expired` is
//! advisory. A per-user set is kept as the secondary index for revoke-all;
//! stale members (whose record key already expired) are pruned on read.

use super::{Lookup, TokenRecord, TokenStore};
use crate::error::{AuthError, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use redis_conn::{with_timeout, SharedConnectionManager};

const KEY_PREFIX: &str = "draftpress";

pub struct RedisTokenStore {
    redis: SharedConnectionManager,
}

impl RedisTokenStore {
    pub fn new(redis: SharedConnectionManager) -> Self {
        Self { redis }
    }

    fn record_key(token_id: &str) -> String {
        format!("{KEY_PREFIX}:token:{token_id}")
    }

    fn user_index_key(user_id: &str) -> String {
        format!("{KEY_PREFIX}:user:{user_id}:tokens")
    }

    fn watermark_key(user_id: &str) -> String {
        format!("{KEY_PREFIX}:revoked:user:{user_id}:ts")
    }

    fn remaining_ttl(record: &TokenRecord) -> i64 {
        (record.expires_at - Utc::now()).num_seconds().max(1)
    }
}

#[async_trait]
impl TokenStore for RedisTokenStore {
    async fn put(&self, record: &TokenRecord) -> Result<()> {
        let payload = serde_json::to_string(record)
            .map_err(|e| AuthError::Internal(format!("record serialization failed: {e}")))?;
        let ttl = Self::remaining_ttl(record);
        let key = Self::record_key(&record.token_id);
        let index = Self::user_index_key(&record.user_id);

        let mut conn = self.redis.lock().await.clone();
        with_timeout(async {
            redis::pipe()
                .cmd("SET")
                .arg(&key)
                .arg(&payload)
                .arg("EX")
                .arg(ttl)
                .ignore()
                .cmd("SADD")
                .arg(&index)
                .arg(&record.token_id)
                .ignore()
                // Index lives as long as the longest-lived member can.
                .cmd("EXPIRE")
                .arg(&index)
                .arg(ttl)
                .arg("GT")
                .ignore()
                .query_async::<_, ()>(&mut conn)
                .await
        })
        .await?;

        Ok(())
    }

    async fn get(&self, token_id: &str) -> Result<Lookup> {
        let key = Self::record_key(token_id);

        let mut conn = self.redis.lock().await.clone();
        let payload: Option<String> = with_timeout(async {
            redis::cmd("GET").arg(&key).query_async(&mut conn).await
        })
        .await?;

        match payload {
            Some(json) => {
                let record: TokenRecord = serde_json::from_str(&json).map_err(|e| {
                    AuthError::Storage(format!("corrupt token record {token_id}: {e}"))
                })?;
                Ok(Lookup::Found(record))
            }
            None => Ok(Lookup::NotFound),
        }
    }

    async fn delete(&self, token_id: &str) -> Result<()> {
        // The user index entry is left behind; list_by_user prunes it.
        let key = Self::record_key(token_id);

        let mut conn = self.redis.lock().await.clone();
        with_timeout(async {
            redis::cmd("DEL")
                .arg(&key)
                .query_async::<_, ()>(&mut conn)
                .await
        })
        .await?;

        Ok(())
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<TokenRecord>> {
        let index = Self::user_index_key(user_id);

        let mut conn = self.redis.lock().await.clone();
        let token_ids: Vec<String> = with_timeout(async {
            redis::cmd("SMEMBERS")
                .arg(&index)
                .query_async(&mut conn)
                .await
        })
        .await?;

        let mut records = Vec::with_capacity(token_ids.len());
        let mut stale = Vec::new();
        for token_id in token_ids {
            match self.get(&token_id).await? {
                Lookup::Found(record) => records.push(record),
                Lookup::NotFound => stale.push(token_id),
            }
        }

        if !stale.is_empty() {
            let mut conn = self.redis.lock().await.clone();
            with_timeout(async {
                redis::cmd("SREM")
                    .arg(&index)
                    .arg(&stale)
                    .query_async::<_, ()>(&mut conn)
                    .await
            })
            .await?;
        }

        Ok(records)
    }

    async fn set_revocation_watermark(&self, user_id: &str, at: DateTime<Utc>) -> Result<()> {
        let key = Self::watermark_key(user_id);

        let mut conn = self.redis.lock().await.clone();
        with_timeout(async {
            redis::cmd("SET")
                .arg(&key)
                .arg(at.timestamp())
                .arg("EX")
                // Outlives the longest refresh token (7 days).
                .arg(7 * 24 * 60 * 60)
                .query_async::<_, ()>(&mut conn)
                .await
        })
        .await?;

        Ok(())
    }

    async fn revocation_watermark(&self, user_id: &str) -> Result<Option<DateTime<Utc>>> {
        let key = Self::watermark_key(user_id);

        let mut conn = self.redis.lock().await.clone();
        let secs: Option<i64> = with_timeout(async {
            redis::cmd("GET").arg(&key).query_async(&mut conn).await
        })
        .await?;

        Ok(secs.and_then(|s| Utc.timestamp_opt(s, 0).single()))
    }

    async fn cleanup_expired(&self) -> Result<u64> {
        // Record keys carry their own TTL; nothing to sweep.
        tracing::debug!("token record expiry is TTL-enforced; cleanup is a no-op");
        Ok(0)
    }
}
