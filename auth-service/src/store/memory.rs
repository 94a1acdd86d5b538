//! In-memory token store for tests and single-process development.

use super::{Lookup, TokenRecord, TokenStore};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryTokenStore {
    records: RwLock<HashMap<String, TokenRecord>>,
    watermarks: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn put(&self, record: &TokenRecord) -> Result<()> {
        self.records
            .write()
            .await
            .insert(record.token_id.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, token_id: &str) -> Result<Lookup> {
        let records = self.records.read().await;
        match records.get(token_id) {
            Some(record) if !record.is_expired(Utc::now()) => {
                Ok(Lookup::Found(record.clone()))
            }
            _ => Ok(Lookup::NotFound),
        }
    }

    async fn delete(&self, token_id: &str) -> Result<()> {
        self.records.write().await.remove(token_id);
        Ok(())
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<TokenRecord>> {
        let now = Utc::now();
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| r.user_id == user_id && !r.is_expired(now))
            .cloned()
            .collect())
    }

    async fn set_revocation_watermark(&self, user_id: &str, at: DateTime<Utc>) -> Result<()> {
        self.watermarks
            .write()
            .await
            .insert(user_id.to_string(), at);
        Ok(())
    }

    async fn revocation_watermark(&self, user_id: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.watermarks.read().await.get(user_id).copied())
    }

    async fn cleanup_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| !r.is_expired(now));
        Ok((before - records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(token_id: &str, user_id: &str, ttl_secs: i64) -> TokenRecord {
        let now = Utc::now();
        TokenRecord {
            token_id: token_id.to_string(),
            user_id: user_id.to_string(),
            email: format!("{user_id}@example.com"),
            token_type: "refresh".to_string(),
            created_at: now,
            expires_at: now + Duration::seconds(ttl_secs),
        }
    }

    #[tokio::test]
    async fn get_after_put_finds_record() {
        let store = MemoryTokenStore::new();
        let rec = record("t1", "u1", 60);
        store.put(&rec).await.unwrap();

        assert_eq!(store.get("t1").await.unwrap(), Lookup::Found(rec));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryTokenStore::new();
        store.put(&record("t1", "u1", 60)).await.unwrap();

        store.delete("t1").await.unwrap();
        store.delete("t1").await.unwrap();
        store.delete("never-existed").await.unwrap();

        assert_eq!(store.get("t1").await.unwrap(), Lookup::NotFound);
    }

    #[tokio::test]
    async fn expired_records_read_as_not_found() {
        let store = MemoryTokenStore::new();
        store.put(&record("t1", "u1", -5)).await.unwrap();

        assert_eq!(store.get("t1").await.unwrap(), Lookup::NotFound);
        assert!(store.list_by_user("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_by_user_filters_other_users() {
        let store = MemoryTokenStore::new();
        store.put(&record("t1", "u1", 60)).await.unwrap();
        store.put(&record("t2", "u1", 60)).await.unwrap();
        store.put(&record("t3", "u2", 60)).await.unwrap();

        let mut ids: Vec<String> = store
            .list_by_user("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.token_id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["t1", "t2"]);
    }

    #[tokio::test]
    async fn cleanup_sweeps_only_expired() {
        let store = MemoryTokenStore::new();
        store.put(&record("live", "u1", 60)).await.unwrap();
        store.put(&record("dead", "u1", -60)).await.unwrap();

        assert_eq!(store.cleanup_expired().await.unwrap(), 1);
        assert!(matches!(
            store.get("live").await.unwrap(),
            Lookup::Found(_)
        ));
    }

    #[tokio::test]
    async fn watermark_round_trip() {
        let store = MemoryTokenStore::new();
        assert_eq!(store.revocation_watermark("u1").await.unwrap(), None);

        let at = Utc::now();
        store.set_revocation_watermark("u1", at).await.unwrap();
        assert_eq!(store.revocation_watermark("u1").await.unwrap(), Some(at));
    }
}
