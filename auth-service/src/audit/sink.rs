//! Audit sinks and alert channels
//!
//! The Redis sink writes each event under its own key with a retention TTL,
//! so expiry is the store's job. Alerts go out over Redis pub/sub,
//! fire-and-forget.

use super::{Alert, SecurityEvent};
use anyhow::{Context, Result};
use async_trait::async_trait;
use redis_conn::{with_timeout, SharedConnectionManager};
use tokio::sync::RwLock;

const EVENT_KEY_PREFIX: &str = "draftpress:audit:event";
const ALERT_CHANNEL: &str = "draftpress:security:alerts";

/// Append-only event sink.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, event: &SecurityEvent) -> Result<()>;

    /// Advisory retention sweep; TTL-backed sinks have nothing to do.
    async fn cleanup(&self) -> Result<()>;
}

/// Fire-and-forget notification channel.
#[async_trait]
pub trait AlertPublisher: Send + Sync {
    async fn publish(&self, alert: &Alert) -> Result<()>;
}

pub struct RedisAuditSink {
    redis: SharedConnectionManager,
    retention_secs: i64,
}

impl RedisAuditSink {
    pub fn new(redis: SharedConnectionManager, retention_days: u32) -> Self {
        Self {
            redis,
            retention_secs: i64::from(retention_days) * 24 * 60 * 60,
        }
    }
}

#[async_trait]
impl AuditSink for RedisAuditSink {
    async fn append(&self, event: &SecurityEvent) -> Result<()> {
        let key = format!("{EVENT_KEY_PREFIX}:{}", event.id);
        let payload = serde_json::to_string(event).context("event serialization failed")?;

        let mut conn = self.redis.lock().await.clone();
        with_timeout(async {
            redis::cmd("SET")
                .arg(&key)
                .arg(&payload)
                .arg("EX")
                .arg(self.retention_secs)
                .query_async::<_, ()>(&mut conn)
                .await
        })
        .await
        .context("audit event write failed")?;

        Ok(())
    }

    async fn cleanup(&self) -> Result<()> {
        tracing::debug!("audit retention is TTL-enforced; cleanup is a no-op");
        Ok(())
    }
}

pub struct RedisAlertPublisher {
    redis: SharedConnectionManager,
}

impl RedisAlertPublisher {
    pub fn new(redis: SharedConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl AlertPublisher for RedisAlertPublisher {
    async fn publish(&self, alert: &Alert) -> Result<()> {
        let payload = serde_json::to_string(alert).context("alert serialization failed")?;

        let mut conn = self.redis.lock().await.clone();
        with_timeout(async {
            redis::cmd("PUBLISH")
                .arg(ALERT_CHANNEL)
                .arg(&payload)
                .query_async::<_, ()>(&mut conn)
                .await
        })
        .await
        .context("alert publish failed")?;

        Ok(())
    }
}

/// In-memory sink for tests; records are inspectable.
#[derive(Default)]
pub struct MemoryAuditSink {
    events: RwLock<Vec<SecurityEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<SecurityEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, event: &SecurityEvent) -> Result<()> {
        self.events.write().await.push(event.clone());
        Ok(())
    }

    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }
}

/// In-memory alert channel for tests.
#[derive(Default)]
pub struct MemoryAlertPublisher {
    alerts: RwLock<Vec<Alert>>,
}

impl MemoryAlertPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn alerts(&self) -> Vec<Alert> {
        self.alerts.read().await.clone()
    }
}

#[async_trait]
impl AlertPublisher for MemoryAlertPublisher {
    async fn publish(&self, alert: &Alert) -> Result<()> {
        self.alerts.write().await.push(alert.clone());
        Ok(())
    }
}
