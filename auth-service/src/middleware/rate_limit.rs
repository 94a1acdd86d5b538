use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use async_trait::async_trait;
use futures::future::{ready, Ready};
use redis::AsyncCommands;
use redis_conn::SharedConnectionManager;
use serde_json::json;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::audit::{AuditLogger, EventType, SecurityEvent};
use crate::config::RateLimitSettings;
use crate::error::AuthError;
use crate::middleware::auth::RequestMeta;
use crate::security::jwt::AccessClaims;

/// Counter timeout is far below the general Redis ceiling; a slow counter
/// must not stall every request.
const COUNTER_TIMEOUT: Duration = Duration::from_millis(100);

/// Fixed-window request counter keyed by caller identity.
#[async_trait]
pub trait RateCounter: Send + Sync {
    /// Increment the window counter for `key` and return the new count.
    /// The window starts with the first hit and resets after `window`.
    async fn increment(&self, key: &str, window: Duration) -> anyhow::Result<u64>;
}

pub struct RedisRateCounter {
    redis: SharedConnectionManager,
}

impl RedisRateCounter {
    pub fn new(redis: SharedConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl RateCounter for RedisRateCounter {
    async fn increment(&self, key: &str, window: Duration) -> anyhow::Result<u64> {
        let mut conn = self.redis.lock().await.clone();
        let key = format!("draftpress:ratelimit:{key}");
        let window_secs = window.as_secs() as i64;

        let count: u64 = redis_conn::with_timeout_for(COUNTER_TIMEOUT, async {
            let count: u64 = conn.incr(&key, 1).await?;
            if count == 1 {
                let _: () = conn.expire(&key, window_secs).await?;
            }
            Ok(count)
        })
        .await?;

        Ok(count)
    }
}

/// In-memory fixed-window counter for tests and single-process dev runs.
#[derive(Default)]
pub struct MemoryRateCounter {
    windows: RwLock<HashMap<String, (u64, Instant)>>,
}

impl MemoryRateCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateCounter for MemoryRateCounter {
    async fn increment(&self, key: &str, window: Duration) -> anyhow::Result<u64> {
        let mut windows = self.windows.write().await;
        let now = Instant::now();
        let entry = windows.entry(key.to_string()).or_insert((0, now));

        if now.duration_since(entry.1) >= window {
            *entry = (0, now);
        }
        entry.0 += 1;
        Ok(entry.0)
    }
}

/// Fixed-window rate limiting. Authenticated callers are keyed by user id
/// with the higher threshold; anonymous callers by client IP with the lower
/// one. Counter failures and timeouts fail open so the limiter is never a
/// single point of failure.
pub struct RateLimit {
    counter: Arc<dyn RateCounter>,
    audit: Arc<AuditLogger>,
    policy: RateLimitSettings,
}

impl RateLimit {
    pub fn new(
        counter: Arc<dyn RateCounter>,
        audit: Arc<AuditLogger>,
        policy: RateLimitSettings,
    ) -> Self {
        Self {
            counter,
            audit,
            policy,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = RateLimitService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitService {
            service: Rc::new(service),
            counter: self.counter.clone(),
            audit: self.audit.clone(),
            policy: self.policy.clone(),
        }))
    }
}

pub struct RateLimitService<S> {
    service: Rc<S>,
    counter: Arc<dyn RateCounter>,
    audit: Arc<AuditLogger>,
    policy: RateLimitSettings,
}

impl<S, B> Service<ServiceRequest> for RateLimitService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let counter = self.counter.clone();
        let audit = self.audit.clone();
        let policy = self.policy.clone();

        Box::pin(async move {
            let meta = RequestMeta::capture(&req);
            let (key, user_id, limit) = {
                let extensions = req.extensions();
                match extensions.get::<AccessClaims>() {
                    Some(claims) => (
                        format!("user:{}", claims.sub),
                        Some(claims.sub.clone()),
                        policy.authenticated_max_requests as u64,
                    ),
                    None => (
                        format!("ip:{}", meta.source_ip),
                        None,
                        policy.anonymous_max_requests as u64,
                    ),
                }
            };
            let window = Duration::from_secs(policy.window_minutes * 60);

            match counter.increment(&key, window).await {
                Ok(count) => {
                    let mut check = meta.apply(
                        SecurityEvent::new(EventType::RateLimitCheck).metadata(json!({
                            "limit": limit,
                            "windowMinutes": policy.window_minutes,
                            "count": count,
                        })),
                    );
                    if let Some(id) = &user_id {
                        check = check.user_id(id.clone());
                    }
                    audit.log_security_event(check).await;

                    if count > limit {
                        let mut exceeded = meta.apply(
                            SecurityEvent::new(EventType::RateLimitExceeded).metadata(json!({
                                "limit": limit,
                                "windowMinutes": policy.window_minutes,
                                "count": count,
                            })),
                        );
                        if let Some(id) = &user_id {
                            exceeded = exceeded.user_id(id.clone());
                        }
                        audit.log_security_event(exceeded).await;

                        tracing::warn!(key = %key, count, limit, "rate limit exceeded");
                        return Err(AuthError::RateLimited.into());
                    }
                }
                Err(err) => {
                    // Fail open: a broken counter degrades to no limiting.
                    tracing::warn!(key = %key, error = %err, "rate counter unavailable, allowing request");
                }
            }

            service.call(req).await
        })
    }
}
