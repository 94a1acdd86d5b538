use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::Client;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration};
use tracing::info;

/// Shared Redis connection manager guarded by a Tokio mutex.
///
/// `ConnectionManager` is `Clone` (clones share the underlying multiplexed
/// connection), so callers lock, clone a handle, and release the guard before
/// issuing commands.
pub type SharedConnectionManager = Arc<Mutex<ConnectionManager>>;

/// Default ceiling for any single Redis round trip. A hung store must never
/// hang the request path.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(2);

/// Connect to Redis and wrap the connection manager for sharing.
pub async fn connect(redis_url: &str) -> Result<SharedConnectionManager> {
    let client = Client::open(redis_url).context("failed to construct Redis client")?;
    let manager = ConnectionManager::new(client)
        .await
        .context("failed to initialize Redis connection manager")?;

    info!("Redis connection manager initialized");
    Ok(Arc::new(Mutex::new(manager)))
}

/// Run a Redis operation under the default bounded timeout.
pub async fn with_timeout<F, T>(op: F) -> Result<T, redis::RedisError>
where
    F: Future<Output = Result<T, redis::RedisError>>,
{
    with_timeout_for(DEFAULT_OP_TIMEOUT, op).await
}

/// Run a Redis operation under an explicit timeout.
pub async fn with_timeout_for<F, T>(
    limit: Duration,
    op: F,
) -> Result<T, redis::RedisError>
where
    F: Future<Output = Result<T, redis::RedisError>>,
{
    match timeout(limit, op).await {
        Ok(result) => result,
        Err(_) => Err(redis::RedisError::from((
            redis::ErrorKind::IoError,
            "redis operation timed out",
        ))),
    }
}

/// Liveness probe. Errors if the connection is down or slower than the
/// default operation timeout.
pub async fn ping(manager: &SharedConnectionManager) -> Result<()> {
    let mut conn = manager.lock().await.clone();
    let pong: String = with_timeout(async {
        redis::cmd("PING").query_async(&mut conn).await
    })
    .await
    .context("redis ping failed")?;

    anyhow::ensure!(pong == "PONG", "unexpected PING reply: {pong}");
    Ok(())
}
