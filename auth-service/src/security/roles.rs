//! Role resolution
//!
//! Authorization needs an external role source; nothing in the token claims
//! carries roles. `RoleProvider` is that seam. The Redis provider reads the
//! per-user role set maintained by the account-management collaborator; a
//! user with no stored roles resolves to the baseline `user` role so
//! freshly-issued identities are not locked out of user-level routes.

use crate::error::Result;
use async_trait::async_trait;
use redis_conn::{with_timeout, SharedConnectionManager};
use std::collections::{HashMap, HashSet};

pub const BASELINE_ROLE: &str = "user";

#[async_trait]
pub trait RoleProvider: Send + Sync {
    async fn get_roles(&self, user_id: &str) -> Result<HashSet<String>>;
}

pub struct RedisRoleProvider {
    redis: SharedConnectionManager,
}

impl RedisRoleProvider {
    pub fn new(redis: SharedConnectionManager) -> Self {
        Self { redis }
    }

    fn key(user_id: &str) -> String {
        format!("draftpress:roles:{user_id}")
    }
}

#[async_trait]
impl RoleProvider for RedisRoleProvider {
    async fn get_roles(&self, user_id: &str) -> Result<HashSet<String>> {
        let key = Self::key(user_id);

        let mut conn = self.redis.lock().await.clone();
        let mut roles: HashSet<String> = with_timeout(async {
            redis::cmd("SMEMBERS").arg(&key).query_async(&mut conn).await
        })
        .await?;

        if roles.is_empty() {
            roles.insert(BASELINE_ROLE.to_string());
        }
        Ok(roles)
    }
}

/// Fixed role table for tests and single-tenant deployments.
#[derive(Default)]
pub struct FixedRoleProvider {
    roles: HashMap<String, HashSet<String>>,
}

impl FixedRoleProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(mut self, user_id: &str, roles: &[&str]) -> Self {
        self.roles.insert(
            user_id.to_string(),
            roles.iter().map(|r| r.to_string()).collect(),
        );
        self
    }
}

#[async_trait]
impl RoleProvider for FixedRoleProvider {
    async fn get_roles(&self, user_id: &str) -> Result<HashSet<String>> {
        Ok(self.roles.get(user_id).cloned().unwrap_or_else(|| {
            HashSet::from([BASELINE_ROLE.to_string()])
        }))
    }
}
