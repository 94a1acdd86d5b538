//! Security configuration service
//!
//! Glue between the managed secret store and the components that consume
//! policy: JWT secrets, password policy, rate-limit thresholds, CORS
//! allow-list, session lifetimes. The cache is injected state with an
//! explicit TTL, never a module-level global, so tests control staleness by
//! constructing the service with the TTL they need.

use crate::config::{CorsSettings, PasswordPolicy, RateLimitSettings, SessionSettings, Settings};
use crate::error::{AuthError, Result};
use chrono::Utc;
use moka::future::Cache;
use rand::distributions::Alphanumeric;
use rand::Rng;
use secret_store::{JwtSecretBundle, SecretsProvider};
use std::sync::Arc;
use std::time::Duration;

const JWT_CACHE_KEY: &str = "jwt-secrets";
const ROTATED_SECRET_LEN: usize = 64;

pub struct SecurityConfigService {
    provider: Arc<dyn SecretsProvider>,
    settings: Settings,
    cache: Cache<String, Arc<JwtSecretBundle>>,
}

impl SecurityConfigService {
    /// `cache_ttl` bounds how stale a fetched secret bundle can get; after
    /// rotation the new material is picked up within one TTL at worst.
    pub fn new(provider: Arc<dyn SecretsProvider>, settings: Settings, cache_ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(16)
            .time_to_live(cache_ttl)
            .build();

        Self {
            provider,
            settings,
            cache,
        }
    }

    /// Current signing secrets. Secret-store first, env fallback.
    pub async fn jwt_secrets(&self) -> Result<JwtSecretBundle> {
        if let Some(cached) = self.cache.get(JWT_CACHE_KEY).await {
            return Ok((*cached).clone());
        }

        let bundle = self.load_jwt_secrets().await?;
        self.cache
            .insert(JWT_CACHE_KEY.to_string(), Arc::new(bundle.clone()))
            .await;
        Ok(bundle)
    }

    async fn load_jwt_secrets(&self) -> Result<JwtSecretBundle> {
        if let Some(name) = &self.settings.jwt.secret_name {
            let json = self.provider.get_secret(name).await?;
            let bundle = JwtSecretBundle::from_json(&json)?;
            tracing::info!(secret_name = %name, "JWT secrets loaded from secret store");
            return Ok(bundle);
        }

        // Development fallback: both secrets must be set and distinct, or
        // access-token compromise would unlock refresh tokens.
        let access = self
            .settings
            .jwt
            .access_secret
            .clone()
            .ok_or_else(|| {
                AuthError::Internal(
                    "ACCESS_TOKEN_SECRET must be set when no secret store is configured"
                        .to_string(),
                )
            })?;
        let refresh = self
            .settings
            .jwt
            .refresh_secret
            .clone()
            .ok_or_else(|| {
                AuthError::Internal(
                    "REFRESH_TOKEN_SECRET must be set when no secret store is configured"
                        .to_string(),
                )
            })?;
        if access == refresh {
            return Err(AuthError::Internal(
                "access and refresh token secrets must differ".to_string(),
            ));
        }

        Ok(JwtSecretBundle {
            access_secret: access,
            refresh_secret: refresh,
            issuer: self.settings.jwt.issuer.clone(),
            rotated_at: None,
        })
    }

    /// Generate fresh random secrets, write them back through the secret
    /// store, and drop the cached bundle. Already-issued tokens stay valid
    /// only for processes still holding the old material; there is no
    /// dual-secret grace window.
    pub async fn rotate_jwt_secrets(&self) -> Result<JwtSecretBundle> {
        let name = self.settings.jwt.secret_name.as_ref().ok_or_else(|| {
            AuthError::Internal("secret rotation requires a configured secret store".to_string())
        })?;

        let bundle = JwtSecretBundle {
            access_secret: random_secret(),
            refresh_secret: random_secret(),
            issuer: self.settings.jwt.issuer.clone(),
            rotated_at: Some(Utc::now()),
        };

        self.provider.put_secret(name, &bundle.to_json()?).await?;
        self.cache.invalidate(JWT_CACHE_KEY).await;

        tracing::warn!(secret_name = %name, "JWT secrets rotated");
        Ok(bundle)
    }

    pub fn password_policy(&self) -> &PasswordPolicy {
        &self.settings.password_policy
    }

    pub fn rate_limit_policy(&self) -> &RateLimitSettings {
        &self.settings.rate_limit
    }

    pub fn cors_policy(&self) -> &CorsSettings {
        &self.settings.cors
    }

    pub fn session_policy(&self) -> &SessionSettings {
        &self.settings.sessions
    }

    /// Drop every cached value here and in the provider; the next read
    /// refetches from the authoritative store.
    pub async fn clear_cache(&self) {
        self.cache.invalidate_all();
        self.provider.invalidate_all().await;
    }
}

fn random_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ROTATED_SECRET_LEN)
        .map(char::from)
        .collect()
}
