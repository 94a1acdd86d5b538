//! Secret configuration store with caching and rotation support
//!
//! Narrow interface over a managed secret store: fetch a named JSON blob,
//! create or update it. The AWS Secrets Manager implementation adds a TTL
//! cache so hot paths never hit the network; the in-memory implementation
//! backs tests and local development.
//!
//! # Example
//!
//! ```no_run
//! use secret_store::{AwsSecretStore, SecretsProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = AwsSecretStore::new().await?;
//!     let bundle = store.get_secret("prod/auth/jwt-secrets").await?;
//!     println!("fetched {} bytes", bundle.len());
//!     Ok(())
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_secretsmanager::Client as SecretsClient;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum SecretError {
    #[error("Secret not found: {0}")]
    NotFound(String),

    #[error("Access denied to secret: {0}")]
    AccessDenied(String),

    #[error("Invalid secret format: {0}")]
    InvalidFormat(String),

    #[error("Secret store error: {0}")]
    Backend(String),
}

/// Signing material for the token service: one secret per token class.
/// Compromise of the access secret must not unlock refresh tokens, so the
/// two are never derived from each other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtSecretBundle {
    pub access_secret: String,
    pub refresh_secret: String,
    pub issuer: String,
    pub rotated_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl JwtSecretBundle {
    pub fn from_json(json: &str) -> Result<Self, SecretError> {
        serde_json::from_str(json).map_err(|e| {
            SecretError::InvalidFormat(format!("failed to parse JWT secret bundle: {e}"))
        })
    }

    pub fn to_json(&self) -> Result<String, SecretError> {
        serde_json::to_string(self).map_err(|e| {
            SecretError::InvalidFormat(format!("failed to serialize JWT secret bundle: {e}"))
        })
    }
}

/// Narrow secret-store contract consumed by the security config service.
#[async_trait]
pub trait SecretsProvider: Send + Sync {
    /// Fetch a named secret blob.
    async fn get_secret(&self, name: &str) -> Result<String, SecretError>;

    /// Create the secret if it does not exist, otherwise replace its value.
    async fn put_secret(&self, name: &str, value: &str) -> Result<(), SecretError>;

    /// Drop any cached value for `name`; the next read refetches.
    async fn invalidate(&self, name: &str);

    /// Drop every cached value.
    async fn invalidate_all(&self);
}

/// AWS Secrets Manager client with a TTL cache in front of it.
pub struct AwsSecretStore {
    client: SecretsClient,
    cache: Cache<String, String>,
}

impl AwsSecretStore {
    /// Create a store with the default 5 minute cache TTL.
    ///
    /// AWS credentials come from the environment, the credentials file, or
    /// the instance/pod role, in the SDK's usual resolution order.
    pub async fn new() -> Result<Self> {
        Self::with_cache_ttl(Duration::from_secs(300)).await
    }

    pub async fn with_cache_ttl(cache_ttl: Duration) -> Result<Self> {
        let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        let client = SecretsClient::new(&config);

        let cache = Cache::builder()
            .max_capacity(100)
            .time_to_live(cache_ttl)
            .build();

        info!(ttl = ?cache_ttl, "initialized AWS secret store");
        Ok(Self { client, cache })
    }

    async fn fetch(&self, name: &str) -> Result<String, SecretError> {
        let response = self
            .client
            .get_secret_value()
            .secret_id(name)
            .send()
            .await
            .map_err(|e| classify_aws_error(name, &e.to_string()))?;

        let value = response
            .secret_string()
            .ok_or_else(|| {
                SecretError::InvalidFormat("secret is binary, not string".to_string())
            })?
            .to_string();

        self.cache.insert(name.to_string(), value.clone()).await;
        debug!(secret_name = %name, "secret fetched and cached");
        Ok(value)
    }
}

fn classify_aws_error(name: &str, message: &str) -> SecretError {
    if message.contains("ResourceNotFoundException") {
        SecretError::NotFound(name.to_string())
    } else if message.contains("AccessDeniedException") {
        SecretError::AccessDenied(name.to_string())
    } else {
        SecretError::Backend(message.to_string())
    }
}

#[async_trait]
impl SecretsProvider for AwsSecretStore {
    async fn get_secret(&self, name: &str) -> Result<String, SecretError> {
        if let Some(cached) = self.cache.get(name).await {
            debug!(secret_name = %name, "secret served from cache");
            return Ok(cached);
        }
        self.fetch(name).await
    }

    async fn put_secret(&self, name: &str, value: &str) -> Result<(), SecretError> {
        // Update first; fall back to create when the secret has never existed.
        let update = self
            .client
            .update_secret()
            .secret_id(name)
            .secret_string(value)
            .send()
            .await;

        if let Err(e) = update {
            let message = e.to_string();
            if !message.contains("ResourceNotFoundException") {
                return Err(classify_aws_error(name, &message));
            }
            self.client
                .create_secret()
                .name(name)
                .secret_string(value)
                .send()
                .await
                .map_err(|e| classify_aws_error(name, &e.to_string()))?;
        }

        self.cache.invalidate(name).await;
        info!(secret_name = %name, "secret written");
        Ok(())
    }

    async fn invalidate(&self, name: &str) {
        self.cache.invalidate(name).await;
        info!(secret_name = %name, "secret cache invalidated");
    }

    async fn invalidate_all(&self) {
        self.cache.invalidate_all();
        info!("all secret caches invalidated");
    }
}

/// In-memory provider for tests and local development. No TTL: values are
/// visible immediately after `put_secret`.
#[derive(Default)]
pub struct MemorySecretStore {
    secrets: tokio::sync::RwLock<HashMap<String, String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(self, name: &str, value: &str) -> Self {
        self.secrets
            .write()
            .await
            .insert(name.to_string(), value.to_string());
        self
    }
}

#[async_trait]
impl SecretsProvider for MemorySecretStore {
    async fn get_secret(&self, name: &str) -> Result<String, SecretError> {
        self.secrets
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| SecretError::NotFound(name.to_string()))
    }

    async fn put_secret(&self, name: &str, value: &str) -> Result<(), SecretError> {
        self.secrets
            .write()
            .await
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    async fn invalidate(&self, _name: &str) {}

    async fn invalidate_all(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jwt_bundle_parsing() {
        let json = r#"{
            "access_secret": "access-key-material",
            "refresh_secret": "refresh-key-material",
            "issuer": "draftpress",
            "rotated_at": null
        }"#;

        let bundle = JwtSecretBundle::from_json(json).unwrap();
        assert_eq!(bundle.access_secret, "access-key-material");
        assert_eq!(bundle.refresh_secret, "refresh-key-material");
        assert_eq!(bundle.issuer, "draftpress");
        assert!(bundle.rotated_at.is_none());
    }

    #[test]
    fn jwt_bundle_parsing_invalid() {
        assert!(JwtSecretBundle::from_json(r#"{"invalid": "json"}"#).is_err());
    }

    #[test]
    fn jwt_bundle_round_trip() {
        let bundle = JwtSecretBundle {
            access_secret: "a".to_string(),
            refresh_secret: "r".to_string(),
            issuer: "draftpress".to_string(),
            rotated_at: Some(chrono::Utc::now()),
        };
        let parsed = JwtSecretBundle::from_json(&bundle.to_json().unwrap()).unwrap();
        assert_eq!(parsed.access_secret, "a");
        assert_eq!(parsed.refresh_secret, "r");
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemorySecretStore::new();
        assert!(matches!(
            store.get_secret("missing").await,
            Err(SecretError::NotFound(_))
        ));

        store.put_secret("auth/jwt", "{}").await.unwrap();
        assert_eq!(store.get_secret("auth/jwt").await.unwrap(), "{}");
    }
}
