//! Configuration management for the auth service
//!
//! Loads settings from:
//! 1. AWS Secrets Manager (production, via `secret-store`)
//! 2. Environment variables (development fallback)
//! 3. .env file (local development)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use tracing::info;

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub redis: RedisSettings,
    pub jwt: JwtSettings,
    pub cors: CorsSettings,
    pub rate_limit: RateLimitSettings,
    pub password_policy: PasswordPolicy,
    pub sessions: SessionSettings,
    pub audit: AuditSettings,
}

impl Settings {
    /// Load settings from the environment. JWT secrets may instead come from
    /// the managed secret store at runtime; see `SecurityConfigService`.
    pub fn load() -> Result<Self> {
        if cfg!(debug_assertions) {
            dotenvy::dotenv().ok();
            info!("Loaded .env file for development");
        }

        Ok(Settings {
            server: ServerSettings::from_env()?,
            redis: RedisSettings::from_env()?,
            jwt: JwtSettings::from_env(),
            cors: CorsSettings::from_env(),
            rate_limit: RateLimitSettings::from_env()?,
            password_policy: PasswordPolicy::from_env()?,
            sessions: SessionSettings::from_env()?,
            audit: AuditSettings::from_env()?,
        })
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid SERVER_PORT")?,
        })
    }
}

/// Redis backing store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSettings {
    pub url: String,
}

impl RedisSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            url: env::var("REDIS_URL").context("REDIS_URL must be set")?,
        })
    }
}

/// JWT secret sourcing. When `secret_name` is set the bundle is fetched from
/// the managed secret store; otherwise the two env secrets are required.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtSettings {
    pub secret_name: Option<String>,
    pub access_secret: Option<String>,
    pub refresh_secret: Option<String>,
    pub issuer: String,
}

impl JwtSettings {
    fn from_env() -> Self {
        Self {
            secret_name: env::var("AWS_SECRETS_JWT_NAME").ok(),
            access_secret: env::var("ACCESS_TOKEN_SECRET").ok(),
            refresh_secret: env::var("REFRESH_TOKEN_SECRET").ok(),
            issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "draftpress".to_string()),
        }
    }
}

/// CORS allow-list configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsSettings {
    pub allowed_origins: Vec<String>,
}

impl CorsSettings {
    fn from_env() -> Self {
        let raw = env::var("CORS_ALLOWED_ORIGINS").unwrap_or_else(|_| "*".to_string());
        Self {
            allowed_origins: raw.split(',').map(|s| s.trim().to_string()).collect(),
        }
    }

    pub fn allows_any(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }
}

/// Rate limit thresholds, split by whether the caller authenticated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub authenticated_max_requests: u32,
    pub anonymous_max_requests: u32,
    pub window_minutes: u64,
}

impl RateLimitSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            authenticated_max_requests: env::var("RATE_LIMIT_AUTHENTICATED_MAX")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .context("Invalid RATE_LIMIT_AUTHENTICATED_MAX")?,
            anonymous_max_requests: env::var("RATE_LIMIT_ANONYMOUS_MAX")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .context("Invalid RATE_LIMIT_ANONYMOUS_MAX")?,
            window_minutes: env::var("RATE_LIMIT_WINDOW_MINUTES")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .context("Invalid RATE_LIMIT_WINDOW_MINUTES")?,
        })
    }
}

/// Password policy. This core stores no passwords; the policy is exposed to
/// the account-management collaborators through `SecurityConfigService`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordPolicy {
    pub min_length: u32,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digit: bool,
    pub require_symbol: bool,
}

impl PasswordPolicy {
    fn from_env() -> Result<Self> {
        Ok(Self {
            min_length: env::var("PASSWORD_MIN_LENGTH")
                .unwrap_or_else(|_| "12".to_string())
                .parse()
                .context("Invalid PASSWORD_MIN_LENGTH")?,
            require_uppercase: env_flag("PASSWORD_REQUIRE_UPPERCASE", true),
            require_lowercase: env_flag("PASSWORD_REQUIRE_LOWERCASE", true),
            require_digit: env_flag("PASSWORD_REQUIRE_DIGIT", true),
            require_symbol: env_flag("PASSWORD_REQUIRE_SYMBOL", false),
        })
    }
}

/// Token lifetimes and concurrent-session ceiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
    pub max_concurrent_sessions: u32,
}

impl SessionSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            access_ttl_secs: env::var("SESSION_ACCESS_TTL_SECS")
                .unwrap_or_else(|_| "900".to_string())
                .parse()
                .context("Invalid SESSION_ACCESS_TTL_SECS")?,
            refresh_ttl_secs: env::var("SESSION_REFRESH_TTL_SECS")
                .unwrap_or_else(|_| "604800".to_string())
                .parse()
                .context("Invalid SESSION_REFRESH_TTL_SECS")?,
            max_concurrent_sessions: env::var("SESSION_MAX_CONCURRENT")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("Invalid SESSION_MAX_CONCURRENT")?,
        })
    }
}

/// Audit sink retention
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSettings {
    pub retention_days: u32,
}

impl AuditSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            retention_days: env::var("AUDIT_RETENTION_DAYS")
                .unwrap_or_else(|_| "90".to_string())
                .parse()
                .context("Invalid AUDIT_RETENTION_DAYS")?,
        })
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_defaults() {
        env::remove_var("RATE_LIMIT_AUTHENTICATED_MAX");
        env::remove_var("RATE_LIMIT_ANONYMOUS_MAX");
        env::remove_var("RATE_LIMIT_WINDOW_MINUTES");

        let settings = RateLimitSettings::from_env().unwrap();
        assert_eq!(settings.authenticated_max_requests, 100);
        assert_eq!(settings.anonymous_max_requests, 20);
        assert_eq!(settings.window_minutes, 15);
    }

    #[test]
    fn session_defaults_match_token_policy() {
        env::remove_var("SESSION_ACCESS_TTL_SECS");
        env::remove_var("SESSION_REFRESH_TTL_SECS");

        let settings = SessionSettings::from_env().unwrap();
        assert_eq!(settings.access_ttl_secs, 900); // 15 minutes
        assert_eq!(settings.refresh_ttl_secs, 604_800); // 7 days
    }

    #[test]
    fn cors_wildcard_detection() {
        env::set_var("CORS_ALLOWED_ORIGINS", "*");
        assert!(CorsSettings::from_env().allows_any());

        env::set_var("CORS_ALLOWED_ORIGINS", "https://app.draftpress.io");
        let settings = CorsSettings::from_env();
        assert!(!settings.allows_any());
        assert_eq!(settings.allowed_origins, vec!["https://app.draftpress.io"]);

        env::remove_var("CORS_ALLOWED_ORIGINS");
    }

    #[test]
    fn password_policy_defaults() {
        env::remove_var("PASSWORD_MIN_LENGTH");
        let policy = PasswordPolicy::from_env().unwrap();
        assert_eq!(policy.min_length, 12);
        assert!(policy.require_uppercase);
        assert!(!policy.require_symbol);
    }
}
