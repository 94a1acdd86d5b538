//! JWT issuance, verification, refresh and revocation
//!
//! The codec half signs and verifies compact HS256 tokens with the algorithm
//! pinned: verification builds its own `Validation` for HS256 and checks the
//! parsed header, so a token advertising any other algorithm (including
//! `none`) is rejected no matter what its payload says.
//!
//! Access and refresh tokens are signed with distinct secrets. A token pair
//! shares one `jti`; its stored record is the revocation anchor (absence
//! means revoked).

use crate::config::SessionSettings;
use crate::error::{AuthError, Result};
use crate::store::{Lookup, TokenRecord, TokenStore};
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secret_store::JwtSecretBundle;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// The single accepted algorithm. Never read from the token header.
const JWT_ALGORITHM: Algorithm = Algorithm::HS256;

pub const ACCESS_TOKEN_TTL_SECS: i64 = 15 * 60;
pub const REFRESH_TOKEN_TTL_SECS: i64 = 7 * 24 * 60 * 60;

const TOKEN_TYPE_ACCESS: &str = "access";
const TOKEN_TYPE_REFRESH: &str = "refresh";

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// User id.
    pub sub: String,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
    /// Shared pair id; the revocation-lookup key.
    pub jti: String,
    pub token_type: String,
}

/// Claims carried by a refresh token. Deliberately carries no email; the
/// stored record is the source of truth for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub token_type: String,
}

/// Issued token pair.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub token_type: String,
}

/// Result of exchanging a refresh token. The refresh token is not rotated.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshedAccessToken {
    pub access_token: String,
    pub expires_in: i64,
    pub token_type: String,
}

/// Codec-level verification failure. Internal detail: callers fold this into
/// the opaque `InvalidToken` error class and keep the reason for audit only.
#[derive(Debug, Clone, PartialEq)]
pub enum CodecError {
    Malformed,
    InvalidSignature,
    Expired,
    AlgorithmMismatch,
    Other(String),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Malformed => write!(f, "malformed token"),
            CodecError::InvalidSignature => write!(f, "signature verification failed"),
            CodecError::Expired => write!(f, "token expired"),
            CodecError::AlgorithmMismatch => write!(f, "unexpected signing algorithm"),
            CodecError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

/// Sign a claims object with the shared secret. Pure.
pub fn sign_claims<C: Serialize>(claims: &C, secret: &str) -> Result<String> {
    encode(
        &Header::new(JWT_ALGORITHM),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AuthError::Internal(format!("token signing failed: {e}")))
}

/// Verify signature + expiry and decode. Pure.
pub fn decode_claims<C: DeserializeOwned>(
    token: &str,
    secret: &str,
) -> std::result::Result<C, CodecError> {
    // Reject algorithm substitution before touching the signature. A header
    // that does not even parse (e.g. alg "none") is malformed.
    let header = decode_header(token).map_err(|_| CodecError::Malformed)?;
    if header.alg != JWT_ALGORITHM {
        return Err(CodecError::AlgorithmMismatch);
    }

    let mut validation = Validation::new(JWT_ALGORITHM);
    validation.validate_exp = true;
    validation.leeway = 0;

    decode::<C>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => CodecError::Expired,
        jsonwebtoken::errors::ErrorKind::InvalidSignature => CodecError::InvalidSignature,
        jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => CodecError::AlgorithmMismatch,
        jsonwebtoken::errors::ErrorKind::InvalidToken
        | jsonwebtoken::errors::ErrorKind::Base64(_)
        | jsonwebtoken::errors::ErrorKind::Json(_)
        | jsonwebtoken::errors::ErrorKind::Utf8(_) => CodecError::Malformed,
        other => CodecError::Other(format!("{other:?}")),
    })
}

/// Token lifecycle service: issuance, verification, refresh, revocation.
#[derive(Clone)]
pub struct JwtService {
    store: Arc<dyn TokenStore>,
    secrets: Arc<JwtSecretBundle>,
    access_ttl: Duration,
    refresh_ttl: Duration,
    max_sessions: Option<usize>,
}

impl JwtService {
    /// Default lifetimes (15 min / 7 days), no concurrent-session ceiling.
    pub fn new(store: Arc<dyn TokenStore>, secrets: JwtSecretBundle) -> Self {
        Self {
            store,
            secrets: Arc::new(secrets),
            access_ttl: Duration::seconds(ACCESS_TOKEN_TTL_SECS),
            refresh_ttl: Duration::seconds(REFRESH_TOKEN_TTL_SECS),
            max_sessions: None,
        }
    }

    /// Take lifetimes and the concurrent-session ceiling from configuration.
    /// A ceiling of zero means unlimited.
    pub fn with_session_policy(
        store: Arc<dyn TokenStore>,
        secrets: JwtSecretBundle,
        policy: &SessionSettings,
    ) -> Self {
        Self {
            store,
            secrets: Arc::new(secrets),
            access_ttl: Duration::seconds(policy.access_ttl_secs),
            refresh_ttl: Duration::seconds(policy.refresh_ttl_secs),
            max_sessions: (policy.max_concurrent_sessions > 0)
                .then_some(policy.max_concurrent_sessions as usize),
        }
    }

    /// Issue a fresh token pair and persist its revocation record.
    pub async fn generate_tokens(&self, user_id: &str, email: &str) -> Result<TokenPair> {
        let now = Utc::now();
        let jti = Uuid::new_v4().to_string();

        let access_claims = AccessClaims {
            sub: user_id.to_string(),
            email: email.to_string(),
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
            jti: jti.clone(),
            token_type: TOKEN_TYPE_ACCESS.to_string(),
        };
        let refresh_claims = RefreshClaims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.refresh_ttl).timestamp(),
            jti: jti.clone(),
            token_type: TOKEN_TYPE_REFRESH.to_string(),
        };

        let access_token = sign_claims(&access_claims, &self.secrets.access_secret)?;
        let refresh_token = sign_claims(&refresh_claims, &self.secrets.refresh_secret)?;

        // The record must exist before the pair leaves this function, or a
        // caller could hold a token that reads as revoked.
        self.store
            .put(&TokenRecord {
                token_id: jti,
                user_id: user_id.to_string(),
                email: email.to_string(),
                token_type: TOKEN_TYPE_REFRESH.to_string(),
                created_at: now,
                expires_at: now + self.refresh_ttl,
            })
            .await?;

        if let Some(max) = self.max_sessions {
            self.evict_oldest_sessions(user_id, max).await?;
        }

        tracing::info!(user_id = %user_id, "token pair issued");

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.access_ttl.num_seconds(),
            token_type: "Bearer".to_string(),
        })
    }

    /// Delete refresh records past the session ceiling, oldest first. The
    /// evicted pairs read as revoked from then on. Access-token records
    /// minted by refresh are not sessions and are left to their short TTL.
    async fn evict_oldest_sessions(&self, user_id: &str, max: usize) -> Result<()> {
        let mut sessions: Vec<TokenRecord> = self
            .store
            .list_by_user(user_id)
            .await?
            .into_iter()
            .filter(|r| r.token_type == TOKEN_TYPE_REFRESH)
            .collect();
        if sessions.len() <= max {
            return Ok(());
        }

        sessions.sort_by_key(|r| r.created_at);
        let excess = sessions.len() - max;
        for record in sessions.iter().take(excess) {
            self.store.delete(&record.token_id).await?;
            tracing::info!(
                user_id = %user_id,
                token_id = %record.token_id,
                "session ceiling reached, oldest session evicted"
            );
        }
        Ok(())
    }

    /// Verify an access token: signature, expiry, then the revocation check
    /// against the stored record and the user's revoke-all watermark.
    pub async fn verify_access_token(&self, token: &str) -> Result<AccessClaims> {
        let claims: AccessClaims = decode_claims(token, &self.secrets.access_secret)
            .map_err(|e| AuthError::InvalidAccessToken {
                reason: e.to_string(),
            })?;

        if claims.token_type != TOKEN_TYPE_ACCESS {
            return Err(AuthError::InvalidAccessToken {
                reason: "wrong token class".to_string(),
            });
        }

        match self.store.get(&claims.jti).await? {
            Lookup::Found(record) if record.user_id == claims.sub => {}
            Lookup::Found(_) => {
                return Err(AuthError::InvalidAccessToken {
                    reason: "record owner mismatch".to_string(),
                })
            }
            Lookup::NotFound => {
                return Err(AuthError::InvalidAccessToken {
                    reason: "token revoked".to_string(),
                })
            }
        }

        // Tokens issued before the last revoke-all are dead even if their
        // record survived a concurrent issuance race.
        if let Some(watermark) = self.store.revocation_watermark(&claims.sub).await? {
            if claims.iat < watermark.timestamp() {
                return Err(AuthError::InvalidAccessToken {
                    reason: "issued before revoke-all".to_string(),
                });
            }
        }

        Ok(claims)
    }

    /// Verify a refresh token: signature, expiry, stored record owned by the
    /// same user.
    pub async fn verify_refresh_token(&self, token: &str) -> Result<RefreshClaims> {
        let claims: RefreshClaims = decode_claims(token, &self.secrets.refresh_secret)
            .map_err(|e| AuthError::InvalidRefreshToken {
                reason: e.to_string(),
            })?;

        if claims.token_type != TOKEN_TYPE_REFRESH {
            return Err(AuthError::InvalidRefreshToken {
                reason: "wrong token class".to_string(),
            });
        }

        match self.store.get(&claims.jti).await? {
            Lookup::Found(record) if record.user_id == claims.sub => Ok(claims),
            Lookup::Found(_) => Err(AuthError::InvalidRefreshToken {
                reason: "record owner mismatch".to_string(),
            }),
            Lookup::NotFound => Err(AuthError::InvalidRefreshToken {
                reason: "token revoked".to_string(),
            }),
        }
    }

    /// Exchange a refresh token for a brand-new access token with a fresh
    /// `jti`. The refresh token keeps its own id and record.
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<RefreshedAccessToken> {
        let refresh_claims = self.verify_refresh_token(refresh_token).await?;

        // Refresh claims carry no email; recover it from the stored record.
        let record = match self.store.get(&refresh_claims.jti).await? {
            Lookup::Found(record) => record,
            Lookup::NotFound => {
                return Err(AuthError::InvalidRefreshToken {
                    reason: "token revoked".to_string(),
                })
            }
        };

        let now = Utc::now();
        let new_jti = Uuid::new_v4().to_string();
        let access_claims = AccessClaims {
            sub: refresh_claims.sub.clone(),
            email: record.email.clone(),
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
            jti: new_jti.clone(),
            token_type: TOKEN_TYPE_ACCESS.to_string(),
        };
        let access_token = sign_claims(&access_claims, &self.secrets.access_secret)?;

        // The new access token needs its own record so the revocation check
        // holds for it; the record dies with the access token.
        self.store
            .put(&TokenRecord {
                token_id: new_jti,
                user_id: refresh_claims.sub.clone(),
                email: record.email,
                token_type: TOKEN_TYPE_ACCESS.to_string(),
                created_at: now,
                expires_at: now + self.access_ttl,
            })
            .await?;

        tracing::info!(user_id = %refresh_claims.sub, "access token refreshed");

        Ok(RefreshedAccessToken {
            access_token,
            expires_in: self.access_ttl.num_seconds(),
            token_type: "Bearer".to_string(),
        })
    }

    /// Delete the record for one token pair, invalidating both halves
    /// immediately.
    pub async fn revoke_token(&self, token_id: &str) -> Result<()> {
        self.store.delete(token_id).await?;
        tracing::info!(token_id = %token_id, "token revoked");
        Ok(())
    }

    /// Revoke every live token for a user: delete each record, then set the
    /// watermark so records created by a concurrent issuance race are dead
    /// on arrival. Returns the number of records deleted.
    pub async fn revoke_all_user_tokens(&self, user_id: &str) -> Result<usize> {
        let records = self.store.list_by_user(user_id).await?;
        let count = records.len();
        for record in &records {
            self.store.delete(&record.token_id).await?;
        }
        self.store
            .set_revocation_watermark(user_id, Utc::now())
            .await?;

        tracing::warn!(user_id = %user_id, revoked = count, "all tokens revoked for user");
        Ok(count)
    }

    /// Scheduler-driven sweep. Advisory for TTL-backed stores.
    pub async fn cleanup_expired_tokens(&self) -> Result<u64> {
        self.store.cleanup_expired().await
    }
}
