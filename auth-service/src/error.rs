use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Missing authorization header")]
    MissingCredentials,

    #[error("Invalid authorization header format")]
    MalformedCredentials,

    #[error("Invalid access token: {reason}")]
    InvalidAccessToken { reason: String },

    #[error("Invalid refresh token: {reason}")]
    InvalidRefreshToken { reason: String },

    #[error("Insufficient permissions")]
    Forbidden,

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AuthError {
    /// The detailed reason, kept for audit logging only. HTTP responses get
    /// the fixed user-facing messages from `user_message`.
    pub fn audit_reason(&self) -> String {
        self.to_string()
    }

    /// Fixed user-facing message per error class. Token failures never
    /// reveal why the token was rejected.
    fn user_message(&self) -> String {
        match self {
            AuthError::Validation(msg) => msg.clone(),
            AuthError::MissingCredentials => "Missing authorization header".to_string(),
            AuthError::MalformedCredentials => {
                "Invalid authorization header format".to_string()
            }
            AuthError::InvalidAccessToken { .. } | AuthError::InvalidRefreshToken { .. } => {
                "Invalid or expired token".to_string()
            }
            AuthError::Forbidden => "Insufficient permissions".to_string(),
            AuthError::RateLimited => "Too many requests".to_string(),
            AuthError::Storage(_) | AuthError::Internal(_) => {
                "Internal Server Error".to_string()
            }
        }
    }

    fn error_label(&self) -> &'static str {
        match self.status_code() {
            StatusCode::BAD_REQUEST => "Bad Request",
            StatusCode::UNAUTHORIZED => "Unauthorized",
            StatusCode::FORBIDDEN => "Forbidden",
            StatusCode::TOO_MANY_REQUESTS => "Too Many Requests",
            _ => "Internal Server Error",
        }
    }
}

impl ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::MissingCredentials
            | AuthError::MalformedCredentials
            | AuthError::InvalidAccessToken { .. }
            | AuthError::InvalidRefreshToken { .. } => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AuthError::Storage(_) | AuthError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let mut body = json!({
            "error": self.error_label(),
            "message": self.user_message(),
        });

        // 500s carry a correlation id so the server-side log line can be found
        // without exposing the underlying error.
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            let request_id = uuid::Uuid::new_v4().to_string();
            tracing::error!(request_id = %request_id, error = %self, "request failed");
            body["requestId"] = json!(request_id);
        }

        HttpResponse::build(status).json(body)
    }
}

impl From<redis::RedisError> for AuthError {
    fn from(err: redis::RedisError) -> Self {
        tracing::error!("Redis error: {}", err);
        AuthError::Storage(err.to_string())
    }
}

impl From<secret_store::SecretError> for AuthError {
    fn from(err: secret_store::SecretError) -> Self {
        tracing::error!("Secret store error: {}", err);
        AuthError::Internal(err.to_string())
    }
}
