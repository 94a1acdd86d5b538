/// Token lifecycle handlers
use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit::{EventType, SecurityEvent},
    error::AuthError,
    middleware::AuthedUser,
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct TokenRequest {
    #[validate(length(min = 1, message = "email is required"))]
    #[validate(email(message = "email must be a valid address"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "refreshToken is required"))]
    pub refresh_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub token_type: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
    pub expires_in: i64,
    pub token_type: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

/// Error body shape mirrored by `AuthError`'s `ResponseError` impl.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

fn first_validation_message(errors: validator::ValidationErrors) -> String {
    errors
        .field_errors()
        .iter()
        .flat_map(|(_, errs)| errs.iter())
        .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
        .unwrap_or_else(|| "invalid request".to_string())
}

fn client_ip(req: &HttpRequest) -> String {
    req.connection_info()
        .realip_remote_addr()
        .unwrap_or("unknown")
        .to_string()
}

/// Issue a token pair for an email identity. The user id is the UUIDv5 of
/// the email, so repeated requests for one address map to one identity
/// without a user table in this service.
#[utoipa::path(
    post,
    path = "/api/auth/token",
    tag = "Auth",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Token pair issued", body = TokenResponse),
        (status = 400, description = "Invalid email", body = ErrorResponse)
    )
)]
pub async fn issue_token(
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: web::Json<TokenRequest>,
) -> Result<HttpResponse, AuthError> {
    payload
        .validate()
        .map_err(|e| AuthError::Validation(first_validation_message(e)))?;

    let email = payload.email.trim().to_lowercase();
    let user_id = Uuid::new_v5(&Uuid::NAMESPACE_DNS, email.as_bytes()).to_string();

    let pair = state.jwt.generate_tokens(&user_id, &email).await?;

    state
        .audit
        .log_security_event(
            SecurityEvent::new(EventType::AuthenticationSuccess)
                .user_id(user_id.clone())
                .source_ip(client_ip(&req))
                .path("/api/auth/token")
                .method("POST"),
        )
        .await;

    Ok(HttpResponse::Ok().json(TokenResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        expires_in: pair.expires_in,
        token_type: pair.token_type,
    }))
}

/// Exchange a refresh token for a new access token. The refresh token
/// itself is not rotated.
#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    tag = "Auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Access token refreshed", body = RefreshResponse),
        (status = 400, description = "Missing refresh token", body = ErrorResponse),
        (status = 401, description = "Invalid refresh token", body = ErrorResponse)
    )
)]
pub async fn refresh_token(
    state: web::Data<AppState>,
    payload: web::Json<RefreshRequest>,
) -> Result<HttpResponse, AuthError> {
    payload
        .validate()
        .map_err(|e| AuthError::Validation(first_validation_message(e)))?;

    let refreshed = state.jwt.refresh_access_token(&payload.refresh_token).await?;

    Ok(HttpResponse::Ok().json(RefreshResponse {
        access_token: refreshed.access_token,
        expires_in: refreshed.expires_in,
        token_type: refreshed.token_type,
    }))
}

/// Revoke the calling session's token pair.
#[utoipa::path(
    post,
    path = "/api/auth/revoke",
    tag = "Auth",
    responses(
        (status = 200, description = "Token pair revoked", body = MessageResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn revoke_token(
    state: web::Data<AppState>,
    req: HttpRequest,
    user: AuthedUser,
) -> Result<HttpResponse, AuthError> {
    state.jwt.revoke_token(&user.0.jti).await?;

    state
        .audit
        .log_security_event(
            SecurityEvent::new(EventType::TokenRevoked)
                .user_id(user.0.sub.clone())
                .source_ip(client_ip(&req))
                .path("/api/auth/revoke")
                .method("POST")
                .metadata(json!({ "tokenId": user.0.jti })),
        )
        .await;

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Token revoked".to_string(),
    }))
}

/// Revoke every live session of the calling user.
#[utoipa::path(
    post,
    path = "/api/auth/revoke-all",
    tag = "Auth",
    responses(
        (status = 200, description = "All sessions revoked", body = MessageResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn revoke_all_tokens(
    state: web::Data<AppState>,
    req: HttpRequest,
    user: AuthedUser,
) -> Result<HttpResponse, AuthError> {
    let revoked = state.jwt.revoke_all_user_tokens(&user.0.sub).await?;

    state
        .audit
        .log_security_event(
            SecurityEvent::new(EventType::TokenRevoked)
                .user_id(user.0.sub.clone())
                .source_ip(client_ip(&req))
                .path("/api/auth/revoke-all")
                .method("POST")
                .metadata(json!({ "scope": "all", "revokedCount": revoked })),
        )
        .await;

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "All sessions revoked".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_is_stable_per_email() {
        let a = Uuid::new_v5(&Uuid::NAMESPACE_DNS, b"author@draftpress.io");
        let b = Uuid::new_v5(&Uuid::NAMESPACE_DNS, b"author@draftpress.io");
        let c = Uuid::new_v5(&Uuid::NAMESPACE_DNS, b"editor@draftpress.io");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn validation_surfaces_field_message() {
        let req = TokenRequest {
            email: "not-an-email".to_string(),
        };
        let err = req.validate().unwrap_err();
        assert_eq!(
            first_validation_message(err),
            "email must be a valid address"
        );
    }
}
