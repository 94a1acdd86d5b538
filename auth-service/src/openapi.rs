/// OpenAPI documentation for the Draftpress auth service
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::OpenApi;

use crate::handlers::auth::{
    ErrorResponse, MessageResponse, RefreshRequest, RefreshResponse, TokenRequest, TokenResponse,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Draftpress Auth Service API",
        version = "1.0.0",
        description = "Token issuance, verification, refresh, and revocation for the Draftpress automated blog platform.",
        license(name = "MIT")
    ),
    paths(
        crate::handlers::auth::issue_token,
        crate::handlers::auth::refresh_token,
        crate::handlers::auth::revoke_token,
        crate::handlers::auth::revoke_all_tokens
    ),
    components(schemas(
        TokenRequest,
        RefreshRequest,
        TokenResponse,
        RefreshResponse,
        MessageResponse,
        ErrorResponse
    )),
    tags(
        (name = "Auth", description = "Token lifecycle APIs")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            )
        }
    }
}
