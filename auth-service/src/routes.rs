//! Route table and App wiring shared by `main` and the integration tests.

use actix_cors::Cors;
use actix_web::{web, HttpResponse};
use utoipa::OpenApi;

use crate::config::CorsSettings;
use crate::error::AuthError;
use crate::handlers;
use crate::middleware::{Authenticate, RateLimit};
use crate::openapi::ApiDoc;
use crate::AppState;

/// Body deserialization failures go through `AuthError` so 400s share the
/// service's error shape.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .error_handler(|err, _req| AuthError::Validation(err.to_string()).into())
}

/// Credentialed CORS only applies to explicit allow-lists; a wildcard origin
/// with `Access-Control-Allow-Credentials` is rejected by browsers and by
/// `actix-cors` itself, so the wildcard default stays credential-less.
pub fn build_cors(settings: &CorsSettings) -> Cors {
    let mut cors = Cors::default();
    if settings.allows_any() {
        cors = cors.allow_any_origin();
    } else {
        for origin in &settings.allowed_origins {
            cors = cors.allowed_origin(origin);
        }
        cors = cors.supports_credentials();
    }
    cors.allow_any_method().allow_any_header().max_age(3600)
}

async fn openapi_json() -> HttpResponse {
    HttpResponse::Ok().json(ApiDoc::openapi())
}

/// Register all routes against a prepared `AppState`. Every `/api/auth`
/// endpoint is rate limited; revocation additionally requires a verified
/// bearer token (authentication runs before the counter so authenticated
/// callers are keyed by user id).
pub fn configure(cfg: &mut web::ServiceConfig, state: web::Data<AppState>) {
    let jwt = state.jwt.clone();
    let audit = state.audit.clone();
    let counter = state.rate_counter.clone();
    let policy = state.rate_limit.clone();

    cfg.app_data(state.clone())
        .app_data(json_config())
        .route("/health", web::get().to(handlers::health))
        .route("/api/docs/openapi.json", web::get().to(openapi_json))
        .service(
            web::scope("/api/auth")
                .service(
                    web::resource("/token")
                        .wrap(RateLimit::new(
                            counter.clone(),
                            audit.clone(),
                            policy.clone(),
                        ))
                        .route(web::post().to(handlers::auth::issue_token)),
                )
                .service(
                    web::resource("/refresh")
                        .wrap(RateLimit::new(
                            counter.clone(),
                            audit.clone(),
                            policy.clone(),
                        ))
                        .route(web::post().to(handlers::auth::refresh_token)),
                )
                .service(
                    web::resource("/revoke")
                        .wrap(RateLimit::new(
                            counter.clone(),
                            audit.clone(),
                            policy.clone(),
                        ))
                        .wrap(Authenticate::new(jwt.clone(), audit.clone()))
                        .route(web::post().to(handlers::auth::revoke_token)),
                )
                .service(
                    web::resource("/revoke-all")
                        .wrap(RateLimit::new(counter, audit.clone(), policy))
                        .wrap(Authenticate::new(jwt, audit))
                        .route(web::post().to(handlers::auth::revoke_all_tokens)),
                ),
        );
}
