//! End-to-end HTTP tests against in-memory backends.

use std::sync::Arc;

use actix_web::{body, test, web, App};
use serde_json::{json, Value};

use auth_service::audit::sink::{MemoryAlertPublisher, MemoryAuditSink};
use auth_service::audit::{AuditLogger, EventType};
use auth_service::config::{
    AuditSettings, CorsSettings, JwtSettings, PasswordPolicy, RateLimitSettings, RedisSettings,
    ServerSettings, SessionSettings, Settings,
};
use auth_service::middleware::{MemoryRateCounter, RateCounter};
use auth_service::routes;
use auth_service::security::jwt::JwtService;
use auth_service::security::roles::{FixedRoleProvider, RoleProvider};
use auth_service::security::SecurityConfigService;
use auth_service::store::MemoryTokenStore;
use auth_service::AppState;
use secret_store::{JwtSecretBundle, MemorySecretStore};

fn test_settings() -> Settings {
    Settings {
        server: ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        redis: RedisSettings {
            url: "redis://localhost:6379".to_string(),
        },
        jwt: JwtSettings {
            secret_name: None,
            access_secret: Some("test-access-secret".to_string()),
            refresh_secret: Some("test-refresh-secret".to_string()),
            issuer: "draftpress".to_string(),
        },
        cors: CorsSettings {
            allowed_origins: vec!["*".to_string()],
        },
        rate_limit: RateLimitSettings {
            authenticated_max_requests: 100,
            anonymous_max_requests: 50,
            window_minutes: 15,
        },
        password_policy: PasswordPolicy {
            min_length: 12,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            require_symbol: false,
        },
        sessions: SessionSettings {
            access_ttl_secs: 900,
            refresh_ttl_secs: 604_800,
            max_concurrent_sessions: 10,
        },
        audit: AuditSettings { retention_days: 90 },
    }
}

fn test_state() -> (web::Data<AppState>, Arc<MemoryAuditSink>) {
    let secrets = JwtSecretBundle {
        access_secret: "test-access-secret".to_string(),
        refresh_secret: "test-refresh-secret".to_string(),
        issuer: "draftpress".to_string(),
        rotated_at: None,
    };

    let sink = Arc::new(MemoryAuditSink::new());
    let audit = Arc::new(AuditLogger::new(
        sink.clone(),
        Arc::new(MemoryAlertPublisher::new()),
    ));
    let jwt = Arc::new(JwtService::new(Arc::new(MemoryTokenStore::new()), secrets));
    let roles: Arc<dyn RoleProvider> = Arc::new(FixedRoleProvider::new());
    let rate_counter: Arc<dyn RateCounter> = Arc::new(MemoryRateCounter::new());
    let settings = test_settings();

    let state = web::Data::new(AppState {
        jwt,
        audit,
        roles,
        rate_counter,
        rate_limit: settings.rate_limit.clone(),
        security_config: Arc::new(SecurityConfigService::new(
            Arc::new(MemorySecretStore::new()),
            settings,
            std::time::Duration::from_secs(60),
        )),
    });

    (state, sink)
}

macro_rules! init_app {
    ($state:expr) => {
        test::init_service(
            App::new().configure(|cfg| routes::configure(cfg, $state.clone())),
        )
        .await
    };
}

macro_rules! issue_pair {
    ($app:expr, $email:expr) => {{
        let res = test::call_service(
            $app,
            test::TestRequest::post()
                .uri("/api/auth/token")
                .set_json(json!({ "email": $email }))
                .to_request(),
        )
        .await;
        assert!(res.status().is_success());
        let bytes = test::read_body(res).await;
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        body
    }};
}

async fn error_body(err: actix_web::Error) -> (u16, Value) {
    let resp = err.error_response();
    let status = resp.status().as_u16();
    let bytes = body::to_bytes(resp.into_body()).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[actix_web::test]
async fn token_endpoint_issues_pair_and_audits_success() {
    let (state, sink) = test_state();
    let app = init_app!(state);

    let pair = issue_pair!(&app, "author@draftpress.io");
    assert!(pair["accessToken"].as_str().unwrap().split('.').count() == 3);
    assert!(pair["refreshToken"].as_str().is_some());
    assert_eq!(pair["expiresIn"], 900);
    assert_eq!(pair["tokenType"], "Bearer");

    let events = sink.events().await;
    assert!(events
        .iter()
        .any(|e| e.event_type == EventType::AuthenticationSuccess));
}

#[actix_web::test]
async fn invalid_email_is_rejected_with_field_message() {
    let (state, _sink) = test_state();
    let app = init_app!(state);

    let res = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/auth/token")
            .set_json(json!({ "email": "not-an-email" }))
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), 400);

    let bytes = test::read_body(res).await;
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "Bad Request");
    assert_eq!(body["message"], "email must be a valid address");
}

#[actix_web::test]
async fn missing_email_field_is_a_400_in_the_shared_error_shape() {
    let (state, _sink) = test_state();
    let app = init_app!(state);

    let res = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/auth/token")
            .set_json(json!({}))
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), 400);

    let bytes = test::read_body(res).await;
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "Bad Request");
}

#[actix_web::test]
async fn missing_authorization_header_is_a_fixed_401() {
    let (state, sink) = test_state();
    let app = init_app!(state);

    let err = test::try_call_service(
        &app,
        test::TestRequest::post().uri("/api/auth/revoke").to_request(),
    )
    .await
    .unwrap_err();

    let (status, body) = error_body(err).await;
    assert_eq!(status, 401);
    assert_eq!(body["error"], "Unauthorized");
    assert_eq!(body["message"], "Missing authorization header");

    let failures: Vec<_> = sink
        .events()
        .await
        .into_iter()
        .filter(|e| e.event_type == EventType::AuthenticationFailed)
        .collect();
    assert_eq!(failures.len(), 1);
}

#[actix_web::test]
async fn garbage_bearer_token_is_audited_exactly_once() {
    let (state, sink) = test_state();
    let app = init_app!(state);

    let err = test::try_call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/auth/revoke")
            .insert_header(("Authorization", "Bearer abc123"))
            .to_request(),
    )
    .await
    .unwrap_err();

    let (status, body) = error_body(err).await;
    assert_eq!(status, 401);
    assert_eq!(body["message"], "Invalid or expired token");

    let failures: Vec<_> = sink
        .events()
        .await
        .into_iter()
        .filter(|e| e.event_type == EventType::AuthenticationFailed)
        .collect();
    assert_eq!(failures.len(), 1);
    // The audit trail keeps the specific reason the response hides.
    assert!(failures[0].reason.is_some());
}

#[actix_web::test]
async fn refresh_exchanges_for_a_new_access_token() {
    let (state, _sink) = test_state();
    let app = init_app!(state);

    let pair = issue_pair!(&app, "author@draftpress.io");
    let refresh_token = pair["refreshToken"].as_str().unwrap();

    let res = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/auth/refresh")
            .set_json(json!({ "refreshToken": refresh_token }))
            .to_request(),
    )
    .await;
    assert!(res.status().is_success());

    let bytes = test::read_body(res).await;
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["expiresIn"], 900);
    assert_eq!(body["tokenType"], "Bearer");
    assert_ne!(body["accessToken"], pair["accessToken"]);

    // The refreshed access token authenticates.
    let access = body["accessToken"].as_str().unwrap();
    let res = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/auth/revoke")
            .insert_header(("Authorization", format!("Bearer {access}")))
            .to_request(),
    )
    .await;
    assert!(res.status().is_success());
}

#[actix_web::test]
async fn access_token_cannot_be_used_as_refresh_token() {
    let (state, _sink) = test_state();
    let app = init_app!(state);

    let pair = issue_pair!(&app, "author@draftpress.io");
    let access_token = pair["accessToken"].as_str().unwrap();

    let res = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/auth/refresh")
            .set_json(json!({ "refreshToken": access_token }))
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), 401);

    let bytes = test::read_body(res).await;
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["message"], "Invalid or expired token");
}

#[actix_web::test]
async fn revoke_kills_the_pair_and_audits() {
    let (state, sink) = test_state();
    let app = init_app!(state);

    let pair = issue_pair!(&app, "author@draftpress.io");
    let access = pair["accessToken"].as_str().unwrap().to_string();
    let refresh = pair["refreshToken"].as_str().unwrap().to_string();

    let res = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/auth/revoke")
            .insert_header(("Authorization", format!("Bearer {access}")))
            .to_request(),
    )
    .await;
    assert!(res.status().is_success());

    assert!(sink
        .events()
        .await
        .iter()
        .any(|e| e.event_type == EventType::TokenRevoked));

    // Both halves of the pair are now dead.
    let err = test::try_call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/auth/revoke")
            .insert_header(("Authorization", format!("Bearer {access}")))
            .to_request(),
    )
    .await
    .unwrap_err();
    let (status, _) = error_body(err).await;
    assert_eq!(status, 401);

    let res = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/auth/refresh")
            .set_json(json!({ "refreshToken": refresh }))
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), 401);
}

#[actix_web::test]
async fn revoke_all_sweeps_every_session_of_the_user() {
    let (state, _sink) = test_state();
    let app = init_app!(state);

    let first = issue_pair!(&app, "author@draftpress.io");
    let second = issue_pair!(&app, "author@draftpress.io");
    let other = issue_pair!(&app, "editor@draftpress.io");

    let res = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/auth/revoke-all")
            .insert_header((
                "Authorization",
                format!("Bearer {}", first["accessToken"].as_str().unwrap()),
            ))
            .to_request(),
    )
    .await;
    assert!(res.status().is_success());

    // Both of the author's sessions are gone.
    for token in [
        first["accessToken"].as_str().unwrap(),
        second["accessToken"].as_str().unwrap(),
    ] {
        let err = test::try_call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/auth/revoke")
                .insert_header(("Authorization", format!("Bearer {token}")))
                .to_request(),
        )
        .await
        .unwrap_err();
        let (status, _) = error_body(err).await;
        assert_eq!(status, 401);
    }

    // The editor's session is untouched.
    let res = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/auth/revoke")
            .insert_header((
                "Authorization",
                format!("Bearer {}", other["accessToken"].as_str().unwrap()),
            ))
            .to_request(),
    )
    .await;
    assert!(res.status().is_success());
}

#[actix_web::test]
async fn health_and_openapi_docs_are_served() {
    let (state, _sink) = test_state();
    let app = init_app!(state);

    let res = test::call_service(&app, test::TestRequest::get().uri("/health").to_request())
        .await;
    assert!(res.status().is_success());

    let res = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/docs/openapi.json")
            .to_request(),
    )
    .await;
    assert!(res.status().is_success());
    let bytes = test::read_body(res).await;
    let doc: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(doc["paths"]["/api/auth/token"].is_object());
}

#[actix_web::test]
async fn anonymous_rate_limit_returns_429_past_threshold() {
    let (state, sink) = test_state();
    let mut settings = test_settings();
    settings.rate_limit.anonymous_max_requests = 3;
    // Rebuild state with the tight limit.
    let state = web::Data::new(AppState {
        rate_limit: settings.rate_limit.clone(),
        ..state.get_ref().clone()
    });
    let app = init_app!(state);

    for _ in 0..3 {
        let res = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/auth/token")
                .set_json(json!({ "email": "author@draftpress.io" }))
                .to_request(),
        )
        .await;
        assert!(res.status().is_success());
    }

    let err = test::try_call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/auth/token")
            .set_json(json!({ "email": "author@draftpress.io" }))
            .to_request(),
    )
    .await
    .unwrap_err();
    let (status, body) = error_body(err).await;
    assert_eq!(status, 429);
    assert_eq!(body["error"], "Too Many Requests");

    assert!(sink
        .events()
        .await
        .iter()
        .any(|e| e.event_type == EventType::RateLimitExceeded));
}
