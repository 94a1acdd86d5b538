/// Draftpress Auth Service - Main entry point
///
/// REST API for JWT issuance, verification, refresh, and revocation, backed
/// by Redis for token records, audit events, and rate counters. JWT secrets
/// come from AWS Secrets Manager when configured, env variables otherwise.
use std::io;
use std::sync::Arc;
use std::time::Duration;

use actix_web::{middleware::Logger, web, App, HttpServer};
use secret_store::{AwsSecretStore, MemorySecretStore, SecretsProvider};

use auth_service::audit::sink::{RedisAlertPublisher, RedisAuditSink};
use auth_service::audit::AuditLogger;
use auth_service::config::Settings;
use auth_service::middleware::{RateCounter, RedisRateCounter};
use auth_service::routes;
use auth_service::security::jwt::JwtService;
use auth_service::security::roles::{RedisRoleProvider, RoleProvider};
use auth_service::security::SecurityConfigService;
use auth_service::store::RedisTokenStore;
use auth_service::AppState;

const SECRET_CACHE_TTL: Duration = Duration::from_secs(300);

#[actix_web::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "auth_service=info,info".into()),
        )
        .with_target(false)
        .init();

    tracing::info!("Starting auth-service v{}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load().map_err(|e| {
        tracing::error!("Configuration loading failed: {:#}", e);
        io::Error::new(io::ErrorKind::InvalidInput, e.to_string())
    })?;

    let redis = redis_conn::connect(&settings.redis.url).await.map_err(|e| {
        tracing::error!("Redis initialization failed: {:#}", e);
        io::Error::new(io::ErrorKind::ConnectionRefused, e.to_string())
    })?;

    if let Err(e) = redis_conn::ping(&redis).await {
        tracing::warn!("Redis ping failed at startup: {:#}", e);
    }

    // AWS-backed secrets when a secret name is configured, env-only otherwise.
    let provider: Arc<dyn SecretsProvider> = if settings.jwt.secret_name.is_some() {
        let store = AwsSecretStore::new().await.map_err(|e| {
            tracing::error!("Secret store initialization failed: {}", e);
            io::Error::new(io::ErrorKind::Other, e.to_string())
        })?;
        tracing::info!("AWS Secrets Manager provider initialized");
        Arc::new(store)
    } else {
        tracing::warn!("No secret store configured; JWT secrets come from the environment");
        Arc::new(MemorySecretStore::new())
    };

    let security_config = Arc::new(SecurityConfigService::new(
        provider,
        settings.clone(),
        SECRET_CACHE_TTL,
    ));

    let secrets = security_config.jwt_secrets().await.map_err(|e| {
        tracing::error!("JWT secret loading failed: {}", e);
        io::Error::new(io::ErrorKind::InvalidInput, e.to_string())
    })?;

    let store = Arc::new(RedisTokenStore::new(redis.clone()));
    let jwt = Arc::new(JwtService::with_session_policy(
        store,
        secrets,
        security_config.session_policy(),
    ));

    let audit = Arc::new(AuditLogger::new(
        Arc::new(RedisAuditSink::new(
            redis.clone(),
            settings.audit.retention_days,
        )),
        Arc::new(RedisAlertPublisher::new(redis.clone())),
    ));

    let roles: Arc<dyn RoleProvider> = Arc::new(RedisRoleProvider::new(redis.clone()));
    let rate_counter: Arc<dyn RateCounter> = Arc::new(RedisRateCounter::new(redis));

    let state = web::Data::new(AppState {
        jwt,
        audit,
        roles,
        rate_counter,
        rate_limit: settings.rate_limit.clone(),
        security_config,
    });

    let bind_address = format!("{}:{}", settings.server.host, settings.server.port);
    tracing::info!("HTTP server listening on {}", bind_address);

    let cors_settings = settings.cors.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(routes::build_cors(&cors_settings))
            .wrap(Logger::default())
            .configure(|cfg| routes::configure(cfg, state.clone()))
    })
    .bind(&bind_address)?
    .run()
    .await
}
