// Draftpress Auth Service Library

pub mod audit;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod security;
pub mod store;

pub use error::{AuthError, Result};

use std::sync::Arc;

use audit::AuditLogger;
use config::RateLimitSettings;
use middleware::RateCounter;
use security::jwt::JwtService;
use security::roles::RoleProvider;
use security::SecurityConfigService;

/// Shared per-worker state. Everything in here is cheaply clonable.
#[derive(Clone)]
pub struct AppState {
    pub jwt: Arc<JwtService>,
    pub audit: Arc<AuditLogger>,
    pub roles: Arc<dyn RoleProvider>,
    pub rate_counter: Arc<dyn RateCounter>,
    pub rate_limit: RateLimitSettings,
    pub security_config: Arc<SecurityConfigService>,
}
