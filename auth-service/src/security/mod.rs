//! Token issuance, verification, roles, and security configuration.

pub mod config;
pub mod jwt;
pub mod roles;

pub use config::SecurityConfigService;
pub use jwt::{AccessClaims, JwtService, RefreshClaims, TokenPair};
pub use roles::RoleProvider;
