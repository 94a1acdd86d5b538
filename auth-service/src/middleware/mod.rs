//! Request decorators: authentication, authorization, rate limiting.

pub mod auth;
pub mod authorize;
pub mod rate_limit;

pub use auth::{Authenticate, AuthedUser, OptionalAuthenticate};
pub use authorize::Authorize;
pub use rate_limit::{MemoryRateCounter, RateCounter, RateLimit, RedisRateCounter};
