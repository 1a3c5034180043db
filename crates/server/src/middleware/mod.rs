//! HTTP middleware
//!
//! `auth`, `rate_limit`, `validate` and `log` are pipeline layers composed per
//! route. `request_id` and `metrics` are router-wide axum middleware.

pub mod auth;
pub mod client_addr;
pub mod log;
pub mod metrics;
pub mod rate_limit;
pub mod request_id;
pub mod validate;

pub use auth::{ApiKeyIdentity, Authenticate, IdentityProvider};
pub use client_addr::TrustedProxies;
pub use log::Log;
pub use self::metrics::metrics_middleware;
pub use rate_limit::{RateLimit, apply_rate_limit_headers};
pub use request_id::request_id_middleware;
pub use validate::{ValidateBody, ValidateQuery};
