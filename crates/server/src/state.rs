//! Shared application state

use std::sync::Arc;

use rounds_core::RateLimiter;

use crate::cache::JsonCache;
use crate::config::Config;
use crate::db::CaseStore;
use crate::middleware::auth::{ApiKeyIdentity, IdentityProvider};

/// Collaborators injected into every route
#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<RateLimiter>,
    pub cache: Arc<JsonCache>,
    pub identity: Arc<dyn IdentityProvider>,
    pub cases: Arc<dyn CaseStore>,
}

impl AppState {
    /// Build fresh limiter, cache and identity provider from `config`
    pub fn from_config(config: &Config, cases: Arc<dyn CaseStore>) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::new(config.policies.clone())),
            cache: Arc::new(JsonCache::new(
                config.cache_max_entries,
                config.cache_default_ttl,
            )),
            identity: Arc::new(ApiKeyIdentity::new(config.api_keys.clone())),
            cases,
        }
    }
}
