//! rounds-core: request-processing primitives
//!
//! This crate holds the framework-independent pieces of the request core:
//! rate-limit policies and the fixed-window limiter, the TTL response cache
//! and its key builder, the per-request `Context`, input schemas and the
//! error body shared by every rejection.

pub mod cache;
pub mod cache_key;
pub mod clock;
pub mod context;
pub mod error;
pub mod outcome;
pub mod policy;
pub mod rate_limit;
pub mod report;
pub mod schema;

pub use cache::{CacheStats, ResponseCache};
pub use cache_key::CacheKey;
pub use clock::{Clock, ManualClock, SystemClock};
pub use context::Context;
pub use error::{ContextError, PolicyError};
pub use outcome::{ErrorBody, ErrorKind, FieldError};
pub use policy::{Policy, PolicyTable, RateLimitPolicy};
pub use rate_limit::{RateLimitDecision, RateLimitKey, RateLimiter};
pub use report::{CacheReport, Efficiency};
pub use schema::{FieldRule, ObjectSchema, Schema};
