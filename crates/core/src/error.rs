use thiserror::Error;

/// Errors raised while building the rate-limit policy table
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Rate limit window must be greater than zero")]
    ZeroWindow,

    #[error("Rate limit max requests must be greater than zero")]
    ZeroMaxRequests,

    #[error("Unknown rate limit policy: {0}")]
    UnknownPolicy(String),
}

/// Errors raised by `Context` accessors
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Context field already set: {0}")]
    AlreadySet(&'static str),

    #[error("Context field missing: {0}")]
    Missing(&'static str),

    #[error("Context field {field} could not be decoded: {source}")]
    Decode {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
