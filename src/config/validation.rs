//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (pool size, timeouts, backoff shape)
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: ClientConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::ClientConfig;

/// One semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("no nodes configured")]
    NoNodes,

    #[error("node {index}: host is empty")]
    EmptyHost { index: usize },

    #[error("node {index}: port must be non-zero")]
    ZeroPort { index: usize },

    #[error("pool max_connections must be positive")]
    ZeroPoolSize,

    #[error("pool acquire_timeout_ms must be positive")]
    ZeroAcquireTimeout,

    #[error("backoff: {0}")]
    Backoff(String),

    #[error("redirect max_hops must be positive when redirects are enabled")]
    ZeroRedirectHops,

    #[error("cookie jar capacity must be positive")]
    ZeroCookieCapacity,

    #[error("pipeline capacity must be positive")]
    ZeroPipelineCapacity,
}

/// Check everything serde cannot, collecting all problems.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.nodes.is_empty() {
        errors.push(ValidationError::NoNodes);
    }
    for (index, node) in config.nodes.iter().enumerate() {
        if node.host.is_empty() {
            errors.push(ValidationError::EmptyHost { index });
        }
        if node.port == 0 {
            errors.push(ValidationError::ZeroPort { index });
        }
    }

    if config.pool.max_connections == 0 {
        errors.push(ValidationError::ZeroPoolSize);
    }
    if config.pool.acquire_timeout_ms == 0 {
        errors.push(ValidationError::ZeroAcquireTimeout);
    }

    if let Err(e) = config.backoff.validate() {
        errors.push(ValidationError::Backoff(e.to_string()));
    }

    if config.redirect.enabled && config.redirect.max_hops == 0 {
        errors.push(ValidationError::ZeroRedirectHops);
    }
    if config.cookies.capacity == 0 {
        errors.push(ValidationError::ZeroCookieCapacity);
    }
    if config.pipeline.capacity == 0 {
        errors.push(ValidationError::ZeroPipelineCapacity);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
