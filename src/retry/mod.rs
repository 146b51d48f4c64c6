//! Retry, redirect, and backoff orchestration.
//!
//! # Data Flow
//! ```text
//! Orchestrator::execute(request)
//!     → cookie jar consulted, matches merged into the request
//!     → dispatched through a Transport, response awaited
//!     → redirect status: redirect.rs builds the continuation, loop repeats
//!     → transport failure / exchange timeout: backoff.rs computes the wait,
//!       the orchestrator sleeps it and reissues (reconnecting if fatal)
//! ```
//!
//! # Design Decisions
//! - The backoff calculator is pure: callers inject the clock and RNG, it
//!   never sleeps; sleeping is the orchestrator's job
//! - Redirect continuations preserve headers, body, and cookies; 303 demotes
//!   to GET with no body
//! - Exceeding the hop limit is a terminal failure surfaced to the caller,
//!   never a silent stop

pub mod backoff;
pub mod orchestrator;
pub mod redirect;

pub use backoff::{Backoff, BackoffConfig, BackoffDecision};
pub use orchestrator::Orchestrator;
