//! Observability subsystem.
//!
//! # Design Decisions
//! - Structured logging via `tracing`; every subsystem logs with field syntax
//! - Connection and correlation ids flow through log events for correlation
//! - Log level configurable via the environment

pub mod logging;
