//! Connection pooling subsystem.
//!
//! # Data Flow
//! ```text
//! Transport needs a connection:
//!     → pool.rs (acquire: semaphore permit, then node selection)
//!     → select.rs (ROUND_ROBIN or RANDOM node choice)
//!     → idle set hit, or net::Connector dial
//!     → PooledConnection guard returned
//! Guard dropped:
//!     → usable connection returns to the idle set, otherwise discarded
//!     → permit released exactly once either way
//! ```
//!
//! # Design Decisions
//! - A counting semaphore bounds concurrency; exceeding it blocks, it never
//!   creates unbounded connections
//! - The guard holds only the pool's shared inner state, so transports never
//!   need a back-reference to the pool itself
//! - Release is idempotent by construction: the RAII guard can only run once

pub mod pool;
pub mod select;

pub use pool::{ConnectionPool, PooledConnection};
pub use select::SelectionStrategy;
