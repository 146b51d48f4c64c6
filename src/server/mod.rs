//! Server-side pipelining support.
//!
//! # Data Flow
//! ```text
//! Request read off the wire
//!     → sequencer.rs (assign_sequence: monotonic per-connection read order)
//!     → handler runs concurrently, completes in any order
//!     → sequencer.rs (complete: holds out-of-order responses, releases the
//!        in-order run)
//!     → pipeline.rs writes released responses back, wire order = read order
//! ```
//!
//! # Design Decisions
//! - The completed-but-unwritten queue is bounded; overflow closes the
//!   connection instead of buffering unboundedly
//! - The ordering invariant mirrors what a sequential client transport
//!   assumes: response n+1 is never written before response n

pub mod pipeline;
pub mod sequencer;

pub use pipeline::serve_pipelined;
pub use sequencer::{PipelineSlot, ResponseSequencer};
