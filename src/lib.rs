//! Tally – a distributed finish-scope and quiescence-detection runtime
//!
//! This crate implements the task-completion ("finish") protocol of an
//! asynchronous, place-based parallel execution model:
//! - Finish scopes that observe the completion of every activity
//!   transitively spawned inside them, across all places
//! - Credit propagation: compact per-place delta reports from locally
//!   quiescent places to a scope's root, applied additively
//! - Aggregation of activity failures into the owning scope, surfaced when
//!   the scope ends
//! - A pumped quiescence wait that keeps servicing the transport's inbound
//!   queue while blocked
//!
//! The transport is an external collaborator; an in-process loopback
//! implementation is provided for tests and single-process embeddings.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Runtime core modules implementing the finish protocol
pub mod runtime;

/// Message transport boundary and reference implementation
pub mod transport;

// Re-export key types for convenience
pub use runtime::place::{ActivityFailure, FinishRecord, PlaceId};
pub use runtime::{FinishOutcome, PlaceConfig, PlaceRuntime};

/// Current version of the Tally runtime
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol version for wire message compatibility
pub const PROTOCOL_VERSION: &str = "1.0.0";
