//! Error types for the finish protocol
//!
//! Domain errors use thiserror; conversions to the caller's error type happen
//! at the orchestrator boundary. Protocol violations are unrecoverable: they
//! indicate a broken invariant the local place cannot repair, and the
//! embedding process is expected to treat them as fatal.

use thiserror::Error;

use super::place::{FinishRecord, PlaceId};

/// Finish-protocol errors
#[derive(Debug, Error)]
pub enum FinishError {
    /// Operation referenced a scope with no live registry slot
    #[error("Finish scope {0} is not live at this place")]
    UnknownScope(FinishRecord),

    /// A scope with this record is already live
    #[error("Finish scope {0} is already active")]
    ScopeActive(FinishRecord),

    /// `end()` invoked away from the scope's root
    #[error("Finish scope {record} can only be ended at its root, not at {here}")]
    NotRoot {
        /// The scope being ended
        record: FinishRecord,
        /// The place that attempted the end
        here: PlaceId,
    },

    /// `begin_global()` invoked away from the designated root place
    #[error("Global finish scope must be created at place 0, not at {here}")]
    GlobalRootRequired {
        /// The place that attempted the creation
        here: PlaceId,
    },

    /// A second global scope was requested while one is live
    #[error("A global finish scope is already active")]
    GlobalScopeActive,

    /// Place index outside the configured cluster size
    #[error("Place {place} is out of range for a cluster of {places} places")]
    PlaceOutOfRange {
        /// Offending place index
        place: PlaceId,
        /// Configured cluster size
        places: u32,
    },

    /// Too many concurrently live scopes at this place
    #[error("Live finish scope limit ({0}) exceeded")]
    ScopeLimitExceeded(usize),

    /// Transport-level failure while propagating or pumping
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Convenience result alias for finish-protocol operations
pub type FinishResult<T> = std::result::Result<T, FinishError>;

/// Transport boundary errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// Message addressed to a place the transport does not know
    #[error("Unknown destination place {0}")]
    UnknownPlace(PlaceId),

    /// Inbound message of a kind with no registered handler
    #[error("No handler registered for message kind {0}")]
    NoHandler(&'static str),

    /// Wire encoding or decoding failure
    #[error("Wire codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// A handler failed while dispatching an inbound message
    #[error("Message handler failed: {0}")]
    Handler(String),
}

/// Convenience result alias for transport operations
pub type TransportResult<T> = std::result::Result<T, TransportError>;
