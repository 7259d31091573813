//! Wire message shapes and codec
//!
//! Protocol messages are small JSON payloads. The credit message carries only
//! the finish id and the tuple list; the receiving root reconstructs the full
//! scope record from its own place id, since credits are only ever addressed
//! to the scope's root.

use serde::{Deserialize, Serialize};

use crate::runtime::error::TransportResult;
use crate::runtime::place::{ActivityFailure, FinishId, PlaceId};

/// One row of a credit delta report: the sender's belief about
/// outstanding-count changes attributable to `place`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditTuple {
    /// Place the delta is attributed to
    pub place: PlaceId,
    /// Signed outstanding-count delta
    pub count: i64,
}

/// Credit delta report sent from a non-root place to a scope's root when the
/// sender locally quiesces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditMessage {
    /// Scope the report belongs to
    pub finish_id: FinishId,
    /// Non-zero rows of the sender's counter table at the report instant
    pub tuples: Vec<CreditTuple>,
}

/// Activity failures accumulated at a non-root place, forwarded to the root
/// ahead of the credit report that could release `end()`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureMessage {
    /// Scope the failures belong to
    pub finish_id: FinishId,
    /// Captured failures, in the order they were recorded
    pub failures: Vec<ActivityFailure>,
}

/// Encode a wire message
pub fn encode<T: Serialize>(message: &T) -> TransportResult<Vec<u8>> {
    Ok(serde_json::to_vec(message)?)
}

/// Decode a wire message
pub fn decode<'a, T: Deserialize<'a>>(payload: &'a [u8]) -> TransportResult<T> {
    Ok(serde_json::from_slice(payload)?)
}
