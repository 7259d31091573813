//! Core identifier and value types for the finish protocol
//!
//! Defines places, finish-scope identifiers, the capability record handed to
//! every participant of a scope, and the failure record captured when a
//! tracked activity raises.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a distributed execution context ("place")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlaceId(pub u32);

impl PlaceId {
    /// Create a place identifier
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// The designated root of the global finish scope
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Get the raw place index
    pub const fn index(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for PlaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "place{}", self.0)
    }
}

/// Identifier of a finish scope, unique among concurrently live scopes
/// minted by the same root place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FinishId(pub u64);

impl FinishId {
    /// The single reserved id for the top-level global scope, always rooted
    /// at place 0
    pub const GLOBAL: FinishId = FinishId(0);

    /// Create a finish-scope identifier
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Whether this is the reserved global scope id
    pub const fn is_global(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for FinishId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "finish{}", self.0)
    }
}

/// Capability record for a finish scope
///
/// Passed by value to every spawner, spawnee, and message handler that
/// participates in the scope. Anyone holding the record may register children
/// against the scope or report completions. The record becomes unusable the
/// instant `end()` returns at the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FinishRecord {
    /// Scope identifier, unique among live scopes minted by `root`
    pub id: FinishId,
    /// The place that minted the scope; the only place allowed to end it
    pub root: PlaceId,
}

impl FinishRecord {
    /// Create a record for a scope rooted at `root`
    pub const fn new(id: FinishId, root: PlaceId) -> Self {
        Self { id, root }
    }

    /// The record of the single top-level global scope
    pub const fn global() -> Self {
        Self {
            id: FinishId::GLOBAL,
            root: PlaceId::zero(),
        }
    }

    /// Whether the given place is this scope's root
    pub fn is_rooted_at(&self, place: PlaceId) -> bool {
        self.root == place
    }
}

impl fmt::Display for FinishRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.root)
    }
}

/// Identifier of a tracked activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivityId(pub Uuid);

impl ActivityId {
    /// Create a new random activity identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ActivityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A failure raised by a tracked activity, captured into the owning scope's
/// exception aggregate instead of being propagated synchronously
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityFailure {
    /// The activity that raised
    pub activity: ActivityId,
    /// The place the activity was executing at when it raised
    pub place: PlaceId,
    /// When the failure was captured
    pub raised_at: DateTime<Utc>,
    /// Human-readable failure description
    pub message: String,
}

impl ActivityFailure {
    /// Capture a failure raised at `place`
    pub fn new(place: PlaceId, message: impl Into<String>) -> Self {
        Self {
            activity: ActivityId::new(),
            place,
            raised_at: Utc::now(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ActivityFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "activity {} at {}: {}", self.activity, self.place, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_record() {
        let record = FinishRecord::global();
        assert_eq!(record.id, FinishId::GLOBAL);
        assert!(record.id.is_global());
        assert!(record.is_rooted_at(PlaceId::zero()));
    }

    #[test]
    fn test_record_display() {
        let record = FinishRecord::new(FinishId::new(7), PlaceId::new(3));
        assert_eq!(record.to_string(), "finish7@place3");
    }

    #[test]
    fn test_records_with_distinct_roots_are_distinct() {
        let a = FinishRecord::new(FinishId::new(1), PlaceId::new(0));
        let b = FinishRecord::new(FinishId::new(1), PlaceId::new(1));
        assert_ne!(a, b);
    }
}
