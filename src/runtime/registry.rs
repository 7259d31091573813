//! Finish registry: per-place scope table
//!
//! Holds one entry per live finish scope known at this place: the sparse
//! async-counter row, the local spawn counter, and the exception aggregate.
//! Entries are keyed by the full scope record (id plus root) because ids are
//! only unique per minting place. Each entry carries its own mutex, so
//! unrelated scopes never serialize against each other; the outer map lock is
//! held only for slot lookup and lifecycle.

use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::error::{FinishError, FinishResult};
use super::place::{ActivityFailure, FinishRecord, PlaceId};
use crate::transport::wire::CreditTuple;

/// Mutable state of one live scope at one place
#[derive(Debug, Default)]
struct ScopeState {
    /// Sparse async-counter row: net outstanding activities attributed to
    /// each place, as known here. Absent key reads as zero.
    counts: HashMap<PlaceId, i64>,
    /// Activities of this scope hosted here and not yet completed
    spawned: i64,
    /// Failures raised by tracked activities, pending aggregation
    failures: Vec<ActivityFailure>,
}

impl ScopeState {
    fn is_quiescent(&self) -> bool {
        self.counts.values().all(|&count| count == 0)
    }

    /// Nothing hosted, nothing to report, nothing aggregated: the slot holds
    /// no information a fresh zero-initialized slot would not.
    fn is_drained(&self) -> bool {
        self.spawned == 0 && self.failures.is_empty() && self.is_quiescent()
    }
}

/// Registry slot for one live finish scope
pub struct ScopeEntry {
    record: FinishRecord,
    state: Mutex<ScopeState>,
    /// Signalled whenever the counter row transitions to all-zero
    quiescent: Condvar,
}

impl ScopeEntry {
    fn new(record: FinishRecord) -> Self {
        Self {
            record,
            state: Mutex::new(ScopeState::default()),
            quiescent: Condvar::new(),
        }
    }

    /// The scope this entry belongs to
    pub fn record(&self) -> FinishRecord {
        self.record
    }

    /// Record one unit of outstanding work sent toward `dest`
    pub fn credit_outgoing(&self, dest: PlaceId) {
        let mut state = self.state.lock();
        *state.counts.entry(dest).or_insert(0) += 1;
    }

    /// Record the arrival of a tracked activity to be executed here
    pub fn activity_hosted(&self) {
        let mut state = self.state.lock();
        state.spawned += 1;
    }

    /// Record the completion of a tracked activity at `here`
    ///
    /// Returns true exactly when this completion locally quiesces the scope
    /// at a non-root place, i.e. when credits must be propagated. The
    /// transition test runs under the entry lock so concurrent completions
    /// cannot both claim the same quiescence event.
    pub fn complete_here(&self, here: PlaceId, failure: Option<ActivityFailure>) -> bool {
        let mut state = self.state.lock();
        if let Some(failure) = failure {
            state.failures.push(failure);
        }
        *state.counts.entry(here).or_insert(0) -= 1;
        state.spawned -= 1;

        let at_root = self.record.root == here;
        if at_root && state.is_quiescent() {
            // Root-local completions are already visible in the root's own
            // table; wake a pending end() instead of touching the network.
            self.quiescent.notify_all();
        }
        state.spawned == 0 && !at_root
    }

    /// Append remotely reported failures to the exception aggregate
    pub fn record_failures(&self, failures: Vec<ActivityFailure>) {
        self.state.lock().failures.extend(failures);
    }

    /// Drain the counter row into a credit report
    ///
    /// Collects every non-zero `(place, count)` pair and clears the row: the
    /// caller is about to report everything this place knows, and a cleared
    /// row guarantees a later quiescence event with no new activity reports
    /// nothing.
    pub fn drain_credits(&self) -> Vec<CreditTuple> {
        let mut state = self.state.lock();
        let tuples = state
            .counts
            .iter()
            .filter(|&(_, &count)| count != 0)
            .map(|(&place, &count)| CreditTuple { place, count })
            .collect();
        state.counts.clear();
        tuples
    }

    /// Drain the local exception aggregate
    pub fn drain_failures(&self) -> Vec<ActivityFailure> {
        std::mem::take(&mut self.state.lock().failures)
    }

    /// Apply a received credit report additively
    ///
    /// Deltas are summed into the row, never overwritten: several places may
    /// report partial knowledge about the same target place at different
    /// times, and the table converges to the true count only by summation.
    pub fn apply_credits(&self, tuples: &[CreditTuple]) {
        let mut state = self.state.lock();
        for tuple in tuples {
            *state.counts.entry(tuple.place).or_insert(0) += tuple.count;
        }
        if state.is_quiescent() {
            self.quiescent.notify_all();
        }
    }

    /// Whether every entry of the counter row reads zero
    pub fn is_quiescent(&self) -> bool {
        self.state.lock().is_quiescent()
    }

    /// Wait up to `timeout` for the row to read all-zero
    ///
    /// Returns the quiescence state on wakeup. Callers must keep pumping the
    /// transport between waits; the signal only fires for credits applied by
    /// a thread draining inbound messages.
    pub fn wait_quiescent_for(&self, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        if state.is_quiescent() {
            return true;
        }
        let _ = self.quiescent.wait_for(&mut state, timeout);
        state.is_quiescent()
    }

    /// Number of failures currently aggregated
    pub fn failure_count(&self) -> usize {
        self.state.lock().failures.len()
    }
}

/// Per-place table of live finish scopes
pub struct FinishRegistry {
    places: u32,
    max_live_scopes: usize,
    scopes: RwLock<HashMap<FinishRecord, Arc<ScopeEntry>>>,
}

impl FinishRegistry {
    /// Create an empty registry for a cluster of `places` places
    pub fn new(places: u32, max_live_scopes: usize) -> Self {
        Self {
            places,
            max_live_scopes,
            scopes: RwLock::new(HashMap::new()),
        }
    }

    /// Validate a place index against the configured cluster size
    pub fn check_place(&self, place: PlaceId) -> FinishResult<()> {
        if place.index() >= self.places {
            return Err(FinishError::PlaceOutOfRange {
                place,
                places: self.places,
            });
        }
        Ok(())
    }

    /// Create a zero-initialized slot for a freshly minted scope
    ///
    /// Fails if a scope with the same record is already live; for the
    /// reserved global record this is the guard against a second concurrent
    /// global scope.
    pub fn create(&self, record: FinishRecord) -> FinishResult<Arc<ScopeEntry>> {
        let mut scopes = self.scopes.write();
        if scopes.contains_key(&record) {
            return Err(FinishError::ScopeActive(record));
        }
        if scopes.len() >= self.max_live_scopes {
            return Err(FinishError::ScopeLimitExceeded(self.max_live_scopes));
        }
        let entry = Arc::new(ScopeEntry::new(record));
        scopes.insert(record, Arc::clone(&entry));
        Ok(entry)
    }

    /// Fetch the slot for a scope this place first hears of now, creating it
    /// zero-initialized if absent
    ///
    /// Non-root places materialize slots lazily: the first contact with a
    /// scope is an arriving activity or a registration relayed on behalf of
    /// one, not a local `begin()`.
    pub fn lookup_or_create(&self, record: FinishRecord) -> FinishResult<Arc<ScopeEntry>> {
        if let Some(entry) = self.scopes.read().get(&record) {
            return Ok(Arc::clone(entry));
        }
        let mut scopes = self.scopes.write();
        if let Some(entry) = scopes.get(&record) {
            return Ok(Arc::clone(entry));
        }
        if scopes.len() >= self.max_live_scopes {
            return Err(FinishError::ScopeLimitExceeded(self.max_live_scopes));
        }
        let entry = Arc::new(ScopeEntry::new(record));
        scopes.insert(record, Arc::clone(&entry));
        Ok(entry)
    }

    /// Fetch the slot for a live scope
    pub fn get(&self, record: FinishRecord) -> FinishResult<Arc<ScopeEntry>> {
        self.scopes
            .read()
            .get(&record)
            .cloned()
            .ok_or(FinishError::UnknownScope(record))
    }

    /// Whether the scope is live at this place
    pub fn is_live(&self, record: FinishRecord) -> bool {
        self.scopes.read().contains_key(&record)
    }

    /// Remove a scope's slot if it holds no state a fresh slot would not
    ///
    /// Non-root places call this after a propagation has drained the slot:
    /// lazily created slots must also be lazily released, or a worker's
    /// table would grow with every scope it has ever hosted instead of the
    /// scopes currently live. The drained test runs with the map write lock
    /// held, so a concurrent arrival either lands before the check (and
    /// keeps the slot) or rematerializes a fresh one afterward.
    ///
    /// Returns whether the slot was removed.
    pub fn release_if_drained(&self, record: FinishRecord) -> bool {
        let mut scopes = self.scopes.write();
        let drained = match scopes.get(&record) {
            Some(entry) => entry.state.lock().is_drained(),
            None => return false,
        };
        if drained {
            scopes.remove(&record);
        }
        drained
    }

    /// Remove a scope's slot, making its id reusable
    pub fn remove(&self, record: FinishRecord) -> FinishResult<()> {
        self.scopes
            .write()
            .remove(&record)
            .map(|_| ())
            .ok_or(FinishError::UnknownScope(record))
    }

    /// Number of live scopes at this place
    pub fn live_count(&self) -> usize {
        self.scopes.read().len()
    }
}
