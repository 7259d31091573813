//! Finish scope controller
//!
//! The public state machine of the protocol: begin / register-child /
//! child-completed / end. Local events mutate the registry directly; the
//! transition of a non-root place's spawn counter to zero hands off to the
//! credit propagator, and `end()` pumps the transport until the root's table
//! reads all-zero.

use std::sync::atomic::{fence, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::transport::Transport;

use super::error::{FinishError, FinishResult};
use super::credit::CreditPropagator;
use super::place::{ActivityFailure, FinishId, FinishRecord, PlaceId};
use super::registry::FinishRegistry;

/// Result of ending a finish scope: the failures aggregated from every
/// tracked activity, in arrival order
#[derive(Debug)]
pub struct FinishOutcome {
    /// Aggregated activity failures; empty means the scope succeeded
    pub failures: Vec<ActivityFailure>,
}

impl FinishOutcome {
    /// Number of aggregated failures
    pub fn exception_count(&self) -> usize {
        self.failures.len()
    }

    /// Whether every tracked activity completed without raising
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Finish scope state machine for one place
pub struct FinishController {
    here: PlaceId,
    registry: Arc<FinishRegistry>,
    propagator: CreditPropagator,
    transport: Arc<dyn Transport>,
    /// Slice of `end()`'s wait between transport pumps
    quiescence_poll: Duration,
    /// Mint for locally rooted scope ids; 0 is reserved for the global scope
    next_id: AtomicU64,
}

impl FinishController {
    /// Create a controller over `registry`, propagating through `transport`
    pub fn new(
        registry: Arc<FinishRegistry>,
        transport: Arc<dyn Transport>,
        quiescence_poll: Duration,
    ) -> Self {
        let here = transport.here();
        Self {
            here,
            registry,
            propagator: CreditPropagator::new(Arc::clone(&transport)),
            transport,
            quiescence_poll,
            next_id: AtomicU64::new(1),
        }
    }

    /// The place this controller executes at
    pub fn here(&self) -> PlaceId {
        self.here
    }

    /// Open a fresh finish scope rooted here
    ///
    /// Mints a scope id unique among this place's live scopes and
    /// zero-initializes its registry slot. No network traffic.
    pub fn begin(&self) -> FinishResult<FinishRecord> {
        let id = FinishId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let record = FinishRecord::new(id, self.here);
        self.registry.create(record)?;
        debug!(scope = %record, "finish scope opened");
        Ok(record)
    }

    /// Open the single top-level global finish scope
    ///
    /// Only place 0 may root the global scope, and at most one instance may
    /// be live at a time; both violations are rejected as unrecoverable
    /// protocol errors rather than silently accepted.
    pub fn begin_global(&self) -> FinishResult<FinishRecord> {
        if self.here != PlaceId::zero() {
            return Err(FinishError::GlobalRootRequired { here: self.here });
        }
        let record = FinishRecord::global();
        self.registry.create(record).map_err(|err| match err {
            FinishError::ScopeActive(_) => FinishError::GlobalScopeActive,
            other => other,
        })?;
        debug!(scope = %record, "global finish scope opened");
        Ok(record)
    }

    /// Register a child activity about to be spawned toward `dest`
    ///
    /// Must run at the spawning place before the spawn message is sent: the
    /// outstanding unit has to be on the books before any completion for it
    /// can possibly be reported. A locally hosted child never crosses the
    /// wire, so its arrival bookkeeping happens in the same call.
    pub fn register_child(&self, record: FinishRecord, dest: PlaceId) -> FinishResult<()> {
        self.registry.check_place(dest)?;
        let entry = self.registry.lookup_or_create(record)?;
        entry.credit_outgoing(dest);
        if dest == self.here {
            entry.activity_hosted();
        }
        Ok(())
    }

    /// Register the arrival of a remotely spawned activity for execution here
    ///
    /// Must run before the activity body, so the local spawn counter covers
    /// the activity for its whole execution.
    pub fn activity_arrived(&self, record: FinishRecord) -> FinishResult<()> {
        let entry = self.registry.lookup_or_create(record)?;
        entry.activity_hosted();
        Ok(())
    }

    /// Report the completion of a tracked activity executing here
    ///
    /// A failure raised by the activity is appended to the scope's exception
    /// aggregate; it never aborts the scope or its siblings. When this
    /// completion locally quiesces the scope at a non-root place, the
    /// propagator reports to the root exactly once for the event.
    pub fn child_completed(
        &self,
        record: FinishRecord,
        failure: Option<ActivityFailure>,
    ) -> FinishResult<()> {
        let entry = self.registry.get(record)?;
        if entry.complete_here(self.here, failure) {
            self.propagator.propagate(&entry)?;
            // Propagation reported and cleared everything this place held
            // for the scope; a drained slot is released so a worker's table
            // tracks live scopes, not every scope it has ever hosted.
            self.registry.release_if_drained(record);
        }
        Ok(())
    }

    /// Wait for global quiescence of the scope and close it
    ///
    /// Valid only at the scope's root. The wait pumps the transport between
    /// timed waits on the scope's quiescence signal: inbound credit messages
    /// are dispatched by this very thread, so blocking without pumping would
    /// deadlock the detection. On success the aggregated failures are
    /// returned and the registry slot is released for id reuse.
    pub fn end(&self, record: FinishRecord) -> FinishResult<FinishOutcome> {
        if record.root != self.here {
            return Err(FinishError::NotRoot {
                record,
                here: self.here,
            });
        }
        let entry = self.registry.get(record)?;

        loop {
            self.transport.probe()?;
            if entry.is_quiescent() {
                break;
            }
            entry.wait_quiescent_for(self.quiescence_poll);
        }

        // All remote writes applied by credit handlers must be visible to
        // the caller before the scope is declared finished.
        fence(Ordering::Acquire);

        let failures = entry.drain_failures();
        self.registry.remove(record)?;
        debug!(scope = %record, failures = failures.len(), "finish scope ended");
        Ok(FinishOutcome { failures })
    }
}
