//! Credit propagation
//!
//! When a non-root place locally quiesces for a scope, it reports everything
//! it currently knows about the scope's outstanding work to the root as a
//! list of signed per-place deltas, then forgets it. Knowledge may have
//! arrived transitively from credits this place itself received earlier, so
//! a place can relay credit it did not originate. At the root the deltas are
//! summed into the scope's table; the table converges to the true
//! outstanding counts only once every in-flight report has been applied.

use std::sync::Arc;
use tracing::{debug, trace};

use crate::transport::wire::{self, CreditMessage, FailureMessage};
use crate::transport::{Envelope, MessageKind, Transport};

use super::error::FinishResult;
use super::place::FinishRecord;
use super::registry::{FinishRegistry, ScopeEntry};

/// Builds and transmits credit reports from non-root places to scope roots
pub struct CreditPropagator {
    transport: Arc<dyn Transport>,
}

impl CreditPropagator {
    /// Create a propagator sending through `transport`
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Report a local quiescence event to the scope's root
    ///
    /// Locally aggregated failures travel first, in their own message, so
    /// that ordered delivery guarantees the root has seen them before the
    /// credit report that could release its `end()` wait. The send buffers
    /// are owned by the transport calls and confirmed with `wait` before
    /// this function returns.
    pub fn propagate(&self, entry: &ScopeEntry) -> FinishResult<()> {
        let record = entry.record();

        let failures = entry.drain_failures();
        if !failures.is_empty() {
            debug!(scope = %record, count = failures.len(), "forwarding activity failures to root");
            let payload = wire::encode(&FailureMessage {
                finish_id: record.id,
                failures,
            })?;
            let receipt = self
                .transport
                .send(record.root, MessageKind::Failure, payload)?;
            self.transport.wait(receipt)?;
        }

        let tuples = entry.drain_credits();
        debug!(scope = %record, tuples = tuples.len(), "propagating credits to root");
        let payload = wire::encode(&CreditMessage {
            finish_id: record.id,
            tuples,
        })?;
        let receipt = self
            .transport
            .send(record.root, MessageKind::Credit, payload)?;
        self.transport.wait(receipt)?;
        Ok(())
    }

    /// Register the root-side arrival handlers on `transport`
    ///
    /// Credits are only ever addressed to a scope's root, so the receiving
    /// handler reconstructs the scope record from its own place id.
    pub fn register_handlers(registry: Arc<FinishRegistry>, transport: &Arc<dyn Transport>) {
        let here = transport.here();

        let credit_registry = Arc::clone(&registry);
        transport.register_handler(
            MessageKind::Credit,
            Arc::new(move |envelope: Envelope| {
                let message: CreditMessage = wire::decode(&envelope.payload)?;
                let record = FinishRecord::new(message.finish_id, here);
                trace!(scope = %record, source = %envelope.source, tuples = message.tuples.len(),
                       "applying credit report");
                let entry = credit_registry.get(record)?;
                entry.apply_credits(&message.tuples);
                Ok(())
            }),
        );

        transport.register_handler(
            MessageKind::Failure,
            Arc::new(move |envelope: Envelope| {
                let message: FailureMessage = wire::decode(&envelope.payload)?;
                let record = FinishRecord::new(message.finish_id, here);
                debug!(scope = %record, source = %envelope.source, count = message.failures.len(),
                       "aggregating remote activity failures");
                let entry = registry.get(record)?;
                entry.record_failures(message.failures);
                Ok(())
            }),
        );
    }
}
