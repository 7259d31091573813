//! Message transport boundary
//!
//! The finish protocol is layered on an external point-to-point transport
//! that provides reliable, order-preserving delivery between places. This
//! module defines the contract the protocol consumes plus an in-process
//! reference implementation ([`loopback::LoopbackTransport`]) used by tests
//! and by embedders running several places inside one process.

use std::sync::Arc;

pub mod loopback;
pub mod wire;

use crate::runtime::error::TransportResult;
use crate::runtime::place::PlaceId;

/// Kind tag of a protocol message, dispatched to a registered handler at the
/// destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum MessageKind {
    /// Credit delta report from a non-root place to a scope's root
    Credit,
    /// Aggregated activity failures forwarded to a scope's root
    Failure,
}

impl MessageKind {
    /// Stable name for diagnostics
    pub const fn name(&self) -> &'static str {
        match self {
            MessageKind::Credit => "credit",
            MessageKind::Failure => "failure",
        }
    }
}

/// A delivered message as seen by a handler
#[derive(Debug, Clone)]
pub struct Envelope {
    /// The place that sent the message
    pub source: PlaceId,
    /// Message kind tag
    pub kind: MessageKind,
    /// Encoded payload, fully received before dispatch
    pub payload: Vec<u8>,
}

/// Opaque token for an in-flight send operation
///
/// Returned by [`Transport::send`]; passing it to [`Transport::wait`] blocks
/// until the local send has fully completed. The payload buffer is moved into
/// the transport on send, so it cannot be observed after release regardless
/// of confirmation timing.
#[derive(Debug)]
pub struct SendReceipt(pub(crate) u64);

/// Handler invoked at the destination once a message's payload has been
/// fully received
pub type MessageHandler = Arc<dyn Fn(Envelope) -> anyhow::Result<()> + Send + Sync>;

/// Point-to-point asynchronous message transport between places
///
/// Implementations must preserve per-sender ordering and deliver reliably;
/// retry and backoff belong below this boundary, not in the protocol.
pub trait Transport: Send + Sync {
    /// The place this endpoint belongs to
    fn here(&self) -> PlaceId;

    /// Number of places in the cluster
    fn places(&self) -> u32;

    /// Enqueue a message toward `target` without blocking
    fn send(
        &self,
        target: PlaceId,
        kind: MessageKind,
        payload: Vec<u8>,
    ) -> TransportResult<SendReceipt>;

    /// Block until the send identified by `receipt` has locally completed
    fn wait(&self, receipt: SendReceipt) -> TransportResult<()>;

    /// Associate `handler` with inbound messages of `kind`
    fn register_handler(&self, kind: MessageKind, handler: MessageHandler);

    /// Drain and dispatch pending inbound messages without blocking
    ///
    /// Returns the number of messages dispatched. The finish protocol calls
    /// this inside `end()`'s wait loop; a thread blocked in `end()` must keep
    /// pumping or no credit can ever arrive to resolve the wait.
    fn probe(&self) -> TransportResult<usize>;
}
