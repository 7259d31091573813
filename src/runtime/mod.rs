//! Runtime orchestrator and public API
//!
//! This module provides the per-place `PlaceRuntime` struct that wires the
//! registry, credit propagator, and controller to a transport endpoint and
//! exposes the public interface for embedding the finish protocol.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

// Submodules
pub mod controller;
pub mod credit;
pub mod error;
pub mod place;
pub mod registry;

use crate::transport::Transport;
use credit::CreditPropagator;
use error::FinishResult;
use place::{ActivityFailure, FinishRecord, PlaceId};
use registry::FinishRegistry;

/// Configuration for one place's finish runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceConfig {
    /// Number of places in the cluster
    pub places: u32,

    /// Maximum concurrently live finish scopes at this place
    pub max_live_scopes: usize,

    /// Slice of `end()`'s wait between transport pumps
    pub quiescence_poll: Duration,
}

impl Default for PlaceConfig {
    fn default() -> Self {
        Self {
            places: 1,
            max_live_scopes: 100,
            quiescence_poll: Duration::from_micros(200),
        }
    }
}

/// Per-place finish protocol runtime
///
/// Coordinates the registry, credit propagator, and scope controller over
/// one transport endpoint. Every operation is safe to call from multiple
/// locally concurrent activities.
pub struct PlaceRuntime {
    config: PlaceConfig,
    registry: Arc<FinishRegistry>,
    controller: FinishController,
    transport: Arc<dyn Transport>,
}

impl PlaceRuntime {
    /// Create a runtime for the place behind `transport`
    ///
    /// Registers the credit and failure arrival handlers; a place must be
    /// ready to receive reports for scopes it roots before any of its spawns
    /// reach the network.
    pub fn new(config: PlaceConfig, transport: Arc<dyn Transport>) -> anyhow::Result<Self> {
        if transport.places() != config.places {
            anyhow::bail!(
                "transport spans {} places but the configuration expects {}",
                transport.places(),
                config.places
            );
        }
        if transport.here().index() >= config.places {
            anyhow::bail!(
                "place {} is outside the configured cluster of {} places",
                transport.here(),
                config.places
            );
        }

        let registry = Arc::new(FinishRegistry::new(config.places, config.max_live_scopes));
        CreditPropagator::register_handlers(Arc::clone(&registry), &transport);
        let controller = FinishController::new(
            Arc::clone(&registry),
            Arc::clone(&transport),
            config.quiescence_poll,
        );

        Ok(Self {
            config,
            registry,
            controller,
            transport,
        })
    }

    /// Get the current configuration
    pub fn config(&self) -> &PlaceConfig {
        &self.config
    }

    /// The place this runtime executes at
    pub fn here(&self) -> PlaceId {
        self.controller.here()
    }

    /// Get the finish registry
    pub fn registry(&self) -> &Arc<FinishRegistry> {
        &self.registry
    }

    /// Get the transport endpoint
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Open a fresh finish scope rooted here
    pub fn begin(&self) -> FinishResult<FinishRecord> {
        self.controller.begin()
    }

    /// Open the single top-level global finish scope (place 0 only)
    pub fn begin_global(&self) -> FinishResult<FinishRecord> {
        self.controller.begin_global()
    }

    /// Register a child activity about to be spawned toward `dest`
    pub fn register_child(&self, record: FinishRecord, dest: PlaceId) -> FinishResult<()> {
        self.controller.register_child(record, dest)
    }

    /// Register the arrival of a remotely spawned activity for execution here
    pub fn activity_arrived(&self, record: FinishRecord) -> FinishResult<()> {
        self.controller.activity_arrived(record)
    }

    /// Report the successful completion of a tracked activity executing here
    pub fn child_completed(&self, record: FinishRecord) -> FinishResult<()> {
        self.controller.child_completed(record, None)
    }

    /// Report the completion of a tracked activity that raised
    pub fn child_failed(
        &self,
        record: FinishRecord,
        message: impl Into<String>,
    ) -> FinishResult<()> {
        let failure = ActivityFailure::new(self.here(), message);
        self.controller.child_completed(record, Some(failure))
    }

    /// Wait for global quiescence of the scope and close it (root only)
    pub fn end(&self, record: FinishRecord) -> FinishResult<FinishOutcome> {
        self.controller.end(record)
    }
}

// Re-export commonly used types
pub use controller::{FinishController, FinishOutcome};
pub use place::{ActivityId, FinishId};
