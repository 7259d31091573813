//! Property tests for counter conservation and liveness
//!
//! Random interleavings of spawn/complete traffic across a small cluster
//! must always quiesce, and the failures surfaced by `end()` must match the
//! failures injected, regardless of where and in which order they occurred.

use std::sync::Arc;

use proptest::prelude::*;

use tally::runtime::place::PlaceId;
use tally::transport::loopback::{LoopbackMesh, LoopbackTransport};
use tally::transport::Transport;
use tally::{PlaceConfig, PlaceRuntime};

const PLACES: u32 = 3;

fn cluster() -> Vec<(PlaceRuntime, Arc<LoopbackTransport>)> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let mesh = LoopbackMesh::new(PLACES);
    (0..PLACES)
        .map(|index| {
            let endpoint = mesh.endpoint(PlaceId::new(index));
            let transport: Arc<dyn Transport> = endpoint.clone();
            let config = PlaceConfig {
                places: PLACES,
                ..Default::default()
            };
            (PlaceRuntime::new(config, transport).unwrap(), endpoint)
        })
        .collect()
}

proptest! {
    /// Any pairing-consistent interleaving of spawns and completions must
    /// let `end()` return, with the aggregate matching the injected failures.
    #[test]
    fn prop_interleaved_traffic_quiesces(
        ops in proptest::collection::vec((0u8..4, any::<u8>(), any::<u8>()), 0..60),
    ) {
        let cluster = cluster();
        let (root, _) = &cluster[0];
        let record = root.begin().unwrap();

        // Hosting place of every live (not yet completed) activity. Spawns
        // originate from the root or from any live activity's place, which
        // is exactly the set of places allowed to register children.
        let mut live: Vec<usize> = Vec::new();
        let mut injected_failures = 0usize;

        for (action, pick, target) in ops {
            if action < 2 {
                let src = if live.is_empty() {
                    0
                } else {
                    live[pick as usize % live.len()]
                };
                let dest = target as usize % PLACES as usize;
                let (spawner, _) = &cluster[src];
                spawner
                    .register_child(record, PlaceId::new(dest as u32))
                    .unwrap();
                if dest != src {
                    cluster[dest].0.activity_arrived(record).unwrap();
                }
                live.push(dest);
            } else if !live.is_empty() {
                let host = live.remove(pick as usize % live.len());
                let (executor, _) = &cluster[host];
                if target % 5 == 0 {
                    executor.child_failed(record, "injected").unwrap();
                    injected_failures += 1;
                } else {
                    executor.child_completed(record).unwrap();
                }
            }
        }

        // Complete whatever is still outstanding.
        while let Some(host) = live.pop() {
            cluster[host].0.child_completed(record).unwrap();
        }

        let outcome = root.end(record).unwrap();
        prop_assert_eq!(outcome.exception_count(), injected_failures);
        prop_assert_eq!(root.registry().live_count(), 0);
    }

    /// A scope whose activities all run at the root never touches the wire.
    #[test]
    fn prop_root_local_scopes_stay_silent(spawns in 0usize..20) {
        let cluster = cluster();
        let (root, transport) = &cluster[0];
        let here = root.here();

        let record = root.begin().unwrap();
        for _ in 0..spawns {
            root.register_child(record, here).unwrap();
        }
        for _ in 0..spawns {
            root.child_completed(record).unwrap();
        }

        let outcome = root.end(record).unwrap();
        prop_assert!(outcome.is_success());
        prop_assert_eq!(transport.sent_count(), 0);
    }
}
