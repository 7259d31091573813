//! Integration tests for credit propagation across several places
//!
//! Exercises relayed credit knowledge, out-of-order report arrival, and
//! repeated quiescence events at the same worker.

use std::sync::Arc;

use tally::runtime::place::PlaceId;
use tally::transport::loopback::{LoopbackMesh, LoopbackTransport};
use tally::transport::Transport;
use tally::{PlaceConfig, PlaceRuntime};

fn cluster(places: u32) -> Vec<(PlaceRuntime, Arc<LoopbackTransport>)> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let mesh = LoopbackMesh::new(places);
    (0..places)
        .map(|index| {
            let endpoint = mesh.endpoint(PlaceId::new(index));
            let transport: Arc<dyn Transport> = endpoint.clone();
            let config = PlaceConfig {
                places,
                ..Default::default()
            };
            (PlaceRuntime::new(config, transport).unwrap(), endpoint)
        })
        .collect()
}

#[test]
fn test_relayed_credit_chain() {
    let cluster = cluster(3);
    let (root, _) = &cluster[0];
    let (middle, _) = &cluster[1];
    let (leaf, _) = &cluster[2];

    let record = root.begin().unwrap();

    // Root spawns at the middle place; the middle activity spawns onward to
    // the leaf before completing.
    root.register_child(record, middle.here()).unwrap();
    middle.activity_arrived(record).unwrap();
    middle.register_child(record, leaf.here()).unwrap();
    leaf.activity_arrived(record).unwrap();

    // Middle quiesces first: its report relays the +1 it holds for the leaf,
    // work the root has never heard of.
    middle.child_completed(record).unwrap();
    root.transport().probe().unwrap();
    let entry = root.registry().get(record).unwrap();
    assert!(
        !entry.is_quiescent(),
        "leaf work is still outstanding after the relayed report"
    );

    leaf.child_completed(record).unwrap();
    let outcome = root.end(record).unwrap();
    assert!(outcome.is_success());
}

#[test]
fn test_reports_converge_regardless_of_arrival_order() {
    let cluster = cluster(3);
    let (root, _) = &cluster[0];
    let (middle, _) = &cluster[1];
    let (leaf, _) = &cluster[2];

    let record = root.begin().unwrap();
    root.register_child(record, middle.here()).unwrap();
    middle.activity_arrived(record).unwrap();
    middle.register_child(record, leaf.here()).unwrap();
    leaf.activity_arrived(record).unwrap();

    // Leaf completes and reports before the middle does: the root sees a
    // negative entry for the leaf until the relayed +1 arrives.
    leaf.child_completed(record).unwrap();
    root.transport().probe().unwrap();
    let entry = root.registry().get(record).unwrap();
    assert!(!entry.is_quiescent());

    middle.child_completed(record).unwrap();
    let outcome = root.end(record).unwrap();
    assert!(outcome.is_success());
}

#[test]
fn test_worker_requiescence_reports_again() {
    let cluster = cluster(2);
    let (root, _) = &cluster[0];
    let (worker, worker_transport) = &cluster[1];

    let record = root.begin().unwrap();

    // First wave: one activity, one credit report.
    root.register_child(record, worker.here()).unwrap();
    worker.activity_arrived(record).unwrap();
    worker.child_completed(record).unwrap();
    assert_eq!(worker_transport.sent_count(), 1);

    // Second wave re-activates the drained worker row; a fresh quiescence
    // event must produce a fresh report.
    root.register_child(record, worker.here()).unwrap();
    worker.activity_arrived(record).unwrap();
    worker.child_completed(record).unwrap();
    assert_eq!(worker_transport.sent_count(), 2);

    let outcome = root.end(record).unwrap();
    assert!(outcome.is_success());
}

#[test]
fn test_failures_from_several_places_aggregate() {
    let cluster = cluster(3);
    let (root, _) = &cluster[0];
    let (middle, _) = &cluster[1];
    let (leaf, _) = &cluster[2];

    let record = root.begin().unwrap();
    root.register_child(record, middle.here()).unwrap();
    root.register_child(record, leaf.here()).unwrap();

    middle.activity_arrived(record).unwrap();
    leaf.activity_arrived(record).unwrap();
    middle.child_failed(record, "middle raised").unwrap();
    leaf.child_failed(record, "leaf raised").unwrap();

    let outcome = root.end(record).unwrap();
    assert_eq!(outcome.exception_count(), 2);

    let mut places: Vec<PlaceId> = outcome.failures.iter().map(|f| f.place).collect();
    places.sort();
    assert_eq!(places, vec![middle.here(), leaf.here()]);
}

#[test]
fn test_concurrent_completions_at_one_place() {
    let cluster = cluster(2);
    let (root, _) = &cluster[0];
    let (worker, worker_transport) = &cluster[1];

    let record = root.begin().unwrap();
    for _ in 0..8 {
        root.register_child(record, worker.here()).unwrap();
        worker.activity_arrived(record).unwrap();
    }

    // All eight activities complete from competing threads; only the final
    // completion may claim the quiescence event.
    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| worker.child_completed(record).unwrap());
        }
    });
    assert_eq!(worker_transport.sent_count(), 1);

    let outcome = root.end(record).unwrap();
    assert!(outcome.is_success());
}
