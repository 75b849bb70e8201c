use chunkwire_protocol::snapshot::EntitySnapshot;
use chunkwire_server::chunk_grid::ChunkGrid;
use chunkwire_server::entity::EntityRegistry;
use chunkwire_server::peer::{ObserverId, PeerTable};
use chunkwire_server::tracker::InterestTracker;
use chunkwire_net::PeerHandle;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

const INPUTS: [(&str, [(i32, i32); 4]); 6] = [
    ("(Small, Single Dir)", [(0, 1), (0, -1), (1, 0), (-1, 0)]),
    ("(Large, Single Dir)", [(0, 5), (0, -5), (5, 0), (-5, 0)]),
    (
        "(No Overlap, Single Dir)",
        [(0, 20), (0, -20), (20, 0), (-20, 0)],
    ),
    ("(Small, Multi Dir)", [(1, 2), (1, -2), (2, 1), (2, -1)]),
    ("(Large, Multi Dir)", [(2, 3), (2, -3), (3, 2), (3, -2)]),
    (
        "(No Overlap, Multi Dir)",
        [(20, 20), (20, -20), (20, 20), (20, -20)],
    ),
];

/// Populates a tracker with one observer (whose owned entity is the view's anchor) and 64
/// other entities scattered around the origin, one per chunk along a diagonal.
fn setup() -> (InterestTracker, EntityRegistry, ObserverId, chunkwire_server::entity::EntityId, ChunkGrid) {
    let grid = ChunkGrid::new(16, 16, 64);
    let mut tracker = InterestTracker::new(grid, 8);
    let mut registry = EntityRegistry::new();
    let mut peers = PeerTable::new();

    let owner = registry.create();
    let observer_id = peers.connect(PeerHandle(1), owner);
    tracker.track(owner);
    tracker.set_owner(owner, observer_id);
    tracker.set_chunk(owner, grid.chunk_from_world(0, 0));

    for i in 0..64i32 {
        let entity_id = registry.create();
        tracker.track(entity_id);
        let chunk_id = grid.chunk_from_world(i * 16, -i * 16);
        tracker.set_chunk(entity_id, chunk_id);
    }

    (tracker, registry, observer_id, owner, grid)
}

fn chunk_view_diff(c: &mut Criterion) {
    for (label, moves) in INPUTS {
        c.bench_function(&format!("chunk_view_diff {label}"), |b| {
            b.iter(|| {
                let (mut tracker, _registry, observer_id, owner, grid) = setup();
                let mut buffer = vec![0u8; 16 * 1024];
                for (dx, dy) in moves {
                    let moved_chunk = grid.chunk_from_world(dx * 16, dy * 16);
                    tracker.set_chunk(owner, moved_chunk);
                    let outcome = tracker.write(observer_id, &mut buffer, false, |_| {
                        Some(EntitySnapshot::new(0, 0, 0, &[]))
                    });
                    black_box(outcome);
                }
            })
        });
    }
}

criterion_group!(
    name = benches;
    config = Criterion::default().sample_size(200);
    targets = chunk_view_diff
);
criterion_main!(benches);
