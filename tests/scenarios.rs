// Copyright 2025 TiKV Project Authors. Licensed under Apache-2.0.

//! End-to-end scheduling scenarios over an in-memory cluster.

mod common;

use common::{MockCluster, MockSink};
use hotspot_scheduler::metrics;
use hotspot_scheduler::operator::OpStatus;
use hotspot_scheduler::types::{RWType, ResourceType};
use hotspot_scheduler::{HotRegionSchedulerConfig, HotScheduler, SharedHotRegionConfig};

fn default_scheduler() -> HotScheduler {
    HotScheduler::with_seed(SharedHotRegionConfig::default(), 7)
}

/// Three stores, one clearly hot read leader: the scheduler transfers the
/// leadership to one of the cold followers and tracks the region as
/// pending.
fn hot_read_leader_cluster() -> MockCluster {
    let mut cluster = MockCluster::default();
    for id in 1..=3 {
        cluster.add_store(id);
    }
    cluster.set_read_loads(1, 10_000.0, 10_000.0);
    cluster.set_read_loads(2, 1_000.0, 1_000.0);
    cluster.set_read_loads(3, 1_000.0, 1_000.0);
    cluster.add_region(7, &[1, 2, 3], 1);
    cluster.add_hot_peer(RWType::Read, 7, 1, 4_000.0, 4_000.0, true);
    cluster
}

#[test]
fn test_hot_read_leader_clear_winner() {
    let cluster = hot_read_leader_cluster();
    let sink = MockSink::new();
    let mut scheduler = default_scheduler();

    let ops = scheduler.dispatch(ResourceType::ReadLeader, &cluster, &sink);
    assert_eq!(ops.len(), 1);
    let op = &ops[0];
    assert_eq!(op.desc(), "transfer-hot-read-leader");
    assert_eq!(op.region_id(), 7);
    assert!(!op.kind().is_split());
    assert_eq!(op.additional_info("from"), Some("1"));
    let dst: u64 = op.additional_info("to").unwrap().parse().unwrap();
    assert!(dst == 2 || dst == 3);
    assert_eq!(scheduler.pending_regions(), vec![7]);

    // The sink saw the same request.
    let records = sink.created.lock().unwrap();
    assert!(records
        .iter()
        .any(|r| r.region_id == 7 && r.src_store == 1 && r.dst_store == dst));
}

/// The same clear-winner cluster scheduled under rank formula v1: the
/// decline ratio of both dimensions qualifies as a great decrease.
#[test]
fn test_hot_read_leader_rank_v1() {
    let cluster = hot_read_leader_cluster();
    let sink = MockSink::new();
    let mut cfg = HotRegionSchedulerConfig::default();
    cfg.rank_formula_version = "v1".to_owned();
    let mut scheduler = HotScheduler::with_seed(SharedHotRegionConfig::new(cfg), 7);

    let ops = scheduler.dispatch(ResourceType::ReadLeader, &cluster, &sink);
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].desc(), "transfer-hot-read-leader");
    assert_eq!(ops[0].region_id(), 7);
    assert_eq!(scheduler.pending_regions(), vec![7]);
}

/// Hot write leaders balance on leader-peer sums: a store carrying several
/// hot write leaders sheds one to a cold peer store.
#[test]
fn test_hot_write_leader_balance() {
    let mut cluster = MockCluster::default();
    for id in 1..=3 {
        cluster.add_store(id);
    }
    // Store-level write loads only feed the query dimension for the leader
    // flavor; byte and key rates come from the hot leader peers.
    for region_id in 71..=75 {
        cluster.add_region(region_id, &[1, 2, 3], 1);
        cluster.add_hot_peer(RWType::Write, region_id, 1, 200.0, 200.0, true);
    }
    cluster.add_region(8, &[2, 3, 1], 2);
    cluster.add_hot_peer(RWType::Write, 8, 2, 100.0, 100.0, true);
    cluster.add_region(9, &[3, 2, 1], 3);
    cluster.add_hot_peer(RWType::Write, 9, 3, 100.0, 100.0, true);

    let sink = MockSink::new();
    let mut scheduler = default_scheduler();
    let ops = scheduler.dispatch(ResourceType::WriteLeader, &cluster, &sink);
    assert_eq!(ops.len(), 1);
    let op = &ops[0];
    assert_eq!(op.desc(), "transfer-hot-write-leader");
    assert!((71..=75).contains(&op.region_id()));
    assert_eq!(op.additional_info("from"), Some("1"));
    let dst: u64 = op.additional_info("to").unwrap().parse().unwrap();
    assert!(dst == 2 || dst == 3);
    assert_eq!(scheduler.pending_regions(), vec![op.region_id()]);
}

/// Re-running the scheduler with no cluster change must yield nothing: the
/// pending entry of the first tick keeps the region out of the candidates.
/// This covers both the idempotence property and the pending-conflict
/// scenario.
#[test]
fn test_pending_region_blocks_reschedule() {
    let cluster = hot_read_leader_cluster();
    let sink = MockSink::new();
    let mut scheduler = default_scheduler();

    let first = scheduler.dispatch(ResourceType::ReadLeader, &cluster, &sink);
    assert_eq!(first.len(), 1);
    let second = scheduler.dispatch(ResourceType::ReadLeader, &cluster, &sink);
    assert!(second.is_empty());
    assert_eq!(scheduler.pending_regions(), vec![7]);
}

/// A canceled operator keeps blocking its region through the zombie window;
/// once the window is gone the ledger drains and the region is schedulable
/// again.
#[test]
fn test_ledger_drains_after_zombie_window() {
    let cluster = hot_read_leader_cluster();
    let sink = MockSink::new();
    let mut scheduler = default_scheduler();

    let ops = scheduler.dispatch(ResourceType::ReadLeader, &cluster, &sink);
    assert_eq!(ops.len(), 1);
    ops[0].mark(OpStatus::Canceled);

    // Still blocked: canceled operators are retained for the zombie window.
    let blocked = scheduler.dispatch(ResourceType::ReadLeader, &cluster, &sink);
    assert!(blocked.is_empty());
    assert_eq!(scheduler.pending_regions(), vec![7]);

    // Collapse the zombie window and the next tick re-schedules the region.
    let mut cfg = scheduler.config().snapshot();
    cfg.max_zombie_rounds = 0;
    scheduler.config().update(cfg).unwrap();
    let retried = scheduler.dispatch(ResourceType::ReadLeader, &cluster, &sink);
    assert_eq!(retried.len(), 1);
    assert_eq!(retried[0].region_id(), 7);
}

/// Uniform stores: loads spread within the stddev threshold are not worth
/// balancing, every candidate is skipped with the `all` label.
#[test]
fn test_uniform_stores_skip_all() {
    let mut cluster = MockCluster::default();
    for id in 1..=20 {
        cluster.add_store(id);
    }
    for id in 1..=20 {
        cluster.set_read_loads(id, 100.0, 100.0);
    }
    // One store marginally above the source gate, one marginally below the
    // destination gate; the coefficient of variation stays under the
    // uniformity threshold on both dimensions.
    cluster.set_read_loads(1, 110.0, 110.0);
    cluster.set_read_loads(20, 85.0, 85.0);
    cluster.add_region(7, &[1, 2, 20], 1);
    cluster.add_hot_peer(RWType::Read, 7, 1, 300.0, 300.0, true);

    let sink = MockSink::new();
    let mut scheduler = default_scheduler();
    let skipped_before = metrics::UNIFORM_SKIP_COUNTER_VEC
        .with_label_values(&["read", "all"])
        .get();
    let ops = scheduler.dispatch(ResourceType::ReadLeader, &cluster, &sink);
    assert!(ops.is_empty());
    assert!(scheduler.pending_regions().is_empty());
    let skipped_after = metrics::UNIFORM_SKIP_COUNTER_VEC
        .with_label_values(&["read", "all"])
        .get();
    assert!(skipped_after > skipped_before);
}

/// Two stores hot on opposite dimensions. A single move always worsens one
/// dimension, so the first tick emits nothing but arms the revert search;
/// the second tick pairs the move with a counter-move and emits both.
#[test]
fn test_revert_region_hedge() {
    let mut cluster = MockCluster::default();
    for id in 1..=4 {
        cluster.add_store(id);
    }
    cluster.set_write_loads(1, 10_000.0, 4_000.0);
    cluster.set_write_loads(2, 4_000.0, 10_000.0);
    cluster.set_write_loads(3, 4_000.0, 4_000.0);
    cluster.set_write_loads(4, 4_000.0, 4_000.0);
    cluster.add_region(1, &[1, 3, 4], 3);
    cluster.add_region(2, &[2, 3, 4], 4);
    for store_id in [1, 3, 4] {
        cluster.add_hot_peer(RWType::Write, 1, store_id, 6_000.0, 1_000.0, store_id == 3);
    }
    for store_id in [2, 3, 4] {
        cluster.add_hot_peer(RWType::Write, 2, store_id, 3_000.0, 4_000.0, store_id == 4);
    }

    let mut cfg = HotRegionSchedulerConfig::default();
    // The revert search only arms without strict store picking.
    cfg.strict_picking_store = false;
    let sink = MockSink::new();
    let mut scheduler = HotScheduler::with_seed(SharedHotRegionConfig::new(cfg), 7);

    let first = scheduler.dispatch(ResourceType::WritePeer, &cluster, &sink);
    assert!(first.is_empty());
    assert!(scheduler.pending_regions().is_empty());

    let second = scheduler.dispatch(ResourceType::WritePeer, &cluster, &sink);
    assert_eq!(second.len(), 2);
    let main = &second[0];
    let revert = &second[1];
    assert_eq!(main.desc(), "move-hot-write-peer");
    assert_eq!(revert.desc(), "move-hot-write-peer");
    assert_eq!(main.region_id(), 1);
    assert_eq!(main.additional_info("from"), Some("1"));
    assert_eq!(main.additional_info("to"), Some("2"));
    assert_eq!(revert.region_id(), 2);
    assert_eq!(revert.additional_info("from"), Some("2"));
    assert_eq!(revert.additional_info("to"), Some("1"));

    let mut pending = scheduler.pending_regions();
    pending.sort_unstable();
    assert_eq!(pending, vec![1, 2]);
}

/// A region too large to move is split at its median bucket boundary
/// instead; the split charges every holder store in the ledger.
#[test]
fn test_oversized_region_splits_by_size() {
    let mut cluster = MockCluster::default();
    for id in 1..=4 {
        cluster.add_store(id);
    }
    cluster.set_write_loads(1, 10_000.0, 10_000.0);
    for id in 2..=4 {
        cluster.set_write_loads(id, 1_000.0, 1_000.0);
    }
    cluster.max_movable_size = 512;
    cluster.add_region_with_size(9, &[1, 3, 4], 3, 2_048);
    cluster.set_region_bucket_keys(9, &[b"d", b"h", b"p"]);
    cluster.add_hot_peer(RWType::Write, 9, 1, 4_000.0, 4_000.0, false);

    let sink = MockSink::new();
    let mut scheduler = default_scheduler();
    let ops = scheduler.dispatch(ResourceType::WritePeer, &cluster, &sink);
    assert_eq!(ops.len(), 1);
    let op = &ops[0];
    assert!(op.kind().is_split());
    assert_eq!(op.desc(), "split-hot-write-region");
    assert_eq!(op.region_id(), 9);
    assert_eq!(op.additional_info("split-keys"), Some("h"));
    assert_eq!(scheduler.pending_regions(), vec![9]);

    let records = sink.created.lock().unwrap();
    assert!(records
        .iter()
        .any(|r| r.desc == "split-hot-write-region" && r.split_keys == vec![b"h".to_vec()]));
}

/// A peer carrying more than `split-thresholds` of its store's load is
/// split at the bucket boundary closest to half the hottest dimension's
/// total.
#[test]
fn test_too_hot_region_splits_by_load() {
    let mut cluster = MockCluster::default();
    for id in 1..=3 {
        cluster.add_store(id);
    }
    cluster.set_write_loads(1, 10_000.0, 10_000.0);
    cluster.set_write_loads(2, 1_000.0, 1_000.0);
    cluster.set_write_loads(3, 1_000.0, 1_000.0);
    cluster.buckets_enabled = true;
    cluster.add_region(9, &[1, 2, 3], 2);
    cluster.add_hot_peer(RWType::Write, 9, 1, 4_000.0, 4_000.0, false);
    cluster.add_bucket(9, b"a", b"f", [0, 0, 0, 500, 50, 0]);
    cluster.add_bucket(9, b"f", b"m", [0, 0, 0, 300, 30, 0]);
    cluster.add_bucket(9, b"m", b"z", [0, 0, 0, 200, 20, 0]);

    let sink = MockSink::new();
    let mut scheduler = default_scheduler();
    let ops = scheduler.dispatch(ResourceType::WritePeer, &cluster, &sink);
    assert_eq!(ops.len(), 1);
    let op = &ops[0];
    assert!(op.kind().is_split());
    assert_eq!(op.region_id(), 9);
    assert_eq!(op.additional_info("split-keys"), Some("f"));
    assert_eq!(op.additional_info("total-loads"), Some("1000"));
    assert_eq!(scheduler.pending_regions(), vec![9]);
}

/// Sources within the tolerance band of the expectation are not admitted.
#[test]
fn test_src_tolerance_gate() {
    let mut cluster = MockCluster::default();
    for id in 1..=3 {
        cluster.add_store(id);
    }
    // Store 1 runs at 1.1x the expectation, below the 1.2 gate.
    cluster.set_read_loads(1, 4_400.0, 4_400.0);
    cluster.set_read_loads(2, 3_800.0, 3_800.0);
    cluster.set_read_loads(3, 3_800.0, 3_800.0);
    cluster.add_region(7, &[1, 2, 3], 1);
    cluster.add_hot_peer(RWType::Read, 7, 1, 300.0, 300.0, true);

    let mut cfg = HotRegionSchedulerConfig::default();
    cfg.src_tolerance_ratio = 1.2;
    let sink = MockSink::new();
    let mut scheduler = HotScheduler::with_seed(SharedHotRegionConfig::new(cfg), 7);

    let failed_before = metrics::STORE_RESULT_COUNTER_VEC
        .with_label_values(&["src-store-failed-read-leader", "1"])
        .get();
    let ops = scheduler.dispatch(ResourceType::ReadLeader, &cluster, &sink);
    assert!(ops.is_empty());
    assert!(scheduler.pending_regions().is_empty());
    let failed_after = metrics::STORE_RESULT_COUNTER_VEC
        .with_label_values(&["src-store-failed-read-leader", "1"])
        .get();
    assert!(failed_after > failed_before);
}

/// The operator-count gate returns an empty batch before any preparation.
#[test]
fn test_schedule_respects_operator_limit() {
    let cluster = hot_read_leader_cluster();
    let mut sink = MockSink::new();
    sink.scheduled = sink.limit;
    let mut scheduler = default_scheduler();
    assert!(scheduler.schedule(&cluster, &sink).is_empty());
    assert!(scheduler.pending_regions().is_empty());
}

/// A masked statistics side yields nothing, whichever flavor is asked for.
#[test]
fn test_forbid_rw_type() {
    let cluster = hot_read_leader_cluster();
    let sink = MockSink::new();
    let mut cfg = HotRegionSchedulerConfig::default();
    cfg.forbid_rw_type = "read".to_owned();
    let mut scheduler = HotScheduler::with_seed(SharedHotRegionConfig::new(cfg), 7);
    let ops = scheduler.dispatch(ResourceType::ReadLeader, &cluster, &sink);
    assert!(ops.is_empty());
    assert!(scheduler.pending_regions().is_empty());
}

/// Random-flavor scheduling never emits more than a main plus revert pair
/// and anything emitted is tracked by the ledger.
#[test]
fn test_schedule_batch_invariants() {
    let cluster = hot_read_leader_cluster();
    let sink = MockSink::new();
    let mut scheduler = default_scheduler();
    for _ in 0..16 {
        let ops = scheduler.schedule(&cluster, &sink);
        assert!(ops.len() <= 2);
        if !ops.is_empty() {
            assert!(!scheduler.pending_regions().is_empty());
        }
    }
}
