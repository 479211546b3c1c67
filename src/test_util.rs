// Copyright 2025 TiKV Project Authors. Licensed under Apache-2.0.

//! Minimal cluster and sink stand-ins for unit tests that need a real
//! `BalanceSolver` without a full mock cluster.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cluster::{BucketStat, ClusterView, RegionInfo, StoreInfo};
use crate::config::HotRegionSchedulerConfig;
use crate::error::Result;
use crate::operator::{OpKind, Operator, OperatorSink, SplitPolicy};
use crate::pending::PendingLedger;
use crate::solver::BalanceSolver;
use crate::stats::{HotPeerStat, StoreLoad, StoreLoadDetail, StoreLoadPred};
use crate::types::{OpType, RWType};

#[derive(Default)]
pub(crate) struct TestCluster;

impl ClusterView for TestCluster {
    fn stores(&self) -> Vec<Arc<StoreInfo>> {
        Vec::new()
    }

    fn region(&self, _region_id: u64) -> Option<Arc<RegionInfo>> {
        None
    }

    fn hot_peer_stats(&self, _rw: RWType) -> HashMap<u64, Vec<Arc<HotPeerStat>>> {
        HashMap::new()
    }

    fn hot_peer_stat(
        &self,
        _rw: RWType,
        _region_id: u64,
        _store_id: u64,
    ) -> Option<Arc<HotPeerStat>> {
        None
    }

    fn stores_loads(&self) -> HashMap<u64, Vec<f64>> {
        HashMap::new()
    }

    fn bucket_stats(&self, _min_hot_degree: u64, _region_ids: &[u64]) -> HashMap<u64, Vec<BucketStat>> {
        HashMap::new()
    }

    fn is_region_replicated(&self, _region: &RegionInfo) -> bool {
        true
    }

    fn placement_allows_peer(&self, _region: &RegionInfo, _src: u64, _dst: u64) -> bool {
        true
    }

    fn placement_allows_leader(
        &self,
        _region: &RegionInfo,
        _src: u64,
        _dst: u64,
        _allow_move_leader: bool,
    ) -> bool {
        true
    }

    fn query_supported(&self) -> bool {
        true
    }

    fn region_buckets_enabled(&self) -> bool {
        false
    }

    fn max_movable_hot_peer_size(&self) -> i64 {
        10_000
    }

    fn hot_region_cache_hits_threshold(&self) -> u64 {
        3
    }

    fn trace_region_flow(&self) -> bool {
        false
    }
}

pub(crate) struct TestSink;

impl OperatorSink for TestSink {
    fn create_transfer_leader(
        &self,
        desc: &str,
        region: &RegionInfo,
        _src_store: u64,
        _dst_store: u64,
    ) -> Result<Operator> {
        Ok(Operator::new(desc, region.id, OpKind::HotRegion))
    }

    fn create_move_leader(
        &self,
        desc: &str,
        region: &RegionInfo,
        _src_store: u64,
        _dst_store: u64,
        _role: crate::cluster::PeerRole,
    ) -> Result<Operator> {
        Ok(Operator::new(desc, region.id, OpKind::HotRegion))
    }

    fn create_move_peer(
        &self,
        desc: &str,
        region: &RegionInfo,
        _src_store: u64,
        _dst_store: u64,
        _role: crate::cluster::PeerRole,
    ) -> Result<Operator> {
        Ok(Operator::new(desc, region.id, OpKind::HotRegion))
    }

    fn create_split_region(
        &self,
        desc: &str,
        region: &RegionInfo,
        _policy: SplitPolicy,
        _split_keys: Vec<Vec<u8>>,
    ) -> Result<Operator> {
        Ok(Operator::new(desc, region.id, OpKind::HotRegionSplit))
    }

    fn operator_count(&self, _kind: OpKind) -> u64 {
        0
    }

    fn hot_region_schedule_limit(&self) -> u64 {
        4
    }
}

/// A solver over an empty store map; tests fill `cur` by hand.
pub(crate) fn new_test_solver<'a>(
    cluster: &'a TestCluster,
    sink: &'a TestSink,
    cfg: &'a HotRegionSchedulerConfig,
    rw: RWType,
    op: OpType,
) -> BalanceSolver<'a, TestCluster, TestSink> {
    BalanceSolver::new(
        cluster,
        sink,
        cfg,
        rw,
        op,
        HashMap::new(),
        &PendingLedger::default(),
        false,
    )
}

/// A store detail with degenerate prediction (no pending influence) and the
/// given byte/key rates.
pub(crate) fn load_detail(store_id: u64, byte: f64, key: f64) -> Arc<StoreLoadDetail> {
    let current = StoreLoad {
        loads: [byte, key, 0.0],
        count: 1.0,
        history_loads: Vec::new(),
    };
    Arc::new(StoreLoadDetail {
        store: Arc::new(StoreInfo::new(store_id)),
        is_tiflash: false,
        load_pred: StoreLoadPred {
            current: current.clone(),
            future: current,
            ..Default::default()
        },
        hot_peers: Vec::new(),
    })
}

pub(crate) fn hot_peer(region_id: u64, store_id: u64, byte: f64, key: f64) -> Arc<HotPeerStat> {
    Arc::new(HotPeerStat {
        region_id,
        store_id,
        loads: [byte, key, 0.0],
        hot_degree: 3,
        is_leader: true,
        needs_cooldown: false,
    })
}

pub(crate) fn empty_region(id: u64) -> Arc<RegionInfo> {
    Arc::new(RegionInfo {
        id,
        start_key: Vec::new(),
        end_key: Vec::new(),
        peers: Vec::new(),
        leader_store_id: 0,
        approximate_size: 10,
        bucket_keys: Vec::new(),
        down_peer_ids: Vec::new(),
        pending_peer_ids: Vec::new(),
    })
}
