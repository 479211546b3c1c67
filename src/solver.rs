// Copyright 2025 TiKV Project Authors. Licensed under Apache-2.0.

//! The balance solver enumerates `(source store, hot peer, destination
//! store)` candidates for one scheduling flavor, ranks them and builds the
//! operators for the best usable solution.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::cluster::{BucketStat, ClusterView, PeerRole, RegionInfo, StoreInfo};
use crate::config::{HotRegionSchedulerConfig, TIFLASH_TOLERANCE_RATIO_CORRECTION};
use crate::filters::{
    filter_target, is_region_healthy_allow_pending, region_passes_snapshot_filter,
    ExcludedFilter, PlacementSafeguard, SpecialUseFilter, StoreFilter, StoreStateFilter,
};
use crate::metrics::*;
use crate::operator::{Operator, OperatorSink, PriorityLevel, SplitPolicy};
use crate::pending::{PendingInfluence, PendingLedger};
use crate::rank::{rank_cmp, RankFormula, RankV1, RankV2, SPLIT_PROGRESSIVE_RANK};
use crate::stats::{
    max_load, min_load, HotPeerStat, Influence, StoreLoad, StoreLoadDetail,
};
use crate::types::{
    adjust_priorities, compatible_read_priorities, default_read_priorities,
    default_write_leader_priorities, default_write_peer_priorities, OpType, RWType, ResourceType,
    DIM_LEN, QUERY_DIM, REGION_READ_BYTES, REGION_STAT_LEN, REGION_WRITE_BYTES,
};

/// Amplification applied to pending influence. It slows scheduling down to
/// serial when two stores are close to each other.
const PENDING_AMP_FACTOR: f64 = 2.0;
/// A dimension whose coefficient of variation across stores is below this
/// threshold is considered uniform and no longer scheduled on.
const STDDEV_THRESHOLD: f64 = 0.1;
/// Position of the memoized top-n hot peer in the per-store peer list.
pub(crate) const TOPN_POSITION: usize = 10;

/// A candidate swap under evaluation. `revert_*` hold the optional
/// counter-movement that hedges the primary move.
#[derive(Clone, Debug, Default)]
pub(crate) struct Solution {
    pub src_store: Option<Arc<StoreLoadDetail>>,
    pub region: Option<Arc<RegionInfo>>,
    pub main_peer_stat: Option<Arc<HotPeerStat>>,

    pub dst_store: Option<Arc<StoreLoadDetail>>,
    pub revert_region: Option<Arc<RegionInfo>>,
    pub revert_peer_stat: Option<Arc<HotPeerStat>>,

    cached_peers_rate: [f64; DIM_LEN],

    /// Contribution of this solution to balance; bigger is better. Zero is
    /// optimizable but not directly usable, -1 is unusable.
    pub progressive_rank: i64,
    // Only used by rank formula v2.
    pub first_score: i32,
    pub second_score: i32,
}

impl Solution {
    /// The closest pair of loads between source and destination: the
    /// minimum prediction of the source against the maximum prediction of
    /// the destination. A negative peer rate reverses the direction.
    pub fn get_extreme_load(&self, dim: usize) -> (f64, f64) {
        let src = &self.src_store.as_ref().unwrap().load_pred;
        let dst = &self.dst_store.as_ref().unwrap().load_pred;
        if self.peers_rate(dim) >= 0.0 {
            (src.min().loads[dim], dst.max().loads[dim])
        } else {
            (src.max().loads[dim], dst.min().loads[dim])
        }
    }

    pub fn get_current_load(&self, dim: usize) -> (f64, f64) {
        let src = &self.src_store.as_ref().unwrap().load_pred;
        let dst = &self.dst_store.as_ref().unwrap().load_pred;
        (src.current.loads[dim], dst.current.loads[dim])
    }

    pub fn get_pending_load(&self, dim: usize) -> (f64, f64) {
        let src = &self.src_store.as_ref().unwrap().load_pred;
        let dst = &self.dst_store.as_ref().unwrap().load_pred;
        (src.pending().loads[dim], dst.pending().loads[dim])
    }

    /// Precomputes the net peer rate for the given dimensions.
    pub fn calc_peers_rate(&mut self, first: usize, second: usize) {
        self.cached_peers_rate = [0.0; DIM_LEN];
        for dim in [first, second] {
            let mut rate = self.main_peer_stat.as_ref().unwrap().get_load(dim);
            if let Some(revert) = &self.revert_peer_stat {
                rate -= revert.get_load(dim);
            }
            self.cached_peers_rate[dim] = rate;
        }
    }

    /// Net load the solution moves on the dimension. `calc_peers_rate`
    /// must have run first.
    pub fn peers_rate(&self, dim: usize) -> f64 {
        self.cached_peers_rate[dim]
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum SplitStrategy {
    ByLoad,
    BySize,
}

pub(crate) struct BalanceSolver<'a, C: ClusterView, S: OperatorSink> {
    cluster: &'a C,
    sink: &'a S,
    cfg: &'a HotRegionSchedulerConfig,
    pub(crate) rw_ty: RWType,
    pub(crate) op_ty: OpType,
    pub(crate) resource_ty: ResourceType,

    stores: HashMap<u64, Arc<StoreInfo>>,
    st_load_detail: HashMap<u64, Arc<StoreLoadDetail>>,
    filtered_hot_peers: HashMap<u64, Vec<Arc<HotPeerStat>>>,
    nth_hot_peer: HashMap<u64, [Option<Arc<HotPeerStat>>; DIM_LEN]>,

    pub(crate) cur: Solution,
    pub(crate) best: Option<Solution>,
    ops: Vec<Operator>,

    max_src: StoreLoad,
    min_dst: StoreLoad,
    rank_step: StoreLoad,

    pub(crate) first_priority: usize,
    pub(crate) second_priority: usize,
    pub(crate) great_dec_ratio: f64,
    pub(crate) minor_dec_ratio: f64,
    min_hot_degree: u64,
    pub(crate) strict_picking_store: bool,
    pub(crate) expectation_enabled: bool,
    pub(crate) search_revert_regions: bool,
    config_invalid: bool,

    rank: RankFormula,
}

impl<'a, C: ClusterView, S: OperatorSink> BalanceSolver<'a, C, S> {
    pub fn new(
        cluster: &'a C,
        sink: &'a S,
        cfg: &'a HotRegionSchedulerConfig,
        rw_ty: RWType,
        op_ty: OpType,
        st_load_detail: HashMap<u64, Arc<StoreLoadDetail>>,
        ledger: &PendingLedger,
        search_revert_regions: bool,
    ) -> BalanceSolver<'a, C, S> {
        let resource_ty = ResourceType::new(rw_ty, op_ty);
        let query_support = cluster.query_supported();
        let (origins, defaults, compatibles) = match resource_ty {
            ResourceType::ReadLeader | ResourceType::ReadPeer => (
                &cfg.read_priorities,
                default_read_priorities(),
                compatible_read_priorities(),
            ),
            ResourceType::WriteLeader => (
                &cfg.write_leader_priorities,
                default_write_leader_priorities(),
                default_write_leader_priorities(),
            ),
            ResourceType::WritePeer => (
                &cfg.write_peer_priorities,
                default_write_peer_priorities(),
                default_write_peer_priorities(),
            ),
        };
        let config_invalid = if let Err(e) = crate::config::validate_priorities(
            resource_ty.as_str(),
            origins,
        ) {
            error!("invalid hot region scheduler priorities, this tick is skipped";
                "resource-type" => resource_ty.as_str(),
                "err" => %e,
            );
            true
        } else {
            false
        };
        let (first_priority, second_priority) =
            adjust_priorities(query_support, origins, defaults, compatibles);

        let rank = match cfg.rank_formula_version.as_str() {
            "v1" => RankFormula::V1(RankV1),
            _ => RankFormula::V2(RankV2::new(cfg.great_dec_ratio)),
        };

        let stores: HashMap<u64, Arc<StoreInfo>> = cluster
            .stores()
            .into_iter()
            .map(|store| (store.id, store))
            .collect();

        let max_peer_num = cfg.max_peer_num;
        let mut max_src = StoreLoad::default();
        let mut min_dst = StoreLoad {
            loads: [f64::MAX; DIM_LEN],
            count: f64::MAX,
            history_loads: Vec::new(),
        };
        let mut max_cur = StoreLoad::default();
        let mut filtered_hot_peers = HashMap::with_capacity(st_load_detail.len());
        let mut nth_hot_peer = HashMap::with_capacity(st_load_detail.len());
        for (id, detail) in &st_load_detail {
            max_src = max_load(&max_src, &detail.load_pred.min());
            min_dst = min_load(&min_dst, &detail.load_pred.max());
            max_cur = max_load(&max_cur, &detail.load_pred.current);
            let mut nth: [Option<Arc<HotPeerStat>>; DIM_LEN] = Default::default();
            let filtered = filter_hot_peers(
                detail,
                ledger,
                first_priority,
                second_priority,
                max_peer_num,
                &mut nth,
            );
            nth_hot_peer.insert(*id, nth);
            filtered_hot_peers.insert(*id, filtered);
        }
        let mut step_loads = [0.0; DIM_LEN];
        for (dim, step) in step_loads.iter_mut().enumerate() {
            *step = max_cur.loads[dim] * cfg.rank_step_ratio(dim);
        }
        let rank_step = StoreLoad {
            loads: step_loads,
            count: max_cur.count * cfg.count_rank_step_ratio,
            history_loads: Vec::new(),
        };

        BalanceSolver {
            cluster,
            sink,
            cfg,
            rw_ty,
            op_ty,
            resource_ty,
            stores,
            st_load_detail,
            filtered_hot_peers,
            nth_hot_peer,
            cur: Solution::default(),
            best: None,
            ops: Vec::new(),
            max_src,
            min_dst,
            rank_step,
            first_priority,
            second_priority,
            great_dec_ratio: cfg.great_dec_ratio,
            minor_dec_ratio: cfg.minor_dec_ratio,
            min_hot_degree: cluster.hot_region_cache_hits_threshold(),
            strict_picking_store: cfg.strict_picking_store,
            expectation_enabled: cfg.expectation_enabled(),
            search_revert_regions,
            config_invalid,
            rank,
        }
    }

    /// Walks all source stores, their hot peers and all destination stores,
    /// keeping the best solution that survives ranking and for which
    /// operators can actually be built.
    pub fn solve(&mut self) -> Vec<Operator> {
        if self.config_invalid {
            return Vec::new();
        }
        self.cur = Solution::default();
        let split_thresholds = self.cfg.split_thresholds;
        let buckets_enabled = self.cluster.region_buckets_enabled();
        let rank = self.rank;

        for (src_id, src_detail) in self.filter_src_stores() {
            self.cur.src_store = Some(src_detail.clone());
            let peers = self
                .filtered_hot_peers
                .get(&src_id)
                .cloned()
                .unwrap_or_default();
            for main_peer in peers {
                let region = match self.get_region(&main_peer, src_id) {
                    Some(region) => region,
                    None => continue,
                };
                if self.op_ty == OpType::MovePeer
                    && !region_passes_snapshot_filter(&self.stores, &region)
                {
                    SNAPSHOT_SENDER_LIMIT_COUNTER.inc();
                    continue;
                }
                self.cur.region = Some(region.clone());
                self.cur.main_peer_stat = Some(main_peer.clone());
                if buckets_enabled
                    && self.too_hot_need_split(&src_detail, &main_peer, split_thresholds)
                {
                    REGION_TOO_HOT_SPLIT_COUNTER.inc();
                    let ops =
                        self.create_split_operator(&[region.clone()], SplitStrategy::ByLoad);
                    if !ops.is_empty() {
                        self.ops = ops.clone();
                        self.cur
                            .calc_peers_rate(self.first_priority, self.second_priority);
                        self.best = Some(self.cur.clone());
                        return ops;
                    }
                }

                for (dst_id, dst_detail) in self.filter_dst_stores() {
                    self.cur.dst_store = Some(dst_detail);
                    rank.calc_progressive_rank(self);
                    self.try_update_best_solution();

                    if rank.need_search_revert_regions(self) {
                        SEARCH_REVERT_REGIONS_COUNTER.inc();
                        let revert_peers = self
                            .filtered_hot_peers
                            .get(&dst_id)
                            .cloned()
                            .unwrap_or_default();
                        for revert_peer in revert_peers {
                            let revert_region = match self.get_region(&revert_peer, dst_id) {
                                Some(region) => region,
                                None => continue,
                            };
                            if revert_region.id == region.id
                                || !self.allow_revert_region(&revert_region, src_id)
                            {
                                continue;
                            }
                            self.cur.revert_peer_stat = Some(revert_peer.clone());
                            self.cur.revert_region = Some(revert_region);
                            rank.calc_progressive_rank(self);
                            self.try_update_best_solution();
                        }
                        self.cur.revert_peer_stat = None;
                        self.cur.revert_region = None;
                    }
                }
            }
        }

        rank.set_search_revert_regions(self);
        self.ops.clone()
    }

    /// Whether moving a region from the destination back to the source is
    /// an admissible hedge: transfer-leader needs a peer already on the
    /// source, move-peer needs the source free of one.
    fn allow_revert_region(&self, region: &RegionInfo, src_store_id: u64) -> bool {
        match self.op_ty {
            OpType::TransferLeader => region.store_peer(src_store_id).is_some(),
            OpType::MovePeer => region.store_peer(src_store_id).is_none(),
        }
    }

    fn try_update_best_solution(&mut self) {
        let rank = self.rank;
        if let Some(label) = rank.filter_uniform_store(self) {
            UNIFORM_SKIP_COUNTER_VEC
                .with_label_values(&[self.rw_ty.as_str(), label])
                .inc();
            return;
        }
        if rank.is_available(self) && rank.better_than(self, self.best.as_ref()) {
            let new_ops = self.build_operators();
            if !new_ops.is_empty() {
                self.ops = new_ops;
                self.best = Some(self.cur.clone());
            }
        }
    }

    /// Sources must run hot above expectation on the selected dimensions,
    /// both right now and throughout the history window.
    fn filter_src_stores(&self) -> Vec<(u64, Arc<StoreLoadDetail>)> {
        let mut ret = Vec::new();
        let conf_tolerance = self.cfg.src_tolerance_ratio;
        for (id, detail) in &self.st_load_detail {
            let mut tolerance = conf_tolerance;
            if detail.is_tiflash {
                if !self.cfg.enable_for_tiflash {
                    continue;
                }
                if self.rw_ty != RWType::Write || self.op_ty != OpType::MovePeer {
                    continue;
                }
                tolerance += TIFLASH_TOLERANCE_RATIO_CORRECTION;
            }
            if detail.hot_peers.is_empty() {
                continue;
            }
            let store_label = id.to_string();
            if !self.check_src_by_priority_and_tolerance(detail, tolerance) {
                STORE_RESULT_COUNTER_VEC
                    .with_label_values(&[
                        &format!("src-store-failed-{}", self.resource_ty.as_str()),
                        &store_label,
                    ])
                    .inc();
                continue;
            }
            if !self.check_src_history_loads(detail, tolerance) {
                STORE_RESULT_COUNTER_VEC
                    .with_label_values(&[
                        &format!("src-store-history-loads-failed-{}", self.resource_ty.as_str()),
                        &store_label,
                    ])
                    .inc();
                continue;
            }
            STORE_RESULT_COUNTER_VEC
                .with_label_values(&[
                    &format!("src-store-succ-{}", self.resource_ty.as_str()),
                    &store_label,
                ])
                .inc();
            ret.push((*id, detail.clone()));
        }
        ret
    }

    fn check_src_by_priority_and_tolerance(
        &self,
        detail: &StoreLoadDetail,
        tolerance: f64,
    ) -> bool {
        let min = detail.load_pred.min();
        let expect = &detail.load_pred.expect;
        self.rank
            .check_by_priority_and_tolerance(self, &|dim| {
                min.loads[dim] > tolerance * expect.loads[dim]
            })
    }

    fn check_src_history_loads(&self, detail: &StoreLoadDetail, tolerance: f64) -> bool {
        let current = &detail.load_pred.current;
        if current.history_loads.is_empty() {
            return true;
        }
        let expect = &detail.load_pred.expect;
        self.rank.check_history_loads_by_priority(self, &|dim| {
            current.history_loads[dim]
                .iter()
                .zip(&expect.history_loads[dim])
                .all(|(cur, exp)| *cur > tolerance * exp)
        })
    }

    /// Assembles destination candidates for the current region and runs
    /// them through the admission pipeline.
    fn filter_dst_stores(&self) -> Vec<(u64, Arc<StoreLoadDetail>)> {
        let region = self.cur.region.as_ref().unwrap().clone();
        let main_peer = self.cur.main_peer_stat.as_ref().unwrap();
        let src_store_id = self.cur.src_store.as_ref().unwrap().id();
        match self.op_ty {
            OpType::MovePeer => {
                if self.rw_ty == RWType::Read && main_peer.is_leader {
                    // A hot read leader is better served by a leader
                    // transfer than by streaming a snapshot.
                    return Vec::new();
                }
                let state = StoreStateFilter {
                    move_region: true,
                    transfer_leader: false,
                };
                let excluded = ExcludedFilter::new(region.store_ids());
                let placement = PlacementSafeguard::new(self.cluster, &region, src_store_id);
                let candidates: Vec<Arc<StoreLoadDetail>> =
                    self.st_load_detail.values().cloned().collect();
                self.pick_dst_stores(
                    &[&state, &excluded, &SpecialUseFilter, &placement],
                    candidates,
                )
            }
            OpType::TransferLeader => {
                // The source peer must be the leader no matter whether the
                // leadership moves alone or together with the peer.
                if !main_peer.is_leader {
                    return Vec::new();
                }
                let move_state = StoreStateFilter {
                    move_region: true,
                    transfer_leader: false,
                };
                let mut candidates = Vec::new();
                if self.rw_ty == RWType::Read {
                    for detail in self.st_load_detail.values() {
                        let id = detail.id();
                        if id == main_peer.store_id {
                            continue;
                        }
                        if !self
                            .cluster
                            .placement_allows_leader(&region, src_store_id, id, true)
                        {
                            continue;
                        }
                        if let Some(peer) = region.store_peer(id) {
                            // Plain leader transfer; learners cannot lead.
                            if peer.role == PeerRole::Voter {
                                candidates.push(detail.clone());
                            }
                        } else if move_state.target(&detail.store) {
                            // Move the leader peer to a fresh store.
                            candidates.push(detail.clone());
                        }
                    }
                } else {
                    for peer in &region.peers {
                        if peer.store_id == region.leader_store_id
                            || peer.role != PeerRole::Voter
                        {
                            continue;
                        }
                        if let Some(detail) = self.st_load_detail.get(&peer.store_id) {
                            if self.cluster.placement_allows_leader(
                                &region,
                                src_store_id,
                                peer.store_id,
                                false,
                            ) {
                                candidates.push(detail.clone());
                            }
                        }
                    }
                }
                let state = StoreStateFilter {
                    move_region: false,
                    transfer_leader: true,
                };
                self.pick_dst_stores(&[&state, &SpecialUseFilter], candidates)
            }
        }
    }

    fn pick_dst_stores(
        &self,
        filters: &[&dyn StoreFilter],
        candidates: Vec<Arc<StoreLoadDetail>>,
    ) -> Vec<(u64, Arc<StoreLoadDetail>)> {
        let mut ret = Vec::new();
        let conf_tolerance = self.cfg.dst_tolerance_ratio;
        for detail in candidates {
            let mut tolerance = conf_tolerance;
            if detail.is_tiflash {
                if !self.cfg.enable_for_tiflash {
                    continue;
                }
                if self.rw_ty != RWType::Write || self.op_ty != OpType::MovePeer {
                    continue;
                }
                tolerance += TIFLASH_TOLERANCE_RATIO_CORRECTION;
            }
            if !filter_target(&detail.store, filters) {
                continue;
            }
            let id = detail.id();
            let store_label = id.to_string();
            if !self.check_dst_by_priority_and_tolerance(&detail, tolerance) {
                STORE_RESULT_COUNTER_VEC
                    .with_label_values(&[
                        &format!("dst-store-failed-{}", self.resource_ty.as_str()),
                        &store_label,
                    ])
                    .inc();
                continue;
            }
            if !self.check_dst_history_loads(&detail, tolerance) {
                STORE_RESULT_COUNTER_VEC
                    .with_label_values(&[
                        &format!("dst-store-history-loads-failed-{}", self.resource_ty.as_str()),
                        &store_label,
                    ])
                    .inc();
                continue;
            }
            STORE_RESULT_COUNTER_VEC
                .with_label_values(&[
                    &format!("dst-store-succ-{}", self.resource_ty.as_str()),
                    &store_label,
                ])
                .inc();
            ret.push((id, detail));
        }
        ret
    }

    fn check_dst_by_priority_and_tolerance(
        &self,
        detail: &StoreLoadDetail,
        tolerance: f64,
    ) -> bool {
        let max = detail.load_pred.max();
        let expect = &detail.load_pred.expect;
        self.rank
            .check_by_priority_and_tolerance(self, &|dim| {
                max.loads[dim] * tolerance < expect.loads[dim]
            })
    }

    fn check_dst_history_loads(&self, detail: &StoreLoadDetail, tolerance: f64) -> bool {
        let current = &detail.load_pred.current;
        if current.history_loads.is_empty() {
            return true;
        }
        let expect = &detail.load_pred.expect;
        self.rank.check_history_loads_by_priority(self, &|dim| {
            current.history_loads[dim]
                .iter()
                .zip(&expect.history_loads[dim])
                .all(|(cur, exp)| *cur * tolerance < *exp)
        })
    }

    /// Resolves a hot peer back to its region and verifies the statistics
    /// are not stale with respect to the region's current peers.
    fn get_region(&self, peer_stat: &HotPeerStat, store_id: u64) -> Option<Arc<RegionInfo>> {
        let region = match self.cluster.region(peer_stat.region_id) {
            Some(region) => region,
            None => {
                NO_REGION_COUNTER.inc();
                return None;
            }
        };
        if !is_region_healthy_allow_pending(&region) {
            UNHEALTHY_REPLICA_COUNTER.inc();
            return None;
        }
        if !self.cluster.is_region_replicated(&region) {
            debug!("region has abnormal replica count";
                "region-id" => region.id,
            );
            ABNORMAL_REPLICA_COUNTER.inc();
            return None;
        }
        match self.op_ty {
            OpType::MovePeer => {
                if region.store_peer(store_id).is_none() {
                    debug!("region does not have a peer on source store, maybe stat out of date";
                        "region-id" => peer_stat.region_id,
                        "store-id" => store_id,
                    );
                    return None;
                }
            }
            OpType::TransferLeader => {
                if region.leader_store_id != store_id {
                    debug!("region leader is not on source store, maybe stat out of date";
                        "region-id" => peer_stat.region_id,
                        "store-id" => store_id,
                    );
                    return None;
                }
            }
        }
        Some(region)
    }

    pub(crate) fn is_selected_dim(&self, dim: usize) -> bool {
        dim == self.first_priority || dim == self.second_priority
    }

    pub(crate) fn min_rate(&self, dim: usize) -> f64 {
        self.cfg.min_hot_rate(dim)
    }

    // The first priority is required to be more uniform than the second.
    pub(crate) fn is_uniform_first_priority(&self, store: &StoreLoadDetail) -> bool {
        store.is_uniform(self.first_priority, STDDEV_THRESHOLD * 0.5)
    }

    pub(crate) fn is_uniform_second_priority(&self, store: &StoreLoadDetail) -> bool {
        store.is_uniform(self.second_priority, STDDEV_THRESHOLD)
    }

    pub(crate) fn nth_hot_peer_load(&self, store_id: u64, dim: usize) -> Option<f64> {
        self.nth_hot_peer
            .get(&store_id)
            .and_then(|nth| nth[dim].as_ref())
            .map(|peer| peer.get_load(dim))
    }

    /// Checks the candidate against the amplified pending influence of both
    /// stores. Close stores with in-flight operators wait their turn.
    pub(crate) fn is_tolerance(&self, dim: usize, reverse: bool) -> bool {
        let mut src_store_id = self.cur.src_store.as_ref().unwrap().id();
        let mut dst_store_id = self.cur.dst_store.as_ref().unwrap().id();
        let (mut src_rate, mut dst_rate) = self.cur.get_current_load(dim);
        let (mut src_pending, mut dst_pending) = self.cur.get_pending_load(dim);
        if reverse {
            std::mem::swap(&mut src_store_id, &mut dst_store_id);
            std::mem::swap(&mut src_rate, &mut dst_rate);
            std::mem::swap(&mut src_pending, &mut dst_pending);
        }
        if src_rate <= dst_rate {
            return false;
        }
        let pending_amp = 1.0 + PENDING_AMP_FACTOR * src_rate / (src_rate - dst_rate);
        PENDING_AMP_GAUGE_VEC
            .with_label_values(&[
                self.rw_ty.as_str(),
                &src_store_id.to_string(),
                &dst_store_id.to_string(),
            ])
            .set(pending_amp);
        src_rate - pending_amp * src_pending > dst_rate + pending_amp * dst_pending
    }

    /// Prefers the source whose minimum predicted load is largest on the
    /// priority dimensions, then the one with the smallest gap between
    /// current and future load to keep oscillation down. `Less` means the
    /// first argument is the better source.
    pub(crate) fn compare_src_store(
        &self,
        a: &Arc<StoreLoadDetail>,
        b: &Arc<StoreLoadDetail>,
    ) -> Ordering {
        if Arc::ptr_eq(a, b) {
            return Ordering::Equal;
        }
        let (f, s) = (self.first_priority, self.second_priority);
        let (min_a, min_b) = (a.load_pred.min(), b.load_pred.min());
        let ord = rank_cmp(
            min_b.loads[f],
            min_a.loads[f],
            self.max_src.loads[f],
            self.rank_step.loads[f],
        )
        .then_with(|| {
            rank_cmp(
                min_b.loads[s],
                min_a.loads[s],
                self.max_src.loads[s],
                self.rank_step.loads[s],
            )
        });
        if ord != Ordering::Equal {
            return ord;
        }
        let (diff_a, diff_b) = (a.load_pred.diff(), b.load_pred.diff());
        if self.resource_ty == ResourceType::WriteLeader {
            rank_cmp(diff_a.count, diff_b.count, 0.0, self.rank_step.count)
                .then_with(|| rank_cmp(diff_a.loads[f], diff_b.loads[f], 0.0, self.rank_step.loads[f]))
                .then_with(|| rank_cmp(diff_a.loads[s], diff_b.loads[s], 0.0, self.rank_step.loads[s]))
        } else {
            rank_cmp(diff_a.loads[f], diff_b.loads[f], 0.0, self.rank_step.loads[f])
        }
    }

    /// Mirror of `compare_src_store` for destinations: smallest maximum
    /// predicted load first.
    pub(crate) fn compare_dst_store(
        &self,
        a: &Arc<StoreLoadDetail>,
        b: &Arc<StoreLoadDetail>,
    ) -> Ordering {
        if Arc::ptr_eq(a, b) {
            return Ordering::Equal;
        }
        let (f, s) = (self.first_priority, self.second_priority);
        let (max_a, max_b) = (a.load_pred.max(), b.load_pred.max());
        let ord = rank_cmp(
            max_a.loads[f],
            max_b.loads[f],
            self.min_dst.loads[f],
            self.rank_step.loads[f],
        )
        .then_with(|| {
            rank_cmp(
                max_a.loads[s],
                max_b.loads[s],
                self.min_dst.loads[s],
                self.rank_step.loads[s],
            )
        });
        if ord != Ordering::Equal {
            return ord;
        }
        let (diff_a, diff_b) = (a.load_pred.diff(), b.load_pred.diff());
        if self.resource_ty == ResourceType::WriteLeader {
            rank_cmp(diff_a.count, diff_b.count, 0.0, self.rank_step.count)
                .then_with(|| rank_cmp(diff_a.loads[f], diff_b.loads[f], 0.0, self.rank_step.loads[f]))
                .then_with(|| rank_cmp(diff_a.loads[s], diff_b.loads[s], 0.0, self.rank_step.loads[s]))
        } else {
            rank_cmp(diff_a.loads[f], diff_b.loads[f], 0.0, self.rank_step.loads[f])
        }
    }

    /// Build-time preconditions: the chosen stores and peers must still
    /// form a coherent solution.
    fn is_ready_to_build(&self) -> bool {
        let cur = &self.cur;
        let coherent = match (&cur.src_store, &cur.dst_store, &cur.main_peer_stat, &cur.region) {
            (Some(src), Some(_), Some(peer), Some(region)) => {
                peer.store_id == src.id() && region.id == peer.region_id
            }
            _ => false,
        };
        if !coherent {
            return false;
        }
        match (&cur.revert_peer_stat, &cur.revert_region) {
            (None, None) => true,
            (Some(peer), Some(region)) => {
                peer.store_id == cur.dst_store.as_ref().unwrap().id()
                    && region.id == peer.region_id
            }
            _ => false,
        }
    }

    fn build_operators(&mut self) -> Vec<Operator> {
        if !self.is_ready_to_build() {
            return Vec::new();
        }
        let region = self.cur.region.as_ref().unwrap().clone();

        if self.op_ty == OpType::MovePeer {
            let max_size = self.cluster.max_movable_hot_peer_size();
            let mut split_regions = Vec::new();
            for candidate in [Some(&region), self.cur.revert_region.as_ref()]
                .into_iter()
                .flatten()
            {
                if candidate.approximate_size > max_size {
                    NEED_SPLIT_BEFORE_SCHEDULE_COUNTER.inc();
                    split_regions.push(candidate.clone());
                }
            }
            if !split_regions.is_empty() {
                return self.create_split_operator(&split_regions, SplitStrategy::BySize);
            }
        }

        let src_store_id = self.cur.src_store.as_ref().unwrap().id();
        let dst_store_id = self.cur.dst_store.as_ref().unwrap().id();
        let source_label = src_store_id.to_string();
        let target_label = dst_store_id.to_string();
        let dim_label = self.rank.rank_to_dim_string(self);

        let (mut op, typ) = match self.create_operator(&region, src_store_id, dst_store_id) {
            Ok(built) => built,
            Err(e) => {
                debug!("fail to create operator";
                    "rw-type" => self.rw_ty.as_str(),
                    "op-type" => self.op_ty.as_str(),
                    "err" => %e,
                );
                CREATE_OPERATOR_FAIL_COUNTER.inc();
                return Vec::new();
            }
        };
        self.decorate_operator(&mut op, false, &source_label, &target_label, typ, dim_label);
        let mut ops = vec![op];
        if let Some(revert_region) = self.cur.revert_region.as_ref().cloned() {
            let (mut revert_op, typ) =
                match self.create_operator(&revert_region, dst_store_id, src_store_id) {
                    Ok(built) => built,
                    Err(e) => {
                        debug!("fail to create revert operator";
                            "rw-type" => self.rw_ty.as_str(),
                            "op-type" => self.op_ty.as_str(),
                            "err" => %e,
                        );
                        CREATE_OPERATOR_FAIL_COUNTER.inc();
                        return Vec::new();
                    }
                };
            self.decorate_operator(
                &mut revert_op,
                true,
                &target_label,
                &source_label,
                typ,
                dim_label,
            );
            ops.push(revert_op);
        }
        ops
    }

    fn create_operator(
        &self,
        region: &RegionInfo,
        src_store_id: u64,
        dst_store_id: u64,
    ) -> crate::error::Result<(Operator, &'static str)> {
        if region.store_voter(dst_store_id).is_some() {
            let desc = format!("transfer-hot-{}-leader", self.rw_ty.as_str());
            let op = self
                .sink
                .create_transfer_leader(&desc, region, src_store_id, dst_store_id)?;
            return Ok((op, "transfer-leader"));
        }
        // The source peer exists, checked when the peer was filtered.
        let role = region.store_peer(src_store_id).unwrap().role;
        if region.leader_store_id == src_store_id {
            let desc = format!("move-hot-{}-leader", self.rw_ty.as_str());
            let op = self
                .sink
                .create_move_leader(&desc, region, src_store_id, dst_store_id, role)?;
            Ok((op, "move-leader"))
        } else {
            let desc = format!("move-hot-{}-peer", self.rw_ty.as_str());
            let op = self
                .sink
                .create_move_peer(&desc, region, src_store_id, dst_store_id, role)?;
            Ok((op, "move-peer"))
        }
    }

    fn decorate_operator(
        &self,
        op: &mut Operator,
        is_revert: bool,
        source_label: &str,
        target_label: &str,
        typ: &'static str,
        dim_label: &'static str,
    ) {
        op.set_priority(PriorityLevel::High);
        NEW_OPERATOR_COUNTER.inc();
        match typ {
            "move-leader" => MOVE_LEADER_COUNTER.inc(),
            "move-peer" => MOVE_PEER_COUNTER.inc(),
            _ => TRANSFER_LEADER_COUNTER.inc(),
        }
        let rw = self.rw_ty.as_str();
        DIRECTION_COUNTER_VEC
            .with_label_values(&[typ, rw, source_label, "out", dim_label])
            .inc();
        DIRECTION_COUNTER_VEC
            .with_label_values(&[typ, rw, target_label, "in", dim_label])
            .inc();
        BALANCE_DIRECTION_COUNTER_VEC
            .with_label_values(&[source_label, target_label])
            .inc();
        if is_revert {
            DIRECTION_COUNTER_VEC
                .with_label_values(&[typ, rw, source_label, "out-for-revert", dim_label])
                .inc();
            DIRECTION_COUNTER_VEC
                .with_label_values(&[typ, rw, target_label, "in-for-revert", dim_label])
                .inc();
        }
    }

    /// True when the peer alone carries more than `split_thresholds` of its
    /// store's load on the selected dimensions.
    fn too_hot_need_split(
        &self,
        store: &StoreLoadDetail,
        peer: &HotPeerStat,
        split_thresholds: f64,
    ) -> bool {
        self.rank.check_by_priority_and_tolerance(self, &|dim| {
            peer.loads[dim] > store.load_pred.current.loads[dim] * split_thresholds
        })
    }

    /// The bucket stat kind backing the first priority; buckets do not
    /// track query rates, so query falls back to the second priority.
    fn bucket_first_stat(&self) -> usize {
        let base = if self.rw_ty == RWType::Write {
            REGION_WRITE_BYTES
        } else {
            REGION_READ_BYTES
        };
        let mut offset = self.first_priority;
        if self.first_priority == QUERY_DIM {
            offset = self.second_priority;
        }
        base + offset
    }

    fn create_split_operator(
        &mut self,
        regions: &[Arc<RegionInfo>],
        strategy: SplitStrategy,
    ) -> Vec<Operator> {
        if regions.is_empty() {
            return Vec::new();
        }
        let ids: Vec<u64> = regions.iter().map(|r| r.id).collect();
        let mut operators = Vec::new();
        let mut hot_buckets: Option<HashMap<u64, Vec<BucketStat>>> = None;

        for region in regions {
            match strategy {
                SplitStrategy::BySize => {
                    if let Some(op) = self.split_bucket_by_size(region) {
                        operators.push(op);
                    }
                }
                SplitStrategy::ByLoad => {
                    let buckets = hot_buckets.get_or_insert_with(|| {
                        self.cluster.bucket_stats(self.min_hot_degree, &ids)
                    });
                    match buckets.get(&region.id) {
                        None => {
                            REGION_BUCKETS_NOT_HOT_COUNTER.inc();
                        }
                        Some(stats) => {
                            if let Some(op) = self.split_buckets_by_load(region, stats) {
                                operators.push(op);
                            }
                        }
                    }
                }
            }
        }
        if !operators.is_empty() {
            // Splitting a hot region has the highest priority of all.
            self.cur.progressive_rank = SPLIT_PROGRESSIVE_RANK;
        }
        operators
    }

    fn split_buckets_operator(&self, region: &RegionInfo, keys: &[Vec<u8>]) -> Option<Operator> {
        let split_keys: Vec<Vec<u8>> = keys
            .iter()
            .filter(|key| region.contains_key(key))
            .cloned()
            .collect();
        if split_keys.is_empty() {
            NOT_FOUND_SPLIT_KEYS_COUNTER.inc();
            return None;
        }
        let desc = if self.rw_ty == RWType::Write {
            "split-hot-write-region"
        } else {
            "split-hot-read-region"
        };
        match self
            .sink
            .create_split_region(desc, region, SplitPolicy::UseKey, split_keys)
        {
            Ok(mut op) => {
                op.set_priority(PriorityLevel::High);
                SPLIT_SUCCESS_COUNTER.inc();
                Some(op)
            }
            Err(e) => {
                debug!("fail to create split operator";
                    "resource-type" => self.resource_ty.as_str(),
                    "err" => %e,
                );
                None
            }
        }
    }

    /// Oversized regions split at the median in-range bucket boundary.
    fn split_bucket_by_size(&self, region: &RegionInfo) -> Option<Operator> {
        let split_keys: Vec<Vec<u8>> = region
            .bucket_keys
            .iter()
            .filter(|key| region.contains_key(key))
            .cloned()
            .collect();
        if split_keys.is_empty() {
            return None;
        }
        let split_key = split_keys[split_keys.len() / 2].clone();
        self.split_buckets_operator(region, &[split_key])
    }

    /// Too-hot regions split at the bucket boundary closest to half the
    /// total load of the hottest bucketed dimension.
    fn split_buckets_by_load(
        &self,
        region: &RegionInfo,
        bucket_stats: &[BucketStat],
    ) -> Option<Operator> {
        // Bucket ranges can lag behind the region boundaries.
        let stats: Vec<&BucketStat> = bucket_stats
            .iter()
            .filter(|stat| {
                region.contains_key(&stat.start_key) || region.contains_key(&stat.end_key)
            })
            .collect();
        if stats.is_empty() {
            HOT_BUCKET_NOT_VALID_COUNTER.inc();
            return None;
        }
        if stats.len() == 1 {
            // A single hot bucket cannot be split into two hot regions.
            ONLY_ONE_HOT_BUCKET_COUNTER.inc();
            return None;
        }
        let dim = self.bucket_first_stat();
        let total_loads: u64 = stats.iter().map(|stat| stat.loads[dim]).sum();
        let mut acc = 0u64;
        let mut split_idx = 0usize;
        while acc < total_loads / 2 && split_idx < stats.len() {
            acc += stats[split_idx].loads[dim];
            split_idx += 1;
        }
        if split_idx == 0 {
            BUCKETS_SINGLE_HOT_SPOT_COUNTER.inc();
            return None;
        }
        let mut split_key = stats[split_idx - 1].end_key.clone();
        if !region.contains_key(&split_key) {
            split_key = stats[split_idx - 1].start_key.clone();
        }
        let op = self.split_buckets_operator(region, &[split_key]);
        if let Some(mut op) = op {
            op.set_additional_info(
                "acc-loads",
                (acc - stats[split_idx - 1].loads[dim]).to_string(),
            );
            op.set_additional_info("total-loads", total_loads.to_string());
            return Some(op);
        }
        None
    }

    /// Loads the best solution into `cur` and compares it against another
    /// solver's best. Used to arbitrate between the read leader and read
    /// peer passes.
    pub(crate) fn best_beats(&mut self, other: Option<&Solution>) -> bool {
        if let Some(best) = self.best.clone() {
            self.cur = best;
        }
        let rank = self.rank;
        rank.better_than(self, other)
    }

    pub(crate) fn best(&self) -> Option<&Solution> {
        self.best.as_ref()
    }

    /// Registers the emitted batch in the pending ledger. Both the main and
    /// the revert operator must insert cleanly, otherwise the whole batch is
    /// withdrawn.
    pub(crate) fn try_add_pending_influence(&self, ledger: &mut PendingLedger) -> bool {
        let best = match self.best.as_ref() {
            Some(best) => best,
            None => return false,
        };
        if self.ops.is_empty() {
            return false;
        }
        let is_split = self.ops[0].kind().is_split();
        if !is_split
            && best.src_store.as_ref().unwrap().is_tiflash
                != best.dst_store.as_ref().unwrap().is_tiflash
        {
            NOT_SAME_ENGINE_COUNTER.inc();
            return false;
        }
        let max_zombie = self.calc_max_zombie_dur();

        let (froms, to) = if is_split {
            let region = match self.cluster.region(self.ops[0].region_id()) {
                Some(region) => region,
                None => return false,
            };
            (region.store_ids(), 0)
        } else {
            (
                vec![best.src_store.as_ref().unwrap().id()],
                best.dst_store.as_ref().unwrap().id(),
            )
        };

        let infl = self.collect_pending_influence(best.main_peer_stat.as_ref().unwrap());
        if !self.insert_pending(ledger, self.ops[0].clone(), froms.clone(), to, infl, max_zombie) {
            return false;
        }
        if is_split {
            return true;
        }
        if let (Some(revert_peer), true) = (best.revert_peer_stat.as_ref(), self.ops.len() > 1) {
            let infl = self.collect_pending_influence(revert_peer);
            if !self.insert_pending(ledger, self.ops[1].clone(), froms, to, infl, max_zombie) {
                return false;
            }
        }
        self.log_best_solution();
        true
    }

    fn insert_pending(
        &self,
        ledger: &mut PendingLedger,
        op: Operator,
        froms: Vec<u64>,
        to: u64,
        infl: Influence,
        max_zombie_duration: Duration,
    ) -> bool {
        let loads = infl.loads;
        if !ledger.try_insert(PendingInfluence {
            op,
            froms,
            to,
            origin: infl,
            max_zombie_duration,
        }) {
            return false;
        }
        let offset = self.rw_ty.region_stat_offset();
        for dim in 0..DIM_LEN {
            HOT_PEER_LOAD_HISTOGRAM_VEC
                .with_label_values(&[self.rw_ty.as_str(), crate::types::dim_to_string(dim)])
                .observe(loads[offset + dim]);
        }
        true
    }

    /// The full influence of one peer covers both statistics flavors, so
    /// the next tick's predictions are biased on whichever flavor it reads.
    fn collect_pending_influence(&self, peer: &HotPeerStat) -> Influence {
        let mut infl = Influence {
            loads: [0.0; REGION_STAT_LEN],
            count: 1.0,
        };
        self.rw_ty.set_full_load_rates(&mut infl.loads, &peer.loads);
        let inverse = self.rw_ty.inverse();
        if let Some(another) = self
            .cluster
            .hot_peer_stat(inverse, peer.region_id, peer.store_id)
        {
            inverse.set_full_load_rates(&mut infl.loads, &another.loads);
        }
        infl
    }

    /// Statistics sourced from region sums refresh far slower than store
    /// samples, so those operators get the longer zombie window.
    fn calc_max_zombie_dur(&self) -> Duration {
        match self.resource_ty {
            ResourceType::WriteLeader => {
                if self.first_priority == QUERY_DIM {
                    // Write-leader scheduling by query rate is guided by
                    // store query statistics, not summed region rates.
                    self.cfg.store_stat_zombie_duration()
                } else {
                    self.cfg.regions_stat_zombie_duration()
                }
            }
            ResourceType::WritePeer => {
                if self
                    .best
                    .as_ref()
                    .map(|best| best.src_store.as_ref().unwrap().is_tiflash)
                    .unwrap_or(false)
                {
                    self.cfg.regions_stat_zombie_duration()
                } else {
                    self.cfg.store_stat_zombie_duration()
                }
            }
            _ => self.cfg.store_stat_zombie_duration(),
        }
    }

    fn log_best_solution(&self) {
        let best = match self.best.as_ref() {
            Some(best) => best,
            None => return,
        };
        if let (Some(revert_region), Some(region)) = (&best.revert_region, &best.region) {
            let (first, second) = (self.first_priority, self.second_priority);
            let (src_first, dst_first) = best.get_extreme_load(first);
            let (src_second, dst_second) = best.get_extreme_load(second);
            let main_peer = best.main_peer_stat.as_ref().unwrap();
            info!("use solution with revert region";
                "src-store" => best.src_store.as_ref().unwrap().id(),
                "src-first-rate" => src_first,
                "src-second-rate" => src_second,
                "dst-store" => best.dst_store.as_ref().unwrap().id(),
                "dst-first-rate" => dst_first,
                "dst-second-rate" => dst_second,
                "main-region" => region.id,
                "main-first-rate" => main_peer.get_load(first),
                "main-second-rate" => main_peer.get_load(second),
                "revert-region" => revert_region.id,
                "peers-first-rate" => best.peers_rate(first),
                "peers-second-rate" => best.peers_rate(second),
            );
        }
    }

}

/// Drops peers whose region is already pending or cooling down, and caps
/// the list at `max-peer-num` by zipper-merging the two priority sort
/// orders. The n-th peer of each order is memoized for the rank engine's
/// top-n heuristics.
fn filter_hot_peers(
    detail: &StoreLoadDetail,
    ledger: &PendingLedger,
    first_priority: usize,
    second_priority: usize,
    max_peer_num: usize,
    nth: &mut [Option<Arc<HotPeerStat>>; DIM_LEN],
) -> Vec<Arc<HotPeerStat>> {
    let hot_peers = &detail.hot_peers;
    let admissible =
        |peer: &Arc<HotPeerStat>| !ledger.contains(peer.region_id) && !peer.needs_cooldown;

    let mut first_sort = Vec::new();
    let mut second_sort = Vec::new();
    if hot_peers.len() >= TOPN_POSITION || hot_peers.len() > max_peer_num {
        first_sort = hot_peers.clone();
        first_sort
            .sort_by(|a, b| b.get_load(first_priority).total_cmp(&a.get_load(first_priority)));
        second_sort = hot_peers.clone();
        second_sort
            .sort_by(|a, b| b.get_load(second_priority).total_cmp(&a.get_load(second_priority)));
    }
    if hot_peers.len() >= TOPN_POSITION {
        nth[first_priority] = Some(first_sort[TOPN_POSITION - 1].clone());
        nth[second_priority] = Some(second_sort[TOPN_POSITION - 1].clone());
    }
    if hot_peers.len() > max_peer_num {
        let union = sort_hot_peers(&first_sort, &second_sort, max_peer_num);
        return union.into_iter().filter(|p| admissible(p)).collect();
    }
    hot_peers.iter().filter(|p| admissible(p)).cloned().collect()
}

/// Zipper union of the two sort orders: alternately take the hottest
/// unseen peer of each priority until the cap is reached.
fn sort_hot_peers(
    first_sort: &[Arc<HotPeerStat>],
    second_sort: &[Arc<HotPeerStat>],
    max_peer_num: usize,
) -> Vec<Arc<HotPeerStat>> {
    let mut union = Vec::with_capacity(max_peer_num);
    let mut seen = HashSet::new();
    let mut i = 0;
    let mut j = 0;
    while union.len() < max_peer_num {
        let before = union.len();
        while i < first_sort.len() {
            let peer = &first_sort[i];
            i += 1;
            if seen.insert(peer.region_id) {
                union.push(peer.clone());
                break;
            }
        }
        while union.len() < max_peer_num && j < second_sort.len() {
            let peer = &second_sort[j];
            j += 1;
            if seen.insert(peer.region_id) {
                union.push(peer.clone());
                break;
            }
        }
        if union.len() == before {
            break;
        }
    }
    union
}
