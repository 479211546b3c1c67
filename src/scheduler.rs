// Copyright 2025 TiKV Project Authors. Licensed under Apache-2.0.

//! The top-level hot region scheduler.
//!
//! One `schedule()` call picks a random scheduling flavor, refreshes the
//! per-store load summaries (rate limited per statistics side), runs the
//! balance solver and registers the winning batch in the pending ledger.
//! The scheduler is driven periodically from a worker pool; `&mut self`
//! serializes invocations, while configuration updates go through
//! [`SharedHotRegionConfig`]'s own lock and never block a running tick.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::cluster::ClusterView;
use crate::config::{HotRegionSchedulerConfig, SharedHotRegionConfig};
use crate::metrics::*;
use crate::operator::{OpKind, Operator, OperatorSink};
use crate::pending::PendingLedger;
use crate::solver::BalanceSolver;
use crate::stats::{summarize_store_infos, summarize_stores_load, StoreHistoryLoads, StoreLoadDetail};
use crate::types::{
    dim_to_string, OpType, RWType, ResourceKind, ResourceType, ALL_RESOURCE_TYPES, DIM_LEN,
    RESOURCE_TYPE_LEN,
};

/// Minimum delay between two statistics refreshes of the same side.
const STATISTICS_INTERVAL: Duration = Duration::from_secs(1);

pub const HOT_REGION_SCHEDULER_NAME: &str = "balance-hot-region-scheduler";

pub struct HotScheduler {
    config: SharedHotRegionConfig,
    /// Per-flavor store load details, rebuilt by `prepare_for_balance`.
    st_load_infos: [HashMap<u64, Arc<StoreLoadDetail>>; RESOURCE_TYPE_LEN],
    history_loads: StoreHistoryLoads,
    /// Regions with in-flight operators; blocks re-selection and biases
    /// load predictions.
    region_pendings: PendingLedger,
    /// Whether the next pass of each flavor may search revert regions.
    search_revert_regions: [bool; RESOURCE_TYPE_LEN],
    rng: StdRng,
    update_read_time: Option<Instant>,
    update_write_time: Option<Instant>,
}

impl HotScheduler {
    pub fn new(config: SharedHotRegionConfig) -> HotScheduler {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Deterministic constructor for tests.
    pub fn with_seed(config: SharedHotRegionConfig, seed: u64) -> HotScheduler {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: SharedHotRegionConfig, rng: StdRng) -> HotScheduler {
        let cfg = config.snapshot();
        HotScheduler {
            config,
            st_load_infos: Default::default(),
            history_loads: StoreHistoryLoads::new(
                cfg.history_sample_duration(),
                cfg.history_sample_interval(),
            ),
            region_pendings: PendingLedger::default(),
            search_revert_regions: [false; RESOURCE_TYPE_LEN],
            rng,
            update_read_time: None,
            update_write_time: None,
        }
    }

    pub fn config(&self) -> &SharedHotRegionConfig {
        &self.config
    }

    /// Regions currently tracked by the pending ledger.
    pub fn pending_regions(&self) -> Vec<u64> {
        self.region_pendings.region_ids()
    }

    pub fn is_schedule_allowed<S: OperatorSink>(&self, sink: &S) -> bool {
        let allowed = sink.operator_count(OpKind::HotRegion) < sink.hot_region_schedule_limit();
        if !allowed {
            LIMIT_COUNTER.inc();
        }
        allowed
    }

    /// One scheduling tick. Best effort: every failure mode degrades to an
    /// empty batch.
    pub fn schedule<C: ClusterView, S: OperatorSink>(
        &mut self,
        cluster: &C,
        sink: &S,
    ) -> Vec<Operator> {
        SCHEDULE_COUNTER.inc();
        if !self.is_schedule_allowed(sink) {
            return Vec::new();
        }
        let ty = self.random_type();
        self.dispatch(ty, cluster, sink)
    }

    fn random_type(&mut self) -> ResourceType {
        ALL_RESOURCE_TYPES[self.rng.gen_range(0..RESOURCE_TYPE_LEN)]
    }

    /// Runs one tick for an explicit flavor.
    pub fn dispatch<C: ClusterView, S: OperatorSink>(
        &mut self,
        ty: ResourceType,
        cluster: &C,
        sink: &S,
    ) -> Vec<Operator> {
        let cfg = self.config.snapshot();
        self.history_loads
            .update_config(cfg.history_sample_duration(), cfg.history_sample_interval());
        self.prepare_for_balance(ty, cluster);
        // The forbid gate cannot move before the preparation: the API and
        // metrics keep reflecting fresh summaries even when one side is
        // masked.
        if cfg.is_forbid(ty.rw_type()) {
            return Vec::new();
        }
        match ty {
            ResourceType::ReadLeader | ResourceType::ReadPeer => {
                self.balance_hot_read_regions(cluster, sink, &cfg)
            }
            ResourceType::WritePeer => self.balance_hot_write_peers(cluster, sink, &cfg),
            ResourceType::WriteLeader => self.balance_hot_write_leaders(cluster, sink, &cfg),
        }
    }

    /// Decays pending influence into fresh store summaries and rebuilds the
    /// load details of the requested side, at most once per second.
    fn prepare_for_balance<C: ClusterView>(&mut self, ty: ResourceType, cluster: &C) {
        let mut summaries = summarize_store_infos(&cluster.stores());
        self.region_pendings.decay(&mut summaries);
        for (id, summary) in &summaries {
            if let Some(infl) = &summary.pending_sum {
                let store_label = id.to_string();
                for rw in [RWType::Read, RWType::Write] {
                    let offset = rw.region_stat_offset();
                    for dim in 0..DIM_LEN {
                        PENDING_SUM_GAUGE_VEC
                            .with_label_values(&[&store_label, rw.as_str(), dim_to_string(dim)])
                            .set(infl.loads[offset + dim]);
                    }
                }
            }
        }

        let rw = ty.rw_type();
        let last_update = match rw {
            RWType::Read => self.update_read_time,
            RWType::Write => self.update_write_time,
        };
        let due = last_update
            .map(|at| at.elapsed() >= STATISTICS_INTERVAL)
            .unwrap_or(true);
        if !due {
            return;
        }
        let stores_loads = cluster.stores_loads();
        let trace_flow = cluster.trace_region_flow();
        let stats = cluster.hot_peer_stats(rw);
        for kind in [ResourceKind::Leader, ResourceKind::Region] {
            let idx = ResourceType::build(rw, kind).index();
            self.st_load_infos[idx] = summarize_stores_load(
                &summaries,
                &stores_loads,
                &mut self.history_loads,
                &stats,
                trace_flow,
                rw,
                kind,
            );
        }
        match rw {
            RWType::Read => self.update_read_time = Some(Instant::now()),
            RWType::Write => self.update_write_time = Some(Instant::now()),
        }
    }

    /// Hot read scheduling solves both the leader transfer and the peer
    /// movement flavor and submits whichever usable batch ranks better.
    fn balance_hot_read_regions<C: ClusterView, S: OperatorSink>(
        &mut self,
        cluster: &C,
        sink: &S,
        cfg: &HotRegionSchedulerConfig,
    ) -> Vec<Operator> {
        let leader_idx = ResourceType::ReadLeader.index();
        let peer_idx = ResourceType::ReadPeer.index();
        let mut leader_solver = BalanceSolver::new(
            cluster,
            sink,
            cfg,
            RWType::Read,
            OpType::TransferLeader,
            self.st_load_infos[leader_idx].clone(),
            &self.region_pendings,
            self.search_revert_regions[leader_idx],
        );
        let leader_ops = leader_solver.solve();
        let mut peer_solver = BalanceSolver::new(
            cluster,
            sink,
            cfg,
            RWType::Read,
            OpType::MovePeer,
            self.st_load_infos[peer_idx].clone(),
            &self.region_pendings,
            self.search_revert_regions[peer_idx],
        );
        let peer_ops = peer_solver.solve();
        self.search_revert_regions[leader_idx] = leader_solver.search_revert_regions;
        self.search_revert_regions[peer_idx] = peer_solver.search_revert_regions;

        match (leader_ops.is_empty(), peer_ops.is_empty()) {
            (true, true) => {}
            (true, false) => {
                if peer_solver.try_add_pending_influence(&mut self.region_pendings) {
                    return peer_ops;
                }
            }
            (false, true) => {
                if leader_solver.try_add_pending_influence(&mut self.region_pendings) {
                    return leader_ops;
                }
            }
            (false, false) => {
                let peer_best = peer_solver.best().cloned();
                if leader_solver.best_beats(peer_best.as_ref()) {
                    if leader_solver.try_add_pending_influence(&mut self.region_pendings) {
                        return leader_ops;
                    }
                    if peer_solver.try_add_pending_influence(&mut self.region_pendings) {
                        return peer_ops;
                    }
                } else {
                    if peer_solver.try_add_pending_influence(&mut self.region_pendings) {
                        return peer_ops;
                    }
                    if leader_solver.try_add_pending_influence(&mut self.region_pendings) {
                        return leader_ops;
                    }
                }
            }
        }
        SKIP_COUNTER.inc();
        Vec::new()
    }

    fn balance_hot_write_peers<C: ClusterView, S: OperatorSink>(
        &mut self,
        cluster: &C,
        sink: &S,
        cfg: &HotRegionSchedulerConfig,
    ) -> Vec<Operator> {
        let idx = ResourceType::WritePeer.index();
        let mut peer_solver = BalanceSolver::new(
            cluster,
            sink,
            cfg,
            RWType::Write,
            OpType::MovePeer,
            self.st_load_infos[idx].clone(),
            &self.region_pendings,
            self.search_revert_regions[idx],
        );
        let ops = peer_solver.solve();
        self.search_revert_regions[idx] = peer_solver.search_revert_regions;
        if !ops.is_empty() && peer_solver.try_add_pending_influence(&mut self.region_pendings) {
            return ops;
        }
        Vec::new()
    }

    fn balance_hot_write_leaders<C: ClusterView, S: OperatorSink>(
        &mut self,
        cluster: &C,
        sink: &S,
        cfg: &HotRegionSchedulerConfig,
    ) -> Vec<Operator> {
        let idx = ResourceType::WriteLeader.index();
        let mut leader_solver = BalanceSolver::new(
            cluster,
            sink,
            cfg,
            RWType::Write,
            OpType::TransferLeader,
            self.st_load_infos[idx].clone(),
            &self.region_pendings,
            self.search_revert_regions[idx],
        );
        let ops = leader_solver.solve();
        self.search_revert_regions[idx] = leader_solver.search_revert_regions;
        if !ops.is_empty() && leader_solver.try_add_pending_influence(&mut self.region_pendings) {
            return ops;
        }
        SKIP_COUNTER.inc();
        Vec::new()
    }
}
