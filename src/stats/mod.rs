// Copyright 2025 TiKV Project Authors. Licensed under Apache-2.0.

//! Load summaries the balance passes work on.
//!
//! Every tick rebuilds one [`StoreLoadDetail`] per store and flavor: the
//! current load sample, a prediction window biased by pending influence,
//! the cluster-wide expectation and the uniformity measure.

mod history;

pub use self::history::StoreHistoryLoads;

use std::collections::HashMap;
use std::sync::Arc;

use crate::cluster::StoreInfo;
use crate::metrics::STORE_PEER_SUM_GAUGE_VEC;
use crate::types::{
    dim_to_string, RWType, ResourceKind, BYTE_DIM, DIM_LEN, KEY_DIM, QUERY_DIM,
    REGION_STAT_LEN, STORE_READ_BYTES, STORE_READ_KEYS, STORE_READ_QUERY, STORE_WRITE_BYTES,
    STORE_WRITE_KEYS, STORE_WRITE_QUERY,
};

/// Hot statistics of one `(region, store)` pair, produced by the statistics
/// subsystem. The scheduler treats it read-only.
#[derive(Debug, Clone)]
pub struct HotPeerStat {
    pub region_id: u64,
    pub store_id: u64,
    pub loads: [f64; DIM_LEN],
    pub hot_degree: u64,
    pub is_leader: bool,
    /// Set right after a leader transfer while the peer's statistics are
    /// still settling; such peers are skipped.
    pub needs_cooldown: bool,
}

impl HotPeerStat {
    pub fn get_load(&self, dim: usize) -> f64 {
        self.loads[dim]
    }
}

/// A load vector with its hot peer count and the rolling history window.
#[derive(Debug, Clone, Default)]
pub struct StoreLoad {
    pub loads: [f64; DIM_LEN],
    pub count: f64,
    /// `[dim][sample]`, oldest first.
    pub history_loads: Vec<Vec<f64>>,
}

pub fn min_load(a: &StoreLoad, b: &StoreLoad) -> StoreLoad {
    let mut loads = [0.0; DIM_LEN];
    for i in 0..DIM_LEN {
        loads[i] = a.loads[i].min(b.loads[i]);
    }
    StoreLoad {
        loads,
        count: a.count.min(b.count),
        history_loads: Vec::new(),
    }
}

pub fn max_load(a: &StoreLoad, b: &StoreLoad) -> StoreLoad {
    let mut loads = [0.0; DIM_LEN];
    for i in 0..DIM_LEN {
        loads[i] = a.loads[i].max(b.loads[i]);
    }
    StoreLoad {
        loads,
        count: a.count.max(b.count),
        history_loads: Vec::new(),
    }
}

/// Current load of a store plus the future load predicted from pending
/// influence, together with the cluster-wide expectation and uniformity.
#[derive(Debug, Clone, Default)]
pub struct StoreLoadPred {
    pub current: StoreLoad,
    pub future: StoreLoad,
    pub expect: StoreLoad,
    /// Coefficient of variation of the current loads across stores.
    pub stddev: StoreLoad,
}

impl StoreLoadPred {
    pub fn min(&self) -> StoreLoad {
        min_load(&self.current, &self.future)
    }

    pub fn max(&self) -> StoreLoad {
        max_load(&self.current, &self.future)
    }

    pub fn diff(&self) -> StoreLoad {
        let mx = self.max();
        let mn = self.min();
        let mut loads = [0.0; DIM_LEN];
        for i in 0..DIM_LEN {
            loads[i] = mx.loads[i] - mn.loads[i];
        }
        StoreLoad {
            loads,
            count: mx.count - mn.count,
            history_loads: Vec::new(),
        }
    }

    /// Magnitude of the in-flight influence on this store.
    pub fn pending(&self) -> StoreLoad {
        self.diff()
    }
}

/// The load deltas attributed to an in-flight operator.
#[derive(Debug, Clone, Default)]
pub struct Influence {
    pub loads: [f64; REGION_STAT_LEN],
    pub count: f64,
}

impl Influence {
    pub fn add(&mut self, other: &Influence, w: f64) {
        for i in 0..REGION_STAT_LEN {
            self.loads[i] += other.loads[i] * w;
        }
        self.count += other.count * w;
    }
}

/// Mutable per-store accumulator the pending ledger writes into before the
/// load details are frozen for a tick.
#[derive(Debug, Clone)]
pub struct StoreSummary {
    pub store: Arc<StoreInfo>,
    pub is_tiflash: bool,
    pub pending_sum: Option<Influence>,
}

impl StoreSummary {
    pub fn add_influence(&mut self, origin: &Influence, w: f64) {
        self.pending_sum
            .get_or_insert_with(Influence::default)
            .add(origin, w);
    }
}

pub fn summarize_store_infos(stores: &[Arc<StoreInfo>]) -> HashMap<u64, StoreSummary> {
    stores
        .iter()
        .map(|store| {
            (
                store.id,
                StoreSummary {
                    store: store.clone(),
                    is_tiflash: store.engine_tiflash,
                    pending_sum: None,
                },
            )
        })
        .collect()
}

/// Everything the solver needs to know about one store for one flavor.
#[derive(Debug, Clone)]
pub struct StoreLoadDetail {
    pub store: Arc<StoreInfo>,
    pub is_tiflash: bool,
    pub load_pred: StoreLoadPred,
    pub hot_peers: Vec<Arc<HotPeerStat>>,
}

impl StoreLoadDetail {
    pub fn id(&self) -> u64 {
        self.store.id
    }

    /// True when the given dimension is spread evenly enough across stores
    /// that balancing on it would only cause churn.
    pub fn is_uniform(&self, dim: usize, threshold: f64) -> bool {
        self.load_pred.stddev.loads[dim] < threshold
    }
}

fn raw_load(raw: &[f64], kind: usize) -> f64 {
    raw.get(kind).copied().unwrap_or(0.0)
}

// Which store-level samples feed the three dimensions depends on the flavor:
// leaders serve reads, so read loads come straight from the store samples;
// write bytes/keys are replicated to every peer, so the leader flavor
// estimates its share from the hot leader peers instead.
fn collect_loads(
    raw: &[f64],
    peer_load_sum: &[f64; DIM_LEN],
    rw: RWType,
    kind: ResourceKind,
) -> [f64; DIM_LEN] {
    let mut loads = [0.0; DIM_LEN];
    match rw {
        RWType::Read => {
            loads[BYTE_DIM] = raw_load(raw, STORE_READ_BYTES);
            loads[KEY_DIM] = raw_load(raw, STORE_READ_KEYS);
            loads[QUERY_DIM] = raw_load(raw, STORE_READ_QUERY);
        }
        RWType::Write => match kind {
            ResourceKind::Leader => {
                loads[BYTE_DIM] = peer_load_sum[BYTE_DIM];
                loads[KEY_DIM] = peer_load_sum[KEY_DIM];
                loads[QUERY_DIM] = raw_load(raw, STORE_WRITE_QUERY);
            }
            ResourceKind::Region => {
                loads[BYTE_DIM] = raw_load(raw, STORE_WRITE_BYTES);
                loads[KEY_DIM] = raw_load(raw, STORE_WRITE_KEYS);
                // The write-peer flavor has no query dimension.
            }
        },
    }
    loads
}

fn to_load_pred(current: StoreLoad, rw: RWType, infl: Option<&Influence>) -> StoreLoadPred {
    let mut future = StoreLoad {
        loads: current.loads,
        count: current.count,
        history_loads: Vec::new(),
    };
    if let Some(infl) = infl {
        let offset = rw.region_stat_offset();
        for i in 0..DIM_LEN {
            future.loads[i] = (future.loads[i] + infl.loads[offset + i]).max(0.0);
        }
        future.count = (future.count + infl.count).max(0.0);
    }
    StoreLoadPred {
        current,
        future,
        ..Default::default()
    }
}

/// Builds the per-store load details for one `(flavor, kind)` pair.
///
/// TiKV stores and columnar stores form separate balance groups with their
/// own expectations; the columnar group only exists for write-peer
/// scheduling. This is a pure data transform and never fails; stores without
/// raw load samples are left out.
pub fn summarize_stores_load(
    summaries: &HashMap<u64, StoreSummary>,
    stores_loads: &HashMap<u64, Vec<f64>>,
    history: &mut StoreHistoryLoads,
    hot_peer_stats: &HashMap<u64, Vec<Arc<HotPeerStat>>>,
    trace_flow: bool,
    rw: RWType,
    kind: ResourceKind,
) -> HashMap<u64, Arc<StoreLoadDetail>> {
    let mut details = HashMap::with_capacity(summaries.len());
    let tikv: Vec<&StoreSummary> = summaries.values().filter(|s| !s.is_tiflash).collect();
    summarize_group(
        &mut details,
        &tikv,
        stores_loads,
        history,
        hot_peer_stats,
        trace_flow,
        rw,
        kind,
    );
    if rw == RWType::Write && kind == ResourceKind::Region {
        let tiflash: Vec<&StoreSummary> = summaries.values().filter(|s| s.is_tiflash).collect();
        summarize_group(
            &mut details,
            &tiflash,
            stores_loads,
            history,
            hot_peer_stats,
            trace_flow,
            rw,
            kind,
        );
    }
    details
}

#[allow(clippy::too_many_arguments)]
fn summarize_group(
    details: &mut HashMap<u64, Arc<StoreLoadDetail>>,
    group: &[&StoreSummary],
    stores_loads: &HashMap<u64, Vec<f64>>,
    history: &mut StoreHistoryLoads,
    hot_peer_stats: &HashMap<u64, Vec<Arc<HotPeerStat>>>,
    trace_flow: bool,
    rw: RWType,
    kind: ResourceKind,
) {
    struct Partial<'a> {
        summary: &'a StoreSummary,
        current: StoreLoad,
    }

    let mut partials = Vec::with_capacity(group.len());
    let mut hot_peers_by_store: HashMap<u64, Vec<Arc<HotPeerStat>>> = HashMap::new();
    let mut load_sum = [0.0; DIM_LEN];
    let mut hot_peer_count = 0usize;

    for &summary in group {
        let id = summary.store.id;
        let raw = match stores_loads.get(&id) {
            Some(raw) => raw,
            None => continue,
        };
        let mut hot_peers = Vec::new();
        let mut peer_load_sum = [0.0; DIM_LEN];
        for peer in hot_peer_stats.get(&id).map(|v| v.as_slice()).unwrap_or(&[]) {
            if kind == ResourceKind::Leader && !peer.is_leader {
                continue;
            }
            for (sum, load) in peer_load_sum.iter_mut().zip(peer.loads) {
                *sum += load;
            }
            hot_peers.push(peer.clone());
        }
        if trace_flow {
            let store_label = id.to_string();
            for dim in 0..DIM_LEN {
                STORE_PEER_SUM_GAUGE_VEC
                    .with_label_values(&[&store_label, rw.as_str(), dim_to_string(dim)])
                    .set(peer_load_sum[dim]);
            }
        }
        let loads = collect_loads(raw, &peer_load_sum, rw, kind);
        history.add(id, rw, kind, &loads);
        let current = StoreLoad {
            loads,
            count: hot_peers.len() as f64,
            history_loads: history.get(id, rw, kind),
        };
        for i in 0..DIM_LEN {
            load_sum[i] += loads[i];
        }
        hot_peer_count += hot_peers.len();
        hot_peers_by_store.insert(id, hot_peers);
        partials.push(Partial { summary, current });
    }

    if partials.is_empty() {
        return;
    }
    let store_count = partials.len() as f64;
    let mut expect_loads = [0.0; DIM_LEN];
    for i in 0..DIM_LEN {
        expect_loads[i] = load_sum[i] / store_count;
    }

    // Expectation history is the per-sample mean across the group.
    let mut expect_history = vec![Vec::new(); DIM_LEN];
    for dim in 0..DIM_LEN {
        let min_len = partials
            .iter()
            .map(|p| p.current.history_loads[dim].len())
            .min()
            .unwrap_or(0);
        for t in 0..min_len {
            let sum: f64 = partials
                .iter()
                .map(|p| p.current.history_loads[dim][t])
                .sum();
            expect_history[dim].push(sum / store_count);
        }
    }

    let mut stddev_loads = [0.0; DIM_LEN];
    if hot_peer_count != 0 {
        for p in &partials {
            for i in 0..DIM_LEN {
                stddev_loads[i] += (p.current.loads[i] - expect_loads[i]).powi(2);
            }
        }
        for i in 0..DIM_LEN {
            if expect_loads[i] > 0.0 {
                stddev_loads[i] = (stddev_loads[i] / store_count).sqrt() / expect_loads[i];
            } else {
                stddev_loads[i] = 0.0;
            }
        }
    }

    let expect = StoreLoad {
        loads: expect_loads,
        count: hot_peer_count as f64 / store_count,
        history_loads: expect_history,
    };
    let stddev = StoreLoad {
        loads: stddev_loads,
        count: 0.0,
        history_loads: Vec::new(),
    };

    for p in partials {
        let id = p.summary.store.id;
        let mut load_pred = to_load_pred(p.current, rw, p.summary.pending_sum.as_ref());
        load_pred.expect = expect.clone();
        load_pred.stddev = stddev.clone();
        details.insert(
            id,
            Arc::new(StoreLoadDetail {
                store: p.summary.store.clone(),
                is_tiflash: p.summary.is_tiflash,
                load_pred,
                hot_peers: hot_peers_by_store.remove(&id).unwrap_or_default(),
            }),
        );
    }
}
