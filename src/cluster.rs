// Copyright 2025 TiKV Project Authors. Licensed under Apache-2.0.

//! Cluster metadata consumed by the scheduler and the `ClusterView` seam to
//! the membership / statistics subsystems.

use std::collections::HashMap;
use std::sync::Arc;

use crate::stats::HotPeerStat;
use crate::types::{RWType, REGION_STAT_LEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    Voter,
    Learner,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub id: u64,
    pub store_id: u64,
    pub role: PeerRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    Up,
    Offline,
    Tombstone,
}

/// Special-use placement of a store. Stores marked for a dedicated purpose
/// are skipped by the balance passes unless the purpose is hot-region
/// scheduling itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialUse {
    None,
    HotRegion,
    Reserved,
}

#[derive(Debug, Clone)]
pub struct StoreInfo {
    pub id: u64,
    pub address: String,
    pub state: StoreState,
    pub is_busy: bool,
    pub is_disconnected: bool,
    /// Columnar replica stores only take part in write-peer moves.
    pub engine_tiflash: bool,
    pub special_use: SpecialUse,
    pub sending_snap_count: u64,
    pub receiving_snap_count: u64,
    pub pending_peer_count: u64,
}

impl StoreInfo {
    pub fn new(id: u64) -> StoreInfo {
        StoreInfo {
            id,
            address: String::new(),
            state: StoreState::Up,
            is_busy: false,
            is_disconnected: false,
            engine_tiflash: false,
            special_use: SpecialUse::None,
            sending_snap_count: 0,
            receiving_snap_count: 0,
            pending_peer_count: 0,
        }
    }

    pub fn is_up(&self) -> bool {
        self.state == StoreState::Up
    }
}

#[derive(Debug, Clone)]
pub struct RegionInfo {
    pub id: u64,
    pub start_key: Vec<u8>,
    pub end_key: Vec<u8>,
    pub peers: Vec<Peer>,
    pub leader_store_id: u64,
    /// Approximate region size in MiB, reported by region heartbeats.
    pub approximate_size: i64,
    /// Bucket boundary keys inside the region, ordered. Used as split key
    /// material; empty when region buckets are disabled.
    pub bucket_keys: Vec<Vec<u8>>,
    pub down_peer_ids: Vec<u64>,
    pub pending_peer_ids: Vec<u64>,
}

impl RegionInfo {
    pub fn store_peer(&self, store_id: u64) -> Option<&Peer> {
        self.peers.iter().find(|p| p.store_id == store_id)
    }

    pub fn store_voter(&self, store_id: u64) -> Option<&Peer> {
        self.peers
            .iter()
            .find(|p| p.store_id == store_id && p.role == PeerRole::Voter)
    }

    pub fn leader(&self) -> Option<&Peer> {
        self.store_peer(self.leader_store_id)
    }

    pub fn store_ids(&self) -> Vec<u64> {
        self.peers.iter().map(|p| p.store_id).collect()
    }

    pub fn follower_store_ids(&self) -> Vec<u64> {
        self.peers
            .iter()
            .filter(|p| p.store_id != self.leader_store_id)
            .map(|p| p.store_id)
            .collect()
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        key_between(&self.start_key, &self.end_key, key)
    }
}

/// Returns true if `key` falls strictly inside `(start, end)`. Empty
/// boundary keys are unbounded on their side. A key equal to either
/// boundary is not between: splitting there would produce an empty range.
pub fn key_between(start: &[u8], end: &[u8], key: &[u8]) -> bool {
    if key.is_empty() {
        return false;
    }
    (start.is_empty() || key > start) && (end.is_empty() || key < end)
}

/// Per-bucket load statistics of a hot region.
#[derive(Debug, Clone)]
pub struct BucketStat {
    pub region_id: u64,
    pub start_key: Vec<u8>,
    pub end_key: Vec<u8>,
    pub loads: [u64; REGION_STAT_LEN],
}

/// The read-only cluster seam. Membership, statistics ingestion and
/// placement rules live behind this trait; the scheduler assumes a
/// consistent snapshot for the duration of one `schedule()` call.
pub trait ClusterView {
    fn stores(&self) -> Vec<Arc<StoreInfo>>;

    fn region(&self, region_id: u64) -> Option<Arc<RegionInfo>>;

    /// Hot peer statistics of one flavor, grouped by store.
    fn hot_peer_stats(&self, rw: RWType) -> HashMap<u64, Vec<Arc<HotPeerStat>>>;

    /// Looks up the hot peer statistics of one `(region, store)` pair.
    fn hot_peer_stat(&self, rw: RWType, region_id: u64, store_id: u64) -> Option<Arc<HotPeerStat>>;

    /// Raw per-store load samples, indexed by `STORE_*` stat kinds.
    fn stores_loads(&self) -> HashMap<u64, Vec<f64>>;

    /// Hot bucket statistics of the given regions.
    fn bucket_stats(&self, min_hot_degree: u64, region_ids: &[u64]) -> HashMap<u64, Vec<BucketStat>>;

    /// Whether the region has its expected number of healthy replicas.
    fn is_region_replicated(&self, region: &RegionInfo) -> bool;

    /// Placement-rules verdict for moving a peer of `region` from
    /// `src_store` to `dst_store`.
    fn placement_allows_peer(&self, region: &RegionInfo, src_store: u64, dst_store: u64) -> bool;

    /// Placement-rules verdict for moving the leader of `region` to
    /// `dst_store`, optionally together with its peer.
    fn placement_allows_leader(
        &self,
        region: &RegionInfo,
        src_store: u64,
        dst_store: u64,
        allow_move_leader: bool,
    ) -> bool;

    /// Whether the cluster reports query statistics.
    fn query_supported(&self) -> bool;

    fn region_buckets_enabled(&self) -> bool;

    /// Regions above this size (MiB) are split instead of moved.
    fn max_movable_hot_peer_size(&self) -> i64;

    /// Minimum hot degree for a peer to count as hot.
    fn hot_region_cache_hits_threshold(&self) -> u64;

    /// Whether per-store flow tracing metrics are enabled.
    fn trace_region_flow(&self) -> bool;
}
