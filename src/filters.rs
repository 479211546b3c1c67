// Copyright 2025 TiKV Project Authors. Licensed under Apache-2.0.

//! Store and region admissibility filters used when assembling destination
//! candidates.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::cluster::{ClusterView, RegionInfo, SpecialUse, StoreInfo};

/// A store involved in more snapshots than this cannot take part in peer
/// movements.
const MAX_SNAPSHOT_COUNT: u64 = 3;
const MAX_PENDING_PEER_COUNT: u64 = 16;

pub(crate) trait StoreFilter {
    fn target(&self, store: &StoreInfo) -> bool;
}

/// Basic health gate: the store must be up, connected and able to absorb
/// the requested kind of operation.
pub(crate) struct StoreStateFilter {
    pub move_region: bool,
    pub transfer_leader: bool,
}

impl StoreFilter for StoreStateFilter {
    fn target(&self, store: &StoreInfo) -> bool {
        if !store.is_up() || store.is_disconnected {
            return false;
        }
        if (self.move_region || self.transfer_leader) && store.is_busy {
            return false;
        }
        if self.move_region
            && (store.sending_snap_count > MAX_SNAPSHOT_COUNT
                || store.receiving_snap_count > MAX_SNAPSHOT_COUNT
                || store.pending_peer_count > MAX_PENDING_PEER_COUNT)
        {
            return false;
        }
        true
    }
}

/// Rejects stores that already hold a replica of the region.
pub(crate) struct ExcludedFilter {
    excluded: HashSet<u64>,
}

impl ExcludedFilter {
    pub fn new(excluded: impl IntoIterator<Item = u64>) -> ExcludedFilter {
        ExcludedFilter {
            excluded: excluded.into_iter().collect(),
        }
    }
}

impl StoreFilter for ExcludedFilter {
    fn target(&self, store: &StoreInfo) -> bool {
        !self.excluded.contains(&store.id)
    }
}

/// Stores reserved for a dedicated purpose only receive hot regions when
/// that purpose is hot-region scheduling itself.
pub(crate) struct SpecialUseFilter;

impl StoreFilter for SpecialUseFilter {
    fn target(&self, store: &StoreInfo) -> bool {
        matches!(store.special_use, SpecialUse::None | SpecialUse::HotRegion)
    }
}

/// Placement-rules safeguard for peer movements, answered by the rules
/// engine behind the cluster view.
pub(crate) struct PlacementSafeguard<'a, C: ClusterView> {
    cluster: &'a C,
    region: &'a RegionInfo,
    src_store: u64,
}

impl<'a, C: ClusterView> PlacementSafeguard<'a, C> {
    pub fn new(cluster: &'a C, region: &'a RegionInfo, src_store: u64) -> PlacementSafeguard<'a, C> {
        PlacementSafeguard {
            cluster,
            region,
            src_store,
        }
    }
}

impl<'a, C: ClusterView> StoreFilter for PlacementSafeguard<'a, C> {
    fn target(&self, store: &StoreInfo) -> bool {
        self.cluster
            .placement_allows_peer(self.region, self.src_store, store.id)
    }
}

pub(crate) fn filter_target(store: &StoreInfo, filters: &[&dyn StoreFilter]) -> bool {
    filters.iter().all(|f| f.target(store))
}

/// Down replicas make a region unschedulable; pending replicas are allowed.
pub(crate) fn is_region_healthy_allow_pending(region: &RegionInfo) -> bool {
    region.down_peer_ids.is_empty()
}

/// Moving a peer streams a snapshot from one of the current holders, so a
/// region whose holders are saturated senders must wait.
pub(crate) fn region_passes_snapshot_filter(
    stores: &HashMap<u64, Arc<StoreInfo>>,
    region: &RegionInfo,
) -> bool {
    region.peers.iter().all(|peer| {
        stores
            .get(&peer.store_id)
            .map(|store| store.sending_snap_count <= MAX_SNAPSHOT_COUNT)
            .unwrap_or(true)
    })
}
