// Copyright 2025 TiKV Project Authors. Licensed under Apache-2.0.

//! In-memory cluster and operator sink used by the scenario tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use hotspot_scheduler::cluster::{
    BucketStat, ClusterView, Peer, PeerRole, RegionInfo, StoreInfo,
};
use hotspot_scheduler::error::Result;
use hotspot_scheduler::operator::{OpKind, Operator, OperatorSink, SplitPolicy};
use hotspot_scheduler::stats::HotPeerStat;
use hotspot_scheduler::types::{
    RWType, REGION_STAT_LEN, STORE_READ_BYTES, STORE_STAT_LEN, STORE_WRITE_BYTES,
};

pub struct MockCluster {
    pub stores: HashMap<u64, Arc<StoreInfo>>,
    pub regions: HashMap<u64, Arc<RegionInfo>>,
    pub read_stats: HashMap<u64, Vec<Arc<HotPeerStat>>>,
    pub write_stats: HashMap<u64, Vec<Arc<HotPeerStat>>>,
    pub store_loads: HashMap<u64, Vec<f64>>,
    pub buckets: HashMap<u64, Vec<BucketStat>>,
    pub replication: usize,
    pub query_support: bool,
    pub buckets_enabled: bool,
    pub max_movable_size: i64,
}

impl Default for MockCluster {
    fn default() -> MockCluster {
        MockCluster {
            stores: HashMap::new(),
            regions: HashMap::new(),
            read_stats: HashMap::new(),
            write_stats: HashMap::new(),
            store_loads: HashMap::new(),
            buckets: HashMap::new(),
            replication: 3,
            query_support: false,
            buckets_enabled: false,
            max_movable_size: 10_000,
        }
    }
}

impl MockCluster {
    pub fn add_store(&mut self, id: u64) {
        self.stores.insert(id, Arc::new(StoreInfo::new(id)));
        self.store_loads.insert(id, vec![0.0; STORE_STAT_LEN]);
    }

    pub fn set_read_loads(&mut self, store_id: u64, byte: f64, key: f64) {
        let loads = self.store_loads.get_mut(&store_id).unwrap();
        loads[STORE_READ_BYTES] = byte;
        loads[STORE_READ_BYTES + 1] = key;
    }

    pub fn set_write_loads(&mut self, store_id: u64, byte: f64, key: f64) {
        let loads = self.store_loads.get_mut(&store_id).unwrap();
        loads[STORE_WRITE_BYTES] = byte;
        loads[STORE_WRITE_BYTES + 1] = key;
    }

    pub fn add_region(&mut self, id: u64, store_ids: &[u64], leader_store_id: u64) {
        self.add_region_with_size(id, store_ids, leader_store_id, 10);
    }

    pub fn add_region_with_size(
        &mut self,
        id: u64,
        store_ids: &[u64],
        leader_store_id: u64,
        approximate_size: i64,
    ) {
        let peers = store_ids
            .iter()
            .enumerate()
            .map(|(i, &store_id)| Peer {
                id: id * 100 + i as u64,
                store_id,
                role: PeerRole::Voter,
            })
            .collect();
        self.regions.insert(
            id,
            Arc::new(RegionInfo {
                id,
                start_key: Vec::new(),
                end_key: Vec::new(),
                peers,
                leader_store_id,
                approximate_size,
                bucket_keys: Vec::new(),
                down_peer_ids: Vec::new(),
                pending_peer_ids: Vec::new(),
            }),
        );
    }

    pub fn set_region_bucket_keys(&mut self, region_id: u64, keys: &[&[u8]]) {
        let region = self.regions.get(&region_id).unwrap();
        let mut updated = (**region).clone();
        updated.bucket_keys = keys.iter().map(|k| k.to_vec()).collect();
        self.regions.insert(region_id, Arc::new(updated));
    }

    pub fn add_hot_peer(
        &mut self,
        rw: RWType,
        region_id: u64,
        store_id: u64,
        byte: f64,
        key: f64,
        is_leader: bool,
    ) {
        let stat = Arc::new(HotPeerStat {
            region_id,
            store_id,
            loads: [byte, key, 0.0],
            hot_degree: 4,
            is_leader,
            needs_cooldown: false,
        });
        let stats = match rw {
            RWType::Read => &mut self.read_stats,
            RWType::Write => &mut self.write_stats,
        };
        stats.entry(store_id).or_default().push(stat);
    }

    pub fn add_bucket(
        &mut self,
        region_id: u64,
        start_key: &[u8],
        end_key: &[u8],
        loads: [u64; REGION_STAT_LEN],
    ) {
        self.buckets.entry(region_id).or_default().push(BucketStat {
            region_id,
            start_key: start_key.to_vec(),
            end_key: end_key.to_vec(),
            loads,
        });
    }
}

impl ClusterView for MockCluster {
    fn stores(&self) -> Vec<Arc<StoreInfo>> {
        self.stores.values().cloned().collect()
    }

    fn region(&self, region_id: u64) -> Option<Arc<RegionInfo>> {
        self.regions.get(&region_id).cloned()
    }

    fn hot_peer_stats(&self, rw: RWType) -> HashMap<u64, Vec<Arc<HotPeerStat>>> {
        match rw {
            RWType::Read => self.read_stats.clone(),
            RWType::Write => self.write_stats.clone(),
        }
    }

    fn hot_peer_stat(&self, rw: RWType, region_id: u64, store_id: u64) -> Option<Arc<HotPeerStat>> {
        let stats = match rw {
            RWType::Read => &self.read_stats,
            RWType::Write => &self.write_stats,
        };
        stats
            .get(&store_id)?
            .iter()
            .find(|stat| stat.region_id == region_id)
            .cloned()
    }

    fn stores_loads(&self) -> HashMap<u64, Vec<f64>> {
        self.store_loads.clone()
    }

    fn bucket_stats(&self, _min_hot_degree: u64, region_ids: &[u64]) -> HashMap<u64, Vec<BucketStat>> {
        region_ids
            .iter()
            .filter_map(|id| self.buckets.get(id).map(|stats| (*id, stats.clone())))
            .collect()
    }

    fn is_region_replicated(&self, region: &RegionInfo) -> bool {
        region.peers.len() >= self.replication
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
        self.query_support
    }

    fn region_buckets_enabled(&self) -> bool {
        self.buckets_enabled
    }

    fn max_movable_hot_peer_size(&self) -> i64 {
        self.max_movable_size
    }

    fn hot_region_cache_hits_threshold(&self) -> u64 {
        3
    }

    fn trace_region_flow(&self) -> bool {
        false
    }
}

#[derive(Clone, Debug)]
pub struct OpRecord {
    pub desc: String,
    pub region_id: u64,
    pub src_store: u64,
    pub dst_store: u64,
    pub split_keys: Vec<Vec<u8>>,
}

#[derive(Default)]
pub struct MockSink {
    pub scheduled: u64,
    pub limit: u64,
    pub created: Mutex<Vec<OpRecord>>,
}

impl MockSink {
    pub fn new() -> MockSink {
        MockSink {
            scheduled: 0,
            limit: 4,
            created: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, record: OpRecord) {
        self.created.lock().unwrap().push(record);
    }

    fn build(desc: &str, region_id: u64, kind: OpKind, src: u64, dst: u64) -> Operator {
        let mut op = Operator::new(desc, region_id, kind);
        op.set_additional_info("from", src.to_string());
        op.set_additional_info("to", dst.to_string());
        op
    }
}

impl OperatorSink for MockSink {
    fn create_transfer_leader(
        &self,
        desc: &str,
        region: &RegionInfo,
        src_store: u64,
        dst_store: u64,
    ) -> Result<Operator> {
        self.record(OpRecord {
            desc: desc.to_owned(),
            region_id: region.id,
            src_store,
            dst_store,
            split_keys: Vec::new(),
        });
        Ok(Self::build(desc, region.id, OpKind::HotRegion, src_store, dst_store))
    }

    fn create_move_leader(
        &self,
        desc: &str,
        region: &RegionInfo,
        src_store: u64,
        dst_store: u64,
        _role: PeerRole,
    ) -> Result<Operator> {
        self.record(OpRecord {
            desc: desc.to_owned(),
            region_id: region.id,
            src_store,
            dst_store,
            split_keys: Vec::new(),
        });
        Ok(Self::build(desc, region.id, OpKind::HotRegion, src_store, dst_store))
    }

    fn create_move_peer(
        &self,
        desc: &str,
        region: &RegionInfo,
        src_store: u64,
        dst_store: u64,
        _role: PeerRole,
    ) -> Result<Operator> {
        self.record(OpRecord {
            desc: desc.to_owned(),
            region_id: region.id,
            src_store,
            dst_store,
            split_keys: Vec::new(),
        });
        Ok(Self::build(desc, region.id, OpKind::HotRegion, src_store, dst_store))
    }

    fn create_split_region(
        &self,
        desc: &str,
        region: &RegionInfo,
        _policy: SplitPolicy,
        split_keys: Vec<Vec<u8>>,
    ) -> Result<Operator> {
        self.record(OpRecord {
            desc: desc.to_owned(),
            region_id: region.id,
            src_store: 0,
            dst_store: 0,
            split_keys: split_keys.clone(),
        });
        let mut op = Operator::new(desc, region.id, OpKind::HotRegionSplit);
        let keys = split_keys
            .iter()
            .map(|k| String::from_utf8_lossy(k).into_owned())
            .collect::<Vec<_>>()
            .join(",");
        op.set_additional_info("split-keys", keys);
        Ok(op)
    }

    fn operator_count(&self, _kind: OpKind) -> u64 {
        self.scheduled
    }

    fn hot_region_schedule_limit(&self) -> u64 {
        self.limit
    }
}
