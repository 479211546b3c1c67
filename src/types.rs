// Copyright 2025 TiKV Project Authors. Licensed under Apache-2.0.

//! Load dimensions, read/write flavors and resource types shared by the
//! statistics and scheduling modules.

/// Index of the byte-rate dimension in a load vector.
pub const BYTE_DIM: usize = 0;
/// Index of the key-rate dimension in a load vector.
pub const KEY_DIM: usize = 1;
/// Index of the query-rate dimension in a load vector.
pub const QUERY_DIM: usize = 2;
/// Width of a per-store load vector.
pub const DIM_LEN: usize = 3;

pub const BYTE_PRIORITY: &str = "byte";
pub const KEY_PRIORITY: &str = "key";
pub const QUERY_PRIORITY: &str = "query";

// Region level statistics cover both read and write rates, three dimensions
// each. Influence vectors are indexed by these kinds.
pub const REGION_READ_BYTES: usize = 0;
pub const REGION_READ_KEYS: usize = 1;
pub const REGION_READ_QUERY: usize = 2;
pub const REGION_WRITE_BYTES: usize = 3;
pub const REGION_WRITE_KEYS: usize = 4;
pub const REGION_WRITE_QUERY: usize = 5;
pub const REGION_STAT_LEN: usize = 6;

// Raw store load samples reported by the statistics pipeline share the same
// layout as the region stat kinds.
pub const STORE_READ_BYTES: usize = 0;
pub const STORE_READ_KEYS: usize = 1;
pub const STORE_READ_QUERY: usize = 2;
pub const STORE_WRITE_BYTES: usize = 3;
pub const STORE_WRITE_KEYS: usize = 4;
pub const STORE_WRITE_QUERY: usize = 5;
pub const STORE_STAT_LEN: usize = 6;

pub fn dim_to_string(dim: usize) -> &'static str {
    match dim {
        BYTE_DIM => BYTE_PRIORITY,
        KEY_DIM => KEY_PRIORITY,
        QUERY_DIM => QUERY_PRIORITY,
        _ => "unknown",
    }
}

pub fn string_to_dim(name: &str) -> Option<usize> {
    match name {
        BYTE_PRIORITY => Some(BYTE_DIM),
        KEY_PRIORITY => Some(KEY_DIM),
        QUERY_PRIORITY => Some(QUERY_DIM),
        _ => None,
    }
}

/// The flavor of statistics a scheduling pass works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RWType {
    Read,
    Write,
}

impl RWType {
    pub fn as_str(self) -> &'static str {
        match self {
            RWType::Read => "read",
            RWType::Write => "write",
        }
    }

    pub fn inverse(self) -> RWType {
        match self {
            RWType::Read => RWType::Write,
            RWType::Write => RWType::Read,
        }
    }

    /// Offset of this flavor's block inside a full region stat vector.
    pub fn region_stat_offset(self) -> usize {
        match self {
            RWType::Read => REGION_READ_BYTES,
            RWType::Write => REGION_WRITE_BYTES,
        }
    }

    /// Writes the three dimension rates into the matching slots of a full
    /// region stat vector.
    pub fn set_full_load_rates(self, full: &mut [f64; REGION_STAT_LEN], dims: &[f64; DIM_LEN]) {
        let offset = self.region_stat_offset();
        full[offset..offset + DIM_LEN].copy_from_slice(dims);
    }
}

/// What a balance pass moves: a whole peer or just the leadership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpType {
    MovePeer,
    TransferLeader,
}

impl OpType {
    pub fn as_str(self) -> &'static str {
        match self {
            OpType::MovePeer => "move-peer",
            OpType::TransferLeader => "transfer-leader",
        }
    }
}

/// Whether a statistics summary is taken over leaders only or over all
/// replicas of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Leader,
    Region,
}

/// The four scheduling flavors, derived from the `(RWType, OpType)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    WritePeer,
    WriteLeader,
    ReadPeer,
    ReadLeader,
}

pub const RESOURCE_TYPE_LEN: usize = 4;

pub const ALL_RESOURCE_TYPES: [ResourceType; RESOURCE_TYPE_LEN] = [
    ResourceType::WritePeer,
    ResourceType::WriteLeader,
    ResourceType::ReadPeer,
    ResourceType::ReadLeader,
];

impl ResourceType {
    pub fn new(rw: RWType, op: OpType) -> ResourceType {
        match (rw, op) {
            (RWType::Write, OpType::MovePeer) => ResourceType::WritePeer,
            (RWType::Write, OpType::TransferLeader) => ResourceType::WriteLeader,
            (RWType::Read, OpType::MovePeer) => ResourceType::ReadPeer,
            (RWType::Read, OpType::TransferLeader) => ResourceType::ReadLeader,
        }
    }

    pub fn build(rw: RWType, kind: ResourceKind) -> ResourceType {
        match (rw, kind) {
            (RWType::Write, ResourceKind::Region) => ResourceType::WritePeer,
            (RWType::Write, ResourceKind::Leader) => ResourceType::WriteLeader,
            (RWType::Read, ResourceKind::Region) => ResourceType::ReadPeer,
            (RWType::Read, ResourceKind::Leader) => ResourceType::ReadLeader,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::WritePeer => "write-peer",
            ResourceType::WriteLeader => "write-leader",
            ResourceType::ReadPeer => "read-peer",
            ResourceType::ReadLeader => "read-leader",
        }
    }

    pub fn index(self) -> usize {
        match self {
            ResourceType::WritePeer => 0,
            ResourceType::WriteLeader => 1,
            ResourceType::ReadPeer => 2,
            ResourceType::ReadLeader => 3,
        }
    }

    pub fn rw_type(self) -> RWType {
        match self {
            ResourceType::WritePeer | ResourceType::WriteLeader => RWType::Write,
            ResourceType::ReadPeer | ResourceType::ReadLeader => RWType::Read,
        }
    }

    pub fn op_type(self) -> OpType {
        match self {
            ResourceType::WritePeer | ResourceType::ReadPeer => OpType::MovePeer,
            ResourceType::WriteLeader | ResourceType::ReadLeader => OpType::TransferLeader,
        }
    }
}

pub fn default_read_priorities() -> [&'static str; 2] {
    [QUERY_PRIORITY, BYTE_PRIORITY]
}

pub fn default_write_leader_priorities() -> [&'static str; 2] {
    [KEY_PRIORITY, BYTE_PRIORITY]
}

pub fn default_write_peer_priorities() -> [&'static str; 2] {
    [BYTE_PRIORITY, KEY_PRIORITY]
}

/// Fallback priorities for clusters without query statistics.
pub fn compatible_read_priorities() -> [&'static str; 2] {
    [BYTE_PRIORITY, KEY_PRIORITY]
}

/// Resolves a configured priority list into a `(first, second)` dimension
/// pair. An illegal list (wrong length, duplicated or unknown dimensions, or
/// a query priority on a cluster without query statistics) falls back to the
/// defaults rather than failing the whole tick.
pub fn adjust_priorities(
    query_support: bool,
    origins: &[String],
    defaults: [&'static str; 2],
    compatibles: [&'static str; 2],
) -> (usize, usize) {
    let with_query = origins.iter().any(|p| p == QUERY_PRIORITY);
    if !query_support && with_query {
        return priority_pair_to_dims(compatibles);
    }
    let legal = origins.iter().all(|p| {
        p == BYTE_PRIORITY || p == KEY_PRIORITY || (query_support && p == QUERY_PRIORITY)
    });
    if origins.len() == 2 && legal && origins[0] != origins[1] {
        let first = string_to_dim(&origins[0]).unwrap();
        let second = string_to_dim(&origins[1]).unwrap();
        return (first, second);
    }
    priority_pair_to_dims(defaults)
}

fn priority_pair_to_dims(pair: [&'static str; 2]) -> (usize, usize) {
    (
        string_to_dim(pair[0]).unwrap(),
        string_to_dim(pair[1]).unwrap(),
    )
}
