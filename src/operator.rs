// Copyright 2025 TiKV Project Authors. Licensed under Apache-2.0.

//! Operator handles and the sink through which the scheduler materializes
//! cluster changes.
//!
//! The scheduler never executes operators itself. It creates them through an
//! [`OperatorSink`] and keeps a handle with a shared status cell; the
//! downstream controller flips the status as execution proceeds and the
//! pending ledger observes the transition on its next decay pass.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::cluster::{PeerRole, RegionInfo};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpStatus {
    Created,
    Started,
    Success,
    Canceled,
    Replaced,
    Timeout,
    Expired,
}

impl OpStatus {
    pub fn is_end(self) -> bool {
        !matches!(self, OpStatus::Created | OpStatus::Started)
    }
}

/// Operator kind tag. Every operator the hot scheduler emits carries the
/// hot-region tag; split operators carry the split tag on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    HotRegion,
    HotRegionSplit,
}

impl OpKind {
    pub fn is_split(self) -> bool {
        self == OpKind::HotRegionSplit
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityLevel {
    Low,
    Normal,
    High,
}

/// Split-region check policy. The hot scheduler always splits at explicit
/// keys drawn from bucket boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitPolicy {
    UseKey,
}

#[derive(Debug)]
struct StatusInner {
    status: OpStatus,
    since: Instant,
}

/// Shared status cell, written by the executor and read by the scheduler.
#[derive(Debug)]
pub struct OperatorStatus(Mutex<StatusInner>);

impl OperatorStatus {
    fn new() -> OperatorStatus {
        OperatorStatus(Mutex::new(StatusInner {
            status: OpStatus::Created,
            since: Instant::now(),
        }))
    }
}

#[derive(Debug, Clone)]
pub struct Operator {
    desc: String,
    region_id: u64,
    kind: OpKind,
    priority: PriorityLevel,
    additional_info: Vec<(String, String)>,
    status: Arc<OperatorStatus>,
}

impl Operator {
    pub fn new(desc: impl Into<String>, region_id: u64, kind: OpKind) -> Operator {
        Operator {
            desc: desc.into(),
            region_id,
            kind,
            priority: PriorityLevel::Normal,
            additional_info: Vec::new(),
            status: Arc::new(OperatorStatus::new()),
        }
    }

    pub fn desc(&self) -> &str {
        &self.desc
    }

    pub fn region_id(&self) -> u64 {
        self.region_id
    }

    pub fn kind(&self) -> OpKind {
        self.kind
    }

    pub fn priority(&self) -> PriorityLevel {
        self.priority
    }

    pub fn set_priority(&mut self, priority: PriorityLevel) {
        self.priority = priority;
    }

    pub fn set_additional_info(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.additional_info.push((key.into(), value.into()));
    }

    pub fn additional_info(&self, key: &str) -> Option<&str> {
        self.additional_info
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn status(&self) -> OpStatus {
        self.status.0.lock().unwrap().status
    }

    /// Marks an execution state transition. Called by the downstream
    /// executor; end states are sticky.
    pub fn mark(&self, status: OpStatus) {
        let mut inner = self.status.0.lock().unwrap();
        if inner.status.is_end() {
            return;
        }
        inner.status = status;
        inner.since = Instant::now();
    }

    pub fn is_end(&self) -> bool {
        self.status().is_end()
    }

    /// Time spent in the current end state, `None` while still running.
    pub fn end_elapsed(&self) -> Option<Duration> {
        let inner = self.status.0.lock().unwrap();
        if inner.status.is_end() {
            Some(inner.since.elapsed())
        } else {
            None
        }
    }
}

/// The seam to the operator subsystem. Creation validates against the
/// current region state and may fail; a failure discards the whole batch.
pub trait OperatorSink {
    fn create_transfer_leader(
        &self,
        desc: &str,
        region: &RegionInfo,
        src_store: u64,
        dst_store: u64,
    ) -> Result<Operator>;

    fn create_move_leader(
        &self,
        desc: &str,
        region: &RegionInfo,
        src_store: u64,
        dst_store: u64,
        role: PeerRole,
    ) -> Result<Operator>;

    fn create_move_peer(
        &self,
        desc: &str,
        region: &RegionInfo,
        src_store: u64,
        dst_store: u64,
        role: PeerRole,
    ) -> Result<Operator>;

    fn create_split_region(
        &self,
        desc: &str,
        region: &RegionInfo,
        policy: SplitPolicy,
        split_keys: Vec<Vec<u8>>,
    ) -> Result<Operator>;

    /// Number of currently scheduled operators carrying the given kind.
    fn operator_count(&self, kind: OpKind) -> u64;

    fn hot_region_schedule_limit(&self) -> u64;
}
