// Copyright 2025 TiKV Project Authors. Licensed under Apache-2.0.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::{self, RWType, BYTE_DIM, KEY_DIM, QUERY_DIM};

/// Interval of store heartbeats carrying store-level load samples.
pub const STORE_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
/// Interval of region heartbeats carrying per-region flow samples.
pub const REGION_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// Columnar stores smooth load slower, so their expectation gates are
/// relaxed by this correction.
pub const TIFLASH_TOLERANCE_RATIO_CORRECTION: f64 = 0.1;

const DEFAULT_HISTORY_SAMPLE_DURATION_SECS: u64 = 5 * 60;
const DEFAULT_HISTORY_SAMPLE_INTERVAL_SECS: u64 = 30;

/// Options of the hot region balance scheduler.
///
/// All rates are per-second values as reported by the statistics pipeline.
/// Tolerance ratios of zero or below disable the expectation gates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[serde(rename_all = "kebab-case")]
pub struct HotRegionSchedulerConfig {
    pub min_hot_byte_rate: f64,
    pub min_hot_key_rate: f64,
    pub min_hot_query_rate: f64,
    /// Terminal operators keep their pending entry for this many heartbeat
    /// rounds before being garbage collected.
    pub max_zombie_rounds: u64,
    /// Cap on candidate hot peers considered per store.
    pub max_peer_num: usize,
    pub byte_rate_rank_step_ratio: f64,
    pub key_rate_rank_step_ratio: f64,
    pub query_rate_rank_step_ratio: f64,
    pub count_rank_step_ratio: f64,
    pub great_dec_ratio: f64,
    pub minor_dec_ratio: f64,
    pub src_tolerance_ratio: f64,
    pub dst_tolerance_ratio: f64,
    pub read_priorities: Vec<String>,
    pub write_leader_priorities: Vec<String>,
    pub write_peer_priorities: Vec<String>,
    pub strict_picking_store: bool,
    pub enable_for_tiflash: bool,
    /// `v1` or `v2`.
    pub rank_formula_version: String,
    /// `none`, `read` or `write`. Masks one statistics flavor entirely.
    pub forbid_rw_type: String,
    /// A hot peer above this share of its store load triggers a load-based
    /// split instead of a move.
    pub split_thresholds: f64,
    pub history_sample_duration_secs: u64,
    pub history_sample_interval_secs: u64,
}

impl Default for HotRegionSchedulerConfig {
    fn default() -> HotRegionSchedulerConfig {
        HotRegionSchedulerConfig {
            min_hot_byte_rate: 100.0,
            min_hot_key_rate: 10.0,
            min_hot_query_rate: 10.0,
            max_zombie_rounds: 3,
            max_peer_num: 1000,
            byte_rate_rank_step_ratio: 0.05,
            key_rate_rank_step_ratio: 0.05,
            query_rate_rank_step_ratio: 0.05,
            count_rank_step_ratio: 0.01,
            great_dec_ratio: 0.95,
            minor_dec_ratio: 0.99,
            src_tolerance_ratio: 1.05,
            dst_tolerance_ratio: 1.05,
            read_priorities: to_owned_list(&types::default_read_priorities()),
            write_leader_priorities: to_owned_list(&types::default_write_leader_priorities()),
            write_peer_priorities: to_owned_list(&types::default_write_peer_priorities()),
            strict_picking_store: true,
            enable_for_tiflash: true,
            rank_formula_version: "v2".to_owned(),
            forbid_rw_type: "none".to_owned(),
            split_thresholds: 0.2,
            history_sample_duration_secs: DEFAULT_HISTORY_SAMPLE_DURATION_SECS,
            history_sample_interval_secs: DEFAULT_HISTORY_SAMPLE_INTERVAL_SECS,
        }
    }
}

fn to_owned_list(pair: &[&str; 2]) -> Vec<String> {
    pair.iter().map(|s| s.to_string()).collect()
}

pub(crate) fn validate_priorities(name: &str, priorities: &[String]) -> Result<()> {
    if priorities.len() != 2 {
        return Err(Error::InvalidConfig(format!(
            "{} must name exactly two dimensions",
            name
        )));
    }
    for p in priorities {
        if types::string_to_dim(p).is_none() {
            return Err(Error::InvalidConfig(format!(
                "{} contains unknown dimension {:?}",
                name, p
            )));
        }
    }
    if priorities[0] == priorities[1] {
        return Err(Error::InvalidConfig(format!(
            "{} contains duplicated dimensions",
            name
        )));
    }
    Ok(())
}

impl HotRegionSchedulerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.rank_formula_version != "v1" && self.rank_formula_version != "v2" {
            return Err(Error::InvalidConfig(format!(
                "unknown rank formula version {:?}",
                self.rank_formula_version
            )));
        }
        if !matches!(self.forbid_rw_type.as_str(), "none" | "read" | "write") {
            return Err(Error::InvalidConfig(format!(
                "unknown forbid rw type {:?}",
                self.forbid_rw_type
            )));
        }
        if !(0.01..=1.0).contains(&self.split_thresholds) {
            return Err(Error::InvalidConfig(format!(
                "split thresholds {} out of [0.01, 1.0]",
                self.split_thresholds
            )));
        }
        if self.history_sample_interval_secs == 0 {
            return Err(Error::InvalidConfig(
                "history sample interval must be positive".to_owned(),
            ));
        }
        validate_priorities("read-priorities", &self.read_priorities)?;
        validate_priorities("write-leader-priorities", &self.write_leader_priorities)?;
        validate_priorities("write-peer-priorities", &self.write_peer_priorities)?;
        Ok(())
    }

    pub fn min_hot_rate(&self, dim: usize) -> f64 {
        match dim {
            BYTE_DIM => self.min_hot_byte_rate,
            KEY_DIM => self.min_hot_key_rate,
            QUERY_DIM => self.min_hot_query_rate,
            _ => -1.0,
        }
    }

    pub fn rank_step_ratio(&self, dim: usize) -> f64 {
        match dim {
            BYTE_DIM => self.byte_rate_rank_step_ratio,
            KEY_DIM => self.key_rate_rank_step_ratio,
            QUERY_DIM => self.query_rate_rank_step_ratio,
            _ => 0.0,
        }
    }

    pub fn is_forbid(&self, rw: RWType) -> bool {
        self.forbid_rw_type == rw.as_str()
    }

    /// Zombie window for operators guided by store-level statistics.
    pub fn store_stat_zombie_duration(&self) -> Duration {
        STORE_HEARTBEAT_INTERVAL * self.max_zombie_rounds as u32
    }

    /// Zombie window for operators guided by summed region statistics,
    /// which refresh far slower.
    pub fn regions_stat_zombie_duration(&self) -> Duration {
        REGION_HEARTBEAT_INTERVAL * self.max_zombie_rounds as u32
    }

    pub fn history_sample_duration(&self) -> Duration {
        Duration::from_secs(self.history_sample_duration_secs)
    }

    pub fn history_sample_interval(&self) -> Duration {
        Duration::from_secs(self.history_sample_interval_secs)
    }

    /// Expectation gates are active only when both tolerance ratios are set.
    pub fn expectation_enabled(&self) -> bool {
        self.src_tolerance_ratio > 0.0 && self.dst_tolerance_ratio > 0.0
    }
}

/// Shared configuration handle. HTTP-driven updates go through the write
/// lock; the scheduler copies one snapshot per tick so a slow pass never
/// holds the read lock for long.
#[derive(Clone, Debug, Default)]
pub struct SharedHotRegionConfig(Arc<RwLock<HotRegionSchedulerConfig>>);

impl SharedHotRegionConfig {
    pub fn new(cfg: HotRegionSchedulerConfig) -> SharedHotRegionConfig {
        SharedHotRegionConfig(Arc::new(RwLock::new(cfg)))
    }

    pub fn snapshot(&self) -> HotRegionSchedulerConfig {
        self.0.read().unwrap().clone()
    }

    /// Replaces the configuration after validation.
    pub fn update(&self, cfg: HotRegionSchedulerConfig) -> Result<()> {
        cfg.validate()?;
        *self.0.write().unwrap() = cfg;
        Ok(())
    }
}
