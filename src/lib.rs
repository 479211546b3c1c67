// Copyright 2025 TiKV Project Authors. Licensed under Apache-2.0.

//! Hot region balance scheduler.
//!
//! A periodic control loop for a multi-raft key-value cluster: given
//! per-store load telemetry and per-region hot peer statistics, it proposes
//! region movements (move a replica, transfer leadership, or split a
//! region) that reduce load imbalance across stores while damping
//! oscillation through a pending influence ledger.
//!
//! Cluster membership, statistics ingestion and operator execution live
//! behind the [`cluster::ClusterView`] and [`operator::OperatorSink`]
//! seams; the scheduler itself runs to completion without I/O and never
//! surfaces an error from a tick.

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate slog_global;

pub mod cluster;
pub mod config;
pub mod error;
pub mod metrics;
pub mod operator;
pub mod stats;
pub mod types;

mod filters;
mod pending;
mod rank;
mod scheduler;
mod solver;
#[cfg(test)]
mod test_util;

pub use self::config::{HotRegionSchedulerConfig, SharedHotRegionConfig};
pub use self::error::{Error, Result};
pub use self::scheduler::{HotScheduler, HOT_REGION_SCHEDULER_NAME};
