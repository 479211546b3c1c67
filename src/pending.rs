// Copyright 2025 TiKV Project Authors. Licensed under Apache-2.0.

//! The pending influence ledger.
//!
//! Every submitted operator leaves an influence record keyed by its region.
//! The record biases the next ticks' load predictions (subtracting from the
//! sources, adding to the destination) and blocks the region from being
//! picked again until the operator is done and its zombie window has passed.

use std::collections::HashMap;
use std::time::Duration;

use crate::metrics::PENDING_OP_FAIL_COUNTER;
use crate::operator::{OpStatus, Operator};
use crate::stats::{Influence, StoreSummary};

#[derive(Debug)]
pub struct PendingInfluence {
    pub op: Operator,
    pub froms: Vec<u64>,
    pub to: u64,
    pub origin: Influence,
    pub max_zombie_duration: Duration,
}

/// Computes the decay weight of one pending operator and whether its entry
/// can be dropped.
///
/// Running operators keep full weight. Successful operators keep full weight
/// through the zombie window so the moved load is not double-scheduled
/// before fresh statistics arrive. Failed operators lose their weight at
/// once but the entry is retained until the zombie window elapses, which
/// keeps the region out of the candidate set.
fn calc_pending_weight(op: &Operator, max_zombie_duration: Duration) -> (f64, bool) {
    let zombie = match op.end_elapsed() {
        Some(elapsed) => elapsed,
        None => return (1.0, false),
    };
    let mut weight = if zombie >= max_zombie_duration { 0.0 } else { 1.0 };
    let needs_gc = weight == 0.0;
    if op.status() != OpStatus::Success {
        weight = 0.0;
    }
    (weight, needs_gc)
}

/// Region id → in-flight influence. At most one entry per region.
#[derive(Debug, Default)]
pub struct PendingLedger {
    regions: HashMap<u64, PendingInfluence>,
}

impl PendingLedger {
    pub fn contains(&self, region_id: u64) -> bool {
        self.regions.contains_key(&region_id)
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn region_ids(&self) -> Vec<u64> {
        self.regions.keys().copied().collect()
    }

    /// Records the influence of a freshly created operator. Fails if the
    /// region already has an in-flight entry.
    pub fn try_insert(&mut self, pending: PendingInfluence) -> bool {
        let region_id = pending.op.region_id();
        if self.regions.contains_key(&region_id) {
            PENDING_OP_FAIL_COUNTER.inc();
            return false;
        }
        self.regions.insert(region_id, pending);
        true
    }

    /// Applies every live entry's decayed influence to the store summaries
    /// and drops the entries whose zombie window has elapsed.
    pub fn decay(&mut self, summaries: &mut HashMap<u64, StoreSummary>) {
        self.regions.retain(|_, pending| {
            let (weight, needs_gc) = calc_pending_weight(&pending.op, pending.max_zombie_duration);
            if needs_gc {
                return false;
            }
            if weight > 0.0 {
                for from in &pending.froms {
                    if let Some(summary) = summaries.get_mut(from) {
                        summary.add_influence(&pending.origin, -weight);
                    }
                }
                if let Some(summary) = summaries.get_mut(&pending.to) {
                    summary.add_influence(&pending.origin, weight);
                }
            }
            true
        });
    }
}
