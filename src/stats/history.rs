// Copyright 2025 TiKV Project Authors. Licensed under Apache-2.0.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::types::{RWType, ResourceKind, ResourceType, DIM_LEN};

/// Rolling window of per-store load samples, kept separately for every
/// `(store, flavor, kind)` combination. One sample is admitted per sample
/// interval; the window holds `duration / interval` samples.
#[derive(Debug)]
pub struct StoreHistoryLoads {
    sample_duration: Duration,
    sample_interval: Duration,
    sample_num: usize,
    items: HashMap<(u64, ResourceType), StoreHistoryLoad>,
}

#[derive(Debug)]
struct StoreHistoryLoad {
    last_sample: Instant,
    loads: [VecDeque<f64>; DIM_LEN],
}

// A zero interval admits every sample and sizes the window by seconds.
fn sample_num(duration: Duration, interval: Duration) -> usize {
    (duration.as_secs() / interval.as_secs().max(1)) as usize
}

impl StoreHistoryLoads {
    pub fn new(sample_duration: Duration, sample_interval: Duration) -> StoreHistoryLoads {
        StoreHistoryLoads {
            sample_duration,
            sample_interval,
            sample_num: sample_num(sample_duration, sample_interval),
            items: HashMap::new(),
        }
    }

    /// Records one load sample. Samples arriving within the sample interval
    /// of the previous one are dropped.
    pub fn add(&mut self, store_id: u64, rw: RWType, kind: ResourceKind, loads: &[f64; DIM_LEN]) {
        if self.sample_num == 0 {
            return;
        }
        let ty = ResourceType::build(rw, kind);
        let now = Instant::now();
        let item = self
            .items
            .entry((store_id, ty))
            .or_insert_with(|| StoreHistoryLoad {
                last_sample: now,
                loads: Default::default(),
            });
        if !item.loads[0].is_empty() && now.duration_since(item.last_sample) < self.sample_interval
        {
            return;
        }
        item.last_sample = now;
        for (ring, &load) in item.loads.iter_mut().zip(loads) {
            ring.push_back(load);
            while ring.len() > self.sample_num {
                ring.pop_front();
            }
        }
    }

    /// Returns the recorded window as `[dim][sample]`, oldest first. Empty
    /// rows when nothing has been recorded yet.
    pub fn get(&self, store_id: u64, rw: RWType, kind: ResourceKind) -> Vec<Vec<f64>> {
        let ty = ResourceType::build(rw, kind);
        match self.items.get(&(store_id, ty)) {
            Some(item) => item
                .loads
                .iter()
                .map(|ring| ring.iter().copied().collect())
                .collect(),
            None => vec![Vec::new(); DIM_LEN],
        }
    }

    /// Applies a new window size, keeping the most recent samples.
    pub fn update_config(&mut self, sample_duration: Duration, sample_interval: Duration) {
        if self.sample_duration == sample_duration && self.sample_interval == sample_interval {
            return;
        }
        self.sample_duration = sample_duration;
        self.sample_interval = sample_interval;
        self.sample_num = sample_num(sample_duration, sample_interval);
        if self.sample_num == 0 {
            self.items.clear();
            return;
        }
        for item in self.items.values_mut() {
            for ring in item.loads.iter_mut() {
                while ring.len() > self.sample_num {
                    ring.pop_front();
                }
            }
        }
    }
}
