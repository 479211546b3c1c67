// Copyright 2025 TiKV Project Authors. Licensed under Apache-2.0.

//! Rank formula v1.
//!
//! A candidate is judged per dimension by its decline ratio: the share of
//! load remaining on the destination side relative to the source side after
//! the move. Ratios below `great-dec-ratio` count as a real improvement,
//! ratios below `minor-dec-ratio` as harmless.

use std::cmp::Ordering;
use std::sync::Arc;

use super::{check_all_of, check_first_only, rank_cmp, DIM_TO_STEP, SPLIT_PROGRESSIVE_RANK};
use crate::cluster::ClusterView;
use crate::operator::OperatorSink;
use crate::solver::{BalanceSolver, Solution};
use crate::types::{dim_to_string, ResourceType};

#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct RankV1;

impl RankV1 {
    /// Rank table over the two priority dimensions:
    ///
    /// | first \ second | better | not worsened | worsened |
    /// |----------------|--------|--------------|----------|
    /// | better         | 4      | 3            | 1        |
    /// | not worsened   | 2      | -1           | -1       |
    /// | worsened       | 0      | -1           | -1       |
    ///
    /// Write-leader scheduling only looks at the first priority and uses
    /// rank 3 for a usable solution.
    pub fn calc_progressive_rank<C: ClusterView, S: OperatorSink>(
        self,
        bs: &mut BalanceSolver<'_, C, S>,
    ) {
        let (first, second) = (bs.first_priority, bs.second_priority);
        bs.cur.progressive_rank = -1;
        bs.cur.calc_peers_rate(first, second);
        if bs.cur.peers_rate(first) < bs.min_rate(first) {
            // Too small on the first priority to be worth anything.
            return;
        }
        if bs.resource_ty == ResourceType::WriteLeader {
            if self.is_better_for_write_leader(bs) {
                bs.cur.progressive_rank = 3;
            }
            return;
        }
        let first_better = self.is_better(bs, first);
        let second_better = self.is_better(bs, second);
        let first_not_worsened = first_better || self.is_not_worsened(bs, first);
        let second_not_worsened = second_better || self.is_not_worsened(bs, second);
        bs.cur.progressive_rank = match (
            first_better,
            second_better,
            first_not_worsened,
            second_not_worsened,
        ) {
            (true, true, ..) => 4,
            (true, _, _, true) => 3,
            (_, true, true, _) => 2,
            (true, ..) => 1,
            (_, true, ..) => 0,
            _ => -1,
        };
    }

    pub fn is_available<C: ClusterView, S: OperatorSink>(
        self,
        bs: &BalanceSolver<'_, C, S>,
    ) -> bool {
        bs.cur.progressive_rank > 0
    }

    pub fn filter_uniform_store<C: ClusterView, S: OperatorSink>(
        self,
        bs: &BalanceSolver<'_, C, S>,
    ) -> Option<&'static str> {
        if !bs.expectation_enabled {
            return None;
        }
        // Stddev is cluster-wide, so checking the source store covers both.
        let src = bs.cur.src_store.as_ref().unwrap();
        let uniform_first = bs.is_uniform_first_priority(src);
        let uniform_second = bs.is_uniform_second_priority(src);
        if uniform_first && uniform_second {
            return Some("all");
        }
        let rank = bs.cur.progressive_rank;
        if uniform_first && (rank == 1 || rank == 3) {
            return Some(dim_to_string(bs.first_priority));
        }
        if uniform_second && rank == 2 {
            return Some(dim_to_string(bs.second_priority));
        }
        None
    }

    pub fn better_than<C: ClusterView, S: OperatorSink>(
        self,
        bs: &BalanceSolver<'_, C, S>,
        old: Option<&Solution>,
    ) -> bool {
        let old = match old {
            Some(old) => old,
            None => return true,
        };
        if bs.cur.progressive_rank >= SPLIT_PROGRESSIVE_RANK {
            return true;
        }
        if old.progressive_rank >= SPLIT_PROGRESSIVE_RANK {
            return false;
        }
        if bs.cur.progressive_rank != old.progressive_rank {
            return bs.cur.progressive_rank > old.progressive_rank;
        }
        if bs.cur.revert_region.is_none() != old.revert_region.is_none() {
            return bs.cur.revert_region.is_none();
        }
        match bs.compare_src_store(
            bs.cur.src_store.as_ref().unwrap(),
            old.src_store.as_ref().unwrap(),
        ) {
            Ordering::Less => return true,
            Ordering::Greater => return false,
            Ordering::Equal => {}
        }
        match bs.compare_dst_store(
            bs.cur.dst_store.as_ref().unwrap(),
            old.dst_store.as_ref().unwrap(),
        ) {
            Ordering::Less => return true,
            Ordering::Greater => return false,
            Ordering::Equal => {}
        }
        let cur_peer = bs.cur.main_peer_stat.as_ref().unwrap();
        let old_peer = old.main_peer_stat.as_ref().unwrap();
        if !Arc::ptr_eq(cur_peer, old_peer) {
            let (first, second) = (bs.first_priority, bs.second_priority);
            if bs.resource_ty == ResourceType::WriteLeader {
                return cur_peer.get_load(first) > old_peer.get_load(first);
            }
            // Converge faster first, then reduce oscillation.
            let first_cmp = rank_cmp(
                bs.cur.peers_rate(first),
                old.peers_rate(first),
                0.0,
                DIM_TO_STEP[first],
            );
            let second_cmp = rank_cmp(
                bs.cur.peers_rate(second),
                old.peers_rate(second),
                0.0,
                DIM_TO_STEP[second],
            );
            return match bs.cur.progressive_rank {
                4 | 3 => {
                    if first_cmp != Ordering::Equal {
                        first_cmp == Ordering::Greater
                    } else {
                        second_cmp == Ordering::Greater
                    }
                }
                2 => {
                    if second_cmp != Ordering::Equal {
                        second_cmp == Ordering::Greater
                    } else {
                        first_cmp == Ordering::Greater
                    }
                }
                1 => first_cmp == Ordering::Greater,
                _ => second_cmp == Ordering::Greater,
            };
        }
        false
    }

    pub fn rank_to_dim_string<C: ClusterView, S: OperatorSink>(
        self,
        bs: &BalanceSolver<'_, C, S>,
    ) -> &'static str {
        match bs.cur.progressive_rank {
            4 => "all",
            3 => dim_to_string(bs.first_priority),
            2 => dim_to_string(bs.second_priority),
            1 => match bs.first_priority {
                crate::types::BYTE_DIM => "byte-only",
                crate::types::KEY_DIM => "key-only",
                crate::types::QUERY_DIM => "query-only",
                _ => "unknown",
            },
            _ => "unknown",
        }
    }

    pub fn check_by_priority_and_tolerance<C: ClusterView, S: OperatorSink>(
        self,
        bs: &BalanceSolver<'_, C, S>,
        f: &dyn Fn(usize) -> bool,
    ) -> bool {
        if bs.resource_ty == ResourceType::WriteLeader {
            check_first_only(bs, f)
        } else if bs.strict_picking_store {
            check_all_of(bs, f)
        } else {
            check_first_only(bs, f)
        }
    }

    fn is_better_for_write_leader<C: ClusterView, S: OperatorSink>(
        self,
        bs: &BalanceSolver<'_, C, S>,
    ) -> bool {
        let first = bs.first_priority;
        let (src_rate, dst_rate) = bs.cur.get_extreme_load(first);
        let peers_rate = bs.cur.peers_rate(first);
        src_rate - peers_rate >= dst_rate + peers_rate && bs.is_tolerance(first, false)
    }

    fn is_better<C: ClusterView, S: OperatorSink>(
        self,
        bs: &BalanceSolver<'_, C, S>,
        dim: usize,
    ) -> bool {
        let (is_hot, dec_ratio) = self.hot_dec_ratio(bs, dim);
        is_hot && dec_ratio <= bs.great_dec_ratio && bs.is_tolerance(dim, false)
    }

    // Always true when `is_better` is true.
    fn is_not_worsened<C: ClusterView, S: OperatorSink>(
        self,
        bs: &BalanceSolver<'_, C, S>,
        dim: usize,
    ) -> bool {
        let (is_hot, dec_ratio) = self.hot_dec_ratio(bs, dim);
        !is_hot || dec_ratio <= bs.minor_dec_ratio
    }

    /// The decline ratio expects the destination rate to stay below the
    /// source rate after moving the peers. Negative peer rates mean the
    /// revert region moves more than the main region and the direction
    /// flips.
    fn hot_dec_ratio<C: ClusterView, S: OperatorSink>(
        self,
        bs: &BalanceSolver<'_, C, S>,
        dim: usize,
    ) -> (bool, f64) {
        let (src_rate, dst_rate) = bs.cur.get_extreme_load(dim);
        let peers_rate = bs.cur.peers_rate(dim);
        if peers_rate >= 0.0 {
            let is_hot = peers_rate >= bs.min_rate(dim);
            let dec_ratio = (dst_rate + peers_rate) / (src_rate - peers_rate).max(1.0);
            (is_hot, dec_ratio)
        } else {
            let is_hot = -peers_rate >= bs.min_rate(dim);
            let dec_ratio = (src_rate - peers_rate) / (dst_rate + peers_rate).max(1.0);
            (is_hot, dec_ratio)
        }
    }
}
