// Copyright 2025 TiKV Project Authors. Licensed under Apache-2.0.

//! Rank formula v2.
//!
//! Each priority dimension is scored by where the source/destination pair
//! sits on a three-state scale: balanced, pre-balanced or unbalanced. A
//! move scores positive only when it perceivably narrows the gap without
//! flipping the pair, and a pair that is already balanced punishes any
//! meaningful movement. On top of that, v2 can arm a revert search: when a
//! tick ends with no usable solution or one that worsens the second
//! priority, the next tick additionally looks for a counter-move from the
//! destination back to the source to hedge the damage.

use std::cmp::Ordering;
use std::sync::Arc;

use super::{check_all_of, check_any_of, check_first_only, rank_cmp, DIM_TO_STEP,
    SPLIT_PROGRESSIVE_RANK};
use crate::cluster::ClusterView;
use crate::metrics::ALLOW_SEARCH_REVERT_REGIONS_COUNTER;
use crate::operator::OperatorSink;
use crate::solver::{BalanceSolver, Solution};
use crate::types::{dim_to_string, ResourceType};

const FIRST_PRIORITY_PERCEIVED_RATIO: f64 = 0.2;
const FIRST_PRIORITY_MIN_HOT_RATIO: f64 = 0.02;
const SECOND_PRIORITY_PERCEIVED_RATIO: f64 = 0.3;
const SECOND_PRIORITY_MIN_HOT_RATIO: f64 = 0.03;

/// The state boundaries of one priority dimension.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RankRatios {
    balanced_ratio: f64,
    pre_balanced_ratio: f64,
    balanced_check_ratio: f64,
    pre_balanced_check_ratio: f64,
    perceived_ratio: f64,
    min_hot_ratio: f64,
}

impl RankRatios {
    fn new(balanced_ratio: f64, perceived_ratio: f64, min_hot_ratio: f64) -> RankRatios {
        let balanced_ratio = balanced_ratio.clamp(0.7, 0.95);
        // The pre-balanced band opens twice as wide as the balanced band,
        // capped so it cannot swallow the whole range.
        let pre_balanced_ratio = (2.0 * balanced_ratio - 1.0).max(balanced_ratio - 0.1);
        RankRatios {
            balanced_ratio,
            pre_balanced_ratio,
            balanced_check_ratio: balanced_ratio - 0.02,
            pre_balanced_check_ratio: pre_balanced_ratio - 0.03,
            perceived_ratio,
            min_hot_ratio,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct RankV2 {
    first_ratios: RankRatios,
    second_ratios: RankRatios,
}

impl RankV2 {
    pub fn new(great_dec_ratio: f64) -> RankV2 {
        let first_ratios = RankRatios::new(
            great_dec_ratio,
            FIRST_PRIORITY_PERCEIVED_RATIO,
            FIRST_PRIORITY_MIN_HOT_RATIO,
        );
        // The second priority is less demanding: its balanced band starts
        // where the first priority's pre-balanced band starts.
        let second_ratios = RankRatios::new(
            first_ratios.pre_balanced_ratio,
            SECOND_PRIORITY_PERCEIVED_RATIO,
            SECOND_PRIORITY_MIN_HOT_RATIO,
        );
        RankV2 {
            first_ratios,
            second_ratios,
        }
    }

    /// Rank table over the two per-dimension scores:
    ///
    /// | first \ second | > 0 | == 0 | < 0 |
    /// |----------------|-----|------|-----|
    /// | > 0            | 4   | 3    | 2   |
    /// | == 0           | 1   | -1   | -1  |
    /// | < 0            | 0   | -1   | -1  |
    pub fn calc_progressive_rank<C: ClusterView, S: OperatorSink>(
        self,
        bs: &mut BalanceSolver<'_, C, S>,
    ) {
        let (first, second) = (bs.first_priority, bs.second_priority);
        bs.cur.progressive_rank = -1;
        bs.cur.first_score = 0;
        bs.cur.second_score = 0;
        bs.cur.calc_peers_rate(first, second);
        if bs.cur.peers_rate(first) < bs.min_rate(first) {
            // Too small on the first priority to be worth anything.
            return;
        }
        if bs.resource_ty == ResourceType::WriteLeader {
            // Write leader only balances the first priority.
            bs.cur.first_score = self.score_dim(bs, first, &self.first_ratios);
            if bs.cur.first_score > 0 {
                bs.cur.progressive_rank = 3;
            }
            return;
        }
        let first_score = self.score_dim(bs, first, &self.first_ratios);
        let second_score = self.score_dim(bs, second, &self.second_ratios);
        bs.cur.first_score = first_score;
        bs.cur.second_score = second_score;
        bs.cur.progressive_rank = match (first_score, second_score) {
            (f, s) if f > 0 && s > 0 => 4,
            (f, s) if f > 0 && s == 0 => 3,
            (f, _) if f > 0 => 2,
            (f, s) if f == 0 && s > 0 => 1,
            (_, s) if s > 0 => 0,
            _ => -1,
        };
    }

    /// A plain solution is usable as soon as it improves the first
    /// priority; a revert solution additionally must not worsen the second
    /// priority (rank 3 or better), otherwise the hedge would just move the
    /// problem around.
    pub fn is_available<C: ClusterView, S: OperatorSink>(
        self,
        bs: &BalanceSolver<'_, C, S>,
    ) -> bool {
        let rank = bs.cur.progressive_rank;
        rank == SPLIT_PROGRESSIVE_RANK
            || rank >= 3
            || (rank > 0 && bs.cur.revert_region.is_none())
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
        if uniform_first && (rank == 2 || rank == 3) {
            return Some(dim_to_string(bs.first_priority));
        }
        if uniform_second && rank == 1 {
            return Some(dim_to_string(bs.second_priority));
        }
        None
    }

    pub fn need_search_revert_regions<C: ClusterView, S: OperatorSink>(
        self,
        bs: &BalanceSolver<'_, C, S>,
    ) -> bool {
        bs.search_revert_regions
    }

    /// Arms the revert search for the next tick when this tick found
    /// nothing usable, settled for a second-priority regression, or already
    /// needed a hedge.
    pub fn set_search_revert_regions<C: ClusterView, S: OperatorSink>(
        self,
        bs: &mut BalanceSolver<'_, C, S>,
    ) {
        let search = !bs.strict_picking_store
            && match bs.best.as_ref() {
                None => true,
                Some(best) => best.progressive_rank == 2 || best.revert_region.is_some(),
            };
        if search {
            ALLOW_SEARCH_REVERT_REGIONS_COUNTER.inc();
        }
        bs.search_revert_regions = search;
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
        if bs.cur.progressive_rank == SPLIT_PROGRESSIVE_RANK {
            return true;
        }
        if old.progressive_rank == SPLIT_PROGRESSIVE_RANK {
            // Split operators behave like live migration, keep them.
            return false;
        }
        if bs.cur.progressive_rank != old.progressive_rank {
            return bs.cur.progressive_rank > old.progressive_rank;
        }
        if bs.cur.revert_region.is_none() != old.revert_region.is_none() {
            // Fewer revert regions are better.
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
            if bs.cur.first_score != old.first_score {
                return bs.cur.first_score > old.first_score;
            }
            if bs.cur.second_score != old.second_score {
                return bs.cur.second_score > old.second_score;
            }
            // Equal scores: the bigger mover converges faster.
            let first_cmp = rank_cmp(
                bs.cur.peers_rate(first),
                old.peers_rate(first),
                0.0,
                DIM_TO_STEP[first],
            );
            if first_cmp != Ordering::Equal {
                return first_cmp == Ordering::Greater;
            }
            return rank_cmp(
                bs.cur.peers_rate(second),
                old.peers_rate(second),
                0.0,
                DIM_TO_STEP[second],
            ) == Ordering::Greater;
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
            2 => match bs.first_priority {
                crate::types::BYTE_DIM => "byte-only",
                crate::types::KEY_DIM => "key-only",
                crate::types::QUERY_DIM => "query-only",
                _ => "unknown",
            },
            1 => dim_to_string(bs.second_priority),
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
            check_any_of(bs, f)
        }
    }

    /// Scores the effect of the candidate on one dimension.
    ///
    /// `2` reaches the balanced window, `1` perceivably narrows the gap,
    /// `0` is harmless noise, `-1` widens the gap, `-2` flips the pair or
    /// breaks an existing balance.
    fn score_dim<C: ClusterView, S: OperatorSink>(
        self,
        bs: &BalanceSolver<'_, C, S>,
        dim: usize,
        rs: &RankRatios,
    ) -> i32 {
        let mut src_id = bs.cur.src_store.as_ref().unwrap().id();
        let mut dst_id = bs.cur.dst_store.as_ref().unwrap().id();
        let mut peers_rate = bs.cur.peers_rate(dim);
        let (mut high_rate, mut low_rate) = bs.cur.get_extreme_load(dim);
        let mut reverse = false;
        if high_rate < low_rate {
            std::mem::swap(&mut high_rate, &mut low_rate);
            std::mem::swap(&mut src_id, &mut dst_id);
            peers_rate = -peers_rate;
            reverse = true;
        }

        if high_rate * rs.balanced_check_ratio <= low_rate {
            // Already balanced. Anything that moves a meaningful rate can
            // only break the state; small peers are noise.
            if peers_rate.abs() >= high_rate * rs.min_hot_ratio {
                return -2;
            }
            return 0;
        }

        // The window of peer rates that lands the pair inside the balanced
        // band without flipping it.
        let min_balanced = (high_rate * rs.balanced_ratio - low_rate) / (1.0 + rs.balanced_ratio);
        let max_balanced = (high_rate - low_rate * rs.balanced_ratio) / (1.0 + rs.balanced_ratio);

        let (min_better, max_better, min_not_worsened);
        if high_rate * rs.pre_balanced_check_ratio <= low_rate {
            // Pre-balanced: only reaching the balanced window is progress;
            // staying inside the pre-balanced band is harmless.
            min_better = min_balanced;
            max_better = max_balanced;
            min_not_worsened = ((high_rate * rs.pre_balanced_ratio - low_rate)
                / (1.0 + rs.pre_balanced_ratio))
                .min(0.0);
        } else {
            // Unbalanced: any perceivable reduction of the gap is progress.
            min_better = ((high_rate - low_rate) * rs.perceived_ratio).min(min_balanced);
            max_better = max_balanced;
            min_not_worsened = 0.0;
        }

        let mut min_hot_rate = high_rate * rs.min_hot_ratio;
        if let Some(nth_rate) = bs.nth_hot_peer_load(src_id, dim) {
            // With a deep hot peer list, anything below the n-th hottest
            // peer is churn rather than progress.
            min_hot_rate = min_hot_rate.max(nth_rate);
        }

        if peers_rate >= min_better && peers_rate <= max_better {
            if peers_rate >= min_hot_rate && bs.is_tolerance(dim, reverse) {
                if peers_rate >= min_balanced {
                    return 2;
                }
                return 1;
            }
            return 0;
        }
        if peers_rate > max_better {
            // Overshooting flips the pair.
            return -2;
        }
        if peers_rate >= min_not_worsened {
            return 0;
        }
        -1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HotRegionSchedulerConfig;
    use crate::test_util::{empty_region, hot_peer, load_detail, new_test_solver, TestCluster,
        TestSink};
    use crate::types::{OpType, RWType, BYTE_DIM, KEY_DIM};

    // Runs the v2 rank over one write-peer candidate, optionally with a
    // revert peer hedging from the destination. Loads and rates are
    // (byte, key) pairs; the first priority is byte.
    fn rank_and_scores(
        src: (f64, f64),
        dst: (f64, f64),
        main: (f64, f64),
        revert: Option<(f64, f64)>,
    ) -> (i64, i32, i32) {
        let cluster = TestCluster;
        let sink = TestSink;
        let cfg = HotRegionSchedulerConfig::default();
        let mut bs = new_test_solver(&cluster, &sink, &cfg, RWType::Write, OpType::MovePeer);
        bs.cur.src_store = Some(load_detail(1, src.0, src.1));
        bs.cur.dst_store = Some(load_detail(2, dst.0, dst.1));
        bs.cur.main_peer_stat = Some(hot_peer(7, 1, main.0, main.1));
        if let Some((byte, key)) = revert {
            bs.cur.revert_peer_stat = Some(hot_peer(8, 2, byte, key));
            bs.cur.revert_region = Some(empty_region(8));
        }
        let rank = RankV2::new(cfg.great_dec_ratio);
        rank.calc_progressive_rank(&mut bs);
        (bs.cur.progressive_rank, bs.cur.first_score, bs.cur.second_score)
    }

    #[test]
    fn test_progressive_rank_table() {
        let src = (10_000.0, 10_000.0);
        let dst = (1_000.0, 1_000.0);
        // Both dimensions perceivably narrow the gap.
        assert_eq!(rank_and_scores(src, dst, (4_000.0, 4_000.0), None), (4, 1, 1));
        // Landing inside the balanced window scores higher on both.
        assert_eq!(rank_and_scores(src, dst, (4_500.0, 4_500.0), None), (4, 2, 2));
        // First better, second too small to matter.
        assert_eq!(rank_and_scores(src, dst, (4_000.0, 100.0), None), (3, 1, 0));
        // First better, second overshoots and flips its pair.
        assert_eq!(rank_and_scores(src, dst, (4_000.0, 6_000.0), None), (2, 1, -2));
        // First harmless, second better.
        assert_eq!(rank_and_scores(src, dst, (500.0, 4_000.0), None), (1, 0, 1));
        // First flips its pair, second better: optimizable but not usable.
        assert_eq!(
            rank_and_scores(src, dst, (6_000.0, 4_000.0), None),
            (0, -2, 1)
        );
        // Both overshoot.
        assert_eq!(
            rank_and_scores(src, dst, (6_000.0, 6_000.0), None),
            (-1, -2, -2)
        );
    }

    #[test]
    fn test_revert_below_floor_prunes() {
        // The revert peer pulls the first-priority rate negative, under the
        // min-hot-byte-rate floor; the pair is dropped before scoring.
        assert_eq!(
            rank_and_scores(
                (10_000.0, 10_000.0),
                (1_000.0, 1_000.0),
                (500.0, 4_000.0),
                Some((2_000.0, 0.0))
            ),
            (-1, 0, 0)
        );
    }

    #[test]
    fn test_first_priority_floor_prunes() {
        // 50 bytes/s is below the min-hot-byte-rate floor of 100; the
        // candidate is dropped before any dimension is scored.
        assert_eq!(
            rank_and_scores((10_000.0, 10_000.0), (1_000.0, 1_000.0), (50.0, 4_000.0), None),
            (-1, 0, 0)
        );
    }

    #[test]
    fn test_write_leader_first_priority_only() {
        let cluster = TestCluster;
        let sink = TestSink;
        let cfg = HotRegionSchedulerConfig::default();
        // Write leader balances on the key dimension first.
        let mut bs =
            new_test_solver(&cluster, &sink, &cfg, RWType::Write, OpType::TransferLeader);
        bs.cur.src_store = Some(load_detail(1, 0.0, 1_000.0));
        bs.cur.dst_store = Some(load_detail(2, 0.0, 100.0));
        bs.cur.main_peer_stat = Some(hot_peer(7, 1, 0.0, 200.0));
        let rank = RankV2::new(cfg.great_dec_ratio);
        rank.calc_progressive_rank(&mut bs);
        assert_eq!(bs.cur.progressive_rank, 3);
        assert_eq!(bs.cur.first_score, 1);

        // Overshooting the pair stays unusable.
        bs.cur.main_peer_stat = Some(hot_peer(7, 1, 0.0, 600.0));
        rank.calc_progressive_rank(&mut bs);
        assert_eq!(bs.cur.progressive_rank, -1);
    }

    #[test]
    fn test_is_available() {
        let cluster = TestCluster;
        let sink = TestSink;
        let cfg = HotRegionSchedulerConfig::default();
        let rank = RankV2::new(cfg.great_dec_ratio);
        let mut bs = new_test_solver(&cluster, &sink, &cfg, RWType::Write, OpType::MovePeer);
        // Without a revert region any positive rank is usable.
        for (value, available) in [(5, true), (4, true), (3, true), (2, true), (1, true),
            (0, false), (-1, false)]
        {
            bs.cur.progressive_rank = value;
            assert_eq!(rank.is_available(&bs), available, "rank {}", value);
        }
        // With a revert region the second priority must not be worsened,
        // which only rank 3 and rank 4 guarantee.
        bs.cur.revert_region = Some(empty_region(8));
        for (value, available) in [(5, true), (4, true), (3, true), (2, false), (1, false),
            (0, false), (-1, false)]
        {
            bs.cur.progressive_rank = value;
            assert_eq!(rank.is_available(&bs), available, "revert rank {}", value);
        }
    }

    #[test]
    fn test_score_dim_balanced_state() {
        let cluster = TestCluster;
        let sink = TestSink;
        let cfg = HotRegionSchedulerConfig::default();
        let rank = RankV2::new(cfg.great_dec_ratio);
        let mut bs = new_test_solver(&cluster, &sink, &cfg, RWType::Write, OpType::MovePeer);
        // 1000 vs 980 is inside the balanced band on byte.
        bs.cur.src_store = Some(load_detail(1, 1_000.0, 0.0));
        bs.cur.dst_store = Some(load_detail(2, 980.0, 0.0));
        // A meaningful mover breaks the balance.
        bs.cur.main_peer_stat = Some(hot_peer(7, 1, 300.0, 0.0));
        bs.cur.calc_peers_rate(BYTE_DIM, KEY_DIM);
        assert_eq!(rank.score_dim(&bs, BYTE_DIM, &rank.first_ratios), -2);
        // A tiny mover is noise.
        bs.cur.main_peer_stat = Some(hot_peer(7, 1, 10.0, 0.0));
        bs.cur.calc_peers_rate(BYTE_DIM, KEY_DIM);
        assert_eq!(rank.score_dim(&bs, BYTE_DIM, &rank.first_ratios), 0);
    }
}
