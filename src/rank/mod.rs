// Copyright 2025 TiKV Project Authors. Licensed under Apache-2.0.

//! Ranking formulas for candidate solutions.
//!
//! Two formulas are selectable per configuration. Both produce a progressive
//! rank (bigger is better, `SPLIT_PROGRESSIVE_RANK` dominates everything)
//! and share the store comparators of the solver; they differ in how a
//! single candidate's per-dimension effect is judged.

mod v1;
mod v2;

pub(crate) use self::v1::RankV1;
pub(crate) use self::v2::RankV2;

use std::cmp::Ordering;

use crate::cluster::ClusterView;
use crate::operator::OperatorSink;
use crate::solver::BalanceSolver;
use crate::types::DIM_LEN;

/// Rank assigned to solutions that produced a split operator. Splits always
/// win: a region too hot or too big to move has no better alternative.
pub(crate) const SPLIT_PROGRESSIVE_RANK: i64 = 5;

/// Step widths used when comparing peer rates between two solutions.
pub(crate) const DIM_TO_STEP: [f64; DIM_LEN] = [100.0, 10.0, 10.0];

/// Discretizes `rate` into a step index relative to `rk0`.
pub(crate) fn step_rank(rk0: f64, step: f64, rate: f64) -> i64 {
    if step <= 0.0 {
        return 0;
    }
    ((rate - rk0) / step) as i64
}

/// Compares two rates after step discretization.
pub(crate) fn rank_cmp(a: f64, b: f64, rk0: f64, step: f64) -> Ordering {
    step_rank(rk0, step, a).cmp(&step_rank(rk0, step, b))
}

/// The formula selected for one solver pass.
#[derive(Clone, Copy, Debug)]
pub(crate) enum RankFormula {
    V1(RankV1),
    V2(RankV2),
}

impl RankFormula {
    pub fn calc_progressive_rank<C: ClusterView, S: OperatorSink>(
        self,
        bs: &mut BalanceSolver<'_, C, S>,
    ) {
        match self {
            RankFormula::V1(r) => r.calc_progressive_rank(bs),
            RankFormula::V2(r) => r.calc_progressive_rank(bs),
        }
    }

    pub fn is_available<C: ClusterView, S: OperatorSink>(
        self,
        bs: &BalanceSolver<'_, C, S>,
    ) -> bool {
        match self {
            RankFormula::V1(r) => r.is_available(bs),
            RankFormula::V2(r) => r.is_available(bs),
        }
    }

    /// Some(label) when the candidate should be skipped because the loads
    /// involved are already uniform across stores.
    pub fn filter_uniform_store<C: ClusterView, S: OperatorSink>(
        self,
        bs: &BalanceSolver<'_, C, S>,
    ) -> Option<&'static str> {
        match self {
            RankFormula::V1(r) => r.filter_uniform_store(bs),
            RankFormula::V2(r) => r.filter_uniform_store(bs),
        }
    }

    pub fn need_search_revert_regions<C: ClusterView, S: OperatorSink>(
        self,
        bs: &BalanceSolver<'_, C, S>,
    ) -> bool {
        match self {
            RankFormula::V1(_) => false,
            RankFormula::V2(r) => r.need_search_revert_regions(bs),
        }
    }

    pub fn set_search_revert_regions<C: ClusterView, S: OperatorSink>(
        self,
        bs: &mut BalanceSolver<'_, C, S>,
    ) {
        match self {
            RankFormula::V1(_) => {}
            RankFormula::V2(r) => r.set_search_revert_regions(bs),
        }
    }

    /// Whether the current solution beats the given one.
    pub fn better_than<C: ClusterView, S: OperatorSink>(
        self,
        bs: &BalanceSolver<'_, C, S>,
        old: Option<&crate::solver::Solution>,
    ) -> bool {
        match self {
            RankFormula::V1(r) => r.better_than(bs, old),
            RankFormula::V2(r) => r.better_than(bs, old),
        }
    }

    /// Which dimension the emitted operator improves, for metric labels.
    pub fn rank_to_dim_string<C: ClusterView, S: OperatorSink>(
        self,
        bs: &BalanceSolver<'_, C, S>,
    ) -> &'static str {
        match self {
            RankFormula::V1(r) => r.rank_to_dim_string(bs),
            RankFormula::V2(r) => r.rank_to_dim_string(bs),
        }
    }

    /// Quantifier over the selected priority dimensions used by the
    /// tolerance gates.
    pub fn check_by_priority_and_tolerance<C: ClusterView, S: OperatorSink>(
        self,
        bs: &BalanceSolver<'_, C, S>,
        f: &dyn Fn(usize) -> bool,
    ) -> bool {
        match self {
            RankFormula::V1(r) => r.check_by_priority_and_tolerance(bs, f),
            RankFormula::V2(r) => r.check_by_priority_and_tolerance(bs, f),
        }
    }

    pub fn check_history_loads_by_priority<C: ClusterView, S: OperatorSink>(
        self,
        bs: &BalanceSolver<'_, C, S>,
        f: &dyn Fn(usize) -> bool,
    ) -> bool {
        // Both formulas quantify history the same way they quantify the
        // instantaneous gates.
        self.check_by_priority_and_tolerance(bs, f)
    }
}

/// Quantifier helpers shared by the two formulas.
pub(crate) fn check_all_of<C: ClusterView, S: OperatorSink>(
    bs: &BalanceSolver<'_, C, S>,
    f: &dyn Fn(usize) -> bool,
) -> bool {
    (0..DIM_LEN).all(|dim| !bs.is_selected_dim(dim) || f(dim))
}

pub(crate) fn check_any_of<C: ClusterView, S: OperatorSink>(
    bs: &BalanceSolver<'_, C, S>,
    f: &dyn Fn(usize) -> bool,
) -> bool {
    (0..DIM_LEN).any(|dim| bs.is_selected_dim(dim) && f(dim))
}

pub(crate) fn check_first_only<C: ClusterView, S: OperatorSink>(
    bs: &BalanceSolver<'_, C, S>,
    f: &dyn Fn(usize) -> bool,
) -> bool {
    f(bs.first_priority)
}
