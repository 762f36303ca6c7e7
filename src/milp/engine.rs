//! MILP solving API and reference engine.
//!
//! `MilpEngine` is the seam to external MILP solvers (Cbc, Scip, HiGHS
//! bindings lower the row/column artifact to their native model and
//! run their own branch-and-bound). `RefMilpEngine` is the in-crate
//! reference: depth-first search over the binary columns with
//! incremental row-activity pruning and incumbent pruning on the
//! objective. Integer columns are resolved at the leaves from their
//! implied bounds, which is exact here because every row couples at
//! most one integer column.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::{LinCon, LinearProgram, MilpAssignment, Sense, VarKind};
use crate::engine::SolveParams;
use crate::models::SearchStrategy;

/// Outcome of one MILP solve.
#[derive(Debug, Clone)]
pub enum MilpResult {
    /// Best assignment, proven optimal (or any assignment when the
    /// program has no objective).
    Optimal(MilpAssignment),
    /// Deadline expired with a feasible incumbent in hand.
    Feasible(MilpAssignment),
    Infeasible,
    /// Deadline expired before any feasible assignment was found.
    Unknown,
}

/// Solving API for MILP engines.
pub trait MilpEngine {
    fn solve(&self, lp: &LinearProgram, params: &SolveParams) -> MilpResult;
}

/// Reference branch-and-bound engine.
#[derive(Debug, Default)]
pub struct RefMilpEngine;

impl RefMilpEngine {
    pub fn new() -> Self {
        Self
    }
}

impl MilpEngine for RefMilpEngine {
    fn solve(&self, lp: &LinearProgram, params: &SolveParams) -> MilpResult {
        let mut search = Bnb::new(lp, params);
        let timed_out = search.run(0);
        match (search.best.take(), timed_out) {
            (Some(best), false) => MilpResult::Optimal(best),
            (Some(best), true) => {
                if lp.objective.is_some() {
                    MilpResult::Feasible(best)
                } else {
                    // Feasibility-only: an incumbent answers the question.
                    MilpResult::Optimal(best)
                }
            }
            (None, false) => MilpResult::Infeasible,
            (None, true) => MilpResult::Unknown,
        }
    }
}

/// Live activity of one row under a partial assignment.
struct Activity {
    /// Contribution of assigned columns.
    fixed: i64,
    /// Largest possible contribution of unassigned columns.
    slack_hi: i64,
    /// Smallest possible contribution of unassigned columns.
    slack_lo: i64,
}

impl Activity {
    fn violated(&self, row: &LinCon) -> bool {
        let lo = self.fixed + self.slack_lo;
        let hi = self.fixed + self.slack_hi;
        match row.sense {
            Sense::Le => lo > row.rhs,
            Sense::Ge => hi < row.rhs,
            Sense::Eq => lo > row.rhs || hi < row.rhs,
        }
    }
}

struct Bnb<'a> {
    lp: &'a LinearProgram,
    params: SolveParams,
    rng: StdRng,
    /// Branch order over binary columns only.
    binaries: Vec<usize>,
    integers: Vec<usize>,
    /// `(row, coef)` occurrences per column.
    occurs: Vec<Vec<(usize, i64)>>,
    activity: Vec<Activity>,
    assign: Vec<Option<i64>>,
    best: Option<MilpAssignment>,
    best_obj: Option<i64>,
    timed_out: bool,
}

impl<'a> Bnb<'a> {
    fn new(lp: &'a LinearProgram, params: &SolveParams) -> Self {
        let mut occurs = vec![Vec::new(); lp.cols.len()];
        let mut activity = Vec::with_capacity(lp.rows.len());
        for (r, row) in lp.rows.iter().enumerate() {
            let mut slack_lo = 0i64;
            let mut slack_hi = 0i64;
            for &(c, coef) in &row.terms {
                occurs[c].push((r, coef));
                let (lo, hi) = match lp.cols[c].kind {
                    VarKind::Binary => (0, 1),
                    VarKind::Integer { lo, hi } => (lo, hi),
                };
                slack_lo += (coef * lo).min(coef * hi);
                slack_hi += (coef * lo).max(coef * hi);
            }
            activity.push(Activity {
                fixed: 0,
                slack_lo,
                slack_hi,
            });
        }
        let binaries: Vec<usize> = (0..lp.cols.len())
            .filter(|&c| lp.cols[c].kind == VarKind::Binary)
            .collect();
        let integers: Vec<usize> = (0..lp.cols.len())
            .filter(|&c| lp.cols[c].kind != VarKind::Binary)
            .collect();
        Self {
            lp,
            params: *params,
            rng: StdRng::seed_from_u64(params.seed),
            binaries,
            integers,
            occurs,
            activity,
            assign: vec![None; lp.cols.len()],
            best: None,
            best_obj: None,
            timed_out: false,
        }
    }

    /// Returns true if the deadline interrupted the search.
    fn run(&mut self, depth: usize) -> bool {
        if self.params.deadline.expired() {
            self.timed_out = true;
            return true;
        }
        if self.lp.objective.is_none() && self.best.is_some() {
            // Feasibility-only: the first incumbent settles it.
            return false;
        }
        if self.pruned_by_incumbent() {
            return false;
        }
        if depth == self.binaries.len() {
            self.close_leaf();
            return false;
        }
        let col = self.binaries[depth];
        let mut values = [1i64, 0];
        if self.params.strategy == SearchStrategy::Random {
            values.shuffle(&mut self.rng);
        }
        for value in values {
            if self.set(col, value) {
                if self.run(depth + 1) {
                    self.unset(col, value);
                    return true;
                }
            }
            self.unset(col, value);
        }
        false
    }

    /// Assigns a column and updates row activities. Returns false when
    /// some touched row becomes unsatisfiable.
    fn set(&mut self, col: usize, value: i64) -> bool {
        self.assign[col] = Some(value);
        let (lo, hi) = self.col_bounds(col);
        let mut ok = true;
        for &(r, coef) in &self.occurs[col] {
            let a = &mut self.activity[r];
            a.fixed += coef * value;
            a.slack_lo -= (coef * lo).min(coef * hi);
            a.slack_hi -= (coef * lo).max(coef * hi);
            if a.violated(&self.lp.rows[r]) {
                ok = false;
            }
        }
        ok
    }

    fn unset(&mut self, col: usize, value: i64) {
        self.assign[col] = None;
        let (lo, hi) = self.col_bounds(col);
        for &(r, coef) in &self.occurs[col] {
            let a = &mut self.activity[r];
            a.fixed -= coef * value;
            a.slack_lo += (coef * lo).min(coef * hi);
            a.slack_hi += (coef * lo).max(coef * hi);
        }
    }

    fn col_bounds(&self, col: usize) -> (i64, i64) {
        match self.lp.cols[col].kind {
            VarKind::Binary => (0, 1),
            VarKind::Integer { lo, hi } => (lo, hi),
        }
    }

    /// Objective lower bound of the current subtree vs. the incumbent.
    fn pruned_by_incumbent(&self) -> bool {
        let (Some(objective), Some(best)) = (&self.lp.objective, self.best_obj) else {
            return false;
        };
        let bound: i64 = objective
            .iter()
            .map(|&(c, coef)| match self.assign[c] {
                Some(v) => coef * v,
                None => {
                    let (lo, hi) = self.col_bounds(c);
                    (coef * lo).min(coef * hi)
                }
            })
            .sum();
        bound >= best
    }

    /// All binaries assigned: fix each integer column to the smallest
    /// value its rows still admit, then record the incumbent.
    fn close_leaf(&mut self) {
        let integers = self.integers.clone();
        let mut chosen = Vec::with_capacity(integers.len());
        for &col in &integers {
            let Some(value) = self.implied_minimum(col) else {
                for &(c, v) in &chosen {
                    self.unset(c, v);
                }
                return;
            };
            if !self.set(col, value) {
                self.unset(col, value);
                for &(c, v) in &chosen {
                    self.unset(c, v);
                }
                return;
            }
            chosen.push((col, value));
        }
        let assignment: MilpAssignment = self
            .assign
            .iter()
            .map(|v| v.expect("leaf assignment is total"))
            .collect();
        let obj = self.lp.objective.as_ref().map(|terms| {
            terms
                .iter()
                .map(|&(c, coef)| coef * assignment[c])
                .sum::<i64>()
        });
        let improved = match (obj, self.best_obj) {
            (Some(o), Some(b)) => o < b,
            (Some(_), None) | (None, None) => self.best.is_none(),
            (None, Some(_)) => false,
        };
        if improved {
            self.best_obj = obj;
            self.best = Some(assignment);
        }
        for &(c, v) in chosen.iter().rev() {
            self.unset(c, v);
        }
    }

    /// Smallest domain value of `col` satisfying every row it appears
    /// in, all other columns of those rows being assigned.
    fn implied_minimum(&self, col: usize) -> Option<i64> {
        let (mut lo, mut hi) = self.col_bounds(col);
        for &(r, coef) in &self.occurs[col] {
            let row = &self.lp.rows[r];
            let rest: i64 = row
                .terms
                .iter()
                .filter(|&&(c, _)| c != col)
                .map(|&(c, cf)| cf * self.assign[c].unwrap_or(0))
                .sum();
            let rem = row.rhs - rest;
            // coef * v (sense) rem
            match (row.sense, coef > 0) {
                (Sense::Le, true) => hi = hi.min(rem.div_euclid(coef)),
                (Sense::Le, false) => lo = lo.max(neg_ceil(rem, coef)),
                (Sense::Ge, true) => lo = lo.max(pos_ceil(rem, coef)),
                (Sense::Ge, false) => hi = hi.min(rem.div_euclid(coef)),
                (Sense::Eq, _) => {
                    if rem % coef != 0 {
                        return None;
                    }
                    let v = rem / coef;
                    lo = lo.max(v);
                    hi = hi.min(v);
                }
            }
        }
        (lo <= hi).then_some(lo)
    }
}

/// Ceiling of `rem / coef` for positive `coef`.
fn pos_ceil(rem: i64, coef: i64) -> i64 {
    debug_assert!(coef > 0);
    (rem + coef - 1).div_euclid(coef)
}

/// Lower bound from `coef * v <= rem` with negative `coef`.
fn neg_ceil(rem: i64, coef: i64) -> i64 {
    debug_assert!(coef < 0);
    // v >= rem / coef, rounded up.
    let q = rem.div_euclid(coef);
    if rem.rem_euclid(coef) != 0 {
        q + 1
    } else {
        q
    }
}
