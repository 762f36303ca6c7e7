//! CP solving API and reference engine.
//!
//! `CpEngine` is the seam to external CP engines (Chuffed, Gecode,
//! OR-Tools bindings implement it by lowering the artifact to their
//! native model). `RefCpEngine` is the in-crate reference: a complete
//! chronological backtracking search over the slot grid, followed by a
//! branch-and-bound orientation pass when minimizing. Not competitive
//! with a real CP engine, but exact and deterministic.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

use super::{CpAssignment, CpConstraint, CpModel};
use crate::engine::SolveParams;
use crate::models::{RunStatus, SearchStrategy};

/// Outcome of a CP solve over the artifact's variable scheme.
#[derive(Debug, Clone)]
pub struct CpOutcome {
    pub status: RunStatus,
    pub assignment: Option<CpAssignment>,
    /// Best objective value reached, when minimizing.
    pub objective: Option<u32>,
}

impl CpOutcome {
    fn bare(status: RunStatus) -> Self {
        Self {
            status,
            assignment: None,
            objective: None,
        }
    }
}

/// Solving API for CP engines.
pub trait CpEngine {
    fn solve(&self, model: &CpModel, params: &SolveParams) -> CpOutcome;
}

/// Reference CP engine: exact DFS with strategy-driven ordering.
#[derive(Debug, Default)]
pub struct RefCpEngine;

impl RefCpEngine {
    pub fn new() -> Self {
        Self
    }
}

impl CpEngine for RefCpEngine {
    fn solve(&self, model: &CpModel, params: &SolveParams) -> CpOutcome {
        let mut search = Search::new(model, params);
        match search.find_pairing(0) {
            Found::Timeout => CpOutcome::bare(RunStatus::Unknown),
            Found::Exhausted => CpOutcome::bare(RunStatus::Unsat),
            Found::Pairing => {
                let pair_at = search.grid.clone();
                let (flip, objective, proven) = search.orient(&pair_at);
                let assignment = CpAssignment { pair_at, flip };
                if model.minimize {
                    debug!(objective, proven, "cp reference engine minimized orientation");
                    CpOutcome {
                        status: if proven { RunStatus::Optimal } else { RunStatus::Sat },
                        assignment: Some(assignment),
                        objective: Some(objective),
                    }
                } else {
                    CpOutcome {
                        status: RunStatus::Sat,
                        assignment: Some(assignment),
                        objective: None,
                    }
                }
            }
        }
    }
}

enum Found {
    Pairing,
    Exhausted,
    Timeout,
}

struct Search<'a> {
    model: &'a CpModel,
    params: SolveParams,
    rng: StdRng,
    cap: u32,
    /// `Some((w, p, pair))` anchors from symmetry breaking.
    fixed: Vec<(u32, u32, u32)>,
    /// Teams whose opponents must increase across weeks.
    ordered: Vec<u32>,
    pair_used: Vec<bool>,
    /// `team_busy[w][t]` — team already placed in week w.
    team_busy: Vec<Vec<bool>>,
    /// `period_count[t][p]` — appearances of team t in period p.
    period_count: Vec<Vec<u32>>,
    /// Opponent of each ordered team per completed week.
    anchor_opp: Vec<Vec<Option<u32>>>,
    grid: Vec<Vec<usize>>,
    /// Periods already filled in the current week (for first-fail).
    filled: Vec<Vec<bool>>,
}

impl<'a> Search<'a> {
    fn new(model: &'a CpModel, params: &SolveParams) -> Self {
        let w = model.weeks as usize;
        let p = model.periods as usize;
        let n = model.n as usize;
        let mut cap = u32::MAX;
        let mut fixed = Vec::new();
        let mut ordered = Vec::new();
        for c in &model.constraints {
            match c {
                CpConstraint::PeriodBalance { cap: k } => cap = *k,
                CpConstraint::FixSlot { week, period, pair } => {
                    fixed.push((*week, *period, *pair))
                }
                CpConstraint::OpponentOrder { team } => ordered.push(*team),
                CpConstraint::AllDifferentPairs | CpConstraint::TeamOncePerWeek => {}
            }
        }
        let anchor_opp = vec![vec![None; w]; ordered.len()];
        Self {
            model,
            params: *params,
            rng: StdRng::seed_from_u64(params.seed),
            cap,
            fixed,
            ordered,
            pair_used: vec![false; model.pairs.len()],
            team_busy: vec![vec![false; n]; w],
            period_count: vec![vec![0; p]; n],
            anchor_opp,
            grid: vec![vec![usize::MAX; p]; w],
            filled: vec![vec![false; p]; w],
        }
    }

    /// Fills slot number `depth` (of `weeks * periods`) and recurses.
    fn find_pairing(&mut self, depth: usize) -> Found {
        if self.params.deadline.expired() {
            return Found::Timeout;
        }
        let total = (self.model.weeks * self.model.periods) as usize;
        if depth == total {
            return Found::Pairing;
        }
        let w = depth / self.model.periods as usize;
        let p = self.pick_period(w);
        let mut candidates = self.candidates(w, p);
        if self.params.strategy == SearchStrategy::Random {
            candidates.shuffle(&mut self.rng);
        }
        for k in candidates {
            self.place(w, p, k);
            match self.find_pairing(depth + 1) {
                Found::Pairing => return Found::Pairing,
                Found::Timeout => return Found::Timeout,
                Found::Exhausted => {}
            }
            self.unplace(w, p, k);
        }
        Found::Exhausted
    }

    /// Next period to fill in week `w`: in order for Base/Random, the
    /// one with fewest candidates for FirstFail.
    fn pick_period(&mut self, w: usize) -> usize {
        let open: Vec<usize> = (0..self.model.periods as usize)
            .filter(|&p| !self.filled[w][p])
            .collect();
        match self.params.strategy {
            SearchStrategy::FirstFail => open
                .into_iter()
                .min_by_key(|&p| self.candidates(w, p).len())
                .expect("week has an open period"),
            _ => open[0],
        }
    }

    fn candidates(&self, w: usize, p: usize) -> Vec<usize> {
        if let Some(&(_, _, pair)) = self
            .fixed
            .iter()
            .find(|&&(fw, fp, _)| fw as usize == w && fp as usize == p)
        {
            let k = pair as usize;
            return if self.admissible(w, p, k) {
                vec![k]
            } else {
                vec![]
            };
        }
        (0..self.model.pairs.len())
            .filter(|&k| self.admissible(w, p, k))
            .collect()
    }

    fn admissible(&self, w: usize, p: usize, k: usize) -> bool {
        if self.pair_used[k] {
            return false;
        }
        let (i, j) = self.model.pairs[k];
        if self.team_busy[w][i as usize] || self.team_busy[w][j as usize] {
            return false;
        }
        if self.period_count[i as usize][p] >= self.cap
            || self.period_count[j as usize][p] >= self.cap
        {
            return false;
        }
        // Any other fixed slot reserves its pair.
        if self
            .fixed
            .iter()
            .any(|&(fw, fp, fk)| fk as usize == k && (fw as usize != w || fp as usize != p))
        {
            return false;
        }
        for (a, &team) in self.ordered.iter().enumerate() {
            if i == team || j == team {
                let opp = if i == team { j } else { i };
                if w > 0 {
                    match self.anchor_opp[a][w - 1] {
                        Some(prev) if opp <= prev => return false,
                        None => return false, // previous week incomplete: impossible in week-major order
                        _ => {}
                    }
                }
            }
        }
        true
    }

    fn place(&mut self, w: usize, p: usize, k: usize) {
        let (i, j) = self.model.pairs[k];
        self.pair_used[k] = true;
        self.team_busy[w][i as usize] = true;
        self.team_busy[w][j as usize] = true;
        self.period_count[i as usize][p] += 1;
        self.period_count[j as usize][p] += 1;
        self.grid[w][p] = k;
        self.filled[w][p] = true;
        for (a, &team) in self.ordered.iter().enumerate() {
            if i == team || j == team {
                self.anchor_opp[a][w] = Some(if i == team { j } else { i });
            }
        }
    }

    fn unplace(&mut self, w: usize, p: usize, k: usize) {
        let (i, j) = self.model.pairs[k];
        self.pair_used[k] = false;
        self.team_busy[w][i as usize] = false;
        self.team_busy[w][j as usize] = false;
        self.period_count[i as usize][p] -= 1;
        self.period_count[j as usize][p] -= 1;
        self.grid[w][p] = usize::MAX;
        self.filled[w][p] = false;
        for (a, &team) in self.ordered.iter().enumerate() {
            if i == team || j == team {
                self.anchor_opp[a][w] = None;
            }
        }
    }

    /// Chooses orientations for a completed pairing.
    ///
    /// Returns `(flip grid, max imbalance, proven optimal)`. When not
    /// minimizing, the default orientation (lower team home) is kept.
    /// When minimizing, a branch-and-bound over orientations runs until
    /// it reaches the parity lower bound `weeks % 2` (imbalance parity
    /// equals the parity of games played, which proves optimality) or
    /// exhausts.
    fn orient(&mut self, pair_at: &[Vec<usize>]) -> (Vec<Vec<bool>>, u32, bool) {
        let w = self.model.weeks as usize;
        let p = self.model.periods as usize;
        let default = vec![vec![false; p]; w];
        if !self.model.minimize {
            let obj = orientation_objective(self.model, pair_at, &default);
            return (default, obj, false);
        }
        let parity = self.model.weeks % 2;
        // Anchor slots keep their fixed orientation (lower team home).
        let locked: Vec<(usize, usize)> = self
            .fixed
            .iter()
            .map(|&(fw, fp, _)| (fw as usize, fp as usize))
            .collect();
        let slots: Vec<(usize, usize)> = (0..w)
            .flat_map(|wi| (0..p).map(move |pi| (wi, pi)))
            .collect();
        let mut bnb = OrientBnb {
            model: self.model,
            pair_at,
            locked,
            home: vec![0i32; self.model.n as usize],
            played: vec![0u32; self.model.n as usize],
            best: None,
            best_flip: None,
            flip: vec![vec![false; p]; w],
            parity,
            deadline: self.params.deadline,
        };
        bnb.run(&slots, 0);
        match (bnb.best, bnb.best_flip) {
            (Some(obj), Some(flip)) => (flip, obj, obj == parity),
            _ => {
                // Deadline hit before any complete orientation; the
                // default orientation is still feasible.
                let obj = orientation_objective(self.model, pair_at, &default);
                (default, obj, false)
            }
        }
    }
}

fn orientation_objective(model: &CpModel, pair_at: &[Vec<usize>], flip: &[Vec<bool>]) -> u32 {
    let mut home = vec![0i32; model.n as usize];
    let mut games = vec![0i32; model.n as usize];
    for (wi, row) in pair_at.iter().enumerate() {
        for (pi, &k) in row.iter().enumerate() {
            let (i, j) = model.pairs[k];
            let h = if flip[wi][pi] { j } else { i };
            home[h as usize] += 1;
            games[i as usize] += 1;
            games[j as usize] += 1;
        }
    }
    (0..model.n as usize)
        .map(|t| (2 * home[t] - games[t]).unsigned_abs())
        .max()
        .unwrap_or(0)
}

struct OrientBnb<'a> {
    model: &'a CpModel,
    pair_at: &'a [Vec<usize>],
    locked: Vec<(usize, usize)>,
    /// Home minus away so far, per team.
    home: Vec<i32>,
    played: Vec<u32>,
    best: Option<u32>,
    best_flip: Option<Vec<Vec<bool>>>,
    flip: Vec<Vec<bool>>,
    parity: u32,
    deadline: crate::engine::Deadline,
}

impl OrientBnb<'_> {
    /// Lower bound on the final objective from a partial orientation:
    /// a team's current surplus can shrink by at most its remaining
    /// games, and never below the parity floor.
    fn lower_bound(&self) -> u32 {
        let total = self.model.weeks;
        (0..self.model.n as usize)
            .map(|t| {
                let rem = total - self.played[t];
                (self.home[t].unsigned_abs()).saturating_sub(rem).max(self.parity)
            })
            .max()
            .unwrap_or(self.parity)
    }

    fn run(&mut self, slots: &[(usize, usize)], depth: usize) {
        if self.deadline.expired() || self.best == Some(self.parity) {
            return;
        }
        if let Some(best) = self.best {
            if self.lower_bound() >= best {
                return;
            }
        }
        if depth == slots.len() {
            let obj = (0..self.model.n as usize)
                .map(|t| self.home[t].unsigned_abs())
                .max()
                .unwrap_or(0);
            if self.best.map_or(true, |b| obj < b) {
                self.best = Some(obj);
                self.best_flip = Some(self.flip.clone());
            }
            return;
        }
        let (w, p) = slots[depth];
        let (i, j) = self.model.pairs[self.pair_at[w][p]];
        let choices: &[bool] = if self.locked.contains(&(w, p)) {
            &[false]
        } else {
            &[false, true]
        };
        for &f in choices {
            let (h, a) = if f { (j, i) } else { (i, j) };
            self.home[h as usize] += 1;
            self.home[a as usize] -= 1;
            self.played[i as usize] += 1;
            self.played[j as usize] += 1;
            self.flip[w][p] = f;
            self.run(slots, depth + 1);
            self.home[h as usize] -= 1;
            self.home[a as usize] += 1;
            self.played[i as usize] -= 1;
            self.played[j as usize] -= 1;
        }
    }
}
