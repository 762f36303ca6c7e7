//! SAT solving API and reference engine.
//!
//! `SatEngine` is the seam to external SAT solvers. `DpllEngine` is the
//! in-crate reference: classic DPLL with unit propagation over
//! occurrence lists. Complete, so Unsat answers are proofs — which the
//! incremental optimization loop relies on.

use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

use super::{Cnf, SatAssignment};
use crate::engine::SolveParams;
use crate::models::SearchStrategy;

/// Outcome of one CNF solve.
#[derive(Debug, Clone)]
pub enum SatResult {
    Sat(SatAssignment),
    Unsat,
    /// Deadline expired before the search finished.
    Unknown,
}

/// Solving API for SAT engines.
pub trait SatEngine {
    fn solve(&self, cnf: &Cnf, params: &SolveParams) -> SatResult;
}

/// Reference DPLL engine.
#[derive(Debug, Default)]
pub struct DpllEngine;

impl DpllEngine {
    pub fn new() -> Self {
        Self
    }
}

impl SatEngine for DpllEngine {
    fn solve(&self, cnf: &Cnf, params: &SolveParams) -> SatResult {
        if cnf.clauses.iter().any(Vec::is_empty) {
            return SatResult::Unsat;
        }
        let mut search = Dpll::new(cnf, params);
        // Top-level units.
        for clause in &cnf.clauses {
            if clause.len() == 1 && !search.enqueue(clause[0]) {
                return SatResult::Unsat;
            }
        }
        match search.run() {
            Res::Sat => SatResult::Sat(search.model()),
            Res::Unsat => SatResult::Unsat,
            Res::Timeout => SatResult::Unknown,
        }
    }
}

enum Res {
    Sat,
    Unsat,
    Timeout,
}

struct Dpll<'a> {
    clauses: &'a [Vec<i32>],
    params: SolveParams,
    rng: StdRng,
    /// 0 unassigned, 1 true, -1 false; indexed by variable.
    assign: Vec<i8>,
    /// Clause indices containing v (positive) / -v (negative).
    occ_pos: Vec<Vec<usize>>,
    occ_neg: Vec<Vec<usize>>,
    trail: Vec<u32>,
    pending: Vec<u32>,
}

impl<'a> Dpll<'a> {
    fn new(cnf: &'a Cnf, params: &SolveParams) -> Self {
        let vars = cnf.var_count as usize + 1;
        let mut occ_pos = vec![Vec::new(); vars];
        let mut occ_neg = vec![Vec::new(); vars];
        for (idx, clause) in cnf.clauses.iter().enumerate() {
            for &lit in clause {
                if lit > 0 {
                    occ_pos[lit as usize].push(idx);
                } else {
                    occ_neg[(-lit) as usize].push(idx);
                }
            }
        }
        Self {
            clauses: &cnf.clauses,
            params: *params,
            rng: StdRng::seed_from_u64(params.seed),
            assign: vec![0; vars],
            occ_pos,
            occ_neg,
            trail: Vec::new(),
            pending: Vec::new(),
        }
    }

    #[inline]
    fn value(&self, lit: i32) -> i8 {
        let v = self.assign[lit.unsigned_abs() as usize];
        if lit > 0 {
            v
        } else {
            -v
        }
    }

    /// Assigns a literal true. Returns false on an immediate conflict.
    fn enqueue(&mut self, lit: i32) -> bool {
        match self.value(lit) {
            1 => true,
            -1 => false,
            _ => {
                let var = lit.unsigned_abs();
                self.assign[var as usize] = if lit > 0 { 1 } else { -1 };
                self.trail.push(var);
                self.pending.push(var);
                true
            }
        }
    }

    /// Unit propagation to fixpoint. False means conflict.
    fn propagate(&mut self) -> bool {
        while let Some(var) = self.pending.pop() {
            // Clauses where this assignment falsified a literal.
            let watch = if self.assign[var as usize] == 1 {
                std::mem::take(&mut self.occ_neg[var as usize])
            } else {
                std::mem::take(&mut self.occ_pos[var as usize])
            };
            let mut conflict = false;
            for &idx in &watch {
                if conflict {
                    break;
                }
                let mut unassigned = None;
                let mut satisfied = false;
                let mut open = 0u32;
                for &lit in &self.clauses[idx] {
                    match self.value(lit) {
                        1 => {
                            satisfied = true;
                            break;
                        }
                        0 => {
                            open += 1;
                            unassigned = Some(lit);
                        }
                        _ => {}
                    }
                }
                if satisfied {
                    continue;
                }
                match (open, unassigned) {
                    (0, _) => conflict = true,
                    (1, Some(unit)) => {
                        if !self.enqueue(unit) {
                            conflict = true;
                        }
                    }
                    _ => {}
                }
            }
            // Restore the occurrence list taken above.
            if self.assign[var as usize] == 1 {
                self.occ_neg[var as usize] = watch;
            } else {
                self.occ_pos[var as usize] = watch;
            }
            if conflict {
                self.pending.clear();
                return false;
            }
        }
        true
    }

    fn undo(&mut self, mark: usize) {
        while self.trail.len() > mark {
            let var = self.trail.pop().expect("trail underflow");
            self.assign[var as usize] = 0;
        }
        self.pending.clear();
    }

    fn run(&mut self) -> Res {
        if self.params.deadline.expired() {
            return Res::Timeout;
        }
        let mark = self.trail.len();
        if !self.propagate() {
            self.undo(mark);
            return Res::Unsat;
        }
        let var = match self.pick_var() {
            None => return Res::Sat,
            Some(v) => v,
        };
        for phase in [1i8, -1] {
            let mark = self.trail.len();
            let lit = if phase == 1 { var as i32 } else { -(var as i32) };
            if self.enqueue(lit) {
                match self.run() {
                    Res::Sat => return Res::Sat,
                    Res::Timeout => return Res::Timeout,
                    Res::Unsat => {}
                }
            }
            self.undo(mark);
        }
        Res::Unsat
    }

    fn pick_var(&mut self) -> Option<u32> {
        match self.params.strategy {
            SearchStrategy::Base => (1..self.assign.len())
                .find(|&v| self.assign[v] == 0)
                .map(|v| v as u32),
            SearchStrategy::FirstFail => {
                // Branch inside the shortest unresolved clause.
                let mut best: Option<(u32, u32)> = None; // (open count, var)
                for clause in self.clauses {
                    let mut open = 0u32;
                    let mut first = None;
                    let mut satisfied = false;
                    for &lit in clause {
                        match self.value(lit) {
                            1 => {
                                satisfied = true;
                                break;
                            }
                            0 => {
                                open += 1;
                                if first.is_none() {
                                    first = Some(lit.unsigned_abs());
                                }
                            }
                            _ => {}
                        }
                    }
                    if satisfied || open == 0 {
                        continue;
                    }
                    if best.map_or(true, |(b, _)| open < b) {
                        best = Some((open, first.expect("open clause has a literal")));
                        if open == 2 {
                            break;
                        }
                    }
                }
                best.map(|(_, v)| v).or_else(|| {
                    (1..self.assign.len())
                        .find(|&v| self.assign[v] == 0)
                        .map(|v| v as u32)
                })
            }
            SearchStrategy::Random => {
                let open: Vec<u32> = (1..self.assign.len())
                    .filter(|&v| self.assign[v] == 0)
                    .map(|v| v as u32)
                    .collect();
                if open.is_empty() {
                    None
                } else {
                    Some(open[self.rng.random_range(0..open.len())])
                }
            }
        }
    }

    fn model(&self) -> SatAssignment {
        self.assign.iter().map(|&v| v == 1).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Deadline;
    use crate::models::SearchStrategy;
    use std::time::Duration;

    fn params() -> SolveParams {
        SolveParams::new(SearchStrategy::Base, Deadline::after(Duration::from_secs(10)))
    }

    fn cnf(var_count: u32, clauses: &[&[i32]]) -> Cnf {
        Cnf {
            var_count,
            clauses: clauses.iter().map(|c| c.to_vec()).collect(),
        }
    }

    fn assert_model_satisfies(cnf: &Cnf, model: &[bool]) {
        for clause in &cnf.clauses {
            assert!(
                clause.iter().any(|&lit| {
                    let val = model[lit.unsigned_abs() as usize];
                    (lit > 0) == val
                }),
                "clause {clause:?} unsatisfied"
            );
        }
    }

    #[test]
    fn test_simple_sat() {
        let f = cnf(3, &[&[1, 2], &[-1, 3], &[-2, -3]]);
        match DpllEngine::new().solve(&f, &params()) {
            SatResult::Sat(model) => assert_model_satisfies(&f, &model),
            other => panic!("expected Sat, got {other:?}"),
        }
    }

    #[test]
    fn test_simple_unsat() {
        let f = cnf(2, &[&[1], &[-1]]);
        assert!(matches!(
            DpllEngine::new().solve(&f, &params()),
            SatResult::Unsat
        ));
    }

    #[test]
    fn test_unsat_needs_search() {
        // XOR chain with contradictory parity: x1^x2, x2^x3, x1^x3 all odd.
        let f = cnf(
            3,
            &[
                &[1, 2],
                &[-1, -2],
                &[2, 3],
                &[-2, -3],
                &[1, 3],
                &[-1, -3],
            ],
        );
        assert!(matches!(
            DpllEngine::new().solve(&f, &params()),
            SatResult::Unsat
        ));
    }

    #[test]
    fn test_empty_clause_unsat() {
        let f = cnf(1, &[&[]]);
        assert!(matches!(
            DpllEngine::new().solve(&f, &params()),
            SatResult::Unsat
        ));
    }

    #[test]
    fn test_deadline_unknown() {
        let inst = crate::models::Instance::new(8).unwrap();
        let cfg = crate::models::RunConfig::new(
            crate::models::Paradigm::Sat,
            crate::models::Engine::Z3,
        );
        let model = crate::sat::encode(&inst, &cfg);
        let p = SolveParams::new(SearchStrategy::Base, Deadline::after(Duration::ZERO));
        assert!(matches!(
            DpllEngine::new().solve(&model.cnf, &p),
            SatResult::Unknown
        ));
    }

    #[test]
    fn test_strategies_agree() {
        let f = cnf(4, &[&[1, 2, 3], &[-1, 4], &[-2, -4], &[-3, 2, 1]]);
        for strategy in [
            SearchStrategy::Base,
            SearchStrategy::FirstFail,
            SearchStrategy::Random,
        ] {
            let p = SolveParams::new(strategy, Deadline::after(Duration::from_secs(10)));
            match DpllEngine::new().solve(&f, &p) {
                SatResult::Sat(model) => assert_model_satisfies(&f, &model),
                other => panic!("{strategy:?}: expected Sat, got {other:?}"),
            }
        }
    }
}
