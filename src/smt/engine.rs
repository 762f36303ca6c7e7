//! SMT solving API and reference engine.
//!
//! `SmtEngine` is the seam to external theory solvers (a Z3 binding
//! implements it by emitting the declarations and assertions through
//! its own API). `RefSmtEngine` is the in-crate reference: a complete
//! backtracking model finder over the finite domains, pruning with
//! three-valued term evaluation and interval arithmetic over
//! partially-assigned sums.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::{Domain, SmtAssignment, SmtModel, Term, Value};
use crate::engine::SolveParams;
use crate::models::SearchStrategy;

/// Outcome of one model search.
#[derive(Debug, Clone)]
pub enum SmtResult {
    Sat(SmtAssignment),
    Unsat,
    /// Deadline expired before the search finished.
    Unknown,
}

/// Solving API for SMT engines.
pub trait SmtEngine {
    fn solve(&self, model: &SmtModel, params: &SolveParams) -> SmtResult;
}

/// Reference finite-domain model finder.
#[derive(Debug, Default)]
pub struct RefSmtEngine;

impl RefSmtEngine {
    pub fn new() -> Self {
        Self
    }
}

impl SmtEngine for RefSmtEngine {
    fn solve(&self, model: &SmtModel, params: &SolveParams) -> SmtResult {
        let mut search = Finder::new(model, params);
        match search.run(0) {
            Res::Model => SmtResult::Sat(
                search
                    .assign
                    .iter()
                    .map(|v| v.expect("complete model"))
                    .collect(),
            ),
            Res::Exhausted => SmtResult::Unsat,
            Res::Timeout => SmtResult::Unknown,
        }
    }
}

enum Res {
    Model,
    Exhausted,
    Timeout,
}

struct Finder<'a> {
    model: &'a SmtModel,
    params: SolveParams,
    rng: StdRng,
    assign: Vec<Option<Value>>,
    /// Variable visit order, strategy-dependent but fixed up front.
    order: Vec<usize>,
    /// Assertions mentioning each variable.
    watching: Vec<Vec<usize>>,
}

impl<'a> Finder<'a> {
    fn new(model: &'a SmtModel, params: &SolveParams) -> Self {
        let var_count = model.vars.len();
        let mut watching = vec![Vec::new(); var_count];
        for (idx, assertion) in model.assertions.iter().enumerate() {
            let mut seen = vec![false; var_count];
            collect_vars(assertion, &mut seen);
            for (v, hit) in seen.iter().enumerate() {
                if *hit {
                    watching[v].push(idx);
                }
            }
        }
        let mut order: Vec<usize> = (0..var_count).collect();
        if params.strategy == SearchStrategy::FirstFail {
            // Smallest domain first; declaration order breaks ties.
            order.sort_by_key(|&v| match model.vars[v].domain {
                Domain::Bool => 2,
                Domain::Int { lo, hi } => (hi - lo + 1) as u64,
            });
        }
        Self {
            model,
            params: *params,
            rng: StdRng::seed_from_u64(params.seed),
            assign: vec![None; var_count],
            order,
            watching,
        }
    }

    fn run(&mut self, depth: usize) -> Res {
        if self.params.deadline.expired() {
            return Res::Timeout;
        }
        if depth == self.order.len() {
            return Res::Model;
        }
        let var = self.order[depth];
        let mut values: Vec<Value> = match self.model.vars[var].domain {
            Domain::Bool => vec![Value::Bool(false), Value::Bool(true)],
            Domain::Int { lo, hi } => (lo..=hi).map(Value::Int).collect(),
        };
        if self.params.strategy == SearchStrategy::Random {
            values.shuffle(&mut self.rng);
        }
        for value in values {
            self.assign[var] = Some(value);
            if self.consistent(var) {
                match self.run(depth + 1) {
                    Res::Model => return Res::Model,
                    Res::Timeout => return Res::Timeout,
                    Res::Exhausted => {}
                }
            }
        }
        self.assign[var] = None;
        Res::Exhausted
    }

    /// Whether no assertion watching `var` is already refuted.
    fn consistent(&self, var: usize) -> bool {
        let eval = Eval {
            model: self.model,
            assign: &self.assign,
        };
        self.watching[var]
            .iter()
            .all(|&idx| eval.boolean(&self.model.assertions[idx]) != Some(false))
    }
}

fn collect_vars(term: &Term, seen: &mut Vec<bool>) {
    match term {
        Term::IntVar(v) | Term::BoolVar(v) => seen[*v] = true,
        Term::IntConst(_) | Term::BoolConst(_) => {}
        Term::Eq(a, b) | Term::Ne(a, b) | Term::Le(a, b) | Term::Lt(a, b)
        | Term::Implies(a, b) => {
            collect_vars(a, seen);
            collect_vars(b, seen);
        }
        Term::Not(a) => collect_vars(a, seen),
        Term::And(ts) | Term::Or(ts) | Term::Add(ts) => {
            for t in ts {
                collect_vars(t, seen);
            }
        }
        Term::Ite(c, a, b) => {
            collect_vars(c, seen);
            collect_vars(a, seen);
            collect_vars(b, seen);
        }
    }
}

/// Whether a term is Boolean-sorted. The builder only compares terms of
/// matching sort, so inspecting one side of a comparison suffices.
fn bool_sorted(term: &Term) -> bool {
    !matches!(
        term,
        Term::IntVar(_) | Term::IntConst(_) | Term::Add(_) | Term::Ite(_, _, _)
    )
}

/// Partial-assignment term evaluator: exact on assigned leaves, a sound
/// interval hull above unassigned ones.
struct Eval<'a> {
    model: &'a SmtModel,
    assign: &'a [Option<Value>],
}

impl Eval<'_> {
    /// Interval of possible values of an integer-sorted term.
    fn int(&self, term: &Term) -> (i64, i64) {
        match term {
            Term::IntConst(c) => (*c, *c),
            Term::IntVar(v) => match self.assign[*v] {
                Some(Value::Int(x)) => (x, x),
                _ => match self.model.vars[*v].domain {
                    Domain::Int { lo, hi } => (lo, hi),
                    Domain::Bool => (0, 0),
                },
            },
            Term::Add(ts) => ts.iter().fold((0, 0), |(lo, hi), t| {
                let (tlo, thi) = self.int(t);
                (lo.saturating_add(tlo), hi.saturating_add(thi))
            }),
            Term::Ite(c, a, b) => match self.boolean(c) {
                Some(true) => self.int(a),
                Some(false) => self.int(b),
                None => {
                    let (alo, ahi) = self.int(a);
                    let (blo, bhi) = self.int(b);
                    (alo.min(blo), ahi.max(bhi))
                }
            },
            // Boolean-sorted terms never reach integer position.
            _ => (0, 0),
        }
    }

    /// Three-valued evaluation of a Boolean-sorted term.
    fn boolean(&self, term: &Term) -> Option<bool> {
        match term {
            Term::BoolConst(c) => Some(*c),
            Term::BoolVar(v) => match self.assign[*v] {
                Some(Value::Bool(x)) => Some(x),
                _ => None,
            },
            Term::Not(a) => self.boolean(a).map(|x| !x),
            Term::And(ts) => {
                let mut all = Some(true);
                for t in ts {
                    match self.boolean(t) {
                        Some(false) => return Some(false),
                        Some(true) => {}
                        None => all = None,
                    }
                }
                all
            }
            Term::Or(ts) => {
                let mut any = Some(false);
                for t in ts {
                    match self.boolean(t) {
                        Some(true) => return Some(true),
                        Some(false) => {}
                        None => any = None,
                    }
                }
                any
            }
            Term::Implies(a, b) => match (self.boolean(a), self.boolean(b)) {
                (Some(false), _) | (_, Some(true)) => Some(true),
                (Some(true), Some(false)) => Some(false),
                _ => None,
            },
            Term::Eq(a, b) if bool_sorted(a) => match (self.boolean(a), self.boolean(b)) {
                (Some(x), Some(y)) => Some(x == y),
                _ => None,
            },
            Term::Ne(a, b) if bool_sorted(a) => match (self.boolean(a), self.boolean(b)) {
                (Some(x), Some(y)) => Some(x != y),
                _ => None,
            },
            Term::Eq(a, b) => {
                let (alo, ahi) = self.int(a);
                let (blo, bhi) = self.int(b);
                if ahi < blo || bhi < alo {
                    Some(false)
                } else if alo == ahi && blo == bhi {
                    Some(true)
                } else {
                    None
                }
            }
            Term::Ne(a, b) => {
                let (alo, ahi) = self.int(a);
                let (blo, bhi) = self.int(b);
                if ahi < blo || bhi < alo {
                    Some(true)
                } else if alo == ahi && blo == bhi {
                    Some(false)
                } else {
                    None
                }
            }
            Term::Le(a, b) => {
                let (alo, ahi) = self.int(a);
                let (blo, bhi) = self.int(b);
                if ahi <= blo {
                    Some(true)
                } else if alo > bhi {
                    Some(false)
                } else {
                    None
                }
            }
            Term::Lt(a, b) => {
                let (alo, ahi) = self.int(a);
                let (blo, bhi) = self.int(b);
                if ahi < blo {
                    Some(true)
                } else if alo >= bhi {
                    Some(false)
                } else {
                    None
                }
            }
            // Integer-sorted terms never reach assertion position.
            Term::IntVar(_) | Term::IntConst(_) | Term::Add(_) | Term::Ite(_, _, _) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical;
    use crate::engine::Deadline;
    use crate::models::{Engine, Instance, Paradigm, RunConfig};
    use crate::smt::{decode, encode};
    use std::time::Duration;

    fn params(strategy: SearchStrategy) -> SolveParams {
        SolveParams::new(strategy, Deadline::after(Duration::from_secs(60)))
    }

    fn config() -> RunConfig {
        RunConfig::new(Paradigm::Smt, Engine::Z3)
    }

    #[test]
    fn test_smallest_instance_model() {
        let inst = Instance::new(2).unwrap();
        let model = encode(&inst, &config());
        match RefSmtEngine::new().solve(&model, &params(SearchStrategy::Base)) {
            SmtResult::Sat(assignment) => {
                let s = decode(&model, &assignment).unwrap();
                assert!(canonical::is_feasible(&inst, &s));
            }
            other => panic!("expected Sat, got {other:?}"),
        }
    }

    #[test]
    fn test_n4_proven_infeasible() {
        let inst = Instance::new(4).unwrap();
        for symmetry in [false, true] {
            let model = encode(&inst, &config().with_symmetry(symmetry));
            assert!(
                matches!(
                    RefSmtEngine::new().solve(&model, &params(SearchStrategy::Base)),
                    SmtResult::Unsat
                ),
                "symmetry={symmetry}"
            );
        }
    }

    #[test]
    fn test_strategies_agree() {
        let inst = Instance::new(2).unwrap();
        let model = encode(&inst, &config());
        for strategy in [
            SearchStrategy::Base,
            SearchStrategy::FirstFail,
            SearchStrategy::Random,
        ] {
            match RefSmtEngine::new().solve(&model, &params(strategy)) {
                SmtResult::Sat(assignment) => {
                    let s = decode(&model, &assignment).unwrap();
                    assert!(canonical::is_feasible(&inst, &s), "{strategy:?}");
                }
                other => panic!("{strategy:?}: expected Sat, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_expired_deadline_is_unknown() {
        let inst = Instance::new(6).unwrap();
        let model = encode(&inst, &config());
        let p = SolveParams::new(SearchStrategy::Base, Deadline::after(Duration::ZERO));
        assert!(matches!(
            RefSmtEngine::new().solve(&model, &p),
            SmtResult::Unknown
        ));
    }

    #[test]
    fn test_interval_pruning_on_sums() {
        let inst = Instance::new(2).unwrap();
        let model = encode(&inst, &config());
        let blank = vec![None; model.vars.len()];
        let eval = Eval {
            model: &model,
            assign: &blank,
        };
        // With nothing assigned, a sum of indicators spans [0, k].
        let sum = Term::Add(vec![
            Term::Ite(
                Box::new(Term::BoolConst(true)),
                Box::new(Term::IntConst(1)),
                Box::new(Term::IntConst(0)),
            ),
            Term::Ite(
                Box::new(Term::BoolConst(false)),
                Box::new(Term::IntConst(1)),
                Box::new(Term::IntConst(0)),
            ),
        ]);
        assert_eq!(eval.int(&sum), (1, 1));
        assert_eq!(
            eval.boolean(&Term::Le(Box::new(sum), Box::new(Term::IntConst(0)))),
            Some(false)
        );
    }
}
