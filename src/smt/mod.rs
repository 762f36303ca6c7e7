//! SMT formulation.
//!
//! Finite-domain theory encoding: per week and team, an integer
//! opponent variable, an integer period variable, and a Boolean home
//! flag. Assertions are first-order terms over those variables
//! (equality, ordering, implication, and sums of 0/1 conditionals).
//! Array reads of the usual `opp[opp[t]] = t` reciprocity form are
//! flattened into guarded implications, which keeps the artifact
//! engine-neutral.
//!
//! Optimization follows the same incremental tightening loop as the
//! SAT side: assert `|2h_t - W| <= d` for a shrinking `d` and re-solve
//! until a bound is refuted or the parity floor is reached.

pub mod engine;

use tracing::debug;

use self::engine::{SmtEngine, SmtResult};
use crate::canonical;
use crate::engine::SolveParams;
use crate::error::Error;
use crate::models::{Fixture, Instance, RunConfig, RunStatus, Schedule};

/// Domain of one theory variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    /// Bounded integer, both ends inclusive.
    Int { lo: i64, hi: i64 },
    Bool,
}

/// A declared variable: index into [`SmtModel::vars`] is its identity.
#[derive(Debug, Clone)]
pub struct VarDef {
    pub name: String,
    pub domain: Domain,
}

/// A term of the assertion language. Boolean terms double as
/// assertions; integer terms appear under comparisons and sums.
#[derive(Debug, Clone)]
pub enum Term {
    IntVar(usize),
    BoolVar(usize),
    IntConst(i64),
    BoolConst(bool),
    /// Equality of two terms of the same sort.
    Eq(Box<Term>, Box<Term>),
    Ne(Box<Term>, Box<Term>),
    Le(Box<Term>, Box<Term>),
    Lt(Box<Term>, Box<Term>),
    Not(Box<Term>),
    And(Vec<Term>),
    Or(Vec<Term>),
    Implies(Box<Term>, Box<Term>),
    Add(Vec<Term>),
    /// `if cond then a else b`; both arms integer-sorted here.
    Ite(Box<Term>, Box<Term>, Box<Term>),
}

impl Term {
    fn int_var(v: usize) -> Self {
        Term::IntVar(v)
    }

    fn eq(a: Term, b: Term) -> Self {
        Term::Eq(Box::new(a), Box::new(b))
    }

    fn ne(a: Term, b: Term) -> Self {
        Term::Ne(Box::new(a), Box::new(b))
    }

    fn le(a: Term, b: Term) -> Self {
        Term::Le(Box::new(a), Box::new(b))
    }

    fn lt(a: Term, b: Term) -> Self {
        Term::Lt(Box::new(a), Box::new(b))
    }

    fn implies(a: Term, b: Term) -> Self {
        Term::Implies(Box::new(a), Box::new(b))
    }

    /// 0/1 indicator of a Boolean term.
    fn indicator(cond: Term) -> Self {
        Term::Ite(
            Box::new(cond),
            Box::new(Term::IntConst(1)),
            Box::new(Term::IntConst(0)),
        )
    }
}

/// A model as reported by an SMT engine, parallel to the var table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Bool(bool),
}

pub type SmtAssignment = Vec<Value>;

/// The SMT solver artifact: declarations plus assertions, with the
/// variable index maps needed to decode a model.
#[derive(Debug, Clone)]
pub struct SmtModel {
    pub n: u32,
    pub weeks: u32,
    pub periods: u32,
    pub vars: Vec<VarDef>,
    pub assertions: Vec<Term>,
    /// `[week][team]` — opponent of the team that week.
    opp_var: Vec<Vec<usize>>,
    /// `[week][team]` — period of the team that week.
    period_var: Vec<Vec<usize>>,
    /// `[week][team]` — whether the team plays at home that week.
    home_var: Vec<Vec<usize>>,
}

struct Builder {
    vars: Vec<VarDef>,
    assertions: Vec<Term>,
}

impl Builder {
    fn new() -> Self {
        Self {
            vars: Vec::new(),
            assertions: Vec::new(),
        }
    }

    fn int(&mut self, name: String, lo: i64, hi: i64) -> usize {
        self.vars.push(VarDef {
            name,
            domain: Domain::Int { lo, hi },
        });
        self.vars.len() - 1
    }

    fn bool(&mut self, name: String) -> usize {
        self.vars.push(VarDef {
            name,
            domain: Domain::Bool,
        });
        self.vars.len() - 1
    }

    fn assert(&mut self, term: Term) {
        self.assertions.push(term);
    }
}

/// Builds the SMT artifact for satisfiability.
pub fn encode(instance: &Instance, config: &RunConfig) -> SmtModel {
    encode_bounded(instance, config, None)
}

/// Builds the SMT artifact, optionally asserting that every team's
/// home-game count stays within `[(W-d)/2, (W+d)/2]`.
pub fn encode_bounded(instance: &Instance, config: &RunConfig, bound: Option<u32>) -> SmtModel {
    let n = instance.teams() as usize;
    let w_count = instance.weeks() as usize;
    let p_count = instance.periods() as usize;
    let cap = canonical::period_cap(instance) as i64;
    let mut b = Builder::new();

    // Declarations ordered week by week so a chronological model
    // search visits them in schedule order.
    let mut opp_var = vec![vec![0usize; n]; w_count];
    let mut period_var = vec![vec![0usize; n]; w_count];
    let mut home_var = vec![vec![0usize; n]; w_count];
    for w in 0..w_count {
        for t in 0..n {
            opp_var[w][t] = b.int(format!("opp_{w}_{t}"), 0, n as i64 - 1);
        }
        for t in 0..n {
            period_var[w][t] = b.int(format!("period_{w}_{t}"), 0, p_count as i64 - 1);
        }
        for t in 0..n {
            home_var[w][t] = b.bool(format!("home_{w}_{t}"));
        }
    }

    for w in 0..w_count {
        for t in 0..n {
            let opp_t = Term::int_var(opp_var[w][t]);
            // A team never plays itself.
            b.assert(Term::ne(opp_t.clone(), Term::IntConst(t as i64)));
            for j in 0..n {
                if j == t {
                    continue;
                }
                let meets_j = Term::eq(opp_t.clone(), Term::IntConst(j as i64));
                // Reciprocity: if t plays j, then j plays t.
                b.assert(Term::implies(
                    meets_j.clone(),
                    Term::eq(Term::int_var(opp_var[w][j]), Term::IntConst(t as i64)),
                ));
                if t < j {
                    // Matched teams share a period.
                    b.assert(Term::implies(
                        meets_j.clone(),
                        Term::eq(
                            Term::int_var(period_var[w][t]),
                            Term::int_var(period_var[w][j]),
                        ),
                    ));
                    // And take opposite home/away roles.
                    b.assert(Term::implies(
                        meets_j,
                        Term::ne(
                            Term::BoolVar(home_var[w][t]),
                            Term::BoolVar(home_var[w][j]),
                        ),
                    ));
                }
            }
        }
    }

    // Every pair meets exactly once across the tournament.
    for i in 0..n {
        for j in i + 1..n {
            let meets: Vec<Term> = (0..w_count)
                .map(|w| {
                    Term::indicator(Term::eq(
                        Term::int_var(opp_var[w][i]),
                        Term::IntConst(j as i64),
                    ))
                })
                .collect();
            b.assert(Term::eq(Term::Add(meets), Term::IntConst(1)));
        }
    }

    // Every period hosts exactly two teams each week.
    for w in 0..w_count {
        for p in 0..p_count {
            let occupants: Vec<Term> = (0..n)
                .map(|t| {
                    Term::indicator(Term::eq(
                        Term::int_var(period_var[w][t]),
                        Term::IntConst(p as i64),
                    ))
                })
                .collect();
            b.assert(Term::eq(Term::Add(occupants), Term::IntConst(2)));
        }
    }

    // Period balance across weeks.
    for t in 0..n {
        for p in 0..p_count {
            let appearances: Vec<Term> = (0..w_count)
                .map(|w| {
                    Term::indicator(Term::eq(
                        Term::int_var(period_var[w][t]),
                        Term::IntConst(p as i64),
                    ))
                })
                .collect();
            b.assert(Term::le(Term::Add(appearances), Term::IntConst(cap)));
        }
    }

    if config.symmetry {
        // Anchor the first fixture: 1 vs 2, week 1, period 1, 1 home.
        b.assert(Term::eq(Term::int_var(opp_var[0][0]), Term::IntConst(1)));
        b.assert(Term::BoolVar(home_var[0][0]));
        b.assert(Term::eq(Term::int_var(period_var[0][0]), Term::IntConst(0)));
        b.assert(Term::eq(Term::int_var(period_var[0][1]), Term::IntConst(0)));
        // Team 1's opponent strictly increases across weeks.
        for w in 1..w_count {
            b.assert(Term::lt(
                Term::int_var(opp_var[w - 1][0]),
                Term::int_var(opp_var[w][0]),
            ));
        }
    }

    if let Some(d) = bound {
        let w_total = instance.weeks();
        let lo = (w_total.saturating_sub(d) / 2) as i64;
        let hi = ((w_total + d) / 2) as i64;
        for t in 0..n {
            let homes: Vec<Term> = (0..w_count)
                .map(|w| Term::indicator(Term::BoolVar(home_var[w][t])))
                .collect();
            let count = Term::Add(homes);
            b.assert(Term::le(Term::IntConst(lo), count.clone()));
            b.assert(Term::le(count, Term::IntConst(hi)));
        }
    }

    debug!(
        vars = b.vars.len(),
        assertions = b.assertions.len(),
        "smt encoding built"
    );
    SmtModel {
        n: instance.teams(),
        weeks: instance.weeks(),
        periods: instance.periods(),
        vars: b.vars,
        assertions: b.assertions,
        opp_var,
        period_var,
        home_var,
    }
}

/// Decodes a model into a `Schedule`. Inconsistent models (broken
/// reciprocity, colliding periods) are rejected.
pub fn decode(model: &SmtModel, assignment: &SmtAssignment) -> Result<Schedule, Error> {
    let int_of = |var: usize| -> Result<i64, Error> {
        match assignment.get(var) {
            Some(Value::Int(v)) => Ok(*v),
            _ => Err(Error::Encoding(format!("missing integer value for var {var}"))),
        }
    };
    let bool_of = |var: usize| -> Result<bool, Error> {
        match assignment.get(var) {
            Some(Value::Bool(v)) => Ok(*v),
            _ => Err(Error::Encoding(format!("missing boolean value for var {var}"))),
        }
    };
    let n = model.n as usize;
    let mut rounds: Vec<Vec<Option<Fixture>>> =
        vec![vec![None; model.periods as usize]; model.weeks as usize];
    for w in 0..model.weeks as usize {
        for i in 0..n {
            let j = int_of(model.opp_var[w][i])?;
            if j < 0 || j as usize >= n {
                return Err(Error::Encoding(format!(
                    "opponent {j} out of range in week {}",
                    w + 1
                )));
            }
            let j = j as usize;
            if i >= j {
                continue;
            }
            if int_of(model.opp_var[w][j])? != i as i64 {
                return Err(Error::Encoding(format!(
                    "opponents of teams {} and {} disagree in week {}",
                    i + 1,
                    j + 1,
                    w + 1
                )));
            }
            let p = int_of(model.period_var[w][i])?;
            if p < 0 || p as u32 >= model.periods {
                return Err(Error::Encoding(format!(
                    "period {p} out of range in week {}",
                    w + 1
                )));
            }
            let fixture = if bool_of(model.home_var[w][i])? {
                Fixture::new(i as u32 + 1, j as u32 + 1)
            } else {
                Fixture::new(j as u32 + 1, i as u32 + 1)
            };
            let slot = &mut rounds[w][p as usize];
            if slot.is_some() {
                return Err(Error::Encoding(format!(
                    "two fixtures decoded into week {} period {}",
                    w + 1,
                    p + 1
                )));
            }
            *slot = Some(fixture);
        }
    }
    let rounds: Vec<Vec<Fixture>> = rounds
        .into_iter()
        .enumerate()
        .map(|(w, row)| {
            row.into_iter()
                .enumerate()
                .map(|(p, f)| {
                    f.ok_or_else(|| {
                        Error::Encoding(format!("empty slot at week {} period {}", w + 1, p + 1))
                    })
                })
                .collect::<Result<_, _>>()
        })
        .collect::<Result<_, _>>()?;
    Ok(Schedule::new(model.n, rounds))
}

/// Outcome of driving an SMT engine over this formulation.
#[derive(Debug, Clone)]
pub struct SmtOutcome {
    pub status: RunStatus,
    pub schedule: Option<Schedule>,
    pub objective: Option<u32>,
}

/// One satisfiability solve.
pub fn solve<E: SmtEngine + ?Sized>(
    instance: &Instance,
    config: &RunConfig,
    engine: &E,
    params: &SolveParams,
) -> Result<SmtOutcome, Error> {
    let model = encode(instance, config);
    match engine.solve(&model, params) {
        SmtResult::Sat(assignment) => {
            let schedule = decode(&model, &assignment)?;
            Ok(SmtOutcome {
                status: RunStatus::Sat,
                schedule: Some(schedule),
                objective: None,
            })
        }
        SmtResult::Unsat => Ok(SmtOutcome {
            status: RunStatus::Unsat,
            schedule: None,
            objective: None,
        }),
        SmtResult::Unknown => Ok(SmtOutcome {
            status: RunStatus::Unknown,
            schedule: None,
            objective: None,
        }),
    }
}

/// Incremental minimization of the maximum home/away imbalance.
///
/// Same deterministic descending-bound loop as the SAT side: the
/// imbalance parity is fixed by the week count, so each round asserts
/// `d = best - 2` until refuted, the parity floor is reached, or the
/// deadline forces a feasible non-optimal result.
pub fn optimize<E: SmtEngine + ?Sized>(
    instance: &Instance,
    config: &RunConfig,
    engine: &E,
    params: &SolveParams,
) -> Result<SmtOutcome, Error> {
    let parity = instance.weeks() % 2;
    let first = solve(instance, config, engine, params)?;
    let (mut schedule, mut best) = match (first.status, first.schedule) {
        (RunStatus::Sat, Some(s)) => {
            let obj = canonical::objective_value(&s);
            (s, obj)
        }
        (RunStatus::Unsat, _) => {
            return Ok(SmtOutcome {
                status: RunStatus::Unsat,
                schedule: None,
                objective: None,
            })
        }
        _ => {
            return Ok(SmtOutcome {
                status: RunStatus::Unknown,
                schedule: None,
                objective: None,
            })
        }
    };
    loop {
        if best <= parity {
            return Ok(SmtOutcome {
                status: RunStatus::Optimal,
                schedule: Some(schedule),
                objective: Some(best),
            });
        }
        if params.deadline.expired() {
            return Ok(SmtOutcome {
                status: RunStatus::Sat,
                schedule: Some(schedule),
                objective: Some(best),
            });
        }
        let d = best - 2;
        debug!(bound = d, incumbent = best, "smt tightening objective bound");
        let model = encode_bounded(instance, config, Some(d));
        match engine.solve(&model, params) {
            SmtResult::Sat(assignment) => {
                let s = decode(&model, &assignment)?;
                best = canonical::objective_value(&s);
                schedule = s;
            }
            SmtResult::Unsat => {
                return Ok(SmtOutcome {
                    status: RunStatus::Optimal,
                    schedule: Some(schedule),
                    objective: Some(best),
                })
            }
            SmtResult::Unknown => {
                return Ok(SmtOutcome {
                    status: RunStatus::Sat,
                    schedule: Some(schedule),
                    objective: Some(best),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Engine, Paradigm};

    fn config() -> RunConfig {
        RunConfig::new(Paradigm::Smt, Engine::Z3)
    }

    #[test]
    fn test_encode_var_counts() {
        let inst = Instance::new(4).unwrap();
        let model = encode(&inst, &config());
        // 3 weeks x 4 teams x (opp, period, home)
        assert_eq!(model.vars.len(), 36);
        assert!(!model.assertions.is_empty());
    }

    #[test]
    fn test_symmetry_adds_assertions_only() {
        let inst = Instance::new(6).unwrap();
        let plain = encode(&inst, &config());
        let sb = encode(&inst, &config().with_symmetry(true));
        assert_eq!(plain.vars.len(), sb.vars.len());
        assert!(sb.assertions.len() > plain.assertions.len());
    }

    #[test]
    fn test_bound_adds_assertions() {
        let inst = Instance::new(4).unwrap();
        let plain = encode_bounded(&inst, &config(), None);
        let tight = encode_bounded(&inst, &config(), Some(1));
        assert_eq!(
            tight.assertions.len(),
            plain.assertions.len() + 2 * inst.teams() as usize
        );
    }

    #[test]
    fn test_decode_valid_model() {
        let inst = Instance::new(4).unwrap();
        let model = encode(&inst, &config());
        // Hand-built round robin: weeks (1v2, 3v4), (3v1, 2v4), (1v4, 2v3).
        let weeks: [[usize; 4]; 3] = [[1, 0, 3, 2], [2, 3, 0, 1], [3, 2, 1, 0]];
        let periods: [[i64; 4]; 3] = [[0, 0, 1, 1], [0, 1, 0, 1], [0, 1, 1, 0]];
        let homes: [[bool; 4]; 3] = [
            [true, false, true, false],
            [false, true, true, false],
            [true, true, false, false],
        ];
        let mut assignment = vec![Value::Int(0); model.vars.len()];
        for w in 0..3 {
            for t in 0..4 {
                assignment[model.opp_var[w][t]] = Value::Int(weeks[w][t] as i64);
                assignment[model.period_var[w][t]] = Value::Int(periods[w][t]);
                assignment[model.home_var[w][t]] = Value::Bool(homes[w][t]);
            }
        }
        let schedule = decode(&model, &assignment).unwrap();
        assert_eq!(schedule.rounds[0][0], Fixture::new(1, 2));
        // Decoding is total over well-formed assignments; for n=4 the
        // period cap itself cannot be met, so constraint violations
        // are the checker's verdict, not a decode failure.
        let v = canonical::violations(&inst, &schedule);
        assert!(!v.is_empty());
        assert!(v
            .iter()
            .all(|v| v.kind == crate::canonical::ViolationKind::PeriodBalance));
    }

    fn params() -> SolveParams {
        use crate::engine::Deadline;
        use crate::models::SearchStrategy;
        SolveParams::new(
            SearchStrategy::Base,
            Deadline::after(std::time::Duration::from_secs(60)),
        )
    }

    #[test]
    fn test_solve_smallest_instance() {
        let inst = Instance::new(2).unwrap();
        let out = solve(&inst, &config(), &engine::RefSmtEngine::new(), &params()).unwrap();
        assert_eq!(out.status, RunStatus::Sat);
        assert!(canonical::is_feasible(&inst, &out.schedule.unwrap()));
    }

    #[test]
    fn test_optimize_smallest_instance() {
        let inst = Instance::new(2).unwrap();
        let cfg = config().with_optimize(true);
        let out = optimize(&inst, &cfg, &engine::RefSmtEngine::new(), &params()).unwrap();
        assert_eq!(out.status, RunStatus::Optimal);
        assert_eq!(out.objective, Some(1));
    }

    #[test]
    fn test_optimize_reports_unsat() {
        let inst = Instance::new(4).unwrap();
        let cfg = config().with_optimize(true);
        let out = optimize(&inst, &cfg, &engine::RefSmtEngine::new(), &params()).unwrap();
        assert_eq!(out.status, RunStatus::Unsat);
        assert!(out.schedule.is_none());
    }

    /// Engine stub replaying a script, to drive the tightening loop
    /// without a real search.
    struct Scripted(std::cell::RefCell<Vec<engine::SmtResult>>);

    impl engine::SmtEngine for Scripted {
        fn solve(&self, _model: &SmtModel, _params: &SolveParams) -> engine::SmtResult {
            self.0.borrow_mut().remove(0)
        }
    }

    /// Model values for a known feasible n=6 schedule with objective 3.
    fn n6_incumbent(model: &SmtModel) -> SmtAssignment {
        let weeks: [[(u32, u32); 3]; 5] = [
            [(1, 6), (2, 5), (3, 4)],
            [(4, 5), (3, 1), (2, 6)],
            [(2, 4), (3, 6), (5, 1)],
            [(5, 3), (6, 4), (1, 2)],
            [(2, 3), (1, 4), (6, 5)],
        ];
        let mut a = vec![Value::Int(0); model.vars.len()];
        for (w, row) in weeks.iter().enumerate() {
            for (p, &(h, away)) in row.iter().enumerate() {
                let (hi, ai) = (h as usize - 1, away as usize - 1);
                a[model.opp_var[w][hi]] = Value::Int(ai as i64);
                a[model.opp_var[w][ai]] = Value::Int(hi as i64);
                a[model.period_var[w][hi]] = Value::Int(p as i64);
                a[model.period_var[w][ai]] = Value::Int(p as i64);
                a[model.home_var[w][hi]] = Value::Bool(true);
                a[model.home_var[w][ai]] = Value::Bool(false);
            }
        }
        a
    }

    #[test]
    fn test_optimize_stops_on_refuted_bound() {
        let inst = Instance::new(6).unwrap();
        let cfg = config().with_optimize(true);
        let model = encode(&inst, &cfg);
        let assignment = n6_incumbent(&model);
        assert_eq!(
            canonical::objective_value(&decode(&model, &assignment).unwrap()),
            3
        );
        let script = Scripted(std::cell::RefCell::new(vec![
            engine::SmtResult::Sat(assignment),
            engine::SmtResult::Unsat,
        ]));
        let out = optimize(&inst, &cfg, &script, &params()).unwrap();
        assert_eq!(out.status, RunStatus::Optimal);
        assert_eq!(out.objective, Some(3));
    }

    #[test]
    fn test_optimize_degrades_to_sat_on_unknown() {
        let inst = Instance::new(6).unwrap();
        let cfg = config().with_optimize(true);
        let model = encode(&inst, &cfg);
        let script = Scripted(std::cell::RefCell::new(vec![
            engine::SmtResult::Sat(n6_incumbent(&model)),
            engine::SmtResult::Unknown,
        ]));
        let out = optimize(&inst, &cfg, &script, &params()).unwrap();
        assert_eq!(out.status, RunStatus::Sat);
        assert_eq!(out.objective, Some(3));
    }

    #[test]
    fn test_decode_rejects_broken_reciprocity() {
        let inst = Instance::new(4).unwrap();
        let model = encode(&inst, &config());
        let mut assignment = vec![Value::Int(0); model.vars.len()];
        for w in 0..3 {
            for t in 0..4 {
                // Everyone claims to play team 4; reciprocity fails.
                assignment[model.opp_var[w][t]] = Value::Int(3);
                assignment[model.period_var[w][t]] = Value::Int(0);
                assignment[model.home_var[w][t]] = Value::Bool(false);
            }
        }
        assert!(matches!(
            decode(&model, &assignment),
            Err(Error::Encoding(_))
        ));
    }
}
