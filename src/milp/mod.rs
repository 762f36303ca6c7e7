//! MILP formulation.
//!
//! Pure 0/1 scheme with one integer column: binaries `x[w][k]` (pair k
//! plays in week w), `h[w][t]` (team t at home in week w), and
//! `y[w][t][p]` (team t sits in period p of week w), linked by big-M
//! rows; when minimizing, an integer column `d` bounds every team's
//! home/away surplus and is the objective. Unlike the SAT/SMT side
//! there is no external tightening loop: MILP engines carry their own
//! branch-and-bound, so the artifact states the objective directly.
//!
//! The artifact is solver-neutral rows and columns; a
//! [`MilpEngine`](engine::MilpEngine) lowers them to its native model
//! (Cbc, Scip, and HiGHS all consume this shape directly).

pub mod engine;

use tracing::debug;

use self::engine::{MilpEngine, MilpResult};
use crate::canonical;
use crate::cp::pair_index;
use crate::engine::SolveParams;
use crate::error::Error;
use crate::models::{Fixture, Instance, RunConfig, RunStatus, Schedule};

/// Column type of a linear program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Binary,
    Integer { lo: i64, hi: i64 },
}

/// One column.
#[derive(Debug, Clone)]
pub struct ColDef {
    pub name: String,
    pub kind: VarKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Le,
    Ge,
    Eq,
}

/// One row: `sum(coef * col) sense rhs`.
#[derive(Debug, Clone)]
pub struct LinCon {
    pub terms: Vec<(usize, i64)>,
    pub sense: Sense,
    pub rhs: i64,
}

/// A mixed-integer linear program.
#[derive(Debug, Clone)]
pub struct LinearProgram {
    pub cols: Vec<ColDef>,
    pub rows: Vec<LinCon>,
    /// Minimization terms; `None` for pure satisfiability.
    pub objective: Option<Vec<(usize, i64)>>,
}

/// A column assignment reported by a MILP engine.
pub type MilpAssignment = Vec<i64>;

/// The MILP solver artifact, with the column maps needed to decode.
#[derive(Debug, Clone)]
pub struct MilpModel {
    pub n: u32,
    pub weeks: u32,
    pub periods: u32,
    pub lp: LinearProgram,
    /// `[week][pair index]`
    x_var: Vec<Vec<usize>>,
    /// `[week][team]`
    home_var: Vec<Vec<usize>>,
    /// `[week][team][period]`
    period_var: Vec<Vec<Vec<usize>>>,
}

struct Builder {
    cols: Vec<ColDef>,
    rows: Vec<LinCon>,
}

impl Builder {
    fn new() -> Self {
        Self {
            cols: Vec::new(),
            rows: Vec::new(),
        }
    }

    fn binary(&mut self, name: String) -> usize {
        self.cols.push(ColDef {
            name,
            kind: VarKind::Binary,
        });
        self.cols.len() - 1
    }

    fn integer(&mut self, name: String, lo: i64, hi: i64) -> usize {
        self.cols.push(ColDef {
            name,
            kind: VarKind::Integer { lo, hi },
        });
        self.cols.len() - 1
    }

    fn row(&mut self, terms: Vec<(usize, i64)>, sense: Sense, rhs: i64) {
        self.rows.push(LinCon { terms, sense, rhs });
    }

    /// Pins a binary column to a constant.
    fn fix(&mut self, col: usize, value: i64) {
        self.row(vec![(col, 1)], Sense::Eq, value);
    }
}

/// Builds the MILP artifact. The `optimize` flag on the configuration
/// decides whether the imbalance column and objective are present.
pub fn encode(instance: &Instance, config: &RunConfig) -> MilpModel {
    let n = instance.teams() as usize;
    let w_count = instance.weeks() as usize;
    let p_count = instance.periods() as usize;
    let pair_count = n * (n - 1) / 2;
    let cap = canonical::period_cap(instance) as i64;
    let mut b = Builder::new();

    // Columns grouped by role: all pairings, then period memberships,
    // then orientations, so a column-order branching engine settles the
    // tightly-constrained pairing structure first.
    let x_var: Vec<Vec<usize>> = (0..w_count)
        .map(|w| {
            (0..pair_count)
                .map(|k| b.binary(format!("x_{w}_{k}")))
                .collect()
        })
        .collect();
    let period_var: Vec<Vec<Vec<usize>>> = (0..w_count)
        .map(|w| {
            (0..n)
                .map(|t| {
                    (0..p_count)
                        .map(|p| b.binary(format!("y_{w}_{t}_{p}")))
                        .collect()
                })
                .collect()
        })
        .collect();
    let home_var: Vec<Vec<usize>> = (0..w_count)
        .map(|w| (0..n).map(|t| b.binary(format!("h_{w}_{t}"))).collect())
        .collect();

    let pv = |i: u32, j: u32| pair_index(i, j, n as u32);

    // Every team plays exactly one match per week.
    for w in 0..w_count {
        for t in 0..n as u32 {
            let terms: Vec<(usize, i64)> = (0..n as u32)
                .filter(|&o| o != t)
                .map(|o| (x_var[w][pv(t.min(o), t.max(o))], 1))
                .collect();
            b.row(terms, Sense::Eq, 1);
        }
    }
    // Every pair meets exactly once.
    for k in 0..pair_count {
        let terms: Vec<(usize, i64)> = (0..w_count).map(|w| (x_var[w][k], 1)).collect();
        b.row(terms, Sense::Eq, 1);
    }
    // One period per team per week.
    for w in 0..w_count {
        for t in 0..n {
            let terms: Vec<(usize, i64)> =
                (0..p_count).map(|p| (period_var[w][t][p], 1)).collect();
            b.row(terms, Sense::Eq, 1);
        }
    }
    // Every period hosts exactly two teams each week.
    for w in 0..w_count {
        for p in 0..p_count {
            let terms: Vec<(usize, i64)> = (0..n).map(|t| (period_var[w][t][p], 1)).collect();
            b.row(terms, Sense::Eq, 2);
        }
    }
    // Period balance across weeks.
    for t in 0..n {
        for p in 0..p_count {
            let terms: Vec<(usize, i64)> =
                (0..w_count).map(|w| (period_var[w][t][p], 1)).collect();
            b.row(terms, Sense::Le, cap);
        }
    }
    // Matched teams share a period: y_i - y_j <= 1 - x, both ways.
    for w in 0..w_count {
        for i in 0..n as u32 {
            for j in i + 1..n as u32 {
                let x = x_var[w][pv(i, j)];
                for p in 0..p_count {
                    let yi = period_var[w][i as usize][p];
                    let yj = period_var[w][j as usize][p];
                    b.row(vec![(yi, 1), (yj, -1), (x, 1)], Sense::Le, 1);
                    b.row(vec![(yj, 1), (yi, -1), (x, 1)], Sense::Le, 1);
                }
                // Opposite home/away roles under a big-M guard:
                // h_i + h_j = 1 when x = 1, free otherwise.
                let hi = home_var[w][i as usize];
                let hj = home_var[w][j as usize];
                b.row(vec![(hi, 1), (hj, 1), (x, 2)], Sense::Le, 3);
                b.row(vec![(hi, 1), (hj, 1), (x, -2)], Sense::Ge, -1);
            }
        }
    }

    if config.symmetry {
        // Anchor the first fixture: 1 vs 2, week 1, period 1, 1 home.
        b.fix(x_var[0][pv(0, 1)], 1);
        b.fix(home_var[0][0], 1);
        b.fix(home_var[0][1], 0);
        b.fix(period_var[0][0][0], 1);
        b.fix(period_var[0][1][0], 1);
        // Team 1's opponent ascends: if 1 meets j in week w+1, some
        // opponent k <= j was met in week w.
        for w in 0..w_count - 1 {
            for j in 1..n as u32 {
                let mut terms: Vec<(usize, i64)> =
                    (1..=j).map(|k| (x_var[w][pv(0, k)], 1)).collect();
                terms.push((x_var[w + 1][pv(0, j)], -1));
                b.row(terms, Sense::Ge, 0);
            }
        }
    }

    let objective = if config.optimize {
        let w_total = instance.weeks() as i64;
        let parity = w_total % 2;
        let d = b.integer("imbalance".into(), parity, w_total);
        // |2 * homes_t - W| <= d, linearized per team.
        for t in 0..n {
            let homes: Vec<(usize, i64)> =
                (0..w_count).map(|w| (home_var[w][t], 2)).collect();
            let mut upper = homes.clone();
            upper.push((d, -1));
            b.row(upper, Sense::Le, w_total);
            let mut lower = homes;
            lower.push((d, 1));
            b.row(lower, Sense::Ge, w_total);
        }
        Some(vec![(d, 1)])
    } else {
        None
    };

    debug!(
        cols = b.cols.len(),
        rows = b.rows.len(),
        "milp encoding built"
    );
    MilpModel {
        n: instance.teams(),
        weeks: instance.weeks(),
        periods: instance.periods(),
        lp: LinearProgram {
            cols: b.cols,
            rows: b.rows,
            objective,
        },
        x_var,
        home_var,
        period_var,
    }
}

/// Decodes a column assignment into a `Schedule`. Fractional or
/// inconsistent assignments are rejected, never mis-decoded.
pub fn decode(model: &MilpModel, assignment: &MilpAssignment) -> Result<Schedule, Error> {
    let col = |c: usize| -> Result<i64, Error> {
        assignment
            .get(c)
            .copied()
            .ok_or_else(|| Error::Encoding(format!("missing value for column {c}")))
    };
    let n = model.n;
    let mut rounds: Vec<Vec<Option<Fixture>>> =
        vec![vec![None; model.periods as usize]; model.weeks as usize];
    for w in 0..model.weeks as usize {
        for i in 0..n {
            for j in i + 1..n {
                if col(model.x_var[w][pair_index(i, j, n)])? != 1 {
                    continue;
                }
                let p = (0..model.periods as usize)
                    .find(|&p| {
                        col(model.period_var[w][i as usize][p]).map_or(false, |v| v == 1)
                    })
                    .ok_or_else(|| {
                        Error::Encoding(format!("no period for team {} in week {}", i + 1, w + 1))
                    })?;
                let fixture = if col(model.home_var[w][i as usize])? == 1 {
                    Fixture::new(i + 1, j + 1)
                } else {
                    Fixture::new(j + 1, i + 1)
                };
                if rounds[w][p].is_some() {
                    return Err(Error::Encoding(format!(
                        "two fixtures decoded into week {} period {}",
                        w + 1,
                        p + 1
                    )));
                }
                rounds[w][p] = Some(fixture);
            }
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
    Ok(Schedule::new(n, rounds))
}

/// Outcome of driving a MILP engine over this formulation.
#[derive(Debug, Clone)]
pub struct MilpOutcome {
    pub status: RunStatus,
    pub schedule: Option<Schedule>,
    pub objective: Option<u32>,
}

/// One solve. The engine optimizes natively when the artifact carries
/// an objective; the objective value reported upward is always
/// recomputed from the decoded schedule.
pub fn solve<E: MilpEngine + ?Sized>(
    instance: &Instance,
    config: &RunConfig,
    engine: &E,
    params: &SolveParams,
) -> Result<MilpOutcome, Error> {
    let model = encode(instance, config);
    let outcome = engine.solve(&model.lp, params);
    match outcome {
        MilpResult::Optimal(assignment) => {
            let schedule = decode(&model, &assignment)?;
            let objective = config
                .optimize
                .then(|| canonical::objective_value(&schedule));
            Ok(MilpOutcome {
                status: if config.optimize {
                    RunStatus::Optimal
                } else {
                    RunStatus::Sat
                },
                schedule: Some(schedule),
                objective,
            })
        }
        MilpResult::Feasible(assignment) => {
            let schedule = decode(&model, &assignment)?;
            let objective = config
                .optimize
                .then(|| canonical::objective_value(&schedule));
            Ok(MilpOutcome {
                status: RunStatus::Sat,
                schedule: Some(schedule),
                objective,
            })
        }
        MilpResult::Infeasible => Ok(MilpOutcome {
            status: RunStatus::Unsat,
            schedule: None,
            objective: None,
        }),
        MilpResult::Unknown => Ok(MilpOutcome {
            status: RunStatus::Unknown,
            schedule: None,
            objective: None,
        }),
    }
}
