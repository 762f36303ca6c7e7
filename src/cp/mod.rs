//! CP formulation.
//!
//! Decision scheme: one pair variable per (week, period) slot selecting
//! which unordered team pair plays there, plus one orientation flag per
//! slot (`flip` — whether the lower-numbered team plays away). Because
//! the slot grid has exactly `n(n-1)/2` cells, "all pair variables
//! distinct" is equivalent to round-robin completeness.
//!
//! The artifact is a structured constraint list, not engine syntax;
//! a [`CpEngine`](engine::CpEngine) lowers it to its native form
//! (table/alldifferent/element constraints for MiniZinc-style engines).

pub mod engine;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::models::{Fixture, Instance, RunConfig, Schedule};

/// Constraints of the CP artifact, mirroring the canonical model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpConstraint {
    /// Slot pair variables form a bijection with the set of team pairs.
    AllDifferentPairs,
    /// Within each week, the chosen pairs partition the teams.
    TeamOncePerWeek,
    /// No team appears in one period in more than `cap` weeks.
    PeriodBalance { cap: u32 },
    /// Symmetry anchor: fix a slot to a pair, lower team at home.
    FixSlot { week: u32, period: u32, pair: u32 },
    /// Symmetry anchor: `team`'s opponent strictly increases by week.
    OpponentOrder { team: u32 },
}

/// The CP solver artifact for one instance + configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpModel {
    pub n: u32,
    pub weeks: u32,
    pub periods: u32,
    /// Unordered team pairs (0-based), indexed by the pair variables.
    pub pairs: Vec<(u32, u32)>,
    pub constraints: Vec<CpConstraint>,
    /// Minimize the maximum home/away imbalance.
    pub minimize: bool,
}

/// A satisfying assignment of the CP variable scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpAssignment {
    /// `pair_at[week][period]` — index into [`CpModel::pairs`].
    pub pair_at: Vec<Vec<usize>>,
    /// `flip[week][period]` — true if the lower-numbered team is away.
    pub flip: Vec<Vec<bool>>,
}

/// Index of pair `(i, j)`, `i < j`, 0-based teams, in lexicographic order.
pub(crate) fn pair_index(i: u32, j: u32, n: u32) -> usize {
    debug_assert!(i < j && j < n);
    // Pairs (0,1)..(0,n-1), (1,2)..: offset of block i plus j.
    (i * (2 * n - i - 1) / 2 + (j - i - 1)) as usize
}

fn all_pairs(n: u32) -> Vec<(u32, u32)> {
    let mut pairs = Vec::with_capacity((n * (n - 1) / 2) as usize);
    for i in 0..n {
        for j in (i + 1)..n {
            pairs.push((i, j));
        }
    }
    pairs
}

/// Builds the CP artifact. Pure: depends only on the instance and the
/// configuration flags (strategy is a solve-time parameter).
pub fn encode(instance: &Instance, config: &RunConfig) -> CpModel {
    let mut constraints = vec![
        CpConstraint::AllDifferentPairs,
        CpConstraint::TeamOncePerWeek,
        CpConstraint::PeriodBalance {
            cap: crate::canonical::period_cap(instance),
        },
    ];
    if config.symmetry {
        constraints.push(CpConstraint::FixSlot {
            week: 0,
            period: 0,
            pair: pair_index(0, 1, instance.teams()) as u32,
        });
        constraints.push(CpConstraint::OpponentOrder { team: 0 });
    }
    CpModel {
        n: instance.teams(),
        weeks: instance.weeks(),
        periods: instance.periods(),
        pairs: all_pairs(instance.teams()),
        constraints,
        minimize: config.optimize,
    }
}

/// Decodes a satisfying assignment back into a canonical `Schedule`.
///
/// Total over the variable scheme: every slot holds a pair index and an
/// orientation, so every assignment maps to a full fixture grid.
pub fn decode(model: &CpModel, assignment: &CpAssignment) -> Result<Schedule, Error> {
    let mut rounds = Vec::with_capacity(model.weeks as usize);
    for w in 0..model.weeks as usize {
        let mut row = Vec::with_capacity(model.periods as usize);
        for p in 0..model.periods as usize {
            let k = *assignment
                .pair_at
                .get(w)
                .and_then(|r| r.get(p))
                .ok_or_else(|| Error::Encoding(format!("missing slot ({w}, {p})")))?;
            let &(i, j) = model
                .pairs
                .get(k)
                .ok_or_else(|| Error::Encoding(format!("pair index {k} out of range")))?;
            let (home, away) = if assignment.flip[w][p] {
                (j + 1, i + 1)
            } else {
                (i + 1, j + 1)
            };
            row.push(Fixture::new(home, away));
        }
        rounds.push(row);
    }
    Ok(Schedule::new(model.n, rounds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Engine, Paradigm};

    fn config() -> RunConfig {
        RunConfig::new(Paradigm::Cp, Engine::Gecode)
    }

    #[test]
    fn test_pair_index_lexicographic() {
        let n = 6;
        let pairs = all_pairs(n);
        for (k, &(i, j)) in pairs.iter().enumerate() {
            assert_eq!(pair_index(i, j, n), k);
        }
    }

    #[test]
    fn test_encode_base() {
        let inst = Instance::new(6).unwrap();
        let model = encode(&inst, &config());
        assert_eq!(model.pairs.len(), 15);
        assert_eq!(model.constraints.len(), 3);
        assert!(!model.minimize);
    }

    #[test]
    fn test_encode_symmetry_adds_anchors() {
        let inst = Instance::new(6).unwrap();
        let model = encode(&inst, &config().with_symmetry(true));
        assert!(model
            .constraints
            .contains(&CpConstraint::FixSlot { week: 0, period: 0, pair: 0 }));
        assert!(model
            .constraints
            .contains(&CpConstraint::OpponentOrder { team: 0 }));
    }

    #[test]
    fn test_decode_total() {
        let inst = Instance::new(4).unwrap();
        let model = encode(&inst, &config());
        // pairs for n=4: (0,1) (0,2) (0,3) (1,2) (1,3) (2,3)
        let assignment = CpAssignment {
            pair_at: vec![vec![0, 5], vec![1, 4], vec![2, 3]],
            flip: vec![vec![false, false], vec![true, false], vec![false, false]],
        };
        let schedule = decode(&model, &assignment).unwrap();
        assert_eq!(schedule.rounds[0][0], Fixture::new(1, 2));
        assert_eq!(schedule.rounds[1][0], Fixture::new(3, 1)); // flipped
        // Complete round robin with each team once per week; only the
        // period-balance cap can be violated at n=4.
        let v = crate::canonical::violations(&inst, &schedule);
        assert!(v
            .iter()
            .all(|v| v.kind == crate::canonical::ViolationKind::PeriodBalance));
    }

    #[test]
    fn test_decode_rejects_bad_pair_index() {
        let inst = Instance::new(4).unwrap();
        let model = encode(&inst, &config());
        let assignment = CpAssignment {
            pair_at: vec![vec![0, 99], vec![1, 4], vec![2, 3]],
            flip: vec![vec![false; 2]; 3],
        };
        assert!(matches!(
            decode(&model, &assignment),
            Err(Error::Encoding(_))
        ));
    }
}
