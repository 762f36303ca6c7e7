//! Canonical constraint model.
//!
//! The single, paradigm-independent statement of what a valid tournament
//! schedule is. Encoders translate these constraints into their native
//! form; the checker evaluates them directly on a decoded `Schedule`.
//! Nothing in this module knows which solver produced a schedule.
//!
//! Hard constraints:
//! 1. round-robin completeness — every unordered pair of teams meets
//!    exactly once over the whole schedule;
//! 2. weekly uniqueness — every team plays exactly once per week;
//! 3. period balance — every team appears in any given period in at
//!    most `ceil((n-1) / periods)` weeks.
//!
//! Optimization objective: minimize the maximum home/away imbalance
//! `max over teams |home_count - away_count|`.

use std::collections::HashMap;

use crate::models::{Instance, Schedule};

/// Categories of invariant violations, in checking order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// Wrong grid shape, team id out of range, or a team playing itself.
    Structural,
    /// A pair of teams meets zero times or more than once.
    Completeness,
    /// A team idle or double-booked within a week.
    WeeklyUniqueness,
    /// A team exceeding the per-period appearance cap.
    PeriodBalance,
}

/// One violated invariant, with enough location detail to point at the
/// encoder bug that caused it. Weeks, periods, and teams are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub kind: ViolationKind,
    pub week: Option<u32>,
    pub period: Option<u32>,
    pub team: Option<u32>,
    pub message: String,
}

impl Violation {
    fn new(kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            week: None,
            period: None,
            team: None,
            message: message.into(),
        }
    }

    fn at_week(mut self, week: usize) -> Self {
        self.week = Some(week as u32 + 1);
        self
    }

    fn at_period(mut self, period: usize) -> Self {
        self.period = Some(period as u32 + 1);
        self
    }

    fn for_team(mut self, team: u32) -> Self {
        self.team = Some(team);
        self
    }
}

/// The canonical period-balance bound: a team may appear in any single
/// period in at most `ceil((n-1) / periods)` weeks. For `n >= 4` this
/// is 2; for `n = 2` it is 1.
pub fn period_cap(instance: &Instance) -> u32 {
    instance.weeks().div_ceil(instance.periods())
}

/// Evaluates every hard constraint and returns all violations found.
///
/// An empty result means the schedule is feasible. Checks run in a
/// fixed order (structural, completeness, weekly uniqueness, period
/// balance) so the first reported violation is deterministic.
pub fn violations(instance: &Instance, schedule: &Schedule) -> Vec<Violation> {
    let mut out = Vec::new();
    structural(instance, schedule, &mut out);
    if !out.is_empty() {
        // Counting checks on a malformed grid would only produce noise.
        return out;
    }
    completeness(instance, schedule, &mut out);
    weekly_uniqueness(instance, schedule, &mut out);
    period_balance(instance, schedule, &mut out);
    out
}

/// Whether the schedule satisfies every hard constraint.
pub fn is_feasible(instance: &Instance, schedule: &Schedule) -> bool {
    violations(instance, schedule).is_empty()
}

/// The optimization objective as a pure function of the schedule:
/// maximum home/away imbalance over all teams.
pub fn objective_value(schedule: &Schedule) -> u32 {
    schedule.max_imbalance()
}

fn structural(instance: &Instance, schedule: &Schedule, out: &mut Vec<Violation>) {
    let n = instance.teams();
    if schedule.n != n {
        out.push(Violation::new(
            ViolationKind::Structural,
            format!("schedule is for n={}, expected n={n}", schedule.n),
        ));
        return;
    }
    if schedule.weeks() != instance.weeks() as usize {
        out.push(Violation::new(
            ViolationKind::Structural,
            format!(
                "schedule has {} weeks, expected {}",
                schedule.weeks(),
                instance.weeks()
            ),
        ));
        return;
    }
    for (w, row) in schedule.rounds.iter().enumerate() {
        if row.len() != instance.periods() as usize {
            out.push(
                Violation::new(
                    ViolationKind::Structural,
                    format!(
                        "week {} has {} periods, expected {}",
                        w + 1,
                        row.len(),
                        instance.periods()
                    ),
                )
                .at_week(w),
            );
            continue;
        }
        for (p, f) in row.iter().enumerate() {
            if f.home < 1 || f.home > n || f.away < 1 || f.away > n {
                out.push(
                    Violation::new(
                        ViolationKind::Structural,
                        format!("fixture {} vs {} has a team outside 1..={n}", f.home, f.away),
                    )
                    .at_week(w)
                    .at_period(p),
                );
            } else if f.home == f.away {
                out.push(
                    Violation::new(
                        ViolationKind::Structural,
                        format!("team {} is scheduled against itself", f.home),
                    )
                    .at_week(w)
                    .at_period(p)
                    .for_team(f.home),
                );
            }
        }
    }
}

fn completeness(instance: &Instance, schedule: &Schedule, out: &mut Vec<Violation>) {
    let mut seen: HashMap<(u32, u32), Vec<usize>> = HashMap::new();
    for (w, _, f) in schedule.slots() {
        seen.entry(f.pair()).or_default().push(w);
    }
    let n = instance.teams();
    for i in 1..=n {
        for j in (i + 1)..=n {
            match seen.get(&(i, j)) {
                None => out.push(
                    Violation::new(
                        ViolationKind::Completeness,
                        format!("teams {i} and {j} never meet"),
                    )
                    .for_team(i),
                ),
                Some(weeks) if weeks.len() > 1 => out.push(
                    Violation::new(
                        ViolationKind::Completeness,
                        format!(
                            "teams {i} and {j} meet {} times (weeks {:?})",
                            weeks.len(),
                            weeks.iter().map(|w| w + 1).collect::<Vec<_>>()
                        ),
                    )
                    .at_week(weeks[1])
                    .for_team(i),
                ),
                _ => {}
            }
        }
    }
}

fn weekly_uniqueness(instance: &Instance, schedule: &Schedule, out: &mut Vec<Violation>) {
    for (w, row) in schedule.rounds.iter().enumerate() {
        let mut appearances: HashMap<u32, u32> = HashMap::new();
        for f in row {
            *appearances.entry(f.home).or_insert(0) += 1;
            *appearances.entry(f.away).or_insert(0) += 1;
        }
        for t in instance.team_ids() {
            match appearances.get(&t).copied().unwrap_or(0) {
                1 => {}
                0 => out.push(
                    Violation::new(
                        ViolationKind::WeeklyUniqueness,
                        format!("team {t} does not play in week {}", w + 1),
                    )
                    .at_week(w)
                    .for_team(t),
                ),
                k => out.push(
                    Violation::new(
                        ViolationKind::WeeklyUniqueness,
                        format!("team {t} plays {k} times in week {}", w + 1),
                    )
                    .at_week(w)
                    .for_team(t),
                ),
            }
        }
    }
}

fn period_balance(instance: &Instance, schedule: &Schedule, out: &mut Vec<Violation>) {
    let cap = period_cap(instance);
    let periods = instance.periods() as usize;
    // counts[team-1][period]
    let mut counts = vec![vec![0u32; periods]; instance.teams() as usize];
    for (_, p, f) in schedule.slots() {
        if p < periods {
            counts[f.home as usize - 1][p] += 1;
            counts[f.away as usize - 1][p] += 1;
        }
    }
    for t in instance.team_ids() {
        for p in 0..periods {
            let c = counts[t as usize - 1][p];
            if c > cap {
                out.push(
                    Violation::new(
                        ViolationKind::PeriodBalance,
                        format!(
                            "team {t} appears in period {} in {c} weeks (cap {cap})",
                            p + 1
                        ),
                    )
                    .at_period(p)
                    .for_team(t),
                );
            }
        }
    }
}

/// Whether a schedule satisfies the canonical symmetry-breaking
/// predicates: teams 1 and 2 meet in week 1 / period 1 with team 1 at
/// home, and team 1's opponent is strictly increasing across weeks.
///
/// These predicates are sound reductions over the symmetry group (team,
/// week, and period relabeling plus home/away swap): any feasible
/// schedule can be relabeled into one satisfying them, so adding them
/// never changes feasibility. Used by tests against symmetry-broken
/// solver output; never required for plain feasibility.
pub fn satisfies_symmetry_canon(schedule: &Schedule) -> bool {
    let first = match schedule.rounds.first().and_then(|row| row.first()) {
        Some(f) => *f,
        None => return false,
    };
    if first.home != 1 || first.away != 2 {
        return false;
    }
    let mut prev = 0;
    for w in 0..schedule.weeks() {
        let opp = match schedule.fixture_of(w, 1) {
            Some(f) => {
                if f.home == 1 {
                    f.away
                } else {
                    f.home
                }
            }
            None => return false,
        };
        if opp <= prev {
            return false;
        }
        prev = opp;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Fixture;

    // Structurally sound and round-robin complete, but period-stacked:
    // no n=4 schedule can meet the period cap (see test below), so this
    // sample exercises the counting checks, not full feasibility.
    fn sample_n4() -> Schedule {
        Schedule::new(
            4,
            vec![
                vec![Fixture::new(1, 2), Fixture::new(3, 4)],
                vec![Fixture::new(3, 1), Fixture::new(2, 4)],
                vec![Fixture::new(1, 4), Fixture::new(2, 3)],
            ],
        )
    }

    // Circle-method pairing for six teams with a period assignment that
    // keeps every team within the cap of 2.
    fn sample_n6() -> Schedule {
        Schedule::new(
            6,
            vec![
                vec![Fixture::new(1, 6), Fixture::new(2, 5), Fixture::new(3, 4)],
                vec![Fixture::new(4, 5), Fixture::new(3, 1), Fixture::new(2, 6)],
                vec![Fixture::new(2, 4), Fixture::new(3, 6), Fixture::new(5, 1)],
                vec![Fixture::new(5, 3), Fixture::new(6, 4), Fixture::new(1, 2)],
                vec![Fixture::new(2, 3), Fixture::new(1, 4), Fixture::new(6, 5)],
            ],
        )
    }

    #[test]
    fn test_period_cap() {
        assert_eq!(period_cap(&Instance::new(2).unwrap()), 1);
        assert_eq!(period_cap(&Instance::new(4).unwrap()), 2);
        assert_eq!(period_cap(&Instance::new(14).unwrap()), 2);
    }

    #[test]
    fn test_valid_schedule_feasible() {
        let inst = Instance::new(6).unwrap();
        let s = sample_n6();
        assert_eq!(violations(&inst, &s), vec![]);
        assert!(is_feasible(&inst, &s));
    }

    #[test]
    fn test_n4_sample_breaks_period_cap() {
        // The pairing is a complete round robin, yet team 1 sits in
        // period 1 all three weeks. Picking one pair per week for
        // period 1 always yields a team with 3 appearances or a team
        // with 0 (hence 3 in period 2), so this is not an artifact of
        // this particular sample.
        let inst = Instance::new(4).unwrap();
        let v = violations(&inst, &sample_n4());
        assert!(v.iter().all(|v| v.kind == ViolationKind::PeriodBalance));
        assert!(!v.is_empty());
    }

    #[test]
    fn test_objective_value() {
        let s = sample_n4();
        assert_eq!(objective_value(&s), 3); // team 4 is always away
        assert_eq!(objective_value(&sample_n6()), 3);
    }

    #[test]
    fn test_duplicate_pair_reported() {
        let inst = Instance::new(4).unwrap();
        let mut s = sample_n4();
        s.rounds[2][0] = Fixture::new(2, 1); // pair (1,2) twice, (1,4) never
        let v = violations(&inst, &s);
        assert!(v
            .iter()
            .any(|v| v.kind == ViolationKind::Completeness && v.message.contains("2 times")));
        assert!(v
            .iter()
            .any(|v| v.kind == ViolationKind::Completeness && v.message.contains("never meet")));
    }

    #[test]
    fn test_double_booked_team_cites_week_and_team() {
        let inst = Instance::new(4).unwrap();
        let mut s = sample_n4();
        s.rounds[0][1] = Fixture::new(1, 3); // team 1 twice in week 1
        let v = violations(&inst, &s);
        let dbl = v
            .iter()
            .find(|v| v.kind == ViolationKind::WeeklyUniqueness && v.team == Some(1))
            .expect("weekly uniqueness violation for team 1");
        assert_eq!(dbl.week, Some(1));
        // Team 4 lost its fixture and is now idle in week 1; team 2
        // still plays in (1, 2).
        assert!(v
            .iter()
            .any(|v| v.kind == ViolationKind::WeeklyUniqueness && v.team == Some(4)));
        assert!(!v
            .iter()
            .any(|v| v.kind == ViolationKind::WeeklyUniqueness && v.team == Some(2)));
    }

    #[test]
    fn test_period_balance_violation() {
        let inst = Instance::new(4).unwrap();
        // Valid pairing but all of team 1's fixtures stacked in period 1.
        let s = Schedule::new(
            4,
            vec![
                vec![Fixture::new(1, 2), Fixture::new(3, 4)],
                vec![Fixture::new(1, 3), Fixture::new(2, 4)],
                vec![Fixture::new(1, 4), Fixture::new(2, 3)],
            ],
        );
        let v = violations(&inst, &s);
        let pb = v
            .iter()
            .find(|v| v.kind == ViolationKind::PeriodBalance && v.team == Some(1))
            .expect("period balance violation for team 1");
        assert_eq!(pb.period, Some(1));
    }

    #[test]
    fn test_structural_rejects_self_play() {
        let inst = Instance::new(4).unwrap();
        let mut s = sample_n4();
        s.rounds[0][0] = Fixture::new(2, 2);
        let v = violations(&inst, &s);
        assert_eq!(v[0].kind, ViolationKind::Structural);
        assert_eq!(v[0].team, Some(2));
    }

    #[test]
    fn test_structural_rejects_wrong_shape() {
        let inst = Instance::new(6).unwrap();
        let s = sample_n4();
        let v = violations(&inst, &s);
        assert_eq!(v[0].kind, ViolationKind::Structural);
    }

    #[test]
    fn test_symmetry_canon() {
        // sample_n4: week opponents of team 1 are 2, 3, 4 — increasing,
        // and (1,2) opens week 1 period 1 with team 1 home.
        assert!(satisfies_symmetry_canon(&sample_n4()));

        let mut s = sample_n4();
        s.rounds[0][0] = Fixture::new(2, 1);
        assert!(!satisfies_symmetry_canon(&s));

        let mut s = sample_n4();
        s.rounds.swap(1, 2); // opponents 2, 4, 3 — not increasing
        assert!(!satisfies_symmetry_canon(&s));
    }
}
