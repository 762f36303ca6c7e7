//! Independent solution checker.
//!
//! Re-derives every verdict from first principles: it shares no code
//! with the encoders beyond the canonical constraint definitions, so a
//! bug in an encoding or decoding cannot vouch for itself. Reads
//! records and schedules, never mutates the store.

use tracing::warn;

use crate::canonical::{self, Violation};
use crate::error::Error;
use crate::models::{Instance, Paradigm, RunRecord, RunStatus};
use crate::store::ResultStore;

/// One checker finding. `Constraint` wraps a canonical violation; the
/// other kinds are record-level consistency failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckerViolation {
    Constraint(Violation),
    /// A Sat/Optimal record carries no schedule to check.
    MissingSchedule { status: RunStatus },
    /// Claimed objective differs from the recomputed one.
    ObjectiveMismatch { claimed: u32, recomputed: u32 },
    /// The record's `n` is not a valid instance.
    BadInstance { n: u32 },
}

/// Verdict for one record (or one bare schedule).
#[derive(Debug, Clone)]
pub struct CheckReport {
    pub paradigm: Option<Paradigm>,
    pub n: u32,
    pub signature: Option<String>,
    pub pass: bool,
    pub violations: Vec<CheckerViolation>,
}

impl CheckReport {
    /// The first finding, which by construction cites the earliest
    /// violated invariant in checking order.
    pub fn first(&self) -> Option<&CheckerViolation> {
        self.violations.first()
    }
}

/// Checks a bare schedule against the canonical constraints.
pub fn check_schedule(n: u32, schedule: &crate::models::Schedule) -> CheckReport {
    let violations = match Instance::new(n) {
        Ok(instance) => canonical::violations(&instance, schedule)
            .into_iter()
            .map(CheckerViolation::Constraint)
            .collect(),
        Err(_) => vec![CheckerViolation::BadInstance { n }],
    };
    CheckReport {
        paradigm: None,
        n,
        signature: None,
        pass: violations.is_empty(),
        violations,
    }
}

/// Checks one run record: schedule presence, canonical constraints,
/// and the claimed objective. Unsat/Unknown records pass vacuously.
pub fn check_record(record: &RunRecord) -> CheckReport {
    let mut violations = Vec::new();
    if record.status.has_solution() {
        match (&record.schedule, Instance::new(record.n)) {
            (_, Err(_)) => violations.push(CheckerViolation::BadInstance { n: record.n }),
            (None, Ok(_)) => violations.push(CheckerViolation::MissingSchedule {
                status: record.status,
            }),
            (Some(schedule), Ok(instance)) => {
                violations.extend(
                    canonical::violations(&instance, schedule)
                        .into_iter()
                        .map(CheckerViolation::Constraint),
                );
                if let Some(claimed) = record.objective {
                    let recomputed = canonical::objective_value(schedule);
                    if claimed != recomputed {
                        violations.push(CheckerViolation::ObjectiveMismatch {
                            claimed,
                            recomputed,
                        });
                    }
                }
            }
        }
    }
    if !violations.is_empty() {
        warn!(
            paradigm = record.paradigm.label(),
            n = record.n,
            signature = %record.signature,
            findings = violations.len(),
            "record failed checking"
        );
    }
    CheckReport {
        paradigm: Some(record.paradigm),
        n: record.n,
        signature: Some(record.signature.clone()),
        pass: violations.is_empty(),
        violations,
    }
}

/// Checks every stored record of one paradigm. Read-only: a failing
/// record is reported, never repaired or removed.
pub fn check_store(store: &ResultStore, paradigm: Paradigm) -> Result<Vec<CheckReport>, Error> {
    let mut reports = Vec::new();
    for n in store.instances(paradigm)? {
        for record in store.records(paradigm, n)?.values() {
            reports.push(check_record(record));
        }
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::ViolationKind;
    use crate::models::{Engine, Fixture, RunConfig, Schedule};

    fn feasible_n6() -> Schedule {
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

    fn sat_record(schedule: Schedule) -> RunRecord {
        let cfg = RunConfig::new(Paradigm::Cp, Engine::Gecode);
        RunRecord::empty(&cfg, 6, RunStatus::Sat, 0.2).with_schedule(schedule)
    }

    #[test]
    fn test_feasible_record_passes() {
        let report = check_record(&sat_record(feasible_n6()));
        assert!(report.pass);
        assert!(report.first().is_none());
    }

    #[test]
    fn test_injected_double_booking_cites_week_and_team() {
        let mut schedule = feasible_n6();
        // Team 1 now plays twice in week 1.
        schedule.rounds[0][1] = Fixture::new(1, 5);
        let report = check_record(&sat_record(schedule));
        assert!(!report.pass);
        let cited = report.violations.iter().find_map(|v| match v {
            CheckerViolation::Constraint(c)
                if c.kind == ViolationKind::WeeklyUniqueness && c.team == Some(1) =>
            {
                Some(c)
            }
            _ => None,
        });
        let cited = cited.expect("weekly uniqueness finding for team 1");
        assert_eq!(cited.week, Some(1));
    }

    #[test]
    fn test_objective_mismatch_detected() {
        let cfg = RunConfig::new(Paradigm::Cp, Engine::Gecode).with_optimize(true);
        let record = RunRecord::empty(&cfg, 6, RunStatus::Optimal, 0.2)
            .with_schedule(feasible_n6())
            .with_objective(1); // recomputes to 3
        let report = check_record(&record);
        assert_eq!(
            report.first(),
            Some(&CheckerViolation::ObjectiveMismatch {
                claimed: 1,
                recomputed: 3
            })
        );
    }

    #[test]
    fn test_sat_without_schedule_flagged() {
        let cfg = RunConfig::new(Paradigm::Smt, Engine::Z3);
        let record = RunRecord::empty(&cfg, 6, RunStatus::Sat, 0.2);
        let report = check_record(&record);
        assert_eq!(
            report.first(),
            Some(&CheckerViolation::MissingSchedule {
                status: RunStatus::Sat
            })
        );
    }

    #[test]
    fn test_unsat_record_passes_vacuously() {
        let cfg = RunConfig::new(Paradigm::Milp, Engine::Scip);
        let report = check_record(&RunRecord::empty(&cfg, 4, RunStatus::Unsat, 0.1));
        assert!(report.pass);
    }

    #[test]
    fn test_check_store_reports_every_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::open(dir.path()).unwrap();
        store.put(&sat_record(feasible_n6())).unwrap();
        let bad_cfg = RunConfig::new(Paradigm::Cp, Engine::Chuffed);
        store
            .put(&RunRecord::empty(&bad_cfg, 6, RunStatus::Sat, 0.1))
            .unwrap();

        let reports = check_store(&store, Paradigm::Cp).unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports.iter().filter(|r| r.pass).count(), 1);
        assert!(check_store(&store, Paradigm::Sat).unwrap().is_empty());
    }
}
