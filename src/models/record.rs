//! Result record model — the solver-agnostic result schema.

use serde::{Deserialize, Serialize};

use super::{Paradigm, RunConfig, Schedule};

/// Terminal outcome of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// A feasible (not proven optimal) schedule was found.
    Sat,
    /// The instance was proven infeasible.
    Unsat,
    /// A schedule was found and proven optimal.
    Optimal,
    /// Timeout, engine crash, or solver-reported unknown.
    Unknown,
}

impl RunStatus {
    /// Whether this status comes with a schedule.
    pub fn has_solution(&self) -> bool {
        matches!(self, RunStatus::Sat | RunStatus::Optimal)
    }
}

/// One persisted result, keyed by `(paradigm, n, signature)`.
///
/// Every run — successful or not — yields exactly one record.
/// Re-running the same key overwrites the record in place. The checker
/// only ever reads records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub paradigm: Paradigm,
    pub n: u32,
    pub signature: String,
    pub status: RunStatus,
    /// Wall-clock seconds, clamped to the budget.
    pub elapsed_secs: f64,
    /// Objective value (max home/away imbalance), when optimizing.
    pub objective: Option<u32>,
    /// Decoded schedule, when one was found.
    pub schedule: Option<Schedule>,
    /// Failure detail for degraded outcomes.
    pub diagnostic: Option<String>,
}

impl RunRecord {
    /// Creates a record for a run that produced no schedule.
    pub fn empty(config: &RunConfig, n: u32, status: RunStatus, elapsed_secs: f64) -> Self {
        Self {
            paradigm: config.paradigm,
            n,
            signature: config.signature(),
            status,
            elapsed_secs,
            objective: None,
            schedule: None,
            diagnostic: None,
        }
    }

    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    pub fn with_objective(mut self, objective: u32) -> Self {
        self.objective = Some(objective);
        self
    }

    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostic = Some(diagnostic.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Engine;

    #[test]
    fn test_record_builders() {
        let cfg = RunConfig::new(Paradigm::Smt, Engine::Z3).with_optimize(true);
        let rec = RunRecord::empty(&cfg, 6, RunStatus::Unknown, 300.0)
            .with_diagnostic("engine crashed");
        assert_eq!(rec.signature, cfg.signature());
        assert_eq!(rec.status, RunStatus::Unknown);
        assert!(rec.schedule.is_none());
        assert_eq!(rec.diagnostic.as_deref(), Some("engine crashed"));
    }

    #[test]
    fn test_status_has_solution() {
        assert!(RunStatus::Sat.has_solution());
        assert!(RunStatus::Optimal.has_solution());
        assert!(!RunStatus::Unsat.has_solution());
        assert!(!RunStatus::Unknown.has_solution());
    }

    #[test]
    fn test_record_serde_roundtrip() {
        let cfg = RunConfig::new(Paradigm::Cp, Engine::Gecode);
        let rec = RunRecord::empty(&cfg, 4, RunStatus::Sat, 0.1);
        let json = serde_json::to_string(&rec).unwrap();
        let back: RunRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rec);
    }
}
