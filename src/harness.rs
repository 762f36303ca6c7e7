//! Solve harness.
//!
//! Owns the run lifecycle: build the instance, encode, hand the
//! artifact to the paradigm's engine under a wall-clock deadline,
//! normalize the outcome to a [`RunStatus`], decode and re-derive the
//! objective, and persist exactly one record per configuration key.
//! An engine crash degrades to an Unknown record with a diagnostic;
//! it never aborts a batch.
//!
//! Engines are injectable so a binding to a real external solver can
//! replace the reference engines without touching the lifecycle.

use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::canonical;
use crate::cp::{self, engine::CpEngine, engine::RefCpEngine};
use crate::engine::{Deadline, SolveParams};
use crate::error::Error;
use crate::milp::{self, engine::MilpEngine, engine::RefMilpEngine};
use crate::models::{
    catalog, default_sweep_instances, Instance, Paradigm, RunConfig, RunRecord, RunStatus,
    Schedule,
};
use crate::sat::{self, engine::DpllEngine, engine::SatEngine};
use crate::smt::{self, engine::RefSmtEngine, engine::SmtEngine};
use crate::store::ResultStore;

/// The solve harness: engines plus the store records land in.
pub struct Harness {
    store: ResultStore,
    cp: Box<dyn CpEngine>,
    sat: Box<dyn SatEngine>,
    smt: Box<dyn SmtEngine>,
    milp: Box<dyn MilpEngine>,
}

impl Harness {
    /// Harness over the in-crate reference engines.
    pub fn new(store: ResultStore) -> Self {
        Self {
            store,
            cp: Box::new(RefCpEngine::new()),
            sat: Box::new(DpllEngine::new()),
            smt: Box::new(RefSmtEngine::new()),
            milp: Box::new(RefMilpEngine::new()),
        }
    }

    pub fn with_cp_engine(mut self, engine: impl CpEngine + 'static) -> Self {
        self.cp = Box::new(engine);
        self
    }

    pub fn with_sat_engine(mut self, engine: impl SatEngine + 'static) -> Self {
        self.sat = Box::new(engine);
        self
    }

    pub fn with_smt_engine(mut self, engine: impl SmtEngine + 'static) -> Self {
        self.smt = Box::new(engine);
        self
    }

    pub fn with_milp_engine(mut self, engine: impl MilpEngine + 'static) -> Self {
        self.milp = Box::new(engine);
        self
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Runs one configuration against one instance size and persists
    /// the record. Encoding bugs and engine panics degrade to an
    /// Unknown record; only instance validation and store I/O are Errs.
    pub fn run(&self, n: u32, config: &RunConfig) -> Result<RunRecord, Error> {
        let instance = Instance::new(n)?;
        let budget = Duration::from_secs(config.budget_secs);
        let params = SolveParams::new(config.strategy, Deadline::after(budget));
        let start = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.dispatch(&instance, config, &params)
        }));
        let elapsed = start.elapsed().as_secs_f64().min(budget.as_secs_f64());

        let record = match outcome {
            Ok(Ok((status, schedule))) => {
                let mut record = RunRecord::empty(config, n, status, elapsed);
                if let Some(schedule) = schedule {
                    if config.optimize {
                        // The objective on record is always re-derived
                        // from the schedule, never trusted from the
                        // engine.
                        record = record.with_objective(canonical::objective_value(&schedule));
                    }
                    record = record.with_schedule(schedule);
                }
                record
            }
            Ok(Err(err)) => {
                warn!(n, signature = %config.signature(), %err, "run degraded");
                RunRecord::empty(config, n, RunStatus::Unknown, elapsed)
                    .with_diagnostic(err.to_string())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(n, signature = %config.signature(), message, "engine panicked");
                RunRecord::empty(config, n, RunStatus::Unknown, elapsed)
                    .with_diagnostic(format!("engine panicked: {message}"))
            }
        };
        info!(
            n,
            signature = %record.signature,
            status = ?record.status,
            elapsed = record.elapsed_secs,
            "run finished"
        );
        self.store.put(&record)?;
        Ok(record)
    }

    /// Runs every configuration against every instance size,
    /// sequentially. An invalid instance size is fatal to the whole
    /// batch; a store failure on one run is logged and skipped.
    pub fn run_batch(
        &self,
        instances: &[u32],
        configs: &[RunConfig],
    ) -> Result<Vec<RunRecord>, Error> {
        let mut records = Vec::new();
        for &n in instances {
            for config in configs {
                match self.run(n, config) {
                    Ok(record) => records.push(record),
                    Err(err @ Error::InvalidInstance(_)) => return Err(err),
                    Err(err) => {
                        warn!(n, signature = %config.signature(), %err, "run skipped");
                    }
                }
            }
        }
        Ok(records)
    }

    /// Automatic mode: the paradigm's full catalog over its default
    /// instance sizes.
    pub fn sweep(&self, paradigm: Paradigm) -> Result<Vec<RunRecord>, Error> {
        self.run_batch(default_sweep_instances(paradigm), &catalog(paradigm))
    }

    fn dispatch(
        &self,
        instance: &Instance,
        config: &RunConfig,
        params: &SolveParams,
    ) -> Result<(RunStatus, Option<Schedule>), Error> {
        match config.paradigm {
            Paradigm::Cp => {
                let model = cp::encode(instance, config);
                let out = self.cp.solve(&model, params);
                let schedule = match (&out.assignment, out.status.has_solution()) {
                    (Some(assignment), true) => Some(cp::decode(&model, assignment)?),
                    _ => None,
                };
                Ok((out.status, schedule))
            }
            Paradigm::Sat => {
                let out = if config.optimize {
                    sat::optimize(instance, config, self.sat.as_ref(), params)?
                } else {
                    sat::solve(instance, config, self.sat.as_ref(), params)?
                };
                Ok((out.status, out.schedule))
            }
            Paradigm::Smt => {
                let out = if config.optimize {
                    smt::optimize(instance, config, self.smt.as_ref(), params)?
                } else {
                    smt::solve(instance, config, self.smt.as_ref(), params)?
                };
                Ok((out.status, out.schedule))
            }
            Paradigm::Milp => {
                let out = milp::solve(instance, config, self.milp.as_ref(), params)?;
                Ok((out.status, out.schedule))
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unrecognized panic payload"
    }
}
