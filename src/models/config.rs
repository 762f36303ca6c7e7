//! Run configuration model.
//!
//! A `RunConfig` identifies one (paradigm, engine, options) combination.
//! Catalogs are generated as Cartesian products of the option enums
//! rather than hand-listed indices, so the configuration space has no
//! magic numbers and every combination carries a stable signature used
//! as the result-store key.

use serde::{Deserialize, Serialize};

/// The four modeling paradigms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Paradigm {
    Cp,
    Sat,
    Smt,
    Milp,
}

impl Paradigm {
    /// Lowercase label used in signatures and store paths.
    pub fn label(&self) -> &'static str {
        match self {
            Paradigm::Cp => "cp",
            Paradigm::Sat => "sat",
            Paradigm::Smt => "smt",
            Paradigm::Milp => "milp",
        }
    }
}

/// External solver engines, by name.
///
/// Engines are consumed through the per-paradigm solving-API traits;
/// the name is a catalog label that becomes part of the configuration
/// signature, so results from different engines never collide in the
/// store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Engine {
    // CP
    Chuffed,
    Gecode,
    OrTools,
    // SAT / SMT
    Z3,
    // MILP
    Cbc,
    Scip,
    Highs,
}

impl Engine {
    pub fn label(&self) -> &'static str {
        match self {
            Engine::Chuffed => "chuffed",
            Engine::Gecode => "gecode",
            Engine::OrTools => "or_tools",
            Engine::Z3 => "z3",
            Engine::Cbc => "cbc",
            Engine::Scip => "scip",
            Engine::Highs => "highs",
        }
    }
}

/// Search strategy hint passed to the engine.
///
/// Strategies only steer traversal order; they never change the
/// constraint set, so feasibility and the optimum are strategy-invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchStrategy {
    /// Engine default (static variable/value order).
    Base,
    /// First-fail: branch on the most constrained slot first.
    FirstFail,
    /// Randomized value order from a fixed seed (deterministic per run).
    Random,
}

impl SearchStrategy {
    pub fn label(&self) -> &'static str {
        match self {
            SearchStrategy::Base => "base",
            SearchStrategy::FirstFail => "ff",
            SearchStrategy::Random => "rand",
        }
    }
}

/// At-most-one clause family for the SAT encoding.
///
/// Changes clause count and propagation strength, never semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AmoFamily {
    /// Naive pairwise: one binary clause per literal pair.
    Pairwise,
    /// Sequential (ladder) encoding with commander-style registers,
    /// after Sinz (2005).
    Sequential,
}

impl AmoFamily {
    pub fn label(&self) -> &'static str {
        match self {
            AmoFamily::Pairwise => "pw",
            AmoFamily::Sequential => "seq",
        }
    }
}

/// Default wall-clock budget per run, in seconds (automatic-mode sweeps).
pub const DEFAULT_BUDGET_SECS: u64 = 300;

/// One run configuration: paradigm, engine, and solve options.
///
/// # Example
/// ```
/// use sts_sched::models::{Engine, Paradigm, RunConfig};
///
/// let cfg = RunConfig::new(Paradigm::Cp, Engine::Gecode)
///     .with_symmetry(true)
///     .with_optimize(true);
/// assert_eq!(cfg.signature(), "gecode_optimization_base_sb");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub paradigm: Paradigm,
    pub engine: Engine,
    pub strategy: SearchStrategy,
    /// SAT only; ignored by the other paradigms.
    pub amo: AmoFamily,
    pub symmetry: bool,
    pub optimize: bool,
    pub budget_secs: u64,
}

impl RunConfig {
    /// Creates a satisfiability configuration with default options.
    pub fn new(paradigm: Paradigm, engine: Engine) -> Self {
        Self {
            paradigm,
            engine,
            strategy: SearchStrategy::Base,
            amo: AmoFamily::Sequential,
            symmetry: false,
            optimize: false,
            budget_secs: DEFAULT_BUDGET_SECS,
        }
    }

    pub fn with_strategy(mut self, strategy: SearchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_amo(mut self, amo: AmoFamily) -> Self {
        self.amo = amo;
        self
    }

    pub fn with_symmetry(mut self, symmetry: bool) -> Self {
        self.symmetry = symmetry;
        self
    }

    pub fn with_optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    pub fn with_budget_secs(mut self, secs: u64) -> Self {
        self.budget_secs = secs;
        self
    }

    /// Stable configuration signature, the store key within a
    /// `(paradigm, n)` group. The time budget is deliberately excluded:
    /// re-running the same configuration with a different budget
    /// overwrites the same record.
    pub fn signature(&self) -> String {
        let mode = if self.optimize {
            "optimization"
        } else {
            "satisfiability"
        };
        let mut sig = format!("{}_{}_{}", self.engine.label(), mode, self.strategy.label());
        if self.paradigm == Paradigm::Sat {
            sig.push('_');
            sig.push_str(self.amo.label());
        }
        if self.symmetry {
            sig.push_str("_sb");
        }
        sig
    }
}

/// The full configuration catalog for one paradigm, as a Cartesian
/// product of that paradigm's option space.
pub fn catalog(paradigm: Paradigm) -> Vec<RunConfig> {
    let flags = [false, true];
    let mut out = Vec::new();
    match paradigm {
        Paradigm::Cp => {
            for engine in [Engine::Chuffed, Engine::Gecode, Engine::OrTools] {
                for strategy in [
                    SearchStrategy::Base,
                    SearchStrategy::FirstFail,
                    SearchStrategy::Random,
                ] {
                    for symmetry in flags {
                        for optimize in flags {
                            out.push(
                                RunConfig::new(paradigm, engine)
                                    .with_strategy(strategy)
                                    .with_symmetry(symmetry)
                                    .with_optimize(optimize),
                            );
                        }
                    }
                }
            }
        }
        Paradigm::Sat => {
            for amo in [AmoFamily::Pairwise, AmoFamily::Sequential] {
                for symmetry in flags {
                    for optimize in flags {
                        out.push(
                            RunConfig::new(paradigm, Engine::Z3)
                                .with_amo(amo)
                                .with_symmetry(symmetry)
                                .with_optimize(optimize),
                        );
                    }
                }
            }
        }
        Paradigm::Smt => {
            for symmetry in flags {
                for optimize in flags {
                    out.push(
                        RunConfig::new(paradigm, Engine::Z3)
                            .with_symmetry(symmetry)
                            .with_optimize(optimize),
                    );
                }
            }
        }
        Paradigm::Milp => {
            for engine in [Engine::Cbc, Engine::Scip, Engine::Highs] {
                for symmetry in flags {
                    for optimize in flags {
                        out.push(
                            RunConfig::new(paradigm, engine)
                                .with_symmetry(symmetry)
                                .with_optimize(optimize),
                        );
                    }
                }
            }
        }
    }
    out
}

/// Default instance sets swept by automatic mode, per paradigm.
pub fn default_sweep_instances(paradigm: Paradigm) -> &'static [u32] {
    match paradigm {
        Paradigm::Cp => &[2, 4, 6, 8, 10, 12, 14],
        Paradigm::Milp => &[2, 4, 6, 8, 10],
        Paradigm::Sat | Paradigm::Smt => &[2, 4, 6, 8, 10, 12],
    }
}
