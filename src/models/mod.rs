//! Domain models for tournament scheduling.
//!
//! - `Instance` — problem parameters (`n` teams, derived weeks/periods)
//! - `Schedule` / `Fixture` — a candidate solution
//! - `RunConfig` and the configuration catalog
//! - `RunRecord` / `RunStatus` — the solver-agnostic result schema

mod config;
mod instance;
mod record;
mod schedule;

pub use config::{
    catalog, default_sweep_instances, AmoFamily, Engine, Paradigm, RunConfig, SearchStrategy,
    DEFAULT_BUDGET_SECS,
};
pub use instance::Instance;
pub use record::{RunRecord, RunStatus};
pub use schedule::{Fixture, Schedule};
