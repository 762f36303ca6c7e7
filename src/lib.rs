//! Sports tournament scheduling across four solving paradigms.
//!
//! Models the single round robin timetabling problem: `n` teams (even),
//! `n - 1` weeks, `n / 2` periods per week, every pair meeting exactly
//! once, no team playing twice in a week, and no team appearing in the
//! same period more often than the balance cap allows. The optimization
//! variant minimizes the worst home/away imbalance over all teams.
//!
//! The same canonical model is encoded four ways and handed to a
//! per-paradigm engine behind a trait seam:
//!
//! - [`cp`] — finite-domain constraint model with propagation
//! - [`sat`] — CNF in DIMACS-style literals, with selectable
//!   at-most-one families
//! - [`smt`] — integer/boolean term assertions over bounded domains
//! - [`milp`] — 0/1 columns with linear rows and a native objective
//!
//! Around the encoders sit the run lifecycle pieces: [`harness`] drives
//! configured runs under a wall-clock budget, [`store`] persists one
//! record per configuration key, and [`checker`] re-derives every
//! verdict independently of the encoders.
//!
//! ```no_run
//! use sts_sched::harness::Harness;
//! use sts_sched::models::{Engine, Paradigm, RunConfig};
//! use sts_sched::store::ResultStore;
//!
//! # fn main() -> Result<(), sts_sched::Error> {
//! let store = ResultStore::open("results")?;
//! let harness = Harness::new(store);
//! let cfg = RunConfig::new(Paradigm::Cp, Engine::Gecode).with_symmetry(true);
//! let record = harness.run(8, &cfg)?;
//! println!("{:?}", record.status);
//! # Ok(())
//! # }
//! ```

pub mod canonical;
pub mod checker;
pub mod cp;
pub mod engine;
pub mod error;
pub mod harness;
pub mod milp;
pub mod models;
pub mod sat;
pub mod smt;
pub mod store;

pub use error::Error;
pub use harness::Harness;
pub use models::{Instance, RunConfig, RunRecord, RunStatus, Schedule};
pub use store::ResultStore;
