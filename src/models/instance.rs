//! Problem instance model.
//!
//! An instance of the tournament scheduling problem is fully determined
//! by the number of teams. Weeks and periods are derived, not stored
//! redundantly, so an `Instance` can never hold inconsistent parameters.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A single-round-robin tournament instance.
///
/// `n` teams (identified `1..=n`) play every other team exactly once
/// over `n - 1` weeks. Each week is divided into `n / 2` periods and
/// every period hosts exactly one fixture.
///
/// # Example
/// ```
/// use sts_sched::models::Instance;
///
/// let inst = Instance::new(6).unwrap();
/// assert_eq!(inst.weeks(), 5);
/// assert_eq!(inst.periods(), 3);
/// assert_eq!(inst.fixture_count(), 15);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    n: u32,
}

impl Instance {
    /// Creates an instance for `n` teams.
    ///
    /// # Errors
    /// Returns [`Error::InvalidInstance`] unless `n` is even and `n >= 2`.
    pub fn new(n: u32) -> Result<Self, Error> {
        if n < 2 || n % 2 != 0 {
            return Err(Error::InvalidInstance(n));
        }
        Ok(Self { n })
    }

    /// Number of teams.
    #[inline]
    pub fn teams(&self) -> u32 {
        self.n
    }

    /// Number of weeks in the tournament (`n - 1`).
    #[inline]
    pub fn weeks(&self) -> u32 {
        self.n - 1
    }

    /// Number of periods per week (`n / 2`).
    #[inline]
    pub fn periods(&self) -> u32 {
        self.n / 2
    }

    /// Total number of fixtures (`n * (n - 1) / 2`).
    #[inline]
    pub fn fixture_count(&self) -> u32 {
        self.n * (self.n - 1) / 2
    }

    /// Iterates over team identifiers `1..=n`.
    pub fn team_ids(&self) -> impl Iterator<Item = u32> {
        1..=self.n
    }
}
