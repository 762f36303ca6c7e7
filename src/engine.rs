//! Shared solving-API types.
//!
//! Solver engines are external collaborators consumed through the
//! per-paradigm traits (`CpEngine`, `SatEngine`, `SmtEngine`,
//! `MilpEngine`). This module holds the pieces those traits share: the
//! wall-clock deadline every engine must honor and the traversal
//! parameters that steer (but never restrict) the search.

use std::time::{Duration, Instant};

use crate::models::SearchStrategy;

/// A wall-clock deadline. Engines poll it at search nodes and give up
/// with an Unknown outcome once it has passed; the harness treats any
/// work past the deadline as timeout regardless.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    end: Instant,
}

impl Deadline {
    /// Deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self {
            end: Instant::now() + budget,
        }
    }

    /// Whether the deadline has passed.
    #[inline]
    pub fn expired(&self) -> bool {
        Instant::now() >= self.end
    }

    /// Time left, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.end.saturating_duration_since(Instant::now())
    }
}

/// Traversal parameters handed to an engine alongside the artifact.
///
/// Only the deadline bounds the engine; strategy and seed reorder its
/// exploration and must never change which outcomes are reachable.
#[derive(Debug, Clone, Copy)]
pub struct SolveParams {
    pub strategy: SearchStrategy,
    /// Seed for the Random strategy, fixed per run for reproducibility.
    pub seed: u64,
    pub deadline: Deadline,
}

impl SolveParams {
    pub fn new(strategy: SearchStrategy, deadline: Deadline) -> Self {
        Self {
            strategy,
            seed: 0x5754_5301,
            deadline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_expiry() {
        let d = Deadline::after(Duration::from_secs(60));
        assert!(!d.expired());
        assert!(d.remaining() > Duration::from_secs(50));

        let d = Deadline::after(Duration::ZERO);
        assert!(d.expired());
        assert_eq!(d.remaining(), Duration::ZERO);
    }
}
