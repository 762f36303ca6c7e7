//! Schedule (solution) model.
//!
//! A schedule is a total assignment of fixtures to (week, period) slots.
//! Validity is *not* enforced by construction — the canonical model and
//! the checker judge that — so encoders can decode raw solver output
//! into a `Schedule` and hand it over for independent verification.

use serde::{Deserialize, Serialize};

/// One fixture: `home` hosts `away`. Teams are identified `1..=n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fixture {
    pub home: u32,
    pub away: u32,
}

impl Fixture {
    /// Creates a fixture.
    pub fn new(home: u32, away: u32) -> Self {
        Self { home, away }
    }

    /// The unordered pair `(min, max)` of the two teams.
    #[inline]
    pub fn pair(&self) -> (u32, u32) {
        if self.home < self.away {
            (self.home, self.away)
        } else {
            (self.away, self.home)
        }
    }

    /// Whether `team` takes part in this fixture.
    #[inline]
    pub fn involves(&self, team: u32) -> bool {
        self.home == team || self.away == team
    }
}

/// A complete tournament schedule: `rounds[week][period]` is the fixture
/// played in that slot. Weeks and periods are 0-indexed internally;
/// reports use 1-based labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Number of teams this schedule is for.
    pub n: u32,
    /// Week-major fixture grid.
    pub rounds: Vec<Vec<Fixture>>,
}

impl Schedule {
    /// Creates a schedule from a week-major fixture grid.
    pub fn new(n: u32, rounds: Vec<Vec<Fixture>>) -> Self {
        Self { n, rounds }
    }

    /// Number of weeks actually present.
    pub fn weeks(&self) -> usize {
        self.rounds.len()
    }

    /// Number of periods in the given week, or 0 if out of range.
    pub fn periods_in_week(&self, week: usize) -> usize {
        self.rounds.get(week).map_or(0, Vec::len)
    }

    /// Iterates `(week, period, fixture)` over all slots.
    pub fn slots(&self) -> impl Iterator<Item = (usize, usize, &Fixture)> {
        self.rounds
            .iter()
            .enumerate()
            .flat_map(|(w, row)| row.iter().enumerate().map(move |(p, f)| (w, p, f)))
    }

    /// Number of weeks in which `team` plays at home.
    pub fn home_count(&self, team: u32) -> u32 {
        self.slots().filter(|(_, _, f)| f.home == team).count() as u32
    }

    /// Number of weeks in which `team` plays away.
    pub fn away_count(&self, team: u32) -> u32 {
        self.slots().filter(|(_, _, f)| f.away == team).count() as u32
    }

    /// Home/away imbalance of one team: `|home_count - away_count|`.
    pub fn imbalance(&self, team: u32) -> u32 {
        self.home_count(team).abs_diff(self.away_count(team))
    }

    /// Maximum home/away imbalance over all teams — the optimization
    /// objective. Zero for an empty schedule.
    pub fn max_imbalance(&self) -> u32 {
        (1..=self.n).map(|t| self.imbalance(t)).max().unwrap_or(0)
    }

    /// The fixture of `team` in `week`, if exactly one exists.
    pub fn fixture_of(&self, week: usize, team: u32) -> Option<&Fixture> {
        let row = self.rounds.get(week)?;
        let mut found = None;
        for f in row {
            if f.involves(team) {
                if found.is_some() {
                    return None;
                }
                found = Some(f);
            }
        }
        found
    }
}
