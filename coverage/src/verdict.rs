//! Reduction of test outcomes to verdicts.
//!
//! Precedence, first match wins:
//! 1. any of Aborted, Failed, Error, Blocked, Timeout → [`Verdict::Failed`]
//! 2. any of Warning, Inconclusive, NotExecuted, None → [`Verdict::Inconclusive`]
//! 3. otherwise (only Passed) → [`Verdict::Passed`]

use crate::error::{CoverageError, CoverageResult};
use backend::Outcome;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered by severity: `Passed < Inconclusive < Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Verdict {
    Passed,
    Inconclusive,
    Failed,
}

impl Verdict {
    pub fn of(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Aborted
            | Outcome::Failed
            | Outcome::Error
            | Outcome::Blocked
            | Outcome::Timeout => Verdict::Failed,
            Outcome::Warning | Outcome::Inconclusive | Outcome::NotExecuted | Outcome::None => {
                Verdict::Inconclusive
            }
            Outcome::Passed => Verdict::Passed,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Verdict::Passed => "Passed",
            Verdict::Inconclusive => "Inconclusive",
            Verdict::Failed => "Failed",
        };
        f.write_str(label)
    }
}

/// Verdict for one test case over every outcome recorded for it.
pub fn evaluate<I>(outcomes: I) -> CoverageResult<Verdict>
where
    I: IntoIterator<Item = Outcome>,
{
    outcomes
        .into_iter()
        .map(Verdict::of)
        .max()
        .ok_or_else(|| CoverageError::invariant("verdict requested for an empty outcome set"))
}

/// Requirement verdict over the per-test-case verdicts.
pub fn rollup<I>(verdicts: I) -> CoverageResult<Verdict>
where
    I: IntoIterator<Item = Verdict>,
{
    verdicts
        .into_iter()
        .max()
        .ok_or_else(|| CoverageError::invariant("rollup requested for an empty verdict set"))
}
