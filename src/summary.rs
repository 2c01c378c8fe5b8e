//! Run-level tallies.

use serde::{Deserialize, Serialize};

use crate::processor::{IdentifierStatus, RowOutcome};

/// Final counters for one run.
///
/// `sent + skipped + missing_file` need not equal `processed`: one row can
/// carry several identifiers, and dry-run sends count toward nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub processed: usize,
    pub sent: usize,
    pub skipped: usize,
    pub missing_file: usize,
}

/// Purely additive fold over row outcomes.
#[derive(Debug, Default)]
pub struct RunAggregator {
    tally: RunSummary,
}

impl RunAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one processed row and everything it produced.
    pub fn record(&mut self, outcome: &RowOutcome) {
        self.tally.processed += 1;
        match outcome {
            RowOutcome::Skipped(_) => self.tally.skipped += 1,
            RowOutcome::Dispatched(results) => {
                for result in results {
                    match result.status {
                        IdentifierStatus::Sent { .. } => self.tally.sent += 1,
                        IdentifierStatus::MissingFile => self.tally.missing_file += 1,
                        IdentifierStatus::SendFailed { .. } => self.tally.skipped += 1,
                        IdentifierStatus::DryRun { .. } => {}
                    }
                }
            }
        }
    }

    /// Current counts, without ending the run.
    pub fn snapshot(&self) -> RunSummary {
        self.tally
    }

    /// Consume the aggregator and return the final tally.
    pub fn finish(self) -> RunSummary {
        self.tally
    }
}
