//! Per-item results and batch summaries for the pipeline stages.

use std::fmt;

/// What happened to one item in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Succeeded,
    Skipped(String),
    Failed(String),
}

impl ItemOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped(reason.into())
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed(error.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Counts for one batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn record(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Succeeded => self.succeeded += 1,
            ItemOutcome::Skipped(_) => self.skipped += 1,
            ItemOutcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn merge(&mut self, other: BatchReport) {
        self.succeeded += other.succeeded;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl<'a> FromIterator<&'a ItemOutcome> for BatchReport {
    fn from_iter<I: IntoIterator<Item = &'a ItemOutcome>>(iter: I) -> Self {
        let mut report = BatchReport::default();
        for outcome in iter {
            report.record(outcome);
        }
        report
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} succeeded, {} skipped, {} failed",
            self.succeeded, self.skipped, self.failed
        )
    }
}
