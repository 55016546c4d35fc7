//! Segment and ride outcome records.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a segment during and after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Running,
    Success,
    Failure,
    /// Counts as non-failure for dependent propagation.
    Skipped,
    /// A distinguished failure.
    TimedOut,
}

impl Status {
    /// `RunResult.success == true` iff no segment has one of these statuses
    /// (spec §7/§8 invariant 4).
    pub fn is_failure(self) -> bool {
        matches!(self, Status::Failure | Status::TimedOut)
    }
}

/// Outcome of a single segment's execution within a ride.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentResult {
    pub name: String,
    pub status: Status,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub attempts: u32,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    /// Captured text, already masked by the secret registry.
    pub output: String,
}

/// Aggregated outcome of a `Scheduler::run` invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub results: HashMap<String, SegmentResult>,
    pub success: bool,
    pub duration_ms: u64,
}

impl RunResult {
    pub fn empty() -> Self {
        Self {
            results: HashMap::new(),
            success: true,
            duration_ms: 0,
        }
    }

    /// Recompute `success` from the current result set (spec §7:
    /// `RunResult.success` is true iff no segment has status `Failure`,
    /// `TimedOut`, or `Cancelled` — `Cancelled` is recorded as an
    /// `error_kind` on an otherwise `Failure`/`TimedOut`/`Skipped` status,
    /// so only the three `Status` variants are checked directly here).
    pub fn recompute_success(&mut self) {
        self.success = !self.results.values().any(|r| r.status.is_failure());
    }

    pub fn count(&self, status: Status) -> usize {
        self.results.values().filter(|r| r.status == status).count()
    }

    pub fn passed_count(&self) -> usize {
        self.count(Status::Success)
    }

    pub fn failed_count(&self) -> usize {
        self.count(Status::Failure) + self.count(Status::TimedOut)
    }

    pub fn skipped_count(&self) -> usize {
        self.count(Status::Skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, status: Status) -> SegmentResult {
        SegmentResult {
            name: name.to_string(),
            status,
            started_at: Utc::now(),
            duration_ms: 0,
            attempts: 1,
            error_kind: None,
            error_message: None,
            output: String::new(),
        }
    }

    #[test]
    fn empty_run_result_is_success() {
        let run = RunResult::empty();
        assert!(run.success);
        assert_eq!(run.results.len(), 0);
    }

    #[test]
    fn recompute_success_false_on_failure() {
        let mut run = RunResult::empty();
        run.results
            .insert("a".into(), result("a", Status::Failure));
        run.recompute_success();
        assert!(!run.success);
    }

    #[test]
    fn recompute_success_true_when_only_skipped() {
        let mut run = RunResult::empty();
        run.results
            .insert("a".into(), result("a", Status::Skipped));
        run.results
            .insert("b".into(), result("b", Status::Success));
        run.recompute_success();
        assert!(run.success);
    }

    #[test]
    fn timed_out_counts_as_failure() {
        let mut run = RunResult::empty();
        run.results
            .insert("a".into(), result("a", Status::TimedOut));
        run.recompute_success();
        assert!(!run.success);
        assert_eq!(run.failed_count(), 1);
    }
}
