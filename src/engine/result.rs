//! Execution result types
//!
//! Results move through `pending → running → {success | failed | timeout}`
//! or directly `pending → skipped`. The transitions are encoded as types:
//! a [`PendingExecution`] can only be started or skipped, and only a
//! [`RunningExecution`] can produce a success, failure or timeout. A
//! finished [`ExecutionResult`] has no way back.

use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::definition::ParamMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
    Timeout,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Success
                | ExecutionStatus::Failed
                | ExecutionStatus::Skipped
                | ExecutionStatus::Timeout
        )
    }

    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Skipped)
                | (Running, Success)
                | (Running, Failed)
                | (Running, Timeout)
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Skipped => "skipped",
            ExecutionStatus::Timeout => "timeout",
        };
        write!(f, "{}", s)
    }
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Outcome of one script, component or test-case run
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    /// True for success and skipped
    pub success: bool,
    pub output: Value,
    pub error: Option<String>,
    #[serde(serialize_with = "serialize_secs")]
    pub duration: Duration,
    pub output_variables: ParamMap,
    /// Number of attempts made (0 when skipped)
    pub attempts: u32,
}

impl ExecutionResult {
    /// Failed or timed out
    pub fn is_failure(&self) -> bool {
        matches!(
            self.status,
            ExecutionStatus::Failed | ExecutionStatus::Timeout
        )
    }

    pub fn is_skipped(&self) -> bool {
        self.status == ExecutionStatus::Skipped
    }

    pub(crate) fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    fn finished(status: ExecutionStatus, duration: Duration) -> Self {
        debug_assert!(status.is_terminal());
        Self {
            status,
            success: matches!(status, ExecutionStatus::Success | ExecutionStatus::Skipped),
            output: Value::Null,
            error: None,
            duration,
            output_variables: ParamMap::new(),
            attempts: 0,
        }
    }
}

/// An execution that has not started yet
#[derive(Debug, Default)]
pub struct PendingExecution;

impl PendingExecution {
    pub fn new() -> Self {
        Self
    }

    pub fn start(self) -> RunningExecution {
        RunningExecution {
            started: Instant::now(),
        }
    }

    pub fn skip(self, reason: impl Into<String>) -> ExecutionResult {
        let mut result = ExecutionResult::finished(ExecutionStatus::Skipped, Duration::ZERO);
        result.output = Value::String(reason.into());
        result
    }
}

/// An execution in flight; its duration runs from `start` to the final transition
#[derive(Debug)]
pub struct RunningExecution {
    started: Instant,
}

impl RunningExecution {
    /// An execution that has been running since `started`
    pub(crate) fn since(started: Instant) -> Self {
        Self { started }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn succeed(self, output: Value, output_variables: ParamMap) -> ExecutionResult {
        let mut result = ExecutionResult::finished(ExecutionStatus::Success, self.elapsed());
        result.output = output;
        result.output_variables = output_variables;
        result
    }

    pub fn fail(self, error: impl Into<String>) -> ExecutionResult {
        self.fail_with_output(Value::Null, error)
    }

    pub fn fail_with_output(self, output: Value, error: impl Into<String>) -> ExecutionResult {
        let mut result = ExecutionResult::finished(ExecutionStatus::Failed, self.elapsed());
        result.output = output;
        result.error = Some(error.into());
        result
    }

    pub fn time_out(self, message: impl Into<String>) -> ExecutionResult {
        let mut result = ExecutionResult::finished(ExecutionStatus::Timeout, self.elapsed());
        result.error = Some(message.into());
        result
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Script,
    Component,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepKind::Script => write!(f, "script"),
            StepKind::Component => write!(f, "component"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    #[serde(rename = "type")]
    pub kind: StepKind,
    pub id: String,
    pub name: String,
    pub result: ExecutionResult,
}

/// Append-only execution history shared by one test-case run
///
/// Cloning yields another handle to the same history, so entries recorded by
/// a step survive even if the enclosing component is cut off by a timeout.
#[derive(Debug, Clone, Default)]
pub struct ExecutionHistory {
    entries: Arc<Mutex<Vec<HistoryEntry>>>,
}

impl ExecutionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: HistoryEntry) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Step counts and total duration of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionSummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub timeout: usize,
    #[serde(serialize_with = "serialize_secs")]
    pub duration: Duration,
}

impl ExecutionSummary {
    pub fn from_entries(entries: &[HistoryEntry], duration: Duration) -> Self {
        let mut summary = Self {
            total: entries.len(),
            duration,
            ..Self::default()
        };
        for entry in entries {
            match entry.result.status {
                ExecutionStatus::Success => summary.success += 1,
                ExecutionStatus::Failed => summary.failed += 1,
                ExecutionStatus::Skipped => summary.skipped += 1,
                ExecutionStatus::Timeout => summary.timeout += 1,
                ExecutionStatus::Pending | ExecutionStatus::Running => {}
            }
        }
        summary
    }
}

impl fmt::Display for ExecutionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} steps: {} passed, {} failed, {} timed out, {} skipped ({:.2}s)",
            self.total,
            self.success,
            self.failed,
            self.timeout,
            self.skipped,
            self.duration.as_secs_f64()
        )
    }
}

/// Everything a run returns: the overall result plus its history
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub id: String,
    pub name: String,
    pub environment: String,
    pub result: ExecutionResult,
    pub history: Vec<HistoryEntry>,
    pub summary: ExecutionSummary,
}

impl ExecutionReport {
    pub fn success(&self) -> bool {
        self.result.success
    }
}
