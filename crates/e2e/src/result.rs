//! Per-stage and per-pipeline test results

use serde::{Deserialize, Serialize};
use serde_json::Value;
use stagewise_common::{DataPayload, Stage, StageType};
use tracing::warn;

/// Outcome of running one stage once, as reported by the executor.
///
/// `error` is present iff `success` is false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageExecutionResult {
    pub success: bool,
    pub output_data: DataPayload,
    pub error: Option<String>,
}

impl StageExecutionResult {
    pub fn success(output_data: DataPayload) -> Self {
        Self {
            success: true,
            output_data,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>, output_data: DataPayload) -> Self {
        Self {
            success: false,
            output_data,
            error: Some(error.into()),
        }
    }

    pub fn is_successful(&self) -> bool {
        self.success
    }
}

/// One stage's entry in a pipeline test run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTestResult {
    pub stage_id: String,
    pub stage_name: String,
    pub stage_type: StageType,
    pub execution: Option<StageExecutionResult>,
    /// Data propagated to the next stage (set only on success)
    pub output_data: Option<DataPayload>,
    /// Failure message: either the reported business failure or a local error
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl StageTestResult {
    pub fn new(stage: &Stage) -> Self {
        Self {
            stage_id: stage.id.clone(),
            stage_name: stage.name.clone(),
            stage_type: stage.stage_type,
            execution: None,
            output_data: None,
            error: None,
            duration_ms: 0,
        }
    }

    /// No local error, and an execution result that reported success
    pub fn is_successful(&self) -> bool {
        self.error.is_none()
            && self
                .execution
                .as_ref()
                .map(StageExecutionResult::is_successful)
                .unwrap_or(false)
    }

    /// Record count of the propagated output, if it carries one.
    ///
    /// Understands a `records` array (API payloads) and a numeric
    /// `recordCount` (UI-read counts).
    pub fn record_count(&self) -> Option<u64> {
        let data = self.output_data.as_ref()?;
        match data.get("records") {
            Some(Value::Array(records)) => Some(records.len() as u64),
            _ => data
                .get("recordCount")
                .or_else(|| data.get("record_count"))
                .and_then(Value::as_u64),
        }
    }
}

/// Terminal state of a stage-by-stage run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every stage ran and reported success
    Completed,
    /// A stage reported a business failure
    Failed,
    /// A stage could not be executed, or the run was stopped before it ended
    Aborted,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Completed => write!(f, "completed"),
            RunOutcome::Failed => write!(f, "failed"),
            RunOutcome::Aborted => write!(f, "aborted"),
        }
    }
}

/// Aggregate result of one stage-by-stage run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineTestResult {
    pub pipeline_id: String,
    /// Execution order; a strict prefix of the stage list when the run halted
    pub stage_results: Vec<StageTestResult>,
    pub overall_success: bool,
    pub error: Option<String>,
    pub outcome: RunOutcome,
    /// Data context after the last successful stage
    pub final_data: DataPayload,
    pub duration_ms: u64,
}

impl PipelineTestResult {
    pub(crate) fn new(pipeline_id: &str, initial_data: DataPayload) -> Self {
        Self {
            pipeline_id: pipeline_id.to_string(),
            stage_results: Vec::new(),
            overall_success: false,
            error: None,
            outcome: RunOutcome::Aborted,
            final_data: initial_data,
            duration_ms: 0,
        }
    }

    /// Append a stage entry. Entries after the first failure are refused.
    pub(crate) fn record_stage(&mut self, result: StageTestResult) -> bool {
        if self.first_failure().is_some() {
            warn!(
                "Refusing result for stage {} after an earlier failure",
                result.stage_name
            );
            return false;
        }
        self.stage_results.push(result);
        true
    }

    /// Close the run. Overall success is the AND of every recorded stage and
    /// is never true when a top-level error was set.
    pub(crate) fn finish(&mut self, outcome: RunOutcome, duration_ms: u64) {
        self.outcome = outcome;
        self.duration_ms = duration_ms;
        self.overall_success =
            self.error.is_none() && self.stage_results.iter().all(StageTestResult::is_successful);
    }

    pub fn first_failure(&self) -> Option<&StageTestResult> {
        self.stage_results.iter().find(|r| !r.is_successful())
    }

    pub fn stage_result(&self, stage_name: &str) -> Option<&StageTestResult> {
        self.stage_results.iter().find(|r| r.stage_name == stage_name)
    }

    /// Sum of per-stage record counts; stages without a count contribute 0
    pub fn total_records_processed(&self) -> u64 {
        self.stage_results.iter().filter_map(StageTestResult::record_count).sum()
    }

    /// Stage name and record count, in execution order
    pub fn data_flow(&self) -> Vec<(String, Option<u64>)> {
        self.stage_results
            .iter()
            .map(|r| (r.stage_name.clone(), r.record_count()))
            .collect()
    }

    /// The error to surface first: the failing stage's, else the top-level one
    pub fn failure_message(&self) -> Option<String> {
        self.first_failure()
            .and_then(|r| r.error.clone())
            .or_else(|| self.error.clone())
    }
}
