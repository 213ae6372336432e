//! Stage-by-stage orchestration
//!
//! Runs a pipeline's stages strictly in sequence, threading each stage's
//! output into the next stage's input, and stops at the first failure.
//!
//! ```text
//! NotStarted ──▶ Running(0) ──▶ Running(1) ──▶ … ──▶ Completed
//!                    │               │
//!                    ├─ reported failure ─▶ Failed
//!                    └─ transport/local error, cancel ─▶ Aborted
//! ```
//!
//! Every stage-level error is converted into a `StageTestResult`; only a
//! failure to fetch the stage list propagates to the caller.

use async_trait::async_trait;
use stagewise_common::{DataPayload, Stage};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::report::{ReportEvent, ReportSink};
use crate::result::{PipelineTestResult, RunOutcome, StageExecutionResult, StageTestResult};

/// Something that can list a pipeline's stages and run one of them.
///
/// Implemented by the HTTP client and by the UI-driven runner, so both
/// variants share one orchestration loop and one result contract.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    /// Called once after the stage list is fetched and before the first
    /// stage runs, with the initial data.
    async fn prepare(&self, _pipeline_id: &str, _initial_data: &DataPayload) -> E2eResult<()> {
        Ok(())
    }

    /// Stages in execution order.
    ///
    /// Backends that read stages from a rendered page open the pipeline here,
    /// so an empty list always means the pipeline itself has no stages.
    async fn pipeline_stages(&self, pipeline_id: &str) -> E2eResult<Vec<Stage>>;

    /// Run a single stage with `input_data`.
    ///
    /// A stage that ran and failed is `Ok` with `success = false`; `Err` means
    /// the stage could not be run at all.
    async fn run_stage(
        &self,
        pipeline_id: &str,
        stage: &Stage,
        input_data: &DataPayload,
    ) -> E2eResult<StageExecutionResult>;
}

/// Position of a run in its state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Running(usize),
    Completed,
    Failed,
    Aborted,
}

impl From<RunOutcome> for RunState {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Completed => RunState::Completed,
            RunOutcome::Failed => RunState::Failed,
            RunOutcome::Aborted => RunState::Aborted,
        }
    }
}

/// How a single stage attempt ended
enum StageAttempt {
    Passed(DataPayload),
    Failed,
    Aborted,
}

/// Drives one pipeline through its stages
pub struct StageByStageRunner<'a> {
    executor: &'a dyn StageExecutor,
    sink: Option<&'a dyn ReportSink>,
    cancel: Option<CancellationToken>,
}

impl<'a> StageByStageRunner<'a> {
    pub fn new(executor: &'a dyn StageExecutor) -> Self {
        Self {
            executor,
            sink: None,
            cancel: None,
        }
    }

    /// Send pass/fail events to `sink`
    pub fn with_sink(mut self, sink: &'a dyn ReportSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Stop the run (as Aborted) once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Run every stage of `pipeline_id`, starting from `initial_data`.
    ///
    /// Returns `Err` only when the stage list cannot be fetched.
    pub async fn test_pipeline_stage_by_stage(
        &self,
        pipeline_id: &str,
        initial_data: DataPayload,
    ) -> E2eResult<PipelineTestResult> {
        info!("Starting stage-by-stage testing for pipeline: {}", pipeline_id);
        let start = Instant::now();

        let stages = self.executor.pipeline_stages(pipeline_id).await.map_err(|e| {
            error!("Could not fetch stages for pipeline {}: {}", pipeline_id, e);
            e
        })?;

        self.emit(ReportEvent::PipelineStarted {
            pipeline_id: pipeline_id.to_string(),
            stage_count: stages.len(),
        });

        let mut run = PipelineTestResult::new(pipeline_id, initial_data.clone());

        if let Err(e) = self.executor.prepare(pipeline_id, &initial_data).await {
            warn!("Preparation of pipeline {} failed: {}", pipeline_id, e);
            run.error = Some(format!("Pipeline preparation failed: {}", e));
            return Ok(self.close(run, RunOutcome::Aborted, start));
        }

        let mut current_data = initial_data;
        let mut state = RunState::NotStarted;
        let mut outcome = RunOutcome::Completed;

        for (index, stage) in stages.iter().enumerate() {
            if self.is_cancelled() {
                warn!("Run of pipeline {} cancelled before stage {}", pipeline_id, stage.name);
                run.error = Some(format!("Run cancelled before stage '{}'", stage.name));
                outcome = RunOutcome::Aborted;
                break;
            }

            debug!("{:?} -> {:?}", state, RunState::Running(index));
            state = RunState::Running(index);
            info!("Testing stage {}/{}: {} ({})", index + 1, stages.len(), stage.name, stage.stage_type);

            let (entry, attempt) = self.attempt_stage(pipeline_id, stage, &current_data).await;
            run.record_stage(entry);

            match attempt {
                StageAttempt::Passed(output) => current_data = output,
                StageAttempt::Failed => {
                    outcome = RunOutcome::Failed;
                    break;
                }
                StageAttempt::Aborted => {
                    outcome = RunOutcome::Aborted;
                    break;
                }
            }
        }

        debug!("{:?} -> {:?}", state, RunState::from(outcome));
        run.final_data = current_data;
        Ok(self.close(run, outcome, start))
    }

    /// Run one stage, looked up by name, against `input_data`.
    ///
    /// The result holds exactly one entry. An unknown stage name is
    /// `NotFound`.
    pub async fn test_single_stage(
        &self,
        pipeline_id: &str,
        stage_name: &str,
        input_data: DataPayload,
    ) -> E2eResult<PipelineTestResult> {
        let start = Instant::now();
        let stages = self.executor.pipeline_stages(pipeline_id).await?;
        let stage = stages
            .iter()
            .find(|s| s.name == stage_name)
            .ok_or_else(|| E2eError::not_found("stage", stage_name))?;

        info!("Testing stage {} of pipeline {} individually", stage.name, pipeline_id);
        let mut run = PipelineTestResult::new(pipeline_id, input_data.clone());

        if let Err(e) = self.executor.prepare(pipeline_id, &input_data).await {
            warn!("Preparation of pipeline {} failed: {}", pipeline_id, e);
            run.error = Some(format!("Pipeline preparation failed: {}", e));
            return Ok(self.close(run, RunOutcome::Aborted, start));
        }

        let (entry, attempt) = self.attempt_stage(pipeline_id, stage, &input_data).await;
        run.record_stage(entry);

        let outcome = match attempt {
            StageAttempt::Passed(output) => {
                run.final_data = output;
                RunOutcome::Completed
            }
            StageAttempt::Failed => RunOutcome::Failed,
            StageAttempt::Aborted => RunOutcome::Aborted,
        };
        Ok(self.close(run, outcome, start))
    }

    async fn attempt_stage(
        &self,
        pipeline_id: &str,
        stage: &Stage,
        input_data: &DataPayload,
    ) -> (StageTestResult, StageAttempt) {
        let started = Instant::now();
        let mut entry = StageTestResult::new(stage);

        let execution = match &self.cancel {
            Some(token) => {
                tokio::select! {
                    result = self.executor.run_stage(pipeline_id, stage, input_data) => Some(result),
                    _ = token.cancelled() => None,
                }
            }
            None => Some(self.executor.run_stage(pipeline_id, stage, input_data).await),
        };
        entry.duration_ms = started.elapsed().as_millis() as u64;

        let attempt = match execution {
            Some(Ok(result)) if result.is_successful() => {
                entry.output_data = Some(result.output_data.clone());
                let output = result.output_data.clone();
                entry.execution = Some(result);
                StageAttempt::Passed(output)
            }
            Some(Ok(result)) => {
                let reported = result.error.clone().unwrap_or_default();
                warn!("Stage {} reported failure: {}", stage.name, reported);
                entry.error = Some(format!("Stage execution failed: {}", reported));
                entry.execution = Some(result);
                StageAttempt::Failed
            }
            Some(Err(e)) => {
                error!("Error testing stage {}: {}", stage.name, e);
                entry.error = Some(format!("Exception during stage testing: {}", e));
                StageAttempt::Aborted
            }
            None => {
                warn!("Run cancelled while stage {} was executing", stage.name);
                entry.error = Some(format!("Run cancelled while stage '{}' was executing", stage.name));
                StageAttempt::Aborted
            }
        };

        match &attempt {
            StageAttempt::Passed(_) => self.emit(ReportEvent::StagePassed {
                pipeline_id: pipeline_id.to_string(),
                stage_name: stage.name.clone(),
                duration_ms: entry.duration_ms,
                record_count: entry.record_count(),
            }),
            StageAttempt::Failed | StageAttempt::Aborted => self.emit(ReportEvent::StageFailed {
                pipeline_id: pipeline_id.to_string(),
                stage_name: stage.name.clone(),
                error: entry.error.clone().unwrap_or_default(),
            }),
        }

        (entry, attempt)
    }

    fn close(&self, mut run: PipelineTestResult, outcome: RunOutcome, start: Instant) -> PipelineTestResult {
        run.finish(outcome, start.elapsed().as_millis() as u64);
        info!(
            "Stage-by-stage testing completed for pipeline: {}. Outcome: {}, success: {}",
            run.pipeline_id, run.outcome, run.overall_success
        );
        self.emit(ReportEvent::PipelineFinished {
            pipeline_id: run.pipeline_id.clone(),
            outcome: run.outcome,
            overall_success: run.overall_success,
        });
        run
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map(CancellationToken::is_cancelled).unwrap_or(false)
    }

    fn emit(&self, event: ReportEvent) {
        if let Some(sink) = self.sink {
            sink.record(&event);
        }
    }
}
