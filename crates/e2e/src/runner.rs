//! Scenario runner: loads YAML scenarios and drives stage-by-stage runs

use serde::{Deserialize, Serialize};
use stagewise_common::HarnessConfig;
use std::path::PathBuf;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::browser::BrowserSession;
use crate::client::ApiClient;
use crate::error::{E2eError, E2eResult};
use crate::orchestrator::{StageByStageRunner, StageExecutor};
use crate::report::ReportSink;
use crate::result::PipelineTestResult;
use crate::scenario::{Scenario, ScenarioMode};
use crate::ui::UiStageExecutor;

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub pipeline_id: String,
    pub mode: ScenarioMode,
    pub success: bool,
    pub duration_ms: u64,
    /// Absent when the run never started
    pub run: Option<PipelineTestResult>,
    /// Unmet expectations
    pub failures: Vec<String>,
    /// Why the run could not start
    pub error: Option<String>,
}

impl ScenarioResult {
    fn not_run(scenario: &Scenario, error: String, duration_ms: u64) -> Self {
        Self {
            name: scenario.name.clone(),
            pipeline_id: scenario.pipeline_id.clone(),
            mode: scenario.mode,
            success: false,
            duration_ms,
            run: None,
            failures: Vec::new(),
            error: Some(error),
        }
    }

    pub fn stage_count(&self) -> usize {
        self.run.as_ref().map(|r| r.stage_results.len()).unwrap_or(0)
    }

    /// First line worth showing for a failed scenario
    pub fn summary(&self) -> Option<String> {
        self.error.clone().or_else(|| self.failures.first().cloned())
    }
}

/// Result of running a set of scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<ScenarioResult>,
}

/// Runs scenarios against one API client and, optionally, one browser session
pub struct ScenarioRunner<'a> {
    config: &'a HarnessConfig,
    client: &'a ApiClient,
    session: Option<&'a dyn BrowserSession>,
    sink: Option<&'a dyn ReportSink>,
    cancel: Option<CancellationToken>,
    scenarios_dir: PathBuf,
}

impl<'a> ScenarioRunner<'a> {
    pub fn new(config: &'a HarnessConfig, client: &'a ApiClient) -> Self {
        Self {
            config,
            client,
            session: None,
            sink: None,
            cancel: None,
            scenarios_dir: config.paths.scenarios.clone(),
        }
    }

    /// Enable UI-mode scenarios. The session must already be signed in.
    pub fn with_session(mut self, session: &'a dyn BrowserSession) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_sink(mut self, sink: &'a dyn ReportSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_scenarios_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scenarios_dir = dir.into();
        self
    }

    /// Run every scenario in the scenarios directory
    pub async fn run_all(&self) -> E2eResult<SuiteResult> {
        let scenarios = Scenario::load_all(&self.scenarios_dir)?;
        Ok(self.run_scenarios(&scenarios).await)
    }

    /// Run the scenarios with a given name
    pub async fn run_named(&self, name: &str) -> E2eResult<SuiteResult> {
        let selected: Vec<Scenario> = Scenario::load_all(&self.scenarios_dir)?
            .into_iter()
            .filter(|s| s.name == name)
            .collect();
        if selected.is_empty() {
            return Err(E2eError::not_found("scenario", name));
        }
        Ok(self.run_scenarios(&selected).await)
    }

    /// Run a list of scenarios in order
    pub async fn run_scenarios(&self, scenarios: &[Scenario]) -> SuiteResult {
        let start = Instant::now();
        let mut results = Vec::with_capacity(scenarios.len());

        info!("Running {} scenario(s)...", scenarios.len());

        for scenario in scenarios {
            let result = self.run_scenario(scenario).await;
            if result.success {
                info!("✓ {} ({} ms)", result.name, result.duration_ms);
            } else {
                error!(
                    "✗ {} - {}",
                    result.name,
                    result.summary().as_deref().unwrap_or("unknown error")
                );
            }
            results.push(result);
        }

        let passed = results.iter().filter(|r| r.success).count();
        let failed = results.len() - passed;
        let duration_ms = start.elapsed().as_millis() as u64;

        info!("Scenario results: {} passed, {} failed ({} ms)", passed, failed, duration_ms);

        SuiteResult {
            total: results.len(),
            passed,
            failed,
            duration_ms,
            results,
        }
    }

    /// Run a single scenario. Never fails; problems end up in the result.
    pub async fn run_scenario(&self, scenario: &Scenario) -> ScenarioResult {
        let start = Instant::now();
        debug!("Running scenario: {}", scenario.name);

        if let Err(e) = self.client.get_pipeline(&scenario.pipeline_id).await {
            return ScenarioResult::not_run(scenario, e.to_string(), start.elapsed().as_millis() as u64);
        }

        let input = match scenario.input.resolve(&self.config.paths.test_data) {
            Ok(input) => input,
            Err(e) => {
                return ScenarioResult::not_run(
                    scenario,
                    format!("could not build input: {}", e),
                    start.elapsed().as_millis() as u64,
                );
            }
        };

        let outcome = match scenario.mode {
            ScenarioMode::Api => self.execute(self.client, &scenario.pipeline_id, input).await,
            ScenarioMode::Ui => match self.session {
                Some(session) => {
                    let mut executor =
                        UiStageExecutor::new(session, &self.config.locators, &self.config.browser);
                    if let Some(sink) = self.sink {
                        executor = executor.with_sink(sink);
                    }
                    self.execute(&executor, &scenario.pipeline_id, input).await
                }
                None => Err(E2eError::Playwright(
                    "UI scenario requires a browser session (run with --ui)".to_string(),
                )),
            },
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(run) => {
                let failures = scenario.expect.evaluate(&run);
                ScenarioResult {
                    name: scenario.name.clone(),
                    pipeline_id: scenario.pipeline_id.clone(),
                    mode: scenario.mode,
                    success: failures.is_empty(),
                    duration_ms,
                    run: Some(run),
                    failures,
                    error: None,
                }
            }
            Err(e) => ScenarioResult::not_run(scenario, e.to_string(), duration_ms),
        }
    }

    async fn execute(
        &self,
        executor: &dyn StageExecutor,
        pipeline_id: &str,
        input: stagewise_common::DataPayload,
    ) -> E2eResult<PipelineTestResult> {
        let mut runner = StageByStageRunner::new(executor);
        if let Some(sink) = self.sink {
            runner = runner.with_sink(sink);
        }
        if let Some(token) = &self.cancel {
            runner = runner.with_cancellation(token.clone());
        }
        runner.test_pipeline_stage_by_stage(pipeline_id, input).await
    }

    /// Write suite results to `scenario-results.json` in the reports directory
    pub fn write_results(&self, results: &SuiteResult) -> E2eResult<PathBuf> {
        let dir = &self.config.paths.reports;
        std::fs::create_dir_all(dir)?;

        let path = dir.join("scenario-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}
