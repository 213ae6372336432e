//! UI-driven execution against an in-memory browser

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use stagewise_common::{ApiConfig, BrowserConfig, DataPayload, LocatorConfig, Stage, StageType};
use stagewise_e2e::{
    sign_in, BrowserSession, E2eError, E2eResult, JsonReport, PipelineTestResult, RunOutcome,
    StageByStageRunner, StageExecutionResult, StageExecutor, UiStageExecutor,
};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

struct FakeStage {
    name: &'static str,
    type_label: &'static str,
    /// Status texts returned by successive polls; the last one repeats
    statuses: Vec<&'static str>,
    record_text: Option<&'static str>,
}

#[derive(Default)]
struct FakeState {
    navigated: Vec<String>,
    typed: HashMap<String, String>,
    clicks: Vec<String>,
    polls: HashMap<usize, usize>,
    screenshots: Vec<String>,
}

impl FakeState {
    /// The canvas only exists once a pipeline page is open
    fn on_pipeline_page(&self) -> bool {
        self.navigated
            .last()
            .map(|page| page.starts_with("/pipelines/"))
            .unwrap_or(false)
    }
}

struct FakeBrowser {
    locators: LocatorConfig,
    stages: Vec<FakeStage>,
    missing: HashSet<String>,
    state: Mutex<FakeState>,
}

impl FakeBrowser {
    fn new(stages: Vec<FakeStage>) -> Self {
        Self {
            locators: LocatorConfig::default(),
            stages,
            missing: HashSet::new(),
            state: Mutex::new(FakeState::default()),
        }
    }

    fn without(mut self, selector: String) -> Self {
        self.missing.insert(selector);
        self
    }

    /// Index of the stage a selector points into, honouring `>> nth=N`
    fn stage_for(&self, selector: &str) -> Option<usize> {
        let stage = self
            .stages
            .iter()
            .find(|s| selector.starts_with(&self.locators.stage(s.name)))?;
        let rest = &selector[self.locators.stage(stage.name).len()..];
        let nth = rest
            .strip_prefix(" >> nth=")
            .and_then(|r| r.split(' ').next())
            .and_then(|n| n.parse::<usize>().ok())
            .unwrap_or(0);
        self.stages
            .iter()
            .enumerate()
            .filter(|(_, s)| s.name == stage.name)
            .nth(nth)
            .map(|(index, _)| index)
    }
}

#[async_trait]
impl BrowserSession for FakeBrowser {
    async fn navigate(&self, path: &str) -> E2eResult<()> {
        self.state.lock().navigated.push(path.to_string());
        Ok(())
    }

    async fn wait_visible(&self, selector: &str, _timeout: Duration) -> E2eResult<bool> {
        if selector == self.locators.pipeline_canvas && !self.state.lock().on_pipeline_page() {
            return Ok(false);
        }
        Ok(!self.missing.contains(selector))
    }

    async fn click(&self, selector: &str, _timeout: Duration) -> E2eResult<bool> {
        if self.missing.contains(selector) {
            return Ok(false);
        }
        self.state.lock().clicks.push(selector.to_string());
        Ok(true)
    }

    async fn type_text(&self, selector: &str, text: &str) -> E2eResult<bool> {
        if self.missing.contains(selector) {
            return Ok(false);
        }
        self.state.lock().typed.insert(selector.to_string(), text.to_string());
        Ok(true)
    }

    async fn get_text(&self, selector: &str) -> E2eResult<Option<String>> {
        let Some(index) = self.stage_for(selector) else {
            return Ok(None);
        };
        let stage = &self.stages[index];
        let mut state = self.state.lock();
        if !state.on_pipeline_page() {
            return Ok(None);
        }
        if selector.ends_with(&self.locators.stage_status) {
            let polls = state.polls.entry(index).or_insert(0);
            let at = (*polls).min(stage.statuses.len().saturating_sub(1));
            *polls += 1;
            return Ok(stage.statuses.get(at).map(|s| s.to_string()));
        }
        if selector.ends_with(&self.locators.stage_record_count) {
            return Ok(stage.record_text.map(str::to_string));
        }
        if selector.ends_with(&self.locators.stage_type) {
            return Ok(Some(stage.type_label.to_string()));
        }
        Ok(None)
    }

    async fn get_texts(&self, selector: &str) -> E2eResult<Vec<String>> {
        if selector == self.locators.stage_names && self.state.lock().on_pipeline_page() {
            return Ok(self.stages.iter().map(|s| s.name.to_string()).collect());
        }
        Ok(Vec::new())
    }

    async fn screenshot(&self, name: &str) -> E2eResult<PathBuf> {
        self.state.lock().screenshots.push(name.to_string());
        Ok(PathBuf::from(format!("/nonexistent/{}.png", name)))
    }
}

fn stage(name: &'static str, type_label: &'static str, statuses: Vec<&'static str>) -> FakeStage {
    FakeStage {
        name,
        type_label,
        statuses,
        record_text: Some("1,000 rows"),
    }
}

fn three_stages() -> Vec<FakeStage> {
    vec![
        stage("Source", "Source", vec!["Running", "Completed"]),
        stage("Transform", "Transformation", vec!["Queued", "Running", "Success"]),
        stage("Target", "Target", vec!["Completed"]),
    ]
}

fn browser_config() -> BrowserConfig {
    BrowserConfig {
        poll_interval_ms: 5,
        status_poll_budget_secs: 1,
        ..Default::default()
    }
}

fn initial_records() -> DataPayload {
    let mut initial = DataPayload::new();
    initial.insert("records".to_string(), json!([{"id": 1}]));
    initial
}

async fn try_run_ui(browser: &FakeBrowser, sink: Option<&JsonReport>) -> E2eResult<PipelineTestResult> {
    let locators = LocatorConfig::default();
    let config = browser_config();
    let mut executor = UiStageExecutor::new(browser, &locators, &config);
    if let Some(sink) = sink {
        executor = executor.with_sink(sink);
    }

    StageByStageRunner::new(&executor)
        .test_pipeline_stage_by_stage("P1", initial_records())
        .await
}

async fn run_ui(browser: &FakeBrowser, sink: Option<&JsonReport>) -> PipelineTestResult {
    try_run_ui(browser, sink).await.unwrap()
}

#[tokio::test]
async fn test_all_stages_complete() {
    let browser = FakeBrowser::new(three_stages());

    let result = run_ui(&browser, None).await;

    assert!(result.overall_success);
    assert_eq!(result.outcome, RunOutcome::Completed);
    assert_eq!(result.stage_results.len(), 3);
    assert_eq!(result.stage_results[0].stage_type, StageType::Source);
    assert_eq!(result.stage_results[1].stage_type, StageType::Transformation);
    assert_eq!(result.total_records_processed(), 3000);
    assert_eq!(result.final_data["status"], "Completed");

    let state = browser.state.lock();
    assert_eq!(state.navigated, vec!["/pipelines/P1".to_string()]);
    assert!(state.typed[&browser.locators.json_input].contains("\"records\""));
    assert!(state.clicks.contains(&browser.locators.step_button));
    assert!(state.screenshots.is_empty());
}

#[tokio::test]
async fn test_failed_status_is_business_failure() {
    let mut stages = three_stages();
    stages[1].statuses = vec!["Running", "Failed: bad schema"];
    let browser = FakeBrowser::new(stages);
    let report = JsonReport::new();

    let result = run_ui(&browser, Some(&report)).await;

    assert_eq!(result.outcome, RunOutcome::Failed);
    assert_eq!(result.stage_results.len(), 2);
    let failed = &result.stage_results[1];
    assert!(failed.error.as_deref().unwrap().contains("bad schema"));
    assert_eq!(failed.execution.as_ref().map(|e| e.success), Some(false));
    assert_eq!(report.attachments().len(), 1);
    assert!(report.attachments()[0].name.ends_with("Transform-failed"));
}

#[tokio::test]
async fn test_poll_budget_exhaustion_aborts_with_last_status() {
    let mut stages = three_stages();
    stages[0].statuses = vec!["Running"];
    let browser = FakeBrowser::new(stages);

    let result = tokio::time::timeout(Duration::from_secs(10), run_ui(&browser, None))
        .await
        .expect("poll loop must respect its budget");

    assert_eq!(result.outcome, RunOutcome::Aborted);
    assert_eq!(result.stage_results.len(), 1);
    let error = result.stage_results[0].error.as_deref().unwrap();
    assert!(error.contains("Timed out polling"));
    assert!(error.contains("Running"));
    assert_eq!(browser.state.lock().screenshots.len(), 1);
}

#[tokio::test]
async fn test_missing_stage_element_is_local_error() {
    let locators = LocatorConfig::default();
    let browser = FakeBrowser::new(three_stages()).without(locators.stage("Transform"));

    let result = run_ui(&browser, None).await;

    assert_eq!(result.outcome, RunOutcome::Aborted);
    assert_eq!(result.stage_results.len(), 2);
    let failed = &result.stage_results[1];
    assert!(failed.execution.is_none());
    assert!(failed.error.as_deref().unwrap().contains("UI element not found"));
}

#[tokio::test]
async fn test_run_button_used_when_step_button_missing() {
    let locators = LocatorConfig::default();
    let browser = FakeBrowser::new(three_stages()).without(locators.step_button.clone());

    let result = run_ui(&browser, None).await;

    assert!(result.overall_success);
    assert!(browser.state.lock().clicks.contains(&locators.run_button));
}

#[tokio::test]
async fn test_missing_canvas_fails_stage_listing() {
    let locators = LocatorConfig::default();
    let browser = FakeBrowser::new(three_stages()).without(locators.pipeline_canvas.clone());

    let err = try_run_ui(&browser, None).await.unwrap_err();

    assert!(matches!(err, E2eError::ElementNotFound(ref s) if s.contains("pipeline-canvas")));
    let state = browser.state.lock();
    assert!(state.clicks.is_empty());
    assert_eq!(state.screenshots, vec!["P1-canvas-missing".to_string()]);
}

#[tokio::test]
async fn test_stages_are_read_from_the_pipeline_page() {
    let locators = LocatorConfig::default();
    let credentials = ApiConfig::default();
    let stages = vec![
        stage("Source", "Source", vec!["Failed"]),
        stage("Target", "Target", vec!["Failed"]),
    ];
    let browser = FakeBrowser::new(stages);
    sign_in(&browser, &locators, &credentials, Duration::from_secs(1)).await.unwrap();

    let result = run_ui(&browser, None).await;

    assert_eq!(result.outcome, RunOutcome::Failed);
    assert!(!result.overall_success);
    assert_eq!(result.stage_results.len(), 1);
    assert_eq!(result.stage_results[0].stage_name, "Source");
    assert_eq!(
        browser.state.lock().navigated,
        vec!["/login".to_string(), "/pipelines/P1".to_string()]
    );
}

#[tokio::test]
async fn test_single_stage_opens_pipeline_and_enters_input() {
    let browser = FakeBrowser::new(three_stages());
    let locators = LocatorConfig::default();
    let config = browser_config();
    let executor = UiStageExecutor::new(&browser, &locators, &config);

    let result = StageByStageRunner::new(&executor)
        .test_single_stage("P1", "Target", initial_records())
        .await
        .unwrap();

    assert!(result.overall_success);
    assert_eq!(result.stage_results.len(), 1);
    assert_eq!(result.stage_results[0].stage_name, "Target");
    let state = browser.state.lock();
    assert_eq!(state.navigated, vec!["/pipelines/P1".to_string()]);
    assert!(state.typed.contains_key(&locators.json_input));
}

#[tokio::test]
async fn test_duplicate_stage_names_are_addressed_by_position() {
    let browser = FakeBrowser::new(vec![
        stage("Source", "Source", vec!["Completed"]),
        stage("Filter", "Filter", vec!["Completed"]),
        stage("Filter", "Filter", vec!["Failed"]),
    ]);
    let locators = LocatorConfig::default();

    let result = run_ui(&browser, None).await;

    let names: Vec<&str> = result.stage_results.iter().map(|r| r.stage_name.as_str()).collect();
    assert_eq!(names, vec!["Source", "Filter", "Filter (2)"]);
    assert!(result.stage_result("Filter").unwrap().is_successful());
    assert!(!result.stage_result("Filter (2)").unwrap().is_successful());

    let clicks = browser.state.lock().clicks.clone();
    assert!(clicks.contains(&locators.stage_nth("Filter", 0)));
    assert!(clicks.contains(&locators.stage_nth("Filter", 1)));
}

/// Stands in for the API variant: a stage that reports a business failure
struct ReportedFailure;

#[async_trait]
impl StageExecutor for ReportedFailure {
    async fn pipeline_stages(&self, _pipeline_id: &str) -> E2eResult<Vec<Stage>> {
        Ok(vec![Stage::new("s1", "Source", StageType::Source, 0)])
    }

    async fn run_stage(
        &self,
        _pipeline_id: &str,
        _stage: &Stage,
        _input_data: &DataPayload,
    ) -> E2eResult<StageExecutionResult> {
        Ok(StageExecutionResult::failure("schema mismatch", DataPayload::new()))
    }
}

#[tokio::test]
async fn test_failure_shape_matches_api_variant() {
    let api = StageByStageRunner::new(&ReportedFailure)
        .test_pipeline_stage_by_stage("P1", DataPayload::new())
        .await
        .unwrap();

    let mut failing = three_stages();
    failing[0].statuses = vec!["Error"];
    let ui_failed = run_ui(&FakeBrowser::new(failing), None).await;

    let locators = LocatorConfig::default();
    let ui_missing = run_ui(&FakeBrowser::new(three_stages()).without(locators.stage("Source")), None).await;

    for result in [&api, &ui_failed, &ui_missing] {
        let entry = result.first_failure().unwrap();
        assert!(!entry.is_successful());
        assert!(entry.error.is_some());
        assert!(!result.overall_success);
    }
}

#[tokio::test]
async fn test_sign_in() {
    let locators = LocatorConfig::default();
    let credentials = ApiConfig {
        username: "qa".to_string(),
        password: "secret".to_string(),
        ..Default::default()
    };

    let browser = FakeBrowser::new(Vec::new());
    sign_in(&browser, &locators, &credentials, Duration::from_secs(1)).await.unwrap();
    {
        let state = browser.state.lock();
        assert_eq!(state.navigated, vec!["/login".to_string()]);
        assert_eq!(state.typed[&locators.login_username], "qa");
        assert_eq!(state.typed[&locators.login_password], "secret");
    }

    let browser = FakeBrowser::new(Vec::new()).without(locators.dashboard.clone());
    let err = sign_in(&browser, &locators, &credentials, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, E2eError::ElementNotFound(ref s) if *s == locators.dashboard));
}
