//! UI-driven stage execution
//!
//! Runs the same stage-by-stage loop as the API variant, but each stage is
//! executed by clicking through the pipeline canvas. Reading the stage list
//! opens the pipeline page, so stages are never read from another page. Locator and polling
//! failures are returned as errors so the orchestrator records them exactly
//! like a transport failure.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use stagewise_common::{ApiConfig, BrowserConfig, DataPayload, LocatorConfig, Stage, StageType};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::browser::{parse_record_count, poll_status, BrowserSession, PollBudget, StatusClass};
use crate::error::{E2eError, E2eResult};
use crate::orchestrator::StageExecutor;
use crate::report::ReportSink;
use crate::result::StageExecutionResult;

/// Log in through the login form and wait for the dashboard
pub async fn sign_in<S>(
    session: &S,
    locators: &LocatorConfig,
    credentials: &ApiConfig,
    timeout: Duration,
) -> E2eResult<()>
where
    S: BrowserSession + ?Sized,
{
    info!("Signing in to the UI as {}", credentials.username);
    session.navigate("/login").await?;

    if !session.wait_visible(&locators.login_username, timeout).await? {
        return Err(E2eError::ElementNotFound(locators.login_username.clone()));
    }
    if !session.type_text(&locators.login_username, &credentials.username).await? {
        return Err(E2eError::ElementNotFound(locators.login_username.clone()));
    }
    if !session.type_text(&locators.login_password, &credentials.password).await? {
        return Err(E2eError::ElementNotFound(locators.login_password.clone()));
    }
    if !session.click(&locators.login_submit, timeout).await? {
        return Err(E2eError::ElementNotFound(locators.login_submit.clone()));
    }
    if !session.wait_visible(&locators.dashboard, timeout).await? {
        return Err(E2eError::ElementNotFound(locators.dashboard.clone()));
    }
    debug!("Dashboard visible after sign-in");
    Ok(())
}

/// Executes stages through the rendered pipeline canvas
pub struct UiStageExecutor<'a, S: BrowserSession + ?Sized> {
    session: &'a S,
    locators: &'a LocatorConfig,
    browser: &'a BrowserConfig,
    sink: Option<&'a dyn ReportSink>,
    /// Canvas selector per stage id, filled when the stage list is read
    selectors: Mutex<HashMap<String, String>>,
}

impl<'a, S: BrowserSession + ?Sized> UiStageExecutor<'a, S> {
    pub fn new(session: &'a S, locators: &'a LocatorConfig, browser: &'a BrowserConfig) -> Self {
        Self {
            session,
            locators,
            browser,
            sink: None,
            selectors: Mutex::new(HashMap::new()),
        }
    }

    /// Hand failure screenshots to `sink`
    pub fn with_sink(mut self, sink: &'a dyn ReportSink) -> Self {
        self.sink = Some(sink);
        self
    }

    fn poll_budget(&self) -> PollBudget {
        PollBudget {
            interval: self.browser.poll_interval(),
            max_wait: self.browser.status_poll_budget(),
        }
    }

    /// Best effort; a failed capture never changes the stage outcome
    async fn capture(&self, name: &str) {
        match self.session.screenshot(name).await {
            Ok(path) => {
                if let Some(sink) = self.sink {
                    sink.attach_screenshot(name, &path);
                }
            }
            Err(e) => warn!("Screenshot '{}' failed: {}", name, e),
        }
    }

    /// Open the pipeline page and wait for its canvas
    async fn open_pipeline(&self, pipeline_id: &str) -> E2eResult<()> {
        self.session.navigate(&format!("/pipelines/{}", pipeline_id)).await?;

        if !self
            .session
            .wait_visible(&self.locators.pipeline_canvas, self.browser.page_load_timeout())
            .await?
        {
            self.capture(&format!("{}-canvas-missing", pipeline_id)).await;
            return Err(E2eError::ElementNotFound(self.locators.pipeline_canvas.clone()));
        }
        Ok(())
    }

    fn stage_selector(&self, stage: &Stage) -> String {
        self.selectors
            .lock()
            .get(&stage.id)
            .cloned()
            .unwrap_or_else(|| self.locators.stage(&stage.name))
    }

    async fn trigger_run(&self, stage: &Stage) -> E2eResult<()> {
        let timeout = self.browser.explicit_timeout();
        if self.session.click(&self.locators.step_button, timeout).await? {
            debug!("Stepped into stage {}", stage.name);
            return Ok(());
        }
        if self.session.click(&self.locators.run_button, timeout).await? {
            debug!("Ran stage {} via run button", stage.name);
            return Ok(());
        }
        Err(E2eError::ElementNotFound(format!(
            "{} or {}",
            self.locators.step_button, self.locators.run_button
        )))
    }
}

#[async_trait]
impl<'a, S: BrowserSession + ?Sized> StageExecutor for UiStageExecutor<'a, S> {
    async fn prepare(&self, _pipeline_id: &str, initial_data: &DataPayload) -> E2eResult<()> {
        if initial_data.is_empty() {
            return Ok(());
        }

        let json = serde_json::to_string_pretty(initial_data)?;
        if self.session.type_text(&self.locators.json_input, &json).await? {
            debug!("Entered initial data ({} bytes) into JSON input", json.len());
        } else if self
            .session
            .click(&self.locators.data_source_button, self.browser.implicit_timeout())
            .await?
        {
            debug!("Initial data supplied through the data source dialog");
        } else {
            warn!("No input control found; stages will use their configured data sources");
        }
        Ok(())
    }

    async fn pipeline_stages(&self, pipeline_id: &str) -> E2eResult<Vec<Stage>> {
        self.open_pipeline(pipeline_id).await?;

        let names: Vec<String> = self
            .session
            .get_texts(&self.locators.stage_names)
            .await?
            .into_iter()
            .filter(|n| !n.is_empty())
            .collect();

        let mut totals: HashMap<&str, usize> = HashMap::new();
        for name in &names {
            *totals.entry(name.as_str()).or_insert(0) += 1;
        }

        let mut seen: HashMap<&str, usize> = HashMap::new();
        let mut selectors = HashMap::with_capacity(names.len());
        let mut stages = Vec::with_capacity(names.len());

        for (index, name) in names.iter().enumerate() {
            let occurrence = seen.entry(name.as_str()).or_insert(0);
            let (label, root) = if totals[name.as_str()] > 1 {
                if *occurrence == 1 {
                    warn!("Several stages named '{}' on the canvas; addressing them by position", name);
                }
                let label = if *occurrence == 0 {
                    name.clone()
                } else {
                    format!("{} ({})", name, *occurrence + 1)
                };
                (label, self.locators.stage_nth(name, *occurrence))
            } else {
                (name.clone(), self.locators.stage(name))
            };
            *occurrence += 1;

            let type_selector = format!("{} >> {}", root, self.locators.stage_type);
            let stage_type = self
                .session
                .get_text(&type_selector)
                .await?
                .map(|t| StageType::parse_lenient(&t))
                .unwrap_or_default();

            selectors.insert(label.clone(), root);
            stages.push(Stage::new(label.clone(), label, stage_type, index as u32));
        }

        *self.selectors.lock() = selectors;
        info!("Found {} stages on the canvas", stages.len());
        Ok(stages)
    }

    async fn run_stage(
        &self,
        pipeline_id: &str,
        stage: &Stage,
        _input_data: &DataPayload,
    ) -> E2eResult<StageExecutionResult> {
        let stage_selector = self.stage_selector(stage);
        if !self
            .session
            .click(&stage_selector, self.browser.explicit_timeout())
            .await?
        {
            self.capture(&format!("{}-{}-not-found", pipeline_id, stage.name)).await;
            return Err(E2eError::ElementNotFound(stage_selector));
        }

        self.trigger_run(stage).await?;

        let status_selector = format!("{} >> {}", stage_selector, self.locators.stage_status);
        let polled = poll_status(self.session, &status_selector, self.poll_budget()).await?;
        if polled.timed_out {
            self.capture(&format!("{}-{}-timeout", pipeline_id, stage.name)).await;
            return Err(E2eError::PollTimeout {
                selector: status_selector,
                last_status: polled.status,
            });
        }

        if polled.class == StatusClass::Failed {
            self.capture(&format!("{}-{}-failed", pipeline_id, stage.name)).await;
            return Ok(StageExecutionResult::failure(
                format!("stage reported status '{}'", polled.status),
                DataPayload::new(),
            ));
        }

        let count_selector = format!("{} >> {}", stage_selector, self.locators.stage_record_count);
        let record_count = self
            .session
            .get_text(&count_selector)
            .await?
            .as_deref()
            .and_then(parse_record_count);

        let mut output = DataPayload::new();
        output.insert("status".to_string(), Value::String(polled.status));
        if let Some(count) = record_count {
            output.insert("recordCount".to_string(), json!(count));
        }
        Ok(StageExecutionResult::success(output))
    }
}
