//! Scenario commands: run the YAML scenario suite

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use stagewise_common::HarnessConfig;
use stagewise_e2e::{JsonReport, ScenarioResult, ScenarioRunner};
use std::path::PathBuf;

use super::{cancel_on_ctrl_c, connect, open_browser};
use crate::output::{print_document, print_error, print_list, print_success, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct ScenarioArgs {
    /// Scenario directory (defaults to paths.scenarios)
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    /// Run only the scenario with this name
    #[arg(short, long)]
    pub name: Option<String>,

    /// Start a browser so UI-mode scenarios can run
    #[arg(long)]
    pub ui: bool,
}

#[derive(Serialize)]
pub struct ScenarioDisplay {
    pub name: String,
    pub pipeline_id: String,
    pub mode: String,
    pub result: String,
    pub stages: usize,
    pub duration_ms: u64,
    pub detail: String,
}

impl From<&ScenarioResult> for ScenarioDisplay {
    fn from(result: &ScenarioResult) -> Self {
        Self {
            name: result.name.clone(),
            pipeline_id: result.pipeline_id.clone(),
            mode: result.mode.to_string(),
            result: if result.success { "passed" } else { "failed" }.to_string(),
            stages: result.stage_count(),
            duration_ms: result.duration_ms,
            detail: result.summary().unwrap_or_default(),
        }
    }
}

impl TableDisplay for ScenarioDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Scenario", "Pipeline", "Mode", "Result", "Stages", "Duration", "Detail"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.pipeline_id.clone(),
            self.mode.clone(),
            self.result.clone(),
            self.stages.to_string(),
            format!("{} ms", self.duration_ms),
            self.detail.clone(),
        ]
    }
}

/// Run scenarios and write `scenario-results.json`. Returns whether all passed.
pub async fn execute(config: &HarnessConfig, args: ScenarioArgs, format: OutputFormat) -> Result<bool> {
    let client = connect(config).await?;
    let session = if args.ui { Some(open_browser(config).await?) } else { None };
    let report = JsonReport::new();

    let mut runner = ScenarioRunner::new(config, &client)
        .with_sink(&report)
        .with_cancellation(cancel_on_ctrl_c());
    if let Some(dir) = &args.dir {
        runner = runner.with_scenarios_dir(dir);
    }
    if let Some(session) = &session {
        runner = runner.with_session(session);
    }

    let suite = match &args.name {
        Some(name) => runner.run_named(name).await?,
        None => runner.run_all().await?,
    };

    runner.write_results(&suite)?;
    report.write(&config.paths.reports)?;
    drop(runner);
    if let Some(session) = session {
        if let Err(e) = session.close().await {
            tracing::warn!("Browser did not close cleanly: {}", e);
        }
    }

    if !print_document(&suite, format) {
        let rows: Vec<ScenarioDisplay> = suite.results.iter().map(ScenarioDisplay::from).collect();
        print_list(&rows, format);
        let summary = format!(
            "{} passed, {} failed ({} ms)",
            suite.passed, suite.failed, suite.duration_ms
        );
        if suite.failed == 0 {
            print_success(&summary);
        } else {
            print_error(&summary);
        }
    }

    Ok(suite.failed == 0)
}
