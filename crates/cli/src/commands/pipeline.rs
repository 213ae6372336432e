//! Pipeline commands: inspect a pipeline and run it stage by stage

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use stagewise_common::data::load_records;
use stagewise_common::{DataPayload, HarnessConfig, MockDataGenerator, Pipeline, Stage};
use stagewise_e2e::{
    JsonReport, PipelineTestResult, ReportSink, StageByStageRunner, StageExecutor, StageTestResult,
    TracingSink, UiStageExecutor,
};
use std::path::PathBuf;

use super::{cancel_on_ctrl_c, connect, open_browser};
use crate::output::{print_document, print_error, print_item, print_list, print_success, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct RunArgs {
    /// Pipeline ID
    pub id: String,

    /// JSON file with an array of input records
    #[arg(short, long, conflicts_with = "generate")]
    pub input: Option<PathBuf>,

    /// Generate this many mock customer records as input
    #[arg(short, long)]
    pub generate: Option<usize>,

    /// Seed for generated records
    #[arg(long, requires = "generate")]
    pub seed: Option<u64>,

    /// Run only the named stage
    #[arg(long)]
    pub stage: Option<String>,

    /// Drive the run through the UI instead of the API
    #[arg(long)]
    pub ui: bool,

    /// Write report.json (events and screenshots) to the reports directory
    #[arg(long)]
    pub report: bool,
}

#[derive(Serialize)]
pub struct PipelineDisplay {
    pub id: String,
    pub name: String,
    pub project: String,
    pub description: String,
}

impl From<Pipeline> for PipelineDisplay {
    fn from(pipeline: Pipeline) -> Self {
        Self {
            id: pipeline.id,
            name: pipeline.name,
            project: pipeline.project,
            description: pipeline.description,
        }
    }
}

impl TableDisplay for PipelineDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["ID", "Name", "Project", "Description"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.name.clone(),
            self.project.clone(),
            self.description.clone(),
        ]
    }
}

#[derive(Serialize)]
pub struct StageDisplay {
    pub position: usize,
    pub id: String,
    pub name: String,
    pub stage_type: String,
}

impl From<&Stage> for StageDisplay {
    fn from(stage: &Stage) -> Self {
        Self {
            position: stage.order as usize + 1,
            id: stage.id.clone(),
            name: stage.name.clone(),
            stage_type: stage.stage_type.to_string(),
        }
    }
}

impl TableDisplay for StageDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["#", "ID", "Name", "Type"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.position.to_string(),
            self.id.clone(),
            self.name.clone(),
            self.stage_type.clone(),
        ]
    }
}

#[derive(Serialize)]
pub struct StageResultDisplay {
    pub name: String,
    pub stage_type: String,
    pub result: String,
    pub records: String,
    pub duration_ms: u64,
    pub error: String,
}

impl From<&StageTestResult> for StageResultDisplay {
    fn from(result: &StageTestResult) -> Self {
        Self {
            name: result.stage_name.clone(),
            stage_type: result.stage_type.to_string(),
            result: if result.is_successful() { "passed" } else { "failed" }.to_string(),
            records: result
                .record_count()
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".to_string()),
            duration_ms: result.duration_ms,
            error: result.error.clone().unwrap_or_default(),
        }
    }
}

impl TableDisplay for StageResultDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Stage", "Type", "Result", "Records", "Duration", "Error"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.stage_type.clone(),
            self.result.clone(),
            self.records.clone(),
            format!("{} ms", self.duration_ms),
            self.error.clone(),
        ]
    }
}

/// Show one pipeline
pub async fn show(config: &HarnessConfig, id: &str, format: OutputFormat) -> Result<()> {
    let client = connect(config).await?;
    let pipeline = client.get_pipeline(id).await?;
    print_item(&PipelineDisplay::from(pipeline), format);
    Ok(())
}

/// List stages in execution order
pub async fn stages(config: &HarnessConfig, id: &str, format: OutputFormat) -> Result<()> {
    let client = connect(config).await?;
    let stages = client.get_pipeline_stages(id).await?;
    let displays: Vec<StageDisplay> = stages.iter().map(StageDisplay::from).collect();
    print_list(&displays, format);
    Ok(())
}

fn initial_data(args: &RunArgs) -> Result<DataPayload> {
    if let Some(path) = &args.input {
        let records = load_records(path).with_context(|| format!("Cannot read {}", path.display()))?;
        let schema = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "records".to_string());
        return Ok(MockDataGenerator::input_payload(&schema, records));
    }
    if let Some(count) = args.generate {
        let mut generator = match args.seed {
            Some(seed) => MockDataGenerator::with_seed(seed),
            None => MockDataGenerator::new(),
        };
        let schema = MockDataGenerator::sample_schema("customer");
        let records = generator.generate_records(&schema, count);
        return Ok(MockDataGenerator::input_payload(&schema.name, records));
    }
    tracing::debug!("No input given; stages use their own data sources");
    Ok(DataPayload::new())
}

async fn drive(
    executor: &dyn StageExecutor,
    sink: &dyn ReportSink,
    args: &RunArgs,
    input: DataPayload,
) -> Result<PipelineTestResult> {
    let runner = StageByStageRunner::new(executor)
        .with_sink(sink)
        .with_cancellation(cancel_on_ctrl_c());
    let result = match &args.stage {
        Some(stage) => runner.test_single_stage(&args.id, stage, input).await?,
        None => runner.test_pipeline_stage_by_stage(&args.id, input).await?,
    };
    Ok(result)
}

/// Run a pipeline stage by stage. Returns whether every stage passed.
pub async fn run(config: &HarnessConfig, args: RunArgs, format: OutputFormat) -> Result<bool> {
    let input = initial_data(&args)?;
    let client = connect(config).await?;
    client.get_pipeline(&args.id).await?;

    let json_report = JsonReport::new();
    let sink: &dyn ReportSink = if args.report { &json_report } else { &TracingSink };

    let result = if args.ui {
        let session = open_browser(config).await?;
        let executor = UiStageExecutor::new(&session, &config.locators, &config.browser).with_sink(sink);
        let result = drive(&executor, sink, &args, input).await;
        if let Err(e) = session.close().await {
            tracing::warn!("Browser did not close cleanly: {}", e);
        }
        result?
    } else {
        drive(&client, sink, &args, input).await?
    };

    if args.report {
        json_report.write(&config.paths.reports)?;
    }

    print_run(&result, format);
    Ok(result.overall_success)
}

fn print_run(result: &PipelineTestResult, format: OutputFormat) {
    if print_document(result, format) {
        return;
    }

    let rows: Vec<StageResultDisplay> = result.stage_results.iter().map(StageResultDisplay::from).collect();
    print_list(&rows, format);

    let summary = format!(
        "{}: {} stage(s) run, {} records processed, {} ({} ms)",
        result.pipeline_id,
        result.stage_results.len(),
        result.total_records_processed(),
        result.outcome,
        result.duration_ms
    );
    if result.overall_success {
        print_success(&summary);
    } else {
        print_error(&summary);
        if let Some(message) = result.failure_message() {
            eprintln!("  {}", message.red());
        }
    }
}

/// Reject argument combinations clap cannot express
pub fn check_args(args: &RunArgs) -> Result<()> {
    if args.generate == Some(0) {
        bail!("--generate needs at least one record");
    }
    Ok(())
}
