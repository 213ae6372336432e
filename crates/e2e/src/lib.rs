//! Stagewise stage-by-stage pipeline test engine
//!
//! This crate tests remote data pipelines one stage at a time:
//! - Talks to the pipeline API over authenticated HTTP
//! - Runs stages sequentially, feeding each stage the previous stage's output
//! - Drives the same loop through the product UI via Playwright
//! - Runs declarative YAML scenarios and reports pass/fail per stage
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     ScenarioRunner                          │
//! │    ├── Scenario::load_all(dir) -> [Scenario]                │
//! │    ├── ApiClient::get_pipeline(id)                          │
//! │    └── Expectations::evaluate(run) -> [failure]             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  StageByStageRunner (one run, strictly sequential)          │
//! │    └── test_pipeline_stage_by_stage(id, data)               │
//! │          -> PipelineTestResult { stage_results, ... }       │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │  dyn StageExecutor           │                              │
//! │    ├── ApiClient             │  POST .../stages/{id}/execute│
//! │    └── UiStageExecutor<S>    │  click, step, poll status    │
//! │          └── S: BrowserSession (PlaywrightSession)          │
//! ├──────────────────────────────┴──────────────────────────────┤
//! │  ReportSink: TracingSink, JsonReport                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod browser;
pub mod client;
pub mod error;
pub mod orchestrator;
pub mod playwright;
pub mod report;
pub mod result;
pub mod runner;
pub mod scenario;
pub mod ui;

pub use browser::{BrowserSession, PollBudget, PollOutcome, StatusClass};
pub use client::ApiClient;
pub use error::{E2eError, E2eResult};
pub use orchestrator::{RunState, StageByStageRunner, StageExecutor};
pub use playwright::{PlaywrightConfig, PlaywrightSession};
pub use report::{JsonReport, ReportEvent, ReportSink, TracingSink};
pub use result::{PipelineTestResult, RunOutcome, StageExecutionResult, StageTestResult};
pub use runner::{ScenarioResult, ScenarioRunner, SuiteResult};
pub use scenario::{Scenario, ScenarioMode};
pub use ui::{sign_in, UiStageExecutor};
