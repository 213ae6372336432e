//! Report sinks for pass/fail events and screenshot attachments

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::error::E2eResult;
use crate::result::RunOutcome;

/// Something that happened during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReportEvent {
    PipelineStarted {
        pipeline_id: String,
        stage_count: usize,
    },
    StagePassed {
        pipeline_id: String,
        stage_name: String,
        duration_ms: u64,
        record_count: Option<u64>,
    },
    StageFailed {
        pipeline_id: String,
        stage_name: String,
        error: String,
    },
    PipelineFinished {
        pipeline_id: String,
        outcome: RunOutcome,
        overall_success: bool,
    },
}

/// Receives run events and screenshots
pub trait ReportSink: Send + Sync {
    fn record(&self, event: &ReportEvent);

    fn attach_screenshot(&self, name: &str, path: &Path);
}

/// Logs every event through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn record(&self, event: &ReportEvent) {
        match event {
            ReportEvent::PipelineStarted { pipeline_id, stage_count } => {
                info!("▶ {} ({} stages)", pipeline_id, stage_count);
            }
            ReportEvent::StagePassed { stage_name, duration_ms, record_count, .. } => match record_count {
                Some(count) => info!("✓ {} ({} ms, {} records)", stage_name, duration_ms, count),
                None => info!("✓ {} ({} ms)", stage_name, duration_ms),
            },
            ReportEvent::StageFailed { stage_name, error, .. } => {
                error!("✗ {} - {}", stage_name, error);
            }
            ReportEvent::PipelineFinished { pipeline_id, outcome, overall_success } => {
                info!("■ {} {} (success: {})", pipeline_id, outcome, overall_success);
            }
        }
    }

    fn attach_screenshot(&self, name: &str, path: &Path) {
        info!("Screenshot '{}' saved to {}", name, path.display());
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimedEvent {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: ReportEvent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub path: PathBuf,
    /// SHA-256 of the file contents, absent if it could not be read
    pub sha256: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JsonReportState {
    events: Vec<TimedEvent>,
    attachments: Vec<Attachment>,
}

/// Collects events in memory and writes them as `report.json`
#[derive(Debug, Default)]
pub struct JsonReport {
    state: Mutex<JsonReportState>,
}

impl JsonReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ReportEvent> {
        self.state.lock().events.iter().map(|e| e.event.clone()).collect()
    }

    pub fn attachments(&self) -> Vec<Attachment> {
        self.state.lock().attachments.clone()
    }

    /// Write the collected report into `dir`
    pub fn write(&self, dir: &Path) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join("report.json");
        let json = serde_json::to_string_pretty(&*self.state.lock())?;
        std::fs::write(&path, json)?;
        info!("Report written to: {}", path.display());
        Ok(path)
    }
}

impl ReportSink for JsonReport {
    fn record(&self, event: &ReportEvent) {
        self.state.lock().events.push(TimedEvent {
            at: Utc::now(),
            event: event.clone(),
        });
    }

    fn attach_screenshot(&self, name: &str, path: &Path) {
        let sha256 = match std::fs::read(path) {
            Ok(bytes) => Some(hex::encode(Sha256::digest(&bytes))),
            Err(e) => {
                warn!("Could not read screenshot {}: {}", path.display(), e);
                None
            }
        };
        self.state.lock().attachments.push(Attachment {
            name: name.to_string(),
            path: path.to_path_buf(),
            sha256,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_report_collects_and_writes() {
        let dir = tempfile::tempdir().unwrap();
        let shot = dir.path().join("stage.png");
        std::fs::write(&shot, b"not really a png").unwrap();

        let report = JsonReport::new();
        report.record(&ReportEvent::StageFailed {
            pipeline_id: "p1".to_string(),
            stage_name: "Join".to_string(),
            error: "boom".to_string(),
        });
        report.attach_screenshot("join-failure", &shot);
        report.attach_screenshot("missing", &dir.path().join("nope.png"));

        let attachments = report.attachments();
        assert_eq!(attachments[0].sha256.as_deref().map(str::len), Some(64));
        assert!(attachments[1].sha256.is_none());

        let path = report.write(&dir.path().join("out")).unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written["events"][0]["event"], "stage_failed");
        assert_eq!(written["events"][0]["stage_name"], "Join");
    }
}
