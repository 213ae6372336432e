//! Browser capability interface and status polling
//!
//! Page logic is written against `BrowserSession` so it does not care which
//! automation backend is driving the browser. Element lookups that may
//! legitimately miss return `Option`/`bool`; `Err` is reserved for the
//! backend itself failing.

use async_trait::async_trait;
use regex::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::E2eResult;

/// Minimal set of browser actions the runners need
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Navigate to `path`, relative to the session's base URL
    async fn navigate(&self, path: &str) -> E2eResult<()>;

    /// Wait until `selector` is visible; false on timeout
    async fn wait_visible(&self, selector: &str, timeout: Duration) -> E2eResult<bool>;

    /// Click `selector` once it is clickable; false if it never became so
    async fn click(&self, selector: &str, timeout: Duration) -> E2eResult<bool>;

    /// Replace the contents of an input; false if the input was not found
    async fn type_text(&self, selector: &str, text: &str) -> E2eResult<bool>;

    /// Trimmed text of the first match, if any
    async fn get_text(&self, selector: &str) -> E2eResult<Option<String>>;

    /// Trimmed text of every match, in document order
    async fn get_texts(&self, selector: &str) -> E2eResult<Vec<String>>;

    /// Capture the current page under `name`
    async fn screenshot(&self, name: &str) -> E2eResult<PathBuf>;
}

/// Lexical classification of a status indicator's text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Succeeded,
    Failed,
    InProgress,
}

/// Classify status text by case-insensitive substring.
///
/// Failure words win over success words, so "completed with errors" is a
/// failure.
pub fn classify_status(text: &str) -> StatusClass {
    let lower = text.to_lowercase();
    if lower.contains("failed") || lower.contains("error") {
        StatusClass::Failed
    } else if lower.contains("completed") || lower.contains("success") {
        StatusClass::Succeeded
    } else {
        StatusClass::InProgress
    }
}

/// How long and how often to poll
#[derive(Debug, Clone, Copy)]
pub struct PollBudget {
    pub interval: Duration,
    pub max_wait: Duration,
}

/// What the poll loop last saw
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    /// Last observed text; empty if the indicator never appeared
    pub status: String,
    pub class: StatusClass,
    pub timed_out: bool,
}

/// Poll `selector` until its text is terminal or the budget runs out.
///
/// On timeout the last observed status is returned with `timed_out = true`
/// rather than waiting further.
pub async fn poll_status<S>(session: &S, selector: &str, budget: PollBudget) -> E2eResult<PollOutcome>
where
    S: BrowserSession + ?Sized,
{
    let start = Instant::now();
    let mut last = String::new();
    let mut attempts = 0usize;

    loop {
        attempts += 1;
        if let Some(text) = session.get_text(selector).await? {
            let class = classify_status(&text);
            if class != StatusClass::InProgress {
                debug!("{} reached '{}' after {} polls", selector, text, attempts);
                return Ok(PollOutcome {
                    status: text,
                    class,
                    timed_out: false,
                });
            }
            last = text;
        }

        if start.elapsed() >= budget.max_wait {
            warn!(
                "Gave up polling {} after {} attempts; last status '{}'",
                selector, attempts, last
            );
            return Ok(PollOutcome {
                status: last,
                class: StatusClass::InProgress,
                timed_out: true,
            });
        }

        sleep(budget.interval).await;
    }
}

fn count_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d[\d,]*").ok()).as_ref()
}

/// Extract a count from text like "1,000 rows" or "Records: 42"
pub fn parse_record_count(text: &str) -> Option<u64> {
    count_pattern()?
        .find(text)
        .and_then(|m| m.as_str().replace(',', "").parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("Completed", StatusClass::Succeeded)]
    #[test_case("SUCCESS", StatusClass::Succeeded)]
    #[test_case("Failed: schema mismatch", StatusClass::Failed)]
    #[test_case("error", StatusClass::Failed)]
    #[test_case("Completed with errors", StatusClass::Failed)]
    #[test_case("Running", StatusClass::InProgress)]
    #[test_case("", StatusClass::InProgress)]
    fn test_classify_status(text: &str, expected: StatusClass) {
        assert_eq!(classify_status(text), expected);
    }

    #[test_case("1,000 rows", Some(1000))]
    #[test_case("Records: 42", Some(42))]
    #[test_case("0 records", Some(0))]
    #[test_case("no data", None)]
    fn test_parse_record_count(text: &str, expected: Option<u64>) {
        assert_eq!(parse_record_count(text), expected);
    }
}
