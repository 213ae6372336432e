//! Error types for stage-by-stage testing

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    /// Login did not yield a token. `status` is absent when the login
    /// endpoint could not be reached at all.
    #[error("Authentication failed: {reason}")]
    Authentication { status: Option<u16>, reason: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Stage {stage_id} could not be executed: {reason}")]
    ExecutionTransport { stage_id: String, reason: String },

    #[error("UI element not found: {0}")]
    ElementNotFound(String),

    #[error("Timed out polling {selector}; last status: {last_status}")]
    PollTimeout { selector: String, last_status: String },

    #[error("Playwright not found. Install with: npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Scenario parse error: {0}")]
    ScenarioParse(String),

    #[error(transparent)]
    Common(#[from] stagewise_common::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl E2eError {
    pub(crate) fn authentication(status: Option<u16>, reason: impl Into<String>) -> Self {
        Self::Authentication {
            status,
            reason: reason.into(),
        }
    }

    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        E2eError::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
