//! Harness configuration
//!
//! One `HarnessConfig` is built at process start (file, then environment
//! overrides) and passed by reference to the clients and runners.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Top-level harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Remote API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Browser automation settings
    #[serde(default)]
    pub browser: BrowserConfig,

    /// Filesystem locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// UI selectors for the target product build
    #[serde(default)]
    pub locators: LocatorConfig,

    /// Environment label (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_environment() -> String {
    "dev".to_string()
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            browser: BrowserConfig::default(),
            paths: PathsConfig::default(),
            locators: LocatorConfig::default(),
            environment: default_environment(),
        }
    }
}

/// Remote API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the product, e.g. `https://app.example.io`
    pub base_url: String,

    pub username: String,

    pub password: String,

    /// Timeout for a single request
    pub request_timeout_secs: u64,

    /// Timeout for establishing a connection
    pub connect_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            username: String::new(),
            password: String::new(),
            request_timeout_secs: 30,
            connect_timeout_secs: 30,
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Browser engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowserKind {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserKind::Chromium => "chromium",
            BrowserKind::Firefox => "firefox",
            BrowserKind::Webkit => "webkit",
        }
    }
}

impl std::str::FromStr for BrowserKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(BrowserKind::Chromium),
            "firefox" => Ok(BrowserKind::Firefox),
            "webkit" | "safari" => Ok(BrowserKind::Webkit),
            other => Err(Error::InvalidConfig(format!("unknown browser '{}'", other))),
        }
    }
}

/// Browser automation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub browser: BrowserKind,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,

    /// Default wait applied to individual element lookups
    pub implicit_timeout_secs: u64,

    /// Wait used for explicit visibility/clickability checks
    pub explicit_timeout_secs: u64,

    /// Wait for a page (or the pipeline canvas) to load
    pub page_load_timeout_secs: u64,

    /// Interval between status polls of a running stage
    pub poll_interval_ms: u64,

    /// Maximum time to poll one stage's status before giving up
    pub status_poll_budget_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            browser: BrowserKind::Chromium,
            headless: false,
            viewport_width: 1280,
            viewport_height: 720,
            implicit_timeout_secs: 10,
            explicit_timeout_secs: 30,
            page_load_timeout_secs: 60,
            poll_interval_ms: 500,
            status_poll_budget_secs: 120,
        }
    }
}

impl BrowserConfig {
    pub fn implicit_timeout(&self) -> Duration {
        Duration::from_secs(self.implicit_timeout_secs)
    }

    pub fn explicit_timeout(&self) -> Duration {
        Duration::from_secs(self.explicit_timeout_secs)
    }

    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn status_poll_budget(&self) -> Duration {
        Duration::from_secs(self.status_poll_budget_secs)
    }
}

/// Filesystem locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub test_data: PathBuf,
    pub reports: PathBuf,
    pub screenshots: PathBuf,
    pub scenarios: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            test_data: PathBuf::from("testdata"),
            reports: PathBuf::from("test-results"),
            screenshots: PathBuf::from("test-results/screenshots"),
            scenarios: PathBuf::from("scenarios"),
        }
    }
}

/// Selectors used by the UI-driven runner.
///
/// Values are Playwright selectors. `{name}` in `stage_by_name` is replaced
/// with the stage name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    pub login_username: String,
    pub login_password: String,
    pub login_submit: String,
    pub dashboard: String,
    pub pipeline_canvas: String,
    pub stage_names: String,
    pub stage_by_name: String,
    pub stage_status: String,
    pub stage_type: String,
    pub stage_record_count: String,
    pub step_button: String,
    pub run_button: String,
    pub json_input: String,
    pub data_source_button: String,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            login_username: "input[name='username'], input[type='email']".to_string(),
            login_password: "input[name='password'], input[type='password']".to_string(),
            login_submit: "button[type='submit']".to_string(),
            dashboard: ".dashboard, [data-testid='dashboard']".to_string(),
            pipeline_canvas: ".pipeline-canvas, .stage-list".to_string(),
            stage_names: ".stage .stage-name, .node .node-title".to_string(),
            stage_by_name: ".stage:has-text(\"{name}\"), .node:has-text(\"{name}\")".to_string(),
            stage_status: ".status, .state".to_string(),
            stage_type: ".stage-type, .node-type".to_string(),
            stage_record_count: ".record-count, .row-count".to_string(),
            step_button: "button.step-button, button:has-text(\"Step\")".to_string(),
            run_button: "button.run-button, button:has-text(\"Run\")".to_string(),
            json_input: "textarea.json-input, textarea[placeholder*='JSON']".to_string(),
            data_source_button: "button.data-source, button:has-text(\"Data Source\")".to_string(),
        }
    }
}

impl LocatorConfig {
    /// Selector for the canvas element of a named stage
    pub fn stage(&self, name: &str) -> String {
        self.stage_by_name.replace("{name}", &name.replace('"', "\\\""))
    }

    /// Selector for the `index`-th (0-based) of several stages sharing a name
    pub fn stage_nth(&self, name: &str, index: usize) -> String {
        format!("{} >> nth={}", self.stage(name), index)
    }
}

impl HarnessConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            info!("Loaded configuration from {}", path.display());
            Ok(config)
        } else {
            warn!("Config file {} not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load from file, apply process environment overrides, and validate
    pub fn from_file_and_env(path: &Path) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `STAGEWISE_*` overrides; they take precedence over the file.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("STAGEWISE_BASE_URL") {
            self.api.base_url = url;
        }
        if let Some(user) = lookup("STAGEWISE_USERNAME") {
            self.api.username = user;
        }
        if let Some(password) = lookup("STAGEWISE_PASSWORD") {
            self.api.password = password;
        }
        if let Some(env) = lookup("STAGEWISE_ENVIRONMENT") {
            self.environment = env;
        }
        if let Some(headless) = lookup("STAGEWISE_HEADLESS") {
            match headless.parse::<bool>() {
                Ok(value) => self.browser.headless = value,
                Err(_) => warn!("Invalid boolean for STAGEWISE_HEADLESS: {}", headless),
            }
        }
        if let Some(browser) = lookup("STAGEWISE_BROWSER") {
            match browser.parse::<BrowserKind>() {
                Ok(kind) => self.browser.browser = kind,
                Err(e) => warn!("Ignoring STAGEWISE_BROWSER: {}", e),
            }
        }
    }

    /// Reject configurations that cannot drive a run
    pub fn validate(&self) -> Result<()> {
        let url = self.api.base_url.trim();
        if url.is_empty() {
            return Err(Error::InvalidConfig("api.base_url is empty".to_string()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::InvalidConfig(format!(
                "api.base_url must be an http(s) URL, got '{}'",
                url
            )));
        }
        if self.api.request_timeout_secs == 0 || self.api.connect_timeout_secs == 0 {
            return Err(Error::InvalidConfig("api timeouts must be non-zero".to_string()));
        }
        if self.browser.poll_interval_ms == 0 || self.browser.status_poll_budget_secs == 0 {
            return Err(Error::InvalidConfig(
                "browser poll interval and budget must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.api.base_url.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_partial_config() {
        let toml = r##"
environment = "staging"

[api]
base_url = "https://app.example.io/"
username = "qa"
password = "secret"
request_timeout_secs = 10
connect_timeout_secs = 5

[locators]
step_button = "#step"
"##;
        let config: HarnessConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.environment, "staging");
        assert_eq!(config.base_url(), "https://app.example.io");
        assert_eq!(config.browser.explicit_timeout_secs, 30);
        assert_eq!(config.locators.step_button, "#step");
        assert_eq!(config.locators.run_button, LocatorConfig::default().run_button);
    }

    #[test]
    fn test_env_overrides_take_precedence() {
        let vars: HashMap<&str, &str> = [
            ("STAGEWISE_BASE_URL", "https://override.example.io"),
            ("STAGEWISE_HEADLESS", "true"),
            ("STAGEWISE_BROWSER", "opera"),
        ]
        .into_iter()
        .collect();

        let mut config = HarnessConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.api.base_url, "https://override.example.io");
        assert!(config.browser.headless);
        assert_eq!(config.browser.browser, BrowserKind::Chromium);
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let mut config = HarnessConfig::default();
        config.api.base_url = "ftp://example.io".to_string();
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HarnessConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.environment, "dev");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/stagewise.toml");

        let mut config = HarnessConfig::default();
        config.api.username = "qa".to_string();
        config.save(&path).unwrap();

        let loaded = HarnessConfig::load(&path).unwrap();
        assert_eq!(loaded.api.username, "qa");
    }

    #[test]
    fn test_stage_selector_escapes_quotes() {
        let locators = LocatorConfig {
            stage_by_name: ".stage:has-text(\"{name}\")".to_string(),
            ..Default::default()
        };
        assert_eq!(locators.stage("Join \"A\""), ".stage:has-text(\"Join \\\"A\\\"\")");
        assert_eq!(locators.stage_nth("Sort", 1), ".stage:has-text(\"Sort\") >> nth=1");
    }
}
