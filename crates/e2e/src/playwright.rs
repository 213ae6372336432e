//! Playwright browser automation
//!
//! A single long-lived `node` process owns the browser. Requests go to it as
//! JSON lines on stdin and replies come back as JSON lines on stdout, so page
//! state (login cookies, the open pipeline) survives between calls.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stagewise_common::{BrowserKind, HarnessConfig};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::browser::BrowserSession;
use crate::error::{E2eError, E2eResult};

const BRIDGE_SCRIPT: &str = r#"
const { createInterface } = require('readline');
const pw = require(require.resolve('playwright', { paths: [process.cwd()] }));

(async () => {
  const browser = await pw[process.env.PW_BROWSER].launch({ headless: process.env.PW_HEADLESS === '1' });
  const context = await browser.newContext({
    viewport: { width: Number(process.env.PW_WIDTH), height: Number(process.env.PW_HEIGHT) }
  });
  const page = await context.newPage();
  const baseUrl = process.env.PW_BASE_URL;
  const send = (msg) => process.stdout.write(JSON.stringify(msg) + '\n');
  const missing = (e) => e && e.name === 'TimeoutError';

  const ops = {
    navigate: async (req) => { await page.goto(baseUrl + req.path, { timeout: req.timeout }); return null; },
    wait_visible: async (req) => {
      try { await page.locator(req.selector).first().waitFor({ state: 'visible', timeout: req.timeout }); return true; }
      catch (e) { if (missing(e)) return false; throw e; }
    },
    click: async (req) => {
      try { await page.locator(req.selector).first().click({ timeout: req.timeout }); return true; }
      catch (e) { if (missing(e)) return false; throw e; }
    },
    fill: async (req) => {
      const loc = page.locator(req.selector).first();
      if (await loc.count() === 0) return false;
      await loc.fill(req.text, { timeout: req.timeout });
      return true;
    },
    text: async (req) => {
      const loc = page.locator(req.selector).first();
      if (await loc.count() === 0) return null;
      return (await loc.innerText({ timeout: req.timeout })).trim();
    },
    texts: async (req) => (await page.locator(req.selector).allInnerTexts()).map((t) => t.trim()),
    screenshot: async (req) => { await page.screenshot({ path: req.path, fullPage: true }); return req.path; },
  };

  send({ ready: true });
  const rl = createInterface({ input: process.stdin });
  for await (const line of rl) {
    if (!line.trim()) continue;
    const req = JSON.parse(line);
    try {
      send({ id: req.id, ok: true, value: await ops[req.op](req) });
    } catch (e) {
      send({ id: req.id, ok: false, error: String((e && e.message) || e) });
    }
  }
  await browser.close();
})().catch((e) => { process.stderr.write(String((e && e.stack) || e) + '\n'); process.exit(1); });
"#;

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub base_url: String,
    pub screenshot_dir: PathBuf,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub browser: BrowserKind,
    pub headless: bool,
    /// Default wait for element lookups
    pub element_timeout: Duration,
    pub page_load_timeout: Duration,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            screenshot_dir: PathBuf::from("test-results/screenshots"),
            viewport_width: 1280,
            viewport_height: 720,
            browser: BrowserKind::Chromium,
            headless: true,
            element_timeout: Duration::from_secs(10),
            page_load_timeout: Duration::from_secs(60),
        }
    }
}

impl From<&HarnessConfig> for PlaywrightConfig {
    fn from(config: &HarnessConfig) -> Self {
        Self {
            base_url: config.base_url().to_string(),
            screenshot_dir: config.paths.screenshots.clone(),
            viewport_width: config.browser.viewport_width,
            viewport_height: config.browser.viewport_height,
            browser: config.browser.browser,
            headless: config.browser.headless,
            element_timeout: config.browser.implicit_timeout(),
            page_load_timeout: config.browser.page_load_timeout(),
        }
    }
}

#[derive(Debug, Serialize)]
struct BridgeRequest<'a> {
    id: u64,
    op: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    selector: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    timeout: u64,
}

impl<'a> BridgeRequest<'a> {
    fn new(op: &'static str, timeout: Duration) -> Self {
        Self {
            id: 0,
            op,
            selector: None,
            text: None,
            path: None,
            timeout: timeout.as_millis() as u64,
        }
    }

    fn selector(mut self, selector: &'a str) -> Self {
        self.selector = Some(selector);
        self
    }
}

#[derive(Debug, Deserialize)]
struct BridgeResponse {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    error: Option<String>,
}

struct BridgeProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl BridgeProcess {
    /// Next JSON reply line; anything else on stdout is logged and skipped
    async fn read_response(&mut self) -> E2eResult<BridgeResponse> {
        loop {
            let line = self
                .stdout
                .next_line()
                .await?
                .ok_or_else(|| E2eError::Playwright("browser bridge exited unexpectedly".to_string()))?;
            match serde_json::from_str::<BridgeResponse>(&line) {
                Ok(response) => return Ok(response),
                Err(_) => debug!("[bridge] {}", line),
            }
        }
    }
}

/// Browser session backed by a persistent Playwright process
pub struct PlaywrightSession {
    config: PlaywrightConfig,
    bridge: Mutex<BridgeProcess>,
    next_id: AtomicU64,
    // Holds the bridge script for the lifetime of the process
    _script_dir: TempDir,
}

impl PlaywrightSession {
    /// Start the browser. Fails with `PlaywrightNotFound` when the
    /// Playwright CLI is not installed.
    pub async fn launch(config: PlaywrightConfig) -> E2eResult<Self> {
        Self::check_playwright_installed()?;

        std::fs::create_dir_all(&config.screenshot_dir)?;
        let mut config = config;
        config.screenshot_dir = std::fs::canonicalize(&config.screenshot_dir)?;

        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("bridge.js");
        std::fs::write(&script_path, BRIDGE_SCRIPT)?;

        info!(
            "Launching {} (headless: {}) against {}",
            config.browser.as_str(),
            config.headless,
            config.base_url
        );

        let mut child = TokioCommand::new("node")
            .arg(&script_path)
            .env("PW_BROWSER", config.browser.as_str())
            .env("PW_HEADLESS", if config.headless { "1" } else { "0" })
            .env("PW_WIDTH", config.viewport_width.to_string())
            .env("PW_HEIGHT", config.viewport_height.to_string())
            .env("PW_BASE_URL", &config.base_url)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::Playwright("bridge stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Playwright("bridge stdout unavailable".to_string()))?;

        let mut bridge = BridgeProcess {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        };

        let ready = tokio::time::timeout(config.page_load_timeout, bridge.read_response())
            .await
            .map_err(|_| E2eError::Playwright("browser did not start in time".to_string()))??;
        if !ready.ready {
            return Err(E2eError::Playwright("unexpected first message from bridge".to_string()));
        }

        Ok(Self {
            config,
            bridge: Mutex::new(bridge),
            next_id: AtomicU64::new(1),
            _script_dir: script_dir,
        })
    }

    /// Check if Playwright is installed
    fn check_playwright_installed() -> E2eResult<()> {
        let output = Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match output {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    pub fn config(&self) -> &PlaywrightConfig {
        &self.config
    }

    /// Close the browser and wait for the bridge to exit
    pub async fn close(self) -> E2eResult<()> {
        let mut bridge = self.bridge.into_inner();
        drop(bridge.stdin);
        match tokio::time::timeout(Duration::from_secs(10), bridge.child.wait()).await {
            Ok(status) => {
                debug!("Browser bridge exited: {}", status?);
            }
            Err(_) => {
                warn!("Browser bridge did not exit; killing it");
                bridge.child.kill().await?;
            }
        }
        Ok(())
    }

    async fn call(&self, mut request: BridgeRequest<'_>) -> E2eResult<Value> {
        request.id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let op = request.op;
        let id = request.id;
        // The bridge answers only after its own timeout, so allow some slack
        let deadline = Duration::from_millis(request.timeout) + self.config.page_load_timeout;

        let mut line = serde_json::to_string(&request)?;
        line.push('\n');

        let mut bridge = self.bridge.lock().await;
        bridge.stdin.write_all(line.as_bytes()).await?;
        bridge.stdin.flush().await?;

        let response = tokio::time::timeout(deadline, async {
            loop {
                let response = bridge.read_response().await?;
                if response.id == Some(id) {
                    return Ok::<_, E2eError>(response);
                }
                debug!("Skipping stale bridge reply {:?}", response.id);
            }
        })
        .await
        .map_err(|_| E2eError::Playwright(format!("{} did not answer within {:?}", op, deadline)))??;

        if response.ok {
            Ok(response.value)
        } else {
            Err(E2eError::Playwright(format!(
                "{} failed: {}",
                op,
                response.error.unwrap_or_else(|| "unknown error".to_string())
            )))
        }
    }
}

/// File-system friendly form of a screenshot name
fn screenshot_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    format!("{}-{}.png", cleaned, chrono::Utc::now().format("%Y%m%d%H%M%S%3f"))
}

#[async_trait]
impl BrowserSession for PlaywrightSession {
    async fn navigate(&self, path: &str) -> E2eResult<()> {
        debug!("Navigating to {}", path);
        let mut request = BridgeRequest::new("navigate", self.config.page_load_timeout);
        request.path = Some(path.to_string());
        self.call(request).await.map(|_| ())
    }

    async fn wait_visible(&self, selector: &str, timeout: Duration) -> E2eResult<bool> {
        let value = self
            .call(BridgeRequest::new("wait_visible", timeout).selector(selector))
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn click(&self, selector: &str, timeout: Duration) -> E2eResult<bool> {
        let value = self.call(BridgeRequest::new("click", timeout).selector(selector)).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn type_text(&self, selector: &str, text: &str) -> E2eResult<bool> {
        let mut request = BridgeRequest::new("fill", self.config.element_timeout).selector(selector);
        request.text = Some(text);
        let value = self.call(request).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn get_text(&self, selector: &str) -> E2eResult<Option<String>> {
        let value = self
            .call(BridgeRequest::new("text", self.config.element_timeout).selector(selector))
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn get_texts(&self, selector: &str) -> E2eResult<Vec<String>> {
        let value = self
            .call(BridgeRequest::new("texts", self.config.element_timeout).selector(selector))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn screenshot(&self, name: &str) -> E2eResult<PathBuf> {
        let path = self.config.screenshot_dir.join(screenshot_file_name(name));
        let mut request = BridgeRequest::new("screenshot", self.config.page_load_timeout);
        request.path = Some(path.to_string_lossy().into_owned());
        self.call(request).await?;
        info!("Screenshot saved: {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_shape() {
        let mut request = BridgeRequest::new("click", Duration::from_secs(5)).selector("#run");
        request.id = 7;
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"id": 7, "op": "click", "selector": "#run", "timeout": 5000})
        );
    }

    #[test]
    fn test_response_parsing() {
        let ready: BridgeResponse = serde_json::from_str(r#"{"ready":true}"#).unwrap();
        assert!(ready.ready);
        assert_eq!(ready.id, None);

        let failed: BridgeResponse =
            serde_json::from_str(r#"{"id":3,"ok":false,"error":"detached"}"#).unwrap();
        assert!(!failed.ok);
        assert_eq!(failed.error.as_deref(), Some("detached"));
    }

    #[test]
    fn test_screenshot_file_name() {
        let name = screenshot_file_name("stage Join/failed");
        assert!(name.starts_with("stage-Join-failed-"));
        assert!(name.ends_with(".png"));
    }

    #[test]
    fn test_config_from_harness() {
        let mut harness = HarnessConfig::default();
        harness.api.base_url = "http://ui.local/".to_string();
        harness.browser.headless = true;
        let config = PlaywrightConfig::from(&harness);
        assert_eq!(config.base_url, "http://ui.local");
        assert!(config.headless);
        assert_eq!(config.viewport_width, harness.browser.viewport_width);
    }
}
