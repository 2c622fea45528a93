//! Playwright browser automation
//!
//! Each session is a `node` process running a small bridge script. The
//! bridge launches one browser context and executes steps received as JSON
//! lines on stdin, answering each with a JSON line on stdout.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

use crate::driver::{BrowserDriver, BrowserSession, SessionOptions};
use crate::error::{RunnerError, RunnerResult};
use crate::suites::TestStep;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaywrightConfig {
    /// Node.js binary
    pub node_binary: String,
    /// Directory where the `playwright` package resolves
    pub working_dir: Option<PathBuf>,
    pub browser: Browser,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Default timeout for a single browser action
    pub step_timeout_ms: u64,
    /// Time allowed for the browser to launch
    pub launch_timeout_ms: u64,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            node_binary: "node".to_string(),
            working_dir: None,
            browser: Browser::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            step_timeout_ms: 10_000,
            launch_timeout_ms: 30_000,
        }
    }
}

/// Spawns one bridge process per session
pub struct PlaywrightDriver {
    config: PlaywrightConfig,
}

impl PlaywrightDriver {
    pub fn new(config: PlaywrightConfig) -> Self {
        Self { config }
    }

    fn bridge_config(&self, options: &SessionOptions) -> Value {
        json!({
            "base_url": options.base_url.trim_end_matches('/'),
            "browser": self.config.browser.as_str(),
            "headless": self.config.headless,
            "viewport_width": self.config.viewport_width,
            "viewport_height": self.config.viewport_height,
            "step_timeout_ms": self.config.step_timeout_ms,
        })
    }
}

#[async_trait]
impl BrowserDriver for PlaywrightDriver {
    async fn open(&self, options: &SessionOptions) -> RunnerResult<Box<dyn BrowserSession>> {
        let mut command = Command::new(&self.config.node_binary);
        command
            .arg("-e")
            .arg(BRIDGE_JS)
            .env("LOGINLAB_BRIDGE_CONFIG", self.bridge_config(options).to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| {
            RunnerError::Driver(format!("failed to start {}: {}", self.config.node_binary, e))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RunnerError::Driver("bridge stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RunnerError::Driver("bridge stdout unavailable".to_string()))?;

        let mut session = PlaywrightSession {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 0,
            step_timeout: Duration::from_millis(self.config.step_timeout_ms),
        };

        let launch_timeout = Duration::from_millis(self.config.launch_timeout_ms);
        let ready = tokio::time::timeout(launch_timeout, session.read_message(|m| m.get("ready").is_some()))
            .await
            .map_err(|_| RunnerError::Driver("browser launch timed out".to_string()))??;
        if ready.get("ready").and_then(Value::as_bool) != Some(true) {
            let error = ready
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("browser launch failed")
                .to_string();
            let _ = session.child.kill().await;
            return Err(RunnerError::Driver(error));
        }

        debug!(base_url = %options.base_url, "Browser session opened");
        Ok(Box::new(session))
    }
}

struct PlaywrightSession {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    step_timeout: Duration,
}

impl PlaywrightSession {
    /// Read stdout until a JSON message accepted by `want` arrives
    async fn read_message(&mut self, want: impl Fn(&Value) -> bool) -> RunnerResult<Value> {
        loop {
            let line = self
                .stdout
                .next_line()
                .await?
                .ok_or_else(|| RunnerError::Driver("browser bridge exited".to_string()))?;
            match serde_json::from_str::<Value>(&line) {
                Ok(msg) if want(&msg) => return Ok(msg),
                _ => debug!("bridge: {}", line),
            }
        }
    }

    async fn request(&mut self, mut body: Value, timeout: Duration) -> RunnerResult<()> {
        self.next_id += 1;
        let id = self.next_id;
        body["id"] = json!(id);

        let mut line = serde_json::to_string(&body)?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;

        let reply = tokio::time::timeout(
            timeout,
            self.read_message(|m| m.get("id").and_then(Value::as_u64) == Some(id)),
        )
        .await
        .map_err(|_| RunnerError::Driver(format!("no reply from browser within {:?}", timeout)))??;

        if reply.get("ok").and_then(Value::as_bool) == Some(true) {
            Ok(())
        } else {
            Err(RunnerError::Driver(
                reply
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown browser error")
                    .to_string(),
            ))
        }
    }

    /// Bridge-side timeouts fire first; this bound only catches a hung bridge
    fn reply_timeout(&self, step: &TestStep) -> Duration {
        let step_ms = match step {
            TestStep::Wait { timeout_ms, .. } | TestStep::AssertText { timeout_ms, .. } => *timeout_ms,
            TestStep::Sleep { ms } => *ms,
            _ => 0,
        };
        self.step_timeout + Duration::from_millis(step_ms) + Duration::from_secs(5)
    }
}

#[async_trait]
impl BrowserSession for PlaywrightSession {
    async fn run_step(&mut self, step: &TestStep) -> RunnerResult<()> {
        let timeout = self.reply_timeout(step);
        self.request(json!({ "op": "step", "step": step }), timeout)
            .await
            .map_err(|e| RunnerError::StepFailed {
                step: step.name(),
                reason: e.to_string(),
            })
    }

    async fn screenshot(&mut self, path: &Path) -> RunnerResult<()> {
        let timeout = self.step_timeout + Duration::from_secs(5);
        self.request(
            json!({ "op": "screenshot", "path": path.to_string_lossy() }),
            timeout,
        )
        .await
    }

    async fn close(&mut self) -> RunnerResult<()> {
        if let Err(e) = self.request(json!({ "op": "close" }), Duration::from_secs(10)).await {
            debug!("bridge close: {}", e);
        }
        match tokio::time::timeout(Duration::from_secs(5), self.child.wait()).await {
            Ok(_) => Ok(()),
            Err(_) => {
                warn!("Browser bridge did not exit, killing it");
                self.child.kill().await?;
                Ok(())
            }
        }
    }
}

const BRIDGE_JS: &str = r##"
const readline = require('readline');
const playwright = require('playwright');

const cfg = JSON.parse(process.env.LOGINLAB_BRIDGE_CONFIG);
const vars = {};

function reply(msg) {
  process.stdout.write(JSON.stringify(msg) + '\n');
}

function errorText(e) {
  return String((e && e.message) || e);
}

async function runStep(page, step) {
  switch (step.action) {
    case 'navigate':
      await page.goto(cfg.base_url + step.url);
      break;
    case 'fill': {
      const el = page.locator(step.selector).first();
      const tag = await el.evaluate((node) => node.tagName.toLowerCase());
      if (tag === 'select') {
        await el.selectOption(step.value);
      } else {
        if (step.clear_first) await el.fill('');
        await el.pressSequentially(step.value);
      }
      break;
    }
    case 'click':
      await page.locator(step.selector).first().click();
      break;
    case 'wait':
      await page.waitForSelector(step.selector, { state: 'attached', timeout: step.timeout_ms });
      break;
    case 'assert_text': {
      const el = await page.waitForSelector(step.selector, { state: 'attached', timeout: step.timeout_ms });
      const text = ((await el.textContent()) || '').trim();
      if (!text.includes(step.contains)) {
        throw new Error(`expected ${step.selector} to contain "${step.contains}", got "${text}"`);
      }
      break;
    }
    case 'remember':
      vars[step.key] = await page.locator(step.selector).first().getAttribute(step.attribute);
      break;
    case 'assert_remembered': {
      const value = await page.locator(step.selector).first().getAttribute(step.attribute);
      if (value !== vars[step.key]) {
        throw new Error(`expected ${step.attribute} of ${step.selector} to equal "${vars[step.key]}", got "${value}"`);
      }
      break;
    }
    case 'sleep':
      await page.waitForTimeout(step.ms);
      break;
    default:
      throw new Error('unsupported action: ' + step.action);
  }
}

(async () => {
  let browser;
  let page;
  try {
    browser = await playwright[cfg.browser].launch({ headless: cfg.headless });
    const context = await browser.newContext({
      viewport: { width: cfg.viewport_width, height: cfg.viewport_height },
    });
    page = await context.newPage();
    page.setDefaultTimeout(cfg.step_timeout_ms);
    reply({ ready: true });
  } catch (e) {
    reply({ ready: false, error: errorText(e) });
    process.exit(1);
  }

  const rl = readline.createInterface({ input: process.stdin });
  for await (const line of rl) {
    if (!line.trim()) continue;
    let msg;
    try {
      msg = JSON.parse(line);
    } catch (e) {
      continue;
    }
    try {
      if (msg.op === 'step') {
        await runStep(page, msg.step);
      } else if (msg.op === 'screenshot') {
        await page.screenshot({ path: msg.path, fullPage: true });
      } else if (msg.op === 'close') {
        await browser.close();
        reply({ id: msg.id, ok: true });
        process.exit(0);
      }
      reply({ id: msg.id, ok: true });
    } catch (e) {
      reply({ id: msg.id, ok: false, error: errorText(e) });
    }
  }
  await browser.close();
})();
"##;
