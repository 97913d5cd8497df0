use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use data_encoding::BASE64;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::errors::ScanError;
use super::{BrowserAutomation, MetaTag, NavigationOutcome};

/// Settings for the Chromium context driven by the Node.js Playwright driver.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub navigation_timeout_ms: u64,
    /// Context user agent; `None` keeps Chromium's default.
    pub user_agent: Option<String>,
    /// Record a HAR for the whole session here.
    pub har_path: Option<PathBuf>,
    /// `node` executable.
    pub node: String,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            navigation_timeout_ms: 15_000,
            user_agent: None,
            har_path: None,
            node: "node".to_string(),
        }
    }
}

/// Chromium driven through Playwright in a Node.js child process.
///
/// Commands and replies are JSON lines over stdin/stdout. The child is
/// killed when this value is dropped, so the browser never outlives the
/// session on any exit path.
pub struct PlaywrightBrowser {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    command_timeout: Duration,
    har_path: Option<PathBuf>,
}

impl PlaywrightBrowser {
    pub async fn launch(options: &LaunchOptions) -> Result<Self, ScanError> {
        let driver_opts = json!({
            "headless": options.headless,
            "timeout": options.navigation_timeout_ms,
            "userAgent": options.user_agent,
            "har": options.har_path.as_ref().map(|p| p.display().to_string()),
        });

        let mut child = Command::new(&options.node)
            .arg("-e")
            .arg(DRIVER_SCRIPT)
            .env("SINKPROBE_DRIVER_OPTS", driver_opts.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ScanError::FatalBrowser(format!("failed to start {}: {}", options.node, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ScanError::FatalBrowser("driver stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ScanError::FatalBrowser("driver stdout unavailable".into()))?;

        let mut browser = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 1,
            // Navigation can take the full page timeout plus driver overhead.
            command_timeout: Duration::from_millis(options.navigation_timeout_ms + 10_000),
            har_path: options.har_path.clone(),
        };

        match browser.read_reply(0).await? {
            Ok(_) => {
                info!(headless = options.headless, "Playwright driver ready");
                Ok(browser)
            }
            Err(e) => Err(ScanError::FatalBrowser(format!("driver failed to start: {}", e))),
        }
    }

    async fn read_reply(&mut self, id: u64) -> Result<Result<Value, String>, ScanError> {
        let timeout = self.command_timeout;
        let read = async {
            loop {
                let line = self
                    .stdout
                    .next_line()
                    .await
                    .map_err(|e| ScanError::FatalBrowser(format!("driver read failed: {}", e)))?
                    .ok_or_else(|| ScanError::FatalBrowser("driver exited".into()))?;
                let reply: Value = match serde_json::from_str(&line) {
                    Ok(v) => v,
                    Err(_) => {
                        debug!(line = %line, "Ignoring non-protocol driver output");
                        continue;
                    }
                };
                if reply.get("fatal").and_then(Value::as_bool).unwrap_or(false) {
                    let msg = reply.get("error").and_then(Value::as_str).unwrap_or("unknown");
                    return Err(ScanError::FatalBrowser(msg.to_string()));
                }
                if reply.get("id").and_then(Value::as_u64) != Some(id) {
                    continue;
                }
                return Ok(if reply.get("ok").and_then(Value::as_bool).unwrap_or(false) {
                    Ok(reply.get("result").cloned().unwrap_or(Value::Null))
                } else {
                    Err(reply
                        .get("error")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error")
                        .to_string())
                });
            }
        };
        tokio::time::timeout(timeout, read)
            .await
            .map_err(|_| ScanError::FatalBrowser(format!("driver unresponsive after {:?}", timeout)))?
    }

    /// Send a command. The outer error means the driver is gone; the inner
    /// one is the page-level failure message.
    async fn send(&mut self, mut cmd: Value) -> Result<Result<Value, String>, ScanError> {
        let id = self.next_id;
        self.next_id += 1;
        cmd["id"] = json!(id);
        let mut line = cmd.to_string();
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| ScanError::FatalBrowser(format!("driver write failed: {}", e)))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| ScanError::FatalBrowser(format!("driver write failed: {}", e)))?;
        self.read_reply(id).await
    }
}

#[async_trait]
impl BrowserAutomation for PlaywrightBrowser {
    async fn navigate(&mut self, url: &str) -> Result<NavigationOutcome, ScanError> {
        let reply = self
            .send(json!({"action": "navigate", "url": url}))
            .await?
            .map_err(|e| ScanError::navigation(url, e))?;
        Ok(serde_json::from_value(reply).unwrap_or_else(|_| NavigationOutcome {
            url: url.to_string(),
            status: None,
        }))
    }

    async fn evaluate_before_any_page_script(&mut self, script: &str) -> Result<(), ScanError> {
        self.send(json!({"action": "init_script", "script": script}))
            .await?
            .map_err(ScanError::Evaluation)?;
        Ok(())
    }

    async fn evaluate_in_page(&mut self, script: &str) -> Result<Value, ScanError> {
        self.send(json!({"action": "evaluate", "script": script}))
            .await?
            .map_err(ScanError::Evaluation)
    }

    async fn wait_for_load(&mut self, timeout: Duration) -> Result<(), ScanError> {
        self.send(json!({"action": "wait_load", "timeout": timeout.as_millis() as u64}))
            .await?
            .map_err(|e| ScanError::navigation("(in-page)", e))?;
        Ok(())
    }

    async fn capture_screenshot(&mut self) -> Result<Vec<u8>, ScanError> {
        let reply = self
            .send(json!({"action": "screenshot"}))
            .await?
            .map_err(ScanError::Evidence)?;
        let encoded = reply
            .as_str()
            .ok_or_else(|| ScanError::Evidence("screenshot reply is not a string".into()))?;
        BASE64
            .decode(encoded.as_bytes())
            .map_err(|e| ScanError::Evidence(format!("screenshot decode: {}", e)))
    }

    async fn start_trace(&mut self) -> Result<(), ScanError> {
        self.send(json!({"action": "trace_start"}))
            .await?
            .map_err(ScanError::Evidence)?;
        Ok(())
    }

    async fn stop_trace(&mut self, path: &Path) -> Result<(), ScanError> {
        self.send(json!({"action": "trace_stop", "path": path.display().to_string()}))
            .await?
            .map_err(ScanError::Evidence)?;
        Ok(())
    }

    async fn response_headers(&mut self) -> Result<Vec<(String, String)>, ScanError> {
        let reply = self
            .send(json!({"action": "headers"}))
            .await?
            .map_err(ScanError::Evaluation)?;
        let headers = reply
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|h| {
                        let name = h.get("name")?.as_str()?.to_ascii_lowercase();
                        let value = h.get("value")?.as_str()?.to_string();
                        Some((name, value))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(headers)
    }

    async fn meta_tags(&mut self) -> Result<Vec<MetaTag>, ScanError> {
        let reply = self
            .send(json!({"action": "meta"}))
            .await?
            .map_err(ScanError::Evaluation)?;
        Ok(serde_json::from_value(reply).unwrap_or_default())
    }

    async fn set_user_agent(&mut self, user_agent: &str) -> Result<(), ScanError> {
        self.send(json!({"action": "user_agent", "value": user_agent}))
            .await?
            .map_err(ScanError::Evaluation)?;
        Ok(())
    }

    async fn page_content(&mut self) -> Result<String, ScanError> {
        let reply = self
            .send(json!({"action": "content"}))
            .await?
            .map_err(ScanError::Evaluation)?;
        Ok(reply.as_str().unwrap_or_default().to_string())
    }

    async fn close(&mut self) -> Result<(), ScanError> {
        match self.send(json!({"action": "close"})).await {
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Driver did not close cleanly"),
        }
        let _ = self.child.kill().await;
        Ok(())
    }

    fn network_archive(&self) -> Option<PathBuf> {
        self.har_path.clone()
    }
}

const DRIVER_SCRIPT: &str = r#"
const readline = require('readline');
const pw = require('playwright');
const send = (obj) => process.stdout.write(JSON.stringify(obj) + '\n');

(async () => {
  const opts = JSON.parse(process.env.SINKPROBE_DRIVER_OPTS || '{}');
  const browser = await pw.chromium.launch({headless: opts.headless !== false});
  const ctxOpts = {ignoreHTTPSErrors: true};
  if (opts.userAgent) ctxOpts.userAgent = opts.userAgent;
  if (opts.har) ctxOpts.recordHar = {path: opts.har};
  const context = await browser.newContext(ctxOpts);
  const page = await context.newPage();
  page.setDefaultTimeout(opts.timeout || 15000);
  let lastResponse = null;
  send({id: 0, ok: true, result: 'ready'});

  const rl = readline.createInterface({input: process.stdin});
  for await (const line of rl) {
    let cmd;
    try { cmd = JSON.parse(line); } catch (e) { continue; }
    try {
      let result = null;
      switch (cmd.action) {
        case 'navigate':
          lastResponse = await page.goto(cmd.url, {waitUntil: 'domcontentloaded'});
          result = {url: page.url(), status: lastResponse ? lastResponse.status() : null};
          break;
        case 'init_script':
          await context.addInitScript(cmd.script);
          break;
        case 'evaluate':
          result = await page.evaluate(cmd.script);
          break;
        case 'wait_load':
          await page.waitForLoadState('domcontentloaded', {timeout: cmd.timeout});
          break;
        case 'screenshot':
          result = (await page.screenshot({fullPage: true})).toString('base64');
          break;
        case 'trace_start':
          await context.tracing.start({screenshots: true, snapshots: true, sources: true});
          break;
        case 'trace_stop':
          await context.tracing.stop({path: cmd.path});
          break;
        case 'headers':
          result = lastResponse ? await lastResponse.headersArray() : [];
          break;
        case 'meta':
          result = await page.$$eval('meta', (ms) => ms.map((m) => ({
            http_equiv: m.getAttribute('http-equiv'),
            name: m.getAttribute('name'),
            content: m.getAttribute('content') || '',
          })));
          break;
        case 'user_agent':
          await context.setExtraHTTPHeaders({'User-Agent': cmd.value});
          break;
        case 'content':
          result = await page.content();
          break;
        case 'close':
          await context.close();
          await browser.close();
          send({id: cmd.id, ok: true, result: null});
          process.exit(0);
        default:
          throw new Error('unknown action ' + cmd.action);
      }
      send({id: cmd.id, ok: true, result: result === undefined ? null : result});
    } catch (e) {
      send({id: cmd.id, ok: false, error: String((e && e.message) || e)});
    }
  }
})().catch((e) => {
  send({id: 0, ok: false, fatal: true, error: String(e)});
  process.exit(1);
});
"#;
