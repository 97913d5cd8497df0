#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use url::Url;

use sinkprobe::browser::{BrowserAutomation, MetaTag, NavigationOutcome};
use sinkprobe::config::ScanSettings;
use sinkprobe::detector::hooks;
use sinkprobe::errors::ScanError;
use sinkprobe::evidence::EvidenceSink;
use sinkprobe::models::{SessionReport, SinkKind};

/// First canary token in `s`.
pub fn token_in(s: &str) -> Option<String> {
    let re = Regex::new(r"spk[0-9a-f]{12}").unwrap();
    re.find(s).map(|m| m.as_str().to_string())
}

/// One rendered document of the fake target.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub html: String,
    pub title: String,
    pub headers: Vec<(String, String)>,
    pub metas: Vec<MetaTag>,
    pub sinks: Vec<(SinkKind, String)>,
    /// Title assignments made by page script.
    pub titles: Vec<String>,
    /// Tokens seen in executable-looking inserted nodes.
    pub mutations: Vec<String>,
}

impl Page {
    pub fn html(html: impl Into<String>) -> Self {
        Self { html: html.into(), title: "Fake".into(), ..Default::default() }
    }

    /// Simulate a payload that ran and wrote its token to the title.
    pub fn executed(mut self, token: &str) -> Self {
        self.title = token.to_string();
        self.titles.push(token.to_string());
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.to_string()));
        self
    }
}

/// Server and client behavior of a fake target.
pub trait Site: Send + Sync {
    fn load(&self, url: &Url) -> Page;

    fn submit(&self, _url: &Url, _form_index: usize, _values: &[(String, String)]) -> Page {
        Page::html("<html><body>submitted</body></html>")
    }

    /// Sink calls a client-side router makes on a fragment change.
    fn hashchange(&self, _url: &Url) -> Vec<(SinkKind, String)> {
        Vec::new()
    }
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub url: Option<Url>,
    pub page: Page,
    pub navigations: Vec<String>,
    pub submissions: Vec<(usize, Vec<(String, String)>)>,
    pub user_agents: Vec<String>,
    pub init_scripts: usize,
    pub traces: Vec<PathBuf>,
    pub tracing: bool,
    pub closed: bool,
    /// Navigations that fail before the next one succeeds.
    pub fail_navigations: u32,
    /// Every navigation after this many fails fatally.
    pub fatal_after: Option<usize>,
    /// The load wait after a form submission times out.
    pub slow_submits: bool,
    submitted: bool,
}

/// Scripted `BrowserAutomation` over a [`Site`].
pub struct FakeBrowser {
    site: Arc<dyn Site>,
    state: Arc<Mutex<FakeState>>,
}

impl FakeBrowser {
    pub fn new(site: impl Site + 'static) -> (Self, Arc<Mutex<FakeState>>) {
        let state = Arc::new(Mutex::new(FakeState::default()));
        (Self { site: Arc::new(site), state: state.clone() }, state)
    }

    fn check_alive(&self) -> Result<(), ScanError> {
        if self.state.lock().unwrap().closed {
            return Err(ScanError::FatalBrowser("browser closed".into()));
        }
        Ok(())
    }

    fn submit(&self, script: &str) -> Value {
        let Some(idx) = script
            .split("document.forms[")
            .nth(1)
            .and_then(|rest| rest.split(']').next())
            .and_then(|n| n.parse::<usize>().ok())
        else {
            return Value::Bool(false);
        };
        let values = parse_assignments(script);
        let mut st = self.state.lock().unwrap();
        let Some(url) = st.url.clone() else {
            return Value::Bool(false);
        };
        st.page = self.site.submit(&url, idx, &values);
        st.submissions.push((idx, values));
        st.submitted = true;
        Value::Bool(true)
    }
}

/// Pull `set("name","value")` pairs out of a form submission script.
fn parse_assignments(script: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut rest = script;
    while let Some(pos) = rest.find("set(\"") {
        rest = &rest[pos + 4..];
        let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<String>();
        let Some(Ok(name)) = stream.next() else { break };
        let offset = stream.byte_offset();
        rest = &rest[offset..];
        let Some(after_comma) = rest.strip_prefix(',') else { break };
        let mut stream = serde_json::Deserializer::from_str(after_comma).into_iter::<String>();
        let Some(Ok(value)) = stream.next() else { break };
        rest = &after_comma[stream.byte_offset()..];
        out.push((name, value));
    }
    out
}

#[async_trait]
impl BrowserAutomation for FakeBrowser {
    async fn navigate(&mut self, url: &str) -> Result<NavigationOutcome, ScanError> {
        self.check_alive()?;
        let parsed = Url::parse(url).map_err(|e| ScanError::navigation(url, e.to_string()))?;
        let mut st = self.state.lock().unwrap();
        st.navigations.push(url.to_string());
        if let Some(limit) = st.fatal_after {
            if st.navigations.len() > limit {
                return Err(ScanError::FatalBrowser("target closed".into()));
            }
        }
        if st.fail_navigations > 0 {
            st.fail_navigations -= 1;
            return Err(ScanError::navigation(url, "net::ERR_CONNECTION_RESET"));
        }
        st.page = self.site.load(&parsed);
        st.url = Some(parsed);
        st.submitted = false;
        Ok(NavigationOutcome { url: url.to_string(), status: Some(200) })
    }

    async fn evaluate_before_any_page_script(&mut self, _script: &str) -> Result<(), ScanError> {
        self.check_alive()?;
        self.state.lock().unwrap().init_scripts += 1;
        Ok(())
    }

    async fn evaluate_in_page(&mut self, script: &str) -> Result<Value, ScanError> {
        self.check_alive()?;
        if script == hooks::RESET_BUFFERS {
            let mut st = self.state.lock().unwrap();
            st.page.sinks.clear();
            st.page.titles.clear();
            st.page.mutations.clear();
            return Ok(json!({"title": st.page.title}));
        }
        if script == hooks::READ_SINKS {
            let st = self.state.lock().unwrap();
            let items: Vec<Value> = st
                .page
                .sinks
                .iter()
                .map(|(kind, detail)| json!({"name": kind.hook_name(), "detail": detail, "ts": 1.0}))
                .collect();
            return Ok(Value::Array(items));
        }
        if script == hooks::READ_CANARIES {
            let st = self.state.lock().unwrap();
            return Ok(json!({
                "title": st.page.title,
                "titles": st.page.titles,
                "mutations": st.page.mutations,
            }));
        }
        if script == hooks::DISPATCH_HASHCHANGE {
            let mut st = self.state.lock().unwrap();
            if let Some(url) = st.url.clone() {
                let sinks = self.site.hashchange(&url);
                st.page.sinks.extend(sinks);
            }
            return Ok(Value::Bool(true));
        }
        if script.contains("document.forms[") {
            return Ok(self.submit(script));
        }
        Ok(Value::Null)
    }

    async fn wait_for_load(&mut self, timeout: Duration) -> Result<(), ScanError> {
        self.check_alive()?;
        let st = self.state.lock().unwrap();
        if st.slow_submits && st.submitted {
            let url = st.url.as_ref().map(Url::to_string).unwrap_or_default();
            return Err(ScanError::navigation(url, format!("load not settled after {:?}", timeout)));
        }
        Ok(())
    }

    async fn capture_screenshot(&mut self) -> Result<Vec<u8>, ScanError> {
        self.check_alive()?;
        Ok(b"\x89PNG\r\n".to_vec())
    }

    async fn start_trace(&mut self) -> Result<(), ScanError> {
        self.state.lock().unwrap().tracing = true;
        Ok(())
    }

    async fn stop_trace(&mut self, path: &Path) -> Result<(), ScanError> {
        let mut st = self.state.lock().unwrap();
        st.tracing = false;
        st.traces.push(path.to_path_buf());
        Ok(())
    }

    async fn response_headers(&mut self) -> Result<Vec<(String, String)>, ScanError> {
        Ok(self.state.lock().unwrap().page.headers.clone())
    }

    async fn meta_tags(&mut self) -> Result<Vec<MetaTag>, ScanError> {
        Ok(self.state.lock().unwrap().page.metas.clone())
    }

    async fn set_user_agent(&mut self, user_agent: &str) -> Result<(), ScanError> {
        self.check_alive()?;
        self.state.lock().unwrap().user_agents.push(user_agent.to_string());
        Ok(())
    }

    async fn page_content(&mut self) -> Result<String, ScanError> {
        self.check_alive()?;
        Ok(self.state.lock().unwrap().page.html.clone())
    }

    async fn close(&mut self) -> Result<(), ScanError> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryEvidence {
    pub session: Option<(String, String)>,
    pub lines: Vec<String>,
    pub screenshots: Vec<String>,
    pub archives: Vec<PathBuf>,
    pub report: Option<SessionReport>,
}

/// In-memory `EvidenceSink`.
#[derive(Debug, Default)]
pub struct MemoryEvidenceSink {
    pub inner: Mutex<MemoryEvidence>,
}

impl MemoryEvidenceSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lines(&self) -> Vec<String> {
        self.inner.lock().unwrap().lines.clone()
    }

    pub fn screenshots(&self) -> Vec<String> {
        self.inner.lock().unwrap().screenshots.clone()
    }

    pub fn report(&self) -> Option<SessionReport> {
        self.inner.lock().unwrap().report.clone()
    }
}

#[async_trait]
impl EvidenceSink for MemoryEvidenceSink {
    async fn begin_session(&self, session_id: &str, target: &str) -> Result<(), ScanError> {
        self.inner.lock().unwrap().session = Some((session_id.to_string(), target.to_string()));
        Ok(())
    }

    async fn log_event(&self, message: &str) -> Result<(), ScanError> {
        self.inner.lock().unwrap().lines.push(message.to_string());
        Ok(())
    }

    async fn store_screenshot(&self, tag: &str, _png: &[u8]) -> Result<String, ScanError> {
        let reference = format!("mem://evidences/hit_{}.png", tag);
        self.inner.lock().unwrap().screenshots.push(reference.clone());
        Ok(reference)
    }

    fn trace_path(&self, tag: &str) -> PathBuf {
        PathBuf::from("/mem/trace").join(format!("trace_{}.zip", tag))
    }

    async fn register_network_archive(&self, path: &Path) -> Result<(), ScanError> {
        self.inner.lock().unwrap().archives.push(path.to_path_buf());
        Ok(())
    }

    async fn finish_session(&self, report: &SessionReport) -> Result<(), ScanError> {
        self.inner.lock().unwrap().report = Some(report.clone());
        Ok(())
    }
}

/// Settings tuned for paused-clock tests. Fake pages send no CSP, so the
/// policy is ignored unless a test opts back in.
pub fn test_settings() -> ScanSettings {
    ScanSettings {
        csp_aware: false,
        dwell_timeout_ms: 800,
        backoff_ms: 0,
        warmup_wait_ms: 0,
        max_payloads: 60,
        max_payloads_per_point: 8,
        ..ScanSettings::default()
    }
}

/// Query parameter `name` of `url`, decoded.
pub fn param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs().find(|(k, _)| k == name).map(|(_, v)| v.to_string())
}
