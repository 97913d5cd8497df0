pub mod playwright;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::detector::hooks;
use crate::errors::{with_retry, RetryConfig, ScanError};
use crate::models::SinkEvent;

pub use playwright::{LaunchOptions, PlaywrightBrowser};

/// Result of a top-level navigation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationOutcome {
    /// URL after redirects.
    pub url: String,
    pub status: Option<u16>,
}

/// A `<meta>` element of the loaded document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaTag {
    pub http_equiv: Option<String>,
    pub name: Option<String>,
    pub content: String,
}

impl MetaTag {
    pub fn is_csp(&self) -> bool {
        self.http_equiv
            .as_deref()
            .map_or(false, |h| h.eq_ignore_ascii_case("content-security-policy"))
    }
}

/// What the engine needs from a rendering environment.
///
/// One instance is owned by one scan session at a time. Infrastructure
/// failures surface as `ScanError::FatalBrowser`; page-level failures as
/// `Navigation` or `Evaluation`.
#[async_trait]
pub trait BrowserAutomation: Send {
    async fn navigate(&mut self, url: &str) -> Result<NavigationOutcome, ScanError>;

    /// Register a script that runs in every new document before page scripts.
    async fn evaluate_before_any_page_script(&mut self, script: &str) -> Result<(), ScanError>;

    /// Evaluate an expression in the current page and return its JSON value.
    async fn evaluate_in_page(&mut self, script: &str) -> Result<serde_json::Value, ScanError>;

    /// Wait for a navigation started from inside the page to settle.
    async fn wait_for_load(&mut self, timeout: Duration) -> Result<(), ScanError>;

    async fn capture_screenshot(&mut self) -> Result<Vec<u8>, ScanError>;

    async fn start_trace(&mut self) -> Result<(), ScanError>;

    async fn stop_trace(&mut self, path: &Path) -> Result<(), ScanError>;

    /// Headers of the last top-level response, names lowercased.
    async fn response_headers(&mut self) -> Result<Vec<(String, String)>, ScanError>;

    async fn meta_tags(&mut self) -> Result<Vec<MetaTag>, ScanError>;

    async fn set_user_agent(&mut self, user_agent: &str) -> Result<(), ScanError>;

    /// Serialized DOM of the current page.
    async fn page_content(&mut self) -> Result<String, ScanError>;

    async fn close(&mut self) -> Result<(), ScanError>;

    /// Sink invocations recorded by the instrumentation since the last reset.
    async fn read_accumulated_sink_events(&mut self) -> Result<Vec<SinkEvent>, ScanError> {
        let value = self.evaluate_in_page(hooks::READ_SINKS).await?;
        Ok(hooks::parse_sink_events(&value))
    }

    /// Session-wide network archive, when the environment records one.
    fn network_archive(&self) -> Option<PathBuf> {
        None
    }
}

/// Top-level navigation, retried with backoff on navigation errors.
pub async fn navigate_with_retry<B: BrowserAutomation + ?Sized>(
    browser: &mut B,
    url: &str,
    retry: &RetryConfig,
) -> Result<NavigationOutcome, ScanError> {
    with_retry("navigate", retry, browser, |b: &mut B| {
        let url = url.to_string();
        Box::pin(async move { b.navigate(&url).await })
    })
    .await
}

/// Enforcement CSP values from response headers and meta tags.
/// Report-only policies are ignored.
pub async fn capture_csp<B: BrowserAutomation + ?Sized>(browser: &mut B) -> Result<(Vec<String>, Vec<String>), ScanError> {
    let headers = browser
        .response_headers()
        .await?
        .into_iter()
        .filter(|(name, _)| name.eq_ignore_ascii_case("content-security-policy"))
        .map(|(_, value)| value)
        .collect();
    let metas = browser
        .meta_tags()
        .await?
        .into_iter()
        .filter(MetaTag::is_csp)
        .map(|m| m.content)
        .collect();
    Ok((headers, metas))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_is_csp() {
        let meta = MetaTag {
            http_equiv: Some("Content-Security-Policy".into()),
            name: None,
            content: "script-src 'self'".into(),
        };
        assert!(meta.is_csp());
        let report_only = MetaTag {
            http_equiv: Some("Content-Security-Policy-Report-Only".into()),
            ..meta.clone()
        };
        assert!(!report_only.is_csp());
    }
}
