pub mod context;
pub mod forms;
pub mod params;

use std::time::Duration;

use tracing::{debug, info, warn};
use url::Url;

use crate::browser::{navigate_with_retry, BrowserAutomation};
use crate::detector::hooks::DISPATCH_HASHCHANGE;
use crate::errors::{RetryConfig, ScanError};
use crate::models::{ContextTag, InjectionPoint, PointKind};

pub use context::infer_context;
pub use forms::{extract_forms, is_security_param, submit_script, DiscoveredForm};
pub use params::{extract_params, with_fragment, with_param, SYNTHETIC_PARAMS};

/// Prefix of the inert markers used to see where values surface.
pub const PROBE_PREFIX: &str = "spkprobe";

fn probe_marker(group: usize, index: usize) -> String {
    format!("{}{}x{}z", PROBE_PREFIX, group, index)
}

/// Finds fuzzable points on the target and tags each with the context its
/// value lands in. Unreflected values default to `html_text`.
#[derive(Debug, Clone)]
pub struct InjectionPointEnumerator {
    pub max_forms: usize,
    pub max_params: usize,
    pub synthetic_params: bool,
    pub retry: RetryConfig,
    /// Wait after an in-page submission or fragment change.
    pub settle: Duration,
}

impl InjectionPointEnumerator {
    /// Form fields in document order. Each form is submitted once with a
    /// distinct marker per fuzzable field.
    pub async fn enumerate_forms<B: BrowserAutomation + ?Sized>(
        &self,
        browser: &mut B,
        target: &Url,
    ) -> Result<Vec<InjectionPoint>, ScanError> {
        if self.max_forms == 0 {
            return Ok(Vec::new());
        }
        if let Err(e) = navigate_with_retry(browser, target.as_str(), &self.retry).await {
            if e.classify().is_fatal() {
                return Err(e);
            }
            warn!(error = %e, "Target did not load, no forms enumerated");
            return Ok(Vec::new());
        }
        let html = browser.page_content().await?;
        let forms = extract_forms(&html, self.max_forms);

        let mut points = Vec::new();
        for (n, form) in forms.into_iter().enumerate() {
            let fields: Vec<String> = form.fuzzable.iter().take(self.max_params).cloned().collect();
            let markers: Vec<(String, String)> = fields
                .iter()
                .enumerate()
                .map(|(i, name)| (name.clone(), probe_marker(n, i)))
                .collect();

            let rendered = match self.submit_probe(browser, target, form.target.form_index, &markers, n > 0).await {
                Ok(html) => html,
                Err(e) if e.classify().is_fatal() => return Err(e),
                Err(e) => {
                    warn!(form = form.target.form_index, error = %e, "Form probe failed, contexts defaulted");
                    String::new()
                }
            };

            for (position, (name, marker)) in markers.iter().enumerate() {
                let context = infer_context(&rendered, marker).unwrap_or(ContextTag::HtmlText);
                debug!(form = form.target.form_index, field = %name, context = %context, "Form field enumerated");
                points.push(InjectionPoint {
                    kind: PointKind::FormField,
                    name: name.clone(),
                    position,
                    context,
                    form: Some(form.target.clone()),
                });
            }
        }
        info!(points = points.len(), "Form fields enumerated");
        Ok(points)
    }

    async fn submit_probe<B: BrowserAutomation + ?Sized>(
        &self,
        browser: &mut B,
        target: &Url,
        form_index: usize,
        markers: &[(String, String)],
        reload: bool,
    ) -> Result<String, ScanError> {
        if reload {
            navigate_with_retry(browser, target.as_str(), &self.retry).await?;
        }
        browser.evaluate_in_page(&submit_script(form_index, markers)).await?;
        if let Err(e) = browser.wait_for_load(self.settle).await {
            if e.classify().is_fatal() {
                return Err(e);
            }
            debug!(form = form_index, error = %e, "Probe response not settled, reading current page");
        }
        browser.page_content().await
    }

    /// Query parameters left to right, probed in a single navigation.
    pub async fn enumerate_url_params<B: BrowserAutomation + ?Sized>(
        &self,
        browser: &mut B,
        target: &Url,
    ) -> Result<Vec<InjectionPoint>, ScanError> {
        let names = extract_params(target, self.max_params, self.synthetic_params);
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let mut probe = target.clone();
        for (i, name) in names.iter().enumerate() {
            probe = with_param(&probe, name, &probe_marker(0, i));
        }

        let rendered = match navigate_with_retry(browser, probe.as_str(), &self.retry).await {
            Ok(_) => browser.page_content().await?,
            Err(e) if e.classify().is_fatal() => return Err(e),
            Err(e) => {
                warn!(error = %e, "Parameter probe failed, contexts defaulted");
                String::new()
            }
        };

        let points: Vec<InjectionPoint> = names
            .into_iter()
            .enumerate()
            .map(|(position, name)| {
                let context = infer_context(&rendered, &probe_marker(0, position)).unwrap_or(ContextTag::HtmlText);
                debug!(param = %name, context = %context, "URL parameter enumerated");
                InjectionPoint {
                    kind: PointKind::UrlParam,
                    name,
                    position,
                    context,
                    form: None,
                }
            })
            .collect();
        info!(points = points.len(), "URL parameters enumerated");
        Ok(points)
    }

    /// The fragment channel, probed after a synthetic fragment change.
    pub async fn fragment_point<B: BrowserAutomation + ?Sized>(
        &self,
        browser: &mut B,
        target: &Url,
    ) -> Result<InjectionPoint, ScanError> {
        let marker = probe_marker(0, 0);
        let probe = with_fragment(target, &marker);
        let rendered = match navigate_with_retry(browser, probe.as_str(), &self.retry).await {
            Ok(_) => {
                if let Err(e) = browser.evaluate_in_page(DISPATCH_HASHCHANGE).await {
                    if e.classify().is_fatal() {
                        return Err(e);
                    }
                }
                tokio::time::sleep(self.settle).await;
                browser.page_content().await?
            }
            Err(e) if e.classify().is_fatal() => return Err(e),
            Err(e) => {
                warn!(error = %e, "Fragment probe failed, context defaulted");
                String::new()
            }
        };
        let context = infer_context(&rendered, &marker).unwrap_or(ContextTag::HtmlText);
        debug!(context = %context, "Fragment enumerated");
        Ok(InjectionPoint::fragment(context))
    }
}
