use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::browser::{capture_csp, navigate_with_retry, BrowserAutomation};
use crate::config::ScanSettings;
use crate::csp::{resolve_policy, CspPolicy};
use crate::detector::hooks::DISPATCH_HASHCHANGE;
use crate::detector::{Baseline, ExecutionDetector, Observation};
use crate::enumerate::{submit_script, with_fragment, with_param, InjectionPointEnumerator};
use crate::errors::{RetryConfig, ScanError};
use crate::evidence::EvidenceSink;
use crate::models::{
    Candidate, DeliveryMode, EvidenceRefs, ExecutionSignal, Finding, InjectionPoint, PointKind,
    SessionErrorRecord, SessionReport,
};
use crate::payloads::{PayloadCatalog, PayloadSelector, StreamEnd};
use crate::scoring;
use crate::session::ScanSession;
use super::events::ScanEvent;
use super::pacing::Pacer;
use super::stage::{FuzzStage, StageGuard};

/// Wait after an enumeration probe before reading the DOM.
const ENUMERATION_SETTLE: Duration = Duration::from_millis(300);

/// Drives one scan session through its stages. Owns the browser for the
/// whole run and always releases it, whatever path ends the run.
pub struct FuzzOrchestrator {
    target: Url,
    settings: ScanSettings,
    catalog: PayloadCatalog,
    browser: Box<dyn BrowserAutomation>,
    evidence: Arc<dyn EvidenceSink>,
    detector: ExecutionDetector,
    enumerator: InjectionPointEnumerator,
    pacer: Pacer,
    retry: RetryConfig,
    session: ScanSession,
    stage: FuzzStage,
    csp: Option<CspPolicy>,
    tracing_active: bool,
    cancel_token: CancellationToken,
    event_tx: Option<mpsc::UnboundedSender<ScanEvent>>,
}

impl FuzzOrchestrator {
    pub fn new(
        target: Url,
        settings: ScanSettings,
        catalog: PayloadCatalog,
        browser: Box<dyn BrowserAutomation>,
        evidence: Arc<dyn EvidenceSink>,
    ) -> Self {
        let retry = RetryConfig {
            max_retries: settings.navigation_retries,
            backoff_ms: settings.backoff_ms,
        };
        let enumerator = InjectionPointEnumerator {
            max_forms: settings.max_forms,
            max_params: settings.max_params,
            synthetic_params: settings.synthetic_params,
            retry: retry.clone(),
            settle: ENUMERATION_SETTLE,
        };
        let pacer = Pacer::new(
            settings.seed,
            settings.pacing_ms,
            settings.jitter_pct,
            settings.ua_rotation,
            settings.user_agent.clone(),
        );
        let session = ScanSession::new(target.as_str(), settings.seed, settings.budgets());
        Self {
            detector: ExecutionDetector::new(Duration::from_millis(settings.dwell_timeout_ms)),
            target,
            catalog,
            browser,
            evidence,
            enumerator,
            pacer,
            retry,
            session,
            settings,
            stage: FuzzStage::Init,
            csp: None,
            tracing_active: false,
            cancel_token: CancellationToken::new(),
            event_tx: None,
        }
    }

    /// Use an external token; cancellation is honored between attempts only.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn with_event_channel(mut self, tx: mpsc::UnboundedSender<ScanEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Replace the detector, e.g. to shorten its polling interval.
    pub fn with_detector(mut self, detector: ExecutionDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session.id
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    fn emit(&self, event: ScanEvent) {
        if let Some(ref tx) = self.event_tx {
            let _ = tx.send(event);
        }
    }

    async fn note(&self, message: &str) {
        if let Err(e) = self.evidence.log_event(message).await {
            warn!(error = %e, "Workflow log write failed");
        }
    }

    /// Run to `Done` and return the scored report. Fatal errors end the run
    /// early but still produce a report carrying the error record.
    pub async fn run(mut self) -> SessionReport {
        info!(
            session_id = %self.session.id,
            target = %self.target,
            seed = self.settings.seed,
            "Scan started"
        );
        self.emit(ScanEvent::SessionStarted {
            session_id: self.session.id.clone(),
            target: self.target.to_string(),
            seed: self.settings.seed,
        });
        if let Err(e) = self.evidence.begin_session(&self.session.id, self.target.as_str()).await {
            warn!(error = %e, "Evidence sink could not start the session");
        }

        let error = match self.drive().await {
            Ok(()) => None,
            Err(e) => {
                let class = e.classify();
                error!(error_type = class.error_type, stage = %self.stage, error = %e, "Scan aborted");
                self.note(&format!("aborted in {}: {}", self.stage, e)).await;
                Some(SessionErrorRecord {
                    error_type: class.error_type.to_string(),
                    message: e.to_string(),
                })
            }
        };

        self.release_browser().await;
        let last_stage = self.stage;
        self.enter_stage(FuzzStage::Done).await;
        self.finish(error, last_stage).await
    }

    async fn drive(&mut self) -> Result<(), ScanError> {
        self.enter_stage(FuzzStage::Init).await;
        let selector = self.init().await?;
        let mut points: Vec<InjectionPoint> = Vec::new();

        let mut stage = self.stage.next(&self.guard());
        while !stage.is_terminal() {
            self.enter_stage(stage).await;
            match stage {
                FuzzStage::EnumerateForms => {
                    points = self.enumerator.enumerate_forms(self.browser.as_mut(), &self.target).await?;
                    self.session.counter_mut(&FuzzStage::FuzzForms.to_string()).points += points.len();
                }
                FuzzStage::EnumerateUrlParams => {
                    points = self.enumerator.enumerate_url_params(self.browser.as_mut(), &self.target).await?;
                    self.session.counter_mut(&FuzzStage::FuzzUrlParams.to_string()).points += points.len();
                }
                FuzzStage::FuzzForms | FuzzStage::FuzzUrlParams => {
                    let current = std::mem::take(&mut points);
                    self.fuzz_points(&selector, &current).await?;
                }
                FuzzStage::FragmentFallback => {
                    let point = self.enumerator.fragment_point(self.browser.as_mut(), &self.target).await?;
                    self.session.counter_mut(&stage.to_string()).points += 1;
                    self.fuzz_points(&selector, std::slice::from_ref(&point)).await?;
                }
                FuzzStage::Init | FuzzStage::Done => {}
            }
            stage = stage.next(&self.guard());
        }
        Ok(())
    }

    fn guard(&self) -> StageGuard {
        StageGuard {
            fuzz_forms: self.settings.fuzz_forms,
            fuzz_url: self.settings.fuzz_url,
            confirmed: self.session.has_confirmed(),
            budget_exhausted: self.session.payload_budget_exhausted(),
            cancelled: self.cancel_token.is_cancelled(),
            aborted: false,
        }
    }

    async fn enter_stage(&mut self, stage: FuzzStage) {
        self.stage = stage;
        info!(stage = %stage, "Entering {}", stage.display_name());
        self.emit(ScanEvent::StageEntered {
            stage,
            display_name: stage.display_name().to_string(),
        });
        self.note(&format!("stage {}", stage)).await;
    }

    /// User agent, instrumentation, tracing, warm-up and CSP capture.
    async fn init(&mut self) -> Result<PayloadSelector, ScanError> {
        if let Some(ua) = self.pacer.session_user_agent() {
            if let Err(e) = self.browser.set_user_agent(&ua).await {
                if e.classify().is_fatal() {
                    return Err(e);
                }
                warn!(error = %e, "User agent not applied");
            }
        }

        self.detector.install(self.browser.as_mut()).await?;

        if self.settings.trace_on_hit {
            match self.browser.start_trace().await {
                Ok(()) => self.tracing_active = true,
                Err(e) if e.classify().is_fatal() => return Err(e),
                Err(e) => warn!(error = %e, "Tracing unavailable, continuing without traces"),
            }
        }

        if let Some(archive) = self.browser.network_archive() {
            if let Err(e) = self.evidence.register_network_archive(&archive).await {
                warn!(error = %e, "Network archive not registered");
            }
        }

        self.warm_up().await?;

        let loaded = match navigate_with_retry(self.browser.as_mut(), self.target.as_str(), &self.retry).await {
            Ok(outcome) => {
                debug!(url = %outcome.url, status = ?outcome.status, "Target loaded");
                true
            }
            Err(e) if e.classify().is_fatal() => return Err(e),
            Err(e) => {
                warn!(error = %e, "Target did not load, no CSP captured");
                false
            }
        };

        let (headers, metas) = if loaded {
            match capture_csp(self.browser.as_mut()).await {
                Ok(captured) => captured,
                Err(e) if e.classify().is_fatal() => return Err(e),
                Err(e) => {
                    warn!(error = %e, "CSP capture failed");
                    (Vec::new(), Vec::new())
                }
            }
        } else {
            (Vec::new(), Vec::new())
        };

        let policy = resolve_policy(&headers, &metas, self.settings.csp_aware);
        info!(
            source = ?policy.source,
            inline_script = policy.allows_inline_script,
            eval = policy.allows_eval,
            data = policy.allows_data_uri,
            "Effective CSP resolved"
        );
        self.note(&format!("csp {:?}: inline={} eval={}", policy.source, policy.allows_inline_script, policy.allows_eval))
            .await;
        self.csp = Some(policy.clone());

        Ok(PayloadSelector::new(self.catalog.clone(), policy, self.settings.evasion))
    }

    async fn warm_up(&mut self) -> Result<(), ScanError> {
        let wait = Duration::from_millis(self.settings.warmup_wait_ms);
        for i in 0..self.settings.warmup_requests {
            match self.browser.navigate(self.target.as_str()).await {
                Ok(_) => debug!(request = i + 1, "Warm-up navigation"),
                Err(e) if e.classify().is_fatal() => return Err(e),
                Err(e) => debug!(request = i + 1, error = %e, "Warm-up navigation failed, ignored"),
            }
            tokio::time::sleep(wait).await;
        }
        Ok(())
    }

    async fn fuzz_points(&mut self, selector: &PayloadSelector, points: &[InjectionPoint]) -> Result<(), ScanError> {
        for point in points {
            if self.cancel_token.is_cancelled() || self.session.payload_budget_exhausted() {
                break;
            }
            self.fuzz_point(selector, point).await?;
        }
        Ok(())
    }

    /// Offer candidates to one point until it confirms, its stream ends or
    /// a budget runs out.
    async fn fuzz_point(&mut self, selector: &PayloadSelector, point: &InjectionPoint) -> Result<(), ScanError> {
        let label = point.label();
        let mut stream = selector.candidates(point, self.settings.max_payloads_per_point);
        info!(point = %label, context = %point.context, eligible = stream.eligible_len(), "Fuzzing injection point");
        self.emit(ScanEvent::PointStarted {
            point: label.clone(),
            context: point.context.to_string(),
            eligible: stream.eligible_len(),
        });

        loop {
            if self.cancel_token.is_cancelled() {
                info!(point = %label, "Cancelled between attempts");
                break;
            }
            let candidate = match stream.next(&mut self.session) {
                Ok(candidate) => candidate,
                Err(StreamEnd::Exhausted) => {
                    let e = ScanError::CatalogExhausted(label.clone());
                    debug!(error_type = e.classify().error_type, offered = stream.yielded(), "{}", e);
                    break;
                }
                Err(StreamEnd::PointBudget) => {
                    debug!(point = %label, "Per-point payload budget reached");
                    break;
                }
                Err(StreamEnd::GlobalBudget) => {
                    info!(used = self.session.payloads_used(), "Global payload budget exhausted");
                    break;
                }
            };

            let signal = self.attempt(&candidate, selector.policy()).await?;

            let delay = self.pacer.next_delay();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if signal == ExecutionSignal::Confirmed {
                break;
            }
        }
        Ok(())
    }

    /// Deliver one candidate and evaluate its dwell window.
    async fn attempt(&mut self, candidate: &Candidate, policy: &CspPolicy) -> Result<ExecutionSignal, ScanError> {
        let stage_key = self.stage.to_string();
        let label = candidate.point.label();

        if let Some(ua) = self.pacer.attempt_user_agent() {
            if let Err(e) = self.browser.set_user_agent(&ua).await {
                if e.classify().is_fatal() {
                    return Err(e);
                }
                debug!(error = %e, "Per-attempt user agent not applied");
            }
        }

        let baseline = match self.deliver(candidate).await {
            Ok(baseline) => baseline,
            Err(e) if e.classify().is_fatal() => return Err(e),
            Err(e) => {
                warn!(
                    point = %label,
                    template = %candidate.template_id,
                    error_type = e.classify().error_type,
                    error = %e,
                    "Delivery failed, attempt skipped"
                );
                self.session.counter_mut(&stage_key).skipped += 1;
                self.emit(ScanEvent::AttemptCompleted {
                    ordinal: candidate.ordinal,
                    point: label,
                    template_id: candidate.template_id.clone(),
                    signal: ExecutionSignal::None,
                });
                return Ok(ExecutionSignal::None);
            }
        };

        let observation = self
            .detector
            .await_signal(self.browser.as_mut(), &candidate.token, &baseline)
            .await?;

        self.session.counter_mut(&stage_key).attempts += 1;
        self.session
            .affinity_mut()
            .record(&candidate.template_id, &observation.fired_kinds());
        debug!(
            point = %label,
            template = %candidate.template_id,
            token = %candidate.token,
            signal = %observation.signal,
            elapsed_ms = observation.elapsed.as_millis() as u64,
            "Attempt evaluated"
        );
        self.emit(ScanEvent::AttemptCompleted {
            ordinal: candidate.ordinal,
            point: label,
            template_id: candidate.template_id.clone(),
            signal: observation.signal,
        });

        if observation.signal.is_positive() {
            self.record_finding(candidate, &observation, policy).await?;
        }
        Ok(observation.signal)
    }

    /// Put the candidate on the wire through its point's channel and return
    /// the baseline taken right before the payload reached the page.
    async fn deliver(&mut self, candidate: &Candidate) -> Result<Baseline, ScanError> {
        let point = &candidate.point;
        match point.kind {
            PointKind::FormField => {
                let form = point
                    .form
                    .as_ref()
                    .ok_or_else(|| ScanError::Internal(format!("form field {} without form", point.name)))?;
                navigate_with_retry(self.browser.as_mut(), self.target.as_str(), &self.retry).await?;
                let baseline = self.detector.begin_attempt(self.browser.as_mut()).await?;
                let script = submit_script(form.form_index, &[(point.name.clone(), candidate.body.clone())]);
                let submitted = self.browser.evaluate_in_page(&script).await?;
                if submitted.as_bool() == Some(false) {
                    return Err(ScanError::Evaluation(format!("form {} not found", form.form_index)));
                }
                // The payload may already have run on a slow response page;
                // the dwell window still observes it.
                if let Err(e) = self
                    .browser
                    .wait_for_load(Duration::from_millis(self.settings.navigation_timeout_ms))
                    .await
                {
                    if e.classify().is_fatal() {
                        return Err(e);
                    }
                    warn!(
                        point = %point.label(),
                        error_type = e.classify().error_type,
                        error = %e,
                        "Form response did not settle, observing anyway"
                    );
                }
                Ok(baseline)
            }
            PointKind::UrlParam => {
                let url = with_param(&self.target, &point.name, &candidate.body);
                let baseline = self.detector.begin_attempt(self.browser.as_mut()).await?;
                navigate_with_retry(self.browser.as_mut(), url.as_str(), &self.retry).await?;
                Ok(baseline)
            }
            PointKind::Fragment => {
                let url = with_fragment(&self.target, &candidate.body);
                let baseline = self.detector.begin_attempt(self.browser.as_mut()).await?;
                navigate_with_retry(self.browser.as_mut(), url.as_str(), &self.retry).await?;
                if let Err(e) = self.browser.evaluate_in_page(DISPATCH_HASHCHANGE).await {
                    if e.classify().is_fatal() {
                        return Err(e);
                    }
                    debug!(error = %e, "Synthetic hashchange not dispatched");
                }
                Ok(baseline)
            }
        }
    }

    async fn record_finding(
        &mut self,
        candidate: &Candidate,
        observation: &Observation,
        policy: &CspPolicy,
    ) -> Result<(), ScanError> {
        let delivery = if candidate.point.kind == PointKind::Fragment || !observation.token_sinks.is_empty() {
            DeliveryMode::DomBased
        } else {
            DeliveryMode::Reflected
        };
        let mut finding = Finding {
            id: self.session.next_finding_id(),
            point: candidate.point.clone(),
            candidate: candidate.clone(),
            signal: observation.signal,
            delivery,
            sink: observation.token_sinks.first().copied(),
            channels: observation.channels(),
            csp_bypass: observation.signal == ExecutionSignal::Confirmed && policy.restricts_inline(),
            evidence: EvidenceRefs::default(),
        };
        finding.evidence = self.collect_evidence(&finding.evidence_tag()).await?;

        let score = scoring::score(&finding, self.settings.severity_policy);
        let stage_key = self.stage.to_string();
        self.session.counter_mut(&stage_key).findings += 1;
        let recorded = self.session.record_finding(finding);
        info!(
            id = %recorded.id,
            point = %recorded.point.label(),
            template = %recorded.candidate.template_id,
            signal = %recorded.signal,
            delivery = recorded.delivery.as_str(),
            severity = %score.label,
            score = score.score,
            "Finding recorded"
        );
        let event = ScanEvent::FindingRecorded {
            id: recorded.id.clone(),
            point: recorded.point.label(),
            signal: recorded.signal,
            severity: score.label,
            score: score.score,
        };
        let line = format!(
            "finding {} {} {} via {} ({})",
            recorded.id,
            recorded.signal,
            recorded.point.label(),
            recorded.candidate.template_id,
            score.label
        );
        self.emit(event);
        self.note(&line).await;
        Ok(())
    }

    /// Screenshot and, while tracing, the trace cut at this finding.
    async fn collect_evidence(&mut self, tag: &str) -> Result<EvidenceRefs, ScanError> {
        let mut refs = EvidenceRefs::default();

        match self.browser.capture_screenshot().await {
            Ok(png) => match self.evidence.store_screenshot(tag, &png).await {
                Ok(reference) => refs.screenshot = Some(reference),
                Err(e) => warn!(tag, error = %e, "Screenshot not stored"),
            },
            Err(e) if e.classify().is_fatal() => return Err(e),
            Err(e) => warn!(tag, error = %e, "Screenshot capture failed"),
        }

        if self.tracing_active {
            let path = self.evidence.trace_path(tag);
            match self.browser.stop_trace(&path).await {
                Ok(()) => refs.trace = Some(path.display().to_string()),
                Err(e) if e.classify().is_fatal() => return Err(e),
                Err(e) => warn!(tag, error = %e, "Trace not saved"),
            }
            match self.browser.start_trace().await {
                Ok(()) => {}
                Err(e) if e.classify().is_fatal() => return Err(e),
                Err(e) => {
                    warn!(error = %e, "Tracing could not restart");
                    self.tracing_active = false;
                }
            }
        }
        Ok(refs)
    }

    /// Final trace cut and browser shutdown. Errors are logged only.
    async fn release_browser(&mut self) {
        if self.tracing_active {
            let path = self.evidence.trace_path("session");
            if let Err(e) = self.browser.stop_trace(&path).await {
                debug!(error = %e, "Session trace not saved");
            }
            self.tracing_active = false;
        }
        if let Err(e) = self.browser.close().await {
            warn!(error = %e, "Browser close failed");
        }
    }

    async fn finish(self, error: Option<SessionErrorRecord>, last_stage: FuzzStage) -> SessionReport {
        let policy = self.settings.severity_policy;
        let report = SessionReport {
            session_id: self.session.id.clone(),
            target: self.target.to_string(),
            seed: self.session.seed(),
            rng_position: self.session.rng_position(),
            started_at: self.session.started_at,
            finished_at: Utc::now(),
            severity_policy: policy.id().to_string(),
            csp: self.csp.clone(),
            last_stage: last_stage.to_string(),
            payloads_used: self.session.payloads_used(),
            counters: self.session.counters().clone(),
            findings: scoring::score_all(self.session.findings(), policy),
            network_archive: self.browser.network_archive().map(|p| p.display().to_string()),
            error,
        };

        if let Err(e) = self.evidence.finish_session(&report).await {
            warn!(error = %e, "Evidence flush failed");
        }
        info!(
            session_id = %report.session_id,
            findings = report.findings.len(),
            confirmed = report.confirmed_count(),
            payloads = report.payloads_used,
            duration_ms = report.duration_ms(),
            "Scan finished"
        );
        self.emit(ScanEvent::SessionFinished {
            findings: report.findings.len(),
            attempts: report.payloads_used,
            error: report.error.as_ref().map(|e| format!("{}: {}", e.error_type, e.message)),
        });
        report
    }
}
