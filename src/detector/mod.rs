pub mod hooks;

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::browser::BrowserAutomation;
use crate::errors::ScanError;
use crate::models::{ExecutionSignal, SignalChannel, SinkEvent, SinkKind};
use hooks::CanaryReadout;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Page state captured right before a delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Baseline {
    pub title: String,
}

/// Everything the detector saw for one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub signal: ExecutionSignal,
    /// All sink invocations of the attempt, token-bearing or not.
    pub sink_events: Vec<SinkEvent>,
    /// Sink kinds that received the token, in first-seen order.
    pub token_sinks: Vec<SinkKind>,
    pub title_hit: bool,
    pub mutation_hit: bool,
    pub elapsed: Duration,
}

impl Observation {
    pub fn channels(&self) -> Vec<SignalChannel> {
        let mut channels = Vec::new();
        if !self.token_sinks.is_empty() {
            channels.push(SignalChannel::Sink);
        }
        if self.title_hit {
            channels.push(SignalChannel::Title);
        }
        if self.mutation_hit {
            channels.push(SignalChannel::Mutation);
        }
        channels
    }

    /// Distinct sink kinds that fired during the attempt.
    pub fn fired_kinds(&self) -> Vec<SinkKind> {
        let mut kinds: Vec<SinkKind> = Vec::new();
        for event in &self.sink_events {
            if !kinds.contains(&event.kind) {
                kinds.push(event.kind);
            }
        }
        kinds
    }
}

/// Installs the page instrumentation and turns what it records into a
/// per-attempt verdict.
#[derive(Debug, Clone)]
pub struct ExecutionDetector {
    dwell: Duration,
    poll_interval: Duration,
}

impl ExecutionDetector {
    pub fn new(dwell: Duration) -> Self {
        Self {
            dwell,
            poll_interval: DEFAULT_POLL_INTERVAL.min(dwell.max(Duration::from_millis(1))),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn dwell(&self) -> Duration {
        self.dwell
    }

    /// Register the hooks for every document of the browsing context.
    pub async fn install<B: BrowserAutomation + ?Sized>(&self, browser: &mut B) -> Result<(), ScanError> {
        browser.evaluate_before_any_page_script(hooks::HOOKS_SCRIPT).await?;
        debug!("Sink instrumentation installed");
        Ok(())
    }

    /// Reset the buffers of the current document and snapshot the title.
    /// A page without an evaluable context yields an empty baseline.
    pub async fn begin_attempt<B: BrowserAutomation + ?Sized>(&self, browser: &mut B) -> Result<Baseline, ScanError> {
        match browser.evaluate_in_page(hooks::RESET_BUFFERS).await {
            Ok(value) => Ok(Baseline {
                title: value
                    .get("title")
                    .and_then(|t| t.as_str())
                    .unwrap_or_default()
                    .to_string(),
            }),
            Err(e) if e.classify().is_fatal() => Err(e),
            Err(e) => {
                debug!(error = %e, "No baseline available");
                Ok(Baseline::default())
            }
        }
    }

    /// Poll until the token shows up through a sink or the title, or the
    /// dwell window closes. Only fatal browser errors are returned.
    pub async fn await_signal<B: BrowserAutomation + ?Sized>(
        &self,
        browser: &mut B,
        token: &str,
        baseline: &Baseline,
    ) -> Result<Observation, ScanError> {
        let started = Instant::now();
        let deadline = started + self.dwell;
        let baseline_has_token = baseline.title.contains(token);

        loop {
            let events = match browser.read_accumulated_sink_events().await {
                Ok(events) => events,
                Err(e) if e.classify().is_fatal() => return Err(e),
                Err(_) => Vec::new(),
            };
            let canaries = match browser.evaluate_in_page(hooks::READ_CANARIES).await {
                Ok(value) => CanaryReadout::from_value(&value),
                Err(e) if e.classify().is_fatal() => return Err(e),
                Err(_) => CanaryReadout::default(),
            };

            let observation = evaluate(events, &canaries, token, baseline_has_token, started.elapsed());
            if observation.signal == ExecutionSignal::Confirmed {
                info!(token, channels = ?observation.channels(), "Execution confirmed");
                return Ok(observation);
            }

            let now = Instant::now();
            if now >= deadline {
                if observation.signal == ExecutionSignal::None {
                    let timeout = ScanError::DetectionTimeout(self.dwell);
                    debug!(token, kind = timeout.classify().error_type, "{}", timeout);
                }
                return Ok(observation);
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}

/// Verdict for one readout: sink or title carrying the token confirms,
/// a token-bearing mutation alone is suspected.
fn evaluate(
    sink_events: Vec<SinkEvent>,
    canaries: &CanaryReadout,
    token: &str,
    baseline_has_token: bool,
    elapsed: Duration,
) -> Observation {
    let mut token_sinks = Vec::new();
    for event in sink_events.iter().filter(|e| e.carries(token)) {
        if !token_sinks.contains(&event.kind) {
            token_sinks.push(event.kind);
        }
    }
    let title_hit = !baseline_has_token && canaries.title_carries(token);
    let mutation_hit = canaries.mutation_carries(token);

    let signal = if !token_sinks.is_empty() || title_hit {
        ExecutionSignal::Confirmed
    } else if mutation_hit {
        ExecutionSignal::Suspected
    } else {
        ExecutionSignal::None
    };

    Observation {
        signal,
        sink_events,
        token_sinks,
        title_hit,
        mutation_hit,
        elapsed,
    }
}
