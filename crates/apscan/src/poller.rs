use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, trace, warn};

use devpanel_protocol::constants::{
    SCAN_IDLE_INTERVAL, SCAN_POLL_INTERVAL, STATUS_NO_CONTENT, STATUS_OK,
};
use devpanel_protocol::{OpFailure, Request, Response, ScanReport, Transport, force_scan_url};
use devpanel_transfer::{OpSlot, spawn_op};

const SCAN_TIMEOUT: &str = "Timeout connecting to remote, retrying...";
const SCAN_IN_PROGRESS: &str = "Remote AP scan in progress...";
const SCAN_UNREACHABLE: &str = "Unable to connect to remote";
const SCAN_ABORTED: &str = "Connection to remote aborted";

/// Scan poller configuration.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub url: String,
    /// Interval while the device is scanning.
    pub poll_interval: Duration,
    /// Interval once results are in, or after a failure.
    pub idle_interval: Duration,
}

impl ScanConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            poll_interval: SCAN_POLL_INTERVAL,
            idle_interval: SCAN_IDLE_INTERVAL,
        }
    }
}

/// Events emitted by the poller.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    /// `ok` is true only for scan results; `message` is then the raw body,
    /// otherwise a human-readable reason.
    Updated {
        ok: bool,
        message: String,
        report: Option<ScanReport>,
    },
}

/// Which interval the timer runs at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollMode {
    Fast,
    Slow,
}

#[derive(Debug)]
struct ScanCompletion {
    generation: u64,
    outcome: Result<Response, OpFailure>,
}

/// Polls the AP scan endpoint on a single task.
pub struct ScanPoller {
    config: ScanConfig,
    transport: Arc<dyn Transport>,
    slot: OpSlot,
    mode: Option<PollMode>,
    ticker: Option<Interval>,
    completions_tx: mpsc::UnboundedSender<ScanCompletion>,
    completions: mpsc::UnboundedReceiver<ScanCompletion>,
    events: mpsc::UnboundedSender<ScanEvent>,
}

impl ScanPoller {
    /// Starts polling at the fast interval and probes immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: ScanConfig,
        transport: Arc<dyn Transport>,
        events: mpsc::UnboundedSender<ScanEvent>,
    ) -> Self {
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let mut poller = Self {
            config,
            transport,
            slot: OpSlot::default(),
            mode: None,
            ticker: None,
            completions_tx,
            completions,
            events,
        };
        debug!(url = %poller.config.url, "AP scan poller started");
        poller.set_mode(PollMode::Fast);
        poller.probe(false);
        poller
    }

    /// Forces a fresh scan on the device.
    pub fn refresh(&mut self) {
        self.probe(true);
    }

    pub fn mode(&self) -> Option<PollMode> {
        self.mode
    }

    pub fn is_polling(&self) -> bool {
        self.ticker.is_some()
    }

    /// Clears the timer and cancels any outstanding probe.
    pub fn stop(&mut self) {
        self.ticker = None;
        if self.slot.cancel() {
            debug!("outstanding scan probe cancelled");
        }
    }

    /// Waits for the next completion or tick and processes it.
    pub async fn advance(&mut self) {
        tokio::select! {
            completion = self.completions.recv() => {
                if let Some(ScanCompletion { generation, outcome }) = completion {
                    self.on_complete(generation, outcome);
                }
            }
            _ = next_tick(&mut self.ticker) => self.probe(false),
        }
    }

    /// Re-arms the timer unless it already runs in `mode`.
    fn set_mode(&mut self, mode: PollMode) {
        if self.mode == Some(mode) && self.ticker.is_some() {
            return;
        }
        let period = match mode {
            PollMode::Fast => self.config.poll_interval,
            PollMode::Slow => self.config.idle_interval,
        };
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
        self.mode = Some(mode);
        debug!(?mode, period_secs = period.as_secs(), "scan poll interval set");
    }

    fn probe(&mut self, force: bool) {
        if self.slot.is_busy() {
            warn!(url = %self.config.url, "previous scan probe still outstanding, retrying");
            self.emit(false, SCAN_TIMEOUT.to_string(), None);
        }

        let (generation, cancel) = self.slot.occupy();
        let url = if force {
            force_scan_url(&self.config.url)
        } else {
            self.config.url.clone()
        };
        trace!(generation, %url, "polling AP scan");

        let transport = Arc::clone(&self.transport);
        spawn_op(
            cancel,
            self.completions_tx.clone(),
            async move {
                transport
                    .send(Request::get(url), None)
                    .await
                    .map_err(|e| OpFailure::Failed(e.to_string()))
            },
            move |outcome| ScanCompletion {
                generation,
                outcome,
            },
        );
    }

    fn on_complete(&mut self, generation: u64, outcome: Result<Response, OpFailure>) {
        if !self.slot.finish(generation) {
            trace!(generation, "discarding stale scan completion");
            return;
        }

        match outcome {
            Ok(resp) if resp.status == STATUS_NO_CONTENT => {
                self.set_mode(PollMode::Fast);
                self.emit(false, SCAN_IN_PROGRESS.to_string(), None);
            }
            Ok(resp) if resp.status == STATUS_OK => {
                self.set_mode(PollMode::Slow);
                let report = match serde_json::from_str::<ScanReport>(&resp.body) {
                    Ok(report) => {
                        debug!(
                            aps = report.aps.len(),
                            update = report.update,
                            "scan results received"
                        );
                        Some(report)
                    }
                    Err(e) => {
                        warn!(error = %e, "scan results are not valid JSON");
                        None
                    }
                };
                self.emit(true, resp.body, report);
            }
            Ok(resp) => {
                self.set_mode(PollMode::Slow);
                self.emit(false, format!("Unrecognized status ({})", resp.status), None);
            }
            Err(failure) => {
                if self.is_polling() {
                    self.set_mode(PollMode::Slow);
                }
                let message = match failure {
                    OpFailure::Failed(detail) => {
                        OpFailure::error_reason(&detail, SCAN_UNREACHABLE)
                    }
                    OpFailure::Cancelled => SCAN_ABORTED.to_string(),
                };
                warn!(%message, "scan probe failed");
                self.emit(false, message, None);
            }
        }
    }

    fn emit(&self, ok: bool, message: String, report: Option<ScanReport>) {
        let event = ScanEvent::Updated {
            ok,
            message,
            report,
        };
        if self.events.send(event).is_err() {
            trace!("scan event receiver dropped");
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
