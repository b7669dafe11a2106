//! Remote capability prober.
//!
//! Issues a HEAD request at a fixed interval and maps the status to a
//! readiness record for the `remote` component. A probe still outstanding
//! at the next tick counts as a timeout and is superseded.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, trace, warn};

use devpanel_protocol::constants::{
    STATUS_CONFLICT, STATUS_FORBIDDEN, STATUS_NO_CONTENT, STATUS_NOT_FOUND,
};
use devpanel_protocol::{OpFailure, Request, Response, Transport};
use devpanel_transfer::{OpSlot, spawn_op};

use crate::channel::TransportChannel;
use crate::readiness::{Component, ReadinessComponent};
use crate::types::{Completion, ProberState};

pub(crate) const REMOTE_TIMEOUT: &str = "Timeout connecting to remote, retrying...";
pub(crate) const REMOTE_ACCEPTS: &str = "Remote accepts OTA";
pub(crate) const ACCESS_DENIED: &str = "Access denied, insufficient permission";
pub(crate) const BAD_LOCATION: &str = "Bad remote location (check OTA configuration)";
pub(crate) const REMOTE_BUSY: &str = "Another OTA already in progress";
const REMOTE_UNREACHABLE: &str = "Unable to connect to remote";
const REMOTE_ABORTED: &str = "Connection to remote aborted";

pub(crate) fn unrecognized_status(status: u16) -> String {
    format!("Unrecognized status ({status})")
}

/// Maps a probe outcome to the `remote` readiness record.
pub(crate) fn probe_readiness(outcome: &Result<Response, OpFailure>) -> ReadinessComponent {
    let (ready, reason) = match outcome {
        Ok(resp) => match resp.status {
            STATUS_NO_CONTENT => (true, REMOTE_ACCEPTS.to_string()),
            STATUS_FORBIDDEN => (false, ACCESS_DENIED.to_string()),
            STATUS_NOT_FOUND => (false, BAD_LOCATION.to_string()),
            STATUS_CONFLICT => (false, REMOTE_BUSY.to_string()),
            other => (false, unrecognized_status(other)),
        },
        Err(OpFailure::Failed(detail)) => (false, OpFailure::error_reason(detail, REMOTE_UNREACHABLE)),
        Err(OpFailure::Cancelled) => (false, REMOTE_ABORTED.to_string()),
    };
    ReadinessComponent::new(Component::Remote, ready, reason)
}

/// Periodic HEAD prober for the OTA endpoint.
pub(crate) struct RemoteProber {
    url: String,
    interval: Duration,
    transport: Arc<dyn Transport>,
    completions: mpsc::UnboundedSender<Completion>,
    slot: OpSlot,
    ticker: Option<Interval>,
    channel: Option<TransportChannel>,
}

impl RemoteProber {
    pub(crate) fn new(
        url: String,
        interval: Duration,
        transport: Arc<dyn Transport>,
        completions: mpsc::UnboundedSender<Completion>,
    ) -> Self {
        Self {
            url,
            interval,
            transport,
            completions,
            slot: OpSlot::default(),
            ticker: None,
            channel: None,
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.channel.is_some()
    }

    pub(crate) fn state(&self) -> ProberState {
        if !self.is_running() {
            ProberState::Idle
        } else if self.slot.is_busy() {
            ProberState::Probing
        } else {
            ProberState::PendingRetry
        }
    }

    /// Takes the transport channel, arms the timer and probes immediately.
    pub(crate) fn start(&mut self, channel: TransportChannel) -> Option<ReadinessComponent> {
        // The channel is unique, so a running prober cannot be handed another.
        debug_assert!(!self.is_running());
        self.channel = Some(channel);
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
        debug!(url = %self.url, interval_secs = self.interval.as_secs(), "prober started");
        self.probe()
    }

    /// Clears the timer, cancels any outstanding probe and returns the
    /// transport channel.
    ///
    /// The cancelled probe still completes (as aborted) unless a new probe
    /// supersedes it first.
    pub(crate) fn stop(&mut self) -> Option<TransportChannel> {
        let channel = self.channel.take()?;
        self.ticker = None;
        if self.slot.cancel() {
            debug!("outstanding probe cancelled");
        }
        debug!("prober stopped");
        Some(channel)
    }

    /// Waits for the next scheduled tick; never resolves while stopped.
    pub(crate) async fn next_tick(&mut self) {
        match self.ticker.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    /// Issues a probe, superseding an outstanding one.
    ///
    /// Returns the timeout record when a previous probe was still in flight.
    pub(crate) fn probe(&mut self) -> Option<ReadinessComponent> {
        if !self.is_running() {
            trace!("probe requested while stopped, ignoring");
            return None;
        }

        let timed_out = self.slot.is_busy().then(|| {
            warn!(url = %self.url, "previous probe still outstanding, retrying");
            ReadinessComponent::new(Component::Remote, false, REMOTE_TIMEOUT)
        });

        let (generation, cancel) = self.slot.occupy();
        let transport = Arc::clone(&self.transport);
        let request = Request::head(self.url.clone());
        trace!(generation, url = %request.url, "probing remote");

        spawn_op(
            cancel,
            self.completions.clone(),
            async move {
                transport
                    .send(request, None)
                    .await
                    .map_err(|e| OpFailure::Failed(e.to_string()))
            },
            move |outcome| Completion::Probe {
                generation,
                outcome,
            },
        );

        timed_out
    }

    /// Handles a probe completion; stale ones yield nothing.
    pub(crate) fn on_complete(
        &mut self,
        generation: u64,
        outcome: Result<Response, OpFailure>,
    ) -> Option<ReadinessComponent> {
        if !self.slot.finish(generation) {
            trace!(generation, "discarding stale probe completion");
            return None;
        }
        let record = probe_readiness(&outcome);
        debug!(
            generation,
            ready = record.ready,
            reason = %record.reason,
            "probe finished"
        );
        Some(record)
    }
}
