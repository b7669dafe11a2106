//! Public types for the OTA manager.

use std::time::Duration;

use devpanel_protocol::constants::OTA_PROBE_INTERVAL;
use devpanel_protocol::{OpFailure, Response, TransferProgress};
use devpanel_transfer::{DigestFactory, UploadProgress};

use crate::readiness::ReadinessChange;

/// Configuration for one OTA manager instance.
#[derive(Debug, Clone)]
pub struct OtaConfig {
    /// OTA endpoint, probed with HEAD and uploaded to with POST.
    pub url: String,
    /// Fixed interval between capability probes.
    pub probe_interval: Duration,
    /// Digest sent as the `md5` query parameter.
    pub digest: DigestFactory,
}

impl OtaConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            probe_interval: OTA_PROBE_INTERVAL,
            digest: devpanel_transfer::md5,
        }
    }
}

/// Events emitted by the OTA manager.
#[derive(Debug, Clone, PartialEq)]
pub enum OtaEvent {
    /// Overall readiness changed.
    ReadinessChanged(ReadinessChange),
    /// An upload is in flight; always precedes its `UploadComplete`.
    UploadProgress(UploadProgress),
    /// An upload attempt finished.
    UploadComplete {
        success: bool,
        reason: Option<String>,
    },
}

/// Remote prober state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProberState {
    /// Stopped: no timer, no probe.
    Idle,
    /// A probe is in flight.
    Probing,
    /// Running and waiting for the next tick.
    PendingRetry,
}

/// Outcome of an asynchronous operation, tagged with the generation of the
/// slot occupant that issued it.
#[derive(Debug)]
pub(crate) enum Completion {
    Probe {
        generation: u64,
        outcome: Result<Response, OpFailure>,
    },
    Digest {
        generation: u64,
        outcome: Result<String, OpFailure>,
    },
    UploadProgress {
        generation: u64,
        progress: TransferProgress,
    },
    Upload {
        generation: u64,
        outcome: Result<Response, OpFailure>,
    },
}
