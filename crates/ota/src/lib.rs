//! Over-the-air firmware update manager.
//!
//! Uploads are admitted only when three independently evolving components
//! are ready at once:
//!
//! - `file`: a file is selected and its digest has been computed
//! - `remote`: the endpoint answered the last capability probe with 204
//! - `upload`: no transfer is in flight
//!
//! The manager runs on a single task. Probes, digests and uploads run as
//! spawned operations that report back through a completion channel; each
//! kind is single-flight and completions from superseded operations are
//! discarded. Probing and uploading share one transport channel token, so
//! they never use the transport at the same time.
//!
//! Use [`spawn`] for a ready-made driver task, or own an [`OtaManager`] and
//! call [`OtaManager::advance`] from your own loop.

mod channel;
mod manager;
mod prober;
mod readiness;
mod selector;
mod service;
mod types;
mod upload;

#[cfg(test)]
mod testing;

pub use manager::OtaManager;
pub use readiness::{Component, ReadinessAggregator, ReadinessChange, ReadinessComponent};
pub use service::{OtaError, OtaHandle, spawn};
pub use types::{OtaConfig, OtaEvent, ProberState};

pub use devpanel_transfer::UploadProgress;
