//! Upload orchestration: the multipart POST and its outcome mapping.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use devpanel_protocol::constants::{
    STATUS_BAD_REQUEST, STATUS_CONFLICT, STATUS_FORBIDDEN, STATUS_INTERNAL_ERROR,
    STATUS_NO_CONTENT, STATUS_NOT_FOUND, UPLOAD_FIELD,
};
use devpanel_protocol::{
    FilePart, FileRef, FileSource, OpFailure, ProgressCallback, Request, Response,
    TransferProgress, Transport, upload_url,
};
use devpanel_transfer::{OpSlot, UploadProgress, spawn_op};

use crate::prober::{ACCESS_DENIED, BAD_LOCATION, REMOTE_BUSY, unrecognized_status};
use crate::readiness::{Component, ReadinessComponent};
use crate::channel::TransportChannel;
use crate::types::Completion;

pub(crate) const UPLOAD_IN_PROGRESS: &str = "Upload in progress...";
const UPLOAD_FINISHED: &str = "Upload finished";
const UPLOAD_FAILED: &str = "Upload failed";
const UPLOAD_ABORTED: &str = "Upload aborted";

const REQUEST_REJECTED: &str = "Request rejected (network error / OTA protocol mis-matched)";
const GENERIC_FAILURE: &str = "Generic failure";
const UPLOAD_UNREACHABLE: &str = "Unable to upload to remote";
const UPLOAD_CANCELLED: &str = "Upload to remote aborted";

/// Interpreted result of one upload attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UploadOutcome {
    /// `upload` record; ready in every case since the attempt is over.
    pub component: ReadinessComponent,
    pub success: bool,
    pub reason: Option<String>,
}

impl UploadOutcome {
    fn failed(component: &'static str, reason: String) -> Self {
        Self {
            component: ReadinessComponent::new(Component::Upload, true, component),
            success: false,
            reason: Some(reason),
        }
    }
}

pub(crate) fn upload_outcome(outcome: &Result<Response, OpFailure>) -> UploadOutcome {
    let resp = match outcome {
        Ok(resp) => resp,
        Err(OpFailure::Failed(detail)) => {
            return UploadOutcome::failed(
                UPLOAD_FAILED,
                OpFailure::error_reason(detail, UPLOAD_UNREACHABLE),
            );
        }
        Err(OpFailure::Cancelled) => {
            return UploadOutcome::failed(UPLOAD_ABORTED, UPLOAD_CANCELLED.to_string());
        }
    };

    let reason = match resp.status {
        STATUS_NO_CONTENT => {
            return UploadOutcome {
                component: ReadinessComponent::new(Component::Upload, true, UPLOAD_FINISHED),
                success: true,
                reason: None,
            };
        }
        STATUS_BAD_REQUEST => REQUEST_REJECTED.to_string(),
        STATUS_FORBIDDEN => ACCESS_DENIED.to_string(),
        STATUS_NOT_FOUND => BAD_LOCATION.to_string(),
        STATUS_CONFLICT => REMOTE_BUSY.to_string(),
        STATUS_INTERNAL_ERROR => {
            let detail = resp.body.as_str();
            let detail = if detail.is_empty() { GENERIC_FAILURE } else { detail };
            format!("Remote operational error - {detail}")
        }
        other => unrecognized_status(other),
    };
    UploadOutcome::failed(UPLOAD_FINISHED, reason)
}

/// Runs at most one upload, holding the transport channel while it does.
pub(crate) struct Uploader {
    url: String,
    transport: Arc<dyn Transport>,
    files: Arc<dyn FileSource>,
    completions: mpsc::UnboundedSender<Completion>,
    slot: OpSlot,
    channel: Option<TransportChannel>,
}

impl Uploader {
    pub(crate) fn new(
        url: String,
        transport: Arc<dyn Transport>,
        files: Arc<dyn FileSource>,
        completions: mpsc::UnboundedSender<Completion>,
    ) -> Self {
        Self {
            url,
            transport,
            files,
            completions,
            slot: OpSlot::default(),
            channel: None,
        }
    }

    pub(crate) fn is_uploading(&self) -> bool {
        self.channel.is_some()
    }

    /// Takes the transport channel and starts sending `file`.
    pub(crate) fn start(&mut self, channel: TransportChannel, file: FileRef, digest: String) {
        debug_assert!(!self.is_uploading());
        self.channel = Some(channel);

        let (generation, cancel) = self.slot.occupy();
        let url = upload_url(&self.url, file.size, &digest);
        info!(generation, file = %file.name, size = file.size, %url, "starting upload");

        let transport = Arc::clone(&self.transport);
        let files = Arc::clone(&self.files);
        let progress_tx = self.completions.clone();
        let expected = file.size;
        spawn_op(
            cancel,
            self.completions.clone(),
            async move {
                let data = files
                    .read_all(file.clone())
                    .await
                    .map_err(|e| OpFailure::Failed(e.to_string()))?;
                // Length and digest in the URL describe the hashed contents.
                if data.len() as u64 != expected {
                    return Err(OpFailure::Failed(format!(
                        "file changed since it was hashed ({} bytes, expected {expected})",
                        data.len()
                    )));
                }
                let part = FilePart {
                    field: UPLOAD_FIELD.to_string(),
                    file_name: file.name,
                    data,
                };
                let progress: ProgressCallback = Box::new(move |progress: TransferProgress| {
                    let _ = progress_tx.send(Completion::UploadProgress {
                        generation,
                        progress,
                    });
                });
                transport
                    .send(Request::post_file(url, part), Some(progress))
                    .await
                    .map_err(|e| OpFailure::Failed(e.to_string()))
            },
            move |outcome| Completion::Upload {
                generation,
                outcome,
            },
        );
    }

    /// Requests cancellation; the outcome still arrives as a completion.
    pub(crate) fn abort(&mut self) -> bool {
        let cancelled = self.slot.cancel();
        if cancelled {
            info!("upload abort requested");
        } else {
            debug!("abort requested with no upload in flight");
        }
        cancelled
    }

    /// Converts progress from the current upload; anything else is dropped.
    pub(crate) fn on_progress(
        &self,
        generation: u64,
        progress: TransferProgress,
    ) -> Option<UploadProgress> {
        if !self.slot.is_live(generation) {
            trace!(generation, "dropping progress from inactive upload");
            return None;
        }
        trace!(generation, sent = progress.sent, total = ?progress.total, "upload progress");
        Some(progress.into())
    }

    #[cfg(test)]
    pub(crate) fn generation(&self) -> u64 {
        self.slot.generation()
    }

    /// Handles the terminal completion and hands back the transport channel.
    pub(crate) fn on_complete(
        &mut self,
        generation: u64,
        outcome: Result<Response, OpFailure>,
    ) -> Option<(UploadOutcome, TransportChannel)> {
        if !self.slot.finish(generation) {
            trace!(generation, "discarding stale upload completion");
            return None;
        }
        let channel = self.channel.take()?;
        let result = upload_outcome(&outcome);
        match &result.reason {
            None => info!(generation, "upload accepted by remote"),
            Some(reason) => warn!(generation, %reason, "upload failed"),
        }
        Some((result, channel))
    }
}
