//! File selection and client-side hashing.

use std::io;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use devpanel_protocol::{FileRef, FileSource, OpFailure};
use devpanel_transfer::{DigestFactory, OpSlot, hash_bytes, spawn_op};

use crate::readiness::{Component, ReadinessComponent};
use crate::types::Completion;

const NO_FILE: &str = "No file has been selected";
const HASH_DONE: &str = "File hash calculated";
const READ_FAILED: &str = "Unable to read the file";
const HASH_ABORTED: &str = "File hashing aborted";

fn hashing(name: &str) -> String {
    format!("Calculating hash for file \"{name}\"...")
}

fn read_failure(err: io::Error) -> OpFailure {
    match err.kind() {
        io::ErrorKind::Interrupted => OpFailure::Cancelled,
        _ => OpFailure::Failed(err.to_string()),
    }
}

/// Holds the selected file and its digest once computed.
pub(crate) struct FileSelector {
    files: Arc<dyn FileSource>,
    digest: DigestFactory,
    completions: mpsc::UnboundedSender<Completion>,
    slot: OpSlot,
    file: Option<FileRef>,
    hash: Option<String>,
}

impl FileSelector {
    pub(crate) fn new(
        files: Arc<dyn FileSource>,
        digest: DigestFactory,
        completions: mpsc::UnboundedSender<Completion>,
    ) -> Self {
        Self {
            files,
            digest,
            completions,
            slot: OpSlot::default(),
            file: None,
            hash: None,
        }
    }

    pub(crate) fn file(&self) -> Option<&FileRef> {
        self.file.as_ref()
    }

    pub(crate) fn digest(&self) -> Option<&str> {
        self.hash.as_deref()
    }

    pub(crate) fn is_hashing(&self) -> bool {
        self.slot.is_busy()
    }

    /// The selected file together with its digest, once both are known.
    pub(crate) fn hashed(&self) -> Option<(FileRef, String)> {
        Some((self.file.clone()?, self.hash.clone()?))
    }

    /// Replaces the selection and returns the resulting `file` record.
    ///
    /// Any in-flight read is cancelled and its completion becomes stale.
    pub(crate) fn select(&mut self, file: Option<FileRef>) -> ReadinessComponent {
        self.hash = None;
        let Some(file) = file else {
            self.slot.invalidate();
            if self.file.take().is_some() {
                debug!("file selection cleared");
            }
            return ReadinessComponent::new(Component::File, false, NO_FILE);
        };

        let (generation, cancel) = self.slot.occupy();
        let reason = hashing(&file.name);
        debug!(generation, file = %file.name, size = file.size, "hashing selected file");

        let files = Arc::clone(&self.files);
        let digest = self.digest;
        let target = file.clone();
        spawn_op(
            cancel,
            self.completions.clone(),
            async move {
                let bytes = files.read_all(target).await.map_err(read_failure)?;
                tokio::task::spawn_blocking(move || hash_bytes(digest, &bytes))
                    .await
                    .map_err(|e| OpFailure::Failed(e.to_string()))
            },
            move |outcome| Completion::Digest {
                generation,
                outcome,
            },
        );

        self.file = Some(file);
        ReadinessComponent::new(Component::File, false, reason)
    }

    /// Cancels any in-flight read without touching the selection.
    pub(crate) fn cancel(&mut self) {
        self.slot.invalidate();
    }

    /// Handles a digest completion; one for a superseded selection yields
    /// nothing.
    pub(crate) fn on_complete(
        &mut self,
        generation: u64,
        outcome: Result<String, OpFailure>,
    ) -> Option<ReadinessComponent> {
        if !self.slot.finish(generation) {
            trace!(generation, "discarding stale digest completion");
            return None;
        }

        let record = match outcome {
            Ok(hash) => {
                debug!(generation, digest = %hash, "file hash calculated");
                self.hash = Some(hash);
                ReadinessComponent::new(Component::File, true, HASH_DONE)
            }
            Err(OpFailure::Failed(detail)) => {
                warn!(generation, error = %detail, "file read failed");
                ReadinessComponent::new(
                    Component::File,
                    false,
                    OpFailure::error_reason(&detail, READ_FAILED),
                )
            }
            Err(OpFailure::Cancelled) => {
                debug!(generation, "file hashing aborted");
                ReadinessComponent::new(Component::File, false, HASH_ABORTED)
            }
        };
        Some(record)
    }
}
