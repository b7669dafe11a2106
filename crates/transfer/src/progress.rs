use std::sync::atomic::{AtomicU64, Ordering};

use devpanel_protocol::{ProgressCallback, TransferProgress};

/// Progress as surfaced to the UI layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UploadProgress {
    /// Fraction of the body sent, when the total is known.
    Fraction(f64),
    /// Raw bytes sent, when it is not.
    Bytes(u64),
}

impl From<TransferProgress> for UploadProgress {
    fn from(p: TransferProgress) -> Self {
        match p.fraction() {
            Some(f) => UploadProgress::Fraction(f),
            None => UploadProgress::Bytes(p.sent),
        }
    }
}

/// Counts bytes handed to the wire and reports each step to a callback.
///
/// Transports wrap their body stream with one of these; it is shared
/// between the stream and nothing else, so relaxed ordering suffices.
pub struct ProgressCounter {
    sent: AtomicU64,
    total: Option<u64>,
    callback: Option<ProgressCallback>,
}

impl ProgressCounter {
    pub fn new(total: Option<u64>, callback: Option<ProgressCallback>) -> Self {
        Self {
            sent: AtomicU64::new(0),
            total,
            callback,
        }
    }

    /// Records `n` more bytes sent and notifies the callback.
    pub fn advance(&self, n: u64) -> TransferProgress {
        let sent = self.sent.fetch_add(n, Ordering::Relaxed) + n;
        let progress = TransferProgress {
            sent,
            total: self.total,
        };
        if let Some(cb) = &self.callback {
            cb(progress);
        }
        progress
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}
