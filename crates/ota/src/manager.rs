//! OTA manager: wires the prober, selector and uploader to the readiness
//! aggregator and gates upload admission on it.
//!
//! All state lives here and is mutated from one task. Asynchronous work
//! reports back through the completion channel, which [`OtaManager::advance`]
//! drains together with the probe timer.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use devpanel_protocol::{FileRef, FileSource, Transport};

use crate::prober::RemoteProber;
use crate::readiness::{Component, ReadinessAggregator, ReadinessChange, ReadinessComponent};
use crate::selector::FileSelector;
use crate::channel::TransportChannel;
use crate::types::{Completion, OtaConfig, OtaEvent, ProberState};
use crate::upload::{UPLOAD_IN_PROGRESS, Uploader};

/// Firmware update manager for one device endpoint.
pub struct OtaManager {
    readiness: ReadinessAggregator,
    prober: RemoteProber,
    selector: FileSelector,
    uploader: Uploader,
    completions: mpsc::UnboundedReceiver<Completion>,
    events: mpsc::UnboundedSender<OtaEvent>,
}

impl OtaManager {
    /// Creates the manager with no file selected and starts probing.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: OtaConfig,
        transport: Arc<dyn Transport>,
        files: Arc<dyn FileSource>,
        events: mpsc::UnboundedSender<OtaEvent>,
    ) -> Self {
        let (tx, completions) = mpsc::unbounded_channel();
        let prober = RemoteProber::new(
            config.url.clone(),
            config.probe_interval,
            Arc::clone(&transport),
            tx.clone(),
        );
        let selector = FileSelector::new(Arc::clone(&files), config.digest, tx.clone());
        let uploader = Uploader::new(config.url.clone(), transport, files, tx);

        let mut manager = Self {
            readiness: ReadinessAggregator::new(),
            prober,
            selector,
            uploader,
            completions,
            events,
        };

        info!(url = %config.url, "OTA manager created");
        manager.select_file(None);
        manager.start_prober(TransportChannel::new());
        manager
    }

    /// Replaces the selected file (or clears it with `None`).
    pub fn select_file(&mut self, file: Option<FileRef>) {
        let record = self.selector.select(file);
        self.apply(record);
    }

    /// Starts an upload of the selected file.
    ///
    /// Returns false, with no side effects, unless every component is ready.
    pub fn start_upload(&mut self) -> bool {
        if !self.readiness.is_ready() {
            debug!("upload rejected, not ready");
            return false;
        }
        let Some((file, digest)) = self.selector.hashed() else {
            debug!("upload rejected, no hashed file");
            return false;
        };
        if !self.prober.is_running() {
            debug!("upload rejected, transport channel busy");
            return false;
        }

        self.apply(ReadinessComponent::new(
            Component::Upload,
            false,
            UPLOAD_IN_PROGRESS,
        ));
        let Some(channel) = self.prober.stop() else {
            return false;
        };
        self.uploader.start(channel, file, digest);
        true
    }

    /// Cancels the in-flight upload, if any. The outcome is still delivered
    /// as an `UploadComplete` event.
    pub fn abort_upload(&mut self) {
        self.uploader.abort();
    }

    /// Probes immediately without disturbing the schedule. Ignored while
    /// an upload holds the transport.
    pub fn refresh_probe(&mut self) {
        if !self.prober.is_running() {
            debug!("probe refresh ignored, prober stopped");
            return;
        }
        self.probe_tick();
    }

    /// Waits for the next completion or probe tick and processes it.
    ///
    /// Cancel safe: dropping the future loses nothing.
    pub async fn advance(&mut self) {
        tokio::select! {
            completion = self.completions.recv() => {
                if let Some(completion) = completion {
                    self.handle_completion(completion);
                }
            }
            _ = self.prober.next_tick() => self.probe_tick(),
        }
    }

    /// Stops probing and cancels all in-flight work.
    pub fn shutdown(&mut self) {
        self.prober.stop();
        self.uploader.abort();
        self.selector.cancel();
        info!("OTA manager shut down");
    }

    pub fn components(&self) -> &[ReadinessComponent] {
        self.readiness.components()
    }

    pub fn component(&self, name: Component) -> Option<&ReadinessComponent> {
        self.readiness.component(name)
    }

    pub fn is_ready(&self) -> bool {
        self.readiness.is_ready()
    }

    pub fn selected_file(&self) -> Option<&FileRef> {
        self.selector.file()
    }

    /// Digest of the selected file, once hashing has finished.
    pub fn file_digest(&self) -> Option<&str> {
        self.selector.digest()
    }

    pub fn is_hashing(&self) -> bool {
        self.selector.is_hashing()
    }

    pub fn prober_state(&self) -> ProberState {
        self.prober.state()
    }

    pub fn is_uploading(&self) -> bool {
        self.uploader.is_uploading()
    }

    fn probe_tick(&mut self) {
        if let Some(record) = self.prober.probe() {
            self.apply(record);
        }
    }

    fn start_prober(&mut self, channel: TransportChannel) {
        if let Some(record) = self.prober.start(channel) {
            self.apply(record);
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Probe {
                generation,
                outcome,
            } => {
                if let Some(record) = self.prober.on_complete(generation, outcome) {
                    self.apply(record);
                }
            }
            Completion::Digest {
                generation,
                outcome,
            } => {
                if let Some(record) = self.selector.on_complete(generation, outcome) {
                    self.apply(record);
                }
            }
            Completion::UploadProgress {
                generation,
                progress,
            } => {
                if let Some(progress) = self.uploader.on_progress(generation, progress) {
                    self.emit(OtaEvent::UploadProgress(progress));
                }
            }
            Completion::Upload {
                generation,
                outcome,
            } => {
                let Some((result, channel)) = self.uploader.on_complete(generation, outcome)
                else {
                    return;
                };
                self.apply(result.component);
                if result.success {
                    self.select_file(None);
                }
                self.emit(OtaEvent::UploadComplete {
                    success: result.success,
                    reason: result.reason,
                });
                self.start_prober(channel);
            }
        }
    }

    fn apply(&mut self, record: ReadinessComponent) {
        let Some(change) = self.readiness.apply(record) else {
            return;
        };
        match &change {
            ReadinessChange::Ready => info!("ready to upload"),
            ReadinessChange::NotReady { component, reason } => {
                debug!(component = %component, %reason, "not ready")
            }
        }
        self.emit(OtaEvent::ReadinessChanged(change));
    }

    fn emit(&self, event: OtaEvent) {
        if self.events.send(event).is_err() {
            trace!("event receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use devpanel_protocol::{Method, Response, TransferProgress, upload_url};
    use devpanel_transfer::{UploadProgress, checksum_bytes};

    use super::*;
    use crate::testing::{MemoryFiles, Reply, ScriptedTransport};

    const URL: &str = "http://192.168.4.1/ota";
    const FIRMWARE: &[u8] = b"firmware image bytes";

    struct Harness {
        manager: OtaManager,
        transport: Arc<ScriptedTransport>,
        files: Arc<MemoryFiles>,
        events: mpsc::UnboundedReceiver<OtaEvent>,
    }

    impl Harness {
        /// Builds a manager whose first probe gets `probe_reply`.
        fn new(probe_reply: Reply) -> Self {
            let transport = Arc::new(ScriptedTransport::default());
            transport.on(Method::Head, probe_reply);
            let files = Arc::new(MemoryFiles::default());
            let (tx, events) = mpsc::unbounded_channel();
            let manager = OtaManager::new(OtaConfig::new(URL), transport.clone(), files.clone(), tx);
            Self {
                manager,
                transport,
                files,
                events,
            }
        }

        /// Processes exactly `n` completions or ticks.
        async fn pump(&mut self, n: usize) {
            for _ in 0..n {
                tokio::time::timeout(Duration::from_secs(60), self.manager.advance())
                    .await
                    .expect("manager stalled");
            }
        }

        fn drain(&mut self) -> Vec<OtaEvent> {
            let mut out = Vec::new();
            while let Ok(ev) = self.events.try_recv() {
                out.push(ev);
            }
            out
        }

        fn reason(&self, name: Component) -> String {
            self.manager.component(name).unwrap().reason.clone()
        }

        /// Remote accepts, firmware selected and hashed.
        async fn ready() -> Self {
            let mut h = Self::new(Reply::Respond(Response::empty(204)));
            h.pump(1).await;
            let file = h.files.file("/build/fw.bin", FIRMWARE);
            h.manager.select_file(Some(file));
            h.pump(1).await;
            assert!(h.manager.is_ready());
            h.drain();
            h
        }
    }

    #[tokio::test]
    async fn initial_state_has_no_file() {
        let mut h = Harness::new(Reply::Hang);
        let events = h.drain();
        assert_eq!(
            events,
            vec![OtaEvent::ReadinessChanged(ReadinessChange::NotReady {
                component: Component::File,
                reason: "No file has been selected".into(),
            })]
        );
        assert_eq!(h.manager.components()[0].name, Component::File);
        assert_eq!(h.manager.prober_state(), ProberState::Probing);
    }

    #[tokio::test]
    async fn probe_no_content_marks_remote_ready() {
        let mut h = Harness::new(Reply::Respond(Response::empty(204)));
        h.pump(1).await;

        let remote = h.manager.component(Component::Remote).unwrap();
        assert!(remote.ready);
        assert_eq!(remote.reason, "Remote accepts OTA");
        assert_eq!(h.manager.prober_state(), ProberState::PendingRetry);
        assert_eq!(h.transport.requests()[0].url, URL);
        assert_eq!(h.transport.requests()[0].method, Method::Head);
    }

    #[tokio::test]
    async fn probe_conflict_marks_remote_busy() {
        let mut h = Harness::new(Reply::Respond(Response::empty(409)));
        h.pump(1).await;

        let remote = h.manager.component(Component::Remote).unwrap();
        assert!(!remote.ready);
        assert_eq!(remote.reason, "Another OTA already in progress");
        assert!(!h.manager.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn outstanding_probe_times_out_and_is_superseded() {
        let mut h = Harness::new(Reply::Hang);
        h.transport.respond(Method::Head, 204);

        // The first tick finds the initial probe still outstanding.
        h.pump(1).await;
        assert_eq!(
            h.reason(Component::Remote),
            "Timeout connecting to remote, retrying..."
        );

        // The cancelled probe and its replacement both report; only the
        // replacement counts.
        h.pump(2).await;
        assert_eq!(h.reason(Component::Remote), "Remote accepts OTA");
        assert_eq!(h.transport.count(Method::Head), 2);
    }

    #[tokio::test]
    async fn refresh_probe_issues_a_probe() {
        let mut h = Harness::new(Reply::Respond(Response::empty(403)));
        h.pump(1).await;
        h.transport.respond(Method::Head, 204);

        h.manager.refresh_probe();
        h.pump(1).await;
        assert_eq!(h.reason(Component::Remote), "Remote accepts OTA");
        assert_eq!(h.transport.count(Method::Head), 2);
    }

    #[tokio::test]
    async fn digest_completion_admits_upload() {
        let mut h = Harness::new(Reply::Respond(Response::empty(204)));
        h.pump(1).await;
        let file = h.files.file("/build/fw.bin", FIRMWARE);
        h.manager.select_file(Some(file));
        assert_eq!(
            h.reason(Component::File),
            "Calculating hash for file \"fw.bin\"..."
        );

        h.pump(1).await;
        assert_eq!(h.reason(Component::File), "File hash calculated");
        assert_eq!(h.manager.file_digest(), Some(checksum_bytes(FIRMWARE).as_str()));
        assert!(h.manager.is_ready());
        assert_eq!(
            h.drain().last(),
            Some(&OtaEvent::ReadinessChanged(ReadinessChange::Ready))
        );

        assert!(h.manager.start_upload());
        let upload = h.manager.component(Component::Upload).unwrap();
        assert!(!upload.ready);
        assert_eq!(upload.reason, "Upload in progress...");
        assert!(!h.manager.is_ready());
        assert!(h.manager.is_uploading());
        assert_eq!(h.manager.prober_state(), ProberState::Idle);

        // A second start is rejected while the first is in flight.
        assert!(!h.manager.start_upload());
    }

    #[tokio::test]
    async fn rejected_start_has_no_side_effects() {
        let mut h = Harness::new(Reply::Hang);
        h.drain();
        let before = h.manager.components().to_vec();

        assert!(!h.manager.start_upload());
        assert_eq!(h.manager.components(), before.as_slice());
        assert!(h.drain().is_empty());
        assert_eq!(h.manager.prober_state(), ProberState::Probing);
        assert_eq!(h.transport.count(Method::Post), 0);
    }

    #[tokio::test]
    async fn successful_upload_clears_file_and_restarts_probing() {
        let mut h = Harness::ready().await;
        h.transport.respond(Method::Post, 204);

        assert!(h.manager.start_upload());
        // Two progress steps, then the response.
        h.pump(3).await;

        let events = h.drain();
        let progress: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                OtaEvent::UploadProgress(p) => Some(*p),
                _ => None,
            })
            .collect();
        assert_eq!(
            progress,
            vec![UploadProgress::Fraction(0.5), UploadProgress::Fraction(1.0)]
        );
        let complete = events
            .iter()
            .position(|e| matches!(e, OtaEvent::UploadComplete { .. }))
            .unwrap();
        assert_eq!(
            events[complete],
            OtaEvent::UploadComplete {
                success: true,
                reason: None,
            }
        );
        assert!(
            events[..complete]
                .iter()
                .any(|e| matches!(e, OtaEvent::UploadProgress(_)))
        );

        assert!(h.manager.selected_file().is_none());
        assert_eq!(h.reason(Component::File), "No file has been selected");
        assert_eq!(h.reason(Component::Upload), "Upload finished");
        assert!(h.manager.component(Component::Upload).unwrap().ready);
        assert!(!h.manager.is_uploading());
        assert_eq!(h.manager.prober_state(), ProberState::Probing);

        let requests = h.transport.requests();
        let post = &requests[1];
        assert_eq!(post.method, Method::Post);
        assert_eq!(
            post.url,
            upload_url(URL, FIRMWARE.len() as u64, &checksum_bytes(FIRMWARE))
        );
        let part = post.body.as_ref().unwrap();
        assert_eq!(part.field, "upload");
        assert_eq!(part.file_name, "fw.bin");
        assert_eq!(part.data, FIRMWARE);
    }

    #[tokio::test]
    async fn server_error_reports_detail_and_restarts_probing() {
        let mut h = Harness::ready().await;
        h.transport
            .on(Method::Post, Reply::Respond(Response::new(500, "flash write failed")));
        h.transport.respond(Method::Head, 204);

        assert!(h.manager.start_upload());
        h.pump(3).await;

        let events = h.drain();
        assert!(events.contains(&OtaEvent::UploadComplete {
            success: false,
            reason: Some("Remote operational error - flash write failed".into()),
        }));
        assert!(h.manager.component(Component::Upload).unwrap().ready);
        assert!(h.manager.selected_file().is_some());

        // The restarted prober answers and the same file may be retried.
        h.pump(1).await;
        assert!(h.manager.is_ready());
        assert!(h.manager.start_upload());
    }

    #[tokio::test]
    async fn transport_error_reports_failure() {
        let mut h = Harness::ready().await;
        h.transport
            .on(Method::Post, Reply::Fail("connection reset".into()));

        assert!(h.manager.start_upload());
        h.pump(1).await;

        assert!(h.drain().contains(&OtaEvent::UploadComplete {
            success: false,
            reason: Some("Error - connection reset".into()),
        }));
        assert_eq!(h.reason(Component::Upload), "Upload failed");
        assert_eq!(h.manager.prober_state(), ProberState::Probing);
    }

    #[tokio::test]
    async fn abort_reports_through_completion() {
        let mut h = Harness::ready().await;

        assert!(h.manager.start_upload());
        h.manager.abort_upload();
        // Nothing is reported synchronously.
        assert!(
            !h.drain()
                .iter()
                .any(|e| matches!(e, OtaEvent::UploadComplete { .. }))
        );

        h.pump(1).await;
        assert_eq!(
            h.drain().last(),
            Some(&OtaEvent::UploadComplete {
                success: false,
                reason: Some("Upload to remote aborted".into()),
            })
        );
        assert_eq!(h.reason(Component::Upload), "Upload aborted");
        assert!(!h.manager.is_uploading());
        assert_eq!(h.manager.prober_state(), ProberState::Probing);
    }

    #[tokio::test]
    async fn progress_after_abort_is_not_emitted() {
        let mut h = Harness::ready().await;
        h.transport.on(Method::Post, Reply::Hang);
        assert!(h.manager.start_upload());
        let generation = h.manager.uploader.generation();
        let step = TransferProgress {
            sent: 10,
            total: Some(20),
        };

        h.manager.handle_completion(Completion::UploadProgress {
            generation,
            progress: step,
        });
        assert_eq!(
            h.drain(),
            vec![OtaEvent::UploadProgress(UploadProgress::Fraction(0.5))]
        );

        h.manager.abort_upload();
        h.manager.handle_completion(Completion::UploadProgress {
            generation,
            progress: step,
        });
        assert!(h.drain().is_empty());

        h.pump(1).await;
        let events = h.drain();
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, OtaEvent::UploadProgress(_)))
        );
        assert!(events.contains(&OtaEvent::UploadComplete {
            success: false,
            reason: Some("Upload to remote aborted".into()),
        }));
    }

    #[tokio::test]
    async fn upload_start_aborts_outstanding_probe() {
        let mut h = Harness::ready().await;
        // Unscripted, so the probe hangs.
        h.manager.refresh_probe();
        assert_eq!(h.manager.prober_state(), ProberState::Probing);
        h.transport.on(Method::Post, Reply::Hang);

        assert!(h.manager.start_upload());
        assert_eq!(h.manager.prober_state(), ProberState::Idle);

        // Only the cancelled probe can report while the upload hangs.
        h.pump(1).await;
        assert_eq!(h.reason(Component::Remote), "Connection to remote aborted");
        let events = h.drain();
        assert_eq!(
            events,
            vec![
                OtaEvent::ReadinessChanged(ReadinessChange::NotReady {
                    component: Component::Upload,
                    reason: "Upload in progress...".into(),
                }),
                OtaEvent::ReadinessChanged(ReadinessChange::NotReady {
                    component: Component::Remote,
                    reason: "Connection to remote aborted".into(),
                }),
            ]
        );

        h.manager.abort_upload();
        h.pump(1).await;
        assert!(!h.manager.is_uploading());
        assert_eq!(h.manager.prober_state(), ProberState::Probing);
    }

    #[tokio::test]
    async fn file_changed_after_hashing_fails_upload() {
        let mut h = Harness::ready().await;
        h.files.insert("/build/fw.bin", b"rebuilt firmware image".to_vec());
        h.transport.respond(Method::Post, 204);

        assert!(h.manager.start_upload());
        h.pump(1).await;

        let reason = h
            .drain()
            .into_iter()
            .find_map(|e| match e {
                OtaEvent::UploadComplete { success, reason } => {
                    assert!(!success);
                    reason
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(
            reason,
            format!(
                "Error - file changed since it was hashed (22 bytes, expected {})",
                FIRMWARE.len()
            )
        );
        assert_eq!(h.reason(Component::Upload), "Upload failed");
        assert_eq!(h.transport.count(Method::Post), 0);
        assert!(h.manager.selected_file().is_some());
    }

    #[tokio::test]
    async fn refresh_is_ignored_during_upload() {
        let mut h = Harness::ready().await;
        assert!(h.manager.start_upload());
        let heads = h.transport.count(Method::Head);

        h.manager.refresh_probe();
        tokio::task::yield_now().await;
        assert_eq!(h.transport.count(Method::Head), heads);
        assert_eq!(h.manager.prober_state(), ProberState::Idle);
    }

    #[tokio::test]
    async fn select_none_is_idempotent() {
        let mut h = Harness::new(Reply::Hang);
        h.drain();
        let before = h.manager.components().to_vec();

        h.manager.select_file(None);
        h.manager.select_file(None);
        assert_eq!(h.manager.components(), before.as_slice());
        assert!(h.drain().is_empty());
    }

    #[tokio::test]
    async fn newer_selection_wins_over_stale_digest() {
        let mut h = Harness::new(Reply::Respond(Response::empty(204)));
        h.pump(1).await;
        let old = h.files.file("/old.bin", b"old");
        let new = h.files.file("/new.bin", b"new firmware");

        h.manager.select_file(Some(old));
        h.manager.select_file(Some(new));
        h.pump(2).await;

        assert_eq!(h.manager.selected_file().unwrap().name, "new.bin");
        assert_eq!(
            h.manager.file_digest(),
            Some(checksum_bytes(b"new firmware").as_str())
        );
        assert!(h.manager.is_ready());
    }
}
