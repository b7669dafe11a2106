//! Driver task and cloneable handle for an [`OtaManager`].

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use devpanel_protocol::{FileRef, FileSource, Transport};

use crate::manager::OtaManager;
use crate::readiness::ReadinessComponent;
use crate::types::{OtaConfig, OtaEvent};

/// Errors returned by [`OtaHandle`].
#[derive(Debug, thiserror::Error)]
pub enum OtaError {
    #[error("OTA manager has shut down")]
    Closed,
}

enum OtaCommand {
    SelectFile(Option<FileRef>),
    StartUpload(oneshot::Sender<bool>),
    AbortUpload,
    RefreshProbe,
    Components(oneshot::Sender<Vec<ReadinessComponent>>),
    Shutdown,
}

/// Handle for sending commands to a running manager.
#[derive(Clone)]
pub struct OtaHandle {
    commands: mpsc::Sender<OtaCommand>,
}

impl OtaHandle {
    pub async fn select_file(&self, file: Option<FileRef>) -> Result<(), OtaError> {
        self.send(OtaCommand::SelectFile(file)).await
    }

    /// Returns whether the upload was admitted.
    pub async fn start_upload(&self) -> Result<bool, OtaError> {
        let (tx, rx) = oneshot::channel();
        self.send(OtaCommand::StartUpload(tx)).await?;
        rx.await.map_err(|_| OtaError::Closed)
    }

    pub async fn abort_upload(&self) -> Result<(), OtaError> {
        self.send(OtaCommand::AbortUpload).await
    }

    pub async fn refresh_probe(&self) -> Result<(), OtaError> {
        self.send(OtaCommand::RefreshProbe).await
    }

    /// Snapshot of all readiness components in insertion order.
    pub async fn components(&self) -> Result<Vec<ReadinessComponent>, OtaError> {
        let (tx, rx) = oneshot::channel();
        self.send(OtaCommand::Components(tx)).await?;
        rx.await.map_err(|_| OtaError::Closed)
    }

    /// Stops the driver task; in-flight work is cancelled.
    pub async fn shutdown(&self) -> Result<(), OtaError> {
        self.send(OtaCommand::Shutdown).await
    }

    async fn send(&self, cmd: OtaCommand) -> Result<(), OtaError> {
        self.commands.send(cmd).await.map_err(|_| OtaError::Closed)
    }
}

/// Spawns a manager on its own task.
///
/// Returns the command handle, the event stream and the task handle. The
/// task ends on [`OtaHandle::shutdown`] or once every handle is dropped.
pub fn spawn(
    config: OtaConfig,
    transport: Arc<dyn Transport>,
    files: Arc<dyn FileSource>,
) -> (OtaHandle, mpsc::UnboundedReceiver<OtaEvent>, JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let task = tokio::spawn(async move {
        let manager = OtaManager::new(config, transport, files, events_tx);
        run(manager, cmd_rx).await;
    });

    (OtaHandle { commands: cmd_tx }, events_rx, task)
}

async fn run(mut manager: OtaManager, mut commands: mpsc::Receiver<OtaCommand>) {
    loop {
        tokio::select! {
            cmd = commands.recv() => {
                let Some(cmd) = cmd else {
                    debug!("all OTA handles dropped");
                    break;
                };
                match cmd {
                    OtaCommand::SelectFile(file) => manager.select_file(file),
                    OtaCommand::StartUpload(reply) => {
                        let _ = reply.send(manager.start_upload());
                    }
                    OtaCommand::AbortUpload => manager.abort_upload(),
                    OtaCommand::RefreshProbe => manager.refresh_probe(),
                    OtaCommand::Components(reply) => {
                        let _ = reply.send(manager.components().to_vec());
                    }
                    OtaCommand::Shutdown => break,
                }
            }
            _ = manager.advance() => {}
        }
    }
    manager.shutdown();
    info!("OTA driver stopped");
}
