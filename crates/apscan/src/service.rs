//! Driver task for a [`ScanPoller`].

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use devpanel_protocol::Transport;

use crate::poller::{ScanConfig, ScanEvent, ScanPoller};

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("AP scan poller has shut down")]
    Closed,
}

enum ScanCommand {
    Refresh,
    Shutdown,
}

/// Handle for a running poller.
#[derive(Clone)]
pub struct ScanHandle {
    commands: mpsc::Sender<ScanCommand>,
}

impl ScanHandle {
    /// Asks the device for a fresh scan.
    pub async fn refresh(&self) -> Result<(), ScanError> {
        self.send(ScanCommand::Refresh).await
    }

    pub async fn shutdown(&self) -> Result<(), ScanError> {
        self.send(ScanCommand::Shutdown).await
    }

    async fn send(&self, cmd: ScanCommand) -> Result<(), ScanError> {
        self.commands.send(cmd).await.map_err(|_| ScanError::Closed)
    }
}

/// Spawns a poller on its own task.
pub fn spawn(
    config: ScanConfig,
    transport: Arc<dyn Transport>,
) -> (ScanHandle, mpsc::UnboundedReceiver<ScanEvent>, JoinHandle<()>) {
    let (cmd_tx, mut cmd_rx) = mpsc::channel(8);
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let task = tokio::spawn(async move {
        let mut poller = ScanPoller::new(config, transport, events_tx);
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(ScanCommand::Refresh) => poller.refresh(),
                    Some(ScanCommand::Shutdown) => break,
                    None => {
                        debug!("all scan handles dropped");
                        break;
                    }
                },
                _ = poller.advance() => {}
            }
        }
        poller.stop();
        info!("AP scan driver stopped");
    });

    (ScanHandle { commands: cmd_tx }, events_rx, task)
}
