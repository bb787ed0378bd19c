//! Fire-and-forget scene control backed by a single client task.

use resetti_core::{BackendError, SceneBackend};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::ObsClient;
use crate::error::ObsError;

/// Requests buffered before callers start seeing "queue full".
const QUEUE_CAPACITY: usize = 64;

#[derive(Debug)]
enum Command {
    SetScene(String),
    SetVisible {
        scene: String,
        item: String,
        visible: bool,
    },
}

/// Cloneable, non-blocking handle to the OBS task.
#[derive(Debug, Clone)]
pub struct ObsHandle {
    tx: mpsc::Sender<Command>,
}

/// Move `client` into a background task.
///
/// The task ends with `Ok` on cancellation and with `Err` when the
/// connection is lost; a single failed request is only logged.
pub fn spawn(
    client: ObsClient,
    cancel: CancellationToken,
) -> (ObsHandle, JoinHandle<Result<(), ObsError>>) {
    let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
    let task = tokio::spawn(run(client, rx, cancel));
    (ObsHandle { tx }, task)
}

async fn run(
    mut client: ObsClient,
    mut rx: mpsc::Receiver<Command>,
    cancel: CancellationToken,
) -> Result<(), ObsError> {
    loop {
        tokio::select! {
            cmd = rx.recv() => {
                let Some(cmd) = cmd else {
                    tracing::debug!("obs handle dropped, stopping obs task");
                    return Ok(());
                };
                let result = match &cmd {
                    Command::SetScene(scene) => client.set_scene(scene).await,
                    Command::SetVisible { scene, item, visible } => {
                        client.set_scene_item_visible(scene, item, *visible).await
                    }
                };
                match result {
                    Ok(()) => {}
                    Err(e) if e.is_fatal() => {
                        tracing::error!(error = %e, "obs connection lost");
                        return Err(e);
                    }
                    Err(e) => tracing::warn!(error = %e, command = ?cmd, "obs request failed"),
                }
            }
            _ = cancel.cancelled() => {
                tracing::debug!("obs task cancelled");
                return Ok(());
            }
        }
    }
}

impl ObsHandle {
    fn enqueue(&self, cmd: Command) -> Result<(), BackendError> {
        self.tx.try_send(cmd).map_err(|e| match e {
            mpsc::error::TrySendError::Full(cmd) => BackendError::Command {
                tool: "obs".to_string(),
                message: format!("request queue full, dropped {cmd:?}"),
            },
            mpsc::error::TrySendError::Closed(_) => BackendError::Disconnected,
        })
    }
}

impl SceneBackend for ObsHandle {
    fn set_scene(&self, scene: &str) -> Result<(), BackendError> {
        self.enqueue(Command::SetScene(scene.to_string()))
    }

    fn set_scene_item_visible(
        &self,
        scene: &str,
        item: &str,
        visible: bool,
    ) -> Result<(), BackendError> {
        self.enqueue(Command::SetVisible {
            scene: scene.to_string(),
            item: item.to_string(),
            visible,
        })
    }
}
