//! Device and focus polling.
//!
//! Global hotkeys are detected by sampling the keyboard and pointer every
//! poll interval and resolving the held chord against the keybind list.
//! The active window is sampled the same way; only changes are reported.

use std::sync::Arc;
use std::time::Duration;

use resetti_core::{BackendError, Bind, Input, InputResolver, Keymap, PointerState, WindowBackend, WindowHandle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

fn ticker(interval: Duration) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

async fn sample(window: &Arc<dyn WindowBackend>) -> Result<(Keymap, PointerState), BackendError> {
    let window = window.clone();
    tokio::task::spawn_blocking(move || Ok((window.query_keymap()?, window.query_pointer()?)))
        .await
        .unwrap_or_else(|e| Err(BackendError::Io(std::io::Error::other(e))))
}

/// Poll devices and send one [`Input`] per tick while a bind is held.
pub fn spawn_input_poller(
    window: Arc<dyn WindowBackend>,
    binds: Vec<Bind>,
    interval: Duration,
    tx: mpsc::Sender<Input>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut resolver = InputResolver::new(binds);
        let mut ticker = ticker(interval);
        let mut failing = false;
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = cancel.cancelled() => return,
            }
            let (keymap, pointer) = match sample(&window).await {
                Ok(state) => {
                    if failing {
                        tracing::info!("input polling recovered");
                        failing = false;
                    }
                    state
                }
                Err(e) => {
                    if !failing {
                        tracing::warn!(error = %e, "failed to query input devices");
                        failing = true;
                    }
                    continue;
                }
            };
            let Some(input) = resolver.tick(&keymap, &pointer) else {
                continue;
            };
            tokio::select! {
                sent = tx.send(input) => if sent.is_err() { return },
                _ = cancel.cancelled() => return,
            }
        }
    })
}

/// Poll the active window and send it whenever it changes.
pub fn spawn_focus_poller(
    window: Arc<dyn WindowBackend>,
    interval: Duration,
    tx: mpsc::Sender<Option<WindowHandle>>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = ticker(interval);
        let mut last: Option<Option<WindowHandle>> = None;
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = cancel.cancelled() => return,
            }
            let w = window.clone();
            let active = match tokio::task::spawn_blocking(move || w.active_window()).await {
                Ok(Ok(active)) => active,
                Ok(Err(e)) => {
                    tracing::debug!(error = %e, "failed to query active window");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "focus query panicked");
                    continue;
                }
            };
            if last == Some(active) {
                continue;
            }
            last = Some(active);
            tokio::select! {
                sent = tx.send(active) => if sent.is_err() { return },
                _ = cancel.cancelled() => return,
            }
        }
    })
}
