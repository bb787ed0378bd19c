//! Event coordinator.
//!
//! [`Manager`] owns the instance registry behind a single lock and performs
//! the window input that follows a registry decision (reset key, pause
//! macro, play). [`Coordinator`] tails every instance log through a `notify`
//! watcher and publishes phase changes as [`Update`]s.
//!
//! The registry lock is only held for the read-modify-write itself; window
//! input is sent after it is released.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use resetti_core::config::Rect;
use resetti_core::{
    BackendError, InstanceInfo, Key, PhaseState, RawUpdate, Registry, ResetKind, ResetPlan,
    ResetRejection, StateReader, Update, WindowBackend, WindowHandle,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Update queue slots reserved per instance.
pub const UPDATES_PER_INSTANCE: usize = 16;

/// How long a full update queue may hold up the coordinator.
const STALL_TIMEOUT: Duration = Duration::from_secs(1);

/// Fatal coordinator failures. Each one ends the run.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("open log of instance {id}: {source}")]
    OpenLog { id: usize, source: std::io::Error },

    #[error("file watcher: {0}")]
    Watcher(#[from] notify::Error),

    #[error("file watcher channel closed")]
    WatcherClosed,

    #[error("log of instance {id} was removed or renamed")]
    LogRemoved { id: usize },

    #[error("update queue stalled for {STALL_TIMEOUT:?}")]
    UpdateQueueStalled,

    #[error("update receiver dropped")]
    UpdateChannelClosed,
}

/// A reset accepted by the registry whose key is still to be pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingReset {
    pub id: usize,
    pub plan: ResetPlan,
    key: Key,
    wid: WindowHandle,
    stamp: u32,
}

pub struct Manager {
    instances: Vec<InstanceInfo>,
    registry: Mutex<Registry>,
    window: Arc<dyn WindowBackend>,
    /// Press F1 (hide HUD) when unpausing a played wall instance.
    use_f1: bool,
}

impl Manager {
    pub fn new(
        instances: Vec<InstanceInfo>,
        window: Arc<dyn WindowBackend>,
        grace_period: Option<Duration>,
    ) -> Self {
        let registry = Registry::new(instances.len(), grace_period);
        Self {
            instances,
            registry: Mutex::new(registry),
            window,
            use_f1: false,
        }
    }

    #[must_use]
    pub fn with_f1(mut self, use_f1: bool) -> Self {
        self.use_f1 = use_f1;
        self
    }

    pub fn instances(&self) -> &[InstanceInfo] {
        &self.instances
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn instance(&self, id: usize) -> Option<&InstanceInfo> {
        self.instances.get(id)
    }

    pub fn state(&self, id: usize) -> Option<PhaseState> {
        self.registry().state(id)
    }

    pub fn snapshot(&self) -> Vec<PhaseState> {
        self.registry().snapshot()
    }

    pub fn active(&self) -> Option<usize> {
        self.registry().active()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        // Registry updates are single assignments; a panic elsewhere cannot
        // leave it half-written.
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a raw log batch. Returns the update to publish when the phase
    /// or progress changed, after sending the pause macro if required.
    pub fn apply(&self, id: usize, raw: RawUpdate, now: Instant) -> Option<Update> {
        let base = self.window.current_time();
        let (applied, stamp) = {
            let mut reg = self.registry();
            let applied = reg.apply_raw(id, raw, now)?;
            let stamp = applied.autopause.then(|| reg.stamp(id, base));
            (applied, stamp)
        };
        if let (Some(stamp), Some(inst)) = (stamp, self.instance(id)) {
            if let Err(e) = self.pause(inst, stamp) {
                tracing::warn!(instance = id, error = %e, "failed to pause instance");
            }
        }
        applied.changed.then_some(Update {
            id,
            state: applied.state,
        })
    }

    fn pause(&self, inst: &InstanceInfo, stamp: u32) -> Result<(), BackendError> {
        self.window.send_key_down(Key::F3, inst.wid, stamp)?;
        self.window.send_key_press(Key::ESCAPE, inst.wid, stamp)?;
        self.window.send_key_up(Key::F3, inst.wid, stamp)?;
        Ok(())
    }

    /// Commit a reset in the registry without pressing any key yet.
    pub fn commit_reset(&self, id: usize, now: Instant) -> Result<PendingReset, ResetRejection> {
        let inst = self.instance(id).ok_or(ResetRejection::UnknownInstance)?;
        let base = self.window.current_time();
        let (plan, stamp) = {
            let mut reg = self.registry();
            let plan = reg.begin_reset(id, now)?;
            (plan, reg.stamp(id, base))
        };
        let key = match plan.kind {
            ResetKind::Preview => inst.preview_key,
            ResetKind::World => inst.reset_key,
        };
        Ok(PendingReset {
            id,
            plan,
            key,
            wid: inst.wid,
            stamp,
        })
    }

    /// Press the reset key of a committed reset.
    ///
    /// A failed key press is logged; the registry already counts the
    /// instance as regenerating and the next log batch corrects it.
    pub fn press_reset(&self, pending: &PendingReset) {
        if let Err(e) = self.window.send_key_press(pending.key, pending.wid, pending.stamp) {
            tracing::warn!(instance = pending.id, error = %e, "failed to send reset key");
        }
        tracing::debug!(
            instance = pending.id,
            kind = ?pending.plan.kind,
            was_active = pending.plan.was_active,
            "reset"
        );
    }

    /// Commit a reset and press the matching reset key.
    pub fn reset(&self, id: usize, now: Instant) -> Result<ResetPlan, ResetRejection> {
        let pending = self.commit_reset(id, now)?;
        self.press_reset(&pending);
        Ok(pending.plan)
    }

    /// Mark `id` active without touching its window. Returns the demoted
    /// instance, if any.
    pub fn set_active(&self, id: usize) -> Option<usize> {
        self.registry().play(id)
    }

    /// Make `id` the played instance.
    ///
    /// `wall` carries the unstretched geometry when playing from the wall.
    /// The window is then resized and paused and unpaused again so the
    /// pause menu cursor matches the new size.
    pub fn play(
        &self,
        id: usize,
        unpause: bool,
        wall: Option<Rect>,
    ) -> Result<Option<usize>, BackendError> {
        let Some(inst) = self.instance(id) else {
            return Ok(None);
        };
        let base = self.window.current_time();
        let (demoted, stamp) = {
            let mut reg = self.registry();
            (reg.play(id), reg.stamp(id, base))
        };
        if unpause {
            self.window.send_key_press(Key::ESCAPE, inst.wid, stamp)?;
        }
        if let Some(rect) = wall {
            self.window.move_window(inst.wid, rect)?;
            if unpause && self.use_f1 {
                self.window.send_key_press(Key::F1, inst.wid, stamp)?;
            }
            self.window.send_key_press(Key::ESCAPE, inst.wid, stamp)?;
            self.window.send_key_press(Key::ESCAPE, inst.wid, stamp)?;
        }
        self.window.focus_window(inst.wid)?;
        Ok(demoted)
    }

    pub fn focus(&self, id: usize) -> Result<(), BackendError> {
        match self.instance(id) {
            Some(inst) => self.window.focus_window(inst.wid),
            None => Ok(()),
        }
    }

    pub fn move_window(&self, id: usize, rect: Rect) -> Result<(), BackendError> {
        match self.instance(id) {
            Some(inst) => self.window.move_window(inst.wid, rect),
            None => Ok(()),
        }
    }
}

/// Tails instance logs and feeds the registry.
pub struct Coordinator {
    manager: Arc<Manager>,
    /// Indexed by instance id.
    readers: Vec<StateReader>,
    paths: HashMap<PathBuf, usize>,
    updates: mpsc::Sender<Update>,
}

impl Coordinator {
    /// Open every instance log positioned at its current end.
    pub fn new(manager: Arc<Manager>, updates: mpsc::Sender<Update>) -> Result<Self, ManagerError> {
        let mut readers = Vec::with_capacity(manager.len());
        let mut paths = HashMap::new();
        for inst in manager.instances() {
            let path = inst.log_path();
            let reader =
                StateReader::open(&path).map_err(|source| ManagerError::OpenLog { id: inst.id, source })?;
            readers.push(reader);
            paths.insert(path, inst.id);
        }
        Ok(Self {
            manager,
            readers,
            paths,
            updates,
        })
    }

    /// Run until cancelled or a fatal error occurs.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), ManagerError> {
        // Bridge synchronous notify callbacks into the coordinator loop.
        let (notify_tx, mut notify_rx) = mpsc::channel::<notify::Result<Event>>(256);
        let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res| {
            let _ = notify_tx.blocking_send(res);
        })?;
        for path in self.paths.keys() {
            // Watch the directory so renames of the log itself are reported.
            let dir = path.parent().unwrap_or(path);
            watcher.watch(dir, RecursiveMode::NonRecursive)?;
        }
        tracing::info!(instances = self.readers.len(), "watching instance logs");

        loop {
            tokio::select! {
                event = notify_rx.recv() => {
                    let Some(event) = event else {
                        return Err(ManagerError::WatcherClosed);
                    };
                    self.handle_event(event?).await?;
                }
                _ = cancel.cancelled() => {
                    tracing::debug!("coordinator cancelled");
                    return Ok(());
                }
            }
        }
    }

    async fn handle_event(&mut self, event: Event) -> Result<(), ManagerError> {
        for path in &event.paths {
            let Some(&id) = self.paths.get(path) else {
                continue;
            };
            match event.kind {
                EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_)) => {
                    return Err(ManagerError::LogRemoved { id });
                }
                EventKind::Modify(_) | EventKind::Create(_) | EventKind::Any => {
                    self.process(id).await?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    async fn process(&mut self, id: usize) -> Result<(), ManagerError> {
        let Some(reader) = self.readers.get_mut(id) else {
            return Ok(());
        };
        let raw = match reader.process() {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(instance = id, error = %e, "failed to read instance log");
                return Ok(());
            }
        };
        if !raw.was_updated() {
            return Ok(());
        }

        // The pause macro runs subprocesses; keep them off the async workers.
        let manager = Arc::clone(&self.manager);
        let now = Instant::now();
        let update = match tokio::task::spawn_blocking(move || manager.apply(id, raw, now)).await {
            Ok(update) => update,
            Err(e) => {
                tracing::error!(instance = id, error = %e, "registry update panicked");
                return Ok(());
            }
        };
        if let Some(update) = update {
            tracing::debug!(
                instance = id,
                phase = %update.state.phase,
                progress = update.state.progress,
                "phase changed"
            );
            deliver(&self.updates, update).await?;
        }
        Ok(())
    }
}

/// Publish an update; a full queue is reported and waited on briefly.
async fn deliver(tx: &mpsc::Sender<Update>, update: Update) -> Result<(), ManagerError> {
    match tx.try_send(update) {
        Ok(()) => Ok(()),
        Err(mpsc::error::TrySendError::Closed(_)) => Err(ManagerError::UpdateChannelClosed),
        Err(mpsc::error::TrySendError::Full(update)) => {
            tracing::warn!(instance = update.id, "update queue full, waiting for frontend");
            match tokio::time::timeout(STALL_TIMEOUT, tx.send(update)).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(_)) => Err(ManagerError::UpdateChannelClosed),
                Err(_) => Err(ManagerError::UpdateQueueStalled),
            }
        }
    }
}
