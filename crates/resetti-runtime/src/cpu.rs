//! Process control: suspend/resume signals and CPU affinity classes.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use nix::sched::{CpuSet, sched_setaffinity};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use resetti_core::config::AffinityConfig;
use resetti_core::policy::affinity_for;
use resetti_core::{AffinityClass, BackendError, PhaseState, ProcessControl, Update};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const QUEUE_CAPACITY: usize = 256;

/// [`ProcessControl`] over POSIX signals and `sched_setaffinity`.
#[derive(Debug, Clone)]
pub struct NixProcessControl {
    proc_root: PathBuf,
}

impl Default for NixProcessControl {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
        }
    }
}

impl NixProcessControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Thread ids of `pid`. The game runs many threads and the affinity
    /// mask is per thread.
    fn threads(&self, pid: i32) -> Vec<i32> {
        let dir = self.proc_root.join(pid.to_string()).join("task");
        let tids: Vec<i32> = std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .filter_map(|e| e.file_name().to_str()?.parse().ok())
                    .collect()
            })
            .unwrap_or_default();
        if tids.is_empty() { vec![pid] } else { tids }
    }

    fn signal(&self, pid: u32, signal: Signal) -> Result<(), BackendError> {
        kill(raw_pid(pid)?, signal).map_err(|e| process_error(pid, e))
    }
}

impl ProcessControl for NixProcessControl {
    fn suspend(&self, pid: u32) -> Result<(), BackendError> {
        self.signal(pid, Signal::SIGSTOP)
    }

    fn resume(&self, pid: u32) -> Result<(), BackendError> {
        self.signal(pid, Signal::SIGCONT)
    }

    fn set_affinity(&self, pid: u32, cpus: &[usize]) -> Result<(), BackendError> {
        let mut set = CpuSet::new();
        for &cpu in cpus {
            set.set(cpu).map_err(|e| process_error(pid, e))?;
        }
        let main = raw_pid(pid)?;
        for tid in self.threads(main.as_raw()) {
            // Threads exit all the time; only the main thread must succeed.
            if let Err(e) = sched_setaffinity(Pid::from_raw(tid), &set) {
                if tid == main.as_raw() {
                    return Err(process_error(pid, e));
                }
            }
        }
        Ok(())
    }
}

fn raw_pid(pid: u32) -> Result<Pid, BackendError> {
    i32::try_from(pid).map(Pid::from_raw).map_err(|_| BackendError::Process {
        pid,
        source: io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"),
    })
}

fn process_error(pid: u32, errno: nix::errno::Errno) -> BackendError {
    BackendError::Process {
        pid,
        source: io::Error::from(errno),
    }
}

// ─── Affinity manager ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Message {
    Update(Update),
    Lock { id: usize, locked: bool },
    Active(usize),
}

/// Non-blocking handle to the affinity task.
#[derive(Debug, Clone)]
pub struct AffinityHandle {
    tx: mpsc::Sender<Message>,
}

impl AffinityHandle {
    pub fn update(&self, update: Update) {
        self.send(Message::Update(update));
    }

    pub fn lock(&self, id: usize, locked: bool) {
        self.send(Message::Lock { id, locked });
    }

    /// `id` is now the played instance.
    pub fn active(&self, id: usize) {
        self.send(Message::Active(id));
    }

    fn send(&self, msg: Message) {
        if let Err(e) = self.tx.try_send(msg) {
            tracing::warn!(error = %e, "affinity message dropped");
        }
    }
}

/// Per-instance view owned by the affinity task.
struct AffinityManager {
    pids: Vec<u32>,
    sets: AffinityConfig,
    low_threshold: u8,
    process: Arc<dyn ProcessControl>,
    states: Vec<PhaseState>,
    locked: Vec<bool>,
    classes: Vec<Option<AffinityClass>>,
    /// The played instance keeps the active set until it resets.
    active: Option<usize>,
}

impl AffinityManager {
    fn cpus(&self, class: AffinityClass) -> &[usize] {
        match class {
            AffinityClass::Idle => &self.sets.idle,
            AffinityClass::Low => &self.sets.low,
            AffinityClass::High => &self.sets.high,
            AffinityClass::Active => &self.sets.active,
        }
    }

    fn handle(&mut self, msg: Message) {
        match msg {
            Message::Update(Update { id, state }) => {
                let Some(slot) = self.states.get_mut(id) else {
                    return;
                };
                *slot = state;
                if self.active == Some(id) && state.phase.is_resetting() {
                    self.active = None;
                }
                self.reclassify(id);
            }
            Message::Lock { id, locked } => {
                let Some(slot) = self.locked.get_mut(id) else {
                    return;
                };
                *slot = locked;
                self.reclassify(id);
            }
            Message::Active(id) => {
                if id >= self.states.len() {
                    return;
                }
                self.active = Some(id);
                self.assign(id, AffinityClass::Active);
            }
        }
    }

    fn reclassify(&mut self, id: usize) {
        if self.active == Some(id) {
            return;
        }
        if let Some(class) = affinity_for(&self.states[id], self.locked[id], self.low_threshold) {
            self.assign(id, class);
        }
    }

    fn assign(&mut self, id: usize, class: AffinityClass) {
        let (Some(&pid), Some(current)) = (self.pids.get(id), self.classes.get(id)) else {
            return;
        };
        if *current == Some(class) {
            return;
        }
        match self.process.set_affinity(pid, self.cpus(class)) {
            Ok(()) => {
                tracing::debug!(instance = id, %class, "affinity changed");
                self.classes[id] = Some(class);
            }
            Err(e) => tracing::warn!(instance = id, %class, error = %e, "failed to set affinity"),
        }
    }
}

/// Start the affinity task. Every instance starts in the idle class.
pub fn spawn(
    pids: Vec<u32>,
    sets: AffinityConfig,
    low_threshold: u8,
    process: Arc<dyn ProcessControl>,
    cancel: CancellationToken,
) -> (AffinityHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
    let count = pids.len();
    let manager = AffinityManager {
        pids,
        sets,
        low_threshold,
        process,
        states: vec![PhaseState::default(); count],
        locked: vec![false; count],
        classes: vec![None; count],
        active: None,
    };
    let task = tokio::spawn(run(manager, rx, cancel));
    (AffinityHandle { tx }, task)
}

async fn run(mut manager: AffinityManager, mut rx: mpsc::Receiver<Message>, cancel: CancellationToken) {
    for id in 0..manager.pids.len() {
        manager.assign(id, AffinityClass::Idle);
    }
    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Some(msg) => manager.handle(msg),
                None => return,
            },
            _ = cancel.cancelled() => {
                while let Ok(msg) = rx.try_recv() {
                    manager.handle(msg);
                }
                tracing::debug!("affinity manager stopped");
                return;
            }
        }
    }
}
