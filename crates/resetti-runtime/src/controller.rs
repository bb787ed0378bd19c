//! Top-level controller: builds every collaborator from the profile, runs
//! the event loop, and unwinds cleanly on shutdown or a fatal error.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use resetti_core::{ProcessControl, Profile, SceneBackend, WindowBackend};
use resetti_obs::ObsClient;
use resetti_x11::{SubprocessRunner, XdoBackend, find_instances};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::counter::{self, CounterFile, CounterHandle};
use crate::cpu::{self, NixProcessControl};
use crate::frontend::{Frontend, Host};
use crate::hooks::Hooks;
use crate::input;
use crate::manager::{Coordinator, Manager, UPDATES_PER_INSTANCE};
use crate::multi::Multi;
use crate::wall::Wall;

const INPUT_QUEUE: usize = 64;
const FOCUS_QUEUE: usize = 16;
const EVENT_QUEUE: usize = 256;
/// Upper bound on the final reset count flush.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

pub async fn run(profile: Profile) -> anyhow::Result<()> {
    let keybinds = profile.keybinds().context("(init) parse keybinds")?;
    let window: Arc<dyn WindowBackend> = Arc::new(XdoBackend::new(SubprocessRunner::new()));

    let instances = tokio::task::spawn_blocking(|| find_instances(&SubprocessRunner::new()))
        .await
        .context("(init) find instances")?
        .context("(init) find instances")?;
    let count = instances.len();
    tracing::info!(count, "instances discovered");

    let cancel = CancellationToken::new();

    let (scenes, mut obs_task) = if profile.obs.enabled {
        let client = ObsClient::connect(profile.obs.port, profile.obs.password.as_deref())
            .await
            .with_context(|| format!("(init) connect to obs on port {}", profile.obs.port))?;
        let (handle, task) = resetti_obs::spawn(client, cancel.clone());
        let scenes: Arc<dyn SceneBackend> = Arc::new(handle);
        (Some(scenes), Some(task))
    } else {
        (None, None)
    };

    let (counter, counter_task) = match &profile.reset_count {
        Some(path) => {
            let file = CounterFile::open(path)
                .with_context(|| format!("(init) open reset count {}", path.display()))?;
            tracing::info!(count = file.count(), path = %path.display(), "reset count loaded");
            let (handle, task) = counter::spawn(file, cancel.clone());
            (handle, Some(task))
        }
        None => (CounterHandle::disabled(), None),
    };

    let process: Arc<dyn ProcessControl> = Arc::new(NixProcessControl::new());
    let (affinity, affinity_task) = match &profile.wall.perf.affinity {
        Some(sets) if profile.wall.enabled => {
            let pids = instances.iter().map(|i| i.pid).collect();
            let (handle, task) = cpu::spawn(
                pids,
                sets.clone(),
                profile.wall.perf.low_threshold,
                process.clone(),
                cancel.clone(),
            );
            (Some(handle), Some(task))
        }
        _ => (None, None),
    };

    let manager = Arc::new(
        Manager::new(instances, window.clone(), profile.grace_period())
            .with_f1(profile.wall.enabled && profile.wall.use_f1),
    );
    let (update_tx, mut updates) = mpsc::channel(UPDATES_PER_INSTANCE * count.max(1));
    let coordinator = Coordinator::new(manager.clone(), update_tx).context("(init) open instance logs")?;
    let mut coordinator_task = tokio::spawn(coordinator.run(cancel.clone()));

    let binds = keybinds.iter().map(|k| k.bind.clone()).collect();
    let (input_tx, mut inputs) = mpsc::channel(INPUT_QUEUE);
    let input_task = input::spawn_input_poller(
        window.clone(),
        binds,
        profile.poll_interval(),
        input_tx,
        cancel.clone(),
    );
    let (focus_tx, mut focus) = mpsc::channel(FOCUS_QUEUE);
    let focus_task = input::spawn_focus_poller(window.clone(), profile.poll_interval(), focus_tx, cancel.clone());

    let (events_tx, mut events) = mpsc::channel(EVENT_QUEUE);
    let host = Host {
        manager: manager.clone(),
        window,
        scenes,
        process,
        counter,
        hooks: Hooks::new(profile.hooks.clone()),
        affinity,
        events: events_tx,
        keybinds,
        unpause_focus: profile.unpause_focus,
    };
    let mut frontend = match build_frontend(host, &profile) {
        Ok(frontend) => frontend,
        Err(e) => {
            cancel.cancel();
            return Err(e);
        }
    };

    let mut sigterm = signal(SignalKind::terminate()).context("(init) install SIGTERM handler")?;
    let mut sigusr1 = signal(SignalKind::user_defined1()).context("(init) install SIGUSR1 handler")?;
    tracing::info!(instances = count, wall = profile.wall.enabled, "resetti running");

    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received ctrl-c, shutting down");
                break Ok(());
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
                break Ok(());
            }
            _ = sigusr1.recv() => dump(&manager, &*frontend),
            res = &mut coordinator_task => break Err(task_failure("log coordinator", res)),
            res = join_optional(&mut obs_task) => break Err(task_failure("obs connection", res)),
            Some(update) = updates.recv() => frontend.on_update(update),
            Some(input) = inputs.recv() => frontend.on_input(input),
            Some(window) = focus.recv() => frontend.on_focus_change(window),
            Some(event) = events.recv() => frontend.on_event(event),
        }
    };

    frontend.teardown();
    cancel.cancel();
    if let Some(task) = counter_task {
        match tokio::time::timeout(FLUSH_TIMEOUT, task).await {
            Ok(Ok(Ok(_))) => {}
            Ok(Ok(Err(e))) => tracing::error!(error = %e, "failed to save reset count"),
            Ok(Err(e)) => tracing::error!(error = %e, "reset counter task panicked"),
            Err(_) => tracing::error!("timed out saving reset count"),
        }
    }
    if let Some(task) = affinity_task {
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "affinity task panicked");
        }
    }
    let _ = tokio::join!(input_task, focus_task);
    tracing::info!("resetti stopped");
    result
}

fn build_frontend(host: Host, profile: &Profile) -> anyhow::Result<Box<dyn Frontend>> {
    let mut frontend: Box<dyn Frontend> = if profile.wall.enabled {
        Box::new(Wall::new(host, profile.wall.clone())?)
    } else {
        Box::new(Multi::new(host))
    };
    frontend.setup().context("(init) frontend setup")?;
    Ok(frontend)
}

fn dump(manager: &Manager, frontend: &dyn Frontend) {
    let active = manager.active();
    for (id, state) in manager.snapshot().iter().enumerate() {
        tracing::info!(
            instance = id,
            phase = %state.phase,
            progress = state.progress,
            active = active == Some(id),
            "state dump"
        );
    }
    tracing::info!(frontend = %frontend.describe(), "state dump");
}

/// Await an optional task; never resolves when there is none.
async fn join_optional<T>(task: &mut Option<JoinHandle<T>>) -> Result<T, JoinError> {
    match task {
        Some(task) => task.await,
        None => std::future::pending().await,
    }
}

/// Describe why a task that should run until cancelled has ended.
fn task_failure<E>(name: &str, res: Result<Result<(), E>, JoinError>) -> anyhow::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    match res {
        Ok(Ok(())) => anyhow::anyhow!("{name} stopped unexpectedly"),
        Ok(Err(e)) => anyhow::Error::new(e).context(format!("{name} failed")),
        Err(e) => anyhow::Error::new(e).context(format!("{name} panicked")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resetti_core::BackendError;
    use std::io;

    #[tokio::test]
    async fn missing_task_never_resolves() {
        let mut none: Option<JoinHandle<()>> = None;
        let res = tokio::time::timeout(Duration::from_millis(20), join_optional(&mut none)).await;
        assert!(res.is_err());

        let mut some = Some(tokio::spawn(async { 7 }));
        assert_eq!(join_optional(&mut some).await.expect("join"), 7);
    }

    #[test]
    fn task_failures_keep_the_cause() {
        let err = task_failure::<BackendError>("obs connection", Ok(Err(BackendError::Disconnected)));
        assert_eq!(format!("{err:#}"), "obs connection failed: scene backend disconnected");

        let err = task_failure::<io::Error>("log coordinator", Ok(Ok(())));
        assert_eq!(err.to_string(), "log coordinator stopped unexpectedly");
    }

    #[tokio::test]
    async fn multi_frontend_is_default() {
        let tmp = tempfile::tempdir().expect("test");
        let rec = crate::testutil::Recorder::new();
        let (host, _rx) = crate::frontend::tests::host(&rec, tmp.path(), 2, Vec::new());
        let frontend = build_frontend(host, &Profile::default()).expect("test");
        assert_eq!(frontend.describe(), "multi current=1");
    }

    #[tokio::test]
    async fn wall_frontend_needs_projector() {
        let tmp = tempfile::tempdir().expect("test");
        let rec = crate::testutil::Recorder::new();
        let (host, _rx) = crate::frontend::tests::host(&rec, tmp.path(), 2, Vec::new());
        let mut profile = Profile::default();
        profile.wall.enabled = true;
        profile.wall.projector = "Missing".to_string();
        assert!(build_frontend(host, &profile).is_err());
    }
}
