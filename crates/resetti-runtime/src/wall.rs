//! Wall frontend.
//!
//! The wall shows every instance in a grid on an OBS projector. While on
//! the wall, wall binds act on instances (by explicit number or by the grid
//! cell under the pointer); playing an instance leaves the wall until that
//! instance is reset.
//!
//! Suspension has two sources. Admission control force-freezes the newest
//! resetting instance when too many regenerate at once and queues it; the
//! oldest queued instances continue once fewer than the cap are running.
//! Idle freezing suspends instances that sit loaded on the wall. Either way
//! an instance is resumed before any window operation targets it.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use anyhow::Context;
use resetti_core::config::WallConfig;
use resetti_core::policy::resetting_count;
use resetti_core::{
    Action, Bind, Input, InstancePhase, Update, WallGrid, WindowHandle,
};

use crate::frontend::{Frontend, FrontendEvent, Host, instance_scene};
use crate::hooks::HookKind;
use crate::manager::PendingReset;

const WALL_SCENE: &str = "Wall";

fn lock_item(id: usize) -> String {
    format!("Lock {}", id + 1)
}

pub struct Wall {
    host: Host,
    config: WallConfig,
    grid: WallGrid,
    projector: WindowHandle,
    screen: (u32, u32),
    locked: Vec<bool>,
    /// Suspended by admission control.
    frozen: Vec<bool>,
    /// Suspended after idling on the wall.
    idle_frozen: Vec<bool>,
    /// Force-frozen instances, oldest first.
    thaw_queue: VecDeque<usize>,
    /// The played instance; `None` while on the wall.
    current: Option<usize>,
    projector_focused: bool,
    /// Grid cell hit by the last pointer-targeted action, for drags.
    last_cell: Option<usize>,
}

impl Wall {
    pub fn new(host: Host, config: WallConfig) -> anyhow::Result<Self> {
        let projector = host
            .window
            .find_window(&config.projector)
            .with_context(|| format!("(init) find projector window {:?}", config.projector))?;
        let screen = host.window.screen_size().context("(init) query screen size")?;
        let count = host.manager.len();
        Ok(Self {
            grid: WallGrid::new(count, config.columns),
            host,
            config,
            projector,
            screen,
            locked: vec![false; count],
            frozen: vec![false; count],
            idle_frozen: vec![false; count],
            thaw_queue: VecDeque::new(),
            current: None,
            projector_focused: false,
            last_cell: None,
        })
    }

    fn count(&self) -> usize {
        self.locked.len()
    }

    fn phase(&self, id: usize) -> Option<InstancePhase> {
        self.host.manager.state(id).map(|s| s.phase)
    }

    fn pid(&self, id: usize) -> Option<u32> {
        self.host.manager.instance(id).map(|i| i.pid)
    }

    fn freezing_enabled(&self) -> bool {
        self.config.perf.freeze_idle || self.config.perf.concurrent_resets > 0
    }

    fn wall_binds(&self) -> Vec<Bind> {
        self.host
            .keybinds
            .iter()
            .filter(|k| !k.actions.wall.is_empty())
            .map(|k| k.bind.clone())
            .collect()
    }

    fn grab_wall_keys(&self) {
        for bind in self.wall_binds() {
            if let Err(e) = self.host.window.grab_key(&bind) {
                tracing::warn!(%bind, error = %e, "failed to grab wall key");
            }
        }
    }

    fn ungrab_wall_keys(&self) {
        for bind in self.wall_binds() {
            if let Err(e) = self.host.window.ungrab_key(&bind) {
                tracing::warn!(%bind, error = %e, "failed to ungrab wall key");
            }
        }
    }

    // ─── Freezing ────────────────────────────────────────────────

    fn suspend(&self, id: usize) -> bool {
        let Some(pid) = self.pid(id) else {
            return false;
        };
        match self.host.process.suspend(pid) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(instance = id, error = %e, "failed to suspend instance");
                false
            }
        }
    }

    /// Resume `id` if it is suspended for any reason.
    fn thaw(&mut self, id: usize) {
        if !self.frozen[id] && !self.idle_frozen[id] {
            return;
        }
        if let Some(pid) = self.pid(id) {
            if let Err(e) = self.host.process.resume(pid) {
                tracing::warn!(instance = id, error = %e, "failed to resume instance");
            }
        }
        self.frozen[id] = false;
        self.idle_frozen[id] = false;
        self.thaw_queue.retain(|queued| *queued != id);
        tracing::debug!(instance = id, "resumed");
    }

    /// Resume queued instances, oldest first, while fewer than the cap
    /// are regenerating unfrozen.
    fn drain_thaw_queue(&mut self) {
        let cap = self.config.perf.concurrent_resets;
        while let Some(&next) = self.thaw_queue.front() {
            let running = self
                .host
                .manager
                .snapshot()
                .iter()
                .enumerate()
                .filter(|(id, state)| state.phase.is_resetting() && !self.frozen[*id])
                .count();
            if cap != 0 && running >= cap {
                break;
            }
            self.thaw(next);
        }
    }

    // ─── Wall operations ─────────────────────────────────────────

    /// Switch the view to the wall and take the wall keys.
    fn show_wall(&mut self) {
        self.host.set_scene(WALL_SCENE);
        if let Err(e) = self.host.window.focus_window(self.projector) {
            tracing::warn!(error = %e, "failed to focus projector");
        }
        self.grab_wall_keys();
        self.last_cell = None;
    }

    fn first_idle_locked(&self) -> Option<usize> {
        (0..self.count()).find(|&id| self.locked[id] && self.phase(id) == Some(InstancePhase::Idle))
    }

    fn goto_wall(&mut self) {
        self.current = None;
        if self.config.goto_locked {
            if let Some(id) = self.first_idle_locked() {
                if self.play(id) {
                    return;
                }
            }
        }
        self.show_wall();
    }

    /// Play an idle instance. Returns whether the wall was left.
    fn play(&mut self, id: usize) -> bool {
        if self.current.is_some() || id >= self.count() {
            return false;
        }
        if self.phase(id) != Some(InstancePhase::Idle) {
            tracing::debug!(instance = id, "not playing an instance that is still loading");
            return false;
        }
        self.thaw(id);
        // The affinity task must see the unlock before the instance turns active.
        if self.locked[id] {
            self.set_locked(id, false);
        }
        if let Some(affinity) = &self.host.affinity {
            affinity.active(id);
        }
        self.host.set_scene(&instance_scene(id));
        self.ungrab_wall_keys();
        if let Err(e) = self
            .host
            .manager
            .play(id, self.host.unpause_focus, Some(self.config.unstretch))
        {
            tracing::warn!(instance = id, error = %e, "failed to play instance");
        }
        self.current = Some(id);
        self.last_cell = None;
        self.host.hooks.run(HookKind::WallPlay);
        tracing::info!(instance = id, "playing");
        true
    }

    fn set_locked(&mut self, id: usize, locked: bool) {
        self.locked[id] = locked;
        self.host.set_item_visible(WALL_SCENE, &lock_item(id), locked);
        if let Some(affinity) = &self.host.affinity {
            affinity.lock(id, locked);
        }
    }

    fn toggle_lock(&mut self, id: usize) {
        if id >= self.count() {
            return;
        }
        let locked = !self.locked[id];
        self.set_locked(id, locked);
        self.host.hooks.run(if locked {
            HookKind::WallLock
        } else {
            HookKind::WallUnlock
        });
        tracing::debug!(instance = id, locked, "lock toggled");
    }

    /// Whether the wall allows resetting `id`. The registry has the final
    /// say when the reset is committed.
    fn resettable(&self, id: usize) -> bool {
        id < self.count()
            && self.current != Some(id)
            && !self.locked[id]
            && !self.frozen[id]
            && self.phase(id) != Some(InstancePhase::Generating)
    }

    /// Reset several instances at once, key presses dispatched in parallel.
    fn reset_many(&mut self, ids: &[usize]) -> Vec<usize> {
        let now = Instant::now();
        let mut pending: Vec<PendingReset> = Vec::with_capacity(ids.len());
        for &id in ids {
            if !self.resettable(id) {
                continue;
            }
            match self.host.manager.commit_reset(id, now) {
                Ok(reset) => pending.push(reset),
                Err(reason) => tracing::debug!(instance = id, ?reason, "reset rejected"),
            }
        }
        // Only accepted resets wake an idle-frozen instance.
        for reset in &pending {
            self.thaw(reset.id);
        }

        let manager = &self.host.manager;
        let pressed: Vec<(usize, bool)> = std::thread::scope(|scope| {
            let handles: Vec<_> = pending
                .iter()
                .map(|reset| (reset.id, scope.spawn(move || manager.press_reset(reset))))
                .collect();
            handles
                .into_iter()
                .map(|(id, handle)| (id, handle.join().is_ok()))
                .collect()
        });

        let mut accepted = Vec::with_capacity(pressed.len());
        for (id, ok) in pressed {
            if !ok {
                tracing::error!(instance = id, "reset dispatch panicked");
            }
            self.record_reset(id, HookKind::WallReset);
            accepted.push(id);
        }
        self.admit(&accepted);
        accepted
    }

    fn reset_instance(&mut self, id: usize) -> bool {
        !self.reset_many(&[id]).is_empty()
    }

    fn reset_all(&mut self) {
        let ids: Vec<usize> = (0..self.count()).collect();
        let reset = self.reset_many(&ids);
        tracing::debug!(count = reset.len(), "reset all");
    }

    fn reset_others(&mut self, id: usize) {
        if !self.play(id) {
            return;
        }
        let others: Vec<usize> = (0..self.count()).filter(|&other| other != id).collect();
        self.reset_many(&others);
    }

    /// Reset the played instance and return to the wall.
    fn reset_current(&mut self) {
        let Some(id) = self.current else {
            return;
        };
        if let Err(reason) = self.host.manager.reset(id, Instant::now()) {
            tracing::debug!(instance = id, ?reason, "reset rejected");
            return;
        }
        if self.config.stretch_windows {
            if let Err(e) = self.host.manager.move_window(id, self.config.stretch) {
                tracing::warn!(instance = id, error = %e, "failed to stretch window");
            }
        }
        self.record_reset(id, HookKind::Reset);
        self.admit(&[id]);
        self.goto_wall();
    }

    fn record_reset(&self, id: usize, hook: HookKind) {
        self.host.counter.increment();
        self.host.hooks.run(hook);
        if let (Some(affinity), Some(state)) = (&self.host.affinity, self.host.manager.state(id)) {
            affinity.update(Update { id, state });
        }
    }

    /// Admission control after resetting `reset` (in dispatch order): if
    /// too many instances now regenerate, schedule freezes for the newest.
    fn admit(&self, reset: &[usize]) {
        let cap = self.config.perf.concurrent_resets;
        if cap == 0 || reset.is_empty() {
            return;
        }
        let resetting = resetting_count(&self.host.manager.snapshot());
        let excess = resetting.saturating_sub(cap).min(reset.len());
        let delay = Duration::from_millis(self.config.perf.force_freeze_delay_ms);
        for &id in reset.iter().rev().take(excess) {
            tracing::debug!(instance = id, resetting, cap, "over reset cap, freezing");
            self.host.schedule(delay, FrontendEvent::ForceFreeze(id));
        }
    }

    // ─── Input ───────────────────────────────────────────────────

    /// Instance an action applies to: the explicit one, else the grid cell
    /// under the pointer. Held pointer actions only fire on a new cell.
    fn target(&mut self, explicit: Option<usize>, input: &Input) -> Option<usize> {
        if explicit.is_some() {
            return explicit.filter(|id| *id < self.count());
        }
        let (width, height) = self.screen;
        let cell = self.grid.cell_at(input.x, input.y, width, height)?;
        if input.repeat && self.last_cell == Some(cell) {
            return None;
        }
        self.last_cell = Some(cell);
        Some(cell)
    }

    fn dispatch(&mut self, action: Action, input: &Input) {
        if action.is_wall() && action != Action::WallFocus && !self.projector_focused {
            tracing::debug!(%action, "projector not focused, ignoring wall action");
            return;
        }
        let pointer_targeted = matches!(
            action,
            Action::WallPlay(None)
                | Action::WallReset(None)
                | Action::WallResetOthers(None)
                | Action::WallLock(None)
        );
        if input.repeat && !pointer_targeted {
            return;
        }

        match action {
            Action::IngameFocus => {
                if let Some(id) = self.current {
                    if let Err(e) = self.host.manager.focus(id) {
                        tracing::warn!(instance = id, error = %e, "failed to focus instance");
                    }
                }
            }
            Action::IngameReset => self.reset_current(),
            Action::WallFocus => {
                if let Err(e) = self.host.window.focus_window(self.projector) {
                    tracing::warn!(error = %e, "failed to focus projector");
                }
            }
            Action::WallResetAll => self.reset_all(),
            Action::WallPlayFirstLocked => {
                if let Some(id) = self.first_idle_locked() {
                    self.play(id);
                }
            }
            Action::WallPlay(explicit) => {
                if let Some(id) = self.target(explicit, input) {
                    self.play(id);
                }
            }
            Action::WallReset(explicit) => {
                if let Some(id) = self.target(explicit, input) {
                    self.reset_instance(id);
                }
            }
            Action::WallResetOthers(explicit) => {
                if let Some(id) = self.target(explicit, input) {
                    self.reset_others(id);
                }
            }
            Action::WallLock(explicit) => {
                if let Some(id) = self.target(explicit, input) {
                    self.toggle_lock(id);
                }
            }
        }
    }
}

impl Frontend for Wall {
    fn setup(&mut self) -> anyhow::Result<()> {
        for id in 0..self.count() {
            self.host.set_item_visible(WALL_SCENE, &lock_item(id), false);
        }
        if self.freezing_enabled() {
            for inst in self.host.manager.instances() {
                if let Err(e) = self.host.process.resume(inst.pid) {
                    tracing::warn!(instance = inst.id, error = %e, "failed to resume instance");
                }
            }
        }
        self.show_wall();
        tracing::info!(
            instances = self.count(),
            columns = self.grid.columns,
            rows = self.grid.rows,
            "wall ready"
        );
        Ok(())
    }

    fn on_focus_change(&mut self, window: Option<WindowHandle>) {
        self.projector_focused = window == Some(self.projector);
    }

    fn on_input(&mut self, input: Input) {
        let on_wall = self.current.is_none();
        let Some(keybind) = self.host.keybinds.get(input.bind) else {
            return;
        };
        let actions = keybind.actions.get(on_wall).to_vec();
        for action in actions {
            self.dispatch(action, &input);
        }
    }

    fn on_update(&mut self, update: Update) {
        if let Some(affinity) = &self.host.affinity {
            affinity.update(update);
        }
        self.drain_thaw_queue();
        let id = update.id;
        if update.state.phase != InstancePhase::Idle {
            return;
        }
        if self.config.perf.freeze_idle && self.current != Some(id) {
            let delay = Duration::from_millis(self.config.perf.freeze_delay_ms);
            self.host.schedule(delay, FrontendEvent::IdleFreeze(id));
        }
    }

    fn on_event(&mut self, event: FrontendEvent) {
        match event {
            FrontendEvent::ForceFreeze(id) => {
                if id >= self.count() || self.current == Some(id) || self.frozen[id] {
                    return;
                }
                if !self.phase(id).is_some_and(InstancePhase::is_resetting) {
                    tracing::debug!(instance = id, "finished before force freeze");
                    return;
                }
                if self.suspend(id) {
                    self.frozen[id] = true;
                    self.thaw_queue.push_back(id);
                    tracing::info!(instance = id, queued = self.thaw_queue.len(), "force-frozen");
                }
            }
            FrontendEvent::IdleFreeze(id) => {
                if id >= self.count()
                    || self.current == Some(id)
                    || self.frozen[id]
                    || self.idle_frozen[id]
                    || self.phase(id) != Some(InstancePhase::Idle)
                {
                    return;
                }
                if self.suspend(id) {
                    self.idle_frozen[id] = true;
                    tracing::debug!(instance = id, "idle-frozen");
                }
            }
        }
    }

    fn teardown(&mut self) {
        self.ungrab_wall_keys();
        for id in 0..self.count() {
            self.thaw(id);
        }
    }

    fn describe(&self) -> String {
        let flags: Vec<String> = (0..self.count())
            .map(|id| {
                let mut s = String::new();
                if self.locked[id] {
                    s.push('L');
                }
                if self.frozen[id] {
                    s.push('F');
                }
                if self.idle_frozen[id] {
                    s.push('I');
                }
                format!("{}:{}", id + 1, if s.is_empty() { "-" } else { s.as_str() })
            })
            .collect();
        format!(
            "wall current={:?} projector_focused={} thaw_queue={:?} flags=[{}]",
            self.current.map(|id| id + 1),
            self.projector_focused,
            self.thaw_queue,
            flags.join(" ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::tests::host;
    use crate::testutil::{Call, PROJECTOR, Recorder, pid, wid};
    use resetti_core::config::AffinityConfig;
    use resetti_core::{Key, Keybind, RawPhase, RawUpdate};
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn keybind(bind: &str, ingame: &[&str], wall: &[&str]) -> Keybind {
        let own = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Keybind {
            bind: bind.parse().expect("test"),
            actions: resetti_core::ActionList::parse(&own(ingame), &own(wall)).expect("test"),
        }
    }

    fn binds() -> Vec<Keybind> {
        vec![
            keybind("Shift-R", &[], &["wall_reset_all"]),
            keybind("E", &["ingame_reset"], &["wall_reset"]),
            keybind("R", &[], &["wall_play"]),
            keybind("F", &[], &["wall_lock"]),
            keybind("1", &[], &["wall_play(1)"]),
            keybind("2", &[], &["wall_reset_others(2)"]),
        ]
    }

    fn press(bind: usize) -> Input {
        Input {
            bind,
            repeat: false,
            x: 0,
            y: 0,
        }
    }

    /// Pointer over the cell of `id` in a 2x2 grid on 1920x1080.
    fn press_at(bind: usize, id: usize, repeat: bool) -> Input {
        Input {
            bind,
            repeat,
            x: 100 + 960 * (id % 2) as i32,
            y: 100 + 540 * (id / 2) as i32,
        }
    }

    fn wall_with(
        rec: &Arc<Recorder>,
        root: &std::path::Path,
        count: usize,
        config: WallConfig,
    ) -> (Wall, mpsc::Receiver<FrontendEvent>) {
        let (host, rx) = host(rec, root, count, binds());
        let mut wall = Wall::new(host, config).expect("test");
        wall.setup().expect("test");
        wall.on_focus_change(Some(PROJECTOR));
        rec.take();
        (wall, rx)
    }

    fn set_phase(wall: &Wall, id: usize, phase: RawPhase) {
        let raw = RawUpdate {
            phase: Some(phase),
            progress: None,
        };
        wall.host.manager.apply(id, raw, Instant::now());
    }

    /// Bring `id` to Idle on the wall (reset, then world loaded).
    fn make_idle(wall: &Wall, id: usize) {
        wall.host.manager.reset(id, Instant::now()).expect("test");
        set_phase(wall, id, RawPhase::World);
    }

    #[tokio::test]
    async fn setup_hides_locks_and_shows_wall() {
        let tmp = tempfile::tempdir().expect("test");
        let rec = Recorder::new();
        let (host, _rx) = host(&rec, tmp.path(), 2, binds());
        let mut wall = Wall::new(host, WallConfig::default()).expect("test");
        wall.setup().expect("test");

        let calls = rec.calls();
        assert_eq!(calls[0], Call::Visible("Wall".into(), "Lock 1".into(), false));
        assert_eq!(calls[1], Call::Visible("Wall".into(), "Lock 2".into(), false));
        assert_eq!(calls[2], Call::Scene("Wall".into()));
        assert_eq!(calls[3], Call::Focus(PROJECTOR));
        assert!(calls.contains(&Call::Grab("shift-r".into())));
        assert!(
            !calls.iter().any(|c| matches!(c, Call::Resume(_))),
            "no freezing configured"
        );
    }

    #[tokio::test]
    async fn missing_projector_fails_setup() {
        let tmp = tempfile::tempdir().expect("test");
        let rec = Recorder::new();
        let (host, _rx) = host(&rec, tmp.path(), 1, binds());
        let config = WallConfig {
            projector: "Nope".to_string(),
            ..WallConfig::default()
        };
        assert!(Wall::new(host, config).is_err());
    }

    #[tokio::test]
    async fn wall_actions_need_projector_focus() {
        let tmp = tempfile::tempdir().expect("test");
        let rec = Recorder::new();
        let (mut wall, _rx) = wall_with(&rec, tmp.path(), 4, WallConfig::default());
        wall.on_focus_change(Some(12345));
        wall.on_input(press(0));
        assert!(rec.calls().is_empty());

        wall.on_focus_change(Some(PROJECTOR));
        wall.on_input(press(0));
        let resets = rec
            .calls()
            .iter()
            .filter(|c| matches!(c, Call::KeyPress(Key::F6, _, _)))
            .count();
        assert_eq!(resets, 4);
    }

    #[tokio::test]
    async fn reset_all_skips_locked_and_generating() {
        let tmp = tempfile::tempdir().expect("test");
        let rec = Recorder::new();
        let (mut wall, _rx) = wall_with(&rec, tmp.path(), 4, WallConfig::default());
        wall.host.manager.reset(1, Instant::now()).expect("now generating");
        wall.toggle_lock(2);
        rec.take();

        wall.on_input(press(0));
        let mut reset: Vec<WindowHandle> = rec
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::KeyPress(_, w, _) => Some(w),
                _ => None,
            })
            .collect();
        reset.sort_unstable();
        assert_eq!(reset, vec![wid(0), wid(3)]);
    }

    #[tokio::test]
    async fn play_requires_idle_and_leaves_wall() {
        let tmp = tempfile::tempdir().expect("test");
        let rec = Recorder::new();
        let (mut wall, _rx) = wall_with(&rec, tmp.path(), 4, WallConfig::default());
        wall.host.manager.reset(0, Instant::now()).expect("test");
        rec.take();

        wall.on_input(press(4));
        assert!(rec.calls().is_empty(), "generating instance is not playable");
        assert_eq!(wall.current, None);

        set_phase(&wall, 0, RawPhase::World);
        rec.take();
        wall.on_input(press(4));
        let calls = rec.calls();
        assert_eq!(calls[0], Call::Scene("Instance 1".into()));
        assert!(calls.contains(&Call::Ungrab("shift-r".into())));
        let n = calls.len();
        assert_eq!(calls[n - 2], Call::KeyPress(Key::ESCAPE, wid(0), 1020));
        assert_eq!(calls[n - 1], Call::Focus(wid(0)));
        assert_eq!(wall.current, Some(0));
        assert_eq!(wall.host.manager.active(), Some(0));
    }

    #[tokio::test]
    async fn play_unstretches_and_repauses() {
        let tmp = tempfile::tempdir().expect("test");
        let rec = Recorder::new();
        let (mut wall, _rx) = wall_with(&rec, tmp.path(), 4, WallConfig::default());
        make_idle(&wall, 0);
        rec.take();

        assert!(wall.play(0));
        let calls: Vec<Call> = rec
            .take()
            .into_iter()
            .filter(|c| !matches!(c, Call::Ungrab(_)))
            .collect();
        let ts = crate::testutil::NOW + 20;
        assert_eq!(
            calls,
            vec![
                Call::Scene("Instance 1".into()),
                Call::KeyPress(Key::ESCAPE, wid(0), ts),
                Call::Move(wid(0), WallConfig::default().unstretch),
                Call::KeyPress(Key::ESCAPE, wid(0), ts),
                Call::KeyPress(Key::ESCAPE, wid(0), ts),
                Call::Focus(wid(0)),
            ]
        );
    }

    #[tokio::test]
    async fn playing_locked_instance_gets_active_cpus() {
        let tmp = tempfile::tempdir().expect("test");
        let rec = Recorder::new();
        let (mut host, _rx) = host(&rec, tmp.path(), 4, binds());
        let sets = AffinityConfig {
            idle: vec![0],
            low: vec![1],
            high: vec![2],
            active: vec![3],
        };
        let pids = host.manager.instances().iter().map(|i| i.pid).collect();
        let cancel = CancellationToken::new();
        let (handle, task) = crate::cpu::spawn(pids, sets, 50, rec.clone(), cancel.clone());
        host.affinity = Some(handle);
        let mut wall = Wall::new(host, WallConfig::default()).expect("test");
        wall.setup().expect("test");
        wall.on_focus_change(Some(PROJECTOR));

        make_idle(&wall, 0);
        wall.on_update(Update {
            id: 0,
            state: wall.host.manager.state(0).expect("test"),
        });
        wall.toggle_lock(0);
        assert!(wall.play(0));

        cancel.cancel();
        task.await.expect("join");
        let affinity: Vec<Call> = rec
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Affinity(p, _) if *p == pid(0)))
            .collect();
        assert_eq!(affinity.last(), Some(&Call::Affinity(pid(0), vec![3])));
    }

    #[tokio::test]
    async fn ingame_reset_returns_to_wall() {
        let tmp = tempfile::tempdir().expect("test");
        let rec = Recorder::new();
        let config = WallConfig {
            stretch_windows: true,
            ..WallConfig::default()
        };
        let (mut wall, _rx) = wall_with(&rec, tmp.path(), 4, config.clone());
        make_idle(&wall, 0);
        assert!(wall.play(0));
        rec.take();

        // Bind 1 maps to ingame_reset while playing.
        wall.on_input(press(1));
        let calls = rec.calls();
        assert_eq!(calls[0], Call::KeyPress(Key::F6, wid(0), 1020));
        assert_eq!(calls[1], Call::Move(wid(0), config.stretch));
        assert!(calls.contains(&Call::Scene("Wall".into())));
        assert!(calls.contains(&Call::Focus(PROJECTOR)));
        assert_eq!(wall.current, None);
        assert_eq!(wall.host.manager.active(), None);
    }

    #[tokio::test]
    async fn goto_locked_jumps_to_idle_locked_instance() {
        let tmp = tempfile::tempdir().expect("test");
        let rec = Recorder::new();
        let config = WallConfig {
            goto_locked: true,
            ..WallConfig::default()
        };
        let (mut wall, _rx) = wall_with(&rec, tmp.path(), 4, config);
        make_idle(&wall, 0);
        make_idle(&wall, 3);
        wall.toggle_lock(3);
        assert!(wall.play(0));

        wall.on_input(press(1));
        assert_eq!(wall.current, Some(3));
        assert!(!wall.locked[3], "playing clears the lock");
        assert!(rec.calls().contains(&Call::Visible("Wall".into(), "Lock 4".into(), false)));
    }

    #[tokio::test]
    async fn pointer_actions_use_grid_and_skip_same_cell_repeats() {
        let tmp = tempfile::tempdir().expect("test");
        let rec = Recorder::new();
        let (mut wall, _rx) = wall_with(&rec, tmp.path(), 4, WallConfig::default());

        wall.on_input(press_at(3, 2, false));
        wall.on_input(press_at(3, 2, true));
        assert_eq!(wall.locked, vec![false, false, true, false]);

        // Dragging onto another cell locks it too.
        wall.on_input(press_at(3, 3, true));
        assert_eq!(wall.locked, vec![false, false, true, true]);
        assert_eq!(
            rec.calls()
                .iter()
                .filter(|c| matches!(c, Call::Visible(..)))
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn locked_instances_are_not_reset() {
        let tmp = tempfile::tempdir().expect("test");
        let rec = Recorder::new();
        let (mut wall, _rx) = wall_with(&rec, tmp.path(), 4, WallConfig::default());
        wall.toggle_lock(1);
        rec.take();
        wall.on_input(press_at(1, 1, false));
        assert!(rec.calls().is_empty());
    }

    #[tokio::test]
    async fn reset_others_plays_then_resets_rest() {
        let tmp = tempfile::tempdir().expect("test");
        let rec = Recorder::new();
        let (mut wall, _rx) = wall_with(&rec, tmp.path(), 3, WallConfig::default());
        make_idle(&wall, 1);
        rec.take();

        wall.on_input(press(5));
        assert_eq!(wall.current, Some(1));
        let mut reset: Vec<WindowHandle> = rec
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::KeyPress(Key::F6, w, _) => Some(w),
                _ => None,
            })
            .collect();
        reset.sort_unstable();
        assert_eq!(reset, vec![wid(0), wid(2)]);
    }

    #[tokio::test]
    async fn admission_cap_freezes_newest_resets() {
        let tmp = tempfile::tempdir().expect("test");
        let rec = Recorder::new();
        let mut config = WallConfig::default();
        config.perf.concurrent_resets = 2;
        config.perf.force_freeze_delay_ms = 0;
        let (mut wall, mut rx) = wall_with(&rec, tmp.path(), 4, config);

        assert!(wall.reset_instance(0));
        assert!(wall.reset_instance(1));
        assert!(rx.try_recv().is_err(), "at the cap, nothing frozen");

        assert!(wall.reset_instance(2));
        assert!(wall.reset_instance(3));

        let mut events = Vec::new();
        for _ in 0..2 {
            let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("scheduled")
                .expect("open");
            events.push(event);
        }
        events.sort_by_key(|e| match e {
            FrontendEvent::ForceFreeze(id) | FrontendEvent::IdleFreeze(id) => *id,
        });
        assert_eq!(
            events,
            vec![FrontendEvent::ForceFreeze(2), FrontendEvent::ForceFreeze(3)]
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err(), "exactly two freezes");
    }

    #[tokio::test]
    async fn force_frozen_instances_thaw_in_order() {
        let tmp = tempfile::tempdir().expect("test");
        let rec = Recorder::new();
        let mut config = WallConfig::default();
        config.perf.concurrent_resets = 1;
        let (mut wall, _rx) = wall_with(&rec, tmp.path(), 4, config);
        for id in 0..3 {
            wall.host.manager.reset(id, Instant::now()).expect("test");
        }
        rec.take();
        wall.on_event(FrontendEvent::ForceFreeze(1));
        wall.on_event(FrontendEvent::ForceFreeze(2));
        assert_eq!(rec.take(), vec![Call::Suspend(pid(1)), Call::Suspend(pid(2))]);

        // Frozen instances refuse resets.
        assert!(!wall.reset_instance(1));

        set_phase(&wall, 0, RawPhase::World);
        rec.take();
        wall.on_update(Update {
            id: 0,
            state: wall.host.manager.state(0).expect("test"),
        });
        assert_eq!(rec.take(), vec![Call::Resume(pid(1))]);
        assert_eq!(wall.thaw_queue, VecDeque::from(vec![2]));
    }

    #[tokio::test]
    async fn thaw_queue_drains_when_a_reset_ends_without_loading() {
        let tmp = tempfile::tempdir().expect("test");
        let rec = Recorder::new();
        let mut config = WallConfig::default();
        config.perf.concurrent_resets = 1;
        let (mut wall, _rx) = wall_with(&rec, tmp.path(), 2, config);
        wall.host.manager.reset(0, Instant::now()).expect("test");
        wall.host.manager.reset(1, Instant::now()).expect("test");
        wall.on_event(FrontendEvent::ForceFreeze(1));
        rec.take();

        // Still one running reset: nothing resumes.
        wall.on_update(Update {
            id: 0,
            state: wall.host.manager.state(0).expect("test"),
        });
        assert!(rec.take().is_empty());

        set_phase(&wall, 0, RawPhase::Dirt);
        wall.on_update(Update {
            id: 0,
            state: wall.host.manager.state(0).expect("test"),
        });
        assert_eq!(rec.take(), vec![Call::Resume(pid(1))]);
        assert!(wall.thaw_queue.is_empty());
    }

    #[tokio::test]
    async fn force_freeze_skips_finished_instances() {
        let tmp = tempfile::tempdir().expect("test");
        let rec = Recorder::new();
        let (mut wall, _rx) = wall_with(&rec, tmp.path(), 2, WallConfig::default());
        make_idle(&wall, 1);
        rec.take();
        wall.on_event(FrontendEvent::ForceFreeze(1));
        assert!(rec.calls().is_empty());
    }

    #[tokio::test]
    async fn idle_freeze_and_resume_before_play() {
        let tmp = tempfile::tempdir().expect("test");
        let rec = Recorder::new();
        let mut config = WallConfig::default();
        config.perf.freeze_idle = true;
        config.perf.freeze_delay_ms = 0;
        let (mut wall, mut rx) = wall_with(&rec, tmp.path(), 2, config);

        make_idle(&wall, 1);
        wall.on_update(Update {
            id: 1,
            state: wall.host.manager.state(1).expect("test"),
        });
        let event = rx.recv().await.expect("scheduled");
        assert_eq!(event, FrontendEvent::IdleFreeze(1));
        rec.take();
        wall.on_event(event);
        assert_eq!(rec.take(), vec![Call::Suspend(pid(1))]);

        assert!(wall.play(1));
        let calls = rec.calls();
        assert_eq!(calls[0], Call::Resume(pid(1)), "resumed before any window call");
        assert!(calls.contains(&Call::Focus(wid(1))));
    }

    #[tokio::test]
    async fn rejected_reset_keeps_idle_freeze() {
        let tmp = tempfile::tempdir().expect("test");
        let rec = Recorder::new();
        let mut config = WallConfig::default();
        config.perf.freeze_idle = true;
        let (mut wall, _rx) = wall_with(&rec, tmp.path(), 2, config);
        make_idle(&wall, 0);
        make_idle(&wall, 1);
        wall.on_event(FrontendEvent::IdleFreeze(0));
        wall.on_event(FrontendEvent::IdleFreeze(1));
        set_phase(&wall, 1, RawPhase::Dirt);
        rec.take();

        assert!(!wall.reset_instance(1));
        assert!(rec.take().is_empty());
        assert!(wall.idle_frozen[1]);

        assert!(wall.reset_instance(0));
        let calls = rec.take();
        assert_eq!(calls[0], Call::Resume(pid(0)), "resumed before the reset key");
        assert_eq!(calls[1], Call::KeyPress(Key::F6, wid(0), crate::testutil::NOW + 20));
        assert!(!wall.idle_frozen[0]);
    }

    #[tokio::test]
    async fn teardown_resumes_everything() {
        let tmp = tempfile::tempdir().expect("test");
        let rec = Recorder::new();
        let mut config = WallConfig::default();
        config.perf.concurrent_resets = 1;
        let (mut wall, _rx) = wall_with(&rec, tmp.path(), 2, config);
        wall.host.manager.reset(0, Instant::now()).expect("test");
        wall.on_event(FrontendEvent::ForceFreeze(0));
        rec.take();

        wall.teardown();
        let calls = rec.calls();
        assert!(calls.contains(&Call::Resume(pid(0))));
        assert!(calls.contains(&Call::Ungrab("shift-r".into())));
        assert!(wall.describe().contains("1:-"));
    }
}
