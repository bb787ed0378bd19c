//! Multi-instance frontend: one instance is played at a time and a reset
//! moves on to the next one.

use std::time::Instant;

use anyhow::Context;
use resetti_core::{Action, Input, Update, WindowHandle};

use crate::frontend::{Frontend, FrontendEvent, Host, instance_scene};
use crate::hooks::HookKind;

pub struct Multi {
    host: Host,
    current: usize,
}

impl Multi {
    pub fn new(host: Host) -> Self {
        Self { host, current: 0 }
    }

    fn count(&self) -> usize {
        self.host.manager.len()
    }

    fn switch_to(&mut self, id: usize) {
        self.current = id;
        if let Err(e) = self.host.manager.play(id, self.host.unpause_focus, None) {
            tracing::warn!(instance = id, error = %e, "failed to play instance");
        }
        self.host.set_scene(&instance_scene(id));
    }

    fn reset(&mut self) {
        let id = self.current;
        if let Err(reason) = self.host.manager.reset(id, Instant::now()) {
            tracing::debug!(instance = id, ?reason, "reset rejected");
            return;
        }
        self.host.counter.increment();
        self.host.hooks.run(HookKind::Reset);
        let next = (id + 1) % self.count();
        self.switch_to(next);
        tracing::debug!(from = id, to = next, "switched instance");
    }
}

impl Frontend for Multi {
    fn setup(&mut self) -> anyhow::Result<()> {
        anyhow::ensure!(self.count() > 0, "no instances to play");
        self.host.manager.set_active(0);
        self.host
            .manager
            .focus(0)
            .context("(init) focus instance 1")?;
        self.host.set_scene(&instance_scene(0));
        tracing::info!(instances = self.count(), "multi ready");
        Ok(())
    }

    fn on_focus_change(&mut self, window: Option<WindowHandle>) {
        let Some(window) = window else {
            return;
        };
        let Some(inst) = self.host.manager.instances().iter().find(|i| i.wid == window) else {
            return;
        };
        let id = inst.id;
        if id == self.current {
            return;
        }
        self.current = id;
        self.host.manager.set_active(id);
        self.host.set_scene(&instance_scene(id));
        tracing::debug!(instance = id, "focused instance adopted");
    }

    fn on_input(&mut self, input: Input) {
        if input.repeat {
            return;
        }
        let Some(keybind) = self.host.keybinds.get(input.bind) else {
            return;
        };
        let actions = keybind.actions.get(false).to_vec();
        for action in actions {
            match action {
                Action::IngameReset => self.reset(),
                Action::IngameFocus => {
                    if let Err(e) = self.host.manager.focus(self.current) {
                        tracing::warn!(instance = self.current, error = %e, "failed to focus instance");
                    }
                }
                _ => {}
            }
        }
    }

    fn on_update(&mut self, _update: Update) {}

    fn on_event(&mut self, _event: FrontendEvent) {}

    fn teardown(&mut self) {}

    fn describe(&self) -> String {
        format!("multi current={}", self.current + 1)
    }
}
