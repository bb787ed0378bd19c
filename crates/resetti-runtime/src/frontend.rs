//! Frontend capability interface.
//!
//! The controller drives exactly one frontend, chosen at startup: the wall
//! or the multi-instance cycler. Frontends are synchronous; anything that
//! must happen later is scheduled as a [`FrontendEvent`] and delivered back
//! through the controller loop.

use std::sync::Arc;
use std::time::Duration;

use resetti_core::{Input, Keybind, ProcessControl, SceneBackend, Update, WindowBackend, WindowHandle};
use tokio::sync::mpsc;

use crate::counter::CounterHandle;
use crate::cpu::AffinityHandle;
use crate::hooks::Hooks;
use crate::manager::Manager;

/// Deferred work a frontend scheduled for itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontendEvent {
    /// Admission control: suspend an instance that overflowed the cap.
    ForceFreeze(usize),
    /// Suspend an instance that has been idle on the wall.
    IdleFreeze(usize),
}

pub trait Frontend: Send {
    fn setup(&mut self) -> anyhow::Result<()>;
    fn on_focus_change(&mut self, window: Option<WindowHandle>);
    fn on_input(&mut self, input: Input);
    fn on_update(&mut self, update: Update);
    fn on_event(&mut self, event: FrontendEvent);
    /// Release grabs and resume suspended instances.
    fn teardown(&mut self);
    /// One-line summary for the debug dump.
    fn describe(&self) -> String;
}

/// Collaborators shared by both frontends.
pub struct Host {
    pub manager: Arc<Manager>,
    pub window: Arc<dyn WindowBackend>,
    pub scenes: Option<Arc<dyn SceneBackend>>,
    pub process: Arc<dyn ProcessControl>,
    pub counter: CounterHandle,
    pub hooks: Hooks,
    pub affinity: Option<AffinityHandle>,
    pub events: mpsc::Sender<FrontendEvent>,
    pub keybinds: Vec<Keybind>,
    /// Press Escape after focusing an instance.
    pub unpause_focus: bool,
}

impl Host {
    pub fn set_scene(&self, scene: &str) {
        let Some(scenes) = &self.scenes else {
            return;
        };
        if let Err(e) = scenes.set_scene(scene) {
            tracing::warn!(scene, error = %e, "failed to switch scene");
        }
    }

    pub fn set_item_visible(&self, scene: &str, item: &str, visible: bool) {
        let Some(scenes) = &self.scenes else {
            return;
        };
        if let Err(e) = scenes.set_scene_item_visible(scene, item, visible) {
            tracing::warn!(scene, item, error = %e, "failed to toggle scene item");
        }
    }

    /// Deliver `event` back to the frontend after `delay`.
    pub fn schedule(&self, delay: Duration, event: FrontendEvent) {
        let tx = self.events.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            // The controller is gone during shutdown; nothing left to do.
            let _ = tx.send(event).await;
        });
    }
}

pub fn instance_scene(id: usize) -> String {
    format!("Instance {}", id + 1)
}
