//! Recording fakes shared by the runtime tests.

use std::path::Path;
use std::sync::{Arc, Mutex};

use resetti_core::config::Rect;
use resetti_core::{
    BackendError, Bind, InstanceInfo, Key, Keymap, PointerState, ProcessControl, SceneBackend,
    WindowBackend, WindowHandle,
};

pub const PROJECTOR: WindowHandle = 999;
pub const SCREEN: (u32, u32) = (1920, 1080);
pub const NOW: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Focus(WindowHandle),
    Move(WindowHandle, Rect),
    KeyDown(Key, WindowHandle, u32),
    KeyPress(Key, WindowHandle, u32),
    KeyUp(Key, WindowHandle, u32),
    Grab(String),
    Ungrab(String),
    Scene(String),
    Visible(String, String, bool),
    Suspend(u32),
    Resume(u32),
    Affinity(u32, Vec<usize>),
}

/// One fake for window, scene and process control, so tests can assert
/// ordering across collaborators.
#[derive(Default)]
pub struct Recorder {
    calls: Mutex<Vec<Call>>,
    keymap: Mutex<Keymap>,
    pointer: Mutex<PointerState>,
    active: Mutex<Option<WindowHandle>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("test").clone()
    }

    pub fn take(&self) -> Vec<Call> {
        std::mem::take(&mut *self.calls.lock().expect("test"))
    }

    pub fn hold(&self, keymap: Keymap, pointer: PointerState) {
        *self.keymap.lock().expect("test") = keymap;
        *self.pointer.lock().expect("test") = pointer;
    }

    pub fn set_active(&self, wid: Option<WindowHandle>) {
        *self.active.lock().expect("test") = wid;
    }

    fn push(&self, call: Call) -> Result<(), BackendError> {
        self.calls.lock().expect("test").push(call);
        Ok(())
    }
}

impl WindowBackend for Recorder {
    fn focus_window(&self, wid: WindowHandle) -> Result<(), BackendError> {
        self.push(Call::Focus(wid))
    }

    fn move_window(&self, wid: WindowHandle, rect: Rect) -> Result<(), BackendError> {
        self.push(Call::Move(wid, rect))
    }

    fn send_key_down(&self, key: Key, wid: WindowHandle, ts: u32) -> Result<(), BackendError> {
        self.push(Call::KeyDown(key, wid, ts))
    }

    fn send_key_press(&self, key: Key, wid: WindowHandle, ts: u32) -> Result<(), BackendError> {
        self.push(Call::KeyPress(key, wid, ts))
    }

    fn send_key_up(&self, key: Key, wid: WindowHandle, ts: u32) -> Result<(), BackendError> {
        self.push(Call::KeyUp(key, wid, ts))
    }

    fn query_keymap(&self) -> Result<Keymap, BackendError> {
        Ok(*self.keymap.lock().expect("test"))
    }

    fn query_pointer(&self) -> Result<PointerState, BackendError> {
        Ok(*self.pointer.lock().expect("test"))
    }

    fn grab_key(&self, bind: &Bind) -> Result<(), BackendError> {
        self.push(Call::Grab(bind.to_string()))
    }

    fn ungrab_key(&self, bind: &Bind) -> Result<(), BackendError> {
        self.push(Call::Ungrab(bind.to_string()))
    }

    fn current_time(&self) -> u32 {
        NOW
    }

    fn active_window(&self) -> Result<Option<WindowHandle>, BackendError> {
        Ok(*self.active.lock().expect("test"))
    }

    fn find_window(&self, name: &str) -> Result<WindowHandle, BackendError> {
        match name {
            "Projector" => Ok(PROJECTOR),
            _ => Err(BackendError::WindowNotFound(name.to_string())),
        }
    }

    fn screen_size(&self) -> Result<(u32, u32), BackendError> {
        Ok(SCREEN)
    }
}

impl SceneBackend for Recorder {
    fn set_scene(&self, scene: &str) -> Result<(), BackendError> {
        self.push(Call::Scene(scene.to_string()))
    }

    fn set_scene_item_visible(
        &self,
        scene: &str,
        item: &str,
        visible: bool,
    ) -> Result<(), BackendError> {
        self.push(Call::Visible(scene.to_string(), item.to_string(), visible))
    }
}

impl ProcessControl for Recorder {
    fn suspend(&self, pid: u32) -> Result<(), BackendError> {
        self.push(Call::Suspend(pid))
    }

    fn resume(&self, pid: u32) -> Result<(), BackendError> {
        self.push(Call::Resume(pid))
    }

    fn set_affinity(&self, pid: u32, cpus: &[usize]) -> Result<(), BackendError> {
        self.push(Call::Affinity(pid, cpus.to_vec()))
    }
}

pub fn wid(id: usize) -> WindowHandle {
    100 + id as WindowHandle
}

pub fn pid(id: usize) -> u32 {
    5000 + id as u32
}

/// `count` instances with game directories (and empty logs) under `root`.
pub fn instances(root: &Path, count: usize) -> Vec<InstanceInfo> {
    (0..count)
        .map(|id| {
            let dir = root.join(format!("mc{id}"));
            std::fs::create_dir_all(dir.join("logs")).expect("test");
            std::fs::write(dir.join("logs").join("latest.log"), "").expect("test");
            InstanceInfo {
                id,
                pid: pid(id),
                wid: wid(id),
                dir,
                version: 16,
                reset_key: Key::F6,
                preview_key: Key::H,
            }
        })
        .collect()
}
