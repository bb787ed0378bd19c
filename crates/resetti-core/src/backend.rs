use crate::bind::{Bind, Keymap, PointerState};
use crate::config::Rect;
use crate::error::BackendError;
use crate::types::{Key, WindowHandle};

/// Window primitives: focus, geometry, synthetic input, device queries.
///
/// Defined here (pure, no async) as a synchronous trait. Implementations
/// live in the backend crates; tests use recording fakes.
pub trait WindowBackend: Send + Sync {
    fn focus_window(&self, wid: WindowHandle) -> Result<(), BackendError>;
    fn move_window(&self, wid: WindowHandle, rect: Rect) -> Result<(), BackendError>;

    /// `timestamp` is an X server time in milliseconds and must never go
    /// backwards for a given window.
    fn send_key_down(&self, key: Key, wid: WindowHandle, timestamp: u32) -> Result<(), BackendError>;
    fn send_key_press(&self, key: Key, wid: WindowHandle, timestamp: u32) -> Result<(), BackendError>;
    fn send_key_up(&self, key: Key, wid: WindowHandle, timestamp: u32) -> Result<(), BackendError>;

    fn query_keymap(&self) -> Result<Keymap, BackendError>;
    fn query_pointer(&self) -> Result<PointerState, BackendError>;

    /// Reserve a chord on the root window so it is not delivered to the
    /// focused client.
    fn grab_key(&self, bind: &Bind) -> Result<(), BackendError>;
    fn ungrab_key(&self, bind: &Bind) -> Result<(), BackendError>;

    /// Current server time, used as the base for synthetic input.
    fn current_time(&self) -> u32;
    fn active_window(&self) -> Result<Option<WindowHandle>, BackendError>;
    fn find_window(&self, name: &str) -> Result<WindowHandle, BackendError>;
    fn screen_size(&self) -> Result<(u32, u32), BackendError>;
}

/// Broadcast scene control.
///
/// Calls must not block on the network; implementations queue requests and
/// report failures through their own channel.
pub trait SceneBackend: Send + Sync {
    fn set_scene(&self, scene: &str) -> Result<(), BackendError>;
    fn set_scene_item_visible(
        &self,
        scene: &str,
        item: &str,
        visible: bool,
    ) -> Result<(), BackendError>;
}

/// Signal and scheduler control over instance processes.
pub trait ProcessControl: Send + Sync {
    fn suspend(&self, pid: u32) -> Result<(), BackendError>;
    fn resume(&self, pid: u32) -> Result<(), BackendError>;
    fn set_affinity(&self, pid: u32, cpus: &[usize]) -> Result<(), BackendError>;
}
