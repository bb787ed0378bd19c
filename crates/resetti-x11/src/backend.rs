//! `WindowBackend` implementation over `xdotool` and `xinput`.

use std::time::Instant;

use resetti_core::config::Rect;
use resetti_core::{BackendError, Bind, Key, Keymap, PointerState, WindowBackend, WindowHandle};

use crate::error::X11Error;
use crate::executor::CommandRunner;
use crate::keysym::keysym_name;

const XDOTOOL: &str = "xdotool";
const XINPUT: &str = "xinput";

/// Default master devices queried for keyboard and pointer state.
pub const DEFAULT_KEYBOARD: &str = "Virtual core keyboard";
pub const DEFAULT_POINTER: &str = "Virtual core pointer";

pub struct XdoBackend<R: CommandRunner> {
    runner: R,
    keyboard: String,
    pointer: String,
    epoch: Instant,
}

impl<R: CommandRunner> XdoBackend<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            keyboard: DEFAULT_KEYBOARD.to_string(),
            pointer: DEFAULT_POINTER.to_string(),
            epoch: Instant::now(),
        }
    }

    #[must_use]
    pub fn with_devices(mut self, keyboard: impl Into<String>, pointer: impl Into<String>) -> Self {
        self.keyboard = keyboard.into();
        self.pointer = pointer.into();
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    fn xdotool(&self, args: &[&str]) -> Result<String, X11Error> {
        self.runner.run(XDOTOOL, args)
    }

    fn send_key(&self, verb: &str, key: Key, wid: WindowHandle) -> Result<(), BackendError> {
        let sym = keysym_name(key)?;
        let wid = wid.to_string();
        self.xdotool(&[verb, "--window", &wid, &sym])?;
        Ok(())
    }

    fn query_state(&self, device: &str) -> Result<String, X11Error> {
        self.runner.run(XINPUT, &["query-state", device])
    }
}

impl<R: CommandRunner> WindowBackend for XdoBackend<R> {
    fn focus_window(&self, wid: WindowHandle) -> Result<(), BackendError> {
        self.xdotool(&["windowactivate", &wid.to_string()])?;
        Ok(())
    }

    fn move_window(&self, wid: WindowHandle, rect: Rect) -> Result<(), BackendError> {
        let wid = wid.to_string();
        self.xdotool(&[
            "windowmove",
            &wid,
            &rect.x.to_string(),
            &rect.y.to_string(),
            "windowsize",
            &wid,
            &rect.w.to_string(),
            &rect.h.to_string(),
        ])?;
        Ok(())
    }

    // xdotool stamps events itself; the timestamp only orders our calls.
    fn send_key_down(&self, key: Key, wid: WindowHandle, _timestamp: u32) -> Result<(), BackendError> {
        self.send_key("keydown", key, wid)
    }

    fn send_key_press(&self, key: Key, wid: WindowHandle, _timestamp: u32) -> Result<(), BackendError> {
        self.send_key("key", key, wid)
    }

    fn send_key_up(&self, key: Key, wid: WindowHandle, _timestamp: u32) -> Result<(), BackendError> {
        self.send_key("keyup", key, wid)
    }

    fn query_keymap(&self) -> Result<Keymap, BackendError> {
        let out = self.query_state(&self.keyboard)?;
        let mut map = Keymap::default();
        for code in parse_down(&out, "key") {
            if let Ok(code) = u8::try_from(code) {
                map.press(Key(code));
            }
        }
        Ok(map)
    }

    fn query_pointer(&self) -> Result<PointerState, BackendError> {
        let loc = self.xdotool(&["getmouselocation", "--shell"])?;
        let (x, y) = parse_mouse_location(&loc).ok_or_else(|| X11Error::ParseError {
            program: XDOTOOL.to_string(),
            output: loc.clone(),
        })?;
        let state = self.query_state(&self.pointer)?;
        let buttons = parse_down(&state, "button")
            .filter(|b| (1..=8).contains(b))
            .fold(0u8, |mask, b| mask | 1 << (b - 1));
        Ok(PointerState { x, y, buttons })
    }

    fn grab_key(&self, bind: &Bind) -> Result<(), BackendError> {
        // xdotool cannot grab; wall chords are read by polling instead.
        tracing::debug!(bind = %bind, "grab_key is a no-op on the xdotool backend");
        Ok(())
    }

    fn ungrab_key(&self, bind: &Bind) -> Result<(), BackendError> {
        tracing::debug!(bind = %bind, "ungrab_key is a no-op on the xdotool backend");
        Ok(())
    }

    fn current_time(&self) -> u32 {
        u32::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u32::MAX)
    }

    fn active_window(&self) -> Result<Option<WindowHandle>, BackendError> {
        // xdotool exits non-zero when no window has focus.
        match self.xdotool(&["getactivewindow"]) {
            Ok(out) => Ok(out.trim().parse().ok()),
            Err(X11Error::CommandFailed { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn find_window(&self, name: &str) -> Result<WindowHandle, BackendError> {
        let out = self
            .xdotool(&["search", "--name", name])
            .map_err(|_| BackendError::WindowNotFound(name.to_string()))?;
        out.lines()
            .find_map(|l| l.trim().parse().ok())
            .ok_or_else(|| BackendError::WindowNotFound(name.to_string()))
    }

    fn screen_size(&self) -> Result<(u32, u32), BackendError> {
        let out = self.xdotool(&["getdisplaygeometry"])?;
        let mut parts = out.split_whitespace().map(str::parse::<u32>);
        match (parts.next(), parts.next()) {
            (Some(Ok(w)), Some(Ok(h))) => Ok((w, h)),
            _ => Err(X11Error::ParseError {
                program: XDOTOOL.to_string(),
                output: out,
            }
            .into()),
        }
    }
}

/// Indices reported as `down` by `xinput query-state`, e.g. `key[24]=down`.
fn parse_down<'a>(output: &'a str, class: &'a str) -> impl Iterator<Item = u32> + 'a {
    output.lines().filter_map(move |line| {
        let rest = line.trim().strip_prefix(class)?.strip_prefix('[')?;
        let (idx, state) = rest.split_once("]=")?;
        (state == "down").then(|| idx.parse().ok()).flatten()
    })
}

/// `X=` and `Y=` from `xdotool getmouselocation --shell`.
fn parse_mouse_location(output: &str) -> Option<(i32, i32)> {
    let mut x = None;
    let mut y = None;
    for line in output.lines() {
        if let Some(v) = line.trim().strip_prefix("X=") {
            x = v.parse().ok();
        } else if let Some(v) = line.trim().strip_prefix("Y=") {
            y = v.parse().ok();
        }
    }
    Some((x?, y?))
}
