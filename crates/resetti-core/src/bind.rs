//! Keybind parsing and input resolution.
//!
//! A [`Bind`] is a chord of keys and pointer buttons. Each poll tick the
//! resolver picks at most one fully-held bind: most keys wins, then most
//! buttons, then the bind declared first.

use std::fmt;
use std::str::FromStr;

use crate::error::BindError;
use crate::types::Key;

/// Highest pointer button number accepted in binds.
pub const MAX_BUTTON: u8 = 5;

// ─── Device state ─────────────────────────────────────────────────

/// Keyboard state as a 256-bit keycode bitmask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Keymap(pub [u8; 32]);

impl Keymap {
    pub fn from_keys(keys: impl IntoIterator<Item = Key>) -> Self {
        let mut map = Self::default();
        for key in keys {
            map.press(key);
        }
        map
    }

    pub fn press(&mut self, key: Key) {
        let code = key.code() as usize;
        self.0[code / 8] |= 1 << (code % 8);
    }

    pub fn is_pressed(&self, key: Key) -> bool {
        let code = key.code() as usize;
        self.0[code / 8] & (1 << (code % 8)) != 0
    }
}

/// Pointer position (root coordinates) and held buttons.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PointerState {
    pub x: i32,
    pub y: i32,
    /// Bit `n - 1` set while button `n` is held.
    pub buttons: u8,
}

impl PointerState {
    pub fn is_held(&self, button: u8) -> bool {
        (1..=MAX_BUTTON).contains(&button) && self.buttons & (1 << (button - 1)) != 0
    }
}

// ─── Bind ─────────────────────────────────────────────────────────

/// A key/button chord, e.g. `Shift-F` or `Ctrl-Button1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bind {
    pub keys: Vec<Key>,
    pub buttons: Vec<u8>,
}

impl Bind {
    pub fn is_held(&self, keymap: &Keymap, pointer: &PointerState) -> bool {
        self.keys.iter().all(|k| keymap.is_pressed(*k))
            && self.buttons.iter().all(|b| pointer.is_held(*b))
    }
}

impl FromStr for Bind {
    type Err = BindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut keys = Vec::new();
        let mut buttons = Vec::new();
        for part in s.split('-').map(str::trim).filter(|p| !p.is_empty()) {
            let lower = part.to_ascii_lowercase();
            if let Some(num) = lower.strip_prefix("button") {
                let button = num
                    .parse::<u8>()
                    .ok()
                    .filter(|b| (1..=MAX_BUTTON).contains(b))
                    .ok_or_else(|| BindError::UnknownButton(part.to_string()))?;
                if !buttons.contains(&button) {
                    buttons.push(button);
                }
            } else {
                let key: Key = part.parse()?;
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        if keys.is_empty() && buttons.is_empty() {
            return Err(BindError::Empty);
        }
        Ok(Self { keys, buttons })
    }
}

impl fmt::Display for Bind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .keys
            .iter()
            .map(Key::to_string)
            .chain(self.buttons.iter().map(|b| format!("button{b}")))
            .collect();
        f.write_str(&parts.join("-"))
    }
}

// ─── Resolution ───────────────────────────────────────────────────

/// Index of the bind that wins among those currently held.
pub fn resolve_bind(binds: &[Bind], keymap: &Keymap, pointer: &PointerState) -> Option<usize> {
    let mut best: Option<(usize, &Bind)> = None;
    for (idx, bind) in binds.iter().enumerate() {
        if !bind.is_held(keymap, pointer) {
            continue;
        }
        let better = match best {
            None => true,
            Some((_, cur)) => {
                (bind.keys.len(), bind.buttons.len()) > (cur.keys.len(), cur.buttons.len())
            }
        };
        if better {
            best = Some((idx, bind));
        }
    }
    best.map(|(idx, _)| idx)
}

/// One resolved input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Input {
    /// Index into the profile's keybind list.
    pub bind: usize,
    /// The same bind also won on the previous tick.
    pub repeat: bool,
    pub x: i32,
    pub y: i32,
}

/// Tick-to-tick resolver that tracks repeats.
#[derive(Debug, Clone)]
pub struct InputResolver {
    binds: Vec<Bind>,
    last: Option<usize>,
}

impl InputResolver {
    pub fn new(binds: Vec<Bind>) -> Self {
        Self { binds, last: None }
    }

    pub fn tick(&mut self, keymap: &Keymap, pointer: &PointerState) -> Option<Input> {
        let winner = resolve_bind(&self.binds, keymap, pointer);
        let repeat = winner.is_some() && winner == self.last;
        self.last = winner;
        winner.map(|bind| Input {
            bind,
            repeat,
            x: pointer.x,
            y: pointer.y,
        })
    }
}
