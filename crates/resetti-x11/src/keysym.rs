//! Keycode to keysym-name mapping for `xdotool`, which only accepts
//! keysym names.

use resetti_core::Key;

use crate::error::X11Error;

/// Keysym names that differ from the lowercase key name.
const SPECIAL: &[(&str, &str)] = &[
    ("escape", "Escape"),
    ("return", "Return"),
    ("tab", "Tab"),
    ("backspace", "BackSpace"),
    ("ctrl", "Control_L"),
    ("shift", "Shift_L"),
    ("alt", "Alt_L"),
    ("super", "Super_L"),
];

pub fn keysym_name(key: Key) -> Result<String, X11Error> {
    let name = key.to_string();
    if name.starts_with("code") {
        return Err(X11Error::NoKeysym(name));
    }
    if let Some((_, sym)) = SPECIAL.iter().find(|(n, _)| *n == name) {
        return Ok((*sym).to_string());
    }
    // Function keys are `F1`..`F12`; letters, digits and punctuation names
    // are already valid lowercase keysyms.
    if let Some(num) = name.strip_prefix('f').filter(|n| n.parse::<u8>().is_ok()) {
        return Ok(format!("F{num}"));
    }
    Ok(name)
}
