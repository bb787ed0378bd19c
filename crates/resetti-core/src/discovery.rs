//! Instance discovery helpers that do not touch the system.
//!
//! Window enumeration and `/proc` lookups live in `resetti-x11`; this module
//! parses what it reads and enforces the dense-id invariant.

use crate::error::DiscoveryError;
use crate::types::{InstanceInfo, Key};

/// Oldest supported minor version (1.14).
pub const MIN_VERSION: u32 = 14;

pub const RESET_KEY_OPTION: &str = "key_Create New World";
pub const PREVIEW_KEY_OPTION: &str = "key_Leave Preview";

/// Sort instances by id and require ids to be exactly `0..N`.
pub fn validate_instances(
    mut instances: Vec<InstanceInfo>,
) -> Result<Vec<InstanceInfo>, DiscoveryError> {
    if instances.is_empty() {
        return Err(DiscoveryError::NoInstances);
    }
    instances.sort_by_key(|i| i.id);
    if instances[0].id != 0 {
        return Err(DiscoveryError::NoInstanceZero);
    }
    for (expected, inst) in instances.iter().enumerate() {
        if inst.id != expected {
            return Err(DiscoveryError::NonSequential {
                expected,
                found: inst.id,
            });
        }
    }
    Ok(instances)
}

/// Parse the contents of an `instance_num` file.
pub fn parse_instance_num(text: &str) -> Option<usize> {
    text.trim().parse().ok()
}

/// Minor version from a window class or title such as `Minecraft* 1.16.1`.
pub fn parse_version(class: &str) -> Option<u32> {
    let release = class.split_whitespace().nth(1)?;
    let minor = release.split('.').nth(1)?;
    minor.parse().ok()
}

pub fn is_supported_version(version: u32) -> bool {
    version >= MIN_VERSION
}

/// Look up the key bound to `option` in an `options.txt` file.
///
/// Returns `Ok(None)` when the option is absent or unbound, so the caller
/// can fall back to the mod default.
pub fn parse_option_key(options: &str, option: &str) -> Result<Option<Key>, DiscoveryError> {
    let Some(line) = options.lines().find(|l| l.contains(option)) else {
        return Ok(None);
    };
    let Some((_, value)) = line.rsplit_once(':') else {
        return Ok(None);
    };
    let name = value.trim().rsplit('.').next().unwrap_or_default();
    if name.is_empty() || name == "unknown" {
        return Ok(None);
    }
    Key::from_name(name)
        .map(Some)
        .ok_or_else(|| DiscoveryError::UnknownOptionKey {
            option: option.to_string(),
            value: value.trim().to_string(),
        })
}
