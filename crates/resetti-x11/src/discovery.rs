//! Find running game instances.
//!
//! Windows whose class matches `Minecraft` are resolved to a process, the
//! process to its game directory, and the directory to an instance id and
//! key bindings. Windows that cannot be resolved are skipped, as in a
//! launcher that is still starting an instance.

use std::path::{Path, PathBuf};

use resetti_core::discovery::{
    self, PREVIEW_KEY_OPTION, RESET_KEY_OPTION, is_supported_version, parse_instance_num,
    parse_option_key, parse_version,
};
use resetti_core::{DiscoveryError, InstanceInfo, Key, WindowHandle};

use crate::error::X11Error;
use crate::executor::CommandRunner;

const WINDOW_CLASS: &str = "Minecraft";

/// Failure that aborts discovery (as opposed to skipping one window).
#[derive(Debug, thiserror::Error)]
pub enum FindError {
    #[error(transparent)]
    X11(#[from] X11Error),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

/// Discover instances using `/proc` for process working directories.
pub fn find_instances(runner: &impl CommandRunner) -> Result<Vec<InstanceInfo>, FindError> {
    find_instances_in(runner, Path::new("/proc"))
}

/// Discover instances resolving working directories under `proc_root`.
pub fn find_instances_in(
    runner: &impl CommandRunner,
    proc_root: &Path,
) -> Result<Vec<InstanceInfo>, FindError> {
    let out = match runner.run("xdotool", &["search", "--class", WINDOW_CLASS]) {
        Ok(out) => out,
        // xdotool search exits 1 when nothing matches.
        Err(X11Error::CommandFailed { .. }) => String::new(),
        Err(e) => return Err(e.into()),
    };
    let mut instances = Vec::new();
    for wid in out.lines().filter_map(|l| l.trim().parse::<WindowHandle>().ok()) {
        match probe_window(runner, proc_root, wid) {
            Ok(Some(info)) => {
                tracing::info!(instance = info.id, pid = info.pid, wid, dir = %info.dir.display(), "found instance");
                instances.push(info);
            }
            Ok(None) => {}
            Err(ProbeError::Fatal(e)) => return Err(e.into()),
            Err(ProbeError::Skip(reason)) => {
                tracing::debug!(wid, reason = %reason, "skipping window");
            }
        }
    }
    Ok(discovery::validate_instances(instances)?)
}

enum ProbeError {
    /// The window is not a usable instance.
    Skip(String),
    /// The instance is misconfigured; discovery must fail.
    Fatal(DiscoveryError),
}

impl From<X11Error> for ProbeError {
    fn from(e: X11Error) -> Self {
        ProbeError::Skip(e.to_string())
    }
}

fn probe_window(
    runner: &impl CommandRunner,
    proc_root: &Path,
    wid: WindowHandle,
) -> Result<Option<InstanceInfo>, ProbeError> {
    let wid_arg = wid.to_string();
    let title = runner.run("xdotool", &["getwindowname", &wid_arg])?;
    let Some(version) = parse_version(title.trim()) else {
        return Err(ProbeError::Skip(format!("no version in title {:?}", title.trim())));
    };
    if !is_supported_version(version) {
        tracing::warn!(wid, version, "unsupported game version");
        return Ok(None);
    }

    let pid_out = runner.run("xdotool", &["getwindowpid", &wid_arg])?;
    let pid: u32 = pid_out
        .trim()
        .parse()
        .map_err(|_| ProbeError::Skip(format!("bad pid {:?}", pid_out.trim())))?;

    let dir = game_dir(proc_root, pid).map_err(|e| ProbeError::Skip(format!("cwd of {pid}: {e}")))?;
    let id = std::fs::read_to_string(dir.join("instance_num"))
        .ok()
        .as_deref()
        .and_then(parse_instance_num)
        .ok_or_else(|| ProbeError::Skip("no readable instance_num".to_string()))?;

    let options = std::fs::read_to_string(dir.join("options.txt")).unwrap_or_default();
    let reset_key = parse_option_key(&options, RESET_KEY_OPTION)
        .map_err(ProbeError::Fatal)?
        .unwrap_or(Key::F6);
    let preview_key = parse_option_key(&options, PREVIEW_KEY_OPTION)
        .map_err(ProbeError::Fatal)?
        .unwrap_or(Key::H);

    Ok(Some(InstanceInfo {
        id,
        pid,
        wid,
        dir,
        version,
        reset_key,
        preview_key,
    }))
}

fn game_dir(proc_root: &Path, pid: u32) -> std::io::Result<PathBuf> {
    std::fs::read_link(proc_root.join(pid.to_string()).join("cwd"))
}
