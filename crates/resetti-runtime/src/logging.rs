//! Tracing subscriber setup.

use std::ffi::OsString;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

const LOG_FILE: &str = "resetti.log";

/// Install the global subscriber. Logs go to the cache log file unless
/// `to_stderr` is set or the file cannot be created.
pub fn init(to_stderr: bool) {
    let filter = std::env::var("RESETTI_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    let builder = tracing_subscriber::fmt().with_env_filter(EnvFilter::new(filter));

    let file = if to_stderr { None } else { open_log_file() };
    match file {
        Some((file, path)) => {
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
            tracing::debug!(path = %path.display(), "logging to file");
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
}

fn open_log_file() -> Option<(File, PathBuf)> {
    let path = cache_log_path(std::env::var_os("XDG_CACHE_HOME"), std::env::var_os("HOME"))?;
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).ok()?;
    }
    match File::create(&path) {
        Ok(file) => Some((file, path)),
        Err(e) => {
            eprintln!("resetti: cannot open log file {}: {e}", path.display());
            None
        }
    }
}

/// `$XDG_CACHE_HOME/resetti.log`, else `~/.cache/resetti.log`.
pub fn cache_log_path(xdg_cache: Option<OsString>, home: Option<OsString>) -> Option<PathBuf> {
    if let Some(dir) = xdg_cache.filter(|d| !d.is_empty()) {
        return Some(PathBuf::from(dir).join(LOG_FILE));
    }
    home.filter(|h| !h.is_empty())
        .map(|home| PathBuf::from(home).join(".cache").join(LOG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xdg_cache_takes_precedence() {
        let path = cache_log_path(Some("/xdg".into()), Some("/home/u".into()));
        assert_eq!(path, Some(PathBuf::from("/xdg/resetti.log")));
    }

    #[test]
    fn falls_back_to_home_cache() {
        let path = cache_log_path(Some("".into()), Some("/home/u".into()));
        assert_eq!(path, Some(PathBuf::from("/home/u/.cache/resetti.log")));
        assert_eq!(cache_log_path(None, None), None);
    }
}
