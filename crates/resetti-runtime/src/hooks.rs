//! User shell hooks run on wall and reset events.

use resetti_core::config::HooksConfig;
use tokio::process::Command;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Reset,
    WallPlay,
    WallReset,
    WallLock,
    WallUnlock,
}

#[derive(Debug, Clone, Default)]
pub struct Hooks {
    config: HooksConfig,
}

impl Hooks {
    pub fn new(config: HooksConfig) -> Self {
        Self { config }
    }

    fn command(&self, kind: HookKind) -> Option<&str> {
        let cmd = match kind {
            HookKind::Reset => &self.config.reset,
            HookKind::WallPlay => &self.config.wall_play,
            HookKind::WallReset => &self.config.wall_reset,
            HookKind::WallLock => &self.config.wall_lock,
            HookKind::WallUnlock => &self.config.wall_unlock,
        };
        cmd.as_deref().filter(|c| !c.trim().is_empty())
    }

    /// Start the hook for `kind` in the background, if one is configured.
    /// Failures are logged only.
    pub fn run(&self, kind: HookKind) -> Option<JoinHandle<()>> {
        let cmd = self.command(kind)?.to_string();
        Some(tokio::spawn(async move {
            match Command::new("sh").arg("-c").arg(&cmd).status().await {
                Ok(status) if status.success() => {
                    tracing::debug!(hook = ?kind, "hook finished");
                }
                Ok(status) => {
                    tracing::warn!(hook = ?kind, command = %cmd, %status, "hook failed");
                }
                Err(e) => {
                    tracing::warn!(hook = ?kind, command = %cmd, error = %e, "failed to start hook");
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn configured_hook_runs() {
        let tmp = tempfile::tempdir().expect("test");
        let marker = tmp.path().join("played");
        let hooks = Hooks::new(HooksConfig {
            wall_play: Some(format!("touch '{}'", marker.display())),
            ..HooksConfig::default()
        });

        hooks.run(HookKind::WallPlay).expect("configured").await.expect("join");
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn unset_and_blank_hooks_are_skipped() {
        let hooks = Hooks::new(HooksConfig {
            reset: Some("  ".to_string()),
            ..HooksConfig::default()
        });
        assert!(hooks.run(HookKind::Reset).is_none());
        assert!(hooks.run(HookKind::WallLock).is_none());
    }

    #[tokio::test]
    async fn failing_hook_does_not_panic() {
        let hooks = Hooks::new(HooksConfig {
            wall_unlock: Some("exit 3".to_string()),
            ..HooksConfig::default()
        });
        hooks.run(HookKind::WallUnlock).expect("configured").await.expect("join");
    }
}
