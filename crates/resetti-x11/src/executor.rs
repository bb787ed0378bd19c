//! CommandRunner trait and SubprocessRunner (sync subprocess wrapper).

use crate::error::X11Error;

/// Runs an external X11 utility. Enables mock injection for testing.
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[&str]) -> Result<String, X11Error>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, program: &str, args: &[&str]) -> Result<String, X11Error> {
        (**self).run(program, args)
    }
}

/// Real runner using `std::process::Command`.
#[derive(Debug, Default)]
pub struct SubprocessRunner {
    display: Option<String>,
}

impl SubprocessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Target a specific display instead of inheriting `$DISPLAY`.
    #[must_use]
    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }
}

impl CommandRunner for SubprocessRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<String, X11Error> {
        let mut cmd = std::process::Command::new(program);
        if let Some(ref display) = self.display {
            cmd.env("DISPLAY", display);
        }
        cmd.args(args);
        let output = cmd.output().map_err(X11Error::Io)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(X11Error::CommandFailed {
                program: program.to_string(),
                detail: format!(
                    "exit code {}: {}",
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_runner_inherits_display() {
        let runner = SubprocessRunner::new();
        assert!(runner.display.is_none());
        let runner = runner.with_display(":1");
        assert_eq!(runner.display.as_deref(), Some(":1"));
    }

    #[test]
    fn blanket_ref_impl() {
        struct Mock;
        impl CommandRunner for Mock {
            fn run(&self, program: &str, _args: &[&str]) -> Result<String, X11Error> {
                Ok(program.to_string())
            }
        }
        let mock = Mock;
        let r: &Mock = &mock;
        assert_eq!(r.run("xdotool", &[]).expect("ok"), "xdotool");
    }

    #[test]
    fn missing_program_is_io_error() {
        let err = SubprocessRunner::new()
            .run("resetti-definitely-not-installed", &[])
            .unwrap_err();
        assert!(matches!(err, X11Error::Io(_)));
    }
}
