//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::Parser;
use resetti_core::ConfigError;
use resetti_core::config::profile_path;

#[derive(Parser, Debug)]
#[command(name = "resetti", about = "Multi-instance reset manager", version)]
pub struct Cli {
    /// Profile name, looked up as $XDG_CONFIG_HOME/resetti/<PROFILE>.toml
    #[arg(default_value = "default")]
    pub profile: String,

    /// Profile file path (overrides the profile name)
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Log to stderr instead of the cache log file
    #[arg(long)]
    pub stderr: bool,
}

impl Cli {
    /// Resolve the profile file to load.
    pub fn profile_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => profile_path(&self.profile),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_default_profile() {
        let cli = Cli::try_parse_from(["resetti"]).expect("test");
        assert_eq!(cli.profile, "default");
        assert!(cli.config.is_none());
        assert!(!cli.stderr);
    }

    #[test]
    fn explicit_config_wins() {
        let cli = Cli::try_parse_from(["resetti", "ranked", "-c", "/tmp/p.toml", "--stderr"]).expect("test");
        assert_eq!(cli.profile, "ranked");
        assert!(cli.stderr);
        assert_eq!(cli.profile_path().expect("test"), PathBuf::from("/tmp/p.toml"));
    }

    #[test]
    fn unknown_flags_are_rejected() {
        assert!(Cli::try_parse_from(["resetti", "--wall"]).is_err());
    }
}
