//! resetti: multi-instance reset manager.
//!
//! Tracks every game instance through its log, drives resets and focus
//! through X11, and optionally shows a wall of instances through OBS.

use anyhow::Context;
use clap::Parser;
use resetti_core::Profile;

mod cli;
mod controller;
mod counter;
mod cpu;
mod frontend;
mod hooks;
mod input;
mod logging;
mod manager;
mod multi;
#[cfg(test)]
mod testutil;
mod wall;

#[tokio::main]
async fn main() {
    let args = cli::Cli::parse();
    logging::init(args.stderr);

    if let Err(e) = run(&args).await {
        tracing::error!(error = %format!("{e:#}"), "resetti failed");
        eprintln!("resetti: {e:#}");
        std::process::exit(1);
    }
}

async fn run(args: &cli::Cli) -> anyhow::Result<()> {
    let path = args.profile_path().context("(init) locate profile")?;
    let profile = Profile::load(&path).with_context(|| format!("(init) load profile {}", path.display()))?;
    tracing::info!(
        path = %path.display(),
        wall = profile.wall.enabled,
        obs = profile.obs.enabled,
        keybinds = profile.keybinds.len(),
        "resetti starting"
    );
    controller::run(profile).await
}
