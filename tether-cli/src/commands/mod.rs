pub mod action;
pub mod host;
pub mod prompt;
pub mod push;
pub mod query;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tether_bridge::{BridgeError, Channel};
use tether_core::{config, BridgeConfig};

pub fn home() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

pub fn load_config(home: &std::path::Path) -> Result<BridgeConfig> {
    config::load_at(home).with_context(|| {
        format!(
            "failed to load {}",
            config::config_path_at(home).display()
        )
    })
}

/// Channel to the host named by `~/.tether/config.yaml`.
pub fn channel() -> Result<Channel> {
    let home = home()?;
    let config = load_config(&home)?;
    Ok(Channel::new(&home, &config))
}

/// Turn a "host not running" failure into a hint the user can act on.
pub fn explain(err: BridgeError) -> anyhow::Error {
    match err {
        BridgeError::HostNotRunning { socket } => anyhow::anyhow!(
            "host is not running (no socket at {}); start it with `tether host start --model <path>`",
            socket.display()
        ),
        other => anyhow::Error::new(other),
    }
}
