//! `tether host`: run and control the host process.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use tether_bridge::{init_tracing, start_blocking, ActionRegistry, BridgeError, HostApp};
use tether_host::MemoryDocument;
use tether_sync::Reconciler;

use super::prompt::ApproveMode;
use super::{channel, home, load_config};

#[derive(Subcommand, Debug)]
pub enum HostCommand {
    /// Write a starter model file.
    InitModel {
        /// Where to write the model (YAML).
        path: PathBuf,

        /// Replace an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Run the host in the foreground over a model file.
    Start(StartArgs),
    /// Ask a running host to shut down.
    Stop,
    /// Report whether a host is listening.
    Status,
}

#[derive(Args, Debug)]
pub struct StartArgs {
    /// Model file the host opens; commits are written back to it.
    #[arg(long)]
    pub model: PathBuf,

    /// How batches are confirmed: auto | cancel | ask.
    #[arg(long, default_value = "auto", value_name = "MODE")]
    pub approve: ApproveMode,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub log_json: bool,
}

pub fn run(command: HostCommand) -> Result<()> {
    match command {
        HostCommand::InitModel { path, force } => init_model(path, force),
        HostCommand::Start(args) => start(args),
        HostCommand::Stop => match channel()?.stop() {
            Ok(()) => {
                println!("host stop requested");
                Ok(())
            }
            Err(BridgeError::HostNotRunning { .. }) => {
                println!("host is not running");
                Ok(())
            }
            Err(err) => Err(err).context("failed to stop host"),
        },
        HostCommand::Status => status(),
    }
}

fn init_model(path: PathBuf, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to replace it",
            path.display()
        );
    }
    MemoryDocument::sample()
        .save_to(&path)
        .with_context(|| format!("failed to write model {}", path.display()))?;
    println!("✓ Wrote sample model to {}", path.display());
    Ok(())
}

fn start(args: StartArgs) -> Result<()> {
    let home = home()?;
    let config = load_config(&home)?;
    init_tracing(args.log_json);

    let model = args.model.clone();
    let approve = args.approve;
    let reconciler = Reconciler::from_config(&config);
    start_blocking(
        &home,
        config,
        ActionRegistry::with_builtins(),
        move || {
            let document = MemoryDocument::open(&model)?;
            Ok(HostApp::new(document, approve.prompt(), reconciler))
        },
    )
    .with_context(|| format!("host exited with error (model {})", args.model.display()))
}

fn status() -> Result<()> {
    let channel = channel()?;
    let payload = match channel.ping() {
        Ok(()) => serde_json::json!({
            "running": true,
            "host_version": channel.host_version(),
            "socket": channel.socket().display().to_string(),
        }),
        Err(BridgeError::HostNotRunning { .. }) => serde_json::json!({
            "running": false,
            "socket": channel.socket().display().to_string(),
        }),
        Err(err @ BridgeError::VersionMismatch { .. }) => serde_json::json!({
            "running": false,
            "socket": channel.socket().display().to_string(),
            "error": err.to_string(),
        }),
        Err(err) => return Err(err).context("failed to query host status"),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to render host status JSON")?
    );
    Ok(())
}
