//! Tether: push client objects into a host model and keep them in sync.
//!
//! # Usage
//!
//! ```text
//! tether host init-model <path>
//! tether host start --model <path> [--approve auto|cancel|ask] [--log-json]
//! tether host stop|status
//! tether families [--json]
//! tether types <category> <family>
//! tether params <category> <family> <type>
//! tether push <objects.json> [--identity <id>] [--json]
//! tether doc
//! tether action [--command-guid <uuid>] [--assembly-path <path>]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    action::ActionArgs,
    host::HostCommand,
    push::PushArgs,
    query::{FamiliesArgs, ParamsArgs, TypesArgs},
};

#[derive(Parser, Debug)]
#[command(
    name = "tether",
    version,
    about = "Synchronize client-side objects into a host model",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run or control the host process that owns the model.
    Host {
        #[command(subcommand)]
        command: HostCommand,
    },

    /// List loaded and system families.
    Families(FamiliesArgs),

    /// List the types of one family.
    Types(TypesArgs),

    /// List the parameters of one family type.
    Params(ParamsArgs),

    /// Send a batch of objects under one identity.
    Push(PushArgs),

    /// Print the host document's name.
    Doc,

    /// Run a host action by command guid.
    Action(ActionArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Host { command } => commands::host::run(command),
        Commands::Families(args) => args.run(),
        Commands::Types(args) => args.run(),
        Commands::Params(args) => args.run(),
        Commands::Push(args) => args.run(),
        Commands::Doc => commands::query::document_name(),
        Commands::Action(args) => args.run(),
    }
}
