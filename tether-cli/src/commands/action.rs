//! `tether action [--command-guid <uuid>]`

use anyhow::{Context, Result};
use clap::Args;
use uuid::Uuid;

use tether_bridge::actions::{action_input, DOCUMENT_NAME_ACTION, DOC_NAME};

use super::{channel, explain};

#[derive(Args, Debug)]
pub struct ActionArgs {
    /// Action to run; defaults to the built-in document-name action.
    #[arg(long, default_value_t = DOCUMENT_NAME_ACTION)]
    pub command_guid: Uuid,

    /// Location of the calling code, forwarded as `AssemblyPath`.
    #[arg(long)]
    pub assembly_path: Option<String>,

    /// Print the whole answer as JSON.
    #[arg(long)]
    pub json: bool,
}

impl ActionArgs {
    pub fn run(self) -> Result<()> {
        let assembly = match self.assembly_path {
            Some(path) => path,
            None => std::env::current_exe()
                .context("could not resolve the tether executable path")?
                .display()
                .to_string(),
        };
        let answer = channel()?
            .try_action(action_input(self.command_guid, assembly))
            .map_err(explain)
            .with_context(|| format!("action {} failed", self.command_guid))?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&answer).context("failed to render answer")?
            );
            return Ok(());
        }
        match answer.get(DOC_NAME).and_then(|v| v.as_str()) {
            Some(name) => println!("{name}"),
            None => println!(
                "{}",
                serde_json::to_string(&answer).context("failed to render answer")?
            ),
        }
        Ok(())
    }
}
