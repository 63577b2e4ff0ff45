//! `tether push <objects.json> [--identity <id>]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::Value;

use tether_core::{ExternalObject, IdentityTag};
use tether_sync::Diagnostic;

use super::{channel, explain};

#[derive(Args, Debug)]
pub struct PushArgs {
    /// JSON file holding an array of objects.
    pub objects: PathBuf,

    /// Identity the batch is tagged with. A fresh one is generated when omitted.
    #[arg(long)]
    pub identity: Option<String>,

    /// Print the host's full answer as JSON.
    #[arg(long)]
    pub json: bool,
}

impl PushArgs {
    pub fn run(self) -> Result<()> {
        let raw = std::fs::read_to_string(&self.objects)
            .with_context(|| format!("failed to read {}", self.objects.display()))?;
        let objects: Vec<ExternalObject> = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse objects in {}", self.objects.display()))?;
        if objects.is_empty() {
            anyhow::bail!("{} holds no objects", self.objects.display());
        }
        let identity = IdentityTag::from(
            self.identity
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        );

        let answer = channel()?
            .try_create_or_modify(&objects, &identity)
            .map_err(explain)
            .context("create_or_modify failed")?;
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&answer).context("failed to render answer")?
            );
        } else {
            print_answer(&identity, objects.len(), &answer);
        }

        if answer.get("accepted").and_then(Value::as_bool) != Some(true) {
            anyhow::bail!("batch under identity '{identity}' was not accepted");
        }
        Ok(())
    }
}

fn print_answer(identity: &IdentityTag, sent: usize, answer: &Value) {
    println!("identity: {}", identity.to_string().bold());
    if answer.get("pending").and_then(Value::as_bool) == Some(true) {
        println!(
            "{} {sent} object(s) queued; the host is still working on them",
            "…".yellow()
        );
        return;
    }

    let Some(report) = answer.get("report") else {
        return;
    };
    let count = |key: &str| report.get(key).and_then(Value::as_u64).unwrap_or(0);
    let choice = report.get("choice").and_then(Value::as_str).unwrap_or("-");
    let marker = if answer.get("accepted").and_then(Value::as_bool) == Some(true) {
        "✓".green()
    } else {
        "✗".red()
    };
    println!(
        "{marker} {choice}: {} modified, {} created, {} deleted",
        count("modified"),
        count("created"),
        count("deleted"),
    );

    let diagnostics: Vec<Diagnostic> = report
        .get("diagnostics")
        .cloned()
        .and_then(|d| serde_json::from_value(d).ok())
        .unwrap_or_default();
    for d in diagnostics {
        println!("  {d}");
    }
}
