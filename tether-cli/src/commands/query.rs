//! `tether families`, `tether types`, `tether params` and `tether doc`.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use tether_core::FamilyRef;

use super::{channel, explain};

#[derive(Args, Debug)]
pub struct FamiliesArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct FamilyRow {
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Family")]
    family: String,
}

impl FamiliesArgs {
    pub fn run(self) -> Result<()> {
        let families = channel()?.try_family_names().map_err(explain)?;
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&families).context("failed to render families")?
            );
            return Ok(());
        }

        if families.is_empty() {
            println!("No families loaded.");
            return Ok(());
        }
        let rows: Vec<FamilyRow> = families
            .into_iter()
            .map(|f| FamilyRow {
                category: f.category.to_string(),
                family: f.family_name,
            })
            .collect();
        let count = rows.len();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        println!("{} families", count.to_string().bold());
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct TypesArgs {
    /// Category label, e.g. "Walls" or "Furniture".
    pub category: String,
    pub family: String,
}

impl TypesArgs {
    pub fn run(self) -> Result<()> {
        let family = FamilyRef::new(self.category.as_str(), self.family.as_str());
        let types = channel()?
            .try_type_names(&family)
            .map_err(explain)
            .with_context(|| format!("failed to list types of {}", self.family))?;
        for name in types {
            println!("{name}");
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct ParamsArgs {
    pub category: String,
    pub family: String,
    #[arg(value_name = "TYPE")]
    pub type_name: String,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct ParameterRow {
    #[tabled(rename = "Parameter")]
    name: String,
    #[tabled(rename = "Storage")]
    storage: String,
    #[tabled(rename = "Scope")]
    scope: String,
}

impl ParamsArgs {
    pub fn run(self) -> Result<()> {
        let family = FamilyRef::new(self.category.as_str(), self.family.as_str());
        let params = channel()?
            .try_parameters(&family, &self.type_name)
            .map_err(explain)
            .with_context(|| {
                format!(
                    "failed to list parameters of {} : {}",
                    self.family, self.type_name
                )
            })?;
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&params).context("failed to render parameters")?
            );
            return Ok(());
        }

        let rows: Vec<ParameterRow> = params
            .into_iter()
            .map(|p| ParameterRow {
                name: p.name,
                storage: p.storage.to_string(),
                scope: if p.is_type { "type" } else { "instance" }.to_string(),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}

pub fn document_name() -> Result<()> {
    let name = channel()?.try_document_name().map_err(explain)?;
    println!("{name}");
    Ok(())
}
