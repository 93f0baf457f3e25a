//! CLI command for listing Hydrocron fields

use crate::catalog::fields::{is_index_column, is_key_column};
use crate::catalog::FieldCatalog;
use crate::FeatureType;
use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;

/// Fields subcommand
#[derive(Debug, Args)]
pub struct FieldsCommand {
    /// Feature type: reach or node
    #[arg(long, default_value = "reach")]
    feature_type: FeatureType,

    /// Only list fields containing this text
    pattern: Option<String>,

    /// Output format
    #[arg(long, default_value = "human")]
    format: OutputFormat,
}

/// Output format for fields command
#[derive(Debug, Clone, clap::ValueEnum)]
enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

impl FieldsCommand {
    /// Execute the fields command
    pub async fn execute(&self) -> Result<()> {
        let catalog = FieldCatalog::load().map_err(|e| anyhow::anyhow!("{e}"))?;

        let fields: Vec<&str> = catalog
            .fields(self.feature_type)
            .iter()
            .map(String::as_str)
            .filter(|f| self.pattern.as_deref().map_or(true, |p| f.contains(p)))
            .collect();

        match self.format {
            OutputFormat::Json => {
                let rows: Vec<_> = fields
                    .iter()
                    .map(|f| {
                        json!({
                            "field": f,
                            "always_requested": is_key_column(self.feature_type, f),
                            "index_only": is_index_column(self.feature_type, f),
                        })
                    })
                    .collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&rows)
                        .context("Failed to serialize fields to JSON")?
                );
            }
            OutputFormat::Human => {
                println!(
                    "{} {} fields (schema {}):\n",
                    fields.len(),
                    self.feature_type,
                    catalog.schema_version()
                );
                for field in fields {
                    if is_key_column(self.feature_type, field) {
                        println!("{field} (always requested)");
                    } else {
                        println!("{field}");
                    }
                }
            }
        }

        Ok(())
    }
}
