//! Catalog subcommand

use super::CliError;
use crate::catalog::StaticCatalog;
use crate::FeatureType;
use clap::Parser;
use std::path::PathBuf;

/// Browse a SWORD attribute table (.shp, .dbf or CSV export)
#[derive(Parser, Debug)]
pub struct CatalogCommand {
    /// What to show
    #[command(subcommand)]
    pub target: CatalogTarget,
}

/// Catalog views
#[derive(clap::Subcommand, Debug)]
pub enum CatalogTarget {
    /// List the table's columns and feature count
    Columns {
        /// Attribute table (.shp, .dbf or CSV)
        path: PathBuf,

        /// Feature type of the table
        #[arg(long, default_value = "reach")]
        feature_type: FeatureType,
    },
    /// List distinct values of a column (e.g. river_name)
    Values {
        /// Attribute table (.shp, .dbf or CSV)
        path: PathBuf,

        /// Column to list
        #[arg(long)]
        column: String,

        /// Feature type of the table
        #[arg(long, default_value = "reach")]
        feature_type: FeatureType,
    },
    /// List feature ids whose column equals a value
    Filter {
        /// Attribute table (.shp, .dbf or CSV)
        path: PathBuf,

        /// Column to filter on
        #[arg(long)]
        column: String,

        /// Value to match
        #[arg(long)]
        value: String,

        /// Feature type of the table
        #[arg(long, default_value = "reach")]
        feature_type: FeatureType,
    },
}

impl CatalogCommand {
    /// Execute the catalog command
    pub async fn execute(&self) -> Result<(), CliError> {
        match &self.target {
            CatalogTarget::Columns { path, feature_type } => {
                let catalog = StaticCatalog::from_path(path, *feature_type)?;
                println!("{} features in {}", catalog.len(), path.display());
                println!("Columns:");
                for column in catalog.columns() {
                    println!("  {column}");
                }
                Ok(())
            }
            CatalogTarget::Values {
                path,
                column,
                feature_type,
            } => {
                let catalog = StaticCatalog::from_path(path, *feature_type)?;
                let values = catalog.distinct_values(column)?;
                println!("{} distinct values of {}:", values.len(), column);
                for value in values {
                    println!("  {value}");
                }
                Ok(())
            }
            CatalogTarget::Filter {
                path,
                column,
                value,
                feature_type,
            } => {
                let catalog = StaticCatalog::from_path(path, *feature_type)?;
                let ids = catalog.filter(column, value)?;
                if ids.is_empty() {
                    return Err(CliError::InvalidArgument(format!(
                        "no {feature_type} has {column} = '{value}'"
                    )));
                }
                for id in ids {
                    println!("{id}");
                }
                Ok(())
            }
        }
    }
}
