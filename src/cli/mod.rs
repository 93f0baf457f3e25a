//! CLI command implementations

pub mod catalog;
pub mod error;
pub mod fields;
pub mod retrieve;

pub use catalog::CatalogCommand;
pub use error::CliError;
pub use fields::FieldsCommand;
pub use retrieve::{Cli, Commands, RetrieveArgs};
