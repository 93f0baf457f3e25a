//! Retrieve command implementation

use crate::catalog::{FeatureCatalog, PassthroughCatalog, StaticCatalog};
use crate::downloader::config::{
    DEFAULT_BASE_BACKOFF_MS, DEFAULT_MAX_PAGES, MAX_BACKOFF_MS, MAX_CONCURRENCY,
};
use crate::downloader::{
    DateRange, RateLimiter, RetrievalConfig, RetrievalOrchestrator, RetrievalResult, Selection,
};
use crate::fetcher::hydrocron_config::HydrocronConfig;
use crate::fetcher::hydrocron_http::HydrocronHttpClient;
use crate::identifier::FeatureId;
use crate::output::csv::{write_retrieval_result, WrittenFiles};
use crate::output::OutputPathBuilder;
use crate::shutdown::SharedCancel;
use crate::FeatureType;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::CliError;

/// Parse and validate concurrency value
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("concurrency must be at least 1".to_string());
    }
    if value > MAX_CONCURRENCY {
        return Err(format!(
            "concurrency {value} exceeds maximum of {MAX_CONCURRENCY}"
        ));
    }
    Ok(value)
}

/// Split a comma separated list, dropping empty items
fn split_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

/// Hydrocron Downloader CLI
#[derive(Parser, Debug)]
#[command(name = "hydrocron-downloader")]
#[command(about = "Download SWOT Hydrocron time series for SWORD reaches and nodes", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// Maximum attempts per request, first try included (range: 1-20)
    #[arg(long, global = true, default_value = "3", value_parser = clap::value_parser!(u32).range(1..=20))]
    pub max_attempts: u32,

    /// Base retry backoff in milliseconds, doubled on each retry
    #[arg(long, global = true, default_value_t = DEFAULT_BASE_BACKOFF_MS)]
    pub base_backoff_ms: u64,

    /// Longest retry backoff in milliseconds (raised to the base if lower)
    #[arg(long, global = true, default_value_t = MAX_BACKOFF_MS)]
    pub max_backoff_ms: u64,

    /// Number of concurrent requests (default: 4, max: 32)
    ///
    /// Every (feature, chunk) pair is one unit of work. Higher values finish
    /// large selections sooner but put more load on Hydrocron; combine with
    /// --requests-per-second to stay polite.
    #[arg(long, global = true, default_value = "4", value_parser = parse_concurrency)]
    pub concurrency: usize,

    /// Maximum days covered by one request
    #[arg(long, global = true, default_value = "365", value_parser = clap::value_parser!(u32).range(1..))]
    pub chunk_days: u32,

    /// Maximum pages followed for one chunk
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_PAGES)]
    pub max_pages: usize,

    /// Fail when no feature returns any data
    #[arg(long, global = true, default_value_t = false)]
    pub strict: bool,

    /// Throttle requests to this rate (requests per second)
    #[arg(long, global = true)]
    pub requests_per_second: Option<f64>,

    /// Per-request timeout in seconds
    #[arg(long, global = true, default_value = "30")]
    pub timeout_secs: u64,

    /// Hydrocron base URL
    #[arg(long, global = true, env = "HYDROCRON_BASE_URL")]
    pub base_url: Option<String>,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9090)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,
}

impl Cli {
    /// Retrieval configuration from the global flags
    pub fn retrieval_config(&self) -> RetrievalConfig {
        RetrievalConfig::default()
            .with_max_attempts(self.max_attempts)
            .with_base_backoff(Duration::from_millis(self.base_backoff_ms))
            .with_max_backoff(Duration::from_millis(self.max_backoff_ms))
            .with_max_concurrency(self.concurrency)
            .with_chunk_max_span_days(self.chunk_days)
            .with_max_pages(self.max_pages)
            .with_strict_mode(self.strict)
    }

    /// Hydrocron endpoint configuration from the global flags
    pub fn hydrocron_config(&self) -> HydrocronConfig {
        let config = HydrocronConfig::default()
            .with_request_timeout(Duration::from_secs(self.timeout_secs.max(1)));
        match &self.base_url {
            Some(url) => config.with_base_url(url.clone()),
            None => config,
        }
    }

    /// Build the HTTP transport, throttled when requested
    pub fn build_transport(&self) -> Result<HydrocronHttpClient, CliError> {
        let client = HydrocronHttpClient::new(self.hydrocron_config())?;
        match self.requests_per_second {
            Some(rate) => {
                let limiter = RateLimiter::per_second(rate)?;
                info!(
                    max_requests = limiter.max_requests(),
                    window_ms = limiter.window().as_millis() as u64,
                    "Request throttling enabled"
                );
                Ok(client.with_rate_limiter(Arc::new(limiter)))
            }
            None => Ok(client),
        }
    }
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Retrieve time series for a set of reaches or nodes
    Retrieve(RetrieveArgs),

    /// List the fields Hydrocron accepts for a feature type
    Fields(super::FieldsCommand),

    /// Browse a SWORD attribute table
    Catalog(super::CatalogCommand),
}

/// Retrieve command arguments
#[derive(Parser, Debug)]
pub struct RetrieveArgs {
    /// Feature type: reach or node
    #[arg(long, default_value = "reach")]
    pub feature_type: FeatureType,

    /// Feature id; repeat or separate with commas
    #[arg(long = "feature-id", value_name = "ID")]
    pub feature_ids: Vec<String>,

    /// SWORD attribute table (.shp, .dbf or CSV) used to select and confirm features
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Catalog column to filter on (e.g. river_name)
    #[arg(long, requires = "catalog", requires = "filter_value")]
    pub filter_column: Option<String>,

    /// Value the filter column must equal
    #[arg(long, requires = "filter_column")]
    pub filter_value: Option<String>,

    /// Variables to retrieve; repeat or separate with commas
    #[arg(long, required = true, value_name = "FIELD")]
    pub variables: Vec<String>,

    /// Start date (YYYY-MM-DD)
    #[arg(long)]
    pub start: String,

    /// End date (YYYY-MM-DD), inclusive
    #[arg(long)]
    pub end: String,

    /// Directory the output directory is created in
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Label used in output names (default: filter value or first feature id)
    #[arg(long)]
    pub label: Option<String>,
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

impl RetrieveArgs {
    /// Feature ids and the catalog that confirms them
    fn selection_source(&self) -> Result<(Vec<FeatureId>, Arc<dyn FeatureCatalog>), CliError> {
        let explicit = split_list(&self.feature_ids)
            .iter()
            .map(|id| FeatureId::parse(id))
            .collect::<Result<Vec<_>, _>>()?;

        let Some(path) = &self.catalog else {
            if explicit.is_empty() {
                return Err(CliError::InvalidArgument(
                    "provide --feature-id or --catalog".to_string(),
                ));
            }
            let catalog: Arc<dyn FeatureCatalog> = Arc::new(PassthroughCatalog);
            return Ok((explicit, catalog));
        };

        let catalog = StaticCatalog::from_path(path, self.feature_type)?;
        let mut ids = match (&self.filter_column, &self.filter_value) {
            (Some(column), Some(value)) => {
                let ids = catalog.filter(column, value)?;
                info!(column = %column, value = %value, matches = ids.len(), "Catalog filter applied");
                ids
            }
            _ if explicit.is_empty() => catalog.records().iter().map(|r| r.id.clone()).collect(),
            _ => Vec::new(),
        };
        ids.extend(explicit);

        if ids.is_empty() {
            return Err(CliError::InvalidArgument(
                "no features matched the catalog filter".to_string(),
            ));
        }
        let catalog: Arc<dyn FeatureCatalog> = Arc::new(catalog);
        Ok((ids, catalog))
    }

    /// Label for output names
    fn output_label(&self, ids: &[FeatureId]) -> String {
        self.label
            .clone()
            .or_else(|| self.filter_value.clone())
            .or_else(|| ids.first().map(FeatureId::to_string))
            .unwrap_or_default()
    }

    /// Execute the retrieval
    pub async fn execute(&self, cli: &Cli, cancel: SharedCancel) -> Result<(), CliError> {
        if let Some(addr) = cli.metrics_addr {
            crate::metrics::init_metrics(addr).map_err(CliError::ConfigurationError)?;
        }

        let range = DateRange::parse(&self.start, &self.end)?;
        let (ids, catalog) = self.selection_source()?;
        let label = self.output_label(&ids);
        let variables = split_list(&self.variables);
        let selection = Selection::from_ids(self.feature_type, ids, variables, range)?;

        let transport = Arc::new(cli.build_transport()?);
        let orchestrator = RetrievalOrchestrator::new(transport, catalog, cli.retrieval_config())?
            .with_cancel(cancel);

        info!(
            feature_type = %self.feature_type,
            features = selection.feature_ids().len(),
            variables = %selection.variables().join(","),
            range = %range,
            "Starting retrieval"
        );

        let progress = create_progress_bar(self.feature_type);
        let result = orchestrator
            .retrieve_with_progress(selection, Some(progress.clone()))
            .await;
        progress.finish_and_clear();

        let result = match result {
            Ok(result) => result,
            Err(e) => {
                if cli.output_format == OutputFormat::Human {
                    eprintln!("\nRetrieval failed!");
                    eprintln!("Error: {e}");
                }
                return Err(e.into());
            }
        };

        let paths = OutputPathBuilder::new(self.output_dir.clone(), &label, self.feature_type);
        let written = write_retrieval_result(&result, &paths)?;

        match cli.output_format {
            OutputFormat::Json => output_json(&result, &written)?,
            OutputFormat::Human => output_human(&result, &written),
        }

        if result.cancelled {
            warn!("Retrieval cancelled before completion");
            return Err(CliError::Cancelled);
        }
        Ok(())
    }
}

/// Output result as JSON
fn output_json(result: &RetrievalResult, written: &WrittenFiles) -> Result<(), CliError> {
    let output = serde_json::json!({
        "success": result.is_complete(),
        "cancelled": result.cancelled,
        "stats": result.stats,
        "feature_files": written.feature_files,
        "combined_file": written.combined_file,
        "errors_file": written.errors_file,
        "errors": result.errors,
    });

    let text = serde_json::to_string(&output)
        .map_err(|e| CliError::ConfigurationError(format!("Failed to serialize output: {e}")))?;
    println!("{text}");
    Ok(())
}

/// Output result in human-readable format
fn output_human(result: &RetrievalResult, written: &WrittenFiles) {
    if result.is_complete() {
        println!("\nRetrieval completed successfully!");
    } else if result.cancelled {
        println!("\nRetrieval cancelled; completed chunks were kept.");
    } else {
        println!("\nRetrieval completed with errors.");
    }

    let with_data = result.dataset.iter().filter(|d| !d.is_empty()).count();
    println!("Features with data: {}/{}", with_data, result.dataset.len());
    println!("Observations: {}", result.total_observations());
    println!("Requests: {}", result.stats.requests);
    if result.stats.retries > 0 {
        println!("Retries: {}", result.stats.retries);
    }
    if let Some(path) = &written.combined_file {
        println!("Output: {}", path.display());
    }

    if !result.errors.is_empty() {
        eprintln!("\n{} chunk(s) could not be retrieved:", result.errors.len());
        for entry in &result.errors {
            eprintln!("  {entry}");
        }
        if let Some(path) = &written.errors_file {
            eprintln!("Error report: {}", path.display());
        }
        error!(errors = result.errors.len(), "Retrieval incomplete");
    }
}

/// Create progress bar over (feature, chunk) units
fn create_progress_bar(feature_type: FeatureType) -> ProgressBar {
    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
    ) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(format!("Retrieving {feature_type} time series"));
    pb
}
