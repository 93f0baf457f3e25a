//! Unit tests for CLI argument parsing

use clap::Parser;
use hydrocron_downloader::cli::retrieve::OutputFormat;
use hydrocron_downloader::cli::{Cli, Commands};
use hydrocron_downloader::downloader::config::{
    DEFAULT_CHUNK_MAX_SPAN_DAYS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_CONCURRENCY,
};
use hydrocron_downloader::FeatureType;
use std::path::PathBuf;
use std::time::Duration;

fn retrieve_args(extra: &[&str]) -> Vec<String> {
    let mut args: Vec<String> = vec!["hydrocron-downloader".into()];
    args.extend(extra.iter().map(|s| s.to_string()));
    args.extend(
        [
            "retrieve",
            "--feature-id",
            "63470800171",
            "--variables",
            "wse,width",
            "--start",
            "2023-08-01",
            "--end",
            "2024-05-30",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    args
}

#[test]
fn test_defaults_match_library_defaults() {
    let cli = Cli::parse_from(retrieve_args(&[]));

    assert_eq!(cli.max_attempts, DEFAULT_MAX_ATTEMPTS);
    assert_eq!(cli.concurrency, DEFAULT_MAX_CONCURRENCY);
    assert_eq!(cli.chunk_days, DEFAULT_CHUNK_MAX_SPAN_DAYS);
    assert_eq!(cli.output_format, OutputFormat::Human);
    assert!(!cli.strict);
    assert!(cli.requests_per_second.is_none());

    let Commands::Retrieve(args) = cli.command else {
        panic!("expected retrieve command");
    };
    assert_eq!(args.feature_type, FeatureType::Reach);
    assert_eq!(args.output_dir, PathBuf::from("."));
    assert_eq!(args.variables, vec!["wse,width".to_string()]);
}

#[test]
fn test_global_flags_before_subcommand() {
    let cli = Cli::parse_from(retrieve_args(&[
        "--max-attempts",
        "7",
        "--output-format",
        "json",
        "--requests-per-second",
        "2.5",
    ]));

    assert_eq!(cli.max_attempts, 7);
    assert_eq!(cli.output_format, OutputFormat::Json);
    assert_eq!(cli.requests_per_second, Some(2.5));
    assert_eq!(cli.retrieval_config().max_attempts, 7);
}

#[test]
fn test_out_of_range_values_rejected() {
    assert!(Cli::try_parse_from(retrieve_args(&["--max-attempts", "0"])).is_err());
    assert!(Cli::try_parse_from(retrieve_args(&["--max-attempts", "21"])).is_err());
    assert!(Cli::try_parse_from(retrieve_args(&["--concurrency", "64"])).is_err());
    assert!(Cli::try_parse_from(retrieve_args(&["--chunk-days", "0"])).is_err());
}

#[test]
fn test_filter_requires_catalog() {
    let result = Cli::try_parse_from([
        "hydrocron-downloader",
        "retrieve",
        "--filter-column",
        "river_name",
        "--filter-value",
        "Ohio River",
        "--variables",
        "wse",
        "--start",
        "2023-08-01",
        "--end",
        "2023-09-01",
    ]);
    assert!(result.is_err());
}

#[test]
fn test_throttled_transport_builds() {
    let cli = Cli::parse_from(retrieve_args(&["--requests-per-second", "0.5"]));
    assert!(cli.build_transport().is_ok());

    let cli = Cli::parse_from(retrieve_args(&["--requests-per-second", "0"]));
    assert!(cli.build_transport().is_err());
}

#[test]
fn test_long_base_backoff_is_valid() {
    let cli = Cli::parse_from(retrieve_args(&["--base-backoff-ms", "45000"]));
    let config = cli.retrieval_config();

    assert!(config.validate().is_ok());
    assert_eq!(config.effective_max_backoff(), Duration::from_secs(45));

    let cli = Cli::parse_from(retrieve_args(&["--max-backoff-ms", "90000"]));
    assert_eq!(cli.retrieval_config().max_backoff_ms, 90_000);
}
