// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// pagewerk — run page detection on one image and print the report as JSON.
//
// Exit status: 0 on success, 2 when a detection stage fails (the stage-tagged
// failure is printed as JSON on stdout), 1 for usage or I/O errors.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use pagewerk_core::{PageDetectFailure, PageDetectParams};
use pagewerk_detect::PageDetectPipeline;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "pagewerk")]
#[command(about = "Locate the page quadrilateral in a photographed drawing")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Detect the page in an image and print the report.
    Detect(DetectArgs),

    /// Print the default parameter bundle.
    Params {
        /// Pretty-print the JSON.
        #[arg(long)]
        pretty: bool,
    },
}

#[derive(Debug, Clone, Args)]
struct DetectArgs {
    /// Path to the input image.
    image: PathBuf,

    /// JSON parameter file; missing fields take their defaults.
    #[arg(long)]
    params: Option<PathBuf>,

    /// Override the detection-frame side cap.
    #[arg(long)]
    max_side: Option<u32>,

    /// Skip corner refinement.
    #[arg(long)]
    no_refine: bool,

    /// Pretty-print the JSON.
    #[arg(long)]
    pretty: bool,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("failed to read params file {path}: {source}")]
    ParamsRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid params file {path}: {source}")]
    ParamsParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode JSON: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Detect(#[from] PageDetectFailure),
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Detect(failure)) => {
            error!(%failure, "Page detection failed");
            match to_json(&failure, false) {
                Ok(json) => println!("{json}"),
                Err(err) => eprintln!("{err}"),
            }
            ExitCode::from(2)
        }
        Err(err) => {
            eprintln!("pagewerk: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<(), CliError> {
    match command {
        Command::Params { pretty } => {
            println!("{}", to_json(&PageDetectParams::default(), pretty)?);
        }
        Command::Detect(args) => {
            let params = build_params(&args)?;
            info!(image = %args.image.display(), "Detecting page");
            let report = PageDetectPipeline::new(params).run(&args.image)?;
            println!("{}", to_json(&report, args.pretty)?);
        }
    }
    Ok(())
}

/// Defaults, then the params file, then command-line overrides.
fn build_params(args: &DetectArgs) -> Result<PageDetectParams, CliError> {
    let mut params = match &args.params {
        Some(path) => load_params(path)?,
        None => PageDetectParams::default(),
    };
    if let Some(max_side) = args.max_side {
        params.max_side = max_side;
    }
    if args.no_refine {
        params.refine = None;
    }
    Ok(params)
}

fn load_params(path: &Path) -> Result<PageDetectParams, CliError> {
    let text = fs::read_to_string(path).map_err(|source| CliError::ParamsRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| CliError::ParamsParse {
        path: path.to_path_buf(),
        source,
    })
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String, CliError> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagewerk_core::{FailureCode, FailureStage};

    fn detect_args(argv: &[&str]) -> DetectArgs {
        let cli = Cli::try_parse_from(argv.iter().copied()).unwrap();
        match cli.command {
            Command::Detect(args) => args,
            other => panic!("expected detect, got {other:?}"),
        }
    }

    #[test]
    fn overrides_apply_on_top_of_defaults() {
        let args = detect_args(&[
            "pagewerk",
            "detect",
            "page.jpg",
            "--max-side",
            "640",
            "--no-refine",
        ]);
        let params = build_params(&args).unwrap();
        assert_eq!(params.max_side, 640);
        assert!(params.refine.is_none());
        assert_eq!(params.min_side, PageDetectParams::default().min_side);
    }

    #[test]
    fn params_file_is_merged_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        fs::write(&path, r#"{"edge_low_threshold": 40, "max_side": 800}"#).unwrap();
        let path_arg = path.to_string_lossy().to_string();
        let args = detect_args(&[
            "pagewerk",
            "detect",
            "x.png",
            "--params",
            &path_arg,
            "--max-side",
            "512",
        ]);
        let params = build_params(&args).unwrap();
        assert_eq!(params.edge_low_threshold, 40);
        assert_eq!(params.max_side, 512);
        assert!(params.refine.is_some());
    }

    #[test]
    fn malformed_params_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();
        let err = load_params(&path).unwrap_err();
        assert!(matches!(err, CliError::ParamsParse { .. }));
    }

    #[test]
    fn failure_json_has_stage_code_message() {
        let failure = PageDetectFailure::new(
            FailureStage::QuadSelect,
            FailureCode::QuadTooSmall,
            "below threshold",
        );
        let json = to_json(&failure, false).unwrap();
        assert_eq!(
            json,
            r#"{"stage":"QUAD_SELECT","code":"QUAD_TOO_SMALL","message":"below threshold"}"#
        );
    }

    #[test]
    fn params_subcommand_parses() {
        let cli = Cli::try_parse_from(["pagewerk", "params", "--pretty"]).unwrap();
        assert!(matches!(cli.command, Command::Params { pretty: true }));
    }
}
