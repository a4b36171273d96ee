// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Lesewerk — command-line front end.
//
// Entry point. Parses arguments, initialises logging, loads configuration,
// and dispatches to a subcommand.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use lesewerk_core::ClassId;
use lesewerk_core::config::LesewerkConfig;
use lesewerk_core::error::Result;
use lesewerk_core::human_errors::humanize_error;
use lesewerk_document::{IdentityPreprocessor, ImagePreprocessor, ScanPreprocessor};

#[derive(Debug, Parser)]
#[command(name = "lesewerk", version, about = "Read documents: QR codes, layout regions, and fields")]
struct Cli {
    /// JSON configuration file.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Debug logging (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Decode QR codes and print one payload per line.
    Qr {
        file: PathBuf,
        /// Also save each decoded code as a PNG crop.
        #[arg(long, value_name = "DIR")]
        crop_dir: Option<PathBuf>,
    },
    /// Print the segmentation label map.
    Labels,
    /// Print per-page layout segments as JSON.
    Segment {
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = Preprocess::None)]
        preprocess: Preprocess,
    },
    /// Write PNG crops of the selected layout classes.
    Crop {
        file: PathBuf,
        #[command(flatten)]
        target: CropTarget,
        #[arg(long, value_name = "DIR")]
        out: PathBuf,
    },
    /// Extract named fields and print them as JSON.
    Extract {
        file: PathBuf,
        /// Field to extract; repeat for several.
        #[arg(long = "field", value_name = "NAME", required = true)]
        fields: Vec<String>,
        #[arg(long, value_enum, default_value_t = Preprocess::None)]
        preprocess: Preprocess,
        /// Let the vision chat model read the pages instead of the OCR backend.
        #[arg(long)]
        multimodal: bool,
    },
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
struct CropTarget {
    /// Class id to crop; repeat for several.
    #[arg(long = "class", value_name = "ID")]
    classes: Vec<ClassId>,
    /// Class label to crop, e.g. "Table".
    #[arg(long, value_name = "NAME")]
    label: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Preprocess {
    None,
    Scan,
}

impl Preprocess {
    fn preprocessor(self) -> Box<dyn ImagePreprocessor> {
        match self {
            Preprocess::None => Box::new(IdentityPreprocessor),
            Preprocess::Scan => Box::new(ScanPreprocessor::default()),
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .init();
}

fn load_config(path: Option<&std::path::Path>) -> Result<LesewerkConfig> {
    let mut config = LesewerkConfig::load_or_default(path)?;
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Qr { file, crop_dir } => commands::qr(&config, &file, crop_dir.as_deref()),
        Command::Labels => commands::labels(&config),
        Command::Segment { file, preprocess } => {
            commands::segment(&config, &file, preprocess.preprocessor().as_ref())
        }
        Command::Crop { file, target, out } => {
            commands::crop(&config, &file, &target.classes, target.label.as_deref(), &out)
        }
        Command::Extract {
            file,
            fields,
            preprocess,
            multimodal,
        } => {
            commands::extract(
                &config,
                &file,
                &fields,
                preprocess.preprocessor().as_ref(),
                multimodal,
            )
            .await
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    tracing::debug!(command = ?cli.command, "Lesewerk starting");

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::debug!(error = ?err, "Command failed");
            eprintln!("error: {}", humanize_error(&err));
            ExitCode::FAILURE
        }
    }
}
