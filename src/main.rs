//! Offline command line front end for the content converter.
//!
//! Usage:
//!   adaptix convert <file.json>   - structured document to markup
//!   adaptix plain <file>          - markup to plain text
//!   adaptix detect <file>         - guess the format of a file
//!   adaptix validate <file>       - check markup block balance

use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
};

use adaptix::{
    config::Config,
    convert::{self, ContentInput, ConversionOptions},
    core::{AdaptResult, ErrorContext},
    logging::init_logger,
};
use clap::{Parser, Subcommand};
use log::LevelFilter;

#[derive(Parser)]
#[command(name = "adaptix")]
#[command(about = "Convert and inspect rich text content offline")]
#[command(version)]
struct Cli {
    /// Configuration file, only its `conversion` section is used
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a structured document (JSON) to markup
    Convert { file: PathBuf },
    /// Strip markup down to plain text
    Plain { file: PathBuf },
    /// Detect the content format of a file
    Detect { file: PathBuf },
    /// Validate markup block structure
    Validate { file: PathBuf },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    });

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            log::error!("{err}");
            eprintln!("adaptix: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> AdaptResult<ExitCode> {
    let options = match &cli.config {
        Some(path) => Config::load_from_yaml(path.display().to_string())?.conversion,
        None => ConversionOptions::default(),
    };

    match cli.command {
        Commands::Convert { file } => {
            let input = read(&file)?;
            let result = convert::convert_content(ContentInput::Legacy(input), &options);
            for warning in &result.warnings {
                log::warn!("{warning}");
            }
            print!("{}", result.content);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Plain { file } => {
            println!("{}", convert::to_plain_text(&read(&file)?));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Detect { file } => {
            let detection = convert::detect_format(&read(&file)?);
            println!("{}", serde_json::to_string_pretty(&detection)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Validate { file } => {
            let validation = convert::validate_markup(&read(&file)?);
            if validation.valid {
                println!("valid");
                return Ok(ExitCode::SUCCESS);
            }
            for error in &validation.errors {
                println!("{error}");
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

fn read(file: &Path) -> AdaptResult<String> {
    fs::read_to_string(file).with_context(&format!("Unable to read {}", file.display()))
}
