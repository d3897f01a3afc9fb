use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;
use std::process::ExitCode;

use bt2tax_rs::aligner::SubprocessRunner;
use bt2tax_rs::config::{ClassifyConfig, IndexConfig};
use bt2tax_rs::errors::Result;
use bt2tax_rs::types::ChunkBuildStatus;
use bt2tax_rs::{build_index, classify_reads};

/// Exit code when at least one index chunk failed to build.
const CHUNK_BUILD_FAILED: u8 = 4;

#[derive(Parser)]
#[command(name = "bt2tax-rs", version)]
#[command(about = "Metagenomics wrapper around bowtie2")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Align query reads and write the taxa each read matched
    Classify(ClassifyConfig),
    /// Split a reference FASTA by tax ID and build one bowtie2 index per chunk
    Index(IndexConfig),
}

/// Spinners and log records share stderr, so a ticking spinner is only drawn
/// when info records are filtered out.
fn spinner_visible(level: LevelFilter) -> bool {
    level < LevelFilter::Info
}

fn spinner(color: &str, msg: &'static str) -> ProgressBar {
    if !spinner_visible(log::max_level()) {
        log::info!("{msg}");
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    let template = format!("{{spinner:.{color}}} {{msg}}");
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
        .template(&template)
    {
        spinner.set_style(style);
    }
    spinner.set_message(msg);
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));
    spinner
}

fn run_classify(config: &ClassifyConfig) -> Result<u8> {
    config.validate()?;

    let bar = spinner("green", "Running alignment and parsing results...");
    let results = classify_reads(config, &mut SubprocessRunner);
    bar.finish_and_clear();
    let results = results?;

    let bar = spinner("yellow", "Writing results...");
    results.write_to(&config.output)?;
    bar.finish_with_message("Results written.");
    Ok(0)
}

fn run_index(config: &IndexConfig) -> Result<u8> {
    config.validate()?;

    let bar = spinner("blue", "Splitting reference and building indices...");
    let report = build_index(config, &mut SubprocessRunner);
    bar.finish_and_clear();
    let report = report?;

    for build in &report.builds {
        match &build.status {
            ChunkBuildStatus::Built => println!("chunk {}\tbuilt\t{}", build.index, build.index_prefix),
            ChunkBuildStatus::Skipped => println!("chunk {}\tskipped (empty)", build.index),
            ChunkBuildStatus::Failed { exit_code, .. } => println!(
                "chunk {}\tfailed\t{}",
                build.index,
                exit_code.map_or_else(|| "signal".to_string(), |c| c.to_string())
            ),
        }
    }

    if report.all_built() {
        Ok(0)
    } else {
        log::error!("{} index chunk(s) failed to build", report.failed().count());
        Ok(CHUNK_BUILD_FAILED)
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let outcome = match &cli.command {
        Commands::Classify(config) => run_classify(config),
        Commands::Index(config) => run_index(config),
    };

    match outcome {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            log::error!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}
