//! epo-processor - EPO bulk-data pipeline CLI
//!
//! Downloads one product of the EPO bulk-data catalog, extracts the
//! delivered archives, and parses the patent documents into a CSV
//! summary. Without a subcommand every enabled stage runs in order.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod overrides;
mod summary;

use epo_pipeline::Config;
use overrides::Overrides;

#[derive(Parser)]
#[command(name = "epo-processor")]
#[command(about = "EPO bulk-data processor: download, extract and parse patent publications")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Config file path (toml/yaml/json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,
}

#[derive(Subcommand)]
enum Command {
    /// Download catalog items only
    Download,
    /// Extract downloaded archives only
    Extract,
    /// Parse extracted XML into the output CSV only
    Parse,
    /// Print the build version
    Version,
    /// Config operations
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as indented JSON
    Print,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if matches!(cli.command, Some(Command::Version)) {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let mut config = Config::load(cli.config.as_deref())?;
    cli.overrides.apply(&mut config);
    config.validate()?;

    if let Some(Command::Config {
        action: ConfigAction::Print,
    }) = &cli.command
    {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let progress = Arc::new(epo_core::ProgressContext::new());

    std::fs::create_dir_all(&config.log.log_dir).context("create log directory")?;
    let log_file = config.log.log_dir.join(format!(
        "epo-processor[{}].log",
        chrono::Local::now().format("%Y%m%d-%H%M%S")
    ));

    let multi = if progress.is_tty() {
        Some(progress.multi())
    } else {
        None
    };
    epo_core::init_logging(&config.log.log_level, Some(log_file.as_path()), multi);

    epo_core::set_http_config(epo_core::HttpConfig {
        request_timeout: Duration::from_secs(config.server.timeout),
    });
    epo_pipeline::metrics::register_metrics();
    epo_core::install_signal_handlers();

    match cli.command {
        None => {
            let report = epo_pipeline::run_pipeline(&config, &progress)?;
            summary::print_report(&report);
        }
        Some(Command::Download) => {
            let download = epo_pipeline::runner::run_download(&config, &progress)?;
            summary::print_download(&download);
            log::info!("Download completed");
        }
        Some(Command::Extract) => {
            let extract = epo_pipeline::runner::run_extract(&config, &progress)?;
            summary::print_extract(&extract);
            log::info!("Extraction completed");
        }
        Some(Command::Parse) => {
            let parse = epo_pipeline::runner::run_parse(&config, &progress)?;
            summary::print_parse(&parse);
            log::info!("Parsing completed");
        }
        Some(Command::Version) | Some(Command::Config { .. }) => unreachable!(),
    }

    Ok(())
}
