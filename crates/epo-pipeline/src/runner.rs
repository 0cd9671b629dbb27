//! Pipeline orchestration: Download → Extract → Parse
//!
//! Stages run sequentially, each gated by its enable flag; the first
//! stage error stops the pipeline. Signal handling and telemetry wiring
//! belong to the binary, not here.

use anyhow::{Context, Result};
use epo_core::progress::SharedProgress;

use crate::config::Config;
use crate::extract::{self, ExtractSummary};
use crate::fetch::{self, DownloadSummary};
use crate::parse::{self, ParseSummary};

/// Summaries of the stages that actually ran.
#[derive(Debug, Default)]
pub struct PipelineReport {
    pub download: Option<DownloadSummary>,
    pub extract: Option<ExtractSummary>,
    pub parse: Option<ParseSummary>,
}

/// Run every enabled stage in order.
pub fn run_pipeline(cfg: &Config, progress: &SharedProgress) -> Result<PipelineReport> {
    let mut report = PipelineReport::default();

    if cfg.download.enabled {
        report.download = Some(run_download(cfg, progress)?);
    }
    if cfg.extract.enabled {
        report.extract = Some(run_extract(cfg, progress)?);
    }
    if cfg.parse.enabled {
        report.parse = Some(run_parse(cfg, progress)?);
    }

    log::info!("All steps completed");
    Ok(report)
}

pub fn run_download(cfg: &Config, progress: &SharedProgress) -> Result<DownloadSummary> {
    fetch::fetch_all(cfg, progress).context("download stage failed")
}

pub fn run_extract(cfg: &Config, progress: &SharedProgress) -> Result<ExtractSummary> {
    extract::extract_all(cfg, progress).context("extract stage failed")
}

pub fn run_parse(cfg: &Config, progress: &SharedProgress) -> Result<ParseSummary> {
    parse::parse_all(cfg, progress).context("parse stage failed")
}
