//! Bulk file fetcher
//!
//! Downloads every catalog item under bounded concurrency: a semaphore
//! permit per in-flight file, retry with exponential backoff around each
//! one, skip-if-valid resumption against the catalog SHA-1, and a single
//! byte-denominated progress bar for the whole session.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use epo_core::progress::SharedProgress;
use epo_core::{
    Semaphore, checksum_matches, is_shutdown_requested, open_body_reader, retry_with_backoff,
    sha1_file,
};
use indicatif::ProgressBar;
use metrics::{counter, histogram};
use rayon::prelude::*;

use crate::catalog::{build_descriptors, fetch_product};
use crate::config::Config;
use crate::error::{ErrorSlot, PipelineError};
use crate::metrics as m;
use crate::models::DownloadDescriptor;

const COPY_BUF_SIZE: usize = 64 * 1024;

/// Download session result.
#[derive(Debug)]
pub struct DownloadSummary {
    pub total_files: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Bytes per completed item, in completion order. Skipped items
    /// report their expected size.
    pub item_bytes: Vec<u64>,
    /// Bytes actually fetched over the network.
    pub bytes_downloaded: u64,
    pub elapsed: Duration,
}

/// Fetch every item of the configured product.
///
/// Items already in flight finish even after another item has failed;
/// the first failure becomes the session error once the pool drains.
pub fn fetch_all(cfg: &Config, progress: &SharedProgress) -> Result<DownloadSummary, PipelineError> {
    let start = Instant::now();
    let _span = tracing::info_span!(
        "download.session",
        product_id = cfg.server.product_id,
        concurrent = cfg.server.concurrent_downloads,
        max_retries = cfg.server.max_retries,
    )
    .entered();

    if is_shutdown_requested() {
        return Err(PipelineError::Cancelled);
    }

    fs::create_dir_all(&cfg.download.directory)?;

    log::info!(
        "Starting bulk download session: product_id={}, concurrent={}",
        cfg.server.product_id,
        cfg.server.concurrent_downloads
    );

    let product = fetch_product(&cfg.server.base_url, cfg.server.product_id)?;
    if is_shutdown_requested() {
        return Err(PipelineError::Cancelled);
    }

    let descriptors = build_descriptors(&product, &cfg.server.base_url, &cfg.download.directory);
    let total_files = descriptors.len();
    let total_bytes: u64 = descriptors.iter().map(|d| d.expected_size).sum();
    counter!(m::DOWNLOAD_FILES_TOTAL).increment(total_files as u64);
    log::info!("Catalog lists {total_files} items ({total_bytes} bytes expected)");

    let pb = progress.bytes_bar(
        total_bytes,
        format!("[0/{total_files} completed] Downloading files..."),
    );

    let semaphore = Semaphore::new(cfg.server.concurrent_downloads);
    let completed = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let bytes_downloaded = AtomicU64::new(0);
    let first_error = ErrorSlot::default();
    let item_bytes: Mutex<Vec<u64>> = Mutex::new(Vec::with_capacity(total_files));

    descriptors.par_iter().for_each(|descriptor| {
        if is_shutdown_requested() {
            first_error.record(PipelineError::Cancelled);
            return;
        }
        let _permit = semaphore.acquire();

        match download_one(descriptor, cfg, &pb, &bytes_downloaded) {
            Ok(size) => {
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                pb.set_message(format!("[{done}/{total_files} completed] Downloading files..."));
                item_bytes.lock().unwrap().push(size);
            }
            Err(e) => {
                if !e.is_cancelled() {
                    counter!(m::DOWNLOAD_FILES_FAILED).increment(1);
                    log::error!("{}: {e}", descriptor.filename);
                }
                failed.fetch_add(1, Ordering::Relaxed);
                first_error.record(e);
            }
        }
    });

    pb.finish_with_message("Download complete");

    let elapsed = start.elapsed();
    let status = if total_files == 0 { "empty" } else { "success" };
    histogram!(m::DOWNLOAD_SESSION_DURATION, "status" => status)
        .record(elapsed.as_millis() as f64);

    if let Some(e) = first_error.take() {
        if e.is_cancelled() {
            log::warn!("Download session cancelled");
        }
        return Err(e);
    }

    let summary = DownloadSummary {
        total_files,
        succeeded: completed.load(Ordering::Relaxed),
        failed: failed.load(Ordering::Relaxed),
        item_bytes: item_bytes.into_inner().unwrap(),
        bytes_downloaded: bytes_downloaded.load(Ordering::Relaxed),
        elapsed,
    };
    log::info!(
        "Download session complete: {}/{} files, {} bytes fetched in {:.1}s",
        summary.succeeded,
        summary.total_files,
        summary.bytes_downloaded,
        summary.elapsed.as_secs_f64()
    );
    Ok(summary)
}

/// Fetch one item: skip path, then retried download.
fn download_one(
    descriptor: &DownloadDescriptor,
    cfg: &Config,
    pb: &ProgressBar,
    bytes_downloaded: &AtomicU64,
) -> Result<u64, PipelineError> {
    let _span = tracing::info_span!("download.file", file = %descriptor.filename).entered();
    let start = Instant::now();

    if is_shutdown_requested() {
        return Err(PipelineError::Cancelled);
    }

    if cfg.download.skip_exists && descriptor.file_path.exists() {
        match checksum_matches(&descriptor.file_path, &descriptor.checksum) {
            Ok(true) => {
                log::debug!("{}: existing file is valid, skipping", descriptor.filename);
                pb.inc(descriptor.expected_size);
                counter!(m::DOWNLOAD_FILES_SUCCESS).increment(1);
                histogram!(m::DOWNLOAD_FILE_DURATION, "status" => "skipped")
                    .record(start.elapsed().as_millis() as f64);
                return Ok(descriptor.expected_size);
            }
            Ok(false) => {
                log::debug!(
                    "{}: existing file is invalid, re-downloading",
                    descriptor.filename
                );
            }
            Err(e) => {
                log::debug!(
                    "{}: cannot verify existing file ({e}), re-downloading",
                    descriptor.filename
                );
            }
        }
        let _ = fs::remove_file(&descriptor.file_path);
    }

    let result = retry_with_backoff(&descriptor.filename, cfg.server.max_retries, || {
        attempt_download(descriptor, cfg, pb)
    });

    match result {
        Ok(size) => {
            bytes_downloaded.fetch_add(size, Ordering::Relaxed);
            counter!(m::DOWNLOAD_FILES_SUCCESS).increment(1);
            counter!(m::DOWNLOAD_BYTES_TOTAL).increment(size);
            histogram!(m::DOWNLOAD_FILE_DURATION, "status" => "success")
                .record(start.elapsed().as_millis() as f64);
            Ok(size)
        }
        Err(e) => {
            histogram!(m::DOWNLOAD_FILE_DURATION, "status" => "failed")
                .record(start.elapsed().as_millis() as f64);
            Err(e)
        }
    }
}

/// One attempt: GET, stream the body to disk, optional verification.
/// Nothing half-written survives a failed attempt.
fn attempt_download(
    descriptor: &DownloadDescriptor,
    cfg: &Config,
    pb: &ProgressBar,
) -> Result<u64, PipelineError> {
    if is_shutdown_requested() {
        return Err(PipelineError::Cancelled);
    }

    let result = stream_to_file(descriptor, cfg, pb);
    if result.is_err() {
        let _ = fs::remove_file(&descriptor.file_path);
    }
    result
}

fn stream_to_file(
    descriptor: &DownloadDescriptor,
    cfg: &Config,
    pb: &ProgressBar,
) -> Result<u64, PipelineError> {
    let (mut reader, _content_length) =
        open_body_reader(&descriptor.url).map_err(|source| PipelineError::Download {
            url: descriptor.url.clone(),
            source,
        })?;

    let file = File::create(&descriptor.file_path)?;
    let mut writer = BufWriter::new(file);
    let mut buffer = vec![0u8; COPY_BUF_SIZE];
    let mut copied: u64 = 0;

    loop {
        if is_shutdown_requested() {
            return Err(PipelineError::Cancelled);
        }
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                return Err(PipelineError::Download {
                    url: descriptor.url.clone(),
                    source: e.into(),
                });
            }
        };
        writer.write_all(&buffer[..n])?;
        copied += n as u64;
        pb.inc(n as u64);
    }
    writer.flush()?;
    drop(writer);

    if cfg.download.verify_sha1 && !descriptor.checksum.is_empty() {
        let actual = sha1_file(&descriptor.file_path)?;
        if !actual.eq_ignore_ascii_case(descriptor.checksum.trim()) {
            return Err(PipelineError::Checksum {
                path: descriptor.file_path.clone(),
                expected: descriptor.checksum.clone(),
                actual,
            });
        }
    }

    Ok(copied)
}
