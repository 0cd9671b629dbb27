//! Archive unpacker
//!
//! Top-level ZIP archives extract in parallel into sibling directories;
//! each destination tree is then re-walked for nested ZIPs until a pass
//! finds none. Consumed archives are deleted when configured, otherwise a
//! visited set keeps the fixpoint from re-extracting them forever.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use epo_core::is_shutdown_requested;
use epo_core::progress::SharedProgress;
use indicatif::ProgressBar;
use metrics::{counter, histogram};
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{ErrorSlot, PipelineError};
use crate::metrics as m;

/// Extraction session result.
#[derive(Debug)]
pub struct ExtractSummary {
    pub archives: usize,
    pub nested_archives: u64,
    pub files_extracted: u64,
    pub bytes_extracted: u64,
    pub elapsed: Duration,
}

#[derive(Default)]
struct ExtractStats {
    nested: AtomicU64,
    files: AtomicU64,
    bytes: AtomicU64,
}

/// Extract every ZIP in the download directory, recursively.
pub fn extract_all(
    cfg: &Config,
    progress: &SharedProgress,
) -> Result<ExtractSummary, PipelineError> {
    let dir = &cfg.download.directory;
    let delete_after = cfg.extract.delete_after_extract;
    let start = Instant::now();
    let _span =
        tracing::info_span!("extract.session", dir = %dir.display(), delete_after).entered();

    if is_shutdown_requested() {
        return Err(PipelineError::Cancelled);
    }

    log::info!(
        "Starting extraction in {} (delete_after={delete_after})",
        dir.display()
    );

    let archives = find_zips_top_level(dir)?;
    counter!(m::EXTRACT_ZIPS_TOTAL, "kind" => "top").increment(archives.len() as u64);

    if archives.is_empty() {
        log::info!("No zip archives found in {}", dir.display());
    } else {
        log::info!("Found {} zip archives to extract", archives.len());
    }

    let pb = progress.spinner(format!(
        "[0 extracted] Processing {} zip archives...",
        archives.len()
    ));

    let stats = ExtractStats::default();
    let first_error = ErrorSlot::default();

    archives.par_iter().for_each(|archive| {
        if is_shutdown_requested() {
            first_error.record(PipelineError::Cancelled);
            return;
        }
        if let Err(e) = process_archive(archive, delete_after, &stats, &pb) {
            if !e.is_cancelled() {
                counter!(m::EXTRACT_ZIPS_FAILED).increment(1);
                log::error!("{}: {e}", archive.display());
            }
            first_error.record(e);
        }
    });

    pb.finish_with_message("Extraction complete");

    let elapsed = start.elapsed();
    let files_extracted = stats.files.load(Ordering::Relaxed);
    let status = if files_extracted == 0 { "empty" } else { "success" };
    histogram!(m::EXTRACT_SESSION_DURATION, "status" => status).record(elapsed.as_millis() as f64);

    if let Some(e) = first_error.take() {
        if e.is_cancelled() {
            log::warn!("Extraction session cancelled");
        }
        return Err(e);
    }

    let summary = ExtractSummary {
        archives: archives.len(),
        nested_archives: stats.nested.load(Ordering::Relaxed),
        files_extracted,
        bytes_extracted: stats.bytes.load(Ordering::Relaxed),
        elapsed,
    };
    log::info!(
        "Extraction complete: {} archives ({} nested), {} files, {} bytes",
        summary.archives,
        summary.nested_archives,
        summary.files_extracted,
        summary.bytes_extracted
    );
    Ok(summary)
}

/// One top-level archive: extract into a sibling directory, then run the
/// nested fixpoint under it.
fn process_archive(
    archive: &Path,
    delete_after: bool,
    stats: &ExtractStats,
    pb: &ProgressBar,
) -> Result<(), PipelineError> {
    let _span = tracing::info_span!("extract.zip", zip = %archive.display()).entered();
    let start = Instant::now();

    let base_name = archive
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive".to_string());
    let dest_dir = archive
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(&base_name);

    log::info!(
        "Extracting {} into {}",
        archive.display(),
        dest_dir.display()
    );
    extract_zip_to_dir(archive, &dest_dir, stats, pb)?;
    extract_nested(&dest_dir, delete_after, stats, pb)?;

    if delete_after {
        match fs::remove_file(archive) {
            Ok(()) => log::debug!("Deleted {}", archive.display()),
            Err(e) => log::warn!("Failed to delete {}: {e}", archive.display()),
        }
    }

    histogram!(m::EXTRACT_FILE_DURATION, "status" => "success")
        .record(start.elapsed().as_millis() as f64);
    Ok(())
}

/// Repeatedly walk `root` for ZIPs and extract each next to itself until
/// a pass finds nothing new. Extracted archives leave the candidate set
/// either by deletion or through the visited set.
fn extract_nested(
    root: &Path,
    delete_after: bool,
    stats: &ExtractStats,
    pb: &ProgressBar,
) -> Result<(), PipelineError> {
    let mut visited: HashSet<PathBuf> = HashSet::new();

    loop {
        if is_shutdown_requested() {
            return Err(PipelineError::Cancelled);
        }

        let pending: Vec<PathBuf> = find_zips_recursive(root)?
            .into_iter()
            .filter(|p| !visited.contains(&canonical_key(p)))
            .collect();
        if pending.is_empty() {
            break;
        }
        log::debug!("Found {} nested archives under {}", pending.len(), root.display());

        for zip_path in pending {
            if is_shutdown_requested() {
                return Err(PipelineError::Cancelled);
            }
            let _span =
                tracing::info_span!("extract.nested_zip", zip = %zip_path.display()).entered();
            counter!(m::EXTRACT_ZIPS_TOTAL, "kind" => "nested").increment(1);

            let dest_dir = zip_path.parent().unwrap_or(root).to_path_buf();
            if let Err(e) = extract_zip_to_dir(&zip_path, &dest_dir, stats, pb) {
                counter!(m::EXTRACT_ZIPS_FAILED).increment(1);
                return Err(e);
            }
            stats.nested.fetch_add(1, Ordering::Relaxed);

            if delete_after {
                if let Err(e) = fs::remove_file(&zip_path) {
                    log::warn!("Failed to delete {}: {e}", zip_path.display());
                    // still must leave the candidate set
                    visited.insert(canonical_key(&zip_path));
                } else {
                    log::debug!("Deleted {}", zip_path.display());
                }
            } else {
                visited.insert(canonical_key(&zip_path));
            }
        }
    }

    Ok(())
}

fn canonical_key(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Non-recursive `*.zip` listing of one directory.
fn find_zips_top_level(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let mut zips = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && has_zip_extension(&path) {
            zips.push(path);
        }
    }
    Ok(zips)
}

/// Recursive `*.zip` listing of a tree.
fn find_zips_recursive(root: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let mut zips = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| PipelineError::Archive {
            path: root.to_path_buf(),
            message: format!("walk failed: {e}"),
        })?;
        if entry.file_type().is_file() && has_zip_extension(entry.path()) {
            zips.push(entry.into_path());
        }
    }
    Ok(zips)
}

fn has_zip_extension(path: &Path) -> bool {
    path.extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("zip"))
}

/// Extract one archive into `dest_dir`, byte for byte.
///
/// Entries whose name resolves outside `dest_dir` fail the archive.
fn extract_zip_to_dir(
    archive_path: &Path,
    dest_dir: &Path,
    stats: &ExtractStats,
    pb: &ProgressBar,
) -> Result<(), PipelineError> {
    log::debug!(
        "Opening archive {} -> {}",
        archive_path.display(),
        dest_dir.display()
    );

    let file = File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| PipelineError::Archive {
        path: archive_path.to_path_buf(),
        message: format!("cannot read archive: {e}"),
    })?;

    fs::create_dir_all(dest_dir)?;

    for index in 0..archive.len() {
        if is_shutdown_requested() {
            return Err(PipelineError::Cancelled);
        }

        let mut entry = archive.by_index(index).map_err(|e| PipelineError::Archive {
            path: archive_path.to_path_buf(),
            message: format!("cannot read entry {index}: {e}"),
        })?;

        let Some(relative) = entry.enclosed_name() else {
            return Err(PipelineError::Archive {
                path: archive_path.to_path_buf(),
                message: format!("entry {:?} escapes the destination directory", entry.name()),
            });
        };
        let out_path = dest_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&out_path)?;
        let written = io::copy(&mut entry, &mut out)?;

        counter!(m::EXTRACT_FILES_TOTAL).increment(1);
        counter!(m::EXTRACT_BYTES_TOTAL).increment(written);
        stats.bytes.fetch_add(written, Ordering::Relaxed);
        let total = stats.files.fetch_add(1, Ordering::Relaxed) + 1;
        pb.set_message(format!("[{total} extracted] {}", entry.name()));
    }

    log::debug!(
        "Extracted {} entries from {}",
        archive.len(),
        archive_path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Arc;

    use epo_core::ProgressContext;
    use zip::write::SimpleFileOptions;

    fn test_config(dir: &Path, delete_after: bool) -> Config {
        let mut cfg = Config::default();
        cfg.server.base_url = "http://localhost".into();
        cfg.download.directory = dir.to_path_buf();
        cfg.extract.delete_after_extract = delete_after;
        cfg
    }

    fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (name, content) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        std::fs::write(path, zip_bytes(entries)).unwrap();
    }

    fn count_by_extension(root: &Path, ext: &str) -> usize {
        WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.path()
                    .extension()
                    .map_or(false, |x| x.eq_ignore_ascii_case(ext))
            })
            .count()
    }

    #[test]
    fn extracts_nested_zip_and_deletes_archives() {
        let dir = tempfile::tempdir().unwrap();
        let inner = zip_bytes(&[("inner.xml", b"<doc/>" as &[u8])]);
        write_zip(
            &dir.path().join("outer.zip"),
            &[
                ("a.xml", b"<a/>" as &[u8]),
                ("b.xml", b"<b/>"),
                ("nested.zip", inner.as_slice()),
            ],
        );

        let cfg = test_config(dir.path(), true);
        let progress = Arc::new(ProgressContext::new());
        let summary = extract_all(&cfg, &progress).unwrap();

        assert_eq!(summary.archives, 1);
        assert_eq!(summary.nested_archives, 1);
        assert_eq!(count_by_extension(dir.path(), "xml"), 3);
        assert_eq!(count_by_extension(dir.path(), "zip"), 0);
    }

    #[test]
    fn without_delete_archives_remain_and_fixpoint_terminates() {
        let dir = tempfile::tempdir().unwrap();
        let inner = zip_bytes(&[("inner.xml", b"<doc/>" as &[u8])]);
        write_zip(
            &dir.path().join("outer.zip"),
            &[("a.xml", b"<a/>" as &[u8]), ("nested.zip", inner.as_slice())],
        );

        let cfg = test_config(dir.path(), false);
        let progress = Arc::new(ProgressContext::new());
        let summary = extract_all(&cfg, &progress).unwrap();

        assert_eq!(summary.nested_archives, 1);
        assert_eq!(count_by_extension(dir.path(), "xml"), 2);
        // outer and nested archives are both still on disk
        assert_eq!(count_by_extension(dir.path(), "zip"), 2);
    }

    #[test]
    fn doubly_nested_zip_is_reached() {
        let dir = tempfile::tempdir().unwrap();
        let innermost = zip_bytes(&[("deep.xml", b"<d/>" as &[u8])]);
        let inner = zip_bytes(&[("mid.zip", innermost.as_slice())]);
        write_zip(&dir.path().join("outer.zip"), &[("level1.zip", inner.as_slice())]);

        let cfg = test_config(dir.path(), true);
        let progress = Arc::new(ProgressContext::new());
        let summary = extract_all(&cfg, &progress).unwrap();

        assert_eq!(summary.nested_archives, 2);
        assert_eq!(count_by_extension(dir.path(), "xml"), 1);
        assert_eq!(count_by_extension(dir.path(), "zip"), 0);
    }

    #[test]
    fn directory_entries_are_created() {
        let dir = tempfile::tempdir().unwrap();
        write_zip(
            &dir.path().join("tree.zip"),
            &[("sub/deeper/doc.xml", b"<doc/>" as &[u8])],
        );

        let cfg = test_config(dir.path(), false);
        let progress = Arc::new(ProgressContext::new());
        extract_all(&cfg, &progress).unwrap();

        assert!(dir.path().join("tree/sub/deeper/doc.xml").is_file());
    }

    #[test]
    fn escaping_entry_fails_the_archive() {
        let dir = tempfile::tempdir().unwrap();
        write_zip(
            &dir.path().join("evil.zip"),
            &[("../escape.txt", b"nope" as &[u8])],
        );

        let cfg = test_config(dir.path(), false);
        let progress = Arc::new(ProgressContext::new());
        let err = extract_all(&cfg, &progress).unwrap_err();
        assert!(matches!(err, PipelineError::Archive { .. }));
        assert!(!dir.path().parent().unwrap().join("escape.txt").exists());
    }

    #[test]
    fn corrupt_archive_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.zip"), b"this is not a zip").unwrap();

        let cfg = test_config(dir.path(), false);
        let progress = Arc::new(ProgressContext::new());
        let err = extract_all(&cfg, &progress).unwrap_err();
        assert!(matches!(err, PipelineError::Archive { .. }));
    }

    #[test]
    fn empty_directory_is_an_empty_success() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path(), false);
        let progress = Arc::new(ProgressContext::new());
        let summary = extract_all(&cfg, &progress).unwrap();
        assert_eq!(summary.archives, 0);
        assert_eq!(summary.files_extracted, 0);
    }

    #[test]
    fn only_top_level_listing_ignores_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("deeper")).unwrap();
        write_zip(
            &dir.path().join("deeper/hidden.zip"),
            &[("x.xml", b"<x/>" as &[u8])],
        );

        let zips = find_zips_top_level(dir.path()).unwrap();
        assert!(zips.is_empty());
    }

    #[test]
    fn zip_extension_matching_is_case_insensitive() {
        assert!(has_zip_extension(Path::new("A.ZIP")));
        assert!(has_zip_extension(Path::new("a.Zip")));
        assert!(!has_zip_extension(Path::new("a.zip.txt")));
        assert!(!has_zip_extension(Path::new("azip")));
    }
}
