//! Parse stage driver
//!
//! Walks the download directory for XML files, parses them on a bounded
//! worker pool, and appends one CSV row per exchange document. Rows of a
//! single file keep document order; rows across files interleave freely.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use epo_core::progress::SharedProgress;
use epo_core::{Semaphore, is_shutdown_requested};
use metrics::{counter, histogram};
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{ErrorSlot, PipelineError};
use crate::metrics as m;
use crate::parser::parse_exchange_documents;
use crate::sink::CsvSink;
use crate::transform::csv_row;

/// Parse session result.
#[derive(Debug)]
pub struct ParseSummary {
    pub total_files: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub records: u64,
    pub elapsed: Duration,
}

/// Parse every XML file under the download directory into the output CSV.
pub fn parse_all(cfg: &Config, progress: &SharedProgress) -> Result<ParseSummary, PipelineError> {
    let start = Instant::now();
    let _span = tracing::info_span!(
        "parse.session",
        dir = %cfg.download.directory.display(),
        output = %cfg.parse.output_csv.display(),
        workers = cfg.parse.workers,
    )
    .entered();

    if is_shutdown_requested() {
        return Err(PipelineError::Cancelled);
    }

    log::info!(
        "Starting parsing session: dir={}, output={}",
        cfg.download.directory.display(),
        cfg.parse.output_csv.display()
    );

    let xml_files = find_xml_files(&cfg.download.directory);
    let total_files = xml_files.len();
    counter!(m::PARSE_XML_FILES_TOTAL).increment(total_files as u64);
    log::info!("Found {total_files} XML files");

    let sink = CsvSink::create(&cfg.parse.output_csv)?;
    let pb = progress.count_bar(
        total_files as u64,
        "[0 records] Parsing XML files...".to_string(),
    );

    let semaphore = Semaphore::new(cfg.parse.workers.max(1));
    let first_error = ErrorSlot::default();
    let records = AtomicU64::new(0);
    let succeeded = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);

    xml_files.par_iter().for_each(|path| {
        if is_shutdown_requested() {
            first_error.record(PipelineError::Cancelled);
            return;
        }
        let _permit = semaphore.acquire();
        let file_start = Instant::now();

        match process_file(path, &sink, &records) {
            Ok(_count) => {
                succeeded.fetch_add(1, Ordering::Relaxed);
                counter!(m::PARSE_XML_FILES_SUCCESS).increment(1);
                histogram!(m::PARSE_FILE_DURATION, "status" => "success")
                    .record(file_start.elapsed().as_millis() as f64);
            }
            Err(e) => {
                if !e.is_cancelled() {
                    counter!(m::PARSE_XML_FILES_FAILED).increment(1);
                    log::error!("{e}");
                }
                failed.fetch_add(1, Ordering::Relaxed);
                histogram!(m::PARSE_FILE_DURATION, "status" => "failed")
                    .record(file_start.elapsed().as_millis() as f64);
                first_error.record(e);
            }
        }

        pb.inc(1);
        pb.set_message(format!(
            "[{} records] Parsing XML files...",
            records.load(Ordering::Relaxed)
        ));
    });

    pb.finish_with_message("Parsing complete");

    if let Some(e) = first_error.take() {
        if e.is_cancelled() {
            log::warn!("Parsing cancelled");
        }
        return Err(e);
    }

    let elapsed = start.elapsed();
    let status = if total_files == 0 { "empty" } else { "success" };
    histogram!(m::PARSE_SESSION_DURATION, "status" => status).record(elapsed.as_millis() as f64);

    let summary = ParseSummary {
        total_files,
        succeeded: succeeded.load(Ordering::Relaxed),
        failed: failed.load(Ordering::Relaxed),
        records: records.load(Ordering::Relaxed),
        elapsed,
    };
    log::info!(
        "Parsing completed: {} records from {}/{} files in {:.1}s",
        summary.records,
        summary.succeeded,
        summary.total_files,
        summary.elapsed.as_secs_f64()
    );
    Ok(summary)
}

/// Parse one file and append its rows. The whole file is rejected on the
/// first offending document.
fn process_file(
    path: &Path,
    sink: &CsvSink,
    records: &AtomicU64,
) -> Result<usize, PipelineError> {
    let _span = tracing::info_span!("parse.file", file = %path.display()).entered();

    if is_shutdown_requested() {
        return Err(PipelineError::Cancelled);
    }

    counter!(m::PARSE_BYTES_TOTAL).increment(fs::metadata(path)?.len());
    let xml = fs::read_to_string(path)?;

    if is_shutdown_requested() {
        return Err(PipelineError::Cancelled);
    }

    let documents = parse_exchange_documents(&xml).map_err(|source| PipelineError::Xml {
        path: path.to_path_buf(),
        source,
    })?;

    let mut written = 0usize;
    for doc in &documents {
        if is_shutdown_requested() {
            return Err(PipelineError::Cancelled);
        }
        sink.append(&csv_row(doc))?;
        written += 1;
    }
    sink.flush()?;

    counter!(m::PARSE_RECORDS_TOTAL).increment(written as u64);
    let total = records.fetch_add(written as u64, Ordering::Relaxed) + written as u64;
    if total > 0 && total % 100 == 0 {
        log::info!("Processed {total} records");
    }

    Ok(written)
}

/// Depth-first walk for regular files with a (case-insensitive) `.xml`
/// extension. Unreadable paths are logged and skipped.
fn find_xml_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir) {
        match entry {
            Ok(entry) => {
                let path = entry.path();
                if entry.file_type().is_file()
                    && path
                        .extension()
                        .map_or(false, |ext| ext.eq_ignore_ascii_case("xml"))
                {
                    files.push(entry.into_path());
                }
            }
            Err(e) => log::warn!("Error accessing path: {e}"),
        }
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use epo_core::ProgressContext;

    fn test_config(dir: &Path, output: &Path) -> Config {
        let mut cfg = Config::default();
        cfg.server.base_url = "http://localhost".into();
        cfg.download.directory = dir.to_path_buf();
        cfg.parse.output_csv = output.to_path_buf();
        cfg.parse.workers = 2;
        cfg
    }

    fn read_rows(path: &Path) -> Vec<csv::StringRecord> {
        let mut reader = csv::Reader::from_path(path).unwrap();
        reader.records().map(|r| r.unwrap()).collect()
    }

    const DOC_WITH_DUPLICATE_CPC: &str = r#"<?xml version="1.0"?>
<root>
  <exchange-document country="EP" doc-number="1000000" kind="A1" status="A">
    <patent-classification>
      <classification-scheme scheme="CPCI"/>
      <classification-symbol>H04L 9/00</classification-symbol>
    </patent-classification>
    <patent-classification>
      <classification-scheme scheme="CPCI"/>
      <classification-symbol>H04L 9/00</classification-symbol>
    </patent-classification>
  </exchange-document>
</root>"#;

    const DOC_WITH_CITATIONS: &str = r#"<?xml version="1.0"?>
<root>
  <exchange-document country="EP" doc-number="2" kind="B1" status="N">
    <references-cited>
      <citation>
        <patcit><document-id><country/><doc-number/><kind/></document-id></patcit>
        <category>A</category>
      </citation>
      <citation>
        <patcit><document-id>
          <country>US</country><doc-number>1234</doc-number><kind>A1</kind>
        </document-id></patcit>
        <category>X</category>
        <category>Y</category>
      </citation>
    </references-cited>
  </exchange-document>
</root>"#;

    #[test]
    fn duplicate_cpc_symbols_collapse_to_one() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("doc.xml"), DOC_WITH_DUPLICATE_CPC).unwrap();
        let output = dir.path().join("out.csv");

        let cfg = test_config(dir.path(), &output);
        let progress = Arc::new(ProgressContext::new());
        let summary = parse_all(&cfg, &progress).unwrap();

        assert_eq!(summary.records, 1);
        let rows = read_rows(&output);
        assert_eq!(&rows[0][0], "EP1000000A1");
        assert_eq!(&rows[0][2], "H04L 9/00");
    }

    #[test]
    fn empty_cited_ids_are_dropped_from_the_row() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("doc.xml"), DOC_WITH_CITATIONS).unwrap();
        let output = dir.path().join("out.csv");

        let cfg = test_config(dir.path(), &output);
        let progress = Arc::new(ProgressContext::new());
        parse_all(&cfg, &progress).unwrap();

        let rows = read_rows(&output);
        assert_eq!(&rows[0][3], "US1234A1 (X,Y)");
    }

    #[test]
    fn rejected_file_fails_the_stage_but_not_the_siblings() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.xml"), DOC_WITH_DUPLICATE_CPC).unwrap();
        std::fs::write(
            dir.path().join("bad.xml"),
            r#"<exchange-document country="EP" doc-number="1" kind="A1"></exchange-document>"#,
        )
        .unwrap();
        let output = dir.path().join("out.csv");

        let cfg = test_config(dir.path(), &output);
        let progress = Arc::new(ProgressContext::new());
        let err = parse_all(&cfg, &progress).unwrap_err();
        assert!(matches!(err, PipelineError::Xml { .. }));
    }

    #[test]
    fn discovery_is_recursive_and_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub/deeper")).unwrap();
        std::fs::write(dir.path().join("sub/deeper/a.XML"), DOC_WITH_DUPLICATE_CPC).unwrap();
        std::fs::write(dir.path().join("b.xml"), DOC_WITH_CITATIONS).unwrap();
        std::fs::write(dir.path().join("ignored.txt"), "not xml").unwrap();

        let files = find_xml_files(dir.path());
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn empty_directory_still_writes_the_header() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.csv");

        let cfg = test_config(dir.path(), &output);
        let progress = Arc::new(ProgressContext::new());
        let summary = parse_all(&cfg, &progress).unwrap();

        assert_eq!(summary.total_files, 0);
        assert_eq!(summary.records, 0);
        let content = std::fs::read_to_string(&output).unwrap();
        assert_eq!(
            content,
            "patent_id,status,cpc_list,citations,family_patents\n"
        );
    }

    #[test]
    fn source_files_are_not_mutated() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("doc.xml");
        std::fs::write(&src, DOC_WITH_DUPLICATE_CPC).unwrap();
        let before = epo_core::sha1_file(&src).unwrap();

        let cfg = test_config(dir.path(), &dir.path().join("out.csv"));
        let progress = Arc::new(ProgressContext::new());
        parse_all(&cfg, &progress).unwrap();

        assert_eq!(epo_core::sha1_file(&src).unwrap(), before);
    }

    #[test]
    fn multiple_documents_per_file_keep_document_order() {
        let dir = tempfile::tempdir().unwrap();
        let xml = r#"<root>
          <exchange-document country="EP" doc-number="1" kind="A1" status="A"></exchange-document>
          <exchange-document country="EP" doc-number="2" kind="A1" status="A"></exchange-document>
        </root>"#;
        std::fs::write(dir.path().join("doc.xml"), xml).unwrap();
        let output = dir.path().join("out.csv");

        let cfg = test_config(dir.path(), &output);
        let progress = Arc::new(ProgressContext::new());
        let summary = parse_all(&cfg, &progress).unwrap();

        assert_eq!(summary.records, 2);
        let rows = read_rows(&output);
        assert_eq!(&rows[0][0], "EP1A1");
        assert_eq!(&rows[1][0], "EP2A1");
    }
}
