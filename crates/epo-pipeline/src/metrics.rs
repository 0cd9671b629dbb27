//! Pipeline metrics.
//!
//! Instrument names for all three stages. The `metrics` recorder is wired
//! by the deployment (exporter choice lives in the `telemetry` config
//! section); without one, every macro call is a no-op.

// ============================================================================
// Download stage
// ============================================================================

/// Items listed by the catalog.
pub const DOWNLOAD_FILES_TOTAL: &str = "epo_download_files_total";

/// Items downloaded or skipped as already valid.
pub const DOWNLOAD_FILES_SUCCESS: &str = "epo_download_files_success";

/// Items that failed after the retry budget.
pub const DOWNLOAD_FILES_FAILED: &str = "epo_download_files_failed";

/// Bytes actually fetched (skipped files contribute nothing).
pub const DOWNLOAD_BYTES_TOTAL: &str = "epo_download_bytes_total";

/// Per-item download duration in milliseconds.
pub const DOWNLOAD_FILE_DURATION: &str = "epo_download_file_duration_ms";

/// Whole download session duration in milliseconds.
pub const DOWNLOAD_SESSION_DURATION: &str = "epo_download_session_duration_ms";

// ============================================================================
// Extract stage
// ============================================================================

/// Archives processed, labeled `kind` = `top` | `nested`.
pub const EXTRACT_ZIPS_TOTAL: &str = "epo_extract_zips_total";

/// Archives that failed to extract.
pub const EXTRACT_ZIPS_FAILED: &str = "epo_extract_zips_failed";

/// Files written out of archives.
pub const EXTRACT_FILES_TOTAL: &str = "epo_extract_files_total";

/// Bytes written out of archives.
pub const EXTRACT_BYTES_TOTAL: &str = "epo_extract_bytes_total";

/// Per-archive extraction duration in milliseconds.
pub const EXTRACT_FILE_DURATION: &str = "epo_extract_file_duration_ms";

/// Whole extraction session duration in milliseconds.
pub const EXTRACT_SESSION_DURATION: &str = "epo_extract_session_duration_ms";

// ============================================================================
// Parse stage
// ============================================================================

/// XML files discovered.
pub const PARSE_XML_FILES_TOTAL: &str = "epo_parse_xml_files_total";

/// XML files parsed and written without rejection.
pub const PARSE_XML_FILES_SUCCESS: &str = "epo_parse_xml_files_success";

/// XML files rejected.
pub const PARSE_XML_FILES_FAILED: &str = "epo_parse_xml_files_failed";

/// CSV rows written.
pub const PARSE_RECORDS_TOTAL: &str = "epo_parse_records_total";

/// Bytes of XML consumed.
pub const PARSE_BYTES_TOTAL: &str = "epo_parse_bytes_total";

/// Per-file parse duration in milliseconds.
pub const PARSE_FILE_DURATION: &str = "epo_parse_file_duration_ms";

/// Whole parse session duration in milliseconds.
pub const PARSE_SESSION_DURATION: &str = "epo_parse_session_duration_ms";

/// Registers descriptions for every pipeline instrument.
///
/// Call once at startup after installing the metrics recorder.
pub fn register_metrics() {
    use metrics::{describe_counter, describe_histogram};

    describe_counter!(DOWNLOAD_FILES_TOTAL, "Total number of catalog items");
    describe_counter!(
        DOWNLOAD_FILES_SUCCESS,
        "Items downloaded or skipped as already valid"
    );
    describe_counter!(DOWNLOAD_FILES_FAILED, "Items failed after retries");
    describe_counter!(DOWNLOAD_BYTES_TOTAL, "Bytes actually downloaded");
    describe_histogram!(
        DOWNLOAD_FILE_DURATION,
        "Duration of one item download in ms"
    );
    describe_histogram!(
        DOWNLOAD_SESSION_DURATION,
        "Duration of the download session in ms"
    );

    describe_counter!(EXTRACT_ZIPS_TOTAL, "Archives processed (top and nested)");
    describe_counter!(EXTRACT_ZIPS_FAILED, "Archives that failed to extract");
    describe_counter!(EXTRACT_FILES_TOTAL, "Files written out of archives");
    describe_counter!(EXTRACT_BYTES_TOTAL, "Bytes written out of archives");
    describe_histogram!(
        EXTRACT_FILE_DURATION,
        "Duration of one archive extraction in ms"
    );
    describe_histogram!(
        EXTRACT_SESSION_DURATION,
        "Duration of the extraction session in ms"
    );

    describe_counter!(PARSE_XML_FILES_TOTAL, "XML files discovered");
    describe_counter!(PARSE_XML_FILES_SUCCESS, "XML files parsed successfully");
    describe_counter!(PARSE_XML_FILES_FAILED, "XML files rejected");
    describe_counter!(PARSE_RECORDS_TOTAL, "CSV rows written");
    describe_counter!(PARSE_BYTES_TOTAL, "Bytes of XML consumed");
    describe_histogram!(PARSE_FILE_DURATION, "Duration of one XML file parse in ms");
    describe_histogram!(
        PARSE_SESSION_DURATION,
        "Duration of the parse session in ms"
    );
}
