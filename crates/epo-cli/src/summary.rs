//! Stage summary tables printed on stderr after a run.

use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use epo_pipeline::{DownloadSummary, ExtractSummary, ParseSummary, PipelineReport};

/// Print a key-value summary table on stderr
fn print_summary(title: &str, rows: &[(&str, String)]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new(title).fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }
    eprintln!("\n{table}");
}

pub fn print_download(summary: &DownloadSummary) {
    print_summary(
        "Download",
        &[
            (
                "Files",
                format!(
                    "{}/{} ({} failed)",
                    summary.succeeded, summary.total_files, summary.failed
                ),
            ),
            ("Bytes fetched", format!("{}", summary.bytes_downloaded)),
            ("Time", format!("{:.1}s", summary.elapsed.as_secs_f64())),
        ],
    );
}

pub fn print_extract(summary: &ExtractSummary) {
    print_summary(
        "Extract",
        &[
            (
                "Archives",
                format!("{} ({} nested)", summary.archives, summary.nested_archives),
            ),
            ("Files", format!("{}", summary.files_extracted)),
            ("Bytes", format!("{}", summary.bytes_extracted)),
            ("Time", format!("{:.1}s", summary.elapsed.as_secs_f64())),
        ],
    );
}

pub fn print_parse(summary: &ParseSummary) {
    print_summary(
        "Parse",
        &[
            (
                "Files",
                format!(
                    "{}/{} ({} failed)",
                    summary.succeeded, summary.total_files, summary.failed
                ),
            ),
            ("Records", format!("{}", summary.records)),
            ("Time", format!("{:.1}s", summary.elapsed.as_secs_f64())),
        ],
    );
}

pub fn print_report(report: &PipelineReport) {
    if let Some(ref download) = report.download {
        print_download(download);
    }
    if let Some(ref extract) = report.extract {
        print_extract(extract);
    }
    if let Some(ref parse) = report.parse {
        print_parse(parse);
    }
}
