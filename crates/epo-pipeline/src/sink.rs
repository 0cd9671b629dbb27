//! CSV output sink
//!
//! Single writer over a truncate-created file; one mutex guards appends
//! and flushes so rows from parallel parse workers never interleave
//! mid-record.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Mutex;

use crate::error::PipelineError;

const HEADER: [&str; 5] = ["patent_id", "status", "cpc_list", "citations", "family_patents"];

pub struct CsvSink {
    writer: Mutex<csv::Writer<BufWriter<File>>>,
}

impl CsvSink {
    /// Truncate-create `path` and write the header row.
    pub fn create(path: &Path) -> Result<Self, PipelineError> {
        let file = File::create(path)?;
        let mut writer = csv::Writer::from_writer(BufWriter::new(file));
        writer.write_record(HEADER)?;

        Ok(Self {
            writer: Mutex::new(writer),
        })
    }

    /// Append one row.
    pub fn append(&self, row: &[String; 5]) -> Result<(), PipelineError> {
        let mut writer = self.writer.lock().unwrap();
        writer.write_record(row)?;
        Ok(())
    }

    /// Drain buffered rows to disk, surfacing any deferred write error.
    pub fn flush(&self) -> Result<(), PipelineError> {
        let mut writer = self.writer.lock().unwrap();
        writer.flush().map_err(PipelineError::Io)
    }
}
