//! CLI flag overrides layered onto the loaded configuration.
//!
//! Precedence: defaults < config file < `EPO_*` environment < flags.

use std::path::PathBuf;

use clap::Args;
use epo_pipeline::Config;

#[derive(Args, Debug, Default)]
pub struct Overrides {
    /// Log level (debug/info/warn/error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Catalog server base URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Maximum retries per file (0-10)
    #[arg(long, global = true)]
    max_retries: Option<u32>,

    /// Concurrent downloads (1-30)
    #[arg(long, global = true)]
    concurrent_downloads: Option<usize>,

    /// Product to fetch
    #[arg(long, global = true)]
    product_id: Option<u32>,

    /// Download directory
    #[arg(long, global = true)]
    download_dir: Option<PathBuf>,

    /// Skip files whose checksum already matches (true/false)
    #[arg(long, global = true)]
    skip_exists: Option<bool>,

    /// Verify SHA-1 after each download (true/false)
    #[arg(long, global = true)]
    verify_sha1: Option<bool>,

    /// Delete archives after successful extraction (true/false)
    #[arg(long, global = true)]
    delete_after_extract: Option<bool>,

    /// Output CSV path
    #[arg(long, global = true)]
    output_csv: Option<PathBuf>,

    /// Parse worker count
    #[arg(long, global = true)]
    workers: Option<usize>,
}

impl Overrides {
    pub fn apply(&self, config: &mut Config) {
        if let Some(ref v) = self.log_level {
            config.log.log_level = v.clone();
        }
        if let Some(ref v) = self.base_url {
            config.server.base_url = v.clone();
        }
        if let Some(v) = self.timeout {
            config.server.timeout = v;
        }
        if let Some(v) = self.max_retries {
            config.server.max_retries = v;
        }
        if let Some(v) = self.concurrent_downloads {
            config.server.concurrent_downloads = v;
        }
        if let Some(v) = self.product_id {
            config.server.product_id = v;
        }
        if let Some(ref v) = self.download_dir {
            config.download.directory = v.clone();
        }
        if let Some(v) = self.skip_exists {
            config.download.skip_exists = v;
        }
        if let Some(v) = self.verify_sha1 {
            config.download.verify_sha1 = v;
        }
        if let Some(v) = self.delete_after_extract {
            config.extract.delete_after_extract = v;
        }
        if let Some(ref v) = self.output_csv {
            config.parse.output_csv = v.clone();
        }
        if let Some(v) = self.workers {
            config.parse.workers = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_flags_leave_config_untouched() {
        let mut config = Config::default();
        let before = config.server.concurrent_downloads;
        Overrides::default().apply(&mut config);
        assert_eq!(config.server.concurrent_downloads, before);
    }

    #[test]
    fn set_flags_win() {
        let mut config = Config::default();
        let overrides = Overrides {
            base_url: Some("http://override".into()),
            concurrent_downloads: Some(2),
            skip_exists: Some(false),
            output_csv: Some(PathBuf::from("/tmp/rows.csv")),
            ..Default::default()
        };
        overrides.apply(&mut config);

        assert_eq!(config.server.base_url, "http://override");
        assert_eq!(config.server.concurrent_downloads, 2);
        assert!(!config.download.skip_exists);
        assert_eq!(config.parse.output_csv, PathBuf::from("/tmp/rows.csv"));
    }
}
