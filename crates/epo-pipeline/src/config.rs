//! Configuration loading and validation
//!
//! File discovery (`./`, `~/.epo-processor/`, `/etc/epo-processor/`),
//! format by extension (TOML, YAML, JSON), then an `EPO_`-prefixed
//! environment overlay, then validation. Dotted keys map to environment
//! names with `_` replacing `.` and `-`, e.g. `server.base_url` →
//! `EPO_SERVER_BASE_URL`.

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log: LogConfig,
    pub telemetry: TelemetryConfig,
    pub server: ServerConfig,
    pub download: DownloadConfig,
    pub extract: ExtractConfig,
    pub parse: ParseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub log_level: String,
    pub log_dir: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: PathBuf::from("logs"),
        }
    }
}

/// Exporter wiring for the metrics/tracing recorders. Validated and
/// printed here; consumed by deployment glue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub exporter: String,
    pub endpoint: String,
    pub protocol: String,
    pub insecure: bool,
    pub headers: BTreeMap<String, String>,
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            exporter: "otlp".to_string(),
            endpoint: "localhost:4317".to_string(),
            protocol: "grpc".to_string(),
            insecure: true,
            headers: BTreeMap::new(),
            service_name: "epo-processor".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub base_url: String,
    /// Per-request timeout in seconds
    pub timeout: u64,
    pub max_retries: u32,
    pub concurrent_downloads: usize,
    pub product_id: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout: 30,
            max_retries: 3,
            concurrent_downloads: 5,
            product_id: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub directory: PathBuf,
    pub skip_exists: bool,
    pub verify_sha1: bool,
    pub enabled: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("data"),
            skip_exists: true,
            verify_sha1: false,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    pub enabled: bool,
    pub delete_after_extract: bool,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delete_after_extract: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseConfig {
    pub enabled: bool,
    pub output_csv: PathBuf,
    pub workers: usize,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output_csv: PathBuf::from("./output.csv"),
            workers: 10,
        }
    }
}

impl Config {
    /// Load configuration: explicit file or discovery, environment
    /// overlay, validation.
    pub fn load(path: Option<&Path>) -> Result<Self, PipelineError> {
        let mut cfg = match path {
            Some(p) => Self::from_file(p)?,
            None => match Self::discover()? {
                Some(c) => c,
                None => Self::default(),
            },
        };
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from a specific file; format by extension.
    pub fn from_file(path: &Path) -> Result<Self, PipelineError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read {}: {e}", path.display()))
        })?;

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        let parsed = match ext.as_str() {
            "toml" => toml::from_str(&content)
                .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display()))),
            "yaml" | "yml" => serde_yaml::from_str(&content)
                .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display()))),
            "json" => serde_json::from_str(&content)
                .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display()))),
            other => Err(PipelineError::Config(format!(
                "unsupported config format {other:?} (expected toml, yaml or json)"
            ))),
        }?;

        log::info!("Loaded config from {}", path.display());
        Ok(parsed)
    }

    /// Search `./config.*`, `~/.epo-processor/config.*`,
    /// `/etc/epo-processor/config.*`.
    fn discover() -> Result<Option<Self>, PipelineError> {
        let mut dirs = vec![PathBuf::from(".")];
        if let Ok(home) = env::var("HOME") {
            dirs.push(PathBuf::from(home).join(".epo-processor"));
        }
        dirs.push(PathBuf::from("/etc/epo-processor"));

        for dir in dirs {
            for ext in ["toml", "yaml", "yml", "json"] {
                let candidate = dir.join(format!("config.{ext}"));
                if candidate.is_file() {
                    return Self::from_file(&candidate).map(Some);
                }
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(None)
    }

    fn apply_env(&mut self) -> Result<(), PipelineError> {
        env_string("EPO_LOG_LOG_LEVEL", &mut self.log.log_level);
        env_path("EPO_LOG_LOG_DIR", &mut self.log.log_dir);

        env_parse("EPO_TELEMETRY_ENABLED", &mut self.telemetry.enabled)?;
        env_string("EPO_TELEMETRY_EXPORTER", &mut self.telemetry.exporter);
        env_string("EPO_TELEMETRY_ENDPOINT", &mut self.telemetry.endpoint);
        env_string("EPO_TELEMETRY_PROTOCOL", &mut self.telemetry.protocol);
        env_parse("EPO_TELEMETRY_INSECURE", &mut self.telemetry.insecure)?;
        env_string(
            "EPO_TELEMETRY_SERVICE_NAME",
            &mut self.telemetry.service_name,
        );

        env_string("EPO_SERVER_BASE_URL", &mut self.server.base_url);
        env_parse("EPO_SERVER_TIMEOUT", &mut self.server.timeout)?;
        env_parse("EPO_SERVER_MAX_RETRIES", &mut self.server.max_retries)?;
        env_parse(
            "EPO_SERVER_CONCURRENT_DOWNLOADS",
            &mut self.server.concurrent_downloads,
        )?;
        env_parse("EPO_SERVER_PRODUCT_ID", &mut self.server.product_id)?;

        env_path("EPO_DOWNLOAD_DIRECTORY", &mut self.download.directory);
        env_parse("EPO_DOWNLOAD_SKIP_EXISTS", &mut self.download.skip_exists)?;
        env_parse("EPO_DOWNLOAD_VERIFY_SHA1", &mut self.download.verify_sha1)?;
        env_parse("EPO_DOWNLOAD_ENABLED", &mut self.download.enabled)?;

        env_parse("EPO_EXTRACT_ENABLED", &mut self.extract.enabled)?;
        env_parse(
            "EPO_EXTRACT_DELETE_AFTER_EXTRACT",
            &mut self.extract.delete_after_extract,
        )?;

        env_parse("EPO_PARSE_ENABLED", &mut self.parse.enabled)?;
        env_path("EPO_PARSE_OUTPUT_CSV", &mut self.parse.output_csv);
        env_parse("EPO_PARSE_WORKERS", &mut self.parse.workers)?;

        Ok(())
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        const LEVELS: [&str; 4] = ["debug", "info", "warn", "error"];
        if !LEVELS.contains(&self.log.log_level.as_str()) {
            return Err(PipelineError::Config(format!(
                "log.log_level must be one of {LEVELS:?}, got {:?}",
                self.log.log_level
            )));
        }

        const EXPORTERS: [&str; 3] = ["otlp", "stdout", "none"];
        if !EXPORTERS.contains(&self.telemetry.exporter.as_str()) {
            return Err(PipelineError::Config(format!(
                "telemetry.exporter must be one of {EXPORTERS:?}, got {:?}",
                self.telemetry.exporter
            )));
        }
        if self.telemetry.enabled
            && self.telemetry.exporter == "otlp"
            && self.telemetry.endpoint.is_empty()
        {
            return Err(PipelineError::Config(
                "telemetry.endpoint is required when using the otlp exporter".into(),
            ));
        }

        if self.server.base_url.is_empty() {
            return Err(PipelineError::Config("server.base_url is required".into()));
        }
        if !self.server.base_url.starts_with("http://")
            && !self.server.base_url.starts_with("https://")
        {
            return Err(PipelineError::Config(format!(
                "server.base_url must be an http(s) URL, got {:?}",
                self.server.base_url
            )));
        }
        if self.server.timeout == 0 {
            return Err(PipelineError::Config(
                "server.timeout must be greater than zero".into(),
            ));
        }
        if self.server.max_retries > 10 {
            return Err(PipelineError::Config(format!(
                "server.max_retries must be at most 10, got {}",
                self.server.max_retries
            )));
        }
        if !(1..=30).contains(&self.server.concurrent_downloads) {
            return Err(PipelineError::Config(format!(
                "server.concurrent_downloads must be within 1..=30, got {}",
                self.server.concurrent_downloads
            )));
        }
        if self.server.product_id == 0 {
            return Err(PipelineError::Config("server.product_id is required".into()));
        }

        if self.download.enabled && self.download.directory.as_os_str().is_empty() {
            return Err(PipelineError::Config(
                "download.directory is required when the download stage is enabled".into(),
            ));
        }

        if self.parse.workers == 0 {
            return Err(PipelineError::Config(
                "parse.workers must be at least 1".into(),
            ));
        }

        Ok(())
    }
}

fn env_string(key: &str, slot: &mut String) {
    if let Ok(v) = env::var(key) {
        *slot = v;
    }
}

fn env_path(key: &str, slot: &mut PathBuf) {
    if let Ok(v) = env::var(key) {
        *slot = PathBuf::from(v);
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, slot: &mut T) -> Result<(), PipelineError> {
    if let Ok(v) = env::var(key) {
        *slot = v
            .parse()
            .map_err(|_| PipelineError::Config(format!("{key} has unparseable value {v:?}")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut cfg = Config::default();
        cfg.server.base_url = "https://publication-bdds.apps.epo.org/bdds/bdds-bm-provision-api"
            .to_string();
        cfg
    }

    #[test]
    fn defaults_match_service_contract() {
        let cfg = Config::default();
        assert_eq!(cfg.log.log_level, "info");
        assert_eq!(cfg.log.log_dir, PathBuf::from("logs"));
        assert_eq!(cfg.server.timeout, 30);
        assert_eq!(cfg.server.max_retries, 3);
        assert_eq!(cfg.server.concurrent_downloads, 5);
        assert_eq!(cfg.server.product_id, 3);
        assert_eq!(cfg.download.directory, PathBuf::from("data"));
        assert!(cfg.download.skip_exists);
        assert!(!cfg.download.verify_sha1);
        assert!(cfg.extract.enabled);
        assert!(!cfg.extract.delete_after_extract);
        assert_eq!(cfg.parse.output_csv, PathBuf::from("./output.csv"));
        assert_eq!(cfg.parse.workers, 10);
    }

    #[test]
    fn parses_toml() {
        let toml = r#"
[server]
base_url = "http://localhost:9000"
concurrent_downloads = 8

[download]
directory = "/tmp/epo"
skip_exists = false

[parse]
workers = 4
"#;
        let cfg: Config = toml::from_str(toml).unwrap();
        assert_eq!(cfg.server.base_url, "http://localhost:9000");
        assert_eq!(cfg.server.concurrent_downloads, 8);
        assert_eq!(cfg.download.directory, PathBuf::from("/tmp/epo"));
        assert!(!cfg.download.skip_exists);
        assert_eq!(cfg.parse.workers, 4);
        // untouched sections keep their defaults
        assert_eq!(cfg.server.timeout, 30);
    }

    #[test]
    fn parses_yaml() {
        let yaml = r#"
server:
  base_url: http://localhost:9000
  product_id: 7
extract:
  delete_after_extract: true
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.server.product_id, 7);
        assert!(cfg.extract.delete_after_extract);
    }

    #[test]
    fn parses_json() {
        let json = r#"{"server": {"base_url": "http://x", "timeout": 5}}"#;
        let cfg: Config = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.server.timeout, 5);
    }

    #[test]
    fn from_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nbase_url = \"http://x\"\n").unwrap();
        let cfg = Config::from_file(&path).unwrap();
        assert_eq!(cfg.server.base_url, "http://x");

        let bad = dir.path().join("config.ini");
        std::fs::write(&bad, "x").unwrap();
        assert!(Config::from_file(&bad).is_err());
    }

    #[test]
    fn env_overlay_wins_over_file_values() {
        let mut cfg = valid_config();
        env::set_var("EPO_SERVER_CONCURRENT_DOWNLOADS", "12");
        env::set_var("EPO_DOWNLOAD_SKIP_EXISTS", "false");
        cfg.apply_env().unwrap();
        env::remove_var("EPO_SERVER_CONCURRENT_DOWNLOADS");
        env::remove_var("EPO_DOWNLOAD_SKIP_EXISTS");

        assert_eq!(cfg.server.concurrent_downloads, 12);
        assert!(!cfg.download.skip_exists);
    }

    #[test]
    fn env_overlay_rejects_garbage() {
        let mut cfg = valid_config();
        env::set_var("EPO_SERVER_TIMEOUT", "soon");
        let result = cfg.apply_env();
        env::remove_var("EPO_SERVER_TIMEOUT");
        assert!(result.is_err());
    }

    #[test]
    fn validation_requires_base_url() {
        let cfg = Config::default();
        assert!(cfg.validate().is_err());
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn validation_bounds() {
        let mut cfg = valid_config();
        cfg.server.concurrent_downloads = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = valid_config();
        cfg.server.concurrent_downloads = 31;
        assert!(cfg.validate().is_err());

        let mut cfg = valid_config();
        cfg.server.max_retries = 11;
        assert!(cfg.validate().is_err());

        let mut cfg = valid_config();
        cfg.server.timeout = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = valid_config();
        cfg.parse.workers = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = valid_config();
        cfg.log.log_level = "loud".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validation_otlp_needs_endpoint() {
        let mut cfg = valid_config();
        cfg.telemetry.endpoint.clear();
        assert!(cfg.validate().is_err());

        cfg.telemetry.exporter = "none".into();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn config_print_round_trips_through_json() {
        let cfg = valid_config();
        let dumped = serde_json::to_string_pretty(&cfg).unwrap();
        let back: Config = serde_json::from_str(&dumped).unwrap();
        assert_eq!(back.server.base_url, cfg.server.base_url);
        assert_eq!(back.parse.workers, cfg.parse.workers);
    }
}
