//! Logging with indicatif integration and a per-session log file

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use indicatif::MultiProgress;

/// ANSI color code and padded label for a log level.
fn level_style(level: log::Level, color: bool) -> (&'static str, &'static str, &'static str) {
    let label = match level {
        log::Level::Error => "ERROR",
        log::Level::Warn => "WARN ",
        log::Level::Info => "INFO ",
        log::Level::Debug => "DEBUG",
        log::Level::Trace => "TRACE",
    };
    if !color {
        return ("", label, "");
    }
    let ansi = match level {
        log::Level::Error => "\x1b[31m",
        log::Level::Warn => "\x1b[33m",
        log::Level::Info => "\x1b[32m",
        log::Level::Debug => "\x1b[36m",
        log::Level::Trace => "\x1b[35m",
    };
    (ansi, label, "\x1b[0m")
}

/// Logger that writes to stderr (through MultiProgress when bars are live,
/// so lines never tear through them) and appends to a session log file.
struct PipelineLogger {
    inner: env_logger::Logger,
    multi: Option<MultiProgress>,
    file: Option<Mutex<File>>,
}

impl log::Log for PipelineLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if !self.inner.enabled(record.metadata()) {
            return;
        }

        let color = self.multi.is_some();
        let (pre, label, post) = level_style(record.level(), color);
        let line = format!("[{pre}{label}{post}] {}", record.args());
        match &self.multi {
            Some(multi) => multi.suspend(|| eprintln!("{line}")),
            None => eprintln!("{line}"),
        }

        if let Some(file) = &self.file {
            let (_, label, _) = level_style(record.level(), false);
            let mut file = file.lock().unwrap();
            let _ = writeln!(
                file,
                "[{label}] {} {}",
                record.target(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        self.inner.flush();
        if let Some(file) = &self.file {
            let _ = file.lock().unwrap().flush();
        }
    }
}

/// Initialize logging.
///
/// `level` is the default filter (overridable via `RUST_LOG`), `log_file`
/// the per-session plain-text sink, `multi` the live progress handle in
/// TTY mode.
pub fn init_logging(level: &str, log_file: Option<&Path>, multi: Option<&MultiProgress>) {
    let inner =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).build();
    let max_level = inner.filter();

    let file = log_file.and_then(|path| match File::create(path) {
        Ok(f) => Some(Mutex::new(f)),
        Err(e) => {
            eprintln!("failed to open log file {}: {e}", path.display());
            None
        }
    });

    let logger = PipelineLogger {
        inner,
        multi: multi.cloned(),
        file,
    };

    if log::set_boxed_logger(Box::new(logger)).is_ok() {
        log::set_max_level(max_level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_fixed_width() {
        for level in [
            log::Level::Error,
            log::Level::Warn,
            log::Level::Info,
            log::Level::Debug,
            log::Level::Trace,
        ] {
            let (_, label, _) = level_style(level, false);
            assert_eq!(label.len(), 5);
        }
    }

    #[test]
    fn plain_style_has_no_ansi() {
        let (pre, _, post) = level_style(log::Level::Error, false);
        assert!(pre.is_empty());
        assert!(post.is_empty());
    }
}
