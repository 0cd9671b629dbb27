//! HTTP streaming with a synchronous Read bridge.
//!
//! Uses async reqwest internally with tokio::time::timeout for stall
//! detection, but presents a sync interface for rayon worker threads.

use std::io::{self, Read};
use std::pin::Pin;
use std::sync::{LazyLock, RwLock};
use std::task::Context;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, ReadBuf};

/// Connect timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Runtime-adjustable HTTP settings.
///
/// `request_timeout` bounds one whole request (headers through body) and
/// doubles as the per-read stall timeout of [`TimeoutReader`].
#[derive(Debug, Clone, Copy)]
pub struct HttpConfig {
    pub request_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
        }
    }
}

static HTTP_CONFIG: RwLock<HttpConfig> = RwLock::new(HttpConfig {
    request_timeout: Duration::from_secs(30),
});

/// Install process-wide HTTP settings. Call once at startup.
pub fn set_http_config(cfg: HttpConfig) {
    *HTTP_CONFIG.write().unwrap() = cfg;
}

/// Current HTTP settings.
pub fn http_config() -> HttpConfig {
    *HTTP_CONFIG.read().unwrap()
}

/// Error types for stream operations
#[derive(Debug)]
pub enum StreamError {
    /// HTTP error with optional status code
    Http {
        status: Option<u16>,
        message: String,
    },
    /// I/O error
    Io(io::Error),
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http {
                status: Some(s),
                message,
            } => write!(f, "HTTP {s}: {message}"),
            Self::Http {
                status: None,
                message,
            } => write!(f, "HTTP error: {message}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for StreamError {}

impl StreamError {
    /// Create HTTP error from reqwest error
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        Self::Http {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }

    /// The catalog serves immutable deliveries from stable URLs, so every
    /// transport failure is treated as transient within the retry budget.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { .. } | Self::Io(_) => true,
        }
    }
}

impl crate::retry::Retryable for StreamError {
    fn is_retryable(&self) -> bool {
        StreamError::is_retryable(self)
    }
}

impl From<io::Error> for StreamError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Shared async HTTP client with connection pooling.
static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .pool_max_idle_per_host(8)
        .build()
        .expect("failed to build HTTP client")
});

/// Get shared HTTP client.
pub fn http_client() -> &'static reqwest::Client {
    &SHARED_CLIENT
}

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// HTTP GET → sync body reader.
///
/// Returns `(reader, content_length)`. Any status other than 200 is an
/// error; the caller's retry policy decides what to do with it.
pub fn open_body_reader(url: &str) -> Result<(TimeoutReader, Option<u64>), StreamError> {
    let url = url.to_string();
    let timeout = http_config().request_timeout;

    SHARED_RUNTIME.handle().block_on(async {
        let response = SHARED_CLIENT
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| StreamError::from_reqwest(&e))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(StreamError::Http {
                status: Some(status.as_u16()),
                message: format!("unexpected status for {url}"),
            });
        }

        let total_bytes = response.content_length();

        // Convert response body stream to AsyncRead
        let stream = response.bytes_stream();
        let async_reader =
            tokio_util::io::StreamReader::new(stream.map(|result| result.map_err(io::Error::other)));

        Ok((TimeoutReader::new(Box::pin(async_reader)), total_bytes))
    })
}

/// Async-to-sync bridge with read timeout.
///
/// Wraps an async reader and provides a sync Read interface. Each read has
/// a timeout - if no data arrives within the configured window, returns a
/// TimedOut error (which the caller's retry policy picks up).
pub struct TimeoutReader {
    inner: Pin<Box<dyn AsyncRead + Send + Sync>>,
}

impl TimeoutReader {
    fn new(inner: Pin<Box<dyn AsyncRead + Send + Sync>>) -> Self {
        Self { inner }
    }
}

impl Read for TimeoutReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let stall = http_config().request_timeout;
        SHARED_RUNTIME.handle().block_on(async {
            let read_future = async {
                let mut read_buf = ReadBuf::new(buf);
                std::future::poll_fn(|cx: &mut Context<'_>| {
                    Pin::as_mut(&mut self.inner).poll_read(cx, &mut read_buf)
                })
                .await?;
                Ok::<_, io::Error>(read_buf.filled().len())
            };

            match tokio::time::timeout(stall, read_future).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "read timeout (no data within request timeout)",
                )),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http_err(status: u16) -> StreamError {
        StreamError::Http {
            status: Some(status),
            message: "test".to_string(),
        }
    }

    #[test]
    fn display_http_with_status() {
        assert_eq!(format!("{}", http_err(404)), "HTTP 404: test");
    }

    #[test]
    fn display_http_without_status() {
        let err = StreamError::Http {
            status: None,
            message: "connection refused".to_string(),
        };
        assert_eq!(format!("{err}"), "HTTP error: connection refused");
    }

    #[test]
    fn display_io_error() {
        let err = StreamError::Io(io::Error::new(io::ErrorKind::NotFound, "missing"));
        assert!(format!("{err}").contains("IO error"));
    }

    #[test]
    fn io_error_converts() {
        let err: StreamError = io::Error::other("boom").into();
        assert!(matches!(err, StreamError::Io(_)));
    }

    #[test]
    fn http_500_retryable() {
        assert!(http_err(500).is_retryable());
    }

    #[test]
    fn io_timeout_retryable() {
        let err = StreamError::Io(io::Error::new(io::ErrorKind::TimedOut, "timeout"));
        assert!(err.is_retryable());
    }

    #[test]
    fn default_request_timeout_is_30s() {
        assert_eq!(
            HttpConfig::default().request_timeout,
            Duration::from_secs(30)
        );
    }
}
