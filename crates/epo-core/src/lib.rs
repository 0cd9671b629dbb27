//! EPO Core - Common infrastructure for the EPO bulk-data processor
//!
//! This crate provides the reusable pieces of the pipeline: the HTTP
//! streaming bridge, retry with backoff, concurrency gating, graceful
//! shutdown, progress reporting, logging, and checksum hashing.

pub mod hash;
pub mod logging;
pub mod progress;
pub mod retry;
pub mod semaphore;
pub mod shutdown;
pub mod stream;

// Re-exports for convenience
pub use hash::{checksum_matches, sha1_file, sha1_hex};
pub use logging::init_logging;
pub use progress::{ProgressContext, SharedProgress};
pub use retry::{Retryable, retry_with_backoff};
pub use semaphore::Semaphore;
pub use shutdown::{
    install_signal_handlers, is_shutdown_requested, request_shutdown, reset_shutdown,
    shutdown_flag,
};
pub use stream::{
    HttpConfig, SHARED_RUNTIME, StreamError, http_client, open_body_reader, set_http_config,
};
