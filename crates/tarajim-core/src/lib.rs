use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub mod backend;
pub mod config_file;
pub mod gemini;
pub mod mock;
pub mod prompt;
pub mod rate_limit;
pub mod record;
pub mod response;
pub mod runner;
pub mod sink;
pub mod structurer;

// Re-export for convenience
pub use backend::{ModelBackend, ModelError};
pub use rate_limit::AdaptiveLimiter;
pub use record::AuthorRecord;
pub use sink::{RecordSink, SinkError};
pub use structurer::{ExtractError, structure_chunk};

/// Default model served by the Generative Language API.
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Progress events emitted during a document run.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Structuring {
        index: usize,
        total: usize,
        heading: String,
    },
    Result {
        index: usize,
        total: usize,
        name: String,
        file: std::path::PathBuf,
    },
    ChunkFailed {
        index: usize,
        total: usize,
        heading: String,
        message: String,
    },
    /// A chunk is being retried after a service failure.
    Retrying {
        index: usize,
        total: usize,
        attempt: u32,
        backoff: Duration,
    },
    /// A chunk was skipped because the index file already covers it.
    SkippedResume {
        index: usize,
        total: usize,
    },
}

/// Why a chunk failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    MalformedExtraction,
    ServiceUnavailable,
    Storage,
}

/// One failed chunk in a run report.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkFailure {
    pub index: usize,
    pub heading: String,
    pub kind: FailureKind,
    pub message: String,
}

/// Outcome of a complete document run. Partial success is normal: failed
/// chunk indices are listed so the user can re-run just those.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub total: usize,
    pub succeeded: usize,
    pub skipped_resume: Vec<usize>,
    pub failed: Vec<ChunkFailure>,
}

impl RunReport {
    pub fn failed_indices(&self) -> Vec<usize> {
        self.failed.iter().map(|f| f.index).collect()
    }
}

#[derive(Error, Debug)]
pub enum RunError {
    #[error("no author entries matched the segmentation pattern; check your pattern")]
    NoMatchesFound,
}

/// Configuration for a document run. Which model to call, and with what
/// key, lives in the [`ModelBackend`] instance; this holds the run knobs.
#[derive(Clone)]
pub struct Config {
    pub num_workers: usize,
    pub request_timeout_secs: u64,
    /// Bounded retries per chunk after a service failure.
    pub max_retries: u32,
    pub requests_per_minute: u32,
    pub limiter: Arc<AdaptiveLimiter>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("num_workers", &self.num_workers)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("requests_per_minute", &self.requests_per_minute)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let requests_per_minute = 15;
        Self {
            num_workers: 1,
            request_timeout_secs: 30,
            max_retries: 3,
            requests_per_minute,
            limiter: Arc::new(AdaptiveLimiter::per_minute(requests_per_minute)),
        }
    }
}

/// Structure a document's chunks and persist the records.
///
/// Chunks are processed by a bounded worker pool but persisted in original
/// chunk order; the index therefore grows in processing order regardless of
/// completion order. Progress events are emitted via the callback. The
/// operation can be cancelled via the CancellationToken.
pub async fn run_document(
    chunks: Vec<tarajim_parsing::AuthorChunk>,
    config: Config,
    model: Arc<dyn ModelBackend>,
    sink: Arc<dyn RecordSink>,
    done: std::collections::HashSet<usize>,
    progress: impl Fn(ProgressEvent) + Send + Sync + 'static,
    cancel: CancellationToken,
) -> Result<RunReport, RunError> {
    runner::run_document(chunks, config, model, sink, done, progress, cancel).await
}
