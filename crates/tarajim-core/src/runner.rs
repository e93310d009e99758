//! Worker pool for structuring a document's chunks.
//!
//! Architecture: a job channel feeding `num_workers` worker tasks, results
//! returned via oneshot channels and collected (then persisted) in
//! original chunk order. One worker is the default: the collaborator is the
//! rate-limited bottleneck, and the pool exists so a raised limit can be
//! used without restructuring.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use tarajim_parsing::AuthorChunk;

use crate::backend::ModelBackend;
use crate::sink::RecordSink;
use crate::structurer::{ExtractError, structure_chunk};
use crate::{ChunkFailure, Config, FailureKind, ProgressEvent, RunError, RunReport};

/// A chunk structuring job submitted to the pool.
struct ChunkJob {
    chunk: AuthorChunk,
    result_tx: oneshot::Sender<Result<crate::AuthorRecord, ExtractError>>,
    total: usize,
    progress: Arc<dyn Fn(ProgressEvent) + Send + Sync>,
}

/// Worker loop: structure chunks from the queue, retrying service failures
/// a bounded number of times with exponential backoff.
async fn worker_loop(
    job_rx: async_channel::Receiver<ChunkJob>,
    config: Arc<Config>,
    model: Arc<dyn ModelBackend>,
    client: reqwest::Client,
    cancel: CancellationToken,
) {
    let timeout = Duration::from_secs(config.request_timeout_secs);

    while let Ok(job) = job_rx.recv().await {
        // Drop remaining jobs after cancellation; the collector sees the
        // closed oneshot and leaves the chunk unaccounted.
        if cancel.is_cancelled() {
            continue;
        }

        let ChunkJob {
            chunk,
            result_tx,
            total,
            progress,
        } = job;

        progress(ProgressEvent::Structuring {
            index: chunk.index,
            total,
            heading: chunk.heading.clone(),
        });

        let mut attempt: u32 = 0;
        let outcome = loop {
            let result =
                structure_chunk(&chunk, model.as_ref(), &client, &config.limiter, timeout).await;

            match result {
                Err(ExtractError::ServiceUnavailable(ref msg))
                    if attempt < config.max_retries && !cancel.is_cancelled() =>
                {
                    attempt += 1;
                    let backoff = Duration::from_secs(1u64 << attempt.min(5));
                    tracing::debug!(
                        index = chunk.index,
                        attempt,
                        error = %msg,
                        "service failure, backing off"
                    );
                    progress(ProgressEvent::Retrying {
                        index: chunk.index,
                        total,
                        attempt,
                        backoff,
                    });
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = cancel.cancelled() => break None,
                    }
                }
                other => break Some(other),
            }
        };

        if let Some(result) = outcome {
            let _ = result_tx.send(result);
        }
    }
}

pub(crate) async fn run_document(
    chunks: Vec<AuthorChunk>,
    config: Config,
    model: Arc<dyn ModelBackend>,
    sink: Arc<dyn RecordSink>,
    done: HashSet<usize>,
    progress: impl Fn(ProgressEvent) + Send + Sync + 'static,
    cancel: CancellationToken,
) -> Result<RunReport, RunError> {
    if chunks.is_empty() {
        return Err(RunError::NoMatchesFound);
    }

    let total = chunks.len();
    let num_workers = config.num_workers.max(1);
    let config = Arc::new(config);
    let progress: Arc<dyn Fn(ProgressEvent) + Send + Sync> = Arc::new(progress);

    let mut report = RunReport {
        total,
        ..RunReport::default()
    };

    let (job_tx, job_rx) = async_channel::unbounded::<ChunkJob>();
    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(2)
        .pool_idle_timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new());

    let mut worker_handles = Vec::with_capacity(num_workers);
    for _ in 0..num_workers {
        worker_handles.push(tokio::spawn(worker_loop(
            job_rx.clone(),
            config.clone(),
            model.clone(),
            client.clone(),
            cancel.clone(),
        )));
    }
    drop(job_rx);

    // Submit jobs, skipping chunks the index already covers (resume)
    let mut receivers = Vec::with_capacity(total);
    for chunk in chunks {
        if cancel.is_cancelled() {
            break;
        }

        if done.contains(&chunk.index) {
            progress(ProgressEvent::SkippedResume {
                index: chunk.index,
                total,
            });
            report.skipped_resume.push(chunk.index);
            continue;
        }

        let (result_tx, result_rx) = oneshot::channel();
        let index = chunk.index;
        let heading = chunk.heading.clone();
        let job = ChunkJob {
            chunk,
            result_tx,
            total,
            progress: progress.clone(),
        };
        let _ = job_tx.send(job).await;
        receivers.push((index, heading, result_rx));
    }

    // Collect in submission order; persisting here keeps the index ordered
    // and append-only no matter which worker finishes first.
    for (index, heading, rx) in receivers {
        let result = match rx.await {
            Ok(result) => result,
            // Worker dropped the job (cancellation)
            Err(_) => continue,
        };

        match result {
            Ok(record) => match sink.persist(index, &record) {
                Ok(path) => {
                    report.succeeded += 1;
                    progress(ProgressEvent::Result {
                        index,
                        total,
                        name: record.name.clone(),
                        file: path,
                    });
                }
                Err(e) => {
                    tracing::warn!(index, error = %e, "failed to persist record");
                    progress(ProgressEvent::ChunkFailed {
                        index,
                        total,
                        heading: heading.clone(),
                        message: e.to_string(),
                    });
                    report.failed.push(ChunkFailure {
                        index,
                        heading,
                        kind: FailureKind::Storage,
                        message: e.to_string(),
                    });
                }
            },
            Err(err) => {
                let kind = match err {
                    ExtractError::MalformedExtraction(_) => FailureKind::MalformedExtraction,
                    ExtractError::ServiceUnavailable(_) => FailureKind::ServiceUnavailable,
                };
                tracing::info!(index, error = %err, "chunk failed");
                progress(ProgressEvent::ChunkFailed {
                    index,
                    total,
                    heading: heading.clone(),
                    message: err.to_string(),
                });
                report.failed.push(ChunkFailure {
                    index,
                    heading,
                    kind,
                    message: err.to_string(),
                });
            }
        }
    }

    job_tx.close();
    for h in worker_handles {
        let _ = h.await;
    }

    Ok(report)
}
