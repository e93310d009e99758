//! The Structurer: one chunk in, one validated record out.

use std::time::Duration;

use thiserror::Error;

use tarajim_parsing::AuthorChunk;

use crate::backend::{ModelBackend, ModelError};
use crate::prompt::{build_prompt, build_retry_prompt};
use crate::rate_limit::{AdaptiveLimiter, generate_with_limit};
use crate::record::AuthorRecord;
use crate::response::extract_json_payload;

#[derive(Error, Debug)]
pub enum ExtractError {
    /// The reply held no JSON conforming to the record schema. Per-chunk:
    /// recorded and skipped, the run continues.
    #[error("malformed extraction: {0}")]
    MalformedExtraction(String),
    /// The collaborator call failed (timeout, rate limit, network). The
    /// runner retries a bounded number of times before giving up.
    #[error("extraction service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<ModelError> for ExtractError {
    fn from(e: ModelError) -> Self {
        ExtractError::ServiceUnavailable(e.to_string())
    }
}

/// Parse a model reply into a record, or explain why it can't be done.
fn parse_reply(reply: &str) -> Result<AuthorRecord, String> {
    let payload = extract_json_payload(reply)
        .ok_or_else(|| "no JSON payload found in reply".to_string())?;
    AuthorRecord::from_json_str(payload).map_err(|e| e.to_string())
}

/// Structure one chunk via the model collaborator.
///
/// Sends the extraction prompt; if the reply doesn't parse against the
/// schema, re-asks once with a stricter prompt before reporting
/// [`ExtractError::MalformedExtraction`]. Service failures surface as
/// [`ExtractError::ServiceUnavailable`] and are never retried here; the
/// runner owns the bounded retry policy.
pub async fn structure_chunk(
    chunk: &AuthorChunk,
    model: &dyn ModelBackend,
    client: &reqwest::Client,
    limiter: &AdaptiveLimiter,
    timeout: Duration,
) -> Result<AuthorRecord, ExtractError> {
    let prompt = build_prompt(chunk);
    let reply = generate_with_limit(model, &prompt, client, timeout, limiter).await?;

    let first_err = match parse_reply(&reply) {
        Ok(record) => return Ok(record),
        Err(e) => e,
    };

    tracing::debug!(
        index = chunk.index,
        error = %first_err,
        "reply did not parse, re-asking with strict prompt"
    );

    let retry_prompt = build_retry_prompt(chunk);
    let reply = generate_with_limit(model, &retry_prompt, client, timeout, limiter).await?;

    parse_reply(&reply).map_err(|_| ExtractError::MalformedExtraction(first_err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockModel, MockReply};
    use tarajim_parsing::{EntryPattern, segment_text};

    const STUB_JSON: &str = r#"{"name":"Ahmad","birth_date":null,"death_date":"1200","profession":null,"known_works":[]}"#;

    fn chunk() -> AuthorChunk {
        segment_text(
            "1 - Ahmad ibn Ali (d. 1200)\nA jurist of Baghdad.",
            &EntryPattern::default_numbered(),
        )
        .remove(0)
    }

    fn limiter() -> AdaptiveLimiter {
        AdaptiveLimiter::per_minute(600)
    }

    async fn run(model: &MockModel) -> Result<AuthorRecord, ExtractError> {
        let client = reqwest::Client::new();
        structure_chunk(
            &chunk(),
            model,
            &client,
            &limiter(),
            Duration::from_secs(10),
        )
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn stub_reply_yields_exact_record() {
        let model = MockModel::new(MockReply::Reply(STUB_JSON.into()));
        let record = run(&model).await.unwrap();
        assert_eq!(record.name, "Ahmad");
        assert_eq!(record.birth_date, None);
        assert_eq!(record.death_date.as_deref(), Some("1200"));
        assert_eq!(record.profession, None);
        assert!(record.known_works.is_empty());
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fenced_reply_parses() {
        let model = MockModel::new(MockReply::Reply(format!(
            "Here you go:\n```json\n{}\n```",
            STUB_JSON
        )));
        let record = run(&model).await.unwrap();
        assert_eq!(record.name, "Ahmad");
    }

    #[tokio::test(start_paused = true)]
    async fn idempotent_with_deterministic_model() {
        let model = MockModel::new(MockReply::Reply(STUB_JSON.into()));
        let a = run(&model).await.unwrap();
        let b = run(&model).await.unwrap();
        assert_eq!(a.to_canonical_json(), b.to_canonical_json());
    }

    #[tokio::test(start_paused = true)]
    async fn garbage_then_valid_recovers_on_reask() {
        let model = MockModel::with_sequence(vec![
            MockReply::Reply("I am sorry, I cannot help with that.".into()),
            MockReply::Reply(STUB_JSON.into()),
        ]);
        let record = run(&model).await.unwrap();
        assert_eq!(record.name, "Ahmad");
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_garbage_is_malformed() {
        let model = MockModel::new(MockReply::Reply("not json".into()));
        let err = run(&model).await.unwrap_err();
        assert!(matches!(err, ExtractError::MalformedExtraction(_)));
        // Primary ask + one strict re-ask
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_name_is_malformed() {
        let model = MockModel::new(MockReply::Reply(r#"{"death_date":"1200"}"#.into()));
        let err = run(&model).await.unwrap_err();
        assert!(matches!(err, ExtractError::MalformedExtraction(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_is_service_unavailable() {
        let model = MockModel::new(MockReply::Error("connection reset".into()));
        let err = run(&model).await.unwrap_err();
        assert!(matches!(err, ExtractError::ServiceUnavailable(_)));
        // No strict re-ask for transport failures
        assert_eq!(model.call_count(), 1);
    }
}
