//! Model collaborator trait and error type.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Error type for collaborator calls, distinguishing rate limiting from
/// other failures.
#[derive(Debug, Clone)]
pub enum ModelError {
    /// Server returned 429 Too Many Requests.
    RateLimited { retry_after: Option<Duration> },
    /// Any other failure: timeout, network, HTTP error, empty reply.
    Unavailable(String),
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelError::RateLimited {
                retry_after: Some(d),
            } => write!(f, "Rate limited (429), retry after {:.1}s", d.as_secs_f64()),
            ModelError::RateLimited { retry_after: None } => write!(f, "Rate limited (429)"),
            ModelError::Unavailable(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ModelError {}

impl From<String> for ModelError {
    fn from(s: String) -> Self {
        ModelError::Unavailable(s)
    }
}

/// A language-model collaborator: prompt text in, reply text out.
pub trait ModelBackend: Send + Sync {
    /// The canonical name of this backend (e.g., "Gemini").
    fn name(&self) -> &str;

    /// Send one generation request and return the reply text.
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<String, ModelError>> + Send + 'a>>;
}
