use std::path::PathBuf;

use crate::record::AuthorRecord;

/// Boxed error for sink implementations; the run loop only needs a message.
pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Persistence seam between the run loop and storage.
///
/// `persist` writes the record file and appends its index entry as one
/// logical step, returning the record's path. The runner calls it in
/// original chunk order, which is what keeps the index append-only and
/// ordered.
pub trait RecordSink: Send + Sync {
    fn persist(&self, index: usize, record: &AuthorRecord) -> Result<PathBuf, SinkError>;
}
