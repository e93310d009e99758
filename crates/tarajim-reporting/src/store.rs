use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tarajim_core::{AuthorRecord, RecordSink, SinkError};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One line of `index.jsonl`: which record file holds which entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub index: usize,
    pub file: String,
    pub name: String,
}

/// Make a string safe for filenames: Unicode alphanumerics, `-` and `_`
/// pass through (Arabic names stay readable), everything else becomes `_`.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Per-book output folder: one JSON file per record plus `index.jsonl`.
///
/// The index is append-only, one line per persisted record in processing
/// order, so a partially written folder is a recoverable state: scanning
/// the index tells a resumed run which entries are already done.
pub struct BookStore {
    dir: PathBuf,
}

impl BookStore {
    /// Open (creating if needed) the output folder for `book_name` under `root`.
    pub fn open(root: &Path, book_name: &str) -> Result<Self, StoreError> {
        let dir = root.join(sanitize_name(book_name));
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn index_path(&self) -> PathBuf {
        self.dir.join("index.jsonl")
    }

    fn record_filename(index: usize, record: &AuthorRecord) -> String {
        format!("{:03}_{}.json", index, sanitize_name(&record.name))
    }

    /// Write the record file, then append its index line. Writing the same
    /// record for the same index twice produces byte-identical output.
    pub fn save_record(
        &self,
        index: usize,
        record: &AuthorRecord,
    ) -> Result<PathBuf, StoreError> {
        let file_name = Self::record_filename(index, record);
        let path = self.dir.join(&file_name);
        std::fs::write(&path, record.to_canonical_json())?;

        let entry = IndexEntry {
            index,
            file: file_name,
            name: record.name.clone(),
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut index_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.index_path())?;
        index_file.write_all(line.as_bytes())?;

        tracing::debug!(index, file = %path.display(), "record saved");
        Ok(path)
    }

    /// Read the index in stored order. A missing index file means an empty
    /// (fresh) book folder. Unparseable lines (a torn final line from
    /// an interrupted append) are skipped with a warning.
    pub fn load_index(&self) -> Result<Vec<IndexEntry>, StoreError> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(path)?;
        let entries = content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| match serde_json::from_str::<IndexEntry>(l) {
                Ok(e) => Some(e),
                Err(err) => {
                    tracing::warn!(line = l, error = %err, "skipping bad index line");
                    None
                }
            })
            .collect();
        Ok(entries)
    }

    /// Entry indices already covered by the index, i.e. what a resumed run skips.
    pub fn completed_indices(&self) -> Result<HashSet<usize>, StoreError> {
        Ok(self.load_index()?.into_iter().map(|e| e.index).collect())
    }

    /// Write every stored record into one consolidated JSON document
    /// (`merged.json`), ordered by entry index.
    pub fn merge_records(&self) -> Result<PathBuf, StoreError> {
        #[derive(Serialize)]
        struct MergedEntry {
            index: usize,
            record: AuthorRecord,
        }

        let mut entries = self.load_index()?;
        entries.sort_by_key(|e| e.index);

        let mut merged = Vec::with_capacity(entries.len());
        for entry in entries {
            let content = std::fs::read_to_string(self.dir.join(&entry.file))?;
            let record = AuthorRecord::from_json_str(&content)?;
            merged.push(MergedEntry {
                index: entry.index,
                record,
            });
        }

        let path = self.dir.join("merged.json");
        let mut out = serde_json::to_string_pretty(&merged)?;
        out.push('\n');
        std::fs::write(&path, out)?;
        Ok(path)
    }
}

impl RecordSink for BookStore {
    fn persist(&self, index: usize, record: &AuthorRecord) -> Result<PathBuf, SinkError> {
        Ok(self.save_record(index, record)?)
    }
}
