use std::path::{Path, PathBuf};

use tarajim_core::RunReport;

use crate::store::StoreError;

/// Write the run report next to the records as `summary.json`.
pub fn write_summary(dir: &Path, report: &RunReport) -> Result<PathBuf, StoreError> {
    let path = dir.join("summary.json");
    let mut out = serde_json::to_string_pretty(report)?;
    out.push('\n');
    std::fs::write(&path, out)?;
    Ok(path)
}
