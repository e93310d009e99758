use std::io::Write;

use owo_colors::OwoColorize;
use tarajim_core::{FailureKind, ProgressEvent, RunReport};
use tarajim_parsing::AuthorChunk;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

fn shorten(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{}...", cut)
    } else {
        s.to_string()
    }
}

/// Print the segmentation summary after PDF parsing.
pub fn print_segmentation_summary(
    w: &mut dyn Write,
    book_name: &str,
    total_entries: usize,
) -> std::io::Result<()> {
    writeln!(w, "Segmenting {}...", book_name)?;
    writeln!(w, "Found {} author entries to structure", total_entries)?;
    writeln!(w)?;
    Ok(())
}

/// Render a progress event as a printable line. `None` means the event only
/// updates transient state (spinner message), not the log.
pub fn progress_line(event: &ProgressEvent, color: ColorMode) -> Option<String> {
    match event {
        ProgressEvent::Structuring { .. } => None,
        ProgressEvent::Result {
            index,
            total,
            name,
            file,
        } => {
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            Some(if color.enabled() {
                format!(
                    "[{}/{}] -> {} {} ({})",
                    index,
                    total,
                    "SAVED".green(),
                    shorten(name, 50),
                    file_name
                )
            } else {
                format!(
                    "[{}/{}] -> SAVED {} ({})",
                    index,
                    total,
                    shorten(name, 50),
                    file_name
                )
            })
        }
        ProgressEvent::ChunkFailed {
            index,
            total,
            heading,
            message,
        } => Some(if color.enabled() {
            format!(
                "[{}/{}] -> {} {}: {}",
                index,
                total,
                "FAILED".red(),
                shorten(heading, 50),
                message
            )
        } else {
            format!(
                "[{}/{}] -> FAILED {}: {}",
                index,
                total,
                shorten(heading, 50),
                message
            )
        }),
        ProgressEvent::Retrying {
            index,
            total,
            attempt,
            backoff,
        } => Some(if color.enabled() {
            format!(
                "[{}/{}] {} attempt {} in {:.0?}",
                index,
                total,
                "retrying".yellow(),
                attempt,
                backoff
            )
        } else {
            format!(
                "[{}/{}] retrying attempt {} in {:.0?}",
                index, total, attempt, backoff
            )
        }),
        ProgressEvent::SkippedResume { index, total } => Some(if color.enabled() {
            format!("[{}/{}] {}", index, total, "skipped (already in index)".dimmed())
        } else {
            format!("[{}/{}] skipped (already in index)", index, total)
        }),
    }
}

/// Print the final run summary: how many of N entries succeeded, which
/// indices failed and why.
pub fn print_run_summary(
    w: &mut dyn Write,
    report: &RunReport,
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(w)?;
    let line = format!(
        "Structured {} of {} entries ({} skipped via resume)",
        report.succeeded,
        report.total,
        report.skipped_resume.len()
    );
    if color.enabled() && report.failed.is_empty() {
        writeln!(w, "{}", line.green())?;
    } else {
        writeln!(w, "{}", line)?;
    }

    if !report.failed.is_empty() {
        let header = format!("{} entries failed:", report.failed.len());
        if color.enabled() {
            writeln!(w, "{}", header.red())?;
        } else {
            writeln!(w, "{}", header)?;
        }
        for failure in &report.failed {
            let kind = match failure.kind {
                FailureKind::MalformedExtraction => "malformed",
                FailureKind::ServiceUnavailable => "service unavailable",
                FailureKind::Storage => "storage",
            };
            writeln!(
                w,
                "  [{}] {} - {} ({})",
                failure.index,
                shorten(&failure.heading, 60),
                kind,
                failure.message
            )?;
        }
        writeln!(w, "Re-run with --resume to retry only the failed entries.")?;
    }

    Ok(())
}

/// Print one chunk in the `segment` preview.
pub fn print_chunk_preview(
    w: &mut dyn Write,
    chunk: &AuthorChunk,
    color: ColorMode,
) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "{}", format!("[{}]", chunk.index).bold().yellow())?;
    } else {
        writeln!(w, "[{}]", chunk.index)?;
    }
    writeln!(w, "  Ordinal: {}", chunk.ordinal)?;
    writeln!(w, "  Heading: {}", chunk.heading)?;

    let body_display: String = chunk.body.split_whitespace().collect::<Vec<_>>().join(" ");
    let body_display = shorten(&body_display, 200);
    if !body_display.is_empty() {
        if color.enabled() {
            writeln!(w, "  Body:    {}", body_display.dimmed())?;
        } else {
            writeln!(w, "  Body:    {}", body_display)?;
        }
    }
    writeln!(w)?;
    Ok(())
}
