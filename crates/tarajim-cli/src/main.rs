use std::collections::HashSet;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use tarajim_core::config_file::{ConfigFile, load_config};
use tarajim_core::{AdaptiveLimiter, DEFAULT_MODEL, ProgressEvent, gemini::Gemini};
use tarajim_parsing::{EntryPattern, segment_text};
use tarajim_pdf::{MupdfBackend, PdfBackend};
use tarajim_reporting::{BookStore, write_summary};

mod output;

use output::ColorMode;

/// Tarajim - extract structured biographical records from Arabic PDF biography collections
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Segment a PDF and structure every entry into a per-book output folder
    Extract {
        /// Path to the PDF file
        file_path: PathBuf,

        /// Segmentation pattern (regex with two capture groups: ordinal, heading)
        #[arg(long)]
        pattern: Option<String>,

        /// Generative Language API key
        #[arg(long)]
        api_key: Option<String>,

        /// Model name
        #[arg(long)]
        model: Option<String>,

        /// Root directory for per-book output folders
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of concurrent workers
        #[arg(long)]
        workers: Option<usize>,

        /// Retries per entry after a service failure
        #[arg(long)]
        max_retries: Option<u32>,

        /// Skip entries already present in the book's index
        #[arg(long)]
        resume: bool,

        /// Write a consolidated merged.json after the run
        #[arg(long)]
        merge: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Preview how a PDF segments into entries, without calling the model
    Segment {
        /// Path to the PDF file
        file_path: PathBuf,

        /// Segmentation pattern (regex with two capture groups: ordinal, heading)
        #[arg(long)]
        pattern: Option<String>,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Extract {
            file_path,
            pattern,
            api_key,
            model,
            output,
            workers,
            max_retries,
            resume,
            merge,
            no_color,
        } => {
            extract(
                file_path,
                pattern,
                api_key,
                model,
                output,
                workers,
                max_retries,
                resume,
                merge,
                no_color,
            )
            .await
        }
        Command::Segment {
            file_path,
            pattern,
            no_color,
        } => segment(file_path, pattern, no_color),
    }
}

/// Resolve the segmentation pattern: CLI flag > config file > default.
fn resolve_pattern(
    flag: Option<String>,
    config: &ConfigFile,
) -> anyhow::Result<EntryPattern> {
    let configured = flag.or_else(|| {
        config
            .segmentation
            .as_ref()
            .and_then(|s| s.pattern.clone())
    });
    match configured {
        Some(p) => Ok(EntryPattern::new(&p)?),
        None => Ok(EntryPattern::default_numbered()),
    }
}

fn extract_pdf_text(file_path: &PathBuf) -> anyhow::Result<String> {
    if !file_path.exists() {
        anyhow::bail!("File not found: {}", file_path.display());
    }
    let backend = MupdfBackend::new();
    backend
        .extract_text(file_path)
        .map_err(|e| anyhow::anyhow!("PDF text extraction failed: {}", e))
}

fn book_name(file_path: &PathBuf) -> String {
    file_path
        .file_stem()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file_path.display().to_string())
}

#[allow(clippy::too_many_arguments)]
async fn extract(
    file_path: PathBuf,
    pattern: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    output: Option<PathBuf>,
    workers: Option<usize>,
    max_retries: Option<u32>,
    resume: bool,
    merge: bool,
    no_color: bool,
) -> anyhow::Result<()> {
    let file_config = load_config();

    // Resolve configuration: CLI flags > env vars > config file > defaults
    let api_key = api_key
        .or_else(|| std::env::var("GEMINI_API_KEY").ok())
        .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
        .or_else(|| file_config.api.as_ref().and_then(|a| a.api_key.clone()));
    let Some(api_key) = api_key else {
        anyhow::bail!(
            "No API key configured. Pass --api-key, set GEMINI_API_KEY (or GOOGLE_API_KEY), or add [api] api_key to .tarajim.toml"
        );
    };
    let model_name = model
        .or_else(|| std::env::var("GEMINI_MODEL").ok())
        .or_else(|| file_config.api.as_ref().and_then(|a| a.model.clone()))
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());
    let request_timeout_secs: u64 = std::env::var("TARAJIM_TIMEOUT")
        .ok()
        .and_then(|v| v.parse().ok())
        .or_else(|| {
            file_config
                .extraction
                .as_ref()
                .and_then(|e| e.request_timeout_secs)
        })
        .unwrap_or(30);
    let extraction_cfg = file_config.extraction.as_ref();
    let num_workers = workers
        .or_else(|| extraction_cfg.and_then(|e| e.num_workers))
        .unwrap_or(1);
    let max_retries = max_retries
        .or_else(|| extraction_cfg.and_then(|e| e.max_retries))
        .unwrap_or(3);
    let requests_per_minute = extraction_cfg
        .and_then(|e| e.requests_per_minute)
        .unwrap_or(15);
    let output_root = output
        .or_else(|| {
            extraction_cfg
                .and_then(|e| e.output_root.clone())
                .map(PathBuf::from)
        })
        .unwrap_or_else(|| PathBuf::from("."));

    let color = ColorMode(!no_color);
    let mut writer: Box<dyn Write> = Box::new(std::io::stdout());

    // Extract and segment before touching the output folder, so a wrong
    // pattern leaves no empty book directory behind.
    let text = extract_pdf_text(&file_path)?;
    let entry_pattern = resolve_pattern(pattern, &file_config)?;
    let chunks = segment_text(&text, &entry_pattern);

    let book = book_name(&file_path);
    output::print_segmentation_summary(&mut writer, &book, chunks.len())?;

    if chunks.is_empty() {
        anyhow::bail!(
            "No author entries matched the segmentation pattern `{}`; check your pattern",
            entry_pattern.as_str()
        );
    }

    let store = Arc::new(BookStore::open(&output_root, &book)?);
    let done: HashSet<usize> = if resume {
        store.completed_indices()?
    } else {
        HashSet::new()
    };

    let config = tarajim_core::Config {
        num_workers,
        request_timeout_secs,
        max_retries,
        requests_per_minute,
        limiter: Arc::new(AdaptiveLimiter::per_minute(requests_per_minute)),
    };

    let bar = ProgressBar::new(chunks.len() as u64);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {msg} [{bar:40.cyan/dim}] {pos}/{len} (eta {eta})",
        )
        .unwrap()
        .progress_chars("=> "),
    );
    bar.enable_steady_tick(std::time::Duration::from_millis(120));

    let progress_bar = bar.clone();
    let progress_cb = move |event: ProgressEvent| {
        if let ProgressEvent::Structuring { heading, .. } = &event {
            progress_bar.set_message(heading.clone());
        }
        if let Some(line) = output::progress_line(&event, color) {
            progress_bar.println(line);
        }
        if matches!(
            event,
            ProgressEvent::Result { .. }
                | ProgressEvent::ChunkFailed { .. }
                | ProgressEvent::SkippedResume { .. }
        ) {
            progress_bar.inc(1);
        }
    };

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_clone.cancel();
        }
    });

    let gemini = Arc::new(Gemini::new(model_name, api_key));
    let report = tarajim_core::run_document(
        chunks,
        config,
        gemini,
        store.clone(),
        done,
        progress_cb,
        cancel.clone(),
    )
    .await?;

    bar.finish_and_clear();

    if cancel.is_cancelled() {
        writeln!(writer, "Run cancelled; progress so far is in the index.")?;
    }

    let summary_path = write_summary(store.dir(), &report)?;
    output::print_run_summary(&mut writer, &report, color)?;
    writeln!(writer, "Summary written to {}", summary_path.display())?;

    if merge && report.succeeded > 0 {
        let merged = store.merge_records()?;
        writeln!(writer, "Merged records written to {}", merged.display())?;
    }

    Ok(())
}

fn segment(
    file_path: PathBuf,
    pattern: Option<String>,
    no_color: bool,
) -> anyhow::Result<()> {
    let color = ColorMode(!no_color);
    let mut writer: Box<dyn Write> = Box::new(std::io::stdout());

    let text = extract_pdf_text(&file_path)?;
    let entry_pattern = resolve_pattern(pattern, &load_config())?;
    let chunks = segment_text(&text, &entry_pattern);

    if chunks.is_empty() {
        anyhow::bail!(
            "No author entries matched the segmentation pattern `{}`; check your pattern",
            entry_pattern.as_str()
        );
    }

    output::print_segmentation_summary(&mut writer, &book_name(&file_path), chunks.len())?;
    for chunk in &chunks {
        output::print_chunk_preview(&mut writer, chunk, color)?;
    }
    writeln!(writer, "Total: {} entries", chunks.len())?;

    Ok(())
}
