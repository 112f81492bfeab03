//! Harvest one or more search queries into per-query export files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::Notify;

use lead_harvest::config::ExportFormat;
use lead_harvest::progress::{self, ProgressReporter};
use lead_harvest::{
    sink_for, HarvestConfig, HarvestError, HarvestLoop, HarvestResult, SearchHandshake,
    SessionOutcome, SessionReport, SessionRunner,
};

use crate::cli::{output, progress_view};
use crate::renderer::chromium::ChromiumFactory;
use crate::renderer::BrowserOptions;

/// Where fields are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Read every field from the result card in the list.
    Card,
    /// Click each card and read the detail panel.
    Detail,
}

#[derive(Debug, Args)]
pub struct HarvestArgs {
    /// Search queries, e.g. "coffee shops in Brooklyn"
    pub queries: Vec<String>,

    /// File with one query per line (blank lines and '#' comments ignored)
    #[arg(long, short = 'f')]
    pub queries_file: Option<PathBuf>,

    /// JSON config file; missing fields take their defaults
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Built-in selector preset, used when no config file is given
    #[arg(long, value_enum, default_value = "card")]
    pub mode: Mode,

    /// Records to collect per query
    #[arg(long, short)]
    pub target: Option<usize>,

    /// Full session restarts allowed after an unexpected failure
    #[arg(long)]
    pub retries: Option<u32>,

    /// Output directory
    #[arg(long, short)]
    pub output_dir: Option<PathBuf>,

    /// Export format (csv, json)
    #[arg(long)]
    pub format: Option<ExportFormat>,

    /// Show the browser window
    #[arg(long)]
    pub headful: bool,

    /// Chromium binary to use instead of auto-detection
    #[arg(long)]
    pub chromium: Option<PathBuf>,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Skip failure screenshots
    #[arg(long)]
    pub no_screenshots: bool,
}

/// Final result of one query, as printed in the summary.
#[derive(Debug, Serialize)]
struct QuerySummary {
    query: String,
    output: String,
    records: usize,
    outcome: Option<SessionOutcome>,
    attempts: u32,
    error: Option<String>,
    elapsed_secs: i64,
}

pub async fn run(args: HarvestArgs) -> Result<()> {
    let queries = collect_queries(&args.queries, args.queries_file.as_deref())?;
    if queries.is_empty() {
        bail!("no queries given; pass them as arguments or with --queries-file");
    }

    let mut config = resolve_config(args.config.as_deref(), args.mode)?;
    apply_flags(&mut config, &args);
    config.validate().context("invalid configuration")?;

    let options = BrowserOptions {
        executable: args.chromium.clone(),
        headless: !args.headful,
        ..BrowserOptions::default()
    };

    let shutdown = Arc::new(Notify::new());
    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            let signals = Box::pin(futures::stream::unfold((), |()| async {
                tokio::signal::ctrl_c().await.ok().map(|()| ((), ()))
            }));
            if relay_interrupts(signals, &shutdown).await > 1 {
                eprintln!("  Second interrupt; exiting without saving.");
                std::process::exit(130);
            }
        });
    }

    let show_progress = !args.no_progress && !output::is_quiet() && !output::is_json();
    let mut summaries = Vec::with_capacity(queries.len());
    for (i, query) in queries.iter().enumerate() {
        tracing::info!("query {}/{}: {query:?}", i + 1, queries.len());
        let summary = harvest_query(
            query,
            &config,
            &options,
            &shutdown,
            show_progress,
            !args.no_screenshots,
        )
        .await?;
        let interrupted = summary.outcome == Some(SessionOutcome::Interrupted);
        summaries.push(summary);
        if interrupted {
            tracing::warn!("stopping after interrupt; {} query(ies) not run", queries.len() - i - 1);
            break;
        }
    }

    print_summary(&summaries);
    let failed = summaries.iter().filter(|s| s.error.is_some()).count();
    if failed > 0 {
        bail!("{failed} of {} query(ies) failed", summaries.len());
    }
    Ok(())
}

async fn harvest_query(
    query: &str,
    config: &HarvestConfig,
    options: &BrowserOptions,
    shutdown: &Arc<Notify>,
    show_progress: bool,
    screenshots: bool,
) -> Result<QuerySummary> {
    let started = chrono::Utc::now();
    let slug = slugify(query);
    let sink = sink_for(&config.output, &slug);
    let destination = sink.describe();

    let (tx, rx) = progress::channel();
    let run_id = uuid::Uuid::new_v4().to_string();
    let view = if show_progress {
        Some(progress_view::spawn(rx, config.target, slug.clone())?)
    } else {
        drop(rx);
        None
    };

    let mut runner = SessionRunner::new(
        ChromiumFactory::from_config(options.clone(), config),
        SearchHandshake::from_config(query, config),
        sink,
        HarvestLoop::from_config(config),
    )
    .with_shutdown(Arc::clone(shutdown))
    .with_progress(ProgressReporter::new(Some(tx), run_id));
    if screenshots {
        runner = runner.with_failure_screenshots(config.output.dir.join(&slug));
    }

    let result = runner
        .run_session(config.target, config.max_session_retries)
        .await;
    // Dropping the runner closes the progress channel.
    drop(runner);
    if let Some(view) = view {
        let _ = view.await;
    }

    let elapsed_secs = (chrono::Utc::now() - started).num_seconds();
    Ok(summarize(query, destination, result, elapsed_secs))
}

/// Forward the first interrupt to `shutdown`. Returns once a second
/// interrupt arrives (2) or the signal stream ends.
async fn relay_interrupts<S>(mut signals: S, shutdown: &Notify) -> usize
where
    S: Stream<Item = ()> + Unpin,
{
    let mut seen = 0;
    while signals.next().await.is_some() {
        seen += 1;
        if seen > 1 {
            break;
        }
        tracing::warn!("interrupt received; saving collected records (press Ctrl-C again to force exit)");
        shutdown.notify_one();
    }
    seen
}

fn summarize(
    query: &str,
    destination: String,
    result: HarvestResult<SessionReport>,
    elapsed_secs: i64,
) -> QuerySummary {
    match result {
        Ok(report) => {
            tracing::info!(
                "{query:?}: {} record(s) in {} attempt(s) -> {destination}",
                report.records.len(),
                report.attempts
            );
            QuerySummary {
                query: query.to_string(),
                output: destination,
                records: report.records.len(),
                outcome: Some(report.outcome),
                attempts: report.attempts,
                error: None,
                elapsed_secs,
            }
        }
        Err(e) => {
            tracing::error!("{query:?} failed: {e}");
            let (attempts, persisted) = match &e {
                HarvestError::SessionsExhausted {
                    attempts,
                    persisted,
                    ..
                } => (*attempts, *persisted),
                _ => (0, 0),
            };
            QuerySummary {
                query: query.to_string(),
                output: destination,
                records: persisted,
                outcome: None,
                attempts,
                error: Some(e.to_string()),
                elapsed_secs,
            }
        }
    }
}

/// Base config from a file or a built-in preset, with env overrides applied.
pub fn resolve_config(path: Option<&Path>, mode: Mode) -> Result<HarvestConfig> {
    let mut config = match path {
        Some(path) => HarvestConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => match mode {
            Mode::Card => HarvestConfig::default(),
            Mode::Detail => HarvestConfig::detail_preset(),
        },
    };
    config.apply_env_overrides();
    Ok(config)
}

fn apply_flags(config: &mut HarvestConfig, args: &HarvestArgs) {
    if let Some(target) = args.target {
        config.target = target;
    }
    if let Some(retries) = args.retries {
        config.max_session_retries = retries;
    }
    if let Some(dir) = &args.output_dir {
        config.output.dir = dir.clone();
    }
    if let Some(format) = args.format {
        config.output.format = format;
    }
}

/// Positional queries followed by the non-empty, non-comment lines of `file`.
pub fn collect_queries(positional: &[String], file: Option<&Path>) -> Result<Vec<String>> {
    let mut queries: Vec<String> = positional
        .iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .collect();
    if let Some(file) = file {
        let raw = std::fs::read_to_string(file)
            .with_context(|| format!("failed to read queries from {}", file.display()))?;
        queries.extend(
            raw.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(str::to_string),
        );
    }
    Ok(queries)
}

/// File-name stem for a query: lowercase ASCII alphanumerics joined by `-`.
pub fn slugify(query: &str) -> String {
    let mut slug = String::with_capacity(query.len());
    for ch in query.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
        if slug.len() >= 80 {
            break;
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "query".to_string()
    } else {
        slug.to_string()
    }
}

fn print_summary(summaries: &[QuerySummary]) {
    if output::is_json() {
        output::print_json(&summaries);
        return;
    }
    println!();
    for s in summaries {
        match (&s.error, &s.outcome) {
            (Some(err), _) if s.records > 0 => println!(
                "  [!!] {}: {err}; partial output of {} record(s) kept in {}",
                s.query, s.records, s.output
            ),
            (Some(err), _) => println!("  [!!] {}: {err}", s.query),
            (None, Some(SessionOutcome::Interrupted)) => println!(
                "  [--] {}: interrupted, {} record(s) saved to {}",
                s.query, s.records, s.output
            ),
            (None, Some(SessionOutcome::Completed(outcome))) => println!(
                "  [OK] {}: {} record(s), {outcome}, {}s -> {}",
                s.query, s.records, s.elapsed_secs, s.output
            ),
            (None, None) => {}
        }
    }
}
