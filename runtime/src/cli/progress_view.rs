//! Terminal progress bar fed by the harvest progress channel.

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use lead_harvest::progress::{ProgressEventKind, ProgressReceiver};

/// Render events from `rx` until every sender is dropped.
pub fn spawn(mut rx: ProgressReceiver, target: usize, label: String) -> Result<JoinHandle<()>> {
    let bar = ProgressBar::new(target as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner} {prefix:.bold} [{elapsed_precise}] {bar:30} {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );
    bar.set_prefix(label);

    Ok(tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => apply(&bar, &event.event),
                Err(RecvError::Lagged(missed)) => {
                    tracing::debug!("progress view skipped {missed} event(s)");
                }
                Err(RecvError::Closed) => break,
            }
        }
        bar.finish_and_clear();
    }))
}

fn apply(bar: &ProgressBar, event: &ProgressEventKind) {
    match event {
        ProgressEventKind::SessionStarted { attempt } if *attempt > 1 => {
            bar.set_position(0);
            bar.set_message(format!("retry #{}", attempt - 1));
        }
        ProgressEventKind::RecordAccepted { name, total, .. } => {
            bar.set_position(*total as u64);
            bar.set_message(name.clone());
        }
        ProgressEventKind::CycleCompleted {
            cycle,
            visible,
            no_progress,
            ..
        } => {
            bar.tick();
            if *no_progress > 0 {
                bar.set_message(format!("cycle {cycle}: {visible} visible, idle x{no_progress}"));
            }
        }
        ProgressEventKind::SessionFailed { attempt, error } => {
            bar.println(format!("  attempt {attempt} failed: {error}"));
        }
        ProgressEventKind::HarvestCompleted { outcome, total } => {
            bar.set_position(*total as u64);
            bar.set_message(outcome.to_string());
        }
        ProgressEventKind::Persisted { records, target } => {
            bar.set_message(format!("saved {records} to {target}"));
        }
        _ => {}
    }
}
