//! Session runner: one harvest per fresh driver, retried across full restarts.
//!
//! Every attempt persists its accumulated records before the runner decides
//! what to do next, whether the attempt completed, failed, or was interrupted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::driver::{Driver, DriverFactory, Handshake};
use crate::export::RecordSink;
use crate::harvest::{HarvestLoop, HarvestState};
use crate::progress::{ProgressEventKind, ProgressReporter};
use crate::types::{HarvestError, HarvestOutcome, HarvestResult, SessionOutcome, SessionReport};

const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs harvest sessions with retry and persistence on every exit path.
pub struct SessionRunner<F, H, S> {
    factory: F,
    handshake: H,
    sink: S,
    harvest: HarvestLoop,
    shutdown: Arc<Notify>,
    progress: ProgressReporter,
    failure_screenshots: Option<PathBuf>,
    close_timeout: Duration,
}

impl<F, H, S> SessionRunner<F, H, S>
where
    F: DriverFactory,
    H: Handshake,
    S: RecordSink,
{
    pub fn new(factory: F, handshake: H, sink: S, harvest: HarvestLoop) -> Self {
        Self {
            factory,
            handshake,
            sink,
            harvest,
            shutdown: Arc::new(Notify::new()),
            progress: ProgressReporter::silent(),
            failure_screenshots: None,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    /// Notified by the caller to interrupt the running session.
    pub fn with_shutdown(mut self, shutdown: Arc<Notify>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Capture `<prefix>-failure-<attempt>.png` when an attempt errors.
    pub fn with_failure_screenshots(mut self, prefix: PathBuf) -> Self {
        self.failure_screenshots = Some(prefix);
        self
    }

    /// Upper bound on closing a driver before its records are persisted.
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Harvest up to `target` records, restarting the session on unexpected
    /// errors at most `max_session_retries` times.
    pub async fn run_session(
        &mut self,
        target: usize,
        max_session_retries: u32,
    ) -> HarvestResult<SessionReport> {
        let harvest = self.harvest.clone().with_target(target);
        let mut attempt = 0;
        loop {
            attempt += 1;
            tracing::info!("session attempt {attempt}/{}", max_session_retries + 1);
            self.progress
                .emit(ProgressEventKind::SessionStarted { attempt });

            let mut state = HarvestState::new();
            let result = self.attempt(&harvest, &mut state, attempt).await;
            let records = state.index.into_records();

            // The output always mirrors the sequence of the attempt that just ended.
            self.sink.persist(&records)?;
            tracing::info!(
                "persisted {} record(s) to {}",
                records.len(),
                self.sink.describe()
            );
            self.progress.emit(ProgressEventKind::Persisted {
                records: records.len(),
                target: self.sink.describe(),
            });

            let outcome = match result {
                Ok(outcome) => SessionOutcome::Completed(outcome),
                Err(HarvestError::Interrupted) => {
                    tracing::warn!("session interrupted with {} record(s)", records.len());
                    SessionOutcome::Interrupted
                }
                Err(e) => {
                    tracing::error!("session attempt {attempt} failed: {e}");
                    self.progress.emit(ProgressEventKind::SessionFailed {
                        attempt,
                        error: e.to_string(),
                    });
                    if attempt > max_session_retries {
                        return Err(HarvestError::SessionsExhausted {
                            attempts: attempt,
                            persisted: records.len(),
                            last: Box::new(e),
                        });
                    }
                    continue;
                }
            };
            return Ok(SessionReport {
                records,
                outcome,
                attempts: attempt,
            });
        }
    }

    async fn attempt(
        &mut self,
        harvest: &HarvestLoop,
        state: &mut HarvestState,
        attempt: u32,
    ) -> HarvestResult<HarvestOutcome> {
        let shutdown = Arc::clone(&self.shutdown);
        // Shutdown is polled first so a pending interrupt wins over further work.
        let mut driver = tokio::select! {
            biased;
            _ = shutdown.notified() => return Err(HarvestError::Interrupted),
            opened = self.factory.open() => opened?,
        };

        let result = tokio::select! {
            biased;
            _ = shutdown.notified() => Err(HarvestError::Interrupted),
            r = drive(&self.handshake, harvest, &mut driver, state, &mut self.progress) => r,
        };

        if let (Err(e), Some(prefix)) = (&result, &self.failure_screenshots) {
            if !matches!(e, HarvestError::Interrupted) {
                let mut name = prefix.as_os_str().to_owned();
                name.push(format!("-failure-{attempt}.png"));
                let path = PathBuf::from(name);
                match driver.screenshot(&path).await {
                    Ok(()) => tracing::info!("failure screenshot saved to {}", path.display()),
                    Err(e) => tracing::debug!("failure screenshot unavailable: {e}"),
                }
            }
        }
        match tokio::time::timeout(self.close_timeout, driver.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("closing driver failed: {e}"),
            Err(_) => tracing::warn!(
                "driver did not close within {}ms; abandoning it",
                self.close_timeout.as_millis()
            ),
        }
        result
    }
}

async fn drive<D: Driver, H: Handshake>(
    handshake: &H,
    harvest: &HarvestLoop,
    driver: &mut D,
    state: &mut HarvestState,
    progress: &mut ProgressReporter,
) -> HarvestResult<HarvestOutcome> {
    handshake.perform(driver).await?;
    harvest.run(&*driver, state, progress).await
}
