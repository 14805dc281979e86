use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use modwatch_core::{CommentRow, PostRow, TableKind};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::pacing::{ActiveWorkers, Pacer};
use crate::progress::{ProgressAggregator, ProgressSnapshot};
use crate::query::QueryBuilder;
use crate::run_log::{Level, RunLog};
use crate::settings::GatherSettings;
use crate::shutdown::ShutdownSignal;
use crate::traits::{BatchSink, Scorer, SearchSource};
use crate::worker::{GatherContext, GatherWorker, WorkerOutcome, WorkerReport};
use crate::GatherError;

const SUPERVISOR: &str = "supervisor";

/// Fans out one worker per community and coordinates their shutdown.
pub struct GatherSupervisor {
    settings: Arc<GatherSettings>,
    source: Arc<dyn SearchSource>,
    scorer: Option<Arc<dyn Scorer>>,
    sink: Arc<dyn BatchSink>,
    queries: QueryBuilder,
    log: RunLog,
    shutdown: ShutdownSignal,
    draw_progress: bool,
}

impl GatherSupervisor {
    #[must_use]
    pub fn new(
        settings: GatherSettings,
        source: Arc<dyn SearchSource>,
        sink: Arc<dyn BatchSink>,
        queries: QueryBuilder,
        log: RunLog,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            source,
            scorer: None,
            sink,
            queries,
            log,
            shutdown: ShutdownSignal::new(),
            draw_progress: false,
        }
    }

    /// Scores every post and comment before it is saved.
    #[must_use]
    pub fn with_scorer(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    /// Uses an externally owned signal, e.g. one wired to SIGINT.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    #[must_use]
    pub fn with_progress_bar(mut self, draw: bool) -> Self {
        self.draw_progress = draw;
        self
    }

    /// Reads the sink's header rows and spawns one worker per entity.
    ///
    /// # Errors
    ///
    /// Returns [`GatherError::Config`] for an empty entity list or one naming
    /// the same entity twice (ignoring case), or the sink's error if a header
    /// row cannot be read or written.
    pub async fn start(
        self,
        entities: &[String],
        per_entity_target: u64,
    ) -> Result<GatherRun, GatherError> {
        if entities.is_empty() {
            return Err(GatherError::Config(
                "at least one community is required".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = entities.iter().find(|e| !seen.insert(e.to_lowercase())) {
            return Err(GatherError::Config(format!("duplicate community: '{dup}'")));
        }

        let attributes = &self.settings.attributes;
        let post_columns = self
            .sink
            .ensure_header(TableKind::Posts, &PostRow::columns(attributes))
            .await?;
        let comment_columns = self
            .sink
            .ensure_header(TableKind::Comments, &CommentRow::columns(attributes))
            .await?;

        let progress = Arc::new(ProgressAggregator::new(
            entities,
            per_entity_target,
            self.draw_progress,
        ));
        let active = ActiveWorkers::new();
        let ctx = GatherContext {
            settings: Arc::clone(&self.settings),
            source: self.source,
            scorer: self.scorer,
            sink: self.sink,
            post_columns: post_columns.into(),
            comment_columns: comment_columns.into(),
            queries: self.queries,
            progress: Arc::clone(&progress),
            log: self.log.clone(),
            shutdown: self.shutdown.clone(),
            upstream_pacer: Pacer::new(self.settings.pacing_interval, active.clone()),
            scoring_pacer: Pacer::new(self.settings.scoring_pacing_interval, active.clone()),
        };

        self.log.log(
            Level::Info,
            SUPERVISOR,
            "-",
            format!(
                "Starting gather run: {} communities, {per_entity_target} posts each",
                entities.len()
            ),
        );

        // Every worker is counted before the first one paces.
        let guards: Vec<_> = entities.iter().map(|_| active.enter()).collect();
        let handles = entities
            .iter()
            .zip(guards)
            .enumerate()
            .map(|(index, (entity, guard))| {
                let worker = GatherWorker::new(
                    format!("worker-{}", index + 1),
                    entity.clone(),
                    per_entity_target,
                    ctx.clone(),
                    guard,
                );
                (entity.clone(), tokio::spawn(worker.run()))
            })
            .collect();

        Ok(GatherRun {
            handles,
            progress,
            active,
            shutdown: self.shutdown,
            log: self.log,
            settings: self.settings,
            per_entity_target,
            started: Instant::now(),
        })
    }
}

/// A started run. Call [`GatherRun::wait`] to supervise it to the end.
pub struct GatherRun {
    handles: Vec<(String, JoinHandle<WorkerReport>)>,
    progress: Arc<ProgressAggregator>,
    active: ActiveWorkers,
    shutdown: ShutdownSignal,
    log: RunLog,
    settings: Arc<GatherSettings>,
    per_entity_target: u64,
    started: Instant,
}

/// Final state of a run.
#[derive(Debug, Clone)]
pub struct GatherSummary {
    /// Number of workers the run started.
    pub workers: usize,
    pub reports: Vec<WorkerReport>,
    /// Entities whose worker failed or panicked.
    pub failed: Vec<String>,
    /// Entities whose worker had not exited when the grace period ran out.
    pub unfinished: Vec<String>,
    pub progress: ProgressSnapshot,
    pub elapsed: Duration,
    pub cancelled: bool,
}

impl GatherSummary {
    /// `true` when every worker ended with a worker-fatal error.
    #[must_use]
    pub fn all_failed(&self) -> bool {
        !self.failed.is_empty()
            && self.unfinished.is_empty()
            && self.failed.len() == self.workers
    }
}

impl GatherRun {
    #[must_use]
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    #[must_use]
    pub fn progress(&self) -> ProgressSnapshot {
        self.progress.snapshot()
    }

    /// Polls the workers until all have exited or shutdown is signalled, then
    /// waits up to the grace period for the rest. Workers are never aborted.
    /// Stops the run log before returning.
    pub async fn wait(self) -> GatherSummary {
        let mut last_status = Instant::now();
        while !self.all_finished() && !self.shutdown.is_triggered() {
            tokio::select! {
                () = tokio::time::sleep(self.settings.poll_interval) => {}
                () = self.shutdown.triggered() => {}
            }
            if last_status.elapsed() >= self.settings.status_interval {
                self.log_status();
                last_status = Instant::now();
            }
        }

        let cancelled = self.shutdown.is_triggered();
        if cancelled {
            self.log.log(
                Level::Warn,
                SUPERVISOR,
                "-",
                format!(
                    "Shutdown requested; waiting up to {}s for workers to exit",
                    self.settings.grace_period.as_secs()
                ),
            );
        }

        let deadline = Instant::now() + self.settings.grace_period;
        let workers = self.handles.len();
        let mut reports = Vec::new();
        let mut failed = Vec::new();
        let mut unfinished = Vec::new();
        for (entity, handle) in self.handles {
            let joined = if cancelled {
                tokio::time::timeout_at(deadline, handle).await
            } else {
                Ok(handle.await)
            };
            match joined {
                Ok(Ok(report)) => {
                    if matches!(report.outcome, WorkerOutcome::Failed(_)) {
                        failed.push(entity);
                    }
                    reports.push(report);
                }
                Ok(Err(e)) => {
                    self.log.log(
                        Level::Error,
                        SUPERVISOR,
                        &entity,
                        format!("Worker task ended abnormally: {e}"),
                    );
                    failed.push(entity);
                }
                Err(_) => {
                    self.log.log(
                        Level::Warn,
                        SUPERVISOR,
                        &entity,
                        "Worker still running after grace period",
                    );
                    unfinished.push(entity);
                }
            }
        }

        self.progress.finish();
        let progress = self.progress.snapshot();
        for entity in progress.short_of(self.per_entity_target) {
            self.log.log(
                Level::Warn,
                SUPERVISOR,
                entity,
                format!(
                    "Requested {} of {} target posts",
                    progress.per_entity.get(entity).copied().unwrap_or(0),
                    self.per_entity_target
                ),
            );
        }
        let elapsed = self.started.elapsed();
        self.log.log(
            Level::Info,
            SUPERVISOR,
            "-",
            format!(
                "Gather run finished in {}s: requested {}/{} posts, {} failed, {} unfinished",
                elapsed.as_secs(),
                progress.total,
                progress.target_total,
                failed.len(),
                unfinished.len()
            ),
        );
        if let Err(e) = self.log.stop().await {
            tracing::warn!(error = %e, "failed to flush run log");
        }

        GatherSummary {
            workers,
            reports,
            failed,
            unfinished,
            progress,
            elapsed,
            cancelled,
        }
    }

    fn all_finished(&self) -> bool {
        self.handles.iter().all(|(_, handle)| handle.is_finished())
    }

    fn log_status(&self) {
        let running = self
            .handles
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .count();
        let snapshot = self.progress.snapshot();
        self.log.log(
            Level::Info,
            SUPERVISOR,
            "-",
            format!(
                "Status: {running}/{} workers active (pacing across {}), {}s elapsed, requested {}/{} posts",
                self.handles.len(),
                self.active.count(),
                self.started.elapsed().as_secs(),
                snapshot.total,
                snapshot.target_total
            ),
        );
    }
}
