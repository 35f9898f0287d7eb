use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use chrono::Utc;
use crossbeam_channel::bounded;
use tracing::{debug, error, info, info_span, warn};

use super::config::RunOptions;
use super::progress::{NoopObserver, RunObserver};
use super::summary::{Outcome, RunSummary};
use crate::catalog::{CatalogSource, ProductRecord};
use crate::db::{state_repo, Database, DatabaseError};
use crate::error::{EnricherError, Result};
use crate::generation::{DescriptionGenerator, ImageGenerator, RateLimiter};
use crate::state::{Phase, ProcessingState, ProcessingStatus, ProductId};
use crate::storage::ArtifactStore;

/// Why an attempt stopped before producing an outcome.
enum StepError {
    /// A generation or storage step failed; recorded against the record.
    Failed(String),
    /// Another run took the record over; this run leaves it alone.
    ClaimLost,
    Fatal(EnricherError),
}

impl From<DatabaseError> for StepError {
    fn from(e: DatabaseError) -> Self {
        StepError::Fatal(EnricherError::StateStore(e))
    }
}

/// State shared by every worker of one `run` invocation.
struct RunContext<'a> {
    options: &'a RunOptions,
    run_id: String,
    limiter: RateLimiter,
    reserved: AtomicUsize,
}

pub struct Orchestrator {
    db: Database,
    catalog: Arc<dyn CatalogSource>,
    images: Arc<dyn ImageGenerator>,
    descriptions: Arc<dyn DescriptionGenerator>,
    store: Arc<dyn ArtifactStore>,
    observer: Arc<dyn RunObserver>,
    shutdown: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(
        db: Database,
        catalog: Arc<dyn CatalogSource>,
        images: Arc<dyn ImageGenerator>,
        descriptions: Arc<dyn DescriptionGenerator>,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            db,
            catalog,
            images,
            descriptions,
            store,
            observer: Arc::new(NoopObserver),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Shares an externally owned shutdown flag (e.g. set from a signal
    /// handler). The run stops before claiming the next record.
    pub fn with_shutdown(mut self, shutdown: Arc<AtomicBool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Drives every eligible catalog record to an outcome.
    ///
    /// Per-record failures are recorded in the state store and never abort
    /// the run. Only catalog and state store failures are returned.
    pub fn run(&self, options: &RunOptions) -> Result<RunSummary> {
        options.validate()?;

        let ctx = RunContext {
            options,
            run_id: uuid::Uuid::new_v4().to_string(),
            limiter: RateLimiter::new(options.request_delay),
            reserved: AtomicUsize::new(0),
        };
        let _run_span = info_span!("enrichment_run", run_id = %ctx.run_id).entered();
        info!(
            batch_size = options.batch_size,
            max_attempts = options.max_attempts,
            request_delay_ms = options.request_delay.as_millis() as u64,
            workers = options.workers,
            max_records = ?options.max_records,
            "Starting enrichment run"
        );

        let mut summary = RunSummary::default();
        let result = self.drive(&ctx, &mut summary);
        self.observer.run_finished(&summary);

        match result {
            Ok(()) => {
                info!(
                    examined = summary.examined,
                    skipped = summary.skipped,
                    attempted = summary.attempted,
                    completed = summary.completed,
                    failed = summary.failed,
                    permanently_failed = summary.permanently_failed,
                    abandoned = summary.abandoned,
                    interrupted = summary.interrupted,
                    "Enrichment run finished"
                );
                Ok(summary)
            }
            Err(e) => {
                error!(error = %e, attempted = summary.attempted, "Enrichment run aborted");
                Err(e)
            }
        }
    }

    fn drive(&self, ctx: &RunContext<'_>, summary: &mut RunSummary) -> Result<()> {
        let batch_size = ctx.options.batch_size;
        let mut after = None;

        loop {
            let batch = self.catalog.fetch_batch(after, batch_size)?;
            let Some(last) = batch.last() else {
                break;
            };
            after = Some(last.id);
            debug!(records = batch.len(), last_id = last.id, "Fetched catalog batch");

            let stop = if ctx.options.workers > 1 && batch.len() > 1 {
                self.process_parallel(ctx, &batch, summary)?
            } else {
                self.process_sequential(ctx, &batch, summary)?
            };

            if stop || batch.len() < batch_size {
                break;
            }
        }

        Ok(())
    }

    fn process_sequential(
        &self,
        ctx: &RunContext<'_>,
        batch: &[ProductRecord],
        summary: &mut RunSummary,
    ) -> Result<bool> {
        for record in batch {
            let outcome = self.process_record(ctx, record)?;
            summary.record(outcome);
            if outcome.stops_run() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Fans a batch out over a bounded pool of scoped worker threads.
    /// Records are claimed atomically, so no record is attempted twice.
    fn process_parallel(
        &self,
        ctx: &RunContext<'_>,
        batch: &[ProductRecord],
        summary: &mut RunSummary,
    ) -> Result<bool> {
        let workers = ctx.options.workers.min(batch.len());
        let (sender, receiver) = bounded::<&ProductRecord>(workers * 2);
        let halt = AtomicBool::new(false);
        let failure: Mutex<Option<EnricherError>> = Mutex::new(None);

        let partials: Vec<RunSummary> = thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|worker_id| {
                    let receiver = receiver.clone();
                    let halt = &halt;
                    let failure = &failure;
                    scope.spawn(move || {
                        let mut local = RunSummary::default();
                        for record in receiver.iter() {
                            if halt.load(Ordering::SeqCst) {
                                break;
                            }
                            match self.process_record(ctx, record) {
                                Ok(outcome) => {
                                    local.record(outcome);
                                    if outcome.stops_run() {
                                        halt.store(true, Ordering::SeqCst);
                                        break;
                                    }
                                }
                                Err(e) => {
                                    debug!(worker_id, error = %e, "Worker stopping on fatal error");
                                    halt.store(true, Ordering::SeqCst);
                                    let mut slot =
                                        failure.lock().unwrap_or_else(|p| p.into_inner());
                                    slot.get_or_insert(e);
                                    break;
                                }
                            }
                        }
                        local
                    })
                })
                .collect();

            // Workers hold the only receivers; sends fail once all have exited.
            drop(receiver);
            for record in batch {
                if halt.load(Ordering::SeqCst) || sender.send(record).is_err() {
                    break;
                }
            }
            drop(sender);

            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                .collect()
        });

        for partial in &partials {
            summary.merge(partial);
        }
        if let Some(e) = failure.into_inner().unwrap_or_else(|p| p.into_inner()) {
            return Err(e);
        }
        Ok(halt.load(Ordering::SeqCst))
    }

    fn process_record(&self, ctx: &RunContext<'_>, record: &ProductRecord) -> Result<Outcome> {
        if self.shutdown.load(Ordering::SeqCst) {
            info!("Shutdown requested, stopping before next record");
            return Ok(Outcome::Interrupted);
        }

        let id = record.id;
        let _record_span = info_span!("enrich_record", product_id = id).entered();
        let max_attempts = ctx.options.max_attempts;

        let mut state = self.persist(ctx, id, || {
            state_repo::init_pending(&self.db, id, Utc::now())
        })?;

        if state.status.is_terminal() {
            debug!(status = %state.status, "Skipping terminal record");
            return Ok(Outcome::Skipped);
        }

        if state.attempt_count >= max_attempts {
            return self.promote(ctx, record, state);
        }

        if !self.reserve_slot(ctx) {
            info!("Record cap reached, stopping");
            return Ok(Outcome::CapReached);
        }

        let now = Utc::now();
        let claimed = self.persist(ctx, id, || {
            state_repo::claim(&self.db, id, &ctx.run_id, max_attempts, now)
        })?;
        if !claimed {
            self.release_slot(ctx);
            debug!("Record claimed elsewhere, skipping");
            return Ok(Outcome::Skipped);
        }
        debug_assert!(state.status.can_transition_to(ProcessingStatus::Processing));
        state.status = ProcessingStatus::Processing;
        state.claimed_by = Some(ctx.run_id.clone());
        state.phase = Some(Phase::Claimed);
        state.started_at = Some(now);
        state.updated_at = now;

        info!(
            attempt = state.attempt_count + 1,
            max_attempts, "Enriching record"
        );

        let outcome = match self.attempt(ctx, record) {
            Ok((image_uri, description)) => {
                state.complete(image_uri, description, Utc::now());
                Outcome::Completed
            }
            Err(StepError::Failed(message)) => {
                state.fail(message, max_attempts, Utc::now());
                if state.status == ProcessingStatus::PermanentlyFailed {
                    Outcome::PermanentlyFailed
                } else {
                    Outcome::Failed
                }
            }
            Err(StepError::ClaimLost) => {
                // The new holder concludes the attempt; this run's cap slot is freed.
                self.release_slot(ctx);
                warn!("Claim taken over by another run, abandoning attempt");
                return Ok(Outcome::Abandoned);
            }
            Err(StepError::Fatal(e)) => return Err(e),
        };

        debug_assert!(ProcessingStatus::Processing.can_transition_to(state.status));
        if !self.persist(ctx, id, || state_repo::put(&self.db, &state))? {
            warn!("Record became terminal elsewhere, outcome discarded");
            return Ok(Outcome::Skipped);
        }

        match outcome {
            Outcome::Completed => info!(
                attempt_count = state.attempt_count,
                image_uri = state.image_uri.as_deref().unwrap_or_default(),
                "Record completed"
            ),
            Outcome::PermanentlyFailed => warn!(
                attempt_count = state.attempt_count,
                error = state.last_error.as_deref().unwrap_or_default(),
                "Record permanently failed"
            ),
            _ => warn!(
                attempt_count = state.attempt_count,
                error = state.last_error.as_deref().unwrap_or_default(),
                "Attempt failed, record eligible for retry"
            ),
        }

        self.observer.record_concluded(record, &state);
        Ok(outcome)
    }

    /// Runs the three steps of one attempt, marking each phase durably
    /// before its external call.
    fn attempt(
        &self,
        ctx: &RunContext<'_>,
        record: &ProductRecord,
    ) -> std::result::Result<(String, String), StepError> {
        let id = record.id;

        let image = {
            let _step = info_span!("generate_image").entered();
            self.enter_phase(ctx, id, Phase::GeneratingImage)?;
            ctx.limiter.wait();
            self.images
                .generate_image(&record.attributes)
                .map_err(|e| {
                    debug!(transient = e.is_transient(), "Image generation failed");
                    StepError::Failed(format!("image generation failed: {}", e))
                })?
        };

        let description = {
            let _step = info_span!("generate_description").entered();
            self.enter_phase(ctx, id, Phase::GeneratingDescription)?;
            ctx.limiter.wait();
            self.descriptions
                .generate_description(&record.attributes, &image)
                .map_err(|e| {
                    debug!(transient = e.is_transient(), "Description generation failed");
                    StepError::Failed(format!("description generation failed: {}", e))
                })?
        };

        let image_uri = {
            let _step = info_span!("store_artifact").entered();
            self.enter_phase(ctx, id, Phase::StoringArtifact)?;
            ctx.limiter.wait();
            self.store
                .store_image(id, &image)
                .map_err(|e| StepError::Failed(format!("artifact storage failed: {}", e)))?
        };

        Ok((image_uri, description))
    }

    fn enter_phase(
        &self,
        ctx: &RunContext<'_>,
        id: ProductId,
        phase: Phase,
    ) -> std::result::Result<(), StepError> {
        let held = self.persist(ctx, id, || {
            state_repo::set_phase(&self.db, id, &ctx.run_id, phase, Utc::now())
        })?;
        if held {
            Ok(())
        } else {
            Err(StepError::ClaimLost)
        }
    }

    /// Marks a record whose budget was spent in earlier runs (for example
    /// before `max_attempts` was lowered) as permanently failed.
    fn promote(
        &self,
        ctx: &RunContext<'_>,
        record: &ProductRecord,
        mut state: ProcessingState,
    ) -> Result<Outcome> {
        let max_attempts = ctx.options.max_attempts;
        debug_assert!(state
            .status
            .can_transition_to(ProcessingStatus::PermanentlyFailed));
        state.status = ProcessingStatus::PermanentlyFailed;
        state.attempt_count = state.attempt_count.min(max_attempts);
        state.image_uri = None;
        state.description = None;
        state.phase = None;
        state.claimed_by = None;
        state.updated_at = Utc::now();
        if state.last_error.is_none() {
            state.last_error = Some(format!("attempt budget of {} exhausted", max_attempts));
        }

        if !self.persist(ctx, record.id, || state_repo::put(&self.db, &state))? {
            return Ok(Outcome::Skipped);
        }
        warn!(
            attempt_count = state.attempt_count,
            max_attempts, "Attempt budget already exhausted, marked permanently failed"
        );
        self.observer.record_concluded(record, &state);
        Ok(Outcome::Promoted)
    }

    fn reserve_slot(&self, ctx: &RunContext<'_>) -> bool {
        match ctx.options.max_records {
            None => true,
            Some(cap) => ctx
                .reserved
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                    (n < cap).then_some(n + 1)
                })
                .is_ok(),
        }
    }

    fn release_slot(&self, ctx: &RunContext<'_>) {
        if ctx.options.max_records.is_some() {
            ctx.reserved.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Runs a state store operation with bounded retries and linear backoff.
    fn persist<T>(
        &self,
        ctx: &RunContext<'_>,
        id: ProductId,
        mut op: impl FnMut() -> std::result::Result<T, DatabaseError>,
    ) -> std::result::Result<T, DatabaseError> {
        let attempts = ctx.options.state_write_retries.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts => {
                    warn!(attempt, error = %e, "State store write failed, retrying");
                    thread::sleep(ctx.options.state_write_backoff * attempt);
                    attempt += 1;
                }
                Err(e) => {
                    return Err(DatabaseError::WriteExhausted {
                        id,
                        attempts,
                        last: e.to_string(),
                    })
                }
            }
        }
    }
}
