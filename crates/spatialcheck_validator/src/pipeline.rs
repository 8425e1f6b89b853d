//! The six-stage validation pipeline.
//!
//! A run opens the target (stage 0), then executes the table, schema,
//! geometry, attribute and relation stages strictly in order against the
//! open data source. Each stage emits a start event and a terminal event
//! carrying a snapshot of the result so far; stages 3 to 5 also emit
//! throttled intermediate events. Every event carries a live remaining-time
//! estimate.
//!
//! A stage that fails does not stop the run. Only a target that cannot be
//! opened fails the run, and cancellation ends it early with the partial
//! result.

use crate::eta::{DatasetProfile, RemainingTimeEstimator, TimePredictor};
use crate::progress::{ProgressSink, ProgressThrottle, overall_percent};
use crate::relation::{StrategyRegistry, run_relation_stage};
use crate::stages::{
    StageContext, StageTick, run_attribute_stage, run_geometry_stage, run_schema_stage,
    run_table_stage,
};
use crate::{DataSourcePool, StageError, ValidationOptions};
use chrono::Utc;
use spatialcheck_core::{
    DataSource, GeometryEngine, ProgressEvent, RunHistoryStore, RunStatistics, RunStatus,
    Severity, Stage, StageConfigs, StageId, StageResult, StageStatus, Target, TargetOpener,
    ValidationError, ValidationResult,
};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const DATA_SOURCE_OPEN_FAILED: &str = "DATA_SOURCE_OPEN_FAILED";
pub const PRE_NO_LAYERS: &str = "PRE_NO_LAYERS";

/// Status and progress of the six stages of one run.
#[derive(Debug, Clone)]
pub struct StageTracker {
    stages: Vec<Stage>,
}

impl Default for StageTracker {
    fn default() -> Self {
        Self {
            stages: StageId::ALL.into_iter().map(Stage::new).collect(),
        }
    }
}

impl StageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self, id: StageId) -> &Stage {
        &self.stages[id.number()]
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    fn stage_mut(&mut self, id: StageId) -> &mut Stage {
        &mut self.stages[id.number()]
    }

    /// Marks a stage running.
    pub fn start(&mut self, id: StageId) {
        let stage = self.stage_mut(id);
        stage.status = StageStatus::Running;
        stage.progress = 0.0;
    }

    /// Raises a stage's progress; progress never goes backwards.
    pub fn update(&mut self, id: StageId, progress: f64) {
        let stage = self.stage_mut(id);
        stage.progress = stage.progress.max(progress.clamp(0.0, 100.0));
    }

    /// Closes a stage and queues the next one.
    ///
    /// The next stage becomes `Pending` only if it has not been touched yet,
    /// so repeating a transition is harmless.
    pub fn finish(&mut self, id: StageId, status: StageStatus) {
        let stage = self.stage_mut(id);
        stage.status = status;
        stage.progress = 100.0;
        if let Some(next) = id.next() {
            let next = self.stage_mut(next);
            if next.status == StageStatus::NotStarted {
                next.status = StageStatus::Pending;
            }
        }
    }

    /// Overall run progress while `current` is the active stage.
    pub fn overall_progress(&self, current: StageId) -> f64 {
        overall_percent(current, self.stage(current).progress)
    }
}

struct RunProgressState {
    tracker: StageTracker,
    estimator: RemainingTimeEstimator,
    throttle: ProgressThrottle,
    predicted_total: f64,
}

/// Progress bookkeeping of one run; emits to the caller's sink.
struct RunProgress<'s> {
    sink: &'s dyn ProgressSink,
    started: Instant,
    state: Mutex<RunProgressState>,
}

impl<'s> RunProgress<'s> {
    fn new(sink: &'s dyn ProgressSink, options: &ValidationOptions, predicted_total: f64) -> Self {
        Self {
            sink,
            started: Instant::now(),
            state: Mutex::new(RunProgressState {
                tracker: StageTracker::new(),
                estimator: RemainingTimeEstimator::new(),
                throttle: ProgressThrottle::new(options.progress_interval),
                predicted_total,
            }),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut RunProgressState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    fn set_prediction(&self, predicted_total: f64) {
        self.with_state(|s| s.predicted_total = predicted_total);
    }

    fn event(&self, state: &mut RunProgressState, stage: StageId, message: String) -> ProgressEvent {
        state.estimator.observe(stage);
        let mut event = ProgressEvent::new(stage, message);
        event.overall_progress = state.tracker.overall_progress(stage);
        event.stage_progress = state.tracker.stage(stage).progress;
        event.eta = Some(state.estimator.estimate_remaining(
            self.started.elapsed().as_secs_f64(),
            event.overall_progress / 100.0,
            state.predicted_total,
        ));
        event
    }

    fn start_stage(&self, stage: StageId, result: &ValidationResult) {
        let mut event = self.with_state(|s| {
            s.tracker.start(stage);
            self.event(s, stage, format!("{} started", stage.name()))
        });
        event.error_count = result.error_count();
        event.warning_count = result.warning_count();
        self.sink.emit(event);
    }

    fn tick(&self, stage: StageId, tick: StageTick) {
        let event = self.with_state(|s| {
            if !tick.force && !s.throttle.should_emit(false) {
                return None;
            }
            s.tracker.update(stage, tick.progress);
            let mut event = self.event(s, stage, tick.message);
            event.current_rule = tick.current_rule;
            event.processed_units = tick.processed;
            event.total_units = tick.total;
            event.error_count = tick.error_count;
            event.warning_count = tick.warning_count;
            Some(event)
        });
        if let Some(event) = event {
            self.sink.emit(event);
        }
    }

    /// Emits the terminal event of the last stage recorded in `result`.
    fn finish_stage(&self, result: &ValidationResult) {
        let Some(summary) = result.stages.last() else {
            return;
        };
        let stage = summary.stage;
        let status = summary.status;
        let message = summary
            .message
            .clone()
            .unwrap_or_else(|| format!("{} {:?}", stage.name(), status).to_lowercase());

        let mut event = self.with_state(|s| {
            s.tracker.finish(stage, status);
            self.event(s, stage, message)
        });
        event.processed_units = summary.processed_units;
        event.total_units = summary.processed_units;
        event.is_stage_completed = matches!(status, StageStatus::Completed | StageStatus::Failed);
        event.is_stage_successful = status == StageStatus::Completed;
        event.is_stage_skipped = status == StageStatus::Skipped;
        event.error_count = result.error_count();
        event.warning_count = result.warning_count();
        event.partial_result = Some(Box::new(result.clone()));
        self.sink.emit(event);
    }
}

/// Runs the stages against one target at a time.
pub struct ValidationPipeline {
    pool: Arc<DataSourcePool>,
    engine: Arc<dyn GeometryEngine>,
    registry: StrategyRegistry,
    options: ValidationOptions,
    history: Option<Arc<dyn RunHistoryStore>>,
}

impl ValidationPipeline {
    /// Creates a pipeline with the built-in relation strategies.
    pub fn new(opener: Arc<dyn TargetOpener>, engine: Arc<dyn GeometryEngine>) -> Self {
        Self::with_pool(Arc::new(DataSourcePool::new(opener)), engine)
    }

    /// Creates a pipeline sharing an existing pool.
    pub fn with_pool(pool: Arc<DataSourcePool>, engine: Arc<dyn GeometryEngine>) -> Self {
        Self {
            pool,
            engine,
            registry: StrategyRegistry::with_defaults(),
            options: ValidationOptions::default(),
            history: None,
        }
    }

    /// Replaces the strategy registry.
    pub fn with_registry(mut self, registry: StrategyRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_options(mut self, options: ValidationOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the store used for calibration and for recording completed runs.
    pub fn with_history(mut self, history: Arc<dyn RunHistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn pool(&self) -> &Arc<DataSourcePool> {
        &self.pool
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    pub fn options(&self) -> &ValidationOptions {
        &self.options
    }

    /// Validates one target.
    ///
    /// Never fails: the outcome is expressed by `result.status`, the stage
    /// summaries and the recorded findings. The data source stays in the
    /// pool afterwards; release it through [`DataSourcePool::release`] or a
    /// [`crate::BatchRunner`].
    pub async fn validate(
        &self,
        target: &Target,
        configs: &StageConfigs,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> ValidationResult {
        let started = Instant::now();
        let mut result = ValidationResult::new(&target.id, target.path());
        result.status = RunStatus::Running;
        info!(target = %target, "validation started");

        let predictor = self.predictor();
        let mut profile = config_profile(configs, 0, 0);
        let progress = RunProgress::new(
            sink,
            &self.options,
            predictor.predict_stage_times(&profile).total,
        );
        let mut stage_seconds = [0.0; StageId::COUNT];

        // Stage 0
        let stage_started = Instant::now();
        progress.start_stage(StageId::PreCheck, &result);
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            opened = self.pool.acquire(target) => Some(opened),
        };
        let data_source = match opened {
            None => {
                self.close_cancelled(&progress, &mut result, StageId::PreCheck, started);
                return result;
            }
            Some(Err(e)) => {
                error!(target = %target, error = %e, "could not open target");
                result.push_error(ValidationError::new(
                    DATA_SOURCE_OPEN_FAILED,
                    format!("Cannot open {target}: {e}"),
                    Severity::Error,
                ));
                let mut summary = StageResult::new(StageId::PreCheck, StageStatus::Failed);
                summary.error_count = 1;
                summary.message = Some(e.to_string());
                summary.elapsed_ms = elapsed_ms(stage_started);
                result.stages.push(summary);
                progress.finish_stage(&result);

                for stage in StageId::ALL.into_iter().skip(1) {
                    result
                        .stages
                        .push(StageResult::skipped(stage, "target could not be opened"));
                    progress.finish_stage(&result);
                }
                result.status = RunStatus::Failed;
                result.message = Some(e.to_string());
                result.processing_time = started.elapsed();
                return result;
            }
            Some(Ok(data_source)) => data_source,
        };

        let mut summary = StageResult::new(StageId::PreCheck, StageStatus::Completed);
        profile = self.precheck(data_source.as_ref(), configs, &mut result, &mut summary);
        let prediction = predictor.predict_stage_times(&profile);
        progress.set_prediction(prediction.total);
        debug!(target = %target, predicted_seconds = prediction.total, "prediction ready");
        stage_seconds[0] = stage_started.elapsed().as_secs_f64();
        summary.elapsed_ms = elapsed_ms(stage_started);
        result.stages.push(summary);
        progress.finish_stage(&result);

        // Stages 1 to 5
        for stage in StageId::ALL.into_iter().skip(1) {
            tokio::task::yield_now().await;
            if cancel.is_cancelled() {
                self.close_cancelled(&progress, &mut result, stage, started);
                return result;
            }
            if !configs.is_enabled(stage) {
                debug!(stage = %stage, "stage disabled");
                result.stages.push(StageResult::skipped(stage, "disabled"));
                progress.finish_stage(&result);
                continue;
            }

            let stage_started = Instant::now();
            progress.start_stage(stage, &result);
            let (errors_before, warnings_before) = (result.error_count(), result.warning_count());
            let mut summary = StageResult::new(stage, StageStatus::Running);

            let tick = |t: StageTick| progress.tick(stage, t);
            let ctx = StageContext {
                data_source: data_source.as_ref(),
                configs,
                engine: self.engine.as_ref(),
                registry: &self.registry,
                options: &self.options,
                cancel,
                tick: &tick,
            };
            let outcome = run_stage(stage, &ctx, &mut result, &mut summary);

            summary.error_count = result.error_count() - errors_before;
            summary.warning_count = result.warning_count() - warnings_before;
            summary.elapsed_ms = elapsed_ms(stage_started);
            stage_seconds[stage.number()] = stage_started.elapsed().as_secs_f64();

            match outcome {
                Ok(()) => {
                    debug!(stage = %stage, errors = summary.error_count, "stage completed");
                    summary.status = StageStatus::Completed;
                }
                Err(StageError::Cancelled) => {
                    summary.status = StageStatus::Skipped;
                    summary.message = Some("cancelled".to_string());
                    result.stages.push(summary);
                    progress.finish_stage(&result);
                    if let Some(next) = stage.next() {
                        self.close_cancelled(&progress, &mut result, next, started);
                    } else {
                        self.mark_cancelled(&mut result, started);
                    }
                    return result;
                }
                Err(StageError::DataAccess(e)) => {
                    warn!(stage = %stage, error = %e, "stage failed");
                    summary.status = StageStatus::Failed;
                    summary.message = Some(e.to_string());
                }
            }
            result.stages.push(summary);
            progress.finish_stage(&result);
        }

        result.status = RunStatus::Completed;
        result.processing_time = started.elapsed();
        info!(
            target = %target,
            errors = result.error_count(),
            warnings = result.warning_count(),
            elapsed_ms = elapsed_ms(started),
            "validation completed"
        );
        self.record(target, &profile, stage_seconds, &result);
        result
    }

    /// Opens the layers once to size the run.
    fn precheck(
        &self,
        data_source: &dyn DataSource,
        configs: &StageConfigs,
        result: &mut ValidationResult,
        summary: &mut StageResult,
    ) -> DatasetProfile {
        let names = data_source.layer_names();
        if names.is_empty() {
            result.push_warning(ValidationError::new(
                PRE_NO_LAYERS,
                format!("Data source '{}' has no layers", data_source.name()),
                Severity::Warning,
            ));
            summary.warning_count = 1;
        }

        let mut features = 0;
        for name in &names {
            let Some(layer) = data_source.layer(name) else {
                continue;
            };
            match layer.feature_count() {
                Ok(n) => features += n,
                Err(e) => warn!(layer = %name, error = %e, "could not count features"),
            }
        }
        summary.processed_units = names.len() as u64;
        config_profile(configs, names.len() as u64, features)
    }

    fn predictor(&self) -> TimePredictor {
        let Some(history) = &self.history else {
            return TimePredictor::new();
        };
        match history.recent(self.options.history_window) {
            Ok(records) => TimePredictor::calibrated(&records, self.options.history_window),
            Err(e) => {
                warn!(error = %e, "could not read run history, using uncalibrated prediction");
                TimePredictor::new()
            }
        }
    }

    /// Skips `from` and every later stage, then marks the run cancelled.
    fn close_cancelled(
        &self,
        progress: &RunProgress<'_>,
        result: &mut ValidationResult,
        from: StageId,
        started: Instant,
    ) {
        for stage in StageId::ALL.into_iter().skip(from.number()) {
            result.stages.push(StageResult::skipped(stage, "cancelled"));
            progress.finish_stage(result);
        }
        self.mark_cancelled(result, started);
    }

    fn mark_cancelled(&self, result: &mut ValidationResult, started: Instant) {
        result.status = RunStatus::Cancelled;
        result.message = Some("cancelled".to_string());
        result.processing_time = started.elapsed();
        info!(target = %result.target_path.display(), "validation cancelled");
    }

    fn record(
        &self,
        target: &Target,
        profile: &DatasetProfile,
        per_stage_seconds: [f64; StageId::COUNT],
        result: &ValidationResult,
    ) {
        if !self.options.record_history {
            return;
        }
        let Some(history) = &self.history else {
            return;
        };
        let record = RunStatistics {
            timestamp: Utc::now(),
            target_id: target.id.clone(),
            table_count: profile.table_count,
            feature_count: profile.feature_count,
            schema_field_count: profile.schema_field_count,
            geometry_check_count: profile.geometry_check_count,
            relation_rule_count: profile.relation_rule_count,
            attribute_column_count: profile.attribute_column_count,
            per_stage_seconds,
            total_seconds: result.processing_time.as_secs_f64(),
        };
        if let Err(e) = history.append(&record) {
            warn!(target = %target, error = %e, "could not record run statistics");
        }
    }
}

fn run_stage(
    stage: StageId,
    ctx: &StageContext<'_>,
    result: &mut ValidationResult,
    summary: &mut StageResult,
) -> Result<(), StageError> {
    match stage {
        StageId::PreCheck => Ok(()),
        StageId::Table => run_table_stage(ctx, result, summary),
        StageId::Schema => run_schema_stage(ctx, result, summary),
        StageId::Geometry => run_geometry_stage(ctx, result, summary),
        StageId::Attribute => run_attribute_stage(ctx, result, summary),
        StageId::Relation => run_relation_stage(ctx, result, summary),
    }
}

fn config_profile(configs: &StageConfigs, tables: u64, features: u64) -> DatasetProfile {
    DatasetProfile::new(
        tables,
        features,
        configs.schema.fields.len() as u64,
        configs.geometry.check_count() as u64,
        configs.relation.enabled_count() as u64,
        configs.attribute.column_count() as u64,
    )
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tracker_transition_is_idempotent() {
        let mut tracker = StageTracker::new();
        tracker.start(StageId::PreCheck);
        tracker.finish(StageId::PreCheck, StageStatus::Completed);
        assert_eq!(tracker.stage(StageId::Table).status, StageStatus::Pending);

        tracker.start(StageId::Table);
        tracker.finish(StageId::PreCheck, StageStatus::Completed);
        assert_eq!(tracker.stage(StageId::Table).status, StageStatus::Running);
    }

    #[test]
    fn test_tracker_progress_is_monotonic() {
        let mut tracker = StageTracker::new();
        tracker.start(StageId::Geometry);
        tracker.update(StageId::Geometry, 60.0);
        tracker.update(StageId::Geometry, 30.0);
        assert_eq!(tracker.stage(StageId::Geometry).progress, 60.0);
        assert_eq!(tracker.overall_progress(StageId::Geometry), 60.0);

        tracker.update(StageId::Geometry, 250.0);
        assert_eq!(tracker.overall_progress(StageId::Geometry), 400.0 / 6.0);
    }
}
