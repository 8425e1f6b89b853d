//! Sequential validation of many targets.

use crate::{ProgressSink, ResourceCleanup, ValidationPipeline};
use serde::{Deserialize, Serialize};
use spatialcheck_core::{
    BatchPosition, ProgressEvent, RunStatus, StageConfigs, Target, ValidationResult,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Outcome of a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Targets that ended without errors
    pub success_count: usize,
    /// Targets that ended with at least one error, or failed to run
    pub fail_count: usize,
    pub total_errors: usize,
    pub total_warnings: usize,
    /// One result per target that was started, in order
    pub results: Vec<ValidationResult>,
    /// The batch stopped on cancellation
    pub cancelled: bool,
}

impl BatchSummary {
    /// Targets that were run, including one interrupted by cancellation.
    pub fn processed(&self) -> usize {
        self.success_count + self.fail_count
    }
}

/// Releases one target's resources when dropped.
struct TargetCleanup<'a> {
    cleanups: &'a [Arc<dyn ResourceCleanup>],
    target: &'a Target,
}

impl Drop for TargetCleanup<'_> {
    fn drop(&mut self) {
        for cleanup in self.cleanups {
            cleanup.release_target(self.target);
        }
    }
}

/// Sweeps every target's resources when dropped.
struct SweepGuard<'a> {
    cleanups: &'a [Arc<dyn ResourceCleanup>],
    targets: &'a [Target],
}

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        for cleanup in self.cleanups {
            cleanup.sweep(self.targets);
        }
    }
}

/// Tags events with the target's position in the batch.
struct BatchSink<'a> {
    inner: &'a dyn ProgressSink,
    index: usize,
    total: usize,
    target_id: &'a str,
}

impl ProgressSink for BatchSink<'_> {
    fn emit(&self, mut event: ProgressEvent) {
        event.batch = Some(BatchPosition {
            index: self.index,
            total: self.total,
            target_id: self.target_id.to_string(),
            batch_progress: batch_percent(self.index, self.total, event.overall_progress),
        });
        self.inner.emit(event);
    }
}

/// Progress of a batch with `completed` targets done and the current one at
/// `current` percent.
pub fn batch_percent(completed: usize, total: usize, current: f64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    ((completed as f64 * 100.0 + current.clamp(0.0, 100.0)) / total as f64).clamp(0.0, 100.0)
}

/// Runs a pipeline over targets one after another.
///
/// Every registered cleanup releases each started target once its run ends,
/// whatever the outcome, and sweeps all targets when the batch ends. The
/// pipeline's pool is always registered.
pub struct BatchRunner {
    pipeline: ValidationPipeline,
    cleanups: Vec<Arc<dyn ResourceCleanup>>,
}

impl BatchRunner {
    pub fn new(pipeline: ValidationPipeline) -> Self {
        let pool: Arc<dyn ResourceCleanup> = pipeline.pool().clone();
        Self {
            pipeline,
            cleanups: vec![pool],
        }
    }

    /// Registers an additional cleanup.
    pub fn with_cleanup(mut self, cleanup: Arc<dyn ResourceCleanup>) -> Self {
        self.cleanups.push(cleanup);
        self
    }

    pub fn pipeline(&self) -> &ValidationPipeline {
        &self.pipeline
    }

    /// Validates `targets` in order.
    ///
    /// Each target run is counted as a success if its result is valid and
    /// as a failure otherwise, and the batch moves on. Cancellation stops the
    /// batch after the current target's partial result, which is counted too.
    pub async fn run(
        &self,
        targets: &[Target],
        configs: &StageConfigs,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> BatchSummary {
        let _sweep = SweepGuard {
            cleanups: &self.cleanups,
            targets,
        };
        let mut summary = BatchSummary::default();
        info!(targets = targets.len(), "batch started");

        for (index, target) in targets.iter().enumerate() {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            let _cleanup = TargetCleanup {
                cleanups: &self.cleanups,
                target,
            };
            let batch_sink = BatchSink {
                inner: sink,
                index,
                total: targets.len(),
                target_id: &target.id,
            };

            let result = self.pipeline.validate(target, configs, &batch_sink, cancel).await;
            if result.is_valid {
                summary.success_count += 1;
            } else {
                if result.status == RunStatus::Failed {
                    warn!(target = %target, message = ?result.message, "target failed");
                }
                summary.fail_count += 1;
            }
            summary.cancelled = result.status == RunStatus::Cancelled;
            summary.total_errors += result.error_count();
            summary.total_warnings += result.warning_count();
            summary.results.push(result);

            if summary.cancelled {
                break;
            }
        }

        info!(
            succeeded = summary.success_count,
            failed = summary.fail_count,
            cancelled = summary.cancelled,
            "batch finished"
        );
        summary
    }
}
