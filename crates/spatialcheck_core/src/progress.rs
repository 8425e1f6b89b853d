//! Progress events delivered to observers during a run.

use crate::{StageId, ValidationResult};
use serde::{Deserialize, Serialize};

/// Live remaining-time estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RemainingEstimate {
    /// Estimated seconds until the run completes
    pub remaining_seconds: f64,
    /// Confidence in the estimate, 0 to 1
    pub confidence: f64,
    /// Observed pace relative to the prediction (above 1 means slower)
    pub speed_ratio: f64,
}

/// Position of the current target inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPosition {
    /// Zero-based index of the current target
    pub index: usize,
    /// Number of targets in the batch
    pub total: usize,
    pub target_id: String,
    /// Progress of the whole batch, 0 to 100
    pub batch_progress: f64,
}

/// A progress notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub current_stage: StageId,
    pub stage_name: String,
    /// Progress of the whole run, 0 to 100
    pub overall_progress: f64,
    /// Progress of the current stage, 0 to 100
    pub stage_progress: f64,
    pub status_message: String,
    /// Rule being executed (relation stage)
    pub current_rule: Option<String>,
    pub processed_units: u64,
    pub total_units: u64,
    pub is_stage_completed: bool,
    pub is_stage_successful: bool,
    pub is_stage_skipped: bool,
    pub error_count: usize,
    pub warning_count: usize,
    pub eta: Option<RemainingEstimate>,
    pub batch: Option<BatchPosition>,
    /// Snapshot of the result at a stage boundary
    pub partial_result: Option<Box<ValidationResult>>,
}

impl ProgressEvent {
    /// Creates a non-terminal event for `stage`.
    pub fn new(stage: StageId, status_message: impl Into<String>) -> Self {
        Self {
            current_stage: stage,
            stage_name: stage.name().to_string(),
            overall_progress: 0.0,
            stage_progress: 0.0,
            status_message: status_message.into(),
            current_rule: None,
            processed_units: 0,
            total_units: 0,
            is_stage_completed: false,
            is_stage_successful: false,
            is_stage_skipped: false,
            error_count: 0,
            warning_count: 0,
            eta: None,
            batch: None,
            partial_result: None,
        }
    }

    /// Returns true if this event closes its stage.
    pub fn is_terminal(&self) -> bool {
        self.is_stage_completed || self.is_stage_skipped
    }
}
