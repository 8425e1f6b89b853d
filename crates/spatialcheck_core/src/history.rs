//! Run statistics and the history store seam.
//!
//! Completed runs are recorded so later predictions can be calibrated
//! against how long each stage actually took.

use crate::{HistoryError, StageId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Measurements of one completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    pub timestamp: DateTime<Utc>,
    pub target_id: String,
    pub table_count: u64,
    pub feature_count: u64,
    pub schema_field_count: u64,
    pub geometry_check_count: u64,
    pub relation_rule_count: u64,
    pub attribute_column_count: u64,
    /// Wall-clock seconds per stage, indexed by stage number
    pub per_stage_seconds: [f64; StageId::COUNT],
    pub total_seconds: f64,
}

impl RunStatistics {
    /// Seconds spent in a stage.
    pub fn stage_seconds(&self, stage: StageId) -> f64 {
        self.per_stage_seconds[stage.number()]
    }
}

/// Append-only store of [`RunStatistics`].
pub trait RunHistoryStore: Send + Sync {
    /// Appends one record.
    fn append(&self, record: &RunStatistics) -> Result<(), HistoryError>;

    /// All records, oldest first.
    fn records(&self) -> Result<Vec<RunStatistics>, HistoryError>;

    /// The most recent `n` records, oldest first.
    fn recent(&self, n: usize) -> Result<Vec<RunStatistics>, HistoryError> {
        let mut all = self.records()?;
        let skip = all.len().saturating_sub(n);
        Ok(all.split_off(skip))
    }
}
