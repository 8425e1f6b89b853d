//! Stage checks.
//!
//! Each stage function walks its config, records findings into the run's
//! [`ValidationResult`] and fills in its [`StageResult`] summary. A stage
//! returns `Err` only when a data-access failure interrupts it or the run is
//! cancelled; every other problem is recorded as a finding.

mod attribute;
mod geometry;
mod schema;
mod table;

pub(crate) use attribute::run_attribute_stage;
pub(crate) use geometry::run_geometry_stage;
pub(crate) use schema::run_schema_stage;
pub(crate) use table::run_table_stage;

pub use attribute::{
    ATTR_INVALID_PATTERN, ATTR_NOT_ALLOWED, ATTR_NULL, ATTR_OUT_OF_RANGE, ATTR_PATTERN_MISMATCH,
};
pub use geometry::{
    GEOM_DUPLICATE_VERTEX, GEOM_EMPTY, GEOM_NULL, GEOM_SHORT_LINE, GEOM_SMALL_AREA,
    GEOM_UNCLOSED_RING,
};
pub use schema::{
    SCH_FIELD_TYPE_MISMATCH, SCH_MISSING_FIELD, SCH_NULLABILITY_MISMATCH, SCH_UNDEFINED_FIELD,
};
pub use table::{TBL_GEOMETRY_TYPE_MISMATCH, TBL_MISSING, TBL_UNDEFINED};

use crate::relation::StrategyRegistry;
use crate::{StageError, ValidationOptions};
use spatialcheck_core::{
    DataSource, GeometryEngine, Layer, StageConfigs, TableCheckConfig, ValidationResult,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Everything a stage needs besides the result it writes to.
pub(crate) struct StageContext<'a> {
    pub data_source: &'a dyn DataSource,
    pub configs: &'a StageConfigs,
    pub engine: &'a dyn GeometryEngine,
    pub registry: &'a StrategyRegistry,
    pub options: &'a ValidationOptions,
    pub cancel: &'a CancellationToken,
    pub tick: &'a (dyn Fn(StageTick) + Send + Sync),
}

impl StageContext<'_> {
    pub fn check_cancelled(&self) -> Result<(), StageError> {
        if self.cancel.is_cancelled() {
            Err(StageError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Opens the layer behind a configured table id, if present.
    pub fn table_layer(&self, table_id: &str) -> Option<Box<dyn Layer>> {
        open_table(self.data_source, &self.configs.table, table_id)
    }

    /// Sends a throttled progress tick.
    pub fn progress(
        &self,
        result: &ValidationResult,
        progress: f64,
        processed: u64,
        total: u64,
        message: impl Into<String>,
    ) {
        (self.tick)(StageTick {
            progress,
            processed,
            total,
            message: message.into(),
            current_rule: None,
            error_count: result.error_count(),
            warning_count: result.warning_count(),
            force: false,
        });
    }
}

/// Intermediate progress of the running stage.
#[derive(Debug, Clone, Default)]
pub(crate) struct StageTick {
    /// Progress within the stage, 0 to 100
    pub progress: f64,
    pub processed: u64,
    pub total: u64,
    pub message: String,
    pub current_rule: Option<String>,
    pub error_count: usize,
    pub warning_count: usize,
    /// Bypass the pipeline's throttle (already throttled upstream)
    pub force: bool,
}

fn open_table(
    data_source: &dyn DataSource,
    tables: &TableCheckConfig,
    table_id: &str,
) -> Option<Box<dyn Layer>> {
    let layer = data_source
        .layer(tables.layer_name(table_id))
        .or_else(|| data_source.layer(table_id));
    if layer.is_none() {
        debug!(table = table_id, "table not present, skipping");
    }
    layer
}

/// Percent of `index` out of `count` parts plus the share of the current part.
pub(crate) fn part_progress(index: usize, count: usize, part_percent: f64) -> f64 {
    if count == 0 {
        return 100.0;
    }
    ((index as f64 * 100.0 + part_percent.clamp(0.0, 100.0)) / count as f64).clamp(0.0, 100.0)
}

/// Percent of processed out of total, 0 when there is nothing to process.
pub(crate) fn unit_percent(processed: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (processed as f64 * 100.0 / total as f64).min(100.0)
    }
}
