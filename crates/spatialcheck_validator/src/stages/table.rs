//! Stage 1: expected tables are present with the declared geometry kind.

use super::{StageContext, part_progress};
use crate::StageError;
use spatialcheck_core::{Severity, StageResult, ValidationError, ValidationResult};
use tracing::debug;

pub const TBL_MISSING: &str = "TBL_MISSING";
pub const TBL_GEOMETRY_TYPE_MISMATCH: &str = "TBL_GEOMETRY_TYPE_MISMATCH";
pub const TBL_UNDEFINED: &str = "TBL_UNDEFINED";

pub(crate) fn run_table_stage(
    ctx: &StageContext<'_>,
    result: &mut ValidationResult,
    summary: &mut StageResult,
) -> Result<(), StageError> {
    let tables = &ctx.configs.table.tables;
    let count = tables.len();

    for (index, spec) in tables.iter().enumerate() {
        ctx.check_cancelled()?;

        match ctx.data_source.layer(&spec.table_name) {
            None if spec.required => {
                result.push_error(
                    ValidationError::new(
                        TBL_MISSING,
                        format!("Required table '{}' is missing", spec.table_name),
                        Severity::Error,
                    )
                    .with_table(&spec.table_name)
                    .with_table_id(&spec.table_id),
                );
            }
            None => debug!(table = %spec.table_name, "optional table absent"),
            Some(layer) => {
                let actual = layer.geometry_kind();
                if let Some(expected) = spec.geometry_kind {
                    if !expected.is_compatible_with(&actual) {
                        result.push_error(
                            ValidationError::new(
                                TBL_GEOMETRY_TYPE_MISMATCH,
                                format!(
                                    "Table '{}' has geometry type {actual}, expected {expected}",
                                    spec.table_name
                                ),
                                Severity::Error,
                            )
                            .with_table(&spec.table_name)
                            .with_table_id(&spec.table_id),
                        );
                    }
                }
            }
        }

        summary.processed_units += 1;
        ctx.progress(
            result,
            part_progress(index + 1, count, 0.0),
            (index + 1) as u64,
            count as u64,
            format!("Checked table {}", spec.table_name),
        );
    }

    if ctx.options.report_undefined_tables {
        for name in ctx.data_source.layer_names() {
            if ctx.configs.table.find(&name).is_none() {
                result.push_warning(
                    ValidationError::new(
                        TBL_UNDEFINED,
                        format!("Table '{name}' is not declared"),
                        Severity::Warning,
                    )
                    .with_table(&name),
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::test_support::Harness;
    use pretty_assertions::assert_eq;
    use spatialcheck_core::{GeometryKind, StageConfigsBuilder, StageId, StageStatus, TableSpec};
    use spatialcheck_memory::{MemoryDataSource, MemoryLayer};

    fn source() -> MemoryDataSource {
        MemoryDataSource::new("ds")
            .with_layer(MemoryLayer::new("TN_BULD", GeometryKind::Polygon))
            .with_layer(MemoryLayer::new("TN_RODWAY", GeometryKind::MultiPolygon))
            .with_layer(MemoryLayer::new("SCRATCH", GeometryKind::None))
    }

    fn codes(result: &ValidationResult) -> Vec<&str> {
        result
            .errors()
            .iter()
            .chain(result.warnings().iter())
            .map(|e| e.error_code.as_str())
            .collect()
    }

    #[test]
    fn test_missing_and_mismatched_tables() {
        let configs = StageConfigsBuilder::new()
            .table(TableSpec::new("buld", "TN_BULD").with_geometry(GeometryKind::Polygon))
            .table(TableSpec::new("road", "TN_RODWAY").with_geometry(GeometryKind::LineString))
            .table(TableSpec::new("rail", "TN_RAIL"))
            .table(TableSpec::new("poi", "TN_POI").optional())
            .build();
        let mut harness = Harness::new(configs);
        harness.options = harness.options.clone().with_report_undefined_tables(true);

        let mut result = ValidationResult::new("t", "/t");
        let mut summary = StageResult::new(StageId::Table, StageStatus::Running);
        harness.run(&source(), |ctx| {
            run_table_stage(ctx, &mut result, &mut summary).unwrap();
        });

        assert_eq!(
            codes(&result),
            vec![TBL_GEOMETRY_TYPE_MISMATCH, TBL_MISSING, TBL_UNDEFINED]
        );
        assert_eq!(result.errors()[1].table_id.as_deref(), Some("rail"));
        assert_eq!(result.warnings()[0].table_name, "SCRATCH");
        assert_eq!(summary.processed_units, 4);
    }

    #[test]
    fn test_undefined_tables_not_reported_by_default() {
        let harness = Harness::new(StageConfigsBuilder::new().build());
        let mut result = ValidationResult::new("t", "/t");
        let mut summary = StageResult::new(StageId::Table, StageStatus::Running);
        harness.run(&source(), |ctx| {
            run_table_stage(ctx, &mut result, &mut summary).unwrap();
        });
        assert!(result.is_valid);
        assert_eq!(result.warning_count(), 0);
    }
}
