//! Stage 2: declared fields exist with the right type and nullability.

use super::{StageContext, part_progress};
use crate::StageError;
use spatialcheck_core::{FieldDefn, Severity, StageResult, ValidationError, ValidationResult};

pub const SCH_MISSING_FIELD: &str = "SCH_MISSING_FIELD";
pub const SCH_FIELD_TYPE_MISMATCH: &str = "SCH_FIELD_TYPE_MISMATCH";
pub const SCH_NULLABILITY_MISMATCH: &str = "SCH_NULLABILITY_MISMATCH";
pub const SCH_UNDEFINED_FIELD: &str = "SCH_UNDEFINED_FIELD";

/// Fields maintained by the storage itself.
fn is_system_field(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    upper == "OBJECTID" || upper.starts_with("SHAPE")
}

pub(crate) fn run_schema_stage(
    ctx: &StageContext<'_>,
    result: &mut ValidationResult,
    summary: &mut StageResult,
) -> Result<(), StageError> {
    let schema = &ctx.configs.schema;
    let table_ids = schema.table_ids();
    let count = table_ids.len();

    for (index, table_id) in table_ids.iter().enumerate() {
        ctx.check_cancelled()?;
        let Some(layer) = ctx.table_layer(table_id) else {
            continue;
        };
        let table = layer.name().to_string();
        let fields = layer.fields();

        for spec in schema.fields_for(table_id) {
            let finding = |code: &str, message: String, severity: Severity| {
                ValidationError::new(code, message, severity)
                    .with_table(&table)
                    .with_table_id(*table_id)
            };
            let Some(actual) = find_field(fields, &spec.field_name) else {
                result.push_error(finding(
                    SCH_MISSING_FIELD,
                    format!("Field '{}' is missing from '{table}'", spec.field_name),
                    Severity::Error,
                ));
                continue;
            };
            if !spec.kind.accepts(actual.kind) {
                result.push_error(finding(
                    SCH_FIELD_TYPE_MISMATCH,
                    format!(
                        "Field '{}' is {}, expected {}",
                        spec.field_name, actual.kind, spec.kind
                    ),
                    Severity::Error,
                ));
            }
            if !spec.nullable && actual.nullable {
                result.push_warning(finding(
                    SCH_NULLABILITY_MISMATCH,
                    format!("Field '{}' allows nulls but is declared NOT NULL", spec.field_name),
                    Severity::Warning,
                ));
            }
        }

        if schema.report_undefined_fields {
            for field in fields {
                let declared = schema
                    .fields_for(table_id)
                    .any(|s| s.field_name.eq_ignore_ascii_case(&field.name));
                if !declared && !is_system_field(&field.name) {
                    result.push_warning(
                        ValidationError::new(
                            SCH_UNDEFINED_FIELD,
                            format!("Field '{}' of '{table}' is not declared", field.name),
                            Severity::Warning,
                        )
                        .with_table(&table)
                        .with_table_id(*table_id),
                    );
                }
            }
        }

        summary.processed_units += 1;
        ctx.progress(
            result,
            part_progress(index + 1, count, 0.0),
            (index + 1) as u64,
            count as u64,
            format!("Checked schema of {table}"),
        );
    }
    Ok(())
}

fn find_field<'a>(fields: &'a [FieldDefn], name: &str) -> Option<&'a FieldDefn> {
    fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
}
