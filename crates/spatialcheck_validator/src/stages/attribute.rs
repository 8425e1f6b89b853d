//! Stage 4: per-feature attribute value checks.
//!
//! Each rule checks one field of one table:
//! - NotNull: the value must be present
//! - AllowedValues: the value, as text, must be one of a fixed set
//! - Range: the numeric value must be within `min..=max`
//! - Pattern: the text value must match a regular expression
//!
//! Value checks skip nulls; nullability is the NotNull check's job.

use super::{StageContext, part_progress, unit_percent};
use crate::StageError;
use crate::location::extract_centroid;
use crate::scoped::apply_scoped_attribute_filter;
use regex::Regex;
use spatialcheck_core::{
    AttributeCheck, AttributeRule, Feature, FieldValue, GeometryEngine, Severity, StageResult,
    ValidationError, ValidationResult,
};
use std::collections::HashMap;
use tracing::warn;

pub const ATTR_NULL: &str = "ATTR_NULL";
pub const ATTR_NOT_ALLOWED: &str = "ATTR_NOT_ALLOWED";
pub const ATTR_OUT_OF_RANGE: &str = "ATTR_OUT_OF_RANGE";
pub const ATTR_PATTERN_MISMATCH: &str = "ATTR_PATTERN_MISMATCH";
pub const ATTR_INVALID_PATTERN: &str = "ATTR_INVALID_PATTERN";

/// Evaluates attribute checks.
struct AttributeChecker {
    /// Cache of compiled regex patterns
    regex_cache: HashMap<String, Regex>,
}

impl AttributeChecker {
    fn new() -> Self {
        Self {
            regex_cache: HashMap::new(),
        }
    }

    fn compile(&mut self, pattern: &str) -> Result<Regex, regex::Error> {
        if let Some(regex) = self.regex_cache.get(pattern) {
            return Ok(regex.clone());
        }
        let regex = Regex::new(pattern)?;
        self.regex_cache.insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }

    /// Checks one value; returns the error code and message on violation.
    fn check(
        &self,
        check: &AttributeCheck,
        pattern: Option<&Regex>,
        field: &str,
        value: Option<&FieldValue>,
    ) -> Option<(&'static str, String)> {
        let value = match value {
            Some(v) if !v.is_null() => v,
            _ => {
                return matches!(check, AttributeCheck::NotNull)
                    .then(|| (ATTR_NULL, format!("Field '{field}' is null")));
            }
        };

        match check {
            AttributeCheck::NotNull => None,
            AttributeCheck::AllowedValues { values } => {
                let text = value.to_string();
                (!values.iter().any(|a| *a == text)).then(|| {
                    (
                        ATTR_NOT_ALLOWED,
                        format!(
                            "Value '{text}' of '{field}' not in allowed values: [{}]",
                            values.join(", ")
                        ),
                    )
                })
            }
            AttributeCheck::Range { min, max } => match value.as_real() {
                Some(n) if n >= *min && n <= *max => None,
                Some(n) => Some((
                    ATTR_OUT_OF_RANGE,
                    format!("Value {n} of '{field}' is outside range [{min}, {max}]"),
                )),
                None => Some((
                    ATTR_OUT_OF_RANGE,
                    format!("Value '{value}' of '{field}' is not numeric"),
                )),
            },
            AttributeCheck::Pattern { regex } => {
                let text = value.to_string();
                let matched = pattern.is_some_and(|p| p.is_match(&text));
                (!matched).then(|| {
                    (
                        ATTR_PATTERN_MISMATCH,
                        format!("Value '{text}' of '{field}' does not match pattern '{regex}'"),
                    )
                })
            }
        }
    }
}

pub(crate) fn run_attribute_stage(
    ctx: &StageContext<'_>,
    result: &mut ValidationResult,
    summary: &mut StageResult,
) -> Result<(), StageError> {
    let rules = &ctx.configs.attribute.rules;
    let count = rules.len();
    let mut checker = AttributeChecker::new();

    for (index, rule) in rules.iter().enumerate() {
        ctx.check_cancelled()?;
        let Some(mut layer) = ctx.table_layer(&rule.table_id) else {
            continue;
        };

        let pattern = match &rule.check {
            AttributeCheck::Pattern { regex } => match checker.compile(regex) {
                Ok(compiled) => Some(compiled),
                Err(e) => {
                    warn!(rule_id = %rule.rule_id, pattern = %regex, error = %e, "invalid pattern, rule skipped");
                    result.push_warning(
                        ValidationError::new(
                            ATTR_INVALID_PATTERN,
                            format!("Rule '{}' has an invalid pattern: {e}", rule.rule_id),
                            Severity::Warning,
                        )
                        .with_table(layer.name())
                        .with_table_id(&rule.table_id),
                    );
                    continue;
                }
            },
            _ => None,
        };

        let mut scoped = apply_scoped_attribute_filter(layer.as_mut(), rule.attribute_filter.as_deref());
        let table = scoped.name().to_string();
        let total = scoped.feature_count()?;
        scoped.reset_reading();

        let mut processed = 0;
        loop {
            ctx.check_cancelled()?;
            let Some(feature) = scoped.next_feature()? else {
                break;
            };
            processed += 1;

            let value = feature.get(&rule.field);
            if let Some((code, message)) = checker.check(&rule.check, pattern.as_ref(), &rule.field, value) {
                result.push(finding(ctx.engine, rule, &table, &feature, code, message));
            }

            ctx.progress(
                result,
                part_progress(index, count, unit_percent(processed, total)),
                processed,
                total,
                format!("Checking {}.{}", table, rule.field),
            );
        }
        summary.processed_units += processed;
    }
    Ok(())
}

fn finding(
    engine: &dyn GeometryEngine,
    rule: &AttributeRule,
    table: &str,
    feature: &Feature,
    code: &str,
    message: String,
) -> ValidationError {
    let at = extract_centroid(engine, feature.geometry.as_ref());
    ValidationError::new(code, message, rule.severity)
        .with_table(table)
        .with_table_id(&rule.table_id)
        .with_feature(feature.fid)
        .at(at.x, at.y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::test_support::Harness;
    use pretty_assertions::assert_eq;
    use spatialcheck_core::{Geometry, GeometryKind, StageConfigsBuilder, StageId, StageStatus};
    use spatialcheck_memory::{MemoryDataSource, MemoryLayer};

    fn source() -> MemoryDataSource {
        let features = [
            ("BLD-1", Some(3_i64), "res"),
            ("bld-2", Some(120), "res"),
            ("BLD-3", None, "shop"),
            ("BLD-4", Some(2), "factory"),
        ];
        MemoryDataSource::new("ds").with_layer(
            MemoryLayer::new("TN_BULD", GeometryKind::Point).with_features(
                features.into_iter().enumerate().map(|(i, (code, floors, usage))| {
                    let fid = i as i64 + 1;
                    Feature::new(fid, Some(Geometry::point(fid as f64, 0.0)))
                        .with_attribute("CODE", code)
                        .with_attribute("FLOORS", floors)
                        .with_attribute("USAGE", usage)
                }),
            ),
        )
    }

    fn run(configs: spatialcheck_core::StageConfigs) -> ValidationResult {
        let harness = Harness::new(configs);
        let mut result = ValidationResult::new("t", "/t");
        let mut summary = StageResult::new(StageId::Attribute, StageStatus::Running);
        harness.run(&source(), |ctx| {
            run_attribute_stage(ctx, &mut result, &mut summary).unwrap();
        });
        result
    }

    fn findings(result: &ValidationResult) -> Vec<(&str, Option<i64>)> {
        result
            .errors()
            .iter()
            .chain(result.warnings().iter())
            .map(|e| (e.error_code.as_str(), e.feature_id))
            .collect()
    }

    #[test]
    fn test_value_checks() {
        let configs = StageConfigsBuilder::new()
            .attribute_rule(AttributeRule::new("A1", "TN_BULD", "FLOORS", AttributeCheck::NotNull))
            .attribute_rule(AttributeRule::new(
                "A2",
                "TN_BULD",
                "FLOORS",
                AttributeCheck::Range { min: 1.0, max: 100.0 },
            ))
            .attribute_rule(
                AttributeRule::new(
                    "A3",
                    "TN_BULD",
                    "USAGE",
                    AttributeCheck::AllowedValues {
                        values: vec!["res".into(), "shop".into()],
                    },
                )
                .with_severity(Severity::Warning),
            )
            .attribute_rule(AttributeRule::new(
                "A4",
                "TN_BULD",
                "CODE",
                AttributeCheck::Pattern {
                    regex: "^BLD-[0-9]+$".into(),
                },
            ))
            .build();
        let result = run(configs);

        assert_eq!(
            findings(&result),
            vec![
                (ATTR_NULL, Some(3)),
                (ATTR_OUT_OF_RANGE, Some(2)),
                (ATTR_PATTERN_MISMATCH, Some(2)),
                (ATTR_NOT_ALLOWED, Some(4)),
            ]
        );
        let null = &result.errors()[0];
        assert_eq!((null.x, null.y), (3.0, 0.0));
        assert_eq!(null.table_id.as_deref(), Some("TN_BULD"));
    }

    #[test]
    fn test_filter_limits_checked_features() {
        let configs = StageConfigsBuilder::new()
            .attribute_rule(
                AttributeRule::new(
                    "A1",
                    "TN_BULD",
                    "FLOORS",
                    AttributeCheck::Range { min: 1.0, max: 10.0 },
                )
                .with_filter("USAGE = 'res'"),
            )
            .build();
        let result = run(configs);
        assert_eq!(findings(&result), vec![(ATTR_OUT_OF_RANGE, Some(2))]);
    }

    #[test]
    fn test_invalid_pattern_skips_rule() {
        let configs = StageConfigsBuilder::new()
            .attribute_rule(AttributeRule::new(
                "A1",
                "TN_BULD",
                "CODE",
                AttributeCheck::Pattern {
                    regex: "BLD-(".into(),
                },
            ))
            .build();
        let result = run(configs);
        assert!(result.is_valid);
        assert_eq!(findings(&result), vec![(ATTR_INVALID_PATTERN, None)]);
    }

    #[test]
    fn test_regex_cache() {
        let mut checker = AttributeChecker::new();
        checker.compile("^a+$").unwrap();
        checker.compile("^a+$").unwrap();
        assert_eq!(checker.regex_cache.len(), 1);
    }
}
