//! Rule and stage configuration types.
//!
//! These types describe what each stage checks. They derive serde so a host
//! can load them from whatever format it prefers.

use crate::{ConfigError, FieldKind, GeometryKind, Severity, StageId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// One relation rule: a case type applied to an ordered list of layers.
///
/// # Example
///
/// ```rust
/// use spatialcheck_core::Rule;
///
/// let rule = Rule::new("R1", "PointInsidePolygon", ["TN_POI", "TN_BULD"]).with_tolerance(0.5);
/// assert!(rule.validate().is_ok());
/// assert_eq!(rule.layer(1), Some("TN_BULD"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Unique rule identifier
    pub rule_id: String,

    /// Strategy key, e.g. `PointInsidePolygon`
    pub case_type: String,

    /// Participating layer names, in the order the case type expects
    pub layers: Vec<String>,

    /// Optional attribute filter applied to the primary layer
    #[serde(default)]
    pub attribute_filter: Option<String>,

    /// Spatial tolerance in map units
    #[serde(default)]
    pub tolerance: f64,

    /// Disabled rules are skipped
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Human-readable description
    #[serde(default)]
    pub description: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl Rule {
    /// Creates an enabled rule with zero tolerance.
    pub fn new<I, S>(rule_id: impl Into<String>, case_type: impl Into<String>, layers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rule_id: rule_id.into(),
            case_type: case_type.into(),
            layers: layers.into_iter().map(Into::into).collect(),
            attribute_filter: None,
            tolerance: 0.0,
            enabled: true,
            description: None,
        }
    }

    /// Sets the tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Sets the attribute filter.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.attribute_filter = Some(filter.into());
        self
    }

    /// Enables or disables the rule.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// The `i`th participating layer.
    pub fn layer(&self, i: usize) -> Option<&str> {
        self.layers.get(i).map(String::as_str)
    }

    /// The attribute filter, if one is set and not blank.
    pub fn filter(&self) -> Option<&str> {
        self.attribute_filter
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
    }

    /// Checks the rule is well formed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rule_id.trim().is_empty() {
            return Err(ConfigError::EmptyRuleId);
        }
        if self.case_type.trim().is_empty() {
            return Err(ConfigError::EmptyCaseType(self.rule_id.clone()));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(ConfigError::InvalidTolerance {
                rule_id: self.rule_id.clone(),
                tolerance: self.tolerance,
            });
        }
        if self.layers.iter().all(|l| l.trim().is_empty()) {
            return Err(ConfigError::NoLayers(self.rule_id.clone()));
        }
        Ok(())
    }

    /// Checks the rule names at least `expected` layers.
    pub fn require_layers(&self, expected: usize) -> Result<(), ConfigError> {
        let actual = self.layers.iter().filter(|l| !l.trim().is_empty()).count();
        if actual < expected {
            return Err(ConfigError::MissingLayers {
                rule_id: self.rule_id.clone(),
                expected,
                actual,
            });
        }
        Ok(())
    }
}

/// Ordered relation rules for stage 5.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationCheckConfig {
    pub rules: Vec<Rule>,
}

impl RelationCheckConfig {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Distinct layer names referenced by enabled rules.
    pub fn referenced_tables(&self) -> BTreeSet<String> {
        self.rules
            .iter()
            .filter(|r| r.enabled)
            .flat_map(|r| r.layers.iter().cloned())
            .filter(|l| !l.trim().is_empty())
            .collect()
    }

    /// Number of enabled rules.
    pub fn enabled_count(&self) -> usize {
        self.rules.iter().filter(|r| r.enabled).count()
    }
}

/// Expected table for stage 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Configuration identifier
    pub table_id: String,
    /// Layer name in the data source
    pub table_name: String,
    /// Expected geometry kind, if the table is spatial
    #[serde(default)]
    pub geometry_kind: Option<GeometryKind>,
    /// A missing required table is an error
    #[serde(default = "default_enabled")]
    pub required: bool,
}

impl TableSpec {
    pub fn new(table_id: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            table_id: table_id.into(),
            table_name: table_name.into(),
            geometry_kind: None,
            required: true,
        }
    }

    pub fn with_geometry(mut self, kind: GeometryKind) -> Self {
        self.geometry_kind = Some(kind);
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Stage 1 configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableCheckConfig {
    pub tables: Vec<TableSpec>,
}

impl TableCheckConfig {
    /// Looks up a table spec by configured id or layer name (case-insensitive).
    pub fn find(&self, key: &str) -> Option<&TableSpec> {
        self.tables.iter().find(|t| {
            t.table_id.eq_ignore_ascii_case(key) || t.table_name.eq_ignore_ascii_case(key)
        })
    }

    /// Resolves a configured table id to its layer name; unknown ids pass through.
    pub fn layer_name<'a>(&'a self, key: &'a str) -> &'a str {
        self.find(key).map_or(key, |t| t.table_name.as_str())
    }
}

/// Expected field for stage 2.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub table_id: String,
    pub field_name: String,
    pub kind: FieldKind,
    #[serde(default = "default_enabled")]
    pub nullable: bool,
}

impl FieldSpec {
    pub fn new(table_id: impl Into<String>, field_name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            table_id: table_id.into(),
            field_name: field_name.into(),
            kind,
            nullable: true,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Stage 2 configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaCheckConfig {
    pub fields: Vec<FieldSpec>,
    /// Report layer fields that are not declared
    #[serde(default)]
    pub report_undefined_fields: bool,
}

impl SchemaCheckConfig {
    /// Distinct table ids, in first-seen order.
    pub fn table_ids(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.fields
            .iter()
            .map(|f| f.table_id.as_str())
            .filter(|id| seen.insert(id.to_ascii_lowercase()))
            .collect()
    }

    /// Field specs declared for a table.
    pub fn fields_for<'a>(&'a self, table_id: &'a str) -> impl Iterator<Item = &'a FieldSpec> + 'a {
        self.fields
            .iter()
            .filter(move |f| f.table_id.eq_ignore_ascii_case(table_id))
    }
}

/// A per-feature geometry check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GeometryCheck {
    /// Feature has no geometry
    NullGeometry,
    /// Geometry holds no coordinates
    EmptyGeometry,
    /// Consecutive identical vertices
    DuplicateVertex,
    /// Polygon ring whose first and last vertex differ
    UnclosedRing,
    /// Linear geometry shorter than `min`
    MinLength {
        /// Minimum length (inclusive)
        min: f64,
    },
    /// Areal geometry smaller than `min`
    MinArea {
        /// Minimum area (inclusive)
        min: f64,
    },
}

/// Geometry checks applied to one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryCheckItem {
    pub table_id: String,
    pub checks: Vec<GeometryCheck>,
}

/// Stage 3 configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeometryCheckConfig {
    pub items: Vec<GeometryCheckItem>,
}

impl GeometryCheckConfig {
    /// Total number of configured checks.
    pub fn check_count(&self) -> usize {
        self.items.iter().map(|i| i.checks.len()).sum()
    }
}

/// A per-value attribute check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttributeCheck {
    /// Value must not be null
    NotNull,
    /// Value must be one of the allowed values
    AllowedValues {
        /// Valid values, compared as text
        values: Vec<String>,
    },
    /// Numeric value must be within the range
    Range {
        /// Minimum value (inclusive)
        min: f64,
        /// Maximum value (inclusive)
        max: f64,
    },
    /// Text value must match the pattern
    Pattern {
        /// Regular expression
        regex: String,
    },
}

/// One attribute rule for stage 4.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeRule {
    pub rule_id: String,
    pub table_id: String,
    pub field: String,
    pub check: AttributeCheck,
    #[serde(default)]
    pub severity: Severity,
    /// Only features matching this filter are checked
    #[serde(default)]
    pub attribute_filter: Option<String>,
}

impl AttributeRule {
    pub fn new(
        rule_id: impl Into<String>,
        table_id: impl Into<String>,
        field: impl Into<String>,
        check: AttributeCheck,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            table_id: table_id.into(),
            field: field.into(),
            check,
            severity: Severity::Error,
            attribute_filter: None,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.attribute_filter = Some(filter.into());
        self
    }
}

/// Stage 4 configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeCheckConfig {
    pub rules: Vec<AttributeRule>,
}

impl AttributeCheckConfig {
    /// Number of distinct (table, field) pairs checked.
    pub fn column_count(&self) -> usize {
        self.rules
            .iter()
            .map(|r| {
                (
                    r.table_id.to_ascii_lowercase(),
                    r.field.to_ascii_lowercase(),
                )
            })
            .collect::<HashSet<_>>()
            .len()
    }
}

/// Configuration of all stages of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageConfigs {
    #[serde(default)]
    pub table: TableCheckConfig,
    #[serde(default)]
    pub schema: SchemaCheckConfig,
    #[serde(default)]
    pub geometry: GeometryCheckConfig,
    #[serde(default)]
    pub attribute: AttributeCheckConfig,
    #[serde(default)]
    pub relation: RelationCheckConfig,
    /// Stages that are skipped
    #[serde(default)]
    pub disabled: BTreeSet<StageId>,
}

impl StageConfigs {
    /// Returns true unless the stage is disabled. Stage 0 always runs.
    pub fn is_enabled(&self, stage: StageId) -> bool {
        stage == StageId::PreCheck || !self.disabled.contains(&stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_rule_validation() {
        assert_eq!(
            Rule::new("", "PointInsidePolygon", ["A"]).validate(),
            Err(ConfigError::EmptyRuleId)
        );
        assert_eq!(
            Rule::new("R1", " ", ["A"]).validate(),
            Err(ConfigError::EmptyCaseType("R1".to_string()))
        );
        assert_eq!(
            Rule::new("R1", "X", Vec::<String>::new()).validate(),
            Err(ConfigError::NoLayers("R1".to_string()))
        );
        assert!(matches!(
            Rule::new("R1", "X", ["A"]).with_tolerance(-1.0).validate(),
            Err(ConfigError::InvalidTolerance { .. })
        ));
        assert!(Rule::new("R1", "X", ["A"]).with_tolerance(0.0).validate().is_ok());
    }

    #[test]
    fn test_blank_filter_is_none() {
        let rule = Rule::new("R1", "X", ["A"]).with_filter("   ");
        assert_eq!(rule.filter(), None);
        let rule = rule.with_filter("KIND = 'A'");
        assert_eq!(rule.filter(), Some("KIND = 'A'"));
    }

    #[test]
    fn test_require_layers() {
        let rule = Rule::new("R1", "X", ["A"]);
        assert!(rule.require_layers(1).is_ok());
        assert_eq!(
            rule.require_layers(2),
            Err(ConfigError::MissingLayers {
                rule_id: "R1".to_string(),
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn test_referenced_tables_skip_disabled() {
        let config = RelationCheckConfig::new(vec![
            Rule::new("R1", "X", ["A", "B"]),
            Rule::new("R2", "X", ["C"]).with_enabled(false),
            Rule::new("R3", "X", ["B"]),
        ]);
        let tables: Vec<_> = config.referenced_tables().into_iter().collect();
        assert_eq!(tables, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(config.enabled_count(), 2);
    }

    #[test]
    fn test_attribute_column_count() {
        let config = AttributeCheckConfig {
            rules: vec![
                AttributeRule::new("A1", "T", "CODE", AttributeCheck::NotNull),
                AttributeRule::new("A2", "t", "code", AttributeCheck::NotNull),
                AttributeRule::new("A3", "T", "NAME", AttributeCheck::NotNull),
            ],
        };
        assert_eq!(config.column_count(), 2);
    }

    #[test]
    fn test_deserialize_rule_defaults() {
        let rule: Rule = serde_json::from_str(
            r#"{"rule_id":"R1","case_type":"LineWithinPolygon","layers":["L","P"]}"#,
        )
        .unwrap();
        assert!(rule.enabled);
        assert_eq!(rule.tolerance, 0.0);
        assert_eq!(rule.filter(), None);
    }
}
