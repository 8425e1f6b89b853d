//! Builder pattern for creating rules and stage configurations.
//!
//! This module provides ergonomic builders for assembling a run
//! configuration with a fluent API.

use crate::{
    AttributeRule, ConfigError, FieldSpec, GeometryCheck, GeometryCheckItem, Rule, StageConfigs,
    StageId, TableSpec,
};

/// Builder for creating a relation [`Rule`].
///
/// # Example
///
/// ```rust
/// use spatialcheck_core::RuleBuilder;
///
/// let rule = RuleBuilder::new("R1", "LineWithinPolygon")
///     .layer("TN_RODWAY_CTLN")
///     .layer("TN_ADMIN_BNDRY")
///     .tolerance(0.1)
///     .filter("ROAD_SE = 'RDS001'")
///     .build()
///     .unwrap();
/// assert_eq!(rule.layers.len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct RuleBuilder {
    rule_id: String,
    case_type: String,
    layers: Vec<String>,
    attribute_filter: Option<String>,
    tolerance: f64,
    enabled: bool,
    description: Option<String>,
}

impl RuleBuilder {
    /// Creates a new rule builder.
    ///
    /// # Arguments
    ///
    /// * `rule_id` - Unique rule identifier
    /// * `case_type` - Strategy key
    pub fn new(rule_id: impl Into<String>, case_type: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.into(),
            case_type: case_type.into(),
            enabled: true,
            ..Default::default()
        }
    }

    /// Appends a participating layer.
    pub fn layer(mut self, layer: impl Into<String>) -> Self {
        self.layers.push(layer.into());
        self
    }

    /// Sets the spatial tolerance.
    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Sets the attribute filter for the primary layer.
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.attribute_filter = Some(filter.into());
        self
    }

    /// Sets the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Disables the rule.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Builds and validates the rule.
    pub fn build(self) -> Result<Rule, ConfigError> {
        let rule = Rule {
            rule_id: self.rule_id,
            case_type: self.case_type,
            layers: self.layers,
            attribute_filter: self.attribute_filter,
            tolerance: self.tolerance,
            enabled: self.enabled,
            description: self.description,
        };
        rule.validate()?;
        Ok(rule)
    }
}

/// Builder for creating [`StageConfigs`].
///
/// # Example
///
/// ```rust
/// use spatialcheck_core::{GeometryCheck, GeometryKind, StageConfigsBuilder, StageId, TableSpec};
///
/// let configs = StageConfigsBuilder::new()
///     .table(TableSpec::new("buildings", "TN_BULD").with_geometry(GeometryKind::Polygon))
///     .geometry_checks("buildings", vec![GeometryCheck::NullGeometry])
///     .disable(StageId::Attribute)
///     .build();
/// assert!(!configs.is_enabled(StageId::Attribute));
/// ```
#[derive(Debug, Default)]
pub struct StageConfigsBuilder {
    configs: StageConfigs,
}

impl StageConfigsBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an expected table.
    pub fn table(mut self, table: TableSpec) -> Self {
        self.configs.table.tables.push(table);
        self
    }

    /// Adds an expected field.
    pub fn field(mut self, field: FieldSpec) -> Self {
        self.configs.schema.fields.push(field);
        self
    }

    /// Reports fields that are not declared.
    pub fn report_undefined_fields(mut self, report: bool) -> Self {
        self.configs.schema.report_undefined_fields = report;
        self
    }

    /// Adds geometry checks for a table.
    pub fn geometry_checks(mut self, table_id: impl Into<String>, checks: Vec<GeometryCheck>) -> Self {
        self.configs.geometry.items.push(GeometryCheckItem {
            table_id: table_id.into(),
            checks,
        });
        self
    }

    /// Adds an attribute rule.
    pub fn attribute_rule(mut self, rule: AttributeRule) -> Self {
        self.configs.attribute.rules.push(rule);
        self
    }

    /// Appends a relation rule.
    pub fn relation_rule(mut self, rule: Rule) -> Self {
        self.configs.relation.rules.push(rule);
        self
    }

    /// Disables a stage. Stage 0 cannot be disabled.
    pub fn disable(mut self, stage: StageId) -> Self {
        if stage != StageId::PreCheck {
            self.configs.disabled.insert(stage);
        }
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> StageConfigs {
        self.configs
    }
}
