//! Relation checks (stage 5).
//!
//! A relation rule names a case type and an ordered list of layers. The case
//! type selects a [`RelationCheckStrategy`] from the [`StrategyRegistry`];
//! the strategy walks the layers and records a finding for every feature
//! that violates the spatial predicate.
//!
//! Strategies get their base services from [`RuleRun`]: layer resolution,
//! cancellation checks, throttled progress and error synthesis.

mod line_within_polygon;
mod point_inside_polygon;
mod polygon_contains_point;
mod registry;
mod stage;

pub use line_within_polygon::{LINE_OUTSIDE_POLYGON, LineWithinPolygon};
pub use point_inside_polygon::{POINT_OUTSIDE_POLYGON, PointInsidePolygon};
pub use polygon_contains_point::{POLYGON_WITHOUT_POINT, PolygonContainsPoint};
pub use registry::{StrategyFactory, StrategyRegistry};
pub(crate) use stage::run_relation_stage;
pub use stage::{INVALID_RULE, LAYER_NOT_FOUND, STRATEGY_FAILED, UNSUPPORTED_CASE_TYPE};

use crate::RelationCheckError;
use crate::location::extract_centroid;
use crate::progress::RuleProgressReporter;
use spatialcheck_core::{
    DataAccessError, DataSource, Envelope, Geometry, GeometryEngine, Layer, Rule, Severity,
    TableCheckConfig, ValidationError, ValidationResult,
};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// A pluggable spatial predicate keyed by case type.
pub trait RelationCheckStrategy: Send + Sync {
    /// The case type this strategy handles, e.g. `PointInsidePolygon`.
    fn case_type(&self) -> &str;

    /// Number of layers the rule must name.
    fn required_layers(&self) -> usize {
        2
    }

    /// Evaluates the rule, recording findings through `run`.
    fn execute(&self, run: &mut RuleRun<'_>) -> Result<(), RelationCheckError>;
}

/// Execution context of one rule invocation.
pub struct RuleRun<'a> {
    data_source: &'a dyn DataSource,
    tables: &'a TableCheckConfig,
    engine: &'a dyn GeometryEngine,
    result: &'a mut ValidationResult,
    rule: &'a Rule,
    progress: RuleProgressReporter<'a>,
    cancel: &'a CancellationToken,
    errors_added: usize,
}

impl<'a> RuleRun<'a> {
    pub fn new(
        data_source: &'a dyn DataSource,
        tables: &'a TableCheckConfig,
        engine: &'a dyn GeometryEngine,
        result: &'a mut ValidationResult,
        rule: &'a Rule,
        progress: RuleProgressReporter<'a>,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            data_source,
            tables,
            engine,
            result,
            rule,
            progress,
            cancel,
            errors_added: 0,
        }
    }

    pub fn rule(&self) -> &'a Rule {
        self.rule
    }

    pub fn engine(&self) -> &'a dyn GeometryEngine {
        self.engine
    }

    pub fn data_source(&self) -> &'a dyn DataSource {
        self.data_source
    }

    /// Findings recorded by this invocation so far.
    pub fn errors_added(&self) -> usize {
        self.errors_added
    }

    /// Opens a layer by name, or by configured table id.
    pub fn layer(&self, name: &str) -> Result<Box<dyn Layer>, RelationCheckError> {
        self.data_source
            .layer(name)
            .or_else(|| self.data_source.layer(self.tables.layer_name(name)))
            .ok_or_else(|| RelationCheckError::missing_layer(&self.rule.rule_id, name))
    }

    /// Opens the `index`th layer of the rule.
    pub fn rule_layer(&self, index: usize) -> Result<Box<dyn Layer>, RelationCheckError> {
        let name = self
            .rule
            .layer(index)
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| {
                RelationCheckError::InvalidRule(spatialcheck_core::ConfigError::MissingLayers {
                    rule_id: self.rule.rule_id.clone(),
                    expected: index + 1,
                    actual: self.rule.layers.len(),
                })
            })?;
        self.layer(name)
    }

    /// Fails with `Cancelled` once cancellation has been requested.
    pub fn check_cancelled(&self) -> Result<(), RelationCheckError> {
        if self.cancel.is_cancelled() {
            Err(RelationCheckError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Reports progress; non-terminal reports are throttled.
    pub fn report_progress(&mut self, processed: u64, total: u64, completed: bool, successful: bool) {
        self.progress
            .set_counts(self.result.error_count(), self.result.warning_count());
        self.progress.report(processed, total, completed, successful);
    }

    pub(crate) fn result_mut(&mut self) -> &mut ValidationResult {
        &mut *self.result
    }

    /// Sends the rule's terminal event at the last reported position,
    /// unless the strategy already sent one.
    pub(crate) fn finish_progress(&mut self, successful: bool) {
        self.progress
            .set_counts(self.result.error_count(), self.result.warning_count());
        self.progress.finish(successful);
    }

    /// Records an error located at the geometry's representative point.
    pub fn add_error(
        &mut self,
        error_code: &str,
        message: impl Into<String>,
        table: &str,
        feature_id: Option<i64>,
        geometry: Option<&Geometry>,
    ) {
        let at = extract_centroid(self.engine, geometry);
        let mut error = ValidationError::new(error_code, message, Severity::Error)
            .with_table(table)
            .at(at.x, at.y);
        if !table.trim().is_empty() {
            error = error.with_table_id(table);
        }
        error.feature_id = feature_id;
        self.result.push_error(error);
        self.errors_added += 1;
    }

    /// Records an error whose message carries extra detail: `"{message} ({info})"`.
    pub fn add_detailed_error(
        &mut self,
        error_code: &str,
        message: &str,
        table: &str,
        feature_id: Option<i64>,
        additional_info: &str,
        geometry: Option<&Geometry>,
    ) {
        let message = if additional_info.trim().is_empty() {
            message.to_string()
        } else {
            format!("{message} ({additional_info})")
        };
        self.add_error(error_code, message, table, feature_id, geometry);
    }
}

/// Reads the geometry of the feature with object id `oid`.
///
/// The layer is left unrestricted afterwards, whether or not the read
/// succeeded.
pub fn lookup_geometry_by_object_id(
    layer: &mut dyn Layer,
    oid: i64,
) -> Result<Option<Geometry>, DataAccessError> {
    if let Err(e) = layer.set_attribute_filter(Some(&format!("OBJECTID = {oid}"))) {
        if let Err(reset) = layer.set_attribute_filter(None) {
            warn!(oid, error = %reset, "failed to clear attribute filter");
        }
        return Err(e);
    }
    let read = layer.next_feature();
    let restored = layer.set_attribute_filter(None);
    let feature = read?;
    restored?;
    Ok(feature.and_then(|f| f.geometry))
}

/// Returns true if every vertex of `line` lies within `tolerance` of `polygon`.
///
/// A vertex exactly `tolerance` away is within. Engine failures count as
/// outside. Only vertices are sampled, so a segment bulging out between two
/// vertices that are both within tolerance is accepted.
pub fn is_line_within_tolerance(
    engine: &dyn GeometryEngine,
    line: &Geometry,
    polygon: &Geometry,
    tolerance: f64,
) -> bool {
    for vertex in line.vertices() {
        match engine.distance(&Geometry::Point(vertex), polygon) {
            Ok(distance) if distance > tolerance => return false,
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "tolerance check failed");
                return false;
            }
        }
    }
    true
}

/// A feature of a reference layer held for repeated spatial tests.
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub geometry: Geometry,
    pub envelope: Envelope,
}

/// Loads every feature of a layer that has a non-empty geometry.
pub(crate) fn load_candidates(
    run: &RuleRun<'_>,
    layer: &mut dyn Layer,
) -> Result<Vec<Candidate>, RelationCheckError> {
    let mut out = Vec::new();
    layer.reset_reading();
    while let Some(feature) = layer.next_feature()? {
        run.check_cancelled()?;
        let Some(geometry) = feature.geometry else {
            continue;
        };
        if let Some(envelope) = geometry.envelope() {
            out.push(Candidate {
                geometry,
                envelope,
            });
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use spatialcheck_core::{Feature, FieldDefn, GeometryKind, Polygon};
    use spatialcheck_memory::{MemoryDataSource, MemoryLayer, PlanarEngine};

    fn square() -> Geometry {
        Geometry::Polygon(Polygon::rectangle(0.0, 0.0, 10.0, 10.0))
    }

    #[test]
    fn test_tolerance_boundary_is_inclusive() {
        let engine = PlanarEngine::new();
        let line = Geometry::line([(5.0, 5.0), (5.0, 10.5)]);
        assert!(is_line_within_tolerance(&engine, &line, &square(), 0.5));
        assert!(!is_line_within_tolerance(&engine, &line, &square(), 0.25));
    }

    #[test]
    fn test_tolerance_scenario() {
        let engine = PlanarEngine::new();
        let line = Geometry::line([(5.0, 5.0), (5.0, 10.05)]);
        assert!(is_line_within_tolerance(&engine, &line, &square(), 0.1));
        assert!(!is_line_within_tolerance(&engine, &line, &square(), 0.01));
    }

    #[test]
    fn test_tolerance_engine_error_is_outside() {
        let engine = PlanarEngine::new();
        let line = Geometry::line([(5.0, 5.0)]);
        assert!(!is_line_within_tolerance(
            &engine,
            &line,
            &Geometry::Polygon(Polygon::new(vec![])),
            100.0
        ));
    }

    #[test]
    fn test_lookup_by_object_id_restores_filter() {
        let source = MemoryDataSource::new("ds").with_layer(
            MemoryLayer::new("P", GeometryKind::Point).with_features(
                (1..=3).map(|i| Feature::new(i, Some(Geometry::point(i as f64, 0.0)))),
            ),
        );
        let mut layer = source.layer("P").unwrap();
        let g = lookup_geometry_by_object_id(layer.as_mut(), 2).unwrap();
        assert_eq!(g, Some(Geometry::point(2.0, 0.0)));
        assert_eq!(layer.attribute_filter(), None);
        assert_eq!(lookup_geometry_by_object_id(layer.as_mut(), 99).unwrap(), None);
        assert_eq!(layer.feature_count().unwrap(), 3);
    }

    /// A layer that rejects object id filters after a scoped filter is set.
    struct OidFilterRejected {
        filter: Option<String>,
    }

    impl Layer for OidFilterRejected {
        fn name(&self) -> &str {
            "P"
        }

        fn geometry_kind(&self) -> GeometryKind {
            GeometryKind::Point
        }

        fn fields(&self) -> &[FieldDefn] {
            &[]
        }

        fn feature_count(&self) -> Result<u64, DataAccessError> {
            Ok(0)
        }

        fn set_attribute_filter(&mut self, filter: Option<&str>) -> Result<(), DataAccessError> {
            match filter {
                Some(f) if f.starts_with("OBJECTID") => {
                    Err(DataAccessError::invalid_filter(f, "unknown column"))
                }
                other => {
                    self.filter = other.map(str::to_string);
                    Ok(())
                }
            }
        }

        fn attribute_filter(&self) -> Option<&str> {
            self.filter.as_deref()
        }

        fn reset_reading(&mut self) {}

        fn next_feature(&mut self) -> Result<Option<Feature>, DataAccessError> {
            Ok(None)
        }
    }

    #[test]
    fn test_lookup_clears_filter_when_oid_filter_is_rejected() {
        let mut layer = OidFilterRejected {
            filter: Some("USAGE = 'res'".to_string()),
        };
        let err = lookup_geometry_by_object_id(&mut layer, 7).unwrap_err();
        assert!(matches!(err, DataAccessError::InvalidFilter { .. }));
        assert_eq!(layer.attribute_filter(), None);
    }
}
