//! Points that must fall inside a polygon layer.

use super::{Candidate, RelationCheckStrategy, RuleRun, load_candidates};
use crate::RelationCheckError;
use crate::scoped::apply_scoped_attribute_filter;
use spatialcheck_core::{Geometry, GeometryEngine};
use tracing::debug;

pub const POINT_OUTSIDE_POLYGON: &str = "REL_POINT_OUTSIDE_POLYGON";

/// `layers[0]` points (filtered) must be covered by some `layers[1]`
/// polygon, or lie within `tolerance` of one.
#[derive(Debug, Default, Clone, Copy)]
pub struct PointInsidePolygon;

impl PointInsidePolygon {
    pub const CASE_TYPE: &'static str = "PointInsidePolygon";
}

pub(super) fn within_any(
    engine: &dyn GeometryEngine,
    geometry: &Geometry,
    candidates: &[Candidate],
    tolerance: f64,
) -> Result<bool, RelationCheckError> {
    let Some(envelope) = geometry.envelope() else {
        return Ok(false);
    };
    for candidate in candidates {
        if !candidate.envelope.expand_by(tolerance).intersects(&envelope) {
            continue;
        }
        if engine.distance(geometry, &candidate.geometry)? <= tolerance {
            return Ok(true);
        }
    }
    Ok(false)
}

impl RelationCheckStrategy for PointInsidePolygon {
    fn case_type(&self) -> &str {
        Self::CASE_TYPE
    }

    fn execute(&self, run: &mut RuleRun<'_>) -> Result<(), RelationCheckError> {
        let rule = run.rule();
        let mut points = run.rule_layer(0)?;
        let mut polygons = run.rule_layer(1)?;

        let candidates = load_candidates(run, polygons.as_mut())?;
        debug!(rule_id = %rule.rule_id, polygons = candidates.len(), "loaded polygons");

        let mut scoped = apply_scoped_attribute_filter(points.as_mut(), rule.filter());
        let table = scoped.name().to_string();
        let total = scoped.feature_count()?;
        scoped.reset_reading();

        let mut processed = 0;
        run.report_progress(0, total, false, true);
        loop {
            run.check_cancelled()?;
            let Some(feature) = scoped.next_feature()? else {
                break;
            };
            processed += 1;

            if let Some(point) = feature.geometry.as_ref().filter(|g| !g.is_empty()) {
                if !within_any(run.engine(), point, &candidates, rule.tolerance)? {
                    run.add_detailed_error(
                        POINT_OUTSIDE_POLYGON,
                        "Point is not inside any polygon",
                        &table,
                        Some(feature.fid),
                        &format!("polygon layer {}, tolerance {}", polygons.name(), rule.tolerance),
                        Some(point),
                    );
                }
            }
            run.report_progress(processed, total, false, true);
        }

        run.report_progress(processed, total, true, true);
        Ok(())
    }
}
