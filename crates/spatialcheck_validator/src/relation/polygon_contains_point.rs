//! Polygons that must contain at least one point.

use super::point_inside_polygon::within_any;
use super::{RelationCheckStrategy, RuleRun, load_candidates, lookup_geometry_by_object_id};
use crate::RelationCheckError;
use crate::scoped::apply_scoped_attribute_filter;
use tracing::warn;

pub const POLYGON_WITHOUT_POINT: &str = "REL_POLYGON_WITHOUT_POINT";

/// Every `layers[0]` polygon (filtered) must contain a `layers[1]` point,
/// or have one within `tolerance`.
///
/// Failing polygons are collected by object id during the scan and re-read
/// afterwards for error placement.
#[derive(Debug, Default, Clone, Copy)]
pub struct PolygonContainsPoint;

impl PolygonContainsPoint {
    pub const CASE_TYPE: &'static str = "PolygonContainsPoint";
}

impl RelationCheckStrategy for PolygonContainsPoint {
    fn case_type(&self) -> &str {
        Self::CASE_TYPE
    }

    fn execute(&self, run: &mut RuleRun<'_>) -> Result<(), RelationCheckError> {
        let rule = run.rule();
        let mut polygons = run.rule_layer(0)?;
        let mut points = run.rule_layer(1)?;
        let candidates = load_candidates(run, points.as_mut())?;
        let point_layer = points.name().to_string();

        let mut missing: Vec<i64> = Vec::new();
        let (table, total, processed) = {
            let mut scoped = apply_scoped_attribute_filter(polygons.as_mut(), rule.filter());
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

                if let Some(polygon) = feature.geometry.as_ref().filter(|g| !g.is_empty()) {
                    if !within_any(run.engine(), polygon, &candidates, rule.tolerance)? {
                        missing.push(feature.fid);
                    }
                }
                run.report_progress(processed, total, false, true);
            }
            (table, total, processed)
        };

        for oid in missing {
            run.check_cancelled()?;
            let geometry = match lookup_geometry_by_object_id(polygons.as_mut(), oid) {
                Ok(g) => g,
                Err(e) => {
                    warn!(rule_id = %rule.rule_id, oid, error = %e, "could not re-read polygon");
                    None
                }
            };
            run.add_detailed_error(
                POLYGON_WITHOUT_POINT,
                "Polygon contains no point",
                &table,
                Some(oid),
                &format!("point layer {point_layer}"),
                geometry.as_ref(),
            );
        }

        run.report_progress(processed, total, true, true);
        Ok(())
    }
}
