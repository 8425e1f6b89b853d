//! Lines that must stay within a polygon layer.

use super::{RelationCheckStrategy, RuleRun, is_line_within_tolerance, load_candidates};
use crate::RelationCheckError;
use crate::scoped::apply_scoped_attribute_filter;

pub const LINE_OUTSIDE_POLYGON: &str = "REL_LINE_OUTSIDE_POLYGON";

/// Every `layers[0]` line (filtered) must lie within `tolerance` of a single
/// `layers[1]` polygon.
#[derive(Debug, Default, Clone, Copy)]
pub struct LineWithinPolygon;

impl LineWithinPolygon {
    pub const CASE_TYPE: &'static str = "LineWithinPolygon";
}

impl RelationCheckStrategy for LineWithinPolygon {
    fn case_type(&self) -> &str {
        Self::CASE_TYPE
    }

    fn execute(&self, run: &mut RuleRun<'_>) -> Result<(), RelationCheckError> {
        let rule = run.rule();
        let mut lines = run.rule_layer(0)?;
        let mut polygons = run.rule_layer(1)?;
        let candidates = load_candidates(run, polygons.as_mut())?;

        let mut scoped = apply_scoped_attribute_filter(lines.as_mut(), rule.filter());
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

            let Some((line, envelope)) = feature
                .geometry
                .as_ref()
                .and_then(|g| g.envelope().map(|e| (g, e)))
            else {
                run.report_progress(processed, total, false, true);
                continue;
            };

            let inside = candidates
                .iter()
                .filter(|c| c.envelope.expand_by(rule.tolerance).intersects(&envelope))
                .any(|c| is_line_within_tolerance(run.engine(), line, &c.geometry, rule.tolerance));

            if !inside {
                run.add_detailed_error(
                    LINE_OUTSIDE_POLYGON,
                    "Line leaves its polygon",
                    &table,
                    Some(feature.fid),
                    &format!("polygon layer {}, tolerance {}", polygons.name(), rule.tolerance),
                    Some(line),
                );
            }
            run.report_progress(processed, total, false, true);
        }

        run.report_progress(processed, total, true, true);
        Ok(())
    }
}
