//! Stage 3: per-feature geometry checks.

use super::{StageContext, part_progress, unit_percent};
use crate::StageError;
use crate::location::extract_centroid;
use spatialcheck_core::{
    Coord, Feature, Geometry, GeometryCheck, GeometryEngine, Polygon, Severity, StageResult,
    ValidationError, ValidationResult,
};
use tracing::warn;

pub const GEOM_NULL: &str = "GEOM_NULL";
pub const GEOM_EMPTY: &str = "GEOM_EMPTY";
pub const GEOM_DUPLICATE_VERTEX: &str = "GEOM_DUPLICATE_VERTEX";
pub const GEOM_UNCLOSED_RING: &str = "GEOM_UNCLOSED_RING";
pub const GEOM_SHORT_LINE: &str = "GEOM_SHORT_LINE";
pub const GEOM_SMALL_AREA: &str = "GEOM_SMALL_AREA";

pub(crate) fn run_geometry_stage(
    ctx: &StageContext<'_>,
    result: &mut ValidationResult,
    summary: &mut StageResult,
) -> Result<(), StageError> {
    let items = &ctx.configs.geometry.items;
    let count = items.len();

    for (index, item) in items.iter().enumerate() {
        ctx.check_cancelled()?;
        if item.checks.is_empty() {
            continue;
        }
        let Some(mut layer) = ctx.table_layer(&item.table_id) else {
            continue;
        };
        let table = layer.name().to_string();
        let total = layer.feature_count()?;
        layer.reset_reading();

        let mut processed = 0;
        loop {
            ctx.check_cancelled()?;
            let Some(feature) = layer.next_feature()? else {
                break;
            };
            processed += 1;

            for check in &item.checks {
                if let Some((code, message, at)) = evaluate(ctx.engine, check, &feature) {
                    result.push_error(
                        ValidationError::new(code, message, Severity::Error)
                            .with_table(&table)
                            .with_table_id(&item.table_id)
                            .with_feature(feature.fid)
                            .at(at.x, at.y),
                    );
                }
            }

            ctx.progress(
                result,
                part_progress(index, count, unit_percent(processed, total)),
                processed,
                total,
                format!("Checking geometry of {table}"),
            );
        }
        summary.processed_units += processed;
    }
    Ok(())
}

/// Runs one check on one feature; returns the finding, if any.
fn evaluate(
    engine: &dyn GeometryEngine,
    check: &GeometryCheck,
    feature: &Feature,
) -> Option<(&'static str, String, Coord)> {
    let geometry = feature.geometry.as_ref();
    let Some(g) = geometry else {
        return matches!(check, GeometryCheck::NullGeometry).then(|| {
            (GEOM_NULL, "Feature has no geometry".to_string(), Coord::new(0.0, 0.0))
        });
    };
    if g.is_empty() {
        return matches!(check, GeometryCheck::EmptyGeometry).then(|| {
            (GEOM_EMPTY, "Geometry is empty".to_string(), extract_centroid(engine, geometry))
        });
    }

    match check {
        GeometryCheck::NullGeometry | GeometryCheck::EmptyGeometry => None,
        GeometryCheck::DuplicateVertex => duplicate_vertex(g)
            .map(|at| (GEOM_DUPLICATE_VERTEX, format!("Repeated vertex at ({} {})", at.x, at.y), at)),
        GeometryCheck::UnclosedRing => unclosed_ring(g).map(|at| {
            (GEOM_UNCLOSED_RING, "Polygon ring is not closed".to_string(), at)
        }),
        GeometryCheck::MinLength { min } if g.kind().is_linear() => {
            let length = measure(engine.length(g), feature.fid, "length")?;
            (length < *min).then(|| {
                (
                    GEOM_SHORT_LINE,
                    format!("Length {length} is below {min}"),
                    extract_centroid(engine, geometry),
                )
            })
        }
        GeometryCheck::MinArea { min } if g.kind().is_areal() => {
            let area = measure(engine.area(g), feature.fid, "area")?;
            (area < *min).then(|| {
                (
                    GEOM_SMALL_AREA,
                    format!("Area {area} is below {min}"),
                    extract_centroid(engine, geometry),
                )
            })
        }
        GeometryCheck::MinLength { .. } | GeometryCheck::MinArea { .. } => None,
    }
}

fn measure<E: std::fmt::Display>(value: Result<f64, E>, fid: i64, what: &str) -> Option<f64> {
    match value {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(fid, error = %e, "could not measure {what}");
            None
        }
    }
}

/// Paths whose consecutive vertices are checked: lines and rings.
fn paths(g: &Geometry) -> Vec<&[Coord]> {
    match g {
        Geometry::Point(_) | Geometry::MultiPoint(_) => Vec::new(),
        Geometry::LineString(cs) => vec![cs.as_slice()],
        Geometry::MultiLineString(parts) => parts.iter().map(Vec::as_slice).collect(),
        Geometry::Polygon(p) => p.rings().map(Vec::as_slice).collect(),
        Geometry::MultiPolygon(ps) => ps
            .iter()
            .flat_map(Polygon::rings)
            .map(Vec::as_slice)
            .collect(),
        Geometry::GeometryCollection(gs) => gs.iter().flat_map(paths).collect(),
    }
}

fn duplicate_vertex(g: &Geometry) -> Option<Coord> {
    paths(g)
        .into_iter()
        .flat_map(|path| path.windows(2))
        .find(|pair| pair[0] == pair[1])
        .map(|pair| pair[0])
}

fn unclosed_ring(g: &Geometry) -> Option<Coord> {
    let polygons: Vec<&Polygon> = match g {
        Geometry::Polygon(p) => vec![p],
        Geometry::MultiPolygon(ps) => ps.iter().collect(),
        _ => return None,
    };
    polygons
        .into_iter()
        .flat_map(Polygon::rings)
        .filter(|ring| !ring.is_empty())
        .find(|ring| ring.first() != ring.last() || ring.len() < 4)
        .and_then(|ring| ring.first().copied())
}
