//! Representative locations for findings.

use spatialcheck_core::{Coord, Geometry, GeometryEngine, GeometryKind};
use tracing::debug;

/// Picks the point a finding is reported at.
///
/// Polygons use the engine's interior point, lines their arc-length
/// midpoint, points their first vertex. Other kinds, and any extraction that
/// fails, fall back to the envelope center. A missing geometry (or one with
/// no envelope) is placed at the origin.
pub fn extract_centroid(engine: &dyn GeometryEngine, geometry: Option<&Geometry>) -> Coord {
    let Some(geometry) = geometry else {
        return Coord::new(0.0, 0.0);
    };

    let extracted = match geometry.kind() {
        GeometryKind::Polygon | GeometryKind::MultiPolygon => {
            match engine.interior_point(geometry) {
                Ok(p) => Some(p),
                Err(e) => {
                    debug!(error = %e, "interior point failed, using envelope center");
                    None
                }
            }
        }
        GeometryKind::LineString | GeometryKind::MultiLineString => geometry.line_midpoint(),
        GeometryKind::Point | GeometryKind::MultiPoint => geometry.first_vertex(),
        GeometryKind::GeometryCollection | GeometryKind::None => None,
    };

    extracted
        .filter(|c| c.x.is_finite() && c.y.is_finite())
        .or_else(|| geometry.envelope().map(|e| e.center()))
        .unwrap_or(Coord::new(0.0, 0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use spatialcheck_core::{GeometryError, Polygon};
    use spatialcheck_memory::PlanarEngine;

    struct FailingEngine;

    impl GeometryEngine for FailingEngine {
        fn distance(&self, _: &Geometry, _: &Geometry) -> Result<f64, GeometryError> {
            Err(GeometryError::Engine("down".into()))
        }
        fn contains(&self, _: &Geometry, _: &Geometry) -> Result<bool, GeometryError> {
            Err(GeometryError::Engine("down".into()))
        }
        fn interior_point(&self, _: &Geometry) -> Result<Coord, GeometryError> {
            Err(GeometryError::Engine("down".into()))
        }
        fn length(&self, _: &Geometry) -> Result<f64, GeometryError> {
            Err(GeometryError::Engine("down".into()))
        }
        fn area(&self, _: &Geometry) -> Result<f64, GeometryError> {
            Err(GeometryError::Engine("down".into()))
        }
    }

    #[test]
    fn test_centroid_policy() {
        let engine = PlanarEngine::new();
        assert_eq!(extract_centroid(&engine, None), Coord::new(0.0, 0.0));
        assert_eq!(
            extract_centroid(&engine, Some(&Geometry::point(3.0, 4.0))),
            Coord::new(3.0, 4.0)
        );
        assert_eq!(
            extract_centroid(&engine, Some(&Geometry::line([(0.0, 0.0), (10.0, 0.0)]))),
            Coord::new(5.0, 0.0)
        );
        let square = Geometry::Polygon(Polygon::rectangle(0.0, 0.0, 10.0, 10.0));
        assert_eq!(extract_centroid(&engine, Some(&square)), Coord::new(5.0, 5.0));
    }

    #[test]
    fn test_centroid_is_deterministic() {
        let engine = PlanarEngine::new();
        let g = Geometry::line([(0.0, 0.0), (3.0, 1.0), (7.0, 9.0)]);
        assert_eq!(
            extract_centroid(&engine, Some(&g)),
            extract_centroid(&engine, Some(&g))
        );
    }

    #[test]
    fn test_engine_failure_falls_back_to_envelope_center() {
        let square = Geometry::Polygon(Polygon::rectangle(2.0, 2.0, 6.0, 4.0));
        assert_eq!(
            extract_centroid(&FailingEngine, Some(&square)),
            Coord::new(4.0, 3.0)
        );
    }

    #[test]
    fn test_collection_uses_envelope_center() {
        let engine = PlanarEngine::new();
        let g = Geometry::GeometryCollection(vec![
            Geometry::point(0.0, 0.0),
            Geometry::point(4.0, 2.0),
        ]);
        assert_eq!(extract_centroid(&engine, Some(&g)), Coord::new(2.0, 1.0));
    }
}
