//! A planar (Cartesian) geometry engine.
//!
//! Computations treat coordinates as points on a flat plane. Boundaries are
//! inclusive: a point on a polygon edge is contained and at distance 0.

use spatialcheck_core::{Coord, Geometry, GeometryEngine, GeometryError, Polygon};
use tracing::trace;

/// Planar implementation of [`GeometryEngine`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanarEngine;

impl PlanarEngine {
    pub fn new() -> Self {
        Self
    }
}

/// A geometry broken into the primitives distance and containment work on.
#[derive(Default)]
struct Parts<'a> {
    points: Vec<Coord>,
    segments: Vec<(Coord, Coord)>,
    polygons: Vec<&'a Polygon>,
}

impl<'a> Parts<'a> {
    fn of(geometry: &'a Geometry) -> Self {
        let mut parts = Parts::default();
        parts.collect(geometry);
        parts
    }

    fn collect(&mut self, geometry: &'a Geometry) {
        match geometry {
            Geometry::Point(c) => {
                if c.x.is_finite() && c.y.is_finite() {
                    self.points.push(*c);
                }
            }
            Geometry::MultiPoint(cs) => self.points.extend_from_slice(cs),
            Geometry::LineString(cs) => self.push_path(cs),
            Geometry::MultiLineString(lines) => {
                for line in lines {
                    self.push_path(line);
                }
            }
            Geometry::Polygon(p) => self.push_polygon(p),
            Geometry::MultiPolygon(ps) => {
                for p in ps {
                    self.push_polygon(p);
                }
            }
            Geometry::GeometryCollection(gs) => {
                for g in gs {
                    self.collect(g);
                }
            }
        }
    }

    fn push_path(&mut self, path: &[Coord]) {
        match path {
            [] => {}
            [only] => self.points.push(*only),
            _ => self.segments.extend(path.windows(2).map(|w| (w[0], w[1]))),
        }
    }

    fn push_polygon(&mut self, polygon: &'a Polygon) {
        if polygon.exterior.is_empty() {
            return;
        }
        for ring in polygon.rings() {
            self.push_path(ring);
        }
        self.polygons.push(polygon);
    }

    fn is_empty(&self) -> bool {
        self.points.is_empty() && self.segments.is_empty()
    }

    /// Every vertex of the point and segment parts.
    fn vertices(&self) -> impl Iterator<Item = Coord> + '_ {
        self.points
            .iter()
            .copied()
            .chain(self.segments.iter().flat_map(|(a, b)| [*a, *b]))
    }

    fn covers_point(&self, p: &Coord) -> bool {
        self.polygons.iter().any(|poly| point_in_polygon(p, poly))
    }
}

fn cross(o: &Coord, a: &Coord, b: &Coord) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

fn on_segment(p: &Coord, a: &Coord, b: &Coord) -> bool {
    cross(a, b, p) == 0.0
        && p.x >= a.x.min(b.x)
        && p.x <= a.x.max(b.x)
        && p.y >= a.y.min(b.y)
        && p.y <= a.y.max(b.y)
}

fn point_segment_distance(p: &Coord, a: &Coord, b: &Coord) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len2 = dx * dx + dy * dy;
    if len2 == 0.0 {
        return p.distance_to(a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len2).clamp(0.0, 1.0);
    p.distance_to(&Coord::new(a.x + t * dx, a.y + t * dy))
}

fn segments_intersect(a: &Coord, b: &Coord, c: &Coord, d: &Coord) -> bool {
    let d1 = cross(c, d, a);
    let d2 = cross(c, d, b);
    let d3 = cross(a, b, c);
    let d4 = cross(a, b, d);
    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }
    on_segment(a, c, d) || on_segment(b, c, d) || on_segment(c, a, b) || on_segment(d, a, b)
}

fn segment_distance(a: &Coord, b: &Coord, c: &Coord, d: &Coord) -> f64 {
    if segments_intersect(a, b, c, d) {
        return 0.0;
    }
    point_segment_distance(a, c, d)
        .min(point_segment_distance(b, c, d))
        .min(point_segment_distance(c, a, b))
        .min(point_segment_distance(d, a, b))
}

/// Even-odd ray cast. Points on the ring count as inside.
fn point_in_ring(p: &Coord, ring: &[Coord]) -> bool {
    if ring.windows(2).any(|w| on_segment(p, &w[0], &w[1])) {
        return true;
    }
    let mut inside = false;
    let n = ring.len();
    let mut j = n.wrapping_sub(1);
    for i in 0..n {
        let (pi, pj) = (&ring[i], &ring[j]);
        if (pi.y > p.y) != (pj.y > p.y) {
            let x_cross = (pj.x - pi.x) * (p.y - pi.y) / (pj.y - pi.y) + pi.x;
            if p.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn on_ring_boundary(p: &Coord, ring: &[Coord]) -> bool {
    ring.windows(2).any(|w| on_segment(p, &w[0], &w[1]))
}

fn point_in_polygon(p: &Coord, polygon: &Polygon) -> bool {
    if polygon.exterior.is_empty() || !point_in_ring(p, &polygon.exterior) {
        return false;
    }
    // Hole boundaries still belong to the polygon
    !polygon
        .interiors
        .iter()
        .any(|hole| point_in_ring(p, hole) && !on_ring_boundary(p, hole))
}

fn ring_signed_area(ring: &[Coord]) -> f64 {
    ring.windows(2)
        .map(|w| w[0].x * w[1].y - w[1].x * w[0].y)
        .sum::<f64>()
        / 2.0
}

fn polygon_area(polygon: &Polygon) -> f64 {
    let holes: f64 = polygon.interiors.iter().map(|h| ring_signed_area(h).abs()).sum();
    (ring_signed_area(&polygon.exterior).abs() - holes).max(0.0)
}

/// Scanline interior point: the middle of the widest span on a horizontal
/// line that passes between vertices.
fn polygon_interior_point(polygon: &Polygon) -> Option<Coord> {
    let env = spatialcheck_core::Envelope::from_coords(polygon.exterior.iter())?;
    let centre = env.center().y;
    let (mut lo, mut hi) = (env.min_y, env.max_y);
    for c in polygon.rings().flatten() {
        if c.y <= centre {
            if c.y > lo {
                lo = c.y;
            }
        } else if c.y < hi {
            hi = c.y;
        }
    }
    let scan_y = (lo + hi) / 2.0;

    let mut xs: Vec<f64> = polygon
        .rings()
        .flat_map(|r| r.windows(2))
        .filter(|w| (w[0].y <= scan_y) != (w[1].y <= scan_y))
        .map(|w| w[0].x + (scan_y - w[0].y) * (w[1].x - w[0].x) / (w[1].y - w[0].y))
        .collect();
    xs.sort_by(f64::total_cmp);

    let best = xs
        .chunks_exact(2)
        .max_by(|a, b| (a[1] - a[0]).total_cmp(&(b[1] - b[0])));
    match best {
        Some(span) => Some(Coord::new((span[0] + span[1]) / 2.0, scan_y)),
        // Degenerate (zero-height) polygon
        None => polygon.exterior.first().copied(),
    }
}

impl GeometryEngine for PlanarEngine {
    fn distance(&self, a: &Geometry, b: &Geometry) -> Result<f64, GeometryError> {
        let pa = Parts::of(a);
        let pb = Parts::of(b);
        if pa.is_empty() || pb.is_empty() {
            return Err(GeometryError::Empty);
        }

        if pa.vertices().any(|v| pb.covers_point(&v)) || pb.vertices().any(|v| pa.covers_point(&v))
        {
            return Ok(0.0);
        }

        let mut best = f64::INFINITY;
        for p in &pa.points {
            for q in &pb.points {
                best = best.min(p.distance_to(q));
            }
            for (c, d) in &pb.segments {
                best = best.min(point_segment_distance(p, c, d));
            }
        }
        for (a1, a2) in &pa.segments {
            for q in &pb.points {
                best = best.min(point_segment_distance(q, a1, a2));
            }
            for (c, d) in &pb.segments {
                best = best.min(segment_distance(a1, a2, c, d));
                if best == 0.0 {
                    return Ok(0.0);
                }
            }
        }
        Ok(best)
    }

    fn contains(&self, container: &Geometry, candidate: &Geometry) -> Result<bool, GeometryError> {
        let outer = Parts::of(container);
        let inner = Parts::of(candidate);
        if outer.is_empty() || inner.is_empty() {
            return Err(GeometryError::Empty);
        }

        match container {
            Geometry::Point(c) => Ok(inner.vertices().all(|v| v == *c)),
            Geometry::Polygon(_) | Geometry::MultiPolygon(_) => {
                let vertices_covered = inner.vertices().all(|v| outer.covers_point(&v));
                // Midpoints catch edges that leave and re-enter a concave polygon
                let midpoints_covered = inner.segments.iter().all(|(s, e)| {
                    outer.covers_point(&Coord::new((s.x + e.x) / 2.0, (s.y + e.y) / 2.0))
                });
                Ok(vertices_covered && midpoints_covered)
            }
            other => Err(GeometryError::unsupported("contains", other.kind().to_string())),
        }
    }

    fn interior_point(&self, geometry: &Geometry) -> Result<Coord, GeometryError> {
        let polygon = match geometry {
            Geometry::Polygon(p) => p,
            Geometry::MultiPolygon(ps) => ps
                .iter()
                .max_by(|a, b| polygon_area(a).total_cmp(&polygon_area(b)))
                .ok_or(GeometryError::Empty)?,
            other => {
                return Err(GeometryError::unsupported(
                    "interior_point",
                    other.kind().to_string(),
                ));
            }
        };
        let point = polygon_interior_point(polygon).ok_or(GeometryError::Empty)?;
        trace!(x = point.x, y = point.y, "interior point");
        Ok(point)
    }

    fn length(&self, geometry: &Geometry) -> Result<f64, GeometryError> {
        Ok(Parts::of(geometry)
            .segments
            .iter()
            .map(|(a, b)| a.distance_to(b))
            .sum())
    }

    fn area(&self, geometry: &Geometry) -> Result<f64, GeometryError> {
        Ok(Parts::of(geometry).polygons.iter().map(|p| polygon_area(p)).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Geometry {
        Geometry::Polygon(Polygon::rectangle(0.0, 0.0, 10.0, 10.0))
    }

    #[test]
    fn test_point_distance_to_polygon() {
        let engine = PlanarEngine::new();
        assert_eq!(engine.distance(&Geometry::point(5.0, 5.0), &square()).unwrap(), 0.0);
        assert_eq!(engine.distance(&Geometry::point(10.0, 5.0), &square()).unwrap(), 0.0);
        assert_eq!(engine.distance(&Geometry::point(5.0, 10.5), &square()).unwrap(), 0.5);
        assert_eq!(engine.distance(&Geometry::point(13.0, 14.0), &square()).unwrap(), 5.0);
    }

    #[test]
    fn test_point_in_hole_is_outside() {
        let engine = PlanarEngine::new();
        let donut = Geometry::Polygon(
            Polygon::rectangle(0.0, 0.0, 10.0, 10.0).with_hole(vec![
                Coord::new(4.0, 4.0),
                Coord::new(6.0, 4.0),
                Coord::new(6.0, 6.0),
                Coord::new(4.0, 6.0),
                Coord::new(4.0, 4.0),
            ]),
        );
        assert!(!engine.contains(&donut, &Geometry::point(5.0, 5.0)).unwrap());
        assert!(engine.contains(&donut, &Geometry::point(4.0, 5.0)).unwrap());
        assert_eq!(engine.distance(&Geometry::point(5.0, 5.0), &donut).unwrap(), 1.0);
        assert_eq!(engine.area(&donut).unwrap(), 96.0);
    }

    #[test]
    fn test_contains_line() {
        let engine = PlanarEngine::new();
        let inside = Geometry::line([(1.0, 1.0), (9.0, 9.0)]);
        let crossing = Geometry::line([(1.0, 1.0), (11.0, 1.0)]);
        assert!(engine.contains(&square(), &inside).unwrap());
        assert!(!engine.contains(&square(), &crossing).unwrap());
        assert!(engine.contains(&Geometry::line([(0.0, 0.0), (1.0, 1.0)]), &inside).is_err());
    }

    #[test]
    fn test_interior_point_of_concave_polygon() {
        let engine = PlanarEngine::new();
        // U shape: the envelope centre (5, 5) lies in the notch
        let u = Geometry::Polygon(Polygon::new(vec![
            Coord::new(0.0, 0.0),
            Coord::new(10.0, 0.0),
            Coord::new(10.0, 10.0),
            Coord::new(7.0, 10.0),
            Coord::new(7.0, 3.0),
            Coord::new(3.0, 3.0),
            Coord::new(3.0, 10.0),
            Coord::new(0.0, 10.0),
            Coord::new(0.0, 0.0),
        ]));
        let p = engine.interior_point(&u).unwrap();
        assert!(engine.contains(&u, &Geometry::Point(p)).unwrap());
        assert_eq!(p, engine.interior_point(&u).unwrap());
    }

    #[test]
    fn test_length_and_area() {
        let engine = PlanarEngine::new();
        assert_eq!(engine.length(&Geometry::line([(0.0, 0.0), (3.0, 4.0)])).unwrap(), 5.0);
        assert_eq!(engine.length(&square()).unwrap(), 40.0);
        assert_eq!(engine.area(&square()).unwrap(), 100.0);
    }

    #[test]
    fn test_empty_geometry_is_error() {
        let engine = PlanarEngine::new();
        assert_eq!(
            engine.distance(&Geometry::LineString(vec![]), &square()),
            Err(GeometryError::Empty)
        );
    }
}
