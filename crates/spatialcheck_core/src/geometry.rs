//! Geometry value types and the geometry-engine seam.
//!
//! The types here only carry coordinates. Topological primitives (distance,
//! containment, interior points, length, area) belong to a [`GeometryEngine`]
//! supplied by the host.

use crate::GeometryError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A planar coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    /// Easting / longitude
    pub x: f64,
    /// Northing / latitude
    pub y: f64,
}

impl Coord {
    /// Creates a new coordinate.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another coordinate.
    pub fn distance_to(&self, other: &Coord) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl From<(f64, f64)> for Coord {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Envelope {
    /// Builds the envelope of a set of coordinates, `None` when empty.
    pub fn from_coords<'a, I>(coords: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Coord>,
    {
        let mut iter = coords.into_iter();
        let first = iter.next()?;
        let mut env = Envelope {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        for c in iter {
            env.min_x = env.min_x.min(c.x);
            env.min_y = env.min_y.min(c.y);
            env.max_x = env.max_x.max(c.x);
            env.max_y = env.max_y.max(c.y);
        }
        Some(env)
    }

    /// Center of the box.
    pub fn center(&self) -> Coord {
        Coord::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// Grows the box by `distance` on every side.
    pub fn expand_by(&self, distance: f64) -> Self {
        Self {
            min_x: self.min_x - distance,
            min_y: self.min_y - distance,
            max_x: self.max_x + distance,
            max_y: self.max_y + distance,
        }
    }

    /// Returns true if the two boxes share at least one point.
    pub fn intersects(&self, other: &Envelope) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    /// Returns true if the coordinate lies inside or on the box.
    pub fn contains(&self, coord: &Coord) -> bool {
        coord.x >= self.min_x && coord.x <= self.max_x && coord.y >= self.min_y && coord.y <= self.max_y
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// A polygon with one exterior ring and optional holes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    /// Exterior ring (closed: first vertex repeated at the end)
    pub exterior: Vec<Coord>,
    /// Interior rings
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interiors: Vec<Vec<Coord>>,
}

impl Polygon {
    /// Creates a polygon without holes.
    pub fn new(exterior: Vec<Coord>) -> Self {
        Self {
            exterior,
            interiors: Vec::new(),
        }
    }

    /// Adds an interior ring.
    pub fn with_hole(mut self, ring: Vec<Coord>) -> Self {
        self.interiors.push(ring);
        self
    }

    /// Iterates the exterior ring followed by the holes.
    pub fn rings(&self) -> impl Iterator<Item = &Vec<Coord>> {
        std::iter::once(&self.exterior).chain(self.interiors.iter())
    }

    /// Axis-aligned rectangle, closed ring.
    pub fn rectangle(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self::new(vec![
            Coord::new(min_x, min_y),
            Coord::new(max_x, min_y),
            Coord::new(max_x, max_y),
            Coord::new(min_x, max_y),
            Coord::new(min_x, min_y),
        ])
    }
}

/// The geometry kind declared by a layer or carried by a geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryKind {
    Point,
    MultiPoint,
    LineString,
    MultiLineString,
    Polygon,
    MultiPolygon,
    GeometryCollection,
    /// Attribute-only table
    None,
}

impl GeometryKind {
    /// Returns true for `Polygon` and `MultiPolygon`.
    pub fn is_areal(&self) -> bool {
        matches!(self, GeometryKind::Polygon | GeometryKind::MultiPolygon)
    }

    /// Returns true for `LineString` and `MultiLineString`.
    pub fn is_linear(&self) -> bool {
        matches!(self, GeometryKind::LineString | GeometryKind::MultiLineString)
    }

    /// Returns true for `Point` and `MultiPoint`.
    pub fn is_puntal(&self) -> bool {
        matches!(self, GeometryKind::Point | GeometryKind::MultiPoint)
    }

    /// Single and multi variants of the same family are compatible.
    pub fn is_compatible_with(&self, other: &GeometryKind) -> bool {
        self == other
            || (self.is_areal() && other.is_areal())
            || (self.is_linear() && other.is_linear())
            || (self.is_puntal() && other.is_puntal())
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GeometryKind::Point => "Point",
            GeometryKind::MultiPoint => "MultiPoint",
            GeometryKind::LineString => "LineString",
            GeometryKind::MultiLineString => "MultiLineString",
            GeometryKind::Polygon => "Polygon",
            GeometryKind::MultiPolygon => "MultiPolygon",
            GeometryKind::GeometryCollection => "GeometryCollection",
            GeometryKind::None => "None",
        };
        f.write_str(name)
    }
}

/// A feature geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Coord),
    MultiPoint(Vec<Coord>),
    LineString(Vec<Coord>),
    MultiLineString(Vec<Vec<Coord>>),
    Polygon(Polygon),
    MultiPolygon(Vec<Polygon>),
    GeometryCollection(Vec<Geometry>),
}

impl Geometry {
    /// Shorthand for a point.
    pub fn point(x: f64, y: f64) -> Self {
        Geometry::Point(Coord::new(x, y))
    }

    /// Shorthand for a line string from `(x, y)` pairs.
    pub fn line<I: IntoIterator<Item = (f64, f64)>>(coords: I) -> Self {
        Geometry::LineString(coords.into_iter().map(Coord::from).collect())
    }

    /// The kind of this geometry.
    pub fn kind(&self) -> GeometryKind {
        match self {
            Geometry::Point(_) => GeometryKind::Point,
            Geometry::MultiPoint(_) => GeometryKind::MultiPoint,
            Geometry::LineString(_) => GeometryKind::LineString,
            Geometry::MultiLineString(_) => GeometryKind::MultiLineString,
            Geometry::Polygon(_) => GeometryKind::Polygon,
            Geometry::MultiPolygon(_) => GeometryKind::MultiPolygon,
            Geometry::GeometryCollection(_) => GeometryKind::GeometryCollection,
        }
    }

    /// Returns true if the geometry holds no coordinates.
    pub fn is_empty(&self) -> bool {
        match self {
            Geometry::Point(c) => !(c.x.is_finite() && c.y.is_finite()),
            Geometry::MultiPoint(cs) | Geometry::LineString(cs) => cs.is_empty(),
            Geometry::MultiLineString(parts) => parts.iter().all(Vec::is_empty),
            Geometry::Polygon(p) => p.exterior.is_empty(),
            Geometry::MultiPolygon(ps) => ps.iter().all(|p| p.exterior.is_empty()),
            Geometry::GeometryCollection(gs) => gs.iter().all(Geometry::is_empty),
        }
    }

    /// All vertices in storage order (rings included, closing vertex kept).
    pub fn vertices(&self) -> Vec<Coord> {
        let mut out = Vec::new();
        self.collect_vertices(&mut out);
        out
    }

    fn collect_vertices(&self, out: &mut Vec<Coord>) {
        match self {
            Geometry::Point(c) => {
                if c.x.is_finite() && c.y.is_finite() {
                    out.push(*c);
                }
            }
            Geometry::MultiPoint(cs) | Geometry::LineString(cs) => out.extend_from_slice(cs),
            Geometry::MultiLineString(parts) => {
                for part in parts {
                    out.extend_from_slice(part);
                }
            }
            Geometry::Polygon(p) => {
                for ring in p.rings() {
                    out.extend_from_slice(ring);
                }
            }
            Geometry::MultiPolygon(ps) => {
                for p in ps {
                    for ring in p.rings() {
                        out.extend_from_slice(ring);
                    }
                }
            }
            Geometry::GeometryCollection(gs) => {
                for g in gs {
                    g.collect_vertices(out);
                }
            }
        }
    }

    /// First stored vertex.
    pub fn first_vertex(&self) -> Option<Coord> {
        match self {
            Geometry::Point(c) => (c.x.is_finite() && c.y.is_finite()).then_some(*c),
            Geometry::MultiPoint(cs) | Geometry::LineString(cs) => cs.first().copied(),
            Geometry::MultiLineString(parts) => parts.iter().find_map(|p| p.first().copied()),
            Geometry::Polygon(p) => p.exterior.first().copied(),
            Geometry::MultiPolygon(ps) => ps.iter().find_map(|p| p.exterior.first().copied()),
            Geometry::GeometryCollection(gs) => gs.iter().find_map(Geometry::first_vertex),
        }
    }

    /// Bounding box, `None` for empty geometries.
    pub fn envelope(&self) -> Option<Envelope> {
        Envelope::from_coords(self.vertices().iter())
    }

    /// The point halfway along the total arc length of a linear geometry.
    ///
    /// Parts of a multi line are walked in order as if concatenated. Returns
    /// `None` for non-linear or empty geometries.
    pub fn line_midpoint(&self) -> Option<Coord> {
        let parts: Vec<&[Coord]> = match self {
            Geometry::LineString(cs) => vec![cs.as_slice()],
            Geometry::MultiLineString(parts) => parts.iter().map(Vec::as_slice).collect(),
            _ => return None,
        };
        let first = parts.iter().find_map(|p| p.first().copied())?;

        let total: f64 = parts
            .iter()
            .flat_map(|p| p.windows(2))
            .map(|w| w[0].distance_to(&w[1]))
            .sum();
        if total <= 0.0 {
            return Some(first);
        }

        let half = total / 2.0;
        let mut walked = 0.0;
        for w in parts.iter().flat_map(|p| p.windows(2)) {
            let seg = w[0].distance_to(&w[1]);
            if seg > 0.0 && walked + seg >= half {
                let t = (half - walked) / seg;
                return Some(Coord::new(
                    w[0].x + (w[1].x - w[0].x) * t,
                    w[0].y + (w[1].y - w[0].y) * t,
                ));
            }
            walked += seg;
        }
        parts.iter().rev().find_map(|p| p.last().copied())
    }

    /// Well-known text representation.
    pub fn to_wkt(&self) -> String {
        fn coords(cs: &[Coord]) -> String {
            cs.iter()
                .map(|c| format!("{} {}", c.x, c.y))
                .collect::<Vec<_>>()
                .join(", ")
        }
        fn polygon(p: &Polygon) -> String {
            p.rings()
                .map(|r| format!("({})", coords(r)))
                .collect::<Vec<_>>()
                .join(", ")
        }

        if self.is_empty() {
            return format!("{} EMPTY", self.kind().to_string().to_uppercase());
        }
        match self {
            Geometry::Point(c) => point_wkt(c.x, c.y),
            Geometry::MultiPoint(cs) => format!("MULTIPOINT ({})", coords(cs)),
            Geometry::LineString(cs) => format!("LINESTRING ({})", coords(cs)),
            Geometry::MultiLineString(parts) => format!(
                "MULTILINESTRING ({})",
                parts
                    .iter()
                    .map(|p| format!("({})", coords(p)))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Geometry::Polygon(p) => format!("POLYGON ({})", polygon(p)),
            Geometry::MultiPolygon(ps) => format!(
                "MULTIPOLYGON ({})",
                ps.iter()
                    .map(|p| format!("({})", polygon(p)))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Geometry::GeometryCollection(gs) => format!(
                "GEOMETRYCOLLECTION ({})",
                gs.iter().map(Geometry::to_wkt).collect::<Vec<_>>().join(", ")
            ),
        }
    }
}

impl From<Polygon> for Geometry {
    fn from(p: Polygon) -> Self {
        Geometry::Polygon(p)
    }
}

/// WKT for a single point.
pub fn point_wkt(x: f64, y: f64) -> String {
    format!("POINT ({x} {y})")
}

/// Topological primitives delegated to an external geometry runtime.
///
/// Implementations must be deterministic: the same inputs always produce
/// the same outputs.
pub trait GeometryEngine: Send + Sync {
    /// Minimum planar distance between two geometries (0 when they touch or overlap).
    fn distance(&self, a: &Geometry, b: &Geometry) -> Result<f64, GeometryError>;

    /// Returns true if `candidate` lies inside `container` (boundary included).
    fn contains(&self, container: &Geometry, candidate: &Geometry) -> Result<bool, GeometryError>;

    /// A point guaranteed to lie in the interior of an areal geometry.
    fn interior_point(&self, geometry: &Geometry) -> Result<Coord, GeometryError>;

    /// Length of a linear geometry, perimeter of an areal one.
    fn length(&self, geometry: &Geometry) -> Result<f64, GeometryError>;

    /// Area of an areal geometry.
    fn area(&self, geometry: &Geometry) -> Result<f64, GeometryError>;
}
