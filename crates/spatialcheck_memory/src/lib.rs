//! # SpatialCheck Memory
//!
//! An in-memory storage driver and a planar geometry engine for SpatialCheck.
//!
//! [`MemoryCatalog`] maps target paths to [`MemoryDataSource`]s and implements
//! the async [`TargetOpener`](spatialcheck_core::TargetOpener) seam. Layer
//! handles evaluate SQL-like attribute filters ([`FilterExpr`]).
//! [`PlanarEngine`] implements [`GeometryEngine`](spatialcheck_core::GeometryEngine)
//! with Cartesian arithmetic.
//!
//! ## Example
//!
//! ```rust
//! use spatialcheck_core::{DataSource, Feature, Geometry, GeometryKind, Layer};
//! use spatialcheck_memory::{MemoryDataSource, MemoryLayer};
//!
//! let source = MemoryDataSource::new("district.gdb").with_layer(
//!     MemoryLayer::new("TN_POI", GeometryKind::Point)
//!         .with_feature(Feature::new(1, Some(Geometry::point(3.0, 4.0)))),
//! );
//! let mut layer = source.layer("TN_POI").unwrap();
//! assert_eq!(layer.feature_count().unwrap(), 1);
//! assert!(layer.next_feature().unwrap().is_some());
//! ```

mod filter;
mod planar;
mod source;

pub use filter::*;
pub use planar::PlanarEngine;
pub use source::*;
