//! # SpatialCheck Validator
//!
//! Validation engine for geospatial datasets. A target is opened into a
//! data source and checked in six ordered stages:
//!
//! - Pre-check (the target opens, dataset sizing, time prediction)
//! - Table check (expected tables and geometry kinds)
//! - Schema check (field presence, types, nullability)
//! - Geometry check (null, empty, degenerate and undersized geometries)
//! - Attribute check (not null, allowed values, ranges, patterns)
//! - Relation check (spatial relations between layers, by case type)
//!
//! Progress is delivered through a [`ProgressSink`] passed into each call,
//! with a live remaining-time estimate on every event.
//!
//! ## Example
//!
//! ```rust
//! use spatialcheck_core::{
//!     Feature, Geometry, GeometryKind, Polygon, RunStatus, Rule, StageConfigsBuilder, Target,
//! };
//! use spatialcheck_memory::{MemoryCatalog, MemoryDataSource, MemoryLayer, PlanarEngine};
//! use spatialcheck_validator::{NoopSink, ValidationPipeline};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let source = MemoryDataSource::new("district")
//!     .with_layer(
//!         MemoryLayer::new("TN_BULD", GeometryKind::Polygon)
//!             .with_feature(Feature::new(1, Some(Polygon::rectangle(0.0, 0.0, 10.0, 10.0).into()))),
//!     )
//!     .with_layer(
//!         MemoryLayer::new("TN_POI", GeometryKind::Point)
//!             .with_feature(Feature::new(1, Some(Geometry::point(5.0, 5.0))))
//!             .with_feature(Feature::new(2, Some(Geometry::point(20.0, 5.0)))),
//!     );
//! let catalog = MemoryCatalog::new().with_source("/data/district.gdb", source);
//! let pipeline = ValidationPipeline::new(Arc::new(catalog), Arc::new(PlanarEngine::new()));
//!
//! let configs = StageConfigsBuilder::new()
//!     .relation_rule(Rule::new("R1", "PointInsidePolygon", ["TN_POI", "TN_BULD"]))
//!     .build();
//! let result = pipeline
//!     .validate(
//!         &Target::new("/data/district.gdb"),
//!         &configs,
//!         &NoopSink,
//!         &CancellationToken::new(),
//!     )
//!     .await;
//!
//! assert_eq!(result.status, RunStatus::Completed);
//! assert_eq!(result.error_count(), 1);
//! # }
//! ```

mod batch;
mod error;
mod eta;
mod history;
mod location;
pub mod logging;
mod options;
mod pipeline;
mod pool;
mod progress;
pub mod relation;
mod scoped;
pub mod stages;

pub use batch::*;
pub use error::{RegistryError, RelationCheckError};
pub use eta::*;
pub use history::*;
pub use location::*;
pub use options::*;
pub use pipeline::*;
pub use pool::*;
pub use progress::*;
pub use relation::{
    LineWithinPolygon, PointInsidePolygon, PolygonContainsPoint, RelationCheckStrategy, RuleRun,
    StrategyFactory, StrategyRegistry, is_line_within_tolerance, lookup_geometry_by_object_id,
};
pub use scoped::*;

pub(crate) use error::StageError;
