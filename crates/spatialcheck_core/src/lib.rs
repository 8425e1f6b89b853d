//! # SpatialCheck Core
//!
//! Core data structures and types for SpatialCheck, a staged quality
//! validator for geospatial datasets.
//!
//! This crate provides the vocabulary shared by the validation engine and by
//! storage drivers: geometry values, features, the layer and data-source
//! seams, stage identities, rule and stage configurations, validation
//! results and progress events.
//!
//! ## Key Concepts
//!
//! - **Target**: one dataset to validate, opened into a [`DataSource`]
//! - **Stage**: one of six ordered validation phases ([`StageId`])
//! - **Rule**: a relation check (case type + layers + tolerance)
//! - **ValidationResult**: everything found in one target
//!
//! ## Example
//!
//! ```rust
//! use spatialcheck_core::{Rule, Severity, ValidationError, ValidationResult};
//!
//! let rule = Rule::new("R1", "PointInsidePolygon", ["TN_POI", "TN_BULD"]);
//! assert!(rule.validate().is_ok());
//!
//! let mut result = ValidationResult::new("district.gdb", "/data/district.gdb");
//! result.push(ValidationError::new("TBL_MISSING", "TN_BULD is missing", Severity::Error));
//! assert!(!result.is_valid);
//! ```

pub mod builder;
pub mod config;
pub mod error;
pub mod feature;
pub mod geometry;
pub mod history;
pub mod progress;
pub mod result;
pub mod source;
pub mod stage;

pub use builder::*;
pub use config::*;
pub use error::*;
pub use feature::*;
pub use geometry::*;
pub use history::*;
pub use progress::*;
pub use result::*;
pub use source::*;
pub use stage::*;
