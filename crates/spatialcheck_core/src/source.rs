//! Storage seams: layers, data sources and the target opener.
//!
//! A [`DataSource`] is an opened dataset (e.g. one file geodatabase). It hands
//! out [`Layer`] handles; each handle owns its own attribute filter and read
//! cursor, so a filter set on one handle never leaks into another.

use crate::{DataAccessError, Feature, FieldDefn, GeometryKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A handle to one table of a data source.
pub trait Layer: Send {
    /// Layer (table) name.
    fn name(&self) -> &str;

    /// Declared geometry kind.
    fn geometry_kind(&self) -> GeometryKind;

    /// Field definitions, in declaration order.
    fn fields(&self) -> &[FieldDefn];

    /// Number of features visible through the active filter.
    fn feature_count(&self) -> Result<u64, DataAccessError>;

    /// Installs an attribute filter, or clears it with `None`.
    ///
    /// Installing a filter resets the read cursor. A rejected expression
    /// leaves the previous filter in place.
    fn set_attribute_filter(&mut self, filter: Option<&str>) -> Result<(), DataAccessError>;

    /// The active attribute filter.
    fn attribute_filter(&self) -> Option<&str>;

    /// Rewinds the read cursor.
    fn reset_reading(&mut self);

    /// Reads the next feature matching the active filter.
    fn next_feature(&mut self) -> Result<Option<Feature>, DataAccessError>;
}

/// An opened dataset.
pub trait DataSource: Send + Sync {
    /// Display name of the dataset.
    fn name(&self) -> &str;

    /// Names of all layers, in storage order.
    fn layer_names(&self) -> Vec<String>;

    /// Opens a fresh handle to the named layer (case-insensitive).
    fn layer(&self, name: &str) -> Option<Box<dyn Layer>>;

    /// Number of layers.
    fn layer_count(&self) -> usize {
        self.layer_names().len()
    }
}

/// One dataset to validate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    /// Identifier used in results and logs
    pub id: String,
    /// Location of the dataset
    pub path: PathBuf,
}

impl Target {
    /// Creates a target identified by the final component of its path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let id = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self { id, path }
    }

    /// Creates a target with an explicit identifier.
    pub fn with_id(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Opens targets into data sources.
#[async_trait]
pub trait TargetOpener: Send + Sync {
    /// Opens the dataset behind `target`.
    async fn open(&self, target: &Target) -> Result<Arc<dyn DataSource>, DataAccessError>;
}
