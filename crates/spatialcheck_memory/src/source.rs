//! In-memory data sources, layers and a target catalog.

use crate::FilterExpr;
use async_trait::async_trait;
use spatialcheck_core::{
    DataAccessError, DataSource, Feature, FieldDefn, GeometryKind, Layer, Target, TargetOpener,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// The stored contents of one layer.
#[derive(Debug, Clone)]
pub struct MemoryLayer {
    name: String,
    geometry_kind: GeometryKind,
    fields: Vec<FieldDefn>,
    features: Vec<Feature>,
    fail_after: Option<usize>,
}

impl MemoryLayer {
    /// Creates an empty layer.
    pub fn new(name: impl Into<String>, geometry_kind: GeometryKind) -> Self {
        Self {
            name: name.into(),
            geometry_kind,
            fields: Vec::new(),
            features: Vec::new(),
            fail_after: None,
        }
    }

    /// Declares a field.
    pub fn with_field(mut self, field: FieldDefn) -> Self {
        self.fields.push(field);
        self
    }

    /// Appends a feature.
    pub fn with_feature(mut self, feature: Feature) -> Self {
        self.features.push(feature);
        self
    }

    /// Appends several features.
    pub fn with_features(mut self, features: impl IntoIterator<Item = Feature>) -> Self {
        self.features.extend(features);
        self
    }

    /// Makes reads fail once `n` features have been returned from a cursor.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }
}

/// A data source holding layers in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryDataSource {
    name: String,
    layers: Vec<Arc<MemoryLayer>>,
}

impl MemoryDataSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            layers: Vec::new(),
        }
    }

    /// Adds a layer.
    pub fn with_layer(mut self, layer: MemoryLayer) -> Self {
        self.layers.push(Arc::new(layer));
        self
    }

    /// Opens a concrete handle to a layer.
    pub fn open_layer(&self, name: &str) -> Option<MemoryLayerHandle> {
        self.layers
            .iter()
            .find(|l| l.name.eq_ignore_ascii_case(name))
            .map(|l| MemoryLayerHandle::new(Arc::clone(l)))
    }
}

impl DataSource for MemoryDataSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn layer_names(&self) -> Vec<String> {
        self.layers.iter().map(|l| l.name.clone()).collect()
    }

    fn layer(&self, name: &str) -> Option<Box<dyn Layer>> {
        self.open_layer(name).map(|h| Box::new(h) as Box<dyn Layer>)
    }

    fn layer_count(&self) -> usize {
        self.layers.len()
    }
}

/// A read handle with its own filter and cursor.
#[derive(Debug)]
pub struct MemoryLayerHandle {
    layer: Arc<MemoryLayer>,
    filter: Option<FilterExpr>,
    cursor: usize,
    returned: usize,
}

impl MemoryLayerHandle {
    fn new(layer: Arc<MemoryLayer>) -> Self {
        Self {
            layer,
            filter: None,
            cursor: 0,
            returned: 0,
        }
    }

    fn visible(&self, feature: &Feature) -> bool {
        self.filter.as_ref().is_none_or(|f| f.matches(feature))
    }
}

impl Layer for MemoryLayerHandle {
    fn name(&self) -> &str {
        &self.layer.name
    }

    fn geometry_kind(&self) -> GeometryKind {
        self.layer.geometry_kind
    }

    fn fields(&self) -> &[FieldDefn] {
        &self.layer.fields
    }

    fn feature_count(&self) -> Result<u64, DataAccessError> {
        Ok(self.layer.features.iter().filter(|f| self.visible(f)).count() as u64)
    }

    fn set_attribute_filter(&mut self, filter: Option<&str>) -> Result<(), DataAccessError> {
        let parsed = match filter.map(str::trim).filter(|f| !f.is_empty()) {
            Some(text) => Some(
                FilterExpr::parse(text)
                    .map_err(|e| DataAccessError::invalid_filter(text, e.to_string()))?,
            ),
            None => None,
        };
        debug!(layer = %self.layer.name, filter = ?filter, "attribute filter set");
        self.filter = parsed;
        self.reset_reading();
        Ok(())
    }

    fn attribute_filter(&self) -> Option<&str> {
        self.filter.as_ref().map(FilterExpr::as_str)
    }

    fn reset_reading(&mut self) {
        self.cursor = 0;
        self.returned = 0;
    }

    fn next_feature(&mut self) -> Result<Option<Feature>, DataAccessError> {
        while let Some(feature) = self.layer.features.get(self.cursor) {
            self.cursor += 1;
            if !self.visible(feature) {
                continue;
            }
            if self.layer.fail_after.is_some_and(|n| self.returned >= n) {
                return Err(DataAccessError::read_failed(
                    &self.layer.name,
                    format!("simulated read failure at feature {}", feature.fid),
                ));
            }
            self.returned += 1;
            return Ok(Some(feature.clone()));
        }
        Ok(None)
    }
}

/// Resolves target paths to in-memory data sources.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    sources: HashMap<PathBuf, Arc<MemoryDataSource>>,
    broken: HashMap<PathBuf, String>,
    opens: AtomicUsize,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a data source at a path.
    pub fn with_source(mut self, path: impl Into<PathBuf>, source: MemoryDataSource) -> Self {
        self.sources.insert(path.into(), Arc::new(source));
        self
    }

    /// Registers a path that exists but cannot be opened.
    pub fn with_broken(mut self, path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        self.broken.insert(path.into(), message.into());
        self
    }

    /// Number of successful opens so far.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TargetOpener for MemoryCatalog {
    async fn open(&self, target: &Target) -> Result<Arc<dyn DataSource>, DataAccessError> {
        if let Some(message) = self.broken.get(&target.path) {
            return Err(DataAccessError::open_failed(target.id.clone(), message.clone()));
        }
        let source = self
            .sources
            .get(&target.path)
            .ok_or_else(|| DataAccessError::TargetNotFound(target.to_string()))?;
        self.opens.fetch_add(1, Ordering::SeqCst);
        debug!(target = %target.id, layers = source.layer_count(), "opened in-memory source");
        Ok(Arc::clone(source) as Arc<dyn DataSource>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spatialcheck_core::{FieldKind, Geometry};

    fn layer() -> MemoryLayer {
        MemoryLayer::new("TN_POI", GeometryKind::Point)
            .with_field(FieldDefn::new("KIND", FieldKind::String))
            .with_features((1..=5).map(|i| {
                Feature::new(i, Some(Geometry::point(i as f64, 0.0)))
                    .with_attribute("KIND", if i % 2 == 0 { "EVEN" } else { "ODD" })
            }))
    }

    #[test]
    fn test_handles_have_independent_filters() {
        let source = MemoryDataSource::new("ds").with_layer(layer());
        let mut a = source.layer("tn_poi").unwrap();
        let b = source.layer("TN_POI").unwrap();

        a.set_attribute_filter(Some("KIND = 'EVEN'")).unwrap();
        assert_eq!(a.feature_count().unwrap(), 2);
        assert_eq!(b.feature_count().unwrap(), 5);
        assert_eq!(b.attribute_filter(), None);
    }

    #[test]
    fn test_invalid_filter_keeps_previous() {
        let source = MemoryDataSource::new("ds").with_layer(layer());
        let mut h = source.layer("TN_POI").unwrap();
        h.set_attribute_filter(Some("KIND = 'ODD'")).unwrap();
        let err = h.set_attribute_filter(Some("KIND ==")).unwrap_err();
        assert!(matches!(err, DataAccessError::InvalidFilter { .. }));
        assert_eq!(h.attribute_filter(), Some("KIND = 'ODD'"));
    }

    #[test]
    fn test_read_with_filter_and_reset() {
        let source = MemoryDataSource::new("ds").with_layer(layer());
        let mut h = source.layer("TN_POI").unwrap();
        h.set_attribute_filter(Some("OBJECTID = 3")).unwrap();
        assert_eq!(h.next_feature().unwrap().map(|f| f.fid), Some(3));
        assert_eq!(h.next_feature().unwrap(), None);
        h.reset_reading();
        assert_eq!(h.next_feature().unwrap().map(|f| f.fid), Some(3));
    }

    #[test]
    fn test_failing_layer() {
        let source = MemoryDataSource::new("ds").with_layer(layer().failing_after(2));
        let mut h = source.layer("TN_POI").unwrap();
        assert!(h.next_feature().unwrap().is_some());
        assert!(h.next_feature().unwrap().is_some());
        assert!(matches!(
            h.next_feature(),
            Err(DataAccessError::ReadFailed { .. })
        ));
    }
}
