//! Scoped attribute filters.

use spatialcheck_core::Layer;
use std::ops::{Deref, DerefMut};
use tracing::warn;

/// A layer with an attribute filter that is cleared when the guard drops.
///
/// Inactive guards (blank or rejected filter) leave the layer untouched on
/// drop.
pub struct ScopedAttributeFilter<'l> {
    layer: &'l mut dyn Layer,
    active: bool,
}

impl<'l> ScopedAttributeFilter<'l> {
    /// Returns true if a filter was installed by this guard.
    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl<'l> Deref for ScopedAttributeFilter<'l> {
    type Target = dyn Layer + 'l;

    fn deref(&self) -> &Self::Target {
        &*self.layer
    }
}

impl<'l> DerefMut for ScopedAttributeFilter<'l> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.layer
    }
}

impl Drop for ScopedAttributeFilter<'_> {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        if let Err(e) = self.layer.set_attribute_filter(None) {
            warn!(layer = %self.layer.name(), error = %e, "failed to clear attribute filter");
        }
    }
}

/// Installs `filter` on `layer` for the lifetime of the returned guard.
///
/// A missing or blank filter yields a no-op guard. A filter the layer
/// rejects is logged, the layer is reset to unrestricted and a no-op guard
/// is returned, so the caller proceeds over all features.
pub fn apply_scoped_attribute_filter<'l>(
    layer: &'l mut dyn Layer,
    filter: Option<&str>,
) -> ScopedAttributeFilter<'l> {
    let Some(filter) = filter.map(str::trim).filter(|f| !f.is_empty()) else {
        return ScopedAttributeFilter {
            layer,
            active: false,
        };
    };

    match layer.set_attribute_filter(Some(filter)) {
        Ok(()) => ScopedAttributeFilter {
            layer,
            active: true,
        },
        Err(e) => {
            warn!(layer = %layer.name(), filter, error = %e, "attribute filter rejected, reading unfiltered");
            if let Err(e) = layer.set_attribute_filter(None) {
                warn!(layer = %layer.name(), error = %e, "failed to reset attribute filter");
            }
            ScopedAttributeFilter {
                layer,
                active: false,
            }
        }
    }
}
