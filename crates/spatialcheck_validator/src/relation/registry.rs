//! Case-type to strategy dispatch.

use super::{LineWithinPolygon, PointInsidePolygon, PolygonContainsPoint, RelationCheckStrategy};
use crate::RegistryError;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Builds a fresh strategy instance per rule invocation.
pub type StrategyFactory = Arc<dyn Fn() -> Box<dyn RelationCheckStrategy> + Send + Sync>;

/// Maps case types to strategy factories, one factory per case type.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    factories: HashMap<String, StrategyFactory>,
}

impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("case_types", &self.case_types())
            .finish()
    }
}

impl StrategyRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in strategies.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.insert(PointInsidePolygon::CASE_TYPE, || Box::new(PointInsidePolygon));
        registry.insert(LineWithinPolygon::CASE_TYPE, || Box::new(LineWithinPolygon));
        registry.insert(PolygonContainsPoint::CASE_TYPE, || Box::new(PolygonContainsPoint));
        registry
    }

    fn insert<F>(&mut self, case_type: &str, factory: F)
    where
        F: Fn() -> Box<dyn RelationCheckStrategy> + Send + Sync + 'static,
    {
        self.factories.insert(case_type.to_string(), Arc::new(factory));
    }

    /// Registers a strategy factory.
    ///
    /// Fails with `DuplicateCaseType` if the case type is already taken.
    pub fn register<F>(&mut self, case_type: impl Into<String>, factory: F) -> Result<(), RegistryError>
    where
        F: Fn() -> Box<dyn RelationCheckStrategy> + Send + Sync + 'static,
    {
        let case_type = case_type.into().trim().to_string();
        if self.factories.contains_key(&case_type) {
            return Err(RegistryError::DuplicateCaseType(case_type));
        }
        self.factories.insert(case_type, Arc::new(factory));
        Ok(())
    }

    /// Creates the strategy for a case type.
    pub fn resolve(&self, case_type: &str) -> Result<Box<dyn RelationCheckStrategy>, RegistryError> {
        self.factories
            .get(case_type.trim())
            .map(|factory| factory())
            .ok_or_else(|| RegistryError::UnsupportedCaseType(case_type.to_string()))
    }

    /// Returns true if a strategy is registered for the case type.
    pub fn contains(&self, case_type: &str) -> bool {
        self.factories.contains_key(case_type.trim())
    }

    /// Registered case types, sorted.
    pub fn case_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RelationCheckError;
    use crate::relation::RuleRun;
    use pretty_assertions::assert_eq;

    struct Custom;

    impl RelationCheckStrategy for Custom {
        fn case_type(&self) -> &str {
            "Custom"
        }

        fn execute(&self, _run: &mut RuleRun<'_>) -> Result<(), RelationCheckError> {
            Ok(())
        }
    }

    #[test]
    fn test_defaults_resolve() {
        let registry = StrategyRegistry::with_defaults();
        assert_eq!(
            registry.case_types(),
            vec!["LineWithinPolygon", "PointInsidePolygon", "PolygonContainsPoint"]
        );
        for case_type in registry.case_types() {
            assert_eq!(registry.resolve(case_type).unwrap().case_type(), case_type);
        }
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = StrategyRegistry::with_defaults();
        let err = registry
            .register("PointInsidePolygon", || Box::new(Custom))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateCaseType("PointInsidePolygon".to_string())
        );
        // the original registration survives
        assert_eq!(
            registry.resolve("PointInsidePolygon").unwrap().case_type(),
            "PointInsidePolygon"
        );
    }

    #[test]
    fn test_unknown_case_type() {
        let mut registry = StrategyRegistry::new();
        assert!(matches!(
            registry.resolve("Custom"),
            Err(RegistryError::UnsupportedCaseType(_))
        ));
        registry.register("Custom", || Box::new(Custom)).unwrap();
        assert!(registry.contains("Custom"));
        assert_eq!(registry.resolve("Custom").unwrap().case_type(), "Custom");
    }
}
