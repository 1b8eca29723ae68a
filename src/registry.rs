//! Name-to-factory mapping for calculators.
//!
//! A [`GraphConfig`](crate::config::GraphConfig) names calculators by string;
//! the registry resolves those names into fresh [`Calculator`] instances at
//! build time. Registries are explicit values passed to graph
//! initialization, so two graphs can resolve the same name differently and
//! tests can register mocks without global state.

use crate::calculator::Calculator;
use crate::calculators::{CounterCalculator, PassThroughCalculator, RateCalculator};
use crate::error::GraphError;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type CalculatorFactory = Arc<dyn Fn() -> Box<dyn Calculator> + Send + Sync>;

/// Maps calculator names to factories producing fresh instances.
#[derive(Clone, Default)]
pub struct CalculatorRegistry {
    factories: HashMap<String, CalculatorFactory>,
}

impl CalculatorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in calculators registered:
    /// `PassThroughCalculator`, `RateCalculator`, and `CounterCalculator`.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        // Infallible: the names are distinct literals.
        let _ = registry.register("PassThroughCalculator", || {
            Box::new(PassThroughCalculator::new())
        });
        let _ = registry.register("RateCalculator", || Box::new(RateCalculator::new()));
        let _ = registry.register("CounterCalculator", || Box::new(CounterCalculator::new()));
        registry
    }

    /// Registers a factory under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Wiring`] if the name is already registered.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> Result<(), GraphError>
    where
        F: Fn() -> Box<dyn Calculator> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(GraphError::wiring(format!(
                "calculator '{}' is already registered",
                name
            )));
        }
        self.factories.insert(name, Arc::new(factory));
        Ok(())
    }

    /// Instantiates a fresh calculator for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Wiring`] if no factory is registered under
    /// `name`.
    pub fn create(&self, name: &str) -> Result<Box<dyn Calculator>, GraphError> {
        match self.factories.get(name) {
            Some(factory) => Ok(factory()),
            None => Err(GraphError::wiring(format!(
                "no calculator registered under '{}'",
                name
            ))),
        }
    }

    /// Returns true if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Iterates over the registered names, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl fmt::Debug for CalculatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("CalculatorRegistry")
            .field("calculators", &names)
            .finish()
    }
}
