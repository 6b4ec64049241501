//! Per-test fixture.
//!
//! A [`Mocker`] is created at the start of a test and owns every patch the
//! test makes. Dropping it, or calling [`Mocker::teardown`], stops what is
//! still active, discards what is stopped and asks the primitive to revert
//! anything left in its ledger.

use crate::application::lifecycle::{CleanupReport, Patch, PatchLifecycleManager};
use crate::application::metrics::LifecycleMetrics;
use crate::application::ports::PatchPrimitive;
use crate::application::resolver::TargetResolver;
use crate::application::spec_builder::{PatchSpecBuilder, DEFAULT_BYPASS_NAMES};
use crate::domain::error::PatchError;
use crate::domain::path::is_identifier;
use crate::domain::target::TargetDescriptor;
use crate::infrastructure::patcher::SlotPatcher;
use crate::infrastructure::symbols::SymbolRegistry;
use std::sync::Arc;
use tracing::{debug, error};

/// Error returned when building a [`Mocker`] with invalid configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// A bypass name is not an identifier
    InvalidBypassName(String),
    /// A custom primitive was given without the registry it patches
    PrimitiveWithoutSymbols,
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::InvalidBypassName(name) => {
                write!(f, "bypass name `{}` is not an identifier", name)
            }
            BuildError::PrimitiveWithoutSymbols => {
                write!(f, "a custom primitive requires with_symbols to be set as well")
            }
        }
    }
}

impl std::error::Error for BuildError {}

/// Builder for configuring a [`Mocker`].
#[derive(Default)]
pub struct MockerBuilder {
    symbols: Option<Arc<SymbolRegistry>>,
    primitive: Option<Arc<dyn PatchPrimitive>>,
    bypass_names: Option<Vec<String>>,
    metrics: Option<LifecycleMetrics>,
}

impl MockerBuilder {
    /// Patch symbols of this registry.
    ///
    /// Defaults to a fresh, empty registry.
    pub fn with_symbols(mut self, symbols: Arc<SymbolRegistry>) -> Self {
        self.symbols = Some(symbols);
        self
    }

    /// Install substitutions with a custom primitive.
    ///
    /// The primitive must patch the registry given to
    /// [`MockerBuilder::with_symbols`]. Defaults to a [`SlotPatcher`].
    pub fn with_primitive(mut self, primitive: Arc<dyn PatchPrimitive>) -> Self {
        self.primitive = Some(primitive);
        self
    }

    /// Leaf names whose return value is never configured.
    ///
    /// Defaults to `__init__` and `new`.
    pub fn with_bypass_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bypass_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Record lifecycle counters into existing metrics.
    pub fn with_metrics(mut self, metrics: LifecycleMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the fixture.
    ///
    /// # Errors
    /// Returns `BuildError` if the configuration is invalid.
    pub fn build(self) -> Result<Mocker, BuildError> {
        let bypass_names = match self.bypass_names {
            Some(names) => {
                if let Some(bad) = names.iter().find(|name| !is_identifier(name)) {
                    return Err(BuildError::InvalidBypassName(bad.clone()));
                }
                names
            }
            None => DEFAULT_BYPASS_NAMES.iter().map(|s| s.to_string()).collect(),
        };

        let (symbols, primitive) = match (self.symbols, self.primitive) {
            (Some(symbols), Some(primitive)) => (symbols, primitive),
            (None, Some(_)) => return Err(BuildError::PrimitiveWithoutSymbols),
            (symbols, None) => {
                let symbols = symbols.unwrap_or_default();
                let primitive: Arc<dyn PatchPrimitive> =
                    Arc::new(SlotPatcher::new(Arc::clone(&symbols)));
                (symbols, primitive)
            }
        };

        Ok(Mocker::assemble(
            symbols,
            primitive,
            PatchSpecBuilder::with_bypass_names(bypass_names),
            self.metrics.unwrap_or_default(),
        ))
    }
}

/// The per-test patching fixture.
///
/// ```
/// use std::sync::Arc;
/// use mocker_builder::{Mocker, SymbolRegistry, Target, TargetDescriptor, Value};
///
/// let symbols = Arc::new(SymbolRegistry::new());
/// symbols
///     .register_routine("app.greet", |_| Ok(Value::from("hello")))
///     .unwrap();
///
/// let mocker = Mocker::new(Arc::clone(&symbols));
/// let greet = mocker
///     .patch(TargetDescriptor::new(Target::path("app.greet")).return_value("hi"))
///     .unwrap();
/// assert_eq!(symbols.call("app.greet", &[]), Ok(Value::from("hi")));
///
/// greet.stop().unwrap();
/// assert_eq!(symbols.call("app.greet", &[]), Ok(Value::from("hello")));
/// ```
#[derive(Debug)]
pub struct Mocker {
    symbols: Arc<SymbolRegistry>,
    manager: PatchLifecycleManager,
    torn_down: bool,
}

impl Mocker {
    /// Create a fixture patching `symbols` with default settings.
    pub fn new(symbols: Arc<SymbolRegistry>) -> Self {
        let primitive: Arc<dyn PatchPrimitive> = Arc::new(SlotPatcher::new(Arc::clone(&symbols)));
        Self::assemble(
            symbols,
            primitive,
            PatchSpecBuilder::new(),
            LifecycleMetrics::new(),
        )
    }

    /// Create a builder for custom configuration.
    pub fn builder() -> MockerBuilder {
        MockerBuilder::default()
    }

    fn assemble(
        symbols: Arc<SymbolRegistry>,
        primitive: Arc<dyn PatchPrimitive>,
        spec_builder: PatchSpecBuilder,
        metrics: LifecycleMetrics,
    ) -> Self {
        let resolver = TargetResolver::new(symbols.clone());
        let manager = PatchLifecycleManager::new(primitive, resolver, spec_builder, metrics);
        Self {
            symbols,
            manager,
            torn_down: false,
        }
    }

    /// Resolve, build and install a patch.
    ///
    /// # Errors
    /// See [`PatchLifecycleManager::patch`].
    pub fn patch(&self, descriptor: impl Into<TargetDescriptor>) -> Result<Patch, PatchError> {
        self.manager.patch(descriptor)
    }

    /// The most recent patch registered under `name`.
    pub fn get(&self, name: &str) -> Option<Patch> {
        self.manager.find(name)
    }

    /// The lifecycle manager.
    pub fn manager(&self) -> &PatchLifecycleManager {
        &self.manager
    }

    /// The registry being patched.
    pub fn symbols(&self) -> &Arc<SymbolRegistry> {
        &self.symbols
    }

    /// Lifecycle counters.
    pub fn metrics(&self) -> &LifecycleMetrics {
        self.manager.metrics()
    }

    /// Discard stopped patches now instead of at teardown.
    pub fn cleanup_all(&self) -> CleanupReport {
        self.manager.cleanup_all()
    }

    /// Tear down explicitly.
    ///
    /// # Errors
    /// Returns the first error met while stopping patches or emptying the
    /// primitive's ledger. Every step is still attempted.
    pub fn teardown(mut self) -> Result<CleanupReport, PatchError> {
        self.finish()
    }

    fn finish(&mut self) -> Result<CleanupReport, PatchError> {
        self.torn_down = true;
        let report = self.manager.teardown();
        let leftovers = self.manager.primitive().stop_all();
        debug!(?report, "mocker torn down");
        let report = report?;
        leftovers?;
        Ok(report)
    }
}

impl Default for Mocker {
    fn default() -> Self {
        Self::new(Arc::new(SymbolRegistry::new()))
    }
}

impl Drop for Mocker {
    fn drop(&mut self) {
        if self.torn_down {
            return;
        }
        if let Err(err) = self.finish() {
            error!(error = %err, "mocker teardown failed");
        }
    }
}
