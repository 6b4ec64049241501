//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters implement these ports.

use crate::domain::error::PatchError;
use crate::domain::metadata::PatchHandle;
use crate::domain::options::PatchOptions;
use crate::domain::path::ResolvedPath;
use crate::domain::value::Value;
use std::fmt::Debug;

/// What a symbol path refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    /// A module
    Module,
    /// A type
    Class,
    /// A free function or method
    Routine {
        /// Whether callers await the result
        is_async: bool,
    },
    /// A plain value
    Attribute,
}

/// Port for looking up symbols by dotted path.
///
/// This abstraction stands in for runtime reflection: resolution only needs
/// to know whether a path exists, what kind of symbol it names and which
/// members it has. Infrastructure provides `SymbolRegistry`.
pub trait SymbolTable: Send + Sync + Debug {
    /// Look up a dotted path.
    ///
    /// # Returns
    /// The kind of symbol, or None if nothing is registered there
    fn lookup(&self, path: &str) -> Option<SymbolKind>;

    /// Names registered directly below `path`, sorted.
    fn members(&self, path: &str) -> Vec<String>;
}

/// A substitution that was installed and is in effect.
#[derive(Debug, Clone, PartialEq)]
pub struct Installed {
    /// Handle to stop, restart or forget the substitution
    pub handle: PatchHandle,
    /// The value now visible at the path
    pub substitute: Value,
}

/// Port for the reversible substitution primitive.
///
/// The primitive keeps a ledger of the handles it created. A handle stays in
/// the ledger, started or not, until it is forgotten. Infrastructure provides
/// `SlotPatcher`.
pub trait PatchPrimitive: Send + Sync + Debug {
    /// Build a substitute from `options` and put it in effect at `path`.
    ///
    /// # Errors
    /// Returns an error if the symbol is missing and `create` is not set, or if
    /// the options cannot produce a substitute.
    fn install(&self, path: &ResolvedPath, options: &PatchOptions) -> Result<Installed, PatchError>;

    /// Put a stopped substitution back in effect.
    ///
    /// # Errors
    /// Returns `PatchError::StalePatchHandle` if the handle is not tracked.
    fn start(&self, handle: PatchHandle) -> Result<(), PatchError>;

    /// Revert a substitution, keeping it in the ledger.
    ///
    /// # Errors
    /// Returns `PatchError::StalePatchHandle` if the handle is not tracked and
    /// `PatchError::NotStarted` if it is tracked but not in effect.
    fn stop(&self, handle: PatchHandle) -> Result<(), PatchError>;

    /// Whether the ledger holds this handle.
    fn is_tracked(&self, handle: PatchHandle) -> bool;

    /// Remove a handle from the ledger, reverting it first if needed.
    ///
    /// # Returns
    /// True if the handle was tracked
    fn forget(&self, handle: PatchHandle) -> bool;

    /// Stop every handle in the ledger, newest first, then clear the ledger.
    ///
    /// # Errors
    /// Returns the first error met; every handle is still attempted.
    fn stop_all(&self) -> Result<(), PatchError>;

    /// Handles currently in the ledger, oldest first.
    fn ledger(&self) -> Vec<PatchHandle>;
}
