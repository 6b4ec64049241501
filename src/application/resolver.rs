//! Target resolution.
//!
//! Turns a [`TargetDescriptor`] into a canonical [`ResolvedPath`] and decides
//! whether the replaced unit is awaited by its callers.

use crate::application::ports::{SymbolKind, SymbolTable};
use crate::domain::error::PatchError;
use crate::domain::path::ResolvedPath;
use crate::domain::target::{SymbolRef, Target, TargetDescriptor};
use std::sync::Arc;
use tracing::trace;

/// Outcome of resolving a descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Canonical address of the symbol
    pub path: ResolvedPath,
    /// Whether the symbol is an async routine
    pub is_async: bool,
    /// Whether the symbol table knows the path
    pub exists: bool,
}

/// Resolves descriptors against a symbol table.
#[derive(Debug, Clone)]
pub struct TargetResolver {
    symbols: Arc<dyn SymbolTable>,
}

impl TargetResolver {
    /// Create a resolver backed by `symbols`.
    pub fn new(symbols: Arc<dyn SymbolTable>) -> Self {
        Self { symbols }
    }

    /// Resolve a descriptor to a path and classify it.
    ///
    /// # Errors
    /// - `ConflictingOptions` when both `method` and `attribute` are given
    /// - `InvalidTarget` when the path is malformed
    /// - `SymbolNotFound` when the symbol is missing and `create` is unset
    pub fn resolve(&self, descriptor: &TargetDescriptor) -> Result<Resolution, PatchError> {
        let path = Self::resolve_path(descriptor)?;
        let kind = self.symbols.lookup(path.as_str());
        let is_async = matches!(kind, Some(SymbolKind::Routine { is_async: true }));

        trace!(
            descriptor = %descriptor.target.describe(),
            path = %path,
            is_async,
            exists = kind.is_some(),
            "resolved patch target"
        );

        if kind.is_none() && !descriptor.options.create {
            return Err(PatchError::SymbolNotFound {
                path: path.to_string(),
            });
        }

        Ok(Resolution {
            path,
            is_async,
            exists: kind.is_some(),
        })
    }

    /// Compute the canonical path without consulting the symbol table.
    ///
    /// # Errors
    /// Returns `ConflictingOptions` or `InvalidTarget`.
    pub fn resolve_path(descriptor: &TargetDescriptor) -> Result<ResolvedPath, PatchError> {
        if let (Some(method), Some(attribute)) = (&descriptor.method, &descriptor.attribute) {
            return Err(PatchError::ConflictingOptions {
                target: descriptor.target.describe(),
                method: method.clone(),
                attribute: attribute.clone(),
            });
        }
        let member = descriptor.member();

        match &descriptor.target {
            Target::Class(symbol) | Target::Instance(symbol) => Self::class_path(symbol, member),
            Target::Routine(symbol) => Self::routine_path(symbol, member),
            Target::Module(module) => ResolvedPath::new(module, None, member),
            Target::Path(path) => {
                let base = ResolvedPath::parse(path)?;
                match member {
                    None => Ok(base),
                    Some(member) => base.join(member),
                }
            }
        }
    }

    fn class_path(symbol: &SymbolRef, member: Option<&str>) -> Result<ResolvedPath, PatchError> {
        match member {
            Some(member) => {
                ResolvedPath::new(symbol.module(), Some(symbol.qualname()), Some(member))
            }
            None => match symbol.qualname().rsplit_once('.') {
                Some((owner, leaf)) => ResolvedPath::new(symbol.module(), Some(owner), Some(leaf)),
                None => ResolvedPath::new(symbol.module(), None, Some(symbol.qualname())),
            },
        }
    }

    fn routine_path(symbol: &SymbolRef, member: Option<&str>) -> Result<ResolvedPath, PatchError> {
        let split = symbol.qualname().rsplit_once('.');
        match (split, member) {
            (Some((owner, leaf)), None) => {
                ResolvedPath::new(symbol.module(), Some(owner), Some(leaf))
            }
            (None, None) => ResolvedPath::new(symbol.module(), None, Some(symbol.qualname())),
            (Some((owner, _)), Some(member)) => {
                ResolvedPath::new(symbol.module(), Some(owner), Some(member))
            }
            (None, Some(member)) => Err(PatchError::invalid_target(
                symbol.dotted(),
                format!(
                    "`{}` is a free function and has no member `{}`",
                    symbol.qualname(),
                    member
                ),
            )),
        }
    }
}
