//! Errors raised while resolving, building and driving patches.

use crate::domain::metadata::{PatchHandle, PatchId, PatchState};
use std::fmt;

/// Error returned by target resolution and patch lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    /// The descriptor cannot be turned into a valid symbol path
    InvalidTarget {
        /// Description of the offending target
        target: String,
        /// Why it was rejected
        reason: String,
    },
    /// Both `method` and `attribute` were supplied
    ConflictingOptions {
        /// Description of the offending target
        target: String,
        /// The method name supplied
        method: String,
        /// The attribute name supplied
        attribute: String,
    },
    /// The symbol does not exist and `create` was not requested
    SymbolNotFound {
        /// The resolved path that was looked up
        path: String,
    },
    /// A nested configuration entry or keyword argument is malformed
    InvalidConfiguration {
        /// The configuration key
        key: String,
        /// Why it was rejected
        reason: String,
    },
    /// The patch primitive no longer tracks this handle
    StalePatchHandle {
        /// The handle that was used
        handle: PatchHandle,
    },
    /// Stop was called on a handle that is tracked but not started
    NotStarted {
        /// The handle that was used
        handle: PatchHandle,
    },
    /// The requested transition is not allowed from the current state
    InvalidState {
        /// Path of the patch
        path: String,
        /// Its current state
        state: PatchState,
        /// The rejected action
        action: &'static str,
    },
    /// No patch with this id exists in the registry
    UnknownPatch {
        /// The id that was used
        id: PatchId,
    },
}

impl PatchError {
    pub(crate) fn invalid_target(target: impl Into<String>, reason: impl Into<String>) -> Self {
        PatchError::InvalidTarget {
            target: target.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_configuration(key: impl Into<String>, reason: impl Into<String>) -> Self {
        PatchError::InvalidConfiguration {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Whether the primitive lost track of the handle.
    ///
    /// These errors are recovered by the lifecycle manager instead of being
    /// reported to the test.
    pub fn is_stale_handle(&self) -> bool {
        matches!(
            self,
            PatchError::StalePatchHandle { .. } | PatchError::NotStarted { .. }
        )
    }
}

impl fmt::Display for PatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchError::InvalidTarget { target, reason } => {
                write!(f, "invalid patch target `{}`: {}", target, reason)
            }
            PatchError::ConflictingOptions {
                target,
                method,
                attribute,
            } => write!(
                f,
                "target `{}` was given both method `{}` and attribute `{}`; pass only one",
                target, method, attribute
            ),
            PatchError::SymbolNotFound { path } => {
                write!(f, "symbol `{}` does not exist and create was not requested", path)
            }
            PatchError::InvalidConfiguration { key, reason } => {
                write!(f, "invalid configuration `{}`: {}", key, reason)
            }
            PatchError::StalePatchHandle { handle } => {
                write!(f, "patch handle {} is not tracked by the patch primitive", handle)
            }
            PatchError::NotStarted { handle } => {
                write!(f, "stop called on unstarted patch handle {}", handle)
            }
            PatchError::InvalidState {
                path,
                state,
                action,
            } => write!(f, "cannot {} patch `{}` while it is {}", action, path, state),
            PatchError::UnknownPatch { id } => write!(f, "no patch registered with id {}", id),
        }
    }
}

impl std::error::Error for PatchError {}
