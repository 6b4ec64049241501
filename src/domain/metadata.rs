//! Per-patch bookkeeping.
//!
//! [`PatchMetadata`] records everything needed to restart, reconfigure or
//! discard a patch without resolving its target again.

use crate::domain::error::PatchError;
use crate::domain::options::{PatchOptions, PatchWarning};
use crate::domain::path::ResolvedPath;
use crate::domain::value::Value;
use std::fmt;

/// Identity of a patch inside one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatchId(pub(crate) u64);

impl fmt::Display for PatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque reference to a substitution held by the patch primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatchHandle(u64);

impl PatchHandle {
    /// Wrap a primitive-specific handle number.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for PatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// Lifecycle state of a patch.
///
/// `Built -> Active <-> Inactive -> Discarded`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatchState {
    /// Options assembled, nothing installed yet
    Built,
    /// Substitution in effect
    Active,
    /// Substitution reverted, may be restarted
    Inactive,
    /// Removed from the primitive; terminal
    Discarded,
}

impl fmt::Display for PatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PatchState::Built => "built",
            PatchState::Active => "active",
            PatchState::Inactive => "inactive",
            PatchState::Discarded => "discarded",
        })
    }
}

/// Record of one patch.
#[derive(Debug, Clone)]
pub struct PatchMetadata {
    /// Optional name for lookup
    pub name: Option<String>,
    /// Where the substitution is installed
    pub path: ResolvedPath,
    /// Whether the target is awaited by callers
    pub is_async: bool,
    /// Options used for every (re-)install
    pub options: PatchOptions,
    /// Handle of the live substitution
    pub patch_handle: Option<PatchHandle>,
    /// The installed substitute
    pub substitute: Option<Value>,
    /// Current lifecycle state
    pub state: PatchState,
    /// Non-fatal findings from building the options
    pub warnings: Vec<PatchWarning>,
    /// Options changed while inactive; the next start installs afresh
    pub needs_reinstall: bool,
}

impl PatchMetadata {
    /// A freshly built record with nothing installed.
    pub fn new(path: ResolvedPath, is_async: bool, options: PatchOptions) -> Self {
        Self {
            name: None,
            path,
            is_async,
            options,
            patch_handle: None,
            substitute: None,
            state: PatchState::Built,
            warnings: Vec::new(),
            needs_reinstall: false,
        }
    }

    fn invalid(&self, action: &'static str) -> PatchError {
        PatchError::InvalidState {
            path: self.path.to_string(),
            state: self.state,
            action,
        }
    }

    /// Record a fresh installation.
    ///
    /// # Errors
    /// Returns `PatchError::InvalidState` on a discarded patch.
    pub fn mark_installed(
        &mut self,
        handle: PatchHandle,
        substitute: Value,
    ) -> Result<(), PatchError> {
        if self.state == PatchState::Discarded {
            return Err(self.invalid("install"));
        }
        self.patch_handle = Some(handle);
        self.substitute = Some(substitute);
        self.state = PatchState::Active;
        self.needs_reinstall = false;
        Ok(())
    }

    /// Record a restart of the existing substitution.
    ///
    /// # Errors
    /// Returns `PatchError::InvalidState` unless the patch is inactive.
    pub fn mark_started(&mut self) -> Result<(), PatchError> {
        match self.state {
            PatchState::Inactive => {
                self.state = PatchState::Active;
                Ok(())
            }
            _ => Err(self.invalid("start")),
        }
    }

    /// Record that the substitution was reverted.
    ///
    /// # Errors
    /// Returns `PatchError::InvalidState` unless the patch is active.
    pub fn mark_stopped(&mut self) -> Result<(), PatchError> {
        match self.state {
            PatchState::Active => {
                self.state = PatchState::Inactive;
                Ok(())
            }
            _ => Err(self.invalid("stop")),
        }
    }

    /// Record that the patch was removed for good.
    ///
    /// # Errors
    /// Returns `PatchError::InvalidState` for active or already discarded
    /// patches.
    pub fn mark_discarded(&mut self) -> Result<(), PatchError> {
        match self.state {
            PatchState::Built | PatchState::Inactive => {
                self.state = PatchState::Discarded;
                self.patch_handle = None;
                Ok(())
            }
            _ => Err(self.invalid("discard")),
        }
    }

    /// Reject any action on a discarded patch.
    ///
    /// # Errors
    /// Returns `PatchError::InvalidState` when discarded.
    pub fn ensure_alive(&self, action: &'static str) -> Result<(), PatchError> {
        if self.state == PatchState::Discarded {
            Err(self.invalid(action))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> PatchMetadata {
        PatchMetadata::new(
            ResolvedPath::parse("pkg.mod.f").unwrap(),
            false,
            PatchOptions::default(),
        )
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut meta = metadata();
        assert_eq!(meta.state, PatchState::Built);

        meta.mark_installed(PatchHandle::new(1), Value::None).unwrap();
        assert_eq!(meta.state, PatchState::Active);

        meta.mark_stopped().unwrap();
        assert_eq!(meta.state, PatchState::Inactive);

        meta.mark_started().unwrap();
        meta.mark_stopped().unwrap();
        meta.mark_discarded().unwrap();
        assert_eq!(meta.state, PatchState::Discarded);
        assert_eq!(meta.patch_handle, None);
    }

    #[test]
    fn test_cannot_discard_active_patch() {
        let mut meta = metadata();
        meta.mark_installed(PatchHandle::new(1), Value::None).unwrap();
        let err = meta.mark_discarded().unwrap_err();
        assert!(matches!(
            err,
            PatchError::InvalidState {
                state: PatchState::Active,
                action: "discard",
                ..
            }
        ));
    }

    #[test]
    fn test_discarded_is_terminal() {
        let mut meta = metadata();
        meta.mark_discarded().unwrap();
        assert!(meta.mark_installed(PatchHandle::new(2), Value::None).is_err());
        assert!(meta.mark_started().is_err());
        assert!(meta.ensure_alive("configure").is_err());
    }

    #[test]
    fn test_reinstall_refreshes_handle() {
        let mut meta = metadata();
        meta.mark_installed(PatchHandle::new(1), Value::Int(1)).unwrap();
        meta.needs_reinstall = true;
        meta.mark_installed(PatchHandle::new(2), Value::Int(2)).unwrap();
        assert_eq!(meta.patch_handle, Some(PatchHandle::new(2)));
        assert_eq!(meta.substitute, Some(Value::Int(2)));
        assert!(!meta.needs_reinstall);
    }
}
