//! Recording patch primitive for testing.

use crate::application::ports::{Installed, PatchPrimitive};
use crate::domain::error::PatchError;
use crate::domain::metadata::PatchHandle;
use crate::domain::options::PatchOptions;
use crate::domain::path::ResolvedPath;
use crate::infrastructure::patcher::SlotPatcher;
use crate::infrastructure::symbols::SymbolRegistry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A call made to the primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimitiveCall {
    Install(String),
    Start(PatchHandle),
    Stop(PatchHandle),
    Forget(PatchHandle),
    StopAll,
}

/// Primitive that delegates to a [`SlotPatcher`] and logs every call.
#[derive(Debug)]
pub struct RecordingPatcher {
    inner: SlotPatcher,
    calls: Mutex<Vec<PrimitiveCall>>,
    fail_next_install: AtomicBool,
    fail_next_stop: Mutex<Option<PatchError>>,
}

impl RecordingPatcher {
    /// Create a recording primitive over `symbols`.
    pub fn new(symbols: Arc<SymbolRegistry>) -> Self {
        Self {
            inner: SlotPatcher::new(symbols),
            calls: Mutex::new(Vec::new()),
            fail_next_install: AtomicBool::new(false),
            fail_next_stop: Mutex::new(None),
        }
    }

    fn guard(&self) -> MutexGuard<'_, Vec<PrimitiveCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: PrimitiveCall) {
        self.guard().push(call);
    }

    /// Calls made so far.
    pub fn calls(&self) -> Vec<PrimitiveCall> {
        self.guard().clone()
    }

    /// Clear the call log.
    pub fn clear(&self) {
        self.guard().clear();
    }

    /// Make the next `install` fail with `SymbolNotFound`.
    pub fn fail_next_install(&self) {
        self.fail_next_install.store(true, Ordering::SeqCst);
    }

    /// Make the next `stop` fail with `err`, leaving the substitution in
    /// place.
    pub fn fail_next_stop(&self, err: PatchError) {
        *self
            .fail_next_stop
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(err);
    }
}

impl PatchPrimitive for RecordingPatcher {
    fn install(
        &self,
        path: &ResolvedPath,
        options: &PatchOptions,
    ) -> Result<Installed, PatchError> {
        self.record(PrimitiveCall::Install(path.to_string()));
        if self.fail_next_install.swap(false, Ordering::SeqCst) {
            return Err(PatchError::SymbolNotFound {
                path: path.to_string(),
            });
        }
        self.inner.install(path, options)
    }

    fn start(&self, handle: PatchHandle) -> Result<(), PatchError> {
        self.record(PrimitiveCall::Start(handle));
        self.inner.start(handle)
    }

    fn stop(&self, handle: PatchHandle) -> Result<(), PatchError> {
        self.record(PrimitiveCall::Stop(handle));
        let injected = self
            .fail_next_stop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match injected {
            Some(err) => Err(err),
            None => self.inner.stop(handle),
        }
    }

    fn is_tracked(&self, handle: PatchHandle) -> bool {
        self.inner.is_tracked(handle)
    }

    fn forget(&self, handle: PatchHandle) -> bool {
        self.record(PrimitiveCall::Forget(handle));
        self.inner.forget(handle)
    }

    fn stop_all(&self) -> Result<(), PatchError> {
        self.record(PrimitiveCall::StopAll);
        self.inner.stop_all()
    }

    fn ledger(&self) -> Vec<PatchHandle> {
        self.inner.ledger()
    }
}
