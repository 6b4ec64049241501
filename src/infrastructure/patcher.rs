//! Reference patch primitive.
//!
//! [`SlotPatcher`] installs substitutes into a [`SymbolRegistry`] and keeps a
//! ledger of every handle it created. Handles stay in the ledger while
//! stopped; only `forget` and `stop_all` remove them.

use crate::application::ports::{Installed, PatchPrimitive, SymbolTable};
use crate::domain::error::PatchError;
use crate::domain::metadata::PatchHandle;
use crate::domain::options::PatchOptions;
use crate::domain::path::ResolvedPath;
use crate::domain::stand_in::{MockHandle, StandIn};
use crate::domain::value::Value;
use crate::infrastructure::symbols::SymbolRegistry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

#[derive(Debug, Clone)]
struct LedgerEntry {
    handle: PatchHandle,
    path: String,
    substitute: Value,
    create: bool,
    active: bool,
}

/// Patch primitive backed by a [`SymbolRegistry`].
#[derive(Debug)]
pub struct SlotPatcher {
    symbols: Arc<SymbolRegistry>,
    ledger: Mutex<Vec<LedgerEntry>>,
    next_handle: AtomicU64,
}

impl SlotPatcher {
    /// Create a patcher over `symbols`.
    pub fn new(symbols: Arc<SymbolRegistry>) -> Self {
        Self {
            symbols,
            ledger: Mutex::new(Vec::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// The registry substitutions are installed into.
    pub fn symbols(&self) -> &Arc<SymbolRegistry> {
        &self.symbols
    }

    fn ledger_guard(&self) -> MutexGuard<'_, Vec<LedgerEntry>> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Build the value installed for `options`.
    fn build_substitute(
        &self,
        path: &ResolvedPath,
        options: &PatchOptions,
    ) -> Result<Value, PatchError> {
        if let Some(new) = &options.new {
            return Ok(new.clone());
        }

        let name = path.leaf().unwrap_or(path.module());
        let mut stand_in = match &options.new_callable {
            Some(factory) => factory(),
            None => StandIn::new(name),
        };

        let spec = match (&options.spec, options.autospec) {
            (Some(members), _) => Some(members.clone()),
            (None, true) => {
                let members = self.symbols.members(path.as_str());
                if members.is_empty() && self.symbols.lookup(path.as_str()).is_none() {
                    return Err(PatchError::invalid_configuration(
                        "autospec",
                        format!(
                            "`{}` does not exist, so there is nothing to derive a spec from",
                            path
                        ),
                    ));
                }
                Some(members)
            }
            (None, false) => None,
        };
        if let Some(members) = spec {
            stand_in = stand_in.with_spec(members, options.spec_set);
        }
        if let Some(return_value) = &options.return_value {
            stand_in = stand_in.with_return_value(return_value.clone());
        }
        if let Some(side_effect) = &options.side_effect {
            stand_in = stand_in.with_side_effect(side_effect.clone());
        }

        Ok(Value::Mock(MockHandle::from_stand_in(stand_in)))
    }
}

impl PatchPrimitive for SlotPatcher {
    fn install(
        &self,
        path: &ResolvedPath,
        options: &PatchOptions,
    ) -> Result<Installed, PatchError> {
        let substitute = self.build_substitute(path, options)?;
        let handle = PatchHandle::new(self.next_handle.fetch_add(1, Ordering::Relaxed));

        self.symbols
            .push_substitution(path.as_str(), handle, substitute.clone(), options.create)?;
        self.ledger_guard().push(LedgerEntry {
            handle,
            path: path.to_string(),
            substitute: substitute.clone(),
            create: options.create,
            active: true,
        });

        trace!(path = %path, handle = %handle, "substitution installed");
        Ok(Installed { handle, substitute })
    }

    fn start(&self, handle: PatchHandle) -> Result<(), PatchError> {
        let (path, substitute, create) = {
            let mut ledger = self.ledger_guard();
            let entry = ledger
                .iter_mut()
                .find(|entry| entry.handle == handle)
                .ok_or(PatchError::StalePatchHandle { handle })?;
            if entry.active {
                return Ok(());
            }
            entry.active = true;
            (entry.path.clone(), entry.substitute.clone(), entry.create)
        };

        if let Err(err) = self.symbols.push_substitution(&path, handle, substitute, create) {
            if let Some(entry) = self.ledger_guard().iter_mut().find(|e| e.handle == handle) {
                entry.active = false;
            }
            return Err(err);
        }
        trace!(path = %path, handle = %handle, "substitution started");
        Ok(())
    }

    fn stop(&self, handle: PatchHandle) -> Result<(), PatchError> {
        let path = {
            let mut ledger = self.ledger_guard();
            let entry = ledger
                .iter_mut()
                .find(|entry| entry.handle == handle)
                .ok_or(PatchError::StalePatchHandle { handle })?;
            if !entry.active {
                return Err(PatchError::NotStarted { handle });
            }
            entry.active = false;
            entry.path.clone()
        };

        self.symbols.remove_substitution(&path, handle);
        trace!(path = %path, handle = %handle, "substitution stopped");
        Ok(())
    }

    fn is_tracked(&self, handle: PatchHandle) -> bool {
        self.ledger_guard().iter().any(|entry| entry.handle == handle)
    }

    fn forget(&self, handle: PatchHandle) -> bool {
        let removed = {
            let mut ledger = self.ledger_guard();
            ledger
                .iter()
                .position(|entry| entry.handle == handle)
                .map(|index| ledger.remove(index))
        };

        match removed {
            Some(entry) => {
                if entry.active {
                    self.symbols.remove_substitution(&entry.path, handle);
                }
                trace!(path = %entry.path, handle = %handle, "substitution forgotten");
                true
            }
            None => false,
        }
    }

    fn stop_all(&self) -> Result<(), PatchError> {
        let handles: Vec<PatchHandle> = self.ledger().into_iter().rev().collect();
        let mut first_error = None;

        for handle in handles {
            if let Err(err) = self.stop(handle) {
                first_error.get_or_insert(err);
            }
        }
        self.ledger_guard().clear();

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn ledger(&self) -> Vec<PatchHandle> {
        self.ledger_guard().iter().map(|entry| entry.handle).collect()
    }
}
