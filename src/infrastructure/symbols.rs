//! Explicit symbol registry.
//!
//! Rust has no runtime import machinery, so code that wants to be patchable
//! registers its symbols here under dotted paths and calls them through the
//! registry. A symbol with an installed substitution answers with the
//! substitute; otherwise the original binding runs.

use crate::application::ports::{SymbolKind, SymbolTable};
use crate::domain::error::PatchError;
use crate::domain::metadata::PatchHandle;
use crate::domain::path::is_dotted_path;
use crate::domain::target::SymbolRef;
use crate::domain::value::{Deferred, Raised, Value};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;

/// Body of a registered routine.
pub type Routine = Arc<dyn Fn(&[Value]) -> Result<Value, Raised> + Send + Sync>;

#[derive(Clone)]
enum Binding {
    Module,
    Class { constructor: Option<Routine> },
    Routine { body: Routine, is_async: bool },
    Attribute(Value),
    /// Exists only while a patch created it
    Created,
}

impl Binding {
    fn kind(&self) -> SymbolKind {
        match self {
            Binding::Module => SymbolKind::Module,
            Binding::Class { .. } => SymbolKind::Class,
            Binding::Routine { is_async, .. } => SymbolKind::Routine {
                is_async: *is_async,
            },
            Binding::Attribute(_) | Binding::Created => SymbolKind::Attribute,
        }
    }
}

#[derive(Clone)]
struct SymbolEntry {
    binding: Binding,
    /// Installed substitutions, newest last
    substitutions: Vec<(PatchHandle, Value)>,
}

impl SymbolEntry {
    fn new(binding: Binding) -> Self {
        Self {
            binding,
            substitutions: Vec::new(),
        }
    }
}

/// Error returned when calling through the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum CallError {
    /// The callee raised
    Raised(Raised),
    /// Nothing is registered at the path
    UnknownSymbol {
        /// The path that was called
        path: String,
    },
    /// The symbol cannot be called
    NotCallable {
        /// The path that was called
        path: String,
    },
    /// An async call did not produce an awaitable
    NotAwaitable {
        /// The path that was called
        path: String,
    },
    /// The symbol is not a plain value
    NotAnAttribute {
        /// The path that was read
        path: String,
    },
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::Raised(raised) => write!(f, "{}", raised),
            CallError::UnknownSymbol { path } => write!(f, "no symbol registered at `{}`", path),
            CallError::NotCallable { path } => write!(f, "`{}` is not callable", path),
            CallError::NotAwaitable { path } => {
                write!(f, "`{}` did not return an awaitable", path)
            }
            CallError::NotAnAttribute { path } => write!(f, "`{}` is not an attribute", path),
        }
    }
}

impl std::error::Error for CallError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CallError::Raised(raised) => Some(raised),
            _ => None,
        }
    }
}

impl From<Raised> for CallError {
    fn from(raised: Raised) -> Self {
        CallError::Raised(raised)
    }
}

/// What a call resolves to once the map guard is released.
enum Callee {
    Value(Value),
    Routine { body: Routine, is_async: bool },
}

/// Concurrent map from dotted path to symbol binding.
///
/// Guards are never held while routines or substitutes run, so a routine may
/// call back into the registry.
pub struct SymbolRegistry {
    symbols: DashMap<String, SymbolEntry, ahash::RandomState>,
}

impl SymbolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            symbols: DashMap::with_hasher(ahash::RandomState::new()),
        }
    }

    fn register(&self, path: &str, binding: Binding) -> Result<&Self, PatchError> {
        if !is_dotted_path(path) {
            return Err(PatchError::invalid_target(
                path,
                "only identifiers separated by dots are allowed",
            ));
        }
        // Substitutions installed at the path stay in effect.
        match self.symbols.entry(path.to_string()) {
            Entry::Occupied(mut occupied) => occupied.get_mut().binding = binding,
            Entry::Vacant(vacant) => {
                vacant.insert(SymbolEntry::new(binding));
            }
        }
        Ok(self)
    }

    /// Register a module.
    ///
    /// # Errors
    /// Returns `PatchError::InvalidTarget` for malformed paths.
    pub fn register_module(&self, path: &str) -> Result<&Self, PatchError> {
        self.register(path, Binding::Module)
    }

    /// Register a type that cannot be constructed through the registry.
    ///
    /// # Errors
    /// Returns `PatchError::InvalidTarget` for malformed paths.
    pub fn register_class(&self, path: &str) -> Result<&Self, PatchError> {
        self.register(path, Binding::Class { constructor: None })
    }

    /// Register a type with a constructor.
    ///
    /// # Errors
    /// Returns `PatchError::InvalidTarget` for malformed paths.
    pub fn register_class_with<F>(&self, path: &str, constructor: F) -> Result<&Self, PatchError>
    where
        F: Fn(&[Value]) -> Result<Value, Raised> + Send + Sync + 'static,
    {
        self.register(
            path,
            Binding::Class {
                constructor: Some(Arc::new(constructor)),
            },
        )
    }

    /// Register the Rust type `T` under its module path.
    ///
    /// # Errors
    /// Returns `PatchError::InvalidTarget` for generic or otherwise
    /// unaddressable types.
    pub fn register_type<T: ?Sized>(&self) -> Result<&Self, PatchError> {
        self.register_class(&SymbolRef::of::<T>().dotted())
    }

    /// Register a synchronous routine.
    ///
    /// # Errors
    /// Returns `PatchError::InvalidTarget` for malformed paths.
    pub fn register_routine<F>(&self, path: &str, body: F) -> Result<&Self, PatchError>
    where
        F: Fn(&[Value]) -> Result<Value, Raised> + Send + Sync + 'static,
    {
        self.register(
            path,
            Binding::Routine {
                body: Arc::new(body),
                is_async: false,
            },
        )
    }

    /// Register a routine whose callers await the result.
    ///
    /// # Errors
    /// Returns `PatchError::InvalidTarget` for malformed paths.
    pub fn register_async_routine<F>(&self, path: &str, body: F) -> Result<&Self, PatchError>
    where
        F: Fn(&[Value]) -> Result<Value, Raised> + Send + Sync + 'static,
    {
        self.register(
            path,
            Binding::Routine {
                body: Arc::new(body),
                is_async: true,
            },
        )
    }

    /// Register a plain value.
    ///
    /// # Errors
    /// Returns `PatchError::InvalidTarget` for malformed paths.
    pub fn register_attribute(
        &self,
        path: &str,
        value: impl Into<Value>,
    ) -> Result<&Self, PatchError> {
        self.register(path, Binding::Attribute(value.into()))
    }

    /// Whether anything is registered at `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.symbols.contains_key(path)
    }

    /// Whether a substitution is in effect at `path`.
    pub fn is_patched(&self, path: &str) -> bool {
        self.substitution_depth(path) > 0
    }

    /// Number of substitutions stacked at `path`.
    pub fn substitution_depth(&self, path: &str) -> usize {
        self.symbols
            .get(path)
            .map_or(0, |entry| entry.substitutions.len())
    }

    /// The value visible at `path`: the newest substitute, or the registered
    /// attribute.
    ///
    /// # Errors
    /// Returns `UnknownSymbol` for missing paths and `NotAnAttribute` for
    /// unpatched modules, types and routines.
    pub fn get(&self, path: &str) -> Result<Value, CallError> {
        let entry = self.symbols.get(path).ok_or_else(|| CallError::UnknownSymbol {
            path: path.to_string(),
        })?;
        if let Some((_, substitute)) = entry.substitutions.last() {
            return Ok(substitute.clone());
        }
        match &entry.binding {
            Binding::Attribute(value) => Ok(value.clone()),
            Binding::Created => Err(CallError::UnknownSymbol {
                path: path.to_string(),
            }),
            _ => Err(CallError::NotAnAttribute {
                path: path.to_string(),
            }),
        }
    }

    /// Call the symbol at `path`.
    ///
    /// Calling an async routine without awaiting it returns its awaitable,
    /// as a `Value::Deferred`.
    ///
    /// # Errors
    /// Returns `Raised` when the callee raises, `UnknownSymbol` for missing
    /// paths and `NotCallable` for values that cannot be called.
    pub fn call(&self, path: &str, args: &[Value]) -> Result<Value, CallError> {
        let callee = {
            let entry = self.symbols.get(path).ok_or_else(|| CallError::UnknownSymbol {
                path: path.to_string(),
            })?;
            match (entry.substitutions.last(), &entry.binding) {
                (Some((_, substitute)), _) => Callee::Value(substitute.clone()),
                (None, Binding::Routine { body, is_async }) => Callee::Routine {
                    body: Arc::clone(body),
                    is_async: *is_async,
                },
                (None, Binding::Class {
                    constructor: Some(constructor),
                }) => Callee::Routine {
                    body: Arc::clone(constructor),
                    is_async: false,
                },
                (None, Binding::Attribute(value)) => Callee::Value(value.clone()),
                (None, Binding::Created) => {
                    return Err(CallError::UnknownSymbol {
                        path: path.to_string(),
                    })
                }
                (None, _) => {
                    return Err(CallError::NotCallable {
                        path: path.to_string(),
                    })
                }
            }
        };

        match callee {
            Callee::Value(Value::Mock(handle)) => Ok(handle.call(args)?),
            Callee::Value(_) => Err(CallError::NotCallable {
                path: path.to_string(),
            }),
            Callee::Routine {
                body,
                is_async: false,
            } => Ok(body(args)?),
            Callee::Routine {
                body,
                is_async: true,
            } => Ok(Value::Deferred(match body(args) {
                Ok(value) => Deferred::resolved(value),
                Err(raised) => Deferred::failed(raised),
            })),
        }
    }

    /// Call the symbol at `path` and hand back its awaitable.
    ///
    /// ```
    /// use mocker_builder::{SymbolRegistry, Value};
    ///
    /// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
    /// let symbols = SymbolRegistry::new();
    /// symbols
    ///     .register_async_routine("app.fetch", |_| Ok(Value::from("data")))
    ///     .unwrap();
    /// let data = symbols.call_async("app.fetch", &[]).unwrap().await;
    /// assert_eq!(data, Ok(Value::from("data")));
    /// # });
    /// ```
    ///
    /// # Errors
    /// Returns `NotAwaitable` when the call produced a plain value, plus the
    /// errors of [`SymbolRegistry::call`].
    pub fn call_async(&self, path: &str, args: &[Value]) -> Result<Deferred, CallError> {
        match self.call(path, args)? {
            Value::Deferred(deferred) => Ok(deferred),
            _ => Err(CallError::NotAwaitable {
                path: path.to_string(),
            }),
        }
    }

    /// Push a substitute on top of `path`.
    ///
    /// With `create`, a missing path is created and removed again once its
    /// last substitution is gone.
    pub(crate) fn push_substitution(
        &self,
        path: &str,
        handle: PatchHandle,
        substitute: Value,
        create: bool,
    ) -> Result<(), PatchError> {
        if let Some(mut entry) = self.symbols.get_mut(path) {
            entry.substitutions.push((handle, substitute));
            return Ok(());
        }
        if !create {
            return Err(PatchError::SymbolNotFound {
                path: path.to_string(),
            });
        }
        self.symbols
            .entry(path.to_string())
            .or_insert_with(|| SymbolEntry::new(Binding::Created))
            .substitutions
            .push((handle, substitute));
        Ok(())
    }

    /// Remove the substitution installed with `handle`, wherever it sits in
    /// the stack.
    ///
    /// # Returns
    /// True if it was present
    pub(crate) fn remove_substitution(&self, path: &str, handle: PatchHandle) -> bool {
        let removed = match self.symbols.get_mut(path) {
            Some(mut entry) => {
                let before = entry.substitutions.len();
                entry.substitutions.retain(|(h, _)| *h != handle);
                entry.substitutions.len() != before
            }
            None => false,
        };
        self.symbols.remove_if(path, |_, entry| {
            matches!(entry.binding, Binding::Created) && entry.substitutions.is_empty()
        });
        removed
    }

    /// Names registered directly below `path`. Slots that only exist
    /// because a patch created them are skipped.
    fn member_names(&self, path: &str) -> Vec<String> {
        let prefix = format!("{}.", path);
        let mut names: Vec<String> = self
            .symbols
            .iter()
            .filter(|entry| !matches!(entry.binding, Binding::Created))
            .filter_map(|entry| {
                entry
                    .key()
                    .strip_prefix(&prefix)
                    .filter(|rest| !rest.contains('.'))
                    .map(str::to_string)
            })
            .collect();
        names.sort();
        names
    }
}

impl Default for SymbolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SymbolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymbolRegistry")
            .field("symbols", &self.symbols.len())
            .finish()
    }
}

impl SymbolTable for SymbolRegistry {
    fn lookup(&self, path: &str) -> Option<SymbolKind> {
        self.symbols.get(path).map(|entry| entry.binding.kind())
    }

    fn members(&self, path: &str) -> Vec<String> {
        self.member_names(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::stand_in::MockHandle;

    fn registry() -> SymbolRegistry {
        let symbols = SymbolRegistry::new();
        symbols
            .register_module("app")
            .unwrap()
            .register_class("app.Hero")
            .unwrap()
            .register_routine("app.Hero.run", |_| Ok(Value::from("running")))
            .unwrap()
            .register_attribute("app.Hero.level", 1)
            .unwrap()
            .register_async_routine("app.fetch", |_| Ok(Value::Int(7)))
            .unwrap();
        symbols
    }

    #[test]
    fn test_lookup_kinds() {
        let symbols = registry();
        assert_eq!(symbols.lookup("app"), Some(SymbolKind::Module));
        assert_eq!(symbols.lookup("app.Hero"), Some(SymbolKind::Class));
        assert_eq!(
            symbols.lookup("app.fetch"),
            Some(SymbolKind::Routine { is_async: true })
        );
        assert_eq!(symbols.lookup("app.missing"), None);
    }

    #[test]
    fn test_members_are_direct_children() {
        let symbols = registry();
        assert_eq!(symbols.members("app.Hero"), vec!["level", "run"]);
        assert_eq!(symbols.members("app"), vec!["Hero", "fetch"]);
    }

    #[test]
    fn test_register_rejects_bad_path() {
        let symbols = SymbolRegistry::new();
        assert!(symbols.register_module("app heroes").is_err());
    }

    #[test]
    fn test_call_through_original() {
        let symbols = registry();
        assert_eq!(symbols.call("app.Hero.run", &[]), Ok(Value::from("running")));
        assert_eq!(symbols.get("app.Hero.level"), Ok(Value::Int(1)));
        assert_eq!(
            symbols.call("app.Hero", &[]),
            Err(CallError::NotCallable {
                path: "app.Hero".to_string()
            })
        );
    }

    #[test]
    fn test_substitutions_stack() {
        let symbols = registry();
        let first = MockHandle::new("first");
        first.set_return_value("one");
        let second = MockHandle::new("second");
        second.set_return_value("two");

        symbols
            .push_substitution("app.Hero.run", PatchHandle::new(1), first.into(), false)
            .unwrap();
        symbols
            .push_substitution("app.Hero.run", PatchHandle::new(2), second.into(), false)
            .unwrap();
        assert_eq!(symbols.call("app.Hero.run", &[]), Ok(Value::from("two")));

        assert!(symbols.remove_substitution("app.Hero.run", PatchHandle::new(1)));
        assert_eq!(symbols.call("app.Hero.run", &[]), Ok(Value::from("two")));

        assert!(symbols.remove_substitution("app.Hero.run", PatchHandle::new(2)));
        assert_eq!(symbols.call("app.Hero.run", &[]), Ok(Value::from("running")));
        assert!(!symbols.remove_substitution("app.Hero.run", PatchHandle::new(2)));
    }

    #[test]
    fn test_created_symbol_disappears_with_last_substitution() {
        let symbols = registry();
        let err = symbols
            .push_substitution("app.Hero.fly", PatchHandle::new(1), Value::Int(1), false)
            .unwrap_err();
        assert!(matches!(err, PatchError::SymbolNotFound { .. }));

        symbols
            .push_substitution("app.Hero.fly", PatchHandle::new(1), Value::Int(1), true)
            .unwrap();
        assert_eq!(symbols.get("app.Hero.fly"), Ok(Value::Int(1)));
        assert!(!symbols.members("app.Hero").contains(&"fly".to_string()));

        symbols.remove_substitution("app.Hero.fly", PatchHandle::new(1));
        assert!(!symbols.contains("app.Hero.fly"));
    }

    #[test]
    fn test_routine_may_call_back_into_registry() {
        let symbols = Arc::new(SymbolRegistry::new());
        symbols.register_routine("app.base", |_| Ok(Value::Int(1))).unwrap();
        let inner = Arc::clone(&symbols);
        symbols
            .register_routine("app.twice", move |args| {
                let base = inner
                    .call("app.base", args)
                    .map_err(|e| Raised::error(e.to_string()))?;
                match base {
                    Value::Int(i) => Ok(Value::Int(i * 2)),
                    other => Ok(other),
                }
            })
            .unwrap();
        assert_eq!(symbols.call("app.twice", &[]), Ok(Value::Int(2)));
    }

    #[test]
    fn test_reregistering_keeps_substitutions() {
        let symbols = registry();
        let stand_in = MockHandle::new("run");
        stand_in.set_return_value("patched");
        symbols
            .push_substitution("app.Hero.run", PatchHandle::new(1), stand_in.into(), false)
            .unwrap();

        symbols
            .register_routine("app.Hero.run", |_| Ok(Value::from("v2")))
            .unwrap();
        assert_eq!(symbols.call("app.Hero.run", &[]), Ok(Value::from("patched")));

        assert!(symbols.remove_substitution("app.Hero.run", PatchHandle::new(1)));
        assert_eq!(symbols.call("app.Hero.run", &[]), Ok(Value::from("v2")));
    }

    #[test]
    fn test_class_constructor_is_called() {
        let symbols = SymbolRegistry::new();
        symbols
            .register_class_with("app.Point", |args| Ok(Value::List(args.to_vec())))
            .unwrap();
        assert_eq!(symbols.lookup("app.Point"), Some(SymbolKind::Class));
        assert_eq!(
            symbols.call("app.Point", &[Value::Int(1), Value::Int(2)]),
            Ok(Value::List(vec![Value::Int(1), Value::Int(2)]))
        );
    }

    #[tokio::test]
    async fn test_async_routine_is_awaitable() {
        let symbols = registry();
        let result = symbols.call_async("app.fetch", &[]).unwrap().await;
        assert_eq!(result, Ok(Value::Int(7)));

        assert_eq!(
            symbols.call_async("app.Hero.run", &[]).unwrap_err(),
            CallError::NotAwaitable {
                path: "app.Hero.run".to_string()
            }
        );
    }
}
