//! Generated stand-in objects.
//!
//! A stand-in answers calls with its configured return value or side effect
//! and creates child stand-ins for attributes it has never seen, unless a spec
//! restricts which names exist.

use crate::domain::value::{Deferred, Effect, Raised, SideEffect, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// State of a single stand-in object.
#[derive(Debug, Clone, Default)]
pub struct StandIn {
    name: String,
    attributes: BTreeMap<String, Value>,
    return_value: Option<Value>,
    side_effect: Option<SideEffect>,
    spec: Option<BTreeSet<String>>,
    spec_set: bool,
    call_count: u64,
}

impl StandIn {
    /// Create a stand-in with the given display name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the value returned by calls.
    pub fn with_return_value(mut self, value: impl Into<Value>) -> Self {
        self.return_value = Some(value.into());
        self
    }

    /// Set the side effect run by calls.
    pub fn with_side_effect(mut self, side_effect: SideEffect) -> Self {
        self.side_effect = Some(side_effect);
        self
    }

    /// Restrict attribute access to `members`. With `spec_set`, attribute
    /// assignment is restricted as well.
    pub fn with_spec<I, S>(mut self, members: I, spec_set: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec = Some(members.into_iter().map(Into::into).collect());
        self.spec_set = spec_set;
        self
    }

    fn allows(&self, name: &str) -> bool {
        self.spec.as_ref().map_or(true, |spec| spec.contains(name))
    }
}

/// Shared handle to a stand-in.
///
/// Clones refer to the same object; equality is identity.
#[derive(Clone)]
pub struct MockHandle(Arc<Mutex<StandIn>>);

impl MockHandle {
    /// Create a fresh stand-in with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_stand_in(StandIn::new(name))
    }

    /// Share an existing stand-in.
    pub fn from_stand_in(stand_in: StandIn) -> Self {
        Self(Arc::new(Mutex::new(stand_in)))
    }

    fn lock(&self) -> MutexGuard<'_, StandIn> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The display name.
    pub fn name(&self) -> String {
        self.lock().name.clone()
    }

    /// Call the stand-in.
    ///
    /// A side effect takes precedence over the return value. Sequence effects
    /// are consumed one per call, and `Effect::Default` falls through to the
    /// return value.
    ///
    /// # Errors
    /// Returns the raised error when the side effect raises or its sequence is
    /// exhausted.
    pub fn call(&self, args: &[Value]) -> Result<Value, Raised> {
        enum Pending {
            ReturnValue,
            Effect(Effect),
            Call(crate::domain::value::EffectFn),
        }

        let pending = {
            let mut guard = self.lock();
            let stand_in = &mut *guard;
            stand_in.call_count += 1;
            match &mut stand_in.side_effect {
                None => Pending::ReturnValue,
                Some(SideEffect::Sequence(effects)) => match effects.pop_front() {
                    Some(effect) => Pending::Effect(effect),
                    None => {
                        let raised = Raised::exhausted(&stand_in.name);
                        // Awaited callers see the error when they await.
                        return match stand_in.return_value {
                            Some(Value::Deferred(_)) => {
                                Ok(Value::Deferred(Deferred::failed(raised)))
                            }
                            _ => Err(raised),
                        };
                    }
                },
                Some(SideEffect::Always(effect)) => Pending::Effect(effect.clone()),
                Some(SideEffect::Callable(f)) => Pending::Call(Arc::clone(f)),
            }
        };

        // The lock is released before user code runs.
        let effect = match pending {
            Pending::ReturnValue => Effect::Default,
            Pending::Effect(effect) => effect,
            Pending::Call(f) => f(args),
        };

        match effect {
            Effect::Return(value) => Ok(value),
            Effect::Raise(raised) => Err(raised),
            Effect::Default => Ok(self.return_value()),
        }
    }

    /// Read an attribute, creating a child stand-in when it is missing.
    ///
    /// # Errors
    /// Returns an `AttributeError` when a spec excludes `name`.
    pub fn attr(&self, name: &str) -> Result<Value, Raised> {
        let mut guard = self.lock();
        if let Some(value) = guard.attributes.get(name) {
            return Ok(value.clone());
        }
        if !guard.allows(name) {
            return Err(Raised::attribute_error(&guard.name, name));
        }
        let child = Value::Mock(MockHandle::new(format!("{}.{}", guard.name, name)));
        guard.attributes.insert(name.to_string(), child.clone());
        Ok(child)
    }

    /// Assign an attribute.
    ///
    /// # Errors
    /// Returns an `AttributeError` when `spec_set` excludes `name`.
    pub fn set_attr(&self, name: &str, value: impl Into<Value>) -> Result<(), Raised> {
        let mut guard = self.lock();
        if guard.spec_set && !guard.allows(name) {
            return Err(Raised::attribute_error(&guard.name, name));
        }
        guard.attributes.insert(name.to_string(), value.into());
        Ok(())
    }

    /// Call an attribute as a method.
    ///
    /// # Errors
    /// Returns an `AttributeError` for missing names and `TypeError` when the
    /// attribute is not a stand-in.
    pub fn call_method(&self, name: &str, args: &[Value]) -> Result<Value, Raised> {
        match self.attr(name)? {
            Value::Mock(child) => child.call(args),
            _ => Err(Raised::new(
                "TypeError",
                format!("attribute `{}` of `{}` is not callable", name, self.name()),
            )),
        }
    }

    /// The value returned by calls, creating a child stand-in when unset.
    pub fn return_value(&self) -> Value {
        let mut guard = self.lock();
        if let Some(value) = &guard.return_value {
            return value.clone();
        }
        let child = Value::Mock(MockHandle::new(format!("{}()", guard.name)));
        guard.return_value = Some(child.clone());
        child
    }

    /// The configured return value, without creating one.
    pub fn peek_return_value(&self) -> Option<Value> {
        self.lock().return_value.clone()
    }

    /// Whether calls hand out awaitables.
    pub fn is_async(&self) -> bool {
        matches!(self.lock().return_value, Some(Value::Deferred(_)))
    }

    /// Replace the value returned by calls.
    pub fn set_return_value(&self, value: impl Into<Value>) {
        self.lock().return_value = Some(value.into());
    }

    /// Replace or clear the side effect.
    pub fn set_side_effect(&self, side_effect: Option<SideEffect>) {
        self.lock().side_effect = side_effect;
    }

    /// Number of calls made so far.
    pub fn call_count(&self) -> u64 {
        self.lock().call_count
    }

    /// Whether the stand-in was called at least once.
    pub fn called(&self) -> bool {
        self.call_count() > 0
    }
}

impl PartialEq for MockHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for MockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Avoids recursing through child stand-ins.
        write!(f, "MockHandle({:?})", self.name())
    }
}
