//! Dynamic values flowing through substitutes.
//!
//! Patched symbols can return anything a test configures, so the engine works
//! with a small dynamic [`Value`] type instead of concrete Rust types. Async
//! targets hand out [`Deferred`] values that are already resolved and can be
//! awaited directly.

use crate::domain::stand_in::MockHandle;
use std::collections::VecDeque;
use std::fmt;
use std::future::{ready, IntoFuture, Ready};
use std::sync::Arc;

/// A dynamically typed value returned by, or stored on, a substitute.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Absence of a value
    #[default]
    None,
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// String
    Str(String),
    /// Ordered list
    List(Vec<Value>),
    /// A generated stand-in object
    Mock(MockHandle),
    /// An already-resolved awaitable
    Deferred(Deferred),
}

impl Value {
    /// True for `None` and for a deferred value that resolves to `None`.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::None => true,
            Value::Deferred(deferred) => matches!(deferred.peek(), Ok(Value::None)),
            _ => false,
        }
    }

    /// Wrap the value in a resolved [`Deferred`]. Already deferred values are
    /// returned unchanged.
    pub fn into_deferred(self) -> Value {
        match self {
            Value::Deferred(_) => self,
            other => Value::Deferred(Deferred::resolved(other)),
        }
    }

    /// The stand-in behind this value, if it is one.
    pub fn as_mock(&self) -> Option<&MockHandle> {
        match self {
            Value::Mock(handle) => Some(handle),
            _ => None,
        }
    }

    /// The string contents, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::List(values.into_iter().map(Into::into).collect())
    }
}

impl From<MockHandle> for Value {
    fn from(handle: MockHandle) -> Self {
        Value::Mock(handle)
    }
}

impl From<Deferred> for Value {
    fn from(deferred: Deferred) -> Self {
        Value::Deferred(deferred)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::None, Into::into)
    }
}

/// An awaitable whose outcome is already known.
///
/// Awaiting it yields the wrapped value or the wrapped failure without ever
/// suspending.
#[derive(Debug, Clone, PartialEq)]
pub struct Deferred(Box<Result<Value, Raised>>);

impl Deferred {
    /// A deferred that resolves to `value`.
    pub fn resolved(value: Value) -> Self {
        Self(Box::new(Ok(value)))
    }

    /// A deferred that fails with `raised`.
    pub fn failed(raised: Raised) -> Self {
        Self(Box::new(Err(raised)))
    }

    /// Inspect the outcome without consuming it.
    pub fn peek(&self) -> Result<&Value, &Raised> {
        self.0.as_ref().as_ref()
    }

    /// Take the outcome synchronously.
    pub fn into_result(self) -> Result<Value, Raised> {
        *self.0
    }
}

impl IntoFuture for Deferred {
    type Output = Result<Value, Raised>;
    type IntoFuture = Ready<Result<Value, Raised>>;

    fn into_future(self) -> Self::IntoFuture {
        ready(self.into_result())
    }
}

/// The stand-in's notion of an exception: a kind and a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raised {
    /// Error class name, e.g. `ValueError`
    pub kind: String,
    /// Human readable message
    pub message: String,
}

impl Raised {
    /// Create a raised error of the given kind.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// A generic `Exception`.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new("Exception", message)
    }

    pub(crate) fn attribute_error(owner: &str, name: &str) -> Self {
        Self::new(
            "AttributeError",
            format!("`{}` has no attribute `{}`", owner, name),
        )
    }

    pub(crate) fn exhausted(name: &str) -> Self {
        Self::new(
            "StopIteration",
            format!("side effect sequence of `{}` is exhausted", name),
        )
    }
}

impl fmt::Display for Raised {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Raised {}

/// One outcome produced by a side effect.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Return this value
    Return(Value),
    /// Raise this error
    Raise(Raised),
    /// Fall through to the stand-in's return value
    Default,
}

impl Effect {
    /// Wrap the outcome for an async target.
    ///
    /// Raised errors become failed deferreds so they surface on await.
    pub fn into_deferred(self) -> Effect {
        match self {
            Effect::Return(value) => Effect::Return(value.into_deferred()),
            Effect::Raise(raised) => Effect::Return(Value::Deferred(Deferred::failed(raised))),
            Effect::Default => Effect::Default,
        }
    }
}

impl From<Value> for Effect {
    fn from(value: Value) -> Self {
        Effect::Return(value)
    }
}

/// A callable side effect, invoked with the call's arguments.
pub type EffectFn = Arc<dyn Fn(&[Value]) -> Effect + Send + Sync>;

/// Behavior that runs instead of returning the configured return value.
#[derive(Clone)]
pub enum SideEffect {
    /// Each call consumes the next effect; an exhausted sequence raises
    Sequence(VecDeque<Effect>),
    /// Every call produces the same effect
    Always(Effect),
    /// Every call runs the function
    Callable(EffectFn),
}

impl SideEffect {
    /// A sequence of effects consumed one per call.
    pub fn sequence<I, E>(effects: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<Effect>,
    {
        SideEffect::Sequence(effects.into_iter().map(Into::into).collect())
    }

    /// Raise on every call.
    pub fn raise(raised: Raised) -> Self {
        SideEffect::Always(Effect::Raise(raised))
    }

    /// Run `f` on every call.
    pub fn callable<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Effect + Send + Sync + 'static,
    {
        SideEffect::Callable(Arc::new(f))
    }

    /// Interpret a plain value as a side effect: lists become sequences,
    /// anything else is returned on every call.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::List(items) => {
                SideEffect::Sequence(items.into_iter().map(Effect::Return).collect())
            }
            other => SideEffect::Always(Effect::Return(other)),
        }
    }

    /// True for an empty sequence or an effect that returns nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            SideEffect::Sequence(effects) => effects.is_empty(),
            SideEffect::Always(Effect::Return(value)) => value.is_empty(),
            SideEffect::Always(_) | SideEffect::Callable(_) => false,
        }
    }

    /// Wrap every outcome for an async target.
    ///
    /// Calling this on an already wrapped side effect leaves outcomes as they
    /// are, since deferred values are never wrapped twice.
    pub fn into_deferred(self) -> Self {
        match self {
            SideEffect::Sequence(effects) => {
                SideEffect::Sequence(effects.into_iter().map(Effect::into_deferred).collect())
            }
            SideEffect::Always(effect) => SideEffect::Always(effect.into_deferred()),
            SideEffect::Callable(f) => {
                SideEffect::Callable(Arc::new(move |args: &[Value]| f(args).into_deferred()))
            }
        }
    }
}

impl fmt::Debug for SideEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SideEffect::Sequence(effects) => f.debug_tuple("Sequence").field(effects).finish(),
            SideEffect::Always(effect) => f.debug_tuple("Always").field(effect).finish(),
            SideEffect::Callable(_) => f.write_str("Callable(..)"),
        }
    }
}

impl From<Raised> for SideEffect {
    fn from(raised: Raised) -> Self {
        SideEffect::raise(raised)
    }
}
