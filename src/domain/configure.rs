//! Nested configuration commands.
//!
//! A key such as `return_value.foo.return_value` addresses a value deep inside
//! the substitute's generated attributes. Keys are parsed once into a list of
//! segments so applying them later cannot fail on syntax.

use crate::domain::error::PatchError;
use crate::domain::path::is_identifier;
use crate::domain::stand_in::MockHandle;
use crate::domain::value::{SideEffect, Value};
use std::fmt;

/// One step of a configuration key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// The stand-in's return value
    ReturnValue,
    /// The stand-in's side effect; only valid as the final segment
    SideEffect,
    /// A named attribute
    Attr(String),
}

impl Segment {
    fn parse(segment: &str) -> Self {
        match segment {
            "return_value" => Segment::ReturnValue,
            "side_effect" => Segment::SideEffect,
            other => Segment::Attr(other.to_string()),
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::ReturnValue => f.write_str("return_value"),
            Segment::SideEffect => f.write_str("side_effect"),
            Segment::Attr(name) => f.write_str(name),
        }
    }
}

/// Value assigned by a configuration command.
#[derive(Debug, Clone)]
pub enum ConfigValue {
    /// A plain value
    Value(Value),
    /// A side effect, for keys ending in `side_effect`
    SideEffect(SideEffect),
}

macro_rules! config_value_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for ConfigValue {
                fn from(value: $ty) -> Self {
                    ConfigValue::Value(value.into())
                }
            }
        )*
    };
}

config_value_from!(Value, bool, i32, i64, f64, &str, String, MockHandle);

impl From<SideEffect> for ConfigValue {
    fn from(side_effect: SideEffect) -> Self {
        ConfigValue::SideEffect(side_effect)
    }
}

/// A parsed `key = value` configuration entry.
#[derive(Debug, Clone)]
pub struct ConfigureCommand {
    /// The key as written
    pub key: String,
    /// Parsed segments, never empty
    pub path: Vec<Segment>,
    /// Value assigned at the final segment
    pub value: ConfigValue,
}

/// Ordered list of configuration commands.
#[derive(Debug, Clone, Default)]
pub struct ConfigurePlan {
    commands: Vec<ConfigureCommand>,
}

impl ConfigurePlan {
    /// Parse and append a command.
    ///
    /// # Errors
    /// Returns `PatchError::InvalidConfiguration` for keys that are not
    /// dotted identifiers, or that use `side_effect` anywhere but last.
    pub fn push(&mut self, key: &str, value: impl Into<ConfigValue>) -> Result<(), PatchError> {
        let command = Self::parse(key, value.into())?;
        self.commands.push(command);
        Ok(())
    }

    fn parse(key: &str, value: ConfigValue) -> Result<ConfigureCommand, PatchError> {
        let segments: Vec<&str> = key.split('.').collect();
        if let Some(bad) = segments.iter().find(|s| !is_identifier(s)) {
            return Err(PatchError::invalid_configuration(
                key,
                format!("`{}` is not an identifier", bad),
            ));
        }

        let path: Vec<Segment> = segments.into_iter().map(Segment::parse).collect();
        let last = path.len() - 1;
        if path[..last].contains(&Segment::SideEffect) {
            return Err(PatchError::invalid_configuration(
                key,
                "side_effect can only be the last segment",
            ));
        }
        if matches!(value, ConfigValue::SideEffect(_)) && path[last] != Segment::SideEffect {
            return Err(PatchError::invalid_configuration(
                key,
                "a side effect can only be assigned to a side_effect key",
            ));
        }

        Ok(ConfigureCommand {
            key: key.to_string(),
            path,
            value,
        })
    }

    /// The parsed commands, in insertion order.
    pub fn commands(&self) -> &[ConfigureCommand] {
        &self.commands
    }

    /// Whether no command was added.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Number of commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }
}
