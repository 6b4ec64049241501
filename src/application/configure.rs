//! Application of nested configuration to live substitutes.

use crate::domain::configure::{ConfigValue, ConfigureCommand, ConfigurePlan, Segment};
use crate::domain::error::PatchError;
use crate::domain::options::PatchOptions;
use crate::domain::stand_in::MockHandle;
use crate::domain::value::{SideEffect, Value};

/// Walks configuration commands into a stand-in graph.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigureMockApplier;

impl ConfigureMockApplier {
    /// Apply the configuration carried by `options` to an installed
    /// substitute.
    ///
    /// Nothing is applied when the patch installed an explicit `new` value.
    ///
    /// # Errors
    /// Returns `PatchError::InvalidConfiguration` when a command cannot be
    /// applied.
    pub fn apply_to_substitute(
        options: &PatchOptions,
        substitute: &Value,
    ) -> Result<(), PatchError> {
        if options.new.is_some() || options.configure.is_empty() {
            return Ok(());
        }
        match substitute {
            Value::Mock(handle) => Self::apply(&options.configure, handle),
            _ => Err(PatchError::invalid_configuration(
                options.configure.commands()[0].key.as_str(),
                "the substitute is not a stand-in",
            )),
        }
    }

    /// Apply every command of `plan` to `root`, in order.
    ///
    /// # Errors
    /// Returns `PatchError::InvalidConfiguration` on the first command that
    /// cannot be applied; earlier commands stay applied.
    pub fn apply(plan: &ConfigurePlan, root: &MockHandle) -> Result<(), PatchError> {
        plan.commands()
            .iter()
            .try_for_each(|command| Self::apply_command(command, root))
    }

    /// Apply a single command.
    ///
    /// # Errors
    /// Returns `PatchError::InvalidConfiguration` if the walk reaches a value
    /// that is not a stand-in, or a spec rejects a name.
    pub fn apply_command(command: &ConfigureCommand, root: &MockHandle) -> Result<(), PatchError> {
        let Some((last, walk)) = command.path.split_last() else {
            return Err(PatchError::invalid_configuration(command.key.as_str(), "empty key"));
        };

        let mut current = root.clone();
        for segment in walk {
            current = Self::descend(command, &current, segment)?;
        }

        let is_async = current.is_async();
        match (last, command.value.clone()) {
            (Segment::ReturnValue, ConfigValue::Value(value)) => {
                current.set_return_value(if is_async { value.into_deferred() } else { value });
            }
            (Segment::SideEffect, value) => {
                let side_effect = match value {
                    ConfigValue::SideEffect(side_effect) => Some(side_effect),
                    ConfigValue::Value(Value::None) => None,
                    ConfigValue::Value(value) => Some(SideEffect::from_value(value)),
                };
                let side_effect = if is_async {
                    side_effect.map(SideEffect::into_deferred)
                } else {
                    side_effect
                };
                current.set_side_effect(side_effect);
            }
            (Segment::Attr(name), ConfigValue::Value(value)) => {
                current.set_attr(name, value).map_err(|raised| {
                    PatchError::invalid_configuration(command.key.as_str(), raised.to_string())
                })?;
            }
            (_, ConfigValue::SideEffect(_)) => {
                return Err(PatchError::invalid_configuration(
                    command.key.as_str(),
                    "a side effect can only be assigned to a side_effect key",
                ));
            }
        }
        Ok(())
    }

    fn descend(
        command: &ConfigureCommand,
        current: &MockHandle,
        segment: &Segment,
    ) -> Result<MockHandle, PatchError> {
        let not_a_stand_in = || {
            PatchError::invalid_configuration(
                command.key.as_str(),
                format!("`{}` of `{}` is not a stand-in", segment, current.name()),
            )
        };

        let next = match segment {
            Segment::ReturnValue => Self::return_value_of(current),
            Segment::Attr(name) => current.attr(name).map_err(|raised| {
                PatchError::invalid_configuration(command.key.as_str(), raised.to_string())
            })?,
            Segment::SideEffect => return Err(not_a_stand_in()),
        };

        match next {
            Value::Mock(handle) => Ok(handle),
            Value::Deferred(deferred) => match deferred.peek() {
                Ok(Value::Mock(handle)) => Ok(handle.clone()),
                _ => Err(not_a_stand_in()),
            },
            _ => Err(not_a_stand_in()),
        }
    }

    /// The return value to walk into.
    ///
    /// An async stand-in that resolves to nothing gets a child stand-in to
    /// resolve to instead, so its awaited result can be configured.
    fn return_value_of(current: &MockHandle) -> Value {
        match current.peek_return_value() {
            Some(Value::Deferred(deferred)) if matches!(deferred.peek(), Ok(Value::None)) => {
                let child = MockHandle::new(format!("{}()", current.name()));
                current.set_return_value(Value::Mock(child.clone()).into_deferred());
                Value::Mock(child)
            }
            _ => current.return_value(),
        }
    }
}
