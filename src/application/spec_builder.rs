//! Assembly of the patch option bag.
//!
//! The builder merges a descriptor's explicit options with its free-form
//! keyword arguments and applies the rules that depend on the resolved
//! target: ambiguity warnings, constructor bypass, async wrapping and nested
//! configuration.

use crate::application::resolver::Resolution;
use crate::domain::configure::ConfigValue;
use crate::domain::error::PatchError;
use crate::domain::metadata::PatchMetadata;
use crate::domain::options::{PatchOptions, PatchWarning, RECOGNIZED_OPTIONS};
use crate::domain::path::is_identifier;
use crate::domain::target::TargetDescriptor;
use crate::domain::value::{SideEffect, Value};
use std::collections::BTreeSet;
use tracing::warn;

/// Leaf names whose return value is never configured.
///
/// Replacing a constructor with a stand-in that returns a configured value
/// would hide the instance the test wants to observe.
pub const DEFAULT_BYPASS_NAMES: [&str; 2] = ["__init__", "new"];

/// Builds [`PatchMetadata`] from descriptors.
#[derive(Debug, Clone)]
pub struct PatchSpecBuilder {
    bypass: BTreeSet<String>,
}

impl PatchSpecBuilder {
    /// Create a builder with the default bypass names.
    pub fn new() -> Self {
        Self::with_bypass_names(DEFAULT_BYPASS_NAMES)
    }

    /// Create a builder with custom bypass names.
    pub fn with_bypass_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            bypass: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `leaf` bypasses return value configuration.
    pub fn bypasses(&self, leaf: &str) -> bool {
        self.bypass.contains(leaf)
    }

    /// Move free-form keyword arguments into the option bag.
    ///
    /// Option names set their option; every other key is appended to the
    /// nested configuration. Routing happens before resolution so that
    /// `create` given as a keyword argument reaches the existence check.
    ///
    /// # Errors
    /// Returns `PatchError::InvalidConfiguration` when an option keyword has
    /// the wrong shape.
    pub fn route_kwargs(mut descriptor: TargetDescriptor) -> Result<TargetDescriptor, PatchError> {
        for (key, value) in std::mem::take(&mut descriptor.kwargs) {
            if RECOGNIZED_OPTIONS.contains(&key.as_str()) {
                Self::set_option(&mut descriptor.options, &key, value)?;
            } else {
                descriptor.configure.push((key, value));
            }
        }
        Ok(descriptor)
    }

    /// Build the metadata of a patch that is ready to install.
    ///
    /// # Errors
    /// Returns `PatchError::InvalidConfiguration` when a keyword argument has
    /// the wrong shape or a configuration key is malformed.
    pub fn build(
        &self,
        descriptor: TargetDescriptor,
        resolution: Resolution,
    ) -> Result<PatchMetadata, PatchError> {
        let TargetDescriptor {
            name,
            mut options,
            configure: configuration,
            ..
        } = Self::route_kwargs(descriptor)?;

        let mut metadata =
            PatchMetadata::new(resolution.path, resolution.is_async, PatchOptions::default());
        metadata.name = name;

        let return_value = options.return_value.take();
        let side_effect = options.side_effect.take();
        metadata.options = options;
        self.apply_behavior(&mut metadata, return_value, side_effect);

        for (key, value) in configuration {
            metadata.options.configure.push(&key, value)?;
        }

        if metadata.options.new.is_some() && !metadata.options.configure.is_empty() {
            let warning = PatchWarning::ConfigurationIgnored {
                path: metadata.path.to_string(),
            };
            warn!(path = %metadata.path, "{}", warning);
            metadata.warnings.push(warning);
        }

        Ok(metadata)
    }

    /// Replace the return value and side effect of existing metadata.
    ///
    /// Previous behavior is discarded; the ambiguity, bypass and async rules
    /// apply again.
    pub fn refresh(
        &self,
        metadata: &mut PatchMetadata,
        return_value: Option<Value>,
        side_effect: Option<SideEffect>,
    ) {
        metadata
            .warnings
            .retain(|w| !matches!(w, PatchWarning::AmbiguousBehavior { .. }));
        self.apply_behavior(metadata, return_value, side_effect);
    }

    fn apply_behavior(
        &self,
        metadata: &mut PatchMetadata,
        return_value: Option<Value>,
        side_effect: Option<SideEffect>,
    ) {
        let options = &mut metadata.options;
        options.return_value = return_value;
        options.side_effect = side_effect;

        if options.is_ambiguous() {
            let warning = PatchWarning::AmbiguousBehavior {
                path: metadata.path.to_string(),
            };
            warn!(path = %metadata.path, "{}", warning);
            metadata.warnings.push(warning);
        }

        if metadata.path.leaf().is_some_and(|leaf| self.bypasses(leaf)) {
            options.return_value = None;
        }

        if metadata.is_async {
            let awaited = options.return_value.take().unwrap_or_default();
            options.return_value = Some(awaited.into_deferred());
            options.side_effect = options.side_effect.take().map(SideEffect::into_deferred);
        }
    }

    fn set_option(
        options: &mut PatchOptions,
        key: &str,
        value: ConfigValue,
    ) -> Result<(), PatchError> {
        let wrong_shape = |expected: &str| {
            PatchError::invalid_configuration(key, format!("expected {}", expected))
        };

        match (key, value) {
            ("side_effect", ConfigValue::SideEffect(side_effect)) => {
                options.side_effect = Some(side_effect);
            }
            ("side_effect", ConfigValue::Value(value)) => {
                options.side_effect = Some(SideEffect::from_value(value));
            }
            (_, ConfigValue::SideEffect(_)) => {
                return Err(wrong_shape("a value, not a side effect"))
            }
            ("new", ConfigValue::Value(value)) => options.new = Some(value),
            ("return_value", ConfigValue::Value(value)) => options.return_value = Some(value),
            ("create", ConfigValue::Value(Value::Bool(flag))) => options.create = flag,
            ("spec_set", ConfigValue::Value(Value::Bool(flag))) => options.spec_set = flag,
            ("autospec", ConfigValue::Value(Value::Bool(flag))) => options.autospec = flag,
            ("create" | "spec_set" | "autospec", _) => return Err(wrong_shape("a boolean")),
            ("spec", ConfigValue::Value(Value::List(items))) => {
                let names = items
                    .into_iter()
                    .map(|item| match item {
                        Value::Str(name) if is_identifier(&name) => Ok(name),
                        _ => Err(wrong_shape("a list of attribute names")),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                options.spec = Some(names);
            }
            ("spec", _) => return Err(wrong_shape("a list of attribute names")),
            ("new_callable", _) => {
                return Err(wrong_shape("a factory, set through TargetDescriptor::new_callable"))
            }
            (other, _) => {
                return Err(PatchError::invalid_configuration(
                    other,
                    "not a recognized option",
                ))
            }
        }
        Ok(())
    }
}

impl Default for PatchSpecBuilder {
    fn default() -> Self {
        Self::new()
    }
}
