//! Descriptions of what a test wants to replace.

use crate::domain::configure::ConfigValue;
use crate::domain::options::PatchOptions;
use crate::domain::path::names_type;
use crate::domain::stand_in::StandIn;
use crate::domain::value::{SideEffect, Value};
use std::any::{type_name, type_name_of_val};
use std::sync::Arc;

/// A module path plus a qualified name inside it.
///
/// Both parts use dots as separators. Nothing is validated here; resolution
/// rejects anything that is not a dotted identifier path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolRef {
    module: String,
    qualname: String,
}

impl SymbolRef {
    /// Refer to `qualname` inside `module`.
    pub fn new(module: impl Into<String>, qualname: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            qualname: qualname.into(),
        }
    }

    /// Refer to the type `T`. The last path segment is the qualified name.
    pub fn of<T: ?Sized>() -> Self {
        Self::split_type(type_name::<T>())
    }

    fn split_type(rust_path: &str) -> Self {
        match rust_path.rsplit_once("::") {
            Some((module, name)) => Self::new(module.replace("::", "."), name),
            None => Self::new(String::new(), rust_path),
        }
    }

    /// Split the path of a function or method.
    ///
    /// The qualified name starts at the first segment naming a type, so
    /// `app::heroes::Batman::eat` has module `app.heroes` and qualified name
    /// `Batman.eat`. Without such a segment only the last one is the name.
    fn split_routine(rust_path: &str) -> Self {
        let segments: Vec<&str> = rust_path.split("::").collect();
        let start = segments
            .iter()
            .position(|segment| names_type(segment))
            .unwrap_or(segments.len().saturating_sub(1));
        Self::new(segments[..start].join("."), segments[start..].join("."))
    }

    /// The module path.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// The qualified name inside the module.
    pub fn qualname(&self) -> &str {
        &self.qualname
    }

    /// `module.qualname`.
    pub fn dotted(&self) -> String {
        if self.module.is_empty() {
            self.qualname.clone()
        } else {
            format!("{}.{}", self.module, self.qualname)
        }
    }
}

/// The kind of thing being replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A type; without a member the type itself is replaced
    Class(SymbolRef),
    /// A module; a member is usually supplied
    Module(String),
    /// A free function or a method
    Routine(SymbolRef),
    /// The type of a value; the type is patched, not the value
    Instance(SymbolRef),
    /// A dotted path trusted verbatim
    Path(String),
}

impl Target {
    /// Target the type `T`.
    pub fn class<T: ?Sized>() -> Self {
        Target::Class(SymbolRef::of::<T>())
    }

    /// Target a type by its module and qualified name.
    pub fn class_at(module: impl Into<String>, qualname: impl Into<String>) -> Self {
        Target::Class(SymbolRef::new(module, qualname))
    }

    /// Target a module. Rust style `a::b` paths are accepted.
    pub fn module(name: &str) -> Self {
        Target::Module(name.replace("::", "."))
    }

    /// Target a function or method item, e.g. `Target::routine(&Batman::eat)`.
    pub fn routine<F: ?Sized>(routine: &F) -> Self {
        Target::Routine(SymbolRef::split_routine(type_name_of_val(routine)))
    }

    /// Target a routine by its module and qualified name.
    pub fn routine_at(module: impl Into<String>, qualname: impl Into<String>) -> Self {
        Target::Routine(SymbolRef::new(module, qualname))
    }

    /// Target the type of `value`.
    pub fn instance<T: ?Sized>(value: &T) -> Self {
        Target::Instance(SymbolRef::split_type(type_name_of_val(value)))
    }

    /// Target a dotted string path.
    pub fn path(path: impl Into<String>) -> Self {
        Target::Path(path.into())
    }

    /// Short description used in errors and logs.
    pub fn describe(&self) -> String {
        match self {
            Target::Class(symbol) => format!("class {}", symbol.dotted()),
            Target::Module(module) => format!("module {}", module),
            Target::Routine(symbol) => format!("routine {}", symbol.dotted()),
            Target::Instance(symbol) => format!("instance of {}", symbol.dotted()),
            Target::Path(path) => path.clone(),
        }
    }
}

/// Everything a test says about one patch.
///
/// Built with chained setters:
///
/// ```
/// use mocker_builder::{Target, TargetDescriptor};
///
/// let descriptor = TargetDescriptor::new(Target::class_at("pkg.mod", "C"))
///     .named("private_x")
///     .attribute("_x")
///     .return_value(10);
/// assert_eq!(descriptor.name.as_deref(), Some("private_x"));
/// ```
#[derive(Debug, Clone)]
pub struct TargetDescriptor {
    /// What to replace
    pub target: Target,
    /// Optional name for later lookup
    pub name: Option<String>,
    /// Member routine to replace
    pub method: Option<String>,
    /// Member attribute to replace
    pub attribute: Option<String>,
    /// Explicit patch options
    pub options: PatchOptions,
    /// Nested configuration entries
    pub configure: Vec<(String, ConfigValue)>,
    /// Free-form keyword arguments, routed when the patch is built
    pub kwargs: Vec<(String, ConfigValue)>,
}

impl TargetDescriptor {
    /// Describe a patch of `target` with default options.
    pub fn new(target: Target) -> Self {
        Self {
            target,
            name: None,
            method: None,
            attribute: None,
            options: PatchOptions::default(),
            configure: Vec::new(),
            kwargs: Vec::new(),
        }
    }

    /// Name the patch.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Replace the member routine `method`.
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Replace the member attribute `attribute`.
    pub fn attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Install `value` verbatim instead of a generated stand-in.
    pub fn new_value(mut self, value: impl Into<Value>) -> Self {
        self.options.new = Some(value.into());
        self
    }

    /// Value returned when the substitute is called.
    pub fn return_value(mut self, value: impl Into<Value>) -> Self {
        self.options.return_value = Some(value.into());
        self
    }

    /// Behavior run when the substitute is called.
    pub fn side_effect(mut self, side_effect: impl Into<SideEffect>) -> Self {
        self.options.side_effect = Some(side_effect.into());
        self
    }

    /// Create the symbol if it does not exist.
    pub fn create(mut self, create: bool) -> Self {
        self.options.create = create;
        self
    }

    /// Restrict the stand-in's attributes to `members`.
    pub fn spec<I, S>(mut self, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.spec = Some(members.into_iter().map(Into::into).collect());
        self
    }

    /// Also restrict attribute assignment to the spec.
    pub fn spec_set(mut self, spec_set: bool) -> Self {
        self.options.spec_set = spec_set;
        self
    }

    /// Derive the spec from the target's registered members.
    pub fn autospec(mut self, autospec: bool) -> Self {
        self.options.autospec = autospec;
        self
    }

    /// Build the stand-in with `factory`.
    pub fn new_callable<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> StandIn + Send + Sync + 'static,
    {
        self.options.new_callable = Some(Arc::new(factory));
        self
    }

    /// Add a nested configuration entry such as `return_value.foo`.
    pub fn configure(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.configure.push((key.into(), value.into()));
        self
    }

    /// Add a free-form keyword argument.
    ///
    /// Option names set the option; anything else is nested configuration.
    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.kwargs.push((key.into(), value.into()));
        self
    }

    /// The member name, whichever of `method` or `attribute` was given.
    pub fn member(&self) -> Option<&str> {
        self.method.as_deref().or(self.attribute.as_deref())
    }
}

impl From<Target> for TargetDescriptor {
    fn from(target: Target) -> Self {
        TargetDescriptor::new(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe;

    impl Probe {
        fn ping(&self) {}
    }

    fn free_function() {}

    fn this_module() -> String {
        module_path!().replace("::", ".")
    }

    #[test]
    fn test_class_from_type() {
        let symbol = SymbolRef::of::<Probe>();
        assert_eq!(symbol.module(), this_module());
        assert_eq!(symbol.qualname(), "Probe");
    }

    #[test]
    fn test_routine_from_method_item() {
        let Target::Routine(symbol) = Target::routine(&Probe::ping) else {
            panic!("expected a routine");
        };
        assert_eq!(symbol.module(), this_module());
        assert_eq!(symbol.qualname(), "Probe.ping");
    }

    #[test]
    fn test_routine_from_free_function() {
        let Target::Routine(symbol) = Target::routine(&free_function) else {
            panic!("expected a routine");
        };
        assert_eq!(symbol.module(), this_module());
        assert_eq!(symbol.qualname(), "free_function");
    }

    #[test]
    fn test_instance_targets_its_type() {
        let probe = Probe;
        assert_eq!(Target::instance(&probe), Target::Instance(SymbolRef::of::<Probe>()));
    }

    #[test]
    fn test_module_accepts_rust_paths() {
        assert_eq!(Target::module("app::heroes"), Target::Module("app.heroes".to_string()));
    }

    #[test]
    fn test_member_prefers_method() {
        let descriptor = TargetDescriptor::new(Target::path("a.B"))
            .method("m")
            .attribute("a");
        assert_eq!(descriptor.member(), Some("m"));
    }
}
