//! The option bag handed to the patch primitive.

use crate::domain::configure::ConfigurePlan;
use crate::domain::stand_in::StandIn;
use crate::domain::value::{SideEffect, Value};
use std::fmt;
use std::sync::Arc;

/// Factory producing the stand-in installed by a patch.
pub type NewCallable = Arc<dyn Fn() -> StandIn + Send + Sync>;

/// Keyword names that set a patch option instead of configuring the substitute.
pub const RECOGNIZED_OPTIONS: [&str; 8] = [
    "new",
    "spec",
    "create",
    "spec_set",
    "autospec",
    "new_callable",
    "return_value",
    "side_effect",
];

/// Options describing how a substitution is built.
#[derive(Clone, Default)]
pub struct PatchOptions {
    /// Substitute installed verbatim instead of a generated stand-in
    pub new: Option<Value>,
    /// Attribute names the generated stand-in exposes
    pub spec: Option<Vec<String>>,
    /// Also restrict attribute assignment to the spec
    pub spec_set: bool,
    /// Derive the spec from the target's members
    pub autospec: bool,
    /// Create the symbol if it does not exist
    pub create: bool,
    /// Factory for the generated stand-in
    pub new_callable: Option<NewCallable>,
    /// Value returned when the substitute is called
    pub return_value: Option<Value>,
    /// Behavior run when the substitute is called
    pub side_effect: Option<SideEffect>,
    /// Nested configuration applied after install
    pub configure: ConfigurePlan,
}

impl PatchOptions {
    /// Whether both a return value and a side effect are set.
    ///
    /// The side effect wins at call time, which is rarely what the caller
    /// meant.
    pub fn is_ambiguous(&self) -> bool {
        let has_return = self.return_value.as_ref().is_some_and(|v| !v.is_empty());
        let has_effect = self.side_effect.as_ref().is_some_and(|s| !s.is_empty());
        has_return && has_effect
    }
}

impl fmt::Debug for PatchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatchOptions")
            .field("new", &self.new)
            .field("spec", &self.spec)
            .field("spec_set", &self.spec_set)
            .field("autospec", &self.autospec)
            .field("create", &self.create)
            .field("new_callable", &self.new_callable.as_ref().map(|_| ".."))
            .field("return_value", &self.return_value)
            .field("side_effect", &self.side_effect)
            .field("configure", &self.configure)
            .finish()
    }
}

/// Non-fatal findings recorded while building a patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchWarning {
    /// Both `return_value` and `side_effect` were given; the side effect wins
    AmbiguousBehavior {
        /// Resolved path of the patch
        path: String,
    },
    /// `new` was given together with nested configuration, which is ignored
    ConfigurationIgnored {
        /// Resolved path of the patch
        path: String,
    },
}

impl fmt::Display for PatchWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchWarning::AmbiguousBehavior { path } => write!(
                f,
                "`{}` has both return_value and side_effect; side_effect takes precedence",
                path
            ),
            PatchWarning::ConfigurationIgnored { path } => write!(
                f,
                "`{}` was given an explicit substitute; nested configuration is not applied",
                path
            ),
        }
    }
}
